// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Bulk request batching.

pub mod bulk_buffer;
pub mod operation;

pub use bulk_buffer::{BulkBuffer, BulkEvent, FlushReason};
pub use operation::{BulkMeta, BulkOperation};
