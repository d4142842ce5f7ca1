// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Bulk synchronization of a record cursor into an index.

pub mod pipeline;
pub mod types;

pub use pipeline::{RecordFilter, SyncPipeline};
pub use types::{CursorState, SyncError, SyncEvent, SyncReport};
