// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Primary store access.
//!
//! The synchronization pipeline reads records through [`RecordCursor`]s
//! opened on a [`RecordSource`]. A cursor is paused simply by not polling it.

pub mod memory;
pub mod traits;

pub use memory::InMemoryRecordStore;
pub use traits::{CursorError, RecordCursor, RecordSource};
