// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

use async_trait::async_trait;
use thiserror::Error;

use crate::record::Record;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CursorError {
    #[error("Record store error: {0}")]
    Backend(String),
    #[error("Invalid cursor request: {0}")]
    InvalidRequest(String),
}

/// A forward-only cursor over primary store records.
///
/// A cursor that is not polled is paused; implementations may prefetch one
/// page of `batch_size` records but must not read further ahead.
#[async_trait]
pub trait RecordCursor: Send {
    /// Next record, or `None` once the cursor is exhausted.
    async fn next_record(&mut self) -> Result<Option<Record>, CursorError>;
}

/// Something a record cursor can be opened on (a collection, a query).
#[async_trait]
pub trait RecordSource: Send + Sync {
    async fn open_cursor(&self, batch_size: usize) -> Result<Box<dyn RecordCursor>, CursorError>;
}
