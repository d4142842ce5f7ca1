// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Public types for the synchronization pipeline.

use serde_json::Value;
use thiserror::Error;

use crate::client::ClientError;
use crate::record::Record;
use crate::source::CursorError;

/// Upstream cursor state during a run.
///
/// Use [`super::SyncPipeline::state_receiver()`] to watch transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CursorState {
    /// Being polled for the next record
    Open,
    /// Not polled while a record is processed or a flush settles
    Paused,
    /// Exhausted or failed
    Closed,
}

impl std::fmt::Display for CursorState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Open => write!(f, "Open"),
            Self::Paused => write!(f, "Paused"),
            Self::Closed => write!(f, "Closed"),
        }
    }
}

/// Progress notification emitted during a run.
#[derive(Debug, Clone, PartialEq)]
pub enum SyncEvent {
    /// Record serialized and pushed to the bulk buffer
    Queued(Record),
    /// Record rejected by the filter
    Filtered(Record),
    /// A flush was accepted; count in slots
    BatchSent(usize),
    /// A flush failed; the run continues
    BatchError(ClientError),
}

/// Outcome of a completed run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SyncReport {
    pub queued: usize,
    pub filtered: usize,
    /// Records without an id, which cannot be addressed in the index
    pub skipped: usize,
    pub batches_sent: usize,
    pub batch_errors: usize,
    pub slots_sent: usize,
    /// Response of the final refresh call
    pub refresh: Value,
}

impl SyncReport {
    /// Whether every flush was accepted
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.batch_errors == 0
    }
}

/// Terminal failures. Batch errors are reported through events instead.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SyncError {
    #[error("Failed to open record cursor: {0}")]
    CursorOpen(#[source] CursorError),
    #[error("Record cursor failed after {queued} queued records: {source}")]
    Cursor { source: CursorError, queued: usize },
    #[error("Index refresh failed: {0}")]
    Refresh(#[source] ClientError),
}
