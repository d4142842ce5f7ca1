// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Public types for single-document operations.

use std::sync::Arc;

use serde_json::Value;
use thiserror::Error;

use crate::client::ClientError;
use crate::mapping::MappingError;
use crate::sync::SyncError;

/// Hook applied to a serialized body before it is written.
///
/// Returning `None` keeps the body unchanged.
pub type Transform = Arc<dyn Fn(Value) -> Option<Value> + Send + Sync>;

/// Derives the document type from the model name.
pub type TypeNamer = Arc<dyn Fn(&str) -> String + Send + Sync>;

/// How [`super::IndexModel::index_document`] writes the body.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum IndexMode {
    /// Replace the whole document
    #[default]
    Index,
    /// Partial update; `unset` fields are sent as null.
    /// Falls back to a full index when the document is missing.
    Update { unset: Vec<String> },
}

impl IndexMode {
    /// Partial update without unset fields.
    #[must_use]
    pub fn update() -> Self {
        Self::Update { unset: Vec::new() }
    }
}

/// Result of a single-document write.
#[derive(Debug, Clone, PartialEq)]
pub enum WriteOutcome {
    /// Sent directly; holds the engine response
    Applied(Value),
    /// Buffered for the next bulk request. `flushed` when the push started one.
    Queued { flushed: bool },
}

impl WriteOutcome {
    #[must_use]
    pub fn response(&self) -> Option<&Value> {
        match self {
            Self::Applied(response) => Some(response),
            Self::Queued { .. } => None,
        }
    }
}

#[derive(Error, Debug)]
pub enum ModelError {
    #[error("{0}")]
    Config(String),

    #[error("Mapping generation failed: {0}")]
    Mapping(#[from] MappingError),

    #[error("Index engine error: {0}")]
    Client(#[from] ClientError),

    #[error("Record has no id")]
    MissingId,

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error(transparent)]
    Sync(#[from] SyncError),
}

impl ModelError {
    /// Whether the engine reported the target as missing.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Client(e) if e.is_not_found())
    }
}
