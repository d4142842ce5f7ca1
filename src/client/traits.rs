// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ClientError {
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Index engine returned status {code}: {message}")]
    Status { code: u16, message: String },
    #[error("Transport error: {0}")]
    Transport(String),
}

impl ClientError {
    /// Missing document or index, whichever way the engine reported it.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_) | Self::Status { code: 404, .. })
    }
}

/// The subset of the index engine API the sync layer drives.
///
/// Responses are returned as raw JSON; only errors are typed.
#[async_trait]
pub trait IndexClient: Send + Sync {
    /// Submit a flat header/body sequence as one bulk request.
    async fn bulk(&self, body: Vec<Value>) -> Result<Value, ClientError>;

    /// Make recent writes to an index searchable.
    async fn refresh(&self, index: &str) -> Result<Value, ClientError>;

    async fn index_exists(&self, index: &str) -> Result<bool, ClientError>;

    async fn create_index(&self, index: &str, settings: Option<&Value>) -> Result<Value, ClientError>;

    async fn put_mapping(
        &self,
        index: &str,
        doc_type: Option<&str>,
        mapping: &Value,
        include_type_name: bool,
    ) -> Result<Value, ClientError>;

    /// Full document write (create or replace).
    async fn index(
        &self,
        index: &str,
        doc_type: Option<&str>,
        id: &str,
        body: &Value,
    ) -> Result<Value, ClientError>;

    /// Partial update; `body` is `{"doc": ...}` or `{"script": ...}`.
    async fn update(
        &self,
        index: &str,
        doc_type: Option<&str>,
        id: &str,
        body: &Value,
    ) -> Result<Value, ClientError>;

    async fn delete(&self, index: &str, doc_type: Option<&str>, id: &str) -> Result<Value, ClientError>;
}
