// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

use std::sync::Arc;

use tracing::debug;

use super::types::{ModelError, Transform, TypeNamer};
use super::IndexModel;
use crate::batching::BulkBuffer;
use crate::client::IndexClient;
use crate::config::IndexSyncConfig;
use crate::mapping::MappingCache;
use crate::resilience::RetryConfig;
use crate::schema::Schema;
use crate::sync::RecordFilter;

/// Builder for [`IndexModel`].
///
/// The index name falls back to the collection name and the document type
/// to the model name with a lower-case first letter.
pub struct IndexModelBuilder {
    client: Arc<dyn IndexClient>,
    schema: Arc<Schema>,
    config: IndexSyncConfig,
    model_name: Option<String>,
    collection: Option<String>,
    type_namer: Option<TypeNamer>,
    transform: Option<Transform>,
    filter: Option<RecordFilter>,
    buffer: Option<BulkBuffer>,
    delete_retry: RetryConfig,
}

impl IndexModelBuilder {
    pub(super) fn new(client: Arc<dyn IndexClient>, schema: Arc<Schema>) -> Self {
        Self {
            client,
            schema,
            config: IndexSyncConfig::default(),
            model_name: None,
            collection: None,
            type_namer: None,
            transform: None,
            filter: None,
            buffer: None,
            delete_retry: RetryConfig::not_found(),
        }
    }

    #[must_use]
    pub fn config(mut self, config: IndexSyncConfig) -> Self {
        self.config = config;
        self
    }

    #[must_use]
    pub fn model_name(mut self, name: impl Into<String>) -> Self {
        self.model_name = Some(name.into());
        self
    }

    #[must_use]
    pub fn collection(mut self, name: impl Into<String>) -> Self {
        self.collection = Some(name.into());
        self
    }

    /// Derive the document type from the model name. Takes precedence over
    /// the configured type.
    #[must_use]
    pub fn type_namer(mut self, namer: TypeNamer) -> Self {
        self.type_namer = Some(namer);
        self
    }

    #[must_use]
    pub fn transform(mut self, transform: Transform) -> Self {
        self.transform = Some(transform);
        self
    }

    /// Records rejected by `filter` are skipped during synchronization.
    #[must_use]
    pub fn filter(mut self, filter: RecordFilter) -> Self {
        self.filter = Some(filter);
        self
    }

    /// Share a bulk buffer with other models. Implies bulk mode.
    #[must_use]
    pub fn bulk_buffer(mut self, buffer: BulkBuffer) -> Self {
        self.buffer = Some(buffer);
        self
    }

    #[must_use]
    pub fn delete_retry(mut self, retry: RetryConfig) -> Self {
        self.delete_retry = retry;
        self
    }

    pub fn build(self) -> Result<IndexModel, ModelError> {
        let index = non_empty(self.config.index.clone()).or_else(|| non_empty(self.collection.clone()));

        let doc_type = match (&self.type_namer, self.model_name.as_deref().filter(|n| !n.is_empty())) {
            (Some(namer), Some(model_name)) => Some(namer(model_name)),
            _ => non_empty(self.config.doc_type.clone())
                .or_else(|| self.model_name.as_deref().map(lc_first))
                .and_then(|t| non_empty(Some(t))),
        };

        let (index, doc_type) = match (index, doc_type) {
            (Some(index), Some(doc_type)) => (index, doc_type),
            (_, None) => return Err(ModelError::Config("Missing model name to build ES type".into())),
            (None, _) => {
                return Err(ModelError::Config(
                    "Missing collection name to build ES index".into(),
                ))
            }
        };

        let mapping = MappingCache::global().get_or_generate(&self.schema, self.config.engine_version)?;

        let buffer = self.buffer.or_else(|| {
            self.config
                .bulk
                .as_ref()
                .map(|bulk| BulkBuffer::new(Arc::clone(&self.client), bulk))
        });

        debug!(
            index = %index,
            doc_type = %doc_type,
            version = %self.config.engine_version,
            bulk = buffer.is_some(),
            "Index model configured"
        );

        Ok(IndexModel {
            client: self.client,
            schema: self.schema,
            mapping,
            config: self.config,
            index,
            doc_type,
            transform: self.transform,
            filter: self.filter,
            buffer,
            delete_retry: self.delete_retry,
        })
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}

/// `"BlogPost"` -> `"blogPost"`
pub(crate) fn lc_first(name: &str) -> String {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) => first.to_lowercase().chain(chars).collect(),
        None => String::new(),
    }
}
