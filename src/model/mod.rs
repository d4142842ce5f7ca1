// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Per-model index operations.
//!
//! An [`IndexModel`] binds a schema to one index and document type and
//! exposes the mapping lifecycle, single-document writes and full
//! synchronization.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use index_sync::{InMemoryIndexClient, IndexModel, IndexMode, Record};
//! use index_sync::schema::{FieldKind, Schema};
//!
//! # #[tokio::main]
//! # async fn main() {
//! let client = Arc::new(InMemoryIndexClient::new());
//! let schema = Schema::builder()
//!     .field("name", FieldKind::String)
//!     .field("age", FieldKind::Number)
//!     .build();
//!
//! let model = IndexModel::builder(client.clone(), schema)
//!     .model_name("Person")
//!     .collection("people")
//!     .build()
//!     .unwrap();
//!
//! model.create_mapping(None).await.unwrap();
//! let person = Record::with_id("p1").with("name", "Ada").with("age", 36);
//! model.index_document(&person, IndexMode::Index).await.unwrap();
//! model.refresh().await.unwrap();
//!
//! assert_eq!(client.count("people"), 1);
//! # }
//! ```

mod builder;
pub mod types;

pub use builder::IndexModelBuilder;
pub use types::{IndexMode, ModelError, Transform, TypeNamer, WriteOutcome};

use std::sync::Arc;

use serde_json::{json, Map, Value};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::batching::{BulkBuffer, BulkMeta, BulkOperation};
use crate::client::{ClientError, IndexClient};
use crate::config::IndexSyncConfig;
use crate::mapping::{EngineVersion, MappingNode};
use crate::metrics;
use crate::record::Record;
use crate::resilience::{retry_if, RetryConfig};
use crate::schema::Schema;
use crate::serialize::serialize_record;
use crate::source::RecordSource;
use crate::sync::{RecordFilter, SyncEvent, SyncPipeline, SyncReport};

const DEFAULT_SHARDS: u64 = 5;

/// A schema bound to one index and document type.
pub struct IndexModel {
    client: Arc<dyn IndexClient>,
    schema: Arc<Schema>,
    mapping: Arc<MappingNode>,
    config: IndexSyncConfig,
    index: String,
    doc_type: String,
    transform: Option<Transform>,
    filter: Option<RecordFilter>,
    buffer: Option<BulkBuffer>,
    delete_retry: RetryConfig,
}

impl IndexModel {
    pub fn builder(client: Arc<dyn IndexClient>, schema: Arc<Schema>) -> IndexModelBuilder {
        IndexModelBuilder::new(client, schema)
    }

    #[must_use]
    pub fn index(&self) -> &str {
        &self.index
    }

    #[must_use]
    pub fn doc_type(&self) -> &str {
        &self.doc_type
    }

    #[must_use]
    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    #[must_use]
    pub fn mapping(&self) -> &Arc<MappingNode> {
        &self.mapping
    }

    #[must_use]
    pub fn config(&self) -> &IndexSyncConfig {
        &self.config
    }

    /// The bulk buffer single-document writes go through, if any.
    #[must_use]
    pub fn bulk_buffer(&self) -> Option<&BulkBuffer> {
        self.buffer.as_ref()
    }

    /// Serialized body of `record`, transform applied.
    #[must_use]
    pub fn serialize(&self, record: &Record) -> Value {
        let body = serialize_record(record, &self.mapping);
        match self.transform {
            Some(ref transform) => transform(body.clone()).unwrap_or(body),
            None => body,
        }
    }

    /// Create the index if needed, then put the mapping.
    ///
    /// `settings` falls back to the configured mapping settings.
    #[tracing::instrument(skip(self, settings), fields(index = %self.index))]
    pub async fn create_mapping(&self, settings: Option<Value>) -> Result<Value, ModelError> {
        let _timer = crate::time_operation!(&self.index, "create_mapping");
        let include_type_name = self.config.engine_version.needs_type_name_flag();

        if !self.client.index_exists(&self.index).await? {
            let body = self.index_settings(settings);
            if let Err(e) = self.client.create_index(&self.index, Some(&body)).await {
                metrics::record_operation(&self.index, "create_index", "error");
                return Err(e.into());
            }
            metrics::record_operation(&self.index, "create_index", "success");
            info!(settings = %body, "Index created");
        }

        let result = self
            .client
            .put_mapping(&self.index, Some(&self.doc_type), &self.mapping.to_json(), include_type_name)
            .await;
        let status = if result.is_ok() { "success" } else { "error" };
        metrics::record_operation(&self.index, "put_mapping", status);
        Ok(result?)
    }

    /// Index creation body. v7 keeps the shard count earlier versions
    /// defaulted to.
    fn index_settings(&self, settings: Option<Value>) -> Value {
        let mut body = settings
            .or_else(|| self.config.mapping_settings.clone())
            .unwrap_or_else(|| json!({}));

        if self.config.engine_version != EngineVersion::V7 {
            return body;
        }

        let Value::Object(ref mut top) = body else {
            return json!({ "settings": { "number_of_shards": DEFAULT_SHARDS } });
        };
        let shards = top
            .get("number_of_shards")
            .filter(|n| !n.is_null())
            .cloned()
            .unwrap_or_else(|| json!(DEFAULT_SHARDS));
        let nested = top.entry("settings").or_insert_with(|| Value::Object(Map::new()));
        if let Value::Object(nested) = nested {
            nested.entry("number_of_shards").or_insert(shards);
        }
        body
    }

    /// Refresh the index, then wait the configured refresh delay.
    #[tracing::instrument(skip(self), fields(index = %self.index))]
    pub async fn refresh(&self) -> Result<Value, ModelError> {
        let response = {
            let _timer = crate::time_operation!(&self.index, "refresh");
            self.client.refresh(&self.index).await
        };
        let status = if response.is_ok() { "success" } else { "error" };
        metrics::record_operation(&self.index, "refresh", status);
        let response = response?;

        let delay = self.config.refresh_delay();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        Ok(response)
    }

    /// Write one record.
    ///
    /// In bulk mode the body is queued as a full index operation, which
    /// cannot miss, for both modes.
    pub async fn index_document(&self, record: &Record, mode: IndexMode) -> Result<WriteOutcome, ModelError> {
        let id = record.id_string().ok_or(ModelError::MissingId)?;
        let mut body = self.serialize(record);

        if let IndexMode::Update { ref unset } = mode {
            if !unset.is_empty() {
                let Value::Object(ref mut fields) = body else {
                    return Err(ModelError::Serialization(format!(
                        "cannot unset fields on a non-object body for {id}"
                    )));
                };
                for field in unset {
                    fields.insert(field.clone(), Value::Null);
                }
            }
        }

        if let Some(ref buffer) = self.buffer {
            let flushed = buffer.push_operation(BulkOperation::Index { meta: self.meta(id), body });
            return Ok(WriteOutcome::Queued { flushed });
        }

        let response = match mode {
            IndexMode::Index => self.write_full(&id, &body).await?,
            IndexMode::Update { .. } => {
                let partial = json!({ "doc": body });
                match self.client.update(&self.index, Some(&self.doc_type), &id, &partial).await {
                    Ok(response) => {
                        metrics::record_operation(&self.index, "update", "success");
                        response
                    }
                    Err(e) if e.is_not_found() => {
                        debug!(id = %id, "Update target missing, indexing full document");
                        self.write_full(&id, &body).await?
                    }
                    Err(e) => {
                        metrics::record_operation(&self.index, "update", "error");
                        return Err(e.into());
                    }
                }
            }
        };
        Ok(WriteOutcome::Applied(response))
    }

    async fn write_full(&self, id: &str, body: &Value) -> Result<Value, ClientError> {
        let result = self.client.index(&self.index, Some(&self.doc_type), id, body).await;
        let status = if result.is_ok() { "success" } else { "error" };
        metrics::record_operation(&self.index, "index", status);
        result
    }

    /// Remove `fields` from the stored document, either by nulling them or,
    /// with `use_script_unset`, through a removal script.
    pub async fn unset_fields<S: AsRef<str>>(&self, id: &str, fields: &[S]) -> Result<Value, ModelError> {
        let body = if self.config.use_script_unset {
            let script = fields
                .iter()
                .map(|f| format!("ctx._source.remove(\"{}\")", f.as_ref()))
                .collect::<Vec<_>>()
                .join(";");
            json!({ "script": script })
        } else {
            let doc: Map<String, Value> = fields
                .iter()
                .map(|f| (f.as_ref().to_string(), Value::Null))
                .collect();
            json!({ "doc": doc })
        };

        let result = self.client.update(&self.index, Some(&self.doc_type), id, &body).await;
        let status = if result.is_ok() { "success" } else { "error" };
        metrics::record_operation(&self.index, "unset", status);
        Ok(result?)
    }

    /// Delete one document.
    ///
    /// A not-found answer is retried, since the document may have been
    /// indexed so recently that it is not yet visible. In bulk mode the
    /// delete is queued instead.
    #[tracing::instrument(skip(self), fields(index = %self.index))]
    pub async fn remove_document(&self, id: &str) -> Result<WriteOutcome, ModelError> {
        if let Some(ref buffer) = self.buffer {
            let flushed = buffer.push_operation(BulkOperation::Delete { meta: self.meta(id.to_string()) });
            return Ok(WriteOutcome::Queued { flushed });
        }

        let client = &self.client;
        let index = self.index.as_str();
        let doc_type = self.doc_type.as_str();
        let result = retry_if("delete", &self.delete_retry, ClientError::is_not_found, move || {
            client.delete(index, Some(doc_type), id)
        })
        .await;

        match result {
            Ok(response) => {
                metrics::record_operation(&self.index, "delete", "success");
                Ok(WriteOutcome::Applied(response))
            }
            Err(e) => {
                metrics::record_operation(&self.index, "delete", "error");
                warn!(id = %id, error = %e, "Delete failed");
                Err(e.into())
            }
        }
    }

    /// Stream every record of `source` into the index, then refresh it.
    pub async fn synchronize(&self, source: &dyn RecordSource) -> Result<SyncReport, ModelError> {
        let report = self.pipeline().run_source(source, self.batch_size()).await?;
        Ok(report)
    }

    /// Like [`Self::synchronize`], forwarding progress events to `events`.
    pub async fn synchronize_with_events(
        &self,
        source: &dyn RecordSource,
        events: mpsc::UnboundedSender<SyncEvent>,
    ) -> Result<SyncReport, ModelError> {
        let report = self
            .pipeline()
            .with_events(events)
            .run_source(source, self.batch_size())
            .await?;
        Ok(report)
    }

    fn pipeline(&self) -> SyncPipeline {
        let buffer = self.buffer.clone().unwrap_or_else(|| {
            BulkBuffer::new(Arc::clone(&self.client), &self.config.bulk.clone().unwrap_or_default())
        });
        SyncPipeline::new(Arc::clone(&self.client), buffer, self.index.clone(), Arc::clone(&self.mapping))
            .with_doc_type(Some(self.doc_type.clone()))
            .with_filter(self.filter.clone())
    }

    fn batch_size(&self) -> usize {
        self.config.bulk.as_ref().map_or(50, |bulk| bulk.batch)
    }

    fn meta(&self, id: String) -> BulkMeta {
        BulkMeta::new(self.index.clone(), Some(self.doc_type.clone()), id)
    }
}

impl std::fmt::Debug for IndexModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IndexModel")
            .field("index", &self.index)
            .field("doc_type", &self.doc_type)
            .field("engine_version", &self.config.engine_version)
            .field("bulk", &self.buffer.is_some())
            .field("transform", &self.transform.is_some())
            .field("filter", &self.filter.is_some())
            .finish()
    }
}
