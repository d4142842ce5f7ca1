// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! # Index Sync
//!
//! Keeps a search index in sync with a primary record store.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      Schema (per model)                     │
//! │  • Typed fields with es_* options                          │
//! │  • Value overrides and computed extra fields               │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                  (generate once, cached per version)
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        Mapping tree                         │
//! │  • Implicit / explicit inclusion                           │
//! │  • Engine-version default types                            │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                 (serialize each record through it)
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    Bulk buffer → Index engine               │
//! │  • Size threshold or idle-delay flush                      │
//! │  • Cursor paused while a full buffer drains                │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust
//! use std::sync::Arc;
//! use index_sync::{InMemoryIndexClient, InMemoryRecordStore, IndexModel, Record};
//! use index_sync::schema::{FieldKind, Schema};
//!
//! #[tokio::main]
//! async fn main() {
//!     let client = Arc::new(InMemoryIndexClient::new());
//!     let schema = Schema::builder()
//!         .field("name", FieldKind::String)
//!         .field("age", FieldKind::Number)
//!         .build();
//!
//!     let people = IndexModel::builder(client.clone(), schema)
//!         .model_name("Person")
//!         .collection("people")
//!         .build()
//!         .expect("valid model");
//!
//!     people.create_mapping(None).await.expect("mapping");
//!
//!     let store: InMemoryRecordStore = (0..10u64)
//!         .map(|i| Record::with_id(format!("p{i}")).with("name", format!("n{i}")).with("age", i))
//!         .collect();
//!     let report = people.synchronize(&store).await.expect("sync");
//!
//!     assert_eq!(report.queued, 10);
//!     assert_eq!(client.count("people"), 10);
//! }
//! ```
//!
//! ## Modules
//!
//! - [`schema`]: Structural schemas and field type resolution
//! - [`mapping`]: Mapping generation and the process-wide cache
//! - [`serialize`]: Sparse document serialization
//! - [`batching`]: Bulk operations and the bulk buffer
//! - [`sync`]: Cursor-to-index synchronization pipeline
//! - [`model`]: Per-model mapping lifecycle and single-document writes
//! - [`client`] / [`source`]: Index engine and record store interfaces
//! - [`resilience`]: Retry policies

pub mod batching;
pub mod client;
pub mod config;
pub mod mapping;
pub mod metrics;
pub mod model;
pub mod record;
pub mod resilience;
pub mod schema;
pub mod serialize;
pub mod source;
pub mod sync;
pub mod value;

pub use batching::{BulkBuffer, BulkEvent, BulkMeta, BulkOperation, FlushReason};
pub use client::{ClientError, InMemoryIndexClient, IndexClient};
pub use config::{BulkConfig, IndexSyncConfig};
pub use mapping::{generate, EngineVersion, MappingCache, MappingError, MappingNode};
pub use metrics::LatencyTimer;
pub use model::{IndexMode, IndexModel, IndexModelBuilder, ModelError, WriteOutcome};
pub use record::{ObjectId, Record, RecordValue};
pub use resilience::RetryConfig;
pub use schema::{FieldKind, FieldOptions, Schema, SchemaBuilder};
pub use serialize::serialize_record;
pub use source::{CursorError, InMemoryRecordStore, RecordCursor, RecordSource};
pub use sync::{CursorState, RecordFilter, SyncError, SyncEvent, SyncPipeline, SyncReport};
pub use value::{ValueContext, ValueError, ValueSource};
