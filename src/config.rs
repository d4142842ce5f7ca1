// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Configuration for index synchronization.
//!
//! # Example
//!
//! ```
//! use index_sync::{BulkConfig, IndexSyncConfig};
//!
//! // Minimal config (uses defaults)
//! let config = IndexSyncConfig::default();
//! assert_eq!(config.engine_version.major(), 5);
//! assert!(config.bulk.is_none());
//!
//! // Bulk mode sized for 500 index operations per request
//! let config = IndexSyncConfig {
//!     index: Some("people".into()),
//!     bulk: Some(BulkConfig::for_operations(500)),
//!     refresh_delay_ms: 100,
//!     ..Default::default()
//! };
//! assert_eq!(config.bulk.unwrap().size, 1000);
//! ```

use std::time::Duration;

use serde::Deserialize;
use serde_json::Value;

use crate::mapping::EngineVersion;

/// Configuration for one indexed model.
///
/// Every field has a default, so any serde format can supply a partial
/// document.
#[derive(Debug, Clone, Deserialize)]
pub struct IndexSyncConfig {
    /// Index name (default: the collection name)
    #[serde(default)]
    pub index: Option<String>,

    /// Document type (default: model name with a lower-case first letter)
    #[serde(default, rename = "type")]
    pub doc_type: Option<String>,

    /// Index engine major version: 2, 5, 6 or 7 (default: 5)
    #[serde(default, rename = "es_version")]
    pub engine_version: EngineVersion,

    /// Buffer single-document writes into bulk requests
    #[serde(default)]
    pub bulk: Option<BulkConfig>,

    /// Wait after each refresh (ms), for engines with slow visibility
    #[serde(default)]
    pub refresh_delay_ms: u64,

    /// Remove unset fields with a script instead of nulling them
    #[serde(default)]
    pub use_script_unset: bool,

    /// Index settings sent when the index is created
    #[serde(default)]
    pub mapping_settings: Option<Value>,
}

impl Default for IndexSyncConfig {
    fn default() -> Self {
        Self {
            index: None,
            doc_type: None,
            engine_version: EngineVersion::default(),
            bulk: None,
            refresh_delay_ms: 0,
            use_script_unset: false,
            mapping_settings: None,
        }
    }
}

impl IndexSyncConfig {
    #[must_use]
    pub fn refresh_delay(&self) -> Duration {
        Duration::from_millis(self.refresh_delay_ms)
    }
}

/// Bulk buffer settings.
///
/// `size` counts raw request slots: an index or update operation takes two
/// (header and body), a delete one.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct BulkConfig {
    /// Flush once this many slots are buffered
    #[serde(default = "default_bulk_size")]
    pub size: usize,

    /// Flush after this many ms without a push
    #[serde(default = "default_bulk_delay_ms", rename = "delay")]
    pub delay_ms: u64,

    /// Cursor page size during synchronization
    #[serde(default = "default_bulk_batch")]
    pub batch: usize,
}

fn default_bulk_size() -> usize { 1000 }
fn default_bulk_delay_ms() -> u64 { 1000 }
fn default_bulk_batch() -> usize { 50 }

impl Default for BulkConfig {
    fn default() -> Self {
        Self {
            size: default_bulk_size(),
            delay_ms: default_bulk_delay_ms(),
            batch: default_bulk_batch(),
        }
    }
}

impl BulkConfig {
    /// Size the buffer for `operations` index/update operations.
    #[must_use]
    pub fn for_operations(operations: usize) -> Self {
        Self {
            size: operations.saturating_mul(2),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }
}
