// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Process-wide mapping cache.
//!
//! A mapping is a pure function of (schema, engine version), so it is built
//! once and shared as an `Arc` by every model bound to that schema.

use std::sync::{Arc, LazyLock};

use dashmap::DashMap;
use tracing::debug;

use super::{generate, EngineVersion, MappingError, MappingNode};
use crate::metrics;
use crate::schema::{Schema, SchemaId};

static GLOBAL: LazyLock<MappingCache> = LazyLock::new(MappingCache::new);

/// Concurrent cache of generated mappings.
#[derive(Debug, Default)]
pub struct MappingCache {
    entries: DashMap<(SchemaId, EngineVersion), Arc<MappingNode>>,
}

impl MappingCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The shared process-wide cache.
    #[must_use]
    pub fn global() -> &'static MappingCache {
        &GLOBAL
    }

    /// Return the cached mapping or generate and store it.
    ///
    /// Two callers racing on a miss may both generate; the first insert wins
    /// and both get the same `Arc`.
    pub fn get_or_generate(
        &self,
        schema: &Schema,
        version: EngineVersion,
    ) -> Result<Arc<MappingNode>, MappingError> {
        let key = (schema.id(), version);
        if let Some(hit) = self.entries.get(&key) {
            metrics::record_mapping_cache(true);
            return Ok(Arc::clone(hit.value()));
        }

        metrics::record_mapping_cache(false);
        let mapping = Arc::new(generate(schema, version)?);
        let stored = Arc::clone(self.entries.entry(key).or_insert(mapping).value());
        debug!(schema = schema.id().as_u64(), %version, "Mapping cached");
        metrics::set_mapping_cache_entries(self.entries.len());
        Ok(stored)
    }

    #[must_use]
    pub fn get(&self, id: SchemaId, version: EngineVersion) -> Option<Arc<MappingNode>> {
        self.entries.get(&(id, version)).map(|entry| Arc::clone(entry.value()))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
