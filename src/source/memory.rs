// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::RwLock;

use super::traits::{CursorError, RecordCursor, RecordSource};
use crate::record::Record;

#[derive(Default)]
struct StoreInner {
    records: DashMap<String, Record>,
    /// Insertion order of keys
    order: RwLock<Vec<String>>,
    pages_read: AtomicUsize,
}

/// In-memory primary store, iterated in insertion order.
#[derive(Clone, Default)]
pub struct InMemoryRecordStore {
    inner: Arc<StoreInner>,
}

impl InMemoryRecordStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a record, keyed by its id string.
    ///
    /// Records without an id are keyed by insertion position. Replacing keeps
    /// the original position.
    pub fn insert(&self, record: Record) {
        let key = record
            .id_string()
            .unwrap_or_else(|| format!("#{}", self.inner.order.read().len()));
        if self.inner.records.insert(key.clone(), record).is_none() {
            self.inner.order.write().push(key);
        }
    }

    pub fn remove(&self, id: &str) -> Option<Record> {
        let removed = self.inner.records.remove(id).map(|(_, record)| record);
        if removed.is_some() {
            self.inner.order.write().retain(|key| key != id);
        }
        removed
    }

    #[must_use]
    pub fn get(&self, id: &str) -> Option<Record> {
        self.inner.records.get(id).map(|r| r.value().clone())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.records.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.records.is_empty()
    }

    pub fn clear(&self) {
        self.inner.records.clear();
        self.inner.order.write().clear();
    }

    /// Number of pages served to cursors so far.
    #[must_use]
    pub fn pages_read(&self) -> usize {
        self.inner.pages_read.load(Ordering::SeqCst)
    }

    /// One page of records in insertion order.
    /// Returns an empty vec when offset is past the end.
    #[must_use]
    pub fn scan(&self, offset: usize, limit: usize) -> Vec<Record> {
        let order = self.inner.order.read();
        order
            .iter()
            .skip(offset)
            .take(limit)
            .filter_map(|key| self.inner.records.get(key).map(|r| r.value().clone()))
            .collect()
    }
}

impl FromIterator<Record> for InMemoryRecordStore {
    fn from_iter<I: IntoIterator<Item = Record>>(iter: I) -> Self {
        let store = Self::new();
        for record in iter {
            store.insert(record);
        }
        store
    }
}

#[async_trait]
impl RecordSource for InMemoryRecordStore {
    async fn open_cursor(&self, batch_size: usize) -> Result<Box<dyn RecordCursor>, CursorError> {
        if batch_size == 0 {
            return Err(CursorError::InvalidRequest("batch size must be positive".into()));
        }
        Ok(Box::new(PagedCursor {
            store: self.clone(),
            batch_size,
            offset: 0,
            page: VecDeque::new(),
            exhausted: false,
        }))
    }
}

/// Cursor reading `batch_size` records per page.
struct PagedCursor {
    store: InMemoryRecordStore,
    batch_size: usize,
    offset: usize,
    page: VecDeque<Record>,
    exhausted: bool,
}

#[async_trait]
impl RecordCursor for PagedCursor {
    async fn next_record(&mut self) -> Result<Option<Record>, CursorError> {
        if self.page.is_empty() && !self.exhausted {
            let page = self.store.scan(self.offset, self.batch_size);
            self.offset += self.batch_size;
            self.exhausted = page.len() < self.batch_size;
            if !page.is_empty() {
                self.store.inner.pages_read.fetch_add(1, Ordering::SeqCst);
            }
            self.page.extend(page);
        }
        Ok(self.page.pop_front())
    }
}
