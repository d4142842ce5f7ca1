// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Cursor-to-index synchronization.
//!
//! The pipeline polls a record cursor one record at a time. While a record is
//! processed the cursor is paused (not polled). A push that fills the bulk
//! buffer keeps it paused until that flush completes, which couples cursor
//! speed to index throughput:
//!
//! ```text
//!   next_record ──► filter ──► serialize ──► push ──┬─ below size ──► next_record
//!        ▲                                          └─ flushed ─► wait_idle ─┘
//!        │
//!   end of cursor ──► flush rest ──► wait_idle ──► refresh
//! ```
//!
//! Failed flushes are counted and emitted as [`SyncEvent::BatchError`]; only
//! a failure to read the cursor or to refresh the index ends the run with an
//! error.

use std::sync::Arc;
use std::time::Instant;

use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};

use super::types::{CursorState, SyncError, SyncEvent, SyncReport};
use crate::batching::{BulkBuffer, BulkEvent, BulkMeta, BulkOperation};
use crate::client::IndexClient;
use crate::mapping::MappingNode;
use crate::metrics;
use crate::record::Record;
use crate::serialize::serialize_record;
use crate::source::{RecordCursor, RecordSource};

/// Record predicate; `false` skips the record.
pub type RecordFilter = Arc<dyn Fn(&Record) -> bool + Send + Sync>;

/// Streams a cursor into one index through a bulk buffer.
pub struct SyncPipeline {
    client: Arc<dyn IndexClient>,
    buffer: BulkBuffer,
    index: String,
    doc_type: Option<String>,
    mapping: Arc<MappingNode>,
    filter: Option<RecordFilter>,
    events: Option<mpsc::UnboundedSender<SyncEvent>>,
    state: watch::Sender<CursorState>,
}

impl SyncPipeline {
    pub fn new(
        client: Arc<dyn IndexClient>,
        buffer: BulkBuffer,
        index: impl Into<String>,
        mapping: Arc<MappingNode>,
    ) -> Self {
        let (state, _) = watch::channel(CursorState::Closed);
        Self {
            client,
            buffer,
            index: index.into(),
            doc_type: None,
            mapping,
            filter: None,
            events: None,
            state,
        }
    }

    #[must_use]
    pub fn with_doc_type(mut self, doc_type: Option<String>) -> Self {
        self.doc_type = doc_type;
        self
    }

    #[must_use]
    pub fn with_filter(mut self, filter: Option<RecordFilter>) -> Self {
        self.filter = filter;
        self
    }

    /// Forward progress events to `tx`.
    #[must_use]
    pub fn with_events(mut self, tx: mpsc::UnboundedSender<SyncEvent>) -> Self {
        self.events = Some(tx);
        self
    }

    #[must_use]
    pub fn state(&self) -> CursorState {
        *self.state.borrow()
    }

    #[must_use]
    pub fn state_receiver(&self) -> watch::Receiver<CursorState> {
        self.state.subscribe()
    }

    /// Open a cursor of `batch_size` records on `source` and run it.
    pub async fn run_source(
        &self,
        source: &dyn RecordSource,
        batch_size: usize,
    ) -> Result<SyncReport, SyncError> {
        let cursor = source.open_cursor(batch_size).await.map_err(|e| {
            error!(index = %self.index, error = %e, "Failed to open record cursor");
            SyncError::CursorOpen(e)
        })?;
        self.run(cursor).await
    }

    /// Drain `cursor` into the index, then refresh it.
    #[tracing::instrument(skip(self, cursor), fields(index = %self.index))]
    pub async fn run(&self, mut cursor: Box<dyn RecordCursor>) -> Result<SyncReport, SyncError> {
        let started = Instant::now();
        let mut bulk_events = self.buffer.subscribe();
        let mut report = SyncReport::default();
        self.set_state(CursorState::Open);

        loop {
            let record = match cursor.next_record().await {
                Ok(Some(record)) => record,
                Ok(None) => break,
                Err(source) => {
                    error!(queued = report.queued, error = %source, "Record cursor failed");
                    self.set_state(CursorState::Closed);
                    self.settle(&mut bulk_events, &mut report).await;
                    return Err(SyncError::Cursor {
                        source,
                        queued: report.queued,
                    });
                }
            };

            self.set_state(CursorState::Paused);
            let flushed = self.process(record, &mut report);
            if flushed {
                // Resume only once the triggered flush has settled.
                self.buffer.wait_idle().await;
            }
            self.drain(&mut bulk_events, &mut report);
            self.set_state(CursorState::Open);
        }

        self.set_state(CursorState::Closed);
        self.settle(&mut bulk_events, &mut report).await;

        metrics::record_sync_records(&self.index, "queued", report.queued);
        metrics::record_sync_records(&self.index, "filtered", report.filtered);
        metrics::record_sync_duration(&self.index, started.elapsed());

        let _timer = crate::time_operation!(&self.index, "refresh");
        match self.client.refresh(&self.index).await {
            Ok(response) => {
                metrics::record_operation(&self.index, "refresh", "success");
                info!(
                    queued = report.queued,
                    filtered = report.filtered,
                    batches = report.batches_sent,
                    batch_errors = report.batch_errors,
                    "Synchronization complete"
                );
                report.refresh = response;
                Ok(report)
            }
            Err(e) => {
                metrics::record_operation(&self.index, "refresh", "error");
                error!(error = %e, "Refresh after synchronization failed");
                Err(SyncError::Refresh(e))
            }
        }
    }

    /// Filter, serialize and push one record. Returns whether the push
    /// started a size-triggered flush.
    fn process(&self, record: Record, report: &mut SyncReport) -> bool {
        let accepted = self.filter.as_ref().map_or(true, |filter| filter(&record));
        if !accepted {
            report.filtered += 1;
            self.emit(SyncEvent::Filtered(record));
            return false;
        }

        let Some(id) = record.id_string() else {
            warn!("Record without an id skipped");
            report.skipped += 1;
            return false;
        };

        let body = serialize_record(&record, &self.mapping);
        let flushed = self.buffer.push_operation(BulkOperation::Index {
            meta: BulkMeta::new(self.index.clone(), self.doc_type.clone(), id),
            body,
        });
        report.queued += 1;
        self.emit(SyncEvent::Queued(record));
        flushed
    }

    /// Flush what is left, wait for in-flight submissions, collect events.
    async fn settle(&self, bulk_events: &mut mpsc::UnboundedReceiver<BulkEvent>, report: &mut SyncReport) {
        if self.buffer.filled() {
            self.buffer.flush();
        }
        self.buffer.wait_idle().await;
        self.drain(bulk_events, report);
    }

    fn drain(&self, bulk_events: &mut mpsc::UnboundedReceiver<BulkEvent>, report: &mut SyncReport) {
        while let Ok(event) = bulk_events.try_recv() {
            match event {
                BulkEvent::Sent { flush_id, count } => {
                    debug!(flush_id, slots = count, "Batch sent");
                    report.batches_sent += 1;
                    report.slots_sent += count;
                    self.emit(SyncEvent::BatchSent(count));
                }
                BulkEvent::Error { flush_id, error } => {
                    warn!(flush_id, error = %error, "Batch failed, continuing");
                    report.batch_errors += 1;
                    self.emit(SyncEvent::BatchError(error));
                }
            }
        }
    }

    fn emit(&self, event: SyncEvent) {
        if let Some(ref tx) = self.events {
            let _ = tx.send(event);
        }
    }

    fn set_state(&self, state: CursorState) {
        self.state.send_replace(state);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::{ClientError, InMemoryIndexClient};
    use crate::config::BulkConfig;
    use crate::mapping::{generate, EngineVersion};
    use crate::schema::{FieldKind, Schema};
    use crate::source::{CursorError, InMemoryRecordStore};
    use async_trait::async_trait;
    use serde_json::json;

    fn mapping() -> Arc<MappingNode> {
        let schema = Schema::builder()
            .field("name", FieldKind::String)
            .field("n", FieldKind::Number)
            .build();
        Arc::new(generate(&schema, EngineVersion::V7).unwrap())
    }

    fn store(n: u64) -> InMemoryRecordStore {
        (0..n)
            .map(|i| Record::with_id(format!("id{i}")).with("name", format!("r{i}")).with("n", i))
            .collect()
    }

    fn pipeline(client: &Arc<InMemoryIndexClient>, size: usize) -> SyncPipeline {
        let buffer = BulkBuffer::new(client.clone(), &BulkConfig { size, delay_ms: 1000, batch: 50 });
        SyncPipeline::new(client.clone(), buffer, "things", mapping())
    }

    async fn collect(mut rx: mpsc::UnboundedReceiver<SyncEvent>) -> Vec<SyncEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    #[tokio::test]
    async fn test_filtered_sync_flushes_by_size() {
        let client = Arc::new(InMemoryIndexClient::new());
        let (tx, rx) = mpsc::unbounded_channel();
        let filter: RecordFilter = Arc::new(|r: &Record| {
            r.get("n").and_then(|v| v.as_f64()).is_some_and(|n| n as u64 % 5 == 0)
        });
        let pipeline = pipeline(&client, 20).with_filter(Some(filter)).with_events(tx);

        let report = pipeline.run_source(&store(100), 50).await.unwrap();

        assert_eq!(report.queued, 20);
        assert_eq!(report.filtered, 80);
        assert_eq!(report.batches_sent, 2);
        assert_eq!(report.slots_sent, 40);
        assert_eq!(client.bulk_calls(), 2);
        assert_eq!(client.count("things"), 20);
        assert_eq!(client.document("things", "id5"), Some(json!({"name": "r5", "n": 5})));

        let events = collect(rx).await;
        let queued = events.iter().filter(|e| matches!(e, SyncEvent::Queued(_))).count();
        let filtered = events.iter().filter(|e| matches!(e, SyncEvent::Filtered(_))).count();
        let sent = events.iter().filter(|e| matches!(e, SyncEvent::BatchSent(20))).count();
        assert_eq!((queued, filtered, sent), (20, 80, 2));
    }

    #[tokio::test]
    async fn test_remaining_records_flushed_at_end() {
        let client = Arc::new(InMemoryIndexClient::new());
        let report = pipeline(&client, 1000).run_source(&store(7), 3).await.unwrap();

        assert_eq!(report.queued, 7);
        assert_eq!(report.batches_sent, 1);
        assert_eq!(client.bulk_calls(), 1);
        assert_eq!(client.count("things"), 7);
        assert_eq!(report.refresh["_shards"]["failed"], 0);
    }

    #[tokio::test]
    async fn test_empty_source_still_refreshes() {
        let client = Arc::new(InMemoryIndexClient::new());
        client.create_index("things", None).await.unwrap();

        let report = pipeline(&client, 10).run_source(&store(0), 10).await.unwrap();
        assert_eq!(report, SyncReport { refresh: report.refresh.clone(), ..SyncReport::default() });
        assert_eq!(client.refresh_calls(), 1);
        assert_eq!(client.bulk_calls(), 0);
    }

    #[tokio::test]
    async fn test_batch_errors_do_not_stop_the_run() {
        let client = Arc::new(InMemoryIndexClient::new());
        client.create_index("things", None).await.unwrap();
        client.set_fail_bulk(true);

        let report = pipeline(&client, 4).run_source(&store(5), 10).await.unwrap();
        assert_eq!(report.queued, 5);
        assert_eq!(report.batch_errors, 3);
        assert!(!report.is_success());
        assert_eq!(client.refresh_calls(), 1);
    }

    #[tokio::test]
    async fn test_refresh_failure_is_terminal() {
        // No index is ever created: the failing bulk calls never create one.
        let client = Arc::new(InMemoryIndexClient::new());
        client.set_fail_bulk(true);

        let err = pipeline(&client, 4).run_source(&store(2), 10).await.unwrap_err();
        assert!(matches!(err, SyncError::Refresh(ref e) if e.is_not_found()));
    }

    struct BrokenCursor {
        remaining: usize,
    }

    #[async_trait]
    impl RecordCursor for BrokenCursor {
        async fn next_record(&mut self) -> Result<Option<Record>, CursorError> {
            if self.remaining == 0 {
                return Err(CursorError::Backend("connection lost".into()));
            }
            self.remaining -= 1;
            Ok(Some(Record::with_id(format!("b{}", self.remaining)).with("name", "x")))
        }
    }

    #[tokio::test]
    async fn test_cursor_error_flushes_pending_without_refresh() {
        let client = Arc::new(InMemoryIndexClient::new());
        let pipeline = pipeline(&client, 100);

        let err = pipeline.run(Box::new(BrokenCursor { remaining: 3 })).await.unwrap_err();
        assert_eq!(
            err,
            SyncError::Cursor {
                source: CursorError::Backend("connection lost".into()),
                queued: 3
            }
        );
        assert_eq!(client.bulk_calls(), 1);
        assert_eq!(client.refresh_calls(), 0);
        assert_eq!(pipeline.state(), CursorState::Closed);
    }

    struct NoSource;

    #[async_trait]
    impl RecordSource for NoSource {
        async fn open_cursor(&self, _batch_size: usize) -> Result<Box<dyn RecordCursor>, CursorError> {
            Err(CursorError::Backend("unreachable".into()))
        }
    }

    #[tokio::test]
    async fn test_cursor_open_failure() {
        let client = Arc::new(InMemoryIndexClient::new());
        let err = pipeline(&client, 10).run_source(&NoSource, 10).await.unwrap_err();
        assert!(matches!(err, SyncError::CursorOpen(_)));
    }

    #[tokio::test]
    async fn test_records_without_id_are_skipped() {
        let client = Arc::new(InMemoryIndexClient::new());
        let source: InMemoryRecordStore =
            vec![Record::new().with("name", "anon"), Record::with_id("a").with("name", "x")]
                .into_iter()
                .collect();

        let report = pipeline(&client, 10).run_source(&source, 10).await.unwrap();
        assert_eq!((report.queued, report.skipped), (1, 1));
        assert_eq!(client.count("things"), 1);
    }

    #[tokio::test]
    async fn test_state_transitions_observed() {
        let client = Arc::new(InMemoryIndexClient::new());
        let pipeline = pipeline(&client, 10);
        let mut states = pipeline.state_receiver();
        assert_eq!(*states.borrow_and_update(), CursorState::Closed);

        pipeline.run_source(&store(1), 10).await.unwrap();
        assert!(states.has_changed().unwrap());
        assert_eq!(*states.borrow_and_update(), CursorState::Closed);
    }

    #[test]
    fn test_client_error_in_event_is_cloneable() {
        let event = SyncEvent::BatchError(ClientError::Transport("x".into()));
        assert_eq!(event.clone(), event);
    }
}
