// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Size- and idle-time-triggered bulk buffer.
//!
//! The [`BulkBuffer`] accumulates bulk request slots and submits them as one
//! request when either threshold is hit:
//!
//! - **Size**: the slot count reaches `BulkConfig::size` during a push.
//! - **Idle timer**: no push arrived for `BulkConfig::delay`. Every push below
//!   the threshold restarts the timer.
//!
//! A flush swaps the slot vector out and queues the snapshot for a single
//! submitter task, so pushes never wait for the network and batches reach the
//! engine in flush order. Completion is reported to every subscriber as a
//! [`BulkEvent`], and [`BulkBuffer::wait_idle`] resolves once no submission
//! is in flight.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use index_sync::{BulkBuffer, BulkConfig, BulkEvent, InMemoryIndexClient};
//! use serde_json::json;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let client = Arc::new(InMemoryIndexClient::new());
//! let buffer = BulkBuffer::new(client.clone(), &BulkConfig { size: 2, ..Default::default() });
//! let mut events = buffer.subscribe();
//!
//! let full = buffer.push([
//!     json!({"index": {"_index": "users", "_id": "1"}}),
//!     json!({"name": "John"}),
//! ]);
//! assert!(full);
//!
//! buffer.wait_idle().await;
//! assert!(matches!(events.try_recv(), Ok(BulkEvent::Sent { count: 2, .. })));
//! # }
//! ```

use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::operation::BulkOperation;
use crate::client::{ClientError, IndexClient};
use crate::config::BulkConfig;
use crate::metrics;

/// Flush trigger reason
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushReason {
    /// Slot threshold reached on push
    Size,
    /// Idle delay elapsed
    Timer,
    /// Explicit `flush()` call
    Manual,
}

impl FlushReason {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Size => "size",
            Self::Timer => "timer",
            Self::Manual => "manual",
        }
    }
}

/// Completion of one flush.
#[derive(Debug, Clone, PartialEq)]
pub enum BulkEvent {
    /// Submission accepted; `count` is in slots
    Sent { flush_id: u64, count: usize },
    Error { flush_id: u64, error: ClientError },
}

impl BulkEvent {
    #[must_use]
    pub fn flush_id(&self) -> u64 {
        match self {
            Self::Sent { flush_id, .. } | Self::Error { flush_id, .. } => *flush_id,
        }
    }
}

#[derive(Default)]
struct BufferState {
    slots: Vec<Value>,
    timer: Option<JoinHandle<()>>,
    /// Bumped on every (re)schedule and flush; stale timers compare and bail
    timer_generation: u64,
    next_flush_id: u64,
    /// Started on the first flush
    submitter: Option<mpsc::UnboundedSender<Submission>>,
}

/// A flushed snapshot waiting for the submitter.
struct Submission {
    flush_id: u64,
    batch: Vec<Value>,
}

/// Submission side, owned jointly by the buffer and its submitter task.
struct Dispatch {
    client: Arc<dyn IndexClient>,
    in_flight: watch::Sender<usize>,
    subscribers: Mutex<Vec<mpsc::UnboundedSender<BulkEvent>>>,
}

impl Dispatch {
    fn emit(&self, event: BulkEvent) {
        self.subscribers.lock().retain(|tx| tx.send(event.clone()).is_ok());
    }

    async fn submit(&self, Submission { flush_id, batch }: Submission) {
        let count = batch.len();
        let start = Instant::now();
        let event = match self.client.bulk(batch).await {
            Ok(response) => {
                if response.get("errors").and_then(Value::as_bool).unwrap_or(false) {
                    debug!(flush_id, "Bulk response reported item errors");
                }
                metrics::record_bulk_result(true);
                BulkEvent::Sent { flush_id, count }
            }
            Err(error) => {
                warn!(flush_id, slots = count, error = %error, "Bulk submission failed");
                metrics::record_bulk_result(false);
                BulkEvent::Error { flush_id, error }
            }
        };
        metrics::record_latency("_bulk", "bulk", start.elapsed());
        self.emit(event);
        self.in_flight.send_modify(|n| {
            *n = n.saturating_sub(1);
            metrics::set_bulk_in_flight(*n);
        });
    }

    /// Spawn the task that submits queued snapshots one at a time, in order.
    ///
    /// The task ends once every sender is dropped and the queue is drained.
    fn spawn_submitter(self: &Arc<Self>) -> mpsc::UnboundedSender<Submission> {
        let (tx, mut rx) = mpsc::unbounded_channel::<Submission>();
        let dispatch = Arc::clone(self);
        tokio::spawn(async move {
            while let Some(submission) = rx.recv().await {
                dispatch.submit(submission).await;
            }
        });
        tx
    }
}

struct Inner {
    size: usize,
    delay: Duration,
    state: Mutex<BufferState>,
    dispatch: Arc<Dispatch>,
}

/// Shared bulk buffer. Clones share the same slots and in-flight state.
///
/// Must be used from within a Tokio runtime: flushes and timers are spawned.
#[derive(Clone)]
pub struct BulkBuffer {
    inner: Arc<Inner>,
}

impl BulkBuffer {
    pub fn new(client: Arc<dyn IndexClient>, config: &BulkConfig) -> Self {
        let (in_flight, _) = watch::channel(0);
        Self {
            inner: Arc::new(Inner {
                size: config.size.max(1),
                delay: config.delay(),
                state: Mutex::new(BufferState::default()),
                dispatch: Arc::new(Dispatch {
                    client,
                    in_flight,
                    subscribers: Mutex::new(Vec::new()),
                }),
            }),
        }
    }

    /// Receive every future flush completion.
    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<BulkEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.inner.dispatch.subscribers.lock().push(tx);
        rx
    }

    /// Append raw slots.
    ///
    /// Returns `true` when the push reached the size threshold and a flush was
    /// started; otherwise the idle timer is (re)scheduled.
    pub fn push<I>(&self, slots: I) -> bool
    where
        I: IntoIterator<Item = Value>,
    {
        let mut state = self.inner.state.lock();
        state.slots.extend(slots);
        metrics::set_bulk_pending_slots(state.slots.len());

        if state.slots.len() >= self.inner.size {
            self.flush_locked(&mut state, FlushReason::Size);
            true
        } else {
            self.schedule_timer(&mut state);
            false
        }
    }

    /// Append one operation's slots.
    pub fn push_operation(&self, operation: BulkOperation) -> bool {
        self.push(operation.into_slots())
    }

    /// Submit everything buffered. No-op on an empty buffer.
    ///
    /// Returns the id of the started flush.
    pub fn flush(&self) -> Option<u64> {
        let mut state = self.inner.state.lock();
        self.flush_locked(&mut state, FlushReason::Manual)
    }

    /// Whether slots are waiting to be flushed.
    #[must_use]
    pub fn filled(&self) -> bool {
        !self.inner.state.lock().slots.is_empty()
    }

    /// Buffered slot count.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.state.lock().slots.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        !self.filled()
    }

    /// Whether a submission is in flight.
    #[must_use]
    pub fn is_flushing(&self) -> bool {
        *self.inner.dispatch.in_flight.borrow() > 0
    }

    /// Resolve once no submission is in flight.
    ///
    /// Completion events are emitted before a submission stops counting as in
    /// flight, so they are already queued for subscribers when this returns.
    pub async fn wait_idle(&self) {
        let mut rx = self.inner.dispatch.in_flight.subscribe();
        // The sender lives as long as `self`; this cannot fail.
        let _ = rx.wait_for(|in_flight| *in_flight == 0).await;
    }

    fn schedule_timer(&self, state: &mut BufferState) {
        if let Some(timer) = state.timer.take() {
            timer.abort();
        }
        state.timer_generation += 1;

        let generation = state.timer_generation;
        let delay = self.inner.delay;
        let weak: Weak<Inner> = Arc::downgrade(&self.inner);
        state.timer = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let Some(inner) = weak.upgrade() else { return };
            let buffer = BulkBuffer { inner };
            let mut state = buffer.inner.state.lock();
            if state.timer_generation != generation {
                return;
            }
            // Detach our own handle rather than aborting the running task.
            state.timer = None;
            buffer.flush_locked(&mut state, FlushReason::Timer);
        }));
    }

    fn flush_locked(&self, state: &mut BufferState, reason: FlushReason) -> Option<u64> {
        if state.slots.is_empty() {
            return None;
        }
        if let Some(timer) = state.timer.take() {
            timer.abort();
        }
        state.timer_generation += 1;

        let batch = std::mem::take(&mut state.slots);
        let flush_id = state.next_flush_id;
        state.next_flush_id += 1;
        let count = batch.len();

        self.inner.dispatch.in_flight.send_modify(|n| {
            *n += 1;
            metrics::set_bulk_in_flight(*n);
        });
        metrics::set_bulk_pending_slots(0);
        metrics::record_bulk_flush(reason.as_str(), count);
        debug!(flush_id, slots = count, reason = reason.as_str(), "Flushing bulk buffer");

        // Queued under the state lock, so submission order is flush order.
        let submission = Submission { flush_id, batch };
        let dispatch = &self.inner.dispatch;
        let submitter = state.submitter.get_or_insert_with(|| dispatch.spawn_submitter());
        if let Err(mpsc::error::SendError(submission)) = submitter.send(submission) {
            // The submitter died with its runtime; start a fresh one.
            let fresh = dispatch.spawn_submitter();
            let _ = fresh.send(submission);
            state.submitter = Some(fresh);
        }

        Some(flush_id)
    }
}

impl std::fmt::Debug for BulkBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BulkBuffer")
            .field("size", &self.inner.size)
            .field("delay", &self.inner.delay)
            .field("slots", &self.len())
            .field("in_flight", &*self.inner.dispatch.in_flight.borrow())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::batching::BulkMeta;
    use crate::client::InMemoryIndexClient;
    use async_trait::async_trait;
    use serde_json::json;

    fn index_op(id: usize) -> BulkOperation {
        BulkOperation::Index {
            meta: BulkMeta::new("users", None, id.to_string()),
            body: json!({ "n": id }),
        }
    }

    fn config(size: usize, delay_ms: u64) -> BulkConfig {
        BulkConfig { size, delay_ms, batch: 50 }
    }

    /// Client whose bulk call takes a while.
    struct SlowClient {
        inner: InMemoryIndexClient,
        latency: Duration,
    }

    #[async_trait]
    impl IndexClient for SlowClient {
        async fn bulk(&self, body: Vec<Value>) -> Result<Value, ClientError> {
            tokio::time::sleep(self.latency).await;
            self.inner.bulk(body).await
        }
        async fn refresh(&self, index: &str) -> Result<Value, ClientError> {
            self.inner.refresh(index).await
        }
        async fn index_exists(&self, index: &str) -> Result<bool, ClientError> {
            self.inner.index_exists(index).await
        }
        async fn create_index(&self, index: &str, settings: Option<&Value>) -> Result<Value, ClientError> {
            self.inner.create_index(index, settings).await
        }
        async fn put_mapping(
            &self,
            index: &str,
            doc_type: Option<&str>,
            mapping: &Value,
            include_type_name: bool,
        ) -> Result<Value, ClientError> {
            self.inner.put_mapping(index, doc_type, mapping, include_type_name).await
        }
        async fn index(&self, index: &str, doc_type: Option<&str>, id: &str, body: &Value) -> Result<Value, ClientError> {
            self.inner.index(index, doc_type, id, body).await
        }
        async fn update(&self, index: &str, doc_type: Option<&str>, id: &str, body: &Value) -> Result<Value, ClientError> {
            self.inner.update(index, doc_type, id, body).await
        }
        async fn delete(&self, index: &str, doc_type: Option<&str>, id: &str) -> Result<Value, ClientError> {
            self.inner.delete(index, doc_type, id).await
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_push_to_threshold_flushes_immediately() {
        let client = Arc::new(InMemoryIndexClient::new());
        let buffer = BulkBuffer::new(client.clone(), &config(4, 1000));
        let mut events = buffer.subscribe();

        assert!(!buffer.push_operation(index_op(1)));
        assert!(buffer.push_operation(index_op(2)));
        assert!(!buffer.filled());

        buffer.wait_idle().await;
        assert_eq!(client.bulk_calls(), 1);
        assert_eq!(events.try_recv().unwrap(), BulkEvent::Sent { flush_id: 0, count: 4 });
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_timer_flushes_after_delay() {
        let client = Arc::new(InMemoryIndexClient::new());
        let buffer = BulkBuffer::new(client.clone(), &config(100, 1000));

        assert!(!buffer.push_operation(index_op(1)));
        tokio::time::sleep(Duration::from_millis(999)).await;
        assert_eq!(client.bulk_calls(), 0);
        assert!(buffer.filled());

        tokio::time::sleep(Duration::from_millis(2)).await;
        buffer.wait_idle().await;
        assert_eq!(client.bulk_calls(), 1);
        assert!(!buffer.filled());
    }

    #[tokio::test(start_paused = true)]
    async fn test_each_push_restarts_timer() {
        let client = Arc::new(InMemoryIndexClient::new());
        let buffer = BulkBuffer::new(client.clone(), &config(100, 1000));

        buffer.push_operation(index_op(1));
        tokio::time::sleep(Duration::from_millis(600)).await;
        buffer.push_operation(index_op(2));
        tokio::time::sleep(Duration::from_millis(600)).await;
        assert_eq!(client.bulk_calls(), 0);

        tokio::time::sleep(Duration::from_millis(500)).await;
        buffer.wait_idle().await;
        assert_eq!(client.bulk_calls(), 1);
        assert_eq!(client.bulk_bodies()[0].len(), 4);
    }

    #[tokio::test]
    async fn test_flush_on_empty_is_noop() {
        let client = Arc::new(InMemoryIndexClient::new());
        let buffer = BulkBuffer::new(client.clone(), &config(10, 1000));
        assert_eq!(buffer.flush(), None);
        assert!(!buffer.is_flushing());
        buffer.wait_idle().await;
        assert_eq!(client.bulk_calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_pushes_during_flush_go_to_new_buffer() {
        let client = Arc::new(SlowClient {
            inner: InMemoryIndexClient::new(),
            latency: Duration::from_millis(100),
        });
        let buffer = BulkBuffer::new(client.clone(), &config(2, 10_000));

        assert!(buffer.push_operation(index_op(1)));
        assert!(buffer.is_flushing());
        assert!(!buffer.push(vec![json!({"delete": {"_index": "users", "_id": "9"}})]));
        assert_eq!(buffer.len(), 1);

        buffer.wait_idle().await;
        assert_eq!(client.inner.bulk_calls(), 1);
        assert!(buffer.filled());
        assert!(!buffer.is_flushing());
    }

    #[tokio::test]
    async fn test_failed_submission_emits_error() {
        let client = Arc::new(InMemoryIndexClient::new());
        client.set_fail_bulk(true);
        let buffer = BulkBuffer::new(client.clone(), &config(10, 1000));
        let mut events = buffer.subscribe();

        buffer.push_operation(index_op(1));
        assert_eq!(buffer.flush(), Some(0));
        buffer.wait_idle().await;

        match events.try_recv().unwrap() {
            BulkEvent::Error { flush_id, error } => {
                assert_eq!(flush_id, 0);
                assert!(matches!(error, ClientError::Transport(_)));
            }
            other => panic!("expected error event, got {other:?}"),
        }
        assert!(buffer.is_empty());
    }

    #[tokio::test]
    async fn test_flush_ids_increase() {
        let client = Arc::new(InMemoryIndexClient::new());
        let buffer = BulkBuffer::new(client, &config(10, 1000));
        let mut events = buffer.subscribe();

        buffer.push_operation(index_op(1));
        buffer.flush();
        buffer.push_operation(index_op(2));
        buffer.flush();
        buffer.wait_idle().await;

        let ids = vec![events.try_recv().unwrap().flush_id(), events.try_recv().unwrap().flush_id()];
        assert_eq!(ids, vec![0, 1]);
    }

    #[tokio::test]
    async fn test_dropped_subscriber_is_pruned() {
        let client = Arc::new(InMemoryIndexClient::new());
        let buffer = BulkBuffer::new(client, &config(10, 1000));
        drop(buffer.subscribe());
        let mut live = buffer.subscribe();

        buffer.push_operation(index_op(1));
        buffer.flush();
        buffer.wait_idle().await;
        assert!(live.try_recv().is_ok());
        assert_eq!(buffer.inner.dispatch.subscribers.lock().len(), 1);
    }

    fn submitted_ids(client: &InMemoryIndexClient) -> Vec<String> {
        client
            .bulk_bodies()
            .iter()
            .map(|body| body[0]["index"]["_id"].as_str().unwrap_or_default().to_string())
            .collect()
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_batches_submitted_in_flush_order() {
        for _ in 0..20 {
            let client = Arc::new(InMemoryIndexClient::new());
            let buffer = BulkBuffer::new(client.clone(), &config(100, 10_000));
            let mut events = buffer.subscribe();

            for i in 0..20 {
                buffer.push_operation(index_op(i));
                assert_eq!(buffer.flush(), Some(i as u64));
            }
            buffer.wait_idle().await;

            let expected: Vec<String> = (0..20).map(|i| i.to_string()).collect();
            assert_eq!(submitted_ids(&client), expected);
            let flush_ids: Vec<u64> = std::iter::from_fn(|| events.try_recv().ok()).map(|e| e.flush_id()).collect();
            assert_eq!(flush_ids, (0..20).collect::<Vec<u64>>());
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_slow_submission_does_not_reorder_later_flushes() {
        let client = Arc::new(SlowClient {
            inner: InMemoryIndexClient::new(),
            latency: Duration::from_millis(5),
        });
        let buffer = BulkBuffer::new(client.clone(), &config(100, 10_000));

        for i in 0..5 {
            buffer.push_operation(index_op(i));
            buffer.flush();
        }
        assert!(buffer.is_flushing());
        buffer.wait_idle().await;

        assert_eq!(submitted_ids(&client.inner), vec!["0", "1", "2", "3", "4"]);
    }
}
