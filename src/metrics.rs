// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Metrics instrumentation for index-sync.
//!
//! Uses the `metrics` crate for backend-agnostic metrics collection.
//! The host application is responsible for choosing the exporter (Prometheus, OTEL, etc.)
//!
//! # Metric Naming Convention
//! - `index_sync_` prefix for all metrics
//! - `_total` suffix for counters
//! - `_seconds` suffix for duration histograms
//!
//! # Labels
//! - `index`: target index name
//! - `operation`: bulk, refresh, create_index, put_mapping, index, update, delete
//! - `status`: success, error

use metrics::{counter, gauge, histogram};
use std::time::{Duration, Instant};

/// Record an index client call
pub fn record_operation(index: &str, operation: &str, status: &str) {
    counter!(
        "index_sync_operations_total",
        "index" => index.to_string(),
        "operation" => operation.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
}

/// Record index client call latency
pub fn record_latency(index: &str, operation: &str, duration: Duration) {
    histogram!(
        "index_sync_operation_seconds",
        "index" => index.to_string(),
        "operation" => operation.to_string()
    )
    .record(duration.as_secs_f64());
}

/// Record mapping cache hit/miss
pub fn record_mapping_cache(hit: bool) {
    let outcome = if hit { "hit" } else { "miss" };
    counter!(
        "index_sync_mapping_cache_total",
        "outcome" => outcome
    )
    .increment(1);
}

/// Set number of cached mappings
pub fn set_mapping_cache_entries(entries: usize) {
    gauge!("index_sync_mapping_cache_entries").set(entries as f64);
}

/// Record a value function that failed during serialization
pub fn record_value_error(field: &str) {
    counter!(
        "index_sync_value_errors_total",
        "field" => field.to_string()
    )
    .increment(1);
}

/// Set current number of buffered bulk slots
pub fn set_bulk_pending_slots(slots: usize) {
    gauge!("index_sync_bulk_pending_slots").set(slots as f64);
}

/// Set the number of bulk submissions in flight
pub fn set_bulk_in_flight(in_flight: usize) {
    gauge!("index_sync_bulk_in_flight").set(in_flight as f64);
}

/// Record a bulk flush and its size in slots
pub fn record_bulk_flush(reason: &str, slots: usize) {
    counter!(
        "index_sync_bulk_flushes_total",
        "reason" => reason.to_string()
    )
    .increment(1);
    histogram!("index_sync_bulk_flush_slots").record(slots as f64);
}

/// Record the outcome of a bulk submission
pub fn record_bulk_result(success: bool) {
    let status = if success { "success" } else { "error" };
    counter!(
        "index_sync_bulk_results_total",
        "status" => status
    )
    .increment(1);
}

/// Record records seen by a synchronization run
pub fn record_sync_records(index: &str, outcome: &str, count: usize) {
    counter!(
        "index_sync_records_total",
        "index" => index.to_string(),
        "outcome" => outcome.to_string()
    )
    .increment(count as u64);
}

/// Record a full synchronization run duration
pub fn record_sync_duration(index: &str, duration: Duration) {
    histogram!(
        "index_sync_sync_seconds",
        "index" => index.to_string()
    )
    .record(duration.as_secs_f64());
}

/// Record a retried call
pub fn record_retry(operation: &str) {
    counter!(
        "index_sync_retries_total",
        "operation" => operation.to_string()
    )
    .increment(1);
}

/// A timing guard that records latency on drop
pub struct LatencyTimer {
    index: String,
    operation: &'static str,
    start: Instant,
}

impl LatencyTimer {
    /// Start a new latency timer
    pub fn new(index: &str, operation: &'static str) -> Self {
        Self {
            index: index.to_string(),
            operation,
            start: Instant::now(),
        }
    }
}

impl Drop for LatencyTimer {
    fn drop(&mut self) {
        record_latency(&self.index, self.operation, self.start.elapsed());
    }
}

/// Convenience macro for timing operations
#[macro_export]
macro_rules! time_operation {
    ($index:expr, $op:expr) => {
        $crate::metrics::LatencyTimer::new($index, $op)
    };
}
