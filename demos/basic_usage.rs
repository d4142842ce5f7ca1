// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Basic index-sync usage example.
//!
//! Demonstrates:
//! 1. Declaring a schema with index options and a computed field
//! 2. Creating the index mapping
//! 3. Writing, updating and removing single documents
//! 4. Synchronizing a whole collection through the bulk buffer
//! 5. Displaying metrics
//!
//! Runs entirely against the in-memory index engine and record store.
//!
//! # Run
//!
//! ```bash
//! cargo run --example basic_usage
//! ```

use std::sync::Arc;

use index_sync::schema::ShapeField;
use index_sync::{
    BulkConfig, EngineVersion, FieldKind, FieldOptions, InMemoryIndexClient, InMemoryRecordStore,
    IndexMode, IndexModel, IndexSyncConfig, Record, RecordValue, Schema, SyncEvent, ValueSource,
};
use metrics_util::debugging::{DebugValue, DebuggingRecorder, Snapshotter};
use serde_json::json;
use tokio::sync::mpsc;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let recorder = DebuggingRecorder::new();
    let snapshotter = recorder.snapshotter();
    recorder.install().expect("failed to install metrics recorder");

    tracing_subscriber::fmt()
        .with_target(false)
        .compact()
        .init();

    println!("\n╔═══════════════════════════════════════════════════════════════╗");
    println!("║             index-sync: Basic Usage Example                   ║");
    println!("╚═══════════════════════════════════════════════════════════════╝\n");

    // ─────────────────────────────────────────────────────────────────────────
    // 1. Schema and model
    // ─────────────────────────────────────────────────────────────────────────
    println!("📐 Declaring the Book schema...");

    let author = Schema::builder()
        .field("name", FieldKind::String)
        .field("born", FieldKind::Date)
        .without_id()
        .version_key(None)
        .build();

    let schema = Schema::builder()
        .field_with("title", FieldKind::String, FieldOptions::new().option("es_boost", 2.0))
        .field("pages", FieldKind::Number)
        .field("tags", FieldKind::array(FieldKind::String))
        .field("author", FieldKind::Embedded(author))
        .extend(
            "summary",
            ShapeField::typed("keyword").value(ValueSource::from_document(|book| {
                let title = book.get("title").and_then(RecordValue::as_str).unwrap_or("?");
                let pages = book.get("pages").and_then(RecordValue::as_f64).unwrap_or(0.0);
                Ok(Some(json!(format!("{title} ({pages} pages)"))))
            })),
        )
        .build();

    let client = Arc::new(InMemoryIndexClient::new());
    let books = IndexModel::builder(client.clone(), schema)
        .config(IndexSyncConfig {
            engine_version: EngineVersion::V7,
            bulk: Some(BulkConfig::for_operations(4)),
            ..Default::default()
        })
        .model_name("Book")
        .collection("books")
        .filter(Arc::new(|book: &Record| {
            book.get("pages").and_then(RecordValue::as_f64).is_some_and(|p| p >= 100.0)
        }))
        .build()?;

    println!("   └─ index: {}, type: {}", books.index(), books.doc_type());

    // ─────────────────────────────────────────────────────────────────────────
    // 2. Mapping
    // ─────────────────────────────────────────────────────────────────────────
    println!("\n🗺️  Creating mapping...");
    books.create_mapping(None).await?;
    let mapping = client.mapping("books").unwrap_or_default();
    println!("{}", serde_json::to_string_pretty(&mapping)?);

    // ─────────────────────────────────────────────────────────────────────────
    // 3. Bulk synchronization
    // ─────────────────────────────────────────────────────────────────────────
    println!("\n📚 Synchronizing 12 books (filter: at least 100 pages)...");
    let store: InMemoryRecordStore = (1..=12u64)
        .map(|i| {
            Record::with_id(format!("book-{i}"))
                .with("title", format!("Volume {i}"))
                .with("pages", i * 30)
                .with("tags", vec!["fiction", "series"])
        })
        .collect();

    let (tx, mut rx) = mpsc::unbounded_channel();
    let report = books.synchronize_with_events(&store, tx).await?;

    while let Ok(event) = rx.try_recv() {
        match event {
            SyncEvent::Queued(record) => println!("   └─ queued   {}", record.id_string().unwrap_or_default()),
            SyncEvent::Filtered(record) => println!("   └─ filtered {}", record.id_string().unwrap_or_default()),
            SyncEvent::BatchSent(slots) => println!("   ✅ batch sent ({slots} slots)"),
            SyncEvent::BatchError(e) => println!("   ⚠️  batch failed: {e}"),
        }
    }
    println!(
        "   ⚡ queued {}, filtered {}, batches {}, errors {}",
        report.queued, report.filtered, report.batches_sent, report.batch_errors
    );
    println!("   └─ indexed documents: {}", client.count("books"));

    // ─────────────────────────────────────────────────────────────────────────
    // 4. Single-document writes
    // ─────────────────────────────────────────────────────────────────────────
    println!("\n✏️  Single-document writes (bulk mode queues them)...");
    let extra = Record::with_id("book-99").with("title", "Appendix").with("pages", 120);
    let outcome = books.index_document(&extra, IndexMode::Index).await?;
    println!("   └─ index book-99: {outcome:?}");
    let outcome = books.remove_document("book-4").await?;
    println!("   └─ remove book-4: {outcome:?}");

    if let Some(buffer) = books.bulk_buffer() {
        buffer.flush();
        buffer.wait_idle().await;
    }
    books.refresh().await?;
    println!("   └─ indexed documents after refresh: {}", client.count("books"));
    if let Some(doc) = client.document("books", "book-99") {
        println!("   └─ book-99 → {doc}");
    }

    // ─────────────────────────────────────────────────────────────────────────
    // 5. Metrics
    // ─────────────────────────────────────────────────────────────────────────
    println!("\n📈 Raw Metrics:");
    dump_metrics(&snapshotter);

    println!("\n╔═══════════════════════════════════════════════════════════════╗");
    println!("║                    Example complete!                          ║");
    println!("╚═══════════════════════════════════════════════════════════════╝\n");

    Ok(())
}

/// Dump all captured metrics, sorted by name
fn dump_metrics(snapshotter: &Snapshotter) {
    let snapshot = snapshotter.snapshot();

    let mut counters: Vec<_> = vec![];
    let mut gauges: Vec<_> = vec![];
    let mut histograms: Vec<_> = vec![];

    for (composite_key, _, _, value) in snapshot.into_vec() {
        let (_kind, key) = composite_key.into_parts();
        let name = key.name().to_string();
        let labels: Vec<_> = key.labels().map(|l| format!("{}={}", l.key(), l.value())).collect();
        let label_str = if labels.is_empty() { String::new() } else { format!("{{{}}}", labels.join(",")) };

        match value {
            DebugValue::Counter(v) => counters.push((name, label_str, v)),
            DebugValue::Gauge(v) => gauges.push((name, label_str, v.into_inner())),
            DebugValue::Histogram(samples) => {
                let count = samples.len();
                let sum: f64 = samples.iter().map(|v| v.into_inner()).sum();
                histograms.push((name, label_str, count, sum));
            }
        }
    }

    counters.sort_by(|a, b| a.0.cmp(&b.0));
    gauges.sort_by(|a, b| a.0.cmp(&b.0));
    histograms.sort_by(|a, b| a.0.cmp(&b.0));

    if !counters.is_empty() {
        println!("   ┌─ Counters (cumulative)");
        for (name, labels, value) in &counters {
            println!("   │  └─ {}{} = {}", name, labels, value);
        }
    }
    if !gauges.is_empty() {
        println!("   ├─ Gauges (current value)");
        for (name, labels, value) in &gauges {
            println!("   │  └─ {}{} = {:.2}", name, labels, value);
        }
    }
    if !histograms.is_empty() {
        println!("   └─ Histograms");
        for (name, labels, count, sum) in &histograms {
            println!("      └─ {}{} count={} sum={:.6}", name, labels, count, sum);
        }
    }
}
