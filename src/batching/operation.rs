// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Bulk request entries.
//!
//! The bulk wire format is a flat sequence of slots. Index and update
//! operations occupy two (header, body), deletes one:
//!
//! ```text
//! { "index":  { "_index": "users", "_type": "user", "_id": "1" } }
//! { "name": "John" }
//! { "update": { "_index": "users", "_id": "2" } }
//! { "doc": { "age": 36 } }
//! { "delete": { "_index": "users", "_id": "3" } }
//! ```

use serde_json::{json, Map, Value};

/// Target of one bulk operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BulkMeta {
    pub index: String,
    /// Omitted from the header when `None`
    pub doc_type: Option<String>,
    pub id: String,
}

impl BulkMeta {
    pub fn new(index: impl Into<String>, doc_type: Option<String>, id: impl Into<String>) -> Self {
        Self {
            index: index.into(),
            doc_type,
            id: id.into(),
        }
    }

    fn to_json(&self) -> Value {
        let mut meta = Map::new();
        meta.insert("_index".into(), Value::String(self.index.clone()));
        if let Some(ref doc_type) = self.doc_type {
            meta.insert("_type".into(), Value::String(doc_type.clone()));
        }
        meta.insert("_id".into(), Value::String(self.id.clone()));
        Value::Object(meta)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum BulkOperation {
    Index { meta: BulkMeta, body: Value },
    /// Partial update; `doc` is wrapped as `{"doc": ...}`
    Update { meta: BulkMeta, doc: Value },
    Delete { meta: BulkMeta },
}

impl BulkOperation {
    #[must_use]
    pub fn action(&self) -> &'static str {
        match self {
            Self::Index { .. } => "index",
            Self::Update { .. } => "update",
            Self::Delete { .. } => "delete",
        }
    }

    #[must_use]
    pub fn meta(&self) -> &BulkMeta {
        match self {
            Self::Index { meta, .. } | Self::Update { meta, .. } | Self::Delete { meta } => meta,
        }
    }

    /// Number of request slots this operation occupies.
    #[must_use]
    pub fn slot_count(&self) -> usize {
        match self {
            Self::Index { .. } | Self::Update { .. } => 2,
            Self::Delete { .. } => 1,
        }
    }

    #[must_use]
    pub fn into_slots(self) -> Vec<Value> {
        let header = json!({ self.action(): self.meta().to_json() });
        match self {
            Self::Index { body, .. } => vec![header, body],
            Self::Update { doc, .. } => vec![header, json!({ "doc": doc })],
            Self::Delete { .. } => vec![header],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_index_slots() {
        let op = BulkOperation::Index {
            meta: BulkMeta::new("users", Some("user".into()), "1"),
            body: json!({"name": "John"}),
        };
        assert_eq!(op.slot_count(), 2);
        assert_eq!(
            op.into_slots(),
            vec![
                json!({"index": {"_index": "users", "_type": "user", "_id": "1"}}),
                json!({"name": "John"}),
            ]
        );
    }

    #[test]
    fn test_update_wraps_doc() {
        let op = BulkOperation::Update {
            meta: BulkMeta::new("users", None, "2"),
            doc: json!({"age": 36}),
        };
        let slots = op.into_slots();
        assert_eq!(slots[0], json!({"update": {"_index": "users", "_id": "2"}}));
        assert_eq!(slots[1], json!({"doc": {"age": 36}}));
    }

    #[test]
    fn test_delete_is_one_slot() {
        let op = BulkOperation::Delete { meta: BulkMeta::new("users", None, "3") };
        assert_eq!(op.slot_count(), 1);
        assert_eq!(op.into_slots(), vec![json!({"delete": {"_index": "users", "_id": "3"}})]);
    }

    #[test]
    fn test_header_omits_missing_type() {
        let header = BulkMeta::new("users", None, "1").to_json();
        assert!(header.get("_type").is_none());
    }
}
