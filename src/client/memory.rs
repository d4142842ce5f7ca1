// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use indexmap::IndexMap;
use parking_lot::Mutex;
use serde_json::{json, Map, Value};

use super::traits::{ClientError, IndexClient};

#[derive(Debug, Default)]
struct IndexState {
    settings: Option<Value>,
    mapping: Option<Value>,
    /// Searchable documents
    visible: IndexMap<String, Value>,
    /// Writes not yet refreshed; `None` is a pending delete
    pending: IndexMap<String, Option<Value>>,
}

impl IndexState {
    /// Latest state of a document, refreshed or not.
    fn current(&self, id: &str) -> Option<Value> {
        match self.pending.get(id) {
            Some(pending) => pending.clone(),
            None => self.visible.get(id).cloned(),
        }
    }

    fn refresh(&mut self) {
        for (id, write) in self.pending.drain(..) {
            match write {
                Some(doc) => {
                    self.visible.insert(id, doc);
                }
                None => {
                    self.visible.shift_remove(&id);
                }
            }
        }
    }

    fn apply_update(&mut self, id: &str, body: &Value) -> Result<Value, ClientError> {
        let Some(Value::Object(mut doc)) = self.current(id) else {
            return Err(ClientError::NotFound(format!("document {id}")));
        };

        if let Some(Value::Object(partial)) = body.get("doc") {
            for (key, value) in partial {
                doc.insert(key.clone(), value.clone());
            }
        } else if let Some(Value::String(script)) = body.get("script") {
            for field in removed_fields(script) {
                doc.remove(&field);
            }
        } else {
            return Err(ClientError::Status {
                code: 400,
                message: "update body needs 'doc' or 'script'".into(),
            });
        }

        self.pending.insert(id.to_string(), Some(Value::Object(doc)));
        Ok(json!({ "_id": id, "result": "updated" }))
    }
}

/// Field names from `ctx._source.remove("a");ctx._source.remove("b")`.
fn removed_fields(script: &str) -> Vec<String> {
    script
        .split(';')
        .filter_map(|stmt| {
            let inner = stmt.trim().strip_prefix("ctx._source.remove(")?.strip_suffix(')')?;
            Some(inner.trim_matches(|c| c == '"' || c == '\'').to_string())
        })
        .collect()
}

/// In-memory index engine.
///
/// Writes land in a pending set and only become visible to
/// [`Self::document`] / [`Self::documents`] after `refresh`, like a real
/// engine's refresh interval.
#[derive(Debug, Default)]
pub struct InMemoryIndexClient {
    indices: DashMap<String, IndexState>,
    bulk_bodies: Mutex<Vec<Vec<Value>>>,
    refresh_calls: AtomicUsize,
    fail_bulk: AtomicBool,
}

impl InMemoryIndexClient {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent bulk call fail with a transport error.
    pub fn set_fail_bulk(&self, fail: bool) {
        self.fail_bulk.store(fail, Ordering::SeqCst);
    }

    /// Number of bulk requests received (failed ones included).
    #[must_use]
    pub fn bulk_calls(&self) -> usize {
        self.bulk_bodies.lock().len()
    }

    /// Every bulk body received, in order.
    #[must_use]
    pub fn bulk_bodies(&self) -> Vec<Vec<Value>> {
        self.bulk_bodies.lock().clone()
    }

    #[must_use]
    pub fn refresh_calls(&self) -> usize {
        self.refresh_calls.load(Ordering::SeqCst)
    }

    /// A refreshed document.
    #[must_use]
    pub fn document(&self, index: &str, id: &str) -> Option<Value> {
        self.indices.get(index)?.visible.get(id).cloned()
    }

    /// All refreshed documents of an index, in write order.
    #[must_use]
    pub fn documents(&self, index: &str) -> Vec<(String, Value)> {
        self.indices
            .get(index)
            .map(|state| state.visible.iter().map(|(id, doc)| (id.clone(), doc.clone())).collect())
            .unwrap_or_default()
    }

    /// Number of refreshed documents.
    #[must_use]
    pub fn count(&self, index: &str) -> usize {
        self.indices.get(index).map_or(0, |state| state.visible.len())
    }

    /// Number of writes waiting for a refresh.
    #[must_use]
    pub fn pending_count(&self, index: &str) -> usize {
        self.indices.get(index).map_or(0, |state| state.pending.len())
    }

    #[must_use]
    pub fn mapping(&self, index: &str) -> Option<Value> {
        self.indices.get(index)?.mapping.clone()
    }

    #[must_use]
    pub fn settings(&self, index: &str) -> Option<Value> {
        self.indices.get(index)?.settings.clone()
    }

    fn apply_bulk(&self, body: &[Value]) -> Result<Vec<Value>, ClientError> {
        let mut items = Vec::new();
        let mut slots = body.iter();

        while let Some(header) = slots.next() {
            let (action, meta) = header
                .as_object()
                .and_then(|h| h.iter().next())
                .ok_or_else(|| bad_request("bulk header must be a single-key object"))?;
            let index = meta
                .get("_index")
                .and_then(Value::as_str)
                .ok_or_else(|| bad_request("bulk header missing _index"))?;
            let id = meta
                .get("_id")
                .and_then(Value::as_str)
                .ok_or_else(|| bad_request("bulk header missing _id"))?;

            let mut state = self.indices.entry(index.to_string()).or_default();
            let outcome = match action.as_str() {
                "index" => {
                    let doc = slots.next().ok_or_else(|| bad_request("index action without body"))?;
                    state.pending.insert(id.to_string(), Some(doc.clone()));
                    Ok(())
                }
                "update" => {
                    let doc = slots.next().ok_or_else(|| bad_request("update action without body"))?;
                    state.apply_update(id, doc).map(|_| ())
                }
                "delete" => match state.current(id) {
                    Some(_) => {
                        state.pending.insert(id.to_string(), None);
                        Ok(())
                    }
                    None => Err(ClientError::NotFound(format!("document {id}"))),
                },
                other => return Err(bad_request(&format!("unknown bulk action '{other}'"))),
            };

            let status = match outcome {
                Ok(()) => 200,
                Err(_) => 404,
            };
            items.push(json!({ action.as_str(): { "_index": index, "_id": id, "status": status } }));
        }

        Ok(items)
    }
}

fn bad_request(message: &str) -> ClientError {
    ClientError::Status {
        code: 400,
        message: message.to_string(),
    }
}

fn shards_ok() -> Value {
    json!({ "_shards": { "total": 1, "successful": 1, "failed": 0 } })
}

#[async_trait]
impl IndexClient for InMemoryIndexClient {
    async fn bulk(&self, body: Vec<Value>) -> Result<Value, ClientError> {
        self.bulk_bodies.lock().push(body.clone());
        if self.fail_bulk.load(Ordering::SeqCst) {
            return Err(ClientError::Transport("connection reset".into()));
        }

        let items = self.apply_bulk(&body)?;
        let errors = items
            .iter()
            .filter_map(|item| item.as_object()?.values().next()?.get("status")?.as_u64())
            .any(|status| status >= 300);
        Ok(json!({ "took": 0, "errors": errors, "items": items }))
    }

    async fn refresh(&self, index: &str) -> Result<Value, ClientError> {
        self.refresh_calls.fetch_add(1, Ordering::SeqCst);
        let mut state = self
            .indices
            .get_mut(index)
            .ok_or_else(|| ClientError::NotFound(format!("index {index}")))?;
        state.refresh();
        Ok(shards_ok())
    }

    async fn index_exists(&self, index: &str) -> Result<bool, ClientError> {
        Ok(self.indices.contains_key(index))
    }

    async fn create_index(&self, index: &str, settings: Option<&Value>) -> Result<Value, ClientError> {
        match self.indices.entry(index.to_string()) {
            Entry::Occupied(_) => Err(bad_request(&format!("index {index} already exists"))),
            Entry::Vacant(slot) => {
                slot.insert(IndexState {
                    settings: settings.cloned(),
                    ..IndexState::default()
                });
                Ok(json!({ "acknowledged": true, "index": index }))
            }
        }
    }

    async fn put_mapping(
        &self,
        index: &str,
        doc_type: Option<&str>,
        mapping: &Value,
        include_type_name: bool,
    ) -> Result<Value, ClientError> {
        let mut state = self
            .indices
            .get_mut(index)
            .ok_or_else(|| ClientError::NotFound(format!("index {index}")))?;

        let stored = match (doc_type, include_type_name) {
            (Some(doc_type), true) => {
                let mut typed = Map::new();
                typed.insert(doc_type.to_string(), mapping.clone());
                Value::Object(typed)
            }
            _ => mapping.clone(),
        };
        state.mapping = Some(stored);
        Ok(json!({ "acknowledged": true }))
    }

    async fn index(
        &self,
        index: &str,
        _doc_type: Option<&str>,
        id: &str,
        body: &Value,
    ) -> Result<Value, ClientError> {
        let mut state = self.indices.entry(index.to_string()).or_default();
        state.pending.insert(id.to_string(), Some(body.clone()));
        Ok(json!({ "_id": id, "result": "created" }))
    }

    async fn update(
        &self,
        index: &str,
        _doc_type: Option<&str>,
        id: &str,
        body: &Value,
    ) -> Result<Value, ClientError> {
        let mut state = self
            .indices
            .get_mut(index)
            .ok_or_else(|| ClientError::NotFound(format!("index {index}")))?;
        state.apply_update(id, body)
    }

    async fn delete(&self, index: &str, _doc_type: Option<&str>, id: &str) -> Result<Value, ClientError> {
        let mut state = self
            .indices
            .get_mut(index)
            .ok_or_else(|| ClientError::NotFound(format!("index {index}")))?;
        if state.current(id).is_none() {
            return Err(ClientError::NotFound(format!("document {id}")));
        }
        state.pending.insert(id.to_string(), None);
        Ok(json!({ "_id": id, "result": "deleted" }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_bulk_writes_visible_after_refresh() {
        let client = InMemoryIndexClient::new();
        let body = vec![
            json!({"index": {"_index": "users", "_id": "1"}}),
            json!({"name": "John"}),
            json!({"index": {"_index": "users", "_id": "2"}}),
            json!({"name": "Jane"}),
        ];

        let response = client.bulk(body).await.unwrap();
        assert_eq!(response["errors"], false);
        assert_eq!(client.count("users"), 0);
        assert_eq!(client.pending_count("users"), 2);

        client.refresh("users").await.unwrap();
        assert_eq!(client.count("users"), 2);
        assert_eq!(client.document("users", "1"), Some(json!({"name": "John"})));
    }

    #[tokio::test]
    async fn test_bulk_update_and_delete() {
        let client = InMemoryIndexClient::new();
        client.index("users", None, "1", &json!({"name": "John", "age": 3})).await.unwrap();
        client.refresh("users").await.unwrap();

        let body = vec![
            json!({"update": {"_index": "users", "_id": "1"}}),
            json!({"doc": {"age": 4}}),
            json!({"delete": {"_index": "users", "_id": "missing"}}),
        ];
        let response = client.bulk(body).await.unwrap();
        assert_eq!(response["errors"], true);

        client.refresh("users").await.unwrap();
        assert_eq!(client.document("users", "1"), Some(json!({"name": "John", "age": 4})));
    }

    #[tokio::test]
    async fn test_malformed_bulk_rejected() {
        let client = InMemoryIndexClient::new();
        let err = client.bulk(vec![json!({"index": {"_id": "1"}})]).await.unwrap_err();
        assert!(matches!(err, ClientError::Status { code: 400, .. }));
        assert_eq!(client.bulk_calls(), 1);
    }

    #[tokio::test]
    async fn test_fail_bulk_injection() {
        let client = InMemoryIndexClient::new();
        client.set_fail_bulk(true);
        let err = client.bulk(vec![]).await.unwrap_err();
        assert!(matches!(err, ClientError::Transport(_)));
    }

    #[tokio::test]
    async fn test_update_script_removes_fields() {
        let client = InMemoryIndexClient::new();
        client.index("users", None, "1", &json!({"a": 1, "b": 2, "c": 3})).await.unwrap();

        let script = json!({"script": "ctx._source.remove(\"a\");ctx._source.remove(\"c\")"});
        client.update("users", None, "1", &script).await.unwrap();
        client.refresh("users").await.unwrap();
        assert_eq!(client.document("users", "1"), Some(json!({"b": 2})));
    }

    #[tokio::test]
    async fn test_update_missing_document_is_not_found() {
        let client = InMemoryIndexClient::new();
        client.create_index("users", None).await.unwrap();
        let err = client.update("users", None, "1", &json!({"doc": {}})).await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_index_lifecycle() {
        let client = InMemoryIndexClient::new();
        assert!(!client.index_exists("users").await.unwrap());

        client.create_index("users", Some(&json!({"number_of_shards": 5}))).await.unwrap();
        assert!(client.index_exists("users").await.unwrap());
        assert!(client.create_index("users", None).await.is_err());

        let mapping = json!({"properties": {"name": {"type": "text"}}});
        client.put_mapping("users", Some("user"), &mapping, true).await.unwrap();
        assert_eq!(client.mapping("users"), Some(json!({"user": mapping})));
        assert_eq!(client.settings("users"), Some(json!({"number_of_shards": 5})));

        assert!(client.put_mapping("other", None, &mapping, false).await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_delete_then_refresh() {
        let client = InMemoryIndexClient::new();
        client.index("users", None, "1", &json!({"a": 1})).await.unwrap();
        client.refresh("users").await.unwrap();

        client.delete("users", None, "1").await.unwrap();
        assert_eq!(client.count("users"), 1);
        client.refresh("users").await.unwrap();
        assert_eq!(client.count("users"), 0);
        assert!(client.delete("users", None, "1").await.unwrap_err().is_not_found());
    }

    #[test]
    fn test_removed_fields_parse() {
        assert_eq!(
            removed_fields("ctx._source.remove(\"a\");ctx._source.remove('b')"),
            vec!["a", "b"]
        );
    }
}
