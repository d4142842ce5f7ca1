// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Document serialization.
//!
//! Walks a record along a mapping tree and produces the JSON body sent to the
//! index engine. Only keys present in the mapping are emitted, in mapping
//! order. Keys that resolve to "undefined" are dropped; explicit nulls stay.
//!
//! Value overrides attached to mapping nodes are evaluated here. A failing
//! value function costs only its own field.
//!
//! Leaves are normalized: embedded records become their id string, object ids
//! their hex form and dates RFC 3339 with milliseconds (`2024-01-02T03:04:05.000Z`).

use chrono::SecondsFormat;
use serde_json::{Map, Value};
use tracing::debug;

use crate::mapping::{MappingNode, Properties};
use crate::metrics;
use crate::record::{Record, RecordValue};
use crate::value::{Container, ValueContext};

/// Serialize a whole record against a root mapping.
#[must_use]
pub fn serialize_record(record: &Record, mapping: &MappingNode) -> Value {
    let fields = match mapping.properties {
        Some(ref properties) => serialize_object(Container::Document(record), properties, record),
        None => Map::new(),
    };
    Value::Object(fields)
}

/// Serialize one value against its mapping node.
///
/// Returns `None` when the value resolves to "undefined" and must be omitted
/// by the caller.
#[must_use]
pub fn serialize(value: &RecordValue, node: &MappingNode, root: &Record) -> Option<Value> {
    match (&node.properties, value) {
        (None, _) | (Some(_), RecordValue::Null) => normalize(value),
        (Some(properties), RecordValue::Array(items)) => Some(Value::Array(
            items
                .iter()
                .map(|item| serialize_element(item, properties, root).unwrap_or(Value::Null))
                .collect(),
        )),
        (Some(properties), _) => serialize_element(value, properties, root),
    }
}

/// Object-shaped serialization of one value.
///
/// An empty result on a scalar or identity collapses to undefined.
fn serialize_element(value: &RecordValue, properties: &Properties, root: &Record) -> Option<Value> {
    let fields = serialize_object(Container::Value(value), properties, root);
    if fields.is_empty() && (value.is_scalar() || matches!(value, RecordValue::ObjectId(_))) {
        return None;
    }
    Some(Value::Object(fields))
}

fn serialize_object(container: Container<'_>, properties: &Properties, root: &Record) -> Map<String, Value> {
    let mut out = Map::new();

    for (name, node) in properties {
        let raw = container.get(name);
        let resolved = match node.value {
            Some(ref source) => {
                let ctx = ValueContext {
                    document: root,
                    container,
                    field: name,
                };
                match source.resolve(raw, &ctx) {
                    Ok(value) => value,
                    Err(err) => {
                        debug!(field = %name, error = %err, "Value function failed, field omitted");
                        metrics::record_value_error(name);
                        None
                    }
                }
            }
            None => raw.and_then(|raw| serialize(raw, node, root)),
        };

        if let Some(value) = resolved {
            out.insert(name.clone(), value);
        }
    }

    out
}

/// Convert store-specific leaf types into plain JSON.
///
/// An embedded record without an id is undefined: omitted from objects and
/// `null` inside arrays.
fn normalize(value: &RecordValue) -> Option<Value> {
    let json = match value {
        RecordValue::Null => Value::Null,
        RecordValue::Bool(b) => Value::Bool(*b),
        RecordValue::Number(n) => Value::Number(n.clone()),
        RecordValue::String(s) => Value::String(s.clone()),
        RecordValue::Date(date) => Value::String(date.to_rfc3339_opts(SecondsFormat::Millis, true)),
        RecordValue::ObjectId(id) => Value::String(id.to_hex()),
        RecordValue::Record(record) => return record.id_string().map(Value::String),
        RecordValue::Array(items) => {
            Value::Array(items.iter().map(|item| normalize(item).unwrap_or(Value::Null)).collect())
        }
        RecordValue::Object(fields) => Value::Object(
            fields
                .iter()
                .filter_map(|(key, value)| Some((key.clone(), normalize(value)?)))
                .collect(),
        ),
    };
    Some(json)
}
