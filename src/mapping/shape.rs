// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Type-override shapes.
//!
//! A shape is an object of sub-fields, each an option object such as
//! `{ "es_type": "text", "es_boost": 2 }`. An entry whose `es_type` is again
//! an object nests. Shapes come either from JSON (`es_type` on a field) or
//! from schema-level extras ([`ShapeField`]).

use indexmap::IndexMap;
use serde_json::Value;

use super::{json_kind, MappingError, MappingNode, Properties, MAX_DEPTH};
use crate::schema::{ShapeField, OPTION_PREFIX, TYPE_OPTION, VALUE_OPTION};
use crate::value::ValueSource;

/// Parsed `es_type` option.
pub(super) enum TypeOverride {
    Scalar(String),
    Shape(IndexMap<String, ShapeField>),
}

impl TypeOverride {
    pub(super) fn parse(field: &str, raw: &Value) -> Result<Self, MappingError> {
        match raw {
            Value::String(tag) => Ok(Self::Scalar(tag.clone())),
            Value::Object(_) => parse_shape(field, raw).map(Self::Shape),
            other => Err(MappingError::InvalidTypeOverride {
                field: field.to_string(),
                found: json_kind(other).to_string(),
            }),
        }
    }
}

fn parse_shape(field: &str, raw: &Value) -> Result<IndexMap<String, ShapeField>, MappingError> {
    let Value::Object(entries) = raw else {
        return Err(MappingError::InvalidTypeOverride {
            field: field.to_string(),
            found: json_kind(raw).to_string(),
        });
    };

    entries
        .iter()
        .map(|(key, entry)| {
            let Value::Object(options) = entry else {
                return Err(MappingError::MalformedShape {
                    field: field.to_string(),
                    entry: key.clone(),
                });
            };
            let shape_field = ShapeField {
                options: options.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
                value: options.get(VALUE_OPTION).cloned().map(ValueSource::Literal),
            };
            Ok((key.clone(), shape_field))
        })
        .collect()
}

/// Translate a shape into mapping properties.
pub(super) fn translate_shape(
    field: &str,
    shape: &IndexMap<String, ShapeField>,
    depth: usize,
) -> Result<Properties, MappingError> {
    shape
        .iter()
        .map(|(key, entry)| {
            let path = format!("{field}.{key}");
            shape_field_node(&path, entry, depth).map(|node| (key.clone(), node))
        })
        .collect()
}

/// Translate one shape entry.
///
/// A nested shape under `es_type` replaces the entry's other options. Any
/// other key is copied with its `es_` prefix stripped.
pub(super) fn shape_field_node(
    path: &str,
    entry: &ShapeField,
    depth: usize,
) -> Result<MappingNode, MappingError> {
    if depth > MAX_DEPTH {
        return Err(MappingError::TooDeep { field: path.to_string(), max: MAX_DEPTH });
    }

    if let Some(nested @ Value::Object(_)) = entry.options.get(TYPE_OPTION) {
        let shape = parse_shape(path, nested)?;
        return Ok(MappingNode::object(translate_shape(path, &shape, depth + 1)?));
    }

    let mut node = MappingNode::default();
    for (key, raw) in &entry.options {
        if key == VALUE_OPTION {
            continue;
        }
        let target = key.strip_prefix(OPTION_PREFIX).unwrap_or(key);
        node.set_option(path, target, raw.clone())?;
    }
    node.value = entry
        .value
        .clone()
        .or_else(|| entry.options.get(VALUE_OPTION).cloned().map(ValueSource::Literal));
    Ok(node)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_scalar_and_shape_parse() {
        assert!(matches!(
            TypeOverride::parse("f", &json!("keyword")).unwrap(),
            TypeOverride::Scalar(ref t) if t == "keyword"
        ));
        match TypeOverride::parse("f", &json!({"a": {"es_type": "text"}})).unwrap() {
            TypeOverride::Shape(shape) => assert_eq!(shape.len(), 1),
            TypeOverride::Scalar(_) => panic!("expected shape"),
        }
    }

    #[test]
    fn test_non_object_entry_is_rejected() {
        let err = TypeOverride::parse("f", &json!({"a": "text"})).err().unwrap();
        assert_eq!(
            err,
            MappingError::MalformedShape { field: "f".into(), entry: "a".into() }
        );
    }

    #[test]
    fn test_entry_options_are_copied_unprefixed() {
        let entry = ShapeField::typed("text").option("es_boost", 3).option("analyzer", "simple");
        let node = shape_field_node("f.x", &entry, 1).unwrap();
        assert_eq!(node.to_json(), json!({"type": "text", "boost": 3, "analyzer": "simple"}));
    }

    #[test]
    fn test_literal_value_in_json_shape() {
        let shape = parse_shape("f", &json!({"n": {"es_type": "integer", "es_value": 5}})).unwrap();
        let props = translate_shape("f", &shape, 1).unwrap();
        let n = &props["n"];
        assert!(matches!(n.value, Some(ValueSource::Literal(ref v)) if v == &json!(5)));
        assert_eq!(n.to_json(), json!({"type": "integer"}));
    }

    #[test]
    fn test_nested_shape_recurses() {
        let entry = ShapeField::new().option(TYPE_OPTION, json!({"inner": {"es_type": "keyword"}}));
        let node = shape_field_node("f.x", &entry, 1).unwrap();
        assert_eq!(
            node.to_json(),
            json!({"type": "object", "properties": {"inner": {"type": "keyword"}}})
        );
    }
}
