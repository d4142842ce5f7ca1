// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Index mapping generation.
//!
//! Turns a structural [`Schema`] into the mapping tree the index engine is
//! given when an index is defined:
//!
//! ```text
//! { "properties": {
//!     "name":     { "type": "text" },
//!     "age":      { "type": "double", "boost": 1.5 },
//!     "address":  { "type": "object", "properties": { "city": { "type": "text" } } }
//! } }
//! ```
//!
//! # Inclusion rules
//!
//! A schema level is *explicit* when any of its fields (or any field of an
//! embedded sub-schema, recursively) declares `es_indexed`. In explicit mode
//! only fields flagged `es_indexed: true` are mapped; an embedded field with
//! no flag of its own inherits the explicit check of its sub-schema. Outside
//! explicit mode every field is mapped. `_id` and the revision field never are.
//!
//! # Type derivation
//!
//! - `es_type` as an object: the shape is translated into the node's
//!   `properties` and the canonical type is ignored.
//! - Embedded and sub-record array fields recurse into their sub-schema.
//! - The engine-version table substitutes scalar tags (`number` → `double`, ...).
//! - Every other `es_*` option is copied onto the node without its prefix, so
//!   `es_type: "keyword"` becomes `type: "keyword"` and `es_boost` becomes `boost`.
//!
//! Mappings are expensive to build; use [`MappingCache`] rather than calling
//! [`generate`] per record.

mod cache;
mod shape;

pub use cache::MappingCache;

use indexmap::IndexMap;
use serde::ser::{Serialize, SerializeMap, Serializer};
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

use crate::record::ID_FIELD;
use crate::schema::{
    resolve_field, FieldDescriptor, FieldOptions, ResolvedField, Schema, TypeTag, INDEXED_OPTION,
    OPTION_PREFIX, TYPE_OPTION, VALUE_OPTION,
};
use crate::value::ValueSource;

use shape::{translate_shape, TypeOverride};

/// Maximum sub-schema / shape nesting depth.
pub const MAX_DEPTH: usize = 32;

/// Child nodes of an object-shaped mapping node, in declaration order.
pub type Properties = IndexMap<String, MappingNode>;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MappingError {
    #[error("field '{field}': es_type must be a string or an object, got {found}")]
    InvalidTypeOverride { field: String, found: String },
    #[error("field '{field}': type shape entry '{entry}' must be an object")]
    MalformedShape { field: String, entry: String },
    #[error("field '{field}': es_indexed must be a boolean")]
    InvalidIndexedFlag { field: String },
    #[error("field '{field}': option '{option}' is reserved")]
    ReservedOption { field: String, option: String },
    #[error("invalid field name '{field}'")]
    InvalidFieldName { field: String },
    #[error("field '{field}': nesting exceeds {max} levels")]
    TooDeep { field: String, max: usize },
}

/// Index engine major version. Selects the default type table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Deserialize)]
#[serde(try_from = "u8")]
pub enum EngineVersion {
    V2,
    #[default]
    V5,
    V6,
    V7,
}

impl EngineVersion {
    #[must_use]
    pub fn major(&self) -> u8 {
        match self {
            Self::V2 => 2,
            Self::V5 => 5,
            Self::V6 => 6,
            Self::V7 => 7,
        }
    }

    /// Engine type substituted for a canonical tag, if the table has one.
    #[must_use]
    pub fn default_type(&self, tag: TypeTag) -> Option<&'static str> {
        match (self, tag) {
            (Self::V2, TypeTag::ObjectId) => Some("string"),
            (_, TypeTag::ObjectId) => Some("keyword"),
            (Self::V7, TypeTag::Number) => Some("long"),
            (_, TypeTag::Number) => Some("double"),
            (_, TypeTag::Mixed) => Some("object"),
            (Self::V2, TypeTag::String) => None,
            (_, TypeTag::String) => Some("text"),
            _ => None,
        }
    }

    /// Tags that are engine types in their own right.
    fn native_type(&self, tag: TypeTag) -> Option<&'static str> {
        match tag {
            TypeTag::Boolean | TypeTag::Date | TypeTag::String => Some(tag.as_str()),
            _ => None,
        }
    }

    /// Whether mapping calls need `include_type_name`.
    #[must_use]
    pub fn needs_type_name_flag(&self) -> bool {
        matches!(self, Self::V7)
    }
}

impl TryFrom<u8> for EngineVersion {
    type Error = String;

    fn try_from(major: u8) -> Result<Self, Self::Error> {
        match major {
            2 => Ok(Self::V2),
            5 => Ok(Self::V5),
            6 => Ok(Self::V6),
            7 => Ok(Self::V7),
            other => Err(format!("unsupported engine version {other} (expected 2, 5, 6 or 7)")),
        }
    }
}

impl std::fmt::Display for EngineVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "v{}", self.major())
    }
}

/// One node of a mapping tree.
///
/// `value` is evaluated by the serializer and is never part of the JSON sent
/// to the engine.
#[derive(Debug, Clone, Default)]
pub struct MappingNode {
    pub field_type: Option<String>,
    /// Engine-specific passthrough options (`boost`, `analyzer`, ...)
    pub options: IndexMap<String, Value>,
    pub properties: Option<Properties>,
    pub value: Option<ValueSource>,
}

impl MappingNode {
    /// An `object` node with the given children.
    #[must_use]
    pub fn object(properties: Properties) -> Self {
        Self {
            field_type: Some("object".to_string()),
            properties: Some(properties),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn is_object_shaped(&self) -> bool {
        self.properties.is_some()
    }

    #[must_use]
    pub fn property(&self, name: &str) -> Option<&MappingNode> {
        self.properties.as_ref()?.get(name)
    }

    /// Set an unprefixed option; `type` goes to [`Self::field_type`].
    fn set_option(&mut self, field: &str, key: &str, value: Value) -> Result<(), MappingError> {
        match key {
            "type" => match value {
                Value::String(tag) => self.field_type = Some(tag),
                other => {
                    return Err(MappingError::InvalidTypeOverride {
                        field: field.to_string(),
                        found: json_kind(&other).to_string(),
                    })
                }
            },
            "properties" | "value" => {
                return Err(MappingError::ReservedOption {
                    field: field.to_string(),
                    option: key.to_string(),
                })
            }
            _ => {
                self.options.insert(key.to_string(), value);
            }
        }
        Ok(())
    }

    /// The JSON form sent to the engine.
    #[must_use]
    pub fn to_json(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

impl Serialize for MappingNode {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(None)?;
        if let Some(ref ty) = self.field_type {
            map.serialize_entry("type", ty)?;
        }
        for (key, value) in &self.options {
            map.serialize_entry(key, value)?;
        }
        if let Some(ref properties) = self.properties {
            map.serialize_entry("properties", properties)?;
        }
        map.end()
    }
}

/// Generate the root mapping node (`{ properties }`) for a schema.
pub fn generate(schema: &Schema, version: EngineVersion) -> Result<MappingNode, MappingError> {
    let properties = generate_properties(schema, version, 0)?;
    debug!(schema = schema.id().as_u64(), %version, fields = properties.len(), "Mapping generated");
    Ok(MappingNode {
        properties: Some(properties),
        ..MappingNode::default()
    })
}

fn generate_properties(
    schema: &Schema,
    version: EngineVersion,
    depth: usize,
) -> Result<Properties, MappingError> {
    if depth > MAX_DEPTH {
        let field = schema.fields().first().map(|f| f.name.clone()).unwrap_or_default();
        return Err(MappingError::TooDeep { field, max: MAX_DEPTH });
    }

    let explicit = has_explicit(schema, depth);
    let mut properties = Properties::new();

    for field in schema.fields() {
        if field.name == ID_FIELD {
            continue;
        }

        let resolved = resolve_field(field);
        let mut indexed = indexed_flag(field, &resolved)?;
        if explicit && resolved.tag.is_embedded() && indexed.is_none() {
            indexed = Some(resolved.sub_schema.is_some_and(|sub| has_explicit(sub, depth + 1)));
        }
        if explicit && !indexed.unwrap_or(false) {
            continue;
        }

        let node = field_node(field, &resolved, version, depth)?;
        insert_at_path(&mut properties, &field.name, node)?;
    }

    if let Some(key) = schema.version_key() {
        properties.shift_remove(key);
    }

    for (name, extra) in schema.extras() {
        let node = shape::shape_field_node(name, extra, depth + 1)?;
        properties.insert(name.clone(), node);
    }

    Ok(properties)
}

/// Whether any field of this schema level, or of an embedded sub-schema,
/// carries an explicit inclusion flag.
fn has_explicit(schema: &Schema, depth: usize) -> bool {
    if depth > MAX_DEPTH {
        return false;
    }
    schema.fields().iter().filter(|f| f.name != ID_FIELD).any(|field| {
        let resolved = resolve_field(field);
        let nested = resolved.tag.is_embedded()
            && resolved.sub_schema.is_some_and(|sub| has_explicit(sub, depth + 1));
        nested || resolved.options.contains(INDEXED_OPTION)
    })
}

fn indexed_flag(field: &FieldDescriptor, resolved: &ResolvedField<'_>) -> Result<Option<bool>, MappingError> {
    match resolved.options.get(INDEXED_OPTION) {
        None => Ok(None),
        Some(Value::Bool(flag)) => Ok(Some(*flag)),
        Some(_) => Err(MappingError::InvalidIndexedFlag { field: field.name.clone() }),
    }
}

fn field_node(
    field: &FieldDescriptor,
    resolved: &ResolvedField<'_>,
    version: EngineVersion,
    depth: usize,
) -> Result<MappingNode, MappingError> {
    let options = resolved.options;
    let type_override = options
        .get(TYPE_OPTION)
        .map(|raw| TypeOverride::parse(&field.name, raw))
        .transpose()?;
    let value = options
        .value_source()
        .cloned()
        .or_else(|| options.get(VALUE_OPTION).cloned().map(ValueSource::Literal));

    let mut node = MappingNode::default();
    match type_override {
        Some(TypeOverride::Shape(shape)) => {
            node = MappingNode::object(translate_shape(&field.name, &shape, depth + 1)?);
        }
        Some(TypeOverride::Scalar(tag)) if value.is_some() => {
            // A scalar override together with a value skips derivation entirely.
            node.field_type = Some(tag);
            pass_options(&mut node, field, options)?;
        }
        scalar => {
            if let Some(sub) = resolved.sub_schema.filter(|_| resolved.tag.is_embedded()) {
                node = MappingNode::object(generate_properties(sub, version, depth + 1)?);
            }
            if let Some(engine_type) = version.default_type(resolved.tag) {
                node.field_type = Some(engine_type.to_string());
            } else if node.field_type.is_none() {
                node.field_type = version.native_type(resolved.tag).map(str::to_string);
            }
            if let Some(TypeOverride::Scalar(tag)) = scalar {
                node.field_type = Some(tag);
            }
            pass_options(&mut node, field, options)?;
        }
    }

    node.value = value;
    Ok(node)
}

/// Copy `es_*` options onto the node, minus the ones consumed above.
fn pass_options(node: &mut MappingNode, field: &FieldDescriptor, options: &FieldOptions) -> Result<(), MappingError> {
    for (key, raw) in options.raw() {
        if key == INDEXED_OPTION || key == VALUE_OPTION || key == TYPE_OPTION {
            continue;
        }
        if let Some(stripped) = key.strip_prefix(OPTION_PREFIX) {
            node.set_option(&field.name, stripped, raw.clone())?;
        }
    }
    Ok(())
}

/// Place a node at a dotted path, creating `object` parents as needed.
fn insert_at_path(properties: &mut Properties, path: &str, node: MappingNode) -> Result<(), MappingError> {
    let segments: Vec<&str> = path.split('.').collect();
    if segments.iter().any(|s| s.is_empty()) {
        return Err(MappingError::InvalidFieldName { field: path.to_string() });
    }

    let (leaf, parents) = match segments.split_last() {
        Some(split) => split,
        None => return Err(MappingError::InvalidFieldName { field: path.to_string() }),
    };

    let mut current = properties;
    for segment in parents {
        let parent = current
            .entry((*segment).to_string())
            .or_insert_with(|| MappingNode::object(Properties::new()));
        if parent.properties.is_none() {
            parent.field_type = Some("object".to_string());
        }
        current = parent.properties.get_or_insert_with(Properties::new);
    }
    current.insert((*leaf).to_string(), node);
    Ok(())
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
