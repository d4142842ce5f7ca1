// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Structural schemas.
//!
//! A [`Schema`] describes the typed fields of a record collection as the
//! primary store sees them. It is built once through [`SchemaBuilder`] and is
//! immutable afterwards; its [`SchemaId`] is the identity the mapping cache is
//! keyed by.
//!
//! Field options are a raw bag of JSON values. Keys prefixed with `es_` are
//! index-relevant:
//!
//! | Option        | Effect on the mapping                                   |
//! |---------------|---------------------------------------------------------|
//! | `es_indexed`  | Explicit inclusion flag                                 |
//! | `es_type`     | Scalar type override, or a nested shape (JSON object)   |
//! | `es_*`        | Copied onto the mapping node without the prefix         |
//!
//! A value override is not JSON and lives next to the bag (see [`ValueSource`]).
//!
//! # Example
//!
//! ```
//! use index_sync::schema::{FieldKind, FieldOptions, Schema};
//!
//! let schema = Schema::builder()
//!     .field("name", FieldKind::String)
//!     .field_with("age", FieldKind::Number, FieldOptions::new().option("es_boost", 1.5))
//!     .build();
//!
//! // `_id`, `name`, `age`, `__v`
//! assert_eq!(schema.fields().len(), 4);
//! ```

mod types;

pub use types::{resolve_field, ResolvedField, TypeTag};

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use indexmap::IndexMap;
use serde_json::Value;

use crate::record::ID_FIELD;
use crate::value::ValueSource;

/// Default name of the store's internal revision field.
pub const DEFAULT_VERSION_KEY: &str = "__v";

/// Prefix marking an option as index-relevant.
pub const OPTION_PREFIX: &str = "es_";

/// Explicit inclusion flag.
pub const INDEXED_OPTION: &str = "es_indexed";

/// Type override (scalar tag or nested shape).
pub const TYPE_OPTION: &str = "es_type";

/// Literal value override inside JSON shapes.
pub const VALUE_OPTION: &str = "es_value";

static NEXT_SCHEMA_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique schema identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SchemaId(u64);

impl SchemaId {
    fn next() -> Self {
        Self(NEXT_SCHEMA_ID.fetch_add(1, Ordering::Relaxed))
    }

    #[must_use]
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

/// Declared kind of a schema field.
#[derive(Debug, Clone)]
pub enum FieldKind {
    String,
    Number,
    Boolean,
    Date,
    ObjectId,
    Buffer,
    Decimal128,
    Map,
    Mixed,
    /// Single nested sub-record
    Embedded(Arc<Schema>),
    /// Array of the given element kind
    Array(Box<FieldKind>),
}

impl FieldKind {
    /// Shorthand for `Array(Embedded(schema))`.
    #[must_use]
    pub fn array_of(schema: Arc<Schema>) -> Self {
        Self::Array(Box::new(Self::Embedded(schema)))
    }

    /// Shorthand for an array of scalars.
    #[must_use]
    pub fn array(item: FieldKind) -> Self {
        Self::Array(Box::new(item))
    }
}

/// Raw per-field option bag plus an optional value override.
#[derive(Debug, Clone, Default)]
pub struct FieldOptions {
    raw: IndexMap<String, Value>,
    value: Option<ValueSource>,
}

impl FieldOptions {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a raw option (use the `es_` prefix for index-relevant ones).
    #[must_use]
    pub fn option(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.raw.insert(key.into(), value.into());
        self
    }

    /// Set the explicit inclusion flag.
    #[must_use]
    pub fn indexed(self, indexed: bool) -> Self {
        self.option(INDEXED_OPTION, indexed)
    }

    /// Override the output type with a scalar tag (e.g. `keyword`).
    #[must_use]
    pub fn es_type(self, tag: impl Into<String>) -> Self {
        self.option(TYPE_OPTION, Value::String(tag.into()))
    }

    /// Override the output type with a nested shape.
    ///
    /// The shape is validated when the mapping is generated.
    #[must_use]
    pub fn es_type_shape(self, shape: Value) -> Self {
        self.option(TYPE_OPTION, shape)
    }

    /// Replace the stored value with a literal or computed one.
    #[must_use]
    pub fn value(mut self, source: ValueSource) -> Self {
        self.value = Some(source);
        self
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.raw.get(key)
    }

    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.raw.contains_key(key)
    }

    #[must_use]
    pub fn raw(&self) -> &IndexMap<String, Value> {
        &self.raw
    }

    #[must_use]
    pub fn value_source(&self) -> Option<&ValueSource> {
        self.value.as_ref()
    }
}

/// One field of a structural schema.
#[derive(Debug, Clone)]
pub struct FieldDescriptor {
    /// Field name; dots denote nesting inside plain objects
    pub name: String,
    pub kind: FieldKind,
    pub options: FieldOptions,
    /// Options declared on the element of a reference array
    pub item_options: Option<FieldOptions>,
}

/// One entry of a type-override shape or a schema-level extra field.
///
/// `options` holds raw keys (usually `es_type`, `es_boost`, ...). A nested
/// object under `es_type` is itself a shape.
#[derive(Debug, Clone, Default)]
pub struct ShapeField {
    pub options: IndexMap<String, Value>,
    pub value: Option<ValueSource>,
}

impl ShapeField {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Shorthand for a field with only a scalar type.
    pub fn typed(tag: impl Into<String>) -> Self {
        Self::new().option(TYPE_OPTION, Value::String(tag.into()))
    }

    #[must_use]
    pub fn option(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.options.insert(key.into(), value.into());
        self
    }

    #[must_use]
    pub fn value(mut self, source: ValueSource) -> Self {
        self.value = Some(source);
        self
    }
}

/// Immutable structural schema.
#[derive(Debug)]
pub struct Schema {
    id: SchemaId,
    fields: Vec<FieldDescriptor>,
    version_key: Option<String>,
    extras: IndexMap<String, ShapeField>,
}

impl Schema {
    #[must_use]
    pub fn builder() -> SchemaBuilder {
        SchemaBuilder::new()
    }

    #[must_use]
    pub fn id(&self) -> SchemaId {
        self.id
    }

    #[must_use]
    pub fn fields(&self) -> &[FieldDescriptor] {
        &self.fields
    }

    #[must_use]
    pub fn field(&self, name: &str) -> Option<&FieldDescriptor> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Name of the internal revision field, if the schema has one.
    #[must_use]
    pub fn version_key(&self) -> Option<&str> {
        self.version_key.as_deref()
    }

    /// Extra computed fields, not backed by any stored field.
    #[must_use]
    pub fn extras(&self) -> &IndexMap<String, ShapeField> {
        &self.extras
    }
}

/// Builder for [`Schema`].
///
/// Like the primary store, it declares `_id` (an object id) first and the
/// revision field last unless told otherwise.
#[derive(Debug)]
pub struct SchemaBuilder {
    id_kind: Option<FieldKind>,
    fields: Vec<FieldDescriptor>,
    version_key: Option<String>,
    extras: IndexMap<String, ShapeField>,
}

impl SchemaBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self {
            id_kind: Some(FieldKind::ObjectId),
            fields: Vec::new(),
            version_key: Some(DEFAULT_VERSION_KEY.to_string()),
            extras: IndexMap::new(),
        }
    }

    /// Declare a field with no options.
    #[must_use]
    pub fn field(self, name: impl Into<String>, kind: FieldKind) -> Self {
        self.field_with(name, kind, FieldOptions::new())
    }

    /// Declare a field with options.
    #[must_use]
    pub fn field_with(mut self, name: impl Into<String>, kind: FieldKind, options: FieldOptions) -> Self {
        self.fields.push(FieldDescriptor {
            name: name.into(),
            kind,
            options,
            item_options: None,
        });
        self
    }

    /// Declare an array of references whose element carries the options.
    #[must_use]
    pub fn ref_array(mut self, name: impl Into<String>, item_options: FieldOptions) -> Self {
        self.fields.push(FieldDescriptor {
            name: name.into(),
            kind: FieldKind::array(FieldKind::ObjectId),
            options: FieldOptions::new(),
            item_options: Some(item_options),
        });
        self
    }

    /// Use a different kind for `_id`.
    #[must_use]
    pub fn id_kind(mut self, kind: FieldKind) -> Self {
        self.id_kind = Some(kind);
        self
    }

    /// Do not declare `_id` (typical for sub-schemas).
    #[must_use]
    pub fn without_id(mut self) -> Self {
        self.id_kind = None;
        self
    }

    /// Rename or drop (`None`) the revision field.
    #[must_use]
    pub fn version_key(mut self, key: Option<&str>) -> Self {
        self.version_key = key.map(str::to_string);
        self
    }

    /// Add an extra computed field to the mapping.
    #[must_use]
    pub fn extend(mut self, name: impl Into<String>, field: ShapeField) -> Self {
        self.extras.insert(name.into(), field);
        self
    }

    #[must_use]
    pub fn build(self) -> Arc<Schema> {
        let mut fields = Vec::with_capacity(self.fields.len() + 2);
        if let Some(kind) = self.id_kind {
            fields.push(FieldDescriptor {
                name: ID_FIELD.to_string(),
                kind,
                options: FieldOptions::new(),
                item_options: None,
            });
        }
        fields.extend(self.fields);
        if let Some(ref key) = self.version_key {
            if !fields.iter().any(|f| &f.name == key) {
                fields.push(FieldDescriptor {
                    name: key.clone(),
                    kind: FieldKind::Number,
                    options: FieldOptions::new(),
                    item_options: None,
                });
            }
        }

        Arc::new(Schema {
            id: SchemaId::next(),
            fields,
            version_key: self.version_key,
            extras: self.extras,
        })
    }
}

impl Default for SchemaBuilder {
    fn default() -> Self {
        Self::new()
    }
}
