// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Record data structures.
//!
//! A [`Record`] is one document read from the primary store: an ordered field
//! map whose `_id` field is its identity. Field values are [`RecordValue`]s,
//! which keep the store's opaque types (identities, timestamps, embedded live
//! records) intact until serialization.
//!
//! A key that is absent from a record is "undefined" and is never sent to the
//! index. [`RecordValue::Null`] is an explicit null and is sent as such.
//!
//! # Example
//!
//! ```
//! use index_sync::{ObjectId, Record};
//!
//! let id = ObjectId::new();
//! let record = Record::with_id(id)
//!     .with("name", "John")
//!     .with("age", 35);
//!
//! assert_eq!(record.id_string(), Some(id.to_hex()));
//! assert!(record.get("email").is_none());
//! ```

use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde_json::{Number, Value};

/// Name of the identity field.
pub const ID_FIELD: &str = "_id";

/// Ordered field map used for records and plain sub-objects.
pub type Fields = IndexMap<String, RecordValue>;

/// A 12-byte store identity, rendered as 24 lowercase hex characters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId([u8; 12]);

static OBJECT_ID_COUNTER: AtomicU32 = AtomicU32::new(0);

impl ObjectId {
    /// Generate a new identity: 4-byte timestamp, 5 bytes of process
    /// entropy, 3-byte counter.
    #[must_use]
    pub fn new() -> Self {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default();
        let secs = now.as_secs() as u32;
        let entropy = (std::process::id() as u64) << 8 ^ u64::from(now.subsec_nanos());
        let count = OBJECT_ID_COUNTER.fetch_add(1, Ordering::Relaxed);

        let mut bytes = [0u8; 12];
        bytes[0..4].copy_from_slice(&secs.to_be_bytes());
        bytes[4..9].copy_from_slice(&entropy.to_be_bytes()[3..8]);
        bytes[9..12].copy_from_slice(&count.to_be_bytes()[1..4]);
        Self(bytes)
    }

    #[must_use]
    pub fn from_bytes(bytes: [u8; 12]) -> Self {
        Self(bytes)
    }

    /// Parse the 24-character hex form.
    pub fn parse_str(s: &str) -> Result<Self, hex::FromHexError> {
        let mut bytes = [0u8; 12];
        hex::decode_to_slice(s, &mut bytes)?;
        Ok(Self(bytes))
    }

    #[must_use]
    pub fn bytes(&self) -> [u8; 12] {
        self.0
    }

    #[must_use]
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl Default for ObjectId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

/// A field value as held by the primary store.
#[derive(Debug, Clone, PartialEq)]
pub enum RecordValue {
    Null,
    Bool(bool),
    Number(Number),
    String(String),
    Date(DateTime<Utc>),
    ObjectId(ObjectId),
    Array(Vec<RecordValue>),
    Object(Fields),
    /// An embedded live record (e.g. a populated reference)
    Record(Box<Record>),
}

impl RecordValue {
    /// Look up a field on an object-shaped value.
    ///
    /// Scalars, arrays and identities have no fields.
    #[must_use]
    pub fn get(&self, field: &str) -> Option<&RecordValue> {
        match self {
            Self::Object(fields) => fields.get(field),
            Self::Record(record) => record.get(field),
            _ => None,
        }
    }

    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Whether this value is a non-object scalar for serialization purposes.
    #[must_use]
    pub fn is_scalar(&self) -> bool {
        matches!(
            self,
            Self::Null | Self::Bool(_) | Self::Number(_) | Self::String(_) | Self::Date(_)
        )
    }

    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Number(n) => n.as_f64(),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_array(&self) -> Option<&[RecordValue]> {
        match self {
            Self::Array(items) => Some(items),
            _ => None,
        }
    }
}

impl From<&str> for RecordValue {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

impl From<String> for RecordValue {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

impl From<bool> for RecordValue {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<i32> for RecordValue {
    fn from(n: i32) -> Self {
        Self::Number(n.into())
    }
}

impl From<i64> for RecordValue {
    fn from(n: i64) -> Self {
        Self::Number(n.into())
    }
}

impl From<u64> for RecordValue {
    fn from(n: u64) -> Self {
        Self::Number(n.into())
    }
}

impl From<f64> for RecordValue {
    /// Non-finite floats have no JSON form and become null.
    fn from(n: f64) -> Self {
        Number::from_f64(n).map_or(Self::Null, Self::Number)
    }
}

impl From<DateTime<Utc>> for RecordValue {
    fn from(d: DateTime<Utc>) -> Self {
        Self::Date(d)
    }
}

impl From<ObjectId> for RecordValue {
    fn from(id: ObjectId) -> Self {
        Self::ObjectId(id)
    }
}

impl From<Record> for RecordValue {
    fn from(record: Record) -> Self {
        Self::Record(Box::new(record))
    }
}

impl From<Fields> for RecordValue {
    fn from(fields: Fields) -> Self {
        Self::Object(fields)
    }
}

impl<T: Into<RecordValue>> From<Vec<T>> for RecordValue {
    fn from(items: Vec<T>) -> Self {
        Self::Array(items.into_iter().map(Into::into).collect())
    }
}

impl From<Value> for RecordValue {
    /// Plain JSON carries no opaque store types; strings stay strings.
    fn from(value: Value) -> Self {
        match value {
            Value::Null => Self::Null,
            Value::Bool(b) => Self::Bool(b),
            Value::Number(n) => Self::Number(n),
            Value::String(s) => Self::String(s),
            Value::Array(items) => Self::Array(items.into_iter().map(Self::from).collect()),
            Value::Object(map) => {
                Self::Object(map.into_iter().map(|(k, v)| (k, Self::from(v))).collect())
            }
        }
    }
}

/// One document from the primary store.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Record {
    fields: Fields,
}

impl Record {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a record with its identity field set.
    pub fn with_id(id: impl Into<RecordValue>) -> Self {
        Self::new().with(ID_FIELD, id)
    }

    /// Build a record from a JSON object. Returns `None` for non-objects.
    #[must_use]
    pub fn from_json(value: Value) -> Option<Self> {
        match RecordValue::from(value) {
            RecordValue::Object(fields) => Some(Self { fields }),
            _ => None,
        }
    }

    /// Builder-style field setter.
    #[must_use]
    pub fn with(mut self, name: impl Into<String>, value: impl Into<RecordValue>) -> Self {
        self.insert(name, value);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<RecordValue>) {
        self.fields.insert(name.into(), value.into());
    }

    pub fn remove(&mut self, name: &str) -> Option<RecordValue> {
        self.fields.shift_remove(name)
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&RecordValue> {
        self.fields.get(name)
    }

    #[must_use]
    pub fn id(&self) -> Option<&RecordValue> {
        self.fields.get(ID_FIELD)
    }

    /// String form of the identity, as used for index document ids.
    #[must_use]
    pub fn id_string(&self) -> Option<String> {
        match self.id()? {
            RecordValue::ObjectId(id) => Some(id.to_hex()),
            RecordValue::String(s) => Some(s.clone()),
            RecordValue::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }

    #[must_use]
    pub fn fields(&self) -> &Fields {
        &self.fields
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}
