// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Value overrides.
//!
//! A field may replace its stored value with a literal or with the result of
//! a function evaluated at serialization time. Both are a [`ValueSource`];
//! the serializer resolves them uniformly and never emits the function itself.
//!
//! # Example
//!
//! ```
//! use index_sync::{Record, RecordValue, ValueContext, ValueSource};
//! use index_sync::value::Container;
//! use serde_json::json;
//!
//! let decade = ValueSource::computed(|raw, _ctx| {
//!     Ok(raw.and_then(RecordValue::as_f64).map(|age| json!(age - age % 10.0)))
//! });
//!
//! let record = Record::new().with("age", 35);
//! let ctx = ValueContext {
//!     document: &record,
//!     container: Container::Document(&record),
//!     field: "age",
//! };
//! assert_eq!(decade.resolve(record.get("age"), &ctx).unwrap(), Some(json!(30.0)));
//! ```

use std::fmt;
use std::sync::Arc;

use serde_json::Value;
use thiserror::Error;

use crate::record::{Record, RecordValue};

/// Error raised by a user value function.
///
/// The serializer recovers from it by omitting the field.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("value function failed: {0}")]
pub struct ValueError(pub String);

impl ValueError {
    pub fn new(msg: impl Into<String>) -> Self {
        Self(msg.into())
    }
}

/// The object a field is read from: the root document or a nested value.
#[derive(Debug, Clone, Copy)]
pub enum Container<'a> {
    Document(&'a Record),
    Value(&'a RecordValue),
}

impl<'a> Container<'a> {
    #[must_use]
    pub fn get(&self, field: &str) -> Option<&'a RecordValue> {
        match self {
            Self::Document(record) => record.get(field),
            Self::Value(value) => value.get(field),
        }
    }
}

/// Context handed to a computed value.
#[derive(Debug, Clone, Copy)]
pub struct ValueContext<'a> {
    /// Root record being serialized
    pub document: &'a Record,
    /// Object holding the field
    pub container: Container<'a>,
    /// Field name within the container
    pub field: &'a str,
}

/// Signature of a computed value. `Ok(None)` means "undefined": the key is
/// omitted from the output.
pub type ValueFn = Arc<
    dyn Fn(Option<&RecordValue>, &ValueContext<'_>) -> Result<Option<Value>, ValueError>
        + Send
        + Sync,
>;

/// A literal or computed field value.
#[derive(Clone)]
pub enum ValueSource {
    Literal(Value),
    Computed(ValueFn),
}

impl ValueSource {
    pub fn literal(value: impl Into<Value>) -> Self {
        Self::Literal(value.into())
    }

    /// Computed from the raw field value and its context.
    pub fn computed<F>(f: F) -> Self
    where
        F: Fn(Option<&RecordValue>, &ValueContext<'_>) -> Result<Option<Value>, ValueError>
            + Send
            + Sync
            + 'static,
    {
        Self::Computed(Arc::new(f))
    }

    /// Computed from the whole root record only.
    ///
    /// Used by schema-level extra fields, which have no backing raw value.
    pub fn from_document<F>(f: F) -> Self
    where
        F: Fn(&Record) -> Result<Option<Value>, ValueError> + Send + Sync + 'static,
    {
        Self::computed(move |_, ctx| f(ctx.document))
    }

    /// Evaluate against a raw field value.
    pub fn resolve(
        &self,
        raw: Option<&RecordValue>,
        ctx: &ValueContext<'_>,
    ) -> Result<Option<Value>, ValueError> {
        match self {
            Self::Literal(value) => Ok(Some(value.clone())),
            Self::Computed(f) => f(raw, ctx),
        }
    }
}

impl fmt::Debug for ValueSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Literal(value) => f.debug_tuple("Literal").field(value).finish(),
            Self::Computed(_) => f.write_str("Computed(<fn>)"),
        }
    }
}
