// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Field type resolution.

use std::sync::Arc;

use super::{FieldDescriptor, FieldKind, FieldOptions, Schema};

/// Canonical type tag of a schema field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TypeTag {
    String,
    Number,
    Boolean,
    Date,
    ObjectId,
    Buffer,
    Decimal128,
    Map,
    Mixed,
    Embedded,
    Array,
}

impl TypeTag {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Number => "number",
            Self::Boolean => "boolean",
            Self::Date => "date",
            Self::ObjectId => "objectid",
            Self::Buffer => "buffer",
            Self::Decimal128 => "decimal128",
            Self::Map => "map",
            Self::Mixed => "mixed",
            Self::Embedded => "embedded",
            Self::Array => "array",
        }
    }

    /// Sub-record fields: single nested or array of sub-records.
    #[must_use]
    pub fn is_embedded(&self) -> bool {
        matches!(self, Self::Embedded | Self::Array)
    }

    fn of_scalar(kind: &FieldKind) -> Self {
        match kind {
            FieldKind::String => Self::String,
            FieldKind::Number => Self::Number,
            FieldKind::Boolean => Self::Boolean,
            FieldKind::Date => Self::Date,
            FieldKind::ObjectId => Self::ObjectId,
            FieldKind::Buffer => Self::Buffer,
            FieldKind::Decimal128 => Self::Decimal128,
            FieldKind::Map => Self::Map,
            FieldKind::Mixed => Self::Mixed,
            FieldKind::Embedded(_) => Self::Embedded,
            FieldKind::Array(_) => Self::Array,
        }
    }
}

impl std::fmt::Display for TypeTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A field's canonical tag, effective options and sub-schema.
#[derive(Debug, Clone, Copy)]
pub struct ResolvedField<'a> {
    pub tag: TypeTag,
    pub options: &'a FieldOptions,
    pub sub_schema: Option<&'a Arc<Schema>>,
}

/// Resolve a field descriptor.
///
/// Arrays of scalars take their element's tag; arrays of sub-records resolve
/// to [`TypeTag::Array`]. Element options of a reference array win over the
/// field's own options.
#[must_use]
pub fn resolve_field(field: &FieldDescriptor) -> ResolvedField<'_> {
    let options = field.item_options.as_ref().unwrap_or(&field.options);

    let (tag, sub_schema) = match &field.kind {
        FieldKind::Embedded(schema) => (TypeTag::Embedded, Some(schema)),
        FieldKind::Array(item) => match item.as_ref() {
            FieldKind::Embedded(schema) => (TypeTag::Array, Some(schema)),
            FieldKind::Array(_) => (TypeTag::Array, None),
            scalar => (TypeTag::of_scalar(scalar), None),
        },
        scalar => (TypeTag::of_scalar(scalar), None),
    };

    ResolvedField { tag, options, sub_schema }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::INDEXED_OPTION;

    fn descriptor(kind: FieldKind) -> FieldDescriptor {
        FieldDescriptor {
            name: "f".into(),
            kind,
            options: FieldOptions::new(),
            item_options: None,
        }
    }

    #[test]
    fn test_scalar_tags() {
        assert_eq!(resolve_field(&descriptor(FieldKind::String)).tag, TypeTag::String);
        assert_eq!(resolve_field(&descriptor(FieldKind::ObjectId)).tag.as_str(), "objectid");
        assert_eq!(resolve_field(&descriptor(FieldKind::Mixed)).tag, TypeTag::Mixed);
    }

    #[test]
    fn test_array_of_scalars_takes_element_tag() {
        let desc = descriptor(FieldKind::array(FieldKind::String));
        let resolved = resolve_field(&desc);
        assert_eq!(resolved.tag, TypeTag::String);
        assert!(resolved.sub_schema.is_none());
    }

    #[test]
    fn test_sub_record_tags() {
        let sub = Schema::builder().without_id().field("v", FieldKind::String).build();

        let single = descriptor(FieldKind::Embedded(sub.clone()));
        let resolved = resolve_field(&single);
        assert_eq!(resolved.tag, TypeTag::Embedded);
        assert!(resolved.sub_schema.is_some());

        let many = descriptor(FieldKind::array_of(sub));
        let resolved = resolve_field(&many);
        assert_eq!(resolved.tag, TypeTag::Array);
        assert!(resolved.tag.is_embedded());
    }

    #[test]
    fn test_nested_arrays_have_no_sub_schema() {
        let desc = descriptor(FieldKind::array(FieldKind::array(FieldKind::Number)));
        let resolved = resolve_field(&desc);
        assert_eq!(resolved.tag, TypeTag::Array);
        assert!(resolved.sub_schema.is_none());
    }

    #[test]
    fn test_item_options_win() {
        let mut field = descriptor(FieldKind::array(FieldKind::ObjectId));
        field.item_options = Some(FieldOptions::new().indexed(true));
        assert!(resolve_field(&field).options.contains(INDEXED_OPTION));
    }
}
