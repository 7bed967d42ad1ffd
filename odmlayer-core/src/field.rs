//! Field descriptors declaring a schema attribute's semantic type and constraints.
//!
//! A [`Field`] is immutable once declared. The schema owns its fields and consults
//! them to coerce supplied values, to validate records and to decide which update
//! modifiers may target an attribute.
//!
//! ```ignore
//! use odmlayer::field::Field;
//!
//! let name = Field::string("name").caption("Name").max_length(64);
//! let age = Field::integer("age").range(0, 150).optional();
//! ```

use bson::{Bson, oid::ObjectId};
use std::{fmt, ops::RangeInclusive};

use crate::error::ValidationError;

/// The semantic type of a field, with its type-specific constraints.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldKind {
    /// UTF-8 string, optionally bounded in length (in characters).
    String { max_length: Option<usize> },
    /// 64-bit integer, optionally bounded to an inclusive range.
    Integer { range: Option<RangeInclusive<i64>> },
    /// Array of arbitrary values, optionally bounded in size.
    List { max: Option<usize> },
    /// Boolean flag.
    Boolean,
    /// BSON object id.
    ObjectId,
}

impl FieldKind {
    /// Short name of the kind used in error messages.
    pub fn name(&self) -> &'static str {
        match self {
            FieldKind::String { .. } => "StringField",
            FieldKind::Integer { .. } => "IntegerField",
            FieldKind::List { .. } => "ListField",
            FieldKind::Boolean => "BooleanField",
            FieldKind::ObjectId => "ObjectIdField",
        }
    }

    /// Returns `true` when both kinds share the same variant, ignoring constraints.
    pub fn same_variant(&self, other: &FieldKind) -> bool {
        std::mem::discriminant(self) == std::mem::discriminant(other)
    }
}

impl fmt::Display for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One declared schema attribute.
#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    name: String,
    caption: Option<String>,
    kind: FieldKind,
    required: bool,
}

impl Field {
    fn new(name: impl Into<String>, kind: FieldKind) -> Self {
        Field {
            name: name.into(),
            caption: None,
            kind,
            required: true,
        }
    }

    /// Declares a string field.
    pub fn string(name: impl Into<String>) -> Self {
        Field::new(name, FieldKind::String { max_length: None })
    }

    /// Declares an integer field.
    pub fn integer(name: impl Into<String>) -> Self {
        Field::new(name, FieldKind::Integer { range: None })
    }

    /// Declares a list field.
    pub fn list(name: impl Into<String>) -> Self {
        Field::new(name, FieldKind::List { max: None })
    }

    /// Declares a boolean field.
    pub fn boolean(name: impl Into<String>) -> Self {
        Field::new(name, FieldKind::Boolean)
    }

    /// Declares an object id field.
    pub fn object_id(name: impl Into<String>) -> Self {
        Field::new(name, FieldKind::ObjectId)
    }

    /// Sets a human readable caption.
    pub fn caption(mut self, caption: impl Into<String>) -> Self {
        self.caption = Some(caption.into());
        self
    }

    /// Marks the field as not required.
    pub fn optional(mut self) -> Self {
        self.required = false;
        self
    }

    /// Bounds a string field's length. Ignored for other kinds.
    pub fn max_length(mut self, max_length: usize) -> Self {
        if let FieldKind::String { max_length: limit } = &mut self.kind {
            *limit = Some(max_length);
        }
        self
    }

    /// Bounds an integer field to `min..=max`. Ignored for other kinds.
    pub fn range(mut self, min: i64, max: i64) -> Self {
        if let FieldKind::Integer { range } = &mut self.kind {
            *range = Some(min..=max);
        }
        self
    }

    /// Bounds a list field's size. Ignored for other kinds.
    pub fn max_items(mut self, max_items: usize) -> Self {
        if let FieldKind::List { max } = &mut self.kind {
            *max = Some(max_items);
        }
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn caption_text(&self) -> &str {
        self.caption.as_deref().unwrap_or(&self.name)
    }

    pub fn kind(&self) -> &FieldKind {
        &self.kind
    }

    pub fn is_required(&self) -> bool {
        self.required
    }

    /// Converts a supplied value to the field's semantic type.
    ///
    /// `Null` passes through untouched. Values that have no sensible conversion
    /// fail with [`ValidationError::WrongType`].
    pub fn coerce(&self, value: Bson) -> Result<Bson, ValidationError> {
        if matches!(value, Bson::Null) {
            return Ok(value);
        }

        let coerced = match (&self.kind, &value) {
            (FieldKind::String { .. }, Bson::String(_)) => Some(value.clone()),
            (FieldKind::String { .. }, Bson::Int32(v)) => Some(Bson::String(v.to_string())),
            (FieldKind::String { .. }, Bson::Int64(v)) => Some(Bson::String(v.to_string())),
            (FieldKind::String { .. }, Bson::Double(v)) => Some(Bson::String(v.to_string())),
            (FieldKind::String { .. }, Bson::Boolean(v)) => Some(Bson::String(v.to_string())),
            (FieldKind::String { .. }, Bson::ObjectId(v)) => Some(Bson::String(v.to_hex())),

            (FieldKind::Integer { .. }, Bson::Int32(v)) => Some(Bson::Int64(*v as i64)),
            (FieldKind::Integer { .. }, Bson::Int64(_)) => Some(value.clone()),
            (FieldKind::Integer { .. }, Bson::Double(v)) if v.is_finite() => {
                Some(Bson::Int64(v.trunc() as i64))
            }
            (FieldKind::Integer { .. }, Bson::Boolean(v)) => Some(Bson::Int64(*v as i64)),
            (FieldKind::Integer { .. }, Bson::String(s)) => {
                s.trim().parse::<i64>().ok().map(Bson::Int64)
            }

            (FieldKind::List { .. }, Bson::Array(_)) => Some(value.clone()),

            (FieldKind::Boolean, Bson::Boolean(_)) => Some(value.clone()),
            (FieldKind::Boolean, Bson::Int32(v)) => Some(Bson::Boolean(*v != 0)),
            (FieldKind::Boolean, Bson::Int64(v)) => Some(Bson::Boolean(*v != 0)),

            (FieldKind::ObjectId, Bson::ObjectId(_)) => Some(value.clone()),
            (FieldKind::ObjectId, Bson::String(s)) => {
                ObjectId::parse_str(s).ok().map(Bson::ObjectId)
            }

            _ => None,
        };

        coerced.ok_or_else(|| ValidationError::WrongType {
            field: self.name.clone(),
            expected: self.kind.name().to_string(),
            found: type_name(&value).to_string(),
        })
    }

    /// Checks an already coerced value against the field's constraints.
    pub fn validate(&self, value: &Bson) -> Result<(), ValidationError> {
        let violation = match (&self.kind, value) {
            (FieldKind::String { max_length: Some(max) }, Bson::String(s))
                if s.chars().count() > *max =>
            {
                Some(format!("length {} exceeds {}", s.chars().count(), max))
            }
            (FieldKind::Integer { range: Some(range) }, Bson::Int64(v)) if !range.contains(v) => {
                Some(format!("{} is outside {}..={}", v, range.start(), range.end()))
            }
            (FieldKind::List { max: Some(max) }, Bson::Array(items)) if items.len() > *max => {
                Some(format!("{} items exceed {}", items.len(), max))
            }
            _ => None,
        };

        match violation {
            Some(constraint) => Err(ValidationError::Constraint {
                field: self.name.clone(),
                constraint,
            }),
            None => Ok(()),
        }
    }
}

/// Name of a value's BSON type as reported in error messages.
pub(crate) fn type_name(value: &Bson) -> &'static str {
    match value {
        Bson::Double(_) => "float",
        Bson::String(_) => "str",
        Bson::Array(_) => "list",
        Bson::Document(_) => "dict",
        Bson::Boolean(_) => "bool",
        Bson::Null => "null",
        Bson::Int32(_) | Bson::Int64(_) => "int",
        Bson::ObjectId(_) => "ObjectId",
        Bson::DateTime(_) => "datetime",
        _ => "unsupported",
    }
}
