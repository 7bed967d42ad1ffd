//! Error types and result types for the object-document mapper.
//!
//! Every caller-contract violation is reported synchronously, before any store I/O,
//! through one of the family enums below. Failures coming back from a store backend
//! are carried by [`StoreError`] and surface unmodified through [`OdmError::Store`].
//!
//! Use [`OdmResult<T>`] as the return type for operations that may touch the store.

use bson::error::Error as BsonError;
use serde_json::Error as SerdeJsonError;
use thiserror::Error;

/// Joins type or method names the way every message of this crate lists alternatives.
fn quoted(items: &[&str], sep: &str) -> String {
    items
        .iter()
        .map(|item| format!("\"{item}\""))
        .collect::<Vec<_>>()
        .join(sep)
}

/// Invalid schema declarations and registry binding conflicts.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SchemaError {
    /// A field name contains a double underscore.
    #[error(
        "Field name \"{field}\" of schema \"{schema}\" has the wrong name. Try switch to another. \
         Description: to avoid naming conflicts field name can not contain double underscores."
    )]
    FieldNaming { field: String, schema: String },
    /// The same field was declared twice on one schema.
    #[error("Field \"{field}\" is declared more than once on schema \"{schema}\"")]
    DuplicateField { field: String, schema: String },
    /// Alias (or another metadata name) starts with an underscore.
    #[error(
        "{kind} name \"{name}\" of schema \"{schema}\" has the wrong name. Try switch to another. \
         Description: to avoid naming conflicts metadata can not start with \"_\""
    )]
    MetadataNaming {
        kind: String,
        name: String,
        schema: String,
    },
    /// Either the class name or the alias is already published in the database.
    #[error(
        "Can not use the class name \"{name}\" or the alias \"{alias}\" as collection binding - \
         \"{taken}\" is already in use. Try switch to another."
    )]
    CollectionBinding {
        name: String,
        alias: String,
        taken: String,
    },
    /// No schema is published under the requested name or alias.
    #[error("Database \"{database}\" has no schema bound to \"{name}\"")]
    UnknownSchema { name: String, database: String },
    /// A record or model belongs to a schema that is not registered in this database.
    #[error("Schema \"{schema}\" is not bound to database \"{database}\"")]
    Unbound { schema: String, database: String },
}

impl SchemaError {
    pub fn field_naming(field: &str, schema: &str) -> Self {
        SchemaError::FieldNaming {
            field: field.to_string(),
            schema: schema.to_string(),
        }
    }

    pub fn metadata_naming(kind: &str, name: &str, schema: &str) -> Self {
        SchemaError::MetadataNaming {
            kind: kind.to_string(),
            name: name.to_string(),
            schema: schema.to_string(),
        }
    }

    pub fn collection_binding(name: &str, alias: &str, taken: &str) -> Self {
        SchemaError::CollectionBinding {
            name: name.to_string(),
            alias: alias.to_string(),
            taken: taken.to_string(),
        }
    }
}

/// Failures while constructing records or a database.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum InitializationError {
    /// A field that the schema does not declare was supplied.
    #[error("{schema}::new() takes illegal argument \"{field}\"")]
    IllegalArgument { schema: String, field: String },
    /// A new record was requested with no field values at all.
    #[error("Can not create \"{schema}\" instance with empty fieldset")]
    EmptyFieldset { schema: String },
    /// The acknowledged-write options are malformed.
    #[error("Safe write option \"{option}\" is invalid: {reason}")]
    SafeOptions { option: String, reason: String },
}

impl InitializationError {
    pub fn illegal_argument(schema: &str, field: &str) -> Self {
        InitializationError::IllegalArgument {
            schema: schema.to_string(),
            field: field.to_string(),
        }
    }
}

/// Misuse of the selector algebra.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SelectorError {
    /// A value of an unsupported type was passed to a selector constructor.
    #[error("{message}")]
    ValueType { message: String },
    /// Logical combination attempted against something that is not a selector.
    #[error(
        "{op} operation is applicable between selectors, not between \"{left}\" and \"{right}\""
    )]
    Operation {
        op: String,
        left: String,
        right: String,
    },
    /// A conditional selector mixes keyed and unkeyed children.
    #[error(
        "Can not create a conditional selector \"{selector}\" with an uncertain key. \
         Description: non-keyword arguments require a key and keyword arguments were given \
         or not all non-keyword arguments require a key."
    )]
    UncertainKey { selector: String },
    /// A key-requiring selector was rendered before it was bound to a field.
    #[error("Selector \"{selector}\" has no key and can not be rendered with one")]
    Unbound { selector: String },
}

impl SelectorError {
    /// Builds the message naming the offending value and the accepted types.
    pub fn value_type(selector: &str, keyword: bool, value: &str, types: &[&str], many: bool) -> Self {
        SelectorError::ValueType {
            message: format!(
                "{} value{} of selector \"{}\" must be {}, not \"{}\".",
                if keyword { "Keyword" } else { "Non-keyword" },
                if many { "s" } else { "" },
                selector,
                quoted(types, " or "),
                value,
            ),
        }
    }

    pub fn operation(op: &str, left: &str, right: &str) -> Self {
        let mut op = op.to_string();
        if let Some(first) = op.get_mut(0..1) {
            first.make_ascii_uppercase();
        }
        SelectorError::Operation {
            op,
            left: left.to_string(),
            right: right.to_string(),
        }
    }

    pub fn uncertain_key(selector: &str) -> Self {
        SelectorError::UncertainKey {
            selector: selector.to_string(),
        }
    }
}

/// Misuse of the modifier algebra.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ModifierError {
    /// A value of an unsupported type was passed to a modifier.
    #[error("Arguments of modifier \"{modifier}\" must be {expected}, not \"{found}\".")]
    ArgType {
        modifier: String,
        expected: String,
        found: String,
    },
    /// The modifier does not apply to the kind of field it was bound to.
    #[error("\"{modifier}\" modifier could be assigned to {expected}, not to \"{found}\"")]
    Associate {
        modifier: String,
        expected: String,
        found: String,
    },
    /// `pull` received a conditional selector.
    #[error(
        "\"pull\" modifier may take \"SimpleSelector\" or \"CombinedSelector\", \
         not \"ConditionalSelector\" (\"{selector}\")"
    )]
    Selector { selector: String },
    /// `prepare` was called before `associate`.
    #[error("\"{modifier}\" modifier is not bound to a field")]
    Unbound { modifier: String },
    /// `associate` was called a second time.
    #[error("\"{modifier}\" modifier is already bound to field \"{key}\"")]
    AlreadyBound { modifier: String, key: String },
}

impl ModifierError {
    pub fn arg_type(modifier: &str, expected: &[&str], found: &str) -> Self {
        ModifierError::ArgType {
            modifier: modifier.to_string(),
            expected: quoted(expected, " or "),
            found: found.to_string(),
        }
    }

    pub fn associate(modifier: &str, expected: &[&str], found: &str) -> Self {
        ModifierError::Associate {
            modifier: modifier.to_string(),
            expected: quoted(expected, " or "),
            found: found.to_string(),
        }
    }
}

/// Illegal use of the query builder.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum QueryError {
    /// The method may not follow the previously accepted one.
    #[error("\"{method}\" method can not be used after \"{last}\" method")]
    ForbiddenMethod { method: String, last: String },
    /// A filter, update, sort or subset key is not declared on the schema.
    #[error("Query method \"{method}\" takes illegal keyword argument \"{key}\"")]
    IllegalKey { method: String, key: String },
    /// A keyed argument received a selector that is already key-complete.
    #[error("Excess key \"{key}\" for \"{selector}\" selector in query method \"filter\"")]
    ExcessKey { key: String, selector: String },
    /// A positional argument received a selector that still needs a key.
    #[error("Selector \"{selector}\" passed to query method \"filter\" requires a key")]
    MissingKey { selector: String },
    /// The projection mixes inclusion and exclusion.
    #[error(
        "Subset must be either the inclusion or exclusion of fields. \
         Description: subset query contains {subset}"
    )]
    SubsetUniform { subset: String },
    /// Slices with a step other than one.
    #[error("Query instances do not support slice steps")]
    SliceSteps,
    /// Unknown materialization target.
    #[error("Argument \"cast_to\" of query method \"fetch\" must be \"record\" or \"map\" not \"{target}\"")]
    Fetch { target: String },
    /// `one` found nothing.
    #[error("Query on \"{provider}\" returned no documents")]
    NoResult { provider: String },
    /// A record-level operation needs an identity that is missing.
    #[error("Can not {action} a \"{schema}\" record without an identity")]
    MissingIdentity { action: String, schema: String },
}

impl QueryError {
    pub fn forbidden_method(method: &str, last: Option<&str>) -> Self {
        QueryError::ForbiddenMethod {
            method: method.to_string(),
            last: last.unwrap_or("<none>").to_string(),
        }
    }

    pub fn illegal_key(method: &str, key: &str) -> Self {
        QueryError::IllegalKey {
            method: method.to_string(),
            key: key.to_string(),
        }
    }

    pub fn fetch(target: &str) -> Self {
        QueryError::Fetch {
            target: target.to_string(),
        }
    }
}

/// Field values that break the schema's declared constraints.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    /// A required field is absent or null.
    #[error("Field \"{field}\" of \"{schema}\" is required")]
    MissingField { schema: String, field: String },
    /// The value can not be coerced to the field's semantic type.
    #[error("Field \"{field}\" expects a value of type \"{expected}\", not \"{found}\"")]
    WrongType {
        field: String,
        expected: String,
        found: String,
    },
    /// The value is of the right type but violates a constraint.
    #[error("Field \"{field}\" violates constraint: {constraint}")]
    Constraint { field: String, constraint: String },
}

/// Represents all possible errors that can occur when a backend talks to its store.
#[derive(Error, Debug)]
pub enum StoreError {
    /// Serialization/deserialization error when converting between document formats (BSON, JSON).
    #[error("Serialization error: {0}")]
    Serialization(String),
    /// Error during store initialization or connection setup.
    #[error("Initialization error: {0}")]
    Initialization(String),
    /// The document sent to or returned by the store has an invalid structure.
    #[error("Invalid document: {0}")]
    InvalidDocument(String),
    /// An error occurred in the underlying storage backend.
    #[error("Backend error: {0}")]
    Backend(String),
}

impl From<BsonError> for StoreError {
    fn from(err: BsonError) -> Self {
        StoreError::Serialization(err.to_string())
    }
}

impl From<SerdeJsonError> for StoreError {
    fn from(err: SerdeJsonError) -> Self {
        StoreError::Serialization(err.to_string())
    }
}

/// Any error raised by the mapper.
#[derive(Error, Debug)]
pub enum OdmError {
    #[error(transparent)]
    Schema(#[from] SchemaError),
    #[error(transparent)]
    Initialization(#[from] InitializationError),
    #[error(transparent)]
    Selector(#[from] SelectorError),
    #[error(transparent)]
    Modifier(#[from] ModifierError),
    #[error(transparent)]
    Query(#[from] QueryError),
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl From<BsonError> for OdmError {
    fn from(err: BsonError) -> Self {
        OdmError::Store(err.into())
    }
}

impl From<SerdeJsonError> for OdmError {
    fn from(err: SerdeJsonError) -> Self {
        OdmError::Store(err.into())
    }
}

/// A specialized `Result` type for mapper operations.
pub type OdmResult<T> = Result<T, OdmError>;

/// Result of selector construction and rendering.
pub type SelectorResult<T> = Result<T, SelectorError>;

/// Result of modifier construction and binding.
pub type ModifierResult<T> = Result<T, ModifierError>;

/// Result of a backend operation.
pub type StoreResult<T> = Result<T, StoreError>;
