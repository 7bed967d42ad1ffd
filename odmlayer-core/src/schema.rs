//! Schema descriptors and the records they describe.
//!
//! A [`Schema`] is declared once at startup with [`Schema::builder`] and handed to
//! the database for registration. Its field list always starts with the identity
//! field `_id`, followed by the declared fields in alphabetical order.
//!
//! A [`Record`] is one document of a schema: a value per declared field, plus a
//! flag telling whether it was created by the client or loaded from the store.
//!
//! # Example
//!
//! ```ignore
//! use odmlayer::prelude::*;
//!
//! let user = Schema::builder("User")
//!     .field(Field::string("name"))
//!     .field(Field::integer("age").optional())
//!     .build()?;
//!
//! assert_eq!(user.field_names().collect::<Vec<_>>(), ["_id", "age", "name"]);
//! ```

use bson::{
    Bson, Document, de::deserialize_from_bson, oid::ObjectId, ser::serialize_to_bson,
};
use serde::{Serialize, de::DeserializeOwned};
use serde_json::{Value, to_value};
use std::sync::Arc;

use crate::{
    error::{InitializationError, OdmResult, SchemaError, StoreError, ValidationError},
    field::Field,
    naming::check_field_name,
};

/// Name of the identity field of every schema.
pub const ID_FIELD: &str = "_id";

/// Immutable description of one record type.
#[derive(Debug, Clone, PartialEq)]
pub struct Schema {
    name: String,
    alias: Option<String>,
    database: Option<String>,
    fields: Vec<Field>,
    declared: usize,
}

impl Schema {
    /// Starts declaring a schema named `name`.
    pub fn builder(name: impl Into<String>) -> SchemaBuilder {
        SchemaBuilder {
            name: name.into(),
            alias: None,
            database: None,
            fields: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Explicitly declared alias.
    pub fn alias(&self) -> Option<&str> {
        self.alias.as_deref()
    }

    /// Name of the database the schema is pinned to, if any.
    pub fn database(&self) -> Option<&str> {
        self.database.as_deref()
    }

    /// All fields, identity first.
    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|field| field.name() == name)
    }

    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(Field::name)
    }

    /// The identity field.
    pub fn identity(&self) -> &Field {
        &self.fields[0]
    }

    /// Number of fields declared by the caller, identity included only if declared.
    pub fn declared(&self) -> usize {
        self.declared
    }

    /// Same schema with its alias resolved. Used at registration.
    pub(crate) fn with_alias(mut self, alias: String) -> Self {
        self.alias = Some(alias);
        self
    }
}

/// Builder for [`Schema`].
#[derive(Debug, Clone)]
pub struct SchemaBuilder {
    name: String,
    alias: Option<String>,
    database: Option<String>,
    fields: Vec<Field>,
}

impl SchemaBuilder {
    /// Publishes the collection under `alias` instead of the pluralized name.
    pub fn alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }

    /// Pins the schema to the database named `database`.
    pub fn database(mut self, database: impl Into<String>) -> Self {
        self.database = Some(database.into());
        self
    }

    pub fn field(mut self, field: Field) -> Self {
        self.fields.push(field);
        self
    }

    /// Checks field names and lays out the field list.
    ///
    /// # Errors
    ///
    /// - [`SchemaError::FieldNaming`] if a field name contains `__`
    /// - [`SchemaError::DuplicateField`] if a field is declared twice
    pub fn build(self) -> Result<Schema, SchemaError> {
        let declared = self.fields.len();
        let mut identity = None;
        let mut fields: Vec<Field> = Vec::with_capacity(declared + 1);

        for field in self.fields {
            check_field_name(field.name(), &self.name)?;
            let taken = identity.iter().chain(&fields).any(|f: &Field| f.name() == field.name());
            if taken {
                return Err(SchemaError::DuplicateField {
                    field: field.name().to_string(),
                    schema: self.name,
                });
            }
            if field.name() == ID_FIELD {
                identity = Some(field);
            } else {
                fields.push(field);
            }
        }

        fields.sort_by(|a, b| a.name().cmp(b.name()));
        fields.insert(0, identity.unwrap_or_else(|| Field::object_id(ID_FIELD).optional()));

        Ok(Schema {
            name: self.name,
            alias: self.alias,
            database: self.database,
            fields,
            declared,
        })
    }
}

/// One document of a schema.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    schema: Arc<Schema>,
    values: Document,
    new: bool,
}

impl Record {
    /// Builds a record from a field mapping.
    ///
    /// When `validate` is set, unknown keys are rejected and supplied values are
    /// checked against their field's constraints. Stored documents are loaded with
    /// `validate` off: unknown keys are dropped and values are coerced leniently.
    /// The identity comes from `fields`, else from `make_id` for new records.
    pub(crate) fn instantiate(
        schema: Arc<Schema>,
        mut fields: Document,
        new: bool,
        validate: bool,
        make_id: impl FnOnce() -> Option<Bson>,
    ) -> OdmResult<Self> {
        if validate {
            if let Some(key) = fields.keys().find(|key| schema.field(key).is_none()) {
                return Err(InitializationError::illegal_argument(schema.name(), key).into());
            }
        }

        let mut values = Document::new();
        for field in schema.fields() {
            let supplied = fields.remove(field.name()).unwrap_or(Bson::Null);
            let value = match field.coerce(supplied) {
                Ok(value) => value,
                Err(err) if validate => return Err(err.into()),
                Err(_) => Bson::Null,
            };
            if validate {
                field.validate(&value)?;
            }
            values.insert(field.name(), value);
        }

        if matches!(values.get(ID_FIELD), Some(Bson::Null)) && new {
            if let Some(id) = make_id() {
                values.insert(ID_FIELD, id);
            }
        }

        Ok(Record {
            schema,
            values,
            new,
        })
    }

    /// Builds a record from a serializable value.
    pub fn encode<T: Serialize>(schema: Arc<Schema>, value: &T) -> OdmResult<Self> {
        let fields = match serialize_to_bson(value).map_err(StoreError::from)? {
            Bson::Document(fields) => fields,
            other => {
                return Err(StoreError::InvalidDocument(format!(
                    "expected a document, found {:?}",
                    other.element_type()
                ))
                .into());
            }
        };
        Record::instantiate(schema, fields, true, true, || None)
    }

    /// Deserializes the record into `T`, skipping null fields.
    pub fn decode<T: DeserializeOwned>(&self) -> OdmResult<T> {
        let document = Bson::Document(self.to_document(true));
        Ok(deserialize_from_bson(document).map_err(StoreError::from)?)
    }

    /// JSON view of the record, null fields included.
    pub fn to_json(&self) -> OdmResult<Value> {
        Ok(to_value(&self.values)?)
    }

    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    /// Whether the record was created by the client rather than loaded.
    pub fn is_new(&self) -> bool {
        self.new
    }

    pub fn get(&self, key: &str) -> Option<&Bson> {
        self.values.get(key)
    }

    /// Assigns a field, coercing the value to the field's type.
    pub fn set(&mut self, key: &str, value: impl Into<Bson>) -> OdmResult<()> {
        let field = self
            .schema
            .field(key)
            .ok_or_else(|| InitializationError::illegal_argument(self.schema.name(), key))?;
        let value = field.coerce(value.into())?;
        self.values.insert(key, value);
        Ok(())
    }

    /// The identity, unless it is still null.
    pub fn id(&self) -> Option<&Bson> {
        self.values.get(ID_FIELD).filter(|id| !matches!(id, Bson::Null))
    }

    pub fn object_id(&self) -> Option<ObjectId> {
        match self.id() {
            Some(Bson::ObjectId(oid)) => Some(*oid),
            _ => None,
        }
    }

    pub(crate) fn set_id(&mut self, id: Bson) {
        self.values.insert(ID_FIELD, id);
    }

    pub(crate) fn mark_stored(&mut self) {
        self.new = false;
    }

    /// Field values in schema order. With `drop_null`, null fields are left out.
    pub fn to_document(&self, drop_null: bool) -> Document {
        self.values
            .iter()
            .filter(|(_, value)| !(drop_null && matches!(value, Bson::Null)))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect()
    }

    /// Full validation pass: required fields are present, values have the
    /// field's type and satisfy its constraints.
    pub fn validate(&self) -> Result<(), ValidationError> {
        for field in self.schema.fields() {
            match self.values.get(field.name()) {
                None | Some(Bson::Null) if field.is_required() => {
                    return Err(ValidationError::MissingField {
                        schema: self.schema.name().to_string(),
                        field: field.name().to_string(),
                    });
                }
                None | Some(Bson::Null) => {}
                Some(value) => {
                    let coerced = field.coerce(value.clone())?;
                    if &coerced != value {
                        return Err(ValidationError::WrongType {
                            field: field.name().to_string(),
                            expected: field.kind().name().to_string(),
                            found: crate::field::type_name(value).to_string(),
                        });
                    }
                    field.validate(value)?;
                }
            }
        }
        Ok(())
    }
}
