//! Update modifiers.
//!
//! A [`Modifier`] renders one update operator for one field, e.g.
//! `inc(1)` bound to `age` renders `{"$inc": {"age": 1}}`. Modifiers are built
//! unbound and are bound exactly once, by the query builder, to the schema field
//! they target. Binding checks that the operator applies to the field's kind.

use bson::{Bson, Document, doc};

use crate::{
    error::{ModifierError, ModifierResult, OdmResult, QueryError},
    field::{Field, FieldKind, type_name},
    schema::Schema,
    selector::{Operand, Operator},
};

const VALUE_TYPES: &[&str] = &["ObjectId", "int", "float", "str", "bool", "list"];

/// Field kinds a modifier may be bound to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Applies {
    Any,
    List,
    Integer,
}

impl Applies {
    fn accepts(&self, kind: &FieldKind) -> bool {
        match self {
            Applies::Any => true,
            Applies::List => matches!(kind, FieldKind::List { .. }),
            Applies::Integer => matches!(kind, FieldKind::Integer { .. }),
        }
    }

    fn expected(&self) -> &'static [&'static str] {
        match self {
            Applies::Any => &["Field"],
            Applies::List => &["ListField"],
            Applies::Integer => &["IntegerField"],
        }
    }
}

/// One update operator waiting to be bound to a field.
#[derive(Debug, Clone, PartialEq)]
pub struct Modifier {
    name: &'static str,
    op: &'static str,
    value: Bson,
    applies: Applies,
    key: Option<String>,
}

impl Modifier {
    fn new(name: &'static str, op: &'static str, value: Bson, applies: Applies) -> Self {
        Modifier {
            name,
            op,
            value,
            applies,
            key: None,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Wire operator, e.g. `$addToSet`.
    pub fn op(&self) -> &'static str {
        self.op
    }

    pub fn value(&self) -> &Bson {
        &self.value
    }

    pub fn key(&self) -> Option<&str> {
        self.key.as_deref()
    }

    /// Binds the modifier to `key`, described by `field`.
    ///
    /// # Errors
    ///
    /// - [`ModifierError::AlreadyBound`] on a second call
    /// - [`ModifierError::Associate`] if the operator does not apply to the field's kind
    pub fn associate(&mut self, key: impl Into<String>, field: &Field) -> ModifierResult<()> {
        if let Some(bound) = &self.key {
            return Err(ModifierError::AlreadyBound {
                modifier: self.name.to_string(),
                key: bound.clone(),
            });
        }
        if !self.applies.accepts(field.kind()) {
            return Err(ModifierError::associate(
                self.name,
                self.applies.expected(),
                field.kind().name(),
            ));
        }
        self.key = Some(key.into());
        Ok(())
    }

    /// Renders `{"$op": {key: value}}`.
    pub fn prepare(&self) -> ModifierResult<Document> {
        let key = self.key.as_deref().ok_or_else(|| ModifierError::Unbound {
            modifier: self.name.to_string(),
        })?;
        let mut body = Document::new();
        body.insert(key, self.value.clone());
        let mut rendered = Document::new();
        rendered.insert(self.op, body);
        Ok(rendered)
    }
}

fn checked(modifier: &str, value: Bson) -> ModifierResult<Bson> {
    match value {
        Bson::ObjectId(_)
        | Bson::Int32(_)
        | Bson::Int64(_)
        | Bson::Double(_)
        | Bson::String(_)
        | Bson::Boolean(_)
        | Bson::Array(_) => Ok(value),
        other => Err(ModifierError::arg_type(modifier, VALUE_TYPES, type_name(&other))),
    }
}

fn checked_all<I, V>(modifier: &str, values: I) -> ModifierResult<Vec<Bson>>
where
    I: IntoIterator<Item = V>,
    V: Into<Bson>,
{
    values
        .into_iter()
        .map(|value| checked(modifier, value.into()))
        .collect()
}

/// `$set`. Applies to any field.
pub fn set(value: impl Into<Bson>) -> ModifierResult<Modifier> {
    let value = checked("set", value.into())?;
    Ok(Modifier::new("set", "$set", value, Applies::Any))
}

/// `$inc`. Integer fields only.
pub fn inc(by: i64) -> Modifier {
    Modifier::new("inc", "$inc", Bson::Int64(by), Applies::Integer)
}

/// `$addToSet` with one value.
pub fn add_to_set(value: impl Into<Bson>) -> ModifierResult<Modifier> {
    let value = checked("add_to_set", value.into())?;
    Ok(Modifier::new("add_to_set", "$addToSet", value, Applies::List))
}

/// `$addToSet`, using `$each` when given more than one value.
pub fn add_to_set_each<I, V>(values: I) -> ModifierResult<Modifier>
where
    I: IntoIterator<Item = V>,
    V: Into<Bson>,
{
    let mut values = checked_all("add_to_set", values)?;
    let value = if values.len() == 1 {
        values.remove(0)
    } else {
        Bson::Document(doc! { "$each": values })
    };
    Ok(Modifier::new("add_to_set", "$addToSet", value, Applies::List))
}

/// `$pop`: removes the first element when `first`, the last one otherwise.
pub fn pop(first: bool) -> Modifier {
    let value = if first { -1 } else { 1 };
    Modifier::new("pop", "$pop", Bson::Int32(value), Applies::List)
}

/// `$push` with one value.
pub fn push(value: impl Into<Bson>) -> ModifierResult<Modifier> {
    let value = checked("push", value.into())?;
    Ok(Modifier::new("push", "$push", value, Applies::List))
}

/// `$pushAll`, or `$push` when given a single value.
pub fn push_all<I, V>(values: I) -> ModifierResult<Modifier>
where
    I: IntoIterator<Item = V>,
    V: Into<Bson>,
{
    let mut values = checked_all("push", values)?;
    if values.len() == 1 {
        return Ok(Modifier::new("push", "$push", values.remove(0), Applies::List));
    }
    Ok(Modifier::new("push", "$pushAll", Bson::Array(values), Applies::List))
}

/// `$pull` of a value, or of every element matching a simple or combined selector.
///
/// # Errors
///
/// [`ModifierError::Selector`] for conditional selectors.
pub fn pull(operand: impl Into<Operand>) -> ModifierResult<Modifier> {
    let value = match operand.into() {
        Operand::Selector(selector) if selector.is_conditional() => {
            return Err(ModifierError::Selector {
                selector: selector.name().to_string(),
            });
        }
        Operand::Selector(selector) => {
            // A bare equality pulls the value itself.
            match selector.conditions() {
                [condition] if condition.op() == Operator::Eq => condition.value().clone(),
                _ => selector
                    .prepare(false)
                    .map_err(|_| ModifierError::Selector {
                        selector: selector.name().to_string(),
                    })?,
            }
        }
        Operand::Value(value) => checked("pull", value)?,
    };
    Ok(Modifier::new("pull", "$pull", value, Applies::List))
}

/// `$pullAll`, or `$pull` when given a single value.
pub fn pull_all<I, V>(values: I) -> ModifierResult<Modifier>
where
    I: IntoIterator<Item = V>,
    V: Into<Bson>,
{
    let mut values = checked_all("pull", values)?;
    if values.len() == 1 {
        return Ok(Modifier::new("pull", "$pull", values.remove(0), Applies::List));
    }
    Ok(Modifier::new("pull", "$pullAll", Bson::Array(values), Applies::List))
}

/// A modifier or a literal that becomes an implicit `set`.
#[derive(Debug, Clone, PartialEq)]
pub enum UpdateValue {
    Modifier(Modifier),
    Value(Bson),
}

impl From<Modifier> for UpdateValue {
    fn from(modifier: Modifier) -> Self {
        UpdateValue::Modifier(modifier)
    }
}

macro_rules! update_value_from {
    ($($ty:ty),*) => {
        $(
            impl From<$ty> for UpdateValue {
                fn from(value: $ty) -> Self {
                    UpdateValue::Value(Bson::from(value))
                }
            }
        )*
    };
}

update_value_from!(Bson, &str, String, i32, i64, f64, bool, bson::oid::ObjectId, Vec<Bson>);

/// Arguments of an update: per-field modifiers plus the `multi` / `upsert` flags.
///
/// # Example
///
/// ```ignore
/// let spec = UpdateSpec::new().field("age", inc(1)).field("name", "bob").upsert(true);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct UpdateSpec {
    entries: Vec<(String, UpdateValue)>,
    multi: bool,
    upsert: bool,
}

impl Default for UpdateSpec {
    fn default() -> Self {
        UpdateSpec {
            entries: Vec::new(),
            multi: true,
            upsert: false,
        }
    }
}

impl UpdateSpec {
    pub fn new() -> Self {
        Self::default()
    }

    /// Updates `key` with a modifier, or sets it to a literal.
    pub fn field(mut self, key: impl Into<String>, value: impl Into<UpdateValue>) -> Self {
        self.entries.push((key.into(), value.into()));
        self
    }

    /// Whether every matching document is updated. Defaults to `true`.
    pub fn multi(mut self, multi: bool) -> Self {
        self.multi = multi;
        self
    }

    /// Whether a document is inserted when nothing matches. Defaults to `false`.
    pub fn upsert(mut self, upsert: bool) -> Self {
        self.upsert = upsert;
        self
    }

    pub fn is_multi(&self) -> bool {
        self.multi
    }

    pub fn is_upsert(&self) -> bool {
        self.upsert
    }

    /// Binds every entry to its schema field and merges the rendered operators.
    ///
    /// # Errors
    ///
    /// - [`QueryError::IllegalKey`] for keys the schema does not declare
    /// - [`ModifierError`] for literals of unsupported types or kind mismatches
    pub fn render(&self, schema: &Schema) -> OdmResult<Document> {
        let mut update = Document::new();
        for (key, value) in &self.entries {
            let field = schema
                .field(key)
                .ok_or_else(|| QueryError::illegal_key("update", key))?;
            let mut modifier = match value {
                UpdateValue::Modifier(modifier) => modifier.clone(),
                UpdateValue::Value(value) => set(value.clone())?,
            };
            modifier.associate(key.as_str(), field)?;

            for (op, body) in modifier.prepare()? {
                let Bson::Document(body) = body else {
                    continue;
                };
                match update.get_document_mut(&op) {
                    Ok(existing) => {
                        for (field, value) in body {
                            existing.insert(field, value);
                        }
                    }
                    Err(_) => {
                        update.insert(op, body);
                    }
                }
            }
        }
        Ok(update)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::selector::{gt, in_, or_};

    fn bind(mut modifier: Modifier, field: Field) -> Document {
        let key = field.name().to_string();
        modifier.associate(key, &field).unwrap();
        modifier.prepare().unwrap()
    }

    #[test]
    fn test_inc_renders_operator() {
        assert_eq!(bind(inc(1), Field::integer("age")), doc! { "$inc": { "age": 1_i64 } });
    }

    #[test]
    fn test_add_to_set_uses_each_for_many() {
        assert_eq!(
            bind(add_to_set_each(["a", "b"]).unwrap(), Field::list("tags")),
            doc! { "$addToSet": { "tags": { "$each": ["a", "b"] } } }
        );
        assert_eq!(
            bind(add_to_set("a").unwrap(), Field::list("tags")),
            doc! { "$addToSet": { "tags": "a" } }
        );
    }

    #[test]
    fn test_pop_direction() {
        assert_eq!(bind(pop(true), Field::list("tags")), doc! { "$pop": { "tags": -1 } });
        assert_eq!(bind(pop(false), Field::list("tags")), doc! { "$pop": { "tags": 1 } });
    }

    #[test]
    fn test_push_and_pull_many() {
        assert_eq!(
            bind(push_all([1, 2]).unwrap(), Field::list("n")),
            doc! { "$pushAll": { "n": [1, 2] } }
        );
        assert_eq!(
            bind(pull_all([1, 2]).unwrap(), Field::list("n")),
            doc! { "$pullAll": { "n": [1, 2] } }
        );
    }

    #[test]
    fn test_pull_selector_renders_keyless() {
        assert_eq!(
            bind(pull(gt(3).unwrap()).unwrap(), Field::list("n")),
            doc! { "$pull": { "n": { "$gt": 3 } } }
        );
        assert_eq!(
            bind(pull(in_([1, 2]).unwrap()).unwrap(), Field::list("n")),
            doc! { "$pull": { "n": { "$in": [1, 2] } } }
        );
    }

    #[test]
    fn test_pull_rejects_conditional() {
        let conditional = or_([gt(1).unwrap().bound("a"), gt(2).unwrap().bound("b")]).unwrap();
        assert!(matches!(pull(conditional), Err(ModifierError::Selector { .. })));
    }

    #[test]
    fn test_kind_applicability() {
        let err = inc(1).associate("name", &Field::string("name")).unwrap_err();
        assert!(matches!(err, ModifierError::Associate { .. }));
        assert!(push(1).unwrap().associate("age", &Field::integer("age")).is_err());
        assert!(set(1).unwrap().associate("name", &Field::string("name")).is_ok());
    }

    #[test]
    fn test_binding_is_write_once() {
        let field = Field::integer("age");
        let mut modifier = inc(1);
        assert!(matches!(modifier.prepare(), Err(ModifierError::Unbound { .. })));
        modifier.associate("age", &field).unwrap();
        assert!(matches!(
            modifier.associate("age", &field),
            Err(ModifierError::AlreadyBound { .. })
        ));
    }

    #[test]
    fn test_arg_types() {
        assert!(matches!(set(Bson::Null), Err(ModifierError::ArgType { .. })));
        assert!(push_all(vec![Bson::Document(doc! {})]).is_err());
    }
}
