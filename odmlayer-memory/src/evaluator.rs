//! Query and update evaluation for in-memory documents.
//!
//! This module evaluates the MongoDB-style wire documents the query builder
//! renders: query documents against rows, projections, sort keys, and update
//! operator documents applied in place.

use bson::{Bson, Document, datetime::DateTime, oid::ObjectId};
use std::cmp::Ordering;

use odmlayer_core::error::{StoreError, StoreResult};

/// Type-erased, comparable representation of BSON values.
///
/// Integers and floats are normalized to `f64`. Values of different kinds order
/// by kind, in MongoDB's order: null, numbers, strings, documents, arrays,
/// object ids, booleans, dates.
#[derive(Debug)]
pub(crate) enum Comparable<'a> {
    Null,
    Number(f64),
    String(&'a str),
    Map(&'a Document),
    Array(Vec<Comparable<'a>>),
    ObjectId(ObjectId),
    Bool(bool),
    DateTime(DateTime),
}

impl<'a> From<&'a Bson> for Comparable<'a> {
    fn from(bson: &'a Bson) -> Self {
        match bson {
            Bson::Boolean(value) => Comparable::Bool(*value),
            Bson::Int32(value) => Comparable::Number(*value as f64),
            Bson::Int64(value) => Comparable::Number(*value as f64),
            Bson::Double(value) => Comparable::Number(*value),
            Bson::DateTime(value) => Comparable::DateTime(*value),
            Bson::String(value) => Comparable::String(value),
            Bson::ObjectId(value) => Comparable::ObjectId(*value),
            Bson::Array(arr) => Comparable::Array(arr.iter().map(Comparable::from).collect()),
            Bson::Document(doc) => Comparable::Map(doc),
            _ => Comparable::Null,
        }
    }
}

impl Comparable<'_> {
    fn rank(&self) -> u8 {
        match self {
            Comparable::Null => 0,
            Comparable::Number(_) => 1,
            Comparable::String(_) => 2,
            Comparable::Map(_) => 3,
            Comparable::Array(_) => 4,
            Comparable::ObjectId(_) => 5,
            Comparable::Bool(_) => 6,
            Comparable::DateTime(_) => 7,
        }
    }

    /// Total order used for sorting.
    fn total_cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Comparable::Number(a), Comparable::Number(b)) => a.total_cmp(b),
            (Comparable::String(a), Comparable::String(b)) => a.cmp(b),
            (Comparable::ObjectId(a), Comparable::ObjectId(b)) => a.cmp(b),
            (Comparable::Bool(a), Comparable::Bool(b)) => a.cmp(b),
            (Comparable::DateTime(a), Comparable::DateTime(b)) => a.cmp(b),
            (Comparable::Array(a), Comparable::Array(b)) => {
                for (left, right) in a.iter().zip(b) {
                    match left.total_cmp(right) {
                        Ordering::Equal => continue,
                        ordering => return ordering,
                    }
                }
                a.len().cmp(&b.len())
            }
            (Comparable::Map(a), Comparable::Map(b)) => a.to_string().cmp(&b.to_string()),
            _ => self.rank().cmp(&other.rank()),
        }
    }
}

impl PartialEq for Comparable<'_> {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Comparable::Null, Comparable::Null) => true,
            (Comparable::Bool(a), Comparable::Bool(b)) => a == b,
            (Comparable::Number(a), Comparable::Number(b)) => a == b,
            (Comparable::DateTime(a), Comparable::DateTime(b)) => a == b,
            (Comparable::String(a), Comparable::String(b)) => a == b,
            (Comparable::ObjectId(a), Comparable::ObjectId(b)) => a == b,
            (Comparable::Array(a), Comparable::Array(b)) => a == b,
            (Comparable::Map(a), Comparable::Map(b)) => a == b,
            _ => false,
        }
    }
}

impl PartialOrd for Comparable<'_> {
    /// Range comparisons only hold between values of the same kind.
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        match (self, other) {
            (Comparable::Bool(a), Comparable::Bool(b)) => a.partial_cmp(b),
            (Comparable::Number(a), Comparable::Number(b)) => a.partial_cmp(b),
            (Comparable::DateTime(a), Comparable::DateTime(b)) => a.partial_cmp(b),
            (Comparable::String(a), Comparable::String(b)) => a.partial_cmp(b),
            (Comparable::ObjectId(a), Comparable::ObjectId(b)) => a.partial_cmp(b),
            _ => None,
        }
    }
}

fn same(left: &Bson, right: &Bson) -> bool {
    Comparable::from(left) == Comparable::from(right)
}

fn is_operator_document(value: &Bson) -> bool {
    match value {
        Bson::Document(doc) => !doc.is_empty() && doc.keys().all(|key| key.starts_with('$')),
        _ => false,
    }
}

fn invalid(message: String) -> StoreError {
    StoreError::InvalidDocument(message)
}

/// Resolves a dotted path inside a document.
fn lookup<'a>(document: &'a Document, path: &str) -> Option<&'a Bson> {
    let mut parts = path.split('.');
    let mut current = document.get(parts.next()?)?;
    for part in parts {
        current = match current {
            Bson::Document(doc) => doc.get(part)?,
            Bson::Array(items) => items.get(part.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(current)
}

/// Evaluates wire query documents against rows.
pub(crate) struct DocumentEvaluator<'a> {
    document: &'a Document,
}

impl<'a> DocumentEvaluator<'a> {
    pub fn new(document: &'a Document) -> Self {
        Self { document }
    }

    /// Returns `true` if the row satisfies every entry of `filter`.
    pub fn matches(&self, filter: &Document) -> StoreResult<bool> {
        for (key, value) in filter {
            let matched = match key.as_str() {
                "$and" => self.all_of(key, value)?,
                "$or" => self.any_of(key, value)?,
                "$nor" => !self.any_of(key, value)?,
                op if op.starts_with('$') => {
                    return Err(invalid(format!("unknown top level operator \"{op}\"")));
                }
                path => {
                    let field = lookup(self.document, path);
                    if is_operator_document(value) {
                        match_expression(field, value)?
                    } else {
                        equals(field, value)
                    }
                }
            };
            if !matched {
                return Ok(false);
            }
        }
        Ok(true)
    }

    fn clauses<'f>(op: &str, value: &'f Bson) -> StoreResult<Vec<&'f Document>> {
        let Bson::Array(items) = value else {
            return Err(invalid(format!("\"{op}\" expects an array")));
        };
        items
            .iter()
            .map(|item| match item {
                Bson::Document(doc) => Ok(doc),
                _ => Err(invalid(format!("\"{op}\" entries must be documents"))),
            })
            .collect()
    }

    fn all_of(&self, op: &str, value: &Bson) -> StoreResult<bool> {
        for clause in Self::clauses(op, value)? {
            if !self.matches(clause)? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    fn any_of(&self, op: &str, value: &Bson) -> StoreResult<bool> {
        for clause in Self::clauses(op, value)? {
            if self.matches(clause)? {
                return Ok(true);
            }
        }
        Ok(false)
    }

    pub fn filter_documents<'d>(
        documents: impl IntoIterator<Item = &'d Document>,
        filter: &Document,
    ) -> StoreResult<Vec<&'d Document>> {
        let mut matched = Vec::new();
        for document in documents {
            if DocumentEvaluator::new(document).matches(filter)? {
                matched.push(document);
            }
        }
        Ok(matched)
    }
}

/// Bare equality: a missing field equals null, an array field contains the value.
fn equals(field: Option<&Bson>, value: &Bson) -> bool {
    match field {
        None => matches!(value, Bson::Null),
        Some(field) if same(field, value) => true,
        Some(Bson::Array(items)) => items.iter().any(|item| same(item, value)),
        Some(_) => false,
    }
}

/// Range comparison; array fields match when any element does.
fn compare(field: Option<&Bson>, value: &Bson, accept: fn(Ordering) -> bool) -> bool {
    let test = |candidate: &Bson| {
        Comparable::from(candidate)
            .partial_cmp(&Comparable::from(value))
            .is_some_and(accept)
    };
    match field {
        None => false,
        Some(Bson::Array(items)) => items.iter().any(test),
        Some(field) => test(field),
    }
}

fn as_integer(value: &Bson) -> Option<i64> {
    match value {
        Bson::Int32(v) => Some(*v as i64),
        Bson::Int64(v) => Some(*v),
        Bson::Double(v) if v.fract() == 0.0 => Some(*v as i64),
        _ => None,
    }
}

fn list<'v>(op: &str, value: &'v Bson) -> StoreResult<&'v [Bson]> {
    match value {
        Bson::Array(items) => Ok(items),
        _ => Err(invalid(format!("\"{op}\" expects an array"))),
    }
}

/// Evaluates an operator document such as `{"$gt": 1, "$lt": 9}` against a field.
pub(crate) fn match_expression(field: Option<&Bson>, expression: &Bson) -> StoreResult<bool> {
    let Bson::Document(expression) = expression else {
        return Ok(equals(field, expression));
    };

    for (op, value) in expression {
        let matched = match op.as_str() {
            "$eq" => equals(field, value),
            "$ne" => !equals(field, value),
            "$gt" => compare(field, value, Ordering::is_gt),
            "$gte" => compare(field, value, Ordering::is_ge),
            "$lt" => compare(field, value, Ordering::is_lt),
            "$lte" => compare(field, value, Ordering::is_le),
            "$in" => list(op, value)?.iter().any(|item| equals(field, item)),
            "$nin" => !list(op, value)?.iter().any(|item| equals(field, item)),
            "$all" => match field {
                Some(Bson::Array(items)) => list(op, value)?
                    .iter()
                    .all(|needed| items.iter().any(|item| same(item, needed))),
                _ => false,
            },
            "$exists" => {
                let present = field.is_some();
                match value {
                    Bson::Boolean(expected) => present == *expected,
                    other => present == as_integer(other).is_some_and(|v| v != 0),
                }
            }
            "$size" => match (field, as_integer(value)) {
                (Some(Bson::Array(items)), Some(size)) => items.len() as i64 == size,
                _ => false,
            },
            "$mod" => {
                let (divisor, remainder) = match list(op, value)? {
                    [divisor, remainder] => (as_integer(divisor), as_integer(remainder)),
                    _ => (None, None),
                };
                let (Some(divisor), Some(remainder)) = (divisor, remainder) else {
                    return Err(invalid("\"$mod\" expects [divisor, remainder]".to_string()));
                };
                if divisor == 0 {
                    return Err(invalid("\"$mod\" divisor can not be zero".to_string()));
                }
                match field {
                    Some(Bson::Array(items)) => items
                        .iter()
                        .filter_map(as_integer)
                        .any(|v| v.wrapping_rem(divisor) == remainder),
                    Some(value) => {
                        as_integer(value).is_some_and(|v| v.wrapping_rem(divisor) == remainder)
                    }
                    None => false,
                }
            }
            other => return Err(invalid(format!("unknown operator \"{other}\""))),
        };
        if !matched {
            return Ok(false);
        }
    }
    Ok(true)
}

/// Applies an inclusion or exclusion projection.
pub(crate) fn project(document: &Document, projection: &Document) -> Document {
    let flag = |value: &Bson| match value {
        Bson::Boolean(flag) => *flag,
        other => as_integer(other).is_none_or(|v| v != 0),
    };
    let include_id = projection.get("_id").is_none_or(flag);
    let inclusion = projection
        .iter()
        .any(|(key, value)| key != "_id" && flag(value));

    document
        .iter()
        .filter(|(key, _)| {
            if key.as_str() == "_id" {
                return include_id;
            }
            match projection.get(key.as_str()) {
                Some(value) => flag(value),
                None => !inclusion,
            }
        })
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect()
}

/// Orders two rows by `keys`, most significant first. Missing fields sort as null.
pub(crate) fn compare_rows(left: &Document, right: &Document, keys: &[(String, i32)]) -> Ordering {
    for (key, direction) in keys {
        let a = lookup(left, key).map(Comparable::from).unwrap_or(Comparable::Null);
        let b = lookup(right, key).map(Comparable::from).unwrap_or(Comparable::Null);
        let ordering = if *direction < 0 {
            b.total_cmp(&a)
        } else {
            a.total_cmp(&b)
        };
        if ordering != Ordering::Equal {
            return ordering;
        }
    }
    Ordering::Equal
}

/// Seed of an upserted row: the equality parts of the filter.
pub(crate) fn upsert_seed(filter: &Document) -> Document {
    let mut seed = Document::new();
    for (key, value) in filter {
        if key.starts_with('$') {
            if key == "$and" {
                if let Bson::Array(clauses) = value {
                    for clause in clauses.iter().filter_map(Bson::as_document) {
                        for (key, value) in upsert_seed(clause) {
                            seed.insert(key, value);
                        }
                    }
                }
            }
            continue;
        }
        match value {
            Bson::Document(expression) if is_operator_document(value) => {
                if let Some(eq) = expression.get("$eq") {
                    seed.insert(key.clone(), eq.clone());
                }
            }
            _ => {
                seed.insert(key.clone(), value.clone());
            }
        }
    }
    seed
}

fn array_field<'d>(document: &'d mut Document, key: &str, op: &str) -> StoreResult<&'d mut Vec<Bson>> {
    if !document.contains_key(key) {
        document.insert(key, Bson::Array(Vec::new()));
    }
    match document.get_mut(key) {
        Some(Bson::Array(items)) => Ok(items),
        _ => Err(StoreError::Backend(format!(
            "Cannot apply {op} to non-array field \"{key}\""
        ))),
    }
}

fn add_numbers(current: &Bson, by: &Bson, key: &str) -> StoreResult<Bson> {
    let sum = match (current, by) {
        (Bson::Int32(a), Bson::Int32(b)) => a.checked_add(*b).map(Bson::Int32),
        (Bson::Int32(a), Bson::Int64(b)) => (*a as i64).checked_add(*b).map(Bson::Int64),
        (Bson::Int64(a), Bson::Int32(b)) => a.checked_add(*b as i64).map(Bson::Int64),
        (Bson::Int64(a), Bson::Int64(b)) => a.checked_add(*b).map(Bson::Int64),
        (Bson::Double(a), Bson::Double(b)) => Some(Bson::Double(a + b)),
        (Bson::Double(a), Bson::Int32(b)) => Some(Bson::Double(a + *b as f64)),
        (Bson::Double(a), Bson::Int64(b)) => Some(Bson::Double(a + *b as f64)),
        (Bson::Int32(a), Bson::Double(b)) => Some(Bson::Double(*a as f64 + b)),
        (Bson::Int64(a), Bson::Double(b)) => Some(Bson::Double(*a as f64 + b)),
        _ => {
            return Err(StoreError::Backend(format!(
                "Cannot apply $inc to non-numeric field \"{key}\""
            )));
        }
    };
    sum.ok_or_else(|| StoreError::Backend(format!("$inc overflows field \"{key}\"")))
}

/// Applies an update operator document to `document` in place.
pub(crate) fn apply_update(document: &mut Document, update: &Document) -> StoreResult<()> {
    for (op, body) in update {
        let Bson::Document(body) = body else {
            return Err(invalid(format!("\"{op}\" expects a document")));
        };
        for (key, value) in body {
            if key == "_id" && op != "$set" && op != "$setOnInsert" {
                return Err(StoreError::Backend(format!("Cannot apply {op} to \"_id\"")));
            }
            match op.as_str() {
                "$set" => {
                    document.insert(key.clone(), value.clone());
                }
                // Only applies when the update inserts, see `apply_set_on_insert`.
                "$setOnInsert" => {}
                "$inc" => {
                    let updated = match document.get(key) {
                        None | Some(Bson::Null) => value.clone(),
                        Some(current) => add_numbers(current, value, key)?,
                    };
                    document.insert(key.clone(), updated);
                }
                "$addToSet" => {
                    let items = array_field(document, key, op)?;
                    let values = match value {
                        Bson::Document(each) if each.contains_key("$each") => {
                            list("$each", each.get("$each").unwrap_or(&Bson::Null))?.to_vec()
                        }
                        other => vec![other.clone()],
                    };
                    for value in values {
                        if !items.iter().any(|item| same(item, &value)) {
                            items.push(value);
                        }
                    }
                }
                "$pop" => {
                    let items = array_field(document, key, op)?;
                    if as_integer(value).is_some_and(|v| v < 0) {
                        if !items.is_empty() {
                            items.remove(0);
                        }
                    } else {
                        items.pop();
                    }
                }
                "$push" => {
                    let items = array_field(document, key, op)?;
                    match value {
                        Bson::Document(each) if each.contains_key("$each") => {
                            let values = list("$each", each.get("$each").unwrap_or(&Bson::Null))?;
                            items.extend(values.iter().cloned());
                        }
                        other => items.push(other.clone()),
                    }
                }
                "$pushAll" => {
                    let values = list(op, value)?.to_vec();
                    array_field(document, key, op)?.extend(values);
                }
                "$pull" => {
                    let items = array_field(document, key, op)?;
                    let mut kept = Vec::with_capacity(items.len());
                    for item in items.drain(..) {
                        let pulled = if is_operator_document(value) {
                            match_expression(Some(&item), value)?
                        } else {
                            same(&item, value)
                        };
                        if !pulled {
                            kept.push(item);
                        }
                    }
                    *items = kept;
                }
                "$pullAll" => {
                    let values = list(op, value)?.to_vec();
                    array_field(document, key, op)?
                        .retain(|item| !values.iter().any(|value| same(item, value)));
                }
                other => return Err(invalid(format!("unknown update operator \"{other}\""))),
            }
        }
    }
    Ok(())
}

/// Applies the `$setOnInsert` part of an update to a freshly upserted row.
pub(crate) fn apply_set_on_insert(document: &mut Document, update: &Document) -> StoreResult<()> {
    match update.get("$setOnInsert") {
        None => Ok(()),
        Some(Bson::Document(body)) => {
            for (key, value) in body {
                document.insert(key.clone(), value.clone());
            }
            Ok(())
        }
        Some(_) => Err(invalid("\"$setOnInsert\" expects a document".to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;

    fn matches(document: Document, filter: Document) -> bool {
        DocumentEvaluator::new(&document).matches(&filter).unwrap()
    }

    #[test]
    fn test_bare_equality_and_array_contains() {
        let row = doc! { "name": "bob", "tags": ["a", "b"], "age": 3_i64 };
        assert!(matches(row.clone(), doc! { "name": "bob" }));
        assert!(matches(row.clone(), doc! { "tags": "a" }));
        assert!(matches(row.clone(), doc! { "age": 3 }));
        assert!(!matches(row.clone(), doc! { "name": "alice" }));
        assert!(matches(row, doc! { "missing": null }));
    }

    #[test]
    fn test_comparison_operators() {
        let row = doc! { "age": 30_i64, "name": "m" };
        assert!(matches(row.clone(), doc! { "age": { "$gt": 18, "$lte": 30 } }));
        assert!(!matches(row.clone(), doc! { "age": { "$lt": 30 } }));
        assert!(!matches(row.clone(), doc! { "name": { "$gt": 1 } }));
        assert!(matches(row.clone(), doc! { "age": { "$ne": 1 } }));
        assert!(matches(row, doc! { "age": { "$in": [1, 30] }, "name": { "$nin": ["a"] } }));
    }

    #[test]
    fn test_array_operators() {
        let row = doc! { "tags": ["a", "b", "c"], "n": 7 };
        assert!(matches(row.clone(), doc! { "tags": { "$all": ["a", "c"] } }));
        assert!(!matches(row.clone(), doc! { "tags": { "$all": ["a", "z"] } }));
        assert!(matches(row.clone(), doc! { "tags": { "$size": 3 } }));
        assert!(matches(row.clone(), doc! { "n": { "$mod": [3, 1] } }));
        assert!(matches(row.clone(), doc! { "n": { "$exists": true }, "x": { "$exists": false } }));
        assert!(matches(row, doc! { "n": { "$eq": 7 } }));
    }

    #[test]
    fn test_modulo_at_integer_bounds() {
        let filter = doc! { "n": { "$mod": [-1_i64, 0_i64] } };
        assert!(matches(doc! { "n": i64::MIN }, filter.clone()));
        assert!(matches(doc! { "n": [i64::MIN] }, filter.clone()));
        assert!(!matches(doc! { "n": "x" }, filter));
    }

    #[test]
    fn test_logical_operators() {
        let row = doc! { "a": 1, "b": 2 };
        assert!(matches(row.clone(), doc! { "$or": [{ "a": 5 }, { "b": 2 }] }));
        assert!(matches(row.clone(), doc! { "$and": [{ "a": 1 }, { "b": { "$gt": 1 } }] }));
        assert!(!matches(row.clone(), doc! { "$nor": [{ "a": 1 }] }));
        assert!(DocumentEvaluator::new(&row).matches(&doc! { "$xor": [] }).is_err());
    }

    #[test]
    fn test_projection() {
        let row = doc! { "_id": 1, "name": "bob", "age": 3 };
        assert_eq!(project(&row, &doc! { "name": 1, "_id": 0 }), doc! { "name": "bob" });
        assert_eq!(project(&row, &doc! { "age": 0 }), doc! { "_id": 1, "name": "bob" });
        assert_eq!(project(&row, &doc! { "name": 1 }), doc! { "_id": 1, "name": "bob" });
    }

    #[test]
    fn test_set_on_insert_only_applies_to_inserts() {
        let update = doc! { "$setOnInsert": { "_id": 7, "name": "new" }, "$set": { "n": 1 } };
        let mut row = doc! { "_id": 1, "name": "old" };
        apply_update(&mut row, &update).unwrap();
        assert_eq!(row, doc! { "_id": 1, "name": "old", "n": 1 });

        let mut seeded = doc! {};
        apply_update(&mut seeded, &update).unwrap();
        apply_set_on_insert(&mut seeded, &update).unwrap();
        assert_eq!(seeded, doc! { "n": 1, "_id": 7, "name": "new" });
    }

    #[test]
    fn test_sort_order() {
        let mut rows = vec![
            doc! { "a": 1, "b": "x" },
            doc! { "a": 2, "b": "y" },
            doc! { "a": 1, "b": "z" },
            doc! { "b": "w" },
        ];
        let keys = vec![("a".to_string(), -1), ("b".to_string(), 1)];
        rows.sort_by(|l, r| compare_rows(l, r, &keys));
        let order: Vec<&str> = rows.iter().map(|row| row.get_str("b").unwrap()).collect();
        assert_eq!(order, vec!["y", "x", "z", "w"]);
    }

    #[test]
    fn test_apply_update_operators() {
        let mut row = doc! { "n": 1_i64, "tags": ["a", "b", "c"] };
        apply_update(&mut row, &doc! { "$inc": { "n": 2_i64 }, "$set": { "name": "bob" } }).unwrap();
        assert_eq!(row.get_i64("n").unwrap(), 3);
        assert_eq!(row.get_str("name").unwrap(), "bob");

        apply_update(&mut row, &doc! { "$addToSet": { "tags": { "$each": ["a", "d"] } } }).unwrap();
        apply_update(&mut row, &doc! { "$pop": { "tags": -1 } }).unwrap();
        apply_update(&mut row, &doc! { "$pullAll": { "tags": ["c"] } }).unwrap();
        apply_update(&mut row, &doc! { "$pushAll": { "tags": ["e", "e"] } }).unwrap();
        apply_update(&mut row, &doc! { "$pull": { "tags": "e" } }).unwrap();
        apply_update(&mut row, &doc! { "$push": { "list": 5 } }).unwrap();
        assert_eq!(row.get_array("tags").unwrap(), &vec![Bson::from("b"), Bson::from("d")]);
        assert_eq!(row.get_array("list").unwrap(), &vec![Bson::Int32(5)]);

        apply_update(&mut row, &doc! { "$pull": { "list": { "$gt": 3 } } }).unwrap();
        assert!(row.get_array("list").unwrap().is_empty());

        apply_update(&mut row, &doc! { "$push": { "list": { "$each": [1, 2] } } }).unwrap();
        assert_eq!(row.get_array("list").unwrap(), &vec![Bson::Int32(1), Bson::Int32(2)]);

        assert!(apply_update(&mut row, &doc! { "$inc": { "name": 1 } }).is_err());
        assert!(apply_update(&mut row, &doc! { "$push": { "n": 1 } }).is_err());
    }

    #[test]
    fn test_upsert_seed_keeps_equalities() {
        let filter = doc! {
            "name": "bob",
            "age": { "$gt": 3 },
            "kind": { "$eq": "x" },
            "$and": [{ "team": "a" }],
        };
        assert_eq!(upsert_seed(&filter), doc! { "name": "bob", "kind": "x", "team": "a" });
    }
}
