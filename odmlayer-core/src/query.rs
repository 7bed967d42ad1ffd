//! Query builder.
//!
//! A [`Query`] accumulates one store operation from chained calls and executes it
//! lazily. Builder steps (`filter`, `sort`, `skip`, `limit`, `subset`) perform no
//! I/O; terminal operations (`count`, `create`, `update`, `remove`) and
//! materialization (`data`, `fetch`, `next`) are async and hit the store.
//!
//! Call order is enforced: every method checks that it may follow the previously
//! accepted one.
//!
//! | Last method | May be followed by |
//! |---|---|
//! | *(none)* | `count`, `create`, `filter`, `one`, `remove` |
//! | `filter` | anything but `create` and `one` |
//! | `sort`, `subset` | `limit`, `skip`, `sort`, `subset` |
//! | `limit` | `skip`, `sort`, `subset` |
//! | `skip` | `limit`, `sort`, `subset` |
//!
//! # Example
//!
//! ```ignore
//! use odmlayer::prelude::*;
//!
//! let users = db.model("User")?;
//! let mut query = users
//!     .filter(Filter::new().field("name", eq("alice")?))?
//!     .sort(["-age"])?;
//!
//! for user in query.data().await? {
//!     println!("{:?}", user.get("age"));
//! }
//! ```

use bson::{Bson, Document};
use indexmap::{IndexMap, map::Entry};
use std::{
    fmt,
    ops::{Bound, RangeBounds},
    str::FromStr,
};

use crate::{
    backend::{StoreBackend, UpdateFlags, WriteAck},
    collection::Cursor,
    config::SafeMode,
    database::Model,
    error::{InitializationError, OdmResult, QueryError, SelectorResult},
    modifier::UpdateSpec,
    schema::{ID_FIELD, Record, Schema},
    selector::{Logic, Operand, Selector},
};

/// Builder methods, as named in call-order errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Count,
    Create,
    Filter,
    One,
    Limit,
    Sort,
    Skip,
    Subset,
    Update,
    Remove,
}

impl Method {
    pub fn name(&self) -> &'static str {
        match self {
            Method::Count => "count",
            Method::Create => "create",
            Method::Filter => "filter",
            Method::One => "one",
            Method::Limit => "limit",
            Method::Sort => "sort",
            Method::Skip => "skip",
            Method::Subset => "subset",
            Method::Update => "update",
            Method::Remove => "remove",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Legal next methods: an allow-list, or everything except a deny-list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Allowed {
    Only(&'static [Method]),
    Except(&'static [Method]),
}

impl Allowed {
    fn permits(&self, method: Method) -> bool {
        match self {
            Allowed::Only(methods) => methods.contains(&method),
            Allowed::Except(methods) => !methods.contains(&method),
        }
    }
}

const INITIAL: Allowed = Allowed::Only(&[
    Method::Count,
    Method::Create,
    Method::Filter,
    Method::One,
    Method::Remove,
]);
const AFTER_FILTER: Allowed = Allowed::Except(&[Method::Create, Method::One]);
const AFTER_LIMIT: Allowed = Allowed::Only(&[Method::Sort, Method::Skip, Method::Subset]);
const AFTER_SKIP: Allowed = Allowed::Only(&[Method::Limit, Method::Sort, Method::Subset]);
const AFTER_SORT: Allowed = Allowed::Only(&[
    Method::Limit,
    Method::Skip,
    Method::Sort,
    Method::Subset,
]);

/// Arguments of `filter`: keyed operands, key-complete selectors and a raw document.
///
/// Bare values passed by key become equality selectors.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filter {
    keyed: Vec<(String, Operand)>,
    positional: Vec<Selector>,
    raw: Document,
}

impl Filter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Constrains `key` with a selector that still needs a key, or with a bare value.
    pub fn field(mut self, key: impl Into<String>, operand: impl Into<Operand>) -> Self {
        self.keyed.push((key.into(), operand.into()));
        self
    }

    /// Adds a selector that is already bound to its keys.
    pub fn selector(mut self, selector: Selector) -> Self {
        self.positional.push(selector);
        self
    }

    /// Merges a raw query document, applied after every selector.
    pub fn raw(mut self, raw: Document) -> Self {
        for (key, value) in raw {
            self.raw.insert(key, value);
        }
        self
    }

    pub fn is_empty(&self) -> bool {
        self.keyed.is_empty() && self.positional.is_empty() && self.raw.is_empty()
    }
}

impl From<Selector> for Filter {
    fn from(selector: Selector) -> Self {
        Filter::new().selector(selector)
    }
}

/// Accumulated predicate of a find, update or remove step.
#[derive(Debug, Clone, Default, PartialEq)]
struct Criteria {
    keyed: IndexMap<String, Selector>,
    conditionals: Vec<Selector>,
    raw: Document,
}

impl Criteria {
    /// Adds a key-complete selector, folding it into the constraints on its key.
    fn add(&mut self, selector: Selector) -> SelectorResult<()> {
        let key = match selector.key() {
            Some(key) if !selector.is_conditional() => key.to_string(),
            _ => {
                self.conditionals.push(selector);
                return Ok(());
            }
        };

        match self.keyed.entry(key) {
            Entry::Occupied(mut entry) => {
                let folded = entry.get().clone().and_with(selector)?;
                if folded.is_conditional() {
                    entry.shift_remove();
                    self.conditionals.push(folded);
                } else {
                    entry.insert(folded);
                }
            }
            Entry::Vacant(entry) => {
                entry.insert(selector);
            }
        }
        Ok(())
    }

    /// Renders the query document.
    ///
    /// Conditionals of the same operator are grouped: a lone `$or` or `$nor`
    /// renders as is, several of them are joined under `$and`. The raw
    /// document is merged last.
    fn render(&self) -> SelectorResult<Document> {
        let mut spec = Document::new();
        for selector in self.keyed.values() {
            for (key, value) in selector.to_document()? {
                spec.insert(key, value);
            }
        }

        let mut and_entries: Vec<Bson> = Vec::new();
        for logic in [Logic::And, Logic::Or, Logic::Nor] {
            let group: Vec<&Selector> = self
                .conditionals
                .iter()
                .filter(|selector| selector.logic() == Some(logic))
                .collect();

            match (logic, group.as_slice()) {
                (_, []) => {}
                (Logic::And, group) => {
                    for selector in group {
                        for child in selector.children() {
                            and_entries.push(child.prepare(true)?);
                        }
                    }
                }
                (_, [single]) => {
                    for (key, value) in single.to_document()? {
                        spec.insert(key, value);
                    }
                }
                (_, group) => {
                    for selector in group {
                        and_entries.push(selector.prepare(true)?);
                    }
                }
            }
        }
        if !and_entries.is_empty() {
            spec.insert(Logic::And.wire(), and_entries);
        }

        for (key, value) in &self.raw {
            spec.insert(key.clone(), value.clone());
        }
        Ok(spec)
    }

    fn trace(&self) -> String {
        match self.render() {
            Ok(spec) => spec.to_string(),
            Err(err) => format!("<{err}>"),
        }
    }
}

/// Projection of a find step.
#[derive(Debug, Clone, Default, PartialEq)]
struct Projection {
    fields: IndexMap<String, i32>,
    id: Option<i32>,
}

impl Projection {
    fn render(&self) -> Option<Document> {
        if self.fields.is_empty() && self.id.is_none() {
            return None;
        }
        let mut projection: Document = self
            .fields
            .iter()
            .map(|(field, flag)| (field.clone(), Bson::Int32(*flag)))
            .collect();
        match self.id {
            Some(flag) => {
                projection.insert(ID_FIELD, flag);
            }
            None if self.fields.values().any(|flag| *flag == 1) => {
                projection.insert(ID_FIELD, 0);
            }
            None => {}
        }
        Some(projection)
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
struct Find {
    criteria: Criteria,
    projection: Projection,
}

/// Recorded store operations following the find step.
#[derive(Debug, Clone, PartialEq)]
enum Step {
    Sort(Vec<(String, i32)>),
    Skip(u64),
    Limit(u64),
    Count,
    Insert(Document),
    Update {
        criteria: Criteria,
        update: Document,
        flags: UpdateFlags,
    },
    Remove(Criteria),
}

/// Materialization target of [`Query::fetch`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CastTarget {
    /// Schema records.
    Record,
    /// Plain field maps.
    Map,
}

impl FromStr for CastTarget {
    type Err = QueryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "record" | "object" => Ok(CastTarget::Record),
            "map" | "dict" => Ok(CastTarget::Map),
            other => Err(QueryError::fetch(other)),
        }
    }
}

/// Rows returned by [`Query::fetch`].
#[derive(Debug, Clone, PartialEq)]
pub enum Rows {
    Records(Vec<Record>),
    Maps(Vec<Document>),
}

impl Rows {
    pub fn len(&self) -> usize {
        match self {
            Rows::Records(records) => records.len(),
            Rows::Maps(maps) => maps.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A per-call builder of one store operation.
#[derive(Debug)]
pub struct Query<'a, B: StoreBackend> {
    model: Model<'a, B>,
    find: Option<Find>,
    steps: Vec<Step>,
    allowed: Allowed,
    last: Option<Method>,
    safe: Option<SafeMode>,
    empty: bool,
    cursor: Option<Cursor<'a, B>>,
    data: Option<Vec<Record>>,
}

impl<'a, B: StoreBackend> Query<'a, B> {
    pub(crate) fn new(model: Model<'a, B>) -> Self {
        Query {
            model,
            find: None,
            steps: Vec::new(),
            allowed: INITIAL,
            last: None,
            safe: None,
            empty: false,
            cursor: None,
            data: None,
        }
    }

    /// State after an empty `filter`.
    pub(crate) fn unfiltered(mut self) -> Self {
        self.last = Some(Method::Filter);
        self.allowed = AFTER_FILTER;
        self.find.get_or_insert_with(Find::default);
        self
    }

    fn check(&mut self, method: Method) -> Result<(), QueryError> {
        if !self.allowed.permits(method) {
            return Err(QueryError::forbidden_method(
                method.name(),
                self.last.map(|last| last.name()),
            ));
        }
        self.last = Some(method);
        Ok(())
    }

    fn schema(&self) -> &Schema {
        self.model.schema()
    }

    fn check_key(&self, method: &str, key: &str) -> Result<(), QueryError> {
        match self.schema().field(key) {
            Some(_) => Ok(()),
            None => Err(QueryError::illegal_key(method, key)),
        }
    }

    fn check_selector_keys(&self, selector: &Selector) -> Result<(), QueryError> {
        if let Some(key) = selector.key() {
            self.check_key("filter", key)?;
        }
        for child in selector.children() {
            self.check_selector_keys(child)?;
        }
        Ok(())
    }

    /// Overrides the database's acknowledged-write policy for this call.
    pub fn safe(mut self, safe: impl Into<SafeMode>) -> Self {
        self.safe = Some(safe.into());
        self
    }

    /// Whether slicing resolved to an empty window.
    pub fn is_empty(&self) -> bool {
        self.empty
    }

    /// Adds predicates. Repeated calls merge into the same find step.
    ///
    /// # Errors
    ///
    /// - [`QueryError::ForbiddenMethod`] if `filter` may not follow the last method
    /// - [`QueryError::IllegalKey`] for keys the schema does not declare
    /// - [`QueryError::ExcessKey`] if a keyed selector is already key-complete
    /// - [`QueryError::MissingKey`] if a positional selector still needs a key
    pub fn filter(mut self, filter: impl Into<Filter>) -> OdmResult<Self> {
        self.check(Method::Filter)?;
        self.allowed = AFTER_FILTER;
        let filter = filter.into();

        let mut selectors = Vec::with_capacity(filter.keyed.len() + filter.positional.len());
        for (key, operand) in filter.keyed {
            let mut selector = match operand {
                Operand::Value(value) => Selector::keyword_eq(value)?,
                Operand::Selector(selector) => selector,
            };
            if !selector.require_key() {
                return Err(QueryError::ExcessKey {
                    key,
                    selector: selector.name().to_string(),
                }
                .into());
            }
            selector.associate(key);
            selectors.push(selector);
        }
        for selector in filter.positional {
            if selector.require_key() {
                return Err(QueryError::MissingKey {
                    selector: selector.name().to_string(),
                }
                .into());
            }
            selectors.push(selector);
        }
        for selector in &selectors {
            self.check_selector_keys(selector)?;
        }

        let find = self.find.get_or_insert_with(Find::default);
        for selector in selectors {
            find.criteria.add(selector)?;
        }
        for (key, value) in filter.raw {
            find.criteria.raw.insert(key, value);
        }
        Ok(self)
    }

    /// Caps the number of rows. Zero is a no-op.
    pub fn limit(mut self, limit: u64) -> OdmResult<Self> {
        self.check(Method::Limit)?;
        if limit != 0 {
            self.allowed = AFTER_LIMIT;
            self.steps.push(Step::Limit(limit));
        }
        Ok(self)
    }

    /// Skips leading rows. Zero is a no-op.
    pub fn skip(mut self, skip: u64) -> OdmResult<Self> {
        self.check(Method::Skip)?;
        if skip != 0 {
            self.allowed = AFTER_SKIP;
            self.steps.push(Step::Skip(skip));
        }
        Ok(self)
    }

    /// Sorts by the given fields; a `-` prefix sorts descending.
    /// Repeated calls append keys.
    pub fn sort<I, S>(mut self, fields: I) -> OdmResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.check(Method::Sort)?;
        self.allowed = AFTER_SORT;

        let mut keys = Vec::new();
        for field in fields {
            let field = field.as_ref();
            let (name, direction) = match field.strip_prefix('-') {
                Some(name) => (name, -1),
                None => (field, 1),
            };
            self.check_key("sort", name)?;
            keys.push((name.to_string(), direction));
        }

        if let Some(Step::Sort(existing)) = self
            .steps
            .iter_mut()
            .find(|step| matches!(step, Step::Sort(_)))
        {
            existing.extend(keys);
        } else {
            self.steps.push(Step::Sort(keys));
        }
        Ok(self)
    }

    /// Restricts the returned fields; a `-` prefix excludes a field.
    ///
    /// Repeated calls merge. Inclusion and exclusion can not be mixed, except for
    /// the identity, which is excluded from inclusion projections unless requested.
    pub fn subset<I, S>(mut self, fields: I) -> OdmResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.check(Method::Subset)?;
        self.allowed = AFTER_SORT;

        let mut requested: IndexMap<String, i32> = IndexMap::new();
        let mut id = None;
        for field in fields {
            let field = field.as_ref();
            let (name, flag) = match field.strip_prefix('-') {
                Some(name) => (name, 0),
                None => (field, 1),
            };
            self.check_key("subset", name)?;
            if name == ID_FIELD {
                id = Some(flag);
            } else {
                requested.insert(name.to_string(), flag);
            }
        }

        let projection = &mut self.find.get_or_insert_with(Find::default).projection;
        for (field, flag) in &projection.fields {
            requested.insert(field.clone(), *flag);
        }
        let id = projection.id.or(id);

        if requested.values().any(|flag| *flag == 0) && requested.values().any(|flag| *flag == 1) {
            let subset = requested
                .iter()
                .map(|(field, flag)| format!("'{field}': {flag}"))
                .collect::<Vec<_>>()
                .join(", ");
            return Err(QueryError::SubsetUniform {
                subset: format!("{{{subset}}}"),
            }
            .into());
        }

        projection.fields = requested;
        projection.id = id;
        Ok(self)
    }

    /// Rows `range` of the result, translated to `skip` and `limit`.
    ///
    /// Negative bounds count from the end of the filtered result, which costs a
    /// `count` round trip. A window that resolves to nothing marks the query
    /// empty: it then returns no rows without touching the store.
    pub async fn slice(mut self, range: impl RangeBounds<i64>) -> OdmResult<Self> {
        let start = match range.start_bound().cloned() {
            Bound::Included(start) => Some(start),
            Bound::Excluded(start) => Some(start.saturating_add(1)),
            Bound::Unbounded => None,
        };
        let stop = match range.end_bound().cloned() {
            Bound::Excluded(stop) => Some(stop),
            Bound::Included(-1) | Bound::Unbounded => None,
            Bound::Included(stop) => Some(stop.saturating_add(1)),
        };

        if !self.allowed.permits(Method::Skip) {
            return Err(QueryError::forbidden_method(
                Method::Skip.name(),
                self.last.map(|last| last.name()),
            )
            .into());
        }

        if start == stop {
            if start.is_some() {
                self.empty = true;
            }
            return Ok(self);
        }

        let negative = start.is_some_and(|i| i < 0) || stop.is_some_and(|i| i < 0);
        let count = if negative {
            self.matching_count().await? as i64
        } else {
            0
        };
        let resolve = |i: i64| if i < 0 { (count + i).max(0) } else { i };

        let skip = start.map(resolve).unwrap_or(0);
        let limit = match stop {
            None => 0,
            Some(stop) => {
                let window = resolve(stop) - skip;
                if window <= 0 {
                    self.empty = true;
                    return Ok(self);
                }
                window
            }
        };

        self.skip(skip as u64)?.limit(limit as u64)
    }

    /// Like [`Query::slice`], rejecting steps other than one.
    pub async fn slice_by(self, range: impl RangeBounds<i64>, step: i64) -> OdmResult<Self> {
        if step != 1 {
            return Err(QueryError::SliceSteps.into());
        }
        self.slice(range).await
    }

    /// Row `index` of the result; negative indices count from the end.
    pub async fn nth(mut self, index: i64) -> OdmResult<Self> {
        if !self.allowed.permits(Method::Skip) {
            return Err(QueryError::forbidden_method(
                Method::Skip.name(),
                self.last.map(|last| last.name()),
            )
            .into());
        }

        let skip = if index < 0 {
            self.matching_count().await? as i64 + index
        } else {
            index
        };
        if skip < 0 {
            self.empty = true;
            return Ok(self);
        }
        self.skip(skip as u64)?.limit(1)
    }

    /// Runs `filter` and returns its first record.
    ///
    /// # Errors
    ///
    /// [`QueryError::NoResult`] if nothing matches.
    pub async fn one(mut self, filter: impl Into<Filter>) -> OdmResult<Record> {
        self.check(Method::One)?;
        let provider = self.model.provider().to_string();
        let mut query = self.filter(filter)?.nth(0).await?;
        match query.next().await? {
            Some(record) => Ok(record),
            None => Err(QueryError::NoResult { provider }.into()),
        }
    }

    /// Counts the documents matching the filter, ignoring skip and limit.
    pub async fn count(mut self) -> OdmResult<u64> {
        self.check(Method::Count)?;
        self.steps.push(Step::Count);
        self.model.database().trace(None, &self.trace());
        self.matching_count().await
    }

    async fn matching_count(&self) -> OdmResult<u64> {
        let filter = self.filter_document()?;
        Ok(self.model.collection().count(&filter).await?)
    }

    fn filter_document(&self) -> SelectorResult<Document> {
        match &self.find {
            Some(find) => find.criteria.render(),
            None => Ok(Document::new()),
        }
    }

    /// Validates and inserts a new record, back-filling its identity.
    ///
    /// # Errors
    ///
    /// - [`InitializationError`] for unknown fields or an empty field set
    /// - [`ValidationError`](crate::error::ValidationError) if the record is invalid
    pub async fn create(mut self, fields: Document) -> OdmResult<Record> {
        self.check(Method::Create)?;
        if fields.is_empty() {
            return Err(InitializationError::EmptyFieldset {
                schema: self.schema().name().to_string(),
            }
            .into());
        }

        let mut record = self.model.new_record(fields)?;
        record.validate()?;

        let document = record.to_document(true);
        self.find = None;
        self.steps = vec![Step::Insert(document.clone())];

        let db = self.model.database();
        let safe = db.safe_mode(self.safe.as_ref());
        db.trace(Some(&safe), &self.trace());
        let id = self.model.collection().insert(document, &safe).await?;
        if record.id().is_none() {
            record.set_id(id);
        }
        Ok(record)
    }

    /// Applies `spec` to every document matching the filter.
    ///
    /// Literal values become implicit `set` modifiers. Returns the raw acknowledgement.
    pub async fn update(mut self, spec: UpdateSpec) -> OdmResult<WriteAck> {
        self.check(Method::Update)?;
        let update = spec.render(self.schema())?;
        let criteria = self.find.take().map(|find| find.criteria).unwrap_or_default();
        let filter = criteria.render()?;
        let flags = UpdateFlags {
            multi: spec.is_multi(),
            upsert: spec.is_upsert(),
        };
        self.steps = vec![Step::Update {
            criteria,
            update: update.clone(),
            flags,
        }];

        let db = self.model.database();
        let safe = db.safe_mode(self.safe.as_ref());
        db.trace(Some(&safe), &self.trace());
        Ok(self
            .model
            .collection()
            .update(filter, update, flags, &safe)
            .await?)
    }

    /// Removes every document matching the filter, or every document without one.
    pub async fn remove(mut self) -> OdmResult<WriteAck> {
        self.check(Method::Remove)?;
        let criteria = self.find.take().map(|find| find.criteria).unwrap_or_default();
        let filter = criteria.render()?;
        self.steps = vec![Step::Remove(criteria)];

        let db = self.model.database();
        let safe = db.safe_mode(self.safe.as_ref());
        db.trace(Some(&safe), &self.trace());
        Ok(self.model.collection().remove(filter, &safe).await?)
    }

    fn build_cursor(&self) -> OdmResult<Cursor<'a, B>> {
        let (filter, projection) = match &self.find {
            Some(find) => (find.criteria.render()?, find.projection.render()),
            None => (Document::new(), None),
        };

        let mut cursor = self.model.collection().find(filter, projection);
        for step in &self.steps {
            cursor = match step {
                Step::Sort(keys) => cursor.sort(keys.clone()),
                Step::Skip(skip) => cursor.skip(*skip),
                Step::Limit(limit) => cursor.limit(*limit),
                _ => cursor,
            };
        }

        self.model.database().trace(None, &self.trace());
        Ok(cursor)
    }

    fn cursor(&mut self) -> OdmResult<&mut Cursor<'a, B>> {
        let cursor = match self.cursor.take() {
            Some(cursor) => cursor,
            None => self.build_cursor()?,
        };
        Ok(self.cursor.insert(cursor))
    }

    async fn fetch_records(&mut self) -> OdmResult<Vec<Record>> {
        if self.empty {
            return Ok(Vec::new());
        }

        let model = self.model.clone();
        let cursor = self.cursor()?;
        cursor.rewind();
        let documents = cursor.fetch_all().await?;
        cursor.rewind();

        documents
            .into_iter()
            .map(|document| model.load(document))
            .collect()
    }

    /// Fetches every row as `target`, bypassing the [`Query::data`] cache.
    pub async fn fetch(&mut self, target: CastTarget) -> OdmResult<Rows> {
        let records = self.fetch_records().await?;
        Ok(match target {
            CastTarget::Record => Rows::Records(records),
            CastTarget::Map => Rows::Maps(
                records
                    .iter()
                    .map(|record| record.to_document(false))
                    .collect(),
            ),
        })
    }

    /// Every row as a record, fetched once and cached.
    pub async fn data(&mut self) -> OdmResult<&[Record]> {
        if self.data.is_none() {
            let records = self.fetch_records().await?;
            self.data = Some(records);
        }
        Ok(self.data.as_deref().unwrap_or_default())
    }

    /// The next row, fetching on first use.
    pub async fn next(&mut self) -> OdmResult<Option<Record>> {
        if self.empty {
            return Ok(None);
        }
        let model = self.model.clone();
        let cursor = self.cursor()?;
        cursor
            .next()
            .await?
            .map(|document| model.load(document))
            .transpose()
    }

    /// Restarts row iteration. The recorded operation is kept.
    pub fn rewind(&mut self) {
        if let Some(cursor) = self.cursor.as_mut() {
            cursor.rewind();
        }
    }

    /// Drops the cached rows and fetches them again.
    pub async fn refresh(&mut self) -> OdmResult<&[Record]> {
        self.rewind();
        self.data = None;
        self.data().await
    }

    /// Shell-style rendering of the recorded operation.
    pub fn trace(&self) -> String {
        let mut trace = format!("db.{}", self.model.provider());

        if let Some(find) = &self.find {
            match find.projection.render() {
                Some(fields) => {
                    trace.push_str(&format!(".find({}, {})", find.criteria.trace(), fields))
                }
                None => trace.push_str(&format!(".find({})", find.criteria.trace())),
            }
        }

        for step in &self.steps {
            let rendered = match step {
                Step::Sort(keys) => {
                    let keys = keys
                        .iter()
                        .map(|(field, direction)| format!("'{field}': {direction}"))
                        .collect::<Vec<_>>()
                        .join(", ");
                    format!(".sort({{{keys}}})")
                }
                Step::Skip(skip) => format!(".skip({skip})"),
                Step::Limit(limit) => format!(".limit({limit})"),
                Step::Count => ".count()".to_string(),
                Step::Insert(document) => format!(".insert({document})"),
                Step::Update {
                    criteria,
                    update,
                    flags,
                } => format!(
                    ".update({}, {}, {}, {})",
                    criteria.trace(),
                    update,
                    flags.upsert,
                    flags.multi
                ),
                Step::Remove(criteria) => format!(".remove({})", criteria.trace()),
            };
            trace.push_str(&rendered);
        }
        trace
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        backend::FindSpec,
        config::DatabaseConfig,
        database::Database,
        error::{OdmError, StoreResult},
        field::Field,
        modifier::inc,
        selector::{eq, gt, lt, or_},
    };
    use async_trait::async_trait;
    use bson::{doc, oid::ObjectId};
    use std::sync::Mutex;

    #[derive(Debug, Clone, PartialEq)]
    enum Call {
        Find(FindSpec),
        Count(Document),
        Insert(Document),
        Update(Document, Document, UpdateFlags),
        Remove(Document),
    }

    /// Records every call and answers with canned rows.
    #[derive(Debug, Default)]
    struct Recorder {
        calls: Mutex<Vec<Call>>,
        rows: Vec<Document>,
        count: u64,
    }

    impl Recorder {
        fn with_rows(rows: Vec<Document>) -> Self {
            Recorder {
                count: rows.len() as u64,
                rows,
                ..Default::default()
            }
        }

        fn calls(&self) -> Vec<Call> {
            self.calls.lock().unwrap().clone()
        }

        fn record(&self, call: Call) {
            self.calls.lock().unwrap().push(call);
        }
    }

    #[async_trait]
    impl StoreBackend for Recorder {
        async fn find(&self, _collection: &str, spec: &FindSpec) -> StoreResult<Vec<Document>> {
            self.record(Call::Find(spec.clone()));
            Ok(self.rows.clone())
        }

        async fn count(&self, _collection: &str, filter: &Document) -> StoreResult<u64> {
            self.record(Call::Count(filter.clone()));
            Ok(self.count)
        }

        async fn insert(
            &self,
            _collection: &str,
            document: Document,
            _safe: &SafeMode,
        ) -> StoreResult<Bson> {
            let id = document
                .get(ID_FIELD)
                .cloned()
                .unwrap_or_else(|| Bson::ObjectId(ObjectId::new()));
            self.record(Call::Insert(document));
            Ok(id)
        }

        async fn update(
            &self,
            _collection: &str,
            filter: Document,
            update: Document,
            flags: UpdateFlags,
            _safe: &SafeMode,
        ) -> StoreResult<WriteAck> {
            self.record(Call::Update(filter, update, flags));
            Ok(WriteAck {
                acknowledged: true,
                n: self.count,
                updated_existing: self.count > 0,
                upserted: None,
            })
        }

        async fn remove(
            &self,
            _collection: &str,
            filter: Document,
            _safe: &SafeMode,
        ) -> StoreResult<WriteAck> {
            self.record(Call::Remove(filter));
            Ok(WriteAck {
                acknowledged: true,
                n: self.count,
                ..Default::default()
            })
        }
    }

    fn user() -> Schema {
        Schema::builder("User")
            .field(Field::string("name"))
            .field(Field::integer("age").optional())
            .build()
            .unwrap()
    }

    fn database(backend: Recorder) -> Database<Recorder> {
        Database::new(DatabaseConfig::default(), vec![user()], backend).unwrap()
    }

    fn rows() -> Vec<Document> {
        vec![
            doc! { "_id": ObjectId::new(), "name": "alice", "age": 40_i64 },
            doc! { "_id": ObjectId::new(), "name": "alice", "age": 30_i64 },
        ]
    }

    #[test]
    fn test_sort_before_filter_is_forbidden() {
        let db = database(Recorder::default());
        let err = db.model("User").unwrap().query().sort(["age"]).unwrap_err();
        match err {
            OdmError::Query(QueryError::ForbiddenMethod { method, last }) => {
                assert_eq!(method, "sort");
                assert_eq!(last, "<none>");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_call_order_after_limit() {
        let db = database(Recorder::default());
        let users = db.model("users").unwrap();
        let err = users.all().limit(5).unwrap().limit(3).unwrap_err();
        assert!(err.to_string().contains("\"limit\" method can not be used after \"limit\""));

        let err = users
            .filter(Filter::new().field("name", "bob"))
            .unwrap()
            .filter(Filter::new())
            .unwrap()
            .sort(["name"])
            .unwrap()
            .filter(Filter::new())
            .unwrap_err();
        assert!(matches!(err, OdmError::Query(QueryError::ForbiddenMethod { .. })));
    }

    #[test]
    fn test_zero_limit_and_skip_are_noops() {
        let db = database(Recorder::default());
        let query = db.model("User").unwrap().all().limit(0).unwrap().skip(0).unwrap();
        assert!(query.steps.is_empty());
        assert_eq!(query.last, Some(Method::Skip));
    }

    #[test]
    fn test_filters_merge_into_one_find() {
        let db = database(Recorder::default());
        let query = db
            .model("User")
            .unwrap()
            .filter(Filter::new().field("name", "alice"))
            .unwrap()
            .filter(Filter::new().field("age", gt(3).unwrap()))
            .unwrap();
        assert!(query.steps.is_empty());
        assert_eq!(
            query.filter_document().unwrap(),
            doc! { "name": "alice", "age": { "$gt": 3 } }
        );
    }

    #[test]
    fn test_same_key_filters_combine() {
        let db = database(Recorder::default());
        let query = db
            .model("User")
            .unwrap()
            .filter(Filter::new().field("age", gt(3).unwrap()))
            .unwrap()
            .filter(Filter::new().field("age", lt(9).unwrap()))
            .unwrap();
        assert_eq!(
            query.filter_document().unwrap(),
            doc! { "age": { "$gt": 3, "$lt": 9 } }
        );
    }

    #[test]
    fn test_filter_key_contract() {
        let db = database(Recorder::default());
        let users = db.model("User").unwrap();

        let err = users.filter(Filter::new().field("email", "x")).unwrap_err();
        assert!(matches!(err, OdmError::Query(QueryError::IllegalKey { .. })));

        let err = users
            .filter(Filter::new().field("age", gt(1).unwrap().bound("age")))
            .unwrap_err();
        assert!(matches!(err, OdmError::Query(QueryError::ExcessKey { .. })));

        let err = users.filter(lt(1).unwrap()).unwrap_err();
        assert!(matches!(err, OdmError::Query(QueryError::MissingKey { .. })));

        let nested = or_([eq("a").unwrap().bound("name"), eq(1).unwrap().bound("email")]).unwrap();
        assert!(users.filter(nested).is_err());
    }

    #[test]
    fn test_conditionals_grouping_and_raw() {
        let db = database(Recorder::default());
        let first = or_([eq("a").unwrap().bound("name"), gt(1).unwrap().bound("age")]).unwrap();
        let second = or_([eq("b").unwrap().bound("name"), lt(9).unwrap().bound("age")]).unwrap();
        let query = db
            .model("User")
            .unwrap()
            .filter(
                Filter::new()
                    .selector(first)
                    .selector(second)
                    .raw(doc! { "age": { "$exists": true } }),
            )
            .unwrap();
        assert_eq!(
            query.filter_document().unwrap(),
            doc! {
                "$and": [
                    { "$or": [{ "name": "a" }, { "age": { "$gt": 1 } }] },
                    { "$or": [{ "name": "b" }, { "age": { "$lt": 9 } }] },
                ],
                "age": { "$exists": true },
            }
        );
    }

    #[test]
    fn test_single_conditional_renders_directly() {
        let db = database(Recorder::default());
        let query = db
            .model("User")
            .unwrap()
            .filter(Filter::new().field("age", or_([lt(1).unwrap(), gt(9).unwrap()]).unwrap()))
            .unwrap();
        assert_eq!(
            query.filter_document().unwrap(),
            doc! { "$or": [{ "age": { "$lt": 1 } }, { "age": { "$gt": 9 } }] }
        );
    }

    #[test]
    fn test_subset_rules() {
        let db = database(Recorder::default());
        let users = db.model("User").unwrap();

        let err = users
            .all()
            .subset(["name"])
            .unwrap()
            .subset(["-age"])
            .unwrap_err();
        assert!(matches!(err, OdmError::Query(QueryError::SubsetUniform { .. })));

        let query = users.all().subset(["name"]).unwrap().subset(["age"]).unwrap();
        let projection = query.find.as_ref().unwrap().projection.render().unwrap();
        assert_eq!(projection, doc! { "age": 1, "name": 1, "_id": 0 });

        let query = users.all().subset(["name", "_id"]).unwrap();
        let projection = query.find.as_ref().unwrap().projection.render().unwrap();
        assert_eq!(projection, doc! { "name": 1, "_id": 1 });

        let query = users.all().subset(["-age"]).unwrap();
        let projection = query.find.as_ref().unwrap().projection.render().unwrap();
        assert_eq!(projection, doc! { "age": 0 });
    }

    #[tokio::test]
    async fn test_filter_sort_data_issues_one_find() {
        let db = database(Recorder::with_rows(rows()));
        let mut query = db
            .model("User")
            .unwrap()
            .filter(Filter::new().field("name", eq("alice").unwrap()))
            .unwrap()
            .sort(["-age"])
            .unwrap();

        assert!(query.trace().starts_with("db.users.find("));
        assert!(query.trace().ends_with(".sort({'age': -1})"));

        let data = query.data().await.unwrap();
        assert_eq!(data.len(), 2);
        assert_eq!(data[0].get("age"), Some(&Bson::Int64(40)));
        assert!(!data[0].is_new());

        query.data().await.unwrap();
        assert_eq!(
            db.backend().calls(),
            vec![Call::Find(FindSpec {
                filter: doc! { "name": "alice" },
                sort: vec![("age".to_string(), -1)],
                ..Default::default()
            })]
        );
    }

    #[tokio::test]
    async fn test_refresh_and_next() {
        let db = database(Recorder::with_rows(rows()));
        let mut query = db.model("User").unwrap().all();
        assert!(query.next().await.unwrap().is_some());
        assert!(query.next().await.unwrap().is_some());
        assert!(query.next().await.unwrap().is_none());
        query.rewind();
        assert!(query.next().await.unwrap().is_some());
        assert_eq!(query.refresh().await.unwrap().len(), 2);
        assert_eq!(db.backend().calls().len(), 3);
    }

    #[tokio::test]
    async fn test_fetch_as_maps() {
        let db = database(Recorder::with_rows(rows()));
        let mut query = db.model("User").unwrap().all();
        let target: CastTarget = "dict".parse().unwrap();
        match query.fetch(target).await.unwrap() {
            Rows::Maps(maps) => assert_eq!(maps[0].get_str("name").unwrap(), "alice"),
            other => panic!("unexpected rows: {other:?}"),
        }
        assert!(matches!("tuple".parse::<CastTarget>(), Err(QueryError::Fetch { .. })));
    }

    #[tokio::test]
    async fn test_slice_is_skip_and_limit() {
        let db = database(Recorder::default());
        let users = db.model("User").unwrap();
        let sliced = users.all().slice(2..5).await.unwrap();
        let explicit = users.all().skip(2).unwrap().limit(3).unwrap();
        assert_eq!(sliced.steps, explicit.steps);
        assert_eq!(sliced.trace(), "db.users.find({}).skip(2).limit(3)");
        assert!(db.backend().calls().is_empty());

        assert!(matches!(
            users.all().slice_by(0..4, 2).await,
            Err(OdmError::Query(QueryError::SliceSteps))
        ));
    }

    #[tokio::test]
    async fn test_inclusive_slice_at_integer_bounds() {
        let db = database(Recorder::default());
        let users = db.model("User").unwrap();
        let sliced = users.all().slice(1..=i64::MAX).await.unwrap();
        let explicit = users.all().skip(1).unwrap().limit(i64::MAX as u64).unwrap();
        assert_eq!(sliced.steps, explicit.steps);
        assert!(!sliced.is_empty());
    }

    #[tokio::test]
    async fn test_negative_index_resolves_against_count() {
        let backend = Recorder {
            count: 10,
            ..Default::default()
        };
        let db = database(backend);
        let query = db
            .model("User")
            .unwrap()
            .filter(Filter::new().field("name", "bob"))
            .unwrap()
            .nth(-1)
            .await
            .unwrap();
        assert_eq!(query.steps, vec![Step::Skip(9), Step::Limit(1)]);
        assert_eq!(db.backend().calls(), vec![Call::Count(doc! { "name": "bob" })]);
    }

    #[tokio::test]
    async fn test_empty_window_skips_io() {
        let db = database(Recorder::with_rows(rows()));
        let mut query = db.model("User").unwrap().all().slice(3..3).await.unwrap();
        assert!(query.is_empty());
        assert!(query.data().await.unwrap().is_empty());

        let mut query = db.model("User").unwrap().all().slice(-1..-3).await.unwrap();
        assert!(query.is_empty());
        assert!(query.next().await.unwrap().is_none());

        assert_eq!(db.backend().calls(), vec![Call::Count(doc! {})]);
    }

    #[tokio::test]
    async fn test_update_renders_modifiers() {
        let db = database(Recorder::default());
        let ack = db
            .model("User")
            .unwrap()
            .filter(Filter::new().field("name", "bob"))
            .unwrap()
            .update(UpdateSpec::new().field("age", inc(1)))
            .await
            .unwrap();
        assert!(ack.acknowledged);
        assert_eq!(
            db.backend().calls(),
            vec![Call::Update(
                doc! { "name": "bob" },
                doc! { "$inc": { "age": 1_i64 } },
                UpdateFlags {
                    multi: true,
                    upsert: false
                },
            )]
        );
    }

    #[tokio::test]
    async fn test_update_literal_becomes_set_and_checks_keys() {
        let db = database(Recorder::default());
        let users = db.model("User").unwrap();
        users
            .all()
            .update(UpdateSpec::new().field("name", "bob").multi(false).upsert(true))
            .await
            .unwrap();
        assert_eq!(
            db.backend().calls(),
            vec![Call::Update(
                doc! {},
                doc! { "$set": { "name": "bob" } },
                UpdateFlags {
                    multi: false,
                    upsert: true
                },
            )]
        );

        let err = users
            .all()
            .update(UpdateSpec::new().field("email", "x"))
            .await
            .unwrap_err();
        assert!(matches!(err, OdmError::Query(QueryError::IllegalKey { .. })));

        let err = users.query().update(UpdateSpec::new()).await.unwrap_err();
        assert!(matches!(err, OdmError::Query(QueryError::ForbiddenMethod { .. })));
    }

    #[tokio::test]
    async fn test_remove_reuses_filter() {
        let db = database(Recorder::default());
        let users = db.model("User").unwrap();
        users
            .filter(Filter::new().field("name", "bob"))
            .unwrap()
            .remove()
            .await
            .unwrap();
        users.query().remove().await.unwrap();
        assert_eq!(
            db.backend().calls(),
            vec![Call::Remove(doc! { "name": "bob" }), Call::Remove(doc! {})]
        );
    }

    #[tokio::test]
    async fn test_create_back_fills_identity() {
        let config = DatabaseConfig::default().gen_ids(false);
        let db = Database::new(config, vec![user()], Recorder::default()).unwrap();
        let users = db.model("User").unwrap();

        let record = users.create(doc! { "name": "amy", "age": 3 }).await.unwrap();
        assert!(record.object_id().is_some());
        assert_eq!(
            db.backend().calls(),
            vec![Call::Insert(doc! { "name": "amy", "age": 3_i64 })]
        );

        let err = users.create(doc! {}).await.unwrap_err();
        assert!(matches!(err, OdmError::Initialization(InitializationError::EmptyFieldset { .. })));

        let err = users.create(doc! { "age": 3 }).await.unwrap_err();
        assert!(matches!(err, OdmError::Validation(_)));
    }

    #[tokio::test]
    async fn test_one_returns_first_or_fails() {
        let db = database(Recorder::with_rows(rows()));
        let user = db
            .model("User")
            .unwrap()
            .one(Filter::new().field("name", "alice"))
            .await
            .unwrap();
        assert_eq!(user.get("name"), Some(&Bson::String("alice".into())));

        let db = database(Recorder::default());
        let err = db
            .model("User")
            .unwrap()
            .one(Filter::new().field("name", "zed"))
            .await
            .unwrap_err();
        assert!(matches!(err, OdmError::Query(QueryError::NoResult { .. })));
    }

    #[tokio::test]
    async fn test_count_ignores_window() {
        let backend = Recorder {
            count: 4,
            ..Default::default()
        };
        let db = database(backend);
        let count = db
            .model("User")
            .unwrap()
            .filter(Filter::new().field("age", gt(1).unwrap()))
            .unwrap()
            .count()
            .await
            .unwrap();
        assert_eq!(count, 4);
        assert_eq!(
            db.backend().calls(),
            vec![Call::Count(doc! { "age": { "$gt": 1 } })]
        );
    }
}
