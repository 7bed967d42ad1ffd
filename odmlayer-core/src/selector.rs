//! Predicate algebra over field values.
//!
//! A [`Selector`] is an immutable predicate that renders to one part of a
//! MongoDB-style query document. There are three shapes:
//!
//! - **Simple** - one operator on one field (`eq`, `lt`, `in_`, `exists`, ...)
//! - **Combined** - several simple constraints on the same field, rendered under one key
//! - **Conditional** - an `$and` / `$or` / `$nor` grouping across keyed predicates
//!
//! Selectors combine with [`Selector::and_with`] and [`Selector::or_with`]. Combining
//! simplifies structurally: equal constraints collapse, different operators on the
//! same field merge into a combined selector, and everything else falls back to a
//! conditional grouping so the emitted document is always well formed.
//!
//! ```ignore
//! use odmlayer::selectors::*;
//!
//! let adult = gte(18)?.and_with(lt(65)?)?;          // {age: {$gte: 18, $lt: 65}}
//! let either = or_([eq("a")?.bound("name"), adult.bound("age")])?;
//! ```

use bson::{Bson, Document, oid::ObjectId};
use log::warn;

use crate::{
    error::{SelectorError, SelectorResult},
    field::type_name,
};

/// Comparison operators of simple selectors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operator {
    Eq,
    Ne,
    Lt,
    Gt,
    Lte,
    Gte,
    In,
    Nin,
    All,
    Exists,
    Size,
    Mod,
}

const ANY_TYPES: &[&str] = &["ObjectId", "int", "float", "str", "bool", "list"];
const NUM_TYPES: &[&str] = &["int", "float"];

impl Operator {
    /// Constructor name of the operator.
    pub fn name(&self) -> &'static str {
        match self {
            Operator::Eq => "eq",
            Operator::Ne => "ne",
            Operator::Lt => "lt",
            Operator::Gt => "gt",
            Operator::Lte => "lte",
            Operator::Gte => "gte",
            Operator::In => "in_",
            Operator::Nin => "nin",
            Operator::All => "all",
            Operator::Exists => "exists",
            Operator::Size => "size",
            Operator::Mod => "mod",
        }
    }

    /// Wire operator, e.g. `$lte`.
    pub fn wire(&self) -> &'static str {
        match self {
            Operator::Eq => "$eq",
            Operator::Ne => "$ne",
            Operator::Lt => "$lt",
            Operator::Gt => "$gt",
            Operator::Lte => "$lte",
            Operator::Gte => "$gte",
            Operator::In => "$in",
            Operator::Nin => "$nin",
            Operator::All => "$all",
            Operator::Exists => "$exists",
            Operator::Size => "$size",
            Operator::Mod => "$mod",
        }
    }

    fn accepted(&self) -> &'static [&'static str] {
        match self {
            Operator::Lt | Operator::Gt | Operator::Lte | Operator::Gte => NUM_TYPES,
            Operator::Exists => &["bool"],
            Operator::Size | Operator::Mod => &["int"],
            _ => ANY_TYPES,
        }
    }

    fn accepts(&self, value: &Bson) -> bool {
        match self {
            Operator::Lt | Operator::Gt | Operator::Lte | Operator::Gte => {
                matches!(value, Bson::Int32(_) | Bson::Int64(_) | Bson::Double(_))
            }
            Operator::Exists => matches!(value, Bson::Boolean(_)),
            Operator::Size | Operator::Mod => matches!(value, Bson::Int32(_) | Bson::Int64(_)),
            _ => matches!(
                value,
                Bson::ObjectId(_)
                    | Bson::Int32(_)
                    | Bson::Int64(_)
                    | Bson::Double(_)
                    | Bson::String(_)
                    | Bson::Boolean(_)
                    | Bson::Array(_)
            ),
        }
    }

    fn is_list(&self) -> bool {
        matches!(self, Operator::In | Operator::Nin | Operator::All)
    }
}

/// Logical grouping operators of conditional selectors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Logic {
    And,
    Or,
    Nor,
}

impl Logic {
    pub fn name(&self) -> &'static str {
        match self {
            Logic::And => "and_",
            Logic::Or => "or_",
            Logic::Nor => "nor",
        }
    }

    pub fn wire(&self) -> &'static str {
        match self {
            Logic::And => "$and",
            Logic::Or => "$or",
            Logic::Nor => "$nor",
        }
    }

    /// Starts a conditional selector that also accepts keyed children.
    pub fn builder(self) -> ConditionalBuilder {
        ConditionalBuilder::new(self)
    }
}

/// One operator applied to one value.
#[derive(Debug, Clone, PartialEq)]
pub struct Condition {
    op: Operator,
    value: Bson,
}

impl Condition {
    pub fn op(&self) -> Operator {
        self.op
    }

    pub fn value(&self) -> &Bson {
        &self.value
    }

    /// Keyless rendering. `None` for list operators given no values.
    fn expression(&self) -> Option<Bson> {
        match (&self.op, &self.value) {
            (op, Bson::Array(values)) if op.is_list() && values.is_empty() => None,
            (Operator::Eq, value) => Some(value.clone()),
            (op, value) => {
                let mut expr = Document::new();
                expr.insert(op.wire(), value.clone());
                Some(Bson::Document(expr))
            }
        }
    }

    /// Returns `true` when `value` is certain to satisfy this condition.
    fn admits(&self, value: &Bson) -> bool {
        match self.op {
            Operator::Eq => loose_eq(&self.value, value),
            Operator::Ne => !loose_eq(&self.value, value),
            Operator::Lt | Operator::Gt | Operator::Lte | Operator::Gte => {
                match (as_number(value), as_number(&self.value)) {
                    (Some(v), Some(bound)) => match self.op {
                        Operator::Lt => v < bound,
                        Operator::Gt => v > bound,
                        Operator::Lte => v <= bound,
                        _ => v >= bound,
                    },
                    _ => false,
                }
            }
            Operator::In => as_list(&self.value).iter().any(|item| loose_eq(item, value)),
            Operator::Nin => !as_list(&self.value).iter().any(|item| loose_eq(item, value)),
            Operator::All => match value {
                Bson::Array(items) => as_list(&self.value)
                    .iter()
                    .all(|needed| items.iter().any(|item| loose_eq(item, needed))),
                _ => false,
            },
            Operator::Exists => matches!(self.value, Bson::Boolean(true)) && value != &Bson::Null,
            Operator::Size => match (value, as_number(&self.value)) {
                (Bson::Array(items), Some(size)) => items.len() as f64 == size,
                _ => false,
            },
            Operator::Mod => match (as_integer(value), as_list(&self.value)) {
                (Some(v), [divisor, remainder]) => match (as_integer(divisor), as_integer(remainder)) {
                    (Some(d), Some(r)) if d != 0 => v.wrapping_rem(d) == r,
                    _ => false,
                },
                _ => false,
            },
        }
    }
}

fn as_number(value: &Bson) -> Option<f64> {
    match value {
        Bson::Int32(v) => Some(*v as f64),
        Bson::Int64(v) => Some(*v as f64),
        Bson::Double(v) => Some(*v),
        _ => None,
    }
}

fn as_integer(value: &Bson) -> Option<i64> {
    match value {
        Bson::Int32(v) => Some(*v as i64),
        Bson::Int64(v) => Some(*v),
        _ => None,
    }
}

fn as_list(value: &Bson) -> &[Bson] {
    match value {
        Bson::Array(items) => items,
        _ => &[],
    }
}

fn loose_eq(left: &Bson, right: &Bson) -> bool {
    match (as_number(left), as_number(right)) {
        (Some(a), Some(b)) => a == b,
        _ => left == right,
    }
}

/// Either a selector or a literal value, as accepted wherever the algebra takes
/// "a selector or a bare value".
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    Selector(Selector),
    Value(Bson),
}

impl From<Selector> for Operand {
    fn from(selector: Selector) -> Self {
        Operand::Selector(selector)
    }
}

impl From<Bson> for Operand {
    fn from(value: Bson) -> Self {
        Operand::Value(value)
    }
}

macro_rules! operand_from_value {
    ($($ty:ty),*) => {
        $(
            impl From<$ty> for Operand {
                fn from(value: $ty) -> Self {
                    Operand::Value(Bson::from(value))
                }
            }
        )*
    };
}

operand_from_value!(&str, String, i32, i64, f64, bool, ObjectId, Vec<Bson>);

#[derive(Debug, Clone, PartialEq)]
enum Node {
    Simple(Condition),
    Combined(Vec<Condition>),
    Conditional {
        logic: Logic,
        children: Vec<Selector>,
        require_key: bool,
    },
}

/// An immutable predicate, optionally bound to a field key.
#[derive(Debug, Clone, PartialEq)]
pub struct Selector {
    key: Option<String>,
    node: Node,
}

impl Selector {
    fn simple(op: Operator, value: Bson, keyword: bool) -> SelectorResult<Self> {
        if !op.accepts(&value) {
            return Err(SelectorError::value_type(
                op.name(),
                keyword,
                type_name(&value),
                op.accepted(),
                false,
            ));
        }

        Ok(Selector {
            key: None,
            node: Node::Simple(Condition { op, value }),
        })
    }

    /// Equality built from a bare value passed by keyword.
    pub(crate) fn keyword_eq(value: Bson) -> SelectorResult<Self> {
        Selector::simple(Operator::Eq, value, true)
    }

    fn list(op: Operator, values: Vec<Bson>) -> SelectorResult<Self> {
        if values.is_empty() {
            warn!("\"{}\" selector gets empty array", op.name());
        } else if values.len() < 2 {
            warn!("\"{}\" selector gets less than 2 arguments", op.name());
        }

        let many = values.len() > 1;
        let mut distinct: Vec<Bson> = Vec::with_capacity(values.len());
        for value in values {
            if !op.accepts(&value) {
                return Err(SelectorError::value_type(
                    op.name(),
                    false,
                    type_name(&value),
                    op.accepted(),
                    many,
                ));
            }
            if !distinct.contains(&value) {
                distinct.push(value);
            }
        }

        Ok(Selector {
            key: None,
            node: Node::Simple(Condition {
                op,
                value: Bson::Array(distinct),
            }),
        })
    }

    fn from_conditions(key: Option<String>, mut conditions: Vec<Condition>) -> Self {
        let node = if conditions.len() == 1 {
            Node::Simple(conditions.remove(0))
        } else {
            Node::Combined(conditions)
        };
        Selector { key, node }
    }

    /// Builds a conditional selector from positional and keyed children.
    ///
    /// Positional children must either all be bound to keys, or all be unbound,
    /// in which case the result needs a key itself. Mixing the two, or passing
    /// keyed children next to unbound positional ones, is ambiguous.
    pub fn conditional(
        logic: Logic,
        positional: Vec<Selector>,
        keyed: Vec<(String, Operand)>,
    ) -> SelectorResult<Self> {
        Self::build_conditional(logic, positional, keyed, true)
    }

    fn build_conditional(
        logic: Logic,
        positional: Vec<Selector>,
        keyed: Vec<(String, Operand)>,
        explicit: bool,
    ) -> SelectorResult<Self> {
        let total = positional.len() + keyed.len();
        if total == 0 {
            warn!("\"{}\" selector gets empty array", logic.name());
        } else if total < 2 {
            warn!("\"{}\" selector gets less than 2 arguments", logic.name());
        }

        let hint_and = explicit
            && logic == Logic::And
            && replaceable_by_and_with(&positional);

        let mut children: Vec<Selector> = Vec::with_capacity(total);
        for selector in positional {
            match selector.node {
                Node::Conditional {
                    logic: nested,
                    children: nested_children,
                    ..
                } if nested == logic && selector.key.is_none() => {
                    for child in nested_children {
                        if !children.contains(&child) {
                            children.push(child);
                        }
                    }
                }
                _ => {
                    if !children.contains(&selector) {
                        children.push(selector);
                    }
                }
            }
        }

        let mut require_key = false;
        if !children.is_empty() {
            let unkeyed = children.iter().filter(|child| child.require_key()).count();
            if unkeyed > 0 && (unkeyed != children.len() || !keyed.is_empty()) {
                return Err(SelectorError::uncertain_key(logic.name()));
            }
            require_key = unkeyed > 0;
        }

        for (key, operand) in keyed {
            let mut selector = match operand {
                Operand::Selector(selector) => selector,
                Operand::Value(value) => Selector::keyword_eq(value)?,
            };
            selector.associate(key);
            children.push(selector);
        }

        if children.iter().any(Selector::is_conditional) {
            warn!("Nested \"and_\", \"or_\", \"nor\" reduces the performance");
        }
        if hint_and {
            warn!("There is better to replace \"and_\" selector with \"and_with\" for better performance");
        }

        Ok(Selector {
            key: None,
            node: Node::Conditional {
                logic,
                children,
                require_key,
            },
        })
    }

    /// Bound key, if any.
    pub fn key(&self) -> Option<&str> {
        self.key.as_deref()
    }

    /// Name of the selector as used in diagnostics.
    pub fn name(&self) -> &'static str {
        match &self.node {
            Node::Simple(condition) => condition.op.name(),
            Node::Combined(_) => "CombinedSelector",
            Node::Conditional { logic, .. } => logic.name(),
        }
    }

    /// Returns `true` if the selector still needs a key before it can be rendered.
    pub fn require_key(&self) -> bool {
        match &self.node {
            Node::Conditional { require_key, .. } => *require_key && self.key.is_none(),
            _ => self.key.is_none(),
        }
    }

    pub fn is_simple(&self) -> bool {
        matches!(self.node, Node::Simple(_))
    }

    pub fn is_combined(&self) -> bool {
        matches!(self.node, Node::Combined(_))
    }

    pub fn is_conditional(&self) -> bool {
        matches!(self.node, Node::Conditional { .. })
    }

    /// Logical operator of a conditional selector.
    pub fn logic(&self) -> Option<Logic> {
        match &self.node {
            Node::Conditional { logic, .. } => Some(*logic),
            _ => None,
        }
    }

    /// Conditions carried by a simple or combined selector.
    pub fn conditions(&self) -> &[Condition] {
        match &self.node {
            Node::Simple(condition) => std::slice::from_ref(condition),
            Node::Combined(conditions) => conditions,
            Node::Conditional { .. } => &[],
        }
    }

    /// Children of a conditional selector.
    pub fn children(&self) -> &[Selector] {
        match &self.node {
            Node::Conditional { children, .. } => children,
            _ => &[],
        }
    }

    /// Binds the selector to `key`. The first binding wins; later calls are no-ops.
    ///
    /// Binding a conditional selector propagates the key into children that are
    /// still unbound.
    pub fn associate(&mut self, key: impl Into<String>) {
        if self.key.is_some() {
            return;
        }
        let key = key.into();

        if let Node::Conditional {
            children,
            require_key,
            ..
        } = &mut self.node
        {
            *require_key = false;
            for child in children.iter_mut() {
                child.associate(key.clone());
            }
        }

        self.key = Some(key);
    }

    /// Consuming form of [`Selector::associate`].
    pub fn bound(mut self, key: impl Into<String>) -> Self {
        self.associate(key);
        self
    }

    /// Logical AND with another selector, simplifying where possible.
    ///
    /// Fails with [`SelectorError::Operation`] when `other` is not a selector, and
    /// with [`SelectorError::UncertainKey`] when only one side still needs a key.
    pub fn and_with(self, other: impl Into<Operand>) -> SelectorResult<Selector> {
        let other = match other.into() {
            Operand::Selector(selector) => selector,
            Operand::Value(value) => {
                return Err(SelectorError::operation("and", self.name(), type_name(&value)));
            }
        };

        if self.require_key() != other.require_key() {
            return Err(SelectorError::uncertain_key(Logic::And.name()));
        }

        let key = match (&self.key, &other.key) {
            (Some(left), Some(right)) if left != right => None,
            (left, right) => Some(left.clone().or_else(|| right.clone())),
        };

        if let Some(key) = key {
            if !self.is_conditional() && !other.is_conditional() {
                if let Some(merged) = merge_conditions(self.conditions(), other.conditions()) {
                    return Ok(Selector::from_conditions(key, merged));
                }
            }
        }

        Self::build_conditional(Logic::And, vec![self, other], Vec::new(), false)
    }

    /// Logical OR with another selector.
    ///
    /// Fails with [`SelectorError::Operation`] when `other` is not a selector.
    pub fn or_with(self, other: impl Into<Operand>) -> SelectorResult<Selector> {
        let other = match other.into() {
            Operand::Selector(selector) => selector,
            Operand::Value(value) => {
                return Err(SelectorError::operation("or", self.name(), type_name(&value)));
            }
        };

        if self.has_eq() || other.has_eq() {
            warn!("Attempt to combine \"eq\" selector with other");
            if self == other {
                return Ok(self);
            }
        }

        Self::build_conditional(Logic::Or, vec![self, other], Vec::new(), false)
    }

    fn has_eq(&self) -> bool {
        self.conditions().iter().any(|condition| condition.op == Operator::Eq)
    }

    /// Renders the selector into its wire form.
    ///
    /// With a key, simple and combined selectors render `{key: expr}`. Without one
    /// they render the bare expression, which is what a parent combined selector
    /// or a `$pull` modifier embeds. Conditional selectors always render
    /// `{"$op": [child, ...]}` from their keyed children.
    pub fn prepare(&self, with_key: bool) -> SelectorResult<Bson> {
        match &self.node {
            Node::Conditional { logic, children, .. } => {
                let mut rendered = Vec::with_capacity(children.len());
                for child in children {
                    rendered.push(child.prepare(true)?);
                }
                let mut doc = Document::new();
                doc.insert(logic.wire(), rendered);
                Ok(Bson::Document(doc))
            }
            _ => {
                let expr = self.expression();
                if !with_key {
                    return Ok(expr.unwrap_or_else(|| Bson::Document(Document::new())));
                }
                let key = self.key.as_deref().ok_or_else(|| SelectorError::Unbound {
                    selector: self.name().to_string(),
                })?;
                let mut doc = Document::new();
                if let Some(expr) = expr {
                    doc.insert(key, expr);
                }
                Ok(Bson::Document(doc))
            }
        }
    }

    /// Keyed rendering as a document.
    pub fn to_document(&self) -> SelectorResult<Document> {
        match self.prepare(true)? {
            Bson::Document(doc) => Ok(doc),
            _ => Ok(Document::new()),
        }
    }

    fn expression(&self) -> Option<Bson> {
        let conditions: Vec<&Condition> = self
            .conditions()
            .iter()
            .filter(|condition| condition.expression().is_some())
            .collect();

        match conditions.as_slice() {
            [] => None,
            [single] => single.expression(),
            many => {
                let mut expr = Document::new();
                for condition in many {
                    expr.insert(condition.op.wire(), condition.value.clone());
                }
                Some(Bson::Document(expr))
            }
        }
    }
}

/// Merges the conditions of two same-key selectors.
///
/// Returns `None` when a shared operator carries different values, in which case
/// the caller groups both operands under `$and` instead.
fn merge_conditions(left: &[Condition], right: &[Condition]) -> Option<Vec<Condition>> {
    let mut merged = left.to_vec();

    let eq_involved = left.iter().chain(right).any(|c| c.op == Operator::Eq)
        && left.iter().chain(right).any(|c| c.op != Operator::Eq);
    if eq_involved {
        warn!("Attempt to combine \"eq\" selector with other");
    }

    for condition in right {
        match merged.iter().find(|existing| existing.op == condition.op) {
            Some(existing) if existing.value == condition.value => {}
            Some(existing) => {
                if existing.op != Operator::Mod {
                    warn!(
                        "Attempt to combine \"{}\" selectors with different values",
                        existing.op.name()
                    );
                }
                return None;
            }
            None => merged.push(condition.clone()),
        }
    }

    // An equality that already satisfies every other constraint decides the outcome.
    if let Some(eq) = merged.iter().find(|c| c.op == Operator::Eq).cloned() {
        if merged.len() > 1 && merged.iter().all(|c| c.admits(&eq.value)) {
            return Some(vec![eq]);
        }
    }

    Some(merged)
}

fn replaceable_by_and_with(positional: &[Selector]) -> bool {
    if positional.is_empty() {
        return false;
    }
    let mut ops = Vec::new();
    for selector in positional {
        if selector.is_conditional() || selector.has_eq() {
            return false;
        }
        for condition in selector.conditions() {
            if ops.contains(&condition.op) {
                return false;
            }
            ops.push(condition.op);
        }
    }
    true
}

/// Builder for conditional selectors that take keyed children.
#[derive(Debug, Clone)]
pub struct ConditionalBuilder {
    logic: Logic,
    positional: Vec<Selector>,
    keyed: Vec<(String, Operand)>,
}

impl ConditionalBuilder {
    pub fn new(logic: Logic) -> Self {
        ConditionalBuilder {
            logic,
            positional: Vec::new(),
            keyed: Vec::new(),
        }
    }

    /// Adds a positional child.
    pub fn selector(mut self, selector: Selector) -> Self {
        self.positional.push(selector);
        self
    }

    /// Adds a child bound to `key`. Bare values become equality selectors.
    pub fn field(mut self, key: impl Into<String>, operand: impl Into<Operand>) -> Self {
        self.keyed.push((key.into(), operand.into()));
        self
    }

    pub fn build(self) -> SelectorResult<Selector> {
        Selector::conditional(self.logic, self.positional, self.keyed)
    }
}

/// Equality. Renders the bare value.
pub fn eq(value: impl Into<Bson>) -> SelectorResult<Selector> {
    Selector::simple(Operator::Eq, value.into(), false)
}

/// Not equal.
pub fn ne(value: impl Into<Bson>) -> SelectorResult<Selector> {
    Selector::simple(Operator::Ne, value.into(), false)
}

/// Less than. Numbers only.
pub fn lt(value: impl Into<Bson>) -> SelectorResult<Selector> {
    Selector::simple(Operator::Lt, value.into(), false)
}

/// Greater than. Numbers only.
pub fn gt(value: impl Into<Bson>) -> SelectorResult<Selector> {
    Selector::simple(Operator::Gt, value.into(), false)
}

/// Less than or equal. Numbers only.
pub fn lte(value: impl Into<Bson>) -> SelectorResult<Selector> {
    Selector::simple(Operator::Lte, value.into(), false)
}

/// Greater than or equal. Numbers only.
pub fn gte(value: impl Into<Bson>) -> SelectorResult<Selector> {
    Selector::simple(Operator::Gte, value.into(), false)
}

/// Value is one of `values`.
pub fn in_<I, V>(values: I) -> SelectorResult<Selector>
where
    I: IntoIterator<Item = V>,
    V: Into<Bson>,
{
    Selector::list(Operator::In, values.into_iter().map(Into::into).collect())
}

/// Value is none of `values`.
pub fn nin<I, V>(values: I) -> SelectorResult<Selector>
where
    I: IntoIterator<Item = V>,
    V: Into<Bson>,
{
    Selector::list(Operator::Nin, values.into_iter().map(Into::into).collect())
}

/// Array value contains all of `values`.
pub fn all<I, V>(values: I) -> SelectorResult<Selector>
where
    I: IntoIterator<Item = V>,
    V: Into<Bson>,
{
    Selector::list(Operator::All, values.into_iter().map(Into::into).collect())
}

/// Field presence.
pub fn exists(present: bool) -> Selector {
    Selector {
        key: None,
        node: Node::Simple(Condition {
            op: Operator::Exists,
            value: Bson::Boolean(present),
        }),
    }
}

/// Array length.
pub fn size(len: i64) -> Selector {
    Selector {
        key: None,
        node: Node::Simple(Condition {
            op: Operator::Size,
            value: Bson::Int64(len),
        }),
    }
}

/// `value % divisor == remainder`.
pub fn modulo(divisor: i64, remainder: i64) -> Selector {
    Selector {
        key: None,
        node: Node::Simple(Condition {
            op: Operator::Mod,
            value: Bson::Array(vec![Bson::Int64(divisor), Bson::Int64(remainder)]),
        }),
    }
}

/// `$and` over positional selectors.
pub fn and_(selectors: impl IntoIterator<Item = Selector>) -> SelectorResult<Selector> {
    Selector::conditional(Logic::And, selectors.into_iter().collect(), Vec::new())
}

/// `$or` over positional selectors.
pub fn or_(selectors: impl IntoIterator<Item = Selector>) -> SelectorResult<Selector> {
    Selector::conditional(Logic::Or, selectors.into_iter().collect(), Vec::new())
}

/// `$nor` over positional selectors.
pub fn nor(selectors: impl IntoIterator<Item = Selector>) -> SelectorResult<Selector> {
    Selector::conditional(Logic::Nor, selectors.into_iter().collect(), Vec::new())
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::{bson, doc};

    fn render(selector: &Selector) -> Bson {
        selector.prepare(true).unwrap()
    }

    #[test]
    fn test_simple_rendering() {
        assert_eq!(render(&eq("alice").unwrap().bound("name")), bson!({ "name": "alice" }));
        assert_eq!(render(&lt(5).unwrap().bound("age")), bson!({ "age": { "$lt": 5 } }));
        assert_eq!(
            render(&modulo(4, 1).bound("n")),
            bson!({ "n": { "$mod": [4_i64, 1_i64] } })
        );
        assert_eq!(lt(5).unwrap().prepare(false).unwrap(), bson!({ "$lt": 5 }));
    }

    #[test]
    fn test_type_contract() {
        let err = lt("five").unwrap_err();
        assert!(matches!(err, SelectorError::ValueType { .. }));
        assert!(err.to_string().contains("\"int\" or \"float\""));
        assert!(eq(Bson::Null).is_err());
        assert!(in_(vec![Bson::Document(doc! {})]).is_err());
    }

    #[test]
    fn test_list_values_are_distinct() {
        let selector = in_([1, 2, 2, 3]).unwrap().bound("n");
        assert_eq!(render(&selector), bson!({ "n": { "$in": [1, 2, 3] } }));
    }

    #[test]
    fn test_empty_list_renders_nothing() {
        let selector = in_(Vec::<i32>::new()).unwrap().bound("n");
        assert_eq!(render(&selector), bson!({}));
    }

    #[test]
    fn test_and_same_kind_equal_values_collapses() {
        let a = lt(5).unwrap();
        let combined = a.clone().and_with(lt(5).unwrap()).unwrap();
        assert_eq!(combined, a);
        assert_eq!(render(&combined.bound("age")), bson!({ "age": { "$lt": 5 } }));
    }

    #[test]
    fn test_and_same_kind_different_values_groups() {
        let combined = lt(5).unwrap().and_with(lt(7).unwrap()).unwrap().bound("age");
        assert_eq!(
            render(&combined),
            bson!({ "$and": [{ "age": { "$lt": 5 } }, { "age": { "$lt": 7 } }] })
        );
    }

    #[test]
    fn test_and_different_kinds_combines_under_one_key() {
        let combined = gte(18).unwrap().and_with(lt(65).unwrap()).unwrap();
        assert!(combined.is_combined());
        assert_eq!(
            render(&combined.bound("age")),
            bson!({ "age": { "$gte": 18, "$lt": 65 } })
        );
    }

    #[test]
    fn test_and_simple_into_combined() {
        let combined = gte(18)
            .unwrap()
            .and_with(lt(65).unwrap())
            .unwrap()
            .and_with(ne(30).unwrap())
            .unwrap()
            .and_with(lt(65).unwrap())
            .unwrap();
        assert_eq!(combined.conditions().len(), 3);
        assert_eq!(
            render(&combined.bound("age")),
            bson!({ "age": { "$gte": 18, "$lt": 65, "$ne": 30 } })
        );
    }

    #[test]
    fn test_and_combined_with_combined() {
        let left = gte(1).unwrap().and_with(lt(10).unwrap()).unwrap();
        let right = ne(5).unwrap().and_with(lt(10).unwrap()).unwrap();
        let merged = left.and_with(right).unwrap();
        assert_eq!(merged.conditions().len(), 3);
    }

    #[test]
    fn test_eq_that_satisfies_other_wins() {
        let selector = lt(10).unwrap().and_with(eq(5).unwrap()).unwrap();
        assert_eq!(selector, eq(5).unwrap());

        let contradiction = lt(3).unwrap().and_with(eq(5).unwrap()).unwrap().bound("n");
        assert_eq!(render(&contradiction), bson!({ "n": { "$lt": 3, "$eq": 5 } }));
    }

    #[test]
    fn test_different_keys_group_under_and() {
        let selector = eq(1)
            .unwrap()
            .bound("a")
            .and_with(eq(2).unwrap().bound("b"))
            .unwrap();
        assert_eq!(render(&selector), bson!({ "$and": [{ "a": 1 }, { "b": 2 }] }));
    }

    #[test]
    fn test_and_with_one_keyed_side_fails() {
        let err = eq(1).unwrap().bound("a").and_with(lt(5).unwrap()).unwrap_err();
        assert!(matches!(err, SelectorError::UncertainKey { .. }));
        assert!(lt(5).unwrap().and_with(gt(1).unwrap().bound("b")).is_err());

        let either = or_([eq(1).unwrap().bound("a"), eq(2).unwrap().bound("b")]).unwrap();
        assert!(eq(3).unwrap().bound("c").and_with(either).is_ok());
    }

    #[test]
    fn test_eq_and_modulo_at_integer_bounds() {
        let selector = eq(i64::MIN).unwrap().and_with(modulo(-1, 0)).unwrap();
        assert_eq!(selector, eq(i64::MIN).unwrap());
    }

    #[test]
    fn test_combining_with_value_fails() {
        let err = lt(1).unwrap().and_with(3).unwrap_err();
        assert!(matches!(err, SelectorError::Operation { .. }));
        assert!(lt(1).unwrap().or_with("x").is_err());
    }

    #[test]
    fn test_or_with_equal_eq_is_identity() {
        let a = eq(1).unwrap();
        assert_eq!(a.clone().or_with(eq(1).unwrap()).unwrap(), a);
    }

    #[test]
    fn test_conditional_preserves_child_order() {
        let c1 = eq("x").unwrap().bound("name");
        let c2 = gt(3).unwrap().bound("age");
        let selector = or_([c1.clone(), c2.clone()]).unwrap();
        assert_eq!(
            render(&selector),
            bson!({ "$or": [render(&c1), render(&c2)] })
        );
    }

    #[test]
    fn test_conditional_flattens_same_logic() {
        let inner = or_([eq(1).unwrap().bound("a"), eq(2).unwrap().bound("b")]).unwrap();
        let outer = or_([inner, eq(3).unwrap().bound("c")]).unwrap();
        assert_eq!(outer.children().len(), 3);
        assert!(outer.children().iter().all(|c| !c.is_conditional()));
    }

    #[test]
    fn test_conditional_nests_other_logic() {
        let inner = and_([eq(1).unwrap().bound("a"), eq(2).unwrap().bound("b")]).unwrap();
        let outer = nor([inner, eq(3).unwrap().bound("c")]).unwrap();
        assert_eq!(outer.children().len(), 2);
        assert!(outer.children()[0].is_conditional());
    }

    #[test]
    fn test_conditional_key_certainty() {
        let mixed = or_([eq(1).unwrap().bound("a"), eq(2).unwrap()]);
        assert!(matches!(mixed, Err(SelectorError::UncertainKey { .. })));

        let ambiguous = Logic::Or
            .builder()
            .selector(eq(1).unwrap())
            .field("b", 2)
            .build();
        assert!(matches!(ambiguous, Err(SelectorError::UncertainKey { .. })));

        let unkeyed = or_([lt(1).unwrap(), gt(5).unwrap()]).unwrap();
        assert!(unkeyed.require_key());
        assert!(unkeyed.prepare(true).is_err());
    }

    #[test]
    fn test_associate_propagates_and_is_idempotent() {
        let mut selector = or_([lt(1).unwrap(), gt(5).unwrap()]).unwrap();
        selector.associate("age");
        selector.associate("other");
        assert_eq!(selector.key(), Some("age"));
        assert!(!selector.require_key());
        assert_eq!(
            render(&selector),
            bson!({ "$or": [{ "age": { "$lt": 1 } }, { "age": { "$gt": 5 } }] })
        );
    }

    #[test]
    fn test_keyed_builder_wraps_values() {
        let selector = Logic::And
            .builder()
            .field("name", "bob")
            .field("age", gt(3).unwrap())
            .build()
            .unwrap();
        assert_eq!(
            render(&selector),
            bson!({ "$and": [{ "name": "bob" }, { "age": { "$gt": 3 } }] })
        );
    }

    #[test]
    fn test_short_conditionals_still_render() {
        let empty = or_(Vec::new()).unwrap();
        assert_eq!(render(&empty), bson!({ "$or": [] }));
        let single = or_([eq(1).unwrap().bound("a")]).unwrap();
        assert_eq!(render(&single), bson!({ "$or": [{ "a": 1 }] }));
    }

    #[test]
    fn test_prepare_is_idempotent() {
        let selector = gte(1).unwrap().and_with(lt(2).unwrap()).unwrap().bound("n");
        assert_eq!(selector.prepare(true).unwrap(), selector.prepare(true).unwrap());
    }
}
