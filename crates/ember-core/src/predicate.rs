//! Compiled predicate, key-selector and binding seams.
//!
//! A compiled network carries these as trait objects: single-fact
//! predicates on alpha selection nodes, tuple predicates on beta selection
//! nodes, key selectors on the two sides of join-family nodes, and binding
//! expressions on binding nodes. The crate ships field-based
//! implementations for all of them; hosts plug arbitrary code in through
//! the closure adapters, whose failures surface as condition-evaluation
//! errors.

use crate::facts::Fact;
use ember_types::{FactValue, Operator};
use std::fmt;

/// Predicate over a single fact, evaluated by alpha selection nodes.
pub trait FactPredicate: fmt::Debug + Send + Sync {
    fn evaluate(&self, fact: &Fact) -> anyhow::Result<bool>;

    /// Display label used in snapshots and error context.
    fn describe(&self) -> String;

    /// Key for alpha-node sharing; `None` opts out (closure predicates are
    /// never shared).
    fn share_key(&self) -> Option<String> {
        None
    }
}

/// Field/operator/value condition — the bread-and-butter compiled predicate.
#[derive(Debug, Clone)]
pub struct FieldCondition {
    pub field: String,
    pub operator: Operator,
    pub value: FactValue,
}

impl FieldCondition {
    pub fn new(field: impl Into<String>, operator: Operator, value: FactValue) -> Self {
        Self { field: field.into(), operator, value }
    }
}

impl FactPredicate for FieldCondition {
    fn evaluate(&self, fact: &Fact) -> anyhow::Result<bool> {
        // A missing field does not match; it is not an evaluation failure.
        Ok(fact
            .get(&self.field)
            .map(|actual| self.operator.test(actual, &self.value))
            .unwrap_or(false))
    }

    fn describe(&self) -> String {
        format!("{} {:?} {}", self.field, self.operator, self.value)
    }

    fn share_key(&self) -> Option<String> {
        Some(self.describe())
    }
}

/// Adapter turning a host closure into a [`FactPredicate`].
pub struct PredicateFn<F> {
    name: String,
    f: F,
}

impl<F> PredicateFn<F>
where
    F: Fn(&Fact) -> anyhow::Result<bool> + Send + Sync,
{
    pub fn new(name: impl Into<String>, f: F) -> Self {
        Self { name: name.into(), f }
    }
}

impl<F> fmt::Debug for PredicateFn<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PredicateFn({})", self.name)
    }
}

impl<F> FactPredicate for PredicateFn<F>
where
    F: Fn(&Fact) -> anyhow::Result<bool> + Send + Sync,
{
    fn evaluate(&self, fact: &Fact) -> anyhow::Result<bool> {
        (self.f)(fact)
    }

    fn describe(&self) -> String {
        self.name.clone()
    }
}

/// Predicate over a full tuple (facts in declaration order), evaluated by
/// beta selection nodes.
pub trait TuplePredicate: fmt::Debug + Send + Sync {
    fn evaluate(&self, facts: &[&Fact]) -> anyhow::Result<bool>;
    fn describe(&self) -> String;
}

/// Adapter turning a host closure into a [`TuplePredicate`].
pub struct TuplePredicateFn<F> {
    name: String,
    f: F,
}

impl<F> TuplePredicateFn<F>
where
    F: Fn(&[&Fact]) -> anyhow::Result<bool> + Send + Sync,
{
    pub fn new(name: impl Into<String>, f: F) -> Self {
        Self { name: name.into(), f }
    }
}

impl<F> fmt::Debug for TuplePredicateFn<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TuplePredicateFn({})", self.name)
    }
}

impl<F> TuplePredicate for TuplePredicateFn<F>
where
    F: Fn(&[&Fact]) -> anyhow::Result<bool> + Send + Sync,
{
    fn evaluate(&self, facts: &[&Fact]) -> anyhow::Result<bool> {
        (self.f)(facts)
    }

    fn describe(&self) -> String {
        self.name.clone()
    }
}

/// Comparison between two fields across a tuple, evaluated at beta level
/// when a join test is not a plain equality.
#[derive(Debug, Clone)]
pub struct TupleFieldComparison {
    pub left_position: usize,
    pub left_field: String,
    pub operator: Operator,
    pub right_field: String,
}

impl TuplePredicate for TupleFieldComparison {
    fn evaluate(&self, facts: &[&Fact]) -> anyhow::Result<bool> {
        let right = match facts.last() {
            Some(fact) => fact,
            None => return Ok(false),
        };
        let left = match facts.get(self.left_position) {
            Some(fact) => fact,
            None => return Ok(false),
        };
        Ok(match (left.get(&self.left_field), right.get(&self.right_field)) {
            (Some(a), Some(b)) => self.operator.test(a, b),
            _ => false,
        })
    }

    fn describe(&self) -> String {
        format!(
            "[{}].{} {:?} .{}",
            self.left_position, self.left_field, self.operator, self.right_field
        )
    }
}

/// Extracts a join key from a single (right-channel) fact. Returning
/// `Ok(None)` means the fact joins with nothing.
pub trait FactKeySelector: fmt::Debug + Send + Sync {
    fn select(&self, fact: &Fact) -> anyhow::Result<Option<FactValue>>;
    fn describe(&self) -> String;
}

/// Extracts a join key from a tuple (left channel).
pub trait TupleKeySelector: fmt::Debug + Send + Sync {
    fn select(&self, facts: &[&Fact]) -> anyhow::Result<Option<FactValue>>;
    fn describe(&self) -> String;
}

/// Single-field key of the right-channel fact; composite keys list several
/// fields and produce an array value.
#[derive(Debug, Clone)]
pub struct FieldKey {
    pub fields: Vec<String>,
}

impl FieldKey {
    pub fn single(field: impl Into<String>) -> Self {
        Self { fields: vec![field.into()] }
    }
}

impl FactKeySelector for FieldKey {
    fn select(&self, fact: &Fact) -> anyhow::Result<Option<FactValue>> {
        let mut values = Vec::with_capacity(self.fields.len());
        for field in &self.fields {
            match fact.get(field) {
                Some(value) => values.push(value.clone()),
                None => return Ok(None),
            }
        }
        Ok(Some(if values.len() == 1 {
            values.swap_remove(0)
        } else {
            FactValue::Array(values)
        }))
    }

    fn describe(&self) -> String {
        self.fields.join("+")
    }
}

/// Key drawn from fields of facts already bound in the tuple. Positions are
/// declaration indices.
#[derive(Debug, Clone)]
pub struct TupleFieldKey {
    pub fields: Vec<(usize, String)>,
}

impl TupleFieldKey {
    pub fn single(position: usize, field: impl Into<String>) -> Self {
        Self { fields: vec![(position, field.into())] }
    }
}

impl TupleKeySelector for TupleFieldKey {
    fn select(&self, facts: &[&Fact]) -> anyhow::Result<Option<FactValue>> {
        let mut values = Vec::with_capacity(self.fields.len());
        for (position, field) in &self.fields {
            match facts.get(*position).and_then(|fact| fact.get(field)) {
                Some(value) => values.push(value.clone()),
                None => return Ok(None),
            }
        }
        Ok(Some(if values.len() == 1 {
            values.swap_remove(0)
        } else {
            FactValue::Array(values)
        }))
    }

    fn describe(&self) -> String {
        let parts: Vec<String> =
            self.fields.iter().map(|(p, f)| format!("[{p}].{f}")).collect();
        parts.join("+")
    }
}

/// Constant key: every item lands in one bucket, making the join
/// unconditional. Used for the first pattern of every rule (joined against
/// the root tuple) and for explicit cross joins.
#[derive(Debug, Clone, Default)]
pub struct ConstantKey;

impl FactKeySelector for ConstantKey {
    fn select(&self, _fact: &Fact) -> anyhow::Result<Option<FactValue>> {
        Ok(Some(FactValue::Boolean(true)))
    }

    fn describe(&self) -> String {
        "*".to_string()
    }
}

impl TupleKeySelector for ConstantKey {
    fn select(&self, _facts: &[&Fact]) -> anyhow::Result<Option<FactValue>> {
        Ok(Some(FactValue::Boolean(true)))
    }

    fn describe(&self) -> String {
        "*".to_string()
    }
}

/// Computes a value from the bound facts; binding nodes project the result
/// into the tuple as a synthetic fact.
pub trait BindingExpr: fmt::Debug + Send + Sync {
    fn compute(&self, facts: &[&Fact]) -> anyhow::Result<FactValue>;
    fn describe(&self) -> String;
}

/// Adapter turning a host closure into a [`BindingExpr`].
pub struct BindingFn<F> {
    name: String,
    f: F,
}

impl<F> BindingFn<F>
where
    F: Fn(&[&Fact]) -> anyhow::Result<FactValue> + Send + Sync,
{
    pub fn new(name: impl Into<String>, f: F) -> Self {
        Self { name: name.into(), f }
    }
}

impl<F> fmt::Debug for BindingFn<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BindingFn({})", self.name)
    }
}

impl<F> BindingExpr for BindingFn<F>
where
    F: Fn(&[&Fact]) -> anyhow::Result<FactValue> + Send + Sync,
{
    fn compute(&self, facts: &[&Fact]) -> anyhow::Result<FactValue> {
        (self.f)(facts)
    }

    fn describe(&self) -> String {
        self.name.clone()
    }
}
