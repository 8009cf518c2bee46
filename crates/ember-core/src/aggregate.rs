//! Aggregators: reduce a group of facts to one synthetic value.
//!
//! An aggregate node keeps one group per left tuple and re-runs the
//! aggregator over the group whenever a member arrives, mutates or leaves.
//! Returning `None` means "emit nothing for this group" — the node retracts
//! any previously emitted synthetic result, which is how minimum-cardinality
//! thresholds work.

use crate::facts::Fact;
use ember_types::FactValue;
use std::fmt;

/// Reduction over the current members of one group.
pub trait Aggregator: fmt::Debug + Send + Sync {
    /// Aggregator name, used for the synthetic fact type and in snapshots.
    fn name(&self) -> &str;

    /// Compute the group result; `Ok(None)` emits nothing.
    fn evaluate(&self, members: &[&Fact]) -> anyhow::Result<Option<FactValue>>;
}

/// Collects the member facts' chosen field (or whole-fact object when no
/// field is named) into an array once the group reaches `min_count`.
#[derive(Debug, Clone)]
pub struct Collect {
    pub field: Option<String>,
    pub min_count: usize,
}

impl Collect {
    pub fn facts(min_count: usize) -> Self {
        Self { field: None, min_count }
    }

    pub fn field(field: impl Into<String>, min_count: usize) -> Self {
        Self { field: Some(field.into()), min_count }
    }
}

impl Aggregator for Collect {
    fn name(&self) -> &str {
        "collect"
    }

    fn evaluate(&self, members: &[&Fact]) -> anyhow::Result<Option<FactValue>> {
        if members.len() < self.min_count {
            return Ok(None);
        }
        let items = members
            .iter()
            .map(|fact| match &self.field {
                Some(field) => fact.get(field).cloned().unwrap_or(FactValue::Null),
                None => FactValue::Object(fact.fields.clone()),
            })
            .collect();
        Ok(Some(FactValue::Array(items)))
    }
}

/// Counts group members, emitting once `min_count` is reached.
#[derive(Debug, Clone)]
pub struct Count {
    pub min_count: usize,
}

impl Count {
    pub fn new(min_count: usize) -> Self {
        Self { min_count }
    }
}

impl Aggregator for Count {
    fn name(&self) -> &str {
        "count"
    }

    fn evaluate(&self, members: &[&Fact]) -> anyhow::Result<Option<FactValue>> {
        if members.len() < self.min_count {
            return Ok(None);
        }
        Ok(Some(FactValue::Integer(members.len() as i64)))
    }
}

/// Sums a numeric field. Empty groups emit nothing; a non-numeric member is
/// an evaluation failure.
#[derive(Debug, Clone)]
pub struct Sum {
    pub field: String,
}

impl Sum {
    pub fn of(field: impl Into<String>) -> Self {
        Self { field: field.into() }
    }
}

impl Aggregator for Sum {
    fn name(&self) -> &str {
        "sum"
    }

    fn evaluate(&self, members: &[&Fact]) -> anyhow::Result<Option<FactValue>> {
        if members.is_empty() {
            return Ok(None);
        }
        let mut total = 0.0;
        for fact in members {
            total += numeric_field(fact, &self.field)?;
        }
        Ok(Some(FactValue::Float(total)))
    }
}

/// Minimum of a numeric field across the group.
#[derive(Debug, Clone)]
pub struct Min {
    pub field: String,
}

impl Aggregator for Min {
    fn name(&self) -> &str {
        "min"
    }

    fn evaluate(&self, members: &[&Fact]) -> anyhow::Result<Option<FactValue>> {
        fold_numeric(members, &self.field, f64::min)
    }
}

/// Maximum of a numeric field across the group.
#[derive(Debug, Clone)]
pub struct Max {
    pub field: String,
}

impl Aggregator for Max {
    fn name(&self) -> &str {
        "max"
    }

    fn evaluate(&self, members: &[&Fact]) -> anyhow::Result<Option<FactValue>> {
        fold_numeric(members, &self.field, f64::max)
    }
}

fn fold_numeric(
    members: &[&Fact],
    field: &str,
    op: fn(f64, f64) -> f64,
) -> anyhow::Result<Option<FactValue>> {
    let mut acc: Option<f64> = None;
    for fact in members {
        let value = numeric_field(fact, field)?;
        acc = Some(match acc {
            Some(current) => op(current, value),
            None => value,
        });
    }
    Ok(acc.map(FactValue::Float))
}

fn numeric_field(fact: &Fact, field: &str) -> anyhow::Result<f64> {
    let value = fact
        .get(field)
        .ok_or_else(|| anyhow::anyhow!("field '{field}' missing on {} fact", fact.fact_type))?;
    value.as_f64().ok_or_else(|| {
        anyhow::anyhow!("field '{field}' is {} and cannot be aggregated", value.type_name())
    })
}
