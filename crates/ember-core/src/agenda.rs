//! The agenda: activations pending execution, in firing order.
//!
//! Ordering is (rule priority descending, activation sequence ascending) —
//! higher-priority rules first, FIFO within a priority. The queue is a
//! `BTreeMap` over that key, so popping is deterministic without any
//! re-sorting; a secondary index enforces at most one activation per
//! (rule, tuple) pair. Filters are consulted at pop time only — a filtered
//! activation stays queued.

use crate::facts::{FactId, RuleId};
use crate::network::RuleDefinition;
use crate::tuples::TupleId;
use std::collections::{BTreeMap, HashMap};

/// A rule ready to fire, bound to the tuple that matched it.
#[derive(Debug, Clone)]
pub struct Activation {
    pub rule: RuleId,
    pub tuple: TupleId,
    /// Session-monotonic sequence number; reassigned on modify.
    pub seq: u64,
    /// Bound facts in declaration order.
    pub facts: Vec<(String, FactId)>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
struct AgendaKey {
    /// Negated rule priority, so ascending key order is descending
    /// priority.
    neg_priority: i64,
    seq: u64,
}

/// Pop-time activation filter.
pub trait AgendaFilter {
    fn accept(&self, activation: &Activation, rule: &RuleDefinition) -> bool;
}

/// Accepts only rules in the given agenda group.
#[derive(Debug, Clone)]
pub struct RuleGroupFilter {
    pub group: String,
}

impl AgendaFilter for RuleGroupFilter {
    fn accept(&self, _activation: &Activation, rule: &RuleDefinition) -> bool {
        rule.group.as_deref() == Some(self.group.as_str())
    }
}

/// Priority-ordered set of pending activations.
pub struct Agenda {
    queue: BTreeMap<AgendaKey, Activation>,
    index: HashMap<(RuleId, TupleId), AgendaKey>,
    filters: Vec<Box<dyn AgendaFilter>>,
    next_seq: u64,
}

impl std::fmt::Debug for Agenda {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Agenda")
            .field("pending", &self.queue.len())
            .field("filters", &self.filters.len())
            .field("next_seq", &self.next_seq)
            .finish()
    }
}

impl Agenda {
    pub fn new() -> Self {
        Self { queue: BTreeMap::new(), index: HashMap::new(), filters: Vec::new(), next_seq: 0 }
    }

    pub fn next_seq(&mut self) -> u64 {
        let seq = self.next_seq;
        self.next_seq += 1;
        seq
    }

    /// Queue an activation. A second activation for the same (rule, tuple)
    /// pair is ignored — the update path goes through [`modify`](Self::modify).
    pub fn add(&mut self, activation: Activation, priority: i32) -> bool {
        let slot = (activation.rule, activation.tuple);
        if self.index.contains_key(&slot) {
            return false;
        }
        let key = AgendaKey { neg_priority: -(priority as i64), seq: activation.seq };
        self.index.insert(slot, key);
        self.queue.insert(key, activation);
        true
    }

    /// Resequence a queued activation to now. Consumed (already popped)
    /// activations are not re-queued.
    pub fn modify(&mut self, rule: RuleId, tuple: TupleId, priority: i32) -> bool {
        let slot = (rule, tuple);
        let Some(old_key) = self.index.remove(&slot) else {
            return false;
        };
        let mut activation = self.queue.remove(&old_key).expect("index and queue in sync");
        activation.seq = self.next_seq();
        let key = AgendaKey { neg_priority: -(priority as i64), seq: activation.seq };
        self.index.insert(slot, key);
        self.queue.insert(key, activation);
        true
    }

    /// Drop a queued activation; a no-op when it was already consumed.
    pub fn remove(&mut self, rule: RuleId, tuple: TupleId) -> Option<Activation> {
        let key = self.index.remove(&(rule, tuple))?;
        self.queue.remove(&key)
    }

    pub fn contains(&self, rule: RuleId, tuple: TupleId) -> bool {
        self.index.contains_key(&(rule, tuple))
    }

    fn passes_filters(&self, activation: &Activation, rules: &[std::sync::Arc<RuleDefinition>]) -> bool {
        let rule = &rules[activation.rule as usize];
        self.filters.iter().all(|f| f.accept(activation, rule))
    }

    /// Highest-priority, earliest-sequence activation passing every filter.
    /// Popping consumes the activation; filtered ones stay queued.
    pub fn pop_next(&mut self, rules: &[std::sync::Arc<RuleDefinition>]) -> Option<Activation> {
        let key = self
            .queue
            .iter()
            .find(|(_, activation)| self.passes_filters(activation, rules))
            .map(|(key, _)| *key)?;
        let activation = self.queue.remove(&key)?;
        self.index.remove(&(activation.rule, activation.tuple));
        Some(activation)
    }

    pub fn has_active(&self, rules: &[std::sync::Arc<RuleDefinition>]) -> bool {
        self.queue.values().any(|a| self.passes_filters(a, rules))
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn clear(&mut self) {
        self.queue.clear();
        self.index.clear();
    }

    /// Queued activations in pop order, ignoring filters.
    pub fn iter(&self) -> impl Iterator<Item = &Activation> {
        self.queue.values()
    }

    pub fn add_filter(&mut self, filter: Box<dyn AgendaFilter>) {
        self.filters.push(filter);
    }

    pub fn clear_filters(&mut self) {
        self.filters.clear();
    }
}

impl Default for Agenda {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn rule(id: RuleId, priority: i32, group: Option<&str>) -> Arc<RuleDefinition> {
        Arc::new(RuleDefinition {
            id,
            name: format!("rule-{id}"),
            priority,
            group: group.map(str::to_string),
            actions: vec![],
        })
    }

    fn activation(agenda: &mut Agenda, rule: RuleId, tuple: TupleId) -> Activation {
        let seq = agenda.next_seq();
        Activation { rule, tuple, seq, facts: vec![] }
    }

    #[test]
    fn priority_then_fifo() {
        let rules = vec![rule(0, 0, None), rule(1, 10, None)];
        let mut agenda = Agenda::new();

        let a = activation(&mut agenda, 0, 1);
        agenda.add(a, 0);
        let b = activation(&mut agenda, 1, 2);
        agenda.add(b, 10);
        let c = activation(&mut agenda, 0, 3);
        agenda.add(c, 0);

        let order: Vec<TupleId> =
            std::iter::from_fn(|| agenda.pop_next(&rules)).map(|a| a.tuple).collect();
        assert_eq!(order, vec![2, 1, 3]);
    }

    #[test]
    fn duplicate_rule_tuple_is_ignored() {
        let rules = vec![rule(0, 0, None)];
        let mut agenda = Agenda::new();
        let a = activation(&mut agenda, 0, 1);
        assert!(agenda.add(a, 0));
        let dup = activation(&mut agenda, 0, 1);
        assert!(!agenda.add(dup, 0));
        assert_eq!(agenda.len(), 1);
        let _ = agenda.pop_next(&rules);
        assert!(agenda.pop_next(&rules).is_none());
    }

    #[test]
    fn modify_resequences_to_back_of_priority_band() {
        let rules = vec![rule(0, 0, None)];
        let mut agenda = Agenda::new();
        let a = activation(&mut agenda, 0, 1);
        agenda.add(a, 0);
        let b = activation(&mut agenda, 0, 2);
        agenda.add(b, 0);

        assert!(agenda.modify(0, 1, 0));
        let order: Vec<TupleId> =
            std::iter::from_fn(|| agenda.pop_next(&rules)).map(|a| a.tuple).collect();
        assert_eq!(order, vec![2, 1]);
    }

    #[test]
    fn modify_does_not_requeue_consumed_activations() {
        let rules = vec![rule(0, 0, None)];
        let mut agenda = Agenda::new();
        let a = activation(&mut agenda, 0, 1);
        agenda.add(a, 0);
        agenda.pop_next(&rules).unwrap();

        assert!(!agenda.modify(0, 1, 0));
        assert!(agenda.is_empty());
    }

    #[test]
    fn group_filter_applies_at_pop_time() {
        let rules = vec![rule(0, 0, Some("audit")), rule(1, 0, None)];
        let mut agenda = Agenda::new();
        let a = activation(&mut agenda, 1, 1);
        agenda.add(a, 0);
        let b = activation(&mut agenda, 0, 2);
        agenda.add(b, 0);

        agenda.add_filter(Box::new(RuleGroupFilter { group: "audit".into() }));
        let popped = agenda.pop_next(&rules).unwrap();
        assert_eq!(popped.rule, 0);
        // The filtered activation is still queued.
        assert_eq!(agenda.len(), 1);
        assert!(!agenda.has_active(&rules));

        agenda.clear_filters();
        assert!(agenda.has_active(&rules));
    }
}
