//! Working memory: the fact registry and every per-node memory.
//!
//! Facts are stored with direct vector indexing (`FactId` == index), with a
//! canonical-key map for identity resolution. The per-node alpha, beta and
//! aggregate memories live here too — the network structure itself is
//! immutable during propagation, so a propagation pass borrows the network
//! read-only and this store mutably, and the two never alias.

use crate::facts::{Fact, FactId, FactKey};
use crate::network::NodeId;
use crate::tuples::{TupleId, TupleStore};
use chrono::{DateTime, Utc};
use ember_types::FactValue;
use std::collections::{HashMap, HashSet};

/// A fact wrapper: the host value plus the engine-side bookkeeping that
/// makes retraction predicate-free.
#[derive(Debug)]
pub struct FactEntry {
    pub id: FactId,
    /// Canonical key; `None` for derived (synthetic) facts.
    pub key: Option<FactKey>,
    pub fact: Fact,
    /// Synthetic facts produced by aggregate/binding nodes. Excluded from
    /// queries and identity resolution.
    pub derived: bool,
    /// Alpha memories this fact currently sits in, in assertion order.
    pub alpha_memberships: Vec<NodeId>,
    pub inserted_at: DateTime<Utc>,
}

/// Insertion-ordered set of facts admitted by one alpha memory node.
#[derive(Debug, Default)]
pub struct AlphaMemory {
    pub facts: Vec<FactId>,
    seen: HashSet<FactId>,
}

impl AlphaMemory {
    pub fn add(&mut self, fact: FactId) -> bool {
        if self.seen.insert(fact) {
            self.facts.push(fact);
            true
        } else {
            false
        }
    }

    pub fn remove(&mut self, fact: FactId) -> bool {
        if self.seen.remove(&fact) {
            self.facts.retain(|f| *f != fact);
            true
        } else {
            false
        }
    }

    pub fn contains(&self, fact: FactId) -> bool {
        self.seen.contains(&fact)
    }

    pub fn len(&self) -> usize {
        self.facts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.facts.is_empty()
    }
}

/// Hash index from join-key value to items, with the reverse assignment
/// kept so an item can be unindexed after the underlying fact mutated.
#[derive(Debug)]
pub struct KeyIndex<T: Copy + Eq + std::hash::Hash> {
    buckets: HashMap<FactValue, Vec<T>>,
    assigned: HashMap<T, FactValue>,
}

impl<T: Copy + Eq + std::hash::Hash> Default for KeyIndex<T> {
    fn default() -> Self {
        Self { buckets: HashMap::new(), assigned: HashMap::new() }
    }
}

impl<T: Copy + Eq + std::hash::Hash> KeyIndex<T> {
    pub fn insert(&mut self, key: FactValue, item: T) {
        self.buckets.entry(key.clone()).or_default().push(item);
        self.assigned.insert(item, key);
    }

    /// Remove the item from its bucket, returning the key it was filed
    /// under.
    pub fn remove(&mut self, item: T) -> Option<FactValue> {
        let key = self.assigned.remove(&item)?;
        if let Some(bucket) = self.buckets.get_mut(&key) {
            bucket.retain(|other| *other != item);
            if bucket.is_empty() {
                self.buckets.remove(&key);
            }
        }
        Some(key)
    }

    pub fn matches(&self, key: &FactValue) -> &[T] {
        self.buckets.get(key).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn key_of(&self, item: T) -> Option<&FactValue> {
        self.assigned.get(&item)
    }

    pub fn len(&self) -> usize {
        self.assigned.len()
    }

    pub fn is_empty(&self) -> bool {
        self.assigned.is_empty()
    }
}

/// Incremental state of one aggregate group (one per left tuple).
#[derive(Debug, Default)]
pub struct GroupState {
    /// Matching right facts in arrival order.
    pub members: Vec<FactId>,
    /// Synthetic result currently emitted downstream, if any.
    pub emitted: Option<(FactId, TupleId)>,
}

/// Memory attached to one beta-network node.
///
/// Which parts are populated depends on the node kind: joins use the tuple
/// list, lineage index and both key indexes; not/exists use the left index
/// and match counts; aggregates use the left index and groups; bindings use
/// `projections`. Pass-through selection nodes only use the tuple list.
#[derive(Debug, Default)]
pub struct BetaMemory {
    /// Tuples admitted by this node, in admission order.
    pub tuples: Vec<TupleId>,
    seen: HashSet<TupleId>,
    /// Child tuple per (parent, appended fact) lineage.
    pub by_lineage: HashMap<(TupleId, FactId), TupleId>,
    /// Left-channel tuples indexed by join key.
    pub left: KeyIndex<TupleId>,
    /// Right-channel facts indexed by join key.
    pub right: KeyIndex<FactId>,
    /// Per-left-tuple count of matching right facts (not/exists nodes).
    pub counts: HashMap<TupleId, usize>,
    /// Per-left-tuple aggregate group state (aggregate nodes).
    pub groups: HashMap<TupleId, GroupState>,
    /// Per-left-tuple projected synthetic fact (binding nodes).
    pub projections: HashMap<TupleId, (FactId, TupleId)>,
}

impl BetaMemory {
    pub fn admit(&mut self, tuple: TupleId) -> bool {
        if self.seen.insert(tuple) {
            self.tuples.push(tuple);
            true
        } else {
            false
        }
    }

    pub fn evict(&mut self, tuple: TupleId) -> bool {
        if self.seen.remove(&tuple) {
            self.tuples.retain(|t| *t != tuple);
            true
        } else {
            false
        }
    }

    pub fn contains(&self, tuple: TupleId) -> bool {
        self.seen.contains(&tuple)
    }

    pub fn len(&self) -> usize {
        self.tuples.len()
    }
}

/// The session's registry of facts plus all per-node memories.
#[derive(Debug)]
pub struct WorkingMemory {
    entries: Vec<Option<FactEntry>>,
    by_key: HashMap<FactKey, FactId>,
    live_count: usize,
    alpha: HashMap<NodeId, AlphaMemory>,
    beta: HashMap<NodeId, BetaMemory>,
    pub tuples: TupleStore,
}

impl WorkingMemory {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            by_key: HashMap::new(),
            live_count: 0,
            alpha: HashMap::new(),
            beta: HashMap::new(),
            tuples: TupleStore::new(),
        }
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: Vec::with_capacity(capacity),
            by_key: HashMap::with_capacity(capacity),
            live_count: 0,
            alpha: HashMap::new(),
            beta: HashMap::new(),
            tuples: TupleStore::new(),
        }
    }

    // -- fact registry ---------------------------------------------------

    pub fn resolve(&self, key: &FactKey) -> Option<FactId> {
        self.by_key.get(key).copied()
    }

    pub fn contains_key(&self, key: &FactKey) -> bool {
        self.by_key.contains_key(key)
    }

    pub fn contains(&self, id: FactId) -> bool {
        self.entries.get(id as usize).map(|e| e.is_some()).unwrap_or(false)
    }

    /// Register a host fact under its canonical key.
    pub fn register(&mut self, key: FactKey, fact: Fact) -> FactId {
        let id = self.entries.len() as FactId;
        self.by_key.insert(key.clone(), id);
        self.entries.push(Some(FactEntry {
            id,
            key: Some(key),
            fact,
            derived: false,
            alpha_memberships: Vec::new(),
            inserted_at: Utc::now(),
        }));
        self.live_count += 1;
        id
    }

    /// Register a synthetic fact produced inside the network.
    pub fn register_derived(&mut self, fact: Fact) -> FactId {
        let id = self.entries.len() as FactId;
        self.entries.push(Some(FactEntry {
            id,
            key: None,
            fact,
            derived: true,
            alpha_memberships: Vec::new(),
            inserted_at: Utc::now(),
        }));
        id
    }

    pub fn unregister(&mut self, id: FactId) -> Option<FactEntry> {
        let entry = self.entries.get_mut(id as usize).and_then(Option::take)?;
        if let Some(key) = &entry.key {
            self.by_key.remove(key);
        }
        if !entry.derived {
            self.live_count -= 1;
        }
        Some(entry)
    }

    pub fn entry(&self, id: FactId) -> Option<&FactEntry> {
        self.entries.get(id as usize).and_then(Option::as_ref)
    }

    pub fn entry_mut(&mut self, id: FactId) -> Option<&mut FactEntry> {
        self.entries.get_mut(id as usize).and_then(Option::as_mut)
    }

    pub fn fact(&self, id: FactId) -> Option<&Fact> {
        self.entry(id).map(|e| &e.fact)
    }

    /// Replace the host value of a fact, re-keying the registry. The old
    /// key must already be known to the caller (strict update validates
    /// first).
    pub fn replace_fact(&mut self, id: FactId, key: FactKey, fact: Fact) {
        if let Some(entry) = self.entries.get_mut(id as usize).and_then(Option::as_mut) {
            if let Some(old_key) = entry.key.take() {
                self.by_key.remove(&old_key);
            }
            self.by_key.insert(key.clone(), id);
            entry.key = Some(key);
            entry.fact = fact;
        }
    }

    /// Live, non-derived facts in insertion order.
    pub fn iter_user_facts(&self) -> impl Iterator<Item = &FactEntry> {
        self.entries.iter().flatten().filter(|e| !e.derived)
    }

    /// Number of live, non-derived facts.
    pub fn fact_count(&self) -> usize {
        self.live_count
    }

    // -- per-node memories -----------------------------------------------

    pub fn alpha_memory(&mut self, node: NodeId) -> &mut AlphaMemory {
        self.alpha.entry(node).or_default()
    }

    pub fn alpha_memory_ref(&self, node: NodeId) -> Option<&AlphaMemory> {
        self.alpha.get(&node)
    }

    pub fn beta_memory(&mut self, node: NodeId) -> &mut BetaMemory {
        self.beta.entry(node).or_default()
    }

    pub fn beta_memory_ref(&self, node: NodeId) -> Option<&BetaMemory> {
        self.beta.get(&node)
    }

    /// Borrow several facts at once, in the given order. Missing ids are
    /// skipped; propagation never holds a dangling fact id while a tuple is
    /// live.
    pub fn facts_for<'a>(&'a self, ids: &[FactId]) -> Vec<&'a Fact> {
        ids.iter().filter_map(|id| self.fact(*id)).collect()
    }

    /// Facts along a tuple's lineage, root-most first.
    pub fn tuple_facts(&self, tuple: TupleId) -> Vec<&Fact> {
        let ids = self.tuples.fact_ids(tuple);
        self.facts_for(&ids)
    }
}

impl Default for WorkingMemory {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::facts::TypeRegistry;

    #[test]
    fn registry_round_trip() {
        let registry = TypeRegistry::new();
        let mut wm = WorkingMemory::new();
        let fact = Fact::new("Ping").with_field("n", FactValue::Integer(1));
        let key = registry.key_for(&fact);

        let id = wm.register(key.clone(), fact);
        assert_eq!(wm.resolve(&key), Some(id));
        assert_eq!(wm.fact_count(), 1);

        wm.unregister(id);
        assert_eq!(wm.resolve(&key), None);
        assert_eq!(wm.fact_count(), 0);
    }

    #[test]
    fn derived_facts_are_invisible_to_queries() {
        let mut wm = WorkingMemory::new();
        wm.register_derived(Fact::new("aggregate"));
        assert_eq!(wm.fact_count(), 0);
        assert_eq!(wm.iter_user_facts().count(), 0);
    }

    #[test]
    fn key_index_tracks_reassignment() {
        let mut index: KeyIndex<u64> = KeyIndex::default();
        index.insert(FactValue::Integer(1), 10);
        index.insert(FactValue::Integer(1), 11);
        assert_eq!(index.matches(&FactValue::Integer(1)), &[10, 11]);

        let old = index.remove(10);
        assert_eq!(old, Some(FactValue::Integer(1)));
        assert_eq!(index.matches(&FactValue::Integer(1)), &[11]);
        assert!(index.remove(10).is_none());
    }

    #[test]
    fn alpha_memory_preserves_insertion_order() {
        let mut mem = AlphaMemory::default();
        mem.add(5);
        mem.add(2);
        mem.add(9);
        assert!(!mem.add(2));
        assert_eq!(mem.facts, vec![5, 2, 9]);
        mem.remove(2);
        assert_eq!(mem.facts, vec![5, 9]);
    }
}
