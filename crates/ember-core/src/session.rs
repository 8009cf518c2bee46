//! The rule session: the public façade over working memory, the Rete
//! network and the agenda.
//!
//! A session is a single-threaded state machine. Every operation completes
//! synchronously before returning; concurrent use from multiple threads is
//! not supported and not guarded against. Strict bulk operations are
//! all-or-error: the batch is validated before the network is touched, and
//! a condition failure during insert rolls the whole call back (see
//! DESIGN.md for the recorded failure semantics).

use crate::agenda::{Agenda, AgendaFilter};
use crate::alpha;
use crate::beta;
use crate::context::{ActionContext, ExecutionContext, Operation};
use crate::dependency::{DependencyResolver, ServiceRegistry};
use crate::error::{EngineError, SessionResult};
use crate::events::{ActivationInfo, EventAggregator, SessionEvent};
use crate::facts::{Fact, FactHandle, FactId, FactKey, TypeRegistry};
use crate::network::{NodeId, ReteNetwork};
use crate::tuples::ROOT_TUPLE;
use crate::working_memory::WorkingMemory;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// Summary counters exposed for diagnostics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionStats {
    pub fact_count: usize,
    pub rule_count: usize,
    pub node_count: usize,
    pub tuple_count: usize,
    pub activation_count: usize,
}

/// A live rule session over a compiled network.
pub struct Session {
    pub(crate) network: ReteNetwork,
    registry: TypeRegistry,
    pub(crate) memory: WorkingMemory,
    pub(crate) agenda: Agenda,
    events: EventAggregator,
    resolver: Box<dyn DependencyResolver>,
    dispatch_cache: HashMap<String, Vec<NodeId>>,
    halted: bool,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("facts", &self.memory.fact_count())
            .field("rules", &self.network.rules().len())
            .field("agenda", &self.agenda.len())
            .finish()
    }
}

impl Session {
    /// Create a session over a compiled network, seeding the beta root with
    /// the root tuple so first-pattern joins have a left input.
    pub fn new(network: ReteNetwork, registry: TypeRegistry) -> Self {
        let mut session = Self {
            network,
            registry,
            memory: WorkingMemory::new(),
            agenda: Agenda::new(),
            events: EventAggregator::new(),
            resolver: Box::new(ServiceRegistry::new()),
            dispatch_cache: HashMap::new(),
            halted: false,
        };
        session.seed_root();
        session
    }

    pub fn with_capacity(network: ReteNetwork, registry: TypeRegistry, capacity: usize) -> Self {
        let mut session = Self {
            network,
            registry,
            memory: WorkingMemory::with_capacity(capacity),
            agenda: Agenda::new(),
            events: EventAggregator::new(),
            resolver: Box::new(ServiceRegistry::new()),
            dispatch_cache: HashMap::new(),
            halted: false,
        };
        session.seed_root();
        session
    }

    fn seed_root(&mut self) {
        let root = self.network.beta_root();
        self.memory.beta_memory(root).admit(ROOT_TUPLE);
        let successors: Vec<NodeId> = self.network.node(root).successors().to_vec();
        let mut ctx = ExecutionContext::new(
            Operation::Insert,
            &mut self.memory,
            &mut self.agenda,
            &self.events,
            self.network.rules(),
        );
        for successor in successors {
            // No facts exist yet; only constant keys and negation seeds run,
            // none of which can fail.
            if let Err(error) = beta::left_assert(&self.network, &mut ctx, successor, ROOT_TUPLE) {
                warn!(%error, "root seeding failed");
            }
        }
        debug!(nodes = self.network.node_count(), "session ready");
    }

    // -- insert ----------------------------------------------------------

    /// Insert a single fact. Fails with `already_exists` when a fact with
    /// the same identity is present.
    pub fn insert(&mut self, fact: Fact) -> SessionResult<FactHandle> {
        Ok(self.insert_all(vec![fact])?.pop().expect("one handle per inserted fact"))
    }

    /// All-or-error bulk insert: if any fact already exists the call fails
    /// and nothing is inserted.
    #[instrument(skip(self, facts), fields(count = facts.len()))]
    pub fn insert_all(&mut self, facts: Vec<Fact>) -> SessionResult<Vec<FactHandle>> {
        let mut keys = Vec::with_capacity(facts.len());
        let mut batch_keys: HashSet<FactKey> = HashSet::with_capacity(facts.len());
        for fact in &facts {
            let key = self.registry.key_for(fact);
            if self.memory.contains_key(&key) || !batch_keys.insert(key.clone()) {
                return Err(EngineError::already_exists(&fact.fact_type, key.display()));
            }
            keys.push(key);
        }

        let mut inserted: Vec<FactId> = Vec::with_capacity(facts.len());
        let mut handles = Vec::with_capacity(facts.len());
        for (fact, key) in facts.into_iter().zip(keys) {
            match self.insert_one(key, fact, &mut inserted) {
                Ok(handle) => handles.push(handle),
                Err(error) => {
                    self.rollback_inserts(&inserted);
                    return Err(error);
                }
            }
        }
        debug!(inserted = handles.len(), "facts inserted");
        Ok(handles)
    }

    /// Insert unless present; returns `None` for facts that already exist.
    pub fn try_insert(&mut self, fact: Fact) -> SessionResult<Option<FactHandle>> {
        let key = self.registry.key_for(&fact);
        if self.memory.contains_key(&key) {
            return Ok(None);
        }
        let mut inserted = Vec::with_capacity(1);
        match self.insert_one(key, fact, &mut inserted) {
            Ok(handle) => Ok(Some(handle)),
            Err(error) => {
                self.rollback_inserts(&inserted);
                Err(error)
            }
        }
    }

    /// Insert the new subset of a batch; per-fact outcome in input order.
    #[instrument(skip(self, facts), fields(count = facts.len()))]
    pub fn try_insert_all(&mut self, facts: Vec<Fact>) -> SessionResult<Vec<Option<FactHandle>>> {
        let mut outcomes = Vec::with_capacity(facts.len());
        for fact in facts {
            outcomes.push(self.try_insert(fact)?);
        }
        Ok(outcomes)
    }

    fn insert_one(
        &mut self,
        key: FactKey,
        fact: Fact,
        inserted: &mut Vec<FactId>,
    ) -> SessionResult<FactHandle> {
        let roots = self.dispatch_roots(&fact.fact_type);
        let id = self.memory.register(key, fact);
        inserted.push(id);

        let snapshot = self.memory.fact(id).cloned();
        if let Some(snapshot) = &snapshot {
            let snapshot = snapshot.clone();
            self.events.publish_with(move || SessionEvent::FactInserting {
                handle: FactHandle(id),
                fact: snapshot,
            });
        }

        let mut ctx = ExecutionContext::new(
            Operation::Insert,
            &mut self.memory,
            &mut self.agenda,
            &self.events,
            self.network.rules(),
        );
        alpha::assert_fact(&self.network, &mut ctx, &roots, id)?;

        if let Some(snapshot) = snapshot {
            self.events.publish_with(move || SessionEvent::FactInserted {
                handle: FactHandle(id),
                fact: snapshot,
            });
        }
        Ok(FactHandle(id))
    }

    /// Membership-driven teardown of a failed insert batch. Never
    /// re-evaluates predicates, so it cannot fail; fact-level events stay
    /// silent, activation deletions still reach observers.
    fn rollback_inserts(&mut self, inserted: &[FactId]) {
        for &id in inserted.iter().rev() {
            let mut ctx = ExecutionContext::new(
                Operation::Retract,
                &mut self.memory,
                &mut self.agenda,
                &self.events,
                self.network.rules(),
            );
            if let Err(error) = alpha::retract_fact(&self.network, &mut ctx, id) {
                warn!(fact = id, %error, "rollback retraction reported an error");
            }
            self.memory.unregister(id);
        }
    }

    // -- update ----------------------------------------------------------

    /// Notify the engine that a fact changed. Fails with `unknown_fact`
    /// when no fact with the same identity is present.
    pub fn update(&mut self, fact: Fact) -> SessionResult<()> {
        self.update_all(vec![fact])
    }

    /// All-or-error bulk update; the batch is validated before propagation.
    #[instrument(skip(self, facts), fields(count = facts.len()))]
    pub fn update_all(&mut self, facts: Vec<Fact>) -> SessionResult<()> {
        let mut resolved = Vec::with_capacity(facts.len());
        for fact in &facts {
            let key = self.registry.key_for(fact);
            let id = self.memory.resolve(&key).ok_or_else(|| {
                EngineError::unknown_fact(&fact.fact_type, key.display())
            })?;
            resolved.push((id, key));
        }
        for (fact, (id, key)) in facts.into_iter().zip(resolved) {
            self.update_one(id, key, fact)?;
        }
        Ok(())
    }

    /// Update a fact addressed by its insert handle; used when the change
    /// touches the fact's own key fields.
    pub fn update_by_handle(&mut self, handle: FactHandle, fact: Fact) -> SessionResult<()> {
        if !self.memory.contains(handle.0) {
            let key = self.registry.key_for(&fact);
            return Err(EngineError::unknown_fact(&fact.fact_type, key.display()));
        }
        let key = self.registry.key_for(&fact);
        self.update_one(handle.0, key, fact)
    }

    /// Update if known; returns whether the fact was present.
    pub fn try_update(&mut self, fact: Fact) -> SessionResult<bool> {
        let key = self.registry.key_for(&fact);
        match self.memory.resolve(&key) {
            Some(id) => {
                self.update_one(id, key, fact)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Update the known subset; per-fact outcome in input order.
    pub fn try_update_all(&mut self, facts: Vec<Fact>) -> SessionResult<Vec<bool>> {
        let mut outcomes = Vec::with_capacity(facts.len());
        for fact in facts {
            outcomes.push(self.try_update(fact)?);
        }
        Ok(outcomes)
    }

    fn update_one(&mut self, id: FactId, key: FactKey, fact: Fact) -> SessionResult<()> {
        let roots = self.dispatch_roots(&fact.fact_type);
        let snapshot = fact.clone();
        self.events.publish_with(|| SessionEvent::FactUpdating {
            handle: FactHandle(id),
            fact: snapshot.clone(),
        });
        self.memory.replace_fact(id, key, fact);

        let mut ctx = ExecutionContext::new(
            Operation::Update,
            &mut self.memory,
            &mut self.agenda,
            &self.events,
            self.network.rules(),
        );
        if let Err(error) = alpha::update_fact(&self.network, &mut ctx, &roots, id) {
            // The pre-update contribution is already partially torn down;
            // evict the fact entirely so memory invariants hold.
            self.evict_fact(id);
            return Err(error);
        }

        self.events.publish_with(move || SessionEvent::FactUpdated {
            handle: FactHandle(id),
            fact: snapshot,
        });
        Ok(())
    }

    fn evict_fact(&mut self, id: FactId) {
        let mut ctx = ExecutionContext::new(
            Operation::Retract,
            &mut self.memory,
            &mut self.agenda,
            &self.events,
            self.network.rules(),
        );
        if let Err(error) = alpha::retract_fact(&self.network, &mut ctx, id) {
            warn!(fact = id, %error, "eviction retraction reported an error");
        }
        self.memory.unregister(id);
    }

    // -- retract ---------------------------------------------------------

    /// Remove a fact. Fails with `unknown_fact` when absent.
    pub fn retract(&mut self, fact: &Fact) -> SessionResult<()> {
        let key = self.registry.key_for(fact);
        let id = self
            .memory
            .resolve(&key)
            .ok_or_else(|| EngineError::unknown_fact(&fact.fact_type, key.display()))?;
        self.retract_one(id)
    }

    /// All-or-error bulk retract; validated before propagation.
    #[instrument(skip(self, facts), fields(count = facts.len()))]
    pub fn retract_all(&mut self, facts: &[Fact]) -> SessionResult<()> {
        let mut ids = Vec::with_capacity(facts.len());
        for fact in facts {
            let key = self.registry.key_for(fact);
            let id = self
                .memory
                .resolve(&key)
                .ok_or_else(|| EngineError::unknown_fact(&fact.fact_type, key.display()))?;
            ids.push(id);
        }
        for id in ids {
            self.retract_one(id)?;
        }
        Ok(())
    }

    pub fn retract_by_handle(&mut self, handle: FactHandle) -> SessionResult<()> {
        if !self.memory.contains(handle.0) {
            return Err(EngineError::unknown_fact("?", handle.to_string()));
        }
        self.retract_one(handle.0)
    }

    /// Retract if known; returns whether the fact was present.
    pub fn try_retract(&mut self, fact: &Fact) -> SessionResult<bool> {
        let key = self.registry.key_for(fact);
        match self.memory.resolve(&key) {
            Some(id) => {
                self.retract_one(id)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Retract the known subset; per-fact outcome in input order.
    pub fn try_retract_all(&mut self, facts: &[Fact]) -> SessionResult<Vec<bool>> {
        let mut outcomes = Vec::with_capacity(facts.len());
        for fact in facts {
            outcomes.push(self.try_retract(fact)?);
        }
        Ok(outcomes)
    }

    fn retract_one(&mut self, id: FactId) -> SessionResult<()> {
        let snapshot = self.memory.fact(id).cloned();
        if let Some(snapshot) = &snapshot {
            let snapshot = snapshot.clone();
            self.events.publish_with(move || SessionEvent::FactRetracting {
                handle: FactHandle(id),
                fact: snapshot,
            });
        }

        let mut ctx = ExecutionContext::new(
            Operation::Retract,
            &mut self.memory,
            &mut self.agenda,
            &self.events,
            self.network.rules(),
        );
        alpha::retract_fact(&self.network, &mut ctx, id)?;
        self.memory.unregister(id);

        if let Some(snapshot) = snapshot {
            self.events.publish_with(move || SessionEvent::FactRetracted {
                handle: FactHandle(id),
                fact: snapshot,
            });
        }
        Ok(())
    }

    // -- fire ------------------------------------------------------------

    /// Drain the agenda, executing each activation's actions in agenda
    /// order. Returns the number of rules fired. Actions may re-enter the
    /// session; an activation is consumed at pop time, so an action
    /// retracting its own bound facts is tolerated.
    #[instrument(skip(self))]
    pub fn fire(&mut self) -> SessionResult<usize> {
        self.halted = false;
        let mut fired = 0usize;
        loop {
            if self.halted {
                debug!(fired, "fire loop halted");
                break;
            }
            let Some(activation) = self.agenda.pop_next(self.network.rules()) else {
                break;
            };
            let rule = self.network.rule(activation.rule).clone();
            let info = ActivationInfo {
                rule: activation.rule,
                rule_name: rule.name.clone(),
                tuple: activation.tuple,
                facts: activation
                    .facts
                    .iter()
                    .map(|(name, id)| (name.clone(), FactHandle(*id)))
                    .collect(),
            };

            info!(rule = %rule.name, seq = activation.seq, "rule firing");
            {
                let info = info.clone();
                self.events.publish_with(move || SessionEvent::RuleFiring { activation: info });
            }

            for action in rule.actions.iter() {
                let mut action_ctx = ActionContext {
                    session: &mut *self,
                    activation: &activation,
                    rule_name: &rule.name,
                };
                if let Err(error) = action.execute(&mut action_ctx) {
                    let cause = Arc::new(error);
                    {
                        let rule_name = rule.name.clone();
                        let cause = cause.clone();
                        self.events.publish_with(move || SessionEvent::ActionFailed {
                            rule_name,
                            error: cause,
                        });
                    }
                    return Err(EngineError::action(rule.name.clone(), cause));
                }
            }

            self.events.publish_with(move || SessionEvent::RuleFired { activation: info });
            fired += 1;
        }
        Ok(fired)
    }

    /// Stop the fire loop after the currently firing rule completes.
    pub fn halt(&mut self) {
        self.halted = true;
    }

    // -- query & accessors ------------------------------------------------

    /// Lazy view of the facts whose type is `fact_type` or a declared
    /// subtype, in insertion order. Never touches the Rete network.
    pub fn query<'a>(
        &'a self,
        fact_type: &str,
    ) -> impl Iterator<Item = (FactHandle, &'a Fact)> + 'a {
        let target = fact_type.to_string();
        self.memory
            .iter_user_facts()
            .filter(move |entry| self.registry.is_assignable(&entry.fact.fact_type, &target))
            .map(|entry| (FactHandle(entry.id), &entry.fact))
    }

    /// The fact behind a handle, if still present.
    pub fn fact(&self, handle: FactHandle) -> Option<&Fact> {
        self.memory.fact(handle.0)
    }

    /// Whether a fact with this identity is in working memory.
    pub fn contains(&self, fact: &Fact) -> bool {
        self.memory.contains_key(&self.registry.key_for(fact))
    }

    /// Event subscription handle.
    pub fn events(&self) -> &EventAggregator {
        &self.events
    }

    pub fn dependency_resolver(&self) -> &dyn DependencyResolver {
        self.resolver.as_ref()
    }

    pub fn set_dependency_resolver(&mut self, resolver: Box<dyn DependencyResolver>) {
        self.resolver = resolver;
    }

    pub fn add_agenda_filter(&mut self, filter: Box<dyn AgendaFilter>) {
        self.agenda.add_filter(filter);
    }

    pub fn clear_agenda_filters(&mut self) {
        self.agenda.clear_filters();
    }

    pub fn clear_agenda(&mut self) {
        self.agenda.clear();
    }

    pub fn agenda(&self) -> &Agenda {
        &self.agenda
    }

    pub fn fact_count(&self) -> usize {
        self.memory.fact_count()
    }

    pub fn rule_count(&self) -> usize {
        self.network.rules().len()
    }

    pub fn stats(&self) -> SessionStats {
        SessionStats {
            fact_count: self.memory.fact_count(),
            rule_count: self.network.rules().len(),
            node_count: self.network.node_count(),
            tuple_count: self.memory.tuples.len(),
            activation_count: self.agenda.len(),
        }
    }

    fn dispatch_roots(&mut self, fact_type: &str) -> Vec<NodeId> {
        if let Some(cached) = self.dispatch_cache.get(fact_type) {
            return cached.clone();
        }
        let ancestry = self.registry.ancestry(fact_type);
        let roots = self.network.dispatch_roots(&ancestry);
        self.dispatch_cache.insert(fact_type.to_string(), roots.clone());
        roots
    }
}
