//! Execution contexts.
//!
//! [`ExecutionContext`] is the per-propagation scratch threaded by
//! reference through every node: the current top-level operation plus
//! mutable handles to working memory and the agenda and a shared handle to
//! the event aggregator. It is borrow-scoped — rebuilt at the start of each
//! top-level call, which is how its mutable fields are "reset".
//!
//! [`ActionContext`] is what rule actions see while firing: the bound
//! facts, the ability to re-enter the session, halt, and dependency
//! resolution.

use crate::agenda::{Activation, Agenda};
use crate::events::{EventAggregator, SessionEvent};
use crate::facts::{Fact, FactHandle};
use crate::network::RuleDefinition;
use crate::error::SessionResult;
use crate::session::Session;
use crate::working_memory::WorkingMemory;
use std::any::Any;
use std::sync::Arc;

/// The top-level session operation currently propagating.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Insert,
    Update,
    Retract,
    Fire,
}

impl Operation {
    pub fn name(&self) -> &'static str {
        match self {
            Operation::Insert => "insert",
            Operation::Update => "update",
            Operation::Retract => "retract",
            Operation::Fire => "fire",
        }
    }
}

/// Per-propagation scratch, passed by reference to every node operation.
pub struct ExecutionContext<'a> {
    pub operation: Operation,
    pub memory: &'a mut WorkingMemory,
    pub agenda: &'a mut Agenda,
    pub events: &'a EventAggregator,
    pub rules: &'a [Arc<RuleDefinition>],
}

impl<'a> ExecutionContext<'a> {
    pub fn new(
        operation: Operation,
        memory: &'a mut WorkingMemory,
        agenda: &'a mut Agenda,
        events: &'a EventAggregator,
        rules: &'a [Arc<RuleDefinition>],
    ) -> Self {
        Self { operation, memory, agenda, events, rules }
    }

    pub fn publish(&self, make: impl FnOnce() -> SessionEvent) {
        self.events.publish_with(make);
    }

    /// Wrap a host failure from a predicate/selector/binding/aggregator:
    /// raise the `condition_failed` event, then hand the error back to
    /// abort the operation.
    pub(crate) fn condition_failure(
        &self,
        location: impl Into<String>,
        error: anyhow::Error,
    ) -> crate::error::EngineError {
        let location = format!("{}: {}", self.operation.name(), location.into());
        let cause = Arc::new(error);
        self.events.publish_with(|| SessionEvent::ConditionFailed {
            location: location.clone(),
            error: cause.clone(),
        });
        crate::error::EngineError::condition(location, cause)
    }
}

/// A rule's right-hand side. Actions run in declaration order with full
/// session re-entry: inserts, updates and retracts made here propagate
/// through the network before the call returns.
pub trait RuleAction: Send + Sync {
    fn execute(&self, ctx: &mut ActionContext<'_>) -> anyhow::Result<()>;
}

/// Adapter turning a host closure into a [`RuleAction`]. The constructor's
/// direct `Fn` bound lets closure arguments infer their signature.
pub struct ActionFn<F> {
    f: F,
}

impl<F> ActionFn<F>
where
    F: Fn(&mut ActionContext<'_>) -> anyhow::Result<()> + Send + Sync,
{
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

impl<F> RuleAction for ActionFn<F>
where
    F: Fn(&mut ActionContext<'_>) -> anyhow::Result<()> + Send + Sync,
{
    fn execute(&self, ctx: &mut ActionContext<'_>) -> anyhow::Result<()> {
        (self.f)(ctx)
    }
}

/// State handed to each action of a firing rule.
pub struct ActionContext<'a> {
    pub(crate) session: &'a mut Session,
    pub(crate) activation: &'a Activation,
    pub(crate) rule_name: &'a str,
}

impl<'a> ActionContext<'a> {
    pub fn rule_name(&self) -> &str {
        self.rule_name
    }

    /// Handle of the fact bound under `name`, if the rule declares it.
    pub fn handle(&self, name: &str) -> Option<FactHandle> {
        self.activation
            .facts
            .iter()
            .find(|(decl, _)| decl == name)
            .map(|(_, id)| FactHandle(*id))
    }

    /// Clone of the fact bound under `name`.
    pub fn fact(&self, name: &str) -> Option<Fact> {
        let handle = self.handle(name)?;
        self.session.fact(handle).cloned()
    }

    /// All bound facts in declaration order.
    pub fn facts(&self) -> Vec<(String, FactHandle)> {
        self.activation.facts.iter().map(|(name, id)| (name.clone(), FactHandle(*id))).collect()
    }

    // -- session re-entry ------------------------------------------------

    pub fn insert(&mut self, fact: Fact) -> SessionResult<FactHandle> {
        self.session.insert(fact)
    }

    pub fn try_insert(&mut self, fact: Fact) -> SessionResult<Option<FactHandle>> {
        self.session.try_insert(fact)
    }

    pub fn update(&mut self, fact: Fact) -> SessionResult<()> {
        self.session.update(fact)
    }

    pub fn retract(&mut self, fact: &Fact) -> SessionResult<()> {
        self.session.retract(fact)
    }

    pub fn retract_handle(&mut self, handle: FactHandle) -> SessionResult<()> {
        self.session.retract_by_handle(handle)
    }

    /// Stop the fire loop after the current rule completes.
    pub fn halt(&mut self) {
        self.session.halt();
    }

    /// Resolve a host service through the session's dependency resolver.
    pub fn resolve<T: Any + Send + Sync>(&self, name: &str) -> Option<Arc<T>> {
        self.session
            .dependency_resolver()
            .resolve(name)
            .and_then(|service| service.downcast::<T>().ok())
    }
}

impl std::fmt::Debug for ActionContext<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActionContext")
            .field("rule", &self.rule_name)
            .field("tuple", &self.activation.tuple)
            .field("facts", &self.activation.facts.len())
            .finish()
    }
}
