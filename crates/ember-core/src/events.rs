//! Session lifecycle events.
//!
//! Subscribers are notified synchronously, in registration order, from
//! inside the operation that produced the event. Handlers receive a shared
//! reference and cannot re-enter the session; a panicking handler unwinds
//! to the caller.

use crate::facts::{Fact, FactHandle, RuleId};
use crate::tuples::TupleId;
use std::cell::RefCell;
use std::sync::Arc;

/// Identity of an activation as seen by observers.
#[derive(Debug, Clone)]
pub struct ActivationInfo {
    pub rule: RuleId,
    pub rule_name: String,
    pub tuple: TupleId,
    /// Bound facts in declaration order.
    pub facts: Vec<(String, FactHandle)>,
}

/// Everything observable about a session.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    FactInserting { handle: FactHandle, fact: Fact },
    FactInserted { handle: FactHandle, fact: Fact },
    FactUpdating { handle: FactHandle, fact: Fact },
    FactUpdated { handle: FactHandle, fact: Fact },
    FactRetracting { handle: FactHandle, fact: Fact },
    FactRetracted { handle: FactHandle, fact: Fact },
    ActivationCreated { activation: ActivationInfo },
    ActivationUpdated { activation: ActivationInfo },
    ActivationDeleted { activation: ActivationInfo },
    RuleFiring { activation: ActivationInfo },
    RuleFired { activation: ActivationInfo },
    ConditionFailed { location: String, error: Arc<anyhow::Error> },
    ActionFailed { rule_name: String, error: Arc<anyhow::Error> },
}

impl SessionEvent {
    /// Stable name used in logs and tests.
    pub fn name(&self) -> &'static str {
        match self {
            SessionEvent::FactInserting { .. } => "fact_inserting",
            SessionEvent::FactInserted { .. } => "fact_inserted",
            SessionEvent::FactUpdating { .. } => "fact_updating",
            SessionEvent::FactUpdated { .. } => "fact_updated",
            SessionEvent::FactRetracting { .. } => "fact_retracting",
            SessionEvent::FactRetracted { .. } => "fact_retracted",
            SessionEvent::ActivationCreated { .. } => "activation_created",
            SessionEvent::ActivationUpdated { .. } => "activation_updated",
            SessionEvent::ActivationDeleted { .. } => "activation_deleted",
            SessionEvent::RuleFiring { .. } => "rule_firing",
            SessionEvent::RuleFired { .. } => "rule_fired",
            SessionEvent::ConditionFailed { .. } => "condition_failed",
            SessionEvent::ActionFailed { .. } => "action_failed",
        }
    }
}

type Handler = Box<dyn FnMut(&SessionEvent)>;

/// Fans events out to subscribers.
pub struct EventAggregator {
    handlers: RefCell<Vec<Handler>>,
}

impl std::fmt::Debug for EventAggregator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "EventAggregator({} handlers)", self.handlers.borrow().len())
    }
}

impl EventAggregator {
    pub fn new() -> Self {
        Self { handlers: RefCell::new(Vec::new()) }
    }

    /// Register a handler. Handlers must not subscribe from inside a
    /// callback.
    pub fn subscribe(&self, handler: impl FnMut(&SessionEvent) + 'static) {
        self.handlers.borrow_mut().push(Box::new(handler));
    }

    pub fn subscriber_count(&self) -> usize {
        self.handlers.borrow().len()
    }

    pub fn publish(&self, event: &SessionEvent) {
        for handler in self.handlers.borrow_mut().iter_mut() {
            handler(event);
        }
    }

    /// Publish lazily: the event (and its clones) is only built when
    /// someone is listening.
    pub fn publish_with(&self, make: impl FnOnce() -> SessionEvent) {
        if !self.handlers.borrow().is_empty() {
            self.publish(&make());
        }
    }
}

impl Default for EventAggregator {
    fn default() -> Self {
        Self::new()
    }
}
