//! Ember Core
//!
//! A forward-chaining production-rule engine: a rule [`Session`] over an
//! incremental Rete match network with a priority [`Agenda`]. The session
//! consumes an already-compiled [`ReteNetwork`] (assembled with
//! [`NetworkBuilder`]) and maintains the set of satisfied rule/fact-tuple
//! combinations through arbitrary interleavings of insert, update and
//! retract, without ever re-evaluating from scratch.

use tracing::debug;

pub mod aggregate;
mod alpha;
pub mod agenda;
mod beta;
pub mod context;
pub mod dependency;
pub mod error;
pub mod events;
pub mod facts;
pub mod network;
pub mod predicate;
pub mod session;
pub mod snapshot;
mod tuples;
pub mod working_memory;

pub use aggregate::{Aggregator, Collect, Count, Max, Min, Sum};
pub use agenda::{Activation, Agenda, AgendaFilter, RuleGroupFilter};
pub use context::{ActionContext, ActionFn, ExecutionContext, Operation, RuleAction};
pub use dependency::{DependencyResolver, ServiceRegistry};
pub use error::{EngineError, SessionResult};
pub use events::{ActivationInfo, EventAggregator, SessionEvent};
pub use facts::{Fact, FactHandle, FactId, FactKey, RuleId, TypeRegistry};
pub use network::{
    join_on, JoinTest, NetworkBuilder, NodeId, ReteNetwork, RuleDefinition, RuleSpec,
};
pub use predicate::{
    BindingExpr, BindingFn, ConstantKey, FactKeySelector, FactPredicate, FieldCondition, FieldKey,
    PredicateFn, TupleFieldComparison, TupleFieldKey, TupleKeySelector, TuplePredicate,
    TuplePredicateFn,
};
pub use session::{Session, SessionStats};
pub use snapshot::{NetworkVisitor, NodeSnapshot, StructuralSnapshot, WorkingMemorySnapshot};
pub use tuples::{TupleData, TupleId, TupleStore, ROOT_TUPLE};
pub use working_memory::WorkingMemory;

// Re-exported for convenience so hosts depend on one crate.
pub use ember_types::{FactValue, Operator};

/// Initialize the engine crate; currently only emits a trace marker.
pub fn init() {
    debug!("ember core initialized");
}
