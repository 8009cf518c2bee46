//! Session façade contracts: strict/try variants, identity, query,
//! round-trip invariants, dependency resolution.

use ember_core::{
    ActionFn, DependencyResolver, Fact, FactPredicate, FactValue, FieldCondition, NetworkBuilder,
    Operator, RuleSpec, ServiceRegistry, Session, TypeRegistry,
};
use std::any::Any;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

fn cond(field: &str, operator: Operator, value: FactValue) -> Arc<dyn FactPredicate> {
    Arc::new(FieldCondition::new(field, operator, value))
}

fn employee(name: &str, kind: &str) -> Fact {
    Fact::new(kind).with_field("name", FactValue::String(name.into()))
}

fn basic_session() -> Session {
    let mut builder = NetworkBuilder::new();
    builder
        .add_rule(
            RuleSpec::new("named")
                .when(
                    "e",
                    "Employee",
                    vec![cond("name", Operator::NotEqual, FactValue::String(String::new()))],
                )
                .execute(ActionFn::new(|_ctx| Ok(()))),
        )
        .unwrap();
    let mut registry = TypeRegistry::new();
    registry.declare("Employee", None, &[]);
    registry.declare("Manager", Some("Employee"), &[]);
    Session::new(builder.build(), registry)
}

#[test]
fn insert_then_retract_restores_prior_state() {
    let mut session = basic_session();
    let before_stats = session.stats();
    let before_sizes: Vec<(usize, usize)> =
        session.snapshot().nodes.iter().map(|n| (n.id, n.memory_size)).collect();

    let fact = employee("ada", "Employee");
    session.insert(fact.clone()).unwrap();
    assert_eq!(session.agenda().len(), 1);

    session.retract(&fact).unwrap();
    assert_eq!(session.stats(), before_stats);
    let after_sizes: Vec<(usize, usize)> =
        session.snapshot().nodes.iter().map(|n| (n.id, n.memory_size)).collect();
    assert_eq!(before_sizes, after_sizes);
}

#[test]
fn strict_variants_validate_the_whole_batch_first() {
    let mut session = basic_session();
    session.insert(employee("ada", "Employee")).unwrap();

    // One duplicate poisons the whole strict insert.
    let error = session
        .insert_all(vec![employee("grace", "Employee"), employee("ada", "Employee")])
        .unwrap_err();
    assert_eq!(error.category(), "already_exists");
    assert_eq!(session.fact_count(), 1);

    // One unknown poisons the whole strict retract.
    let error = session
        .retract_all(&[employee("ada", "Employee"), employee("ghost", "Employee")])
        .unwrap_err();
    assert_eq!(error.category(), "unknown_fact");
    assert_eq!(session.fact_count(), 1);
}

#[test]
fn try_variants_process_the_valid_subset() {
    let mut session = basic_session();
    session.insert(employee("ada", "Employee")).unwrap();

    let outcomes = session
        .try_insert_all(vec![
            employee("grace", "Employee"),
            employee("ada", "Employee"),
            employee("edsger", "Employee"),
        ])
        .unwrap();
    assert!(outcomes[0].is_some());
    assert!(outcomes[1].is_none());
    assert!(outcomes[2].is_some());
    assert_eq!(session.fact_count(), 3);

    let outcomes = session
        .try_retract_all(&[employee("grace", "Employee"), employee("ghost", "Employee")])
        .unwrap();
    assert_eq!(outcomes, vec![true, false]);
    assert_eq!(session.fact_count(), 2);

    assert!(session.try_update(employee("ada", "Employee")).unwrap());
    let updated = session
        .try_update_all(vec![employee("edsger", "Employee"), employee("ghost", "Employee")])
        .unwrap();
    assert_eq!(updated, vec![true, false]);
}

#[test]
fn query_covers_declared_subtypes_in_insertion_order() {
    let mut session = basic_session();
    session.insert(employee("ada", "Employee")).unwrap();
    session.insert(employee("grace", "Manager")).unwrap();
    session.insert(employee("edsger", "Employee")).unwrap();

    let names: Vec<String> = session
        .query("Employee")
        .map(|(_, fact)| fact.get("name").unwrap().to_string())
        .collect();
    assert_eq!(names, vec!["ada", "grace", "edsger"]);

    let managers: Vec<String> = session
        .query("Manager")
        .map(|(_, fact)| fact.get("name").unwrap().to_string())
        .collect();
    assert_eq!(managers, vec!["grace"]);
}

#[test]
fn contains_and_handles_track_identity() {
    let mut session = basic_session();
    let fact = employee("ada", "Employee");
    let handle = session.insert(fact.clone()).unwrap();

    assert!(session.contains(&fact));
    assert_eq!(session.fact(handle).unwrap().get("name"), fact.get("name"));

    session.retract_by_handle(handle).unwrap();
    assert!(!session.contains(&fact));
    assert!(session.fact(handle).is_none());
    assert!(session.retract_by_handle(handle).is_err());
}

#[derive(Debug)]
struct Notifier {
    sent: AtomicUsize,
}

#[test]
fn actions_resolve_services_through_the_session_resolver() {
    let notifier = Arc::new(Notifier { sent: AtomicUsize::new(0) });

    let mut builder = NetworkBuilder::new();
    builder
        .add_rule(
            RuleSpec::new("notify")
                .when("e", "Employee", vec![])
                .execute(ActionFn::new(|ctx| {
                    let notifier = ctx
                        .resolve::<Notifier>("notifier")
                        .ok_or_else(|| anyhow::anyhow!("notifier not registered"))?;
                    notifier.sent.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                })),
        )
        .unwrap();
    let mut session = Session::new(builder.build(), TypeRegistry::new());

    let mut services = ServiceRegistry::new();
    services.register("notifier", notifier.clone());
    session.set_dependency_resolver(Box::new(services));

    session.insert(employee("ada", "Employee")).unwrap();
    session.fire().unwrap();
    assert_eq!(notifier.sent.load(Ordering::SeqCst), 1);
}

struct RecordingResolver {
    inner: ServiceRegistry,
    requests: Mutex<Vec<String>>,
}

impl DependencyResolver for RecordingResolver {
    fn resolve(&self, name: &str) -> Option<Arc<dyn Any + Send + Sync>> {
        self.requests.lock().unwrap().push(name.to_string());
        self.inner.resolve(name)
    }
}

#[test]
fn custom_resolvers_are_pluggable() {
    let mut inner = ServiceRegistry::new();
    inner.register("clock", Arc::new(42u64));
    let resolver = Arc::new(RecordingResolver { inner, requests: Mutex::new(Vec::new()) });

    struct SharedResolver(Arc<RecordingResolver>);
    impl DependencyResolver for SharedResolver {
        fn resolve(&self, name: &str) -> Option<Arc<dyn Any + Send + Sync>> {
            self.0.resolve(name)
        }
    }

    let mut session = basic_session();
    session.set_dependency_resolver(Box::new(SharedResolver(resolver.clone())));

    assert!(session.dependency_resolver().resolve("clock").is_some());
    assert!(session.dependency_resolver().resolve("missing").is_none());
    assert_eq!(*resolver.requests.lock().unwrap(), vec!["clock", "missing"]);
}

#[test]
fn stats_reflect_live_counts() {
    let mut session = basic_session();
    let empty = session.stats();
    assert_eq!(empty.fact_count, 0);
    assert_eq!(empty.rule_count, 1);
    assert!(empty.node_count > 0);

    session.insert(employee("ada", "Employee")).unwrap();
    let loaded = session.stats();
    assert_eq!(loaded.fact_count, 1);
    assert_eq!(loaded.activation_count, 1);
    assert!(loaded.tuple_count > empty.tuple_count);
}
