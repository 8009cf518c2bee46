//! Single-pattern matching through the alpha network, agenda and fire loop.

use ember_core::{
    ActionFn, Fact, FactPredicate, FactValue, FieldCondition, NetworkBuilder, Operator, RuleSpec,
    Session, TypeRegistry,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

fn cond(field: &str, operator: Operator, value: FactValue) -> Arc<dyn FactPredicate> {
    Arc::new(FieldCondition::new(field, operator, value))
}

fn positive_x(value: i64) -> Fact {
    Fact::new("FactA").with_field("x", FactValue::Integer(value))
}

fn session_with_counter(counter: Arc<AtomicUsize>) -> Session {
    let mut builder = NetworkBuilder::new();
    builder
        .add_rule(
            RuleSpec::new("positive-x")
                .when(
                    "a",
                    "FactA",
                    vec![cond("x", Operator::GreaterThan, FactValue::Integer(0))],
                )
                .execute(ActionFn::new(move |_ctx| {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                })),
        )
        .unwrap();
    Session::new(builder.build(), TypeRegistry::new())
}

#[test]
fn matching_fact_fires_once() {
    let counter = Arc::new(AtomicUsize::new(0));
    let mut session = session_with_counter(counter.clone());

    session.insert(positive_x(5)).unwrap();
    assert_eq!(session.fire().unwrap(), 1);
    assert_eq!(counter.load(Ordering::SeqCst), 1);

    // A non-matching fact adds nothing to the agenda.
    session.insert(positive_x(-1)).unwrap();
    assert_eq!(session.fire().unwrap(), 0);
    assert_eq!(counter.load(Ordering::SeqCst), 1);
}

#[test]
fn consumed_activation_does_not_refire() {
    let counter = Arc::new(AtomicUsize::new(0));
    let mut session = session_with_counter(counter.clone());

    session.insert(positive_x(7)).unwrap();
    assert_eq!(session.fire().unwrap(), 1);
    assert_eq!(session.fire().unwrap(), 0);
    assert_eq!(counter.load(Ordering::SeqCst), 1);
}

#[test]
fn duplicate_insert_fails_and_leaves_state_unchanged() {
    let counter = Arc::new(AtomicUsize::new(0));
    let mut session = session_with_counter(counter);

    session.insert(positive_x(5)).unwrap();
    let before = session.stats();

    let error = session.insert(positive_x(5)).unwrap_err();
    assert_eq!(error.category(), "already_exists");
    assert_eq!(session.stats(), before);

    // The try variant reports instead of failing.
    assert!(session.try_insert(positive_x(5)).unwrap().is_none());
    assert!(session.try_insert(positive_x(6)).unwrap().is_some());
    assert_eq!(session.fact_count(), 2);
}

#[test]
fn each_matching_fact_gets_its_own_activation() {
    let counter = Arc::new(AtomicUsize::new(0));
    let mut session = session_with_counter(counter.clone());

    session
        .insert_all(vec![positive_x(1), positive_x(2), positive_x(3)])
        .unwrap();
    assert_eq!(session.agenda().len(), 3);
    assert_eq!(session.fire().unwrap(), 3);
    assert_eq!(counter.load(Ordering::SeqCst), 3);
}

#[test]
fn query_returns_facts_in_insertion_order_without_matching() {
    let counter = Arc::new(AtomicUsize::new(0));
    let mut session = session_with_counter(counter);

    session.insert(positive_x(9)).unwrap();
    session.insert(positive_x(-4)).unwrap();
    session.insert(positive_x(2)).unwrap();

    let xs: Vec<i64> = session
        .query("FactA")
        .map(|(_, fact)| fact.get("x").and_then(FactValue::as_i64).unwrap())
        .collect();
    assert_eq!(xs, vec![9, -4, 2]);
    assert_eq!(session.query("Unknown").count(), 0);
}
