//! Incremental aggregate groups: threshold collection and per-group sums.

use ember_core::{
    join_on, ActionFn, Collect, Fact, FactHandle, FactValue, NetworkBuilder, RuleSpec, Session,
    SessionEvent, Sum, TypeRegistry,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

fn order(n: i64) -> Fact {
    Fact::new("Order").with_field("n", FactValue::Integer(n))
}

#[test]
fn collection_aggregate_emits_at_min_cardinality() {
    let sizes = Arc::new(Mutex::new(Vec::new()));
    let sink = sizes.clone();

    let mut builder = NetworkBuilder::new();
    builder
        .add_rule(
            RuleSpec::new("order-batch")
                .aggregate("orders", "Order", vec![], vec![], Collect::facts(3))
                .execute(ActionFn::new(move |ctx| {
                    let batch = ctx.fact("orders").expect("aggregate bound");
                    match batch.get("value") {
                        Some(FactValue::Array(items)) => sink.lock().unwrap().push(items.len()),
                        other => anyhow::bail!("unexpected aggregate payload: {other:?}"),
                    }
                    Ok(())
                })),
        )
        .unwrap();
    let mut session = Session::new(builder.build(), TypeRegistry::new());

    let deleted = Arc::new(AtomicUsize::new(0));
    {
        let deleted = deleted.clone();
        session.events().subscribe(move |event| {
            if matches!(event, SessionEvent::ActivationDeleted { .. }) {
                deleted.fetch_add(1, Ordering::SeqCst);
            }
        });
    }

    session.insert(order(1)).unwrap();
    session.insert(order(2)).unwrap();
    assert_eq!(session.fire().unwrap(), 0);

    let third = order(3);
    session.insert(third.clone()).unwrap();
    assert_eq!(session.fire().unwrap(), 1);
    assert_eq!(*sizes.lock().unwrap(), vec![3]);

    // Dropping below the threshold withdraws the synthetic result.
    session.retract(&third).unwrap();
    assert_eq!(deleted.load(Ordering::SeqCst), 1);
    assert_eq!(session.fire().unwrap(), 0);
    assert_eq!(*sizes.lock().unwrap(), vec![3]);
}

fn shift(dept: &str, hours: f64) -> Fact {
    Fact::new("Shift")
        .with_field("dept", FactValue::String(dept.into()))
        .with_field("hours", FactValue::Float(hours))
}

#[test]
fn sum_aggregate_updates_exactly_the_affected_group() {
    let seen: Arc<Mutex<Vec<(String, FactHandle)>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();

    let mut builder = NetworkBuilder::new();
    builder
        .add_rule(
            RuleSpec::new("dept-hours")
                .when("dept", "Department", vec![])
                .aggregate(
                    "hours",
                    "Shift",
                    vec![],
                    vec![join_on("dept", "name", "dept")],
                    Sum::of("hours"),
                )
                .execute(ActionFn::new(move |ctx| {
                    let dept = ctx.fact("dept").expect("dept bound");
                    let handle = ctx.handle("hours").expect("aggregate handle");
                    sink.lock()
                        .unwrap()
                        .push((dept.get("name").unwrap().to_string(), handle));
                    Ok(())
                })),
        )
        .unwrap();
    let mut session = Session::new(builder.build(), TypeRegistry::new());

    session
        .insert(Fact::new("Department").with_field("name", FactValue::String("ops".into())))
        .unwrap();
    session
        .insert(Fact::new("Department").with_field("name", FactValue::String("dev".into())))
        .unwrap();
    session.insert(shift("ops", 8.0)).unwrap();

    assert_eq!(session.fire().unwrap(), 1);
    let (dept, handle) = seen.lock().unwrap()[0].clone();
    assert_eq!(dept, "ops");
    assert_eq!(
        session.fact(handle).unwrap().get("value"),
        Some(&FactValue::Float(8.0))
    );

    // Another ops shift updates the existing group's synthetic fact in
    // place; the consumed activation is not re-queued.
    session.insert(shift("ops", 6.5)).unwrap();
    assert_eq!(session.agenda().len(), 0);
    assert_eq!(
        session.fact(handle).unwrap().get("value"),
        Some(&FactValue::Float(14.5))
    );
    assert_eq!(
        session.fact(handle).unwrap().get("count"),
        Some(&FactValue::Integer(2))
    );

    // The dev group is untouched: no shifts, sum emits nothing.
    assert_eq!(seen.lock().unwrap().len(), 1);
}

#[test]
fn retracting_a_member_recomputes_the_group() {
    let mut builder = NetworkBuilder::new();
    builder
        .add_rule(
            RuleSpec::new("dept-hours")
                .when("dept", "Department", vec![])
                .aggregate(
                    "hours",
                    "Shift",
                    vec![],
                    vec![join_on("dept", "name", "dept")],
                    Sum::of("hours"),
                )
                .execute(ActionFn::new(move |_ctx| Ok(()))),
        )
        .unwrap();
    let mut session = Session::new(builder.build(), TypeRegistry::new());

    session
        .insert(Fact::new("Department").with_field("name", FactValue::String("ops".into())))
        .unwrap();
    let a = shift("ops", 8.0);
    let b = shift("ops", 4.0);
    session.insert(a.clone()).unwrap();
    session.insert(b.clone()).unwrap();
    assert_eq!(session.agenda().len(), 1);

    // Removing every member withdraws the synthetic result entirely.
    session.retract(&a).unwrap();
    session.retract(&b).unwrap();
    assert_eq!(session.agenda().len(), 0);
    assert_eq!(session.fire().unwrap(), 0);
}
