//! Event surface: ordering, payloads, and synchronous fan-out.

use ember_core::{
    ActionFn, Fact, FactPredicate, FactValue, FieldCondition, NetworkBuilder, Operator, RuleSpec,
    Session, SessionEvent, TypeRegistry,
};
use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;

fn cond(field: &str, operator: Operator, value: FactValue) -> Arc<dyn FactPredicate> {
    Arc::new(FieldCondition::new(field, operator, value))
}

fn sensor(id: i64, level: i64) -> Fact {
    Fact::new("Sensor")
        .with_field("id", FactValue::Integer(id))
        .with_field("level", FactValue::Integer(level))
}

fn sensor_session() -> Session {
    let mut builder = NetworkBuilder::new();
    builder
        .add_rule(
            RuleSpec::new("hot-sensor")
                .when(
                    "sensor",
                    "Sensor",
                    vec![cond("level", Operator::GreaterThan, FactValue::Integer(50))],
                )
                .execute(ActionFn::new(|_ctx| Ok(()))),
        )
        .unwrap();
    let mut registry = TypeRegistry::new();
    registry.declare("Sensor", None, &["id"]);
    Session::new(builder.build(), registry)
}

fn record(session: &Session) -> Rc<RefCell<Vec<String>>> {
    let log = Rc::new(RefCell::new(Vec::new()));
    let sink = log.clone();
    session.events().subscribe(move |event| {
        sink.borrow_mut().push(event.name().to_string());
    });
    log
}

#[test]
fn insert_and_fire_emit_the_expected_sequence() {
    let mut session = sensor_session();
    let log = record(&session);

    session.insert(sensor(1, 80)).unwrap();
    session.fire().unwrap();

    assert_eq!(
        *log.borrow(),
        vec![
            "fact_inserting",
            "activation_created",
            "fact_inserted",
            "rule_firing",
            "rule_fired",
        ]
    );
}

#[test]
fn retract_emits_deletion_between_the_fact_events() {
    let mut session = sensor_session();
    let fact = sensor(2, 90);
    session.insert(fact.clone()).unwrap();

    let log = record(&session);
    session.retract(&fact).unwrap();

    assert_eq!(
        *log.borrow(),
        vec!["fact_retracting", "activation_deleted", "fact_retracted"]
    );
}

#[test]
fn non_matching_facts_emit_only_fact_events() {
    let mut session = sensor_session();
    let log = record(&session);

    session.insert(sensor(3, 10)).unwrap();
    assert_eq!(*log.borrow(), vec!["fact_inserting", "fact_inserted"]);
}

#[test]
fn activation_payload_names_the_rule_and_bindings() {
    let mut session = sensor_session();
    let payloads = Rc::new(RefCell::new(Vec::new()));
    {
        let payloads = payloads.clone();
        session.events().subscribe(move |event| {
            if let SessionEvent::ActivationCreated { activation } = event {
                payloads.borrow_mut().push((
                    activation.rule_name.clone(),
                    activation.facts.iter().map(|(name, _)| name.clone()).collect::<Vec<_>>(),
                ));
            }
        });
    }

    session.insert(sensor(4, 60)).unwrap();
    let payloads = payloads.borrow();
    assert_eq!(payloads.len(), 1);
    assert_eq!(payloads[0].0, "hot-sensor");
    assert_eq!(payloads[0].1, vec!["sensor"]);
}

#[test]
fn rule_events_carry_the_bound_fact_handles() {
    let mut session = sensor_session();
    let handles = Rc::new(RefCell::new(Vec::new()));
    {
        let handles = handles.clone();
        session.events().subscribe(move |event| {
            if let SessionEvent::RuleFiring { activation } = event {
                handles.borrow_mut().extend(activation.facts.iter().map(|(_, h)| *h));
            }
        });
    }

    let inserted = session.insert(sensor(5, 70)).unwrap();
    session.fire().unwrap();
    assert_eq!(*handles.borrow(), vec![inserted]);
}

#[test]
fn subscribers_run_in_registration_order() {
    let session = sensor_session();
    let order = Rc::new(RefCell::new(Vec::new()));
    for tag in ["a", "b"] {
        let order = order.clone();
        session.events().subscribe(move |_| order.borrow_mut().push(tag));
    }

    let mut session = session;
    session.insert(sensor(6, 99)).unwrap();
    // Three events (inserting, activation_created, inserted), two handlers
    // each, interleaved per event in registration order.
    assert_eq!(*order.borrow(), vec!["a", "b", "a", "b", "a", "b"]);
}
