//! Update semantics: identity preservation while predicates still hold,
//! retract-and-assert when memberships flip.

use ember_core::{
    join_on, ActionFn, Fact, FactPredicate, FactValue, FieldCondition, NetworkBuilder, Operator,
    RuleSpec, Session, SessionEvent, TupleId, TypeRegistry,
};
use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;

fn cond(field: &str, operator: Operator, value: FactValue) -> Arc<dyn FactPredicate> {
    Arc::new(FieldCondition::new(field, operator, value))
}

fn account(id: i64, balance: i64) -> Fact {
    Fact::new("Account")
        .with_field("id", FactValue::Integer(id))
        .with_field("balance", FactValue::Integer(balance))
}

fn keyed_registry() -> TypeRegistry {
    let mut registry = TypeRegistry::new();
    registry.declare("Account", None, &["id"]);
    registry
}

fn positive_balance_session() -> Session {
    let mut builder = NetworkBuilder::new();
    builder
        .add_rule(
            RuleSpec::new("in-credit")
                .when(
                    "account",
                    "Account",
                    vec![cond("balance", Operator::GreaterThan, FactValue::Integer(0))],
                )
                .execute(ActionFn::new(|_ctx| Ok(()))),
        )
        .unwrap();
    Session::new(builder.build(), keyed_registry())
}

fn record_events(session: &Session) -> Rc<RefCell<Vec<String>>> {
    let log = Rc::new(RefCell::new(Vec::new()));
    let sink = log.clone();
    session.events().subscribe(move |event| {
        sink.borrow_mut().push(event.name().to_string());
    });
    log
}

#[test]
fn update_with_unchanged_predicates_preserves_the_activation() {
    let mut session = positive_balance_session();
    session.insert(account(1, 5)).unwrap();
    assert_eq!(session.fire().unwrap(), 1);

    let log = record_events(&session);
    session.update(account(1, 7)).unwrap();

    let events = log.borrow().clone();
    assert_eq!(events, vec!["fact_updating", "activation_updated", "fact_updated"]);
    // The activation was already consumed; the update does not requeue it.
    assert_eq!(session.fire().unwrap(), 0);
}

#[test]
fn pending_activation_stays_single_across_update() {
    let mut session = positive_balance_session();
    session.insert(account(2, 10)).unwrap();
    assert_eq!(session.agenda().len(), 1);

    let log = record_events(&session);
    session.update(account(2, 20)).unwrap();

    assert_eq!(session.agenda().len(), 1);
    let events = log.borrow().clone();
    assert!(events.contains(&"activation_updated".to_string()));
    assert!(!events.contains(&"activation_created".to_string()));
    assert!(!events.contains(&"activation_deleted".to_string()));
    assert_eq!(session.fire().unwrap(), 1);
}

#[test]
fn membership_flip_retracts_and_reasserts() {
    let mut session = positive_balance_session();
    session.insert(account(3, 5)).unwrap();
    assert_eq!(session.fire().unwrap(), 1);

    let log = record_events(&session);
    session.update(account(3, -2)).unwrap();
    assert!(log.borrow().contains(&"activation_deleted".to_string()));
    assert_eq!(session.fire().unwrap(), 0);

    session.update(account(3, 3)).unwrap();
    assert!(log.borrow().contains(&"activation_created".to_string()));
    assert_eq!(session.fire().unwrap(), 1);
}

#[test]
fn joined_tuple_identity_survives_partner_update() {
    let created: Rc<RefCell<Vec<TupleId>>> = Rc::new(RefCell::new(Vec::new()));
    let updated: Rc<RefCell<Vec<TupleId>>> = Rc::new(RefCell::new(Vec::new()));

    let mut builder = NetworkBuilder::new();
    builder
        .add_rule(
            RuleSpec::new("pairing")
                .when("left", "Left", vec![])
                .when_join("right", "Right", vec![], vec![join_on("left", "k", "k")])
                .execute(ActionFn::new(|_ctx| Ok(()))),
        )
        .unwrap();
    let mut session = Session::new(builder.build(), {
        let mut registry = TypeRegistry::new();
        registry.declare("Right", None, &["k"]);
        registry
    });

    {
        let created = created.clone();
        let updated = updated.clone();
        session.events().subscribe(move |event| match event {
            SessionEvent::ActivationCreated { activation } => {
                created.borrow_mut().push(activation.tuple)
            }
            SessionEvent::ActivationUpdated { activation } => {
                updated.borrow_mut().push(activation.tuple)
            }
            _ => {}
        });
    }

    session
        .insert(Fact::new("Left").with_field("k", FactValue::Integer(1)))
        .unwrap();
    session
        .insert(
            Fact::new("Right")
                .with_field("k", FactValue::Integer(1))
                .with_field("payload", FactValue::Integer(10)),
        )
        .unwrap();
    assert_eq!(created.borrow().len(), 1);

    // Same join key, new payload: the tuple keeps its identity.
    session
        .update(
            Fact::new("Right")
                .with_field("k", FactValue::Integer(1))
                .with_field("payload", FactValue::Integer(11)),
        )
        .unwrap();
    assert_eq!(created.borrow().len(), 1);
    assert_eq!(updated.borrow().len(), 1);
    assert_eq!(created.borrow()[0], updated.borrow()[0]);
}

#[test]
fn strict_update_of_unknown_fact_fails() {
    let mut session = positive_balance_session();
    let error = session.update(account(9, 1)).unwrap_err();
    assert_eq!(error.category(), "unknown_fact");
    assert!(!session.try_update(account(9, 1)).unwrap());
}
