use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use ember_core::{
    join_on, ActionFn, Fact, FactPredicate, FactValue, FieldCondition, NetworkBuilder, Operator,
    RuleSpec, Session, TypeRegistry,
};
use std::sync::Arc;
use std::time::Duration;

fn cond(field: &str, operator: Operator, value: FactValue) -> Arc<dyn FactPredicate> {
    Arc::new(FieldCondition::new(field, operator, value))
}

fn generate_orders(count: usize) -> Vec<Fact> {
    (0..count)
        .map(|i| {
            Fact::new("Order")
                .with_field("id", FactValue::Integer(i as i64))
                .with_field("customer", FactValue::Integer((i % 100) as i64))
                .with_field("amount", FactValue::Float(i as f64 * 1.5))
                .with_field(
                    "status",
                    FactValue::String(if i % 10 == 0 { "flagged" } else { "ok" }.to_string()),
                )
        })
        .collect()
}

fn build_session() -> Session {
    let mut builder = NetworkBuilder::new();
    builder
        .add_rule(
            RuleSpec::new("flagged-order")
                .when(
                    "order",
                    "Order",
                    vec![cond("status", Operator::Equal, FactValue::String("flagged".into()))],
                )
                .execute(ActionFn::new(|_ctx| Ok(()))),
        )
        .unwrap();
    builder
        .add_rule(
            RuleSpec::new("customer-order")
                .when("customer", "Customer", vec![])
                .when_join(
                    "order",
                    "Order",
                    vec![cond("amount", Operator::GreaterThan, FactValue::Float(100.0))],
                    vec![join_on("customer", "id", "customer")],
                )
                .execute(ActionFn::new(|_ctx| Ok(()))),
        )
        .unwrap();

    let mut registry = TypeRegistry::new();
    registry.declare("Order", None, &["id"]);
    registry.declare("Customer", None, &["id"]);
    Session::new(builder.build(), registry)
}

fn bench_insert_and_fire(c: &mut Criterion) {
    let mut group = c.benchmark_group("insert_and_fire");
    group.measurement_time(Duration::from_secs(10));
    group.sample_size(10);

    for size in [1_000, 10_000].iter() {
        group.bench_with_input(BenchmarkId::new("insert_all", size), size, |b, &size| {
            b.iter_batched(
                || {
                    let mut session = build_session();
                    for i in 0..100 {
                        session
                            .insert(Fact::new("Customer").with_field("id", FactValue::Integer(i)))
                            .unwrap();
                    }
                    (session, generate_orders(size))
                },
                |(mut session, orders)| {
                    session.insert_all(orders).unwrap();
                    black_box(session.fire().unwrap())
                },
                criterion::BatchSize::LargeInput,
            );
        });
    }
    group.finish();
}

fn bench_update_churn(c: &mut Criterion) {
    let mut group = c.benchmark_group("update_churn");
    group.sample_size(10);

    group.bench_function("update_1k_matching", |b| {
        b.iter_batched(
            || {
                let mut session = build_session();
                session.insert_all(generate_orders(1_000)).unwrap();
                session
            },
            |mut session| {
                for fact in generate_orders(1_000) {
                    session.update(fact).unwrap();
                }
                black_box(session.fact_count())
            },
            criterion::BatchSize::LargeInput,
        );
    });
    group.finish();
}

criterion_group!(benches, bench_insert_and_fire, bench_update_churn);
criterion_main!(benches);
