//! Benchmarks for normalization, reads and notification

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use relay_runtime::{
    create_operation_descriptor, read, Normalizer, OperationDescriptor, RecordSource, Store,
    StoreConfig,
};
use relay_types::{ConcreteRequest, GraphQLResponse, LinkedField, Selection, Variables, ROOT_TYPE};
use serde_json::{json, Value};
use std::sync::Arc;

fn feed_operation() -> OperationDescriptor {
    let author = LinkedField::new("author", vec![Selection::scalar("id"), Selection::scalar("name")])
        .concrete_type("User");
    let stories = LinkedField::new(
        "stories",
        vec![Selection::scalar("id"), Selection::scalar("title"), author.into()],
    )
    .plural()
    .concrete_type("Story");
    let viewer = LinkedField::new("viewer", vec![Selection::scalar("id"), stories.into()])
        .concrete_type("User");
    create_operation_descriptor(
        Arc::new(ConcreteRequest::new("FeedQuery", vec![], vec![viewer.into()])),
        &Variables::new(),
    )
}

fn feed_payload(stories: usize, revision: usize) -> Value {
    let stories: Vec<Value> = (0..stories)
        .map(|n| {
            json!({
                "id": format!("story:{}", n),
                "title": format!("Story {} rev {}", n, revision),
                "author": {"id": format!("user:{}", n % 10), "name": format!("User {}", n % 10)}
            })
        })
        .collect();
    json!({"viewer": {"id": "me", "stories": stories}})
}

fn bench_normalize(c: &mut Criterion) {
    let operation = feed_operation();
    let base = RecordSource::new();
    let mut group = c.benchmark_group("normalize");

    for size in [10, 100, 1000] {
        let payload = feed_payload(size, 0);
        group.bench_with_input(BenchmarkId::from_parameter(size), &payload, |b, payload| {
            b.iter(|| {
                let output = Normalizer::new(&base, "id")
                    .normalize(&operation.root, ROOT_TYPE, black_box(payload))
                    .unwrap();
                black_box(output);
            })
        });
    }
    group.finish();
}

fn bench_read(c: &mut Criterion) {
    let operation = feed_operation();
    let mut store = Store::default();
    store
        .publish_response(&operation, &GraphQLResponse::data(feed_payload(500, 0)))
        .unwrap();

    c.bench_function("read_cold", |b| {
        b.iter(|| {
            let snapshot = read(&store.view(), black_box(&operation.fragment));
            black_box(snapshot);
        })
    });

    c.bench_function("lookup_cached", |b| {
        b.iter(|| {
            let snapshot = store.lookup(black_box(&operation.fragment));
            black_box(snapshot);
        })
    });
}

fn bench_notify(c: &mut Criterion) {
    let operation = feed_operation();
    let mut store = Store::new(StoreConfig::default());
    store
        .publish_response(&operation, &GraphQLResponse::data(feed_payload(200, 0)))
        .unwrap();
    let _subscription = store.subscribe(operation.fragment.clone(), |snapshot| {
        black_box(snapshot);
    });

    let mut revision = 0;
    c.bench_function("publish_and_notify", |b| {
        b.iter(|| {
            revision += 1;
            store
                .publish_response(&operation, &GraphQLResponse::data(feed_payload(200, revision)))
                .unwrap();
            black_box(store.notify());
        })
    });
}

criterion_group!(benches, bench_normalize, bench_read, bench_notify);
criterion_main!(benches);
