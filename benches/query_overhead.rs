//! Query performance benchmarks
//!
//! Point queries must stay logarithmic in the per-attribute interval
//! count, and range queries should cost proportional to the result set,
//! not the store size.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use cronista::builder::StateBuilder;
use cronista::state_system::StateSystem;
use cronista::value::StateValue;

const INTERVALS_PER_QUEUE: i64 = 10_000;
const QUEUES: usize = 8;

fn build_system() -> StateSystem {
    let mut builder = StateBuilder::default();
    for queue in 0..QUEUES {
        let name = format!("queue{}", queue);
        let stack = builder.quark_absolute_and_add(&["gpu0", "queues", &name]);
        let mut t = 0i64;
        for i in 0..INTERVALS_PER_QUEUE {
            builder.advance(t).unwrap();
            builder
                .push_attribute(t, StateValue::Int(i), stack)
                .unwrap();
            builder.pop_attribute(t + 5, stack).unwrap();
            t += 10;
        }
    }
    builder.finish(None).unwrap()
}

fn bench_query_point(c: &mut Criterion) {
    let system = build_system();
    let lane = system
        .tree()
        .quark_absolute(&["gpu0", "queues", "queue0", "1"])
        .unwrap();

    c.bench_function("query_point_10k_intervals", |b| {
        let mut t = 0i64;
        b.iter(|| {
            t = (t + 7_919) % (INTERVALS_PER_QUEUE * 10);
            black_box(system.query_point(lane, t).unwrap())
        })
    });
}

fn bench_query_range(c: &mut Criterion) {
    let system = build_system();
    let lanes: Vec<_> = (0..QUEUES)
        .map(|queue| {
            let name = format!("queue{}", queue);
            system
                .tree()
                .quark_absolute(&["gpu0", "queues", &name, "1"])
                .unwrap()
        })
        .collect();

    c.bench_function("query_range_8_queues_1pct_window", |b| {
        let span = INTERVALS_PER_QUEUE * 10;
        b.iter(|| {
            let hits: usize = system
                .query_range(black_box(&lanes), span / 2, span / 2 + span / 100)
                .unwrap()
                .count();
            black_box(hits)
        })
    });
}

fn bench_full_state(c: &mut Criterion) {
    let system = build_system();
    c.bench_function("query_full_state", |b| {
        b.iter(|| black_box(system.query_full_state(black_box(50_000))).len())
    });
}

criterion_group!(
    benches,
    bench_query_point,
    bench_query_range,
    bench_full_state
);
criterion_main!(benches);
