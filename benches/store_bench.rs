//! Measures the tiered attribute store's amortized write path: how `put_attribute`'s
//! prepend-and-trim-at-2x behavior scales with hot-tier size and load level.

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use pulsemesh::store::AttributeStore;
use pulsemesh::types::{LoadLevel, Measurement, Value};
use std::hint::black_box;

const HOT_LIMITS: &[usize] = &[100, 1_000, 10_000];

fn bench_put_attribute(c: &mut Criterion) {
    let mut group = c.benchmark_group("store_put_attribute");

    for &hot_limit in HOT_LIMITS {
        group.bench_with_input(BenchmarkId::new("hot_limit", hot_limit), &hot_limit, |b, &hot_limit| {
            let store = AttributeStore::new(hot_limit, hot_limit * 60);
            let mut ts = 0i64;
            b.iter(|| {
                store.put_attribute(
                    Measurement::new("bench-sensor", "numeric", black_box(ts), Value::Number(black_box(ts as f64))),
                    LoadLevel::Normal,
                );
                ts += 1;
            });
        });
    }

    group.finish();
}

fn bench_put_attribute_under_load_levels(c: &mut Criterion) {
    let mut group = c.benchmark_group("store_put_attribute_by_load");

    for load in [LoadLevel::Normal, LoadLevel::Elevated, LoadLevel::High, LoadLevel::Critical] {
        group.bench_with_input(BenchmarkId::new("load", load.as_str()), &load, |b, &load| {
            let store = AttributeStore::new(1_000, 60_000);
            let mut ts = 0i64;
            b.iter(|| {
                store.put_attribute(Measurement::new("bench-sensor", "numeric", black_box(ts), Value::Number(black_box(ts as f64))), load);
                ts += 1;
            });
        });
    }

    group.finish();
}

fn bench_get_attributes(c: &mut Criterion) {
    let store = AttributeStore::new(1_000, 60_000);
    for i in 0..5_000 {
        store.put_attribute(Measurement::new("bench-sensor", "numeric", i, Value::Number(i as f64)), LoadLevel::Normal);
    }

    c.bench_function("store_get_attributes_n100", |b| {
        b.iter(|| black_box(store.get_attributes("bench-sensor", "numeric", 100)));
    });
}

criterion_group!(benches, bench_put_attribute, bench_put_attribute_under_load_levels, bench_get_attributes);
criterion_main!(benches);
