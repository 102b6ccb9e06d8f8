//! Performance benchmarks for diffing and payload decoding.
//!
//! Run with: `cargo bench --bench diff`
//!
//! ## Scenarios
//!
//! | Operation | Notes |
//! |-----------|-------|
//! | Positional diff | Wide mapping of records, one field changed per record |
//! | Ignore-order diff | Shuffled sequence, cold vs warm distance cache |
//! | Payload load | Allow-list gated decode of a nested value |

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use deepdiff_kernel::{diff, dump, load, AllowList, DiffConfig, DiffEngine, Record, TypeRegistry, Value};

/// A mapping of `n` records keyed by id.
fn make_catalog(n: usize, bump: i64) -> Value {
    Value::dict((0..n as i64).map(|i| {
        let record = Record::new("bench.Item")
            .with_field("id", i)
            .with_field("name", format!("item-{i}"))
            .with_field("price", Value::Float(i as f64 * 1.5))
            .with_field("stock", i % 7 + bump)
            .with_field("tags", Value::set(["a", "b"]));
        (Value::Int(i), Value::from(record))
    }))
}

/// A list of small mappings, optionally rotated and mutated.
fn make_rows(n: usize, rotate: usize, mutate: bool) -> Value {
    let mut rows: Vec<Value> = (0..n as i64)
        .map(|i| {
            let v = if mutate && i % 10 == 0 { i + 1 } else { i };
            Value::dict([("id", Value::Int(i)), ("v", Value::Int(v)), ("k", Value::from("x"))])
        })
        .collect();
    rows.rotate_left(rotate % n.max(1));
    Value::List(rows)
}

fn bench_positional(c: &mut Criterion) {
    let mut group = c.benchmark_group("positional_diff");
    for size in [10usize, 100, 1000] {
        let old = make_catalog(size, 0);
        let new = make_catalog(size, 1);
        group.throughput(Throughput::Elements(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, _| {
            b.iter(|| diff(black_box(&old), black_box(&new), &DiffConfig::default()).unwrap())
        });
    }
    group.finish();
}

fn bench_ignore_order(c: &mut Criterion) {
    let mut group = c.benchmark_group("ignore_order_diff");
    let config = DiffConfig::default().with_ignore_order(true);
    for size in [10usize, 100] {
        let old = make_rows(size, 0, false);
        let new = make_rows(size, size / 3, true);

        group.bench_with_input(BenchmarkId::new("cold", size), &size, |b, _| {
            b.iter(|| diff(black_box(&old), black_box(&new), &config).unwrap())
        });

        let engine = DiffEngine::new(config.clone()).unwrap();
        group.bench_with_input(BenchmarkId::new("warm", size), &size, |b, _| {
            b.iter(|| engine.diff(black_box(&old), black_box(&new)).unwrap())
        });
    }
    group.finish();
}

fn bench_payload_load(c: &mut Criterion) {
    let value = make_catalog(200, 0);
    let payload = dump(&value).unwrap();
    let allow = AllowList::from("bench.Item");
    let mut registry = TypeRegistry::new();
    registry.register_passthrough("bench.Item");

    c.bench_function("payload_load_200_records", |b| {
        b.iter(|| load(black_box(&payload), &allow, &registry).unwrap())
    });
}

criterion_group!(benches, bench_positional, bench_ignore_order, bench_payload_load);
criterion_main!(benches);
