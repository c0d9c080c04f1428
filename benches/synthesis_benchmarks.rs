//! Rule-synthesis benchmarks: shape-rule and constraint-rule search cost
//! against a small fixture database.

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use std::time::Duration;

use autoinf::constraint_rules;
use autoinf::expr::cache::TreeCache;
use autoinf::expr::enumerator::EnumConfig;
use autoinf::invocation_db::{InputValue, InvocationDb};
use autoinf::shape_rules;
use autoinf::smt::Solver;

fn passthrough_db(size: i64) -> InvocationDb {
    let mut db = InvocationDb::new();
    for i in 1..=size {
        db.add(vec![InputValue::Int(i), InputValue::Int(i + 1)], Some(vec![i, i + 1]))
            .expect("add");
    }
    db
}

fn bench_shape_synthesize(c: &mut Criterion) {
    let cache = TreeCache::build(EnumConfig {
        max_height: 3,
        max_args: 2,
        enable_div: false,
    });

    let mut group = c.benchmark_group("shape_synthesize");
    for size in [4i64, 16, 64] {
        let db = passthrough_db(size);
        group.bench_with_input(BenchmarkId::from_parameter(size), &db, |b, db| {
            b.iter(|| shape_rules::synthesize(db, 2, &cache, Duration::from_secs(5)));
        });
    }
    group.finish();
}

fn bench_constraint_synthesize(c: &mut Criterion) {
    let cache = TreeCache::build(EnumConfig {
        max_height: 2,
        max_args: 2,
        enable_div: false,
    });
    let solver = Solver::new(Duration::from_millis(500));

    let mut group = c.benchmark_group("constraint_synthesize");
    for size in [4i64, 16, 64] {
        let mut db = passthrough_db(size);
        db.add(vec![InputValue::Int(size + 100), InputValue::Int(0)], None).expect("add fail");
        db.add(vec![InputValue::Int(-1), InputValue::Int(0)], None).expect("add fail");
        let fail_nonneg: Vec<_> = db
            .fails()
            .iter()
            .filter(|r| r.iter().all(|v| !matches!(v, InputValue::Int(n) if *n < 0)))
            .cloned()
            .collect();

        group.bench_with_input(BenchmarkId::from_parameter(size), &db, |b, db| {
            b.iter(|| constraint_rules::synthesize(db, &fail_nonneg, &cache, &solver, Duration::from_secs(5)));
        });
    }
    group.finish();
}

criterion_group! {
    name = benches;
    config = Criterion::default()
        .measurement_time(Duration::from_secs(10))
        .warm_up_time(Duration::from_secs(3));
    targets = bench_shape_synthesize, bench_constraint_synthesize
}
criterion_main!(benches);
