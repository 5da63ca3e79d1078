/*!
 * Group-By Benchmarks
 *
 * Compare perfect-hash and baseline-hash group-by throughput across
 * key cardinalities
 */

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use helios_engine::ir::{AggKind, Expr, ExecutionUnit, TargetExpr};
use helios_engine::storage::{ColumnBuffer, MemTableProvider};
use helios_engine::{Engine, EngineConfig, TypeDesc, TypeKind};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::Arc;

const ROWS: usize = 100_000;

fn engine_with_keys(dense: bool, cardinality: i64) -> (Engine, ExecutionUnit) {
    let mut rng = StdRng::seed_from_u64(42);
    let values: Vec<i64> = (0..ROWS)
        .map(|_| {
            let k = rng.gen_range(0..cardinality);
            if dense {
                k
            } else {
                // sparse keys force the baseline layout
                k * 1_000_003
            }
        })
        .collect();

    let provider = Arc::new(MemTableProvider::new());
    let ty = TypeDesc::new(TypeKind::BigInt, false);
    provider.add_table(1, vec![ty]);
    provider.add_fragment(1, vec![ColumnBuffer::from_i64_slice(&values, 8)]);

    let k = Expr::col(1, 0, ty);
    let unit = ExecutionUnit::for_table(1)
        .with_targets(vec![
            TargetExpr::count_star(),
            TargetExpr::aggregate(AggKind::Sum, k.clone()),
        ])
        .with_group_by(vec![k]);
    (Engine::new(provider, EngineConfig::default()), unit)
}

fn bench_group_by(c: &mut Criterion) {
    let mut group = c.benchmark_group("group_by");

    for cardinality in [16i64, 1024, 16 * 1024] {
        let (engine, unit) = engine_with_keys(true, cardinality);
        group.bench_with_input(
            BenchmarkId::new("perfect_hash", cardinality),
            &cardinality,
            |b, _| {
                b.iter(|| {
                    let rs = engine.execute(black_box(&unit)).unwrap();
                    black_box(rs.row_count())
                });
            },
        );

        let (engine, unit) = engine_with_keys(false, cardinality);
        group.bench_with_input(
            BenchmarkId::new("baseline_hash", cardinality),
            &cardinality,
            |b, _| {
                b.iter(|| {
                    let rs = engine.execute(black_box(&unit)).unwrap();
                    black_box(rs.row_count())
                });
            },
        );
    }
    group.finish();
}

criterion_group!(benches, bench_group_by);
criterion_main!(benches);
