/*!
 * Dispatcher Behavior Tests
 * Fragment skipping, scan limits, UNION ALL, device budgets, watchdog,
 * per-row error codes, and baseline hashing
 */

use super::common::*;
use helios_engine::core::errors::EngineError;
use helios_engine::exec::{DeviceKind, DeviceMemoryInfo, ExecError, Watchdog};
use helios_engine::ir::{AggKind, BinOpKind, Expr, ExecutionUnit, TargetExpr};
use helios_engine::result::TargetValue;
use helios_engine::storage::{ColumnBuffer, MemTableProvider};
use helios_engine::{Engine, EngineConfig};
use pretty_assertions::assert_eq;
use std::sync::Arc;

fn two_fragment_provider() -> Arc<MemTableProvider> {
    let provider = Arc::new(MemTableProvider::new());
    provider.add_table(1, vec![bigint_ty()]);
    provider.add_fragment(1, vec![ColumnBuffer::from_i64_slice(&[0, 1, 2, 3, 4], 8)]);
    provider.add_fragment(
        1,
        vec![ColumnBuffer::from_i64_slice(&[10, 11, 12, 13, 14], 8)],
    );
    provider
}

#[test]
fn test_fragment_skipping_by_min_max() {
    let provider = two_fragment_provider();
    let engine = make_engine(Arc::clone(&provider));

    let x = Expr::col(1, 0, bigint_ty());
    let qual = Expr::bin_op(BinOpKind::Lt, x.clone(), Expr::lit_i64(5));
    let unit = ExecutionUnit::for_table(1)
        .with_targets(vec![TargetExpr::count_star()])
        .with_quals(vec![qual], vec![]);

    let (rs, stats) = engine.execute_detailed(&unit, None).unwrap();
    assert_eq!(rs.rows()[0][0], TargetValue::Int(5));
    assert_eq!(stats.skipped_fragments, 1);
}

#[test]
fn test_all_fragments_skipped_yields_empty_groups() {
    let provider = two_fragment_provider();
    let engine = make_engine(Arc::clone(&provider));

    let x = Expr::col(1, 0, bigint_ty());
    let qual = Expr::bin_op(BinOpKind::Gt, x.clone(), Expr::lit_i64(1000));
    let unit = ExecutionUnit::for_table(1)
        .with_targets(vec![TargetExpr::projected(x), TargetExpr::count_star()])
        .with_group_by(vec![Expr::col(1, 0, bigint_ty())])
        .with_quals(vec![qual], vec![]);

    let (rs, stats) = engine.execute_detailed(&unit, None).unwrap();
    assert_eq!(stats.skipped_fragments, 2);
    assert_eq!(stats.kernel_count, 0);
    assert!(rs.is_empty());
}

#[test]
fn test_multi_fragment_aggregation_reduces() {
    let provider = two_fragment_provider();
    let engine = make_engine(Arc::clone(&provider));

    let x = Expr::col(1, 0, bigint_ty());
    let unit = ExecutionUnit::for_table(1).with_targets(vec![
        TargetExpr::count_star(),
        TargetExpr::aggregate(AggKind::Sum, x.clone()),
        TargetExpr::aggregate(AggKind::Min, x.clone()),
        TargetExpr::aggregate(AggKind::Max, x),
    ]);

    let rs = engine.execute(&unit).unwrap();
    let rows = rs.rows();
    assert_eq!(rows[0][0], TargetValue::Int(10));
    assert_eq!(rows[0][1], TargetValue::Int(70));
    assert_eq!(rows[0][2], TargetValue::Int(0));
    assert_eq!(rows[0][3], TargetValue::Int(14));
}

#[test]
fn test_single_kernel_per_fragment_without_multifrag() {
    let provider = two_fragment_provider();
    let mut config = EngineConfig::default();
    config.allow_multifrag = false;
    let engine = make_engine_with_config(Arc::clone(&provider), config);

    let x = Expr::col(1, 0, bigint_ty());
    let unit = ExecutionUnit::for_table(1)
        .with_targets(vec![TargetExpr::aggregate(AggKind::Sum, x)]);

    let (rs, stats) = engine.execute_detailed(&unit, None).unwrap();
    assert_eq!(stats.kernel_count, 2);
    assert_eq!(rs.rows()[0][0], TargetValue::Int(70));
}

#[test]
fn test_scan_limit_stops_projection() {
    let provider = Arc::new(MemTableProvider::new());
    single_bigint_table(&provider, 1, &(0..50).collect::<Vec<i64>>());
    let engine = make_engine(Arc::clone(&provider));

    let x = Expr::col(1, 0, bigint_ty());
    let mut unit = ExecutionUnit::for_table(1).with_targets(vec![TargetExpr::projected(x)]);
    unit.scan_limit = Some(7);

    let rs = engine.execute(&unit).unwrap();
    assert_eq!(rs.row_count(), 7);
}

#[test]
fn test_union_all_concatenates_branches() {
    let provider = Arc::new(MemTableProvider::new());
    single_bigint_table(&provider, 1, &[1, 2, 3]);
    single_bigint_table(&provider, 2, &[10, 20]);
    let engine = make_engine(Arc::clone(&provider));

    let x = Expr::col(1, 0, bigint_ty());
    let mut unit = ExecutionUnit::for_table(1).with_targets(vec![TargetExpr::projected(x)]);
    unit.input_tables.push(helios_engine::ir::InputDesc { table: 2 });
    unit.union_all = true;

    let rs = engine.execute(&unit).unwrap();
    let mut values = int_rows(&rs.rows());
    values.sort_unstable();
    assert_eq!(values, vec![1, 2, 3, 10, 20]);
}

#[test]
fn test_divide_by_zero_surfaces_error_code() {
    let provider = Arc::new(MemTableProvider::new());
    single_bigint_table(&provider, 1, &[1, 2, 3]);
    let engine = make_engine(Arc::clone(&provider));

    let x = Expr::col(1, 0, bigint_ty());
    let div = Expr::bin_op(BinOpKind::Div, x, Expr::lit_i64(0));
    let unit = ExecutionUnit::for_table(1).with_targets(vec![TargetExpr::projected(div)]);

    match engine.execute(&unit) {
        Err(EngineError::Exec(ExecError::Kernel { code, .. })) => assert_eq!(code, 1),
        other => panic!("expected kernel error, got {other:?}"),
    }
}

#[test]
fn test_watchdog_interrupt_aborts_query() {
    let provider = Arc::new(MemTableProvider::new());
    single_bigint_table(&provider, 1, &(0..100).collect::<Vec<i64>>());
    let engine = make_engine(Arc::clone(&provider));

    let x = Expr::col(1, 0, bigint_ty());
    let unit = ExecutionUnit::for_table(1)
        .with_targets(vec![TargetExpr::aggregate(AggKind::Sum, x)]);

    Watchdog::interrupt();
    let result = engine.execute(&unit);
    Watchdog::reset();

    match result {
        Err(EngineError::Exec(ExecError::Kernel { code, .. })) => assert_eq!(code, 4),
        other => panic!("expected watchdog error, got {other:?}"),
    }
    // cleared flag lets the same query run
    assert_eq!(
        engine.execute(&unit).unwrap().rows()[0][0],
        TargetValue::Int(4950)
    );
}

#[test]
fn test_baseline_hash_group_by_sparse_keys() {
    let provider = Arc::new(MemTableProvider::new());
    single_bigint_table(
        &provider,
        1,
        &[1_000_000_000, 5, 1_000_000_000, -3, 5, 1_000_000_000],
    );
    let engine = make_engine(Arc::clone(&provider));

    let k = Expr::col(1, 0, bigint_ty());
    let unit = ExecutionUnit::for_table(1)
        .with_targets(vec![TargetExpr::projected(k.clone()), TargetExpr::count_star()])
        .with_group_by(vec![k]);

    let rs = engine.execute(&unit).unwrap();
    assert_eq!(rs.qmd().hash_kind, helios_engine::HashKind::BaselineHash);
    let mut pairs = int_pairs(&rs.rows());
    pairs.sort();
    assert_eq!(pairs, vec![(-3, 1), (5, 2), (1_000_000_000, 3)]);
}

#[test]
fn test_multi_column_perfect_hash() {
    let provider = Arc::new(MemTableProvider::new());
    provider.add_table(1, vec![bigint_ty(), bigint_ty()]);
    provider.add_fragment(
        1,
        vec![
            ColumnBuffer::from_i64_slice(&[0, 0, 1, 1, 1], 8),
            ColumnBuffer::from_i64_slice(&[5, 6, 5, 5, 6], 8),
        ],
    );
    let engine = make_engine(Arc::clone(&provider));

    let a = Expr::col(1, 0, bigint_ty());
    let b = Expr::col(1, 1, bigint_ty());
    let unit = ExecutionUnit::for_table(1)
        .with_targets(vec![
            TargetExpr::projected(a.clone()),
            TargetExpr::projected(b.clone()),
            TargetExpr::count_star(),
        ])
        .with_group_by(vec![a, b]);

    let rs = engine.execute(&unit).unwrap();
    assert_eq!(
        rs.qmd().hash_kind,
        helios_engine::HashKind::PerfectHashMulti
    );
    let mut rows: Vec<(i64, i64, i64)> = rs
        .rows()
        .iter()
        .map(|r| {
            (
                r[0].as_i64().unwrap(),
                r[1].as_i64().unwrap(),
                r[2].as_i64().unwrap(),
            )
        })
        .collect();
    rows.sort();
    assert_eq!(rows, vec![(0, 5, 1), (0, 6, 1), (1, 5, 2), (1, 6, 1)]);
}

#[test]
fn test_gpu_device_matches_cpu_results() {
    let provider = Arc::new(MemTableProvider::new());
    single_bigint_table(&provider, 1, &[1, 1, 2, 2, 2, 3]);

    let cpu_engine = make_engine(Arc::clone(&provider));
    let gpu_engine = Engine::with_devices(
        Arc::clone(&provider),
        EngineConfig::default(),
        vec![
            DeviceMemoryInfo::new(DeviceKind::Cpu, 0, usize::MAX / 2),
            DeviceMemoryInfo::new(DeviceKind::Gpu, 0, 1 << 28),
        ],
    );

    let k = Expr::col(1, 0, bigint_ty());
    let unit = ExecutionUnit::for_table(1)
        .with_targets(vec![
            TargetExpr::projected(k.clone()),
            TargetExpr::count_star(),
            TargetExpr::aggregate(AggKind::Sum, k.clone()),
        ])
        .with_group_by(vec![k]);

    let (gpu_rs, gpu_stats) = gpu_engine.execute_detailed(&unit, None).unwrap();
    let cpu_rs = cpu_engine.execute(&unit).unwrap();
    assert!(gpu_stats.gpu_kernels > 0);

    let mut gpu_rows = int_pairs(&gpu_rs.rows());
    let mut cpu_rows = int_pairs(&cpu_rs.rows());
    gpu_rows.sort();
    cpu_rows.sort();
    assert_eq!(gpu_rows, cpu_rows);
}

#[test]
fn test_gpu_shared_memory_aggregation_matches_cpu() {
    let provider = Arc::new(MemTableProvider::new());
    let values: Vec<i64> = (0..5000).map(|i| i % 37).collect();
    single_bigint_table(&provider, 1, &values);

    let cpu_engine = make_engine(Arc::clone(&provider));
    let gpu_engine = Engine::with_devices(
        Arc::clone(&provider),
        EngineConfig::default(),
        vec![
            DeviceMemoryInfo::new(DeviceKind::Cpu, 0, usize::MAX / 2),
            DeviceMemoryInfo::new(DeviceKind::Gpu, 0, 1 << 28),
        ],
    );

    // aggregate-only targets keep the kernel on the shared-memory path
    let k = Expr::col(1, 0, bigint_ty());
    let unit = ExecutionUnit::for_table(1)
        .with_targets(vec![
            TargetExpr::count_star(),
            TargetExpr::aggregate(AggKind::Sum, k.clone()),
            TargetExpr::aggregate(AggKind::Min, k.clone()),
            TargetExpr::aggregate(AggKind::Max, k.clone()),
        ])
        .with_group_by(vec![k]);

    let (gpu_rs, gpu_stats) = gpu_engine.execute_detailed(&unit, None).unwrap();
    let cpu_rs = cpu_engine.execute(&unit).unwrap();
    assert!(gpu_stats.gpu_kernels > 0);
    // perfect-hash entries align, so row order matches without a sort
    assert_eq!(gpu_rs.rows(), cpu_rs.rows());
}

#[test]
fn test_gpu_budget_falls_back_to_cpu() {
    let provider = Arc::new(MemTableProvider::new());
    single_bigint_table(&provider, 1, &(0..1000).collect::<Vec<i64>>());

    // a GPU too small for even one fragment forces the CPU retry path
    let engine = Engine::with_devices(
        Arc::clone(&provider),
        EngineConfig::default(),
        vec![
            DeviceMemoryInfo::new(DeviceKind::Cpu, 0, usize::MAX / 2),
            DeviceMemoryInfo::new(DeviceKind::Gpu, 0, 16),
        ],
    );

    let x = Expr::col(1, 0, bigint_ty());
    let unit = ExecutionUnit::for_table(1)
        .with_targets(vec![TargetExpr::aggregate(AggKind::Sum, x)]);

    let (rs, stats) = engine.execute_detailed(&unit, None).unwrap();
    assert_eq!(stats.gpu_kernels, 0);
    assert_eq!(rs.rows()[0][0], TargetValue::Int((0..1000).sum::<i64>()));
}

#[test]
fn test_extension_function_in_projection() {
    use helios_engine::codegen::ExtensionFnRegistry;
    use helios_engine::exec::{CpuOnlyPolicy, ExecutionDispatcher};
    use helios_engine::pool::BufferPool;
    use helios_engine::storage::{DataProvider, SchemaProvider};
    use helios_engine::TypeDesc;

    let provider = Arc::new(MemTableProvider::new());
    single_bigint_table(&provider, 1, &[10, 20, 30]);

    let registry = Arc::new(ExtensionFnRegistry::new());
    let ty = TypeDesc::new(helios_engine::TypeKind::BigInt, false);
    registry.register("plus_one", vec![ty], ty, Arc::new(|args: &[i64]| args[0] + 1));

    let pool = Arc::new(BufferPool::new(
        Arc::clone(&provider) as Arc<dyn DataProvider>,
        1 << 22,
        1 << 26,
        1 << 22,
        1 << 26,
    ));
    let dispatcher = ExecutionDispatcher::new(
        Arc::clone(&provider) as Arc<dyn SchemaProvider>,
        pool,
        EngineConfig::default(),
        vec![DeviceMemoryInfo::new(DeviceKind::Cpu, 0, usize::MAX / 2)],
    )
    .with_extensions(registry);

    let x = Expr::col(1, 0, bigint_ty());
    let unit = ExecutionUnit::for_table(1)
        .with_targets(vec![TargetExpr::projected(Expr::ext_call(
            "plus_one",
            vec![x],
            ty,
        ))]);

    let rs = dispatcher.execute(&unit, &CpuOnlyPolicy, None).unwrap();
    let mut values = int_rows(&rs.rows());
    values.sort_unstable();
    assert_eq!(values, vec![11, 21, 31]);
}

#[test]
fn test_code_cache_hits_on_repeat_execution() {
    let provider = Arc::new(MemTableProvider::new());
    single_bigint_table(&provider, 1, &[1, 2, 3]);
    let engine = make_engine(Arc::clone(&provider));

    let x = Expr::col(1, 0, bigint_ty());
    let unit = ExecutionUnit::for_table(1)
        .with_targets(vec![TargetExpr::aggregate(AggKind::Sum, x)]);

    engine.execute(&unit).unwrap();
    engine.execute(&unit).unwrap();
    let stats = engine.code_cache_stats();
    assert!(stats.hits >= 1, "expected a cache hit, got {stats:?}");
}
