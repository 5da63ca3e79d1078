/*!
 * Round-Trip and Reduction Properties
 * Projection byte fidelity, sort inverses, reduction associativity
 */

use super::common::*;
use helios_engine::core::types::{TypeDesc, TypeKind, NULL_INT};
use helios_engine::ir::unit::{OrderEntry, SortInfo};
use helios_engine::ir::{AggKind, Expr, ExecutionUnit, TargetExpr};
use helios_engine::result::{reduce_buffers, ColumnarResults};
use helios_engine::storage::{ColumnBuffer, MemTableProvider};
use helios_engine::EngineConfig;
use pretty_assertions::assert_eq;
use std::sync::Arc;

#[test]
fn test_projection_round_trip_is_byte_identical() {
    let provider = Arc::new(MemTableProvider::new());
    let int_col = ColumnBuffer::from_i64_slice(&[7, NULL_INT as i64, -9, 1000], 4);
    let dbl_col = ColumnBuffer::from_f64_slice(&[1.5, -2.25, f64::MIN, 0.0]);
    let int_ty = TypeDesc::new(TypeKind::Int, true);
    let dbl_ty = TypeDesc::new(TypeKind::Double, true);
    provider.add_table(1, vec![int_ty, dbl_ty]);
    provider.add_fragment(1, vec![int_col.clone(), dbl_col.clone()]);
    let engine = make_engine(Arc::clone(&provider));

    let unit = ExecutionUnit::for_table(1).with_targets(vec![
        TargetExpr::projected(Expr::col(1, 0, int_ty)),
        TargetExpr::projected(Expr::col(1, 1, dbl_ty)),
    ]);
    let rs = engine.execute(&unit).unwrap();
    let columnar = ColumnarResults::from_result_set(&rs);

    assert_eq!(columnar.row_count, 4);
    assert_eq!(columnar.columns[0].buffer, int_col.bytes());
    assert_eq!(columnar.columns[1].buffer, dbl_col.bytes());
}

#[test]
fn test_sort_then_inverse_preserves_multiset() {
    let provider = Arc::new(MemTableProvider::new());
    let values = vec![5i64, 3, 9, 3, 1, 9, 9];
    single_bigint_table(&provider, 1, &values);
    let engine = make_engine(Arc::clone(&provider));

    let x = Expr::col(1, 0, bigint_ty());
    let sort = |ascending| SortInfo {
        order_entries: vec![OrderEntry {
            target_idx: 0,
            ascending,
            nulls_first: false,
        }],
        limit: None,
        offset: 0,
    };

    let asc = engine
        .execute(
            &ExecutionUnit::for_table(1)
                .with_targets(vec![TargetExpr::projected(x.clone())])
                .with_sort(sort(true)),
        )
        .unwrap();
    let desc = engine
        .execute(
            &ExecutionUnit::for_table(1)
                .with_targets(vec![TargetExpr::projected(x)])
                .with_sort(sort(false)),
        )
        .unwrap();

    let asc_rows = int_rows(&asc.rows());
    let mut desc_rows = int_rows(&desc.rows());
    assert!(asc_rows.windows(2).all(|w| w[0] <= w[1]));
    assert!(desc_rows.windows(2).all(|w| w[0] >= w[1]));
    desc_rows.reverse();
    assert_eq!(asc_rows, desc_rows);

    let mut original = values;
    original.sort_unstable();
    assert_eq!(asc_rows, original);
}

#[test]
fn test_reduction_matches_single_kernel_execution() {
    // same data as one fragment and as three; per-fragment kernels must
    // reduce to the one-kernel answer
    let values: Vec<i64> = vec![4, 4, 7, 7, 7, 9, 4, 9];

    let one = Arc::new(MemTableProvider::new());
    single_bigint_table(&one, 1, &values);

    let three = Arc::new(MemTableProvider::new());
    three.add_table(1, vec![bigint_ty()]);
    three.add_fragment(1, vec![ColumnBuffer::from_i64_slice(&values[..3], 8)]);
    three.add_fragment(1, vec![ColumnBuffer::from_i64_slice(&values[3..6], 8)]);
    three.add_fragment(1, vec![ColumnBuffer::from_i64_slice(&values[6..], 8)]);

    let mut config = EngineConfig::default();
    config.allow_multifrag = false;
    let single_engine = make_engine(one);
    let multi_engine = make_engine_with_config(three, config);

    let k = Expr::col(1, 0, bigint_ty());
    let unit = ExecutionUnit::for_table(1)
        .with_targets(vec![
            TargetExpr::projected(k.clone()),
            TargetExpr::count_star(),
            TargetExpr::aggregate(AggKind::Sum, k.clone()),
            TargetExpr::aggregate(AggKind::Min, k.clone()),
            TargetExpr::aggregate(AggKind::Max, k.clone()),
        ])
        .with_group_by(vec![k]);

    let mut single_rows = single_engine.execute(&unit).unwrap().rows();
    let mut multi_rows = multi_engine.execute(&unit).unwrap().rows();
    single_rows.sort_by_key(|r| r[0].as_i64());
    multi_rows.sort_by_key(|r| r[0].as_i64());
    assert_eq!(single_rows, multi_rows);
}

#[test]
fn test_reduction_is_associative_over_binary_groupings() {
    use helios_engine::layout::{choose_query_memory_descriptor, OutputBuffer};

    let provider = MemTableProvider::new();
    provider.add_table(1, vec![bigint_ty()]);
    provider.add_fragment(1, vec![ColumnBuffer::from_i64_slice(&[0, 1, 2, 3], 8)]);
    let frags = {
        use helios_engine::storage::SchemaProvider;
        provider.table_fragments(1).unwrap()
    };

    let k = Expr::col(1, 0, bigint_ty());
    let unit = ExecutionUnit::for_table(1)
        .with_targets(vec![
            TargetExpr::count_star(),
            TargetExpr::aggregate(AggKind::Sum, k.clone()),
            TargetExpr::aggregate(AggKind::Min, k.clone()),
        ])
        .with_group_by(vec![k]);
    let qmd = Arc::new(
        choose_query_memory_descriptor(&unit, &frags, &EngineConfig::default(), None, 1 << 30)
            .unwrap(),
    );

    // three partial buffers with hand-written slots for entry 2
    let make_partial = |count: i64, sum: i64, min: i64| {
        let mut out = OutputBuffer::new(Arc::clone(&qmd));
        let count_idx = qmd.slot_index(2, 0);
        let sum_idx = qmd.slot_index(2, 1);
        let min_idx = qmd.slot_index(2, 2);
        let buf = out.slots_mut();
        buf[count_idx] = count;
        buf[sum_idx] = sum;
        buf[min_idx] = min;
        out
    };

    let snapshot = |out: &OutputBuffer| {
        (
            out.slot(2, 0),
            out.slot(2, 1),
            out.slot(2, 2),
        )
    };

    let left = reduce_buffers(vec![
        reduce_buffers(vec![make_partial(2, 10, 5), make_partial(1, 7, 3)]).unwrap(),
        make_partial(4, 1, 9),
    ])
    .unwrap();
    let right = reduce_buffers(vec![
        make_partial(2, 10, 5),
        reduce_buffers(vec![make_partial(1, 7, 3), make_partial(4, 1, 9)]).unwrap(),
    ])
    .unwrap();

    assert_eq!(snapshot(&left), snapshot(&right));
    assert_eq!(snapshot(&left), (7, 18, 3));
}
