/*!
 * End-to-End Query Scenarios
 * Literal aggregate, group-by, join, sort, and dictionary scenarios
 */

use super::common::*;
use helios_engine::core::types::{Datum, NULL_INT};
use helios_engine::ir::unit::{JoinCondition, JoinType, OrderEntry, SortInfo};
use helios_engine::ir::{AggKind, BinOpKind, Expr, ExecutionUnit, TargetExpr};
use helios_engine::result::TargetValue;
use helios_engine::storage::{ColumnBuffer, MemTableProvider, StringDictionary};
use helios_engine::TypeDesc;
use pretty_assertions::assert_eq;
use std::sync::Arc;

#[test]
fn test_scalar_aggregates_over_dense_column() {
    let provider = Arc::new(MemTableProvider::new());
    single_bigint_table(&provider, 1, &[1, 2, 3, 4, 5]);
    let engine = make_engine(Arc::clone(&provider));

    let x = Expr::col(1, 0, bigint_ty());
    let unit = ExecutionUnit::for_table(1).with_targets(vec![
        TargetExpr::count_star(),
        TargetExpr::aggregate(AggKind::Sum, x.clone()),
        TargetExpr::aggregate(AggKind::Min, x.clone()),
        TargetExpr::aggregate(AggKind::Max, x.clone()),
        TargetExpr::aggregate(AggKind::Avg, x),
    ]);

    let rs = engine.execute(&unit).unwrap();
    let rows = rs.rows();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0][0], TargetValue::Int(5));
    assert_eq!(rows[0][1], TargetValue::Int(15));
    assert_eq!(rows[0][2], TargetValue::Int(1));
    assert_eq!(rows[0][3], TargetValue::Int(5));
    assert_eq!(rows[0][4], TargetValue::Double(3.0));
}

#[test]
fn test_group_by_count_ordered() {
    let provider = Arc::new(MemTableProvider::new());
    single_bigint_table(&provider, 1, &[1, 1, 2, 2, 2, 3]);
    let engine = make_engine(Arc::clone(&provider));

    let k = Expr::col(1, 0, bigint_ty());
    let unit = ExecutionUnit::for_table(1)
        .with_targets(vec![TargetExpr::projected(k.clone()), TargetExpr::count_star()])
        .with_group_by(vec![k])
        .with_sort(SortInfo {
            order_entries: vec![OrderEntry {
                target_idx: 0,
                ascending: true,
                nulls_first: false,
            }],
            limit: None,
            offset: 0,
        });

    let rs = engine.execute(&unit).unwrap();
    assert_eq!(int_pairs(&rs.rows()), vec![(1, 2), (2, 3), (3, 1)]);
}

#[test]
fn test_avg_and_counts_with_nulls() {
    let provider = Arc::new(MemTableProvider::new());
    provider.add_table(1, vec![int_ty(true)]);
    provider.add_fragment(
        1,
        vec![ColumnBuffer::from_i64_slice(
            &[10, NULL_INT as i64, 20, NULL_INT as i64, 30],
            4,
        )],
    );
    let engine = make_engine(Arc::clone(&provider));

    let x = Expr::col(1, 0, int_ty(true));
    let unit = ExecutionUnit::for_table(1).with_targets(vec![
        TargetExpr::aggregate(AggKind::Avg, x.clone()),
        TargetExpr::aggregate(AggKind::Count, x),
        TargetExpr::count_star(),
    ]);

    let rs = engine.execute(&unit).unwrap();
    let rows = rs.rows();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0][0], TargetValue::Double(20.0));
    assert_eq!(rows[0][1], TargetValue::Int(3));
    assert_eq!(rows[0][2], TargetValue::Int(5));
}

#[test]
fn test_inner_join_projects_matching_rows() {
    let provider = Arc::new(MemTableProvider::new());
    // inner table 1: a = [1, 2, 3]; outer table 2: b = [3, 3, 1, 4]
    single_bigint_table(&provider, 1, &[1, 2, 3]);
    single_bigint_table(&provider, 2, &[3, 3, 1, 4]);
    let engine = make_engine(Arc::clone(&provider));

    let b = Expr::col(2, 0, bigint_ty());
    let a_inner = Expr::col_at(1, 0, 1, bigint_ty());
    let unit = ExecutionUnit::for_table(2)
        .with_targets(vec![TargetExpr::projected(b.clone())])
        .with_join(
            JoinCondition {
                join_type: JoinType::Inner,
                outer_expr: b,
                inner_expr: a_inner,
            },
            1,
        );

    let rs = engine.execute(&unit).unwrap();
    let mut values = int_rows(&rs.rows());
    values.sort_unstable();
    assert_eq!(values, vec![1, 3, 3]);
}

#[test]
fn test_order_by_desc_with_limit_offset() {
    let provider = Arc::new(MemTableProvider::new());
    let values: Vec<i64> = (1..=100).collect();
    single_bigint_table(&provider, 1, &values);
    let engine = make_engine(Arc::clone(&provider));

    let x = Expr::col(1, 0, bigint_ty());
    let unit = ExecutionUnit::for_table(1)
        .with_targets(vec![TargetExpr::projected(x)])
        .with_sort(SortInfo {
            order_entries: vec![OrderEntry {
                target_idx: 0,
                ascending: false,
                nulls_first: false,
            }],
            limit: Some(3),
            offset: 2,
        });

    let rs = engine.execute(&unit).unwrap();
    assert_eq!(int_rows(&rs.rows()), vec![98, 97, 96]);
}

#[test]
fn test_group_by_dictionary_strings() {
    let provider = Arc::new(MemTableProvider::new());
    let dict = Arc::new(StringDictionary::new(7));
    let hi = dict.get_or_add("hi").unwrap();
    let bye = dict.get_or_add("bye").unwrap();
    provider.add_dictionary(Arc::clone(&dict));

    let s_ty = TypeDesc::dict_text(7, false);
    provider.add_table(1, vec![s_ty]);
    provider.add_fragment(1, vec![ColumnBuffer::from_dict_ids(&[hi, bye, hi], 7)]);
    let engine = make_engine(Arc::clone(&provider));

    let s = Expr::col(1, 0, s_ty);
    let unit = ExecutionUnit::for_table(1)
        .with_targets(vec![TargetExpr::projected(s.clone()), TargetExpr::count_star()])
        .with_group_by(vec![s]);

    let rs = engine.execute(&unit).unwrap();
    let mut rows: Vec<(String, i64)> = rs
        .rows()
        .into_iter()
        .map(|r| {
            let name = match &r[0] {
                TargetValue::Str(s) => s.clone(),
                other => panic!("expected string, got {other:?}"),
            };
            (name, r[1].as_i64().unwrap())
        })
        .collect();
    rows.sort();
    assert_eq!(
        rows,
        vec![("bye".to_owned(), 1), ("hi".to_owned(), 2)]
    );
}

#[test]
fn test_filtered_aggregate_with_string_literal() {
    let provider = Arc::new(MemTableProvider::new());
    let dict = Arc::new(StringDictionary::new(3));
    let red = dict.get_or_add("red").unwrap();
    let blue = dict.get_or_add("blue").unwrap();
    provider.add_dictionary(Arc::clone(&dict));

    let s_ty = TypeDesc::dict_text(3, false);
    provider.add_table(1, vec![s_ty]);
    provider.add_fragment(
        1,
        vec![ColumnBuffer::from_dict_ids(&[red, blue, red, red], 3)],
    );
    let engine = make_engine(Arc::clone(&provider));

    // s = 'red' lowers through the transient dictionary tier
    let qual = Expr::bin_op(
        BinOpKind::Eq,
        Expr::col(1, 0, s_ty),
        Expr::lit(Datum::Str("red".to_owned()), s_ty),
    );
    let unit = ExecutionUnit::for_table(1)
        .with_targets(vec![TargetExpr::count_star()])
        .with_quals(vec![], vec![qual]);

    let rs = engine.execute(&unit).unwrap();
    assert_eq!(rs.rows()[0][0], TargetValue::Int(3));
}

#[test]
fn test_left_join_null_extends_misses() {
    let provider = Arc::new(MemTableProvider::new());
    single_bigint_table(&provider, 1, &[1]);
    single_bigint_table(&provider, 2, &[1, 4]);
    let engine = make_engine(Arc::clone(&provider));

    let b = Expr::col(2, 0, bigint_ty());
    let a_inner = Expr::col_at(1, 0, 1, TypeDesc::new(helios_engine::TypeKind::BigInt, true));
    let unit = ExecutionUnit::for_table(2)
        .with_targets(vec![
            TargetExpr::projected(b.clone()),
            TargetExpr::projected(a_inner.clone()),
        ])
        .with_join(
            JoinCondition {
                join_type: JoinType::Left,
                outer_expr: b,
                inner_expr: Expr::col_at(1, 0, 1, bigint_ty()),
            },
            1,
        );

    let rs = engine.execute(&unit).unwrap();
    let mut rows = rs.rows();
    rows.sort_by_key(|r| r[0].as_i64());
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0][0], TargetValue::Int(1));
    assert_eq!(rows[0][1], TargetValue::Int(1));
    assert_eq!(rows[1][0], TargetValue::Int(4));
    assert_eq!(rows[1][1], TargetValue::Null);
}

#[test]
fn test_count_distinct_bitmap_and_sketch() {
    let provider = Arc::new(MemTableProvider::new());
    single_bigint_table(&provider, 1, &[1, 2, 2, 3, 3, 3]);
    let engine = make_engine(Arc::clone(&provider));

    let x = Expr::col(1, 0, bigint_ty());
    let unit = ExecutionUnit::for_table(1).with_targets(vec![
        TargetExpr::aggregate(AggKind::CountDistinct, x.clone()),
        TargetExpr::aggregate(AggKind::ApproxCountDistinct, x),
    ]);

    let rs = engine.execute(&unit).unwrap();
    let rows = rs.rows();
    assert_eq!(rows[0][0], TargetValue::Int(3));
    // dense range also uses an exact bitmap for the approximate form
    assert_eq!(rows[0][1], TargetValue::Int(3));
}
