/*!
 * Null-Propagation Properties
 * Property tests over the null-aware arithmetic intrinsics
 */

use helios_engine::core::types::NULL_BIGINT;
use helios_engine::runtime::arith::{
    add_i64_nullable, add_i64_nullable_lhs, add_i64_nullable_rhs, eq_i64_nullable,
    lt_i64_nullable, mul_i64_nullable, safe_div_i64, sub_i64_nullable, NULL_BOOLEAN,
};
use helios_engine::runtime::decimal::{decimal_ceil, decimal_floor, scale_decimal_down};
use helios_engine::runtime::agg::agg_count_skip_val;
use proptest::prelude::*;

/// Operand values, with the null sentinel mixed in deliberately
fn operand() -> impl Strategy<Value = i64> {
    prop_oneof![
        4 => -1_000_000i64..1_000_000i64,
        1 => Just(NULL_BIGINT),
    ]
}

proptest! {
    #[test]
    fn null_iff_either_operand_null(a in operand(), b in operand()) {
        for op in [add_i64_nullable, sub_i64_nullable, mul_i64_nullable] {
            let out = op(a, b, NULL_BIGINT);
            let expect_null = a == NULL_BIGINT || b == NULL_BIGINT;
            prop_assert_eq!(out == NULL_BIGINT, expect_null);
        }
    }

    #[test]
    fn comparison_null_iff_either_operand_null(a in operand(), b in operand()) {
        for op in [eq_i64_nullable, lt_i64_nullable] {
            let out = op(a, b, NULL_BIGINT);
            let expect_null = a == NULL_BIGINT || b == NULL_BIGINT;
            prop_assert_eq!(out == NULL_BOOLEAN, expect_null);
            if !expect_null {
                prop_assert!(out == 0 || out == 1);
            }
        }
    }

    #[test]
    fn restricted_variants_check_only_named_side(a in operand(), b in -1000i64..1000i64) {
        // rhs is never null: the lhs variant agrees with the full one
        prop_assert_eq!(
            add_i64_nullable_lhs(a, b, NULL_BIGINT),
            add_i64_nullable(a, b, NULL_BIGINT)
        );
        // and symmetrically
        prop_assert_eq!(
            add_i64_nullable_rhs(b, a, NULL_BIGINT),
            add_i64_nullable(b, a, NULL_BIGINT)
        );
    }

    #[test]
    fn safe_div_never_traps(a in operand(), b in operand()) {
        let out = safe_div_i64(a, b, NULL_BIGINT);
        if b == 0 {
            prop_assert_eq!(out, NULL_BIGINT);
        }
    }

    #[test]
    fn decimal_floor_ceil_differ_by_zero_or_scale(v in -1_000_000i64..1_000_000i64, exp in 1u32..6) {
        let scale = 10i64.pow(exp);
        let floor = decimal_floor(v, scale);
        let ceil = decimal_ceil(v, scale);
        prop_assert!(floor <= v && v <= ceil);
        let diff = ceil - floor;
        prop_assert!(diff == 0 || diff == scale);
        prop_assert_eq!(floor % scale, 0);
        prop_assert_eq!(ceil % scale, 0);
    }

    #[test]
    fn scale_down_rounds_half_away_from_zero(v in -1_000_000i64..1_000_000i64) {
        let down = scale_decimal_down(v, 100, NULL_BIGINT);
        let exact = v as f64 / 100.0;
        prop_assert_eq!(down, exact.abs().round() as i64 * exact.signum() as i64);
    }

    #[test]
    fn skip_val_count_equals_non_skip_rows(values in prop::collection::vec(operand(), 0..200)) {
        let mut slot = 0i64;
        let mut running = 0i64;
        for v in &values {
            agg_count_skip_val(&mut slot, *v, NULL_BIGINT);
            // monotone non-decreasing
            prop_assert!(slot >= running);
            running = slot;
        }
        let expected = values.iter().filter(|&&v| v != NULL_BIGINT).count() as i64;
        prop_assert_eq!(slot, expected);
    }
}
