/*!
 * Null-Aware Arithmetic and Comparisons
 *
 * Scalar intrinsics over the slot domain. Null propagation is sentinel
 * comparison: each function takes the operand type's null sentinel and
 * returns it when any (or the named) input is null. Overflow and
 * division-by-zero detection live in the checked variants; generated
 * code branches on those and records an error code.
 */

use crate::core::types::NULL_TINYINT;

/// Boolean-null slot value produced by comparisons over nullable operands
pub const NULL_BOOLEAN: i64 = NULL_TINYINT as i64;

macro_rules! int_arith_nullable {
    ($name:ident, $name_lhs:ident, $name_rhs:ident, $op:ident) => {
        /// Both operands may be null
        #[inline(always)]
        #[must_use]
        pub fn $name(lhs: i64, rhs: i64, null_val: i64) -> i64 {
            if lhs == null_val || rhs == null_val {
                null_val
            } else {
                lhs.$op(rhs)
            }
        }

        /// Only the left operand may be null
        #[inline(always)]
        #[must_use]
        pub fn $name_lhs(lhs: i64, rhs: i64, null_val: i64) -> i64 {
            if lhs == null_val {
                null_val
            } else {
                lhs.$op(rhs)
            }
        }

        /// Only the right operand may be null
        #[inline(always)]
        #[must_use]
        pub fn $name_rhs(lhs: i64, rhs: i64, null_val: i64) -> i64 {
            if rhs == null_val {
                null_val
            } else {
                lhs.$op(rhs)
            }
        }
    };
}

int_arith_nullable!(add_i64_nullable, add_i64_nullable_lhs, add_i64_nullable_rhs, wrapping_add);
int_arith_nullable!(sub_i64_nullable, sub_i64_nullable_lhs, sub_i64_nullable_rhs, wrapping_sub);
int_arith_nullable!(mul_i64_nullable, mul_i64_nullable_lhs, mul_i64_nullable_rhs, wrapping_mul);

/// Division with null propagation. The divisor must be nonzero; generated
/// code guards zero divisors and records the error before calling.
#[inline(always)]
#[must_use]
pub fn div_i64_nullable(lhs: i64, rhs: i64, null_val: i64) -> i64 {
    if lhs == null_val || rhs == null_val {
        null_val
    } else {
        debug_assert!(rhs != 0, "unguarded zero divisor");
        lhs.wrapping_div(rhs)
    }
}

/// Modulus with null propagation, zero divisor guarded by generated code
#[inline(always)]
#[must_use]
pub fn mod_i64_nullable(lhs: i64, rhs: i64, null_val: i64) -> i64 {
    if lhs == null_val || rhs == null_val {
        null_val
    } else {
        debug_assert!(rhs != 0, "unguarded zero divisor");
        lhs.wrapping_rem(rhs)
    }
}

/// Division returning null on a zero divisor instead of an error
#[inline(always)]
#[must_use]
pub fn safe_div_i64(lhs: i64, rhs: i64, null_val: i64) -> i64 {
    if lhs == null_val || rhs == null_val || rhs == 0 {
        null_val
    } else {
        lhs.wrapping_div(rhs)
    }
}

// Checked forms backing the overflow error path of generated code

#[inline(always)]
#[must_use]
pub fn checked_add_i64(lhs: i64, rhs: i64) -> Option<i64> {
    lhs.checked_add(rhs)
}

#[inline(always)]
#[must_use]
pub fn checked_sub_i64(lhs: i64, rhs: i64) -> Option<i64> {
    lhs.checked_sub(rhs)
}

#[inline(always)]
#[must_use]
pub fn checked_mul_i64(lhs: i64, rhs: i64) -> Option<i64> {
    lhs.checked_mul(rhs)
}

macro_rules! int_cmp_nullable {
    ($name:ident, $name_lhs:ident, $name_rhs:ident, $op:tt) => {
        /// Comparison producing a boolean slot; null when either side is
        #[inline(always)]
        #[must_use]
        pub fn $name(lhs: i64, rhs: i64, null_val: i64) -> i64 {
            if lhs == null_val || rhs == null_val {
                NULL_BOOLEAN
            } else {
                (lhs $op rhs) as i64
            }
        }

        /// Comparison; only the left side may be null
        #[inline(always)]
        #[must_use]
        pub fn $name_lhs(lhs: i64, rhs: i64, null_val: i64) -> i64 {
            if lhs == null_val {
                NULL_BOOLEAN
            } else {
                (lhs $op rhs) as i64
            }
        }

        /// Comparison; only the right side may be null
        #[inline(always)]
        #[must_use]
        pub fn $name_rhs(lhs: i64, rhs: i64, null_val: i64) -> i64 {
            if rhs == null_val {
                NULL_BOOLEAN
            } else {
                (lhs $op rhs) as i64
            }
        }
    };
}

int_cmp_nullable!(eq_i64_nullable, eq_i64_nullable_lhs, eq_i64_nullable_rhs, ==);
int_cmp_nullable!(ne_i64_nullable, ne_i64_nullable_lhs, ne_i64_nullable_rhs, !=);
int_cmp_nullable!(lt_i64_nullable, lt_i64_nullable_lhs, lt_i64_nullable_rhs, <);
int_cmp_nullable!(le_i64_nullable, le_i64_nullable_lhs, le_i64_nullable_rhs, <=);
int_cmp_nullable!(gt_i64_nullable, gt_i64_nullable_lhs, gt_i64_nullable_rhs, >);
int_cmp_nullable!(ge_i64_nullable, ge_i64_nullable_lhs, ge_i64_nullable_rhs, >=);

macro_rules! fp_arith_nullable {
    ($name:ident, $name_lhs:ident, $name_rhs:ident, $op:tt) => {
        /// Floating-point op; both operands may be null
        #[inline(always)]
        #[must_use]
        pub fn $name(lhs: f64, rhs: f64, null_val: f64) -> f64 {
            if lhs == null_val || rhs == null_val {
                null_val
            } else {
                lhs $op rhs
            }
        }

        /// Floating-point op; only the left operand may be null
        #[inline(always)]
        #[must_use]
        pub fn $name_lhs(lhs: f64, rhs: f64, null_val: f64) -> f64 {
            if lhs == null_val {
                null_val
            } else {
                lhs $op rhs
            }
        }

        /// Floating-point op; only the right operand may be null
        #[inline(always)]
        #[must_use]
        pub fn $name_rhs(lhs: f64, rhs: f64, null_val: f64) -> f64 {
            if rhs == null_val {
                null_val
            } else {
                lhs $op rhs
            }
        }
    };
}

fp_arith_nullable!(add_double_nullable, add_double_nullable_lhs, add_double_nullable_rhs, +);
fp_arith_nullable!(sub_double_nullable, sub_double_nullable_lhs, sub_double_nullable_rhs, -);
fp_arith_nullable!(mul_double_nullable, mul_double_nullable_lhs, mul_double_nullable_rhs, *);

/// Floating-point division; zero divisor guarded by generated code
#[inline(always)]
#[must_use]
pub fn div_double_nullable(lhs: f64, rhs: f64, null_val: f64) -> f64 {
    if lhs == null_val || rhs == null_val {
        null_val
    } else {
        debug_assert!(rhs != 0.0, "unguarded zero divisor");
        lhs / rhs
    }
}

/// Safe infinite division: x/0 is +-inf for nonzero x, 0/0 is null
#[inline(always)]
#[must_use]
pub fn safe_inf_div_double(lhs: f64, rhs: f64, null_val: f64) -> f64 {
    if lhs == null_val || rhs == null_val {
        return null_val;
    }
    if rhs == 0.0 {
        if lhs == 0.0 {
            return null_val;
        }
        return if lhs > 0.0 {
            f64::INFINITY
        } else {
            f64::NEG_INFINITY
        };
    }
    lhs / rhs
}

macro_rules! fp_cmp_nullable {
    ($name:ident, $op:tt) => {
        /// Floating-point comparison producing a boolean slot
        #[inline(always)]
        #[must_use]
        pub fn $name(lhs: f64, rhs: f64, null_val: f64) -> i64 {
            if lhs == null_val || rhs == null_val {
                NULL_BOOLEAN
            } else {
                (lhs $op rhs) as i64
            }
        }
    };
}

fp_cmp_nullable!(eq_double_nullable, ==);
fp_cmp_nullable!(ne_double_nullable, !=);
fp_cmp_nullable!(lt_double_nullable, <);
fp_cmp_nullable!(le_double_nullable, <=);
fp_cmp_nullable!(gt_double_nullable, >);
fp_cmp_nullable!(ge_double_nullable, >=);

/// Three-valued AND over boolean slots
#[inline(always)]
#[must_use]
pub fn logical_and(lhs: i64, rhs: i64) -> i64 {
    // false dominates null
    if lhs == 0 || rhs == 0 {
        0
    } else if lhs == NULL_BOOLEAN || rhs == NULL_BOOLEAN {
        NULL_BOOLEAN
    } else {
        1
    }
}

/// Three-valued OR over boolean slots
#[inline(always)]
#[must_use]
pub fn logical_or(lhs: i64, rhs: i64) -> i64 {
    if lhs == 1 || rhs == 1 {
        1
    } else if lhs == NULL_BOOLEAN || rhs == NULL_BOOLEAN {
        NULL_BOOLEAN
    } else {
        0
    }
}

/// Three-valued NOT over a boolean slot
#[inline(always)]
#[must_use]
pub fn logical_not(value: i64) -> i64 {
    if value == NULL_BOOLEAN {
        NULL_BOOLEAN
    } else {
        (value == 0) as i64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::NULL_BIGINT;

    #[test]
    fn test_null_propagation_symmetric() {
        assert_eq!(add_i64_nullable(NULL_BIGINT, 1, NULL_BIGINT), NULL_BIGINT);
        assert_eq!(add_i64_nullable(1, NULL_BIGINT, NULL_BIGINT), NULL_BIGINT);
        assert_eq!(add_i64_nullable(2, 3, NULL_BIGINT), 5);
    }

    #[test]
    fn test_restricted_variants_only_check_named_side() {
        // rhs happens to hold the sentinel bit pattern but is declared
        // non-nullable, so the lhs variant computes through it
        assert_eq!(
            add_i64_nullable_lhs(2, NULL_BIGINT, NULL_BIGINT),
            2i64.wrapping_add(NULL_BIGINT)
        );
        assert_eq!(add_i64_nullable_rhs(NULL_BIGINT, 0, NULL_BIGINT), NULL_BIGINT);
    }

    #[test]
    fn test_comparison_null_result() {
        assert_eq!(lt_i64_nullable(NULL_BIGINT, 5, NULL_BIGINT), NULL_BOOLEAN);
        assert_eq!(lt_i64_nullable(3, 5, NULL_BIGINT), 1);
        assert_eq!(lt_i64_nullable(7, 5, NULL_BIGINT), 0);
    }

    #[test]
    fn test_safe_inf_div() {
        let null = f64::MIN;
        assert_eq!(safe_inf_div_double(1.0, 0.0, null), f64::INFINITY);
        assert_eq!(safe_inf_div_double(-1.0, 0.0, null), f64::NEG_INFINITY);
        assert_eq!(safe_inf_div_double(0.0, 0.0, null), null);
        assert_eq!(safe_inf_div_double(6.0, 3.0, null), 2.0);
    }

    #[test]
    fn test_three_valued_logic() {
        assert_eq!(logical_and(1, NULL_BOOLEAN), NULL_BOOLEAN);
        assert_eq!(logical_and(0, NULL_BOOLEAN), 0);
        assert_eq!(logical_or(1, NULL_BOOLEAN), 1);
        assert_eq!(logical_or(0, NULL_BOOLEAN), NULL_BOOLEAN);
        assert_eq!(logical_not(NULL_BOOLEAN), NULL_BOOLEAN);
        assert_eq!(logical_not(0), 1);
    }

    #[test]
    fn test_checked_overflow_detection() {
        assert_eq!(checked_add_i64(i64::MAX, 1), None);
        assert_eq!(checked_mul_i64(i64::MAX / 2, 3), None);
        assert_eq!(checked_sub_i64(5, 3), Some(2));
    }
}
