/*!
 * Decimal Intrinsics
 * Scale conversion and floor/ceil over i64 mantissas
 */

/// Scale a mantissa up by a power-of-ten factor, preserving the null
/// sentinel. Overflow surfaces as None for the generated error path.
#[inline(always)]
#[must_use]
pub fn scale_decimal_up(value: i64, scale_factor: i64, null_val: i64) -> Option<i64> {
    if value == null_val {
        return Some(null_val);
    }
    value.checked_mul(scale_factor)
}

/// Scale a mantissa down by a power-of-ten factor with half-away-from-zero
/// rounding, preserving the null sentinel.
#[inline(always)]
#[must_use]
pub fn scale_decimal_down(value: i64, scale_factor: i64, null_val: i64) -> i64 {
    debug_assert!(scale_factor > 0);
    if value == null_val {
        return null_val;
    }
    let half = scale_factor / 2;
    if value >= 0 {
        (value + half) / scale_factor
    } else {
        (value - half) / scale_factor
    }
}

/// Round a mantissa down to a multiple of `scale_factor` (toward -inf)
#[inline(always)]
#[must_use]
pub fn decimal_floor(value: i64, scale_factor: i64) -> i64 {
    debug_assert!(scale_factor > 0);
    if value >= 0 {
        (value / scale_factor) * scale_factor
    } else if value % scale_factor == 0 {
        value
    } else {
        (value / scale_factor - 1) * scale_factor
    }
}

/// Round a mantissa up to a multiple of `scale_factor` (toward +inf)
#[inline(always)]
#[must_use]
pub fn decimal_ceil(value: i64, scale_factor: i64) -> i64 {
    -decimal_floor(-value, scale_factor)
}
