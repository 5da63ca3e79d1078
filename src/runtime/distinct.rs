/*!
 * Count-Distinct Intrinsics
 *
 * Exact bitmap counting for dense ranges, HyperLogLog sketches for wide
 * ones, and a set fallback. Callers route through the capability set
 * {add, size, merge} and never couple to a representation.
 */

use super::hash::hash_i64;
use ahash::RandomState;
use std::collections::HashSet;

/// Set a bit for `val` in a bitmap addressed by `val - min_val`
#[inline(always)]
pub fn agg_count_distinct_bitmap(bitmap: &mut [u64], val: i64, min_val: i64) {
    let bit = (val - min_val) as usize;
    debug_assert!(bit / 64 < bitmap.len(), "value outside bitmap range");
    bitmap[bit / 64] |= 1u64 << (bit % 64);
}

/// Update an HLL rank register table with a key. `b` is the precision:
/// the table has 2^b one-byte registers.
#[inline]
pub fn agg_approximate_count_distinct(registers: &mut [u8], key: i64, b: u8) {
    debug_assert_eq!(registers.len(), 1 << b);
    let h = hash_i64(key, 0);
    let idx = (h >> (64 - b)) as usize;
    let rest = h << b;
    let rank = if rest == 0 {
        (64 - b as u32) + 1
    } else {
        rest.leading_zeros() + 1
    } as u8;
    if registers[idx] < rank {
        registers[idx] = rank;
    }
}

/// HLL cardinality estimate with the standard small-range correction
#[must_use]
pub fn hll_estimate(registers: &[u8]) -> f64 {
    let m = registers.len() as f64;
    let alpha = match registers.len() {
        16 => 0.673,
        32 => 0.697,
        64 => 0.709,
        _ => 0.7213 / (1.0 + 1.079 / m),
    };
    let sum: f64 = registers.iter().map(|&r| 2f64.powi(-(r as i32))).sum();
    let raw = alpha * m * m / sum;
    if raw <= 2.5 * m {
        let zeros = registers.iter().filter(|&&r| r == 0).count();
        if zeros > 0 {
            return m * (m / zeros as f64).ln();
        }
    }
    raw
}

/// A count-distinct accumulator behind the {add, size, merge} capability
/// set. The representation is fixed by the layout decision and identical
/// across all partials of one target, so merge never sees a mismatch.
#[derive(Debug, Clone)]
pub enum CountDistinctSet {
    Bitmap { bits: Vec<u64>, min_val: i64 },
    Sketch { registers: Vec<u8>, b: u8 },
    StdSet { values: HashSet<i64, RandomState> },
}

impl CountDistinctSet {
    /// Bitmap over the closed range [min_val, max_val]
    #[must_use]
    pub fn bitmap(min_val: i64, max_val: i64) -> Self {
        let range = (max_val - min_val + 1) as usize;
        Self::Bitmap {
            bits: vec![0u64; (range + 63) / 64],
            min_val,
        }
    }

    /// HLL sketch with 2^b registers
    #[must_use]
    pub fn sketch(b: u8) -> Self {
        Self::Sketch {
            registers: vec![0u8; 1 << b],
            b,
        }
    }

    #[must_use]
    pub fn std_set() -> Self {
        Self::StdSet {
            values: HashSet::with_hasher(RandomState::new()),
        }
    }

    pub fn add(&mut self, val: i64) {
        match self {
            CountDistinctSet::Bitmap { bits, min_val } => {
                agg_count_distinct_bitmap(bits, val, *min_val);
            }
            CountDistinctSet::Sketch { registers, b } => {
                agg_approximate_count_distinct(registers, val, *b);
            }
            CountDistinctSet::StdSet { values } => {
                values.insert(val);
            }
        }
    }

    #[must_use]
    pub fn size(&self) -> i64 {
        match self {
            CountDistinctSet::Bitmap { bits, .. } => {
                bits.iter().map(|w| w.count_ones() as i64).sum()
            }
            CountDistinctSet::Sketch { registers, .. } => hll_estimate(registers).round() as i64,
            CountDistinctSet::StdSet { values } => values.len() as i64,
        }
    }

    /// Merge another partial of the same representation into this one
    pub fn merge(&mut self, other: &CountDistinctSet) {
        match (self, other) {
            (
                CountDistinctSet::Bitmap { bits, .. },
                CountDistinctSet::Bitmap { bits: other_bits, .. },
            ) => {
                for (w, o) in bits.iter_mut().zip(other_bits) {
                    *w |= o;
                }
            }
            (
                CountDistinctSet::Sketch { registers, .. },
                CountDistinctSet::Sketch {
                    registers: other_regs,
                    ..
                },
            ) => {
                for (r, o) in registers.iter_mut().zip(other_regs) {
                    *r = (*r).max(*o);
                }
            }
            (
                CountDistinctSet::StdSet { values },
                CountDistinctSet::StdSet {
                    values: other_values,
                },
            ) => {
                values.extend(other_values.iter().copied());
            }
            _ => unreachable!("count-distinct representation mismatch"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bitmap_exact_count() {
        let mut set = CountDistinctSet::bitmap(0, 127);
        for v in [1, 5, 5, 17, 126, 1] {
            set.add(v);
        }
        assert_eq!(set.size(), 4);
    }

    #[test]
    fn test_bitmap_merge_is_or() {
        let mut a = CountDistinctSet::bitmap(0, 63);
        let mut b = CountDistinctSet::bitmap(0, 63);
        a.add(1);
        a.add(2);
        b.add(2);
        b.add(3);
        a.merge(&b);
        assert_eq!(a.size(), 3);
    }

    #[test]
    fn test_sketch_accuracy_on_uniform_input() {
        let b = 12u8;
        let n = 10 * (1 << b) as i64;
        let mut set = CountDistinctSet::sketch(b);
        for v in 0..n {
            set.add(v);
        }
        let est = set.size() as f64;
        let err = (est - n as f64).abs() / n as f64;
        // standard error 1.04/sqrt(2^12) ~ 1.6%; allow 3 sigma
        assert!(err < 0.05, "relative error {err}");
    }

    #[test]
    fn test_sketch_merge_max_of_ranks() {
        let mut a = CountDistinctSet::sketch(8);
        let mut b = CountDistinctSet::sketch(8);
        for v in 0..500 {
            a.add(v);
        }
        for v in 250..750 {
            b.add(v);
        }
        let merged_separately = {
            let mut m = CountDistinctSet::sketch(8);
            for v in 0..750 {
                m.add(v);
            }
            m.size()
        };
        a.merge(&b);
        assert_eq!(a.size(), merged_separately);
    }

    #[test]
    fn test_std_set_union() {
        let mut a = CountDistinctSet::std_set();
        let mut b = CountDistinctSet::std_set();
        a.add(i64::MAX);
        b.add(i64::MIN + 1);
        b.add(i64::MAX);
        a.merge(&b);
        assert_eq!(a.size(), 2);
    }
}
