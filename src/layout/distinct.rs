/*!
 * Count-Distinct Descriptors
 * Representation decision per COUNT DISTINCT target, fixed before codegen
 */

use crate::core::limits;
use crate::runtime::CountDistinctSet;
use serde::{Deserialize, Serialize};

/// Chosen representation for one count-distinct target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CountDistinctImpl {
    /// One bit per potential value in `[min_val, max_val]`
    Bitmap,
    /// HyperLogLog rank registers
    Sketch,
    /// Exact hash set fallback
    StdSet,
}

/// Immutable descriptor driving both the kernel-side accumulator
/// allocation and the reduction operator for one target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct CountDistinctDescriptor {
    pub impl_kind: CountDistinctImpl,
    pub min_val: i64,
    pub max_val: i64,
    /// HLL precision, for the Sketch representation
    pub precision: u8,
}

impl CountDistinctDescriptor {
    /// Decide the representation from the argument column's value range.
    /// The rule is a pure min/max heuristic: a dense-enough range gets an
    /// exact bitmap; otherwise approximate targets get a sketch and exact
    /// ones fall back to a set.
    #[must_use]
    pub fn choose(int_range: Option<(i64, i64)>, approximate: bool) -> Self {
        if let Some((min_val, max_val)) = int_range {
            let range = max_val.saturating_sub(min_val).saturating_add(1);
            if range > 0 && range <= limits::COUNT_DISTINCT_BITMAP_MAX_RANGE {
                return Self {
                    impl_kind: CountDistinctImpl::Bitmap,
                    min_val,
                    max_val,
                    precision: limits::HLL_PRECISION_DEFAULT,
                };
            }
        }
        Self {
            impl_kind: if approximate {
                CountDistinctImpl::Sketch
            } else {
                CountDistinctImpl::StdSet
            },
            min_val: 0,
            max_val: 0,
            precision: limits::HLL_PRECISION_DEFAULT,
        }
    }

    /// Allocate an empty accumulator of the described representation
    #[must_use]
    pub fn make_set(&self) -> CountDistinctSet {
        match self.impl_kind {
            CountDistinctImpl::Bitmap => CountDistinctSet::bitmap(self.min_val, self.max_val),
            CountDistinctImpl::Sketch => CountDistinctSet::sketch(self.precision),
            CountDistinctImpl::StdSet => CountDistinctSet::std_set(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dense_range_picks_bitmap() {
        let d = CountDistinctDescriptor::choose(Some((0, 1000)), false);
        assert_eq!(d.impl_kind, CountDistinctImpl::Bitmap);
    }

    #[test]
    fn test_wide_range_splits_by_exactness() {
        let wide = Some((0, limits::COUNT_DISTINCT_BITMAP_MAX_RANGE + 1));
        assert_eq!(
            CountDistinctDescriptor::choose(wide, true).impl_kind,
            CountDistinctImpl::Sketch
        );
        assert_eq!(
            CountDistinctDescriptor::choose(wide, false).impl_kind,
            CountDistinctImpl::StdSet
        );
    }

    #[test]
    fn test_unknown_range_never_bitmaps() {
        assert_ne!(
            CountDistinctDescriptor::choose(None, false).impl_kind,
            CountDistinctImpl::Bitmap
        );
    }
}
