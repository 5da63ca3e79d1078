/*!
 * Query Memory Descriptor
 *
 * The layout decision record for a query's output buffer. Chosen once
 * per execution unit, immutable thereafter; codegen, the kernels, and
 * result-set iteration all read the same descriptor.
 */

use super::distinct::CountDistinctDescriptor;
use crate::core::limits::EMPTY_KEY_64;
use crate::core::types::{slot_null_value, TypeDesc};
use crate::ir::agg::{AggKind, TargetExpr};
use std::hash::{Hash, Hasher};
use thiserror::Error;

/// Layout decision result
pub type LayoutResult<T> = Result<T, LayoutError>;

/// Layout decision errors, all recoverable before kernel launch
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LayoutError {
    #[error("Output entry count {entries} x row size {row_bytes} exceeds device cap of {cap_bytes} bytes")]
    TooManyEntries {
        entries: usize,
        row_bytes: usize,
        cap_bytes: usize,
    },

    #[error("Baseline group count exceeds {max_groups}; supply a cardinality hint")]
    CardinalityEstimationRequired { max_groups: usize },

    #[error("Unsupported plan shape: {0}")]
    UnsupportedPlan(String),
}

/// Output hash layout kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HashKind {
    /// Aggregates without group-by: a single output entry
    None,
    /// One output entry per input row
    Projection,
    /// Single dense integer group key, bucket-addressed
    PerfectHashOneCol,
    /// Multiple small dense keys, mixed-radix addressed
    PerfectHashMulti,
    /// Open-addressed linear probing for arbitrary keys
    BaselineHash,
}

/// Per-target metadata carried by the descriptor so result iteration and
/// reduction need nothing beyond the QMD.
#[derive(Debug, Clone, PartialEq)]
pub struct TargetInfo {
    pub agg: Option<AggKind>,
    /// Result type
    pub ty: TypeDesc,
    /// Aggregate operand type, when aggregated
    pub arg_ty: Option<TypeDesc>,
    pub is_count_star: bool,
}

impl TargetInfo {
    #[must_use]
    pub fn from_target(target: &TargetExpr) -> Self {
        Self {
            agg: target.agg,
            ty: target.ty,
            arg_ty: target.agg.map(|_| target.expr.type_desc()),
            is_count_star: target.is_count_star(),
        }
    }
}

/// Slot placement of one target within an entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TargetSlot {
    /// First aggregate slot (quad index within the entry's slot region)
    pub slot_idx: usize,
    /// Occupied slots: 2 for AVG, 1 otherwise
    pub slot_count: usize,
    /// Ordinal among count-distinct targets, for accumulator addressing
    pub distinct_ordinal: Option<usize>,
}

/// The descriptor itself. All slots are 8-byte quads; aggregate slots are
/// therefore always at least as wide as their operands, and the two-slot
/// AVG pair starts 8-byte aligned by construction.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryMemoryDescriptor {
    pub hash_kind: HashKind,
    pub key_count: usize,
    pub entry_count: usize,
    /// Perfect-hash key range and bucket size
    pub min_val: i64,
    pub max_val: i64,
    pub bucket: i64,
    /// Keys are not materialized; entry index alone identifies the group
    pub keyless: bool,
    /// Slot of the COUNT(*) target detecting occupancy in keyless layout
    pub keyless_count_slot: Option<usize>,
    /// Per-key ranges for the multi-column perfect hash (min, extent)
    pub multi_key_ranges: Vec<(i64, i64)>,
    pub output_columnar: bool,
    pub use_streaming_top_n: bool,
    pub targets: Vec<TargetInfo>,
    pub target_slots: Vec<TargetSlot>,
    /// Total aggregate slots per entry
    pub slot_count: usize,
    pub count_distinct_descriptors: Vec<Option<CountDistinctDescriptor>>,
    /// GPU model hints
    pub warp_count: usize,
    pub blocks_share_memory: bool,
}

impl QueryMemoryDescriptor {
    /// Lay out slots for the given targets. Shared by every hash kind.
    pub(crate) fn assign_slots(
        targets: &[TargetExpr],
        distinct: &[Option<CountDistinctDescriptor>],
    ) -> (Vec<TargetInfo>, Vec<TargetSlot>, usize) {
        let mut infos = Vec::with_capacity(targets.len());
        let mut slots = Vec::with_capacity(targets.len());
        let mut next_slot = 0usize;
        let mut next_distinct = 0usize;
        for (i, t) in targets.iter().enumerate() {
            let slot_count = t.agg.map_or(1, AggKind::slot_count);
            let distinct_ordinal = if distinct.get(i).copied().flatten().is_some() {
                let ord = next_distinct;
                next_distinct += 1;
                Some(ord)
            } else {
                None
            };
            infos.push(TargetInfo::from_target(t));
            slots.push(TargetSlot {
                slot_idx: next_slot,
                slot_count,
                distinct_ordinal,
            });
            next_slot += slot_count;
        }
        (infos, slots, next_slot)
    }

    /// Key quads materialized per entry
    #[inline]
    #[must_use]
    pub fn key_quads(&self) -> usize {
        if self.keyless {
            0
        } else {
            self.key_count
        }
    }

    /// Entry width in 8-byte quads
    #[inline]
    #[must_use]
    pub fn row_size_quad(&self) -> usize {
        self.key_quads() + self.slot_count
    }

    /// Entry width in bytes
    #[inline]
    #[must_use]
    pub fn row_size_bytes(&self) -> usize {
        self.row_size_quad() * 8
    }

    /// Total output buffer length in quads
    #[inline]
    #[must_use]
    pub fn total_quads(&self) -> usize {
        self.entry_count * self.row_size_quad()
    }

    /// Total output buffer size in bytes
    #[inline]
    #[must_use]
    pub fn output_buffer_bytes(&self) -> usize {
        self.total_quads() * 8
    }

    /// Byte offset of an aggregate slot within an entry (row-wise view)
    #[inline]
    #[must_use]
    pub fn slot_byte_offset(&self, slot: usize) -> usize {
        (self.key_quads() + slot) * 8
    }

    /// Buffer index of aggregate slot `slot` of entry `entry`
    #[inline]
    #[must_use]
    pub fn slot_index(&self, entry: usize, slot: usize) -> usize {
        if self.output_columnar {
            (self.key_quads() + slot) * self.entry_count + entry
        } else {
            entry * self.row_size_quad() + self.key_quads() + slot
        }
    }

    /// Buffer index of key quad `k` of entry `entry`
    #[inline]
    #[must_use]
    pub fn key_index(&self, entry: usize, k: usize) -> usize {
        debug_assert!(!self.keyless);
        if self.output_columnar {
            k * self.entry_count + entry
        } else {
            entry * self.row_size_quad() + k
        }
    }

    /// Initial value of a target's aggregate slots. AVG's sum and count
    /// slots share the additive identity, so one value per target
    /// suffices.
    #[must_use]
    pub fn slot_init_value(&self, target_idx: usize) -> i64 {
        let info = &self.targets[target_idx];
        match info.agg {
            None => 0,
            Some(AggKind::Count)
            | Some(AggKind::CountDistinct)
            | Some(AggKind::ApproxCountDistinct)
            | Some(AggKind::Avg) => 0,
            Some(AggKind::Sum) => {
                let arg = info.arg_ty.unwrap_or(info.ty);
                if arg.nullable {
                    slot_null_value(&info.ty)
                } else {
                    0
                }
            }
            Some(AggKind::Min)
            | Some(AggKind::Max)
            | Some(AggKind::Sample)
            | Some(AggKind::SingleValue) => slot_null_value(&info.ty),
        }
    }

    /// Typed "empty" initial contents for a kernel's output buffer
    #[must_use]
    pub fn init_states(&self) -> Vec<i64> {
        let mut buf = vec![0i64; self.total_quads()];
        for entry in 0..self.entry_count {
            if !self.keyless && self.key_count > 0 {
                for k in 0..self.key_count {
                    buf[self.key_index(entry, k)] = EMPTY_KEY_64;
                }
            }
            for (target_idx, slot) in self.target_slots.iter().enumerate() {
                for ordinal in 0..slot.slot_count {
                    buf[self.slot_index(entry, slot.slot_idx + ordinal)] =
                        self.slot_init_value(target_idx);
                }
            }
        }
        buf
    }

    /// Number of count-distinct targets
    #[must_use]
    pub fn distinct_target_count(&self) -> usize {
        self.count_distinct_descriptors
            .iter()
            .filter(|d| d.is_some())
            .count()
    }

    /// Check the buffer fits under a device allocation cap
    pub fn check_feasible(&self, cap_bytes: usize) -> LayoutResult<()> {
        if self.output_buffer_bytes() > cap_bytes {
            return Err(LayoutError::TooManyEntries {
                entries: self.entry_count,
                row_bytes: self.row_size_bytes(),
                cap_bytes,
            });
        }
        Ok(())
    }

    /// Structural hash for the compiled-kernel cache key
    #[must_use]
    pub fn structural_hash(&self) -> u64 {
        use std::hash::BuildHasher;
        let build = ahash::RandomState::with_seeds(
            0x517c_c1b7_2722_0a95,
            0x6c62_272e_07bb_0142,
            0x8422_2325_cbf2_9ce4,
            0x9ae1_6a3b_2f90_404f,
        );
        let mut state = build.build_hasher();
        std::mem::discriminant(&self.hash_kind).hash(&mut state);
        self.key_count.hash(&mut state);
        self.entry_count.hash(&mut state);
        self.min_val.hash(&mut state);
        self.max_val.hash(&mut state);
        self.bucket.hash(&mut state);
        self.keyless.hash(&mut state);
        self.multi_key_ranges.hash(&mut state);
        self.output_columnar.hash(&mut state);
        self.use_streaming_top_n.hash(&mut state);
        self.slot_count.hash(&mut state);
        self.target_slots.hash(&mut state);
        for t in &self.targets {
            t.agg.hash(&mut state);
            t.ty.hash(&mut state);
            t.arg_ty.hash(&mut state);
        }
        for d in &self.count_distinct_descriptors {
            match d {
                None => 0u8.hash(&mut state),
                Some(d) => {
                    1u8.hash(&mut state);
                    std::mem::discriminant(&d.impl_kind).hash(&mut state);
                    d.min_val.hash(&mut state);
                    d.max_val.hash(&mut state);
                    d.precision.hash(&mut state);
                }
            }
        }
        state.finish()
    }
}
