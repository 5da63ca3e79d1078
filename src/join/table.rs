/*!
 * Join Hash Tables
 * Built table layouts and the probe surface used by row functions
 */

use crate::core::limits::JOIN_EMPTY_SLOT;
use crate::runtime::join::{
    baseline_hash_join_idx, baseline_hash_join_idx_one_to_many, hash_join_idx,
    hash_join_idx_one_to_many, JOIN_MISS,
};

/// Reserved key the empty baseline slot holds
pub const BASELINE_EMPTY_KEY: i64 = i64::MAX;

/// Reserved key null inner values are translated to
pub const TRANSLATED_NULL_KEY: i64 = i64::MAX - 1;

/// Requested / built table layouts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HashTableLayout {
    /// Unique inner keys: slot holds the inner row id
    OneToOne,
    /// Duplicate inner keys: offsets/counts/payload regions
    OneToMany,
    /// Both sides duplicated (composite membership keys)
    ManyToMany,
}

/// Result of probing one outer key
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeResult {
    Miss,
    /// Single matching inner row id
    Row(i64),
    /// Contiguous payload range of matching inner row ids
    Range { offset: usize, count: usize },
}

/// A built join hash table. Perfect variants are addressed by key
/// offset; baseline variants probe with seeded linear probing.
#[derive(Debug, Clone)]
pub enum JoinHashTable {
    PerfectOneToOne {
        slots: Vec<i32>,
        min_key: i64,
        max_key: i64,
        /// Key null inner values were stored under, when nullable
        null_key: Option<i64>,
    },
    PerfectOneToMany {
        offsets: Vec<i32>,
        counts: Vec<i32>,
        payload: Vec<i32>,
        min_key: i64,
        max_key: i64,
        null_key: Option<i64>,
        layout: HashTableLayout,
    },
    BaselineOneToOne {
        keys: Vec<i64>,
        rows: Vec<i32>,
    },
    BaselineOneToMany {
        keys: Vec<i64>,
        offsets: Vec<i32>,
        counts: Vec<i32>,
        payload: Vec<i32>,
        layout: HashTableLayout,
    },
}

impl JoinHashTable {
    #[must_use]
    pub fn layout(&self) -> HashTableLayout {
        match self {
            JoinHashTable::PerfectOneToOne { .. } | JoinHashTable::BaselineOneToOne { .. } => {
                HashTableLayout::OneToOne
            }
            JoinHashTable::PerfectOneToMany { layout, .. }
            | JoinHashTable::BaselineOneToMany { layout, .. } => *layout,
        }
    }

    /// Probe with an outer key already in the slot domain. A null outer
    /// key (the caller passes its translated form) matches null inner
    /// keys only when the table stored them.
    #[must_use]
    pub fn probe(&self, key: i64) -> ProbeResult {
        match self {
            JoinHashTable::PerfectOneToOne {
                slots,
                min_key,
                max_key,
                ..
            } => {
                let row = hash_join_idx(slots, key, *min_key, *max_key);
                if row == JOIN_MISS {
                    ProbeResult::Miss
                } else {
                    ProbeResult::Row(row)
                }
            }
            JoinHashTable::PerfectOneToMany {
                offsets,
                counts,
                min_key,
                max_key,
                ..
            } => match hash_join_idx_one_to_many(offsets, counts, key, *min_key, *max_key) {
                None => ProbeResult::Miss,
                Some((offset, count)) => ProbeResult::Range { offset, count },
            },
            JoinHashTable::BaselineOneToOne { keys, rows } => {
                let row = baseline_hash_join_idx(keys, rows, key, BASELINE_EMPTY_KEY);
                if row == JOIN_MISS {
                    ProbeResult::Miss
                } else {
                    ProbeResult::Row(row)
                }
            }
            JoinHashTable::BaselineOneToMany {
                keys,
                offsets,
                counts,
                ..
            } => match baseline_hash_join_idx_one_to_many(
                keys,
                offsets,
                counts,
                key,
                BASELINE_EMPTY_KEY,
            ) {
                None => ProbeResult::Miss,
                Some((offset, count)) => ProbeResult::Range { offset, count },
            },
        }
    }

    /// Translate an outer key, mapping the null sentinel to the table's
    /// stored null key (or a guaranteed miss when none was stored).
    #[inline]
    #[must_use]
    pub fn translate_key(&self, key: i64, null_val: i64) -> i64 {
        if key != null_val {
            return key;
        }
        match self {
            JoinHashTable::PerfectOneToOne { null_key, .. }
            | JoinHashTable::PerfectOneToMany { null_key, .. } => {
                null_key.unwrap_or(TRANSLATED_NULL_KEY)
            }
            _ => TRANSLATED_NULL_KEY,
        }
    }

    /// Inner row id at a payload position, for Range probe results
    #[inline]
    #[must_use]
    pub fn payload_row(&self, pos: usize) -> i64 {
        match self {
            JoinHashTable::PerfectOneToMany { payload, .. }
            | JoinHashTable::BaselineOneToMany { payload, .. } => payload[pos] as i64,
            _ => JOIN_MISS,
        }
    }

    /// Resident size of the table's regions
    #[must_use]
    pub fn size_bytes(&self) -> usize {
        match self {
            JoinHashTable::PerfectOneToOne { slots, .. } => slots.len() * 4,
            JoinHashTable::PerfectOneToMany {
                offsets,
                counts,
                payload,
                ..
            } => (offsets.len() + counts.len() + payload.len()) * 4,
            JoinHashTable::BaselineOneToOne { keys, rows } => keys.len() * 8 + rows.len() * 4,
            JoinHashTable::BaselineOneToMany {
                keys,
                offsets,
                counts,
                payload,
                ..
            } => keys.len() * 8 + (offsets.len() + counts.len() + payload.len()) * 4,
        }
    }

    /// Number of addressable key slots
    #[must_use]
    pub fn entry_count(&self) -> usize {
        match self {
            JoinHashTable::PerfectOneToOne { slots, .. } => slots.len(),
            JoinHashTable::PerfectOneToMany { counts, .. } => counts.len(),
            JoinHashTable::BaselineOneToOne { keys, .. }
            | JoinHashTable::BaselineOneToMany { keys, .. } => keys.len(),
        }
    }
}

/// An empty perfect OneToOne slot region
#[must_use]
pub fn empty_slots(entry_count: usize) -> Vec<i32> {
    vec![JOIN_EMPTY_SLOT; entry_count]
}
