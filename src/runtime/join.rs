/*!
 * Join Probe Intrinsics
 *
 * Row-id lookups against the join hash table regions. Perfect tables are
 * addressed by key offset; baseline tables probe with MurmurHash-seeded
 * linear probing. `-1` is the miss value throughout.
 */

use super::hash::hash_i64;
use crate::core::limits::JOIN_EMPTY_SLOT;

/// Miss sentinel returned by all probe functions
pub const JOIN_MISS: i64 = -1;

/// Perfect OneToOne probe: the slot at `key - min_key` holds the inner
/// row id or the empty sentinel.
#[inline(always)]
#[must_use]
pub fn hash_join_idx(slots: &[i32], key: i64, min_key: i64, max_key: i64) -> i64 {
    if key < min_key || key > max_key {
        return JOIN_MISS;
    }
    let slot = slots[(key - min_key) as usize];
    if slot == JOIN_EMPTY_SLOT {
        JOIN_MISS
    } else {
        slot as i64
    }
}

/// Perfect OneToOne probe over bucket-normalized keys (temporal columns)
#[inline(always)]
#[must_use]
pub fn bucketized_hash_join_idx(
    slots: &[i32],
    key: i64,
    min_key: i64,
    max_key: i64,
    bucket: i64,
) -> i64 {
    if key < min_key || key > max_key {
        return JOIN_MISS;
    }
    let slot = slots[((key - min_key) / bucket) as usize];
    if slot == JOIN_EMPTY_SLOT {
        JOIN_MISS
    } else {
        slot as i64
    }
}

/// Row-id join: the key is the inner row id itself
#[inline(always)]
#[must_use]
pub fn rowid_hash_join_idx(key: i64, min_key: i64, max_key: i64) -> i64 {
    if key < min_key || key > max_key {
        JOIN_MISS
    } else {
        key - min_key
    }
}

/// Nullable perfect probe: the null sentinel is translated to a
/// configured key outside the valid range handling before lookup.
#[inline(always)]
#[must_use]
pub fn hash_join_idx_nullable(
    slots: &[i32],
    key: i64,
    min_key: i64,
    max_key: i64,
    null_val: i64,
    translated_null_key: i64,
) -> i64 {
    let key = if key == null_val {
        translated_null_key
    } else {
        key
    };
    hash_join_idx(slots, key, min_key, max_key)
}

/// Perfect OneToMany probe: returns (payload offset, match count), or
/// None on miss. Payload rows are contiguous per bucket.
#[inline]
#[must_use]
pub fn hash_join_idx_one_to_many(
    offsets: &[i32],
    counts: &[i32],
    key: i64,
    min_key: i64,
    max_key: i64,
) -> Option<(usize, usize)> {
    if key < min_key || key > max_key {
        return None;
    }
    let idx = (key - min_key) as usize;
    let count = counts[idx];
    if count == 0 {
        return None;
    }
    Some((offsets[idx] as usize, count as usize))
}

/// Baseline OneToOne probe: linear probing over an i64 key region with a
/// parallel i32 row-id region.
#[must_use]
pub fn baseline_hash_join_idx(
    keys: &[i64],
    rows: &[i32],
    key: i64,
    empty_key: i64,
) -> i64 {
    let entry_count = keys.len();
    if entry_count == 0 {
        return JOIN_MISS;
    }
    let start = (hash_i64(key, 0) % entry_count as u64) as usize;
    for probe in 0..entry_count {
        let entry = (start + probe) % entry_count;
        if keys[entry] == key {
            return rows[entry] as i64;
        }
        if keys[entry] == empty_key {
            return JOIN_MISS;
        }
    }
    JOIN_MISS
}

/// Baseline OneToMany probe: linear probing into per-entry
/// (offset, count) regions.
#[must_use]
pub fn baseline_hash_join_idx_one_to_many(
    keys: &[i64],
    offsets: &[i32],
    counts: &[i32],
    key: i64,
    empty_key: i64,
) -> Option<(usize, usize)> {
    let entry_count = keys.len();
    if entry_count == 0 {
        return None;
    }
    let start = (hash_i64(key, 0) % entry_count as u64) as usize;
    for probe in 0..entry_count {
        let entry = (start + probe) % entry_count;
        if keys[entry] == key {
            return Some((offsets[entry] as usize, counts[entry] as usize));
        }
        if keys[entry] == empty_key {
            return None;
        }
    }
    None
}

/// Insert a (key, row) pair into a baseline OneToOne region during build.
/// Returns false when the table is full or a duplicate key is present.
pub fn baseline_hash_join_insert(
    keys: &mut [i64],
    rows: &mut [i32],
    key: i64,
    row: i32,
    empty_key: i64,
) -> BaselineInsert {
    let entry_count = keys.len();
    let start = (hash_i64(key, 0) % entry_count as u64) as usize;
    for probe in 0..entry_count {
        let entry = (start + probe) % entry_count;
        if keys[entry] == empty_key {
            keys[entry] = key;
            rows[entry] = row;
            return BaselineInsert::Inserted(entry);
        }
        if keys[entry] == key {
            return BaselineInsert::Duplicate(entry);
        }
    }
    BaselineInsert::Full
}

/// Outcome of a baseline build insert
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BaselineInsert {
    Inserted(usize),
    Duplicate(usize),
    Full,
}
