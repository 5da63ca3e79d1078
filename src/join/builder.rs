/*!
 * Join Hash Table Builder
 *
 * Builds perfect and baseline tables from a decoded inner column.
 * Perfect hashing is chosen for dense key ranges; OneToMany regions are
 * produced by counting per bucket, prefix-summing into offsets, then
 * scattering row ids into the payload.
 */

use super::table::{
    empty_slots, HashTableLayout, JoinHashTable, BASELINE_EMPTY_KEY, TRANSLATED_NULL_KEY,
};
use crate::core::limits::{JOIN_EMPTY_SLOT, MAX_HASH_ENTRIES};
use crate::pool::types::ChunkKey;
use crate::runtime::join::{baseline_hash_join_insert, BaselineInsert};
use ahash::RandomState;
use dashmap::DashMap;
use parking_lot::Mutex;
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

/// Join build result
pub type JoinResult<T> = Result<T, JoinError>;

/// Join build failures, all surfaced before kernel launch
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum JoinError {
    #[error("Join hash table would need {0} entries")]
    TooManyHashEntries(usize),

    #[error("OneToOne layout requested but inner keys have duplicates")]
    NeedsOneToManyHash,

    #[error("Failed to fetch inner column chunk {0}")]
    FailedToFetchColumn(ChunkKey),
}

/// A key range is dense enough for perfect hashing when its extent does
/// not dwarf the inner row count.
fn range_is_dense(extent: usize, rows: usize) -> bool {
    extent <= (rows * 2).max(1024)
}

/// Build a join hash table over the decoded inner column.
///
/// `null_val` is the inner column's null sentinel; null keys are
/// translated to a reserved key just past the valid range. Requesting
/// OneToOne against duplicated keys fails with `NeedsOneToManyHash` so
/// the caller can retry with the wider layout.
pub fn build_join_hash_table(
    inner_values: &[i64],
    null_val: Option<i64>,
    layout: HashTableLayout,
) -> JoinResult<JoinHashTable> {
    if inner_values.len() > MAX_HASH_ENTRIES {
        return Err(JoinError::TooManyHashEntries(inner_values.len()));
    }

    // Translate nulls and find the valid key range
    let mut min_key = i64::MAX;
    let mut max_key = i64::MIN;
    let mut has_nulls = false;
    for &v in inner_values {
        if Some(v) == null_val {
            has_nulls = true;
            continue;
        }
        min_key = min_key.min(v);
        max_key = max_key.max(v);
    }
    if min_key > max_key {
        // all-null or empty inner side
        min_key = 0;
        max_key = -1;
    }

    let extent = max_key.wrapping_sub(min_key).wrapping_add(1).max(0) as usize;
    // one extra bucket holds translated nulls
    let perfect_entries = extent + has_nulls as usize;
    let null_key = has_nulls.then(|| max_key + 1);

    let perfect = extent <= MAX_HASH_ENTRIES && range_is_dense(extent, inner_values.len());
    debug!(
        rows = inner_values.len(),
        extent,
        perfect,
        ?layout,
        "building join hash table"
    );

    let translate = |v: i64| -> Option<i64> {
        if Some(v) == null_val {
            null_key
        } else {
            Some(v)
        }
    };

    match (perfect, layout) {
        (true, HashTableLayout::OneToOne) => {
            let mut slots = empty_slots(perfect_entries);
            for (row, &v) in inner_values.iter().enumerate() {
                let Some(key) = translate(v) else { continue };
                let idx = (key - min_key) as usize;
                if slots[idx] != JOIN_EMPTY_SLOT {
                    return Err(JoinError::NeedsOneToManyHash);
                }
                slots[idx] = row as i32;
            }
            Ok(JoinHashTable::PerfectOneToOne {
                slots,
                min_key,
                max_key: max_key + has_nulls as i64,
                null_key,
            })
        }
        (true, _) => {
            // count, exclusive prefix sum, scatter
            let mut counts = vec![0i32; perfect_entries];
            for &v in inner_values {
                let Some(key) = translate(v) else { continue };
                counts[(key - min_key) as usize] += 1;
            }
            let mut offsets = vec![0i32; perfect_entries];
            let mut running = 0i32;
            for (i, &c) in counts.iter().enumerate() {
                offsets[i] = running;
                running += c;
            }
            let mut payload = vec![0i32; running as usize];
            let mut cursor = offsets.clone();
            for (row, &v) in inner_values.iter().enumerate() {
                let Some(key) = translate(v) else { continue };
                let idx = (key - min_key) as usize;
                payload[cursor[idx] as usize] = row as i32;
                cursor[idx] += 1;
            }
            Ok(JoinHashTable::PerfectOneToMany {
                offsets,
                counts,
                payload,
                min_key,
                max_key: max_key + has_nulls as i64,
                null_key,
                layout,
            })
        }
        (false, HashTableLayout::OneToOne) => {
            let entry_count = (inner_values.len() * 2).max(16);
            let mut keys = vec![BASELINE_EMPTY_KEY; entry_count];
            let mut rows = vec![0i32; entry_count];
            for (row, &v) in inner_values.iter().enumerate() {
                let key = if Some(v) == null_val {
                    TRANSLATED_NULL_KEY
                } else {
                    v
                };
                match baseline_hash_join_insert(
                    &mut keys,
                    &mut rows,
                    key,
                    row as i32,
                    BASELINE_EMPTY_KEY,
                ) {
                    BaselineInsert::Inserted(_) => {}
                    BaselineInsert::Duplicate(_) => return Err(JoinError::NeedsOneToManyHash),
                    BaselineInsert::Full => {
                        return Err(JoinError::TooManyHashEntries(entry_count))
                    }
                }
            }
            Ok(JoinHashTable::BaselineOneToOne { keys, rows })
        }
        (false, _) => build_baseline_one_to_many(
            inner_values
                .iter()
                .enumerate()
                .map(|(row, &v)| {
                    let key = if Some(v) == null_val {
                        TRANSLATED_NULL_KEY
                    } else {
                        v
                    };
                    (key, row as i32)
                })
                .collect(),
            layout,
        ),
    }
}

/// Build a ManyToMany table from explicit (key, row) pairs, where one
/// inner row may appear under several keys (array membership joins).
pub fn build_many_to_many_hash_table(pairs: Vec<(i64, i32)>) -> JoinResult<JoinHashTable> {
    build_baseline_one_to_many(pairs, HashTableLayout::ManyToMany)
}

fn build_baseline_one_to_many(
    pairs: Vec<(i64, i32)>,
    layout: HashTableLayout,
) -> JoinResult<JoinHashTable> {
    if pairs.len() > MAX_HASH_ENTRIES {
        return Err(JoinError::TooManyHashEntries(pairs.len()));
    }
    let entry_count = (pairs.len() * 2).max(16);
    let mut keys = vec![BASELINE_EMPTY_KEY; entry_count];
    // first pass assigns each distinct key an entry and counts its rows
    let mut counts = vec![0i32; entry_count];
    let mut entry_rows = vec![0i32; entry_count];
    let mut entry_of_pair = Vec::with_capacity(pairs.len());
    for &(key, _) in &pairs {
        let entry = match baseline_hash_join_insert(
            &mut keys,
            &mut entry_rows,
            key,
            0,
            BASELINE_EMPTY_KEY,
        ) {
            BaselineInsert::Inserted(e) | BaselineInsert::Duplicate(e) => e,
            BaselineInsert::Full => return Err(JoinError::TooManyHashEntries(entry_count)),
        };
        counts[entry] += 1;
        entry_of_pair.push(entry);
    }
    // exclusive prefix sum into offsets, then scatter
    let mut offsets = vec![0i32; entry_count];
    let mut running = 0i32;
    for (i, &c) in counts.iter().enumerate() {
        offsets[i] = running;
        running += c;
    }
    let mut payload = vec![0i32; running as usize];
    let mut cursor = offsets.clone();
    for (&(_, row), &entry) in pairs.iter().zip(&entry_of_pair) {
        payload[cursor[entry] as usize] = row;
        cursor[entry] += 1;
    }
    Ok(JoinHashTable::BaselineOneToMany {
        keys,
        offsets,
        counts,
        payload,
        layout,
    })
}

/// Cache key for built join tables
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct JoinCacheKey {
    pub table: u32,
    pub column: u32,
    pub layout: HashTableLayout,
}

/// Cache of built join hash tables with one build mutex per slot, so
/// concurrent queries share a single build.
pub struct JoinHashTableCache {
    tables: DashMap<JoinCacheKey, Arc<JoinHashTable>, RandomState>,
    build_locks: DashMap<JoinCacheKey, Arc<Mutex<()>>, RandomState>,
}

impl JoinHashTableCache {
    #[must_use]
    pub fn new() -> Self {
        Self {
            tables: DashMap::with_hasher(RandomState::new()),
            build_locks: DashMap::with_hasher(RandomState::new()),
        }
    }

    /// Get the cached table or build it under the key's build mutex
    pub fn get_or_build<F>(&self, key: JoinCacheKey, build: F) -> JoinResult<Arc<JoinHashTable>>
    where
        F: FnOnce() -> JoinResult<JoinHashTable>,
    {
        if let Some(table) = self.tables.get(&key) {
            return Ok(Arc::clone(table.value()));
        }
        let lock = {
            let entry = self
                .build_locks
                .entry(key)
                .or_insert_with(|| Arc::new(Mutex::new(())));
            Arc::clone(entry.value())
        };
        let _guard = lock.lock();
        // a concurrent builder may have finished while we waited
        if let Some(table) = self.tables.get(&key) {
            return Ok(Arc::clone(table.value()));
        }
        let table = Arc::new(build()?);
        self.tables.insert(key, Arc::clone(&table));
        Ok(table)
    }

    pub fn clear(&self) {
        self.tables.clear();
        self.build_locks.clear();
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.tables.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }
}

impl Default for JoinHashTableCache {
    fn default() -> Self {
        Self::new()
    }
}
