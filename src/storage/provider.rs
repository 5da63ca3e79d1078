/*!
 * Storage Providers
 * External collaborator contracts plus the in-memory implementation
 */

use super::buffer::{ColumnBuffer, Encoding};
use super::dictionary::StringDictionary;
use super::fragment::{ChunkStats, ColumnFragment, TableFragments};
use crate::core::types::{ColumnId, Datum, DictId, TableId, TypeDesc};
use crate::pool::types::ChunkKey;
use crate::runtime::decode::{decode_double, decode_fixed_width_int, decode_float};
use ahash::RandomState;
use dashmap::DashMap;
use std::sync::Arc;
use tracing::debug;

/// Token handed out by a provider that supports wrapping its own memory
/// without a copy.
#[derive(Debug, Clone)]
pub struct ZeroCopyToken {
    pub bytes: Arc<[u8]>,
}

/// Schema catalog contract
pub trait SchemaProvider: Send + Sync {
    /// Declared type of a column
    fn column_type(&self, table: TableId, column: ColumnId) -> Option<TypeDesc>;

    /// Fragment metadata for a table
    fn table_fragments(&self, table: TableId) -> Option<Arc<TableFragments>>;

    /// Dictionary handle for dictionary-encoded text columns
    fn dictionary(&self, dict_id: DictId) -> Option<Arc<StringDictionary>>;
}

/// Chunk data contract
pub trait DataProvider: Send + Sync {
    /// Materialize the bytes of a chunk
    fn fetch(&self, key: &ChunkKey) -> Option<ColumnBuffer>;

    /// Wrap provider-owned memory without copying, when supported
    fn zero_copy(&self, key: &ChunkKey) -> Option<ZeroCopyToken> {
        let _ = key;
        None
    }
}

/// Compute min/max/null stats for a chunk by decoding it with the
/// column's type. Fragment ingestion uses this so tests and embedders
/// get predicate skipping without hand-written stats.
#[must_use]
pub fn compute_chunk_stats(buffer: &ColumnBuffer, ty: &TypeDesc) -> ChunkStats {
    let width = buffer.encoding().byte_width();
    let rows = buffer.row_count();
    if rows == 0 {
        return ChunkStats::unknown();
    }
    if ty.kind.is_fp() {
        let mut lo = f64::INFINITY;
        let mut hi = f64::NEG_INFINITY;
        let mut has_nulls = false;
        let null_val = ty.null_fp_value();
        for pos in 0..rows {
            let v = if width == 4 {
                decode_float(buffer.bytes(), pos) as f64
            } else {
                decode_double(buffer.bytes(), pos)
            };
            if v == null_val {
                has_nulls = true;
                continue;
            }
            lo = lo.min(v);
            hi = hi.max(v);
        }
        if lo > hi {
            return ChunkStats {
                min: Datum::Null,
                max: Datum::Null,
                has_nulls,
            };
        }
        ChunkStats {
            min: Datum::Double(lo),
            max: Datum::Double(hi),
            has_nulls,
        }
    } else {
        let mut lo = i64::MAX;
        let mut hi = i64::MIN;
        let mut has_nulls = false;
        let null_val = ty.null_slot_value();
        for pos in 0..rows {
            let v = decode_fixed_width_int(buffer.bytes(), width, pos);
            if v == null_val {
                has_nulls = true;
                continue;
            }
            lo = lo.min(v);
            hi = hi.max(v);
        }
        if lo > hi {
            return ChunkStats {
                min: Datum::Null,
                max: Datum::Null,
                has_nulls,
            };
        }
        ChunkStats {
            min: Datum::Int(lo),
            max: Datum::Int(hi),
            has_nulls,
        }
    }
}

/// In-memory schema + data provider backing tests and embedders that
/// hold their working set resident.
pub struct MemTableProvider {
    tables: DashMap<TableId, Arc<TableFragments>, RandomState>,
    chunks: DashMap<ChunkKey, ColumnBuffer, RandomState>,
    dictionaries: DashMap<DictId, Arc<StringDictionary>, RandomState>,
}

impl MemTableProvider {
    #[must_use]
    pub fn new() -> Self {
        Self {
            tables: DashMap::with_hasher(RandomState::new()),
            chunks: DashMap::with_hasher(RandomState::new()),
            dictionaries: DashMap::with_hasher(RandomState::new()),
        }
    }

    /// Register a table with its column types
    pub fn add_table(&self, table: TableId, column_types: Vec<TypeDesc>) {
        self.tables.insert(
            table,
            Arc::new(TableFragments::new(table, column_types, Vec::new())),
        );
    }

    /// Append a fragment of column chunks to a registered table. Stats
    /// are computed from the data; all chunks must agree on row count.
    pub fn add_fragment(&self, table: TableId, columns: Vec<ColumnBuffer>) {
        let mut entry = self
            .tables
            .get_mut(&table)
            .unwrap_or_else(|| panic!("table {table} not registered"));
        let frags = Arc::make_mut(entry.value_mut());
        let fragment_id = frags.fragments.len() as u32;
        let row_count = columns.first().map_or(0, ColumnBuffer::row_count);

        let stats = columns
            .iter()
            .zip(&frags.column_types)
            .map(|(buf, ty)| compute_chunk_stats(buf, ty))
            .collect();
        frags
            .fragments
            .push(ColumnFragment::new(fragment_id, row_count, stats));

        for (column, buf) in columns.into_iter().enumerate() {
            let key = ChunkKey::new(table, column as ColumnId, fragment_id);
            self.chunks.insert(key, buf);
        }
        debug!(table, fragment_id, row_count, "added fragment");
    }

    /// Register a dictionary handle
    pub fn add_dictionary(&self, dict: Arc<StringDictionary>) {
        self.dictionaries.insert(dict.dict_id(), dict);
    }
}

impl Default for MemTableProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl SchemaProvider for MemTableProvider {
    fn column_type(&self, table: TableId, column: ColumnId) -> Option<TypeDesc> {
        self.tables
            .get(&table)
            .and_then(|t| t.column_types.get(column as usize).copied())
    }

    fn table_fragments(&self, table: TableId) -> Option<Arc<TableFragments>> {
        self.tables.get(&table).map(|t| Arc::clone(t.value()))
    }

    fn dictionary(&self, dict_id: DictId) -> Option<Arc<StringDictionary>> {
        self.dictionaries.get(&dict_id).map(|d| Arc::clone(d.value()))
    }
}

impl DataProvider for MemTableProvider {
    fn fetch(&self, key: &ChunkKey) -> Option<ColumnBuffer> {
        self.chunks.get(key).map(|b| b.clone())
    }

    fn zero_copy(&self, key: &ChunkKey) -> Option<ZeroCopyToken> {
        self.chunks.get(key).map(|b| ZeroCopyToken {
            bytes: b.shared_bytes(),
        })
    }
}

/// Encoding for a declared column type
#[must_use]
pub fn encoding_for_type(ty: &TypeDesc) -> Encoding {
    match ty.dict_id {
        Some(dict_id) => Encoding::Dictionary {
            byte_width: 4,
            dict_id,
        },
        None => Encoding::FixedWidth {
            byte_width: ty.byte_width(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::{TypeKind, NULL_INT};

    #[test]
    fn test_stats_skip_null_sentinels() {
        let ty = TypeDesc::new(TypeKind::Int, true);
        let buf = ColumnBuffer::from_i64_slice(&[10, NULL_INT as i64, 20], 4);
        let stats = compute_chunk_stats(&buf, &ty);
        assert_eq!(stats.min, Datum::Int(10));
        assert_eq!(stats.max, Datum::Int(20));
        assert!(stats.has_nulls);
    }

    #[test]
    fn test_mem_provider_round_trip() {
        let provider = MemTableProvider::new();
        let ty = TypeDesc::new(TypeKind::BigInt, false);
        provider.add_table(1, vec![ty]);
        provider.add_fragment(1, vec![ColumnBuffer::from_i64_slice(&[1, 2, 3], 8)]);

        let frags = provider.table_fragments(1).unwrap();
        assert_eq!(frags.total_rows(), 3);
        assert_eq!(frags.column_int_range(0), Some((1, 3)));

        let chunk = provider.fetch(&ChunkKey::new(1, 0, 0)).unwrap();
        assert_eq!(chunk.row_count(), 3);
        assert!(provider.zero_copy(&ChunkKey::new(1, 0, 0)).is_some());
    }
}
