/*!
 * Column Fragments
 * Horizontal table slices with per-column statistics
 */

use crate::core::types::{ColumnId, Datum, FragmentId, TableId, TypeDesc};
use crate::pool::types::ChunkKey;

/// Per-chunk min/max statistics, used for predicate skipping and
/// perfect-hash range decisions.
#[derive(Debug, Clone, PartialEq)]
pub struct ChunkStats {
    pub min: Datum,
    pub max: Datum,
    pub has_nulls: bool,
}

impl ChunkStats {
    /// Stats carrying no pruning information
    #[must_use]
    pub fn unknown() -> Self {
        Self {
            min: Datum::Null,
            max: Datum::Null,
            has_nulls: true,
        }
    }

    /// Integer min/max as i64, when known
    #[must_use]
    pub fn int_range(&self) -> Option<(i64, i64)> {
        match (&self.min, &self.max) {
            (Datum::Int(lo), Datum::Int(hi)) => Some((*lo, *hi)),
            _ => None,
        }
    }
}

/// A horizontal slice of one table. Immutable for a query's lifetime;
/// queries hold pinned views of its chunks through the buffer pool.
#[derive(Debug, Clone)]
pub struct ColumnFragment {
    pub id: FragmentId,
    pub row_count: usize,
    /// Per-column stats, indexed by column id
    pub stats: Vec<ChunkStats>,
}

impl ColumnFragment {
    #[must_use]
    pub fn new(id: FragmentId, row_count: usize, stats: Vec<ChunkStats>) -> Self {
        Self {
            id,
            row_count,
            stats,
        }
    }

    #[inline]
    #[must_use]
    pub fn chunk_key(&self, table: TableId, column: ColumnId) -> ChunkKey {
        ChunkKey::new(table, column, self.id)
    }

    #[inline]
    #[must_use]
    pub fn column_stats(&self, column: ColumnId) -> Option<&ChunkStats> {
        self.stats.get(column as usize)
    }
}

/// All fragments of one table, plus its column types
#[derive(Debug, Clone)]
pub struct TableFragments {
    pub table: TableId,
    pub column_types: Vec<TypeDesc>,
    pub fragments: Vec<ColumnFragment>,
}

impl TableFragments {
    #[must_use]
    pub fn new(table: TableId, column_types: Vec<TypeDesc>, fragments: Vec<ColumnFragment>) -> Self {
        Self {
            table,
            column_types,
            fragments,
        }
    }

    #[inline]
    #[must_use]
    pub fn total_rows(&self) -> usize {
        self.fragments.iter().map(|f| f.row_count).sum()
    }

    /// Table-wide integer range of a column, merged over fragment stats.
    /// None when any fragment lacks stats for it.
    #[must_use]
    pub fn column_int_range(&self, column: ColumnId) -> Option<(i64, i64)> {
        let mut merged: Option<(i64, i64)> = None;
        for frag in &self.fragments {
            let (lo, hi) = frag.column_stats(column)?.int_range()?;
            merged = Some(match merged {
                Some((mlo, mhi)) => (mlo.min(lo), mhi.max(hi)),
                None => (lo, hi),
            });
        }
        merged
    }

    /// Whether any fragment reports nulls in the column
    #[must_use]
    pub fn column_has_nulls(&self, column: ColumnId) -> bool {
        self.fragments.iter().any(|f| {
            f.column_stats(column).map_or(true, |s| s.has_nulls)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stats(lo: i64, hi: i64, nulls: bool) -> ChunkStats {
        ChunkStats {
            min: Datum::Int(lo),
            max: Datum::Int(hi),
            has_nulls: nulls,
        }
    }

    #[test]
    fn test_merged_int_range() {
        let frags = TableFragments::new(
            1,
            vec![],
            vec![
                ColumnFragment::new(0, 10, vec![stats(5, 9, false)]),
                ColumnFragment::new(1, 10, vec![stats(1, 7, false)]),
            ],
        );
        assert_eq!(frags.column_int_range(0), Some((1, 9)));
        assert!(!frags.column_has_nulls(0));
        assert_eq!(frags.total_rows(), 20);
    }

    #[test]
    fn test_missing_stats_poison_range() {
        let frags = TableFragments::new(
            1,
            vec![],
            vec![
                ColumnFragment::new(0, 10, vec![stats(5, 9, false)]),
                ColumnFragment::new(1, 10, vec![ChunkStats::unknown()]),
            ],
        );
        assert_eq!(frags.column_int_range(0), None);
        assert!(frags.column_has_nulls(0));
    }
}
