/*!
 * Buffer Pool Types
 * Chunk identity, tiers, segment states, and pool errors
 */

use crate::core::types::{ColumnId, FragmentId, TableId};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Pool operation result
pub type PoolResult<T> = Result<T, PoolError>;

/// Identity of a column chunk: one column of one fragment of one table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ChunkKey {
    pub table: TableId,
    pub column: ColumnId,
    pub fragment: FragmentId,
}

impl ChunkKey {
    #[inline]
    #[must_use]
    pub const fn new(table: TableId, column: ColumnId, fragment: FragmentId) -> Self {
        Self {
            table,
            column,
            fragment,
        }
    }

    /// Whether this key falls under the given prefix
    #[inline]
    #[must_use]
    pub fn matches(&self, prefix: &ChunkPrefix) -> bool {
        self.table == prefix.table && prefix.column.map_or(true, |c| c == self.column)
    }
}

impl std::fmt::Display for ChunkKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}:{}", self.table, self.column, self.fragment)
    }
}

/// Prefix over chunk keys: a whole table, or one column of it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChunkPrefix {
    pub table: TableId,
    pub column: Option<ColumnId>,
}

impl ChunkPrefix {
    #[inline]
    #[must_use]
    pub const fn table(table: TableId) -> Self {
        Self {
            table,
            column: None,
        }
    }

    #[inline]
    #[must_use]
    pub const fn column(table: TableId, column: ColumnId) -> Self {
        Self {
            table,
            column: Some(column),
        }
    }
}

/// Memory tiers, ordered by distance from the device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemTier {
    Disk,
    Cpu,
    Gpu,
}

/// Segment occupancy state within a slab
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmentState {
    Free,
    Used,
}

/// Pool errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PoolError {
    #[error("Chunk {0} already exists in tier")]
    DuplicateKey(ChunkKey),

    #[error("Chunk {0} not found")]
    KeyNotFound(ChunkKey),

    #[error("Out of memory in {tier:?} tier: requested {requested_bytes} bytes")]
    OutOfMemory {
        tier: MemTier,
        requested_bytes: usize,
    },

    #[error("Zero-copy not supported by parent tier for chunk {0}")]
    ZeroCopyUnsupported(ChunkKey),

    #[error("Parent tier fetch failed for chunk {0}")]
    FetchFailed(ChunkKey),
}

/// Per-tier pool statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct PoolStats {
    pub num_slabs: usize,
    pub pages_used: usize,
    pub pages_free: usize,
    pub num_buffers: usize,
    pub evictions: u64,
}
