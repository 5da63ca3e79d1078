/*!
 * Buffer Pool Module
 * Three-tier paged allocator with LRU-style eviction and pinned views
 */

pub mod buffer;
pub mod manager;
pub mod slab;
pub mod types;

// Re-export public API
pub use buffer::PinnedBuffer;
pub use manager::{BufferMgr, BufferPool, ParentSource};
pub use slab::{Segment, Slab};
pub use types::{ChunkKey, ChunkPrefix, MemTier, PoolError, PoolResult, PoolStats, SegmentState};
