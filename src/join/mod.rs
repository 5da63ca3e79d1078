/*!
 * Join Module
 * Hash table layouts, the builder, and the build cache
 */

pub mod builder;
pub mod table;

// Re-export public API
pub use builder::{
    build_join_hash_table, build_many_to_many_hash_table, JoinCacheKey, JoinError,
    JoinHashTableCache, JoinResult,
};
pub use table::{HashTableLayout, JoinHashTable, ProbeResult};
