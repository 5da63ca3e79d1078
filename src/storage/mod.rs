/*!
 * Storage Module
 * Columnar fragment views, buffers, dictionaries, and provider contracts
 */

pub mod buffer;
pub mod dictionary;
pub mod fragment;
pub mod provider;

// Re-export public API
pub use buffer::{ColumnBuffer, Encoding};
pub use dictionary::{DictionaryError, DictionaryResult, StringDictionary};
pub use fragment::{ChunkStats, ColumnFragment, TableFragments};
pub use provider::{
    compute_chunk_stats, encoding_for_type, DataProvider, MemTableProvider, SchemaProvider,
    ZeroCopyToken,
};
