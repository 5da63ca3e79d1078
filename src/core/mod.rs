/*!
 * Core Module
 * Shared types, configuration, limits, and error aggregation
 */

pub mod config;
pub mod errors;
pub mod limits;
pub mod types;

// Re-export public API
pub use config::EngineConfig;
pub use errors::{EngineError, EngineResult};
pub use types::{
    fp_to_slot, inline_fp_null_value, inline_int_null_value, slot_null_value, slot_to_fp,
    ColumnId, Datum, DictId, FragmentId, TableId, TypeDesc, TypeKind, NULL_BIGINT, NULL_DOUBLE,
    NULL_FLOAT, NULL_INT, NULL_SMALLINT, NULL_TINYINT,
};
