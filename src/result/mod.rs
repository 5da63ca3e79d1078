/*!
 * Result Module
 * Result sets, multi-kernel reduction, terminal sort, columnar exchange
 */

pub mod exchange;
pub mod reduce;
pub mod result_set;
pub mod sort;

// Re-export public API
pub use exchange::{ColumnarColumn, ColumnarResults};
pub use reduce::{reduce_buffers, reduce_into, ReduceError};
pub use result_set::{ResultSet, TargetValue};
pub use sort::sort_result_set;
