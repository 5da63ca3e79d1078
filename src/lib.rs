/*!
 * Helios Engine
 *
 * Core of a heterogeneous analytical query execution engine: compiled
 * row functions over a runtime intrinsic library, a query memory
 * descriptor fixing output layout before codegen, a three-tier buffer
 * pool, join hash table builders, a per-device execution dispatcher,
 * and reducible typed result sets.
 */

pub mod codegen;
pub mod core;
pub mod engine;
pub mod exec;
pub mod ir;
pub mod join;
pub mod layout;
pub mod pool;
pub mod result;
pub mod runtime;
pub mod storage;

// Re-exports
pub use crate::core::{Datum, EngineConfig, EngineError, EngineResult, TypeDesc, TypeKind};
pub use engine::Engine;
pub use exec::{DeviceKind, DeviceMemoryInfo, ExecutionDispatcher, Watchdog};
pub use ir::{AggKind, BinOpKind, Expr, ExecutionUnit, SortInfo, TargetExpr};
pub use layout::{HashKind, QueryMemoryDescriptor};
pub use result::{ColumnarResults, ResultSet, TargetValue};
pub use storage::{ColumnBuffer, MemTableProvider, StringDictionary};
