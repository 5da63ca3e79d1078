/*!
 * IR Module
 * Expression trees, aggregate targets, and the normalized execution unit
 */

pub mod agg;
pub mod expr;
pub mod unit;

// Re-export public API
pub use agg::{AggKind, TargetExpr};
pub use expr::{BinOpKind, Expr, UnaryOpKind};
pub use unit::{ExecutionUnit, InputDesc, JoinCondition, JoinType, OrderEntry, SortInfo};
