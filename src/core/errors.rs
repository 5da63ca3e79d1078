/*!
 * Error Types
 * Top-level error aggregate over the per-subsystem error enums
 */

use thiserror::Error;

/// Common result type for whole-query operations
pub type EngineResult<T> = Result<T, EngineError>;

/// Aggregate error surfaced from query compilation and execution.
///
/// Per-row runtime failures never take this path; they travel as int32
/// codes in the kernel error-code buffer and are converted by the
/// dispatcher after the kernel completes.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error(transparent)]
    Layout(#[from] crate::layout::LayoutError),

    #[error(transparent)]
    Codegen(#[from] crate::codegen::CodegenError),

    #[error(transparent)]
    Join(#[from] crate::join::JoinError),

    #[error(transparent)]
    Pool(#[from] crate::pool::PoolError),

    #[error(transparent)]
    Exec(#[from] crate::exec::ExecError),

    #[error(transparent)]
    Dictionary(#[from] crate::storage::DictionaryError),
}
