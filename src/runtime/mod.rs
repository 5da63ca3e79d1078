/*!
 * Runtime Intrinsic Library
 *
 * The flat function surface callable from generated row functions:
 * decoders, null-aware arithmetic, decimal scaling, aggregate updates,
 * count-distinct accumulators, group-value lookup, join probes, and
 * error-code recording. Signatures stay C-compatible; per-row calls
 * never allocate. The same contracts serve the CPU kernels and the
 * shared-memory GPU model.
 */

pub mod agg;
pub mod arith;
pub mod decimal;
pub mod decode;
pub mod distinct;
pub mod errors;
pub mod group;
pub mod hash;
pub mod join;

// Re-export the pieces the rest of the engine composes over
pub use distinct::CountDistinctSet;
pub use errors::{
    check_interrupt, error_message, record_error_code, set_interrupt, ERR_DIV_BY_ZERO,
    ERR_INTERRUPTED, ERR_NONE, ERR_OUT_OF_SLOTS, ERR_OVERFLOW, ERR_SINGLE_VALUE_MULTIPLE_VALUES,
};
pub use group::GroupLookup;
