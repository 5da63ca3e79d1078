/*!
 * Layout Module
 * Query memory descriptor: the single source of truth for output shape
 */

pub mod chooser;
pub mod descriptor;
pub mod distinct;
pub mod output;

// Re-export public API
pub use chooser::choose_query_memory_descriptor;
pub use descriptor::{
    HashKind, LayoutError, LayoutResult, QueryMemoryDescriptor, TargetInfo, TargetSlot,
};
pub use distinct::{CountDistinctDescriptor, CountDistinctImpl};
pub use output::OutputBuffer;
