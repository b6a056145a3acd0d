//! Background work
//!
//! - Cooperative-cancellation task primitive
//! - Backtrace resolution through the shared cache
//! - Snapshot symbolication with paged progress
//! - Chunked paging of a library's records

pub mod background_task;
pub mod library_pager;
pub mod stack_resolver;
pub mod symbolication;

// Re-export common types
pub use background_task::{BackgroundTask, StopToken, TaskOutcome, TaskState};
pub use library_pager::LibraryPager;
pub use stack_resolver::StackResolver;
pub use symbolication::{
    resolve_snapshot, PipelineEvent, SymbolicationPipeline, SymbolicationSession, PAGE_SIZE,
};
