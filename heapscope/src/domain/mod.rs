//! Domain model for heapscope
//!
//! The data types themselves live in `heapscope-common` so capture producers
//! can depend on them without pulling in the engine. This module re-exports
//! them next to the engine's structured errors.

pub mod errors;

// Re-export common types for convenience
pub use heapscope_common::{
    find_library, AllocationRecord, AllocationSnapshot, LibraryMapping, RawAddress,
    ResolvedBacktrace, ResolvedFrame, SessionId,
};

pub use errors::{CaptureError, ConfigError, SymbolizeError};
