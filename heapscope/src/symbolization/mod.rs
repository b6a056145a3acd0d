//! # Symbol Resolution and Address Translation
//!
//! This module converts raw return addresses captured in native allocation
//! backtraces into method names, source files and line numbers.
//!
//! ## Address Translation Flow
//!
//! ```text
//! 1. Allocation backtrace captured on the device
//!    Raw addresses: [0x40011a2c, 0x4000b120, ...]
//!
//! 2. Library mappings reported by the device bridge
//!    /system/lib/libfoo.so: 0x40010000 - 0x40020000
//!
//! 3. Find the owning library (linear scan, first match wins)
//!    0x40011a2c is inside libfoo.so
//!
//! 4. Compute the library-relative offset
//!    offset = 0x40011a2c - 0x40010000 = 0x1a2c
//!
//! 5. Ask libfoo.so's symbolizer subprocess
//!    "00001a2c\n" → "Foo::alloc()\n" "foo.cpp:42\n"
//!
//! 6. Cache the frame for the rest of the session
//! ```
//!
//! ## Module Structure
//!
//! - **`process_pool`**: One long-running `addr2line` subprocess per library
//! - **`resolution_cache`**: Address → frame cache with degraded fallback
//! - **`memory_maps`**: `/proc/<pid>/maps` parsing into library ranges
//! - **`config`**: Where symbols and the symbolizer binary are found
//!
//! ## Failure Handling
//!
//! Symbolization never fails outright. An address outside every mapping, a
//! library whose symbolizer cannot start, or a symbolizer that dies mid-session
//! all produce a frame showing the raw address in hex with no source location.
//! That frame is cached like any other, so the failure is not retried.

pub mod config;
pub mod memory_maps;
pub mod process_pool;
pub mod resolution_cache;

pub use config::{SymbolizerConfig, UserConfig};
pub use memory_maps::{parse_library_maps, read_library_maps, read_process_maps};
pub use process_pool::{ProcessHandle, SymbolProcessPool, SymbolSource};
pub use resolution_cache::AddressResolutionCache;
