//! Relevant-frame selection for library attribution.
//!
//! Every allocation backtrace starts inside the allocator's own
//! instrumentation (the debug malloc library that records the backtrace).
//! Attributing memory to that library would put everything in one bucket,
//! so aggregation looks past it.
//!
//! # Rule
//!
//! 1. The first resolved frame whose library is known and is not an
//!    instrumentation library
//! 2. Otherwise the first resolved frame outright
//! 3. No frames at all: nothing to attribute

use std::path::Path;

use crate::domain::{ResolvedBacktrace, ResolvedFrame};

/// Library that records native allocation backtraces on the device
pub const DEFAULT_INSTRUMENTATION_LIBRARY: &str = "libc_malloc_debug_leak.so";

/// Picks the frame an allocation is attributed to
#[derive(Debug, Clone)]
pub struct FrameClassifier {
    instrumentation_libraries: Vec<String>,
}

impl Default for FrameClassifier {
    fn default() -> Self {
        Self::new([DEFAULT_INSTRUMENTATION_LIBRARY])
    }
}

impl FrameClassifier {
    /// Classifier skipping the given instrumentation libraries (matched by file name)
    pub fn new<I, S>(instrumentation_libraries: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self { instrumentation_libraries: instrumentation_libraries.into_iter().map(Into::into).collect() }
    }

    /// Returns true if `library` is one of the allocator's own libraries
    #[must_use]
    pub fn is_instrumentation(&self, library: &str) -> bool {
        let file_name = Path::new(library).file_name().and_then(|n| n.to_str()).unwrap_or(library);
        self.instrumentation_libraries.iter().any(|lib| lib == file_name || lib == library)
    }

    /// The frame `backtrace` is attributed to
    #[must_use]
    pub fn relevant_frame<'a>(&self, backtrace: &'a ResolvedBacktrace) -> Option<&'a ResolvedFrame> {
        backtrace
            .frames()
            .find(|frame| frame.library.as_deref().is_some_and(|lib| !self.is_instrumentation(lib)))
            .or_else(|| backtrace.frames().next())
    }
}
