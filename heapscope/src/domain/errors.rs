//! Structured error types for heapscope
//!
//! Using thiserror for automatic Display implementation and error chaining.

use thiserror::Error;

/// Failures talking to a symbolizer subprocess
///
/// Neither variant ever reaches the pipeline: the resolution cache turns
/// both into a degraded frame.
#[derive(Error, Debug)]
pub enum SymbolizeError {
    #[error("Failed to start symbolizer for {library}: {source}")]
    StartFailed {
        library: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Symbolizer I/O failed for {library}: {source}")]
    IoFailure {
        library: String,
        #[source]
        source: std::io::Error,
    },
}

impl SymbolizeError {
    pub(crate) fn start_failed(library: &str, source: std::io::Error) -> Self {
        Self::StartFailed { library: library.to_string(), source }
    }

    pub(crate) fn io_failure(library: &str, source: std::io::Error) -> Self {
        Self::IoFailure { library: library.to_string(), source }
    }

    /// Library whose symbolizer failed
    #[must_use]
    pub fn library(&self) -> &str {
        match self {
            Self::StartFailed { library, .. } | Self::IoFailure { library, .. } => library,
        }
    }
}

#[derive(Error, Debug)]
pub enum CaptureError {
    #[error("Malformed maps line {line}: {reason}")]
    MalformedMapsLine { line: usize, reason: String },

    #[error("Invalid capture data: {0}")]
    InvalidCapture(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    ReadFailed {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {source}")]
    ParseFailed {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_symbolize_error_display() {
        let err = SymbolizeError::start_failed(
            "libfoo.so",
            std::io::Error::new(std::io::ErrorKind::NotFound, "no such file"),
        );
        assert_eq!(err.to_string(), "Failed to start symbolizer for libfoo.so: no such file");
        assert_eq!(err.library(), "libfoo.so");
    }

    #[test]
    fn test_capture_io_error_exposes_source() {
        use std::error::Error as _;

        let err = CaptureError::from(std::io::Error::new(std::io::ErrorKind::NotFound, "gone"));
        let source = err.source().and_then(|s| s.downcast_ref::<std::io::Error>());
        assert_eq!(source.map(std::io::Error::kind), Some(std::io::ErrorKind::NotFound));
    }

    #[test]
    fn test_maps_line_error() {
        let err = CaptureError::MalformedMapsLine { line: 3, reason: "bad range".to_string() };
        assert!(err.to_string().contains("line 3"));
        assert!(err.to_string().contains("bad range"));
    }
}
