//! Allocation export functionality
//!
//! This module provides functionality for saving allocation lists to disk.
//! Currently supports the plain-text dump used for sharing native heap data.

pub mod text;

pub use text::{format_backtrace, TextExporter};
