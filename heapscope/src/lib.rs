//! # heapscope - Native Heap Symbolication and Aggregation
//!
//! heapscope takes the native allocation records captured from an
//! instrumented process, resolves their raw return addresses into
//! method/file/line information with one long-running symbolizer subprocess
//! per library, and groups the result by the library responsible for each
//! allocation.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                     Instrumented Process                        │
//! │           (malloc debug: size, count, backtrace)                │
//! └───────────────────────┬─────────────────────────────────────────┘
//!                         │ capture + /proc/<pid>/maps
//!                         ▼
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                    heapscope (This Crate)                       │
//! │                                                                 │
//! │  ┌──────────────┐   ┌──────────────┐   ┌──────────────┐         │
//! │  │   Capture    │──▶│   Pipeline   │──▶│   Analysis   │         │
//! │  │  (snapshot)  │   │ (background) │   │ (libraries)  │         │
//! │  └──────────────┘   └──────┬───────┘   └──────┬───────┘         │
//! │                            │                  │                 │
//! │                            ▼                  ▼                 │
//! │                     ┌──────────────┐   ┌──────────────┐         │
//! │                     │ Symbolization│   │    Export    │         │
//! │                     │ (cache+pool) │   │   (text)     │         │
//! │                     └──────┬───────┘   └──────────────┘         │
//! └────────────────────────────┼────────────────────────────────────┘
//!                              │ "00001a2c\n"
//!                              ▼
//!                    addr2line -C -f -e <lib>   (one per library)
//! ```
//!
//! ## Module Structure
//!
//! - [`symbolization`]: Symbolizer process pool, address cache, maps parsing
//!   and symbolizer configuration
//! - [`pipeline`]: Cancellable background tasks, snapshot symbolication with
//!   paged progress, chunked library paging
//! - [`analysis`]: Per-library aggregation, backup diffing, zygote views
//! - [`classification`]: Which frame an allocation is attributed to
//! - [`export`]: Plain-text allocation dump
//! - [`capture`]: Loading snapshots from JSON capture files
//! - [`engine`]: One pool, one cache and one pipeline run wired together
//! - [`domain`]: Data model re-exports and structured errors
//! - [`cli`]: Command-line argument parsing
//!
//! ## Typical Usage
//!
//! ```bash
//! # Symbolicate a capture and show the top libraries
//! heapscope --capture heap.json --maps maps.txt --symbols out/symbols
//!
//! # Only what is new since the previous capture of the same session
//! heapscope --capture heap2.json --backup heap1.json --maps maps.txt
//! ```

pub mod analysis;
pub mod capture;
pub mod classification;
pub mod cli;
pub mod domain;
pub mod engine;
pub mod export;
pub mod pipeline;
pub mod symbolization;
