//! Analysis logic for allocation snapshots
//!
//! This module contains pure functions over snapshots, separated from the
//! presentation layer: library aggregation, backup diffing and zygote views.

pub mod library_aggregator;
pub mod snapshot_diff;
pub mod zygote_filter;

pub use library_aggregator::{
    aggregate, LibraryAggregate, LibraryAggregator, UNKNOWN_LIBRARY, UNRESOLVED_LIBRARY,
};
pub use snapshot_diff::{diff, SnapshotDiff};
pub use zygote_filter::{AllocDisplay, FilteredView};
