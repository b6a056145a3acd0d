//! Per-library aggregation of native allocations.
//!
//! Answers "how much memory, and how many allocations, came from library X"
//! and ranks libraries by the memory they hold.
//!
//! # Ordering
//!
//! ```text
//! LIBRARY                     SIZE    COUNT
//! ─────────────────────────────────────────
//! /system/lib/libskia.so    812,032    1,204   ← total_size desc
//!   ├─ 64 x 10,000  = 640,000                  ← size*count desc
//!   └─ 128 x 1,341  = 171,648
//! /system/lib/libfoo.so      98,304       12
//! <unresolved>               12,288        3   ← not symbolized yet
//! ```
//!
//! Both sorts are stable, so ties keep the order in which records appear in
//! the snapshot. Aggregation is a pure function of the snapshot's current
//! resolved state: calling it twice without new resolutions gives identical
//! output, and calling it after more records resolve only moves those records.

use std::collections::HashMap;
use std::sync::Arc;

use crate::classification::FrameClassifier;
use crate::domain::{AllocationRecord, AllocationSnapshot};

/// Bucket for records the symbolication pipeline has not reached yet
pub const UNRESOLVED_LIBRARY: &str = "<unresolved>";

/// Bucket for records whose relevant frame has no known library
pub const UNKNOWN_LIBRARY: &str = "<unknown>";

/// Allocations attributed to one library
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LibraryAggregate {
    pub library: String,

    /// Sum of `size * count` over `records`.
    pub total_size: u64,

    /// Sum of `count` over `records`.
    pub total_count: u64,

    /// Member records, largest `size * count` first.
    pub records: Vec<Arc<AllocationRecord>>,
}

impl LibraryAggregate {
    fn new(library: String) -> Self {
        Self { library, total_size: 0, total_count: 0, records: Vec::new() }
    }

    fn add(&mut self, record: &Arc<AllocationRecord>) {
        self.total_size += record.total_size();
        self.total_count += u64::from(record.count);
        self.records.push(Arc::clone(record));
    }
}

/// Groups snapshot records by the library of their relevant frame
#[derive(Debug, Clone, Default)]
pub struct LibraryAggregator {
    classifier: FrameClassifier,
}

impl LibraryAggregator {
    #[must_use]
    pub fn new(classifier: FrameClassifier) -> Self {
        Self { classifier }
    }

    /// Library a record is attributed to
    #[must_use]
    pub fn library_of(&self, record: &AllocationRecord) -> String {
        let Some(backtrace) = record.resolved_backtrace() else {
            return UNRESOLVED_LIBRARY.to_string();
        };
        self.classifier
            .relevant_frame(backtrace)
            .and_then(|frame| frame.library.clone())
            .unwrap_or_else(|| UNKNOWN_LIBRARY.to_string())
    }

    /// Aggregate all records of `snapshot`
    #[must_use]
    pub fn aggregate(&self, snapshot: &AllocationSnapshot) -> Vec<LibraryAggregate> {
        self.aggregate_records(snapshot.records())
    }

    /// Aggregate an arbitrary record list (e.g. a zygote-filtered view)
    #[must_use]
    pub fn aggregate_records(&self, records: &[Arc<AllocationRecord>]) -> Vec<LibraryAggregate> {
        let mut libraries: Vec<LibraryAggregate> = Vec::new();
        let mut index: HashMap<String, usize> = HashMap::new();

        for record in records {
            let library = self.library_of(record);
            let i = *index.entry(library.clone()).or_insert_with(|| {
                libraries.push(LibraryAggregate::new(library));
                libraries.len() - 1
            });
            libraries[i].add(record);
        }

        // Stable sorts: ties keep first-seen order
        for aggregate in &mut libraries {
            aggregate.records.sort_by_key(|r| std::cmp::Reverse(r.total_size()));
        }
        libraries.sort_by_key(|l| std::cmp::Reverse(l.total_size));

        libraries
    }
}

/// Aggregate `snapshot` with the default instrumentation filter
#[must_use]
pub fn aggregate(snapshot: &AllocationSnapshot) -> Vec<LibraryAggregate> {
    LibraryAggregator::default().aggregate(snapshot)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{RawAddress, ResolvedBacktrace, ResolvedFrame, SessionId};

    fn resolved(size: u32, count: u32, library: Option<&str>) -> AllocationRecord {
        let record = AllocationRecord::new(size, count, false, vec![RawAddress(0x10)]);
        record.set_resolved_backtrace(ResolvedBacktrace::new(vec![Some(ResolvedFrame {
            library: library.map(str::to_string),
            method: "f".to_string(),
            source_file: "f.c".to_string(),
            line: Some(1),
        })]));
        record
    }

    #[test]
    fn test_groups_and_sorts_by_total_size() {
        let snapshot = AllocationSnapshot::new(
            SessionId(1),
            vec![
                resolved(8, 1, Some("liba.so")),
                resolved(100, 2, Some("libb.so")),
                resolved(32, 4, Some("liba.so")),
            ],
        );

        let libraries = aggregate(&snapshot);

        assert_eq!(libraries.len(), 2);
        assert_eq!(libraries[0].library, "libb.so");
        assert_eq!(libraries[0].total_size, 200);
        assert_eq!(libraries[1].library, "liba.so");
        assert_eq!(libraries[1].total_size, 136);
        assert_eq!(libraries[1].total_count, 5);
        assert_eq!(libraries[1].records[0].size, 32);
        assert_eq!(libraries[1].records[1].size, 8);
    }

    #[test]
    fn test_unresolved_and_unknown_buckets() {
        let snapshot = AllocationSnapshot::new(
            SessionId(1),
            vec![
                AllocationRecord::new(16, 1, false, vec![RawAddress(0x10)]),
                resolved(4, 1, None),
            ],
        );

        let libraries = aggregate(&snapshot);

        assert_eq!(libraries[0].library, UNRESOLVED_LIBRARY);
        assert_eq!(libraries[0].total_size, 16);
        assert_eq!(libraries[1].library, UNKNOWN_LIBRARY);
    }

    #[test]
    fn test_ties_keep_snapshot_order() {
        let snapshot = AllocationSnapshot::new(
            SessionId(1),
            vec![
                resolved(10, 1, Some("libx.so")),
                resolved(5, 2, Some("liby.so")),
                resolved(2, 5, Some("libx.so")),
            ],
        );

        let libraries = aggregate(&snapshot);

        assert_eq!(libraries[0].library, "libx.so");
        assert_eq!(libraries[1].library, "liby.so");
        assert!(Arc::ptr_eq(&libraries[0].records[0], &snapshot.records()[0]));
        assert!(Arc::ptr_eq(&libraries[0].records[1], &snapshot.records()[2]));
    }

    #[test]
    fn test_repeated_aggregation_is_identical() {
        let snapshot = AllocationSnapshot::new(
            SessionId(1),
            (0..50).map(|i| resolved(i % 7 + 1, i % 3 + 1, Some(["a.so", "b.so", "c.so"][i as usize % 3]))).collect(),
        );

        let first = aggregate(&snapshot);
        let second = aggregate(&snapshot);

        assert_eq!(first, second);
        for (a, b) in first.iter().zip(&second) {
            assert!(a.records.iter().zip(&b.records).all(|(x, y)| Arc::ptr_eq(x, y)));
        }
    }
}
