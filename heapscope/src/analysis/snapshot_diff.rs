//! "Capture again and show only what's new"
//!
//! A diff keeps the records of the current snapshot that have no
//! structurally equal record in a retained backup. Structural equality is
//! `(size, count, is_zygote_child, raw_backtrace)`; resolution state is
//! ignored, so a freshly captured record matches its already-resolved twin.

use log::debug;
use std::collections::HashSet;
use std::sync::Arc;

use crate::domain::{AllocationRecord, AllocationSnapshot, SessionId};

/// Records new since the backup, with the memory they add
#[derive(Debug, Clone, Default)]
pub struct SnapshotDiff {
    pub records: Vec<Arc<AllocationRecord>>,
    /// Sum of `size * count` over `records`
    pub total_delta: u64,
}

impl SnapshotDiff {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Turn the diff into a snapshot so it can be symbolicated and aggregated
    #[must_use]
    pub fn into_snapshot(self, session: SessionId) -> AllocationSnapshot {
        AllocationSnapshot::from_shared(session, self.records)
    }
}

/// Records of `current` absent from `backup`, in `current` order
#[must_use]
pub fn diff(current: &AllocationSnapshot, backup: &AllocationSnapshot) -> SnapshotDiff {
    let known: HashSet<&AllocationRecord> = backup.records().iter().map(|r| &**r).collect();

    let records: Vec<Arc<AllocationRecord>> =
        current.records().iter().filter(|r| !known.contains::<AllocationRecord>(r)).cloned().collect();
    let total_delta: u64 = records.iter().map(|r| r.total_size()).sum();

    debug!(
        "Diff {} against {}: {} of {} records are new ({total_delta} bytes)",
        current.session(),
        backup.session(),
        records.len(),
        current.len()
    );

    SnapshotDiff { records, total_delta }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::RawAddress;

    fn record(size: u32, count: u32, zygote: bool, addrs: &[u64]) -> AllocationRecord {
        AllocationRecord::new(size, count, zygote, addrs.iter().copied().map(RawAddress).collect())
    }

    fn backup() -> AllocationSnapshot {
        AllocationSnapshot::new(
            SessionId(1),
            vec![record(64, 10, false, &[0x1000, 0x2000]), record(128, 1, true, &[0x3000])],
        )
    }

    #[test]
    fn test_diff_with_itself_is_empty() {
        let b = backup();
        let result = diff(&b, &b);
        assert!(result.is_empty());
        assert_eq!(result.total_delta, 0);
    }

    #[test]
    fn test_diff_finds_added_record() {
        let new_record = record(32, 3, false, &[0x4000]);
        let current = AllocationSnapshot::new(
            SessionId(1),
            vec![
                record(64, 10, false, &[0x1000, 0x2000]),
                new_record.clone(),
                record(128, 1, true, &[0x3000]),
            ],
        );

        let result = diff(&current, &backup());

        assert_eq!(result.records.len(), 1);
        assert_eq!(*result.records[0], new_record);
        assert_eq!(result.total_delta, 96);
    }

    #[test]
    fn test_any_field_change_counts_as_new() {
        let current = AllocationSnapshot::new(
            SessionId(1),
            vec![
                record(64, 11, false, &[0x1000, 0x2000]),
                record(128, 1, false, &[0x3000]),
                record(64, 10, false, &[0x2000, 0x1000]),
            ],
        );

        assert_eq!(diff(&current, &backup()).records.len(), 3);
    }

    #[test]
    fn test_diff_shares_records_with_current() {
        let current = AllocationSnapshot::new(SessionId(1), vec![record(8, 1, false, &[0x5000])]);
        let result = diff(&current, &backup());

        assert!(Arc::ptr_eq(&result.records[0], &current.records()[0]));
        let snapshot = result.into_snapshot(current.session());
        assert_eq!(snapshot.len(), 1);
        assert!(snapshot.is_refinement_of(&current));
    }
}
