//! # Shared Data Structures (Capture ↔ Engine)
//!
//! Defines the data model exchanged between the instrumented-runtime bridge
//! that captures native allocations and the symbolication engine that
//! resolves and aggregates them.
//!
//! ## Key Types
//!
//! - [`RawAddress`] - A return address captured in an allocation backtrace
//! - [`LibraryMapping`] - Address range of a loaded native library
//! - [`ResolvedFrame`] - Method/file/line produced by the symbolizer
//! - [`AllocationRecord`] - One call site: size, count and backtrace
//! - [`AllocationSnapshot`] - One captured set of records, tagged with its session
//!
//! ## Write-Once Resolution
//!
//! A record's resolved backtrace is filled exactly once by the symbolication
//! worker while other threads may be reading the record. The slot is a
//! [`OnceLock`], so a reader sees either nothing or the complete sequence.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, OnceLock};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

// ============================================================================
// Addresses and Mappings
// ============================================================================

/// Return address captured at allocation time
///
/// Zero marks an empty backtrace slot and is never symbolized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize), serde(transparent))]
pub struct RawAddress(pub u64);

impl RawAddress {
    /// Returns true for the null slot marker
    #[must_use]
    pub fn is_null(self) -> bool {
        self.0 == 0
    }

    /// Lowercase hex without prefix, the form shown for unresolved frames
    #[must_use]
    pub fn to_hex(self) -> String {
        format!("{:x}", self.0)
    }
}

impl fmt::Display for RawAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:08x}", self.0)
    }
}

impl From<u64> for RawAddress {
    fn from(addr: u64) -> Self {
        RawAddress(addr)
    }
}

/// Address range of a loaded native library
///
/// Supplied by the device bridge; ranges are expected not to overlap.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct LibraryMapping {
    pub name: String,
    pub start: u64,
    pub end: u64,
}

impl LibraryMapping {
    pub fn new(name: impl Into<String>, start: u64, end: u64) -> Self {
        Self { name: name.into(), start, end }
    }

    /// Check if an address falls within `[start, end)`
    #[must_use]
    pub fn contains(&self, addr: RawAddress) -> bool {
        addr.0 >= self.start && addr.0 < self.end
    }

    /// Offset of `addr` relative to the library load address
    #[must_use]
    pub fn offset_of(&self, addr: RawAddress) -> u64 {
        addr.0 - self.start
    }
}

/// Find the library containing `addr` (linear scan, first match wins)
#[must_use]
pub fn find_library(mappings: &[LibraryMapping], addr: RawAddress) -> Option<&LibraryMapping> {
    mappings.iter().find(|m| m.contains(addr))
}

// ============================================================================
// Resolved Frames
// ============================================================================

/// A symbolized backtrace entry
///
/// Produced once per distinct address and never mutated afterwards. A frame
/// that could not be symbolized carries the raw address in hex as its method
/// name and an empty source file.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ResolvedFrame {
    /// Library the address belongs to, `None` when no mapping contains it
    pub library: Option<String>,
    pub method: String,
    pub source_file: String,
    /// Line number, `None` when unknown
    pub line: Option<u32>,
}

impl ResolvedFrame {
    /// Build a frame from the symbolizer's `method` and `file:line` answers
    ///
    /// The location is split on its last `:`; when the suffix is not a
    /// number (addr2line prints `??:?` or `file:?`), the line is unknown and
    /// the file part is kept as is.
    pub fn from_symbolizer(library: Option<String>, method: &str, location: &str) -> Self {
        let (source_file, line) = match location.rsplit_once(':') {
            Some((file, line)) => match line.trim().parse::<u32>() {
                Ok(line) => (file.to_string(), Some(line)),
                Err(_) => (file.to_string(), None),
            },
            None => (location.to_string(), None),
        };

        Self { library, method: method.to_string(), source_file, line }
    }

    /// Frame used when an address cannot be symbolized
    pub fn degraded(library: Option<String>, addr: RawAddress) -> Self {
        Self { library, method: addr.to_hex(), source_file: String::new(), line: None }
    }

    /// Returns true if this frame carries no symbol information
    #[must_use]
    pub fn is_degraded(&self) -> bool {
        self.source_file.is_empty() && self.line.is_none()
    }
}

impl fmt::Display for ResolvedFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.method)?;
        if let Some(ref library) = self.library {
            write!(f, " ({library})")?;
        }
        if !self.source_file.is_empty() {
            write!(f, " {}", self.source_file)?;
            if let Some(line) = self.line {
                write!(f, ":{line}")?;
            }
        }
        Ok(())
    }
}

/// Resolved backtrace, aligned index-for-index with the raw backtrace
///
/// Null addresses produce a `None` slot so positions never drift between
/// the raw and resolved sequences.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ResolvedBacktrace {
    slots: Vec<Option<ResolvedFrame>>,
}

impl ResolvedBacktrace {
    #[must_use]
    pub fn new(slots: Vec<Option<ResolvedFrame>>) -> Self {
        Self { slots }
    }

    /// All slots, one per raw address
    #[must_use]
    pub fn slots(&self) -> &[Option<ResolvedFrame>] {
        &self.slots
    }

    /// Resolved frames in backtrace order, skipping null slots
    pub fn frames(&self) -> impl Iterator<Item = &ResolvedFrame> {
        self.slots.iter().flatten()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

// ============================================================================
// Allocation Records
// ============================================================================

/// One native allocation call site
///
/// Equality and hashing only look at `(size, count, is_zygote_child,
/// raw_backtrace)`; resolved data never participates.
#[derive(Debug, Clone)]
pub struct AllocationRecord {
    pub size: u32,
    pub count: u32,
    pub is_zygote_child: bool,
    pub raw_backtrace: Vec<RawAddress>,
    resolved: OnceLock<Arc<ResolvedBacktrace>>,
}

impl AllocationRecord {
    pub fn new(size: u32, count: u32, is_zygote_child: bool, raw_backtrace: Vec<RawAddress>) -> Self {
        Self { size, count, is_zygote_child, raw_backtrace, resolved: OnceLock::new() }
    }

    /// Memory held by this call site (`size * count`)
    #[must_use]
    pub fn total_size(&self) -> u64 {
        u64::from(self.size) * u64::from(self.count)
    }

    /// The resolved backtrace, if the symbolication worker reached this record
    #[must_use]
    pub fn resolved_backtrace(&self) -> Option<&Arc<ResolvedBacktrace>> {
        self.resolved.get()
    }

    #[must_use]
    pub fn is_resolved(&self) -> bool {
        self.resolved.get().is_some()
    }

    /// Store the resolved backtrace
    ///
    /// Returns false if the record was already resolved; the earlier value
    /// is kept.
    pub fn set_resolved_backtrace(&self, backtrace: ResolvedBacktrace) -> bool {
        self.resolved.set(Arc::new(backtrace)).is_ok()
    }
}

impl PartialEq for AllocationRecord {
    fn eq(&self, other: &Self) -> bool {
        self.size == other.size
            && self.count == other.count
            && self.is_zygote_child == other.is_zygote_child
            && self.raw_backtrace == other.raw_backtrace
    }
}

impl Eq for AllocationRecord {}

impl Hash for AllocationRecord {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.size.hash(state);
        self.count.hash(state);
        self.is_zygote_child.hash(state);
        self.raw_backtrace.hash(state);
    }
}

// ============================================================================
// Snapshots
// ============================================================================

/// Opaque identity of the capture session that produced a snapshot
///
/// Two snapshots with the same session come from the same inspected process
/// and can be diffed against each other.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize), serde(transparent))]
pub struct SessionId(pub u64);

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "session:{}", self.0)
    }
}

/// One captured set of allocation records
#[derive(Debug, Clone)]
pub struct AllocationSnapshot {
    session: SessionId,
    records: Vec<Arc<AllocationRecord>>,
}

impl AllocationSnapshot {
    pub fn new(session: SessionId, records: Vec<AllocationRecord>) -> Self {
        Self { session, records: records.into_iter().map(Arc::new).collect() }
    }

    /// Build a snapshot that shares already-existing records
    #[must_use]
    pub fn from_shared(session: SessionId, records: Vec<Arc<AllocationRecord>>) -> Self {
        Self { session, records }
    }

    #[must_use]
    pub fn session(&self) -> SessionId {
        self.session
    }

    #[must_use]
    pub fn records(&self) -> &[Arc<AllocationRecord>] {
        &self.records
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Whether `other` was captured by the same session as `self`
    #[must_use]
    pub fn is_refinement_of(&self, other: &AllocationSnapshot) -> bool {
        self.session == other.session
    }

    /// Sum of `size * count` over all records
    #[must_use]
    pub fn total_size(&self) -> u64 {
        self.records.iter().map(|r| r.total_size()).sum()
    }

    /// Number of records with a resolved backtrace
    #[must_use]
    pub fn resolved_count(&self) -> usize {
        self.records.iter().filter(|r| r.is_resolved()).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mapping_contains_is_half_open() {
        let mapping = LibraryMapping::new("libfoo.so", 0x1000, 0x2000);

        assert!(mapping.contains(RawAddress(0x1000)));
        assert!(mapping.contains(RawAddress(0x1FFF)));
        assert!(!mapping.contains(RawAddress(0x0FFF)));
        assert!(!mapping.contains(RawAddress(0x2000)));
        assert_eq!(mapping.offset_of(RawAddress(0x1234)), 0x234);
    }

    #[test]
    fn test_find_library_first_match_wins() {
        let mappings = vec![
            LibraryMapping::new("liba.so", 0x1000, 0x2000),
            LibraryMapping::new("libb.so", 0x2000, 0x3000),
        ];

        assert_eq!(find_library(&mappings, RawAddress(0x2500)).map(|m| m.name.as_str()), Some("libb.so"));
        assert!(find_library(&mappings, RawAddress(0x9000)).is_none());
    }

    #[test]
    fn test_frame_from_symbolizer_splits_location() {
        let frame = ResolvedFrame::from_symbolizer(Some("libc.so".into()), "malloc", "bionic/malloc.c:42");
        assert_eq!(frame.source_file, "bionic/malloc.c");
        assert_eq!(frame.line, Some(42));

        let unknown = ResolvedFrame::from_symbolizer(None, "??", "??:?");
        assert_eq!(unknown.source_file, "??");
        assert_eq!(unknown.line, None);

        let unknown_line = ResolvedFrame::from_symbolizer(None, "f", "bionic/foo.c:?");
        assert_eq!(unknown_line.source_file, "bionic/foo.c");
        assert_eq!(unknown_line.line, None);

        let no_colon = ResolvedFrame::from_symbolizer(None, "f", "nowhere");
        assert_eq!(no_colon.source_file, "nowhere");
        assert_eq!(no_colon.line, None);
    }

    #[test]
    fn test_degraded_frame_uses_hex() {
        let frame = ResolvedFrame::degraded(None, RawAddress(0xdead_beef));
        assert_eq!(frame.method, "deadbeef");
        assert!(frame.source_file.is_empty());
        assert!(frame.is_degraded());
    }

    #[test]
    fn test_record_equality_ignores_resolution() {
        let a = AllocationRecord::new(64, 2, false, vec![RawAddress(0x10)]);
        let b = AllocationRecord::new(64, 2, false, vec![RawAddress(0x10)]);
        assert!(b.set_resolved_backtrace(ResolvedBacktrace::default()));
        assert_eq!(a, b);

        let c = AllocationRecord::new(64, 2, true, vec![RawAddress(0x10)]);
        assert_ne!(a, c);
    }

    #[test]
    fn test_resolved_backtrace_is_write_once() {
        let record = AllocationRecord::new(8, 1, false, vec![RawAddress(0x10)]);
        let first = ResolvedBacktrace::new(vec![Some(ResolvedFrame::degraded(None, RawAddress(0x10)))]);

        assert!(record.set_resolved_backtrace(first.clone()));
        assert!(!record.set_resolved_backtrace(ResolvedBacktrace::default()));
        assert_eq!(record.resolved_backtrace().map(|b| b.as_ref()), Some(&first));
    }

    #[test]
    fn test_snapshot_totals() {
        let snapshot = AllocationSnapshot::new(
            SessionId(1),
            vec![
                AllocationRecord::new(64, 10, false, vec![]),
                AllocationRecord::new(128, 1, true, vec![]),
            ],
        );

        assert_eq!(snapshot.total_size(), 768);
        assert_eq!(snapshot.resolved_count(), 0);
        assert!(snapshot.is_refinement_of(&AllocationSnapshot::new(SessionId(1), vec![])));
        assert!(!snapshot.is_refinement_of(&AllocationSnapshot::new(SessionId(2), vec![])));
    }
}
