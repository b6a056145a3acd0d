//! Zygote view selection
//!
//! Records allocated before the process forked from the zygote are shared
//! with every app; records made afterwards belong to this process alone.
//! The panel can show either group or both.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use crate::domain::{AllocationRecord, AllocationSnapshot};

/// Which allocations to show
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AllocDisplay {
    #[default]
    All,
    /// Allocations inherited from the zygote
    PreZygote,
    /// Allocations made after the fork
    ZygoteChild,
}

impl AllocDisplay {
    #[must_use]
    pub fn includes(self, record: &AllocationRecord) -> bool {
        match self {
            Self::All => true,
            Self::PreZygote => !record.is_zygote_child,
            Self::ZygoteChild => record.is_zygote_child,
        }
    }

    /// Title of the memory summary for this view
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::All => "Total Memory",
            Self::PreZygote => "Zygote Memory",
            Self::ZygoteChild => "Post-zygote Memory",
        }
    }

    /// Records of `snapshot` in this view, in snapshot order
    #[must_use]
    pub fn filter(self, snapshot: &AllocationSnapshot) -> FilteredView {
        let records: Vec<Arc<AllocationRecord>> =
            snapshot.records().iter().filter(|r| self.includes(r)).cloned().collect();
        let total_size: u64 = records.iter().map(|r| r.total_size()).sum();
        FilteredView { display: self, records, total_size }
    }
}

impl fmt::Display for AllocDisplay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::All => "all",
            Self::PreZygote => "pre-zygote",
            Self::ZygoteChild => "zygote-child",
        };
        f.write_str(name)
    }
}

impl FromStr for AllocDisplay {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "all" => Ok(Self::All),
            "pre-zygote" => Ok(Self::PreZygote),
            "zygote-child" | "post-zygote" => Ok(Self::ZygoteChild),
            other => Err(format!("unknown display mode '{other}'")),
        }
    }
}

/// The records of one view plus their memory total
#[derive(Debug, Clone)]
pub struct FilteredView {
    pub display: AllocDisplay,
    pub records: Vec<Arc<AllocationRecord>>,
    pub total_size: u64,
}

impl FilteredView {
    /// Summary line, e.g. `Zygote Memory: 768 Bytes`
    #[must_use]
    pub fn summary(&self) -> String {
        format!("{}: {} Bytes", self.display.label(), self.total_size)
    }
}
