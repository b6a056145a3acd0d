//! Capture file loading
//!
//! Stands in for the instrumented-runtime bridge: a capture saved as JSON is
//! turned into an [`AllocationSnapshot`] with every backtrace unresolved.
//!
//! ```json
//! {
//!   "session": 1,
//!   "records": [
//!     { "size": 64, "count": 10, "zygote_child": false, "backtrace": [4096, 8192] }
//!   ]
//! }
//! ```

use log::info;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::domain::{AllocationRecord, AllocationSnapshot, CaptureError, RawAddress, SessionId};

/// One record as stored in a capture file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CapturedRecord {
    pub size: u32,
    pub count: u32,
    #[serde(default)]
    pub zygote_child: bool,
    #[serde(default)]
    pub backtrace: Vec<RawAddress>,
}

/// On-disk capture format
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaptureFile {
    pub session: SessionId,
    pub records: Vec<CapturedRecord>,
}

impl CaptureFile {
    /// Parse a capture from JSON text
    ///
    /// # Errors
    /// Returns an error if the JSON is invalid or a record has a zero count
    pub fn from_json(json: &str) -> Result<Self, CaptureError> {
        let capture: CaptureFile = serde_json::from_str(json)?;
        if let Some(i) = capture.records.iter().position(|r| r.count == 0) {
            return Err(CaptureError::InvalidCapture(format!("record {i} has a zero allocation count")));
        }
        Ok(capture)
    }

    /// Build the unresolved snapshot for this capture
    #[must_use]
    pub fn into_snapshot(self) -> AllocationSnapshot {
        let records = self
            .records
            .into_iter()
            .map(|r| AllocationRecord::new(r.size, r.count, r.zygote_child, r.backtrace))
            .collect();
        AllocationSnapshot::new(self.session, records)
    }
}

/// Load a capture file as a snapshot
///
/// # Errors
/// Returns an error if the file cannot be read or parsed
pub fn load_snapshot(path: impl AsRef<Path>) -> Result<AllocationSnapshot, CaptureError> {
    let path = path.as_ref();
    let content = fs::read_to_string(path)?;
    let snapshot = CaptureFile::from_json(&content)?.into_snapshot();
    info!(
        "Loaded {} allocation records ({} bytes) from {}",
        snapshot.len(),
        snapshot.total_size(),
        path.display()
    );
    Ok(snapshot)
}
