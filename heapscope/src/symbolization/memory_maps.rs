//! Library mapping utilities for process address space analysis
//!
//! The device bridge reports loaded libraries as `/proc/<pid>/maps` text.
//! This module turns that text into one [`LibraryMapping`] per library,
//! spanning from the lowest start to the highest end of all its segments.

use log::{debug, info};
use std::collections::HashMap;
use std::fs;
use std::path::Path;

use crate::domain::{CaptureError, LibraryMapping};

/// Parse `/proc/<pid>/maps`-style text into per-library ranges
///
/// Lines look like `start-end perms offset dev inode pathname`. Anonymous
/// mappings and pseudo-files such as `[heap]` or `[stack]` are skipped.
/// Libraries keep the order of their first segment.
///
/// # Errors
/// Returns an error if a line has a pathname but an unparseable range
pub fn parse_library_maps(maps: &str) -> Result<Vec<LibraryMapping>, CaptureError> {
    let mut libraries: Vec<LibraryMapping> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();

    for (line_no, line) in maps.lines().enumerate() {
        let parts: Vec<&str> = line.split_whitespace().collect();
        if parts.len() < 6 {
            continue;
        }

        let pathname = parts[5..].join(" ");
        if !pathname.starts_with('/') {
            continue;
        }

        let (start, end) = parse_range(parts[0]).ok_or_else(|| CaptureError::MalformedMapsLine {
            line: line_no + 1,
            reason: format!("bad address range '{}'", parts[0]),
        })?;

        // Track the minimum start and maximum end across segments
        if let Some(&i) = index.get(&pathname) {
            let mapping = &mut libraries[i];
            mapping.start = mapping.start.min(start);
            mapping.end = mapping.end.max(end);
        } else {
            index.insert(pathname.clone(), libraries.len());
            libraries.push(LibraryMapping::new(pathname, start, end));
        }
    }

    debug!("Parsed {} library mappings", libraries.len());
    Ok(libraries)
}

fn parse_range(range: &str) -> Option<(u64, u64)> {
    let (start, end) = range.split_once('-')?;
    let start = u64::from_str_radix(start, 16).ok()?;
    let end = u64::from_str_radix(end, 16).ok()?;
    (start < end).then_some((start, end))
}

/// Read library mappings from a saved maps file
///
/// # Errors
/// Returns an error if the file cannot be read or contains a malformed line
pub fn read_library_maps(path: &Path) -> Result<Vec<LibraryMapping>, CaptureError> {
    let maps = fs::read_to_string(path)?;
    let libraries = parse_library_maps(&maps)?;
    info!("Loaded {} library mappings from {}", libraries.len(), path.display());
    Ok(libraries)
}

/// Read library mappings of a live local process
///
/// # Errors
/// Returns an error if /proc/pid/maps cannot be read
pub fn read_process_maps(pid: u32) -> Result<Vec<LibraryMapping>, CaptureError> {
    read_library_maps(Path::new(&format!("/proc/{pid}/maps")))
}

#[cfg(test)]
mod tests {
    use super::*;

    const MAPS: &str = "\
40000000-40008000 r-xp 00000000 1f:00 123        /system/lib/libc.so
40008000-40009000 rw-p 00008000 1f:00 123        /system/lib/libc.so
40010000-40020000 r-xp 00000000 1f:00 124        /system/lib/libfoo.so
40020000-40030000 rw-p 00000000 00:00 0
bef00000-bef21000 rw-p 00000000 00:00 0          [stack]
";

    #[test]
    fn test_segments_merge_per_library() {
        let libraries = parse_library_maps(MAPS).unwrap();

        assert_eq!(
            libraries,
            vec![
                LibraryMapping::new("/system/lib/libc.so", 0x4000_0000, 0x4000_9000),
                LibraryMapping::new("/system/lib/libfoo.so", 0x4001_0000, 0x4002_0000),
            ]
        );
    }

    #[test]
    fn test_malformed_range_is_reported() {
        let err = parse_library_maps("zzzz-4000 r-xp 0 0:0 1 /system/lib/libx.so\n").unwrap_err();
        assert!(matches!(err, CaptureError::MalformedMapsLine { line: 1, .. }));
    }

    #[test]
    fn test_read_process_maps_self() {
        // Our own maps contain at least the test binary
        let result = read_process_maps(std::process::id());
        if let Ok(libraries) = result {
            assert!(!libraries.is_empty());
        }
    }
}
