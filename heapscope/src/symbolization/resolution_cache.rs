use log::{debug, warn};
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use super::process_pool::SymbolSource;
use crate::domain::{find_library, LibraryMapping, RawAddress, ResolvedFrame};

/// Session-wide cache of resolved addresses
///
/// Every address is symbolized at most once. Failed lookups are cached as
/// degraded frames too, so a library without symbols does not restart its
/// symbolizer for every address. Entries are never replaced or removed.
pub struct AddressResolutionCache {
    source: Arc<dyn SymbolSource>,
    frames: RwLock<HashMap<RawAddress, ResolvedFrame>>,
}

impl AddressResolutionCache {
    pub fn new(source: Arc<dyn SymbolSource>) -> Self {
        Self { source, frames: RwLock::new(HashMap::new()) }
    }

    /// Previously resolved frame for `addr`, if any
    #[must_use]
    pub fn lookup(&self, addr: RawAddress) -> Option<ResolvedFrame> {
        self.frames.read().unwrap_or_else(PoisonError::into_inner).get(&addr).cloned()
    }

    /// Resolve `addr` and remember the answer
    ///
    /// Never fails: an address outside every mapping, or one the symbolizer
    /// cannot answer for, becomes a degraded frame showing the address in hex.
    /// The cache lock is not held while the symbolizer runs; if two callers
    /// race on the same address the first insert wins and both get it.
    pub fn resolve_and_cache(&self, addr: RawAddress, mappings: &[LibraryMapping]) -> ResolvedFrame {
        if let Some(frame) = self.lookup(addr) {
            return frame;
        }

        let frame = match find_library(mappings, addr) {
            None => {
                debug!("No library mapping for {}", addr.to_hex());
                ResolvedFrame::degraded(None, addr)
            }
            Some(mapping) => match self.source.symbolize(&mapping.name, mapping.offset_of(addr)) {
                Ok(frame) => frame,
                Err(e) => {
                    warn!("Falling back to raw address for {}: {e}", addr.to_hex());
                    ResolvedFrame::degraded(Some(mapping.name.clone()), addr)
                }
            },
        };

        self.frames
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(addr)
            .or_insert(frame)
            .clone()
    }

    /// Number of cached addresses
    #[must_use]
    pub fn len(&self) -> usize {
        self.frames.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
