//! Backtrace resolution
//!
//! Turns one record's raw backtrace into its resolved backtrace through the
//! shared cache.

use log::trace;

use crate::domain::{LibraryMapping, RawAddress, ResolvedBacktrace};
use crate::symbolization::AddressResolutionCache;

/// Resolves raw backtraces against one set of library mappings
pub struct StackResolver<'a> {
    cache: &'a AddressResolutionCache,
    mappings: &'a [LibraryMapping],
}

impl<'a> StackResolver<'a> {
    pub fn new(cache: &'a AddressResolutionCache, mappings: &'a [LibraryMapping]) -> Self {
        Self { cache, mappings }
    }

    /// Resolve every address of a backtrace
    ///
    /// The result has one slot per raw address. Null addresses get an empty
    /// slot and are never sent to the symbolizer, so slot `i` always
    /// describes `raw[i]`.
    #[must_use]
    pub fn resolve_backtrace(&self, raw: &[RawAddress]) -> ResolvedBacktrace {
        let slots = raw
            .iter()
            .enumerate()
            .map(|(i, &addr)| {
                if addr.is_null() {
                    trace!("Frame {i} has a null address, leaving slot empty");
                    None
                } else {
                    Some(self.cache.resolve_and_cache(addr, self.mappings))
                }
            })
            .collect();

        ResolvedBacktrace::new(slots)
    }
}
