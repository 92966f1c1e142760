//! Block descriptor cache
//!
//! Maps block indices of one snapshot to the tokens needed to fetch them,
//! together with the block size reported by the first page loaded and the
//! index ranges that loaded pages proved complete. An index inside a
//! covered range with no descriptor is unallocated; answering that from the
//! cache avoids re-listing sparse regions on every read.

use crate::loader::BlockPage;

use parking_lot::Mutex;
use snapio_client::BlockToken;
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, warn};

/// Result of a cache lookup
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheLookup {
    /// Block is allocated and can be fetched with this token
    Allocated(BlockToken),
    /// A loaded page covers the index and listed no descriptor for it
    Unallocated,
    /// No loaded page covers the index
    Unknown,
}

/// Cache statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Cached block descriptors
    pub cached_blocks: usize,
    /// Disjoint covered index ranges
    pub covered_ranges: usize,
    /// Block size, once known
    pub block_size: Option<u64>,
}

#[derive(Default)]
struct CacheState {
    block_size: Option<u64>,
    tokens: HashMap<u64, BlockToken>,
    /// Disjoint covered ranges, start -> inclusive end
    covered: BTreeMap<u64, u64>,
}

impl CacheState {
    fn is_covered(&self, block_index: u64) -> bool {
        self.covered
            .range(..=block_index)
            .next_back()
            .is_some_and(|(_, end)| *end >= block_index)
    }

    fn cover(&mut self, mut start: u64, mut end: u64) {
        // Absorb every range that overlaps or touches [start, end]
        let touching: Vec<u64> = self
            .covered
            .range(..=end.saturating_add(1))
            .filter(|(_, e)| **e >= start.saturating_sub(1))
            .map(|(s, _)| *s)
            .collect();

        for s in touching {
            if let Some(e) = self.covered.remove(&s) {
                start = start.min(s);
                end = end.max(e);
            }
        }

        self.covered.insert(start, end);
    }
}

/// Per-handle cache of block descriptors
///
/// Safe to share between concurrent reads. Critical sections are short
/// and never span a remote call.
pub struct BlockDescriptorCache {
    state: Mutex<CacheState>,
}

impl BlockDescriptorCache {
    /// Create an empty cache
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Mutex::new(CacheState::default()),
        }
    }

    /// Look up the descriptor for a block index
    pub fn lookup(&self, block_index: u64) -> CacheLookup {
        let state = self.state.lock();
        if let Some(token) = state.tokens.get(&block_index) {
            return CacheLookup::Allocated(token.clone());
        }
        if state.is_covered(block_index) {
            CacheLookup::Unallocated
        } else {
            CacheLookup::Unknown
        }
    }

    /// Merge a loaded page into the cache
    ///
    /// The first page recorded fixes the block size. Descriptors already
    /// cached are replaced by the newer token.
    pub fn record_page(&self, page: &BlockPage) {
        let mut state = self.state.lock();

        match state.block_size {
            None => state.block_size = Some(page.block_size),
            Some(size) if size != page.block_size => {
                warn!(
                    "Block size changed from {} to {} at page starting {}, keeping {}",
                    size, page.block_size, page.start_index, size
                );
            }
            Some(_) => {}
        }

        for descriptor in &page.blocks {
            state
                .tokens
                .insert(descriptor.block_index, descriptor.block_token.clone());
        }

        if let Some((start, end)) = page.coverage() {
            state.cover(start, end);
        }

        debug!(
            "Recorded page at {}: {} descriptors, {} cached",
            page.start_index,
            page.blocks.len(),
            state.tokens.len()
        );
    }

    /// Block size of the snapshot, if a page has been loaded
    pub fn block_size(&self) -> Option<u64> {
        self.state.lock().block_size
    }

    /// Drop all descriptors, coverage and the block size
    pub fn clear(&self) {
        *self.state.lock() = CacheState::default();
    }

    /// Number of cached descriptors
    pub fn len(&self) -> usize {
        self.state.lock().tokens.len()
    }

    /// Check if no descriptor is cached
    pub fn is_empty(&self) -> bool {
        self.state.lock().tokens.is_empty()
    }

    /// Get cache statistics
    pub fn stats(&self) -> CacheStats {
        let state = self.state.lock();
        CacheStats {
            cached_blocks: state.tokens.len(),
            covered_ranges: state.covered.len(),
            block_size: state.block_size,
        }
    }
}

impl Default for BlockDescriptorCache {
    fn default() -> Self {
        Self::new()
    }
}
