//! Bounded canonical height→hash cache with fork-switch detection.
//!
//! Tracks the last `retention + 1` canonical block hashes so an incoming
//! header can be cheaply classified as extending the current tip or as a
//! fork switch. On a fork the whole cache is cleared and refilled from
//! the authoritative chain component; a partial patch is never attempted
//! because entries must stay hash-linked.
//!
//! Built for concurrent access: the height map is a concurrent map safe
//! for many readers and a single refiller, and the refill path is guarded
//! by one compare-and-swap so overlapping fork events collapse into one
//! refill. A header arriving mid-refill is dropped, not double-processed;
//! the at-least-once header feed redelivers.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use dashmap::DashMap;
use tracing::{debug, warn};

use terrace_core::traits::ChainAuthority;
use terrace_core::types::{BlockHeader, Hash256};

/// Whether the cache is tracking a stable tip or recovering from a fork.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheState {
    /// Normal extension; headers link onto the cached tip.
    Stable,
    /// A refill from the chain authority is in progress.
    Switching,
}

/// Sliding window of recent canonical heights.
pub struct CanonicalHeightCache {
    heights: DashMap<u64, Hash256>,
    current_height: AtomicU64,
    switching: AtomicBool,
    retention: u64,
    authority: Arc<dyn ChainAuthority>,
}

impl CanonicalHeightCache {
    /// Create an empty cache retaining `retention + 1` heights.
    pub fn new(authority: Arc<dyn ChainAuthority>, retention: u64) -> Self {
        Self {
            heights: DashMap::new(),
            current_height: AtomicU64::new(0),
            switching: AtomicBool::new(false),
            retention,
            authority,
        }
    }

    /// Canonical hash at a height, if still inside the retained window.
    pub fn get_hash_by_height(&self, height: u64) -> Option<Hash256> {
        self.heights.get(&height).map(|entry| *entry.value())
    }

    /// Height of the most recently processed header.
    pub fn current_height(&self) -> u64 {
        self.current_height.load(Ordering::SeqCst)
    }

    /// Current state of the cache.
    pub fn state(&self) -> CacheState {
        if self.switching.load(Ordering::SeqCst) {
            CacheState::Switching
        } else {
            CacheState::Stable
        }
    }

    /// Number of cached heights.
    pub fn len(&self) -> usize {
        self.heights.len()
    }

    /// Whether the cache holds no entries.
    pub fn is_empty(&self) -> bool {
        self.heights.is_empty()
    }

    /// Process a new block header from the feed.
    ///
    /// Genesis inserts unconditionally. A header whose parent is the
    /// cached predecessor extends the window (evicting the oldest entry
    /// past the retention bound). Anything else is a fork switch: the
    /// cache is cleared and refilled from the authority. `current_height`
    /// is updated in every branch.
    pub async fn on_new_header(&self, header: &BlockHeader) {
        let hash = header.hash();

        if header.index == 0 {
            self.heights.insert(0, hash);
        } else if self.parent_matches(header) {
            self.heights.insert(header.index, hash);
            if header.index > self.retention {
                self.heights.remove(&(header.index - self.retention - 1));
            }
            debug!(height = header.index, hash = %hash, "extended canonical cache");
        } else {
            self.refill(header).await;
        }

        self.current_height.store(header.index, Ordering::SeqCst);
    }

    fn parent_matches(&self, header: &BlockHeader) -> bool {
        self.heights
            .get(&(header.index - 1))
            .map(|entry| *entry.value() == header.previous_hash)
            .unwrap_or(false)
    }

    /// Clear and repopulate the window from the chain authority.
    ///
    /// A failed authority query leaves the cache cleared; the next header
    /// will miss its parent lookup and trigger another refill.
    async fn refill(&self, header: &BlockHeader) {
        if self
            .switching
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            warn!(
                height = header.index,
                "fork refill already in progress; dropping header"
            );
            return;
        }

        warn!(height = header.index, "fork switch detected; refilling canonical cache");
        self.heights.clear();

        let start = header.index.saturating_sub(self.retention);
        for height in start..=header.index {
            match self.authority.canonical_hash_at(height).await {
                Ok(Some(hash)) => {
                    self.heights.insert(height, hash);
                }
                Ok(None) => {
                    warn!(height, "authority has no canonical block; cache left empty");
                    self.heights.clear();
                    break;
                }
                Err(e) => {
                    warn!(height, error = %e, "authority query failed; cache left empty");
                    self.heights.clear();
                    break;
                }
            }
        }

        self.switching.store(false, Ordering::SeqCst);
    }
}
