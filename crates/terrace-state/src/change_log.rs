//! Per-path change log and pointer index.
//!
//! [`PathPointerIndex`] is the live mutation path of the engine: every
//! state write lands here as a pointer transition recorded against the
//! current block-building window. The recorded history is exactly what
//! [`rollback`](PathPointerIndex::rollback) needs to undo a candidate
//! block that fails validation after partial execution, and what
//! [`WorldStateStore::seal`](crate::world_state::WorldStateStore::seal)
//! snapshots into an immutable block state set.
//!
//! A window is identified by the previous block hash known to the writer
//! (the block's own hash does not exist until execution completes).

use std::collections::HashSet;
use std::sync::Arc;

use tracing::{debug, info};

use terrace_core::error::TerraceError;
use terrace_core::pointer::{change_key, changed_count_key, changed_path_key, pointer_key};
use terrace_core::traits::ContentAddressStore;
use terrace_core::types::{Change, Hash256};

use crate::codec;
use crate::config::HistoryRetention;

/// Maps path hashes to their current pointer and maintains the per-path
/// change record plus the per-window ordered list of touched paths.
pub struct PathPointerIndex {
    store: Arc<dyn ContentAddressStore>,
    chain_id: Hash256,
    retention: HistoryRetention,
}

impl PathPointerIndex {
    /// Create an index over the given store for one chain.
    pub fn new(
        store: Arc<dyn ContentAddressStore>,
        chain_id: Hash256,
        retention: HistoryRetention,
    ) -> Self {
        Self {
            store,
            chain_id,
            retention,
        }
    }

    /// Current pointer for a path, if the path has ever been written.
    pub async fn get_pointer(&self, path_hash: &Hash256) -> Result<Option<Hash256>, TerraceError> {
        let row = self.store.get(&pointer_key(&self.chain_id, path_hash)).await?;
        row.map(|bytes| codec::hash_from_bytes(&bytes)).transpose()
    }

    /// Current change record for a path, if one exists.
    pub async fn get_change(&self, path_hash: &Hash256) -> Result<Option<Change>, TerraceError> {
        let row = self.store.get(&change_key(&self.chain_id, path_hash)).await?;
        row.map(|bytes| codec::decode(&bytes)).transpose()
    }

    /// Record a pointer transition for a path within the window identified
    /// by `previous_block_hash`.
    ///
    /// If the path already carries a change record, its history is cleared
    /// when the last write belonged to a different window (the commit
    /// boundary has passed and older history is no longer needed), then
    /// the old pointer joins the history and `after` takes its place. For
    /// a first write, `before` seeds the history so the pre-window pointer
    /// stays recoverable.
    ///
    /// Every insertion also appends the path hash to the window's ordered
    /// changed-path list so the touched set can be enumerated later
    /// without a table scan.
    pub async fn record_change(
        &self,
        path_hash: &Hash256,
        before: Option<Hash256>,
        after: Hash256,
        previous_block_hash: &Hash256,
    ) -> Result<Change, TerraceError> {
        let discard = self.retention == HistoryRetention::DiscardImmediately;

        let change = match self.get_change(path_hash).await? {
            Some(mut change) => {
                if change.latest_changed_block_hash != *previous_block_hash {
                    change.clear_befores();
                }
                change.push_transition(after);
                change.latest_changed_block_hash = *previous_block_hash;
                if discard {
                    change.clear_befores();
                }
                change
            }
            None => {
                let mut change = Change::new(after, *previous_block_hash);
                if !discard {
                    if let Some(prior) = before {
                        change.before.push(prior);
                    }
                }
                change
            }
        };

        self.store
            .set(change_key(&self.chain_id, path_hash), codec::encode(&change)?)
            .await?;
        self.store
            .set(pointer_key(&self.chain_id, path_hash), codec::hash_bytes(&after))
            .await?;
        self.append_changed_path(path_hash, previous_block_hash).await?;

        debug!(path = %path_hash, pointer = %after, "recorded state change");
        Ok(change)
    }

    /// Ordered list of paths touched in a window, duplicates included in
    /// write order.
    pub async fn changed_paths(&self, window: &Hash256) -> Result<Vec<Hash256>, TerraceError> {
        let count = self.changed_count(window).await?;
        let mut paths = Vec::with_capacity(count as usize);
        for index in 0..count {
            let key = changed_path_key(&self.chain_id, window, index);
            let row = self.store.get(&key).await?.ok_or_else(|| {
                TerraceError::Storage(format!(
                    "changed-path list truncated at entry {index} of {count}"
                ))
            })?;
            paths.push(codec::hash_from_bytes(&row)?);
        }
        Ok(paths)
    }

    /// Undo every change recorded in the window: each path whose record
    /// kept history gets its pointer reset to the value held before the
    /// first write, and the record is rewritten clean so a retried window
    /// does not accumulate pointers from the failed attempt.
    ///
    /// Must run to completion before any other write reuses the window.
    /// Returns the number of paths reset.
    pub async fn rollback(&self, window: &Hash256) -> Result<usize, TerraceError> {
        let paths = self.changed_paths(window).await?;
        let mut seen = HashSet::new();
        let mut reset = 0usize;

        for path_hash in paths {
            if !seen.insert(path_hash) {
                continue;
            }
            let Some(mut change) = self.get_change(&path_hash).await? else {
                continue;
            };
            let Some(target) = change.rollback_target() else {
                continue;
            };
            change.before.clear();
            change.after = target;
            self.store
                .set(pointer_key(&self.chain_id, &path_hash), codec::hash_bytes(&target))
                .await?;
            self.store
                .set(change_key(&self.chain_id, &path_hash), codec::encode(&change)?)
                .await?;
            reset += 1;
        }

        self.reset_window(window).await?;
        info!(window = %window, paths = reset, "rolled back change window");
        Ok(reset)
    }

    /// Zero a window's changed-path count so the next round of writes
    /// accumulates against a fresh list. Called after rollback and after
    /// sealing.
    pub(crate) async fn reset_window(&self, window: &Hash256) -> Result<(), TerraceError> {
        self.store
            .set(changed_count_key(&self.chain_id, window), codec::u64_bytes(0))
            .await
    }

    async fn changed_count(&self, window: &Hash256) -> Result<u64, TerraceError> {
        let row = self.store.get(&changed_count_key(&self.chain_id, window)).await?;
        row.map(|bytes| codec::u64_from_bytes(&bytes))
            .transpose()
            .map(|count| count.unwrap_or(0))
    }

    async fn append_changed_path(
        &self,
        path_hash: &Hash256,
        window: &Hash256,
    ) -> Result<(), TerraceError> {
        let count = self.changed_count(window).await?;
        self.store
            .set(
                changed_path_key(&self.chain_id, window, count),
                codec::hash_bytes(path_hash),
            )
            .await?;
        self.store
            .set(changed_count_key(&self.chain_id, window), codec::u64_bytes(count + 1))
            .await
    }
}
