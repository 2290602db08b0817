//! Sealed block state sets and committed versioned state.
//!
//! Decoupling the live mutation path ([`PathPointerIndex`]) from the
//! sealed snapshot lets a candidate block be fully executed and rolled
//! back cheaply without touching durable per-block history, while blocks
//! that make it in still get a replayable delta for historical reads.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, info};

use terrace_core::error::{StateError, TerraceError};
use terrace_core::pointer::{state_set_key, versioned_key};
use terrace_core::traits::ContentAddressStore;
use terrace_core::types::{BlockStateSet, Hash256, VersionedState};

use crate::change_log::PathPointerIndex;
use crate::codec;

/// Persists sealed [`BlockStateSet`]s and the committed per-path
/// [`VersionedState`] rows, and answers "what changed in block X".
#[derive(Clone)]
pub struct WorldStateStore {
    store: Arc<dyn ContentAddressStore>,
    chain_id: Hash256,
}

impl WorldStateStore {
    /// Create a world-state store over the given content store for one chain.
    pub fn new(store: Arc<dyn ContentAddressStore>, chain_id: Hash256) -> Self {
        Self { store, chain_id }
    }

    /// Snapshot every change accumulated in the window identified by
    /// `previous_block_hash` into an immutable [`BlockStateSet`] for the
    /// executed block, persist it keyed by `block_hash`, and clear the
    /// window so the next round of writes accumulates fresh.
    ///
    /// The caller is responsible for moving its window cursor to
    /// `block_hash` afterwards.
    pub async fn seal(
        &self,
        index: &PathPointerIndex,
        previous_block_hash: &Hash256,
        block_hash: &Hash256,
        block_height: u64,
    ) -> Result<BlockStateSet, TerraceError> {
        let paths = index.changed_paths(previous_block_hash).await?;
        let mut changes = HashMap::new();
        for path_hash in paths {
            if changes.contains_key(&path_hash) {
                continue;
            }
            // One change record per path; later writes already folded in.
            if let Some(change) = index.get_change(&path_hash).await? {
                changes.insert(path_hash, change);
            }
        }

        let set = BlockStateSet {
            block_hash: *block_hash,
            previous_hash: *previous_block_hash,
            block_height,
            changes,
        };
        self.store
            .set(state_set_key(&self.chain_id, block_hash), codec::encode(&set)?)
            .await?;
        index.reset_window(previous_block_hash).await?;

        info!(
            block = %block_hash,
            height = block_height,
            paths = set.len(),
            "sealed block state set"
        );
        Ok(set)
    }

    /// Fetch the sealed state set for a block. `None` if the block was
    /// never sealed here (e.g. it lives on the canonical chain beyond the
    /// retained window).
    pub async fn get(&self, block_hash: &Hash256) -> Result<Option<BlockStateSet>, TerraceError> {
        let row = self.store.get(&state_set_key(&self.chain_id, block_hash)).await?;
        row.map(|bytes| codec::decode(&bytes)).transpose()
    }

    /// Collapse a sealed block's changes into the committed
    /// [`VersionedState`] rows. Called when the block becomes part of the
    /// best chain.
    ///
    /// Returns the number of paths committed.
    ///
    /// # Errors
    ///
    /// [`StateError::PointerNotFound`] if a change's pointer has no bytes
    /// in the store — that is store corruption, never an empty value.
    pub async fn commit(&self, block_hash: &Hash256) -> Result<usize, TerraceError> {
        let set = self.get(block_hash).await?.ok_or_else(|| {
            TerraceError::Storage(format!("no sealed state set for block {block_hash}"))
        })?;

        for (path_hash, change) in &set.changes {
            let value = self
                .store
                .get(&change.after)
                .await?
                .ok_or_else(|| StateError::PointerNotFound(change.after.to_string()))?;
            let versioned = VersionedState {
                value: value.to_vec(),
                block_hash: *block_hash,
                block_height: set.block_height,
            };
            self.store
                .set(versioned_key(&self.chain_id, path_hash), codec::encode(&versioned)?)
                .await?;
            debug!(path = %path_hash, height = set.block_height, "committed versioned state");
        }

        info!(block = %block_hash, paths = set.len(), "committed block to best chain");
        Ok(set.len())
    }

    /// Committed best-chain value for a path, if any block writing it has
    /// been committed.
    pub async fn get_versioned(
        &self,
        path_hash: &Hash256,
    ) -> Result<Option<VersionedState>, TerraceError> {
        let row = self.store.get(&versioned_key(&self.chain_id, path_hash)).await?;
        row.map(|bytes| codec::decode(&bytes)).transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::HistoryRetention;
    use crate::memory::MemoryContentStore;
    use bytes::Bytes;

    fn h(seed: u8) -> Hash256 {
        Hash256([seed; 32])
    }

    fn fixture() -> (Arc<MemoryContentStore>, PathPointerIndex, WorldStateStore) {
        let store = Arc::new(MemoryContentStore::new());
        let index = PathPointerIndex::new(
            store.clone(),
            h(0x01),
            HistoryRetention::RollbackWindow,
        );
        let world = WorldStateStore::new(store.clone(), h(0x01));
        (store, index, world)
    }

    // ------------------------------------------------------------------
    // Sealing
    // ------------------------------------------------------------------

    #[tokio::test]
    async fn seal_packages_window_changes() {
        let (_store, index, world) = fixture();
        let window = h(2);
        index.record_change(&h(10), None, h(20), &window).await.unwrap();
        index.record_change(&h(11), None, h(21), &window).await.unwrap();

        let set = world.seal(&index, &window, &h(3), 5).await.unwrap();
        assert_eq!(set.block_hash, h(3));
        assert_eq!(set.previous_hash, window);
        assert_eq!(set.block_height, 5);
        assert_eq!(set.len(), 2);
        assert_eq!(set.get_change(&h(10)).unwrap().after, h(20));
        assert_eq!(set.get_change(&h(11)).unwrap().after, h(21));
    }

    #[tokio::test]
    async fn seal_deduplicates_rewritten_paths() {
        let (_store, index, world) = fixture();
        let window = h(2);
        index.record_change(&h(10), None, h(20), &window).await.unwrap();
        index.record_change(&h(10), None, h(22), &window).await.unwrap();

        let set = world.seal(&index, &window, &h(3), 5).await.unwrap();
        assert_eq!(set.len(), 1);
        // The folded change carries the final pointer and the history.
        let change = set.get_change(&h(10)).unwrap();
        assert_eq!(change.after, h(22));
        assert_eq!(change.before, vec![h(20)]);
    }

    #[tokio::test]
    async fn seal_persists_and_resets_window() {
        let (_store, index, world) = fixture();
        let window = h(2);
        index.record_change(&h(10), None, h(20), &window).await.unwrap();
        world.seal(&index, &window, &h(3), 5).await.unwrap();

        let fetched = world.get(&h(3)).await.unwrap().unwrap();
        assert_eq!(fetched.len(), 1);
        assert!(index.changed_paths(&window).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn seal_empty_window_yields_empty_set() {
        let (_store, index, world) = fixture();
        let set = world.seal(&index, &h(2), &h(3), 5).await.unwrap();
        assert!(set.is_empty());
    }

    #[tokio::test]
    async fn get_unknown_block_returns_none() {
        let (_store, _index, world) = fixture();
        assert!(world.get(&h(99)).await.unwrap().is_none());
    }

    // ------------------------------------------------------------------
    // Commit
    // ------------------------------------------------------------------

    #[tokio::test]
    async fn commit_writes_versioned_rows() {
        let (store, index, world) = fixture();
        let window = h(2);
        store.set(h(20), Bytes::from_static(b"value-a")).await.unwrap();
        index.record_change(&h(10), None, h(20), &window).await.unwrap();
        world.seal(&index, &window, &h(3), 5).await.unwrap();

        let committed = world.commit(&h(3)).await.unwrap();
        assert_eq!(committed, 1);

        let versioned = world.get_versioned(&h(10)).await.unwrap().unwrap();
        assert_eq!(versioned.value, b"value-a");
        assert_eq!(versioned.block_hash, h(3));
        assert_eq!(versioned.block_height, 5);
    }

    #[tokio::test]
    async fn commit_overwrites_older_versioned_row() {
        let (store, index, world) = fixture();
        store.set(h(20), Bytes::from_static(b"old")).await.unwrap();
        store.set(h(21), Bytes::from_static(b"new")).await.unwrap();

        index.record_change(&h(10), None, h(20), &h(2)).await.unwrap();
        world.seal(&index, &h(2), &h(3), 5).await.unwrap();
        world.commit(&h(3)).await.unwrap();

        index.record_change(&h(10), None, h(21), &h(3)).await.unwrap();
        world.seal(&index, &h(3), &h(4), 6).await.unwrap();
        world.commit(&h(4)).await.unwrap();

        let versioned = world.get_versioned(&h(10)).await.unwrap().unwrap();
        assert_eq!(versioned.value, b"new");
        assert_eq!(versioned.block_height, 6);
    }

    #[tokio::test]
    async fn commit_unknown_block_errors() {
        let (_store, _index, world) = fixture();
        assert!(world.commit(&h(99)).await.is_err());
    }

    #[tokio::test]
    async fn commit_missing_pointer_bytes_is_corruption() {
        let (_store, index, world) = fixture();
        // Record a change whose pointer has no bytes behind it.
        index.record_change(&h(10), None, h(20), &h(2)).await.unwrap();
        world.seal(&index, &h(2), &h(3), 5).await.unwrap();

        let err = world.commit(&h(3)).await.unwrap_err();
        assert!(matches!(
            err,
            TerraceError::State(StateError::PointerNotFound(_))
        ));
    }

    #[tokio::test]
    async fn get_versioned_absent_returns_none() {
        let (_store, _index, world) = fixture();
        assert!(world.get_versioned(&h(10)).await.unwrap().is_none());
    }
}
