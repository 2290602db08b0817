//! Versioned state resolution across heights and forks.
//!
//! Given a path, a target height, and a target block hash, the resolver
//! returns the value visible at that point: the committed best-chain
//! value when nothing more specific exists, otherwise the first change
//! found walking block state sets backward from the target block. This
//! gives read-your-writes consistency for any block between the
//! best-chain tip and the retention depth at O(depth) cost, without
//! materializing a snapshot per block.

use std::sync::Arc;

use tracing::{debug, warn};

use terrace_core::error::{StateError, TerraceError};
use terrace_core::traits::ContentAddressStore;
use terrace_core::types::{Hash256, VersionedState};

use crate::world_state::WorldStateStore;

/// Resolves a path's value as of an arbitrary block.
#[derive(Clone)]
pub struct StateResolver {
    store: Arc<dyn ContentAddressStore>,
    world: WorldStateStore,
    max_walk: u64,
}

impl StateResolver {
    /// Create a resolver with a hard bound on the backward walk.
    pub fn new(
        store: Arc<dyn ContentAddressStore>,
        world: WorldStateStore,
        max_walk: u64,
    ) -> Self {
        Self {
            store,
            world,
            max_walk,
        }
    }

    /// Value of a path as visible at `(target_height, target_block_hash)`.
    ///
    /// Returns `Ok(None)` for a path that has never been written anywhere
    /// reachable. Fails with [`StateError::HistoryUnavailable`] when the
    /// committed value has already superseded the requested height, or
    /// when the backward walk exceeds its bound before reaching the
    /// committed checkpoint.
    pub async fn get_state(
        &self,
        path_hash: &Hash256,
        target_height: u64,
        target_block_hash: &Hash256,
    ) -> Result<Option<VersionedState>, TerraceError> {
        let committed = self.world.get_versioned(path_hash).await?;

        if let Some(best) = &committed {
            if best.block_hash == *target_block_hash {
                // Canonical tip case: the committed row is the answer.
                return Ok(Some(best.clone()));
            }
            if best.block_height > target_height {
                // The committed value has superseded the requested height
                // and deltas that far back are not retained.
                return Err(StateError::HistoryUnavailable {
                    requested: target_height,
                }
                .into());
            }
        }

        let mut current = self.world.get(target_block_hash).await?;
        if current.is_none() {
            // Target has no delta of its own; the committed value (or
            // nothing) is as specific as it gets.
            return Ok(committed);
        }

        let mut steps = 0u64;
        while let Some(set) = current {
            if let Some(best) = &committed {
                if set.block_height <= best.block_height {
                    // Reached the committed checkpoint without finding a
                    // more specific write.
                    break;
                }
            }
            if steps >= self.max_walk {
                warn!(
                    path = %path_hash,
                    requested = target_height,
                    walked = steps,
                    "historical walk exceeded bound"
                );
                return Err(StateError::HistoryUnavailable {
                    requested: target_height,
                }
                .into());
            }

            if let Some(change) = set.get_change(path_hash) {
                let value = self
                    .store
                    .get(&change.after)
                    .await?
                    .ok_or_else(|| StateError::PointerNotFound(change.after.to_string()))?;
                debug!(
                    path = %path_hash,
                    found_at = set.block_height,
                    walked = steps,
                    "resolved historical state"
                );
                return Ok(Some(VersionedState {
                    value: value.to_vec(),
                    block_hash: set.block_hash,
                    block_height: set.block_height,
                }));
            }

            steps += 1;
            current = self.world.get(&set.previous_hash).await?;
        }

        Ok(committed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec;
    use crate::memory::MemoryContentStore;
    use bytes::Bytes;
    use std::collections::HashMap;
    use terrace_core::pointer::{state_set_key, versioned_key};
    use terrace_core::types::{BlockStateSet, Change};

    const CHAIN: Hash256 = Hash256([0x01; 32]);

    fn h(seed: u8) -> Hash256 {
        Hash256([seed; 32])
    }

    fn fixture(max_walk: u64) -> (Arc<MemoryContentStore>, StateResolver) {
        let store = Arc::new(MemoryContentStore::new());
        let world = WorldStateStore::new(store.clone(), CHAIN);
        let resolver = StateResolver::new(store.clone(), world, max_walk);
        (store, resolver)
    }

    /// Persist a sealed state set directly, bypassing the change log.
    async fn put_set(
        store: &MemoryContentStore,
        block_hash: Hash256,
        previous_hash: Hash256,
        height: u64,
        entries: &[(Hash256, Hash256)],
    ) {
        let mut changes = HashMap::new();
        for (path, pointer) in entries {
            changes.insert(*path, Change::new(*pointer, previous_hash));
        }
        let set = BlockStateSet {
            block_hash,
            previous_hash,
            block_height: height,
            changes,
        };
        store
            .set(state_set_key(&CHAIN, &block_hash), codec::encode(&set).unwrap())
            .await
            .unwrap();
    }

    /// Persist a committed versioned row directly.
    async fn put_committed(
        store: &MemoryContentStore,
        path: Hash256,
        value: &[u8],
        block_hash: Hash256,
        height: u64,
    ) {
        let versioned = VersionedState {
            value: value.to_vec(),
            block_hash,
            block_height: height,
        };
        store
            .set(versioned_key(&CHAIN, &path), codec::encode(&versioned).unwrap())
            .await
            .unwrap();
    }

    /// Committed height 100 for the key, block state sets at 101..=105
    /// where only 103 rewrites the key.
    async fn historical_fixture(store: &MemoryContentStore, key: Hash256) {
        put_committed(store, key, b"v100", h(100), 100).await;

        let pointer_103 = h(203);
        store.set(pointer_103, Bytes::from_static(b"v103")).await.unwrap();

        put_set(store, h(101), h(100), 101, &[]).await;
        put_set(store, h(102), h(101), 102, &[]).await;
        put_set(store, h(103), h(102), 103, &[(key, pointer_103)]).await;
        put_set(store, h(104), h(103), 104, &[]).await;
        put_set(store, h(105), h(104), 105, &[]).await;
    }

    // ------------------------------------------------------------------
    // Historical read correctness
    // ------------------------------------------------------------------

    #[tokio::test]
    async fn walk_finds_intermediate_rewrite() {
        let (store, resolver) = fixture(64);
        let key = h(10);
        historical_fixture(&store, key).await;

        let state = resolver.get_state(&key, 105, &h(105)).await.unwrap().unwrap();
        assert_eq!(state.value, b"v103");
        assert_eq!(state.block_hash, h(103));
        assert_eq!(state.block_height, 103);
    }

    #[tokio::test]
    async fn walk_falls_through_to_committed_value() {
        let (store, resolver) = fixture(64);
        let key = h(10);
        historical_fixture(&store, key).await;

        // Height 101 does not mutate the key and its ancestor chain
        // bottoms out at the committed checkpoint.
        let state = resolver.get_state(&key, 101, &h(101)).await.unwrap().unwrap();
        assert_eq!(state.value, b"v100");
        assert_eq!(state.block_height, 100);
    }

    #[tokio::test]
    async fn canonical_tip_hit_returns_committed_directly() {
        let (store, resolver) = fixture(64);
        let key = h(10);
        put_committed(&store, key, b"v100", h(100), 100).await;

        let state = resolver.get_state(&key, 100, &h(100)).await.unwrap().unwrap();
        assert_eq!(state.value, b"v100");
    }

    #[tokio::test]
    async fn no_delta_for_target_falls_back_to_committed() {
        let (store, resolver) = fixture(64);
        let key = h(10);
        put_committed(&store, key, b"v100", h(100), 100).await;

        // No state set exists for the target block at all.
        let state = resolver.get_state(&key, 120, &h(120)).await.unwrap().unwrap();
        assert_eq!(state.value, b"v100");
    }

    #[tokio::test]
    async fn unknown_key_resolves_to_none() {
        let (_store, resolver) = fixture(64);
        assert!(resolver.get_state(&h(77), 10, &h(10)).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn walk_without_committed_checkpoint_finds_write() {
        let (store, resolver) = fixture(64);
        let key = h(10);
        let pointer = h(200);
        store.set(pointer, Bytes::from_static(b"early")).await.unwrap();
        put_set(&store, h(1), Hash256::ZERO, 1, &[(key, pointer)]).await;
        put_set(&store, h(2), h(1), 2, &[]).await;

        let state = resolver.get_state(&key, 2, &h(2)).await.unwrap().unwrap();
        assert_eq!(state.value, b"early");
        assert_eq!(state.block_height, 1);
    }

    // ------------------------------------------------------------------
    // Failure paths
    // ------------------------------------------------------------------

    #[tokio::test]
    async fn superseded_height_is_history_unavailable() {
        let (store, resolver) = fixture(64);
        let key = h(10);
        // Best chain has advanced to 106; height 50 is gone.
        put_committed(&store, key, b"v106", h(106), 106).await;

        let err = resolver.get_state(&key, 50, &h(50)).await.unwrap_err();
        assert!(matches!(
            err,
            TerraceError::State(StateError::HistoryUnavailable { requested: 50 })
        ));
    }

    #[tokio::test]
    async fn walk_bound_is_enforced() {
        let (store, resolver) = fixture(2);
        let key = h(10);
        // Five sets, none touching the key, no committed checkpoint: an
        // unbounded walk would scan all of them.
        let mut prev = Hash256::ZERO;
        for height in 1..=5u8 {
            put_set(&store, h(height), prev, height as u64, &[]).await;
            prev = h(height);
        }

        let err = resolver.get_state(&key, 5, &h(5)).await.unwrap_err();
        assert!(matches!(
            err,
            TerraceError::State(StateError::HistoryUnavailable { requested: 5 })
        ));
    }

    #[tokio::test]
    async fn missing_pointer_bytes_is_corruption() {
        let (store, resolver) = fixture(64);
        let key = h(10);
        // The set references a pointer with no bytes behind it.
        put_set(&store, h(1), Hash256::ZERO, 1, &[(key, h(200))]).await;

        let err = resolver.get_state(&key, 1, &h(1)).await.unwrap_err();
        assert!(matches!(
            err,
            TerraceError::State(StateError::PointerNotFound(_))
        ));
    }

    #[tokio::test]
    async fn fork_sibling_resolves_its_own_write() {
        let (store, resolver) = fixture(64);
        let key = h(10);
        // Two competing blocks at height 2 write different values.
        let pointer_a = h(201);
        let pointer_b = h(202);
        store.set(pointer_a, Bytes::from_static(b"fork-a")).await.unwrap();
        store.set(pointer_b, Bytes::from_static(b"fork-b")).await.unwrap();
        put_set(&store, h(1), Hash256::ZERO, 1, &[]).await;
        put_set(&store, h(21), h(1), 2, &[(key, pointer_a)]).await;
        put_set(&store, h(22), h(1), 2, &[(key, pointer_b)]).await;

        let a = resolver.get_state(&key, 2, &h(21)).await.unwrap().unwrap();
        let b = resolver.get_state(&key, 2, &h(22)).await.unwrap().unwrap();
        assert_eq!(a.value, b"fork-a");
        assert_eq!(b.value, b"fork-b");
    }
}
