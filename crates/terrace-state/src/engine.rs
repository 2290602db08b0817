//! Engine facade wiring the state components together for one chain.
//!
//! [`StateEngine`] composes the chain manager, path-pointer index, world
//! state store, resolver, and canonical height cache, and owns the
//! window cursor: the previous-block hash the current round of writes
//! accumulates against.
//!
//! Concurrency contract: one logical writer per chain — one block is
//! built and validated at a time, and `rollback_window` must complete
//! before the window is written again. Concurrent readers are safe
//! throughout.

use std::sync::Arc;

use bytes::Bytes;
use parking_lot::RwLock;
use tracing::info;

use terrace_core::error::{ChainError, StateError, TerraceError};
use terrace_core::pointer::derive_pointer;
use terrace_core::traits::ContentAddressStore;
use terrace_core::types::{BlockHeader, BlockStateSet, Hash256, Path, VersionedState};

use crate::canonical_cache::{CacheState, CanonicalHeightCache};
use crate::chain::{ChainManager, ManagedChainAuthority};
use crate::change_log::PathPointerIndex;
use crate::config::StateConfig;
use crate::resolver::StateResolver;
use crate::world_state::WorldStateStore;

/// Per-chain handle over the versioned world state.
pub struct StateEngine {
    chain_id: Hash256,
    store: Arc<dyn ContentAddressStore>,
    chains: Arc<ChainManager>,
    index: PathPointerIndex,
    world: WorldStateStore,
    resolver: StateResolver,
    cache: CanonicalHeightCache,
    /// Previous-block hash of the active change window.
    cursor: RwLock<Hash256>,
}

impl StateEngine {
    /// Open (registering if needed) a chain and return a ready-to-use
    /// engine handle for it.
    pub async fn open(
        store: Arc<dyn ContentAddressStore>,
        chain_id: Hash256,
        config: StateConfig,
    ) -> Result<Self, TerraceError> {
        let chains = Arc::new(ChainManager::new(store.clone()));
        let chain = chains.create_chain(chain_id).await?;

        let index = PathPointerIndex::new(store.clone(), chain_id, config.history);
        let world = WorldStateStore::new(store.clone(), chain_id);
        let resolver = StateResolver::new(store.clone(), world.clone(), config.max_history_walk);
        let authority = Arc::new(ManagedChainAuthority::new(chains.clone(), chain_id));
        let cache = CanonicalHeightCache::new(authority, config.retention_window);

        info!(chain = %chain_id, height = chain.current_height, "opened state engine");
        Ok(Self {
            chain_id,
            store,
            chains,
            index,
            world,
            resolver,
            cache,
            cursor: RwLock::new(chain.last_block_hash),
        })
    }

    /// Chain this engine is bound to.
    pub fn chain_id(&self) -> Hash256 {
        self.chain_id
    }

    /// Previous-block hash of the active change window.
    pub fn cursor(&self) -> Hash256 {
        *self.cursor.read()
    }

    /// Write a value for a path within the active window.
    ///
    /// Stores the bytes under the pointer derived from the path and the
    /// window's previous-block hash, then records the transition in the
    /// change log. Returns the pointer.
    pub async fn set_state(&self, path: &Path, value: Bytes) -> Result<Hash256, TerraceError> {
        let path_hash = path.path_hash();
        let previous = self.cursor();
        let pointer = derive_pointer(&path_hash, &previous);

        self.store.set(pointer, value).await?;
        let before = self.index.get_pointer(&path_hash).await?;
        self.index
            .record_change(&path_hash, before, pointer, &previous)
            .await?;
        Ok(pointer)
    }

    /// Current pointer for a path, if it has ever been written.
    pub async fn get_pointer(&self, path: &Path) -> Result<Option<Hash256>, TerraceError> {
        self.index.get_pointer(&path.path_hash()).await
    }

    /// Current value of a path via the pointer index.
    ///
    /// A pointer whose bytes are missing from the store is corruption
    /// ([`StateError::PointerNotFound`]), never an empty value.
    pub async fn get_value(&self, path: &Path) -> Result<Option<Bytes>, TerraceError> {
        let path_hash = path.path_hash();
        match self.index.get_pointer(&path_hash).await? {
            None => Ok(None),
            Some(pointer) => {
                let value = self
                    .store
                    .get(&pointer)
                    .await?
                    .ok_or_else(|| StateError::PointerNotFound(pointer.to_string()))?;
                Ok(Some(value))
            }
        }
    }

    /// Undo every write of the active window. Used when a candidate block
    /// fails validation after partial execution.
    pub async fn rollback_window(&self) -> Result<usize, TerraceError> {
        let previous = self.cursor();
        self.index.rollback(&previous).await
    }

    /// Reject a header that belongs to a different chain than this
    /// handle. The handle is the chain context; accepting a foreign
    /// header here would advance the other chain's record and poison
    /// this chain's height cache.
    fn check_chain(&self, header: &BlockHeader) -> Result<(), ChainError> {
        if header.chain_id != self.chain_id {
            return Err(ChainError::WrongChain {
                expected: self.chain_id.to_string(),
                got: header.chain_id.to_string(),
            });
        }
        Ok(())
    }

    /// Seal the active window into the executed block's state set and
    /// advance the cursor to that block.
    ///
    /// The header must belong to this handle's chain, and its previous
    /// hash must equal the cursor; anything else means the caller sealed
    /// against a block this window does not extend.
    pub async fn seal_block(&self, header: &BlockHeader) -> Result<BlockStateSet, TerraceError> {
        self.check_chain(header)?;
        let previous = self.cursor();
        if header.previous_hash != previous {
            return Err(ChainError::Disconnected {
                expected: previous.to_string(),
                got: header.previous_hash.to_string(),
            }
            .into());
        }

        let block_hash = header.hash();
        let set = self
            .world
            .seal(&self.index, &previous, &block_hash, header.index)
            .await?;
        *self.cursor.write() = block_hash;
        Ok(set)
    }

    /// Accept a block header: enforce chain identity and linkage, then
    /// feed the canonical height cache.
    pub async fn append_block_header(&self, header: &BlockHeader) -> Result<(), TerraceError> {
        self.check_chain(header)?;
        self.chains.append_block_header(header).await?;
        self.cache.on_new_header(header).await;
        Ok(())
    }

    /// Fold a sealed block's changes into the committed best-chain state.
    pub async fn commit_block(&self, block_hash: &Hash256) -> Result<usize, TerraceError> {
        self.world.commit(block_hash).await
    }

    /// Sealed state set for a block, if retained.
    pub async fn get_block_state_set(
        &self,
        block_hash: &Hash256,
    ) -> Result<Option<BlockStateSet>, TerraceError> {
        self.world.get(block_hash).await
    }

    /// Value of a path as visible at `(target_height, target_block_hash)`.
    pub async fn get_state(
        &self,
        path: &Path,
        target_height: u64,
        target_block_hash: &Hash256,
    ) -> Result<Option<VersionedState>, TerraceError> {
        self.resolver
            .get_state(&path.path_hash(), target_height, target_block_hash)
            .await
    }

    /// Canonical hash at a height from the cache window.
    pub fn get_hash_by_height(&self, height: u64) -> Option<Hash256> {
        self.cache.get_hash_by_height(height)
    }

    /// Current state of the canonical height cache.
    pub fn cache_state(&self) -> CacheState {
        self.cache.state()
    }
}
