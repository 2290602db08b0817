//! Chain bookkeeping and block-linkage enforcement.
//!
//! [`ChainManager`] is the single gate that keeps a state mutation from
//! ever being durably recorded against a chain it does not causally
//! extend: a header is accepted only at the exact next height with a
//! matching previous hash. Every other component assumes this invariant
//! already holds for headers reaching it through this path.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::{debug, info};

use terrace_core::error::{ChainError, TerraceError};
use terrace_core::pointer::{chain_key, height_index_key};
use terrace_core::traits::{ChainAuthority, ContentAddressStore};
use terrace_core::types::{BlockHeader, Chain, Hash256};

use crate::codec;

/// Registers chains and appends block headers under strict linkage checks.
pub struct ChainManager {
    store: Arc<dyn ContentAddressStore>,
    /// Serializes the check-then-write sequence of header appends. The
    /// design assumes one miner/executor per chain; the lock makes the
    /// sequence safe even if that assumption slips.
    append_lock: Mutex<()>,
}

impl ChainManager {
    /// Create a chain manager over the given store.
    pub fn new(store: Arc<dyn ContentAddressStore>) -> Self {
        Self {
            store,
            append_lock: Mutex::new(()),
        }
    }

    /// Register a chain, or return the existing record if it is already
    /// registered (idempotent).
    pub async fn create_chain(&self, chain_id: Hash256) -> Result<Chain, TerraceError> {
        if let Some(existing) = self.get_chain(&chain_id).await? {
            return Ok(existing);
        }
        let chain = Chain::new(chain_id);
        self.store
            .set(chain_key(&chain_id), codec::encode(&chain)?)
            .await?;
        info!(chain = %chain_id, "registered chain");
        Ok(chain)
    }

    /// Fetch a chain's bookkeeping record.
    pub async fn get_chain(&self, chain_id: &Hash256) -> Result<Option<Chain>, TerraceError> {
        let row = self.store.get(&chain_key(chain_id)).await?;
        row.map(|bytes| codec::decode(&bytes)).transpose()
    }

    /// Accept a block header, advancing the chain by exactly one height.
    ///
    /// Checks, in order: the chain is registered (`ChainNotFound`); the
    /// header's index equals the current height — no gaps, no height
    /// reuse (`InvalidBlockIndex`); the header's previous hash matches
    /// the last accepted block, with `Hash256::ZERO` standing in for an
    /// empty chain (`Disconnected`). A failed check leaves the record
    /// untouched.
    pub async fn append_block_header(&self, header: &BlockHeader) -> Result<(), TerraceError> {
        let _guard = self.append_lock.lock().await;

        let mut chain = self
            .get_chain(&header.chain_id)
            .await?
            .ok_or_else(|| ChainError::ChainNotFound(header.chain_id.to_string()))?;

        if header.index != chain.current_height {
            return Err(ChainError::InvalidBlockIndex {
                expected: chain.current_height,
                got: header.index,
            }
            .into());
        }
        if chain.last_block_hash != header.previous_hash {
            return Err(ChainError::Disconnected {
                expected: chain.last_block_hash.to_string(),
                got: header.previous_hash.to_string(),
            }
            .into());
        }

        let block_hash = header.hash();
        chain.current_height += 1;
        chain.last_block_hash = block_hash;

        self.store
            .set(
                height_index_key(&header.chain_id, header.index),
                codec::hash_bytes(&block_hash),
            )
            .await?;
        self.store
            .set(chain_key(&header.chain_id), codec::encode(&chain)?)
            .await?;

        debug!(
            chain = %header.chain_id,
            height = header.index,
            block = %block_hash,
            "appended block header"
        );
        Ok(())
    }

    /// Canonical block hash at a height, via the O(1) height index.
    pub async fn get_canonical_hash_at(
        &self,
        chain_id: &Hash256,
        height: u64,
    ) -> Result<Option<Hash256>, TerraceError> {
        let row = self.store.get(&height_index_key(chain_id, height)).await?;
        row.map(|bytes| codec::hash_from_bytes(&bytes)).transpose()
    }
}

/// Adapter exposing one chain of a [`ChainManager`] as a
/// [`ChainAuthority`] for the canonical height cache.
pub struct ManagedChainAuthority {
    manager: Arc<ChainManager>,
    chain_id: Hash256,
}

impl ManagedChainAuthority {
    /// Bind an authority view to one chain.
    pub fn new(manager: Arc<ChainManager>, chain_id: Hash256) -> Self {
        Self { manager, chain_id }
    }
}

#[async_trait]
impl ChainAuthority for ManagedChainAuthority {
    async fn canonical_hash_at(&self, height: u64) -> Result<Option<Hash256>, TerraceError> {
        self.manager.get_canonical_hash_at(&self.chain_id, height).await
    }
}
