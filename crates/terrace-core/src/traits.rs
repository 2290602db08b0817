//! Trait interfaces at the engine's external seams.
//!
//! - [`ContentAddressStore`] — the byte-oriented persistence layer the
//!   engine writes every record through (terrace-state provides an
//!   in-memory implementation, terrace-rocksdb a persistent one).
//! - [`ChainAuthority`] — the authoritative canonical-chain query used
//!   only while the height cache recovers from a fork switch.

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::TerraceError;
use crate::types::Hash256;

/// Byte-oriented key→value store keyed by content hashes.
///
/// Keys are always hashes produced by the pointer/key derivation
/// functions in [`pointer`](crate::pointer); values are opaque serialized
/// records. Every call may suspend: callers must not assume synchronous
/// completion.
#[async_trait]
pub trait ContentAddressStore: Send + Sync {
    /// Fetch the bytes stored under a key. `None` if absent.
    async fn get(&self, key: &Hash256) -> Result<Option<Bytes>, TerraceError>;

    /// Store bytes under a key, overwriting any previous value.
    async fn set(&self, key: Hash256, value: Bytes) -> Result<(), TerraceError>;

    /// Remove the entry under a key. Removing an absent key is not an error.
    async fn delete(&self, key: &Hash256) -> Result<(), TerraceError>;
}

/// Authoritative canonical-chain lookup.
///
/// Consumed only during fork refill, sequentially over a bounded
/// retention window. `None` means the authority has no block at that
/// height (yet).
#[async_trait]
pub trait ChainAuthority: Send + Sync {
    /// Canonical block hash at a height.
    async fn canonical_hash_at(&self, height: u64) -> Result<Option<Hash256>, TerraceError>;
}
