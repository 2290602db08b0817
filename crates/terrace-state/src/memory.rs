//! In-memory content-address store.
//!
//! Backs tests and light embeddings; the production node uses the
//! RocksDB implementation (terrace-rocksdb). No persistence, unbounded
//! memory growth.

use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;

use terrace_core::error::TerraceError;
use terrace_core::traits::ContentAddressStore;
use terrace_core::types::Hash256;

/// In-memory `ContentAddressStore` backed by a concurrent map.
#[derive(Default)]
pub struct MemoryContentStore {
    entries: DashMap<Hash256, Bytes>,
}

impl MemoryContentStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the store holds no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl ContentAddressStore for MemoryContentStore {
    async fn get(&self, key: &Hash256) -> Result<Option<Bytes>, TerraceError> {
        Ok(self.entries.get(key).map(|entry| entry.value().clone()))
    }

    async fn set(&self, key: Hash256, value: Bytes) -> Result<(), TerraceError> {
        self.entries.insert(key, value);
        Ok(())
    }

    async fn delete(&self, key: &Hash256) -> Result<(), TerraceError> {
        self.entries.remove(key);
        Ok(())
    }
}
