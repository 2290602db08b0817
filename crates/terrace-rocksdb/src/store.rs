//! RocksDB-backed [`ContentAddressStore`].
//!
//! A thin durable key→value layer: one column family holding every
//! engine record under its 32-byte derived key. Record-family separation
//! happens in the key derivation itself, so no per-family column
//! families are needed here.
//!
//! Point gets and puts on RocksDB are short, memtable-bound operations,
//! so the trait methods call the database directly rather than hopping
//! to a blocking pool.

use std::path::Path;

use async_trait::async_trait;
use bytes::Bytes;
use rocksdb::{ColumnFamilyDescriptor, DB, Options, WriteBatch};
use tracing::info;

use terrace_core::error::TerraceError;
use terrace_core::traits::ContentAddressStore;
use terrace_core::types::Hash256;

const CF_CONTENT: &str = "content";

/// Persistent content store over a RocksDB database.
pub struct RocksContentStore {
    db: DB,
}

impl RocksContentStore {
    /// Open or create a database at the given path.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, TerraceError> {
        let mut db_opts = Options::default();
        db_opts.create_if_missing(true);
        db_opts.create_missing_column_families(true);

        let descriptors = vec![ColumnFamilyDescriptor::new(CF_CONTENT, Options::default())];
        let db = DB::open_cf_descriptors(&db_opts, path.as_ref(), descriptors)
            .map_err(|e| TerraceError::Storage(e.to_string()))?;

        info!(path = %path.as_ref().display(), "opened content store");
        Ok(Self { db })
    }

    /// Flush all in-memory buffers to disk.
    pub fn flush(&self) -> Result<(), TerraceError> {
        self.db
            .flush()
            .map_err(|e| TerraceError::Storage(e.to_string()))
    }

    /// Trigger manual compaction.
    ///
    /// Merges SSTables and reclaims space from deleted keys. Call during
    /// low-activity periods, e.g. after initial sync completes.
    pub fn compact(&self) -> Result<(), TerraceError> {
        let cf = self.cf()?;
        self.db.compact_range_cf(&cf, None::<&[u8]>, None::<&[u8]>);
        Ok(())
    }

    /// Write several entries atomically.
    pub fn set_batch(&self, entries: &[(Hash256, Bytes)]) -> Result<(), TerraceError> {
        let cf = self.cf()?;
        let mut batch = WriteBatch::default();
        for (key, value) in entries {
            batch.put_cf(cf, key.as_bytes(), value);
        }
        self.db
            .write(batch)
            .map_err(|e| TerraceError::Storage(e.to_string()))
    }

    fn cf(&self) -> Result<&rocksdb::ColumnFamily, TerraceError> {
        self.db
            .cf_handle(CF_CONTENT)
            .ok_or_else(|| TerraceError::Storage(format!("missing column family: {CF_CONTENT}")))
    }
}

#[async_trait]
impl ContentAddressStore for RocksContentStore {
    async fn get(&self, key: &Hash256) -> Result<Option<Bytes>, TerraceError> {
        let cf = self.cf()?;
        let row = self
            .db
            .get_cf(&cf, key.as_bytes())
            .map_err(|e| TerraceError::Storage(e.to_string()))?;
        Ok(row.map(Bytes::from))
    }

    async fn set(&self, key: Hash256, value: Bytes) -> Result<(), TerraceError> {
        let cf = self.cf()?;
        self.db
            .put_cf(&cf, key.as_bytes(), &value)
            .map_err(|e| TerraceError::Storage(e.to_string()))
    }

    async fn delete(&self, key: &Hash256) -> Result<(), TerraceError> {
        let cf = self.cf()?;
        self.db
            .delete_cf(&cf, key.as_bytes())
            .map_err(|e| TerraceError::Storage(e.to_string()))
    }
}
