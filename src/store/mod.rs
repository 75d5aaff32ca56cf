//! Persistent point stores.
//!
//! The engine only needs exact `(bucket, key)` lookups from the persistent
//! side; compaction and bucket layout belong to the store itself. Two
//! implementations are provided:
//! - `memory`: process-local map, used for tests and ephemeral runs
//! - `duckdb`: a single `kv_store` table in an embedded DuckDB database

pub mod duckdb;
pub mod memory;

pub use self::duckdb::DuckDbStore;
pub use self::memory::MemoryStore;

use crate::codec::BucketId;
use crate::config::StorageConfig;
use crate::error::{Error, Result};
use async_trait::async_trait;
use bytes::Bytes;
use std::sync::Arc;

/// One stored key/value pair addressed by bucket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreEntry {
    pub bucket: BucketId,
    pub key: Bytes,
    pub value: Bytes,
}

/// Bucketed key/value store holding committed aggregates.
#[async_trait]
pub trait PointStore: Send + Sync + 'static {
    /// Exact lookup. `Ok(None)` means the key is genuinely absent.
    async fn get(&self, bucket: BucketId, key: &[u8]) -> Result<Option<Bytes>>;

    /// Insert or overwrite a single entry.
    async fn put(&self, bucket: BucketId, key: Bytes, value: Bytes) -> Result<()> {
        self.put_batch(vec![StoreEntry { bucket, key, value }]).await
    }

    /// Insert or overwrite entries atomically.
    async fn put_batch(&self, entries: Vec<StoreEntry>) -> Result<()>;
}

/// Open the store selected by `storage.engine`.
pub fn open_store(config: &StorageConfig) -> Result<Arc<dyn PointStore>> {
    match config.engine.as_str() {
        "memory" => Ok(Arc::new(MemoryStore::new())),
        "duckdb" => Ok(Arc::new(DuckDbStore::open(&config.connection)?)),
        other => Err(Error::Config(format!("unknown storage engine '{}'", other))),
    }
}
