use crate::codec::BucketId;
use crate::error::Result;
use crate::store::{PointStore, StoreEntry};
use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::RwLock;
use std::collections::HashMap;

/// In-process point store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RwLock<HashMap<(BucketId, Bytes), Bytes>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

#[async_trait]
impl PointStore for MemoryStore {
    async fn get(&self, bucket: BucketId, key: &[u8]) -> Result<Option<Bytes>> {
        let entries = self.entries.read();
        Ok(entries.get(&(bucket, Bytes::copy_from_slice(key))).cloned())
    }

    async fn put_batch(&self, batch: Vec<StoreEntry>) -> Result<()> {
        let mut entries = self.entries.write();
        for entry in batch {
            entries.insert((entry.bucket, entry.key), entry.value);
        }
        Ok(())
    }
}
