//! Recent in-memory aggregates.
//!
//! Holds values from the current and a few trailing windows that have not
//! been committed to the persistent store yet. Range resolution consults
//! this buffer before any stored result.

use crate::adapter::PointId;
use crate::aggregate::{AggregateEvent, DimensionalKey};
use crate::codec::KeyCodec;
use crate::error::Result;
use crate::store::{PointStore, StoreEntry};
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, warn};

#[derive(Debug, Default)]
pub struct AggregateBuffer {
    by_minute: RwLock<BTreeMap<i64, HashMap<DimensionalKey, AggregateEvent>>>,
}

impl AggregateBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Buffer an upstream aggregate, replacing any previous value for its key.
    pub fn insert(&self, event: AggregateEvent) {
        let mut by_minute = self.by_minute.write();
        by_minute
            .entry(event.timestamp())
            .or_default()
            .insert(event.key.clone(), event);
    }

    pub fn lookup(&self, key: &DimensionalKey) -> Option<AggregateEvent> {
        let by_minute = self.by_minute.read();
        by_minute.get(&key.timestamp)?.get(key).cloned()
    }

    pub fn len(&self) -> usize {
        self.by_minute.read().values().map(HashMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Write every buffered aggregate to `store` and drop what was written.
    ///
    /// Entries replaced while the write was in flight stay buffered. On a
    /// store error nothing is dropped. Returns the points that were written.
    pub async fn commit(&self, store: &dyn PointStore, codec: &KeyCodec) -> Result<Vec<PointId>> {
        let snapshot: Vec<AggregateEvent> = {
            let by_minute = self.by_minute.read();
            by_minute.values().flat_map(|m| m.values().cloned()).collect()
        };
        if snapshot.is_empty() {
            return Ok(Vec::new());
        }

        let mut entries = Vec::with_capacity(snapshot.len());
        let mut written = Vec::with_capacity(snapshot.len());
        for event in snapshot {
            let encoded = codec
                .encode_key(&event.key)
                .and_then(|key| Ok((key, codec.encode_value(&event)?)));
            match encoded {
                Ok((key, value)) => {
                    entries.push(StoreEntry {
                        bucket: codec.bucket_of(&event.key),
                        key,
                        value,
                    });
                    written.push(event);
                }
                Err(e) => {
                    // Unencodable events would never commit; drop them now.
                    warn!("Dropping buffered aggregate {}: {}", event.key, e);
                    self.remove_if_unchanged(&event);
                }
            }
        }

        let points = entries
            .iter()
            .map(|entry| PointId::new(entry.bucket, entry.key.clone()))
            .collect();
        store.put_batch(entries).await?;

        for event in &written {
            self.remove_if_unchanged(event);
        }
        debug!("Committed {} buffered aggregates", written.len());
        Ok(points)
    }

    fn remove_if_unchanged(&self, event: &AggregateEvent) {
        let mut by_minute = self.by_minute.write();
        let ts = event.timestamp();
        if let Some(minute) = by_minute.get_mut(&ts) {
            if minute.get(&event.key) == Some(event) {
                minute.remove(&event.key);
            }
            if minute.is_empty() {
                by_minute.remove(&ts);
            }
        }
    }
}
