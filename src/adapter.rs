//! Point-query store adapter.
//!
//! Registered point queries are resolved asynchronously against the
//! persistent store. Each point's `processed`/`result` pair lives behind a
//! single lock in a shared slot, so a reader sees either the complete
//! outcome of a lookup or nothing. Removing a point from the pending set
//! does not cancel its lookup; the task keeps the slot alive and its late
//! write simply has no reader.
//!
//! Lookups are spawned on the runtime the adapter was built in (or the one
//! given to [`PointQueryAdapter::with_handle`]), so registration itself is
//! plain synchronous code and may be called from any thread.

use crate::aggregate::{AggregateEvent, DimensionalKey};
use crate::buffer::AggregateBuffer;
use crate::codec::BucketId;
use crate::store::PointStore;
use bytes::Bytes;
use futures::future::join_all;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Value identity of a point lookup.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PointId {
    pub bucket: BucketId,
    pub key: Bytes,
}

impl PointId {
    pub fn new(bucket: BucketId, key: Bytes) -> Self {
        Self { bucket, key }
    }
}

/// Outcome of a point lookup as seen by readers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PointState {
    pub processed: bool,
    /// Raw stored value; `None` once processed means absent (or failed).
    pub result: Option<Bytes>,
}

#[derive(Debug, Default)]
struct SlotInner {
    state: PointState,
    in_flight: bool,
    /// The running (or last) lookup may predate a store write
    stale: bool,
}

#[derive(Debug, Default)]
pub struct PointSlot {
    inner: Mutex<SlotInner>,
}

impl PointSlot {
    pub fn state(&self) -> PointState {
        self.inner.lock().state.clone()
    }

    /// Claim the slot for a lookup. False if one is already running.
    fn begin_lookup(&self) -> bool {
        let mut inner = self.inner.lock();
        if inner.in_flight {
            return false;
        }
        inner.in_flight = true;
        inner.stale = false;
        true
    }

    /// Like `begin_lookup`, but a running lookup is flagged stale so the
    /// next refresh reads the point again.
    fn begin_or_mark_stale(&self) -> bool {
        let mut inner = self.inner.lock();
        if inner.in_flight {
            inner.stale = true;
            return false;
        }
        inner.in_flight = true;
        inner.stale = false;
        true
    }

    /// Idle and either stale, never looked up, or resolved to nothing.
    fn needs_refresh(&self) -> bool {
        let inner = self.inner.lock();
        !inner.in_flight && (inner.stale || !inner.state.processed || inner.state.result.is_none())
    }

    fn abandon_lookup(&self) {
        self.inner.lock().in_flight = false;
    }

    fn resolve(&self, result: Option<Bytes>) {
        let mut inner = self.inner.lock();
        inner.state = PointState {
            processed: true,
            result,
        };
        inner.in_flight = false;
    }
}

/// A single-timestamp lookup owned by a range query.
#[derive(Debug, Clone)]
pub struct PointQuery {
    pub id: PointId,
    pub timestamp: i64,
    slot: Arc<PointSlot>,
}

impl PointQuery {
    pub fn new(id: PointId, timestamp: i64, slot: Arc<PointSlot>) -> Self {
        Self { id, timestamp, slot }
    }

    pub fn bucket(&self) -> BucketId {
        self.id.bucket
    }

    pub fn key(&self) -> &Bytes {
        &self.id.key
    }

    pub fn state(&self) -> PointState {
        self.slot.state()
    }
}

pub struct PointQueryAdapter {
    store: Arc<dyn PointStore>,
    buffer: Arc<AggregateBuffer>,
    pending: Mutex<HashMap<PointId, Arc<PointSlot>>>,
    in_flight: Mutex<Vec<JoinHandle<()>>>,
    runtime: Option<Handle>,
}

impl PointQueryAdapter {
    /// Lookups run on the current tokio runtime, if there is one.
    pub fn new(store: Arc<dyn PointStore>, buffer: Arc<AggregateBuffer>) -> Self {
        Self {
            store,
            buffer,
            pending: Mutex::new(HashMap::new()),
            in_flight: Mutex::new(Vec::new()),
            runtime: Handle::try_current().ok(),
        }
    }

    /// Run lookups on `handle` instead.
    pub fn with_handle(mut self, handle: Handle) -> Self {
        self.runtime = Some(handle);
        self
    }

    pub fn store(&self) -> &Arc<dyn PointStore> {
        &self.store
    }

    pub fn buffer(&self) -> &Arc<AggregateBuffer> {
        &self.buffer
    }

    /// Start resolving a point, or share the slot of an identical pending one.
    ///
    /// Without a runtime the point stays unprocessed until a later
    /// [`refresh_misses`](Self::refresh_misses) can spawn its lookup.
    pub fn register_point_query(&self, id: PointId) -> Arc<PointSlot> {
        let slot = {
            let mut pending = self.pending.lock();
            if let Some(slot) = pending.get(&id) {
                return Arc::clone(slot);
            }
            let slot = Arc::new(PointSlot::default());
            pending.insert(id.clone(), Arc::clone(&slot));
            slot
        };
        self.spawn_lookup(id, Arc::clone(&slot));
        slot
    }

    /// Drop a point from the pending set. Returns whether it was pending.
    pub fn unregister(&self, id: &PointId) -> bool {
        self.pending.lock().remove(id).is_some()
    }

    pub fn is_pending(&self, id: &PointId) -> bool {
        self.pending.lock().contains_key(id)
    }

    pub fn pending_len(&self) -> usize {
        self.pending.lock().len()
    }

    /// Recent-buffer lookup for the exact key (timestamp included).
    pub fn lookup_buffered(&self, key: &DimensionalKey) -> Option<AggregateEvent> {
        self.buffer.lookup(key)
    }

    /// Re-issue lookups for pending points that resolved to nothing or
    /// were flagged stale, so values committed after registration can
    /// still be picked up.
    pub fn refresh_misses(&self) -> usize {
        let misses: Vec<(PointId, Arc<PointSlot>)> = {
            let pending = self.pending.lock();
            pending
                .iter()
                .filter(|(_, slot)| slot.needs_refresh())
                .map(|(id, slot)| (id.clone(), Arc::clone(slot)))
                .collect()
        };

        let mut count = 0;
        for (id, slot) in misses {
            if slot.begin_lookup() && self.start_lookup(id, slot) {
                count += 1;
            }
        }
        if count > 0 {
            debug!("Refreshing {} unresolved point queries", count);
        }
        count
    }

    /// Re-issue lookups for the given points if they are pending, e.g.
    /// after their values were committed over an earlier stored result.
    ///
    /// A point whose lookup is still running is flagged stale instead and
    /// picked up by the next [`refresh_misses`](Self::refresh_misses).
    pub fn refresh_points(&self, ids: &[PointId]) -> usize {
        let targets: Vec<(PointId, Arc<PointSlot>)> = {
            let pending = self.pending.lock();
            ids.iter()
                .filter_map(|id| pending.get(id).map(|slot| (id.clone(), Arc::clone(slot))))
                .collect()
        };

        let mut count = 0;
        for (id, slot) in targets {
            if slot.begin_or_mark_stale() && self.start_lookup(id, slot) {
                count += 1;
            }
        }
        count
    }

    /// Wait for outstanding lookups, at most `deadline`.
    ///
    /// Returns false if the deadline passed; lookups still running are left
    /// detached and will write their slots whenever they finish.
    pub async fn settle(&self, deadline: Duration) -> bool {
        let handles = std::mem::take(&mut *self.in_flight.lock());
        if handles.is_empty() {
            return true;
        }

        let outstanding = handles.len();
        match tokio::time::timeout(deadline, join_all(handles)).await {
            Ok(results) => {
                for result in results {
                    if let Err(e) = result {
                        warn!("Point lookup task failed: {}", e);
                    }
                }
                true
            }
            Err(_) => {
                warn!(
                    "{} point lookups still running after {:?}; continuing without them",
                    outstanding, deadline
                );
                false
            }
        }
    }

    fn spawn_lookup(&self, id: PointId, slot: Arc<PointSlot>) {
        if slot.begin_lookup() {
            self.start_lookup(id, slot);
        }
    }

    /// Spawn the lookup for a slot already claimed. False if there is no
    /// runtime to run it on; the claim is released.
    fn start_lookup(&self, id: PointId, slot: Arc<PointSlot>) -> bool {
        let Some(runtime) = self.runtime.clone().or_else(|| Handle::try_current().ok()) else {
            warn!(
                "No tokio runtime for lookup of bucket {} key {}; deferring",
                id.bucket,
                hex::encode(&id.key)
            );
            slot.abandon_lookup();
            return false;
        };

        let store = Arc::clone(&self.store);
        let handle = runtime.spawn(async move {
            match store.get(id.bucket, &id.key).await {
                Ok(result) => slot.resolve(result),
                Err(e) => {
                    warn!(
                        "Point lookup failed for bucket {} key {}: {}",
                        id.bucket,
                        hex::encode(&id.key),
                        e
                    );
                    slot.resolve(None);
                }
            }
        });
        self.in_flight.lock().push(handle);
        true
    }
}
