//! Window controller.
//!
//! Driven by external window boundaries: `begin_window` / `end_window` are
//! called once per logical window, never concurrently, and registration is
//! serialized with them. [`WindowController::run`] provides that driver on
//! a single tokio task using an interval clock.

use crate::adapter::PointQueryAdapter;
use crate::aggregate::AggregateEvent;
use crate::buffer::AggregateBuffer;
use crate::codec::KeyCodec;
use crate::config::{EngineConfig, WindowConfig};
use crate::error::Result;
use crate::registry::RangeQueryRegistry;
use crate::sink::ResultSink;
use crate::store::PointStore;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

pub struct WindowController {
    registry: RangeQueryRegistry,
    sink: Arc<dyn ResultSink>,
    window: WindowConfig,
    current_window: Option<u64>,
    windows_since_commit: u64,
}

impl WindowController {
    pub fn new(registry: RangeQueryRegistry, sink: Arc<dyn ResultSink>, window: WindowConfig) -> Self {
        Self {
            registry,
            sink,
            window,
            current_window: None,
            windows_since_commit: 0,
        }
    }

    /// Wire codec, buffer, adapter and registry from configuration.
    pub fn from_config(
        config: &EngineConfig,
        store: Arc<dyn PointStore>,
        sink: Arc<dyn ResultSink>,
    ) -> Result<Self> {
        let codec = KeyCodec::new(Arc::new(config.schema.clone()), config.storage.bucket_count)?;
        let adapter = Arc::new(PointQueryAdapter::new(store, Arc::new(AggregateBuffer::new())));
        let registry = RangeQueryRegistry::new(codec, adapter, config.query.max_windows)
            .with_max_points(config.query.max_points);
        Ok(Self::new(registry, sink, config.window.clone()))
    }

    pub fn registry(&self) -> &RangeQueryRegistry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut RangeQueryRegistry {
        &mut self.registry
    }

    /// Shared handle to the recent buffer, for upstream writers.
    pub fn buffer(&self) -> &Arc<AggregateBuffer> {
        self.registry.adapter().buffer()
    }

    pub fn current_window(&self) -> Option<u64> {
        self.current_window
    }

    /// Feed an upstream aggregate into the recent buffer.
    pub fn ingest(&self, event: AggregateEvent) {
        self.buffer().insert(event);
    }

    /// Register a query from message text. Never fails the caller.
    pub fn submit(&mut self, text: &str) -> Option<String> {
        match self.registry.register_message(text) {
            Ok(id) => id,
            Err(e) => {
                warn!("Unable to register query {}: {}", text, e);
                None
            }
        }
    }

    pub fn begin_window(&mut self, window_id: u64) {
        self.current_window = Some(window_id);
        self.registry.adapter().refresh_misses();
    }

    /// Close the current window: resolve, emit, expire, and commit the
    /// buffer when due. Returns the number of results the sink accepted.
    pub async fn end_window(&mut self) -> usize {
        self.registry.adapter().settle(self.window.lookup_timeout()).await;

        let results = self.registry.on_window_end();
        let mut emitted = 0;
        for result in results {
            let id = result.id.clone();
            match self.sink.emit(result).await {
                Ok(()) => emitted += 1,
                Err(e) => warn!("Failed to emit result for query {}: {}", id, e),
            }
        }

        if self.window.commit_interval_windows > 0 {
            self.windows_since_commit += 1;
            if self.windows_since_commit >= self.window.commit_interval_windows {
                self.windows_since_commit = 0;
                if let Err(e) = self.commit().await {
                    warn!("Failed to commit recent buffer: {}", e);
                }
            }
        }

        debug!(
            "Window {:?} closed: {} results, {} active queries",
            self.current_window,
            emitted,
            self.registry.len()
        );
        emitted
    }

    /// Commit the recent buffer to the persistent store and re-read the
    /// committed points so stored results never lag behind the buffer.
    pub async fn commit(&self) -> Result<usize> {
        let adapter = self.registry.adapter();
        let points = adapter
            .buffer()
            .commit(adapter.store().as_ref(), self.registry.codec())
            .await?;
        if !points.is_empty() {
            adapter.refresh_points(&points);
            info!("Committed {} buffered aggregates", points.len());
        }
        Ok(points.len())
    }

    /// Drive windows from an interval clock until `shutdown` resolves.
    ///
    /// Queries arriving on `queries` are registered between boundaries.
    /// Once the channel closes, the loop keeps running windows until every
    /// registered query has expired.
    pub async fn run<F>(&mut self, mut queries: mpsc::Receiver<String>, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        let mut ticker = tokio::time::interval(self.window.interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // First tick completes immediately
        ticker.tick().await;

        let mut window_id = self.current_window.map_or(0, |w| w + 1);
        self.begin_window(window_id);
        info!("Window controller started at window {}", window_id);

        tokio::pin!(shutdown);
        let mut accepting = true;
        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("Window controller shutting down");
                    break;
                }
                _ = ticker.tick() => {
                    self.end_window().await;
                    if !accepting && self.registry.is_empty() {
                        info!("Query input closed and all queries expired");
                        break;
                    }
                    window_id += 1;
                    self.begin_window(window_id);
                }
                message = queries.recv(), if accepting => match message {
                    Some(text) => {
                        self.submit(&text);
                    }
                    None => {
                        debug!("Query channel closed");
                        accepting = false;
                    }
                },
            }
        }

        if let Err(e) = self.commit().await {
            warn!("Failed to commit recent buffer on shutdown: {}", e);
        }
    }
}
