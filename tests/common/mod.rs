//! Shared fixtures for range query integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use bytes::Bytes;
use dimquery_core::config::EngineConfig;
use dimquery_core::sink::CollectingSink;
use dimquery_core::store::StoreEntry;
use dimquery_core::{
    AggregateEvent, BucketId, DimensionalKey, KeyCodec, MeasureValue, PointStore, Result,
    WindowController,
};
use std::sync::Arc;

pub const DIMS: [i64; 3] = [7, 11, 13];

pub fn config(max_windows: i64, commit_interval_windows: u64) -> EngineConfig {
    let mut config = EngineConfig::from_defaults().unwrap();
    config.query.max_windows = max_windows;
    config.window.commit_interval_windows = commit_interval_windows;
    config.window.lookup_timeout_ms = 5_000;
    config
}

pub fn controller(
    store: Arc<dyn PointStore>,
    max_windows: i64,
    commit_interval_windows: u64,
) -> (WindowController, Arc<CollectingSink>) {
    controller_with(store, config(max_windows, commit_interval_windows))
}

pub fn controller_with(
    store: Arc<dyn PointStore>,
    config: EngineConfig,
) -> (WindowController, Arc<CollectingSink>) {
    let sink = Arc::new(CollectingSink::new());
    let controller = WindowController::from_config(&config, store, sink.clone()).unwrap();
    (controller, sink)
}

/// Store whose reads never complete.
pub struct StalledStore;

#[async_trait]
impl PointStore for StalledStore {
    async fn get(&self, _bucket: BucketId, _key: &[u8]) -> Result<Option<Bytes>> {
        futures::future::pending().await
    }

    async fn put_batch(&self, _entries: Vec<StoreEntry>) -> Result<()> {
        Ok(())
    }
}

pub fn event(timestamp: i64, clicks: i64, cost: f64) -> AggregateEvent {
    AggregateEvent::new(
        DimensionalKey::new(timestamp, DIMS.to_vec()),
        vec![
            MeasureValue::Int(clicks),
            MeasureValue::Float(cost),
            MeasureValue::Int(clicks * 10),
            MeasureValue::Float(cost * 2.0),
        ],
    )
}

/// Write events to the store the way the external write path does.
pub async fn seed(store: &dyn PointStore, codec: &KeyCodec, events: &[AggregateEvent]) {
    for event in events {
        store
            .put(
                codec.bucket_of(&event.key),
                codec.encode_key(&event.key).unwrap(),
                codec.encode_value(event).unwrap(),
            )
            .await
            .unwrap();
    }
}

pub fn query(id: &str, start: i64, end: i64) -> String {
    format!(
        r#"{{"id":"{}","keys":{{"publisherId":"{}","advertiserId":"{}","adUnit":"{}"}},"startTime":{},"endTime":{},"numResults":10}}"#,
        id, DIMS[0], DIMS[1], DIMS[2], start, end
    )
}

/// One full window: begin, then end.
pub async fn window(controller: &mut WindowController, id: u64) -> usize {
    controller.begin_window(id);
    controller.end_window().await
}
