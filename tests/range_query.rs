mod common;

use common::{event, query, seed, window};
use dimquery_core::store::{DuckDbStore, MemoryStore};
use dimquery_core::{MeasureValue, PointStore, MINUTE_MS};
use std::sync::Arc;

#[tokio::test]
async fn test_registration_message_decomposes_range() {
    let (mut controller, _) = common::controller(Arc::new(MemoryStore::new()), 30, 0);
    let id = controller.submit(&query("q", 0, 4 * MINUTE_MS));
    assert_eq!(id.as_deref(), Some("q"));

    let points = controller.registry().get("q").unwrap().points();
    let timestamps: Vec<i64> = points.iter().map(|p| p.timestamp).collect();
    assert_eq!(timestamps, vec![0, 60_000, 120_000, 180_000, 240_000]);
    assert_eq!(controller.registry().adapter().pending_len(), 5);
}

#[tokio::test]
async fn test_expiration_after_budget() {
    let store = Arc::new(MemoryStore::new());
    let (mut controller, sink) = common::controller(store.clone(), 2, 0);
    seed(store.as_ref(), controller.registry().codec(), &[event(0, 1, 1.0)]).await;

    controller.begin_window(0);
    controller.submit(&query("q", 0, 0));
    assert_eq!(controller.end_window().await, 1);
    assert_eq!(window(&mut controller, 1).await, 1);
    assert!(controller.registry().contains("q"));

    assert_eq!(window(&mut controller, 2).await, 0);
    assert!(!controller.registry().contains("q"));
    assert_eq!(controller.registry().adapter().pending_len(), 0);

    let countdowns: Vec<i64> = sink.take().iter().map(|r| r.count_down).collect();
    assert_eq!(countdowns, vec![1, 0]);
}

#[tokio::test]
async fn test_buffer_takes_precedence_over_store() {
    let store = Arc::new(MemoryStore::new());
    let (mut controller, sink) = common::controller(store.clone(), 30, 0);
    seed(store.as_ref(), controller.registry().codec(), &[event(60_000, 1, 1.0)]).await;
    controller.ingest(event(60_000, 99, 9.5));

    controller.begin_window(0);
    controller.submit(&query("q", 60_000, 60_000));
    controller.end_window().await;

    let results = sink.take();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].data, vec![event(60_000, 99, 9.5)]);
}

#[tokio::test]
async fn test_partial_results_keep_timestamp_order() {
    let store = Arc::new(MemoryStore::new());
    let (mut controller, sink) = common::controller(store.clone(), 30, 0);
    // Minute 3 comes from the store, minute 1 from the buffer
    seed(store.as_ref(), controller.registry().codec(), &[event(3 * MINUTE_MS, 3, 3.0)]).await;
    controller.ingest(event(MINUTE_MS, 1, 1.0));

    controller.begin_window(0);
    controller.submit(&query("q", 0, 4 * MINUTE_MS));
    controller.end_window().await;

    let results = sink.take();
    assert_eq!(results.len(), 1);
    let timestamps: Vec<i64> = results[0].data.iter().map(|e| e.timestamp()).collect();
    assert_eq!(timestamps, vec![MINUTE_MS, 3 * MINUTE_MS]);
}

#[tokio::test]
async fn test_partial_results_for_every_pair_of_minutes() {
    for first in 0..5i64 {
        for second in (first + 1)..5 {
            for store_first in [true, false] {
                let store = Arc::new(MemoryStore::new());
                let (mut controller, sink) = common::controller(store.clone(), 30, 0);
                let (from_store, from_buffer) = if store_first {
                    (first, second)
                } else {
                    (second, first)
                };
                seed(
                    store.as_ref(),
                    controller.registry().codec(),
                    &[event(from_store * MINUTE_MS, from_store, 1.0)],
                )
                .await;
                controller.ingest(event(from_buffer * MINUTE_MS, from_buffer, 2.0));

                controller.begin_window(0);
                controller.submit(&query("q", 0, 4 * MINUTE_MS));
                controller.end_window().await;

                let results = sink.take();
                assert_eq!(results.len(), 1, "minutes {} and {}", first, second);
                assert_eq!(
                    results[0].data,
                    vec![
                        event(first * MINUTE_MS, first, if store_first { 1.0 } else { 2.0 }),
                        event(second * MINUTE_MS, second, if store_first { 2.0 } else { 1.0 }),
                    ]
                );
            }
        }
    }
}

#[tokio::test]
async fn test_unprocessed_points_are_left_out() {
    let mut config = common::config(30, 0);
    config.window.lookup_timeout_ms = 20;
    let (mut controller, sink) = common::controller_with(Arc::new(common::StalledStore), config);
    controller.ingest(event(MINUTE_MS, 1, 1.0));
    controller.ingest(event(3 * MINUTE_MS, 3, 3.0));

    controller.begin_window(0);
    controller.submit(&query("q", 0, 4 * MINUTE_MS));
    assert_eq!(controller.end_window().await, 1);

    let points = controller.registry().get("q").unwrap().points();
    assert!(points.iter().all(|p| !p.state().processed));

    let results = sink.take();
    let timestamps: Vec<i64> = results[0].data.iter().map(|e| e.timestamp()).collect();
    assert_eq!(timestamps, vec![MINUTE_MS, 3 * MINUTE_MS]);
}

#[tokio::test]
async fn test_empty_window_emits_nothing() {
    let store = Arc::new(MemoryStore::new());
    let (mut controller, sink) = common::controller(store.clone(), 30, 0);
    seed(store.as_ref(), controller.registry().codec(), &[event(0, 1, 1.0)]).await;

    controller.begin_window(0);
    controller.submit(&query("empty", 600_000, 720_000));
    controller.submit(&query("full", 0, 0));
    controller.end_window().await;

    let results = sink.take();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].id, "full");
    assert!(controller.registry().contains("empty"));
}

#[tokio::test]
async fn test_reregistration_replaces_range() {
    let store = Arc::new(MemoryStore::new());
    let (mut controller, sink) = common::controller(store.clone(), 30, 0);
    seed(
        store.as_ref(),
        controller.registry().codec(),
        &[event(0, 1, 1.0), event(10 * MINUTE_MS, 2, 2.0)],
    )
    .await;

    controller.begin_window(0);
    controller.submit(&query("q", 0, MINUTE_MS));
    let old: Vec<_> = controller.registry().get("q").unwrap().points().iter().map(|p| p.id.clone()).collect();
    controller.submit(&query("q", 10 * MINUTE_MS, 10 * MINUTE_MS));
    controller.end_window().await;

    for point in &old {
        assert!(controller.registry().owners_of(point).is_none());
    }
    let results = sink.take();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].count_down, 29);
    assert_eq!(results[0].data, vec![event(10 * MINUTE_MS, 2, 2.0)]);
}

#[tokio::test]
async fn test_resolved_query_reemits_until_expiry() {
    let store = Arc::new(MemoryStore::new());
    let (mut controller, sink) = common::controller(store.clone(), 3, 0);
    seed(store.as_ref(), controller.registry().codec(), &[event(0, 1, 1.0)]).await;

    controller.begin_window(0);
    controller.submit(&query("q", 0, 0));
    controller.end_window().await;
    for id in 1..6 {
        window(&mut controller, id).await;
    }

    let results = sink.take();
    assert_eq!(results.len(), 3);
    assert!(results.iter().all(|r| r.data == vec![event(0, 1, 1.0)]));
}

#[tokio::test]
async fn test_late_store_data_resolves_on_later_window() {
    let store = Arc::new(MemoryStore::new());
    let (mut controller, sink) = common::controller(store.clone(), 30, 0);

    controller.begin_window(0);
    controller.submit(&query("q", 0, MINUTE_MS));
    assert_eq!(controller.end_window().await, 0);

    seed(store.as_ref(), controller.registry().codec(), &[event(MINUTE_MS, 4, 4.0)]).await;
    assert_eq!(window(&mut controller, 1).await, 1);
    assert_eq!(sink.take()[0].data, vec![event(MINUTE_MS, 4, 4.0)]);
}

#[tokio::test]
async fn test_commit_keeps_latest_value_visible() {
    let store = Arc::new(MemoryStore::new());
    let (mut controller, sink) = common::controller(store.clone(), 30, 1);
    seed(store.as_ref(), controller.registry().codec(), &[event(0, 1, 1.0)]).await;

    controller.begin_window(0);
    controller.submit(&query("q", 0, 0));
    controller.end_window().await;
    assert_eq!(sink.take()[0].data[0].measures[0], MeasureValue::Int(1));

    // Newer aggregate arrives, is served from the buffer, then committed
    controller.ingest(event(0, 2, 2.0));
    window(&mut controller, 1).await;
    assert_eq!(sink.take()[0].data[0].measures[0], MeasureValue::Int(2));
    assert!(controller.buffer().is_empty());
    assert_eq!(store.len(), 1);

    window(&mut controller, 2).await;
    assert_eq!(sink.take()[0].data, vec![event(0, 2, 2.0)]);
}

#[tokio::test]
async fn test_corrupt_record_does_not_stop_other_queries() {
    let store = Arc::new(MemoryStore::new());
    let (mut controller, sink) = common::controller(store.clone(), 30, 0);
    let codec = controller.registry().codec().clone();
    seed(store.as_ref(), &codec, &[event(MINUTE_MS, 5, 5.0)]).await;
    let bad = event(0, 0, 0.0).key;
    store
        .put(
            codec.bucket_of(&bad),
            codec.encode_key(&bad).unwrap(),
            bytes::Bytes::from_static(b"truncated"),
        )
        .await
        .unwrap();

    controller.begin_window(0);
    controller.submit(&query("bad", 0, 0));
    controller.submit(&query("mixed", 0, MINUTE_MS));
    controller.end_window().await;

    let results = sink.take();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].id, "mixed");
    assert_eq!(results[0].data, vec![event(MINUTE_MS, 5, 5.0)]);
}

#[tokio::test]
async fn test_duckdb_store_end_to_end() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("aggregates.duckdb");
    let store: Arc<dyn PointStore> = Arc::new(DuckDbStore::open(path.to_str().unwrap()).unwrap());
    let (mut controller, sink) = common::controller(store.clone(), 30, 1);

    controller.ingest(event(0, 1, 0.5));
    controller.ingest(event(MINUTE_MS, 2, 1.5));
    window(&mut controller, 0).await;
    assert!(controller.buffer().is_empty());

    controller.submit(&query("q", 0, 2 * MINUTE_MS));
    window(&mut controller, 1).await;

    let results = sink.take();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].data, vec![event(0, 1, 0.5), event(MINUTE_MS, 2, 1.5)]);
}
