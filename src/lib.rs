//! Windowed range-query engine for pre-aggregated metric events.
//!
//! This crate provides:
//! - Decomposition of `[start, end]` range queries into per-minute point lookups
//! - Point resolution against a recent in-memory buffer and a bucketed persistent store
//! - Countdown-bounded query lifetimes driven by external window boundaries
//! - A fixed-width binary codec for aggregate keys and values

pub mod adapter;
pub mod aggregate;
pub mod buffer;
pub mod codec;
pub mod config;
pub mod controller;
pub mod error;
pub mod query;
pub mod registry;
pub mod schema;
pub mod sink;
pub mod store;

pub use adapter::{PointId, PointQuery, PointQueryAdapter, PointState};
pub use aggregate::{AggregateEvent, DimensionalKey, MeasureValue};
pub use buffer::AggregateBuffer;
pub use codec::{BucketId, KeyCodec};
pub use controller::WindowController;
pub use error::{Error, Result};
pub use query::{QueryMessage, RangeQueryResult, ResultMessage};
pub use registry::RangeQueryRegistry;
pub use schema::AggregateSchema;
pub use sink::ResultSink;
pub use store::PointStore;

/// Step between consecutive point queries of a range, in milliseconds.
pub const MINUTE_MS: i64 = 60_000;

/// Default number of windows a range query is kept alive.
pub const DEFAULT_MAX_WINDOWS: i64 = 30;
