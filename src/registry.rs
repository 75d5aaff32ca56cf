//! Range query registry.
//!
//! Owns every active range query, its per-minute point queries and the
//! point → owner lookup. Identical points requested by several queries are
//! registered with the adapter once and released when their last owner goes.

use crate::adapter::{PointId, PointQuery, PointQueryAdapter};
use crate::aggregate::{AggregateEvent, DimensionalKey};
use crate::codec::KeyCodec;
use crate::error::{Error, Result};
use crate::query::{QueryMessage, RangeQueryResult};
use crate::MINUTE_MS;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use tracing::{debug, warn};

/// Default cap on points per range query: 31 days of minutes.
pub const DEFAULT_MAX_POINTS: usize = 31 * 24 * 60;

/// A registered range query.
#[derive(Debug)]
pub struct RangeQuery {
    pub id: String,
    /// Fixed dimensions; the timestamp is ignored
    pub template: DimensionalKey,
    pub start_time: i64,
    pub end_time: i64,
    /// Windows left; the query is removed once this goes negative
    pub countdown: i64,
    points: Vec<PointQuery>,
}

impl RangeQuery {
    /// Point queries in ascending timestamp order.
    pub fn points(&self) -> &[PointQuery] {
        &self.points
    }
}

pub struct RangeQueryRegistry {
    codec: KeyCodec,
    adapter: Arc<PointQueryAdapter>,
    max_windows: i64,
    max_points: usize,
    queries: HashMap<String, RangeQuery>,
    owners: HashMap<PointId, BTreeSet<String>>,
}

impl RangeQueryRegistry {
    pub fn new(codec: KeyCodec, adapter: Arc<PointQueryAdapter>, max_windows: i64) -> Self {
        Self {
            codec,
            adapter,
            max_windows,
            max_points: DEFAULT_MAX_POINTS,
            queries: HashMap::new(),
            owners: HashMap::new(),
        }
    }

    pub fn with_max_points(mut self, max_points: usize) -> Self {
        self.max_points = max_points;
        self
    }

    pub fn codec(&self) -> &KeyCodec {
        &self.codec
    }

    pub fn adapter(&self) -> &Arc<PointQueryAdapter> {
        &self.adapter
    }

    pub fn len(&self) -> usize {
        self.queries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queries.is_empty()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.queries.contains_key(id)
    }

    pub fn get(&self, id: &str) -> Option<&RangeQuery> {
        self.queries.get(id)
    }

    /// Ids of the queries that currently own `point`.
    pub fn owners_of(&self, point: &PointId) -> Option<&BTreeSet<String>> {
        self.owners.get(point)
    }

    /// Register (or replace) a range query.
    ///
    /// One point query is created per minute from `start_time` through
    /// `end_time`, with the template's dimensions held fixed.
    pub fn register(
        &mut self,
        id: &str,
        template: &DimensionalKey,
        start_time: i64,
        end_time: i64,
    ) -> Result<()> {
        if id.is_empty() {
            return Err(Error::InvalidQuery("empty query id".into()));
        }
        if start_time > end_time {
            return Err(Error::InvalidQuery(format!(
                "start {} is after end {}",
                start_time, end_time
            )));
        }

        let span = (i128::from(end_time) - i128::from(start_time)) / i128::from(MINUTE_MS) + 1;
        if span > self.max_points as i128 {
            return Err(Error::InvalidQuery(format!(
                "range covers {} minutes, limit is {}",
                span, self.max_points
            )));
        }
        let span = span as i64;

        // Encode everything before touching the previous registration so a
        // bad template leaves it in place.
        let mut ids = Vec::with_capacity(span as usize);
        for step in 0..span {
            let timestamp = start_time + step * MINUTE_MS;
            let key = template.at(timestamp);
            let point = PointId::new(self.codec.bucket_of(&key), self.codec.encode_key(&key)?);
            ids.push((point, timestamp));
        }

        if self.remove(id) {
            debug!("Replacing range query {}", id);
        }

        let mut points = Vec::with_capacity(ids.len());
        for (point, timestamp) in ids {
            let slot = self.adapter.register_point_query(point.clone());
            self.owners
                .entry(point.clone())
                .or_default()
                .insert(id.to_string());
            points.push(PointQuery::new(point, timestamp, slot));
        }

        debug!(
            "Registered range query {} over [{}, {}] with {} points",
            id,
            start_time,
            end_time,
            points.len()
        );
        self.queries.insert(
            id.to_string(),
            RangeQuery {
                id: id.to_string(),
                template: template.at(start_time),
                start_time,
                end_time,
                countdown: self.max_windows,
                points,
            },
        );
        Ok(())
    }

    /// Register from message text.
    ///
    /// Unparseable text and messages without an id are logged and dropped
    /// (`Ok(None)`). Schema and range violations are returned as errors.
    pub fn register_message(&mut self, text: &str) -> Result<Option<String>> {
        let message = match QueryMessage::parse(text) {
            Ok(message) => message,
            Err(e) => {
                warn!("Unable to parse query {}: {}", text, e);
                return Ok(None);
            }
        };

        let id = match message.id {
            Some(id) if !id.is_empty() => id,
            _ => {
                debug!("Dropping query without id: {}", text);
                return Ok(None);
            }
        };

        let template = self
            .codec
            .schema()
            .key_from_fields(&message.keys, message.start_time)?;
        self.register(&id, &template, message.start_time, message.end_time)?;
        Ok(Some(id))
    }

    /// Remove a query and release points no other query owns.
    pub fn remove(&mut self, id: &str) -> bool {
        let Some(query) = self.queries.remove(id) else {
            return false;
        };

        for point in query.points {
            if let Some(owners) = self.owners.get_mut(&point.id) {
                owners.remove(id);
                if owners.is_empty() {
                    self.owners.remove(&point.id);
                    self.adapter.unregister(&point.id);
                }
            }
        }
        true
    }

    /// Advance every query by one window.
    ///
    /// Expired queries are removed without a final emission. Others emit
    /// whatever currently resolves, unless that is nothing at all.
    pub fn on_window_end(&mut self) -> Vec<RangeQueryResult> {
        let mut results = Vec::new();
        let mut expired = Vec::new();

        for query in self.queries.values_mut() {
            query.countdown -= 1;
            if query.countdown < 0 {
                expired.push(query.id.clone());
                continue;
            }

            let data = resolve_points(&self.codec, &self.adapter, query);
            if !data.is_empty() {
                results.push(RangeQueryResult {
                    id: query.id.clone(),
                    count_down: query.countdown,
                    data,
                });
            }
        }

        for id in expired {
            debug!("Removing expired query {}", id);
            self.remove(&id);
        }
        results
    }
}

/// Resolve each minute of `query`, recent buffer first, then the stored
/// result. Unresolved minutes are left out.
fn resolve_points(codec: &KeyCodec, adapter: &PointQueryAdapter, query: &RangeQuery) -> Vec<AggregateEvent> {
    let mut data = Vec::with_capacity(query.points.len());
    for point in &query.points {
        if let Some(event) = adapter.lookup_buffered(&query.template.at(point.timestamp)) {
            data.push(event);
            continue;
        }

        let state = point.state();
        if let (true, Some(value)) = (state.processed, state.result) {
            match codec.decode(point.key(), &value) {
                Ok(event) => data.push(event),
                Err(e) => warn!(
                    "Skipping undecodable point {} of query {}: {}",
                    hex::encode(point.key()),
                    query.id,
                    e
                ),
            }
        }
    }
    data
}
