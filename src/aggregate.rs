//! Aggregate keys and events.

use std::fmt;

/// Dimension values for one minute of one series.
///
/// Dimension values are positional, in the order declared by the
/// [`AggregateSchema`](crate::schema::AggregateSchema). Equality covers the
/// timestamp too, so the same series at two minutes is two distinct keys.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DimensionalKey {
    /// Epoch milliseconds
    pub timestamp: i64,
    pub dimensions: Vec<i64>,
}

impl DimensionalKey {
    pub fn new(timestamp: i64, dimensions: Vec<i64>) -> Self {
        Self {
            timestamp,
            dimensions,
        }
    }

    /// Same series, different minute.
    pub fn at(&self, timestamp: i64) -> Self {
        Self {
            timestamp,
            dimensions: self.dimensions.clone(),
        }
    }
}

impl fmt::Display for DimensionalKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{:?}", self.timestamp, self.dimensions)
    }
}

/// A single measure value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MeasureValue {
    Int(i64),
    Float(f64),
}

/// Measures resolved for a [`DimensionalKey`].
#[derive(Debug, Clone, PartialEq)]
pub struct AggregateEvent {
    pub key: DimensionalKey,
    /// In schema order
    pub measures: Vec<MeasureValue>,
}

impl AggregateEvent {
    pub fn new(key: DimensionalKey, measures: Vec<MeasureValue>) -> Self {
        Self { key, measures }
    }

    pub fn timestamp(&self) -> i64 {
        self.key.timestamp
    }
}
