//! Fixed-width binary codec for aggregate keys and values.
//!
//! Key layout: 8-byte big-endian timestamp, then each declared dimension
//! big-endian at its declared width. Value layout: each declared measure as
//! an 8-byte big-endian integer or IEEE-754 double. Both layouts must match
//! the external write path byte for byte, otherwise lookups silently miss.

use crate::aggregate::{AggregateEvent, DimensionalKey, MeasureValue};
use crate::error::{Error, Result};
use crate::schema::{AggregateSchema, DimensionWidth, MeasureKind};
use bytes::{Buf, BufMut, Bytes, BytesMut};
use std::fmt;
use std::sync::Arc;
use xxhash_rust::xxh64::xxh64;

const BUCKET_SEED: u64 = 0;

/// Store partition a key lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BucketId(pub u64);

impl fmt::Display for BucketId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone)]
pub struct KeyCodec {
    schema: Arc<AggregateSchema>,
    bucket_count: u64,
}

impl KeyCodec {
    pub fn new(schema: Arc<AggregateSchema>, bucket_count: u64) -> Result<Self> {
        if bucket_count == 0 {
            return Err(Error::Config("bucket_count must be positive".into()));
        }
        Ok(Self {
            schema,
            bucket_count,
        })
    }

    pub fn schema(&self) -> &Arc<AggregateSchema> {
        &self.schema
    }

    /// Bucket for a key.
    ///
    /// xxhash64 (seed 0) over the big-endian dimension bytes only, so every
    /// minute of a series lands in the same bucket.
    pub fn bucket_of(&self, key: &DimensionalKey) -> BucketId {
        let mut bytes = Vec::with_capacity(self.schema.key_width() - 8);
        for (field, value) in self.schema.dimensions.iter().zip(&key.dimensions) {
            match field.width {
                DimensionWidth::I32 => bytes.extend_from_slice(&(*value as i32).to_be_bytes()),
                DimensionWidth::I64 => bytes.extend_from_slice(&value.to_be_bytes()),
            }
        }
        BucketId(xxh64(&bytes, BUCKET_SEED) % self.bucket_count)
    }

    pub fn encode_key(&self, key: &DimensionalKey) -> Result<Bytes> {
        if key.dimensions.len() != self.schema.dimensions.len() {
            return Err(Error::Codec(format!(
                "key has {} dimensions, schema declares {}",
                key.dimensions.len(),
                self.schema.dimensions.len()
            )));
        }

        let mut buf = BytesMut::with_capacity(self.schema.key_width());
        buf.put_i64(key.timestamp);
        for (field, value) in self.schema.dimensions.iter().zip(&key.dimensions) {
            match field.width {
                DimensionWidth::I32 => {
                    let v = i32::try_from(*value).map_err(|_| {
                        Error::Codec(format!("dimension '{}' out of range: {}", field.name, value))
                    })?;
                    buf.put_i32(v);
                }
                DimensionWidth::I64 => buf.put_i64(*value),
            }
        }
        Ok(buf.freeze())
    }

    pub fn encode_value(&self, event: &AggregateEvent) -> Result<Bytes> {
        if event.measures.len() != self.schema.measures.len() {
            return Err(Error::Codec(format!(
                "event has {} measures, schema declares {}",
                event.measures.len(),
                self.schema.measures.len()
            )));
        }

        let mut buf = BytesMut::with_capacity(self.schema.value_width());
        for (field, value) in self.schema.measures.iter().zip(&event.measures) {
            match (field.kind, value) {
                (MeasureKind::I64, MeasureValue::Int(v)) => buf.put_i64(*v),
                (MeasureKind::F64, MeasureValue::Float(v)) => buf.put_f64(*v),
                (kind, value) => {
                    return Err(Error::Codec(format!(
                        "measure '{}' declared {:?}, got {:?}",
                        field.name, kind, value
                    )))
                }
            }
        }
        Ok(buf.freeze())
    }

    pub fn decode_key(&self, key: &[u8]) -> Result<DimensionalKey> {
        let expected = self.schema.key_width();
        if key.len() != expected {
            return Err(Error::Codec(format!(
                "key length {} (expected {})",
                key.len(),
                expected
            )));
        }

        let mut buf = key;
        let timestamp = buf.get_i64();
        let dimensions = self
            .schema
            .dimensions
            .iter()
            .map(|field| match field.width {
                DimensionWidth::I32 => i64::from(buf.get_i32()),
                DimensionWidth::I64 => buf.get_i64(),
            })
            .collect();
        Ok(DimensionalKey::new(timestamp, dimensions))
    }

    /// Decode a stored key/value pair.
    pub fn decode(&self, key: &[u8], value: &[u8]) -> Result<AggregateEvent> {
        let key = self.decode_key(key)?;

        let expected = self.schema.value_width();
        if value.len() != expected {
            return Err(Error::Codec(format!(
                "value length {} (expected {})",
                value.len(),
                expected
            )));
        }

        let mut buf = value;
        let measures = self
            .schema
            .measures
            .iter()
            .map(|field| match field.kind {
                MeasureKind::I64 => MeasureValue::Int(buf.get_i64()),
                MeasureKind::F64 => MeasureValue::Float(buf.get_f64()),
            })
            .collect();
        Ok(AggregateEvent::new(key, measures))
    }
}
