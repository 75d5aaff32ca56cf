//! Declared aggregate schema.
//!
//! The schema fixes the order and width of every dimension and measure. Key
//! and value byte layouts, registration key parsing and result rendering are
//! all derived from it, so the external write path and this engine agree on
//! the encoding as long as they share the same declaration.

use crate::aggregate::{AggregateEvent, DimensionalKey, MeasureValue};
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashSet;

/// Width of a dimension field in the encoded key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DimensionWidth {
    I32,
    I64,
}

impl DimensionWidth {
    pub fn bytes(self) -> usize {
        match self {
            DimensionWidth::I32 => 4,
            DimensionWidth::I64 => 8,
        }
    }
}

/// Type of a measure field in the encoded value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MeasureKind {
    I64,
    F64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DimensionField {
    pub name: String,
    pub width: DimensionWidth,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MeasureField {
    pub name: String,
    pub kind: MeasureKind,
}

/// Ordered dimension and measure declarations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregateSchema {
    pub dimensions: Vec<DimensionField>,
    pub measures: Vec<MeasureField>,
}

impl Default for AggregateSchema {
    /// Ads-dimension layout: three 4-byte dimensions, four 8-byte measures.
    fn default() -> Self {
        Self {
            dimensions: vec![
                DimensionField::new("publisherId", DimensionWidth::I32),
                DimensionField::new("advertiserId", DimensionWidth::I32),
                DimensionField::new("adUnit", DimensionWidth::I32),
            ],
            measures: vec![
                MeasureField::new("clicks", MeasureKind::I64),
                MeasureField::new("cost", MeasureKind::F64),
                MeasureField::new("impressions", MeasureKind::I64),
                MeasureField::new("revenue", MeasureKind::F64),
            ],
        }
    }
}

impl DimensionField {
    pub fn new(name: &str, width: DimensionWidth) -> Self {
        Self {
            name: name.to_string(),
            width,
        }
    }
}

impl MeasureField {
    pub fn new(name: &str, kind: MeasureKind) -> Self {
        Self {
            name: name.to_string(),
            kind,
        }
    }
}

impl AggregateSchema {
    /// Check the declaration is usable. Called once at configuration time.
    pub fn validate(&self) -> Result<()> {
        if self.dimensions.is_empty() {
            return Err(Error::Config("schema declares no dimensions".into()));
        }
        if self.measures.is_empty() {
            return Err(Error::Config("schema declares no measures".into()));
        }

        let mut seen = HashSet::new();
        let names = self
            .dimensions
            .iter()
            .map(|d| d.name.as_str())
            .chain(self.measures.iter().map(|m| m.name.as_str()));
        for name in names {
            if name.is_empty() || name == "timestamp" {
                return Err(Error::Config(format!("invalid field name '{}'", name)));
            }
            if !seen.insert(name) {
                return Err(Error::Config(format!("duplicate field name '{}'", name)));
            }
        }
        Ok(())
    }

    /// Encoded key width: 8-byte timestamp plus every dimension.
    pub fn key_width(&self) -> usize {
        8 + self.dimensions.iter().map(|d| d.width.bytes()).sum::<usize>()
    }

    /// Encoded value width: every measure is 8 bytes.
    pub fn value_width(&self) -> usize {
        8 * self.measures.len()
    }

    /// Build a key from a registration message's `keys` object.
    ///
    /// Values may be JSON numbers or numeric strings. Undeclared keys are
    /// ignored; a missing or malformed declared dimension is an error.
    pub fn key_from_fields(&self, fields: &Map<String, Value>, timestamp: i64) -> Result<DimensionalKey> {
        let mut dimensions = Vec::with_capacity(self.dimensions.len());
        for field in &self.dimensions {
            let raw = fields
                .get(&field.name)
                .ok_or_else(|| Error::Schema(format!("missing dimension '{}'", field.name)))?;
            let value = match raw {
                Value::Number(n) => n.as_i64(),
                Value::String(s) => s.trim().parse::<i64>().ok(),
                _ => None,
            }
            .ok_or_else(|| Error::Schema(format!("dimension '{}' is not an integer: {}", field.name, raw)))?;

            if field.width == DimensionWidth::I32 && i32::try_from(value).is_err() {
                return Err(Error::Schema(format!(
                    "dimension '{}' out of range for i32: {}",
                    field.name, value
                )));
            }
            dimensions.push(value);
        }
        Ok(DimensionalKey::new(timestamp, dimensions))
    }

    /// Render an event as a named JSON object for result messages.
    pub fn render(&self, event: &AggregateEvent) -> Value {
        let mut obj = Map::new();
        obj.insert("timestamp".to_string(), Value::from(event.key.timestamp));
        for (field, value) in self.dimensions.iter().zip(&event.key.dimensions) {
            obj.insert(field.name.clone(), Value::from(*value));
        }
        for (field, value) in self.measures.iter().zip(&event.measures) {
            let v = match value {
                MeasureValue::Int(i) => Value::from(*i),
                // Non-finite floats have no JSON form
                MeasureValue::Float(f) => serde_json::Number::from_f64(*f).map(Value::Number).unwrap_or(Value::Null),
            };
            obj.insert(field.name.clone(), v);
        }
        Value::Object(obj)
    }
}
