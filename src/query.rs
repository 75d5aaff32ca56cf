//! Wire messages for query registration and range results.

use crate::aggregate::AggregateEvent;
use crate::error::Result;
use crate::schema::AggregateSchema;
use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Registration message.
///
/// Unknown fields are ignored. A message without an `id` (or with an empty
/// one) is dropped by the registry rather than rejected. Numeric ids and
/// numeric-string times are accepted.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryMessage {
    #[serde(default, deserialize_with = "lenient_id")]
    pub id: Option<String>,
    /// Dimension name → value
    pub keys: Map<String, Value>,
    /// Epoch milliseconds, inclusive
    #[serde(deserialize_with = "lenient_millis")]
    pub start_time: i64,
    /// Epoch milliseconds, inclusive
    #[serde(deserialize_with = "lenient_millis")]
    pub end_time: i64,
    /// Accepted for compatibility; not used.
    #[serde(default)]
    pub num_results: Option<i64>,
}

impl QueryMessage {
    pub fn parse(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Scalar {
    Int(i64),
    Text(String),
}

fn lenient_id<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Scalar>::deserialize(deserializer)? {
        Some(Scalar::Int(v)) => Some(v.to_string()),
        Some(Scalar::Text(s)) => Some(s),
        None => None,
    })
}

fn lenient_millis<'de, D>(deserializer: D) -> std::result::Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    match Scalar::deserialize(deserializer)? {
        Scalar::Int(v) => Ok(v),
        Scalar::Text(s) => s
            .trim()
            .parse()
            .map_err(|_| de::Error::custom(format!("invalid epoch millis '{}'", s))),
    }
}

/// Range resolution for one window.
#[derive(Debug, Clone, PartialEq)]
pub struct RangeQueryResult {
    pub id: String,
    /// Windows the query has left
    pub count_down: i64,
    /// Resolved points in ascending timestamp order
    pub data: Vec<AggregateEvent>,
}

impl RangeQueryResult {
    pub fn to_message(&self, schema: &AggregateSchema) -> ResultMessage {
        ResultMessage {
            id: self.id.clone(),
            count_down: self.count_down,
            data: self.data.iter().map(|event| schema.render(event)).collect(),
        }
    }
}

/// Serialized form of a [`RangeQueryResult`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultMessage {
    pub id: String,
    pub count_down: i64,
    pub data: Vec<Value>,
}
