//! Error types for the range-query engine.

use std::error::Error as StdError;
use std::fmt;
use std::result;

/// A specialized Result type for engine operations.
pub type Result<T> = result::Result<T, Error>;

/// The error type for engine operations.
#[derive(Debug)]
pub enum Error {
    /// Rejected range query registration (empty id, `start > end`)
    InvalidQuery(String),
    /// Malformed stored key/value bytes
    Codec(String),
    /// Value does not fit the declared aggregate schema
    Schema(String),
    /// Configuration errors
    Config(String),
    /// Persistent store errors
    Storage(String),
    /// Serialization/deserialization errors
    Serialization(String),
    /// I/O errors
    Io(std::io::Error),
    /// Result sink errors
    Sink(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::InvalidQuery(msg) => write!(f, "Invalid query: {}", msg),
            Error::Codec(msg) => write!(f, "Codec error: {}", msg),
            Error::Schema(msg) => write!(f, "Schema error: {}", msg),
            Error::Config(msg) => write!(f, "Configuration error: {}", msg),
            Error::Storage(msg) => write!(f, "Storage error: {}", msg),
            Error::Serialization(msg) => write!(f, "Serialization error: {}", msg),
            Error::Io(err) => write!(f, "I/O error: {}", err),
            Error::Sink(msg) => write!(f, "Sink error: {}", msg),
        }
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            Error::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err)
    }
}

impl From<config::ConfigError> for Error {
    fn from(err: config::ConfigError) -> Self {
        Error::Config(err.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

impl From<duckdb::Error> for Error {
    fn from(err: duckdb::Error) -> Self {
        Error::Storage(err.to_string())
    }
}
