//! Configuration management for the range-query engine.
//!
//! Sources, later overriding earlier:
//! 1. Default configuration (embedded in binary)
//! 2. System-wide configuration file (`/etc/dimquery/config.toml`)
//! 3. User-specified configuration file
//! 4. Environment variables (`DIMQUERY__<SECTION>__<KEY>`)
//! 5. Command-line arguments
//!
//! The aggregate schema is validated as part of loading, so a bad
//! declaration fails at startup instead of producing silent lookup misses.

use crate::error::{Error, Result};
use crate::registry::DEFAULT_MAX_POINTS;
use crate::schema::AggregateSchema;
use crate::DEFAULT_MAX_WINDOWS;
use clap::Parser;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

const DEFAULT_CONFIG: &str = include_str!("../config/default.toml");

/// Command-line arguments
#[derive(Debug, Default, Parser)]
#[clap(version, about)]
pub struct Args {
    /// Configuration file path
    #[clap(short, long)]
    pub config: Option<PathBuf>,

    /// Storage engine type (memory, duckdb)
    #[clap(long)]
    pub engine: Option<String>,

    /// Storage engine connection string
    #[clap(long)]
    pub engine_connection: Option<String>,

    /// Windows a range query stays registered
    #[clap(long)]
    pub max_windows: Option<i64>,

    /// Window boundary period in milliseconds
    #[clap(long)]
    pub window_interval_ms: Option<u64>,
}

/// Engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub query: QueryConfig,
    #[serde(default)]
    pub window: WindowConfig,
    pub storage: StorageConfig,
    #[serde(default)]
    pub schema: AggregateSchema,
}

/// Range query limits
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryConfig {
    #[serde(default = "default_max_windows")]
    pub max_windows: i64,
    #[serde(default = "default_max_points")]
    pub max_points: usize,
}

/// Window boundary settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WindowConfig {
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,
    #[serde(default = "default_lookup_timeout_ms")]
    pub lookup_timeout_ms: u64,
    #[serde(default = "default_commit_interval")]
    pub commit_interval_windows: u64,
}

/// Persistent store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Storage engine type
    pub engine: String,
    /// Connection string
    #[serde(default)]
    pub connection: String,
    #[serde(default = "default_bucket_count")]
    pub bucket_count: u64,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            max_windows: default_max_windows(),
            max_points: default_max_points(),
        }
    }
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            interval_ms: default_interval_ms(),
            lookup_timeout_ms: default_lookup_timeout_ms(),
            commit_interval_windows: default_commit_interval(),
        }
    }
}

impl WindowConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    pub fn lookup_timeout(&self) -> Duration {
        Duration::from_millis(self.lookup_timeout_ms)
    }
}

impl EngineConfig {
    /// Load configuration from all sources
    pub fn load(args: &Args) -> Result<Self> {
        let mut builder = config::Config::builder()
            .add_source(config::File::from_str(DEFAULT_CONFIG, config::FileFormat::Toml))
            .add_source(config::File::with_name("/etc/dimquery/config.toml").required(false));

        // Load user config if specified
        if let Some(path) = &args.config {
            builder = builder.add_source(config::File::from(path.as_path()));
        }

        builder = builder.add_source(
            config::Environment::with_prefix("DIMQUERY")
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        );

        let mut config: EngineConfig = builder.build()?.try_deserialize()?;

        // Override with command line args
        if let Some(engine) = &args.engine {
            config.storage.engine = engine.clone();
        }
        if let Some(connection) = &args.engine_connection {
            config.storage.connection = connection.clone();
        }
        if let Some(max_windows) = args.max_windows {
            config.query.max_windows = max_windows;
        }
        if let Some(interval) = args.window_interval_ms {
            config.window.interval_ms = interval;
        }

        config.validate()?;
        Ok(config)
    }

    /// Embedded defaults only.
    pub fn from_defaults() -> Result<Self> {
        let config: EngineConfig = config::Config::builder()
            .add_source(config::File::from_str(DEFAULT_CONFIG, config::FileFormat::Toml))
            .build()?
            .try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.query.max_windows < 0 {
            return Err(Error::Config(format!(
                "query.max_windows must not be negative, got {}",
                self.query.max_windows
            )));
        }
        if self.query.max_points == 0 {
            return Err(Error::Config("query.max_points must be positive".into()));
        }
        if self.window.interval_ms == 0 {
            return Err(Error::Config("window.interval_ms must be positive".into()));
        }
        if self.storage.bucket_count == 0 {
            return Err(Error::Config("storage.bucket_count must be positive".into()));
        }
        self.schema.validate()
    }
}

fn default_max_windows() -> i64 {
    DEFAULT_MAX_WINDOWS
}

fn default_max_points() -> usize {
    DEFAULT_MAX_POINTS
}

fn default_interval_ms() -> u64 {
    1000
}

fn default_lookup_timeout_ms() -> u64 {
    500
}

fn default_commit_interval() -> u64 {
    4
}

fn default_bucket_count() -> u64 {
    16
}
