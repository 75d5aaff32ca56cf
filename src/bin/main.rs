use anyhow::{Context, Result};
use clap::Parser;
use dimquery_core::config::{Args, EngineConfig};
use dimquery_core::sink::JsonLinesSink;
use dimquery_core::store::open_store;
use dimquery_core::WindowController;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Reads registration messages from stdin (one JSON object per line) and
/// writes range results to stdout as JSON lines.
///
/// Nothing here feeds the recent buffer, so points resolve from the store
/// only; aggregate producers embed the library and call `ingest`.
#[tokio::main]
async fn main() -> Result<()> {
    // Stdout carries results, so logs go to stderr
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let args = Args::parse();
    let config = EngineConfig::load(&args).context("failed to load configuration")?;
    info!(
        "Using {} store '{}' with {} buckets",
        config.storage.engine, config.storage.connection, config.storage.bucket_count
    );

    let store = open_store(&config.storage).context("failed to open point store")?;
    let sink = Arc::new(JsonLinesSink::new(
        tokio::io::stdout(),
        Arc::new(config.schema.clone()),
    ));
    let mut controller = WindowController::from_config(&config, store, sink)?;

    let (tx, rx) = mpsc::channel(1024);
    let reader = tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => {
                    if line.trim().is_empty() {
                        continue;
                    }
                    if tx.send(line).await.is_err() {
                        break;
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    warn!("Failed to read query input: {}", e);
                    break;
                }
            }
        }
    });

    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for shutdown signal: {}", e);
            std::future::pending::<()>().await;
        }
    };

    controller.run(rx, shutdown).await;
    reader.abort();
    Ok(())
}
