//! kvlens - command-line driver
//!
//! Runs one monitor operation and prints its JSON result, or runs the
//! metrics collector once or forever (`collect --loop`).
//!
//! Configuration comes from `KVLENS_*` environment variables; the global
//! flags below override them. Logs go to stderr, filtered by `RUST_LOG`.

use anyhow::Context;
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use kvlens::keys::CreateKeyRequest;
use kvlens::{CollectorTask, Monitor, MonitorConfig, MonitorError, DEFAULT_COUNT};
use serde::Serialize;
use std::path::PathBuf;
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[derive(Parser)]
#[command(name = "kvlens", version = kvlens::VERSION)]
#[command(about = "Browse keys, inspect values and record metrics of a Redis-compatible store")]
struct Cli {
    /// Store URL, redis://[[user]:password@]host[:port][/db]
    #[arg(long, global = true)]
    redis_url: Option<String>,

    /// SQLite file for the metrics history (in-memory when unset)
    #[arg(long, global = true)]
    history_path: Option<PathBuf>,

    /// Seconds between collections in loop mode
    #[arg(long, global = true)]
    interval: Option<u64>,

    /// Days of metrics history to keep
    #[arg(long, global = true)]
    retention_days: Option<u64>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Collect metrics and prune old records
    Collect {
        /// Keep collecting every interval until Ctrl+C
        #[arg(long = "loop")]
        repeat: bool,
    },

    /// One page of keys with type and TTL
    Scan {
        #[arg(long, default_value = "0")]
        cursor: String,

        #[arg(long, default_value_t = DEFAULT_COUNT)]
        count: usize,
    },

    /// Keys whose name contains a substring
    Search {
        query: String,

        #[arg(long, default_value_t = DEFAULT_COUNT)]
        count: usize,
    },

    /// Number of keys in the database
    Total,

    /// Key detail (strings and hashes in full)
    Get { name: String },

    /// Value of any supported type
    Value { name: String },

    /// Create a string or hash key
    Set {
        name: String,

        /// Text for a string, a JSON object for a hash
        value: String,

        #[arg(long = "type", default_value = "string")]
        key_type: String,

        /// Expiry in seconds
        #[arg(long)]
        ttl: Option<i64>,
    },

    /// Delete a key
    Del { name: String },

    /// Live INFO with derived metrics
    Metrics,

    /// Stored metrics, newest first
    History {
        /// Inclusive lower bound (RFC 3339)
        #[arg(long)]
        start: Option<DateTime<Utc>>,

        /// Inclusive upper bound (RFC 3339)
        #[arg(long)]
        end: Option<DateTime<Utc>>,

        #[arg(long, default_value_t = 1)]
        page: usize,
    },

    /// Store reachability and time of the last stored metric
    Status,
}

impl Cli {
    /// Environment first, then flags.
    fn config(&self) -> anyhow::Result<MonitorConfig> {
        let mut config = MonitorConfig::from_env().context("invalid environment configuration")?;

        if let Some(url) = &self.redis_url {
            config.store.url = url.clone();
        }
        if let Some(path) = &self.history_path {
            config.history_path = Some(path.clone());
        }
        if let Some(secs) = self.interval {
            config.collection_interval_secs = secs;
        }
        if let Some(days) = self.retention_days {
            config.retention_days = days;
        }

        config.validate().context("invalid configuration")?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Set up logging
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let config = cli.config()?;
    let monitor = Monitor::open(&config)
        .await
        .context("failed to open monitor")?;

    if let Commands::Collect { repeat: true } = cli.command {
        run_loop(&monitor, &config).await;
        return Ok(());
    }

    match run(&monitor, cli.command).await {
        Ok(output) => {
            println!("{}", serde_json::to_string_pretty(&output)?);
            Ok(())
        }
        Err(e) => {
            error!(status = e.status_code(), error = %e, "Operation failed");
            let body = serde_json::json!({
                "status": e.status_code(),
                "body": e.body(),
            });
            eprintln!("{}", serde_json::to_string_pretty(&body)?);
            std::process::exit(1);
        }
    }
}

/// Runs the collector every interval until Ctrl+C.
async fn run_loop(monitor: &Monitor, config: &MonitorConfig) {
    let task = CollectorTask::start(monitor.collector(), config.collection_interval());

    match signal::ctrl_c().await {
        Ok(()) => info!("Shutdown signal received, stopping collector..."),
        Err(e) => error!(error = %e, "Failed to listen for Ctrl+C"),
    }
    task.stop();
}

/// Runs one operation and returns its JSON result.
async fn run(monitor: &Monitor, command: Commands) -> Result<serde_json::Value, MonitorError> {
    match command {
        Commands::Collect { .. } => {
            let report = monitor.collector().collect_and_prune().await?;
            to_json(&serde_json::json!({
                "record": report.record,
                "pruned": report.pruned,
            }))
        }
        Commands::Scan { cursor, count } => {
            to_json(&monitor.list_keys(Some(&cursor), Some(count)).await?)
        }
        Commands::Search { query, count } => {
            to_json(&monitor.search_keys(Some(&query), Some(count)).await?)
        }
        Commands::Total => to_json(&monitor.total_keys().await?),
        Commands::Get { name } => to_json(&monitor.key_detail(&name).await?),
        Commands::Value { name } => to_json(&monitor.value(&name).await?),
        Commands::Set {
            name,
            value,
            key_type,
            ttl,
        } => {
            let value = if key_type == "hash" {
                serde_json::from_str(&value)
                    .map_err(|e| MonitorError::bad_request(format!("'value' is not valid JSON: {}", e)))?
            } else {
                serde_json::Value::String(value)
            };
            let request = CreateKeyRequest {
                name: Some(name),
                key_type: Some(key_type),
                value: Some(value),
                ttl,
            };
            to_json(&monitor.create_key(&request).await?)
        }
        Commands::Del { name } => to_json(&monitor.delete_key(&name).await?),
        Commands::Metrics => to_json(&monitor.current_metrics().await?),
        Commands::History { start, end, page } => {
            to_json(&monitor.metrics_history(start, end, Some(page)).await?)
        }
        Commands::Status => to_json(&monitor.status().await?),
    }
}

fn to_json<T: Serialize>(value: &T) -> Result<serde_json::Value, MonitorError> {
    Ok(serde_json::to_value(value)?)
}
