//! # kvlens - Introspection and Monitoring for Redis-Compatible Stores
//!
//! kvlens browses the keyspace of a single Redis-compatible store, reads and
//! writes its values, and keeps a time series of health metrics with
//! retention pruning. It speaks RESP2 over TCP directly.
//!
//! ## Features
//!
//! - **Cursor Scanning**: SCAN-based pagination with optional glob filter
//! - **Pipelined Enrichment**: type and TTL for a whole page in one round trip
//! - **Typed Values**: strings, hashes, lists, sets, sorted sets and streams
//! - **Metrics History**: `INFO` snapshots with derived hit rate, stored in
//!   memory or SQLite and pruned by age
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                Monitor                                  │
//! │                                                                         │
//! │  ┌─────────────┐  ┌─────────────┐  ┌─────────────┐  ┌────────────────┐  │
//! │  │ KeyScanner  │  │ ValueReader │  │  KeyWriter  │  │MetricsCollector│  │
//! │  └──────┬──────┘  └──────┬──────┘  └──────┬──────┘  └───┬────────┬───┘  │
//! │         │                │                │             │        │      │
//! │         ▼                ▼                ▼             ▼        ▼      │
//! │  ┌───────────────────────────────────────────────────────┐ ┌──────────┐ │
//! │  │                     StoreClient                       │ │ Metrics  │ │
//! │  │   Connection: BufWriter<TcpStream> + RespParser       │ │ History  │ │
//! │  └───────────────────────────────────────────────────────┘ └──────────┘ │
//! │                                                                ▲        │
//! │                     ┌──────────────────────────────────────────┘        │
//! │                     │        CollectorTask                              │
//! │                     │   (Background Tokio Task)                         │
//! │                     └───────────────────────────────────────────────────┘
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```ignore
//! use kvlens::{Monitor, MonitorConfig, CollectorTask};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = MonitorConfig::from_env()?;
//!     let monitor = Monitor::open(&config).await?;
//!
//!     let page = monitor.list_keys(None, Some(50)).await?;
//!     println!("{}", serde_json::to_string_pretty(&page)?);
//!
//!     // Collect every interval until the handle is dropped
//!     let _task = CollectorTask::start(monitor.collector(), config.collection_interval());
//!     tokio::signal::ctrl_c().await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Module Overview
//!
//! - [`protocol`]: RESP types, command encoding and the reply parser
//! - [`client`]: store connections, `exec` and `pipeline`
//! - [`keys`]: scanning, value reads, key writes
//! - [`metrics`]: `INFO` parsing, collection, history backends
//! - [`scheduler`]: the repeat-mode collection task
//! - [`service`]: the endpoint facade
//! - [`config`] and [`error`]: configuration and the error taxonomy
//!
//! ## Failure Model
//!
//! A store that cannot be reached is reported as `Unreachable` (HTTP 503),
//! distinct from failures of an operation on a reachable store. Nothing is
//! retried, and no failure stops the process or the collection loop.

pub mod client;
pub mod config;
pub mod error;
pub mod keys;
pub mod metrics;
pub mod protocol;
pub mod scheduler;
pub mod service;

// Re-export commonly used types for convenience
pub use client::{Connection, ConnectionError, StoreClient};
pub use config::{ConfigError, MonitorConfig, StoreConfig};
pub use error::{ErrorBody, MonitorError, Result};
pub use keys::{KeyScanner, KeyWriter, ScanCursor, ValueReader, VALUE_LIMIT};
pub use metrics::{MemoryHistory, MetricsCollector, MetricsHistory, SqliteHistory};
pub use protocol::{Command, ParseError, RespParser, RespValue};
pub use scheduler::CollectorTask;
pub use service::{Monitor, DEFAULT_COUNT};

/// Version of kvlens
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
