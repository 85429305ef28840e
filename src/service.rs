//! Transport-agnostic monitor facade.
//!
//! [`Monitor`] exposes one method per logical endpoint. Results are plain
//! `Serialize` types, and failures are [`MonitorError`]s that know their
//! HTTP status. A transport only has to map routes onto these methods.
//!
//! | endpoint | method |
//! |---|---|
//! | `GET keys?cursor&count` | [`Monitor::list_keys`] |
//! | `GET keys/search?q&count` | [`Monitor::search_keys`] |
//! | `GET keys/total` | [`Monitor::total_keys`] |
//! | `POST keys` | [`Monitor::create_key`] (201) |
//! | `DELETE keys/{name}` | [`Monitor::delete_key`] |
//! | `GET keys/{name}` | [`Monitor::key_detail`] |
//! | `GET values/{name}` | [`Monitor::value`] |
//! | `GET metrics` | [`Monitor::current_metrics`] |
//! | `GET metrics/history?start&end&page` | [`Monitor::metrics_history`] |
//! | `GET status` | [`Monitor::status`] |

use crate::client::StoreClient;
use crate::config::{ConfigError, MonitorConfig};
use crate::error::{MonitorError, Result};
use crate::keys::{
    CreateKeyRequest, KeyDescriptor, KeyDetail, KeyScanner, KeyWriter, ScanCursor, ScanPage,
    ValueEnvelope, ValueReader,
};
use crate::metrics::{
    open_history, CurrentMetrics, HistoryPage, HistoryQuery, MetricsCollector, MetricsHistory,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tracing::debug;

/// Page size used when a caller gives no count.
pub const DEFAULT_COUNT: usize = 100;

/// Status code of a successful key creation.
pub const CREATED: u16 = 201;

/// `{detail}` confirmation body.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Detail {
    pub detail: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchResult {
    pub keys: Vec<KeyDescriptor>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TotalKeys {
    pub total_keys: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Status {
    pub redis_reachable: bool,
    pub last_metric: Option<DateTime<Utc>>,
}

/// Every monitor operation behind one handle.
#[derive(Clone)]
pub struct Monitor {
    client: StoreClient,
    scanner: KeyScanner,
    reader: ValueReader,
    writer: KeyWriter,
    collector: Arc<MetricsCollector>,
}

impl Monitor {
    /// Wires all components to one store and one history backend.
    pub fn new(
        config: &MonitorConfig,
        history: Arc<dyn MetricsHistory>,
    ) -> std::result::Result<Self, ConfigError> {
        let client = StoreClient::new(config.store.clone())?;
        let collector = MetricsCollector::new(client.clone(), history, config.retention()?);

        Ok(Self {
            scanner: KeyScanner::new(client.clone()),
            reader: ValueReader::new(client.clone()),
            writer: KeyWriter::new(client.clone()),
            collector: Arc::new(collector),
            client,
        })
    }

    /// Builds a monitor with the history backend named in `config`.
    pub async fn open(config: &MonitorConfig) -> Result<Self> {
        let history = open_history(config.history_path.as_deref()).await?;
        Ok(Self::new(config, history)?)
    }

    pub fn collector(&self) -> Arc<MetricsCollector> {
        Arc::clone(&self.collector)
    }

    /// One page of keys with type and TTL.
    pub async fn list_keys(&self, cursor: Option<&str>, count: Option<usize>) -> Result<ScanPage> {
        let cursor = match cursor {
            Some(raw) => raw.parse::<ScanCursor>()?,
            None => ScanCursor::START,
        };
        self.scanner
            .scan(cursor, count.unwrap_or(DEFAULT_COUNT), None)
            .await
    }

    /// Keys whose name contains `q` as literal text; glob characters in
    /// `q` are not wildcards.
    pub async fn search_keys(&self, q: Option<&str>, count: Option<usize>) -> Result<SearchResult> {
        let q = q.unwrap_or_default();
        let keys = self
            .scanner
            .search(q, count.unwrap_or(DEFAULT_COUNT))
            .await?;
        Ok(SearchResult { keys })
    }

    pub async fn total_keys(&self) -> Result<TotalKeys> {
        let total_keys = self.scanner.count().await?;
        Ok(TotalKeys { total_keys })
    }

    /// Creates a key; callers answer with [`CREATED`].
    pub async fn create_key(&self, request: &CreateKeyRequest) -> Result<Detail> {
        self.writer.create(request).await?;
        Ok(Detail {
            detail: "Key created successfully".to_string(),
        })
    }

    pub async fn delete_key(&self, name: &str) -> Result<Detail> {
        self.writer.delete(name).await?;
        Ok(Detail {
            detail: format!("Key '{}' deleted successfully", name),
        })
    }

    pub async fn key_detail(&self, name: &str) -> Result<KeyDetail> {
        self.reader.read_detail(name).await
    }

    pub async fn value(&self, name: &str) -> Result<ValueEnvelope> {
        if name.is_empty() {
            return Err(MonitorError::not_found("Key not provided"));
        }
        self.reader.read(name).await
    }

    /// Live `INFO` with derived metrics; nothing is stored.
    pub async fn current_metrics(&self) -> Result<CurrentMetrics> {
        self.collector.snapshot().await
    }

    /// Stored records within `[start, end]`, newest first.
    pub async fn metrics_history(
        &self,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
        page: Option<usize>,
    ) -> Result<HistoryPage> {
        let query = HistoryQuery {
            start,
            end,
            page: page.unwrap_or(1),
            ..Default::default()
        };
        Ok(self.collector.history().range_query(&query).await?)
    }

    /// Store reachability and the time of the newest stored record.
    ///
    /// Only an unreachable store reports `redis_reachable: false`; the
    /// history is consulted either way.
    pub async fn status(&self) -> Result<Status> {
        let redis_reachable = match self.client.connect().await {
            Ok(_) => true,
            Err(e) if e.is_unreachable() => false,
            Err(e) => return Err(e),
        };
        let last_metric = self
            .collector
            .history()
            .latest()
            .await?
            .map(|record| record.timestamp);

        debug!(redis_reachable, last_metric = ?last_metric, "Status checked");
        Ok(Status {
            redis_reachable,
            last_metric,
        })
    }
}
