//! Metrics Module
//!
//! Live `INFO` snapshots, the derived hit rate, and the persisted history
//! of both.
//!
//! ```text
//! ┌──────────────────┐  append / delete_before  ┌────────────────────┐
//! │ MetricsCollector │ ───────────────────────> │  MetricsHistory    │
//! └────────┬─────────┘                          │  ├─ MemoryHistory  │
//!          │ INFO                               │  └─ SqliteHistory  │
//!          ▼                                    └────────────────────┘
//!     StoreClient
//! ```

pub mod collector;
pub mod history;
pub mod info;
pub mod sqlite;

pub use collector::{CollectionReport, MetricsCollector};
pub use history::{
    HistoryError, HistoryPage, HistoryQuery, MemoryHistory, MetricRecord, MetricsHistory,
    NewMetricRecord, PAGE_SIZE,
};
pub use info::{hit_rate, parse_info, CurrentMetrics, DerivedMetrics, InfoMap};
pub use sqlite::SqliteHistory;

use std::path::Path;
use std::sync::Arc;

/// Opens the SQLite history at `path`, or an in-memory one when unset.
pub async fn open_history(path: Option<&Path>) -> Result<Arc<dyn MetricsHistory>, HistoryError> {
    match path {
        Some(path) => Ok(Arc::new(SqliteHistory::open(path).await?)),
        None => Ok(Arc::new(MemoryHistory::new())),
    }
}
