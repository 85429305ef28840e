//! Metrics collection and retention.
//!
//! One invocation runs two phases:
//!
//! ```text
//! collect:  connect ─> INFO ─> parse ─> hit_rate ─> history.append
//!                                                        │
//!                                                 (only on success)
//!                                                        ▼
//! prune:    cutoff = now - retention ──────────> history.delete_before
//! ```
//!
//! The collector keeps no state between invocations.

use super::history::{MetricRecord, MetricsHistory, NewMetricRecord};
use super::info::{parse_info, CurrentMetrics, DerivedMetrics};
use crate::client::StoreClient;
use crate::error::{MonitorError, Result};
use crate::protocol::Command;
use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use tracing::{debug, info};

/// Outcome of one collect-and-prune invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct CollectionReport {
    pub record: MetricRecord,
    pub pruned: u64,
}

/// Snapshots store statistics into a [`MetricsHistory`].
#[derive(Clone)]
pub struct MetricsCollector {
    client: StoreClient,
    history: Arc<dyn MetricsHistory>,
    retention: Duration,
}

impl MetricsCollector {
    pub fn new(client: StoreClient, history: Arc<dyn MetricsHistory>, retention: Duration) -> Self {
        Self {
            client,
            history,
            retention,
        }
    }

    pub fn history(&self) -> &Arc<dyn MetricsHistory> {
        &self.history
    }

    pub fn retention(&self) -> Duration {
        self.retention
    }

    /// Reads `INFO` and computes derived metrics without storing anything.
    pub async fn snapshot(&self) -> Result<CurrentMetrics> {
        let mut conn = self.client.connect().await?;
        let text = conn
            .query_text(&Command::new("INFO"))
            .await
            .map_err(|e| MonitorError::from(e).context("Error fetching metrics"))?;

        let info = parse_info(&text);
        let derived = DerivedMetrics::from_info(&info);
        Ok(CurrentMetrics { info, derived })
    }

    /// Phase one: snapshot the store and append a record.
    pub async fn collect(&self) -> Result<MetricRecord> {
        let CurrentMetrics { info, derived } = self.snapshot().await?;
        let record = NewMetricRecord::from_info(info, derived.hit_rate);
        let stored = self.history.append(record, Utc::now()).await?;

        debug!(
            timestamp = %stored.timestamp,
            hit_rate = stored.hit_rate,
            memory_used = ?stored.memory_used,
            "Collected metrics"
        );
        Ok(stored)
    }

    /// Phase two: delete records older than the retention window.
    pub async fn prune(&self) -> Result<u64> {
        self.prune_at(Utc::now()).await
    }

    /// Deletes records strictly before `now - retention`.
    pub async fn prune_at(&self, now: DateTime<Utc>) -> Result<u64> {
        let cutoff = now.checked_sub_signed(self.retention).ok_or_else(|| {
            MonitorError::internal(
                "Error pruning metrics",
                format!("retention of {} reaches before the earliest date", self.retention),
            )
        })?;
        let pruned = self.history.delete_before(cutoff).await?;
        if pruned > 0 {
            debug!(pruned, cutoff = %cutoff, "Pruned old metrics");
        }
        Ok(pruned)
    }

    /// Collects, then prunes. A failed collection skips pruning.
    pub async fn collect_and_prune(&self) -> Result<CollectionReport> {
        let record = self.collect().await?;
        let pruned = self.prune().await?;
        info!(pruned, "Metrics collected and pruned");
        Ok(CollectionReport { record, pruned })
    }
}
