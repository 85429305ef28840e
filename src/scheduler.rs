//! Repeat-mode collection driver.
//!
//! [`CollectorTask`] runs [`MetricsCollector::collect_and_prune`] on a
//! background Tokio task: run, sleep for the interval, run again. A failed
//! run is logged and the loop keeps going. Runs never overlap because the
//! next sleep only starts once the previous run has returned.

use crate::metrics::MetricsCollector;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// A handle to the running collector loop.
///
/// When this handle is dropped, the loop is stopped.
#[derive(Debug)]
pub struct CollectorTask {
    shutdown_tx: watch::Sender<bool>,
}

impl CollectorTask {
    /// Starts collecting every `interval`, beginning immediately.
    pub fn start(collector: Arc<MetricsCollector>, interval: Duration) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        tokio::spawn(collector_loop(collector, interval, shutdown_rx));

        info!(interval_secs = interval.as_secs_f64(), "Metrics collector started");

        Self { shutdown_tx }
    }

    /// Stops the loop after the current run, if any, finishes.
    pub fn stop(&self) {
        if !*self.shutdown_tx.borrow() {
            let _ = self.shutdown_tx.send(true);
            info!("Metrics collector stopped");
        }
    }
}

impl Drop for CollectorTask {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn collector_loop(
    collector: Arc<MetricsCollector>,
    interval: Duration,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    loop {
        match collector.collect_and_prune().await {
            Ok(report) => debug!(
                timestamp = %report.record.timestamp,
                pruned = report.pruned,
                "Collection run finished"
            ),
            Err(e) => warn!(error = %e, "Collection run failed"),
        }

        tokio::select! {
            _ = tokio::time::sleep(interval) => {}
            result = shutdown_rx.changed() => {
                if result.is_err() || *shutdown_rx.borrow() {
                    debug!("Metrics collector received shutdown signal");
                    return;
                }
            }
        }
    }
}
