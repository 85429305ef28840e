//! Persisted metrics time series.
//!
//! [`MetricsHistory`] is the seam between the collector and its storage.
//! Two backends exist: [`MemoryHistory`] here and
//! [`SqliteHistory`](super::sqlite::SqliteHistory).
//!
//! Backends assign strictly increasing timestamps: an append whose
//! timestamp is not after the newest stored record is moved one microsecond
//! past it.

use super::info::{info_f64, info_i64, InfoMap};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use thiserror::Error;

/// Records per history page.
pub const PAGE_SIZE: usize = 100;

/// Errors raised by a history backend.
#[derive(Debug, Error)]
pub enum HistoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("stored timestamp out of range: {0}")]
    InvalidTimestamp(i64),

    /// Requested page lies past the last page.
    #[error("invalid page {0}")]
    InvalidPage(usize),
}

/// One stored snapshot.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricRecord {
    #[serde(skip_serializing)]
    pub id: i64,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing)]
    pub raw_info: InfoMap,
    pub memory_used: Option<f64>,
    pub ops_per_sec: Option<i64>,
    pub hit_rate: f64,
    pub rejected_connections: Option<i64>,
}

/// A snapshot that has not been stored yet.
#[derive(Debug, Clone, PartialEq)]
pub struct NewMetricRecord {
    pub raw_info: InfoMap,
    pub memory_used: Option<f64>,
    pub ops_per_sec: Option<i64>,
    pub hit_rate: f64,
    pub rejected_connections: Option<i64>,
}

impl NewMetricRecord {
    /// Pulls the tracked fields out of a parsed `INFO` reply.
    pub fn from_info(raw_info: InfoMap, hit_rate: f64) -> Self {
        Self {
            memory_used: info_f64(&raw_info, "used_memory"),
            ops_per_sec: info_i64(&raw_info, "instantaneous_ops_per_sec"),
            rejected_connections: info_i64(&raw_info, "rejected_connections"),
            hit_rate,
            raw_info,
        }
    }

    fn stored(self, id: i64, timestamp: DateTime<Utc>) -> MetricRecord {
        MetricRecord {
            id,
            timestamp,
            raw_info: self.raw_info,
            memory_used: self.memory_used,
            ops_per_sec: self.ops_per_sec,
            hit_rate: self.hit_rate,
            rejected_connections: self.rejected_connections,
        }
    }
}

/// Filter and page for a range query. Bounds are inclusive.
#[derive(Debug, Clone, PartialEq)]
pub struct HistoryQuery {
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
    /// 1-based.
    pub page: usize,
    pub page_size: usize,
}

impl Default for HistoryQuery {
    fn default() -> Self {
        Self {
            start: None,
            end: None,
            page: 1,
            page_size: PAGE_SIZE,
        }
    }
}

impl HistoryQuery {
    pub fn contains(&self, timestamp: DateTime<Utc>) -> bool {
        self.start.map_or(true, |start| timestamp >= start)
            && self.end.map_or(true, |end| timestamp <= end)
    }

    /// Offset of the first record on the requested page.
    ///
    /// A page whose offset does not fit a `usize` can never hold records.
    pub(crate) fn offset(&self) -> Result<usize, HistoryError> {
        self.page
            .saturating_sub(1)
            .checked_mul(self.page_size)
            .ok_or(HistoryError::InvalidPage(self.page))
    }
}

/// One page of records, newest first.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistoryPage {
    /// Records matching the filter across all pages.
    pub count: u64,
    pub next: Option<usize>,
    pub previous: Option<usize>,
    pub results: Vec<MetricRecord>,
}

impl HistoryPage {
    /// Builds the page, rejecting pages past the end (page 1 is always valid).
    pub(crate) fn build(
        query: &HistoryQuery,
        count: u64,
        results: Vec<MetricRecord>,
    ) -> Result<Self, HistoryError> {
        let page = query.page;
        let size = query.page_size.max(1) as u64;
        let last_page = count.div_ceil(size).max(1) as usize;
        if page == 0 || page > last_page {
            return Err(HistoryError::InvalidPage(page));
        }

        Ok(Self {
            count,
            next: (page < last_page).then_some(page + 1),
            previous: (page > 1).then(|| page - 1),
            results,
        })
    }
}

/// Append-only store of metric snapshots.
#[async_trait]
pub trait MetricsHistory: Send + Sync {
    /// Stores `record` at `timestamp`, bumped forward if needed to stay
    /// strictly after the newest record.
    async fn append(
        &self,
        record: NewMetricRecord,
        timestamp: DateTime<Utc>,
    ) -> Result<MetricRecord, HistoryError>;

    /// Records within the query bounds, newest first, one page at a time.
    async fn range_query(&self, query: &HistoryQuery) -> Result<HistoryPage, HistoryError>;

    /// Deletes every record strictly before `cutoff`; returns how many.
    async fn delete_before(&self, cutoff: DateTime<Utc>) -> Result<u64, HistoryError>;

    /// The newest record, if any.
    async fn latest(&self) -> Result<Option<MetricRecord>, HistoryError>;
}

/// Next timestamp that keeps the series strictly increasing, at the
/// microsecond precision every backend can store.
pub(crate) fn next_timestamp(
    requested: DateTime<Utc>,
    newest: Option<DateTime<Utc>>,
) -> DateTime<Utc> {
    let requested = DateTime::from_timestamp_micros(requested.timestamp_micros()).unwrap_or(requested);
    match newest {
        Some(newest) if requested <= newest => newest + Duration::microseconds(1),
        _ => requested,
    }
}

/// In-process history, lost on exit.
#[derive(Debug, Default)]
pub struct MemoryHistory {
    /// Oldest first.
    records: RwLock<Vec<MetricRecord>>,
}

impl MemoryHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }
}

#[async_trait]
impl MetricsHistory for MemoryHistory {
    async fn append(
        &self,
        record: NewMetricRecord,
        timestamp: DateTime<Utc>,
    ) -> Result<MetricRecord, HistoryError> {
        let mut records = self.records.write();
        let newest = records.last();
        let timestamp = next_timestamp(timestamp, newest.map(|r| r.timestamp));
        let id = newest.map_or(1, |r| r.id + 1);

        let stored = record.stored(id, timestamp);
        records.push(stored.clone());
        Ok(stored)
    }

    async fn range_query(&self, query: &HistoryQuery) -> Result<HistoryPage, HistoryError> {
        let offset = query.offset()?;
        let records = self.records.read();
        let matching: Vec<&MetricRecord> = records
            .iter()
            .rev()
            .filter(|r| query.contains(r.timestamp))
            .collect();

        let results = matching
            .iter()
            .skip(offset)
            .take(query.page_size)
            .map(|r| (*r).clone())
            .collect();
        HistoryPage::build(query, matching.len() as u64, results)
    }

    async fn delete_before(&self, cutoff: DateTime<Utc>) -> Result<u64, HistoryError> {
        let mut records = self.records.write();
        let before = records.len();
        records.retain(|r| r.timestamp >= cutoff);
        Ok((before - records.len()) as u64)
    }

    async fn latest(&self) -> Result<Option<MetricRecord>, HistoryError> {
        Ok(self.records.read().last().cloned())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::metrics::info::parse_info;

    pub(crate) fn sample(hit_rate: f64) -> NewMetricRecord {
        NewMetricRecord::from_info(
            parse_info("used_memory:2048\r\ninstantaneous_ops_per_sec:7\r\nrejected_connections:0\r\n"),
            hit_rate,
        )
    }

    /// Behaviour every backend must share.
    pub(crate) async fn exercise_backend(history: &dyn MetricsHistory) {
        let now = Utc::now();
        assert!(history.latest().await.unwrap().is_none());

        let old = history.append(sample(0.1), now - Duration::days(10)).await.unwrap();
        let mid = history.append(sample(0.2), now - Duration::days(3)).await.unwrap();
        let new = history.append(sample(0.3), now).await.unwrap();
        assert_eq!(old.memory_used, Some(2048.0));
        assert_eq!(old.ops_per_sec, Some(7));

        // Same timestamp again is moved past the newest record.
        let bumped = history.append(sample(0.4), now).await.unwrap();
        assert!(bumped.timestamp > new.timestamp);

        let page = history.range_query(&HistoryQuery::default()).await.unwrap();
        assert_eq!(page.count, 4);
        let rates: Vec<f64> = page.results.iter().map(|r| r.hit_rate).collect();
        assert_eq!(rates, vec![0.4, 0.3, 0.2, 0.1]);
        assert_eq!(page.next, None);
        assert_eq!(page.previous, None);

        let bounded = HistoryQuery {
            start: Some(mid.timestamp),
            end: Some(new.timestamp),
            ..Default::default()
        };
        let page = history.range_query(&bounded).await.unwrap();
        let rates: Vec<f64> = page.results.iter().map(|r| r.hit_rate).collect();
        assert_eq!(rates, vec![0.3, 0.2]);

        let removed = history.delete_before(now - Duration::days(7)).await.unwrap();
        assert_eq!(removed, 1);
        let latest = history.latest().await.unwrap().unwrap();
        assert_eq!(latest.hit_rate, 0.4);
        assert_eq!(latest.raw_info["used_memory"], 2048);
    }

    pub(crate) async fn exercise_paging(history: &dyn MetricsHistory) {
        let start = Utc::now() - Duration::hours(1);
        for i in 0..250 {
            history
                .append(sample(i as f64), start + Duration::seconds(i))
                .await
                .unwrap();
        }

        let query = |page| HistoryQuery {
            page,
            ..Default::default()
        };
        let first = history.range_query(&query(1)).await.unwrap();
        assert_eq!(first.count, 250);
        assert_eq!(first.results.len(), PAGE_SIZE);
        assert_eq!(first.results[0].hit_rate, 249.0);
        assert_eq!(first.next, Some(2));
        assert_eq!(first.previous, None);

        let last = history.range_query(&query(3)).await.unwrap();
        assert_eq!(last.results.len(), 50);
        assert_eq!(last.results[49].hit_rate, 0.0);
        assert_eq!(last.next, None);
        assert_eq!(last.previous, Some(2));

        assert!(matches!(
            history.range_query(&query(4)).await,
            Err(HistoryError::InvalidPage(4))
        ));
        assert!(matches!(
            history.range_query(&query(usize::MAX)).await,
            Err(HistoryError::InvalidPage(usize::MAX))
        ));
    }

    /// A record exactly at the cutoff survives; one microsecond older does not.
    pub(crate) async fn exercise_prune_boundary(history: &dyn MetricsHistory) {
        let now = DateTime::from_timestamp_micros(Utc::now().timestamp_micros()).unwrap();
        let cutoff = now - Duration::days(7);

        let older = history
            .append(sample(0.1), cutoff - Duration::microseconds(1))
            .await
            .unwrap();
        let at_cutoff = history.append(sample(0.2), cutoff).await.unwrap();
        assert_eq!(older.timestamp, cutoff - Duration::microseconds(1));
        assert_eq!(at_cutoff.timestamp, cutoff);

        assert_eq!(history.delete_before(cutoff).await.unwrap(), 1);
        let page = history.range_query(&HistoryQuery::default()).await.unwrap();
        let stamps: Vec<_> = page.results.iter().map(|r| r.timestamp).collect();
        assert_eq!(stamps, vec![cutoff]);
    }

    #[tokio::test]
    async fn test_memory_backend() {
        exercise_backend(&MemoryHistory::new()).await;
    }

    #[tokio::test]
    async fn test_memory_paging() {
        exercise_paging(&MemoryHistory::new()).await;
    }

    #[tokio::test]
    async fn test_memory_prune_boundary() {
        exercise_prune_boundary(&MemoryHistory::new()).await;
    }

    #[test]
    fn test_offset_overflow_is_invalid_page() {
        let query = HistoryQuery {
            page: usize::MAX,
            ..Default::default()
        };
        assert!(matches!(query.offset(), Err(HistoryError::InvalidPage(usize::MAX))));
        assert_eq!(HistoryQuery::default().offset().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_empty_first_page_is_valid() {
        let page = MemoryHistory::new()
            .range_query(&HistoryQuery::default())
            .await
            .unwrap();
        assert_eq!(page.count, 0);
        assert!(page.results.is_empty());
    }

    #[test]
    fn test_memory_len_tracks_appends_and_prunes() {
        let history = MemoryHistory::new();
        assert!(history.is_empty());

        let now = Utc::now();
        tokio_test::assert_ok!(tokio_test::block_on(history.append(sample(0.1), now - Duration::days(2))));
        tokio_test::assert_ok!(tokio_test::block_on(history.append(sample(0.2), now)));
        assert_eq!(history.len(), 2);

        let removed = tokio_test::assert_ok!(tokio_test::block_on(history.delete_before(now - Duration::days(1))));
        assert_eq!(removed, 1);
        assert_eq!(history.len(), 1);
    }

    #[test]
    fn test_next_timestamp() {
        let t = DateTime::from_timestamp_micros(1_700_000_000_123_456).unwrap();
        assert_eq!(next_timestamp(t, None), t);
        assert_eq!(next_timestamp(t, Some(t - Duration::seconds(1))), t);
        assert_eq!(next_timestamp(t, Some(t)), t + Duration::microseconds(1));

        let precise = t + Duration::nanoseconds(700);
        assert_eq!(next_timestamp(precise, None), t);
    }

    #[test]
    fn test_record_json_omits_raw_info() {
        let record = sample(0.5).stored(1, Utc::now());
        let json = serde_json::to_value(&record).unwrap();
        assert!(json.get("raw_info").is_none());
        assert!(json.get("id").is_none());
        assert_eq!(json["hit_rate"], 0.5);
    }
}
