//! SQLite-backed metrics history.
//!
//! One table, `metric_records`, indexed on `timestamp`. Timestamps are
//! stored as microseconds since the Unix epoch so ordering and range
//! filters are plain integer comparisons. The raw `INFO` snapshot is stored
//! as JSON text.

use super::history::{
    next_timestamp, HistoryError, HistoryPage, HistoryQuery, MetricRecord, MetricsHistory,
    NewMetricRecord,
};
use super::info::InfoMap;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteSynchronous};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, info};

type Row = (i64, i64, String, Option<f64>, Option<i64>, f64, Option<i64>);

const SELECT_COLUMNS: &str =
    "SELECT id, timestamp, raw_info, memory_used, ops_per_sec, hit_rate, rejected_connections \
     FROM metric_records";

/// Metrics history in a SQLite database file.
pub struct SqliteHistory {
    pool: SqlitePool,
}

impl SqliteHistory {
    /// Opens or creates the database at `path`.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, HistoryError> {
        let path = path.as_ref();
        info!("Opening metrics history at {:?}", path);

        let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", path.display()))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(Duration::from_secs(30));

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        let history = Self { pool };
        history.init_schema().await?;
        Ok(history)
    }

    /// A private in-memory database.
    pub async fn in_memory() -> Result<Self, HistoryError> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?
            .journal_mode(SqliteJournalMode::Wal);

        // Every connection to :memory: is a separate database.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;

        let history = Self { pool };
        history.init_schema().await?;
        Ok(history)
    }

    async fn init_schema(&self) -> Result<(), HistoryError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS metric_records (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                timestamp INTEGER NOT NULL,
                raw_info TEXT NOT NULL,
                memory_used REAL,
                ops_per_sec INTEGER,
                hit_rate REAL NOT NULL,
                rejected_connections INTEGER
            );

            CREATE INDEX IF NOT EXISTS idx_metric_records_timestamp
                ON metric_records(timestamp);
            "#,
        )
        .execute(&self.pool)
        .await?;

        debug!("Metrics history schema initialized");
        Ok(())
    }
}

fn to_micros(timestamp: DateTime<Utc>) -> i64 {
    timestamp.timestamp_micros()
}

fn from_micros(micros: i64) -> Result<DateTime<Utc>, HistoryError> {
    DateTime::from_timestamp_micros(micros).ok_or(HistoryError::InvalidTimestamp(micros))
}

fn decode_row(row: Row) -> Result<MetricRecord, HistoryError> {
    let (id, micros, raw_info, memory_used, ops_per_sec, hit_rate, rejected_connections) = row;
    let raw_info: InfoMap = serde_json::from_str(&raw_info)?;
    Ok(MetricRecord {
        id,
        timestamp: from_micros(micros)?,
        raw_info,
        memory_used,
        ops_per_sec,
        hit_rate,
        rejected_connections,
    })
}

#[async_trait]
impl MetricsHistory for SqliteHistory {
    async fn append(
        &self,
        record: NewMetricRecord,
        timestamp: DateTime<Utc>,
    ) -> Result<MetricRecord, HistoryError> {
        let raw_info = serde_json::to_string(&record.raw_info)?;
        let mut tx = self.pool.begin().await?;

        let newest: Option<i64> = sqlx::query_scalar("SELECT MAX(timestamp) FROM metric_records")
            .fetch_one(&mut *tx)
            .await?;
        let newest = newest.map(from_micros).transpose()?;
        let timestamp = next_timestamp(timestamp, newest);

        let id = sqlx::query(
            r#"
            INSERT INTO metric_records
                (timestamp, raw_info, memory_used, ops_per_sec, hit_rate, rejected_connections)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(to_micros(timestamp))
        .bind(&raw_info)
        .bind(record.memory_used)
        .bind(record.ops_per_sec)
        .bind(record.hit_rate)
        .bind(record.rejected_connections)
        .execute(&mut *tx)
        .await?
        .last_insert_rowid();

        tx.commit().await?;

        Ok(MetricRecord {
            id,
            timestamp,
            raw_info: record.raw_info,
            memory_used: record.memory_used,
            ops_per_sec: record.ops_per_sec,
            hit_rate: record.hit_rate,
            rejected_connections: record.rejected_connections,
        })
    }

    async fn range_query(&self, query: &HistoryQuery) -> Result<HistoryPage, HistoryError> {
        let offset = i64::try_from(query.offset()?).map_err(|_| HistoryError::InvalidPage(query.page))?;
        let limit = i64::try_from(query.page_size).map_err(|_| HistoryError::InvalidPage(query.page))?;
        let start = query.start.map(to_micros);
        let end = query.end.map(to_micros);
        let filter = "WHERE (? IS NULL OR timestamp >= ?) AND (? IS NULL OR timestamp <= ?)";

        let count: i64 = sqlx::query_scalar(&format!(
            "SELECT COUNT(*) FROM metric_records {}",
            filter
        ))
        .bind(start)
        .bind(start)
        .bind(end)
        .bind(end)
        .fetch_one(&self.pool)
        .await?;

        let rows: Vec<Row> = sqlx::query_as(&format!(
            "{} {} ORDER BY timestamp DESC LIMIT ? OFFSET ?",
            SELECT_COLUMNS, filter
        ))
        .bind(start)
        .bind(start)
        .bind(end)
        .bind(end)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        let results = rows
            .into_iter()
            .map(decode_row)
            .collect::<Result<Vec<_>, _>>()?;
        HistoryPage::build(query, count.max(0) as u64, results)
    }

    async fn delete_before(&self, cutoff: DateTime<Utc>) -> Result<u64, HistoryError> {
        let result = sqlx::query("DELETE FROM metric_records WHERE timestamp < ?")
            .bind(to_micros(cutoff))
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn latest(&self) -> Result<Option<MetricRecord>, HistoryError> {
        let row: Option<Row> = sqlx::query_as(&format!(
            "{} ORDER BY timestamp DESC LIMIT 1",
            SELECT_COLUMNS
        ))
        .fetch_optional(&self.pool)
        .await?;
        row.map(decode_row).transpose()
    }
}
