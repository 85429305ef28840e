//! Cursor-based keyspace iteration.
//!
//! ## Stepping
//!
//! ```text
//! no pattern:   SCAN c COUNT n                      (exactly one step)
//!
//! pattern:      SCAN c MATCH p COUNT n ──┐
//!                  ▲                     │ matches < n and cursor != 0
//!                  └─────────────────────┘
//!
//! enrichment:   TYPE k1, TTL k1, ... TYPE kN, TTL kN   (one pipeline)
//! ```
//!
//! A pattern-filtered page returns every match seen in the steps it took, so
//! it can hold more than `count` keys. Truncating would drop keys that the
//! next cursor has already moved past.

use super::reader::decode_ttl;
use super::types::{KeyDescriptor, KeyType, NamePage, ScanCursor, ScanPage};
use crate::client::{Connection, ConnectionError, StoreClient};
use crate::error::{MonitorError, Result};
use crate::protocol::{Command, RespValue};
use tracing::debug;

/// Enumerates keys through the store's SCAN cursor.
#[derive(Debug, Clone)]
pub struct KeyScanner {
    client: StoreClient,
}

impl KeyScanner {
    pub fn new(client: StoreClient) -> Self {
        Self { client }
    }

    /// Returns one page of keys with their type and TTL.
    pub async fn scan(
        &self,
        cursor: ScanCursor,
        count: usize,
        pattern: Option<&str>,
    ) -> Result<ScanPage> {
        check_count(count)?;
        let mut conn = self.client.connect().await?;

        let (next_cursor, names) = collect_names(&mut conn, cursor, count, pattern)
            .await
            .map_err(|e| MonitorError::from(e).context("Error scanning keys"))?;
        let keys = enrich(&mut conn, names)
            .await
            .map_err(|e| MonitorError::from(e).context("Error scanning keys"))?;

        debug!(
            cursor = %cursor,
            next = %next_cursor,
            keys = keys.len(),
            "Scanned keys"
        );
        Ok(ScanPage { keys, next_cursor })
    }

    /// Same stepping as [`scan`](Self::scan), names only.
    pub async fn scan_names(
        &self,
        cursor: ScanCursor,
        count: usize,
        pattern: Option<&str>,
    ) -> Result<NamePage> {
        check_count(count)?;
        let mut conn = self.client.connect().await?;
        let (next_cursor, keys) = collect_names(&mut conn, cursor, count, pattern)
            .await
            .map_err(|e| MonitorError::from(e).context("Error scanning keys"))?;
        Ok(NamePage { keys, next_cursor })
    }

    /// Finds keys whose name contains `pattern`, at most `limit` of them.
    ///
    /// Glob metacharacters in `pattern` are escaped, so it always matches
    /// as a literal substring: `a*b` finds only keys containing `a*b`, not
    /// every key with an `a` before a `b`.
    pub async fn search(&self, pattern: &str, limit: usize) -> Result<Vec<KeyDescriptor>> {
        if pattern.is_empty() {
            return Err(MonitorError::bad_request("Missing query parameter 'q'"));
        }
        check_count(limit)?;

        let glob = format!("*{}*", escape_glob(pattern));
        let mut conn = self.client.connect().await?;

        let mut matched = Vec::new();
        let mut cursor = ScanCursor::START;
        loop {
            let (next, names) = scan_step(&mut conn, cursor, limit, Some(&glob))
                .await
                .map_err(|e| MonitorError::from(e).context("Error searching keys"))?;
            matched.extend(names);
            cursor = next;
            if cursor.is_complete() || matched.len() >= limit {
                break;
            }
        }
        matched.truncate(limit);

        let keys = enrich(&mut conn, matched)
            .await
            .map_err(|e| MonitorError::from(e).context("Error searching keys"))?;
        debug!(pattern = %pattern, found = keys.len(), "Searched keys");
        Ok(keys)
    }

    /// Number of keys in the selected database.
    pub async fn count(&self) -> Result<u64> {
        let mut conn = self.client.connect().await?;
        let total = conn
            .query_int(&Command::new("DBSIZE"))
            .await
            .map_err(|e| MonitorError::from(e).context("Error getting total keys"))?;
        Ok(total.max(0) as u64)
    }
}

fn check_count(count: usize) -> Result<()> {
    if count == 0 {
        return Err(MonitorError::bad_request("count must be a positive integer"));
    }
    Ok(())
}

/// Escapes `*`, `?`, `[`, `]` and `\` so the text matches literally.
pub fn escape_glob(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        if matches!(c, '*' | '?' | '[' | ']' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// Runs one SCAN command.
async fn scan_step(
    conn: &mut Connection,
    cursor: ScanCursor,
    count: usize,
    pattern: Option<&str>,
) -> std::result::Result<(ScanCursor, Vec<String>), ConnectionError> {
    let mut command = Command::new("SCAN").arg(cursor.value());
    if let Some(pattern) = pattern {
        command = command.arg("MATCH").arg(pattern);
    }
    let command = command.arg("COUNT").arg(count);

    let reply = conn.exec(&command).await?;
    parse_scan_reply(reply)
}

/// Decodes `[cursor, [key, ...]]`.
fn parse_scan_reply(
    reply: RespValue,
) -> std::result::Result<(ScanCursor, Vec<String>), ConnectionError> {
    let bad = |reply: &RespValue| ConnectionError::unexpected("SCAN", reply);

    let parts = match reply {
        RespValue::Array(parts) if parts.len() == 2 => parts,
        other => return Err(bad(&other)),
    };
    let cursor = parts[0]
        .as_integer()
        .filter(|c| *c >= 0)
        .map(|c| ScanCursor::new(c as u64))
        .ok_or_else(|| bad(&parts[0]))?;
    let names = parts[1]
        .as_array()
        .ok_or_else(|| bad(&parts[1]))?
        .iter()
        .map(|name| name.to_text().ok_or_else(|| bad(name)))
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok((cursor, names))
}

/// One step without a pattern, or steps until `count` matches or cycle end.
async fn collect_names(
    conn: &mut Connection,
    cursor: ScanCursor,
    count: usize,
    pattern: Option<&str>,
) -> std::result::Result<(ScanCursor, Vec<String>), ConnectionError> {
    let Some(pattern) = pattern else {
        return scan_step(conn, cursor, count, None).await;
    };

    let mut names = Vec::new();
    let mut cursor = cursor;
    loop {
        let (next, batch) = scan_step(conn, cursor, count, Some(pattern)).await?;
        names.extend(batch);
        cursor = next;
        if cursor.is_complete() || names.len() >= count {
            return Ok((cursor, names));
        }
    }
}

/// Resolves type and TTL for every name in a single pipelined exchange.
pub(crate) async fn enrich(
    conn: &mut Connection,
    names: Vec<String>,
) -> std::result::Result<Vec<KeyDescriptor>, ConnectionError> {
    let commands: Vec<Command> = names
        .iter()
        .flat_map(|name| [Command::new("TYPE").arg(name), Command::new("TTL").arg(name)])
        .collect();
    let replies = conn.pipeline(&commands).await?;

    names
        .into_iter()
        .zip(replies.chunks(2))
        .map(|(name, pair)| {
            let key_type = match &pair[0] {
                RespValue::Error(message) => return Err(ConnectionError::Server(message.clone())),
                reply => reply
                    .as_str()
                    .map(KeyType::parse)
                    .ok_or_else(|| ConnectionError::unexpected("TYPE", reply))?,
            };
            let ttl = decode_ttl(&pair[1])?;
            Ok(KeyDescriptor { name, key_type, ttl })
        })
        .collect()
}
