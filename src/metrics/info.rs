//! `INFO` reply parsing and derived metrics.
//!
//! The reply is a list of `key:value` lines grouped under `# Section`
//! headers. Parsing follows the usual client convention:
//!
//! ```text
//! uptime_in_seconds:3600            -> 3600        (integer)
//! mem_fragmentation_ratio:1.25      -> 1.25        (float)
//! redis_version:7.2.4               -> "7.2.4"     (string)
//! db0:keys=12,expires=3,avg_ttl=0   -> {"keys": 12, "expires": 3, "avg_ttl": 0}
//! ```

use serde::Serialize;
use serde_json::{Map, Number, Value as Json};

/// Parsed `INFO` fields, flattened across sections.
pub type InfoMap = Map<String, Json>;

/// Lines without a `:` are collected under this key.
pub const RAW_LINES_KEY: &str = "__raw__";

/// Parses an `INFO` reply body.
///
/// ```
/// use kvlens::metrics::parse_info;
///
/// let info = parse_info("# Stats\r\nkeyspace_hits:3\r\nkeyspace_misses:1\r\n");
/// assert_eq!(info["keyspace_hits"], 3);
/// ```
pub fn parse_info(text: &str) -> InfoMap {
    let mut info = Map::new();

    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        match line.split_once(':') {
            Some((key, value)) => {
                info.insert(key.to_string(), parse_field(value));
            }
            None => {
                let raw = info
                    .entry(RAW_LINES_KEY)
                    .or_insert_with(|| Json::Array(Vec::new()));
                if let Json::Array(lines) = raw {
                    lines.push(Json::String(line.to_string()));
                }
            }
        }
    }

    info
}

/// A `k=v,k=v` list becomes an object; anything else a scalar.
fn parse_field(value: &str) -> Json {
    if !(value.contains(',') && value.contains('=')) {
        return parse_scalar(value);
    }

    let mut nested = Map::new();
    for part in value.split(',') {
        if let Some((k, v)) = part.split_once('=') {
            nested.insert(k.to_string(), parse_scalar(v));
        }
    }
    Json::Object(nested)
}

fn parse_scalar(value: &str) -> Json {
    if value.contains('.') {
        if let Some(n) = value.parse::<f64>().ok().and_then(Number::from_f64) {
            return Json::Number(n);
        }
    } else if let Ok(n) = value.parse::<i64>() {
        return Json::Number(n.into());
    } else if let Ok(n) = value.parse::<u64>() {
        return Json::Number(n.into());
    }
    Json::String(value.to_string())
}

/// Fraction of key lookups that hit; `0.0` before any lookup.
pub fn hit_rate(hits: u64, misses: u64) -> f64 {
    let total = hits + misses;
    if total == 0 {
        0.0
    } else {
        hits as f64 / total as f64
    }
}

/// Metrics computed from a parsed `INFO` snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct DerivedMetrics {
    pub hit_rate: f64,
}

impl DerivedMetrics {
    pub fn from_info(info: &InfoMap) -> Self {
        let counter = |name: &str| info.get(name).and_then(Json::as_u64).unwrap_or(0);
        Self {
            hit_rate: hit_rate(counter("keyspace_hits"), counter("keyspace_misses")),
        }
    }
}

/// A live `INFO` snapshot with its derived metrics.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CurrentMetrics {
    pub info: InfoMap,
    pub derived: DerivedMetrics,
}

/// Reads an optional integer field.
pub(crate) fn info_i64(info: &InfoMap, name: &str) -> Option<i64> {
    info.get(name).and_then(Json::as_i64)
}

/// Reads an optional numeric field as a float.
pub(crate) fn info_f64(info: &InfoMap, name: &str) -> Option<f64> {
    info.get(name).and_then(Json::as_f64)
}
