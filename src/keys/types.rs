//! Key and value types shared by the scanner, reader and writer.

use crate::error::MonitorError;
use serde::{Deserialize, Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;

/// The data type of a key, as reported by `TYPE`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum KeyType {
    String,
    Hash,
    List,
    Set,
    ZSet,
    Stream,
    /// The key does not exist.
    None,
    /// A type this crate does not know, e.g. one added by a module.
    Other(String),
}

impl KeyType {
    pub fn parse(name: &str) -> Self {
        match name {
            "string" => KeyType::String,
            "hash" => KeyType::Hash,
            "list" => KeyType::List,
            "set" => KeyType::Set,
            "zset" => KeyType::ZSet,
            "stream" => KeyType::Stream,
            "none" => KeyType::None,
            other => KeyType::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            KeyType::String => "string",
            KeyType::Hash => "hash",
            KeyType::List => "list",
            KeyType::Set => "set",
            KeyType::ZSet => "zset",
            KeyType::Stream => "stream",
            KeyType::None => "none",
            KeyType::Other(name) => name,
        }
    }

    pub fn exists(&self) -> bool {
        *self != KeyType::None
    }
}

impl fmt::Display for KeyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for KeyType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// Remaining time to live of a key in seconds.
pub const TTL_NO_EXPIRY: i64 = -1;
/// TTL reported for a key that does not exist.
pub const TTL_MISSING: i64 = -2;

/// One key with its type and TTL.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct KeyDescriptor {
    pub name: String,
    #[serde(rename = "type")]
    pub key_type: KeyType,
    pub ttl: i64,
}

/// Position in a SCAN cycle. Zero both starts and ends a cycle.
///
/// ```
/// use kvlens::keys::ScanCursor;
///
/// let cursor: ScanCursor = "17".parse().unwrap();
/// assert!(!cursor.is_complete());
/// assert_eq!(cursor.to_string(), "17");
/// assert!(ScanCursor::START.is_complete());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ScanCursor(u64);

impl ScanCursor {
    pub const START: ScanCursor = ScanCursor(0);

    pub fn new(raw: u64) -> Self {
        ScanCursor(raw)
    }

    pub fn value(&self) -> u64 {
        self.0
    }

    /// True for the `"0"` sentinel the store returns at the end of a cycle.
    pub fn is_complete(&self) -> bool {
        self.0 == 0
    }
}

impl std::str::FromStr for ScanCursor {
    type Err = MonitorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim()
            .parse::<u64>()
            .map(ScanCursor)
            .map_err(|_| MonitorError::bad_request(format!("Invalid cursor '{}'", s)))
    }
}

impl fmt::Display for ScanCursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Serialize for ScanCursor {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// One page of a scan, enriched with type and TTL.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScanPage {
    pub keys: Vec<KeyDescriptor>,
    pub next_cursor: ScanCursor,
}

/// One page of a scan with key names only.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NamePage {
    pub keys: Vec<String>,
    pub next_cursor: ScanCursor,
}

/// A sorted-set member and its score.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredMember {
    pub member: String,
    pub score: f64,
}

impl Serialize for ScoredMember {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        (&self.member, self.score).serialize(serializer)
    }
}

/// A stream entry: its id and field/value pairs.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamEntry {
    pub id: String,
    pub fields: BTreeMap<String, String>,
}

impl Serialize for StreamEntry {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        (&self.id, &self.fields).serialize(serializer)
    }
}

/// A key's value, one variant per store type.
///
/// Serialized untagged: strings as JSON strings, hashes as objects, lists and
/// sets as arrays, sorted sets as `[member, score]` pairs and streams as
/// `[id, {fields}]` pairs.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Value {
    String(String),
    Hash(BTreeMap<String, String>),
    List(Vec<String>),
    Set(Vec<String>),
    ZSet(Vec<ScoredMember>),
    Stream(Vec<StreamEntry>),
}

impl Value {
    /// Number of top-level elements (1 for a string).
    pub fn len(&self) -> usize {
        match self {
            Value::String(_) => 1,
            Value::Hash(map) => map.len(),
            Value::List(items) | Value::Set(items) => items.len(),
            Value::ZSet(members) => members.len(),
            Value::Stream(entries) => entries.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }
}

/// Normalised read of a key.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValueEnvelope {
    pub key: String,
    #[serde(rename = "type")]
    pub key_type: KeyType,
    pub ttl: i64,
    pub value: Value,
}

/// Key detail: full values for strings and hashes, a placeholder otherwise.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct KeyDetail {
    pub name: String,
    #[serde(rename = "type")]
    pub key_type: KeyType,
    pub ttl: i64,
    pub value: Value,
}

/// Body of a create-key request. Every field is optional on the wire so
/// that a missing field is reported as a bad request, not a decode error.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct CreateKeyRequest {
    pub name: Option<String>,
    #[serde(rename = "type")]
    pub key_type: Option<String>,
    pub value: Option<serde_json::Value>,
    pub ttl: Option<i64>,
}

impl CreateKeyRequest {
    pub fn string(name: &str, value: &str) -> Self {
        Self {
            name: Some(name.to_string()),
            key_type: Some("string".to_string()),
            value: Some(serde_json::Value::String(value.to_string())),
            ttl: None,
        }
    }

    pub fn with_ttl(mut self, ttl: i64) -> Self {
        self.ttl = Some(ttl);
        self
    }
}
