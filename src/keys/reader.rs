//! Type-dispatched value reads.
//!
//! | type   | command                          | truncated |
//! |--------|----------------------------------|-----------|
//! | string | `GET key`                        | no        |
//! | hash   | `HGETALL key`                    | no        |
//! | list   | `LRANGE key 0 99`                | yes       |
//! | set    | `SMEMBERS key` (first 100 kept)  | yes       |
//! | zset   | `ZRANGE key 0 99 WITHSCORES`     | yes       |
//! | stream | `XREVRANGE key + - COUNT 100`    | yes       |
//!
//! The value command and `TTL` are sent together in one pipeline.

use super::types::{
    KeyDetail, KeyType, ScoredMember, StreamEntry, Value, ValueEnvelope,
};
use crate::client::{Connection, ConnectionError, StoreClient};
use crate::error::{MonitorError, Result};
use crate::protocol::{Command, RespValue};
use std::collections::BTreeMap;
use tracing::debug;

/// Collections are cut to this many elements.
pub const VALUE_LIMIT: usize = 100;

/// Reads values of every supported type.
#[derive(Debug, Clone)]
pub struct ValueReader {
    client: StoreClient,
}

impl ValueReader {
    pub fn new(client: StoreClient) -> Self {
        Self { client }
    }

    /// Reads the value and TTL of `key`.
    pub async fn read(&self, key: &str) -> Result<ValueEnvelope> {
        let mut conn = self.client.connect().await?;

        let key_type = key_type(&mut conn, key)
            .await
            .map_err(|e| MonitorError::from(e).context("Error fetching value"))?;
        let Some(command) = fetch_command(&key_type, key) else {
            return Err(match key_type {
                KeyType::None => not_found(key),
                other => MonitorError::UnsupportedType(other.to_string()),
            });
        };

        let (reply, ttl) = fetch_with_ttl(&mut conn, command, key)
            .await
            .map_err(|e| MonitorError::from(e).context("Error fetching value"))?;
        if reply.is_null() {
            // Deleted between TYPE and GET.
            return Err(not_found(key));
        }
        let value = decode_value(&key_type, reply)
            .map_err(|e| MonitorError::from(e).context("Error fetching value"))?;

        debug!(key = %key, key_type = %key_type, elements = value.len(), "Read value");
        Ok(ValueEnvelope {
            key: key.to_string(),
            key_type,
            ttl,
            value,
        })
    }

    /// Reads `key` for the key-detail view: strings and hashes in full, any
    /// other type as a `<unsupported key type: T>` placeholder.
    pub async fn read_detail(&self, key: &str) -> Result<KeyDetail> {
        let mut conn = self.client.connect().await?;
        let wrap = |e: ConnectionError| MonitorError::from(e).context("Error retrieving key");

        let key_type = key_type(&mut conn, key).await.map_err(wrap)?;
        let (value, ttl) = match key_type {
            KeyType::None => return Err(not_found(key)),
            KeyType::String | KeyType::Hash => {
                let command = fetch_command(&key_type, key)
                    .ok_or_else(|| MonitorError::UnsupportedType(key_type.to_string()))?;
                let (reply, ttl) = fetch_with_ttl(&mut conn, command, key).await.map_err(wrap)?;
                if reply.is_null() {
                    return Err(not_found(key));
                }
                (decode_value(&key_type, reply).map_err(wrap)?, ttl)
            }
            ref other => {
                let ttl = conn
                    .query_int(&Command::new("TTL").arg(key))
                    .await
                    .map_err(wrap)?;
                (Value::String(format!("<unsupported key type: {}>", other)), ttl)
            }
        };

        Ok(KeyDetail {
            name: key.to_string(),
            key_type,
            ttl,
            value,
        })
    }
}

fn not_found(key: &str) -> MonitorError {
    MonitorError::not_found(format!("Key '{}' not found", key))
}

async fn key_type(conn: &mut Connection, key: &str) -> std::result::Result<KeyType, ConnectionError> {
    conn.query_text(&Command::new("TYPE").arg(key))
        .await
        .map(|name| KeyType::parse(&name))
}

async fn fetch_with_ttl(
    conn: &mut Connection,
    command: Command,
    key: &str,
) -> std::result::Result<(RespValue, i64), ConnectionError> {
    let mut replies = conn
        .pipeline(&[command, Command::new("TTL").arg(key)])
        .await?
        .into_iter();

    let reply = match replies.next() {
        Some(RespValue::Error(message)) => return Err(ConnectionError::Server(message)),
        Some(reply) => reply,
        None => return Err(ConnectionError::Closed),
    };
    let ttl = match replies.next() {
        Some(reply) => decode_ttl(&reply)?,
        None => return Err(ConnectionError::Closed),
    };
    Ok((reply, ttl))
}

/// Decodes a `TTL` reply. Anything but an integer is a protocol error.
pub(crate) fn decode_ttl(reply: &RespValue) -> std::result::Result<i64, ConnectionError> {
    match reply {
        RespValue::Error(message) => Err(ConnectionError::Server(message.clone())),
        reply => reply
            .as_integer()
            .ok_or_else(|| ConnectionError::unexpected("TTL", reply)),
    }
}

/// The command that retrieves a value of `key_type`, or `None` for types
/// that cannot be read.
pub fn fetch_command(key_type: &KeyType, key: &str) -> Option<Command> {
    let last = VALUE_LIMIT as i64 - 1;
    let command = match key_type {
        KeyType::String => Command::new("GET").arg(key),
        KeyType::Hash => Command::new("HGETALL").arg(key),
        KeyType::List => Command::new("LRANGE").arg(key).arg(0i64).arg(last),
        KeyType::Set => Command::new("SMEMBERS").arg(key),
        KeyType::ZSet => Command::new("ZRANGE")
            .arg(key)
            .arg(0i64)
            .arg(last)
            .arg("WITHSCORES"),
        KeyType::Stream => Command::new("XREVRANGE")
            .arg(key)
            .arg("+")
            .arg("-")
            .arg("COUNT")
            .arg(VALUE_LIMIT),
        KeyType::None | KeyType::Other(_) => return None,
    };
    Some(command)
}

/// Decodes the reply of [`fetch_command`] into a [`Value`].
pub fn decode_value(key_type: &KeyType, reply: RespValue) -> std::result::Result<Value, ConnectionError> {
    let command = match key_type {
        KeyType::String => "GET",
        KeyType::Hash => "HGETALL",
        KeyType::List => "LRANGE",
        KeyType::Set => "SMEMBERS",
        KeyType::ZSet => "ZRANGE",
        KeyType::Stream => "XREVRANGE",
        KeyType::None | KeyType::Other(_) => {
            return Err(ConnectionError::unexpected(key_type.as_str(), &reply))
        }
    };
    let bad = |reply: &RespValue| ConnectionError::unexpected(command, reply);

    match key_type {
        KeyType::String => reply.to_text().map(Value::String).ok_or_else(|| bad(&reply)),
        KeyType::Hash => Ok(Value::Hash(decode_pairs(command, &reply)?)),
        KeyType::List => {
            let mut items = decode_strings(command, &reply)?;
            items.truncate(VALUE_LIMIT);
            Ok(Value::List(items))
        }
        KeyType::Set => {
            let mut members = decode_strings(command, &reply)?;
            members.truncate(VALUE_LIMIT);
            Ok(Value::Set(members))
        }
        KeyType::ZSet => {
            let flat = decode_strings(command, &reply)?;
            if flat.len() % 2 != 0 {
                return Err(bad(&reply));
            }
            let members = flat
                .chunks(2)
                .take(VALUE_LIMIT)
                .map(|pair| {
                    let score = pair[1].parse::<f64>().map_err(|_| bad(&reply))?;
                    Ok(ScoredMember {
                        member: pair[0].clone(),
                        score,
                    })
                })
                .collect::<std::result::Result<Vec<_>, ConnectionError>>()?;
            Ok(Value::ZSet(members))
        }
        KeyType::Stream => {
            let entries = reply
                .as_array()
                .ok_or_else(|| bad(&reply))?
                .iter()
                .take(VALUE_LIMIT)
                .map(|entry| match entry.as_array() {
                    Some([id, fields]) => Ok(StreamEntry {
                        id: id.to_text().ok_or_else(|| bad(id))?,
                        fields: decode_pairs(command, fields)?,
                    }),
                    _ => Err(bad(entry)),
                })
                .collect::<std::result::Result<Vec<_>, ConnectionError>>()?;
            Ok(Value::Stream(entries))
        }
        KeyType::None | KeyType::Other(_) => Err(bad(&reply)),
    }
}

fn decode_strings(command: &str, reply: &RespValue) -> std::result::Result<Vec<String>, ConnectionError> {
    reply
        .as_array()
        .ok_or_else(|| ConnectionError::unexpected(command, reply))?
        .iter()
        .map(|item| {
            item.to_text()
                .ok_or_else(|| ConnectionError::unexpected(command, item))
        })
        .collect()
}

fn decode_pairs(
    command: &str,
    reply: &RespValue,
) -> std::result::Result<BTreeMap<String, String>, ConnectionError> {
    let flat = decode_strings(command, reply)?;
    if flat.len() % 2 != 0 {
        return Err(ConnectionError::unexpected(command, reply));
    }
    Ok(flat
        .chunks(2)
        .map(|pair| (pair[0].clone(), pair[1].clone()))
        .collect())
}
