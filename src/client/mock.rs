//! In-process fake store for tests.
//!
//! Serves the subset of commands the monitor sends over a real TCP listener,
//! using the crate's own RESP parser to read requests. Keys live in a sorted
//! map so SCAN cursors are plain offsets into the key order, and expiry is
//! lazy: expired keys are purged before every command.

use crate::protocol::{RespParser, RespValue};
use bytes::{Bytes, BytesMut};
use parking_lot::Mutex;
use std::collections::{BTreeMap, BTreeSet};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

#[derive(Debug, Clone)]
enum Data {
    Str(String),
    Hash(BTreeMap<String, String>),
    List(Vec<String>),
    Set(BTreeSet<String>),
    ZSet(Vec<(String, f64)>),
    Stream(Vec<(String, Vec<(String, String)>)>),
    Other(String),
}

impl Data {
    fn type_name(&self) -> &str {
        match self {
            Data::Str(_) => "string",
            Data::Hash(_) => "hash",
            Data::List(_) => "list",
            Data::Set(_) => "set",
            Data::ZSet(_) => "zset",
            Data::Stream(_) => "stream",
            Data::Other(name) => name,
        }
    }
}

#[derive(Debug, Clone)]
struct Item {
    data: Data,
    expires_at: Option<Instant>,
}

#[derive(Debug, Default)]
struct State {
    keys: BTreeMap<String, Item>,
    info: String,
    password: Option<String>,
    selected_db: u32,
    commands_seen: u64,
    max_batch: usize,
}

impl State {
    fn purge_expired(&mut self) {
        let now = Instant::now();
        self.keys
            .retain(|_, item| item.expires_at.map(|at| at > now).unwrap_or(true));
    }
}

/// Handle to a running fake store. The listener lives as long as the runtime.
#[derive(Clone)]
pub(crate) struct MockStore {
    addr: SocketAddr,
    state: Arc<Mutex<State>>,
}

const WRONGTYPE: &str = "WRONGTYPE Operation against a key holding the wrong kind of value";

impl MockStore {
    pub(crate) async fn start() -> Self {
        Self::spawn(None).await
    }

    pub(crate) async fn start_with_password(password: &str) -> Self {
        Self::spawn(Some(password.to_string())).await
    }

    async fn spawn(password: Option<String>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let state = Arc::new(Mutex::new(State {
            info: default_info(),
            password,
            ..Default::default()
        }));

        let shared = Arc::clone(&state);
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                tokio::spawn(serve(stream, Arc::clone(&shared)));
            }
        });

        Self { addr, state }
    }

    pub(crate) fn url(&self) -> String {
        format!("redis://{}", self.addr)
    }

    pub(crate) fn set_string(&self, key: &str, value: &str) {
        self.insert(key, Data::Str(value.to_string()));
    }

    pub(crate) fn set_hash(&self, key: &str, fields: &[(&str, &str)]) {
        let map = fields
            .iter()
            .map(|(f, v)| (f.to_string(), v.to_string()))
            .collect();
        self.insert(key, Data::Hash(map));
    }

    pub(crate) fn push_list<S: AsRef<str>>(&self, key: &str, items: &[S]) {
        let list = items.iter().map(|s| s.as_ref().to_string()).collect();
        self.insert(key, Data::List(list));
    }

    pub(crate) fn add_set<S: AsRef<str>>(&self, key: &str, members: &[S]) {
        let set = members.iter().map(|s| s.as_ref().to_string()).collect();
        self.insert(key, Data::Set(set));
    }

    pub(crate) fn add_zset(&self, key: &str, members: &[(&str, f64)]) {
        let mut zset: Vec<(String, f64)> = members
            .iter()
            .map(|(m, s)| (m.to_string(), *s))
            .collect();
        zset.sort_by(|a, b| a.1.total_cmp(&b.1).then_with(|| a.0.cmp(&b.0)));
        self.insert(key, Data::ZSet(zset));
    }

    /// Appends an entry with id `<n>-0`, where n is the entry's position.
    pub(crate) fn add_stream_entry(&self, key: &str, fields: &[(&str, &str)]) {
        let mut state = self.state.lock();
        let item = state.keys.entry(key.to_string()).or_insert(Item {
            data: Data::Stream(Vec::new()),
            expires_at: None,
        });
        if let Data::Stream(entries) = &mut item.data {
            let id = format!("{}-0", entries.len() + 1);
            let fields = fields
                .iter()
                .map(|(f, v)| (f.to_string(), v.to_string()))
                .collect();
            entries.push((id, fields));
        }
    }

    /// Stores a key whose TYPE is `type_name` and which no reader dispatches.
    pub(crate) fn set_other(&self, key: &str, type_name: &str) {
        self.insert(key, Data::Other(type_name.to_string()));
    }

    pub(crate) fn expire_in(&self, key: &str, ttl: Duration) {
        if let Some(item) = self.state.lock().keys.get_mut(key) {
            item.expires_at = Some(Instant::now() + ttl);
        }
    }

    pub(crate) fn set_info(&self, info: &str) {
        self.state.lock().info = info.to_string();
    }

    pub(crate) fn contains(&self, key: &str) -> bool {
        let mut state = self.state.lock();
        state.purge_expired();
        state.keys.contains_key(key)
    }

    pub(crate) fn hash_field(&self, key: &str, field: &str) -> Option<String> {
        match &self.state.lock().keys.get(key)?.data {
            Data::Hash(map) => map.get(field).cloned(),
            _ => None,
        }
    }

    pub(crate) fn selected_db(&self) -> u32 {
        self.state.lock().selected_db
    }

    pub(crate) fn commands_seen(&self) -> u64 {
        self.state.lock().commands_seen
    }

    /// Largest number of commands that arrived in a single socket read.
    pub(crate) fn max_batch(&self) -> usize {
        self.state.lock().max_batch
    }

    fn insert(&self, key: &str, data: Data) {
        self.state.lock().keys.insert(
            key.to_string(),
            Item {
                data,
                expires_at: None,
            },
        );
    }
}

/// URL of a port nothing listens on.
pub(crate) async fn closed_port_url() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("redis://{}", addr)
}

fn default_info() -> String {
    "# Server\r\n\
     redis_version:7.2.4\r\n\
     uptime_in_seconds:3600\r\n\
     \r\n\
     # Memory\r\n\
     used_memory:1048576\r\n\
     used_memory_human:1.00M\r\n\
     \r\n\
     # Stats\r\n\
     instantaneous_ops_per_sec:12\r\n\
     keyspace_hits:3\r\n\
     keyspace_misses:1\r\n\
     rejected_connections:0\r\n\
     \r\n\
     # Keyspace\r\n\
     db0:keys=1,expires=0,avg_ttl=0\r\n"
        .to_string()
}

async fn serve(mut stream: TcpStream, state: Arc<Mutex<State>>) {
    let mut buffer = BytesMut::with_capacity(4096);
    let mut parser = RespParser::new();
    let mut authed = state.lock().password.is_none();

    loop {
        match stream.read_buf(&mut buffer).await {
            Ok(0) | Err(_) => return,
            Ok(_) => {}
        }

        let mut out = Vec::new();
        let mut batch = 0;
        while let Ok(Some((command, consumed))) = parser.parse(&buffer) {
            let _ = buffer.split_to(consumed);
            batch += 1;
            let args: Vec<String> = command
                .into_array()
                .unwrap_or_default()
                .iter()
                .filter_map(RespValue::to_text)
                .collect();
            execute(&state, &mut authed, &args).serialize_into(&mut out);
        }

        {
            let mut s = state.lock();
            s.commands_seen += batch as u64;
            s.max_batch = s.max_batch.max(batch);
        }

        if !out.is_empty() && stream.write_all(&out).await.is_err() {
            return;
        }
    }
}

fn bulk(s: &str) -> RespValue {
    RespValue::bulk_string(Bytes::copy_from_slice(s.as_bytes()))
}

fn bulk_array<'a>(items: impl IntoIterator<Item = &'a String>) -> RespValue {
    RespValue::array(items.into_iter().map(|s| bulk(s)).collect())
}

fn format_score(score: f64) -> String {
    if score.fract() == 0.0 {
        format!("{}", score as i64)
    } else {
        score.to_string()
    }
}

/// Resolves Redis-style inclusive indices (negative counts from the end).
fn index_range(len: usize, start: i64, stop: i64) -> Option<(usize, usize)> {
    let len = len as i64;
    let start = if start < 0 { (len + start).max(0) } else { start };
    let stop = if stop < 0 { len + stop } else { stop.min(len - 1) };
    if start > stop || start >= len {
        return None;
    }
    Some((start as usize, stop as usize))
}

fn execute(state: &Mutex<State>, authed: &mut bool, args: &[String]) -> RespValue {
    let mut s = state.lock();
    s.purge_expired();

    let Some(name) = args.first().map(|n| n.to_uppercase()) else {
        return RespValue::error("ERR empty command");
    };
    let arg = |i: usize| args.get(i).map(String::as_str).unwrap_or("");
    let int = |i: usize| arg(i).parse::<i64>().unwrap_or(0);

    if name == "AUTH" {
        let given = args.last().cloned().unwrap_or_default();
        return if s.password.as_deref() == Some(given.as_str()) {
            *authed = true;
            RespValue::ok()
        } else {
            RespValue::error("WRONGPASS invalid username-password pair or user is disabled.")
        };
    }
    if !*authed {
        return RespValue::error("NOAUTH Authentication required.");
    }

    match name.as_str() {
        "PING" => RespValue::simple_string("PONG"),
        "SELECT" => {
            s.selected_db = int(1) as u32;
            RespValue::ok()
        }
        "DBSIZE" => RespValue::integer(s.keys.len() as i64),
        "INFO" => bulk(&s.info),
        "SCAN" => {
            let cursor = int(1).max(0) as usize;
            let mut pattern = "*".to_string();
            let mut count = 10usize;
            let mut i = 2;
            while i + 1 < args.len() {
                match args[i].to_uppercase().as_str() {
                    "MATCH" => pattern = args[i + 1].clone(),
                    "COUNT" => count = args[i + 1].parse().unwrap_or(10),
                    _ => {}
                }
                i += 2;
            }
            let names: Vec<&String> = s.keys.keys().collect();
            let end = (cursor + count.max(1)).min(names.len());
            let start = cursor.min(end);
            let matched: Vec<&String> = names[start..end]
                .iter()
                .copied()
                .filter(|k| glob_match(pattern.as_bytes(), k.as_bytes()))
                .collect();
            let next = if end >= names.len() { 0 } else { end };
            RespValue::array(vec![bulk(&next.to_string()), bulk_array(matched)])
        }
        "TYPE" => {
            let kind = s
                .keys
                .get(arg(1))
                .map(|item| item.data.type_name().to_string())
                .unwrap_or_else(|| "none".to_string());
            RespValue::simple_string(kind)
        }
        "TTL" => match s.keys.get(arg(1)) {
            None => RespValue::integer(-2),
            Some(Item { expires_at: None, .. }) => RespValue::integer(-1),
            Some(Item {
                expires_at: Some(at),
                ..
            }) => {
                let ms = at.saturating_duration_since(Instant::now()).as_millis() as i64;
                RespValue::integer((ms + 500) / 1000)
            }
        },
        "EXISTS" => RespValue::integer(
            args[1..]
                .iter()
                .filter(|k| s.keys.contains_key(k.as_str()))
                .count() as i64,
        ),
        "GET" => match s.keys.get(arg(1)) {
            None => RespValue::null(),
            Some(Item {
                data: Data::Str(v), ..
            }) => bulk(v),
            Some(_) => RespValue::error(WRONGTYPE),
        },
        "SET" => {
            if args.len() < 3 {
                return RespValue::error("ERR wrong number of arguments for 'set' command");
            }
            s.keys.insert(
                args[1].clone(),
                Item {
                    data: Data::Str(args[2].clone()),
                    expires_at: None,
                },
            );
            RespValue::ok()
        }
        "HSET" => {
            if args.len() < 4 || args.len() % 2 != 0 {
                return RespValue::error("ERR wrong number of arguments for 'hset' command");
            }
            let item = s.keys.entry(args[1].clone()).or_insert(Item {
                data: Data::Hash(BTreeMap::new()),
                expires_at: None,
            });
            let Data::Hash(map) = &mut item.data else {
                return RespValue::error(WRONGTYPE);
            };
            let mut added = 0;
            for pair in args[2..].chunks(2) {
                if map.insert(pair[0].clone(), pair[1].clone()).is_none() {
                    added += 1;
                }
            }
            RespValue::integer(added)
        }
        "HGETALL" => match s.keys.get(arg(1)) {
            None => RespValue::array(vec![]),
            Some(Item {
                data: Data::Hash(map),
                ..
            }) => bulk_array(map.iter().flat_map(|(f, v)| [f, v])),
            Some(_) => RespValue::error(WRONGTYPE),
        },
        "LRANGE" => match s.keys.get(arg(1)) {
            None => RespValue::array(vec![]),
            Some(Item {
                data: Data::List(list),
                ..
            }) => match index_range(list.len(), int(2), int(3)) {
                Some((a, b)) => bulk_array(&list[a..=b]),
                None => RespValue::array(vec![]),
            },
            Some(_) => RespValue::error(WRONGTYPE),
        },
        "SMEMBERS" => match s.keys.get(arg(1)) {
            None => RespValue::array(vec![]),
            Some(Item {
                data: Data::Set(set),
                ..
            }) => bulk_array(set.iter()),
            Some(_) => RespValue::error(WRONGTYPE),
        },
        "ZRANGE" => match s.keys.get(arg(1)) {
            None => RespValue::array(vec![]),
            Some(Item {
                data: Data::ZSet(zset),
                ..
            }) => {
                let with_scores = arg(4).eq_ignore_ascii_case("WITHSCORES");
                let mut out = Vec::new();
                if let Some((a, b)) = index_range(zset.len(), int(2), int(3)) {
                    for (member, score) in &zset[a..=b] {
                        out.push(bulk(member));
                        if with_scores {
                            out.push(bulk(&format_score(*score)));
                        }
                    }
                }
                RespValue::array(out)
            }
            Some(_) => RespValue::error(WRONGTYPE),
        },
        "XREVRANGE" => match s.keys.get(arg(1)) {
            None => RespValue::array(vec![]),
            Some(Item {
                data: Data::Stream(entries),
                ..
            }) => {
                let count = if arg(4).eq_ignore_ascii_case("COUNT") {
                    int(5).max(0) as usize
                } else {
                    usize::MAX
                };
                let out = entries
                    .iter()
                    .rev()
                    .take(count)
                    .map(|(id, fields)| {
                        RespValue::array(vec![
                            bulk(id),
                            bulk_array(fields.iter().flat_map(|(f, v)| [f, v])),
                        ])
                    })
                    .collect();
                RespValue::array(out)
            }
            Some(_) => RespValue::error(WRONGTYPE),
        },
        "EXPIRE" => {
            let seconds = int(2);
            let key = arg(1).to_string();
            if !s.keys.contains_key(&key) {
                return RespValue::integer(0);
            }
            if seconds <= 0 {
                s.keys.remove(&key);
            } else if let Some(item) = s.keys.get_mut(&key) {
                item.expires_at = Some(Instant::now() + Duration::from_secs(seconds as u64));
            }
            RespValue::integer(1)
        }
        "DEL" => {
            let removed = args[1..]
                .iter()
                .filter(|k| s.keys.remove(k.as_str()).is_some())
                .count();
            RespValue::integer(removed as i64)
        }
        _ => RespValue::error(format!("ERR unknown command '{}'", args[0])),
    }
}

/// Glob matching with `*`, `?`, `[...]` classes and `\` escapes.
pub(crate) fn glob_match(pattern: &[u8], text: &[u8]) -> bool {
    if pattern.is_empty() {
        return text.is_empty();
    }

    match pattern[0] {
        b'*' => (0..=text.len()).any(|i| glob_match(&pattern[1..], &text[i..])),
        b'?' => !text.is_empty() && glob_match(&pattern[1..], &text[1..]),
        b'[' => {
            if text.is_empty() {
                return false;
            }
            let mut i = 1;
            let negate = pattern.get(1) == Some(&b'^');
            if negate {
                i += 1;
            }
            let mut matched = false;
            while i < pattern.len() && pattern[i] != b']' {
                if pattern[i] == b'\\' && i + 1 < pattern.len() {
                    i += 1;
                    matched |= pattern[i] == text[0];
                } else if i + 2 < pattern.len() && pattern[i + 1] == b'-' && pattern[i + 2] != b']' {
                    matched |= text[0] >= pattern[i] && text[0] <= pattern[i + 2];
                    i += 2;
                } else {
                    matched |= pattern[i] == text[0];
                }
                i += 1;
            }
            if i >= pattern.len() {
                return false;
            }
            matched != negate && glob_match(&pattern[i + 1..], &text[1..])
        }
        b'\\' if pattern.len() > 1 => {
            !text.is_empty() && pattern[1] == text[0] && glob_match(&pattern[2..], &text[1..])
        }
        c => !text.is_empty() && c == text[0] && glob_match(&pattern[1..], &text[1..]),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_glob_match() {
        assert!(glob_match(b"*", b"anything"));
        assert!(glob_match(b"*user*", b"session:user:1"));
        assert!(!glob_match(b"*user*", b"session:1"));
        assert!(glob_match(b"h?llo", b"hello"));
        assert!(glob_match(b"h[ae]llo", b"hallo"));
        assert!(!glob_match(b"h[^e]llo", b"hello"));
        assert!(glob_match(b"key[0-9]", b"key7"));
        assert!(glob_match(b"*a\\*b*", b"xa*by"));
        assert!(!glob_match(b"*a\\*b*", b"xaZby"));
    }

    #[test]
    fn test_index_range() {
        assert_eq!(index_range(200, 0, 99), Some((0, 99)));
        assert_eq!(index_range(2, 0, 99), Some((0, 1)));
        assert_eq!(index_range(5, -2, -1), Some((3, 4)));
        assert_eq!(index_range(0, 0, 99), None);
    }
}
