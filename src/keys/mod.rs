//! Keyspace Module
//!
//! Everything that reads or writes user keys.
//!
//! ```text
//!                 ┌──────────────┐
//!   scan/search ─>│  KeyScanner  │── SCAN + pipelined TYPE/TTL
//!                 └──────────────┘
//!                 ┌──────────────┐
//!   read ────────>│ ValueReader  │── TYPE, then <fetch> + TTL pipelined
//!                 └──────────────┘
//!                 ┌──────────────┐
//!   create/del ──>│  KeyWriter   │── SET | HSET, EXPIRE / DEL
//!                 └──────────────┘
//!                        │
//!                        ▼
//!                  StoreClient (one connection per call)
//! ```

pub mod reader;
pub mod scanner;
pub mod types;
pub mod writer;

pub use reader::{decode_value, fetch_command, ValueReader, VALUE_LIMIT};
pub use scanner::{escape_glob, KeyScanner};
pub use types::{
    CreateKeyRequest, KeyDescriptor, KeyDetail, KeyType, NamePage, ScanCursor, ScanPage,
    ScoredMember, StreamEntry, Value, ValueEnvelope, TTL_MISSING, TTL_NO_EXPIRY,
};
pub use writer::KeyWriter;
