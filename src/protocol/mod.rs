//! RESP Protocol Implementation
//!
//! The store speaks RESP2. This module encodes outgoing [`Command`]s and
//! parses the replies into [`RespValue`]s.
//!
//! ## Modules
//!
//! - `types`: `RespValue`, `Command` and wire serialization
//! - `parser`: incremental parser for replies read off a socket
//!
//! ## Example
//!
//! ```
//! use kvlens::protocol::{parse_message, Command, RespValue};
//!
//! let request = Command::new("TYPE").arg("user:1").encode();
//! assert!(request.starts_with(b"*2\r\n"));
//!
//! let (reply, consumed) = parse_message(b"+hash\r\n").unwrap().unwrap();
//! assert_eq!(reply, RespValue::simple_string("hash"));
//! assert_eq!(consumed, 7);
//! ```

pub mod parser;
pub mod types;

pub use parser::{parse_message, ParseError, ParseResult, RespParser};
pub use types::{Command, CommandArg, RespValue};
