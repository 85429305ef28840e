//! Store Connection
//!
//! A single TCP connection to the store with its own read buffer and parser.
//!
//! ## Request Lifecycle
//!
//! ```text
//! exec(cmd)                         pipeline([c1, c2, ... cN])
//!    │                                  │
//!    ▼                                  ▼
//! encode one command            encode all N commands into one buffer
//!    │                                  │
//!    ▼                                  ▼
//! write + flush                  write + flush (one network exchange)
//!    │                                  │
//!    ▼                                  ▼
//! read until 1 reply parses     read until N replies parse, in order
//! ```
//!
//! Replies are parsed out of a `BytesMut` that accumulates socket reads, so
//! a reply split across TCP segments, or several replies arriving in one
//! segment, are both handled by the same loop.

use crate::config::{StoreAddress, StoreConfig};
use crate::protocol::{Command, ParseError, RespParser, RespValue};
use bytes::BytesMut;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt, BufWriter};
use tokio::net::TcpStream;
use tracing::{debug, trace};

/// Upper bound for buffered reply bytes: one maximal bulk string plus framing.
const MAX_BUFFER_SIZE: usize = crate::protocol::parser::MAX_BULK_SIZE + 64 * 1024;

const INITIAL_BUFFER_SIZE: usize = 4096;

/// Errors that can occur on an established (or establishing) connection.
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    /// I/O error (network issue)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The reply stream was not valid RESP
    #[error("parse error: {0}")]
    Parse(#[from] ParseError),

    /// The store closed the connection
    #[error("connection closed by store")]
    Closed,

    /// The store sent more data than any single reply can hold
    #[error("reply buffer limit exceeded")]
    BufferFull,

    /// No reply within the configured I/O timeout
    #[error("timed out after {0:?}")]
    Timeout(Duration),

    /// The store answered with an error reply
    #[error("{0}")]
    Server(String),

    /// The reply had a shape the command never produces
    #[error("unexpected {found} reply to {command}")]
    UnexpectedReply { command: String, found: &'static str },
}

impl ConnectionError {
    pub(crate) fn unexpected(command: &str, reply: &RespValue) -> Self {
        ConnectionError::UnexpectedReply {
            command: command.to_string(),
            found: reply.kind(),
        }
    }
}

/// An open connection to the store.
pub struct Connection {
    stream: BufWriter<TcpStream>,

    /// `host:port`, for logging
    peer: String,

    buffer: BytesMut,

    parser: RespParser,

    io_timeout: Duration,
}

impl Connection {
    /// Opens the TCP connection and runs the AUTH / SELECT / PING handshake.
    pub(crate) async fn open(
        address: &StoreAddress,
        config: &StoreConfig,
    ) -> Result<Self, ConnectionError> {
        let peer = address.socket_addr();
        let connect_timeout = config.connect_timeout();

        let stream = tokio::time::timeout(connect_timeout, TcpStream::connect(&peer))
            .await
            .map_err(|_| ConnectionError::Timeout(connect_timeout))??;
        stream.set_nodelay(true)?;

        let mut conn = Self {
            stream: BufWriter::new(stream),
            peer,
            buffer: BytesMut::with_capacity(INITIAL_BUFFER_SIZE),
            parser: RespParser::new(),
            io_timeout: config.io_timeout(),
        };

        if let Some(password) = &address.password {
            let auth = match &address.username {
                Some(user) => Command::new("AUTH").arg(user).arg(password),
                None => Command::new("AUTH").arg(password),
            };
            conn.exec(&auth).await?;
        }
        if address.db != 0 {
            conn.exec(&Command::new("SELECT").arg(address.db)).await?;
        }
        conn.exec(&Command::new("PING")).await?;

        debug!(peer = %conn.peer, db = address.db, "Connected to store");
        Ok(conn)
    }

    /// Sends one command and returns its reply.
    ///
    /// An error reply from the store is returned as [`ConnectionError::Server`].
    pub async fn exec(&mut self, command: &Command) -> Result<RespValue, ConnectionError> {
        let mut replies = self.round_trip(std::slice::from_ref(command)).await?;
        match replies.pop() {
            Some(RespValue::Error(message)) => Err(ConnectionError::Server(message)),
            Some(reply) => Ok(reply),
            None => Err(ConnectionError::Closed),
        }
    }

    /// Sends all `commands` in one write and reads back one reply per command.
    ///
    /// Error replies are returned in place so that one failing command does
    /// not hide the replies of the others.
    pub async fn pipeline(&mut self, commands: &[Command]) -> Result<Vec<RespValue>, ConnectionError> {
        if commands.is_empty() {
            return Ok(Vec::new());
        }
        self.round_trip(commands).await
    }

    /// Sends one command whose reply must be an integer.
    pub async fn query_int(&mut self, command: &Command) -> Result<i64, ConnectionError> {
        let reply = self.exec(command).await?;
        reply
            .as_integer()
            .ok_or_else(|| ConnectionError::unexpected(command.name(), &reply))
    }

    /// Sends one command whose reply must be a string.
    pub async fn query_text(&mut self, command: &Command) -> Result<String, ConnectionError> {
        let reply = self.exec(command).await?;
        reply
            .to_text()
            .ok_or_else(|| ConnectionError::unexpected(command.name(), &reply))
    }

    pub fn peer(&self) -> &str {
        &self.peer
    }

    async fn round_trip(&mut self, commands: &[Command]) -> Result<Vec<RespValue>, ConnectionError> {
        let timeout = self.io_timeout;
        tokio::time::timeout(timeout, async {
            self.send(commands).await?;
            let mut replies = Vec::with_capacity(commands.len());
            while replies.len() < commands.len() {
                replies.push(self.read_reply().await?);
            }
            Ok::<_, ConnectionError>(replies)
        })
        .await
        .map_err(|_| ConnectionError::Timeout(timeout))?
    }

    async fn send(&mut self, commands: &[Command]) -> Result<(), ConnectionError> {
        let mut out = Vec::with_capacity(64 * commands.len());
        for command in commands {
            command.encode_into(&mut out);
        }
        self.stream.write_all(&out).await?;
        self.stream.flush().await?;
        trace!(
            peer = %self.peer,
            commands = commands.len(),
            bytes = out.len(),
            "Sent request"
        );
        Ok(())
    }

    async fn read_reply(&mut self) -> Result<RespValue, ConnectionError> {
        loop {
            if !self.buffer.is_empty() {
                if let Some((value, consumed)) = self.parser.parse(&self.buffer)? {
                    let _ = self.buffer.split_to(consumed);
                    return Ok(value);
                }
            }
            self.read_more_data().await?;
        }
    }

    async fn read_more_data(&mut self) -> Result<(), ConnectionError> {
        if self.buffer.len() >= MAX_BUFFER_SIZE {
            return Err(ConnectionError::BufferFull);
        }

        if self.buffer.capacity() - self.buffer.len() < 1024 {
            self.buffer.reserve(INITIAL_BUFFER_SIZE);
        }

        let n = self.stream.get_mut().read_buf(&mut self.buffer).await?;
        if n == 0 {
            return Err(ConnectionError::Closed);
        }

        trace!(peer = %self.peer, bytes = n, "Read data");
        Ok(())
    }
}
