//! Error taxonomy for monitor operations.
//!
//! Every public operation returns [`MonitorError`]. Lower layers have their
//! own error types ([`ConnectionError`](crate::client::ConnectionError),
//! [`HistoryError`](crate::metrics::HistoryError)); the conversions below
//! classify them. A transport failure while opening a connection is
//! `Unreachable`, which callers must render as service-unavailable. Anything
//! that cannot be classified becomes `Internal` with the original message.

use serde::Serialize;
use thiserror::Error;

use crate::client::ConnectionError;
use crate::config::ConfigError;
use crate::metrics::HistoryError;

/// Errors returned by scanner, reader, writer, collector and the monitor facade.
#[derive(Debug, Error)]
pub enum MonitorError {
    /// The store could not be reached (refused, timed out, auth failed).
    #[error("store unreachable: {0}")]
    Unreachable(String),

    /// The key is absent, or a delete matched nothing.
    #[error("{0}")]
    NotFound(String),

    /// Malformed or missing input, or an unsupported write type.
    #[error("{0}")]
    BadRequest(String),

    /// The key holds a type the value reader does not dispatch.
    #[error("unsupported type: {0}")]
    UnsupportedType(String),

    /// Store protocol error, server error reply, persistence failure.
    #[error("{context}: {message}")]
    Internal { context: String, message: String },
}

/// Result type alias for monitor operations.
pub type Result<T> = std::result::Result<T, MonitorError>;

/// JSON body rendered for a failed operation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ErrorBody {
    pub detail: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl MonitorError {
    pub fn not_found(detail: impl Into<String>) -> Self {
        MonitorError::NotFound(detail.into())
    }

    pub fn bad_request(detail: impl Into<String>) -> Self {
        MonitorError::BadRequest(detail.into())
    }

    pub fn internal(context: impl Into<String>, message: impl ToString) -> Self {
        MonitorError::Internal {
            context: context.into(),
            message: message.to_string(),
        }
    }

    /// Re-labels an `Internal` error with the operation that failed.
    ///
    /// Classified errors pass through untouched.
    pub fn context(self, context: &str) -> Self {
        match self {
            MonitorError::Internal { message, .. } => MonitorError::Internal {
                context: context.to_string(),
                message,
            },
            other => other,
        }
    }

    /// HTTP status a transport layer should answer with.
    pub fn status_code(&self) -> u16 {
        match self {
            MonitorError::Unreachable(_) => 503,
            MonitorError::NotFound(_) => 404,
            MonitorError::BadRequest(_) => 400,
            MonitorError::UnsupportedType(_) | MonitorError::Internal { .. } => 500,
        }
    }

    pub fn is_unreachable(&self) -> bool {
        matches!(self, MonitorError::Unreachable(_))
    }

    /// Renders the `{detail, error}` body for this error.
    pub fn body(&self) -> ErrorBody {
        match self {
            MonitorError::Unreachable(reason) => ErrorBody {
                detail: "Redis unreachable".to_string(),
                error: Some(reason.clone()),
            },
            MonitorError::NotFound(detail) | MonitorError::BadRequest(detail) => ErrorBody {
                detail: detail.clone(),
                error: None,
            },
            MonitorError::UnsupportedType(kind) => ErrorBody {
                detail: format!("Unsupported type: {}", kind),
                error: None,
            },
            MonitorError::Internal { context, message } => ErrorBody {
                detail: context.clone(),
                error: Some(message.clone()),
            },
        }
    }
}

/// Connection errors raised after the connection was established.
///
/// Failures during `connect()` are mapped to `Unreachable` by the client
/// itself before they reach this conversion.
impl From<ConnectionError> for MonitorError {
    fn from(err: ConnectionError) -> Self {
        MonitorError::internal("Store command failed", err)
    }
}

impl From<HistoryError> for MonitorError {
    fn from(err: HistoryError) -> Self {
        match err {
            HistoryError::InvalidPage(_) => MonitorError::not_found("Invalid page."),
            other => MonitorError::internal("Metrics history failed", other),
        }
    }
}

impl From<ConfigError> for MonitorError {
    fn from(err: ConfigError) -> Self {
        MonitorError::internal("Invalid configuration", err)
    }
}

impl From<serde_json::Error> for MonitorError {
    fn from(err: serde_json::Error) -> Self {
        MonitorError::internal("Serialization failed", err)
    }
}
