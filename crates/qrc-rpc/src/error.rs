//! Error types for the qrc-rpc crate.
//!
//! Every operation resolves with a value or rejects with exactly one of
//! these. Per-frame parse failures never appear here; the codec logs and
//! drops them.

use std::time::Duration;

use crate::protocol::RpcError;
use crate::session::SessionState;
use crate::transport::CodecError;

/// Unified error type for transport and RPC operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Connection to {host} failed: {source}")]
    Connection {
        host: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Connecting to {host} timed out after {}ms", .timeout.as_millis())]
    ConnectTimeout { host: String, timeout: Duration },

    #[error("Operation timed out after {}ms", .0.as_millis())]
    OperationTimeout(Duration),

    #[error("Authentication failed for user '{user}': {reason}")]
    Authentication { user: String, reason: String },

    #[error("RPC error {code}: {message}")]
    Protocol { code: i32, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),

    #[error("Connection closed")]
    Disconnected,

    #[error("Unexpected response")]
    UnexpectedResponse,

    #[error("A request is already in flight on this session")]
    SessionBusy,

    #[error("Invalid session state: {0:?}")]
    InvalidState(SessionState),

    #[error("Config error: {0}")]
    Config(String),
}

impl Error {
    pub fn protocol(code: i32, message: impl Into<String>) -> Self {
        Self::Protocol {
            code,
            message: message.into(),
        }
    }

    /// True for errors that end the operation before any reply could be read.
    #[must_use]
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            Self::Connection { .. }
                | Self::ConnectTimeout { .. }
                | Self::OperationTimeout(_)
                | Self::Io(_)
                | Self::Codec(_)
                | Self::Disconnected
        )
    }
}

impl From<RpcError> for Error {
    fn from(e: RpcError) -> Self {
        Self::Protocol {
            code: e.code,
            message: e.message,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
