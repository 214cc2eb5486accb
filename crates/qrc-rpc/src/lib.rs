//! Client for the Core JSON-RPC control protocol.
//!
//! The Core speaks JSON-RPC 2.0 over TCP (port 1710) with every message
//! terminated by a single NUL byte. This crate provides the frame codec, the
//! wire types, a per-operation transport session and the RPC client built on
//! top of it.
//!
//! # Architecture
//!
//! - [`transport`]: NUL-delimited frame codec and incremental parser
//! - [`protocol`]: JSON-RPC 2.0 request, response and error types
//! - [`session`]: Transport session state machine (connect, authenticate,
//!   send, teardown) and the [`Connector`] seam
//! - [`client`]: Method-level client (`Component.Get`, `Component.Set`, ...)
//! - [`config`]: Connection settings and defaults
//! - [`error`]: Error type and `Result` alias
//!
//! # Example
//!
//! ```no_run
//! use qrc_rpc::{ConnectionConfig, RpcClient};
//!
//! # async fn example() -> Result<(), qrc_rpc::Error> {
//! let config = ConnectionConfig::new("192.168.1.20").with_credentials("admin", "1234");
//! let client = RpcClient::new(config)?;
//!
//! for component in client.get_components().await? {
//!     println!("{} ({})", component.name, component.component_type);
//! }
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod config;
pub mod error;
pub mod protocol;
pub mod session;
pub mod transport;

pub use client::{CODE_CONTROL, RELOAD_CONTROL, REQUEST_ID, RpcClient};
pub use config::{
    ConnectionConfig, Credentials, DEFAULT_CONNECT_TIMEOUT, DEFAULT_OPERATION_TIMEOUT,
    DEFAULT_PORT, DEFAULT_SETTLE_WINDOW,
};
pub use error::{Error, Result};
pub use protocol::{
    ControlValue, LOGON_REQUIRED, Message, Request, RequestId, Response, RpcError,
    UNKNOWN_COMPONENT, UNKNOWN_CONTROL,
};
pub use session::{CompletionMode, Connector, Reply, Session, SessionState, TcpConnector};
pub use transport::{CodecError, FrameCodec, FrameParser, parse};

pub use qrc_types::{ComponentControls, ComponentDescriptor, ControlSnapshot};
