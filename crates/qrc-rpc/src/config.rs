//! Per-session connection settings.

use std::fmt;
use std::time::Duration;

use crate::error::{Error, Result};

/// Control protocol port on the Core
pub const DEFAULT_PORT: u16 = 1710;
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_OPERATION_TIMEOUT: Duration = Duration::from_secs(30);
/// Quiescence window, measured from connection establishment
pub const DEFAULT_SETTLE_WINDOW: Duration = Duration::from_secs(1);

#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Immutable settings shared by every session a client opens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionConfig {
    pub host: String,
    pub port: u16,
    pub credentials: Option<Credentials>,
    /// Component addressed when a caller does not name one
    pub default_component: Option<String>,
    /// Log every received frame at info level
    pub verbose: bool,
    pub connect_timeout: Duration,
    pub operation_timeout: Duration,
    pub settle_window: Duration,
}

impl ConnectionConfig {
    #[must_use]
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: DEFAULT_PORT,
            credentials: None,
            default_component: None,
            verbose: false,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            operation_timeout: DEFAULT_OPERATION_TIMEOUT,
            settle_window: DEFAULT_SETTLE_WINDOW,
        }
    }

    /// Set credentials. Both must be non-empty, otherwise the session runs
    /// unauthenticated.
    #[must_use]
    pub fn with_credentials(
        mut self,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        let username = username.into();
        let password = password.into();
        self.credentials = if username.is_empty() || password.is_empty() {
            None
        } else {
            Some(Credentials { username, password })
        };
        self
    }

    #[must_use]
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    #[must_use]
    pub fn with_default_component(mut self, component: impl Into<String>) -> Self {
        self.default_component = Some(component.into());
        self
    }

    #[must_use]
    pub fn with_timeouts(
        mut self,
        connect: Duration,
        operation: Duration,
        settle: Duration,
    ) -> Self {
        self.connect_timeout = connect;
        self.operation_timeout = operation;
        self.settle_window = settle;
        self
    }

    #[must_use]
    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    /// Check the settings before any session is opened.
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` for an empty host, port 0 or a zero timeout.
    pub fn validate(&self) -> Result<()> {
        if self.host.trim().is_empty() {
            return Err(Error::Config("host must not be empty".to_string()));
        }
        if self.port == 0 {
            return Err(Error::Config("port must not be 0".to_string()));
        }
        if self.connect_timeout.is_zero() || self.operation_timeout.is_zero() {
            return Err(Error::Config("timeouts must be greater than zero".to_string()));
        }
        if self.settle_window.is_zero() {
            return Err(Error::Config("settle window must be greater than zero".to_string()));
        }
        Ok(())
    }

    /// `host:port` for log lines.
    #[must_use]
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    #[must_use]
    pub fn username(&self) -> Option<&str> {
        self.credentials.as_ref().map(|c| c.username.as_str())
    }
}
