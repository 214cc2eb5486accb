use crate::diagnostics::ExclusionRule;
use crate::{Error, Result};
use qrc_rpc::ConnectionConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Main configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    #[serde(default)]
    pub connection: ConnectionSettings,

    #[serde(default)]
    pub timeouts: TimeoutSettings,

    #[serde(default)]
    pub diagnostics: DiagnosticsConfig,
}

impl Config {
    /// Load config from file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or contains invalid JSON.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)?;
        super::validation::warn_unknown_fields(&content, "config.json");
        let config = serde_json::from_str(&content)?;
        Ok(config)
    }

    /// Save config to file.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails or the file cannot be written.
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Build the per-session connection settings.
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` if the host is missing, the port is 0 or a
    /// timeout is zero.
    pub fn connection_config(&self) -> Result<ConnectionConfig> {
        let connection = &self.connection;
        let mut config = ConnectionConfig::new(connection.host.clone())
            .with_port(connection.port)
            .with_verbose(connection.verbose)
            .with_timeouts(
                Duration::from_millis(self.timeouts.connect_ms),
                Duration::from_millis(self.timeouts.operation_ms),
                Duration::from_millis(self.timeouts.settle_ms),
            );

        if let (Some(username), Some(password)) = (&connection.username, &connection.password) {
            config = config.with_credentials(username.clone(), password.clone());
        }
        if let Some(component) = &connection.default_component {
            config = config.with_default_component(component.clone());
        }

        match config.validate() {
            Ok(()) => Ok(config),
            Err(qrc_rpc::Error::Config(msg)) => Err(Error::Config(msg)),
            Err(e) => Err(e.into()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionSettings {
    #[serde(default)]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,

    /// Component used when a command does not name one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_component: Option<String>,

    /// Log every frame received from the Core
    #[serde(default)]
    pub verbose: bool,
}

fn default_port() -> u16 {
    qrc_rpc::DEFAULT_PORT
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: default_port(),
            username: None,
            password: None,
            default_component: None,
            verbose: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeoutSettings {
    #[serde(default = "default_connect_ms")]
    pub connect_ms: u64,

    /// Deadline for a whole operation, connect included
    #[serde(default = "default_operation_ms")]
    pub operation_ms: u64,

    /// Quiescence window after connecting
    #[serde(default = "default_settle_ms")]
    pub settle_ms: u64,
}

#[allow(clippy::cast_possible_truncation)] // Default durations are a few seconds
fn default_connect_ms() -> u64 {
    qrc_rpc::DEFAULT_CONNECT_TIMEOUT.as_millis() as u64
}

#[allow(clippy::cast_possible_truncation)] // Default durations are a few seconds
fn default_operation_ms() -> u64 {
    qrc_rpc::DEFAULT_OPERATION_TIMEOUT.as_millis() as u64
}

#[allow(clippy::cast_possible_truncation)] // Default durations are a few seconds
fn default_settle_ms() -> u64 {
    qrc_rpc::DEFAULT_SETTLE_WINDOW.as_millis() as u64
}

impl Default for TimeoutSettings {
    fn default() -> Self {
        Self {
            connect_ms: default_connect_ms(),
            operation_ms: default_operation_ms(),
            settle_ms: default_settle_ms(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiagnosticsConfig {
    /// A component is scanned if its type contains any of these (case-sensitive)
    #[serde(default = "default_type_markers")]
    pub component_type_markers: Vec<String>,

    /// Status values that are not faults
    #[serde(default = "default_healthy_statuses")]
    pub healthy_statuses: Vec<i32>,

    /// Length of log excerpts in issue details
    #[serde(default = "default_detail_max_chars")]
    pub detail_max_chars: usize,

    #[serde(default = "default_exclusions")]
    pub exclusions: Vec<ExclusionRule>,
}

fn default_type_markers() -> Vec<String> {
    vec!["script".to_string(), "PLUGIN".to_string()]
}

fn default_healthy_statuses() -> Vec<i32> {
    vec![0, 3]
}

fn default_detail_max_chars() -> usize {
    30
}

fn default_exclusions() -> Vec<ExclusionRule> {
    vec![ExclusionRule::stream_status_connected()]
}

impl Default for DiagnosticsConfig {
    fn default() -> Self {
        Self {
            component_type_markers: default_type_markers(),
            healthy_statuses: default_healthy_statuses(),
            detail_max_chars: default_detail_max_chars(),
            exclusions: default_exclusions(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_config_default() {
        let config = Config::default();
        assert_eq!(config.connection.port, 1710);
        assert!(config.connection.host.is_empty());
        assert_eq!(config.timeouts.connect_ms, 10_000);
        assert_eq!(config.timeouts.operation_ms, 30_000);
        assert_eq!(config.timeouts.settle_ms, 1_000);
        assert_eq!(config.diagnostics.healthy_statuses, vec![0, 3]);
        assert_eq!(config.diagnostics.detail_max_chars, 30);
        assert_eq!(config.diagnostics.exclusions.len(), 1);
    }

    #[test]
    fn test_config_load_nonexistent_returns_default() {
        let path = std::path::Path::new("/nonexistent/path/config.json");
        let config = Config::load(path).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_config_load_valid_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"{{"connection": {{"host": "10.0.0.5", "username": "admin"}}, "timeouts": {{"settleMs": 1500}}}}"#
        )
        .unwrap();

        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.connection.host, "10.0.0.5");
        assert_eq!(config.connection.username.as_deref(), Some("admin"));
        assert_eq!(config.timeouts.settle_ms, 1500);
        assert_eq!(config.timeouts.connect_ms, 10_000);
    }

    #[test]
    fn test_config_load_invalid_json() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "{{invalid json}}").unwrap();

        assert!(matches!(Config::load(file.path()), Err(Error::Json(_))));
    }

    #[test]
    fn test_connection_config_requires_host() {
        let config = Config::default();
        assert!(matches!(config.connection_config(), Err(Error::Config(_))));
    }

    #[test]
    fn test_connection_config_maps_fields() {
        let mut config = Config::default();
        config.connection.host = "core.local".to_string();
        config.connection.username = Some("admin".to_string());
        config.connection.password = Some("1234".to_string());
        config.connection.default_component = Some("Main Script".to_string());
        config.timeouts.operation_ms = 5_000;

        let connection = config.connection_config().unwrap();
        assert_eq!(connection.address(), "core.local:1710");
        assert_eq!(connection.username(), Some("admin"));
        assert_eq!(connection.default_component.as_deref(), Some("Main Script"));
        assert_eq!(connection.operation_timeout, Duration::from_secs(5));
    }

    #[test]
    fn test_connection_config_rejects_zero_timeout() {
        let mut config = Config::default();
        config.connection.host = "core.local".to_string();
        config.timeouts.settle_ms = 0;

        assert!(matches!(config.connection_config(), Err(Error::Config(_))));
    }

    #[test]
    fn test_password_without_username_is_ignored() {
        let mut config = Config::default();
        config.connection.host = "core.local".to_string();
        config.connection.password = Some("1234".to_string());

        assert!(config.connection_config().unwrap().credentials.is_none());
    }
}
