//! RPC client for the Core control protocol.
//!
//! Every call opens its own short-lived [`Session`], so a client can be
//! shared freely between concurrent tasks. Only the configuration and the
//! connector are shared, both read-only.

use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::debug;

use qrc_types::{ComponentControls, ComponentDescriptor};

use crate::config::ConnectionConfig;
use crate::error::{Error, Result};
use crate::protocol::{ControlValue, Request, RequestId};
use crate::session::{CompletionMode, Connector, Session, TcpConnector};

/// Id used for every business request. At most one request is in flight
/// per session, so a fixed id is enough to correlate.
pub const REQUEST_ID: u64 = 1234;

/// Control that reloads a script or plugin when set to 1
pub const RELOAD_CONTROL: &str = "reload";

/// Control holding a script's source text
pub const CODE_CONTROL: &str = "code";

fn request_id() -> RequestId {
    RequestId::Number(REQUEST_ID)
}

pub struct RpcClient<C: Connector = TcpConnector> {
    config: ConnectionConfig,
    connector: C,
}

impl RpcClient {
    /// Create a client that talks TCP to `config.host`.
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` if the configuration is invalid.
    pub fn new(config: ConnectionConfig) -> Result<Self> {
        Self::with_connector(config, TcpConnector)
    }
}

impl<C: Connector> RpcClient<C> {
    /// Create a client over a custom connector.
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` if the configuration is invalid.
    pub fn with_connector(config: ConnectionConfig, connector: C) -> Result<Self> {
        config.validate()?;
        Ok(Self { config, connector })
    }

    #[must_use]
    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    /// The component to address: `component` if given, else the configured default.
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` if neither is set.
    pub fn resolve_component<'a>(&'a self, component: Option<&'a str>) -> Result<&'a str> {
        component
            .or(self.config.default_component.as_deref())
            .ok_or_else(|| {
                Error::Config("no component given and no default component configured".to_string())
            })
    }

    /// Run one request on a fresh session and return its `result` payload.
    ///
    /// # Errors
    ///
    /// Transport failures are returned as-is; an `error` reply becomes
    /// `Error::Protocol` with the remote code and message.
    pub async fn call(&self, request: Request, mode: CompletionMode) -> Result<Value> {
        let id = request.id.clone().unwrap_or_else(request_id);
        debug!(method = %request.method, ?mode, "Calling Core");

        let mut session = Session::new(&self.config, &self.connector);
        let reply = session.execute(request, mode).await?;
        reply.into_result(&id)
    }

    /// Like [`call`](Self::call), deserializing the result.
    ///
    /// # Errors
    ///
    /// As [`call`](Self::call), plus `Error::Json` if the result has an
    /// unexpected shape.
    pub async fn request<T: DeserializeOwned>(
        &self,
        request: Request,
        mode: CompletionMode,
    ) -> Result<T> {
        let value = self.call(request, mode).await?;
        Ok(serde_json::from_value(value)?)
    }

    /// Connect, authenticate if credentials are set, and report whether the
    /// Core accepted them.
    ///
    /// # Errors
    ///
    /// Returns `Error::Authentication` if credentials were rejected.
    pub async fn logon(&self) -> Result<bool> {
        let mut session = Session::new(&self.config, &self.connector);
        let connected =
            tokio::time::timeout(self.config.operation_timeout, session.connect()).await;
        let authenticated = session.is_authenticated();
        session.close();

        match connected {
            Ok(result) => result.map(|()| authenticated),
            Err(_) => Err(Error::OperationTimeout(self.config.operation_timeout)),
        }
    }

    /// `StatusGet`: platform, design and engine state.
    ///
    /// # Errors
    ///
    /// See [`call`](Self::call).
    pub async fn status_get(&self) -> Result<Value> {
        self.call(Request::status_get(request_id()), CompletionMode::AwaitId)
            .await
    }

    /// `Component.Get` for the named controls.
    ///
    /// # Errors
    ///
    /// See [`request`](Self::request).
    pub async fn component_get<S: AsRef<str>>(
        &self,
        component: &str,
        controls: &[S],
    ) -> Result<ComponentControls> {
        let request = Request::component_get(request_id(), component, controls);
        self.request(request, CompletionMode::AwaitId).await
    }

    /// `Component.Set`. Controls without a ramp apply immediately.
    ///
    /// # Errors
    ///
    /// See [`call`](Self::call).
    pub async fn component_set(
        &self,
        component: &str,
        controls: Vec<ControlValue>,
    ) -> Result<Value> {
        let request = Request::component_set(request_id(), component, controls);
        self.call(request, CompletionMode::AwaitId).await
    }

    /// Set a single control, optionally ramping over `ramp` seconds.
    ///
    /// # Errors
    ///
    /// See [`call`](Self::call).
    pub async fn update(
        &self,
        component: &str,
        control: &str,
        value: impl Into<Value>,
        ramp: Option<f64>,
    ) -> Result<Value> {
        let mut control = ControlValue::new(control, value);
        if let Some(seconds) = ramp {
            control = control.with_ramp(seconds);
        }
        self.component_set(component, vec![control]).await
    }

    /// Replace a script component's source code.
    ///
    /// # Errors
    ///
    /// See [`call`](Self::call).
    pub async fn push_code(&self, component: &str, code: &str) -> Result<Value> {
        debug!(component, bytes = code.len(), "Pushing script code");
        self.update(component, CODE_CONTROL, code, None).await
    }

    /// Set `reload` to 1 on a script or plugin.
    ///
    /// # Errors
    ///
    /// See [`call`](Self::call).
    pub async fn reload(&self, component: &str) -> Result<Value> {
        self.update(component, RELOAD_CONTROL, 1, None).await
    }

    /// `Component.GetControls`: every control on a component.
    ///
    /// # Errors
    ///
    /// See [`request`](Self::request).
    pub async fn get_controls(&self, component: &str) -> Result<ComponentControls> {
        let request = Request::component_get_controls(request_id(), component);
        self.request(request, CompletionMode::AwaitId).await
    }

    /// `Component.GetComponents`. Collected in quiescence mode since the
    /// reply is not reliably correlated.
    ///
    /// # Errors
    ///
    /// See [`request`](Self::request).
    pub async fn get_components(&self) -> Result<Vec<ComponentDescriptor>> {
        let request = Request::component_get_components(request_id());
        self.request(request, CompletionMode::AwaitQuiescence).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_validates_config() {
        let result = RpcClient::new(ConnectionConfig::new(""));
        assert!(matches!(result, Err(Error::Config(_))));

        assert!(RpcClient::new(ConnectionConfig::new("core")).is_ok());
    }

    #[test]
    fn test_resolve_component_prefers_explicit_name() {
        let config = ConnectionConfig::new("core").with_default_component("Main Script");
        let client = RpcClient::new(config).unwrap();

        assert_eq!(client.resolve_component(Some("Other")).unwrap(), "Other");
        assert_eq!(client.resolve_component(None).unwrap(), "Main Script");
    }

    #[test]
    fn test_resolve_component_without_default() {
        let client = RpcClient::new(ConnectionConfig::new("core")).unwrap();
        assert!(matches!(client.resolve_component(None), Err(Error::Config(_))));
    }
}
