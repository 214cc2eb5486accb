//! JSON-RPC 2.0 message types for the Core control protocol.
//!
//! Request bodies for the supported methods are built here; the session
//! only frames and correlates them.

use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const JSONRPC_VERSION: &str = "2.0";

pub const SERVER_ERROR: i32 = -32603;
pub const UNKNOWN_COMPONENT: i32 = 7;
pub const UNKNOWN_CONTROL: i32 = 8;
pub const LOGON_REQUIRED: i32 = 10;

pub const LOGON: &str = "Logon";
pub const STATUS_GET: &str = "StatusGet";
pub const COMPONENT_GET: &str = "Component.Get";
pub const COMPONENT_SET: &str = "Component.Set";
pub const COMPONENT_GET_CONTROLS: &str = "Component.GetControls";
pub const COMPONENT_GET_COMPONENTS: &str = "Component.GetComponents";

/// JSON-RPC 2.0 Request ID
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RequestId {
    Number(u64),
    String(String),
}

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RequestId::Number(n) => write!(f, "{n}"),
            RequestId::String(s) => write!(f, "{s}"),
        }
    }
}

impl From<u64> for RequestId {
    fn from(n: u64) -> Self {
        RequestId::Number(n)
    }
}

impl From<&str> for RequestId {
    fn from(s: &str) -> Self {
        RequestId::String(s.to_string())
    }
}

/// JSON-RPC 2.0 Request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
    pub jsonrpc: String,
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<RequestId>,
}

impl Request {
    #[must_use]
    pub fn new(method: impl Into<String>, params: Option<Value>, id: RequestId) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            method: method.into(),
            params,
            id: Some(id),
        }
    }

    /// A request without an id; the Core sends no reply.
    #[must_use]
    pub fn notification(method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            method: method.into(),
            params,
            id: None,
        }
    }

    #[must_use]
    pub fn logon(user: &str, password: &str) -> Self {
        let params = LogonParams {
            user: user.to_string(),
            password: password.to_string(),
        };
        Self::notification(LOGON, Some(to_params(&params)))
    }

    /// Authentication probe. The Core answers with `result` once logged on,
    /// `error` otherwise.
    #[must_use]
    pub fn status_get(id: RequestId) -> Self {
        Self::new(STATUS_GET, Some(Value::from(0)), id)
    }

    #[must_use]
    pub fn component_get<S: AsRef<str>>(id: RequestId, component: &str, controls: &[S]) -> Self {
        let params = ComponentGetParams {
            name: component.to_string(),
            controls: controls
                .iter()
                .map(|name| ControlRef {
                    name: name.as_ref().to_string(),
                })
                .collect(),
        };
        Self::new(COMPONENT_GET, Some(to_params(&params)), id)
    }

    #[must_use]
    pub fn component_set(id: RequestId, component: &str, controls: Vec<ControlValue>) -> Self {
        let params = ComponentSetParams {
            name: component.to_string(),
            controls,
        };
        Self::new(COMPONENT_SET, Some(to_params(&params)), id)
    }

    #[must_use]
    pub fn component_get_controls(id: RequestId, component: &str) -> Self {
        let params = ComponentRef {
            name: component.to_string(),
        };
        Self::new(COMPONENT_GET_CONTROLS, Some(to_params(&params)), id)
    }

    #[must_use]
    pub fn component_get_components(id: RequestId) -> Self {
        Self::new(COMPONENT_GET_COMPONENTS, None, id)
    }
}

// Params are plain structs of strings and numbers; serializing them cannot fail.
fn to_params<T: Serialize>(params: &T) -> Value {
    serde_json::to_value(params).unwrap_or(Value::Null)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogonParams {
    #[serde(rename = "User")]
    pub user: String,
    #[serde(rename = "Password")]
    pub password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentRef {
    #[serde(rename = "Name")]
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControlRef {
    #[serde(rename = "Name")]
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentGetParams {
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "Controls")]
    pub controls: Vec<ControlRef>,
}

/// One control assignment in a `Component.Set`.
///
/// Without a ramp the Core applies the value immediately.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControlValue {
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "Value")]
    pub value: Value,
    #[serde(rename = "Ramp", default, skip_serializing_if = "Option::is_none")]
    pub ramp: Option<f64>,
}

impl ControlValue {
    #[must_use]
    pub fn new(name: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            ramp: None,
        }
    }

    /// Ramp to the value over `seconds`.
    #[must_use]
    pub fn with_ramp(mut self, seconds: f64) -> Self {
        self.ramp = Some(seconds);
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentSetParams {
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "Controls")]
    pub controls: Vec<ControlValue>,
}

/// JSON-RPC 2.0 Response
///
/// The id is optional: some Core replies never echo one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Response {
    #[serde(default)]
    pub jsonrpc: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<RequestId>,
}

impl Response {
    #[must_use]
    pub fn success(id: RequestId, result: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            result: Some(result),
            error: None,
            id: Some(id),
        }
    }

    #[must_use]
    pub fn error(id: RequestId, error: RpcError) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            result: None,
            error: Some(error),
            id: Some(id),
        }
    }

    #[must_use]
    pub fn matches(&self, id: &RequestId) -> bool {
        self.id.as_ref() == Some(id)
    }

    /// The `result` payload, or the protocol error it carried.
    ///
    /// # Errors
    ///
    /// Returns the remote `RpcError` verbatim if the response has an `error` field.
    pub fn into_result(self) -> Result<Value, RpcError> {
        match (self.error, self.result) {
            (Some(error), _) => Err(error),
            (None, Some(result)) => Ok(result),
            (None, None) => Ok(Value::Null),
        }
    }
}

/// JSON-RPC 2.0 Notification (e.g. `EngineStatus` pushes)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    #[serde(default)]
    pub jsonrpc: String,
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

/// JSON-RPC 2.0 Error object
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcError {
    pub code: i32,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl RpcError {
    #[must_use]
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }

    #[must_use]
    pub fn logon_required() -> Self {
        Self::new(LOGON_REQUIRED, "Logon required")
    }

    /// Inspects code and message; some firmware reports the failure with a
    /// generic code but the standard message.
    #[must_use]
    pub fn is_logon_required(&self) -> bool {
        self.code == LOGON_REQUIRED || self.message.eq_ignore_ascii_case("logon required")
    }
}

impl std::fmt::Display for RpcError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "RPC error {}: {}", self.code, self.message)
    }
}

impl std::error::Error for RpcError {}

/// One parsed frame, classified.
#[derive(Debug, Clone)]
pub enum Message {
    /// Carries `result` or `error`
    Response(Response),
    Notification(Notification),
    /// Valid JSON that is neither of the above
    Other(Value),
}

impl Message {
    #[must_use]
    pub fn is_response(&self) -> bool {
        matches!(self, Message::Response(_))
    }

    #[must_use]
    pub fn is_notification(&self) -> bool {
        matches!(self, Message::Notification(_))
    }

    /// True for a response carrying the given id.
    #[must_use]
    pub fn answers(&self, id: &RequestId) -> bool {
        matches!(self, Message::Response(resp) if resp.matches(id))
    }
}

impl From<Value> for Message {
    fn from(value: Value) -> Self {
        let Some(obj) = value.as_object() else {
            return Message::Other(value);
        };

        if obj.contains_key("result") || obj.contains_key("error") {
            return match serde_json::from_value::<Response>(value.clone()) {
                Ok(resp) => Message::Response(resp),
                Err(_) => Message::Other(value),
            };
        }

        if obj.contains_key("method") {
            return match serde_json::from_value::<Notification>(value.clone()) {
                Ok(notification) => Message::Notification(notification),
                Err(_) => Message::Other(value),
            };
        }

        Message::Other(value)
    }
}

/// Pick the response for `id` out of frames collected without correlation.
///
/// Prefers a response echoing the id; falls back to the first response
/// without any id.
#[must_use]
pub fn select_response(messages: Vec<Message>, id: &RequestId) -> Option<Response> {
    let mut fallback = None;
    for message in messages {
        if let Message::Response(resp) = message {
            if resp.matches(id) {
                return Some(resp);
            }
            if resp.id.is_none() && fallback.is_none() {
                fallback = Some(resp);
            }
        }
    }
    fallback
}
