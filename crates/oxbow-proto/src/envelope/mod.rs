//! JSON-RPC envelope types for host-plugin conversations.
//!
//! Requests flow host-to-plugin, responses flow plugin-to-host, and
//! [`LogNotification`] is the one plugin-to-host message that is not
//! correlated to a request. A response carries exactly one of
//! `result`/`error`; the invariant is enforced by construction, since the
//! only ways to build a [`RpcResponse`] are the [`RpcResponse::success`]
//! and [`RpcResponse::failure`] constructors.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// JSON-RPC protocol version written into every outgoing envelope.
pub const PROTOCOL_VERSION: &str = "2.0";

/// Method name of the host-directed log notification.
pub const LOG_METHOD: &str = "plugin.log";

/// A decoded request line from the host.
///
/// Every field is optional on the wire: a missing or null `id` marks a
/// notification (the plugin executes it but owes no response), and a
/// missing `method` is answered with the unknown-method error when an id
/// is present. `params` defaults to JSON null when absent.
///
/// # Example
///
/// ```
/// use oxbow_proto::RpcRequest;
///
/// let request: RpcRequest =
///     serde_json::from_str(r#"{"id":"1","method":"plugin.ping"}"#).unwrap();
/// assert_eq!(request.method(), Some("plugin.ping"));
/// assert!(request.id().is_some());
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RpcRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    id: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    method: Option<String>,
    #[serde(default)]
    params: Value,
}

impl RpcRequest {
    /// Creates a notification-style request (no id).
    #[must_use]
    pub fn new(method: impl Into<String>, params: Value) -> Self {
        Self {
            id: None,
            method: Some(method.into()),
            params,
        }
    }

    /// Creates a request carrying a correlation id.
    #[must_use]
    pub fn with_id(id: Value, method: impl Into<String>, params: Value) -> Self {
        Self {
            id: Some(id),
            method: Some(method.into()),
            params,
        }
    }

    /// Returns the correlation id, if one was supplied and non-null.
    #[must_use]
    pub fn id(&self) -> Option<&Value> {
        match &self.id {
            Some(Value::Null) | None => None,
            Some(other) => Some(other),
        }
    }

    /// Returns the method name, if present.
    #[must_use]
    pub fn method(&self) -> Option<&str> {
        self.method.as_deref()
    }

    /// Returns the raw params value (JSON null when absent).
    #[must_use]
    pub const fn params(&self) -> &Value {
        &self.params
    }

    /// Decomposes the request into `(id, method, params)`.
    ///
    /// A wire-level `"id": null` is folded into `None`, matching the
    /// notification semantics of [`RpcRequest::id`].
    #[must_use]
    pub fn into_parts(self) -> (Option<Value>, Option<String>, Value) {
        let id = match self.id {
            Some(Value::Null) | None => None,
            other => other,
        };
        (id, self.method, self.params)
    }
}

/// Stable protocol-level error taxonomy.
///
/// These codes never change between releases: hosts key retry and
/// reporting behaviour on them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    /// The method name is unknown or undeclared by this plugin.
    MethodNotFound,
    /// The params payload does not match the method contract.
    InvalidParams,
    /// `rules.get` referenced an id absent from the rule table.
    RuleNotFound,
    /// A method arrived after `plugin.shutdown` completed.
    Terminated,
}

impl ErrorCode {
    /// Returns the numeric wire code.
    #[must_use]
    pub const fn value(self) -> i64 {
        match self {
            Self::MethodNotFound => -32601,
            Self::InvalidParams => -32602,
            Self::RuleNotFound => -32001,
            Self::Terminated => -32002,
        }
    }
}

/// The `error` member of a failed response.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RpcErrorObject {
    code: i64,
    message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    data: Option<Value>,
}

impl RpcErrorObject {
    /// Creates an error object from a taxonomy code and message.
    #[must_use]
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code: code.value(),
            message: message.into(),
            data: None,
        }
    }

    /// Attaches supplementary data to the error.
    #[must_use]
    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    /// Returns the numeric wire code.
    #[must_use]
    pub const fn code(&self) -> i64 {
        self.code
    }

    /// Returns the human-readable message.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Returns the supplementary data, if any.
    #[must_use]
    pub const fn data(&self) -> Option<&Value> {
        self.data.as_ref()
    }
}

/// A single response line, correlated to a request by its id.
///
/// # Example
///
/// ```
/// use oxbow_proto::RpcResponse;
///
/// let response = RpcResponse::success(
///     serde_json::json!("7"),
///     serde_json::json!({"pong": true}),
/// );
/// assert!(response.is_success());
/// let line = serde_json::to_string(&response).unwrap();
/// assert!(!line.contains("error"));
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RpcResponse {
    jsonrpc: String,
    id: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    error: Option<RpcErrorObject>,
}

impl RpcResponse {
    /// Creates a successful response.
    #[must_use]
    pub fn success(id: Value, result: Value) -> Self {
        Self {
            jsonrpc: PROTOCOL_VERSION.to_owned(),
            id,
            result: Some(result),
            error: None,
        }
    }

    /// Creates a failed response.
    #[must_use]
    pub fn failure(id: Value, error: RpcErrorObject) -> Self {
        Self {
            jsonrpc: PROTOCOL_VERSION.to_owned(),
            id,
            result: None,
            error: Some(error),
        }
    }

    /// Returns the correlation id.
    #[must_use]
    pub const fn id(&self) -> &Value {
        &self.id
    }

    /// Returns `true` when the response carries a result.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.result.is_some()
    }

    /// Returns the result payload, if present.
    #[must_use]
    pub const fn result(&self) -> Option<&Value> {
        self.result.as_ref()
    }

    /// Returns the error object, if present.
    #[must_use]
    pub const fn error(&self) -> Option<&RpcErrorObject> {
        self.error.as_ref()
    }
}

/// Severity of a host-directed log notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Fine-grained tracing detail.
    Trace,
    /// Debugging detail.
    Debug,
    /// Routine progress information.
    Info,
    /// Recoverable degradation.
    Warn,
    /// Failure the host should surface.
    Error,
}

impl LogLevel {
    /// Returns the canonical lowercase name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parameters of a `plugin.log` notification.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LogParams {
    level: LogLevel,
    message: String,
}

/// Host-directed asynchronous log message.
///
/// Emitted by a plugin at any point during a session. Never correlated to
/// a request id and never answered by the host.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LogNotification {
    jsonrpc: String,
    method: String,
    params: LogParams,
}

impl LogNotification {
    /// Creates a `plugin.log` notification.
    #[must_use]
    pub fn new(level: LogLevel, message: impl Into<String>) -> Self {
        Self {
            jsonrpc: PROTOCOL_VERSION.to_owned(),
            method: LOG_METHOD.to_owned(),
            params: LogParams {
                level,
                message: message.into(),
            },
        }
    }

    /// Returns the log level.
    #[must_use]
    pub const fn level(&self) -> LogLevel {
        self.params.level
    }

    /// Returns the message text.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.params.message
    }
}
