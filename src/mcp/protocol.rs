//! JSON-RPC 2.0 envelope types for the MCP protocol.
//!
//! This module defines the request and response envelopes exchanged on the
//! primary `POST /` endpoint, the closed set of supported methods, and the
//! fixed error-code taxonomy.
//!
//! # Envelope Rules
//!
//! - The `jsonrpc` marker is optional on requests, but must be `"2.0"` if present
//! - Request IDs are strings or numbers and are echoed back verbatim
//! - A response carries exactly one of `result` or `error`
//! - When the request ID is absent or cannot be recovered, the response `id` is `null`

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// The MCP protocol version this implementation supports.
pub const MCP_PROTOCOL_VERSION: &str = "2024-11-05";

/// Server name for capability negotiation.
pub const SERVER_NAME: &str = "device-automation-mcp";

/// A JSON-RPC 2.0 request ID.
///
/// Numbers keep their original representation so that `1.0` is echoed as `1.0`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RequestId {
    /// Numeric request ID.
    Number(serde_json::Number),
    /// String request ID.
    String(String),
}

impl RequestId {
    /// Recovers a request ID from a raw JSON value.
    ///
    /// Returns `None` for `null` and for values that are neither strings nor numbers.
    #[must_use]
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Number(n) => Some(Self::Number(n.clone())),
            Value::String(s) => Some(Self::String(s.clone())),
            _ => None,
        }
    }
}

impl From<i64> for RequestId {
    fn from(n: i64) -> Self {
        Self::Number(n.into())
    }
}

impl From<&str> for RequestId {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{n}"),
            Self::String(s) => write!(f, "{s}"),
        }
    }
}

/// The closed set of methods served on the JSON-RPC endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    /// Capability negotiation.
    Initialize,
    /// Tool discovery.
    ToolsList,
    /// Tool invocation.
    ToolsCall,
}

impl Method {
    /// Every supported method, in routing order.
    pub const ALL: [Self; 3] = [Self::Initialize, Self::ToolsList, Self::ToolsCall];

    /// Returns the wire name of this method.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Initialize => "initialize",
            Self::ToolsList => "tools/list",
            Self::ToolsCall => "tools/call",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when a method name is not in the supported set.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Method not found: {0}")]
pub struct UnknownMethod(pub String);

impl FromStr for Method {
    type Err = UnknownMethod;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|m| m.as_str() == s)
            .ok_or_else(|| UnknownMethod(s.to_string()))
    }
}

/// A decoded JSON-RPC 2.0 request envelope.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct JsonRpcRequest {
    /// Protocol marker; `"2.0"` when present.
    #[serde(default)]
    pub jsonrpc: Option<String>,

    /// Client-supplied correlation token. Absent for fire-and-forget calls.
    #[serde(default)]
    pub id: Option<RequestId>,

    /// The method to invoke.
    pub method: String,

    /// Optional parameters for the method.
    #[serde(default)]
    pub params: Option<Value>,
}

/// Fixed error-code taxonomy. Codes are never renumbered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    /// Invalid JSON was received by the server.
    ParseError,
    /// The JSON sent is not a valid request envelope.
    InvalidRequest,
    /// The method does not exist or is not available.
    MethodNotFound,
    /// Invalid method parameters or tool arguments.
    InvalidParams,
    /// Internal error while handling the request.
    InternalError,
    /// The requested tool is not registered.
    ToolNotFound,
    /// The tool ran and reported a failure.
    ToolExecutionError,
}

impl ErrorCode {
    /// Returns the numeric code for this error.
    #[must_use]
    pub const fn code(self) -> i32 {
        match self {
            Self::ParseError => -32700,
            Self::InvalidRequest => -32600,
            Self::MethodNotFound => -32601,
            Self::InvalidParams => -32602,
            Self::InternalError => -32603,
            Self::ToolNotFound => -32000,
            Self::ToolExecutionError => -32001,
        }
    }

    /// Returns the default message for this error code.
    #[must_use]
    pub const fn default_message(self) -> &'static str {
        match self {
            Self::ParseError => "Parse error",
            Self::InvalidRequest => "Invalid Request",
            Self::MethodNotFound => "Method not found",
            Self::InvalidParams => "Invalid params",
            Self::InternalError => "Internal error",
            Self::ToolNotFound => "Tool not found",
            Self::ToolExecutionError => "Tool execution error",
        }
    }
}

/// A JSON-RPC 2.0 error object.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JsonRpcErrorData {
    /// The error code.
    pub code: i32,

    /// A short description of the error.
    pub message: String,

    /// Additional information about the error.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl JsonRpcErrorData {
    /// Creates a new error from an error code.
    #[must_use]
    pub fn from_code(code: ErrorCode) -> Self {
        Self {
            code: code.code(),
            message: code.default_message().to_string(),
            data: None,
        }
    }

    /// Creates a new error with a custom message.
    #[must_use]
    pub fn with_message(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code: code.code(),
            message: message.into(),
            data: None,
        }
    }

    /// Adds additional data to the error.
    #[must_use]
    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }
}

/// The body of a response: a result or an error, never both.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseOutcome {
    /// Method-specific success payload.
    Result(Value),
    /// Structured failure.
    Error(JsonRpcErrorData),
}

/// A JSON-RPC 2.0 response envelope.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JsonRpcResponse {
    /// Always "2.0".
    pub jsonrpc: &'static str,

    /// The request ID this response corresponds to; `null` if unknown.
    pub id: Option<RequestId>,

    /// Either `result` or `error`.
    #[serde(flatten)]
    pub outcome: ResponseOutcome,
}

impl JsonRpcResponse {
    /// Creates a new success response.
    #[must_use]
    pub const fn success(id: Option<RequestId>, result: Value) -> Self {
        Self {
            jsonrpc: "2.0",
            id,
            outcome: ResponseOutcome::Result(result),
        }
    }

    /// Creates a new error response.
    #[must_use]
    pub const fn failure(id: Option<RequestId>, error: JsonRpcErrorData) -> Self {
        Self {
            jsonrpc: "2.0",
            id,
            outcome: ResponseOutcome::Error(error),
        }
    }

    /// Creates a parse error response (ID cannot be determined).
    #[must_use]
    pub fn parse_error(detail: impl Into<String>) -> Self {
        Self::failure(
            None,
            JsonRpcErrorData::from_code(ErrorCode::ParseError)
                .with_data(Value::String(detail.into())),
        )
    }

    /// Creates an invalid request error response.
    #[must_use]
    pub fn invalid_request(id: Option<RequestId>, message: impl Into<String>) -> Self {
        Self::failure(
            id,
            JsonRpcErrorData::with_message(ErrorCode::InvalidRequest, message),
        )
    }

    /// Creates a method not found error response.
    #[must_use]
    pub fn method_not_found(id: Option<RequestId>, method: &str) -> Self {
        Self::failure(
            id,
            JsonRpcErrorData::with_message(
                ErrorCode::MethodNotFound,
                format!("Method not found: {method}"),
            ),
        )
    }

    /// Creates an invalid params error response.
    #[must_use]
    pub fn invalid_params(id: Option<RequestId>, message: impl Into<String>) -> Self {
        Self::failure(
            id,
            JsonRpcErrorData::with_message(ErrorCode::InvalidParams, message),
        )
    }

    /// Creates an internal error response.
    #[must_use]
    pub fn internal_error(id: Option<RequestId>, message: impl Into<String>) -> Self {
        Self::failure(
            id,
            JsonRpcErrorData::with_message(ErrorCode::InternalError, message),
        )
    }

    /// Returns the error object if this is an error response.
    #[must_use]
    pub const fn error(&self) -> Option<&JsonRpcErrorData> {
        match &self.outcome {
            ResponseOutcome::Error(e) => Some(e),
            ResponseOutcome::Result(_) => None,
        }
    }

    /// Returns the result payload if this is a success response.
    #[must_use]
    pub const fn result(&self) -> Option<&Value> {
        match &self.outcome {
            ResponseOutcome::Result(v) => Some(v),
            ResponseOutcome::Error(_) => None,
        }
    }
}

/// Decodes a raw request body into a request envelope.
///
/// # Errors
///
/// Returns a ready-to-send error response if the body is not valid JSON
/// (`ParseError`, no ID) or not a well-formed envelope (`InvalidRequest`, with
/// the ID echoed when it can be recovered).
pub fn parse_request(body: &[u8]) -> Result<JsonRpcRequest, JsonRpcResponse> {
    let value: Value =
        serde_json::from_slice(body).map_err(|e| JsonRpcResponse::parse_error(e.to_string()))?;

    let Value::Object(obj) = value else {
        return Err(JsonRpcResponse::invalid_request(
            None,
            "Request must be a JSON object",
        ));
    };

    let id = recover_id(&obj)?;

    if let Some(jsonrpc) = obj.get("jsonrpc") {
        if jsonrpc.as_str() != Some("2.0") {
            return Err(JsonRpcResponse::invalid_request(
                id,
                "jsonrpc field must be \"2.0\"",
            ));
        }
    }

    match obj.get("method") {
        Some(Value::String(m)) if !m.is_empty() => {}
        Some(Value::String(_)) => {
            return Err(JsonRpcResponse::invalid_request(
                id,
                "method field cannot be empty",
            ));
        }
        Some(_) => {
            return Err(JsonRpcResponse::invalid_request(
                id,
                "method field must be a string",
            ));
        }
        None => {
            return Err(JsonRpcResponse::invalid_request(id, "missing method field"));
        }
    }

    serde_json::from_value(Value::Object(obj))
        .map_err(|e| JsonRpcResponse::invalid_request(id, format!("Invalid request: {e}")))
}

/// Extracts the ID from an envelope object, rejecting IDs of the wrong type.
fn recover_id(obj: &Map<String, Value>) -> Result<Option<RequestId>, JsonRpcResponse> {
    match obj.get("id") {
        None | Some(Value::Null) => Ok(None),
        Some(raw) => RequestId::from_value(raw).map(Some).ok_or_else(|| {
            JsonRpcResponse::invalid_request(None, "id must be a string or a number")
        }),
    }
}
