//! Protocol handler: decode, route, execute, encode.
//!
//! Each request goes through `Received → Decoded → Routed → Executed →
//! Encoded` and nothing is kept between requests. Every path ends in a
//! well-formed [`JsonRpcResponse`].
//!
//! Tool results with `is_error` set are reported as envelope-level
//! `ToolExecutionError` (-32001) errors on the JSON-RPC surface. The legacy
//! flat surface has no error envelope and reports them as `isError: true`
//! bodies instead.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::mcp::dispatcher::{DispatchError, ToolDispatcher};
use crate::mcp::protocol::{
    parse_request, ErrorCode, JsonRpcErrorData, JsonRpcRequest, JsonRpcResponse, Method,
    MCP_PROTOCOL_VERSION, SERVER_NAME,
};
use crate::mcp::registry::{ToolCallResult, ToolRegistry};

/// Server capabilities advertised during initialisation.
#[derive(Debug, Clone, Serialize)]
pub struct ServerCapabilities {
    /// Tool-related capabilities.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<ToolCapabilities>,
}

impl Default for ServerCapabilities {
    fn default() -> Self {
        Self {
            tools: Some(ToolCapabilities::default()),
        }
    }
}

/// Tool-specific capabilities.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ToolCapabilities {
    /// Whether the tool list can change during the session. Always `false`:
    /// registries are immutable.
    #[serde(rename = "listChanged", skip_serializing_if = "is_false")]
    pub list_changed: bool,
}

// serde's skip_serializing_if requires a predicate fn(&T) -> bool
#[allow(clippy::trivially_copy_pass_by_ref)]
const fn is_false(b: &bool) -> bool {
    !*b
}

/// Server information for initialisation response.
#[derive(Debug, Clone, Serialize)]
pub struct ServerInfo {
    /// Server name.
    pub name: String,
    /// Server version.
    pub version: String,
}

impl Default for ServerInfo {
    fn default() -> Self {
        Self {
            name: SERVER_NAME.to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

/// Body of a legacy `POST /call_tool` request.
#[derive(Debug, Clone, Deserialize)]
struct LegacyCallParams {
    name: String,
    #[serde(default)]
    arguments: Value,
}

/// Outcome class of a legacy tool call, mapped to an HTTP status by the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LegacyCallStatus {
    /// The tool ran and succeeded.
    Ok,
    /// The body or the arguments were invalid.
    BadRequest,
    /// No such tool.
    NotFound,
    /// The tool ran and failed.
    ExecutionFailed,
}

/// Response of a legacy tool call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LegacyCallResponse {
    /// Outcome class.
    pub status: LegacyCallStatus,
    /// Flat `{content, isError}` body.
    pub body: ToolCallResult,
}

/// Decodes requests, routes them and encodes responses.
#[derive(Debug, Clone)]
pub struct ProtocolHandler {
    dispatcher: ToolDispatcher,
}

impl ProtocolHandler {
    /// Creates a handler on top of a dispatcher.
    #[must_use]
    pub const fn new(dispatcher: ToolDispatcher) -> Self {
        Self { dispatcher }
    }

    /// The registry served by this handler.
    #[must_use]
    pub const fn registry(&self) -> &Arc<ToolRegistry> {
        self.dispatcher.registry()
    }

    /// Handles a raw `POST /` body.
    pub async fn handle_body(&self, body: &[u8]) -> JsonRpcResponse {
        match parse_request(body) {
            Ok(request) => self.handle_request(request).await,
            Err(response) => {
                tracing::debug!(
                    code = response.error().map(|e| e.code),
                    "Rejected undecodable request"
                );
                response
            }
        }
    }

    /// Routes a decoded request.
    pub async fn handle_request(&self, request: JsonRpcRequest) -> JsonRpcResponse {
        let JsonRpcRequest {
            id, method, params, ..
        } = request;

        let method = match method.parse::<Method>() {
            Ok(method) => method,
            Err(unknown) => {
                tracing::debug!(method = %unknown.0, "Unknown method");
                return JsonRpcResponse::method_not_found(id, &unknown.0);
            }
        };

        tracing::debug!(%method, id = ?id, "Handling request");

        let outcome = match method {
            Method::Initialize => Self::handle_initialize(),
            Method::ToolsList => self.handle_tools_list(params.as_ref()),
            Method::ToolsCall => self.handle_tools_call(params.as_ref()).await,
        };

        match outcome {
            Ok(result) => JsonRpcResponse::success(id, result),
            Err(error) => JsonRpcResponse::failure(id, error),
        }
    }

    /// Handles the initialize request. Params are ignored.
    fn handle_initialize() -> Result<Value, JsonRpcErrorData> {
        Ok(json!({
            "protocolVersion": MCP_PROTOCOL_VERSION,
            "capabilities": encode(&ServerCapabilities::default())?,
            "serverInfo": encode(&ServerInfo::default())?,
        }))
    }

    /// Handles the tools/list request.
    ///
    /// A `cursor` is accepted but pagination is not implemented: the full list
    /// is always returned with `nextCursor: null`.
    fn handle_tools_list(&self, params: Option<&Value>) -> Result<Value, JsonRpcErrorData> {
        match params {
            None | Some(Value::Null) => {}
            Some(Value::Object(obj)) => match obj.get("cursor") {
                None | Some(Value::Null | Value::String(_)) => {}
                Some(_) => return Err(invalid_params("cursor must be a string")),
            },
            Some(_) => return Err(invalid_params("tools/list params must be an object")),
        }

        Ok(json!({
            "tools": self.encoded_tools()?,
            "nextCursor": Value::Null,
        }))
    }

    /// Handles the tools/call request.
    async fn handle_tools_call(&self, params: Option<&Value>) -> Result<Value, JsonRpcErrorData> {
        let params = params
            .and_then(Value::as_object)
            .ok_or_else(|| invalid_params("Missing tool call params"))?;

        let name = params
            .get("name")
            .and_then(Value::as_str)
            .ok_or_else(|| invalid_params("Missing required parameter: name"))?;

        let arguments = params.get("arguments").unwrap_or(&Value::Null);

        let result = self
            .dispatcher
            .invoke(name, arguments)
            .await
            .map_err(|e| dispatch_error(&e))?;

        if result.is_error {
            return Err(JsonRpcErrorData::with_message(
                ErrorCode::ToolExecutionError,
                result.joined_text(),
            )
            .with_data(json!({
                "tool": name,
                "content": encode(&result.content)?,
            })));
        }

        encode(&result)
    }

    /// Legacy `GET /list_tools` body.
    ///
    /// # Errors
    ///
    /// Returns an `InternalError` object if the definitions cannot be encoded.
    pub fn list_tools(&self) -> Result<Value, JsonRpcErrorData> {
        Ok(json!({ "tools": self.encoded_tools()? }))
    }

    /// Legacy `POST /call_tool` handling.
    pub async fn call_tool(&self, body: &[u8]) -> LegacyCallResponse {
        let params: LegacyCallParams = match serde_json::from_slice(body) {
            Ok(params) => params,
            Err(e) => {
                return LegacyCallResponse {
                    status: LegacyCallStatus::BadRequest,
                    body: ToolCallResult::error(format!("Invalid request body: {e}")),
                }
            }
        };

        match self.dispatcher.invoke(&params.name, &params.arguments).await {
            Ok(result) => LegacyCallResponse {
                status: if result.is_error {
                    LegacyCallStatus::ExecutionFailed
                } else {
                    LegacyCallStatus::Ok
                },
                body: result,
            },
            Err(e) => LegacyCallResponse {
                status: match e {
                    DispatchError::ToolNotFound { .. } => LegacyCallStatus::NotFound,
                    DispatchError::InvalidParams { .. } => LegacyCallStatus::BadRequest,
                },
                body: ToolCallResult::error(e.to_string()),
            },
        }
    }

    fn encoded_tools(&self) -> Result<Value, JsonRpcErrorData> {
        encode(&self.registry().list().collect::<Vec<_>>())
    }
}

fn invalid_params(message: impl Into<String>) -> JsonRpcErrorData {
    JsonRpcErrorData::with_message(ErrorCode::InvalidParams, message)
}

fn dispatch_error(error: &DispatchError) -> JsonRpcErrorData {
    match error {
        DispatchError::ToolNotFound { name } => {
            JsonRpcErrorData::with_message(ErrorCode::ToolNotFound, error.to_string())
                .with_data(json!({ "tool": name }))
        }
        DispatchError::InvalidParams { .. } => invalid_params(error.to_string()),
    }
}

fn encode<T: Serialize>(value: &T) -> Result<Value, JsonRpcErrorData> {
    serde_json::to_value(value).map_err(|e| {
        tracing::error!(error = %e, "Failed to serialise response payload");
        JsonRpcErrorData::with_message(
            ErrorCode::InternalError,
            format!("Internal error: failed to serialise result: {e}"),
        )
    })
}
