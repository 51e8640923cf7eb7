//! HTTP transport for the MCP server.
//!
//! Routes:
//!
//! - `POST /`: JSON-RPC envelopes. Always HTTP 200; errors live in the envelope.
//! - `GET /`: server description.
//! - `GET /health`: liveness probe.
//! - `GET /list_tools`, `POST /call_tool`: legacy flat surface.
//!
//! Unknown paths get a JSON 404 and wrong methods a JSON 405. Browsers are only let in from
//! loopback origins. A panic anywhere below the router becomes an
//! `InternalError` envelope instead of a dropped connection.

use std::any::Any;
use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::rejection::BytesRejection;
use axum::extract::State;
use axum::http::{header, HeaderValue, Method, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::mcp::dispatcher::panic_message;
use crate::mcp::handler::{LegacyCallStatus, ProtocolHandler};
use crate::mcp::protocol::{JsonRpcResponse, MCP_PROTOCOL_VERSION, SERVER_NAME};
use crate::mcp::registry::ToolCallResult;

const SERVER_DESCRIPTION: &str = "Device automation tools over MCP";

/// Shared state for every route.
#[derive(Debug, Clone)]
pub struct AppState {
    protocol: Arc<ProtocolHandler>,
    port: u16,
}

/// Builds the router for a server listening on `port`.
pub fn router(protocol: Arc<ProtocolHandler>, port: u16) -> Router {
    Router::new()
        .route("/", get(describe).post(json_rpc))
        .route("/health", get(health))
        .route("/list_tools", get(list_tools))
        .route("/call_tool", post(call_tool))
        .fallback(not_found)
        .method_not_allowed_fallback(method_not_allowed)
        .with_state(AppState { protocol, port })
        .layer(CatchPanicLayer::custom(handle_panic))
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer())
}

fn cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(AllowOrigin::predicate(|origin: &HeaderValue, _| {
            origin.to_str().is_ok_and(is_loopback_origin)
        }))
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE])
}

/// Whether `origin` is `http(s)://` on `127.0.0.1`, `localhost` or `[::1]`,
/// with an optional port.
fn is_loopback_origin(origin: &str) -> bool {
    let Some(authority) = origin
        .strip_prefix("http://")
        .or_else(|| origin.strip_prefix("https://"))
    else {
        return false;
    };

    ["127.0.0.1", "localhost", "[::1]"].iter().any(|host| {
        authority.strip_prefix(host).is_some_and(|rest| {
            rest.is_empty()
                || rest
                    .strip_prefix(':')
                    .is_some_and(|port| port.parse::<u16>().is_ok())
        })
    })
}

async fn json_rpc(
    State(state): State<AppState>,
    body: Result<Bytes, BytesRejection>,
) -> Json<JsonRpcResponse> {
    match body {
        Ok(body) => Json(state.protocol.handle_body(&body).await),
        Err(rejection) => {
            tracing::debug!(error = %rejection, "Rejected request body");
            Json(JsonRpcResponse::invalid_request(None, rejection.body_text()))
        }
    }
}

async fn describe() -> Json<Value> {
    Json(json!({
        "name": SERVER_NAME,
        "version": env!("CARGO_PKG_VERSION"),
        "protocolVersion": MCP_PROTOCOL_VERSION,
        "description": SERVER_DESCRIPTION,
        "endpoints": {
            "POST /": "JSON-RPC 2.0 (initialize, tools/list, tools/call)",
            "GET /health": "Health check",
            "GET /list_tools": "List tools",
            "POST /call_tool": "Call a tool with {name, arguments}",
        },
    }))
}

async fn health(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "server": SERVER_NAME,
        "version": env!("CARGO_PKG_VERSION"),
        "port": state.port,
        "tools_count": state.protocol.registry().len(),
    }))
}

async fn list_tools(State(state): State<AppState>) -> Response {
    match state.protocol.list_tools() {
        Ok(body) => Json(body).into_response(),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "error": e.message })),
        )
            .into_response(),
    }
}

async fn call_tool(
    State(state): State<AppState>,
    body: Result<Bytes, BytesRejection>,
) -> Response {
    let body = match body {
        Ok(body) => body,
        Err(rejection) => {
            tracing::debug!(error = %rejection, "Rejected request body");
            return (
                rejection.status(),
                Json(ToolCallResult::error(rejection.body_text())),
            )
                .into_response();
        }
    };
    let response = state.protocol.call_tool(&body).await;
    (legacy_status(response.status), Json(response.body)).into_response()
}

const fn legacy_status(status: LegacyCallStatus) -> StatusCode {
    match status {
        LegacyCallStatus::Ok => StatusCode::OK,
        LegacyCallStatus::BadRequest => StatusCode::BAD_REQUEST,
        LegacyCallStatus::NotFound => StatusCode::NOT_FOUND,
        LegacyCallStatus::ExecutionFailed => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

async fn not_found(uri: Uri) -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(json!({ "error": "Not found", "path": uri.path() })),
    )
        .into_response()
}

async fn method_not_allowed(method: Method, uri: Uri) -> Response {
    (
        StatusCode::METHOD_NOT_ALLOWED,
        Json(json!({
            "error": "Method not allowed",
            "method": method.as_str(),
            "path": uri.path(),
        })),
    )
        .into_response()
}

// The request is gone by the time we get here, so the id cannot be echoed.
#[allow(clippy::needless_pass_by_value)] // CatchPanicLayer hands over the boxed payload by value
fn handle_panic(payload: Box<dyn Any + Send + 'static>) -> Response {
    let message = panic_message(payload.as_ref());
    tracing::error!(panic = %message, "Request handler panicked");
    Json(JsonRpcResponse::internal_error(
        None,
        format!("Internal error: {message}"),
    ))
    .into_response()
}
