//! End-to-end tests for the HTTP server and its lifecycle.
//!
//! Every test runs its own server on a free loopback port and talks to it
//! with a real HTTP client.

use std::sync::Arc;
use std::time::Duration;

use reqwest::{Client, Method, StatusCode};
use serde_json::{json, Value};
use tokio_test::{assert_err, assert_ok};

use device_automation_mcp::automation::{build_registry, AutomationBackend, MockAutomation};
use device_automation_mcp::error::ServerError;
use device_automation_mcp::mcp::registry::{
    FnToolHandler, ToolArguments, ToolCallResult, ToolDefinition, ToolExecutionError,
};
use device_automation_mcp::mcp::schema::{InputSchema, PropertySchema};
use device_automation_mcp::mcp::{McpServer, ServerOptions, ServerState, StopOutcome, ToolRegistry};

const STARTUP: Duration = Duration::from_secs(5);

fn free_port() -> u16 {
    std::net::TcpListener::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap()
        .port()
}

fn fast_backend() -> Arc<dyn AutomationBackend> {
    Arc::new(MockAutomation::default().with_latency(Duration::from_millis(10)))
}

fn device_server() -> McpServer {
    let backend = fast_backend();
    let registry = Arc::new(build_registry(Arc::clone(&backend)).unwrap());
    McpServer::new(registry, backend, ServerOptions::default())
}

/// A server with a single `sleep` tool that waits `ms` milliseconds.
fn sleepy_server(shutdown_grace: Duration) -> McpServer {
    let registry = ToolRegistry::builder()
        .register(
            ToolDefinition::new(
                "sleep",
                "Waits for a while",
                InputSchema::new()
                    .required("ms", PropertySchema::number("Milliseconds to wait"))
                    .deny_unknown(),
            ),
            FnToolHandler::new(|args: ToolArguments| async move {
                let ms = args.f64("ms")?;
                tokio::time::sleep(Duration::from_secs_f64(ms / 1000.0)).await;
                Ok::<_, ToolExecutionError>(ToolCallResult::text(format!("slept {ms} ms")))
            }),
        )
        .build()
        .unwrap();

    McpServer::new(
        Arc::new(registry),
        fast_backend(),
        ServerOptions {
            shutdown_grace,
            call_timeout: None,
        },
    )
}

async fn started(server: &McpServer) -> String {
    assert_ok!(server.start(free_port(), STARTUP).await);
    server.server_url().unwrap()
}

async fn rpc(client: &Client, url: &str, body: &Value) -> Value {
    let response = client.post(url).json(body).send().await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    response.json().await.unwrap()
}

// =============================================================================
// Scenarios
// =============================================================================

#[tokio::test]
async fn test_health_reports_port() {
    let server = device_server();
    assert_ok!(server.start(free_port(), STARTUP).await);
    let port = server.current_port().unwrap();

    let health: Value = reqwest::get(format!("http://127.0.0.1:{port}/health"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    assert_eq!(health["status"], "healthy");
    assert_eq!(health["port"], port);
    assert_eq!(health["server"], "device-automation-mcp");
    assert_eq!(health["tools_count"], 4);

    assert_eq!(server.stop().await, StopOutcome::Graceful);
}

#[tokio::test]
async fn test_tools_list_over_http() {
    let server = device_server();
    let url = started(&server).await;
    let client = Client::new();

    let response = rpc(&client, &url, &json!({"method": "tools/list", "id": 1})).await;

    let names: Vec<_> = response["result"]["tools"]
        .as_array()
        .unwrap()
        .iter()
        .map(|t| t["name"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(names, ["tapButton", "inputText", "scroll", "getScreenInfo"]);
    assert_eq!(response["id"], 1);

    server.stop().await;
}

#[tokio::test]
async fn test_tools_list_keeps_property_order() {
    let server = device_server();
    let url = started(&server).await;

    let response = rpc(&Client::new(), &url, &json!({"method": "tools/list", "id": 1})).await;
    let input_text = response["result"]["tools"]
        .as_array()
        .unwrap()
        .iter()
        .find(|t| t["name"] == "inputText")
        .unwrap();

    let properties: Vec<_> = input_text["inputSchema"]["properties"]
        .as_object()
        .unwrap()
        .keys()
        .cloned()
        .collect();
    assert_eq!(properties, ["text", "identifier", "clearFirst"]);

    server.stop().await;
}

#[tokio::test]
async fn test_invalid_enum_over_http() {
    let server = device_server();
    let url = started(&server).await;

    let response = rpc(
        &Client::new(),
        &url,
        &json!({
            "method": "tools/call",
            "params": {"name": "scroll", "arguments": {"direction": "sideways"}},
            "id": 2
        }),
    )
    .await;

    assert_eq!(response["error"]["code"], -32602);
    assert_eq!(response["id"], 2);

    server.stop().await;
}

#[tokio::test]
async fn test_second_start_keeps_first_instance() {
    let server = device_server();
    let url = started(&server).await;

    let err = assert_err!(server.start(free_port(), STARTUP).await);
    assert!(matches!(err, ServerError::AlreadyRunning { .. }));

    let health = reqwest::get(format!("{url}/health")).await.unwrap();
    assert_eq!(health.status(), StatusCode::OK);

    server.stop().await;
}

#[tokio::test]
async fn test_privileged_port_creates_no_listener() {
    let server = device_server();

    let err = assert_err!(server.start(80, STARTUP).await);
    assert!(matches!(err, ServerError::InvalidPort { port: 80 }));
    assert!(!server.is_running());
    assert_eq!(server.server_url(), None);
}

// =============================================================================
// Endpoints
// =============================================================================

#[tokio::test]
async fn test_tool_call_success_over_http() {
    let server = device_server();
    let url = started(&server).await;

    let response = rpc(
        &Client::new(),
        &url,
        &json!({
            "jsonrpc": "2.0",
            "id": "input",
            "method": "tools/call",
            "params": {
                "name": "inputText",
                "arguments": {"text": "abc", "identifier": "searchField"}
            }
        }),
    )
    .await;

    assert_eq!(response["id"], "input");
    assert_eq!(response["result"]["isError"], false);
    assert!(response["result"]["content"][0]["text"]
        .as_str()
        .unwrap()
        .contains("searchField"));

    server.stop().await;
}

#[tokio::test]
async fn test_envelope_errors_are_http_200() {
    let server = device_server();
    let url = started(&server).await;
    let client = Client::new();

    let parse = client
        .post(&url)
        .header("content-type", "application/json")
        .body("{\"id\": 1,")
        .send()
        .await
        .unwrap();
    assert_eq!(parse.status(), StatusCode::OK);
    let parse: Value = parse.json().await.unwrap();
    assert_eq!(parse["error"]["code"], -32700);
    assert_eq!(parse["id"], Value::Null);

    let unknown = rpc(&client, &url, &json!({"id": 9, "method": "ping"})).await;
    assert_eq!(unknown["error"]["code"], -32601);
    assert_eq!(unknown["id"], 9);

    let missing = rpc(
        &client,
        &url,
        &json!({"id": 10, "method": "tools/call", "params": {"name": "nope"}}),
    )
    .await;
    assert_eq!(missing["error"]["code"], -32000);

    server.stop().await;
}

#[tokio::test]
async fn test_server_description() {
    let server = device_server();
    let url = started(&server).await;

    let info: Value = reqwest::get(&url).await.unwrap().json().await.unwrap();
    assert_eq!(info["name"], "device-automation-mcp");
    assert_eq!(info["protocolVersion"], "2024-11-05");
    assert!(info["endpoints"].is_object());

    server.stop().await;
}

#[tokio::test]
async fn test_legacy_endpoints() {
    let server = device_server();
    let url = started(&server).await;
    let client = Client::new();

    let list: Value = client
        .get(format!("{url}/list_tools"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(list["tools"].as_array().unwrap().len(), 4);

    let cases = [
        (
            json!({"name": "tapButton", "arguments": {"identifier": "ok"}}),
            StatusCode::OK,
            false,
        ),
        (
            json!({"name": "scroll", "arguments": {"direction": "sideways"}}),
            StatusCode::BAD_REQUEST,
            true,
        ),
        (json!({"arguments": {}}), StatusCode::BAD_REQUEST, true),
        (json!({"name": "swipe"}), StatusCode::NOT_FOUND, true),
        (
            json!({"name": "tapButton", "arguments": {"identifier": " "}}),
            StatusCode::INTERNAL_SERVER_ERROR,
            true,
        ),
    ];

    for (body, status, is_error) in cases {
        let response = client
            .post(format!("{url}/call_tool"))
            .json(&body)
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), status, "{body}");
        let value: Value = response.json().await.unwrap();
        assert_eq!(value["isError"], is_error, "{body}");
        assert_eq!(value["content"][0]["type"], "text");
    }

    server.stop().await;
}

#[tokio::test]
async fn test_unknown_path_is_json_404() {
    let server = device_server();
    let url = started(&server).await;

    let response = reqwest::get(format!("{url}/metrics")).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["error"], "Not found");
    assert_eq!(body["path"], "/metrics");

    server.stop().await;
}

#[tokio::test]
async fn test_wrong_method_is_json_405() {
    let server = device_server();
    let url = started(&server).await;
    let client = Client::new();

    for (method, path) in [(Method::PUT, "/"), (Method::GET, "/call_tool")] {
        let response = client
            .request(method.clone(), format!("{url}{path}"))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED, "{method} {path}");
        let body: Value = response.json().await.unwrap();
        assert_eq!(body["error"], "Method not allowed");
        assert_eq!(body["method"], method.as_str());
        assert_eq!(body["path"], path);
    }

    server.stop().await;
}

#[tokio::test]
async fn test_oversized_body_still_gets_json() {
    let server = device_server();
    let url = started(&server).await;
    let client = Client::new();

    let huge = json!({
        "id": 1,
        "method": "tools/call",
        "params": {
            "name": "inputText",
            "arguments": {"text": "x".repeat(3 * 1024 * 1024)}
        }
    });

    let envelope = rpc(&client, &url, &huge).await;
    assert_eq!(envelope["error"]["code"], -32600);
    assert_eq!(envelope["id"], Value::Null);

    let legacy = client
        .post(format!("{url}/call_tool"))
        .json(&huge["params"])
        .send()
        .await
        .unwrap();
    assert_eq!(legacy.status(), StatusCode::PAYLOAD_TOO_LARGE);
    let body: Value = legacy.json().await.unwrap();
    assert_eq!(body["isError"], true);
    assert_eq!(body["content"][0]["type"], "text");

    // Normal requests keep working afterwards.
    let list = rpc(&client, &url, &json!({"method": "tools/list", "id": 2})).await;
    assert_eq!(list["result"]["tools"].as_array().unwrap().len(), 4);

    server.stop().await;
}

#[tokio::test]
async fn test_cors_allows_only_loopback_origins() {
    let server = device_server();
    let url = started(&server).await;
    let client = Client::new();

    let preflight = |origin: &'static str| {
        client
            .request(Method::OPTIONS, &url)
            .header("origin", origin)
            .header("access-control-request-method", "POST")
            .header("access-control-request-headers", "content-type")
            .send()
    };

    let allowed = preflight("http://localhost:3000").await.unwrap();
    assert_eq!(
        allowed.headers().get("access-control-allow-origin").unwrap(),
        "http://localhost:3000"
    );

    let denied = preflight("https://example.com").await.unwrap();
    assert!(denied.headers().get("access-control-allow-origin").is_none());

    server.stop().await;
}

// =============================================================================
// Concurrency
// =============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_http_calls() {
    let server = device_server();
    let url = started(&server).await;
    let client = Client::new();

    let mut tasks = Vec::new();
    for i in 0..16 {
        let client = client.clone();
        let url = url.clone();
        tasks.push(tokio::spawn(async move {
            let identifier = format!("button{i}");
            let response = rpc(
                &client,
                &url,
                &json!({
                    "jsonrpc": "2.0",
                    "id": i,
                    "method": "tools/call",
                    "params": {"name": "tapButton", "arguments": {"identifier": identifier}}
                }),
            )
            .await;
            (i, identifier, response)
        }));
    }

    for task in tasks {
        let (i, identifier, response) = task.await.unwrap();
        assert_eq!(response["id"], i);
        let text = response["result"]["content"][0]["text"].as_str().unwrap();
        assert_eq!(text, format!("Tapped button '{identifier}'"));
    }

    server.stop().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_concurrent_starts_bind_once() {
    let server = Arc::new(device_server());
    let port = free_port();

    let first = tokio::spawn({
        let server = Arc::clone(&server);
        async move { server.start(port, STARTUP).await }
    });
    let second = tokio::spawn({
        let server = Arc::clone(&server);
        async move { server.start(port, STARTUP).await }
    });

    let results = [first.await.unwrap(), second.await.unwrap()];
    let successes = results.iter().filter(|r| r.is_ok()).count();
    assert_eq!(successes, 1);
    assert!(results
        .iter()
        .any(|r| matches!(r, Err(ServerError::AlreadyRunning { .. }))));

    server.stop().await;
}

// =============================================================================
// Lifecycle
// =============================================================================

#[tokio::test]
async fn test_stop_closes_listener_and_is_idempotent() {
    let server = device_server();
    let url = started(&server).await;

    assert_eq!(server.stop().await, StopOutcome::Graceful);
    assert_eq!(server.stop().await, StopOutcome::AlreadyStopped);
    assert!(!server.is_running());

    assert!(reqwest::get(format!("{url}/health")).await.is_err());
}

#[tokio::test]
async fn test_restart_on_new_port() {
    let server = device_server();
    let old_url = started(&server).await;

    let port = free_port();
    let addr = assert_ok!(server.restart(port, STARTUP).await);
    assert_eq!(addr.port(), port);

    assert!(reqwest::get(format!("{old_url}/health")).await.is_err());
    let health: Value = reqwest::get(format!("http://127.0.0.1:{port}/health"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(health["port"], port);

    server.stop().await;
}

#[tokio::test]
async fn test_startup_timeout_then_retry() {
    let backend: Arc<dyn AutomationBackend> = Arc::new(
        MockAutomation::default()
            .with_latency(Duration::ZERO)
            .with_connect_delay(Duration::from_millis(300)),
    );
    let registry = Arc::new(build_registry(Arc::clone(&backend)).unwrap());
    let server = McpServer::new(registry, backend, ServerOptions::default());
    let port = free_port();

    let err = assert_err!(server.start(port, Duration::from_millis(50)).await);
    assert!(matches!(err, ServerError::StartupTimeout { .. }));
    assert_eq!(server.state(), ServerState::Stopped);
    assert!(reqwest::get(format!("http://127.0.0.1:{port}/health")).await.is_err());

    assert_ok!(server.start(port, STARTUP).await);
    let health = reqwest::get(format!("http://127.0.0.1:{port}/health")).await.unwrap();
    assert_eq!(health.status(), StatusCode::OK);

    server.stop().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_graceful_stop_drains_in_flight_call() {
    let server = sleepy_server(Duration::from_secs(3));
    let url = started(&server).await;

    let call = tokio::spawn({
        let url = url.clone();
        async move {
            rpc(
                &Client::new(),
                &url,
                &json!({
                    "id": 1,
                    "method": "tools/call",
                    "params": {"name": "sleep", "arguments": {"ms": 200}}
                }),
            )
            .await
        }
    });
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert_eq!(server.stop().await, StopOutcome::Graceful);

    let response = call.await.unwrap();
    assert_eq!(response["result"]["isError"], false);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_forced_stop_abandons_slow_call() {
    let server = sleepy_server(Duration::from_millis(100));
    let url = started(&server).await;

    let call = tokio::spawn(async move {
        Client::new()
            .post(&url)
            .json(&json!({
                "id": 1,
                "method": "tools/call",
                "params": {"name": "sleep", "arguments": {"ms": 10000}}
            }))
            .send()
            .await
    });
    tokio::time::sleep(Duration::from_millis(50)).await;

    let stopped = tokio::time::timeout(Duration::from_secs(2), server.stop()).await;
    assert_eq!(stopped, Ok(StopOutcome::Forced));
    assert_eq!(server.state(), ServerState::Stopped);

    // The client either sees the abandoned call or a dropped connection,
    // and does so well before the tool would have finished.
    let outcome = tokio::time::timeout(Duration::from_secs(2), call)
        .await
        .unwrap()
        .unwrap();
    if let Ok(response) = outcome {
        let Ok(body) = response.json::<Value>().await else {
            return;
        };
        assert_eq!(body["error"]["code"], -32001);
        assert!(body["error"]["message"]
            .as_str()
            .unwrap()
            .contains("abandoned"));
    }
}
