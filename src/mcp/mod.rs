//! Model Context Protocol (MCP) server implementation.
//!
//! Exposes a fixed set of tools to AI agents over JSON-RPC 2.0 on a loopback
//! HTTP listener. The host application owns the [`McpServer`] and decides
//! when it runs.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                          McpServer (lifecycle)                   │
//! │                                                                  │
//! │   ┌─────────────┐    ┌─────────────┐    ┌─────────────────────┐  │
//! │   │  Transport  │───▶│   Handler   │───▶│     Dispatcher      │  │
//! │   │   (axum)    │    │  (routing)  │    │ (validate, execute) │  │
//! │   └─────────────┘    └─────────────┘    └─────────────────────┘  │
//! │                             │                      │             │
//! │                             ▼                      ▼             │
//! │                    ┌─────────────────────────────────────────┐   │
//! │                    │      Registry (definitions, schemas)    │   │
//! │                    └─────────────────────────────────────────┘   │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Protocol Version
//!
//! This implementation targets MCP protocol version 2024-11-05.

pub mod dispatcher;
pub mod handler;
pub mod protocol;
pub mod registry;
pub mod schema;
pub mod server;
pub mod transport;

pub use dispatcher::{DispatchError, ToolDispatcher};
pub use handler::ProtocolHandler;
pub use protocol::{ErrorCode, JsonRpcRequest, JsonRpcResponse, RequestId, MCP_PROTOCOL_VERSION};
pub use registry::{ToolCallResult, ToolDefinition, ToolHandler, ToolRegistry, ToolSummary};
pub use schema::{InputSchema, ParamType, PropertySchema};
pub use server::{McpServer, ServerOptions, ServerState, StopOutcome};
