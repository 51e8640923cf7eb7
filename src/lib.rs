//! device-automation-mcp: embeddable MCP server for on-device UI automation
//!
//! Lets an external AI agent discover and call a fixed set of automation
//! tools inside a host application, over JSON-RPC 2.0 on a loopback HTTP
//! listener.
//!
//! # Architecture
//!
//! The host builds a [`mcp::ToolRegistry`] (usually with
//! [`automation::build_registry`]), wraps it in an [`mcp::McpServer`] and
//! drives its lifecycle:
//!
//! ```no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! use device_automation_mcp::automation::{build_registry, AutomationBackend, MockAutomation};
//! use device_automation_mcp::mcp::{McpServer, ServerOptions};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let backend: Arc<dyn AutomationBackend> = Arc::new(MockAutomation::default());
//! let registry = Arc::new(build_registry(Arc::clone(&backend))?);
//! let server = McpServer::new(registry, backend, ServerOptions::default());
//!
//! let addr = server.start(8765, Duration::from_secs(5)).await?;
//! println!("listening on {addr}");
//! server.stop().await;
//! # Ok(())
//! # }
//! ```
//!
//! # Modules
//!
//! - [`automation`]: Automation backend and the built-in tools
//! - [`config`]: Configuration loading and validation
//! - [`error`]: Error types
//! - [`mcp`]: MCP protocol implementation

pub mod automation;
pub mod config;
pub mod error;
pub mod mcp;
