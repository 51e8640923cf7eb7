//! MCP server lifecycle.
//!
//! [`McpServer`] owns at most one loopback listener at a time. The host drives
//! it through `start`, `stop` and `restart`:
//!
//! ```text
//!            start                      listener bound,
//!  Stopped ─────────▶ Starting ───────▶ backend connected ───▶ Running
//!     ▲                  │ bind / setup / timeout failure          │
//!     └──────────────────┴─────────────────────────────────────────┘
//!                                  stop (graceful, then forced)
//! ```
//!
//! Lifecycle operations are serialised, so two concurrent `start` calls can
//! never both bind. Status queries never wait on a lifecycle operation.

use std::net::{Ipv4Addr, SocketAddr};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::automation::AutomationBackend;
use crate::config::ServerConfig;
use crate::error::ServerError;
use crate::mcp::dispatcher::ToolDispatcher;
use crate::mcp::handler::ProtocolHandler;
use crate::mcp::registry::{ToolRegistry, ToolSummary};
use crate::mcp::transport;

/// Lowest port `start` accepts.
pub const MIN_PORT: u16 = 1024;

/// Default shutdown grace period.
pub const DEFAULT_SHUTDOWN_GRACE: Duration = Duration::from_secs(3);

/// Default per-call timeout.
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(30);

/// Observable lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerState {
    /// No listener.
    Stopped,
    /// `start` is in progress.
    Starting,
    /// Serving requests.
    Running,
}

/// How a `stop` call ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopOutcome {
    /// In-flight requests drained within the grace period.
    Graceful,
    /// The grace period expired and in-flight work was abandoned.
    Forced,
    /// Nothing was running.
    AlreadyStopped,
}

/// Tunables that apply to every run of a server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerOptions {
    /// How long `stop` waits for in-flight requests.
    pub shutdown_grace: Duration,
    /// Upper bound on a single tool call. `None` means unbounded.
    pub call_timeout: Option<Duration>,
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self {
            shutdown_grace: DEFAULT_SHUTDOWN_GRACE,
            call_timeout: Some(DEFAULT_CALL_TIMEOUT),
        }
    }
}

impl From<&ServerConfig> for ServerOptions {
    fn from(config: &ServerConfig) -> Self {
        Self {
            shutdown_grace: config.shutdown_grace(),
            call_timeout: Some(config.call_timeout()),
        }
    }
}

/// A live listener and the handles needed to take it down.
struct Running {
    addr: SocketAddr,
    shutdown: CancellationToken,
    abandon: CancellationToken,
    task: JoinHandle<std::io::Result<()>>,
}

impl Running {
    async fn stop(mut self, grace: Duration) -> StopOutcome {
        self.shutdown.cancel();

        match tokio::time::timeout(grace, &mut self.task).await {
            Ok(Ok(Ok(()))) => StopOutcome::Graceful,
            Ok(Ok(Err(e))) => {
                tracing::error!(addr = %self.addr, error = %e, "Serve loop failed");
                StopOutcome::Graceful
            }
            Ok(Err(e)) => {
                tracing::error!(addr = %self.addr, error = %e, "Serve task failed");
                StopOutcome::Graceful
            }
            Err(_) => {
                tracing::warn!(
                    addr = %self.addr,
                    grace_ms = u64::try_from(grace.as_millis()).unwrap_or(u64::MAX),
                    "Grace period expired, forcing shutdown"
                );
                self.abandon.cancel();
                self.task.abort();
                StopOutcome::Forced
            }
        }
    }
}

impl Drop for Running {
    fn drop(&mut self) {
        self.shutdown.cancel();
        self.abandon.cancel();
        self.task.abort();
    }
}

#[derive(Debug, Clone, Copy)]
struct Status {
    state: ServerState,
    addr: Option<SocketAddr>,
}

/// Host-owned MCP server.
///
/// Independent instances can coexist, each with its own registry, backend and
/// listener. Dropping a running server cancels it.
pub struct McpServer {
    registry: Arc<ToolRegistry>,
    backend: Arc<dyn AutomationBackend>,
    options: ServerOptions,
    lifecycle: tokio::sync::Mutex<Option<Running>>,
    status: Mutex<Status>,
}

impl std::fmt::Debug for McpServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("McpServer")
            .field("tools", &self.registry.len())
            .field("options", &self.options)
            .field("status", &self.status())
            .finish_non_exhaustive()
    }
}

impl McpServer {
    /// Creates a stopped server.
    #[must_use]
    pub fn new(
        registry: Arc<ToolRegistry>,
        backend: Arc<dyn AutomationBackend>,
        options: ServerOptions,
    ) -> Self {
        Self {
            registry,
            backend,
            options,
            lifecycle: tokio::sync::Mutex::new(None),
            status: Mutex::new(Status {
                state: ServerState::Stopped,
                addr: None,
            }),
        }
    }

    /// Starts listening on `127.0.0.1:port`.
    ///
    /// Binds, connects the automation backend, then spawns the serve task.
    /// On any failure everything acquired so far is released and the server
    /// is left stopped, so the call can simply be retried.
    ///
    /// # Errors
    ///
    /// - [`ServerError::AlreadyRunning`] if a listener is up
    /// - [`ServerError::InvalidPort`] if `port` is below [`MIN_PORT`]
    /// - [`ServerError::Bind`] if the port cannot be bound
    /// - [`ServerError::Setup`] if the backend fails to connect
    /// - [`ServerError::StartupTimeout`] if all of this takes longer than
    ///   `startup_timeout`
    pub async fn start(
        &self,
        port: u16,
        startup_timeout: Duration,
    ) -> Result<SocketAddr, ServerError> {
        let mut lifecycle = self.lifecycle.lock().await;

        if let Some(running) = lifecycle.as_ref() {
            return Err(ServerError::AlreadyRunning {
                port: running.addr.port(),
            });
        }
        if port < MIN_PORT {
            return Err(ServerError::InvalidPort { port });
        }

        self.set_status(ServerState::Starting, None);
        tracing::info!(port, "Starting MCP server");

        let result = match tokio::time::timeout(startup_timeout, self.launch(port)).await {
            Ok(result) => result,
            Err(_) => Err(ServerError::StartupTimeout {
                timeout: startup_timeout,
            }),
        };

        match result {
            Ok(running) => {
                let addr = running.addr;
                *lifecycle = Some(running);
                self.set_status(ServerState::Running, Some(addr));
                tracing::info!(%addr, tools = self.registry.len(), "MCP server running");
                Ok(addr)
            }
            Err(e) => {
                self.set_status(ServerState::Stopped, None);
                tracing::warn!(port, error = %e, "MCP server failed to start");
                Err(e)
            }
        }
    }

    /// Binds, connects the backend and spawns the serve task.
    ///
    /// Nothing is spawned until the last step, so dropping this future part
    /// way through leaks nothing.
    async fn launch(&self, port: u16) -> Result<Running, ServerError> {
        let requested = SocketAddr::from((Ipv4Addr::LOCALHOST, port));
        let listener = TcpListener::bind(requested)
            .await
            .map_err(|source| ServerError::Bind {
                addr: requested,
                source,
            })?;
        let addr = listener
            .local_addr()
            .map_err(|source| ServerError::Bind {
                addr: requested,
                source,
            })?;

        self.backend.connect().await.map_err(ServerError::Setup)?;

        let shutdown = CancellationToken::new();
        let abandon = CancellationToken::new();

        let mut dispatcher =
            ToolDispatcher::new(Arc::clone(&self.registry)).with_abandon_token(abandon.clone());
        if let Some(limit) = self.options.call_timeout {
            dispatcher = dispatcher.with_call_timeout(limit);
        }
        let app = transport::router(Arc::new(ProtocolHandler::new(dispatcher)), addr.port());

        let signal = shutdown.clone();
        let task = tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(signal.cancelled_owned())
                .await
        });

        Ok(Running {
            addr,
            shutdown,
            abandon,
            task,
        })
    }

    /// Stops the server. Idempotent.
    ///
    /// Waits up to the configured grace period for in-flight requests, then
    /// closes the listener and abandons whatever is still running.
    pub async fn stop(&self) -> StopOutcome {
        let mut lifecycle = self.lifecycle.lock().await;

        let Some(running) = lifecycle.take() else {
            return StopOutcome::AlreadyStopped;
        };

        let addr = running.addr;
        tracing::info!(%addr, "Stopping MCP server");
        let outcome = running.stop(self.options.shutdown_grace).await;
        self.set_status(ServerState::Stopped, None);
        tracing::info!(%addr, ?outcome, "MCP server stopped");
        outcome
    }

    /// Stops, then starts on `port`.
    ///
    /// Not atomic: if the start fails, the server stays stopped.
    ///
    /// # Errors
    ///
    /// Same as [`McpServer::start`].
    pub async fn restart(
        &self,
        port: u16,
        startup_timeout: Duration,
    ) -> Result<SocketAddr, ServerError> {
        self.stop().await;
        self.start(port, startup_timeout).await
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> ServerState {
        self.status().state
    }

    /// Whether a listener is serving requests.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.state() == ServerState::Running
    }

    /// Bound address while running.
    #[must_use]
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.status().addr
    }

    /// Bound port while running.
    #[must_use]
    pub fn current_port(&self) -> Option<u16> {
        self.local_addr().map(|addr| addr.port())
    }

    /// Base URL while running.
    #[must_use]
    pub fn server_url(&self) -> Option<String> {
        self.current_port()
            .map(|port| format!("http://127.0.0.1:{port}"))
    }

    /// Summaries of the tools this server exposes.
    #[must_use]
    pub fn available_tools(&self) -> Vec<ToolSummary> {
        self.registry.summaries()
    }

    fn status(&self) -> Status {
        *self.status.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_status(&self, state: ServerState, addr: Option<SocketAddr>) {
        *self.status.lock().unwrap_or_else(PoisonError::into_inner) = Status { state, addr };
    }
}
