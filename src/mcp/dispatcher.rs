//! Tool dispatch: schema validation followed by handler execution.
//!
//! Handlers run on their own tokio task. The dispatch future owns that task:
//! dropping it (for example when the HTTP client disconnects) aborts the
//! handler. Handler failures of any kind come back as a [`ToolCallResult`]
//! with `is_error` set; only lookup and validation failures are errors.

use std::any::Any;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::Value;
use thiserror::Error;
use tokio::task::{JoinError, JoinHandle};
use tokio_util::sync::CancellationToken;

use crate::mcp::registry::{ToolArguments, ToolCallResult, ToolExecutionError, ToolRegistry};
use crate::mcp::schema::ValidationError;

/// Failures that stop a call before its handler runs.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DispatchError {
    /// No tool with this name is registered.
    #[error("Tool not found: {name}")]
    ToolNotFound {
        /// Requested tool name.
        name: String,
    },

    /// The arguments do not satisfy the tool's schema.
    #[error("Invalid arguments for tool '{tool}': {source}")]
    InvalidParams {
        /// Tool name.
        tool: String,
        /// Validation failure.
        #[source]
        source: ValidationError,
    },
}

/// Aborts the wrapped task when dropped.
struct AbortOnDrop<T>(JoinHandle<T>);

impl<T> Drop for AbortOnDrop<T> {
    fn drop(&mut self) {
        self.0.abort();
    }
}

enum Outcome {
    Finished(Result<Result<ToolCallResult, ToolExecutionError>, JoinError>),
    TimedOut(Duration),
    Abandoned,
}

/// Validates arguments and runs tool handlers.
#[derive(Debug, Clone)]
pub struct ToolDispatcher {
    registry: Arc<ToolRegistry>,
    call_timeout: Option<Duration>,
    abandon: CancellationToken,
}

impl ToolDispatcher {
    /// Creates a dispatcher with no call timeout.
    #[must_use]
    pub fn new(registry: Arc<ToolRegistry>) -> Self {
        Self {
            registry,
            call_timeout: None,
            abandon: CancellationToken::new(),
        }
    }

    /// Bounds every handler call.
    #[must_use]
    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = Some(timeout);
        self
    }

    /// Abandons in-flight calls when `token` is cancelled.
    #[must_use]
    pub fn with_abandon_token(mut self, token: CancellationToken) -> Self {
        self.abandon = token;
        self
    }

    /// The registry this dispatcher resolves against.
    #[must_use]
    pub const fn registry(&self) -> &Arc<ToolRegistry> {
        &self.registry
    }

    /// Resolves, validates and runs a tool.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::ToolNotFound`] for unknown names and
    /// [`DispatchError::InvalidParams`] when validation fails. In both cases the
    /// handler is never called.
    pub async fn invoke(
        &self,
        name: &str,
        arguments: &Value,
    ) -> Result<ToolCallResult, DispatchError> {
        let tool = self
            .registry
            .resolve(name)
            .ok_or_else(|| DispatchError::ToolNotFound {
                name: name.to_string(),
            })?;

        let validated = tool
            .definition()
            .input_schema
            .validate(arguments)
            .map_err(|source| DispatchError::InvalidParams {
                tool: name.to_string(),
                source,
            })?;

        let handler = tool.handler();
        let started = Instant::now();
        let mut task = AbortOnDrop(tokio::spawn(async move {
            handler.call(ToolArguments::new(validated)).await
        }));

        let outcome = tokio::select! {
            joined = &mut task.0 => Outcome::Finished(joined),
            limit = deadline(self.call_timeout) => Outcome::TimedOut(limit),
            () = self.abandon.cancelled() => Outcome::Abandoned,
        };

        let result = match outcome {
            Outcome::Finished(Ok(Ok(result))) => result,
            Outcome::Finished(Ok(Err(e))) => {
                ToolCallResult::error(format!("Tool '{name}' failed: {e}"))
            }
            Outcome::Finished(Err(e)) if e.is_panic() => ToolCallResult::error(format!(
                "Tool '{name}' panicked: {}",
                panic_message(e.into_panic().as_ref())
            )),
            Outcome::Finished(Err(_)) => {
                ToolCallResult::error(format!("Tool '{name}' was cancelled"))
            }
            Outcome::TimedOut(limit) => ToolCallResult::error(format!(
                "Tool '{name}' timed out after {} ms",
                limit.as_millis()
            )),
            Outcome::Abandoned => ToolCallResult::error(format!(
                "Tool '{name}' was abandoned because the server is stopping"
            )),
        };

        let elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        if result.is_error {
            tracing::warn!(
                tool = name,
                elapsed_ms,
                error = %result.joined_text(),
                "Tool call failed"
            );
        } else {
            tracing::debug!(tool = name, elapsed_ms, "Tool call completed");
        }

        Ok(result)
    }
}

/// Resolves after `limit`, or never when there is no limit.
async fn deadline(limit: Option<Duration>) -> Duration {
    match limit {
        Some(limit) => {
            tokio::time::sleep(limit).await;
            limit
        }
        None => std::future::pending().await,
    }
}

/// Extracts a readable message from a panic payload.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
