//! Device automation backend and the tools built on it.
//!
//! The MCP layer never talks to a device directly. Tools call through an
//! [`AutomationBackend`], which the host injects when it creates the server:
//!
//! - [`MockAutomation`]: in-process backend with simulated latency, used by
//!   the binary and the tests
//! - [`tools::build_registry`]: registers `tapButton`, `inputText`, `scroll`
//!   and `getScreenInfo` against a backend

pub mod mock;
pub mod tools;

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

use crate::mcp::registry::ToolExecutionError;

pub use mock::MockAutomation;
pub use tools::build_registry;

/// Errors reported by an automation backend.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum AutomationError {
    /// The backend could not be brought up.
    #[error("failed to connect to automation backend: {0}")]
    ConnectionFailed(String),

    /// An action was attempted before [`AutomationBackend::connect`] succeeded.
    #[error("automation backend is not connected")]
    NotConnected,

    /// No element matches the identifier.
    #[error("no element found with identifier '{identifier}'")]
    ElementNotFound {
        /// Identifier that was looked up.
        identifier: String,
    },

    /// The element did not become tappable in time.
    #[error("element '{identifier}' was not ready within {timeout:?}")]
    Timeout {
        /// Element identifier.
        identifier: String,
        /// How long we waited.
        timeout: Duration,
    },

    /// The action itself failed on the device.
    #[error("{0}")]
    ActionFailed(String),
}

impl From<AutomationError> for ToolExecutionError {
    fn from(err: AutomationError) -> Self {
        Self::Failed(err.to_string())
    }
}

/// Scroll direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ScrollDirection {
    /// Towards the top of the content.
    Up,
    /// Towards the bottom of the content.
    Down,
    /// Towards the leading edge.
    Left,
    /// Towards the trailing edge.
    Right,
}

impl ScrollDirection {
    /// Every direction, in schema order.
    pub const ALL: [Self; 4] = [Self::Up, Self::Down, Self::Left, Self::Right];

    /// Wire name of the direction.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Up => "up",
            Self::Down => "down",
            Self::Left => "left",
            Self::Right => "right",
        }
    }
}

impl fmt::Display for ScrollDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Unrecognised scroll direction.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown scroll direction: {0}")]
pub struct UnknownDirection(pub String);

impl FromStr for ScrollDirection {
    type Err = UnknownDirection;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|d| d.as_str() == s)
            .ok_or_else(|| UnknownDirection(s.to_string()))
    }
}

/// A node of the visible UI hierarchy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UiElement {
    /// Accessibility identifier.
    pub identifier: String,
    /// Element role, e.g. `button`.
    pub role: String,
    /// Visible label.
    pub label: String,
}

/// What is currently on screen.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScreenInfo {
    /// Width in points.
    pub width: u32,
    /// Height in points.
    pub height: u32,
    /// Bundle identifier of the foreground app.
    pub foreground_app: String,
    /// Visible elements, when requested.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hierarchy: Option<Vec<UiElement>>,
}

/// UI automation capability used by the built-in tools.
#[async_trait]
pub trait AutomationBackend: Send + Sync + fmt::Debug {
    /// Prepares the backend. Called by the server during startup.
    async fn connect(&self) -> Result<(), AutomationError>;

    /// Taps the element with `identifier`, waiting up to `timeout` for it.
    async fn tap_button(&self, identifier: &str, timeout: Duration) -> Result<(), AutomationError>;

    /// Types `text` into `identifier`, or into the focused field when `None`.
    async fn input_text(
        &self,
        text: &str,
        identifier: Option<&str>,
        clear_first: bool,
    ) -> Result<(), AutomationError>;

    /// Scrolls by `distance` (fraction of the visible area).
    async fn scroll(
        &self,
        direction: ScrollDirection,
        distance: f64,
        identifier: Option<&str>,
    ) -> Result<(), AutomationError>;

    /// Describes the screen.
    async fn screen_info(&self, include_hierarchy: bool) -> Result<ScreenInfo, AutomationError>;
}
