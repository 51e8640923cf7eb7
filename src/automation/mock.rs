//! In-process automation backend with simulated latency.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;

use super::{AutomationBackend, AutomationError, ScreenInfo, ScrollDirection, UiElement};
use crate::config::AutomationConfig;

/// How many recent actions are kept for inspection.
pub const ACTION_HISTORY_LIMIT: usize = 256;

/// Mock device. Every action succeeds after `latency` unless its identifier
/// is blank. The last [`ACTION_HISTORY_LIMIT`] actions are kept for inspection.
#[derive(Debug)]
pub struct MockAutomation {
    latency: Duration,
    connect_delay: Duration,
    screen_width: u32,
    screen_height: u32,
    foreground_app: String,
    connect_failure: Option<String>,
    connected: AtomicBool,
    actions: Mutex<VecDeque<String>>,
}

impl Default for MockAutomation {
    fn default() -> Self {
        Self::from_config(&AutomationConfig::default())
    }
}

impl MockAutomation {
    /// Creates a mock from the `automation` config section.
    #[must_use]
    pub fn from_config(config: &AutomationConfig) -> Self {
        Self {
            latency: Duration::from_millis(config.latency_ms),
            connect_delay: Duration::from_millis(config.connect_delay_ms),
            screen_width: config.screen_width,
            screen_height: config.screen_height,
            foreground_app: config.foreground_app.clone(),
            connect_failure: None,
            connected: AtomicBool::new(false),
            actions: Mutex::new(VecDeque::with_capacity(ACTION_HISTORY_LIMIT)),
        }
    }

    /// Sets the per-action latency.
    #[must_use]
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Sets how long `connect` takes.
    #[must_use]
    pub fn with_connect_delay(mut self, delay: Duration) -> Self {
        self.connect_delay = delay;
        self
    }

    /// Makes every `connect` fail with `message`.
    #[must_use]
    pub fn with_connect_failure(mut self, message: impl Into<String>) -> Self {
        self.connect_failure = Some(message.into());
        self
    }

    /// Whether `connect` has succeeded.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// Most recent actions, oldest first.
    #[must_use]
    pub fn actions(&self) -> Vec<String> {
        self.actions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .cloned()
            .collect()
    }

    async fn perform(
        &self,
        identifier: Option<&str>,
        action: String,
    ) -> Result<(), AutomationError> {
        if !self.is_connected() {
            return Err(AutomationError::NotConnected);
        }
        if let Some(identifier) = identifier {
            if identifier.trim().is_empty() {
                return Err(AutomationError::ElementNotFound {
                    identifier: identifier.to_string(),
                });
            }
        }

        tokio::time::sleep(self.latency).await;

        tracing::debug!(%action, "Mock action");
        let mut actions = self.actions.lock().unwrap_or_else(PoisonError::into_inner);
        if actions.len() == ACTION_HISTORY_LIMIT {
            actions.pop_front();
        }
        actions.push_back(action);
        Ok(())
    }
}

fn sample_hierarchy() -> Vec<UiElement> {
    [
        ("navigationBar", "navigationBar", "Home"),
        ("searchField", "textField", "Search"),
        ("loginButton", "button", "Log In"),
        ("contentList", "scrollView", "Content"),
    ]
    .into_iter()
    .map(|(identifier, role, label)| UiElement {
        identifier: identifier.to_string(),
        role: role.to_string(),
        label: label.to_string(),
    })
    .collect()
}

#[async_trait]
impl AutomationBackend for MockAutomation {
    async fn connect(&self) -> Result<(), AutomationError> {
        tokio::time::sleep(self.connect_delay).await;
        if let Some(message) = &self.connect_failure {
            return Err(AutomationError::ConnectionFailed(message.clone()));
        }
        self.connected.store(true, Ordering::SeqCst);
        tracing::debug!(app = %self.foreground_app, "Mock automation connected");
        Ok(())
    }

    async fn tap_button(&self, identifier: &str, timeout: Duration) -> Result<(), AutomationError> {
        if self.latency > timeout {
            return Err(AutomationError::Timeout {
                identifier: identifier.to_string(),
                timeout,
            });
        }
        self.perform(Some(identifier), format!("tap {identifier}"))
            .await
    }

    async fn input_text(
        &self,
        text: &str,
        identifier: Option<&str>,
        clear_first: bool,
    ) -> Result<(), AutomationError> {
        let target = identifier.unwrap_or("<focused>");
        let mode = if clear_first { "replace" } else { "type" };
        self.perform(identifier, format!("{mode} {target} {text:?}"))
            .await
    }

    async fn scroll(
        &self,
        direction: ScrollDirection,
        distance: f64,
        identifier: Option<&str>,
    ) -> Result<(), AutomationError> {
        let target = identifier.unwrap_or("<screen>");
        self.perform(identifier, format!("scroll {target} {direction} {distance}"))
            .await
    }

    async fn screen_info(&self, include_hierarchy: bool) -> Result<ScreenInfo, AutomationError> {
        self.perform(None, "screen info".to_string()).await?;
        Ok(ScreenInfo {
            width: self.screen_width,
            height: self.screen_height,
            foreground_app: self.foreground_app.clone(),
            hierarchy: include_hierarchy.then(sample_hierarchy),
        })
    }
}
