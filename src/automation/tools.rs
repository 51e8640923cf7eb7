//! The built-in device tools.
//!
//! Schemas cover presence, type and enum checks. Range checks that a schema
//! cannot express (positive timeouts, scroll distance) are done here and
//! reported as tool failures.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use super::{AutomationBackend, ScrollDirection};
use crate::mcp::registry::{
    RegistryError, ToolArguments, ToolCallResult, ToolDefinition, ToolExecutionError, ToolHandler,
    ToolRegistry,
};
use crate::mcp::schema::{InputSchema, PropertySchema};

/// Default wait for `tapButton`, in seconds.
const DEFAULT_TAP_TIMEOUT_SECS: f64 = 5.0;

/// Default `scroll` distance, as a fraction of the visible area.
const DEFAULT_SCROLL_DISTANCE: f64 = 0.5;

/// Registers `tapButton`, `inputText`, `scroll` and `getScreenInfo`, in that
/// order, against `backend`.
///
/// # Errors
///
/// Returns a [`RegistryError`] if a definition is inconsistent.
pub fn build_registry(backend: Arc<dyn AutomationBackend>) -> Result<ToolRegistry, RegistryError> {
    ToolRegistry::builder()
        .register(
            tap_button_definition(),
            TapButton {
                backend: Arc::clone(&backend),
            },
        )
        .register(
            input_text_definition(),
            InputText {
                backend: Arc::clone(&backend),
            },
        )
        .register(
            scroll_definition(),
            Scroll {
                backend: Arc::clone(&backend),
            },
        )
        .register(screen_info_definition(), GetScreenInfo { backend })
        .build()
}

fn tap_button_definition() -> ToolDefinition {
    ToolDefinition::new(
        "tapButton",
        "Tap a button or other tappable element identified by its accessibility identifier.",
        InputSchema::new()
            .required(
                "identifier",
                PropertySchema::string("Accessibility identifier of the element to tap"),
            )
            .property(
                "timeout",
                PropertySchema::number("Seconds to wait for the element to become tappable")
                    .with_default(DEFAULT_TAP_TIMEOUT_SECS),
            )
            .deny_unknown(),
    )
}

fn input_text_definition() -> ToolDefinition {
    ToolDefinition::new(
        "inputText",
        "Type text into a text field. Uses the focused field when no identifier is given.",
        InputSchema::new()
            .required("text", PropertySchema::string("Text to type"))
            .property(
                "identifier",
                PropertySchema::string("Accessibility identifier of the text field"),
            )
            .property(
                "clearFirst",
                PropertySchema::boolean("Clear the field before typing").with_default(false),
            )
            .deny_unknown(),
    )
}

fn scroll_definition() -> ToolDefinition {
    ToolDefinition::new(
        "scroll",
        "Scroll the screen or a scrollable element.",
        InputSchema::new()
            .required(
                "direction",
                PropertySchema::string("Scroll direction")
                    .one_of(ScrollDirection::ALL.map(ScrollDirection::as_str)),
            )
            .property(
                "distance",
                PropertySchema::number("Fraction of the visible area to scroll, in (0, 1]")
                    .with_default(DEFAULT_SCROLL_DISTANCE),
            )
            .property(
                "identifier",
                PropertySchema::string("Accessibility identifier of the scrollable element"),
            )
            .deny_unknown(),
    )
}

fn screen_info_definition() -> ToolDefinition {
    ToolDefinition::new(
        "getScreenInfo",
        "Describe the current screen: size, foreground app and optionally the visible elements.",
        InputSchema::new()
            .property(
                "includeHierarchy",
                PropertySchema::boolean("Include the visible element hierarchy")
                    .with_default(false),
            )
            .deny_unknown(),
    )
}

fn invalid(name: &str, message: impl Into<String>) -> ToolExecutionError {
    ToolExecutionError::InvalidArgument {
        name: name.to_string(),
        message: message.into(),
    }
}

struct TapButton {
    backend: Arc<dyn AutomationBackend>,
}

#[async_trait]
impl ToolHandler for TapButton {
    async fn call(&self, args: ToolArguments) -> Result<ToolCallResult, ToolExecutionError> {
        let identifier = args.str("identifier")?;
        let seconds = args.f64("timeout")?;
        let timeout = Some(seconds)
            .filter(|s| *s > 0.0)
            .and_then(|s| Duration::try_from_secs_f64(s).ok())
            .ok_or_else(|| invalid("timeout", "must be a positive number of seconds"))?;

        self.backend.tap_button(identifier, timeout).await?;
        Ok(ToolCallResult::text(format!("Tapped button '{identifier}'")))
    }
}

struct InputText {
    backend: Arc<dyn AutomationBackend>,
}

#[async_trait]
impl ToolHandler for InputText {
    async fn call(&self, args: ToolArguments) -> Result<ToolCallResult, ToolExecutionError> {
        let text = args.str("text")?;
        let identifier = args.opt_str("identifier");
        let clear_first = args.bool("clearFirst")?;

        self.backend.input_text(text, identifier, clear_first).await?;

        let target = identifier.map_or_else(
            || "the focused field".to_string(),
            |id| format!("'{id}'"),
        );
        let verb = if clear_first { "Replaced contents of" } else { "Typed into" };
        Ok(ToolCallResult::text(format!(
            "{verb} {target}: {} characters",
            text.chars().count()
        )))
    }
}

struct Scroll {
    backend: Arc<dyn AutomationBackend>,
}

#[async_trait]
impl ToolHandler for Scroll {
    async fn call(&self, args: ToolArguments) -> Result<ToolCallResult, ToolExecutionError> {
        let direction: ScrollDirection = args
            .str("direction")?
            .parse()
            .map_err(|e: super::UnknownDirection| invalid("direction", e.to_string()))?;
        let distance = args.f64("distance")?;
        if !(distance > 0.0 && distance <= 1.0) {
            return Err(invalid("distance", "must be in (0, 1]"));
        }
        let identifier = args.opt_str("identifier");

        self.backend.scroll(direction, distance, identifier).await?;

        let mut message = format!("Scrolled {direction} by {distance}");
        if let Some(id) = identifier {
            message.push_str(&format!(" in '{id}'"));
        }
        Ok(ToolCallResult::text(message))
    }
}

struct GetScreenInfo {
    backend: Arc<dyn AutomationBackend>,
}

#[async_trait]
impl ToolHandler for GetScreenInfo {
    async fn call(&self, args: ToolArguments) -> Result<ToolCallResult, ToolExecutionError> {
        let include_hierarchy = args.bool("includeHierarchy")?;
        let info = self.backend.screen_info(include_hierarchy).await?;
        let text = serde_json::to_string_pretty(&info)
            .map_err(|e| ToolExecutionError::Failed(format!("failed to encode screen info: {e}")))?;
        Ok(ToolCallResult::text(text))
    }
}

#[cfg(test)]
mod tests {
    use serde_json::{json, Value};

    use super::*;
    use crate::automation::MockAutomation;
    use crate::mcp::dispatcher::{DispatchError, ToolDispatcher};

    async fn connected() -> (Arc<MockAutomation>, ToolDispatcher) {
        let mock = Arc::new(MockAutomation::default().with_latency(Duration::ZERO));
        mock.connect().await.unwrap();
        let registry = build_registry(Arc::clone(&mock) as Arc<dyn AutomationBackend>).unwrap();
        (mock, ToolDispatcher::new(Arc::new(registry)))
    }

    #[test]
    fn registers_tools_in_order() {
        let registry = build_registry(Arc::new(MockAutomation::default())).unwrap();
        let names: Vec<_> = registry.list().map(|d| d.name.as_str()).collect();
        assert_eq!(names, ["tapButton", "inputText", "scroll", "getScreenInfo"]);
        assert!(registry.list().all(|d| !d.input_schema.allows_unknown()));
    }

    #[test]
    fn scroll_schema_advertises_directions() {
        let value = serde_json::to_value(scroll_definition()).unwrap();
        assert_eq!(
            value["inputSchema"]["properties"]["direction"]["enum"],
            json!(["up", "down", "left", "right"])
        );
        assert_eq!(value["inputSchema"]["required"], json!(["direction"]));
    }

    #[tokio::test]
    async fn tap_button_uses_default_timeout() {
        let (mock, dispatcher) = connected().await;
        let result = dispatcher
            .invoke("tapButton", &json!({"identifier": "loginButton"}))
            .await
            .unwrap();
        assert!(!result.is_error);
        assert_eq!(result.joined_text(), "Tapped button 'loginButton'");
        assert_eq!(mock.actions(), ["tap loginButton"]);
    }

    #[tokio::test]
    async fn tap_button_rejects_non_positive_timeout() {
        let (mock, dispatcher) = connected().await;
        let result = dispatcher
            .invoke("tapButton", &json!({"identifier": "ok", "timeout": 0}))
            .await
            .unwrap();
        assert!(result.is_error);
        assert!(result.joined_text().contains("timeout"));
        assert!(mock.actions().is_empty());
    }

    #[tokio::test]
    async fn input_text_into_focused_field() {
        let (_, dispatcher) = connected().await;
        let result = dispatcher
            .invoke("inputText", &json!({"text": "héllo"}))
            .await
            .unwrap();
        assert_eq!(result.joined_text(), "Typed into the focused field: 5 characters");
    }

    #[tokio::test]
    async fn input_text_clear_first() {
        let (mock, dispatcher) = connected().await;
        let result = dispatcher
            .invoke(
                "inputText",
                &json!({"text": "abc", "identifier": "searchField", "clearFirst": true}),
            )
            .await
            .unwrap();
        assert_eq!(result.joined_text(), "Replaced contents of 'searchField': 3 characters");
        assert_eq!(mock.actions(), [r#"replace searchField "abc""#]);
    }

    #[tokio::test]
    async fn scroll_rejects_unknown_direction_before_running() {
        let (mock, dispatcher) = connected().await;
        let err = dispatcher
            .invoke("scroll", &json!({"direction": "sideways"}))
            .await
            .unwrap_err();
        assert!(matches!(err, DispatchError::InvalidParams { .. }));
        assert!(mock.actions().is_empty());
    }

    #[tokio::test]
    async fn scroll_with_defaults_and_range_check() {
        let (_, dispatcher) = connected().await;
        let ok = dispatcher
            .invoke("scroll", &json!({"direction": "down"}))
            .await
            .unwrap();
        assert_eq!(ok.joined_text(), "Scrolled down by 0.5");

        let too_far = dispatcher
            .invoke("scroll", &json!({"direction": "up", "distance": 2}))
            .await
            .unwrap();
        assert!(too_far.is_error);
    }

    #[tokio::test]
    async fn screen_info_is_json_text() {
        let (_, dispatcher) = connected().await;
        let result = dispatcher
            .invoke("getScreenInfo", &json!({"includeHierarchy": true}))
            .await
            .unwrap();
        let info: Value = serde_json::from_str(&result.joined_text()).unwrap();
        assert_eq!(info["width"], 1170);
        assert_eq!(info["foregroundApp"], "com.example.host");
        assert_eq!(info["hierarchy"].as_array().unwrap().len(), 4);
    }

    #[tokio::test]
    async fn disconnected_backend_fails_the_call() {
        let registry = build_registry(Arc::new(MockAutomation::default())).unwrap();
        let dispatcher = ToolDispatcher::new(Arc::new(registry));
        let result = dispatcher.invoke("getScreenInfo", &Value::Null).await.unwrap();
        assert!(result.is_error);
        assert!(result.joined_text().contains("not connected"));
    }
}
