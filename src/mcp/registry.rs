//! Tool registry: definitions, handlers and results.
//!
//! A [`ToolRegistry`] is built once through [`ToolRegistryBuilder`] and is
//! immutable afterwards. Hosts that want a different tool set build a new
//! registry.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::{Map, Value};
use thiserror::Error;

use crate::mcp::schema::InputSchema;

/// A tool definition for the `tools/list` response.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolDefinition {
    /// Unique tool name.
    pub name: String,
    /// Human-readable description.
    pub description: String,
    /// Schema for the tool's input parameters.
    pub input_schema: InputSchema,
}

impl ToolDefinition {
    /// Creates a new tool definition.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        input_schema: InputSchema,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            input_schema,
        }
    }
}

/// Content item in a tool call response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ToolContent {
    /// Text content.
    Text {
        /// The text content.
        text: String,
    },
}

impl ToolContent {
    /// Returns the text of this item.
    #[must_use]
    pub fn as_text(&self) -> &str {
        match self {
            Self::Text { text } => text,
        }
    }
}

/// Result of a tool call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolCallResult {
    /// Content returned by the tool.
    pub content: Vec<ToolContent>,
    /// Whether the tool call resulted in an error.
    pub is_error: bool,
}

impl ToolCallResult {
    /// Creates a successful text result.
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            content: vec![ToolContent::Text { text: text.into() }],
            is_error: false,
        }
    }

    /// Creates an error text result.
    #[must_use]
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            content: vec![ToolContent::Text {
                text: message.into(),
            }],
            is_error: true,
        }
    }

    /// Concatenates all text items, one per line.
    #[must_use]
    pub fn joined_text(&self) -> String {
        self.content
            .iter()
            .map(ToolContent::as_text)
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Failure reported by a tool handler.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ToolExecutionError {
    /// An argument could not be used by the handler.
    #[error("invalid argument '{name}': {message}")]
    InvalidArgument {
        /// Argument name.
        name: String,
        /// What is wrong with it.
        message: String,
    },

    /// The operation itself failed.
    #[error("{0}")]
    Failed(String),
}

/// Validated, defaulted arguments passed to a handler.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ToolArguments(Map<String, Value>);

impl ToolArguments {
    /// Wraps an argument map.
    #[must_use]
    pub const fn new(map: Map<String, Value>) -> Self {
        Self(map)
    }

    /// Returns the raw value of an argument.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.0.get(name)
    }

    /// Returns an optional string argument.
    #[must_use]
    pub fn opt_str(&self, name: &str) -> Option<&str> {
        self.0.get(name).and_then(Value::as_str)
    }

    /// Returns a required string argument.
    ///
    /// # Errors
    ///
    /// Returns [`ToolExecutionError::InvalidArgument`] if absent or not a string.
    pub fn str(&self, name: &str) -> Result<&str, ToolExecutionError> {
        self.opt_str(name)
            .ok_or_else(|| Self::invalid(name, "expected a string"))
    }

    /// Returns a required number argument.
    ///
    /// # Errors
    ///
    /// Returns [`ToolExecutionError::InvalidArgument`] if absent or not a number.
    pub fn f64(&self, name: &str) -> Result<f64, ToolExecutionError> {
        self.0
            .get(name)
            .and_then(Value::as_f64)
            .ok_or_else(|| Self::invalid(name, "expected a number"))
    }

    /// Returns a required boolean argument.
    ///
    /// # Errors
    ///
    /// Returns [`ToolExecutionError::InvalidArgument`] if absent or not a boolean.
    pub fn bool(&self, name: &str) -> Result<bool, ToolExecutionError> {
        self.0
            .get(name)
            .and_then(Value::as_bool)
            .ok_or_else(|| Self::invalid(name, "expected a boolean"))
    }

    fn invalid(name: &str, message: &str) -> ToolExecutionError {
        ToolExecutionError::InvalidArgument {
            name: name.to_string(),
            message: message.to_string(),
        }
    }
}

/// An executable tool.
#[async_trait]
pub trait ToolHandler: Send + Sync {
    /// Runs the tool with validated arguments.
    ///
    /// Returning `Err` or a result with `is_error` set marks the call as failed.
    async fn call(&self, arguments: ToolArguments) -> Result<ToolCallResult, ToolExecutionError>;
}

/// Adapts an async closure into a [`ToolHandler`].
pub struct FnToolHandler<F>(F);

impl<F> FnToolHandler<F> {
    /// Wraps a closure.
    pub fn new<Fut>(f: F) -> Self
    where
        F: Fn(ToolArguments) -> Fut + Send + Sync,
        Fut: Future<Output = Result<ToolCallResult, ToolExecutionError>> + Send + 'static,
    {
        Self(f)
    }
}

#[async_trait]
impl<F, Fut> ToolHandler for FnToolHandler<F>
where
    F: Fn(ToolArguments) -> Fut + Send + Sync,
    Fut: Future<Output = Result<ToolCallResult, ToolExecutionError>> + Send + 'static,
{
    async fn call(&self, arguments: ToolArguments) -> Result<ToolCallResult, ToolExecutionError> {
        (self.0)(arguments).await
    }
}

/// A definition paired with its handler.
#[derive(Clone)]
pub struct RegisteredTool {
    definition: ToolDefinition,
    handler: Arc<dyn ToolHandler>,
}

impl RegisteredTool {
    /// The tool's definition.
    #[must_use]
    pub const fn definition(&self) -> &ToolDefinition {
        &self.definition
    }

    /// A shared handle to the tool's handler.
    #[must_use]
    pub fn handler(&self) -> Arc<dyn ToolHandler> {
        Arc::clone(&self.handler)
    }
}

impl fmt::Debug for RegisteredTool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegisteredTool")
            .field("name", &self.definition.name)
            .finish_non_exhaustive()
    }
}

/// Parameter summary of a tool, for the host application.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ToolSummary {
    /// Tool name.
    pub name: String,
    /// Tool description.
    pub description: String,
    /// Required parameter names.
    pub required: Vec<String>,
    /// All parameter names, in declaration order.
    pub parameters: Vec<String>,
}

/// Errors raised while building a registry.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    /// A tool was registered with an empty name.
    #[error("tool name cannot be empty")]
    EmptyName,

    /// Two tools share a name.
    #[error("duplicate tool name: {name}")]
    DuplicateName {
        /// The repeated name.
        name: String,
    },

    /// A tool's schema is inconsistent.
    #[error("invalid schema for tool '{name}': {message}")]
    InvalidSchema {
        /// Tool name.
        name: String,
        /// Description of the problem.
        message: String,
    },
}

/// Accumulates tools before building a [`ToolRegistry`].
#[derive(Default)]
pub struct ToolRegistryBuilder {
    tools: Vec<RegisteredTool>,
}

impl ToolRegistryBuilder {
    /// Adds a tool.
    #[must_use]
    pub fn register(
        mut self,
        definition: ToolDefinition,
        handler: impl ToolHandler + 'static,
    ) -> Self {
        self.tools.push(RegisteredTool {
            definition,
            handler: Arc::new(handler),
        });
        self
    }

    /// Checks every definition and freezes the registry.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError`] for empty or duplicate names and for
    /// inconsistent schemas.
    pub fn build(self) -> Result<ToolRegistry, RegistryError> {
        let mut index = HashMap::with_capacity(self.tools.len());

        for (position, tool) in self.tools.iter().enumerate() {
            let name = &tool.definition.name;
            if name.is_empty() {
                return Err(RegistryError::EmptyName);
            }
            tool.definition
                .input_schema
                .check_consistency()
                .map_err(|message| RegistryError::InvalidSchema {
                    name: name.clone(),
                    message,
                })?;
            if index.insert(name.clone(), position).is_some() {
                return Err(RegistryError::DuplicateName { name: name.clone() });
            }
        }

        Ok(ToolRegistry {
            tools: self.tools,
            index,
        })
    }
}

/// Immutable, ordered set of tools.
#[derive(Debug)]
pub struct ToolRegistry {
    tools: Vec<RegisteredTool>,
    index: HashMap<String, usize>,
}

impl ToolRegistry {
    /// Starts building a registry.
    #[must_use]
    pub fn builder() -> ToolRegistryBuilder {
        ToolRegistryBuilder::default()
    }

    /// Tool definitions in registration order.
    pub fn list(&self) -> impl ExactSizeIterator<Item = &ToolDefinition> + '_ {
        self.tools.iter().map(RegisteredTool::definition)
    }

    /// Looks up a tool by name.
    #[must_use]
    pub fn resolve(&self, name: &str) -> Option<&RegisteredTool> {
        self.index.get(name).and_then(|&i| self.tools.get(i))
    }

    /// Number of registered tools.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    /// Returns `true` if no tools are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Name and parameter summaries, in registration order.
    #[must_use]
    pub fn summaries(&self) -> Vec<ToolSummary> {
        self.list()
            .map(|def| ToolSummary {
                name: def.name.clone(),
                description: def.description.clone(),
                required: def.input_schema.required_names().to_vec(),
                parameters: def.input_schema.properties().keys().cloned().collect(),
            })
            .collect()
    }
}
