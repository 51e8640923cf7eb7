//! Declarative tool parameter schemas.
//!
//! Schemas are plain data. [`InputSchema::validate`] is the single place where
//! tool arguments are checked, so a new tool is added by declaring its schema
//! rather than by writing parsing code.
//!
//! Schemas serialise to the JSON Schema subset advertised by `tools/list`:
//!
//! ```json
//! {
//!   "type": "object",
//!   "properties": {
//!     "direction": { "type": "string", "description": "...", "enum": ["up", "down"] }
//!   },
//!   "required": ["direction"],
//!   "additionalProperties": false
//! }
//! ```

use std::fmt;

use indexmap::IndexMap;
use serde::Serialize;
use serde_json::{Map, Value};
use thiserror::Error;

/// Parameter types understood by the validator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamType {
    /// A JSON string.
    String,
    /// Any JSON number.
    Number,
    /// `true` or `false`.
    Boolean,
}

impl ParamType {
    /// Returns `true` if `value` has this type.
    #[must_use]
    pub const fn matches(self, value: &Value) -> bool {
        matches!(
            (self, value),
            (Self::String, Value::String(_))
                | (Self::Number, Value::Number(_))
                | (Self::Boolean, Value::Bool(_))
        )
    }

    /// Returns the schema name of this type.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Number => "number",
            Self::Boolean => "boolean",
        }
    }
}

impl fmt::Display for ParamType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returns the JSON type name of a value, for error messages.
const fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Schema of a single parameter.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PropertySchema {
    /// Expected JSON type.
    #[serde(rename = "type")]
    pub param_type: ParamType,

    /// Human-readable description.
    pub description: String,

    /// Value used when the parameter is omitted.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,

    /// Allowed values for string parameters.
    #[serde(rename = "enum", skip_serializing_if = "Option::is_none")]
    pub allowed: Option<Vec<String>>,
}

impl PropertySchema {
    /// Creates a property of the given type.
    #[must_use]
    pub fn new(param_type: ParamType, description: impl Into<String>) -> Self {
        Self {
            param_type,
            description: description.into(),
            default: None,
            allowed: None,
        }
    }

    /// Creates a string property.
    #[must_use]
    pub fn string(description: impl Into<String>) -> Self {
        Self::new(ParamType::String, description)
    }

    /// Creates a number property.
    #[must_use]
    pub fn number(description: impl Into<String>) -> Self {
        Self::new(ParamType::Number, description)
    }

    /// Creates a boolean property.
    #[must_use]
    pub fn boolean(description: impl Into<String>) -> Self {
        Self::new(ParamType::Boolean, description)
    }

    /// Sets the default used when the parameter is omitted.
    #[must_use]
    pub fn with_default(mut self, default: impl Into<Value>) -> Self {
        self.default = Some(default.into());
        self
    }

    /// Restricts a string parameter to the given values.
    #[must_use]
    pub fn one_of<I, S>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allowed = Some(values.into_iter().map(Into::into).collect());
        self
    }

    /// Checks a present value against this property.
    fn check(&self, name: &str, value: &Value) -> Result<(), ValidationError> {
        if !self.param_type.matches(value) {
            return Err(ValidationError::TypeMismatch {
                name: name.to_string(),
                expected: self.param_type,
                actual: json_type_name(value),
            });
        }

        if let (Some(allowed), Value::String(s)) = (&self.allowed, value) {
            if !allowed.iter().any(|a| a == s) {
                return Err(ValidationError::NotAllowed {
                    name: name.to_string(),
                    value: s.clone(),
                    allowed: allowed.clone(),
                });
            }
        }

        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
enum SchemaKind {
    Object,
}

/// Schema of a tool's argument object.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InputSchema {
    #[serde(rename = "type")]
    kind: SchemaKind,
    properties: IndexMap<String, PropertySchema>,
    required: Vec<String>,
    additional_properties: bool,
}

impl Default for InputSchema {
    fn default() -> Self {
        Self::new()
    }
}

impl InputSchema {
    /// Creates an empty schema that accepts unknown properties.
    #[must_use]
    pub fn new() -> Self {
        Self {
            kind: SchemaKind::Object,
            properties: IndexMap::new(),
            required: Vec::new(),
            additional_properties: true,
        }
    }

    /// Declares an optional parameter. Redeclaring a name replaces it in place.
    #[must_use]
    pub fn property(mut self, name: impl Into<String>, schema: PropertySchema) -> Self {
        self.properties.insert(name.into(), schema);
        self
    }

    /// Declares a required parameter.
    #[must_use]
    pub fn required(mut self, name: impl Into<String>, schema: PropertySchema) -> Self {
        let name = name.into();
        if !self.required.contains(&name) {
            self.required.push(name.clone());
        }
        self.properties.insert(name, schema);
        self
    }

    /// Rejects arguments that are not declared properties.
    #[must_use]
    pub fn deny_unknown(mut self) -> Self {
        self.additional_properties = false;
        self
    }

    /// Declared properties, in declaration order.
    #[must_use]
    pub const fn properties(&self) -> &IndexMap<String, PropertySchema> {
        &self.properties
    }

    /// Names of the required parameters, in declaration order.
    #[must_use]
    pub fn required_names(&self) -> &[String] {
        &self.required
    }

    /// Returns `true` if arguments outside the declared properties are accepted.
    #[must_use]
    pub const fn allows_unknown(&self) -> bool {
        self.additional_properties
    }

    /// Validates raw arguments and fills in defaults.
    ///
    /// `null` is treated as an empty argument object. Checks run in a fixed
    /// order: shape, required names, unknown names, then per-value type and
    /// enum membership.
    ///
    /// # Errors
    ///
    /// Returns the first [`ValidationError`] found.
    pub fn validate(&self, arguments: &Value) -> Result<Map<String, Value>, ValidationError> {
        let mut args = match arguments {
            Value::Null => Map::new(),
            Value::Object(obj) => obj.clone(),
            other => {
                return Err(ValidationError::NotAnObject {
                    actual: json_type_name(other),
                })
            }
        };

        if let Some(missing) = self
            .required
            .iter()
            .find(|name| args.get(name.as_str()).map_or(true, Value::is_null))
        {
            return Err(ValidationError::MissingRequired {
                name: missing.clone(),
            });
        }

        if !self.additional_properties {
            if let Some(unknown) = args.keys().find(|k| !self.properties.contains_key(k.as_str())) {
                return Err(ValidationError::UnknownParameter {
                    name: unknown.clone(),
                });
            }
        }

        for (name, value) in &args {
            if let Some(prop) = self.properties.get(name.as_str()) {
                prop.check(name, value)?;
            }
        }

        for (name, prop) in &self.properties {
            if let Some(default) = &prop.default {
                if !args.contains_key(name.as_str()) {
                    args.insert(name.clone(), default.clone());
                }
            }
        }

        Ok(args)
    }

    /// Checks the schema's own consistency.
    ///
    /// # Errors
    ///
    /// Returns a description of the first problem: a required name with no
    /// property, a default of the wrong type, or a default outside the enum.
    pub fn check_consistency(&self) -> Result<(), String> {
        if let Some(name) = self
            .required
            .iter()
            .find(|name| !self.properties.contains_key(name.as_str()))
        {
            return Err(format!("required parameter '{name}' is not a declared property"));
        }

        for (name, prop) in &self.properties {
            if let Some(default) = &prop.default {
                prop.check(name, default)
                    .map_err(|e| format!("invalid default: {e}"))?;
            }
            if prop.allowed.is_some() && prop.param_type != ParamType::String {
                return Err(format!("parameter '{name}': enum is only supported on strings"));
            }
        }

        Ok(())
    }
}

/// Reasons an argument object fails validation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// The arguments were not a JSON object.
    #[error("arguments must be an object, got {actual}")]
    NotAnObject {
        /// JSON type that was received.
        actual: &'static str,
    },

    /// A required parameter is absent or `null`.
    #[error("missing required parameter: {name}")]
    MissingRequired {
        /// Parameter name.
        name: String,
    },

    /// A parameter not declared by the schema.
    #[error("unknown parameter: {name}")]
    UnknownParameter {
        /// Parameter name.
        name: String,
    },

    /// A parameter of the wrong JSON type.
    #[error("parameter '{name}' must be of type {expected}, got {actual}")]
    TypeMismatch {
        /// Parameter name.
        name: String,
        /// Declared type.
        expected: ParamType,
        /// JSON type that was received.
        actual: &'static str,
    },

    /// A string outside the enumerated values.
    #[error("parameter '{name}' must be one of [{}], got '{value}'", .allowed.join(", "))]
    NotAllowed {
        /// Parameter name.
        name: String,
        /// Value that was received.
        value: String,
        /// Allowed values.
        allowed: Vec<String>,
    },
}
