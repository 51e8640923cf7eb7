//! Configuration structures for deserialisation.
//!
//! These structures map directly to the JSON configuration file format.

use std::time::Duration;

use serde::Deserialize;

use crate::error::ConfigError;
use crate::mcp::server::MIN_PORT;

/// Log levels accepted in `logging.level`.
pub const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Root configuration structure.
///
/// This is the top-level structure that matches the JSON config file.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Optional JSON schema reference (ignored during parsing).
    #[serde(rename = "$schema", default)]
    _schema: Option<String>,

    /// Optional comment field (ignored during parsing).
    #[serde(rename = "_comment", default)]
    _comment: Option<String>,

    /// HTTP server settings.
    #[serde(default)]
    pub server: ServerConfig,

    /// Mock automation backend settings.
    #[serde(default)]
    pub automation: AutomationConfig,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if any validation checks fail.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.port < MIN_PORT {
            return Err(invalid(format!(
                "Invalid server port {}. Must be between {MIN_PORT} and 65535",
                self.server.port
            )));
        }

        for (name, value) in [
            ("startup_timeout_ms", self.server.startup_timeout_ms),
            ("shutdown_grace_ms", self.server.shutdown_grace_ms),
            ("call_timeout_ms", self.server.call_timeout_ms),
        ] {
            if value == 0 {
                return Err(invalid(format!("server.{name} must be greater than zero")));
            }
        }

        if self.automation.screen_width == 0 || self.automation.screen_height == 0 {
            return Err(invalid("automation screen dimensions must be greater than zero"));
        }

        if !LOG_LEVELS.contains(&self.logging.level.as_str()) {
            return Err(invalid(format!(
                "Invalid log level '{}'. Must be one of: {}",
                self.logging.level,
                LOG_LEVELS.join(", ")
            )));
        }

        Ok(())
    }
}

fn invalid(message: impl Into<String>) -> ConfigError {
    ConfigError::ValidationError {
        message: message.into(),
    }
}

/// HTTP server configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServerConfig {
    /// Loopback port to listen on.
    #[serde(default = "default_port")]
    pub port: u16,

    /// How long `start` may take, in milliseconds.
    #[serde(default = "default_startup_timeout_ms")]
    pub startup_timeout_ms: u64,

    /// How long `stop` waits for in-flight requests, in milliseconds.
    #[serde(default = "default_shutdown_grace_ms")]
    pub shutdown_grace_ms: u64,

    /// Upper bound on a single tool call, in milliseconds.
    #[serde(default = "default_call_timeout_ms")]
    pub call_timeout_ms: u64,
}

impl ServerConfig {
    /// Startup timeout as a [`Duration`].
    #[must_use]
    pub const fn startup_timeout(&self) -> Duration {
        Duration::from_millis(self.startup_timeout_ms)
    }

    /// Shutdown grace period as a [`Duration`].
    #[must_use]
    pub const fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }

    /// Per-call timeout as a [`Duration`].
    #[must_use]
    pub const fn call_timeout(&self) -> Duration {
        Duration::from_millis(self.call_timeout_ms)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            startup_timeout_ms: default_startup_timeout_ms(),
            shutdown_grace_ms: default_shutdown_grace_ms(),
            call_timeout_ms: default_call_timeout_ms(),
        }
    }
}

const fn default_port() -> u16 {
    8765
}

const fn default_startup_timeout_ms() -> u64 {
    5000
}

const fn default_shutdown_grace_ms() -> u64 {
    3000
}

const fn default_call_timeout_ms() -> u64 {
    30_000
}

/// Mock automation backend configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AutomationConfig {
    /// Simulated latency of every action, in milliseconds.
    #[serde(default = "default_latency_ms")]
    pub latency_ms: u64,

    /// Simulated time to connect, in milliseconds.
    #[serde(default)]
    pub connect_delay_ms: u64,

    /// Reported screen width in points.
    #[serde(default = "default_screen_width")]
    pub screen_width: u32,

    /// Reported screen height in points.
    #[serde(default = "default_screen_height")]
    pub screen_height: u32,

    /// Reported foreground application.
    #[serde(default = "default_foreground_app")]
    pub foreground_app: String,
}

impl Default for AutomationConfig {
    fn default() -> Self {
        Self {
            latency_ms: default_latency_ms(),
            connect_delay_ms: 0,
            screen_width: default_screen_width(),
            screen_height: default_screen_height(),
            foreground_app: default_foreground_app(),
        }
    }
}

const fn default_latency_ms() -> u64 {
    150
}

const fn default_screen_width() -> u32 {
    1170
}

const fn default_screen_height() -> u32 {
    2532
}

fn default_foreground_app() -> String {
    "com.example.host".to_string()
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "warn".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_minimal_config() {
        let json = r"{}";
        let config: Config = serde_json::from_str(json).unwrap();
        assert!(config.validate().is_ok());
        assert_eq!(config.server.port, 8765);
    }

    #[test]
    fn parse_full_config() {
        let json = r#"{
            "$schema": "https://json-schema.org/draft/2020-12/schema",
            "_comment": "Test config",
            "server": {
                "port": 12345,
                "startup_timeout_ms": 1000,
                "shutdown_grace_ms": 250,
                "call_timeout_ms": 2000
            },
            "automation": {
                "latency_ms": 0,
                "connect_delay_ms": 10,
                "screen_width": 390,
                "screen_height": 844,
                "foreground_app": "com.example.demo"
            },
            "logging": {
                "level": "debug"
            }
        }"#;

        let config: Config = serde_json::from_str(json).unwrap();
        assert!(config.validate().is_ok());
        assert_eq!(config.server.port, 12345);
        assert_eq!(config.server.shutdown_grace(), Duration::from_millis(250));
        assert_eq!(config.automation.screen_width, 390);
        assert_eq!(config.automation.foreground_app, "com.example.demo");
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn server_config_defaults() {
        let config = ServerConfig::default();
        assert_eq!(config.port, 8765);
        assert_eq!(config.startup_timeout(), Duration::from_secs(5));
        assert_eq!(config.shutdown_grace(), Duration::from_secs(3));
        assert_eq!(config.call_timeout(), Duration::from_secs(30));
    }

    #[test]
    fn automation_config_defaults() {
        let config = AutomationConfig::default();
        assert_eq!(config.latency_ms, 150);
        assert_eq!(config.connect_delay_ms, 0);
        assert_eq!((config.screen_width, config.screen_height), (1170, 2532));
    }

    #[test]
    fn logging_config_defaults() {
        let config = LoggingConfig::default();
        assert_eq!(config.level, "warn");
    }

    #[test]
    fn reject_privileged_port() {
        let config: Config = serde_json::from_str(r#"{"server": {"port": 80}}"#).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn reject_out_of_range_port_at_parse_time() {
        let result: Result<Config, _> = serde_json::from_str(r#"{"server": {"port": 70000}}"#);
        assert!(result.is_err());
    }

    #[test]
    fn reject_zero_timeouts() {
        for field in ["startup_timeout_ms", "shutdown_grace_ms", "call_timeout_ms"] {
            let json = format!(r#"{{"server": {{"{field}": 0}}}}"#);
            let config: Config = serde_json::from_str(&json).unwrap();
            let err = config.validate().unwrap_err();
            assert!(err.to_string().contains(field), "{field}");
        }
    }

    #[test]
    fn reject_empty_screen() {
        let config: Config =
            serde_json::from_str(r#"{"automation": {"screen_width": 0}}"#).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn reject_unknown_log_level() {
        let config: Config = serde_json::from_str(r#"{"logging": {"level": "loud"}}"#).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn reject_unknown_fields() {
        let json = r#"{
            "unknown_field": "value"
        }"#;

        let result: Result<Config, _> = serde_json::from_str(json);
        assert!(result.is_err());
    }
}
