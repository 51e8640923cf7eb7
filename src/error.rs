//! Error types for device-automation-mcp.
//!
//! Errors that can reach an HTTP client live next to the protocol code in
//! [`crate::mcp`]. The types here are reported to the host process only.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::automation::AutomationError;

/// Errors that can occur during configuration operations.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Configuration file could not be read.
    #[error("failed to read configuration file: {path}")]
    ReadError {
        /// Path to the configuration file.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// Configuration file could not be parsed.
    #[error("failed to parse configuration file: {path}")]
    ParseError {
        /// Path to the configuration file.
        path: PathBuf,
        /// The underlying JSON error.
        #[source]
        source: serde_json::Error,
    },

    /// Configuration file not found.
    #[error("configuration file not found: {path}")]
    NotFound {
        /// Path where the configuration file was expected.
        path: PathBuf,
    },

    /// Configuration validation failed.
    #[error("configuration validation failed: {message}")]
    ValidationError {
        /// Description of the validation failure.
        message: String,
    },
}

/// Errors returned by server lifecycle operations.
#[derive(Error, Debug)]
pub enum ServerError {
    /// `start` was called while a server is already up.
    #[error("server is already running on port {port}")]
    AlreadyRunning {
        /// Port of the running server.
        port: u16,
    },

    /// The port is outside the unprivileged range.
    #[error("invalid port {port}: must be between 1024 and 65535")]
    InvalidPort {
        /// Rejected port.
        port: u16,
    },

    /// Startup did not finish in time.
    #[error("server did not start within {} ms", .timeout.as_millis())]
    StartupTimeout {
        /// The timeout that expired.
        timeout: Duration,
    },

    /// The listener could not be bound.
    #[error("failed to bind {addr}")]
    Bind {
        /// Address we tried to bind.
        addr: SocketAddr,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// The automation backend failed to come up.
    #[error("automation backend setup failed")]
    Setup(#[source] AutomationError),
}
