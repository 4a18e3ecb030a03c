//! Error types for editor-rpc-bridge.
//!
//! Component-level errors live next to their components
//! ([`HandlerError`](crate::rpc::HandlerError),
//! [`ExecutorError`](crate::host::ExecutorError),
//! [`TransportError`](crate::transport::TransportError)); this module holds
//! configuration errors and the top-level [`BridgeError`].

use std::path::PathBuf;

use thiserror::Error;

use crate::transport::TransportError;

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

/// Errors that stop the bridge server.
#[derive(Error, Debug)]
pub enum BridgeError {
    /// The configuration is invalid.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The listeners could not be started.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Signal handlers could not be installed.
    #[error("failed to install signal handler: {0}")]
    Signal(#[source] std::io::Error),

    /// The async runtime could not be built.
    #[error("failed to create async runtime: {0}")]
    Runtime(#[source] std::io::Error),
}
