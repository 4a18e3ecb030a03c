//! Configuration structures for deserialisation.
//!
//! These structures map directly to the JSON configuration file format.
//! Every field has a default, so `{}` is a valid configuration.

use std::net::{IpAddr, Ipv4Addr};
use std::path::PathBuf;

use serde::Deserialize;

use crate::error::ConfigError;

/// Root configuration structure.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Optional JSON schema reference (ignored during parsing).
    #[serde(rename = "$schema", default)]
    _schema: Option<String>,

    /// Optional comment field (ignored during parsing).
    #[serde(rename = "_comment", default)]
    _comment: Option<String>,

    /// Address the TCP listeners bind to.
    #[serde(default = "default_bind_address")]
    pub bind_address: IpAddr,

    /// HTTP transport settings.
    #[serde(default)]
    pub http: HttpConfig,

    /// WebSocket transport settings.
    #[serde(default)]
    pub websocket: WebSocketConfig,

    /// Local IPC transport settings.
    #[serde(default)]
    pub ipc: IpcConfig,

    /// Host thread work queue settings.
    #[serde(default)]
    pub executor: ExecutorConfig,

    /// Event history settings.
    #[serde(default)]
    pub events: EventsConfig,

    /// Progress tracking settings.
    #[serde(default)]
    pub progress: ProgressConfig,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            _schema: None,
            _comment: None,
            bind_address: default_bind_address(),
            http: HttpConfig::default(),
            websocket: WebSocketConfig::default(),
            ipc: IpcConfig::default(),
            executor: ExecutorConfig::default(),
            events: EventsConfig::default(),
            progress: ProgressConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Config {
    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if any validation checks fail.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.http.enabled
            && self.websocket.enabled
            && self.http.port != 0
            && self.http.port == self.websocket.port
        {
            return Err(ConfigError::ValidationError {
                message: format!(
                    "HTTP and WebSocket transports cannot share port {}",
                    self.http.port
                ),
            });
        }
        if self.executor.queue_capacity == 0 {
            return Err(ConfigError::ValidationError {
                message: "executor.queue_capacity must be at least 1".to_string(),
            });
        }
        if self.events.history_capacity == 0 || self.events.client_buffer == 0 {
            return Err(ConfigError::ValidationError {
                message: "events.history_capacity and events.client_buffer must be at least 1"
                    .to_string(),
            });
        }
        if self.ipc.enabled
            && (self.ipc.pipe_name.is_empty() || self.ipc.socket_path.as_os_str().is_empty())
        {
            return Err(ConfigError::ValidationError {
                message: "ipc.pipe_name and ipc.socket_path cannot be empty".to_string(),
            });
        }
        Ok(())
    }
}

const fn default_bind_address() -> IpAddr {
    IpAddr::V4(Ipv4Addr::LOCALHOST)
}

const fn default_true() -> bool {
    true
}

/// HTTP transport configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HttpConfig {
    /// Whether the HTTP listener starts.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// TCP port; `0` picks a free port.
    #[serde(default = "default_http_port")]
    pub port: u16,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            port: default_http_port(),
        }
    }
}

const fn default_http_port() -> u16 {
    8090
}

/// WebSocket transport configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WebSocketConfig {
    /// Whether the WebSocket listener starts.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// TCP port; `0` picks a free port.
    #[serde(default = "default_ws_port")]
    pub port: u16,
}

impl Default for WebSocketConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            port: default_ws_port(),
        }
    }
}

const fn default_ws_port() -> u16 {
    8091
}

/// Local IPC configuration.
///
/// Windows serves `pipe_name`; other platforms serve `socket_path`.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct IpcConfig {
    /// Whether the IPC listener starts.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Named pipe name.
    #[serde(default = "default_pipe_name")]
    pub pipe_name: String,

    /// Unix socket path.
    #[serde(default = "default_socket_path")]
    pub socket_path: PathBuf,
}

impl Default for IpcConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            pipe_name: default_pipe_name(),
            socket_path: default_socket_path(),
        }
    }
}

fn default_pipe_name() -> String {
    r"\\.\pipe\editor-rpc-bridge".to_string()
}

fn default_socket_path() -> PathBuf {
    std::env::temp_dir().join("editor-rpc-bridge.sock")
}

/// Host thread work queue configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ExecutorConfig {
    /// Maximum queued units of work before submitters wait.
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            queue_capacity: default_queue_capacity(),
        }
    }
}

const fn default_queue_capacity() -> usize {
    256
}

/// Event history configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EventsConfig {
    /// Number of events retained for polling.
    #[serde(default = "default_history_capacity")]
    pub history_capacity: usize,

    /// Frames buffered per subscriber before frames are dropped.
    #[serde(default = "default_client_buffer")]
    pub client_buffer: usize,
}

impl Default for EventsConfig {
    fn default() -> Self {
        Self {
            history_capacity: default_history_capacity(),
            client_buffer: default_client_buffer(),
        }
    }
}

const fn default_history_capacity() -> usize {
    crate::events::DEFAULT_HISTORY_CAPACITY
}

const fn default_client_buffer() -> usize {
    crate::events::DEFAULT_CLIENT_BUFFER
}

/// Progress tracking configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProgressConfig {
    /// Seconds a finished operation stays queryable.
    #[serde(default = "default_retention_secs")]
    pub retention_secs: u64,
}

impl Default for ProgressConfig {
    fn default() -> Self {
        Self {
            retention_secs: default_retention_secs(),
        }
    }
}

impl ProgressConfig {
    /// Retention window as a duration.
    #[must_use]
    pub const fn retention(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.retention_secs)
    }
}

const fn default_retention_secs() -> u64 {
    crate::progress::DEFAULT_RETENTION.as_secs()
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
