//! Transport listeners.
//!
//! Four front ends share one shape: accept loop → per-connection loop →
//! decode → submit to the host thread → encode reply.
//!
//! | Transport   | Endpoint                       | Framing                         |
//! |-------------|--------------------------------|---------------------------------|
//! | HTTP        | `POST /mcp/rpc`                | one JSON body per request       |
//! | WebSocket   | `/mcp/events`                  | outbound event frames only      |
//! | Named pipe  | `\\.\pipe\<name>` (Windows)    | newline-delimited JSON          |
//! | Unix socket | filesystem path (POSIX)        | newline-delimited JSON          |
//!
//! No transport authenticates its callers. Every listener binds to a local
//! endpoint and any local process can reach it.

mod error;
pub mod http;
pub mod lines;
pub mod listeners;
#[cfg(windows)]
pub mod named_pipe;
#[cfg(unix)]
pub mod unix_socket;
pub mod websocket;

use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::BoxFuture;
use tokio::sync::watch;

use crate::events::EventBroadcaster;
use crate::host::RpcBridge;

pub use error::TransportError;
pub use listeners::TransportListeners;

/// Delay before retrying after a failed accept or pipe creation.
pub const ACCEPT_BACKOFF: Duration = Duration::from_millis(500);

/// How long connection tasks get to wind down after shutdown is signalled.
pub const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

/// Identifies a transport in logs and errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransportKind {
    /// HTTP request/response.
    Http,
    /// WebSocket event stream.
    WebSocket,
    /// Windows named pipe.
    NamedPipe,
    /// Unix domain socket.
    UnixSocket,
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Http => "HTTP",
            Self::WebSocket => "WebSocket",
            Self::NamedPipe => "named pipe",
            Self::UnixSocket => "Unix socket",
        })
    }
}

/// Shared services handed to every transport.
#[derive(Debug, Clone)]
pub struct TransportContext {
    /// Route to the dispatcher via the host thread.
    pub bridge: RpcBridge,
    /// Event fan-out for subscribers.
    pub broadcaster: Arc<EventBroadcaster>,
}

/// Resolves once shutdown has been requested.
#[derive(Debug, Clone)]
pub struct ShutdownSignal(watch::Receiver<bool>);

impl ShutdownSignal {
    /// Creates the trigger and its first receiver.
    #[must_use]
    pub fn channel() -> (watch::Sender<bool>, Self) {
        let (trigger, receiver) = watch::channel(false);
        (trigger, Self(receiver))
    }

    /// Waits until shutdown is requested or the trigger is dropped.
    ///
    /// Cancellation safe.
    pub async fn wait(&mut self) {
        while !*self.0.borrow_and_update() {
            if self.0.changed().await.is_err() {
                return;
            }
        }
    }

    /// Returns `true` once shutdown has been requested.
    #[must_use]
    pub fn is_triggered(&self) -> bool {
        *self.0.borrow()
    }
}

/// A bound listener that can be run to completion.
///
/// Implementations bind in their constructor, so a `Transport` value always
/// owns a live endpoint. `serve` runs until `shutdown` fires and must
/// release the endpoint and every connection task before returning.
pub trait Transport: Send + 'static {
    /// Which transport this is.
    fn kind(&self) -> TransportKind;

    /// Human-readable endpoint for logs.
    fn endpoint(&self) -> String;

    /// Bound socket address, for TCP-based transports.
    fn local_addr(&self) -> Option<SocketAddr> {
        None
    }

    /// Runs the accept loop until shutdown.
    fn serve(
        self: Box<Self>,
        context: TransportContext,
        shutdown: ShutdownSignal,
    ) -> BoxFuture<'static, Result<(), TransportError>>;
}
