//! Starting and stopping the full listener set.

use std::net::SocketAddr;

use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::config::Config;
use crate::transport::http::HttpTransport;
use crate::transport::websocket::WebSocketTransport;
use crate::transport::{
    ShutdownSignal, Transport, TransportContext, TransportError, TransportKind, SHUTDOWN_GRACE,
};

struct Running {
    kind: TransportKind,
    endpoint: String,
    task: JoinHandle<()>,
}

/// Every transport the bridge is serving, started and stopped together.
pub struct TransportListeners {
    trigger: watch::Sender<bool>,
    running: Vec<Running>,
    http_addr: Option<SocketAddr>,
    ws_addr: Option<SocketAddr>,
}

impl TransportListeners {
    /// Binds every transport enabled in `config` and starts serving.
    ///
    /// A transport that fails to bind is logged and left out; the others
    /// still start.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::NoneAvailable`] if no transport could be
    /// started.
    pub async fn start(config: &Config, context: TransportContext) -> Result<Self, TransportError> {
        let mut transports = Vec::new();
        for bound in bind_all(config).await {
            match bound {
                Ok(transport) => transports.push(transport),
                Err(e) => tracing::error!(error = %e, "Transport disabled"),
            }
        }

        if transports.is_empty() {
            return Err(TransportError::NoneAvailable);
        }
        Ok(Self::spawn(transports, context))
    }

    /// Starts serving already-bound transports.
    #[must_use]
    pub fn spawn(transports: Vec<Box<dyn Transport>>, context: TransportContext) -> Self {
        let (trigger, shutdown) = ShutdownSignal::channel();
        let mut listeners = Self {
            trigger,
            running: Vec::with_capacity(transports.len()),
            http_addr: None,
            ws_addr: None,
        };

        for transport in transports {
            let kind = transport.kind();
            let endpoint = transport.endpoint();
            match kind {
                TransportKind::Http => listeners.http_addr = transport.local_addr(),
                TransportKind::WebSocket => listeners.ws_addr = transport.local_addr(),
                TransportKind::NamedPipe | TransportKind::UnixSocket => {}
            }

            let serving = transport.serve(context.clone(), shutdown.clone());
            let task = tokio::spawn(async move {
                if let Err(e) = serving.await {
                    tracing::error!(transport = %kind, error = %e, "Listener exited with error");
                }
            });
            tracing::info!(transport = %kind, endpoint = %endpoint, "Listening");
            listeners.running.push(Running {
                kind,
                endpoint,
                task,
            });
        }

        listeners
    }

    /// Bound HTTP address, if the HTTP transport is running.
    #[must_use]
    pub const fn http_addr(&self) -> Option<SocketAddr> {
        self.http_addr
    }

    /// Bound WebSocket address, if the WebSocket transport is running.
    #[must_use]
    pub const fn ws_addr(&self) -> Option<SocketAddr> {
        self.ws_addr
    }

    /// The transports still being served, with their endpoints.
    #[must_use]
    pub fn endpoints(&self) -> Vec<(TransportKind, String)> {
        self.running
            .iter()
            .map(|r| (r.kind, r.endpoint.clone()))
            .collect()
    }

    /// Returns `true` once [`stop`](Self::stop) has completed.
    #[must_use]
    pub fn is_stopped(&self) -> bool {
        self.running.is_empty()
    }

    /// Signals every transport to stop and waits for them.
    ///
    /// Safe to call more than once.
    pub async fn stop(&mut self) {
        if self.running.is_empty() {
            return;
        }
        let _ = self.trigger.send(true);

        for running in self.running.drain(..) {
            let Running {
                kind, mut task, ..
            } = running;
            // Each listener drains its own connections within the grace
            // period; allow it that long plus a margin.
            match tokio::time::timeout(SHUTDOWN_GRACE * 2, &mut task).await {
                Ok(Ok(())) => tracing::debug!(transport = %kind, "Listener stopped"),
                Ok(Err(e)) => tracing::error!(transport = %kind, error = %e, "Listener task failed"),
                Err(_) => {
                    tracing::warn!(transport = %kind, "Listener did not stop in time, aborting");
                    task.abort();
                }
            }
        }
        tracing::info!("All listeners stopped");
    }
}

impl Drop for TransportListeners {
    fn drop(&mut self) {
        // Listeners notice the trigger even if stop() was never awaited.
        let _ = self.trigger.send(true);
    }
}

impl std::fmt::Debug for TransportListeners {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransportListeners")
            .field("endpoints", &self.endpoints())
            .finish_non_exhaustive()
    }
}

/// Binds every enabled transport, returning one result per attempt.
async fn bind_all(config: &Config) -> Vec<Result<Box<dyn Transport>, TransportError>> {
    let mut bound: Vec<Result<Box<dyn Transport>, TransportError>> = Vec::new();

    if config.http.enabled {
        let addr = SocketAddr::new(config.bind_address, config.http.port);
        bound.push(
            HttpTransport::bind(addr)
                .await
                .map(|t| Box::new(t) as Box<dyn Transport>),
        );
    }

    if config.websocket.enabled {
        let addr = SocketAddr::new(config.bind_address, config.websocket.port);
        bound.push(
            WebSocketTransport::bind(addr)
                .await
                .map(|t| Box::new(t) as Box<dyn Transport>),
        );
    }

    if config.ipc.enabled {
        bound.push(bind_ipc(config));
    }

    bound
}

#[cfg(unix)]
fn bind_ipc(config: &Config) -> Result<Box<dyn Transport>, TransportError> {
    crate::transport::unix_socket::UnixSocketTransport::bind(&config.ipc.socket_path)
        .map(|t| Box::new(t) as Box<dyn Transport>)
}

#[cfg(windows)]
fn bind_ipc(config: &Config) -> Result<Box<dyn Transport>, TransportError> {
    crate::transport::named_pipe::NamedPipeTransport::bind(&config.ipc.pipe_name)
        .map(|t| Box::new(t) as Box<dyn Transport>)
}

#[cfg(not(any(unix, windows)))]
fn bind_ipc(config: &Config) -> Result<Box<dyn Transport>, TransportError> {
    Err(TransportError::Bind {
        transport: TransportKind::UnixSocket,
        endpoint: config.ipc.socket_path.display().to_string(),
        source: std::io::Error::new(
            std::io::ErrorKind::Unsupported,
            "no local IPC transport on this platform",
        ),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::events::EventBroadcaster;
    use crate::host::{MainThreadExecutor, RpcBridge};
    use crate::rpc::Dispatcher;

    fn context() -> TransportContext {
        let (executor, _main_loop) = MainThreadExecutor::new(4);
        TransportContext {
            bridge: RpcBridge::new(Arc::new(Dispatcher::new()), executor),
            broadcaster: Arc::new(EventBroadcaster::default()),
        }
    }

    fn tcp_only() -> Config {
        let mut config = Config::default();
        config.http.port = 0;
        config.websocket.port = 0;
        config.ipc.enabled = false;
        config
    }

    #[tokio::test]
    async fn nothing_enabled_is_an_error() {
        let mut config = tcp_only();
        config.http.enabled = false;
        config.websocket.enabled = false;
        let err = TransportListeners::start(&config, context()).await.unwrap_err();
        assert!(matches!(err, TransportError::NoneAvailable));
    }

    #[tokio::test]
    async fn failed_bind_disables_only_that_transport() {
        let occupied = HttpTransport::bind(SocketAddr::from(([127, 0, 0, 1], 0)))
            .await
            .unwrap();
        let mut config = tcp_only();
        config.http.port = occupied.local_addr().unwrap().port();

        let mut listeners = TransportListeners::start(&config, context()).await.unwrap();
        assert!(listeners.http_addr().is_none());
        assert!(listeners.ws_addr().is_some());
        assert_eq!(listeners.endpoints().len(), 1);
        assert_eq!(listeners.endpoints()[0].0, TransportKind::WebSocket);

        listeners.stop().await;
    }

    #[tokio::test]
    async fn stop_is_idempotent() {
        let mut listeners = TransportListeners::start(&tcp_only(), context()).await.unwrap();
        assert_eq!(listeners.endpoints().len(), 2);
        assert!(!listeners.is_stopped());

        listeners.stop().await;
        assert!(listeners.is_stopped());
        listeners.stop().await;
        assert!(listeners.endpoints().is_empty());
    }
}
