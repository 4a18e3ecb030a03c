//! Bridge server lifecycle.
//!
//! [`BridgeServer`] wires the dispatcher, event broadcaster, progress
//! tracker and host executor together and owns the transport listeners.
//! Construction hands back the [`MainLoop`], which the embedding application
//! runs on its own main thread.

use std::net::SocketAddr;
use std::sync::Arc;

use serde_json::json;

use crate::config::Config;
use crate::controllers::{self, demo::DemoState};
use crate::error::BridgeError;
use crate::events::EventBroadcaster;
use crate::host::{MainLoop, MainThreadExecutor, RpcBridge};
use crate::progress::ProgressTracker;
use crate::rpc::Dispatcher;
use crate::transport::{TransportContext, TransportKind, TransportListeners};

/// Event published once every listener is up.
pub const STARTED_EVENT: &str = "bridge.started";

/// Event published when the listeners are stopped.
pub const STOPPED_EVENT: &str = "bridge.stopped";

/// Server lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerState {
    /// Built, listeners not started.
    Created,
    /// Listeners are serving.
    Running,
    /// Listeners have been stopped.
    Stopped,
}

/// The RPC bridge: every service plus the listeners in front of them.
#[derive(Debug)]
pub struct BridgeServer {
    config: Config,
    state: ServerState,
    dispatcher: Arc<Dispatcher>,
    broadcaster: Arc<EventBroadcaster>,
    progress: Arc<ProgressTracker>,
    bridge: RpcBridge,
    listeners: Option<TransportListeners>,
}

impl BridgeServer {
    /// Builds the services and registers the built-in controllers.
    ///
    /// The returned [`MainLoop`] must be run on the thread that owns the
    /// host's state; it finishes once the server is dropped.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::Config`] if `config` fails validation.
    pub fn new(config: Config) -> Result<(Self, MainLoop), BridgeError> {
        config.validate()?;

        let dispatcher = Arc::new(Dispatcher::new());
        let broadcaster = Arc::new(EventBroadcaster::new(
            config.events.history_capacity,
            config.events.client_buffer,
        ));
        let progress = Arc::new(ProgressTracker::new(Arc::clone(&broadcaster)));
        let (executor, main_loop) = MainThreadExecutor::new(config.executor.queue_capacity);

        controllers::register_builtin(
            &dispatcher,
            &broadcaster,
            &progress,
            config.progress.retention(),
        );

        let bridge = RpcBridge::new(Arc::clone(&dispatcher), executor);
        let server = Self {
            config,
            state: ServerState::Created,
            dispatcher,
            broadcaster,
            progress,
            bridge,
            listeners: None,
        };
        Ok((server, main_loop))
    }

    /// Registers the demonstration controllers and returns their state.
    pub fn register_demo_controllers(&self) -> Arc<DemoState> {
        let state = Arc::new(DemoState::default());
        controllers::demo::register(&self.dispatcher, &self.broadcaster, &self.progress, &state);
        state
    }

    /// Returns the current server state.
    #[must_use]
    pub const fn state(&self) -> ServerState {
        self.state
    }

    /// Returns the configuration the server was built with.
    #[must_use]
    pub const fn config(&self) -> &Config {
        &self.config
    }

    /// Returns the method registry.
    #[must_use]
    pub const fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }

    /// Returns the event broadcaster.
    #[must_use]
    pub const fn broadcaster(&self) -> &Arc<EventBroadcaster> {
        &self.broadcaster
    }

    /// Returns the progress tracker.
    #[must_use]
    pub const fn progress(&self) -> &Arc<ProgressTracker> {
        &self.progress
    }

    /// Returns the route onto the host thread.
    #[must_use]
    pub const fn bridge(&self) -> &RpcBridge {
        &self.bridge
    }

    /// Returns the host executor.
    #[must_use]
    pub const fn executor(&self) -> &MainThreadExecutor {
        self.bridge.executor()
    }

    /// Bound HTTP address while running.
    #[must_use]
    pub fn http_addr(&self) -> Option<SocketAddr> {
        self.listeners.as_ref().and_then(TransportListeners::http_addr)
    }

    /// Bound WebSocket address while running.
    #[must_use]
    pub fn ws_addr(&self) -> Option<SocketAddr> {
        self.listeners.as_ref().and_then(TransportListeners::ws_addr)
    }

    /// Endpoints currently being served.
    #[must_use]
    pub fn endpoints(&self) -> Vec<(TransportKind, String)> {
        self.listeners
            .as_ref()
            .map(TransportListeners::endpoints)
            .unwrap_or_default()
    }

    /// Binds and starts every enabled listener.
    ///
    /// Does nothing if the server is already running.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::Transport`] if no listener could be started.
    pub async fn start(&mut self) -> Result<(), BridgeError> {
        if self.state == ServerState::Running {
            return Ok(());
        }

        let context = TransportContext {
            bridge: self.bridge.clone(),
            broadcaster: Arc::clone(&self.broadcaster),
        };
        let listeners = TransportListeners::start(&self.config, context).await?;

        tracing::warn!(
            bind_address = %self.config.bind_address,
            "No caller authentication is enforced; any local process can invoke methods"
        );

        let endpoints: Vec<_> = listeners
            .endpoints()
            .into_iter()
            .map(|(kind, endpoint)| json!({ "transport": kind.to_string(), "endpoint": endpoint }))
            .collect();
        self.listeners = Some(listeners);
        self.state = ServerState::Running;

        tracing::info!(listeners = endpoints.len(), "Bridge server started");
        self.broadcaster
            .publish(STARTED_EVENT, json!({ "listeners": endpoints }));
        Ok(())
    }

    /// Stops every listener and waits for them to finish.
    ///
    /// Safe to call more than once, and before [`start`](Self::start).
    pub async fn stop(&mut self) {
        let Some(mut listeners) = self.listeners.take() else {
            return;
        };
        listeners.stop().await;
        self.state = ServerState::Stopped;
        self.broadcaster.publish(STOPPED_EVENT, json!({}));
        tracing::info!("Bridge server stopped");
    }

    /// Starts the listeners, waits for a termination signal, then stops.
    ///
    /// # Errors
    ///
    /// Returns an error if the listeners cannot start or signal handlers
    /// cannot be installed.
    pub async fn run_until_signal(&mut self) -> Result<(), BridgeError> {
        self.start().await?;
        let waited = wait_for_signal().await;
        self.stop().await;
        waited
    }
}

/// Waits for SIGINT or SIGTERM.
#[cfg(unix)]
async fn wait_for_signal() -> Result<(), BridgeError> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigint = signal(SignalKind::interrupt()).map_err(BridgeError::Signal)?;
    let mut sigterm = signal(SignalKind::terminate()).map_err(BridgeError::Signal)?;

    tokio::select! {
        _ = sigint.recv() => {
            tracing::info!("Received SIGINT, initiating graceful shutdown");
        }
        _ = sigterm.recv() => {
            tracing::info!("Received SIGTERM, initiating graceful shutdown");
        }
    }
    Ok(())
}

/// Waits for Ctrl+C.
#[cfg(not(unix))]
async fn wait_for_signal() -> Result<(), BridgeError> {
    tokio::signal::ctrl_c().await.map_err(BridgeError::Signal)?;
    tracing::info!("Received Ctrl+C, initiating graceful shutdown");
    Ok(())
}
