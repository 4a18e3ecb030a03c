//! Routes raw request bodies through the host thread to the dispatcher.

use std::sync::Arc;

use crate::host::executor::MainThreadExecutor;
use crate::rpc::{Dispatcher, RpcResponse};

/// What every transport holds: the dispatcher plus the way onto the host thread.
#[derive(Debug, Clone)]
pub struct RpcBridge {
    dispatcher: Arc<Dispatcher>,
    executor: MainThreadExecutor,
}

impl RpcBridge {
    /// Creates a bridge.
    #[must_use]
    pub const fn new(dispatcher: Arc<Dispatcher>, executor: MainThreadExecutor) -> Self {
        Self {
            dispatcher,
            executor,
        }
    }

    /// Returns the dispatcher.
    #[must_use]
    pub const fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }

    /// Returns the executor.
    #[must_use]
    pub const fn executor(&self) -> &MainThreadExecutor {
        &self.executor
    }

    /// Handles one request body on the host thread and returns the response body.
    ///
    /// Never fails: if the host thread is gone the caller receives a
    /// `-32603` response instead.
    pub async fn submit(&self, body: String) -> String {
        let dispatcher = Arc::clone(&self.dispatcher);
        match self.executor.run(move || dispatcher.handle(&body)).await {
            Ok(response) => response,
            Err(e) => {
                tracing::error!(error = %e, "Failed to marshal request onto host thread");
                RpcResponse::internal_error(None, e.to_string()).to_json()
            }
        }
    }
}
