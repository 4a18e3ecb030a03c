//! Unix domain socket transport (POSIX).
//!
//! Binds a filesystem path, removing a stale socket file left by a previous
//! session first. Connections are served concurrently, each with
//! newline-delimited framing.

use std::path::{Path, PathBuf};

use futures_util::future::BoxFuture;
use tokio::net::UnixListener;
use tokio::task::JoinSet;

use crate::transport::lines;
use crate::transport::{
    ShutdownSignal, Transport, TransportContext, TransportError, TransportKind, ACCEPT_BACKOFF,
    SHUTDOWN_GRACE,
};

/// A bound Unix socket listener.
#[derive(Debug)]
pub struct UnixSocketTransport {
    listener: UnixListener,
    path: PathBuf,
}

impl UnixSocketTransport {
    /// Binds `path`, replacing any stale socket file.
    ///
    /// # Errors
    ///
    /// Returns an error if the stale file cannot be removed or the path
    /// cannot be bound.
    pub fn bind(path: &Path) -> Result<Self, TransportError> {
        let bind_error = |source| TransportError::Bind {
            transport: TransportKind::UnixSocket,
            endpoint: path.display().to_string(),
            source,
        };

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(bind_error)?;
            }
        }
        if path.exists() {
            tracing::debug!(path = %path.display(), "Removing stale socket file");
            std::fs::remove_file(path).map_err(bind_error)?;
        }

        let listener = UnixListener::bind(path).map_err(bind_error)?;
        Ok(Self {
            listener,
            path: path.to_path_buf(),
        })
    }

    /// The socket's filesystem path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Transport for UnixSocketTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::UnixSocket
    }

    fn endpoint(&self) -> String {
        self.path.display().to_string()
    }

    fn serve(
        self: Box<Self>,
        context: TransportContext,
        mut shutdown: ShutdownSignal,
    ) -> BoxFuture<'static, Result<(), TransportError>> {
        let Self { listener, path } = *self;
        Box::pin(async move {
            let mut connections = JoinSet::new();
            let mut next_connection: u64 = 0;

            loop {
                tokio::select! {
                    () = shutdown.wait() => break,

                    accepted = listener.accept() => match accepted {
                        Ok((stream, _addr)) => {
                            next_connection += 1;
                            let connection = next_connection;
                            let bridge = context.bridge.clone();
                            let mut shutdown = shutdown.clone();
                            connections.spawn(async move {
                                tracing::debug!(connection, "Unix socket client connected");
                                match lines::serve_connection(stream, &bridge, &mut shutdown).await {
                                    Ok(answered) => tracing::debug!(connection, answered, "Unix socket client disconnected"),
                                    Err(e) => tracing::warn!(connection, error = %e, "Unix socket connection failed"),
                                }
                            });
                        }
                        Err(e) => {
                            tracing::warn!(error = %e, "Unix socket accept failed");
                            tokio::time::sleep(ACCEPT_BACKOFF).await;
                        }
                    },

                    Some(_) = connections.join_next(), if !connections.is_empty() => {}
                }
            }

            drop(listener);
            if let Err(e) = std::fs::remove_file(&path) {
                tracing::debug!(path = %path.display(), error = %e, "Socket file already gone");
            }

            let drained = tokio::time::timeout(SHUTDOWN_GRACE, async {
                while connections.join_next().await.is_some() {}
            })
            .await;
            if drained.is_err() {
                tracing::warn!("Unix socket connections did not finish in time, aborting");
                connections.shutdown().await;
            }

            tracing::debug!(path = %path.display(), "Unix socket listener stopped");
            Ok(())
        })
    }
}
