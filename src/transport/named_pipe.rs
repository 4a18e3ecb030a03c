//! Named pipe transport (Windows).
//!
//! Serves one client at a time on a fixed pipe name. When a client
//! disconnects or the pipe breaks, the instance is torn down and a fresh
//! one is created for the next client.

use futures_util::future::BoxFuture;
use tokio::net::windows::named_pipe::{NamedPipeServer, ServerOptions};

use crate::transport::lines;
use crate::transport::{
    ShutdownSignal, Transport, TransportContext, TransportError, TransportKind, ACCEPT_BACKOFF,
};

/// A named pipe listener with one pending instance.
#[derive(Debug)]
pub struct NamedPipeTransport {
    name: String,
    server: NamedPipeServer,
}

impl NamedPipeTransport {
    /// Creates the first pipe instance.
    ///
    /// # Errors
    ///
    /// Returns an error if the pipe cannot be created, e.g. because another
    /// process already owns the name.
    pub fn bind(name: &str) -> Result<Self, TransportError> {
        let server = ServerOptions::new()
            .first_pipe_instance(true)
            .create(name)
            .map_err(|source| TransportError::Bind {
                transport: TransportKind::NamedPipe,
                endpoint: name.to_string(),
                source,
            })?;
        Ok(Self {
            name: name.to_string(),
            server,
        })
    }
}

impl Transport for NamedPipeTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::NamedPipe
    }

    fn endpoint(&self) -> String {
        self.name.clone()
    }

    fn serve(
        self: Box<Self>,
        context: TransportContext,
        mut shutdown: ShutdownSignal,
    ) -> BoxFuture<'static, Result<(), TransportError>> {
        let Self { name, server } = *self;
        Box::pin(async move {
            let mut server = Some(server);

            while !shutdown.is_triggered() {
                let Some(instance) = server.take() else {
                    // Relisten with a fresh instance.
                    match ServerOptions::new().create(&name) {
                        Ok(instance) => server = Some(instance),
                        Err(e) => {
                            tracing::warn!(pipe = %name, error = %e, "Failed to create pipe instance");
                            tokio::select! {
                                () = shutdown.wait() => {}
                                () = tokio::time::sleep(ACCEPT_BACKOFF) => {}
                            }
                        }
                    }
                    continue;
                };

                let connected = tokio::select! {
                    () = shutdown.wait() => break,
                    connected = instance.connect() => connected,
                };

                match connected {
                    Ok(()) => {
                        tracing::debug!(pipe = %name, "Pipe client connected");
                        match lines::serve_connection(instance, &context.bridge, &mut shutdown).await {
                            Ok(answered) => tracing::debug!(pipe = %name, answered, "Pipe client disconnected"),
                            Err(e) => tracing::warn!(pipe = %name, error = %e, "Pipe connection failed"),
                        }
                    }
                    Err(e) => {
                        tracing::warn!(pipe = %name, error = %e, "Pipe connect failed");
                        tokio::select! {
                            () = shutdown.wait() => {}
                            () = tokio::time::sleep(ACCEPT_BACKOFF) => {}
                        }
                    }
                }
            }

            tracing::debug!(pipe = %name, "Named pipe listener stopped");
            Ok(())
        })
    }
}
