//! WebSocket transport: outbound event stream at `/mcp/events`.
//!
//! Subscribers receive every published event as a text frame shaped
//! `{"type":"event","event":..,"data":..,"timestamp":..}`. Inbound frames
//! are read only to notice a close; their content is ignored.

use std::net::SocketAddr;
use std::sync::Arc;

use futures_util::future::BoxFuture;
use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinSet;
use tokio_tungstenite::accept_hdr_async;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::StatusCode;
use tokio_tungstenite::tungstenite::Message;

use crate::events::EventBroadcaster;
use crate::transport::{
    ShutdownSignal, Transport, TransportContext, TransportError, TransportKind, ACCEPT_BACKOFF,
    SHUTDOWN_GRACE,
};

/// Path served by the WebSocket transport.
pub const EVENTS_PATH: &str = "/mcp/events";

/// A bound WebSocket listener.
#[derive(Debug)]
pub struct WebSocketTransport {
    listener: TcpListener,
    addr: SocketAddr,
}

impl WebSocketTransport {
    /// Binds the listener.
    ///
    /// # Errors
    ///
    /// Returns an error if the address cannot be bound.
    pub async fn bind(addr: SocketAddr) -> Result<Self, TransportError> {
        let bind_error = |source| TransportError::Bind {
            transport: TransportKind::WebSocket,
            endpoint: addr.to_string(),
            source,
        };
        let listener = TcpListener::bind(addr).await.map_err(bind_error)?;
        let addr = listener.local_addr().map_err(bind_error)?;
        Ok(Self { listener, addr })
    }
}

impl Transport for WebSocketTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::WebSocket
    }

    fn endpoint(&self) -> String {
        format!("ws://{}{EVENTS_PATH}", self.addr)
    }

    fn local_addr(&self) -> Option<SocketAddr> {
        Some(self.addr)
    }

    fn serve(
        self: Box<Self>,
        context: TransportContext,
        mut shutdown: ShutdownSignal,
    ) -> BoxFuture<'static, Result<(), TransportError>> {
        let Self { listener, addr } = *self;
        Box::pin(async move {
            let mut connections = JoinSet::new();

            loop {
                tokio::select! {
                    () = shutdown.wait() => break,

                    accepted = listener.accept() => match accepted {
                        Ok((stream, peer)) => {
                            connections.spawn(serve_subscriber(
                                stream,
                                peer,
                                Arc::clone(&context.broadcaster),
                                shutdown.clone(),
                            ));
                        }
                        Err(e) => {
                            tracing::warn!(error = %e, "WebSocket accept failed");
                            tokio::time::sleep(ACCEPT_BACKOFF).await;
                        }
                    },

                    Some(_) = connections.join_next(), if !connections.is_empty() => {}
                }
            }

            drop(listener);
            let drained = tokio::time::timeout(SHUTDOWN_GRACE, async {
                while connections.join_next().await.is_some() {}
            })
            .await;
            if drained.is_err() {
                tracing::warn!("WebSocket subscribers did not close in time, aborting");
                connections.shutdown().await;
            }

            tracing::debug!(addr = %addr, "WebSocket listener stopped");
            Ok(())
        })
    }
}

/// Rejects upgrade requests for any path other than [`EVENTS_PATH`].
#[allow(clippy::result_large_err)] // signature fixed by tungstenite's handshake callback
fn check_path(request: &Request, response: Response) -> Result<Response, ErrorResponse> {
    if request.uri().path() == EVENTS_PATH {
        return Ok(response);
    }
    let mut rejection = ErrorResponse::new(Some(format!(
        "no event stream at {}",
        request.uri().path()
    )));
    *rejection.status_mut() = StatusCode::NOT_FOUND;
    Err(rejection)
}

async fn serve_subscriber(
    stream: TcpStream,
    peer: SocketAddr,
    broadcaster: Arc<EventBroadcaster>,
    mut shutdown: ShutdownSignal,
) {
    let ws = match accept_hdr_async(stream, check_path).await {
        Ok(ws) => ws,
        Err(e) => {
            tracing::debug!(peer = %peer, error = %e, "WebSocket handshake failed");
            return;
        }
    };
    let (mut sink, mut inbound) = ws.split();
    let mut subscription = broadcaster.subscribe();
    tracing::info!(client = subscription.id, peer = %peer, "Event subscriber connected");

    loop {
        tokio::select! {
            () = shutdown.wait() => break,

            frame = subscription.frames.recv() => {
                let Some(frame) = frame else { break };
                if let Err(e) = sink.send(Message::text(frame)).await {
                    tracing::debug!(client = subscription.id, error = %e, "Send failed");
                    break;
                }
            }

            message = inbound.next() => match message {
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(Message::Ping(_))) => {
                    // Flush the pong tungstenite queued for us.
                    if sink.flush().await.is_err() {
                        break;
                    }
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    tracing::debug!(client = subscription.id, error = %e, "Receive failed");
                    break;
                }
            },
        }
    }

    subscription.close();
    broadcaster.unsubscribe(subscription.id);
    // Completes the close handshake, or starts it on shutdown.
    let _ = sink.close().await;
    tracing::info!(client = subscription.id, "Event subscriber disconnected");
}
