//! HTTP transport: `POST /mcp/rpc` with a JSON-RPC body.

use std::net::SocketAddr;

use axum::{
    body::Bytes,
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::post,
    Router,
};
use futures_util::future::BoxFuture;
use tokio::net::TcpListener;

use crate::host::RpcBridge;
use crate::rpc::RpcResponse;
use crate::transport::{
    ShutdownSignal, Transport, TransportContext, TransportError, TransportKind,
};

/// Path served by the HTTP transport.
pub const RPC_PATH: &str = "/mcp/rpc";

/// Builds the axum `Router` for the RPC endpoint.
///
/// Methods other than `POST` receive `405 Method Not Allowed`.
pub fn build_router(bridge: RpcBridge) -> Router {
    Router::new()
        .route(RPC_PATH, post(handle_rpc))
        .with_state(bridge)
}

async fn handle_rpc(State(bridge): State<RpcBridge>, body: Bytes) -> Response {
    let response = match String::from_utf8(body.to_vec()) {
        Ok(body) => bridge.submit(body).await,
        Err(e) => RpcResponse::parse_error(format!("request body is not valid UTF-8: {e}")).to_json(),
    };

    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "application/json")],
        response,
    )
        .into_response()
}

/// A bound HTTP listener.
#[derive(Debug)]
pub struct HttpTransport {
    listener: TcpListener,
    addr: SocketAddr,
}

impl HttpTransport {
    /// Binds the listener.
    ///
    /// # Errors
    ///
    /// Returns an error if the address cannot be bound.
    pub async fn bind(addr: SocketAddr) -> Result<Self, TransportError> {
        let bind_error = |source| TransportError::Bind {
            transport: TransportKind::Http,
            endpoint: addr.to_string(),
            source,
        };
        let listener = TcpListener::bind(addr).await.map_err(bind_error)?;
        let addr = listener.local_addr().map_err(bind_error)?;
        Ok(Self { listener, addr })
    }
}

impl Transport for HttpTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::Http
    }

    fn endpoint(&self) -> String {
        format!("http://{}{RPC_PATH}", self.addr)
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
            let router = build_router(context.bridge);
            // axum logs and backs off on accept errors internally.
            axum::serve(listener, router)
                .with_graceful_shutdown(async move { shutdown.wait().await })
                .await
                .map_err(|source| TransportError::Serve {
                    transport: TransportKind::Http,
                    source,
                })?;
            tracing::debug!(addr = %addr, "HTTP listener stopped");
            Ok(())
        })
    }
}
