//! Integration tests for the transport listeners.
//!
//! Each test binds real listeners on ephemeral ports (or a temporary socket
//! path), runs the host loop on its own thread, and talks to the bridge the
//! way an external tool would.

use std::collections::HashSet;
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use editor_rpc_bridge::config::Config;
use editor_rpc_bridge::events::EventBroadcaster;
use editor_rpc_bridge::host::{MainThreadExecutor, RpcBridge};
use editor_rpc_bridge::rpc::Dispatcher;
use editor_rpc_bridge::transport::http::{build_router, HttpTransport, RPC_PATH};
use editor_rpc_bridge::transport::websocket::{WebSocketTransport, EVENTS_PATH};
use editor_rpc_bridge::transport::{Transport, TransportContext, TransportListeners};
use editor_rpc_bridge::BridgeServer;
use futures_util::StreamExt;
use http::{Request, StatusCode};
use serde_json::{json, Value};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tower::ServiceExt;

fn loopback() -> SocketAddr {
    SocketAddr::from((Ipv4Addr::LOCALHOST, 0))
}

fn echo_context() -> (TransportContext, std::thread::JoinHandle<u64>) {
    let dispatcher = Arc::new(Dispatcher::new());
    dispatcher.register_method("demo.echo", |params| Ok(Value::Object(params)));
    let (executor, host) = MainThreadExecutor::spawn(32).expect("host thread");
    let context = TransportContext {
        bridge: RpcBridge::new(dispatcher, executor),
        broadcaster: Arc::new(EventBroadcaster::default()),
    };
    (context, host)
}

/// Sends one HTTP/1.1 POST and returns the decoded JSON body.
async fn http_post(addr: SocketAddr, body: &str) -> Value {
    let mut stream = TcpStream::connect(addr).await.expect("connect");
    let request = format!(
        "POST {RPC_PATH} HTTP/1.1\r\nHost: {addr}\r\nContent-Type: application/json\r\n\
         Content-Length: {}\r\nConnection: close\r\n\r\n{body}",
        body.len()
    );
    stream.write_all(request.as_bytes()).await.expect("write");

    let mut response = String::new();
    stream.read_to_string(&mut response).await.expect("read");
    let (head, payload) = response.split_once("\r\n\r\n").expect("header terminator");
    assert!(head.starts_with("HTTP/1.1 200"), "unexpected status: {head}");
    serde_json::from_str(payload).expect("JSON body")
}

// =============================================================================
// HTTP
// =============================================================================

#[tokio::test]
async fn test_router_echo() {
    let (context, _host) = echo_context();
    let router = build_router(context.bridge);

    let response = router
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(RPC_PATH)
                .header("content-type", "application/json")
                .body(Body::from(
                    r#"{"jsonrpc":"2.0","method":"demo.echo","params":{"x":1},"id":7}"#,
                ))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body, json!({"jsonrpc":"2.0","result":{"x":1},"id":7}));
}

#[tokio::test]
async fn test_router_rejects_get() {
    let (context, _host) = echo_context();
    let response = build_router(context.bridge)
        .oneshot(
            Request::builder()
                .method("GET")
                .uri(RPC_PATH)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
}

#[tokio::test]
async fn test_router_invalid_json_is_still_ok_status() {
    let (context, _host) = echo_context();
    let response = build_router(context.bridge)
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(RPC_PATH)
                .body(Body::from("{oops"))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body["error"]["code"], -32700);
    assert_eq!(body["id"], Value::Null);
}

#[tokio::test]
async fn test_http_listener_serves_and_stops() {
    let (context, host) = echo_context();
    let transport = HttpTransport::bind(loopback()).await.unwrap();
    let addr = transport.local_addr().unwrap();
    let mut listeners = TransportListeners::spawn(vec![Box::new(transport)], context);

    let out = http_post(addr, r#"{"jsonrpc":"2.0","method":"demo.echo","params":{"a":"b"},"id":1}"#).await;
    assert_eq!(out["result"], json!({"a":"b"}));

    listeners.stop().await;
    assert!(listeners.is_stopped());
    listeners.stop().await;

    assert!(TcpStream::connect(addr).await.is_err());
    drop(listeners);
    assert_eq!(host.join().unwrap(), 1);
}

// =============================================================================
// WebSocket
// =============================================================================

#[tokio::test]
async fn test_websocket_receives_published_events() {
    let (context, _host) = echo_context();
    let broadcaster = Arc::clone(&context.broadcaster);
    let transport = WebSocketTransport::bind(loopback()).await.unwrap();
    let addr = transport.local_addr().unwrap();
    let mut listeners = TransportListeners::spawn(vec![Box::new(transport)], context);

    let (mut socket, _) = tokio_tungstenite::connect_async(format!("ws://{addr}{EVENTS_PATH}"))
        .await
        .expect("handshake");

    tokio::time::timeout(Duration::from_secs(5), async {
        while broadcaster.subscriber_count() == 0 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("subscriber registered");

    assert_eq!(broadcaster.publish("document.saved", json!({"path": "a.txt"})), 1);

    let message = tokio::time::timeout(Duration::from_secs(5), socket.next())
        .await
        .expect("frame in time")
        .expect("stream open")
        .expect("valid frame");
    let frame: Value = serde_json::from_str(message.to_text().unwrap()).unwrap();
    assert_eq!(frame["type"], "event");
    assert_eq!(frame["event"], "document.saved");
    assert_eq!(frame["data"]["path"], "a.txt");
    assert!(frame["timestamp"].is_string());

    drop(socket);
    listeners.stop().await;
    assert_eq!(broadcaster.subscriber_count(), 0);
}

#[tokio::test]
async fn test_websocket_close_frame_unsubscribes() {
    let (context, _host) = echo_context();
    let broadcaster = Arc::clone(&context.broadcaster);
    let transport = WebSocketTransport::bind(loopback()).await.unwrap();
    let addr = transport.local_addr().unwrap();
    let mut listeners = TransportListeners::spawn(vec![Box::new(transport)], context);

    let (mut socket, _) = tokio_tungstenite::connect_async(format!("ws://{addr}{EVENTS_PATH}"))
        .await
        .expect("handshake");

    tokio::time::timeout(Duration::from_secs(5), async {
        while broadcaster.subscriber_count() == 0 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("subscriber registered");

    socket.close(None).await.expect("close frame sent");

    // The server answers the close and ends the stream.
    tokio::time::timeout(Duration::from_secs(5), async {
        while let Some(Ok(_)) = socket.next().await {}
    })
    .await
    .expect("server closed the socket");

    tokio::time::timeout(Duration::from_secs(5), async {
        while broadcaster.subscriber_count() > 0 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("subscriber removed while listener still running");

    assert!(!listeners.is_stopped());
    assert_eq!(broadcaster.publish("document.saved", json!({})), 0);

    listeners.stop().await;
}

#[tokio::test]
async fn test_websocket_rejects_other_paths() {
    let (context, _host) = echo_context();
    let transport = WebSocketTransport::bind(loopback()).await.unwrap();
    let addr = transport.local_addr().unwrap();
    let mut listeners = TransportListeners::spawn(vec![Box::new(transport)], context);

    let result = tokio_tungstenite::connect_async(format!("ws://{addr}/elsewhere")).await;
    assert!(result.is_err());

    listeners.stop().await;
}

// =============================================================================
// Unix Socket
// =============================================================================

#[cfg(unix)]
mod unix {
    use super::*;
    use editor_rpc_bridge::transport::unix_socket::UnixSocketTransport;
    use tokio::io::{AsyncBufReadExt, BufReader};
    use tokio::net::UnixStream;

    /// Sends one line and reads one line back.
    pub async fn line_call(path: &std::path::Path, body: &str) -> Value {
        let stream = UnixStream::connect(path).await.expect("connect");
        let (reader, mut writer) = stream.into_split();
        writer.write_all(body.as_bytes()).await.expect("write");
        writer.write_all(b"\n").await.expect("write");

        let mut line = String::new();
        BufReader::new(reader).read_line(&mut line).await.expect("read");
        serde_json::from_str(line.trim_end()).expect("JSON line")
    }

    #[tokio::test]
    async fn test_unix_socket_line_protocol() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bridge.sock");
        let (context, _host) = echo_context();
        let transport = UnixSocketTransport::bind(&path).unwrap();
        let mut listeners = TransportListeners::spawn(vec![Box::new(transport)], context);

        let out = line_call(&path, r#"{"jsonrpc":"2.0","method":"demo.echo","params":{"x":1},"id":7}"#).await;
        assert_eq!(out, json!({"jsonrpc":"2.0","result":{"x":1},"id":7}));

        let out = line_call(&path, "garbage").await;
        assert_eq!(out["error"]["code"], -32700);

        listeners.stop().await;
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_unix_socket_replaces_stale_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stale.sock");
        std::fs::write(&path, b"left over").unwrap();

        let transport = UnixSocketTransport::bind(&path).unwrap();
        assert_eq!(transport.path(), path.as_path());
    }
}

// =============================================================================
// Whole Server
// =============================================================================

#[cfg(unix)]
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_increments_across_transports_are_serialised() {
    const CALLS: usize = 40;

    let dir = tempfile::tempdir().unwrap();
    let socket_path = dir.path().join("bridge.sock");

    let mut config = Config::default();
    config.http.port = 0;
    config.websocket.enabled = false;
    config.ipc.socket_path.clone_from(&socket_path);

    let (mut server, main_loop) = BridgeServer::new(config).unwrap();
    let host = std::thread::spawn(move || main_loop.run());
    let demo = server.register_demo_controllers();
    server.start().await.unwrap();
    let http_addr = server.http_addr().unwrap();

    let mut calls = tokio::task::JoinSet::new();
    for n in 0..CALLS {
        let body = format!(r#"{{"jsonrpc":"2.0","method":"demo.increment","id":{n}}}"#);
        let socket_path = socket_path.clone();
        calls.spawn(async move {
            if n % 2 == 0 {
                http_post(http_addr, &body).await
            } else {
                unix::line_call(&socket_path, &body).await
            }
        });
    }

    let mut seen = HashSet::new();
    while let Some(out) = calls.join_next().await {
        let out = out.unwrap();
        let value = out["result"].as_u64().expect("counter value");
        assert!(seen.insert(value), "duplicate counter value {value}");
    }

    assert_eq!(seen.len(), CALLS);
    assert_eq!(demo.counter(), CALLS as u64);
    assert_eq!(seen.iter().max().copied(), Some(CALLS as u64));

    server.stop().await;
    assert!(!socket_path.exists());
    drop(server);
    assert_eq!(host.join().unwrap(), CALLS as u64);
}

#[tokio::test]
async fn test_server_answers_builtin_methods_over_http() {
    let mut config = Config::default();
    config.http.port = 0;
    config.websocket.port = 0;
    config.ipc.enabled = false;

    let (mut server, main_loop) = BridgeServer::new(config).unwrap();
    let host = std::thread::spawn(move || main_loop.run());
    server.register_demo_controllers();
    server.start().await.unwrap();
    let addr = server.http_addr().unwrap();

    let out = http_post(addr, r#"{"jsonrpc":"2.0","method":"system.ping","id":1}"#).await;
    assert_eq!(out["result"]["pong"], true);

    let out = http_post(addr, r#"{"jsonrpc":"2.0","method":"events.getRecent","id":2}"#).await;
    assert_eq!(out["result"][0]["name"], "bridge.started");

    let out = http_post(addr, r#"{"jsonrpc":"2.0","method":"demo.build","params":{"steps":2},"id":3}"#).await;
    let id = out["result"]["operationId"].as_str().unwrap().to_string();
    let body = format!(r#"{{"jsonrpc":"2.0","method":"progress.get","params":{{"operationId":"{id}"}},"id":4}}"#);
    let out = http_post(addr, &body).await;
    assert_eq!(out["result"]["status"], "completed");

    server.stop().await;
    drop(server);
    host.join().unwrap();
}
