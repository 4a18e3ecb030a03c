//! Method registry and request dispatch.
//!
//! The [`Dispatcher`] owns the name→handler table and turns a raw request
//! body into a raw response body. It performs no I/O and never fails: every
//! parse, lookup, and handler fault is converted into a JSON-RPC error
//! response.

use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, PoisonError, RwLock};

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};
use thiserror::Error;

use crate::rpc::protocol::{parse_request, ErrorCode, RpcError, RpcResponse};

/// Failure raised by a method handler.
#[derive(Debug, Clone, Error)]
pub enum HandlerError {
    /// The params object could not be decoded into the handler's input
    /// type. Raised by [`Dispatcher::register_typed`] before the handler
    /// body runs; failures from inside a handler use [`Self::Failed`].
    #[error("invalid params: {0}")]
    InvalidParams(String),

    /// The handler ran and failed.
    #[error("{message}")]
    Failed {
        /// Human-readable description, returned as the error message.
        message: String,
        /// Optional diagnostic payload.
        data: Option<Value>,
    },
}

impl HandlerError {
    /// Creates a failure with only a message.
    #[must_use]
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed {
            message: message.into(),
            data: None,
        }
    }

    /// Creates a failure carrying diagnostic data.
    #[must_use]
    pub fn failed_with_data(message: impl Into<String>, data: Value) -> Self {
        Self::Failed {
            message: message.into(),
            data: Some(data),
        }
    }

    /// Fails with a descriptive message when a required field is absent.
    #[must_use]
    pub fn missing_field(field: &str) -> Self {
        Self::failed(format!("missing required field '{field}'"))
    }
}

/// Result type returned by handlers.
pub type HandlerResult = Result<Value, HandlerError>;

/// A registered method handler.
///
/// Handlers receive the request's params object and are always invoked on
/// the host thread.
pub type Handler = Arc<dyn Fn(Map<String, Value>) -> HandlerResult + Send + Sync>;

/// The method registry and JSON-RPC dispatcher.
#[derive(Default)]
pub struct Dispatcher {
    methods: RwLock<HashMap<String, Handler>>,
}

impl Dispatcher {
    /// Creates an empty dispatcher.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `handler` under `name`, replacing any previous handler.
    pub fn register_method<F>(&self, name: impl Into<String>, handler: F)
    where
        F: Fn(Map<String, Value>) -> HandlerResult + Send + Sync + 'static,
    {
        let name = name.into();
        let mut methods = self.methods.write().unwrap_or_else(PoisonError::into_inner);
        if methods.insert(name.clone(), Arc::new(handler)).is_some() {
            tracing::warn!(method = %name, "Method re-registered, previous handler replaced");
        } else {
            tracing::debug!(method = %name, "Method registered");
        }
    }

    /// Registers a handler with typed input and output.
    ///
    /// Params are decoded into `P` before the handler runs; a decode failure
    /// is answered with `-32602 Invalid params`. The handler's output is
    /// encoded back into JSON.
    pub fn register_typed<P, R, F>(&self, name: impl Into<String>, handler: F)
    where
        P: DeserializeOwned,
        R: Serialize,
        F: Fn(P) -> Result<R, HandlerError> + Send + Sync + 'static,
    {
        self.register_method(name, move |params| {
            let input: P = serde_json::from_value(Value::Object(params))
                .map_err(|e| HandlerError::InvalidParams(e.to_string()))?;
            let output = handler(input)?;
            serde_json::to_value(output)
                .map_err(|e| HandlerError::failed(format!("failed to encode result: {e}")))
        });
    }

    /// Removes a handler. Returns `true` if one was registered.
    pub fn unregister_method(&self, name: &str) -> bool {
        self.methods
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(name)
            .is_some()
    }

    /// Returns `true` if `name` has a handler.
    #[must_use]
    pub fn has_method(&self, name: &str) -> bool {
        self.methods
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(name)
    }

    /// Returns all registered method names, sorted.
    #[must_use]
    pub fn method_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .methods
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        names.sort();
        names
    }

    fn lookup(&self, name: &str) -> Option<Handler> {
        self.methods
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
    }

    /// Handles a raw request body and returns the raw response body.
    #[must_use]
    pub fn handle(&self, body: &str) -> String {
        self.handle_request(body).to_json()
    }

    /// Handles a raw request body and returns the structured response.
    #[must_use]
    pub fn handle_request(&self, body: &str) -> RpcResponse {
        let request = match parse_request(body) {
            Ok(request) => request,
            Err(response) => {
                tracing::debug!(
                    code = response.error().map_or(0, |e| e.code),
                    "Rejected malformed request"
                );
                return *response;
            }
        };

        let Some(handler) = self.lookup(&request.method) else {
            tracing::debug!(method = %request.method, "Unknown method");
            return RpcResponse::method_not_found(request.id, &request.method);
        };

        let method = request.method;
        let id = request.id;
        let params = request.params;

        // The registry lock is released before the handler runs, so handlers
        // may register further methods.
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| handler(params)));

        match outcome {
            Ok(Ok(result)) => RpcResponse::success(id, result),
            Ok(Err(HandlerError::InvalidParams(message))) => {
                tracing::warn!(method = %method, error = %message, "Invalid params");
                RpcResponse::invalid_params(id, message)
            }
            Ok(Err(HandlerError::Failed { message, data })) => {
                tracing::error!(method = %method, error = %message, data = ?data, "Handler failed");
                let data = data.unwrap_or_else(|| Value::String(message.clone()));
                RpcResponse::failure(
                    id,
                    RpcError::with_message(ErrorCode::ServerError, message).with_data(data),
                )
            }
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                tracing::error!(method = %method, error = %message, "Handler panicked");
                RpcResponse::failure(
                    id,
                    RpcError::with_message(ErrorCode::ServerError, message.clone())
                        .with_data(Value::String(format!("handler panicked: {message}"))),
                )
            }
        }
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("methods", &self.method_names())
            .finish()
    }
}

/// Extracts a readable message from a panic payload.
pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(ToString::to_string)
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rpc::protocol::RequestId;
    use serde::Deserialize;
    use serde_json::json;

    fn echo_dispatcher() -> Dispatcher {
        let dispatcher = Dispatcher::new();
        dispatcher.register_method("demo.echo", |params| Ok(Value::Object(params)));
        dispatcher
    }

    fn parse(body: &str) -> Value {
        serde_json::from_str(body).unwrap()
    }

    #[test]
    fn echo_round_trip() {
        let dispatcher = echo_dispatcher();
        let out = dispatcher.handle(r#"{"jsonrpc":"2.0","method":"demo.echo","params":{"x":1},"id":7}"#);
        assert_eq!(out, r#"{"jsonrpc":"2.0","result":{"x":1},"id":7}"#);
    }

    #[test]
    fn parse_error_has_null_id() {
        let out = parse(&echo_dispatcher().handle("{not json"));
        assert_eq!(out["error"]["code"], -32700);
        assert!(out["id"].is_null());
        assert!(out["error"]["data"].is_string());
    }

    #[test]
    fn unknown_method_echoes_id() {
        let out = parse(&echo_dispatcher().handle(r#"{"jsonrpc":"2.0","method":"nope","id":"x"}"#));
        assert_eq!(out["error"]["code"], -32601);
        assert_eq!(out["id"], "x");
    }

    #[test]
    fn last_registration_wins() {
        let dispatcher = Dispatcher::new();
        dispatcher.register_method("m", |_| Ok(json!("first")));
        dispatcher.register_method("m", |_| Ok(json!("second")));
        let out = parse(&dispatcher.handle(r#"{"jsonrpc":"2.0","method":"m","id":1}"#));
        assert_eq!(out["result"], "second");
        assert_eq!(dispatcher.method_names(), vec!["m".to_string()]);
    }

    #[test]
    fn failing_handler_maps_to_server_error() {
        let dispatcher = Dispatcher::new();
        dispatcher.register_method("scene.load", |_| Err(HandlerError::failed("scene is locked")));
        let out = parse(&dispatcher.handle(r#"{"jsonrpc":"2.0","method":"scene.load","id":3}"#));
        assert_eq!(out["error"]["code"], -32000);
        assert!(out["error"]["message"].as_str().unwrap().contains("scene is locked"));
        assert_eq!(out["error"]["data"], "scene is locked");
        assert_eq!(out["id"], 3);
    }

    #[test]
    fn panicking_handler_maps_to_server_error() {
        let dispatcher = Dispatcher::new();
        dispatcher.register_method("boom", |_| panic!("kaboom"));
        let resp = dispatcher.handle_request(r#"{"jsonrpc":"2.0","method":"boom","id":1}"#);
        let err = resp.error().unwrap();
        assert_eq!(err.code, -32000);
        assert!(err.message.contains("kaboom"));
        assert_eq!(resp.id, Some(RequestId::from(1)));

        // The dispatcher is still usable afterwards.
        dispatcher.register_method("ok", |_| Ok(Value::Bool(true)));
        let out = parse(&dispatcher.handle(r#"{"jsonrpc":"2.0","method":"ok","id":2}"#));
        assert_eq!(out["result"], true);
    }

    #[test]
    fn missing_field_from_handler_is_server_error() {
        let dispatcher = Dispatcher::new();
        dispatcher.register_method("file.open", |params| {
            let path = params
                .get("path")
                .and_then(Value::as_str)
                .ok_or_else(|| HandlerError::missing_field("path"))?;
            Ok(json!({ "opened": path }))
        });

        let out = parse(&dispatcher.handle(r#"{"jsonrpc":"2.0","method":"file.open","id":1}"#));
        assert_eq!(out["error"]["code"], -32000);
        assert_eq!(out["error"]["message"], "missing required field 'path'");
        assert_eq!(out["id"], 1);

        let out = parse(&dispatcher.handle(
            r#"{"jsonrpc":"2.0","method":"file.open","params":{"path":"a.txt"},"id":2}"#,
        ));
        assert_eq!(out["result"]["opened"], "a.txt");
    }

    #[test]
    fn missing_params_become_empty_object() {
        let out = parse(&echo_dispatcher().handle(r#"{"jsonrpc":"2.0","method":"demo.echo","id":1}"#));
        assert_eq!(out["result"], json!({}));
    }

    #[derive(Deserialize)]
    struct MoveParams {
        x: f64,
        y: f64,
    }

    #[test]
    fn typed_handler_decodes_params() {
        let dispatcher = Dispatcher::new();
        dispatcher.register_typed("object.move", |p: MoveParams| Ok(json!({"sum": p.x + p.y})));

        let out = parse(&dispatcher.handle(
            r#"{"jsonrpc":"2.0","method":"object.move","params":{"x":1.5,"y":2.0},"id":1}"#,
        ));
        assert_eq!(out["result"]["sum"], 3.5);

        let out = parse(&dispatcher.handle(
            r#"{"jsonrpc":"2.0","method":"object.move","params":{"x":1.5},"id":2}"#,
        ));
        assert_eq!(out["error"]["code"], -32602);
        assert!(out["error"]["message"].as_str().unwrap().contains('y'));
    }

    #[test]
    fn unregister_removes_handler() {
        let dispatcher = echo_dispatcher();
        assert!(dispatcher.has_method("demo.echo"));
        assert!(dispatcher.unregister_method("demo.echo"));
        assert!(!dispatcher.unregister_method("demo.echo"));
        let out = parse(&dispatcher.handle(r#"{"jsonrpc":"2.0","method":"demo.echo","id":1}"#));
        assert_eq!(out["error"]["code"], -32601);
    }

    #[test]
    fn notification_gets_null_id_response() {
        let out = parse(&echo_dispatcher().handle(r#"{"jsonrpc":"2.0","method":"demo.echo"}"#));
        assert!(out["id"].is_null());
        assert_eq!(out["result"], json!({}));
    }

    #[test]
    fn panic_message_extracts_strings() {
        let owned: Box<dyn std::any::Any + Send> = Box::new(String::from("owned"));
        assert_eq!(panic_message(owned.as_ref()), "owned");
        let other: Box<dyn std::any::Any + Send> = Box::new(42_u8);
        assert_eq!(panic_message(other.as_ref()), "unknown panic");
    }
}
