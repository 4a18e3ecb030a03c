//! JSON-RPC 2.0 message types for the bridge.
//!
//! This module defines the envelope types exchanged over every transport.
//! Parsing is lenient about the shape of `id` and `params` so
//! that the dispatcher can recover as much of a broken request as possible
//! and always answer with a well-formed response.
//!
//! # Message Types
//!
//! - **Request**: carries an `id` that is echoed in the response
//! - **Notification**: no `id`; still answered with `id: null` so that
//!   line-framed transports stay in lockstep
//! - **Response**: exactly one of `result` or `error`

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// The JSON-RPC protocol version accepted and emitted.
pub const JSONRPC_VERSION: &str = "2.0";

/// A JSON-RPC 2.0 request ID.
///
/// IDs are opaque echo values: numbers (integer or fractional) or strings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RequestId {
    /// Numeric request ID.
    Number(serde_json::Number),
    /// String request ID.
    String(String),
}

impl RequestId {
    /// Recovers an ID from an arbitrary JSON value.
    ///
    /// Returns `None` for `null` and for shapes JSON-RPC does not allow
    /// (objects, arrays, booleans).
    #[must_use]
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Number(n) => Some(Self::Number(n.clone())),
            Value::String(s) => Some(Self::String(s.clone())),
            _ => None,
        }
    }
}

impl From<i64> for RequestId {
    fn from(n: i64) -> Self {
        Self::Number(n.into())
    }
}

impl From<&str> for RequestId {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{n}"),
            Self::String(s) => write!(f, "{s}"),
        }
    }
}

/// A validated JSON-RPC 2.0 request.
#[derive(Debug, Clone, PartialEq)]
pub struct RpcRequest {
    /// The method to invoke, e.g. `"editor.play"`.
    pub method: String,

    /// Parameters, normalised to an object (`{}` when absent).
    pub params: Map<String, Value>,

    /// The request ID, absent for notifications.
    pub id: Option<RequestId>,
}

impl RpcRequest {
    /// Returns `true` if the request carries no ID.
    #[must_use]
    pub const fn is_notification(&self) -> bool {
        self.id.is_none()
    }
}

/// Standard JSON-RPC 2.0 error codes used by the bridge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    /// Invalid JSON was received by the server.
    ParseError,
    /// The JSON sent is not a valid Request object.
    InvalidRequest,
    /// The method does not exist or is not available.
    MethodNotFound,
    /// Invalid method parameters.
    InvalidParams,
    /// Internal JSON-RPC error.
    InternalError,
    /// A registered handler failed.
    ServerError,
}

impl ErrorCode {
    /// Returns the numeric code for this error.
    #[must_use]
    pub const fn code(self) -> i32 {
        match self {
            Self::ParseError => -32700,
            Self::InvalidRequest => -32600,
            Self::MethodNotFound => -32601,
            Self::InvalidParams => -32602,
            Self::InternalError => -32603,
            Self::ServerError => -32000,
        }
    }

    /// Returns the default message for this error code.
    #[must_use]
    pub const fn default_message(self) -> &'static str {
        match self {
            Self::ParseError => "Parse error",
            Self::InvalidRequest => "Invalid Request",
            Self::MethodNotFound => "Method not found",
            Self::InvalidParams => "Invalid params",
            Self::InternalError => "Internal error",
            Self::ServerError => "Server error",
        }
    }
}

/// A JSON-RPC 2.0 error object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcError {
    /// The error code.
    pub code: i32,

    /// A short description of the error.
    pub message: String,

    /// Additional information about the error.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl RpcError {
    /// Creates a new error from an error code.
    #[must_use]
    pub fn from_code(code: ErrorCode) -> Self {
        Self {
            code: code.code(),
            message: code.default_message().to_string(),
            data: None,
        }
    }

    /// Creates a new error with a custom message.
    #[must_use]
    pub fn with_message(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code: code.code(),
            message: message.into(),
            data: None,
        }
    }

    /// Adds additional data to the error.
    #[must_use]
    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }
}

/// The `result` / `error` half of a response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    /// The handler's return value.
    Result(Value),
    /// The failure description.
    Error(RpcError),
}

/// A JSON-RPC 2.0 response.
///
/// `id` is always serialised, as `null` when it could not be determined.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcResponse {
    /// Always "2.0".
    pub jsonrpc: String,

    /// Either the result or the error.
    #[serde(flatten)]
    pub outcome: Outcome,

    /// The request ID this response corresponds to (if known).
    pub id: Option<RequestId>,
}

impl RpcResponse {
    /// Creates a new success response.
    #[must_use]
    pub fn success(id: Option<RequestId>, result: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            outcome: Outcome::Result(result),
            id,
        }
    }

    /// Creates a new error response.
    #[must_use]
    pub fn failure(id: Option<RequestId>, error: RpcError) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            outcome: Outcome::Error(error),
            id,
        }
    }

    /// Creates a parse error response carrying the parser diagnostic.
    #[must_use]
    pub fn parse_error(diagnostic: impl Into<String>) -> Self {
        Self::failure(
            None,
            RpcError::from_code(ErrorCode::ParseError).with_data(Value::String(diagnostic.into())),
        )
    }

    /// Creates an invalid request error response.
    #[must_use]
    pub fn invalid_request(id: Option<RequestId>, reason: &str) -> Self {
        Self::failure(
            id,
            RpcError::from_code(ErrorCode::InvalidRequest).with_data(Value::String(reason.into())),
        )
    }

    /// Creates a method not found error response.
    #[must_use]
    pub fn method_not_found(id: Option<RequestId>, method: &str) -> Self {
        Self::failure(
            id,
            RpcError::with_message(ErrorCode::MethodNotFound, format!("Method not found: {method}")),
        )
    }

    /// Creates an invalid params error response.
    #[must_use]
    pub fn invalid_params(id: Option<RequestId>, message: impl Into<String>) -> Self {
        Self::failure(id, RpcError::with_message(ErrorCode::InvalidParams, message))
    }

    /// Creates an internal error response.
    #[must_use]
    pub fn internal_error(id: Option<RequestId>, message: impl Into<String>) -> Self {
        Self::failure(id, RpcError::with_message(ErrorCode::InternalError, message))
    }

    /// Returns the error object, if this is an error response.
    #[must_use]
    pub const fn error(&self) -> Option<&RpcError> {
        match &self.outcome {
            Outcome::Error(e) => Some(e),
            Outcome::Result(_) => None,
        }
    }

    /// Returns the result value, if this is a success response.
    #[must_use]
    pub const fn result(&self) -> Option<&Value> {
        match &self.outcome {
            Outcome::Result(v) => Some(v),
            Outcome::Error(_) => None,
        }
    }

    /// Serialises the response as a single-line JSON string.
    #[must_use]
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|e| {
            // Only reachable if a handler produced a non-string map key.
            format!(
                r#"{{"jsonrpc":"2.0","error":{{"code":{},"message":"Internal error","data":{}}},"id":null}}"#,
                ErrorCode::InternalError.code(),
                Value::String(e.to_string())
            )
        })
    }
}

/// Parses a raw request body into a validated request.
///
/// # Errors
///
/// Returns the error response to send back when the body is not valid JSON,
/// has the wrong structural shape, or is not a valid request object.
pub fn parse_request(body: &str) -> Result<RpcRequest, Box<RpcResponse>> {
    let value: Value =
        serde_json::from_str(body).map_err(|e| Box::new(RpcResponse::parse_error(e.to_string())))?;

    let obj = match value {
        Value::Object(obj) => obj,
        Value::Null => {
            return Err(Box::new(RpcResponse::invalid_request(
                None,
                "request body is null",
            )))
        }
        other => {
            return Err(Box::new(RpcResponse::parse_error(format!(
                "expected a JSON object, found {}",
                json_type_name(&other)
            ))))
        }
    };

    let id = match obj.get("id") {
        None | Some(Value::Null) => None,
        Some(raw) => Some(RequestId::from_value(raw).ok_or_else(|| {
            Box::new(RpcResponse::invalid_request(
                None,
                "id must be a string or a number",
            ))
        })?),
    };

    if obj.get("jsonrpc").and_then(Value::as_str) != Some(JSONRPC_VERSION) {
        return Err(Box::new(RpcResponse::invalid_request(
            id,
            "jsonrpc field must be \"2.0\"",
        )));
    }

    let method = match obj.get("method").and_then(Value::as_str) {
        Some(m) if !m.is_empty() => m.to_string(),
        Some(_) => {
            return Err(Box::new(RpcResponse::invalid_request(
                id,
                "method field cannot be empty",
            )))
        }
        None => {
            return Err(Box::new(RpcResponse::invalid_request(
                id,
                "method field must be a string",
            )))
        }
    };

    let params = match obj.get("params") {
        None | Some(Value::Null) => Map::new(),
        Some(Value::Object(map)) => map.clone(),
        Some(other) => {
            return Err(Box::new(RpcResponse::invalid_params(
                id,
                format!("params must be an object, found {}", json_type_name(other)),
            )))
        }
    };

    Ok(RpcRequest { method, params, id })
}

const fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
