//! JSON-RPC 2.0 envelope handling and method dispatch.
//!
//! Every transport funnels raw request bodies into [`Dispatcher::handle`],
//! which parses the envelope, looks up the handler, runs it, and builds the
//! response body.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                          Dispatcher                          │
//! │                                                              │
//! │   raw body ──▶ parse_request ──▶ registry lookup ──▶ handler │
//! │                     │                  │               │     │
//! │                     ▼                  ▼               ▼     │
//! │   ┌──────────────────────────────────────────────────────┐  │
//! │   │     RpcResponse (result | error, id echoed)          │  │
//! │   └──────────────────────────────────────────────────────┘  │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! Error codes: `-32700` parse error, `-32600` invalid request, `-32601`
//! method not found, `-32602` invalid params, `-32000` handler failure.

pub mod dispatcher;
pub mod protocol;

pub use dispatcher::{Dispatcher, Handler, HandlerError, HandlerResult};
pub use protocol::{ErrorCode, Outcome, RequestId, RpcError, RpcRequest, RpcResponse};
