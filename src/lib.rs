//! editor-rpc-bridge: JSON-RPC bridge for single-threaded editor hosts
//!
//! External tools call into a host application whose state may only be
//! touched from one thread. This library accepts JSON-RPC 2.0 requests over
//! several transports and runs every handler on that thread, one at a time.
//!
//! # Architecture
//!
//! ```text
//!   HTTP POST /mcp/rpc ─┐
//!   named pipe / Unix ──┼──▶ RpcBridge ──▶ MainThreadExecutor ──▶ MainLoop
//!   socket (lines)      │                                          │
//!                       │                                          ▼
//!   WebSocket ◀── EventBroadcaster ◀── handlers ◀──────────── Dispatcher
//!   /mcp/events                  ▲
//!                                └── ProgressTracker
//! ```
//!
//! - **Transports** accept requests concurrently and never touch host state.
//! - **The executor** funnels every request onto the host thread, so
//!   handlers never overlap.
//! - **Events** are pushed to WebSocket subscribers and kept in a bounded
//!   history for polling.
//!
//! # Modules
//!
//! - [`config`] — Configuration loading and validation
//! - [`controllers`] — Built-in and demonstration method handlers
//! - [`error`] — Error types
//! - [`events`] — Event broadcast and history
//! - [`host`] — Host thread executor
//! - [`progress`] — Long-running operation tracking
//! - [`rpc`] — JSON-RPC protocol and dispatch
//! - [`server`] — Server lifecycle
//! - [`transport`] — HTTP, WebSocket, named pipe and Unix socket listeners

pub mod config;
pub mod controllers;
pub mod error;
pub mod events;
pub mod host;
pub mod progress;
pub mod rpc;
pub mod server;
pub mod transport;

pub use error::BridgeError;
pub use server::BridgeServer;
