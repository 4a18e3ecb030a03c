//! The host thread and everything that crosses onto it.
//!
//! - [`executor`] — the work queue that serialises all host access
//! - [`bridge`] — glue that runs dispatcher calls through the executor

pub mod bridge;
pub mod executor;

pub use bridge::RpcBridge;
pub use executor::{ExecutorError, MainLoop, MainThreadExecutor, HOST_THREAD_NAME};
