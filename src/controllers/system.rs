//! `system.*` methods.

use std::sync::{Arc, Weak};

use chrono::Utc;
use serde_json::json;

use crate::rpc::{Dispatcher, HandlerError};

/// Registers `system.ping` and `system.listMethods`.
pub fn register(dispatcher: &Arc<Dispatcher>) {
    dispatcher.register_method("system.ping", |_| {
        Ok(json!({ "pong": true, "timestamp": Utc::now() }))
    });

    // Weak, so the registry does not keep itself alive.
    let registry: Weak<Dispatcher> = Arc::downgrade(dispatcher);
    dispatcher.register_method("system.listMethods", move |_| {
        let dispatcher = registry
            .upgrade()
            .ok_or_else(|| HandlerError::failed("dispatcher is shutting down"))?;
        Ok(json!(dispatcher.method_names()))
    });
}
