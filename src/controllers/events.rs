//! `events.*` methods: polling access to the event history.

use std::sync::Arc;

use serde::Deserialize;
use serde_json::json;

use crate::events::{EventBroadcaster, EventRecord};
use crate::rpc::Dispatcher;

const DEFAULT_LIMIT: usize = 20;

#[derive(Debug, Deserialize)]
struct GetRecentParams {
    #[serde(default)]
    limit: Option<usize>,
}

/// Registers `events.getRecent` and `events.clear`.
pub fn register(dispatcher: &Dispatcher, broadcaster: &Arc<EventBroadcaster>) {
    let events = Arc::clone(broadcaster);
    dispatcher.register_typed("events.getRecent", move |params: GetRecentParams| {
        Ok::<Vec<EventRecord>, _>(events.recent_events(params.limit.unwrap_or(DEFAULT_LIMIT)))
    });

    let events = Arc::clone(broadcaster);
    dispatcher.register_method("events.clear", move |_| {
        events.clear_history();
        Ok(json!({ "cleared": true }))
    });
}
