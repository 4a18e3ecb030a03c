//! `progress.*` methods: polling access to tracked operations.

use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;

use crate::progress::{ProgressInfo, ProgressTracker};
use crate::rpc::{Dispatcher, HandlerError};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GetParams {
    operation_id: String,
}

/// Registers `progress.get` and `progress.list`.
///
/// `progress.list` sweeps operations that finished more than `retention`
/// ago before answering.
pub fn register(dispatcher: &Dispatcher, tracker: &Arc<ProgressTracker>, retention: Duration) {
    let progress = Arc::clone(tracker);
    dispatcher.register_typed("progress.get", move |params: GetParams| {
        progress.progress(&params.operation_id).ok_or_else(|| {
            HandlerError::failed(format!("Operation not found: {}", params.operation_id))
        })
    });

    let progress = Arc::clone(tracker);
    dispatcher.register_method("progress.list", move |_| {
        progress.cleanup_completed(retention);
        let all: Vec<ProgressInfo> = progress.all_progress();
        serde_json::to_value(all).map_err(|e| HandlerError::failed(e.to_string()))
    });
}
