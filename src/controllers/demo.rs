//! Demonstration controllers.
//!
//! Stand-ins for the host's own controllers: they show how a controller
//! registers methods and touches host-owned state, publishes events, and
//! reports progress.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::events::EventBroadcaster;
use crate::progress::ProgressTracker;
use crate::rpc::{Dispatcher, HandlerError};

/// State owned by the host and only touched from handlers.
#[derive(Debug, Default)]
pub struct DemoState {
    counter: AtomicU64,
}

impl DemoState {
    /// Current counter value.
    #[must_use]
    pub fn counter(&self) -> u64 {
        self.counter.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Deserialize)]
struct BuildParams {
    #[serde(default = "default_steps")]
    steps: u32,
    #[serde(default)]
    fail_at: Option<u32>,
}

const fn default_steps() -> u32 {
    4
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct BuildResult {
    operation_id: String,
    steps: u32,
}

/// Registers `demo.echo`, `demo.increment` and `demo.build`.
///
/// `demo.increment` does a plain load-then-store on the
/// counter; it only stays consistent because handlers never overlap.
pub fn register(
    dispatcher: &Dispatcher,
    broadcaster: &Arc<EventBroadcaster>,
    tracker: &Arc<ProgressTracker>,
    state: &Arc<DemoState>,
) {
    dispatcher.register_method("demo.echo", |params| Ok(Value::Object(params)));

    let counter_state = Arc::clone(state);
    let events = Arc::clone(broadcaster);
    dispatcher.register_method("demo.increment", move |_| {
        let next = counter_state.counter.load(Ordering::SeqCst) + 1;
        std::thread::yield_now();
        counter_state.counter.store(next, Ordering::SeqCst);
        events.publish("demo.counterChanged", json!({ "value": next }));
        Ok(json!(next))
    });

    let progress = Arc::clone(tracker);
    dispatcher.register_typed("demo.build", move |params: BuildParams| {
        if params.steps == 0 {
            return Err(HandlerError::failed("steps must be at least 1"));
        }
        let id = progress.start_operation("build", "Demo build");
        for step in 1..=params.steps {
            if params.fail_at == Some(step) {
                let message = format!("step {step} failed");
                progress.fail_operation(&id, &message);
                return Err(HandlerError::failed_with_data(
                    message,
                    json!({ "operationId": id }),
                ));
            }
            progress.update_progress(
                &id,
                f64::from(step) / f64::from(params.steps),
                Some(&format!("step {step} of {}", params.steps)),
            );
        }
        progress.complete_operation(&id, Some("build finished"));
        Ok(BuildResult {
            operation_id: id,
            steps: params.steps,
        })
    });
}
