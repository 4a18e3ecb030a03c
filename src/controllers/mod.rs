//! Built-in controllers.
//!
//! Controllers are ordinary method handlers registered through
//! [`Dispatcher::register_method`](crate::rpc::Dispatcher::register_method)
//! and its typed variant. The ones here expose the bridge's own services;
//! host-specific controllers are registered the same way by the embedding
//! application.
//!
//! | Method               | Params               | Result                        |
//! |----------------------|----------------------|-------------------------------|
//! | `system.ping`        | none                 | `{pong, timestamp}`           |
//! | `system.listMethods` | none                 | sorted method names           |
//! | `events.getRecent`   | `{limit?}`           | event records, oldest first   |
//! | `events.clear`       | none                 | `{cleared}`                   |
//! | `progress.get`       | `{operationId}`      | progress record               |
//! | `progress.list`      | none                 | all progress records          |

pub mod demo;
pub mod events;
pub mod progress;
pub mod system;

use std::sync::Arc;
use std::time::Duration;

use crate::events::EventBroadcaster;
use crate::progress::ProgressTracker;
use crate::rpc::Dispatcher;

/// Registers every built-in controller.
pub fn register_builtin(
    dispatcher: &Arc<Dispatcher>,
    broadcaster: &Arc<EventBroadcaster>,
    tracker: &Arc<ProgressTracker>,
    retention: Duration,
) {
    system::register(dispatcher);
    events::register(dispatcher, broadcaster);
    progress::register(dispatcher, tracker, retention);
}
