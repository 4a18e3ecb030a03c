//! Event broadcast and history.
//!
//! Events are published by handlers (and by the progress tracker) and
//! fanned out to WebSocket subscribers. The last
//! [`DEFAULT_HISTORY_CAPACITY`] events are kept for clients that poll
//! instead of subscribing.

pub mod broadcaster;
pub mod history;

pub use broadcaster::{EventBroadcaster, Subscription, DEFAULT_CLIENT_BUFFER};
pub use history::{EventHistory, EventRecord, DEFAULT_HISTORY_CAPACITY};
