//! Fan-out of events to live WebSocket subscribers.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use tokio::sync::mpsc::{self, error::TrySendError};

use crate::events::history::{EventHistory, EventRecord, DEFAULT_HISTORY_CAPACITY};

/// Default number of frames buffered per subscriber before frames are dropped.
pub const DEFAULT_CLIENT_BUFFER: usize = 64;

/// The wire shape of a broadcast frame.
#[derive(Debug, Serialize)]
struct EventFrame<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    event: &'a str,
    data: &'a Value,
    timestamp: &'a DateTime<Utc>,
}

impl<'a> From<&'a EventRecord> for EventFrame<'a> {
    fn from(record: &'a EventRecord) -> Self {
        Self {
            kind: "event",
            event: &record.name,
            data: &record.data,
            timestamp: &record.timestamp,
        }
    }
}

struct Client {
    sender: mpsc::Sender<String>,
    open: Arc<AtomicBool>,
}

/// A live subscriber's receiving end.
#[derive(Debug)]
pub struct Subscription {
    /// Connection id, unique for the broadcaster's lifetime.
    pub id: u64,
    /// Serialised event frames, ready to write to the socket.
    pub frames: mpsc::Receiver<String>,
    open: Arc<AtomicBool>,
}

impl Subscription {
    /// Marks the subscriber as closing; later publishes skip it.
    pub fn close(&self) {
        self.open.store(false, Ordering::Release);
    }

    /// Returns `true` until [`close`](Self::close) is called.
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }
}

/// Publishes events to every subscriber and keeps a bounded history.
pub struct EventBroadcaster {
    history: EventHistory,
    clients: Mutex<HashMap<u64, Client>>,
    next_id: AtomicU64,
    client_buffer: usize,
}

impl EventBroadcaster {
    /// Creates a broadcaster.
    #[must_use]
    pub fn new(history_capacity: usize, client_buffer: usize) -> Self {
        Self {
            history: EventHistory::new(history_capacity),
            clients: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            client_buffer: client_buffer.max(1),
        }
    }

    /// Records an event and delivers it to every open subscriber.
    ///
    /// Delivery is best effort: closed subscribers are skipped and a full or
    /// disconnected subscriber never affects the others. Returns the number
    /// of subscribers the frame was queued for.
    pub fn publish(&self, event_name: &str, data: Value) -> usize {
        let record = EventRecord::now(event_name, data);
        let frame = match serde_json::to_string(&EventFrame::from(&record)) {
            Ok(frame) => Some(frame),
            Err(e) => {
                tracing::warn!(event = %event_name, error = %e, "Failed to encode event frame");
                None
            }
        };
        self.history.push(record);

        let Some(frame) = frame else {
            return 0;
        };

        let clients = self.clients.lock().unwrap_or_else(PoisonError::into_inner);
        let mut delivered = 0;
        for (id, client) in clients.iter() {
            if !client.open.load(Ordering::Acquire) {
                continue;
            }
            match client.sender.try_send(frame.clone()) {
                Ok(()) => delivered += 1,
                Err(TrySendError::Full(_)) => {
                    tracing::warn!(client = id, event = %event_name, "Subscriber lagging, frame dropped");
                }
                Err(TrySendError::Closed(_)) => {
                    tracing::debug!(client = id, "Subscriber gone, skipping");
                }
            }
        }
        delivered
    }

    /// Returns up to `limit` of the most recent events, oldest first.
    #[must_use]
    pub fn recent_events(&self, limit: usize) -> Vec<EventRecord> {
        self.history.recent(limit)
    }

    /// Empties the event history.
    pub fn clear_history(&self) {
        self.history.clear();
    }

    /// Returns the underlying history.
    #[must_use]
    pub const fn history(&self) -> &EventHistory {
        &self.history
    }

    /// Registers a new subscriber.
    pub fn subscribe(&self) -> Subscription {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (sender, frames) = mpsc::channel(self.client_buffer);
        let open = Arc::new(AtomicBool::new(true));
        self.clients
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(
                id,
                Client {
                    sender,
                    open: Arc::clone(&open),
                },
            );
        tracing::debug!(client = id, "Subscriber connected");
        Subscription { id, frames, open }
    }

    /// Removes a subscriber. Unknown ids are ignored.
    pub fn unsubscribe(&self, id: u64) {
        let removed = self
            .clients
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&id);
        if let Some(client) = removed {
            client.open.store(false, Ordering::Release);
            tracing::debug!(client = id, "Subscriber disconnected");
        }
    }

    /// Number of registered subscribers.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.clients
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

impl Default for EventBroadcaster {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_CAPACITY, DEFAULT_CLIENT_BUFFER)
    }
}

impl std::fmt::Debug for EventBroadcaster {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBroadcaster")
            .field("history_len", &self.history.len())
            .field("subscribers", &self.subscriber_count())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn publish_without_subscribers_still_records() {
        let broadcaster = EventBroadcaster::default();
        assert_eq!(broadcaster.publish("scene.saved", json!({"path": "a.scene"})), 0);
        let events = broadcaster.recent_events(10);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].name, "scene.saved");
    }

    #[test]
    fn history_keeps_most_recent_hundred() {
        let broadcaster = EventBroadcaster::default();
        for n in 0..150 {
            broadcaster.publish("tick", json!(n));
        }
        let events = broadcaster.recent_events(200);
        assert_eq!(events.len(), 100);
        let values: Vec<_> = events.iter().map(|e| e.data.as_i64().unwrap()).collect();
        assert_eq!(values, (50..150).collect::<Vec<_>>());
    }

    #[test]
    fn configured_history_capacity_is_enforced() {
        let broadcaster = EventBroadcaster::new(5, 1);
        assert_eq!(broadcaster.history().capacity(), 5);
        for n in 0..8 {
            broadcaster.publish("tick", json!(n));
        }
        assert_eq!(broadcaster.history().len(), 5);
        assert_eq!(broadcaster.history().snapshot()[0].data, json!(3));

        broadcaster.clear_history();
        assert!(broadcaster.history().is_empty());
    }

    #[test]
    fn subscriber_receives_frame() {
        let broadcaster = EventBroadcaster::default();
        let mut sub = broadcaster.subscribe();
        assert_eq!(broadcaster.publish("editor.play", json!({"on": true})), 1);

        let frame: Value = serde_json::from_str(&sub.frames.try_recv().unwrap()).unwrap();
        assert_eq!(frame["type"], "event");
        assert_eq!(frame["event"], "editor.play");
        assert_eq!(frame["data"]["on"], true);
        assert!(frame["timestamp"].is_string());
    }

    #[test]
    fn closed_subscriber_is_skipped() {
        let broadcaster = EventBroadcaster::default();
        let closed = broadcaster.subscribe();
        let mut live = broadcaster.subscribe();
        closed.close();
        assert!(!closed.is_open());

        assert_eq!(broadcaster.publish("e", Value::Null), 1);
        assert!(live.frames.try_recv().is_ok());
    }

    #[test]
    fn dropped_subscriber_does_not_affect_others() {
        let broadcaster = EventBroadcaster::default();
        let gone = broadcaster.subscribe();
        let mut live = broadcaster.subscribe();
        drop(gone);

        assert_eq!(broadcaster.publish("e", Value::Null), 1);
        assert!(live.frames.try_recv().is_ok());
    }

    #[test]
    fn full_subscriber_drops_frames() {
        let broadcaster = EventBroadcaster::new(10, 1);
        let mut sub = broadcaster.subscribe();
        assert_eq!(broadcaster.publish("a", Value::Null), 1);
        assert_eq!(broadcaster.publish("b", Value::Null), 0);
        assert_eq!(broadcaster.recent_events(10).len(), 2);
        assert!(sub.frames.try_recv().unwrap().contains(r#""event":"a""#));
    }

    #[test]
    fn connection_ids_increase() {
        let broadcaster = EventBroadcaster::default();
        let a = broadcaster.subscribe();
        let b = broadcaster.subscribe();
        assert!(b.id > a.id);
        broadcaster.unsubscribe(a.id);
        broadcaster.unsubscribe(a.id);
        assert_eq!(broadcaster.subscriber_count(), 1);
        let c = broadcaster.subscribe();
        assert!(c.id > b.id);
    }

    #[test]
    fn clear_history_empties() {
        let broadcaster = EventBroadcaster::default();
        broadcaster.publish("a", Value::Null);
        broadcaster.clear_history();
        assert!(broadcaster.recent_events(10).is_empty());
    }
}
