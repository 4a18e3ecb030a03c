//! Tracking of long-running host operations.
//!
//! Every state change is published as a [`PROGRESS_EVENT`] event so that
//! WebSocket subscribers can follow an operation without polling.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::events::EventBroadcaster;

/// Name of the event published on every progress change.
pub const PROGRESS_EVENT: &str = "operation.progress";

/// How long terminal operations are retained by default.
pub const DEFAULT_RETENTION: Duration = Duration::from_secs(5 * 60);

/// Lifecycle state of an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationStatus {
    /// Still in progress.
    Running,
    /// Finished successfully.
    Completed,
    /// Finished with an error.
    Failed,
}

impl OperationStatus {
    /// Returns `true` for completed and failed operations.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

/// Snapshot of one operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressInfo {
    /// Short unique token assigned at start.
    pub operation_id: String,
    /// Kind of work, e.g. `"build"` or `"import"`.
    pub operation_type: String,
    /// Human-readable description.
    pub description: String,
    /// Fraction done, always within `0.0..=1.0`.
    pub progress: f64,
    /// Lifecycle state.
    pub status: OperationStatus,
    /// Latest status message.
    pub message: String,
    /// When the operation started.
    pub start_time: DateTime<Utc>,
    /// When the operation reached a terminal state.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<DateTime<Utc>>,
}

/// Owns every operation record and publishes their changes.
#[derive(Debug)]
pub struct ProgressTracker {
    operations: Mutex<HashMap<String, ProgressInfo>>,
    broadcaster: Arc<EventBroadcaster>,
}

impl ProgressTracker {
    /// Creates a tracker publishing through `broadcaster`.
    #[must_use]
    pub fn new(broadcaster: Arc<EventBroadcaster>) -> Self {
        Self {
            operations: Mutex::new(HashMap::new()),
            broadcaster,
        }
    }

    /// Starts a new operation and returns its id.
    pub fn start_operation(&self, operation_type: &str, description: &str) -> String {
        let info = {
            let mut operations = self.operations.lock().unwrap_or_else(PoisonError::into_inner);
            let operation_id = loop {
                let candidate = short_id();
                if !operations.contains_key(&candidate) {
                    break candidate;
                }
            };
            let info = ProgressInfo {
                operation_id: operation_id.clone(),
                operation_type: operation_type.to_string(),
                description: description.to_string(),
                progress: 0.0,
                status: OperationStatus::Running,
                message: String::new(),
                start_time: Utc::now(),
                end_time: None,
            };
            operations.insert(operation_id, info.clone());
            info
        };

        tracing::debug!(operation = %info.operation_id, kind = %operation_type, "Operation started");
        let id = info.operation_id.clone();
        self.publish(&info);
        id
    }

    /// Sets the progress fraction (clamped to `0.0..=1.0`) and optional message.
    ///
    /// Unknown ids and finished operations are ignored.
    pub fn update_progress(&self, operation_id: &str, progress: f64, message: Option<&str>) {
        self.mutate(operation_id, |info| {
            info.progress = clamp_progress(progress);
            if let Some(message) = message {
                info.message = message.to_string();
            }
        });
    }

    /// Marks an operation completed. Has no effect once it has finished.
    pub fn complete_operation(&self, operation_id: &str, message: Option<&str>) {
        self.mutate(operation_id, |info| {
            info.progress = 1.0;
            info.status = OperationStatus::Completed;
            info.end_time = Some(Utc::now());
            if let Some(message) = message {
                info.message = message.to_string();
            }
        });
    }

    /// Marks an operation failed with `error` as its message. Has no effect
    /// once it has finished.
    pub fn fail_operation(&self, operation_id: &str, error: &str) {
        let failed = self.mutate(operation_id, |info| {
            info.status = OperationStatus::Failed;
            info.end_time = Some(Utc::now());
            info.message = error.to_string();
        });
        if failed {
            tracing::warn!(operation = %operation_id, error = %error, "Operation failed");
        }
    }

    /// Returns a snapshot of one operation.
    #[must_use]
    pub fn progress(&self, operation_id: &str) -> Option<ProgressInfo> {
        self.operations
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(operation_id)
            .cloned()
    }

    /// Returns snapshots of every tracked operation, oldest first.
    #[must_use]
    pub fn all_progress(&self) -> Vec<ProgressInfo> {
        let mut all: Vec<ProgressInfo> = self
            .operations
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect();
        all.sort_by(|a, b| a.start_time.cmp(&b.start_time));
        all
    }

    /// Removes terminal operations that ended more than `max_age` ago.
    ///
    /// Returns the number removed.
    pub fn cleanup_completed(&self, max_age: Duration) -> usize {
        let cutoff = chrono::Duration::from_std(max_age)
            .ok()
            .and_then(|age| Utc::now().checked_sub_signed(age));
        let Some(cutoff) = cutoff else {
            return 0;
        };

        let mut operations = self.operations.lock().unwrap_or_else(PoisonError::into_inner);
        let before = operations.len();
        operations.retain(|_, info| {
            !(info.status.is_terminal() && info.end_time.is_some_and(|end| end < cutoff))
        });
        let removed = before - operations.len();
        if removed > 0 {
            tracing::debug!(removed, "Swept finished operations");
        }
        removed
    }

    /// Applies `change` under the lock, then publishes the new state.
    ///
    /// Unknown ids and operations that already finished are left untouched.
    /// Returns `true` if the change was applied.
    fn mutate(&self, operation_id: &str, change: impl FnOnce(&mut ProgressInfo)) -> bool {
        let updated = {
            let mut operations = self.operations.lock().unwrap_or_else(PoisonError::into_inner);
            match operations.get_mut(operation_id) {
                Some(info) if info.status.is_terminal() => {
                    tracing::debug!(
                        operation = %operation_id,
                        status = ?info.status,
                        "Ignoring update for finished operation"
                    );
                    return false;
                }
                Some(info) => {
                    change(info);
                    Some(info.clone())
                }
                None => None,
            }
        };

        match updated {
            Some(info) => {
                self.publish(&info);
                true
            }
            None => {
                tracing::debug!(operation = %operation_id, "Ignoring update for unknown operation");
                false
            }
        }
    }

    fn publish(&self, info: &ProgressInfo) {
        match serde_json::to_value(info) {
            Ok(data) => {
                self.broadcaster.publish(PROGRESS_EVENT, data);
            }
            Err(e) => tracing::warn!(error = %e, "Failed to encode progress event"),
        }
    }
}

fn short_id() -> String {
    let mut id = Uuid::new_v4().simple().to_string();
    id.truncate(8);
    id
}

fn clamp_progress(progress: f64) -> f64 {
    if progress.is_nan() {
        0.0
    } else {
        progress.clamp(0.0, 1.0)
    }
}
