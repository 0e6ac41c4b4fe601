//! In-process event bus backed by a `tokio::sync::broadcast` channel.
//!
//! [`NotificationBus`] is the fan-out hub for [`WorkflowEvent`]s. It is
//! designed to be shared via `Arc<NotificationBus>` across the application;
//! a WebSocket gateway or job monitor subscribes and forwards.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use poseflow_core::progress::BatchCounters;
use poseflow_core::types::DbId;

// ---------------------------------------------------------------------------
// WorkflowEvent
// ---------------------------------------------------------------------------

/// What happened to a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// Counters changed; the payload carries the fresh snapshot.
    Progress,
    /// Every image in the batch reached a settled state.
    Completed,
    /// Something went wrong on one of the batch's images.
    Error,
}

/// A batch-scoped event published after a workflow step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowEvent {
    pub kind: EventKind,
    pub batch_id: DbId,

    /// Counter snapshot at publish time, when the event carries one.
    pub counters: Option<BatchCounters>,

    /// Free-form detail (error text, image id, decision name).
    pub detail: serde_json::Value,

    /// When the event was created (UTC).
    pub timestamp: DateTime<Utc>,
}

impl WorkflowEvent {
    pub fn progress(batch_id: DbId, counters: BatchCounters) -> Self {
        Self {
            kind: EventKind::Progress,
            batch_id,
            counters: Some(counters),
            detail: serde_json::Value::Object(Default::default()),
            timestamp: Utc::now(),
        }
    }

    pub fn completed(batch_id: DbId, counters: BatchCounters) -> Self {
        Self {
            kind: EventKind::Completed,
            batch_id,
            counters: Some(counters),
            detail: serde_json::Value::Object(Default::default()),
            timestamp: Utc::now(),
        }
    }

    pub fn error(batch_id: DbId, detail: serde_json::Value) -> Self {
        Self {
            kind: EventKind::Error,
            batch_id,
            counters: None,
            detail,
            timestamp: Utc::now(),
        }
    }

    /// Attach detail to a progress/completed event.
    pub fn with_detail(mut self, detail: serde_json::Value) -> Self {
        self.detail = detail;
        self
    }
}

// ---------------------------------------------------------------------------
// NotificationBus
// ---------------------------------------------------------------------------

/// Default buffer capacity for the broadcast channel.
const DEFAULT_CAPACITY: usize = 1024;

/// Fire-and-forget fan-out bus.
///
/// When the buffer is full the oldest un-consumed events are dropped and
/// slow receivers observe `RecvError::Lagged`; the workflow never blocks on
/// delivery.
pub struct NotificationBus {
    sender: broadcast::Sender<WorkflowEvent>,
}

impl NotificationBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish an event to all current subscribers.
    ///
    /// The SendError only means there are zero receivers, which is fine.
    pub fn publish(&self, event: WorkflowEvent) {
        if self.sender.send(event).is_err() {
            tracing::trace!("workflow event dropped: no subscribers");
        }
    }

    /// Subscribe to all events published on this bus.
    pub fn subscribe(&self) -> broadcast::Receiver<WorkflowEvent> {
        self.sender.subscribe()
    }
}

impl Default for NotificationBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
