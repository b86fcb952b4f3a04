//! Event types and the in-process event bus for the import page
//!
//! The import page emits an [`ImportEvent`] after every state change. The
//! command-line front end subscribes to render progress; tests subscribe to
//! count transitions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tokio::sync::broadcast;

use crate::api::ImportJob;

/// Severity of a transient notice shown to the user
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NoticeLevel {
    Info,
    Success,
    Error,
}

/// Import page events
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ImportEvent {
    /// Key verified; the page moved to the upload step
    KeyAccepted { timestamp: DateTime<Utc> },

    /// Key verification failed; the page stays on the gate step
    KeyRejected { message: String },

    /// File accepted by the backend
    JobSubmitted {
        task_id: String,
        validate_only: bool,
    },

    /// Mirror replaced by a poll response (or a manual update)
    JobUpdated { job: ImportJob },

    /// Mirror reached a terminal status
    JobFinished { job: ImportJob },

    /// Poll timer armed for a task
    PollingStarted { task_id: String },

    /// Poll timer torn down for a task
    PollingStopped { task_id: String },

    /// Template saved to disk
    TemplateSaved { path: PathBuf },

    /// Transient user-facing message
    Notice { level: NoticeLevel, text: String },

    /// Key and current task cleared
    Reset,
}

/// Broadcast bus for [`ImportEvent`]s
///
/// Cloning shares the underlying channel.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<ImportEvent>,
    capacity: usize,
}

impl EventBus {
    /// Creates a new EventBus with specified channel capacity
    ///
    /// # Examples
    ///
    /// ```
    /// use cosdb_common::events::EventBus;
    ///
    /// let event_bus = EventBus::new(64);
    /// assert_eq!(event_bus.capacity(), 64);
    /// ```
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, capacity }
    }

    /// Subscribe to all future events
    pub fn subscribe(&self) -> broadcast::Receiver<ImportEvent> {
        self.tx.subscribe()
    }

    /// Emit an event, ignoring if no subscribers are listening
    pub fn emit_lossy(&self, event: ImportEvent) {
        let _ = self.tx.send(event);
    }

    /// Get the current number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Get the configured channel capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}
