//! Event types for observing solution passes
//!
//! Events are sent from the pass controller to any consumer (UI, log
//! window, test) to report node progress, commits and stale cleanup.

use serde::{Deserialize, Serialize};

use crate::host::TransactionStatus;
use crate::identity::{DocumentId, IdentityRef};
use crate::report::{Decision, PassOutcome};

/// Trait for sending pass events
///
/// This abstracts over the transport so the engine can be used from a host
/// plugin, a test, or a headless tool alike.
pub trait EventSink: Send + Sync {
    /// Send an event
    ///
    /// Returns an error if the event could not be sent (e.g., channel closed)
    fn send(&self, event: PassEvent) -> Result<(), EventError>;
}

/// Error when sending events fails
#[derive(Debug, Clone)]
pub struct EventError {
    pub message: String,
}

impl std::fmt::Display for EventError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Event error: {}", self.message)
    }
}

impl std::error::Error for EventError {}

impl EventError {
    pub fn channel_closed() -> Self {
        Self {
            message: "Channel closed".to_string(),
        }
    }
}

/// Events emitted during a solution pass or a materialization
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum PassEvent {
    #[serde(rename_all = "camelCase")]
    PassStarted { pass_id: String, node_count: usize },

    #[serde(rename_all = "camelCase")]
    NodeStarted { pass_id: String, node_id: String },

    /// A node's invocations were all reconciled
    #[serde(rename_all = "camelCase")]
    NodeReconciled {
        pass_id: String,
        node_id: String,
        decisions: Vec<Decision>,
    },

    /// One of a node's invocations failed
    #[serde(rename_all = "camelCase")]
    NodeFailed {
        pass_id: String,
        node_id: String,
        error: String,
    },

    /// A node abandoned its contribution
    #[serde(rename_all = "camelCase")]
    NodeCancelled { pass_id: String, node_id: String },

    /// The pass is suspended until input is provided
    #[serde(rename_all = "camelCase")]
    WaitingForInput {
        pass_id: String,
        node_id: String,
        prompt: String,
    },

    /// Elements no node claims any more were deleted
    #[serde(rename_all = "camelCase")]
    StaleDeleted {
        pass_id: String,
        elements: Vec<IdentityRef>,
    },

    /// A document's transaction finished
    #[serde(rename_all = "camelCase")]
    DocumentFinished {
        pass_id: String,
        document: DocumentId,
        status: TransactionStatus,
    },

    #[serde(rename_all = "camelCase")]
    PassCompleted { pass_id: String, outcome: PassOutcome },

    /// A node's elements were released from engine management
    #[serde(rename_all = "camelCase")]
    Materialized {
        node_id: String,
        document: DocumentId,
        elements: Vec<IdentityRef>,
    },
}

/// A no-op event sink that discards all events
pub struct NullEventSink;

impl EventSink for NullEventSink {
    fn send(&self, _event: PassEvent) -> Result<(), EventError> {
        Ok(())
    }
}

/// A vector-based event sink that collects events
///
/// Useful for testing to verify events were emitted correctly.
pub struct VecEventSink {
    events: std::sync::Mutex<Vec<PassEvent>>,
}

impl VecEventSink {
    pub fn new() -> Self {
        Self {
            events: std::sync::Mutex::new(Vec::new()),
        }
    }

    /// Get all collected events
    pub fn events(&self) -> Vec<PassEvent> {
        self.lock().clone()
    }

    /// Clear all collected events
    pub fn clear(&self) {
        self.lock().clear();
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<PassEvent>> {
        self.events.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Default for VecEventSink {
    fn default() -> Self {
        Self::new()
    }
}

impl EventSink for VecEventSink {
    fn send(&self, event: PassEvent) -> Result<(), EventError> {
        self.lock().push(event);
        Ok(())
    }
}

/// Event sink that forwards into a tokio channel
pub struct ChannelEventSink {
    sender: tokio::sync::mpsc::UnboundedSender<PassEvent>,
}

impl ChannelEventSink {
    pub fn new() -> (Self, tokio::sync::mpsc::UnboundedReceiver<PassEvent>) {
        let (sender, receiver) = tokio::sync::mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }
}

impl EventSink for ChannelEventSink {
    fn send(&self, event: PassEvent) -> Result<(), EventError> {
        self.sender.send(event).map_err(|_| EventError::channel_closed())
    }
}
