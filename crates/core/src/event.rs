//! Domain events for observation of the agent loop.
//!
//! The loop publishes events as it selects and runs tasks. Other components
//! (the CLI, tests) can subscribe without the loop knowing about them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;

/// All domain events in the system.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum DomainEvent {
    /// The loop finished initialization and entered the running state
    LoopStarted {
        agent: String,
        model_provider: String,
        timestamp: DateTime<Utc>,
    },

    /// A task was drawn by the selector
    TaskSelected {
        task: String,
        timestamp: DateTime<Utc>,
    },

    /// A task handler returned
    TaskCompleted {
        task: String,
        success: bool,
        duration_ms: u64,
        timestamp: DateTime<Utc>,
    },

    /// An iteration ended in an error caught at the loop boundary
    IterationFailed {
        context: String,
        error_message: String,
        timestamp: DateTime<Utc>,
    },

    /// The loop observed a shutdown request and stopped
    LoopStopped {
        iterations: u64,
        timestamp: DateTime<Utc>,
    },
}

/// A broadcast-based event bus for domain events.
///
/// Uses `tokio::sync::broadcast` for multi-consumer pub/sub.
pub struct EventBus {
    sender: broadcast::Sender<Arc<DomainEvent>>,
}

impl EventBus {
    /// Create a new event bus with the given capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish an event to all subscribers.
    pub fn publish(&self, event: DomainEvent) {
        // No subscribers is fine
        let _ = self.sender.send(Arc::new(event));
    }

    /// Subscribe to receive events.
    pub fn subscribe(&self) -> broadcast::Receiver<Arc<DomainEvent>> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}
