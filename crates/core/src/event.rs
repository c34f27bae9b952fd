//! Domain events published by the session layer and the chat loop.
//!
//! Subscribers (the CLI, a future metrics sink) observe what happened
//! without the publishing code knowing who listens.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;

/// All domain events in the system.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum DomainEvent {
    /// A tool server failed to initialize; its tools are absent from the catalog
    SessionDegraded {
        server: String,
        reason: String,
        timestamp: DateTime<Utc>,
    },

    /// The model generated a response
    ResponseGenerated {
        conversation_id: String,
        model: String,
        tokens_used: u32,
        timestamp: DateTime<Utc>,
    },

    /// A tool was invoked on a server
    ToolInvoked {
        tool_name: String,
        server: String,
        success: bool,
        duration_ms: u64,
        timestamp: DateTime<Utc>,
    },

    /// The chat loop hit its round limit and truncated the turn
    RoundLimitReached {
        conversation_id: String,
        rounds: usize,
        timestamp: DateTime<Utc>,
    },

    /// An error occurred
    ErrorOccurred {
        context: String,
        error_message: String,
        timestamp: DateTime<Utc>,
    },
}

/// Broadcast bus for domain events.
///
/// Every subscriber sees every event; filtering is the subscriber's job.
pub struct EventBus {
    sender: broadcast::Sender<Arc<DomainEvent>>,
}

impl EventBus {
    /// Create a bus buffering up to `capacity` events per subscriber.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish an event to all subscribers.
    pub fn publish(&self, event: DomainEvent) {
        // send() errors only when nobody is subscribed
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
