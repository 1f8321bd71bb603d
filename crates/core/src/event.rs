//! Domain event system: decoupled observation of the reasoning loop.
//!
//! Events are published when something interesting happens. Front ends and
//! tests can subscribe without the loop knowing about them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;

/// All domain events in the system.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum DomainEvent {
    /// The model answered one request
    ResponseGenerated {
        model: String,
        round: u32,
        tokens_used: u32,
        timestamp: DateTime<Utc>,
    },

    /// A tool invocation finished (or failed to dispatch)
    ToolExecuted {
        tool_name: String,
        success: bool,
        duration_ms: u64,
        timestamp: DateTime<Utc>,
    },

    /// The loop gave up after exhausting its round budget
    RoundLimitReached {
        max_rounds: u32,
        timestamp: DateTime<Utc>,
    },

    /// An error occurred
    ErrorOccurred {
        context: String,
        error_message: String,
        timestamp: DateTime<Utc>,
    },
}

impl DomainEvent {
    /// Short name for log lines.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::ResponseGenerated { .. } => "response_generated",
            Self::ToolExecuted { .. } => "tool_executed",
            Self::RoundLimitReached { .. } => "round_limit_reached",
            Self::ErrorOccurred { .. } => "error_occurred",
        }
    }
}

/// A broadcast-based event bus for domain events.
///
/// Uses `tokio::sync::broadcast` for multi-consumer pub/sub.
pub struct EventBus {
    sender: broadcast::Sender<Arc<DomainEvent>>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish an event to all subscribers.
    pub fn publish(&self, event: DomainEvent) {
        // No subscribers is fine
        let _ = self.sender.send(Arc::new(event));
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Arc<DomainEvent>> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}
