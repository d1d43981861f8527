//! Turn events: trace records and answer chunks pushed to the caller.
//!
//! Delivery is best effort: publishing never blocks and a lost event is
//! never a turn failure.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;

/// Events emitted while a turn runs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TurnEvent {
    /// A trace record rendered as markdown
    Trace {
        markdown: String,
        timestamp: DateTime<Utc>,
    },

    /// A piece of the answer, for streaming callers
    Chunk { content: String },
}

impl TurnEvent {
    pub fn trace(markdown: impl Into<String>) -> Self {
        Self::Trace {
            markdown: markdown.into(),
            timestamp: Utc::now(),
        }
    }
}

/// A broadcast-based event bus for turn events.
///
/// Uses `tokio::sync::broadcast`: slow subscribers lag and drop events
/// instead of back-pressuring the turn.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<Arc<TurnEvent>>,
}

impl EventBus {
    /// Create a new event bus with the given capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish an event to all subscribers.
    pub fn publish(&self, event: TurnEvent) {
        // No subscribers is fine
        let _ = self.sender.send(Arc::new(event));
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Arc<TurnEvent>> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}
