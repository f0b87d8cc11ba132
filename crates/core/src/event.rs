//! Domain event system — decoupled observation of the request pipeline.
//!
//! The orchestrator publishes an event at each visible step of a request.
//! Subscribers (logs, stats, tests) react without the pipeline knowing about
//! them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;

/// All domain events in the system.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum DomainEvent {
    /// A message entered the pipeline
    MessageReceived {
        task_id: String,
        channel: String,
        sender_id: String,
        content_preview: String,
        timestamp: DateTime<Utc>,
    },

    /// The fast path answered without classification or routing
    FastPathServed {
        task_id: String,
        confidence: f32,
        timestamp: DateTime<Utc>,
    },

    /// A task was routed to an agent
    AgentRouted {
        task_id: String,
        agent: String,
        fallback: bool,
        timestamp: DateTime<Utc>,
    },

    /// An agent persisted a structured entity
    EntityCreated {
        task_id: String,
        entity_id: String,
        kind: String,
        timestamp: DateTime<Utc>,
    },

    /// The request failed; the user got the generic message
    RequestFailed {
        task_id: String,
        channel: String,
        error_message: String,
        timestamp: DateTime<Utc>,
    },

    /// A reply left the pipeline
    ReplySent {
        task_id: String,
        agent: Option<String>,
        duration_ms: u64,
        timestamp: DateTime<Utc>,
    },
}

impl DomainEvent {
    pub fn task_id(&self) -> &str {
        match self {
            DomainEvent::MessageReceived { task_id, .. }
            | DomainEvent::FastPathServed { task_id, .. }
            | DomainEvent::AgentRouted { task_id, .. }
            | DomainEvent::EntityCreated { task_id, .. }
            | DomainEvent::RequestFailed { task_id, .. }
            | DomainEvent::ReplySent { task_id, .. } => task_id,
        }
    }
}

/// A broadcast-based event bus for domain events.
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

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn event_bus_publish_subscribe() {
        let bus = EventBus::new(16);
        let mut rx = bus.subscribe();

        bus.publish(DomainEvent::AgentRouted {
            task_id: "t1".into(),
            agent: "event_creation".into(),
            fallback: false,
            timestamp: Utc::now(),
        });

        let event = rx.recv().await.unwrap();
        assert_eq!(event.task_id(), "t1");
        match event.as_ref() {
            DomainEvent::AgentRouted { agent, fallback, .. } => {
                assert_eq!(agent, "event_creation");
                assert!(!fallback);
            }
            _ => panic!("Expected AgentRouted event"),
        }
    }

    #[test]
    fn publishing_without_subscribers_is_silent() {
        let bus = EventBus::new(16);
        bus.publish(DomainEvent::RequestFailed {
            task_id: "t2".into(),
            channel: "cli".into(),
            error_message: "boom".into(),
            timestamp: Utc::now(),
        });
    }
}
