use crate::state::{StageId, WorkflowNode};
use crate::types::SessionId;

/// Progress events published by the workflow engine.
#[derive(Debug, Clone)]
pub enum WorkflowEvent {
    SessionStarted {
        session_id: SessionId,
        topic: String,
    },
    StageStarted {
        session_id: SessionId,
        stage: StageId,
        feedback: Option<String>,
    },
    StageCommitted {
        session_id: SessionId,
        stage: StageId,
        elapsed_ms: u64,
    },
    StageFailed {
        session_id: SessionId,
        stage: StageId,
        error: String,
    },
    Suspended {
        session_id: SessionId,
        gate: WorkflowNode,
    },
    Completed {
        session_id: SessionId,
    },
}

/// Event bus using tokio broadcast channel.
/// All subscribers receive all events.
pub struct EventBus {
    tx: tokio::sync::broadcast::Sender<WorkflowEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = tokio::sync::broadcast::channel(capacity);
        Self { tx }
    }

    pub fn publish(&self, event: WorkflowEvent) {
        // Ignore error if no receivers
        let _ = self.tx.send(event);
    }

    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<WorkflowEvent> {
        self.tx.subscribe()
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
    async fn subscribers_receive_published_events() {
        let bus = EventBus::default();
        let mut rx = bus.subscribe();
        bus.publish(WorkflowEvent::Completed {
            session_id: SessionId::from_str("s1"),
        });
        match rx.recv().await.unwrap() {
            WorkflowEvent::Completed { session_id } => assert_eq!(session_id.as_str(), "s1"),
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn publish_without_subscribers_is_silent() {
        let bus = EventBus::new(4);
        bus.publish(WorkflowEvent::Completed {
            session_id: SessionId::new(),
        });
    }
}
