//! Event Bus
//!
//! In-process broadcast plane connecting publishers (phases, the state
//! store, the agent tailer) to subscribers (the WebSocket hub). Events
//! carry their run id so receivers can partition; dropping an event
//! when nobody subscribes is fine.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::broadcast;

use crate::log_entry::LogEntry;

/// Phase lifecycle status carried by `status_update` events
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PhaseStatus {
    Started,
    Running,
    Completed,
    Failed,
}

/// Events published on the bus and fanned out to WebSocket sessions
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum BusEvent {
    StatusUpdate {
        run_id: String,
        phase: String,
        status: PhaseStatus,
        progress: u8,
        #[serde(skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },
    WorkflowLog(LogEntry),
    StateChange {
        run_id: String,
        phase_marker: String,
        changed_fields: Vec<String>,
        snapshot: Value,
    },
    WorktreeDeleted {
        run_id: String,
    },
}

impl BusEvent {
    /// Partition key of the event.
    pub fn run_id(&self) -> &str {
        match self {
            BusEvent::StatusUpdate { run_id, .. } => run_id,
            BusEvent::WorkflowLog(entry) => &entry.run_id,
            BusEvent::StateChange { run_id, .. } => run_id,
            BusEvent::WorktreeDeleted { run_id } => run_id,
        }
    }

    pub fn status_update(
        run_id: impl Into<String>,
        phase: impl Into<String>,
        status: PhaseStatus,
        progress: u8,
    ) -> Self {
        BusEvent::StatusUpdate {
            run_id: run_id.into(),
            phase: phase.into(),
            status,
            progress: progress.min(100),
            message: None,
        }
    }

    pub fn with_message(self, message: impl Into<String>) -> Self {
        match self {
            BusEvent::StatusUpdate {
                run_id,
                phase,
                status,
                progress,
                ..
            } => BusEvent::StatusUpdate {
                run_id,
                phase,
                status,
                progress,
                message: Some(message.into()),
            },
            other => other,
        }
    }
}

/// Broadcast bus handle, cheap to clone
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<BusEvent>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(1024)
    }
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Publish an event. Never blocks; lagging subscribers drop.
    pub fn publish(&self, event: BusEvent) {
        let _ = self.tx.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<BusEvent> {
        self.tx.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::log_entry::LogLevel;

    #[tokio::test]
    async fn test_publish_reaches_subscriber() {
        let bus = EventBus::default();
        let mut rx = bus.subscribe();
        bus.publish(BusEvent::WorktreeDeleted {
            run_id: "a1b2c3d4".into(),
        });
        let event = rx.recv().await.unwrap();
        assert_eq!(event.run_id(), "a1b2c3d4");
    }

    #[tokio::test]
    async fn test_publish_without_subscribers_is_ok() {
        let bus = EventBus::default();
        bus.publish(BusEvent::WorkflowLog(LogEntry::new(
            "a1b2c3d4",
            "plan",
            LogLevel::Info,
            "no listeners",
        )));
    }

    #[test]
    fn test_wire_shape() {
        let event = BusEvent::status_update("a1b2c3d4", "build", PhaseStatus::Started, 0);
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "status_update");
        assert_eq!(json["data"]["run_id"], "a1b2c3d4");
        assert_eq!(json["data"]["status"], "started");
    }
}
