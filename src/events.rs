//! In-process event surface.
//!
//! One broadcast channel carries workflow notifications to in-process
//! subscribers (no external message bus). Emission is fire-and-forget and
//! always happens after the storage transaction has committed: a crash
//! between commit and emit loses the notification but never the state
//! change, and a delivery failure is logged rather than propagated.

use serde::Serialize;
use tokio::sync::broadcast;

use crate::phases::Phase;

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", content = "data")]
pub enum WorkflowEvent {
    ApplicationCreated {
        application_id: String,
        status: Phase,
    },
    ApplicationAdvanced {
        application_id: String,
        by: String,
        to: Phase,
    },
}

pub type EventSender = broadcast::Sender<WorkflowEvent>;

pub fn channel(capacity: usize) -> (EventSender, broadcast::Receiver<WorkflowEvent>) {
    broadcast::channel(capacity)
}

/// Send an event to whoever is listening. A send error only means there are
/// no subscribers right now.
pub fn publish(tx: &EventSender, event: WorkflowEvent) {
    if let Err(e) = tx.send(event) {
        tracing::debug!("no event subscribers: {}", e);
    }
}
