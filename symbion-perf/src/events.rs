//! Monitor event stream
//!
//! Fan-out over a tokio broadcast channel. Publishing never waits on
//! subscribers: a receiver that falls behind by more than the buffer loses
//! its oldest events (`RecvError::Lagged`). Dropping a receiver unsubscribes.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::broadcast;
use tracing::trace;

use crate::optimizer::OptimizationRecord;
use crate::thresholds::Alert;

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum MonitorEvent {
    Started { interval_ms: u64 },
    Stopped,
    SnapshotCollected { timestamp: DateTime<Utc>, health_score: f64 },
    AlertsRaised { alerts: Vec<Alert> },
    OptimizationsApplied { records: Vec<OptimizationRecord> },
    Error { message: String },
}

impl MonitorEvent {
    /// Stable event name, also used as the publication topic suffix
    pub fn name(&self) -> &'static str {
        match self {
            MonitorEvent::Started { .. } => "started",
            MonitorEvent::Stopped => "stopped",
            MonitorEvent::SnapshotCollected { .. } => "snapshot_collected",
            MonitorEvent::AlertsRaised { .. } => "alerts_raised",
            MonitorEvent::OptimizationsApplied { .. } => "optimizations_applied",
            MonitorEvent::Error { .. } => "error",
        }
    }
}

pub type EventReceiver = broadcast::Receiver<MonitorEvent>;

#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<MonitorEvent>,
}

impl EventBus {
    pub fn new(buffer: usize) -> Self {
        let (sender, _) = broadcast::channel(buffer.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> EventReceiver {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    pub fn publish(&self, event: MonitorEvent) {
        let name = event.name();
        // Err only means nobody is listening
        if self.sender.send(event).is_err() {
            trace!("No subscribers for {} event", name);
        }
    }
}
