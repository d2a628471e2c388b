use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;

use crate::model::{ContainerReport, CycleStats};

/// Watch event
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WatchEvent {
    /// One container's diff outcome for a cycle
    ContainerReport(ContainerReport),

    /// A watcher finished a cycle
    CycleCompleted {
        watcher: String,
        cycle_id: String,
        stats: CycleStats,
        timestamp: chrono::DateTime<chrono::Utc>,
    },
}

impl WatchEvent {
    /// Create a cycle-completed event stamped now
    pub fn cycle_completed(
        watcher: impl Into<String>,
        cycle_id: impl Into<String>,
        stats: CycleStats,
    ) -> Self {
        WatchEvent::CycleCompleted {
            watcher: watcher.into(),
            cycle_id: cycle_id.into(),
            stats,
            timestamp: chrono::Utc::now(),
        }
    }

    /// Event key from the catalog
    pub fn key(&self) -> &'static str {
        match self {
            WatchEvent::ContainerReport(_) => events::CONTAINER_REPORT,
            WatchEvent::CycleCompleted { .. } => events::CYCLE_COMPLETED,
        }
    }
}

/// Event emitter
#[derive(Clone)]
pub struct EventEmitter {
    sender: Arc<broadcast::Sender<WatchEvent>>,
}

impl EventEmitter {
    /// Create a new event emitter
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender: Arc::new(sender),
        }
    }

    /// Emit an event
    pub fn emit(&self, event: WatchEvent) {
        let _ = self.sender.send(event);
    }

    /// Subscribe to events
    pub fn subscribe(&self) -> broadcast::Receiver<WatchEvent> {
        self.sender.subscribe()
    }

    /// Subscribe to events with a filter
    pub fn subscribe_filtered(
        &self,
        filter: impl Fn(&WatchEvent) -> bool + Send + Sync + 'static,
    ) -> EventStream {
        EventStream {
            receiver: self.sender.subscribe(),
            filter: Arc::new(filter),
            skipped: 0,
        }
    }

    /// Number of live subscribers
    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

/// Event stream with filtering
pub struct EventStream {
    receiver: broadcast::Receiver<WatchEvent>,
    filter: Arc<dyn Fn(&WatchEvent) -> bool + Send + Sync>,
    skipped: u64,
}

impl EventStream {
    /// Events lost to channel overflow since the last call
    pub fn take_skipped(&mut self) -> u64 {
        std::mem::take(&mut self.skipped)
    }

    /// Receive the next matching event, `None` once the emitter is gone
    pub async fn recv(&mut self) -> Option<WatchEvent> {
        loop {
            match self.receiver.recv().await {
                Ok(event) => {
                    if (self.filter)(&event) {
                        return Some(event);
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "Event subscriber lagging, events dropped");
                    self.skipped += skipped;
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

/// Event catalog - predefined event keys
pub mod events {
    pub const CONTAINER_REPORT: &str = "container.report";
    pub const CYCLE_COMPLETED: &str = "watcher.cycle.completed";
}
