// src/event.rs
use tokio::sync::broadcast;
use tracing::trace;

/// Lifecycle events broadcast by the queue engine.
///
/// Delivery is best-effort and in-process; the engine never depends on an
/// observer receiving these. Job events carry the task name and payload so
/// observers can act without a storage round trip.
#[derive(Debug, Clone, PartialEq)]
pub enum QueueEvent {
    /// The queue transitioned from stopped to running.
    Started,
    /// The queue transitioned from running to stopped.
    Stopped,
    JobSucceeded {
        task: String,
        data: serde_json::Value,
    },
    JobFailed {
        task: String,
        data: serde_json::Value,
        /// True when the job was dropped permanently (retry budget
        /// exhausted or worker-signaled critical failure).
        critical: bool,
    },
    /// No pending jobs remain and nothing is in flight.
    Drained,
    /// A storage adapter call failed; the engine halted until the next
    /// `start()`. Distinct from job-level failure.
    StorageFailed { error: String },
}

/// Broadcast fan-out for [`QueueEvent`], zero or more subscribers.
#[derive(Clone)]
pub struct EventEmitter {
    tx: broadcast::Sender<QueueEvent>,
}

impl EventEmitter {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Subscribe to events emitted after this call. Slow subscribers that
    /// fall behind the channel capacity miss the oldest events.
    pub fn subscribe(&self) -> broadcast::Receiver<QueueEvent> {
        self.tx.subscribe()
    }

    pub(crate) fn emit(&self, event: QueueEvent) {
        trace!(?event, "emitting queue event");
        // No subscribers is fine.
        let _ = self.tx.send(event);
    }
}
