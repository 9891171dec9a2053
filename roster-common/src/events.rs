//! Import progress events
//!
//! Events are broadcast over a `tokio::sync::broadcast` channel. Slow subscribers
//! lose the oldest events rather than stalling the import.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

/// Progress events emitted by a running import
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ImportEvent {
    /// Header resolved, rows are about to flow
    ImportStarted {
        import_id: Uuid,
        timestamp: DateTime<Utc>,
    },

    /// A batch committed
    BatchCommitted {
        import_id: Uuid,
        batch_id: u64,
        records: usize,
        /// Flush threshold after this batch was accounted for
        threshold: usize,
        timestamp: DateTime<Utc>,
    },

    /// A batch hit a transient failure and will be retried
    BatchRetrying {
        import_id: Uuid,
        batch_id: u64,
        attempt: u32,
        delay_ms: u64,
        reason: String,
        timestamp: DateTime<Utc>,
    },

    /// A batch ran out of retries and was not persisted
    BatchExhausted {
        import_id: Uuid,
        batch_id: u64,
        records: usize,
        timestamp: DateTime<Utc>,
    },

    /// A single flush has been running longer than the stall notice interval
    StillProcessing {
        import_id: Uuid,
        batch_id: u64,
        elapsed_ms: u64,
        rows_seen: u64,
        timestamp: DateTime<Utc>,
    },

    /// Import finished (successfully or not)
    ImportCompleted {
        import_id: Uuid,
        success: bool,
        total: u64,
        valid: u64,
        invalid: u64,
        failed_batches: Vec<u64>,
        elapsed_ms: u64,
        timestamp: DateTime<Utc>,
    },

    /// Import aborted on a fatal error
    ImportFailed {
        import_id: Uuid,
        error: String,
        timestamp: DateTime<Utc>,
    },
}

impl ImportEvent {
    /// Event name used for SSE `event:` lines
    pub fn event_type(&self) -> &'static str {
        match self {
            ImportEvent::ImportStarted { .. } => "ImportStarted",
            ImportEvent::BatchCommitted { .. } => "BatchCommitted",
            ImportEvent::BatchRetrying { .. } => "BatchRetrying",
            ImportEvent::BatchExhausted { .. } => "BatchExhausted",
            ImportEvent::StillProcessing { .. } => "StillProcessing",
            ImportEvent::ImportCompleted { .. } => "ImportCompleted",
            ImportEvent::ImportFailed { .. } => "ImportFailed",
        }
    }

    pub fn import_id(&self) -> Uuid {
        match self {
            ImportEvent::ImportStarted { import_id, .. }
            | ImportEvent::BatchCommitted { import_id, .. }
            | ImportEvent::BatchRetrying { import_id, .. }
            | ImportEvent::BatchExhausted { import_id, .. }
            | ImportEvent::StillProcessing { import_id, .. }
            | ImportEvent::ImportCompleted { import_id, .. }
            | ImportEvent::ImportFailed { import_id, .. } => *import_id,
        }
    }
}

/// Broadcast bus for import events
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<ImportEvent>,
    capacity: usize,
}

impl EventBus {
    /// Creates a new EventBus buffering up to `capacity` events per subscriber
    ///
    /// ```
    /// use roster_common::events::EventBus;
    ///
    /// let event_bus = EventBus::new(100);
    /// assert_eq!(event_bus.capacity(), 100);
    /// ```
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, capacity }
    }

    /// Subscribe to all future events
    pub fn subscribe(&self) -> broadcast::Receiver<ImportEvent> {
        self.tx.subscribe()
    }

    /// Emit an event to all subscribers
    ///
    /// Returns `Err` if no subscribers are listening.
    #[allow(clippy::result_large_err)]
    pub fn emit(
        &self,
        event: ImportEvent,
    ) -> Result<usize, broadcast::error::SendError<ImportEvent>> {
        self.tx.send(event)
    }

    /// Emit an event, ignoring if no subscribers are listening
    pub fn emit_lossy(&self, event: ImportEvent) {
        let _ = self.tx.send(event);
    }

    /// Get the current number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn failed(error: &str) -> ImportEvent {
        ImportEvent::ImportFailed {
            import_id: Uuid::nil(),
            error: error.to_string(),
            timestamp: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_subscriber_receives_emitted_event() {
        let bus = EventBus::new(10);
        let mut rx = bus.subscribe();

        assert_eq!(bus.emit(failed("boom")).unwrap(), 1);

        let received = rx.recv().await.unwrap();
        assert_eq!(received.event_type(), "ImportFailed");
        assert_eq!(received.import_id(), Uuid::nil());
    }

    #[test]
    fn test_emit_without_subscribers() {
        let bus = EventBus::new(10);
        assert_eq!(bus.subscriber_count(), 0);
        assert!(bus.emit(failed("nobody listening")).is_err());

        // Lossy emit never fails
        bus.emit_lossy(failed("nobody listening"));
    }

    #[test]
    fn test_event_serializes_with_type_tag() {
        let json = serde_json::to_value(failed("bad header")).unwrap();
        assert_eq!(json["type"], "ImportFailed");
        assert_eq!(json["error"], "bad header");
    }
}
