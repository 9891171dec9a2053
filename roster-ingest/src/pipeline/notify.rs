//! Progress event publishing for one import

use chrono::Utc;
use roster_common::events::{EventBus, ImportEvent};
use uuid::Uuid;

use crate::models::ImportReport;

/// Emits [`ImportEvent`]s tagged with one import id
///
/// Without a bus every call is a no-op, so the pipeline runs the same with or
/// without subscribers.
#[derive(Debug, Clone)]
pub struct Notifier {
    bus: Option<EventBus>,
    import_id: Uuid,
}

impl Notifier {
    pub fn new(bus: Option<EventBus>, import_id: Uuid) -> Self {
        Self { bus, import_id }
    }

    pub fn import_id(&self) -> Uuid {
        self.import_id
    }

    fn emit(&self, event: ImportEvent) {
        if let Some(bus) = &self.bus {
            bus.emit_lossy(event);
        }
    }

    pub fn started(&self) {
        self.emit(ImportEvent::ImportStarted {
            import_id: self.import_id,
            timestamp: Utc::now(),
        });
    }

    pub fn batch_committed(&self, batch_id: u64, records: usize, threshold: usize) {
        self.emit(ImportEvent::BatchCommitted {
            import_id: self.import_id,
            batch_id,
            records,
            threshold,
            timestamp: Utc::now(),
        });
    }

    pub fn batch_retrying(&self, batch_id: u64, attempt: u32, delay_ms: u64, reason: &str) {
        self.emit(ImportEvent::BatchRetrying {
            import_id: self.import_id,
            batch_id,
            attempt,
            delay_ms,
            reason: reason.to_string(),
            timestamp: Utc::now(),
        });
    }

    pub fn batch_exhausted(&self, batch_id: u64, records: usize) {
        self.emit(ImportEvent::BatchExhausted {
            import_id: self.import_id,
            batch_id,
            records,
            timestamp: Utc::now(),
        });
    }

    pub fn still_processing(&self, batch_id: u64, elapsed_ms: u64, rows_seen: u64) {
        self.emit(ImportEvent::StillProcessing {
            import_id: self.import_id,
            batch_id,
            elapsed_ms,
            rows_seen,
            timestamp: Utc::now(),
        });
    }

    pub fn failed(&self, error: &str) {
        self.emit(ImportEvent::ImportFailed {
            import_id: self.import_id,
            error: error.to_string(),
            timestamp: Utc::now(),
        });
    }

    pub fn completed(&self, report: &ImportReport) {
        self.emit(ImportEvent::ImportCompleted {
            import_id: self.import_id,
            success: report.success,
            total: report.stats.total,
            valid: report.stats.valid,
            invalid: report.stats.invalid,
            failed_batches: report.failed_batches.clone(),
            elapsed_ms: report.elapsed_ms,
            timestamp: Utc::now(),
        });
    }
}
