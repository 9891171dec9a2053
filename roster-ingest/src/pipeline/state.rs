//! Per-import mutable state and report aggregation
//!
//! One `ImportState` exists per pipeline run. Stages receive it by `&mut` in strict
//! sequence, so no two stages ever touch it at once.

use std::time::Instant;
use uuid::Uuid;

use super::{AdaptiveBatchController, BatchOutcome, ValidationError};
use crate::config::ImportConfig;
use crate::models::{ImportReport, ImportStats, RowRejection};

/// Rejection detail with bounded memory
///
/// Keeps the first `cap` rejections in full, then logs a summary every
/// `log_every` rejections.
#[derive(Debug, Clone)]
pub struct RejectionLog {
    cap: usize,
    log_every: u64,
    count: u64,
    details: Vec<RowRejection>,
}

impl RejectionLog {
    pub fn new(cap: usize, log_every: u64) -> Self {
        Self {
            cap,
            log_every: log_every.max(1),
            count: 0,
            details: Vec::new(),
        }
    }

    pub fn record(&mut self, rejection: RowRejection) {
        self.count += 1;

        if self.details.len() < self.cap {
            tracing::debug!(
                line = rejection.line,
                field = %rejection.field,
                reason = %rejection.reason,
                "Row rejected"
            );
            self.details.push(rejection);
        } else if self.count % self.log_every == 0 {
            tracing::info!(
                rejected = self.count,
                line = rejection.line,
                "Rows rejected so far (detail cap reached, sampling)"
            );
        }
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn details(&self) -> &[RowRejection] {
        &self.details
    }

    pub fn is_truncated(&self) -> bool {
        self.count > self.details.len() as u64
    }
}

/// Counters, batch bookkeeping and the adaptive threshold of one import
#[derive(Debug)]
pub struct ImportState {
    import_id: Uuid,
    started_at: Instant,
    total: u64,
    valid: u64,
    invalid: u64,
    last_batch_id: u64,
    batches_committed: u64,
    persisted: u64,
    unpersisted: u64,
    failed_batches: Vec<u64>,
    fatal_error: Option<String>,
    rejections: RejectionLog,
    pub controller: AdaptiveBatchController,
}

impl ImportState {
    pub fn new(import_id: Uuid, config: &ImportConfig) -> Self {
        Self {
            import_id,
            started_at: Instant::now(),
            total: 0,
            valid: 0,
            invalid: 0,
            last_batch_id: 0,
            batches_committed: 0,
            persisted: 0,
            unpersisted: 0,
            failed_batches: Vec::new(),
            fatal_error: None,
            rejections: RejectionLog::new(config.rejection_detail_cap, config.rejection_log_every),
            controller: AdaptiveBatchController::new(config),
        }
    }

    pub fn import_id(&self) -> Uuid {
        self.import_id
    }

    pub fn record_valid(&mut self) {
        self.total += 1;
        self.valid += 1;
    }

    pub fn record_invalid(&mut self, line: u64, err: &ValidationError) {
        self.total += 1;
        self.invalid += 1;
        self.rejections.record(RowRejection {
            line,
            field: err.field.as_str().to_string(),
            reason: err.reason.to_string(),
        });
    }

    /// Row the reader could not decode (e.g. invalid UTF-8)
    pub fn record_malformed(&mut self, line: u64, reason: impl Into<String>) {
        self.total += 1;
        self.invalid += 1;
        self.rejections.record(RowRejection {
            line,
            field: "row".to_string(),
            reason: reason.into(),
        });
    }

    /// Assign the next batch sequence number
    pub fn next_batch_id(&mut self) -> u64 {
        self.last_batch_id += 1;
        self.last_batch_id
    }

    pub fn record_committed(&mut self, outcome: &BatchOutcome) {
        self.batches_committed += 1;
        self.persisted += outcome.fulfilled as u64;
        self.unpersisted += outcome.rejected.len() as u64;
    }

    /// Batch permanently failed (retries exhausted or non-transient error);
    /// its records are valid but not persisted
    pub fn record_failed_batch(&mut self, batch_id: u64, records: usize) {
        if !self.failed_batches.contains(&batch_id) {
            self.failed_batches.push(batch_id);
        }
        self.unpersisted += records as u64;
    }

    /// Valid records dropped without ever reaching a batch
    pub fn record_discarded(&mut self, records: usize) {
        self.unpersisted += records as u64;
    }

    /// Set the import's fatal error; the first one wins
    pub fn record_fatal(&mut self, error: impl Into<String>) {
        if self.fatal_error.is_none() {
            self.fatal_error = Some(error.into());
        }
    }

    /// Fatal error set: no further batches may be flushed
    pub fn is_halted(&self) -> bool {
        self.fatal_error.is_some()
    }

    pub fn stats(&self) -> ImportStats {
        ImportStats {
            total: self.total,
            valid: self.valid,
            invalid: self.invalid,
        }
    }

    pub fn failed_batches(&self) -> &[u64] {
        &self.failed_batches
    }

    pub fn elapsed_ms(&self) -> u64 {
        self.started_at.elapsed().as_millis() as u64
    }

    /// Build a report from the current counters
    ///
    /// Success requires no fatal error, at least one valid record, and at least
    /// one committed batch.
    pub fn snapshot(&self) -> ImportReport {
        let error = if let Some(fatal) = &self.fatal_error {
            Some(fatal.clone())
        } else if self.valid == 0 {
            Some("No valid records found".to_string())
        } else if self.batches_committed == 0 {
            Some(format!(
                "No batches were persisted ({} failed after retries)",
                self.failed_batches.len()
            ))
        } else {
            None
        };

        ImportReport {
            import_id: self.import_id,
            success: error.is_none(),
            error,
            stats: self.stats(),
            failed_batches: self.failed_batches.clone(),
            batches_committed: self.batches_committed,
            persisted: self.persisted,
            unpersisted: self.unpersisted,
            elapsed_ms: self.elapsed_ms(),
            rejections: self.rejections.details().to_vec(),
            rejections_truncated: self.rejections.is_truncated(),
        }
    }

    /// Final report; consumes the state
    pub fn into_report(self) -> ImportReport {
        self.snapshot()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::{Field, RejectedRecord, ValidationReason};

    fn state() -> ImportState {
        ImportState::new(Uuid::new_v4(), &ImportConfig::default())
    }

    fn missing_email() -> ValidationError {
        ValidationError {
            field: Field::Email,
            reason: ValidationReason::Missing,
        }
    }

    fn committed(fulfilled: usize) -> BatchOutcome {
        BatchOutcome {
            batch_id: 1,
            attempted: fulfilled,
            fulfilled,
            ..BatchOutcome::default()
        }
    }

    #[test]
    fn test_counts_stay_balanced() {
        let mut s = state();
        s.record_valid();
        s.record_invalid(3, &missing_email());
        s.record_malformed(4, "invalid UTF-8");
        s.record_valid();

        let stats = s.stats();
        assert_eq!(stats.total, 4);
        assert_eq!(stats.valid, 2);
        assert_eq!(stats.invalid, 2);
        assert_eq!(stats.total, stats.valid + stats.invalid);
    }

    #[test]
    fn test_batch_ids_are_monotonic_from_one() {
        let mut s = state();
        assert_eq!(s.next_batch_id(), 1);
        assert_eq!(s.next_batch_id(), 2);
        assert_eq!(s.next_batch_id(), 3);
    }

    #[test]
    fn test_success_requires_valid_records() {
        let mut s = state();
        s.record_invalid(2, &missing_email());
        let report = s.snapshot();
        assert!(!report.success);
        assert_eq!(report.error.as_deref(), Some("No valid records found"));
    }

    #[test]
    fn test_exhausted_batch_recorded_once() {
        let mut s = state();
        for _ in 0..3 {
            s.record_valid();
        }
        s.record_committed(&committed(2));
        s.record_failed_batch(2, 1);
        s.record_failed_batch(2, 0);

        let report = s.into_report();
        assert!(report.success);
        assert_eq!(report.failed_batches, vec![2]);
        assert_eq!(report.persisted, 2);
        assert_eq!(report.unpersisted, 1);
    }

    #[test]
    fn test_only_batch_exhausted_is_failure() {
        let mut s = state();
        s.record_valid();
        s.record_failed_batch(1, 1);

        let report = s.into_report();
        assert!(!report.success);
        assert_eq!(report.stats.valid, 1);
        assert_eq!(report.failed_batches, vec![1]);
    }

    #[test]
    fn test_first_fatal_error_wins() {
        let mut s = state();
        s.record_valid();
        s.record_committed(&committed(1));
        s.record_fatal("constraint violation");
        s.record_fatal("later error");

        assert!(s.is_halted());
        let report = s.into_report();
        assert!(!report.success);
        assert_eq!(report.error.as_deref(), Some("constraint violation"));
    }

    #[test]
    fn test_rejected_records_count_as_unpersisted() {
        let mut s = state();
        s.record_valid();
        s.record_valid();
        s.record_committed(&BatchOutcome {
            batch_id: 1,
            attempted: 2,
            fulfilled: 1,
            rejected: vec![RejectedRecord {
                email: "x@example.com".to_string(),
                reason: "nope".to_string(),
            }],
            ..BatchOutcome::default()
        });

        let report = s.snapshot();
        assert_eq!(report.persisted, 1);
        assert_eq!(report.unpersisted, 1);
    }

    #[test]
    fn test_discarded_records_count_as_unpersisted() {
        let mut s = state();
        s.record_valid();
        s.record_valid();
        s.record_discarded(2);
        s.record_fatal("Unreadable input: reset");

        let report = s.into_report();
        assert_eq!(report.stats.valid, 2);
        assert_eq!(report.persisted + report.unpersisted, report.stats.valid);
        assert!(report.failed_batches.is_empty());
    }

    #[test]
    fn test_rejection_detail_is_capped() {
        let mut log = RejectionLog::new(2, 10);
        for line in 0..25 {
            log.record(RowRejection {
                line,
                field: "email".to_string(),
                reason: "missing".to_string(),
            });
        }
        assert_eq!(log.count(), 25);
        assert_eq!(log.details().len(), 2);
        assert_eq!(log.details()[1].line, 1);
        assert!(log.is_truncated());
    }
}
