//! Bounded retry around one batch write
//!
//! Transient failures are retried with exponential backoff up to `max_retries`
//! times; each retry also shrinks the adaptive threshold. Fatal failures are
//! never retried. A batch that runs out of retries is recorded once and the
//! import moves on; a fatal batch is recorded the same way before the import halts.

use std::time::Duration;

use super::{Batch, BatchError, BatchOutcome, ImportState, Notifier, RecordSink};
use crate::config::ImportConfig;

/// Backoff schedule for batch retries
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &ImportConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            base_delay: Duration::from_millis(config.retry_base_delay_ms),
            max_delay: Duration::from_millis(config.retry_max_delay_ms),
        }
    }

    /// Delay before retry number `retry` (1-based): base doubled per retry, capped
    pub fn delay_for(&self, retry: u32) -> Duration {
        let exponent = retry.saturating_sub(1).min(31);
        self.base_delay
            .saturating_mul(1u32 << exponent)
            .min(self.max_delay)
    }
}

/// How a batch finally settled
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchResolution {
    Committed(BatchOutcome),
    /// Transient failures outlasted the retry budget
    Exhausted { attempts: u32, last_error: BatchError },
    /// Non-retryable failure; the import must halt
    Fatal(BatchError),
}

/// Drives one batch through the sink until it commits, exhausts, or fails fatally
pub struct RetryCoordinator<'a, S: RecordSink + ?Sized> {
    sink: &'a S,
    policy: RetryPolicy,
    notifier: &'a Notifier,
}

impl<'a, S: RecordSink + ?Sized> RetryCoordinator<'a, S> {
    pub fn new(sink: &'a S, policy: RetryPolicy, notifier: &'a Notifier) -> Self {
        Self {
            sink,
            policy,
            notifier,
        }
    }

    pub async fn execute(&self, batch: &Batch, state: &mut ImportState) -> BatchResolution {
        let mut attempt = 0u32;

        loop {
            match self.sink.save_many(batch, attempt).await {
                Ok(outcome) => {
                    state.record_committed(&outcome);
                    state.controller.on_commit();
                    let threshold = state.controller.threshold();

                    if attempt > 0 {
                        tracing::info!(
                            batch_id = batch.id,
                            attempt,
                            records = outcome.fulfilled,
                            "Batch committed after retry"
                        );
                    } else {
                        tracing::debug!(
                            batch_id = batch.id,
                            records = outcome.fulfilled,
                            chunks = outcome.chunks,
                            threshold,
                            "Batch committed"
                        );
                    }
                    if !outcome.rejected.is_empty() {
                        tracing::warn!(
                            batch_id = batch.id,
                            rejected = outcome.rejected.len(),
                            "Batch committed with rejected records"
                        );
                    }

                    self.notifier
                        .batch_committed(batch.id, outcome.fulfilled, threshold);
                    return BatchResolution::Committed(outcome);
                }
                Err(err) if err.is_transient() && attempt < self.policy.max_retries => {
                    attempt += 1;
                    let delay = self.policy.delay_for(attempt);
                    let threshold = state.controller.on_retry();

                    tracing::warn!(
                        batch_id = batch.id,
                        attempt,
                        max_retries = self.policy.max_retries,
                        backoff_ms = delay.as_millis() as u64,
                        threshold,
                        error = %err,
                        "Transient batch failure, will retry after backoff"
                    );
                    self.notifier.batch_retrying(
                        batch.id,
                        attempt,
                        delay.as_millis() as u64,
                        &err.message,
                    );

                    tokio::time::sleep(delay).await;
                }
                Err(err) if err.is_transient() => {
                    tracing::error!(
                        batch_id = batch.id,
                        attempts = attempt + 1,
                        records = batch.len(),
                        error = %err,
                        "Batch failed: retries exhausted, continuing with next batch"
                    );
                    state.record_failed_batch(batch.id, batch.len());
                    self.notifier.batch_exhausted(batch.id, batch.len());
                    return BatchResolution::Exhausted {
                        attempts: attempt + 1,
                        last_error: err,
                    };
                }
                Err(err) => {
                    tracing::error!(
                        batch_id = batch.id,
                        attempt,
                        records = batch.len(),
                        error = %err,
                        "Fatal batch failure, halting import"
                    );
                    state.record_failed_batch(batch.id, batch.len());
                    state.record_fatal(format!("Batch {} failed: {}", batch.id, err.summary()));
                    return BatchResolution::Fatal(err);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Record;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use uuid::Uuid;

    /// Fails the first `failures` calls with `kind`, then commits
    struct ScriptedSink {
        failures: u32,
        error: BatchError,
        attempts_seen: Mutex<Vec<u32>>,
    }

    impl ScriptedSink {
        fn new(failures: u32, error: BatchError) -> Self {
            Self {
                failures,
                error,
                attempts_seen: Mutex::new(Vec::new()),
            }
        }

        fn attempts(&self) -> Vec<u32> {
            self.attempts_seen.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl RecordSink for ScriptedSink {
        async fn save_many(&self, batch: &Batch, attempt: u32) -> Result<BatchOutcome, BatchError> {
            let mut seen = self.attempts_seen.lock().unwrap();
            seen.push(attempt);
            if (seen.len() as u32) <= self.failures {
                return Err(self.error.clone());
            }
            Ok(BatchOutcome::all_fulfilled(batch, batch.len() as u64, 1))
        }
    }

    fn fast_policy(max_retries: u32) -> RetryPolicy {
        RetryPolicy {
            max_retries,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(4),
        }
    }

    fn batch(id: u64, n: usize) -> Batch {
        let records = (0..n)
            .map(|i| Record::new(format!("user{i}@example.com"), "User", None))
            .collect();
        Batch::new(id, records)
    }

    fn state() -> ImportState {
        ImportState::new(Uuid::new_v4(), &ImportConfig::default())
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let policy = RetryPolicy {
            max_retries: 10,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(1_000),
        };
        assert_eq!(policy.delay_for(1), Duration::from_millis(100));
        assert_eq!(policy.delay_for(2), Duration::from_millis(200));
        assert_eq!(policy.delay_for(3), Duration::from_millis(400));
        assert_eq!(policy.delay_for(5), Duration::from_millis(1_000));
        assert_eq!(policy.delay_for(40), Duration::from_millis(1_000));
    }

    #[tokio::test]
    async fn test_commits_first_try() {
        let sink = ScriptedSink::new(0, BatchError::transient("busy"));
        let notifier = Notifier::new(None, Uuid::new_v4());
        let mut state = state();

        let resolution = RetryCoordinator::new(&sink, fast_policy(3), &notifier)
            .execute(&batch(1, 5), &mut state)
            .await;

        assert!(matches!(resolution, BatchResolution::Committed(ref o) if o.fulfilled == 5));
        assert_eq!(sink.attempts(), vec![0]);
        assert_eq!(state.controller.threshold(), 100);
    }

    #[tokio::test]
    async fn test_transient_failure_retried_then_commits() {
        let sink = ScriptedSink::new(2, BatchError::transient("database is locked"));
        let notifier = Notifier::new(None, Uuid::new_v4());
        let mut state = state();

        let resolution = RetryCoordinator::new(&sink, fast_policy(3), &notifier)
            .execute(&batch(1, 3), &mut state)
            .await;

        assert!(matches!(resolution, BatchResolution::Committed(_)));
        // Attempt number reaches the sink so it can shrink chunk size
        assert_eq!(sink.attempts(), vec![0, 1, 2]);
        // Two retries: 100 -> 70 -> 50 (floor)
        assert_eq!(state.controller.threshold(), 50);
        assert!(state.failed_batches().is_empty());
    }

    #[tokio::test]
    async fn test_retries_exhausted() {
        let sink = ScriptedSink::new(u32::MAX, BatchError::transient("timed out"));
        let notifier = Notifier::new(None, Uuid::new_v4());
        let mut state = state();

        let resolution = RetryCoordinator::new(&sink, fast_policy(3), &notifier)
            .execute(&batch(7, 4), &mut state)
            .await;

        match resolution {
            BatchResolution::Exhausted {
                attempts,
                last_error,
            } => {
                assert_eq!(attempts, 4);
                assert!(last_error.is_transient());
            }
            other => panic!("expected exhaustion, got {:?}", other),
        }
        assert_eq!(sink.attempts().len(), 4);
        assert_eq!(state.failed_batches(), &[7]);
        assert!(!state.is_halted());
    }

    #[tokio::test]
    async fn test_fatal_failure_not_retried() {
        let sink = ScriptedSink::new(u32::MAX, BatchError::fatal("no such table: contacts"));
        let notifier = Notifier::new(None, Uuid::new_v4());
        let mut state = state();

        let resolution = RetryCoordinator::new(&sink, fast_policy(3), &notifier)
            .execute(&batch(1, 2), &mut state)
            .await;

        assert!(matches!(resolution, BatchResolution::Fatal(_)));
        assert_eq!(sink.attempts(), vec![0]);
        assert!(state.is_halted());
        assert_eq!(state.controller.threshold(), 100);
        assert_eq!(state.failed_batches(), &[1]);

        let report = state.into_report();
        assert_eq!(report.unpersisted, 2);
        assert_eq!(report.error.as_deref(), Some("Batch 1 failed: missing table"));
    }

    #[tokio::test]
    async fn test_events_emitted_for_retry_and_exhaustion() {
        let bus = roster_common::EventBus::new(16);
        let mut rx = bus.subscribe();
        let sink = ScriptedSink::new(u32::MAX, BatchError::transient("busy"));
        let notifier = Notifier::new(Some(bus), Uuid::new_v4());
        let mut state = state();

        RetryCoordinator::new(&sink, fast_policy(1), &notifier)
            .execute(&batch(3, 1), &mut state)
            .await;

        assert_eq!(rx.recv().await.unwrap().event_type(), "BatchRetrying");
        assert_eq!(rx.recv().await.unwrap().event_type(), "BatchExhausted");
    }
}
