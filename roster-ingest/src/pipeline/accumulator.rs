//! Buffers validated records and flushes them as batches
//!
//! The consumer awaits every flush before taking the next row, so a slow store
//! backs up into the bounded channel and from there into the reader.

use std::time::{Duration, Instant};
use thiserror::Error;

use super::{Batch, BatchResolution, ImportState, Notifier, RecordSink, RetryCoordinator};
use crate::models::Record;

/// Returned when a record arrives after the import halted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("import halted after a fatal error; no further records accepted")]
pub struct Halted;

pub struct BatchAccumulator<'a, S: RecordSink + ?Sized> {
    buffer: Vec<Record>,
    coordinator: RetryCoordinator<'a, S>,
    notifier: &'a Notifier,
    /// Zero disables the notice
    stall_notice: Duration,
}

impl<'a, S: RecordSink + ?Sized> BatchAccumulator<'a, S> {
    pub fn new(
        coordinator: RetryCoordinator<'a, S>,
        notifier: &'a Notifier,
        stall_notice: Duration,
    ) -> Self {
        Self {
            buffer: Vec::new(),
            coordinator,
            notifier,
            stall_notice,
        }
    }

    /// Records waiting for the next flush
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Buffer one record, flushing when the buffer reaches the current threshold
    ///
    /// Returns the flush resolution when one happened.
    pub async fn accept(
        &mut self,
        record: Record,
        state: &mut ImportState,
    ) -> Result<Option<BatchResolution>, Halted> {
        if state.is_halted() {
            return Err(Halted);
        }

        self.buffer.push(record);
        if self.buffer.len() < state.controller.threshold() {
            return Ok(None);
        }
        Ok(self.flush(state).await)
    }

    /// Flush whatever remains once input is exhausted
    pub async fn finish(&mut self, state: &mut ImportState) -> Option<BatchResolution> {
        if state.is_halted() {
            if !self.buffer.is_empty() {
                tracing::warn!(
                    dropped = self.buffer.len(),
                    "Import halted, discarding buffered records"
                );
                state.record_discarded(self.buffer.len());
                self.buffer.clear();
            }
            return None;
        }
        self.flush(state).await
    }

    async fn flush(&mut self, state: &mut ImportState) -> Option<BatchResolution> {
        if self.buffer.is_empty() {
            return None;
        }

        let records = std::mem::replace(
            &mut self.buffer,
            Vec::with_capacity(state.controller.threshold()),
        );
        let batch = Batch::new(state.next_batch_id(), records);
        let rows_seen = state.stats().total;

        tracing::trace!(batch_id = batch.id, records = batch.len(), "Flushing batch");

        if self.stall_notice.is_zero() {
            return Some(self.coordinator.execute(&batch, state).await);
        }

        let started = Instant::now();
        let execute = self.coordinator.execute(&batch, state);
        tokio::pin!(execute);

        let mut notice = tokio::time::interval_at(
            tokio::time::Instant::now() + self.stall_notice,
            self.stall_notice,
        );

        loop {
            tokio::select! {
                resolution = &mut execute => return Some(resolution),
                _ = notice.tick() => {
                    let elapsed_ms = started.elapsed().as_millis() as u64;
                    tracing::info!(
                        batch_id = batch.id,
                        elapsed_ms,
                        rows_seen,
                        "Still processing batch"
                    );
                    self.notifier.still_processing(batch.id, elapsed_ms, rows_seen);
                }
            }
        }
    }
}
