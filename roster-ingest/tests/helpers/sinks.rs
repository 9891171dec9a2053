//! Fault-injecting sink wrapper

use async_trait::async_trait;
use roster_ingest::pipeline::{Batch, BatchError, BatchOutcome, RecordSink};
use std::collections::HashMap;
use std::sync::Mutex;

/// One call observed by [`FlakySink`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SinkCall {
    pub batch_id: u64,
    pub records: usize,
    pub attempt: u32,
}

/// Wraps a real sink and fails chosen batches a set number of times
pub struct FlakySink<S> {
    inner: S,
    /// batch id -> (remaining failures, error to return)
    script: Mutex<HashMap<u64, (u32, BatchError)>>,
    calls: Mutex<Vec<SinkCall>>,
}

impl<S: RecordSink> FlakySink<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            script: Mutex::new(HashMap::new()),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Fail batch `batch_id` `times` times with `error` before delegating
    pub fn fail(self, batch_id: u64, times: u32, error: BatchError) -> Self {
        self.script.lock().unwrap().insert(batch_id, (times, error));
        self
    }

    pub fn calls(&self) -> Vec<SinkCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn calls_for(&self, batch_id: u64) -> Vec<SinkCall> {
        self.calls()
            .into_iter()
            .filter(|c| c.batch_id == batch_id)
            .collect()
    }
}

#[async_trait]
impl<S: RecordSink> RecordSink for FlakySink<S> {
    async fn save_many(&self, batch: &Batch, attempt: u32) -> Result<BatchOutcome, BatchError> {
        self.calls.lock().unwrap().push(SinkCall {
            batch_id: batch.id,
            records: batch.len(),
            attempt,
        });

        let injected = {
            let mut script = self.script.lock().unwrap();
            match script.get_mut(&batch.id) {
                Some((remaining, error)) if *remaining > 0 => {
                    *remaining -= 1;
                    Some(error.clone())
                }
                _ => None,
            }
        };

        if let Some(error) = injected {
            return Err(error);
        }
        self.inner.save_many(batch, attempt).await
    }
}
