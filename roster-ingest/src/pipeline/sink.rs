//! Persistence seam between the pipeline and storage
//!
//! The pipeline hands one [`Batch`] at a time to a [`RecordSink`]. Sinks never raise
//! transient failures past themselves; they return a classified [`BatchError`] and
//! the retry coordinator decides what happens next.

use async_trait::async_trait;
use std::fmt;
use thiserror::Error;

use crate::models::Record;

/// Ordered group of records flushed together
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Batch {
    /// Sequence number assigned at flush time (starts at 1)
    pub id: u64,
    pub records: Vec<Record>,
}

impl Batch {
    pub fn new(id: u64, records: Vec<Record>) -> Self {
        Self { id, records }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// One record the store refused while the rest of its batch committed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RejectedRecord {
    pub email: String,
    pub reason: String,
}

/// Settled result of a committed batch
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchOutcome {
    pub batch_id: u64,
    /// Records handed to the sink
    pub attempted: usize,
    /// Records whose write settled as fulfilled
    pub fulfilled: usize,
    /// Records whose write settled as rejected
    pub rejected: Vec<RejectedRecord>,
    /// Rows reported affected by the store
    pub rows_affected: u64,
    /// Statements (chunks) the batch was split into
    pub chunks: usize,
}

impl BatchOutcome {
    /// Outcome where every record settled as fulfilled
    pub fn all_fulfilled(batch: &Batch, rows_affected: u64, chunks: usize) -> Self {
        Self {
            batch_id: batch.id,
            attempted: batch.len(),
            fulfilled: batch.len(),
            rejected: Vec::new(),
            rows_affected,
            chunks,
        }
    }
}

/// Whether a failed batch is worth retrying
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Connection loss, lock contention, timeouts
    Transient,
    /// Constraint violations, malformed statements, closed pool
    Fatal,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureKind::Transient => write!(f, "transient"),
            FailureKind::Fatal => write!(f, "fatal"),
        }
    }
}

/// Classified batch failure
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind} batch failure: {message}")]
pub struct BatchError {
    pub kind: FailureKind,
    pub message: String,
}

impl BatchError {
    pub fn transient(message: impl Into<String>) -> Self {
        Self {
            kind: FailureKind::Transient,
            message: message.into(),
        }
    }

    pub fn fatal(message: impl Into<String>) -> Self {
        Self {
            kind: FailureKind::Fatal,
            message: message.into(),
        }
    }

    pub fn is_transient(&self) -> bool {
        self.kind == FailureKind::Transient
    }

    /// Short category for reports; the raw driver message stays in the logs
    pub fn summary(&self) -> &'static str {
        let message = self.message.to_ascii_lowercase();
        if message.contains("constraint") {
            "constraint violation"
        } else if message.contains("syntax error") || message.contains("no such column") {
            "malformed statement"
        } else if message.contains("no such table") {
            "missing table"
        } else if self.is_transient() {
            "storage unavailable"
        } else {
            "storage error"
        }
    }
}

/// Downstream persistence service
///
/// `attempt` is 0 for the first try and grows by one per retry; implementations
/// use it to shrink their statement size.
#[async_trait]
pub trait RecordSink: Send + Sync {
    async fn save_many(&self, batch: &Batch, attempt: u32) -> Result<BatchOutcome, BatchError>;
}

#[async_trait]
impl<S: RecordSink + ?Sized> RecordSink for std::sync::Arc<S> {
    async fn save_many(&self, batch: &Batch, attempt: u32) -> Result<BatchOutcome, BatchError> {
        (**self).save_many(batch, attempt).await
    }
}
