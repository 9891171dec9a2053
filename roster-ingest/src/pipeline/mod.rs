//! Streaming CSV import pipeline
//!
//! ```text
//! reader (blocking thread) --bounded channel--> resolve / validate --> accumulate
//!                                                                       |
//!                                              retry coordinator <------+
//!                                                     |
//!                                                 RecordSink
//! ```
//!
//! The reader runs on a blocking thread and pushes rows into a bounded channel.
//! The consumer validates, buffers and flushes in order; it awaits every flush,
//! so storage latency throttles the reader.

mod accumulator;
mod columns;
mod controller;
mod error;
mod notify;
mod retry;
mod sink;
mod state;
mod validator;

pub use accumulator::{BatchAccumulator, Halted};
pub use columns::{resolve_columns, ColumnMapping, Field, ResolvedColumn};
pub use controller::AdaptiveBatchController;
pub use error::ImportError;
pub use notify::Notifier;
pub use retry::{BatchResolution, RetryCoordinator, RetryPolicy};
pub use sink::{Batch, BatchError, BatchOutcome, FailureKind, RecordSink, RejectedRecord};
pub use state::{ImportState, RejectionLog};
pub use validator::{validate_row, ValidationError, ValidationReason, MAX_EMAIL_LEN, MAX_NAME_LEN};

use csv::StringRecord;
use roster_common::events::EventBus;
use std::io::Read;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::config::ImportConfig;
use crate::models::ImportReport;

/// Message from the reader thread to the consumer
#[derive(Debug)]
enum SourceMessage {
    /// First record of the input
    Header(Vec<String>),
    Row { line: u64, record: StringRecord },
    /// Row that parsed but could not be decoded
    Malformed { line: u64, reason: String },
    /// The byte stream itself failed; nothing more will arrive
    Failed(String),
}

/// Read delimited rows and push them into `tx`
///
/// Runs on a blocking thread. Returns early once the consumer hangs up.
fn read_source<R: Read>(input: R, delimiter: u8, tx: mpsc::Sender<SourceMessage>) {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(false)
        .flexible(true)
        .from_reader(input);

    let mut record = StringRecord::new();
    let mut header_sent = false;

    loop {
        let message = match reader.read_record(&mut record) {
            Ok(false) => return,
            Ok(true) if !header_sent => {
                header_sent = true;
                SourceMessage::Header(record.iter().map(str::to_string).collect())
            }
            Ok(true) => SourceMessage::Row {
                line: record.position().map(|p| p.line()).unwrap_or_default(),
                record: record.clone(),
            },
            Err(err) => {
                let line = err.position().map(|p| p.line()).unwrap_or_default();
                match err.kind() {
                    csv::ErrorKind::Io(_) => {
                        let _ = tx.blocking_send(SourceMessage::Failed(err.to_string()));
                        return;
                    }
                    _ if !header_sent => {
                        let _ = tx.blocking_send(SourceMessage::Failed(format!(
                            "header row could not be read: {}",
                            err
                        )));
                        return;
                    }
                    csv::ErrorKind::Utf8 { .. } => SourceMessage::Malformed {
                        line,
                        reason: "row is not valid UTF-8".to_string(),
                    },
                    _ => SourceMessage::Malformed {
                        line,
                        reason: err.to_string(),
                    },
                }
            }
        };

        if tx.blocking_send(message).is_err() {
            tracing::debug!("Import consumer stopped, abandoning remaining input");
            return;
        }
    }
}

/// One configured import pipeline over a [`RecordSink`]
///
/// A pipeline may run many imports; each run gets its own state.
pub struct ImportPipeline<S> {
    sink: S,
    config: ImportConfig,
    events: Option<EventBus>,
}

impl<S: RecordSink> ImportPipeline<S> {
    pub fn new(sink: S, config: ImportConfig) -> Self {
        Self {
            sink,
            config,
            events: None,
        }
    }

    /// Publish progress events on `bus`
    pub fn with_events(mut self, bus: EventBus) -> Self {
        self.events = Some(bus);
        self
    }

    pub fn config(&self) -> &ImportConfig {
        &self.config
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    /// Import one CSV stream, returning the report
    ///
    /// Never fails: every failure is folded into the report.
    pub async fn run<R>(&self, input: R) -> ImportReport
    where
        R: Read + Send + 'static,
    {
        self.run_with_id(Uuid::new_v4(), input).await
    }

    pub async fn run_with_id<R>(&self, import_id: Uuid, input: R) -> ImportReport
    where
        R: Read + Send + 'static,
    {
        let started = Instant::now();
        let notifier = Notifier::new(self.events.clone(), import_id);

        if let Err(e) = self.config.validate() {
            return abort(&notifier, ImportError::Config(e.to_string()), started);
        }

        let (tx, mut rx) = mpsc::channel(self.config.channel_capacity);
        let delimiter = self.config.delimiter_byte();
        let producer = tokio::task::spawn_blocking(move || read_source(input, delimiter, tx));

        let mapping = match rx.recv().await {
            Some(SourceMessage::Header(headers)) => {
                match resolve_columns(headers.iter().map(String::as_str)) {
                    Ok(mapping) => mapping,
                    Err(e) => return abort(&notifier, e, started),
                }
            }
            Some(SourceMessage::Failed(reason)) => {
                return abort(&notifier, ImportError::UnreadableInput(reason), started)
            }
            Some(other) => {
                return abort(
                    &notifier,
                    ImportError::UnreadableInput(format!("unexpected first message: {:?}", other)),
                    started,
                )
            }
            None => return abort(&notifier, ImportError::EmptyInput, started),
        };

        tracing::info!(
            import_id = %import_id,
            email = %mapping.email.header,
            first_name = %mapping.first_name.header,
            last_name = mapping.last_name.as_ref().map(|c| c.header.as_str()).unwrap_or("-"),
            "Import started, columns resolved"
        );
        notifier.started();

        let mut state = ImportState::new(import_id, &self.config);
        let coordinator =
            RetryCoordinator::new(&self.sink, RetryPolicy::from_config(&self.config), &notifier);
        let mut accumulator = BatchAccumulator::new(
            coordinator,
            &notifier,
            Duration::from_millis(self.config.stall_notice_ms),
        );

        while let Some(message) = rx.recv().await {
            if state.is_halted() {
                break;
            }
            match message {
                SourceMessage::Row { line, record } => match validate_row(&record, &mapping) {
                    Ok(valid) => {
                        state.record_valid();
                        if accumulator.accept(valid, &mut state).await.is_err() {
                            break;
                        }
                    }
                    Err(e) => state.record_invalid(line, &e),
                },
                SourceMessage::Malformed { line, reason } => state.record_malformed(line, reason),
                SourceMessage::Failed(reason) => {
                    tracing::error!(
                        import_id = %import_id,
                        error = %reason,
                        buffered = accumulator.buffered(),
                        "Input stream failed, flushing rows read so far"
                    );
                    accumulator.finish(&mut state).await;
                    state.record_fatal(ImportError::UnreadableInput(reason).to_string());
                    break;
                }
                SourceMessage::Header(_) => {}
            }
        }

        accumulator.finish(&mut state).await;
        drop(rx);

        if !state.is_halted() {
            if let Err(e) = producer.await {
                tracing::error!(import_id = %import_id, error = %e, "CSV reader task failed");
            }
        }

        let report = state.into_report();
        if let Some(error) = report.error.as_deref() {
            if report.batches_committed > 0 || report.stats.valid == 0 {
                tracing::warn!(
                    import_id = %import_id,
                    error,
                    total = report.stats.total,
                    valid = report.stats.valid,
                    invalid = report.stats.invalid,
                    "Import finished unsuccessfully"
                );
            } else {
                tracing::error!(import_id = %import_id, error, "Import persisted nothing");
            }
            notifier.failed(error);
        } else {
            tracing::info!(
                import_id = %import_id,
                total = report.stats.total,
                valid = report.stats.valid,
                invalid = report.stats.invalid,
                persisted = report.persisted,
                failed_batches = report.failed_batches.len(),
                elapsed_ms = report.elapsed_ms,
                "Import completed"
            );
        }
        notifier.completed(&report);
        report
    }
}

/// Report for an import that never reached the row loop
fn abort(notifier: &Notifier, error: ImportError, started: Instant) -> ImportReport {
    tracing::warn!(import_id = %notifier.import_id(), error = %error, "Import rejected");
    let message = error.to_string();
    notifier.failed(&message);
    let report = ImportReport::setup_failure(
        notifier.import_id(),
        message,
        started.elapsed().as_millis() as u64,
    );
    notifier.completed(&report);
    report
}
