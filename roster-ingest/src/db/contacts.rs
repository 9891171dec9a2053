//! Contact persistence: bulk upsert executor and read queries

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sqlx::{QueryBuilder, Sqlite, SqlitePool};
use std::collections::HashMap;

use crate::config::{ImportConfig, UpsertMode};
use crate::models::{Record, PARAMS_PER_RECORD};
use crate::pipeline::{Batch, BatchError, BatchOutcome, FailureKind, RecordSink, RejectedRecord};
use crate::utils::{begin_monitored, MonitoredTransaction};

const UPSERT_CONFLICT_CLAUSE: &str = " ON CONFLICT(email) DO UPDATE SET \
     first_name = excluded.first_name, \
     last_name = excluded.last_name, \
     updated_at = CURRENT_TIMESTAMP";

const UPSERT_ONE_SQL: &str = "INSERT INTO contacts (email, first_name, last_name) VALUES (?, ?, ?) \
     ON CONFLICT(email) DO UPDATE SET \
     first_name = excluded.first_name, \
     last_name = excluded.last_name, \
     updated_at = CURRENT_TIMESTAMP";

impl From<sqlx::Error> for BatchError {
    fn from(err: sqlx::Error) -> Self {
        BatchError {
            kind: super::classify_error(&err),
            message: err.to_string(),
        }
    }
}

impl From<roster_common::Error> for BatchError {
    fn from(err: roster_common::Error) -> Self {
        match err {
            roster_common::Error::Database(db_err) => db_err.into(),
            other => BatchError::fatal(other.to_string()),
        }
    }
}

/// Records per statement for a given retry attempt
///
/// Uses half of the engine's bound-parameter ceiling, then halves again for every
/// retry attempt. Never returns less than 1.
pub fn chunk_size(max_bound_params: usize, params_per_record: usize, attempt: u32) -> usize {
    let per_record = params_per_record.max(1);
    let base = (max_bound_params / 2) / per_record;
    let shrunk = base.checked_shr(attempt).unwrap_or(0);
    shrunk.max(1)
}

/// Drop earlier occurrences of repeated emails, keeping the final one in place
fn last_occurrence_wins(chunk: &[Record]) -> Vec<&Record> {
    let mut last_index: HashMap<&str, usize> = HashMap::with_capacity(chunk.len());
    for (index, record) in chunk.iter().enumerate() {
        last_index.insert(record.email(), index);
    }

    chunk
        .iter()
        .enumerate()
        .filter(|(index, record)| last_index.get(record.email()) == Some(index))
        .map(|(_, record)| record)
        .collect()
}

/// SQLite implementation of the persistence service
///
/// One batch = one pooled connection = one transaction, split into chunks that
/// fit under the statement parameter ceiling.
#[derive(Debug, Clone)]
pub struct SqliteRecordStore {
    pool: SqlitePool,
    max_bound_params: usize,
    mode: UpsertMode,
}

impl SqliteRecordStore {
    pub fn new(pool: SqlitePool, max_bound_params: usize, mode: UpsertMode) -> Self {
        Self {
            pool,
            max_bound_params,
            mode,
        }
    }

    pub fn from_config(pool: SqlitePool, config: &ImportConfig) -> Self {
        Self::new(pool, config.max_bound_params, config.upsert_mode)
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Write every chunk inside the open transaction
    async fn write_chunks(
        &self,
        tx: &mut MonitoredTransaction,
        batch: &Batch,
        chunk_len: usize,
    ) -> Result<BatchOutcome, BatchError> {
        let mut outcome = BatchOutcome {
            batch_id: batch.id,
            attempted: batch.len(),
            ..BatchOutcome::default()
        };

        for (chunk_index, chunk) in batch.records.chunks(chunk_len).enumerate() {
            let members = last_occurrence_wins(chunk);
            let superseded = chunk.len() - members.len();

            match self.mode {
                UpsertMode::Statement => {
                    let mut builder: QueryBuilder<Sqlite> =
                        QueryBuilder::new("INSERT INTO contacts (email, first_name, last_name) ");
                    builder.push_values(members.iter(), |mut b, record| {
                        b.push_bind(record.email())
                            .push_bind(record.first_name())
                            .push_bind(record.last_name());
                    });
                    builder.push(UPSERT_CONFLICT_CLAUSE);

                    let result = builder.build().execute(tx.conn()?).await?;
                    outcome.rows_affected += result.rows_affected();
                    outcome.fulfilled += chunk.len();
                }
                UpsertMode::PerRecord => {
                    let mut rejected = Vec::new();
                    let mut transient_rejections = 0usize;

                    for record in &members {
                        let settled = sqlx::query(UPSERT_ONE_SQL)
                            .bind(record.email())
                            .bind(record.first_name())
                            .bind(record.last_name())
                            .execute(tx.conn()?)
                            .await;

                        match settled {
                            Ok(result) => {
                                outcome.rows_affected += result.rows_affected();
                                outcome.fulfilled += 1;
                            }
                            Err(err) => {
                                if super::classify_error(&err) == FailureKind::Transient {
                                    transient_rejections += 1;
                                }
                                rejected.push(RejectedRecord {
                                    email: record.email().to_string(),
                                    reason: err.to_string(),
                                });
                            }
                        }
                    }

                    if rejected.len() * 2 > members.len() {
                        let kind = if transient_rejections > 0 {
                            FailureKind::Transient
                        } else {
                            FailureKind::Fatal
                        };
                        return Err(BatchError {
                            kind,
                            message: format!(
                                "{} of {} records rejected in chunk {}",
                                rejected.len(),
                                members.len(),
                                chunk_index + 1
                            ),
                        });
                    }

                    // Superseded duplicates settle with their final occurrence
                    outcome.fulfilled += superseded;
                    outcome.rejected.extend(rejected);
                }
            }

            outcome.chunks += 1;
        }

        Ok(outcome)
    }
}

#[async_trait]
impl RecordSink for SqliteRecordStore {
    async fn save_many(&self, batch: &Batch, attempt: u32) -> Result<BatchOutcome, BatchError> {
        if batch.is_empty() {
            return Ok(BatchOutcome::all_fulfilled(batch, 0, 0));
        }

        let chunk_len = chunk_size(self.max_bound_params, PARAMS_PER_RECORD, attempt);

        tracing::debug!(
            batch_id = batch.id,
            attempt,
            records = batch.len(),
            chunk_len,
            "Writing batch"
        );

        let mut tx = begin_monitored(&self.pool, "contacts::save_many").await?;

        match self.write_chunks(&mut tx, batch, chunk_len).await {
            Ok(outcome) => {
                tx.commit().await?;
                Ok(outcome)
            }
            Err(err) => {
                if let Err(rollback_err) = tx.rollback().await {
                    tracing::warn!(
                        batch_id = batch.id,
                        error = %rollback_err,
                        "Rollback failed; connection will be discarded"
                    );
                }
                Err(err)
            }
        }
    }
}

/// Persisted contact row
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct StoredContact {
    pub email: String,
    pub first_name: String,
    pub last_name: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

/// Count persisted contacts
pub async fn count_contacts(pool: &SqlitePool) -> roster_common::Result<i64> {
    let count = sqlx::query_scalar("SELECT COUNT(*) FROM contacts")
        .fetch_one(pool)
        .await?;
    Ok(count)
}

/// One page of contacts ordered by email
pub async fn list_contacts(
    pool: &SqlitePool,
    limit: i64,
    offset: i64,
) -> roster_common::Result<Vec<StoredContact>> {
    let rows = sqlx::query_as::<_, StoredContact>(
        r#"
        SELECT email, first_name, last_name, created_at, updated_at
        FROM contacts
        ORDER BY email
        LIMIT ? OFFSET ?
        "#,
    )
    .bind(limit)
    .bind(offset)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

/// Load a contact by its (normalized) email
pub async fn load_contact(
    pool: &SqlitePool,
    email: &str,
) -> roster_common::Result<Option<StoredContact>> {
    let row = sqlx::query_as::<_, StoredContact>(
        r#"
        SELECT email, first_name, last_name, created_at, updated_at
        FROM contacts
        WHERE email = ?
        "#,
    )
    .bind(email)
    .fetch_optional(pool)
    .await?;
    Ok(row)
}
