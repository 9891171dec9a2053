//! Database access for roster-ingest

pub mod contacts;

pub use contacts::{SqliteRecordStore, StoredContact};

use roster_common::Result;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::path::Path;
use std::time::Duration;

use crate::pipeline::FailureKind;

/// Initialize database connection pool and create tables
///
/// WAL mode lets the read API run while an import holds the write transaction.
pub async fn init_database_pool(db_path: &Path) -> Result<SqlitePool> {
    let newly_created = !db_path.exists();

    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let options = SqliteConnectOptions::new()
        .filename(db_path)
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(Duration::from_millis(5000));

    let pool = SqlitePoolOptions::new()
        .max_connections(8)
        .acquire_timeout(Duration::from_secs(30))
        .connect_with(options)
        .await?;

    if newly_created {
        tracing::info!("Initialized new database: {}", db_path.display());
    } else {
        tracing::info!("Opened existing database: {}", db_path.display());
    }

    init_tables(&pool).await?;

    Ok(pool)
}

/// Create roster tables if they don't exist
pub async fn init_tables(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS contacts (
            email TEXT PRIMARY KEY,
            first_name TEXT NOT NULL,
            last_name TEXT,
            created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
            updated_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    tracing::debug!("Database tables initialized (contacts)");

    Ok(())
}

/// Decide whether a storage error is worth retrying
///
/// Transient: pool acquire timeouts, connection/I/O loss, crashed worker, SQLite
/// BUSY/LOCKED and interrupted statements. Everything else is fatal.
pub fn classify_error(err: &sqlx::Error) -> FailureKind {
    match err {
        sqlx::Error::PoolTimedOut | sqlx::Error::Io(_) | sqlx::Error::WorkerCrashed => {
            FailureKind::Transient
        }
        sqlx::Error::Database(db_err) => {
            // SQLITE_BUSY (5), SQLITE_LOCKED (6), SQLITE_INTERRUPT (9) and their extended codes
            let primary_code = db_err
                .code()
                .and_then(|code| code.parse::<i64>().ok())
                .map(|code| code & 0xff);
            let message = db_err.message().to_ascii_lowercase();

            if matches!(primary_code, Some(5) | Some(6) | Some(9))
                || message.contains("database is locked")
                || message.contains("database table is locked")
                || message.contains("busy")
                || message.contains("interrupted")
                || message.contains("timed out")
            {
                FailureKind::Transient
            } else {
                FailureKind::Fatal
            }
        }
        _ => FailureKind::Fatal,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_init_creates_file_and_table() {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("nested").join("roster.db");

        let pool = init_database_pool(&db_path).await.unwrap();
        assert!(db_path.exists());

        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM contacts")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(count, 0);

        // Idempotent
        init_tables(&pool).await.unwrap();
    }

    #[test]
    fn test_classify_pool_timeout_is_transient() {
        assert_eq!(classify_error(&sqlx::Error::PoolTimedOut), FailureKind::Transient);
    }

    #[test]
    fn test_classify_io_is_transient() {
        let err = sqlx::Error::Io(std::io::Error::new(
            std::io::ErrorKind::ConnectionReset,
            "reset",
        ));
        assert_eq!(classify_error(&err), FailureKind::Transient);
    }

    #[test]
    fn test_classify_row_not_found_is_fatal() {
        assert_eq!(classify_error(&sqlx::Error::RowNotFound), FailureKind::Fatal);
        assert_eq!(classify_error(&sqlx::Error::PoolClosed), FailureKind::Fatal);
    }

    #[tokio::test]
    async fn test_classify_syntax_error_is_fatal() {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();

        let err = sqlx::query("INSERT INTO nowhere VALUES (1)")
            .execute(&pool)
            .await
            .unwrap_err();
        assert_eq!(classify_error(&err), FailureKind::Fatal);
    }
}
