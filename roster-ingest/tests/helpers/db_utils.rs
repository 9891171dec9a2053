//! Database Test Utilities

use anyhow::Result;
use roster_ingest::config::ImportConfig;
use sqlx::SqlitePool;
use tempfile::TempDir;

/// Create a temporary database with the contacts table
///
/// Returns (TempDir, SqlitePool); TempDir must be kept alive for the duration of the test
pub async fn create_test_db() -> Result<(TempDir, SqlitePool)> {
    let temp_dir = TempDir::new()?;
    let db_path = temp_dir.path().join("test_roster.db");
    let pool = roster_ingest::db::init_database_pool(&db_path).await?;
    Ok((temp_dir, pool))
}

pub async fn contact_count(pool: &SqlitePool) -> i64 {
    roster_ingest::db::contacts::count_contacts(pool)
        .await
        .expect("count contacts")
}

/// CSV with the canonical header and `rows` distinct valid contacts
pub fn contacts_csv(rows: usize) -> String {
    let mut csv = String::from("email,first_name,last_name\n");
    for i in 0..rows {
        csv.push_str(&format!("user{i}@example.com,First{i},Last{i}\n"));
    }
    csv
}

/// Tiny batch band so small inputs produce several batches
pub fn small_batch_config(initial: usize) -> ImportConfig {
    ImportConfig {
        initial_batch_size: initial,
        min_batch_size: 1,
        max_batch_size: 1_000,
        grow_every: 1_000,
        retry_base_delay_ms: 1,
        retry_max_delay_ms: 5,
        ..ImportConfig::default()
    }
}
