//! Service and pipeline configuration
//!
//! Loaded from TOML (see `roster_common::config` for file resolution), then
//! overridden by command-line arguments. Every pipeline tunable has a built-in default.

use roster_common::config::LoggingConfig;
use roster_common::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// SQLite's compiled-in maximum number of bound parameters per statement
pub const SQLITE_MAX_BOUND_PARAMS: usize = 32766;

/// Top-level config file layout for roster-ingest
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// HTTP listen address
    pub bind_addr: String,
    /// SQLite database file (defaults to `<data dir>/roster.db`)
    pub database_path: Option<PathBuf>,
    pub logging: LoggingConfig,
    pub import: ImportConfig,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:5730".to_string(),
            database_path: None,
            logging: LoggingConfig::default(),
            import: ImportConfig::default(),
        }
    }
}

impl ServiceConfig {
    /// Database path, falling back to the OS data directory
    pub fn database_path(&self) -> PathBuf {
        self.database_path
            .clone()
            .unwrap_or_else(|| roster_common::config::default_data_dir().join("roster.db"))
    }
}

/// How the executor writes one chunk
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpsertMode {
    /// One multi-row `INSERT .. ON CONFLICT` per chunk
    Statement,
    /// One statement per record, each settled independently
    PerRecord,
}

/// Streaming import pipeline tunables
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ImportConfig {
    /// Field delimiter (single ASCII character)
    pub delimiter: char,

    /// Starting flush threshold
    pub initial_batch_size: usize,
    /// Lower bound of the flush threshold
    pub min_batch_size: usize,
    /// Upper bound of the flush threshold
    pub max_batch_size: usize,
    /// Multiplier applied after every `grow_every` committed batches
    pub growth_factor: f64,
    /// Multiplier applied on every retry
    pub shrink_factor: f64,
    /// Committed batches between growth steps
    pub grow_every: u32,

    /// Retries after the first attempt before a batch is given up
    pub max_retries: u32,
    pub retry_base_delay_ms: u64,
    pub retry_max_delay_ms: u64,

    /// Hard bound-parameter limit of the storage engine (the executor uses half)
    pub max_bound_params: usize,
    pub upsert_mode: UpsertMode,

    /// Rows buffered between the reader thread and the pipeline
    pub channel_capacity: usize,

    /// Rejections kept with full detail in the report
    pub rejection_detail_cap: usize,
    /// After the cap, log a summary every N rejections
    pub rejection_log_every: u64,

    /// Emit a still-processing notice when one flush runs this long
    pub stall_notice_ms: u64,
}

impl Default for ImportConfig {
    fn default() -> Self {
        Self {
            delimiter: ',',
            initial_batch_size: 100,
            min_batch_size: 50,
            max_batch_size: 500,
            growth_factor: 1.1,
            shrink_factor: 0.7,
            grow_every: 20,
            max_retries: 3,
            retry_base_delay_ms: 100,
            retry_max_delay_ms: 5_000,
            max_bound_params: SQLITE_MAX_BOUND_PARAMS,
            upsert_mode: UpsertMode::Statement,
            channel_capacity: 1_000,
            rejection_detail_cap: 100,
            rejection_log_every: 1_000,
            stall_notice_ms: 5_000,
        }
    }
}

impl ImportConfig {
    /// Reject settings the pipeline cannot honor
    pub fn validate(&self) -> Result<()> {
        if !self.delimiter.is_ascii() {
            return Err(Error::Config(format!(
                "delimiter must be a single ASCII character, got {:?}",
                self.delimiter
            )));
        }
        if self.min_batch_size == 0 {
            return Err(Error::Config("min_batch_size must be at least 1".to_string()));
        }
        if self.min_batch_size > self.max_batch_size {
            return Err(Error::Config(format!(
                "min_batch_size ({}) exceeds max_batch_size ({})",
                self.min_batch_size, self.max_batch_size
            )));
        }
        if !(self.growth_factor >= 1.0 && self.growth_factor.is_finite()) {
            return Err(Error::Config(format!(
                "growth_factor must be >= 1.0, got {}",
                self.growth_factor
            )));
        }
        if !(self.shrink_factor > 0.0 && self.shrink_factor <= 1.0) {
            return Err(Error::Config(format!(
                "shrink_factor must be in (0, 1], got {}",
                self.shrink_factor
            )));
        }
        if self.grow_every == 0 {
            return Err(Error::Config("grow_every must be at least 1".to_string()));
        }
        if self.max_bound_params < 2 {
            return Err(Error::Config("max_bound_params must be at least 2".to_string()));
        }
        if self.channel_capacity == 0 {
            return Err(Error::Config("channel_capacity must be at least 1".to_string()));
        }
        if self.rejection_log_every == 0 {
            return Err(Error::Config(
                "rejection_log_every must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Delimiter as the byte the CSV reader expects
    pub fn delimiter_byte(&self) -> u8 {
        let mut buf = [0u8; 4];
        self.delimiter.encode_utf8(&mut buf);
        buf[0]
    }
}
