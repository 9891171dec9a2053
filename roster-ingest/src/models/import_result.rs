//! Import outcome surfaced to callers
//!
//! The caller always receives `stats`, even when the import failed, so partial
//! progress stays observable.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Row counters; `total == valid + invalid` at every observation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportStats {
    pub total: u64,
    pub valid: u64,
    pub invalid: u64,
}

/// Detail kept for one rejected row
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RowRejection {
    /// Line in the input where the row starts (header is line 1)
    pub line: u64,
    /// Offending field, or `row` when the row itself could not be decoded
    pub field: String,
    pub reason: String,
}

/// Final (or snapshot) result of one import
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportReport {
    pub import_id: Uuid,
    pub success: bool,

    /// Short classification of what went wrong
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    pub stats: ImportStats,

    /// Batch sequence numbers that ran out of retries
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub failed_batches: Vec<u64>,

    pub batches_committed: u64,

    /// Records written by committed batches
    pub persisted: u64,

    /// Valid records that never reached storage (exhausted batch or per-record rejection)
    pub unpersisted: u64,

    pub elapsed_ms: u64,

    /// First rejections with full detail (capped)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub rejections: Vec<RowRejection>,

    /// True when more rejections happened than `rejections` holds
    #[serde(default)]
    pub rejections_truncated: bool,
}

impl ImportReport {
    /// Report for an import that failed before any row was processed
    pub fn setup_failure(import_id: Uuid, error: impl Into<String>, elapsed_ms: u64) -> Self {
        Self {
            import_id,
            success: false,
            error: Some(error.into()),
            stats: ImportStats::default(),
            failed_batches: Vec::new(),
            batches_committed: 0,
            persisted: 0,
            unpersisted: 0,
            elapsed_ms,
            rejections: Vec::new(),
            rejections_truncated: false,
        }
    }
}
