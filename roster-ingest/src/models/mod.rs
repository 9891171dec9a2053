//! Data models for roster-ingest

pub mod import_result;
pub mod record;

pub use import_result::{ImportReport, ImportStats, RowRejection};
pub use record::{Record, PARAMS_PER_RECORD};
