//! Test Helper Utilities
//!
//! Shared utilities for testing roster-ingest

#![allow(dead_code)]

pub mod db_utils;
pub mod sinks;

pub use db_utils::{contact_count, contacts_csv, create_test_db, small_batch_config};
pub use sinks::FlakySink;
