//! Utility modules for roster-ingest

pub mod pool_monitor;

pub use pool_monitor::{begin_monitored, MonitoredTransaction};
