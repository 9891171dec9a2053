//! # Roster Common Library
//!
//! Shared code for roster services:
//! - Error and result types
//! - Configuration file resolution and TOML loading
//! - Import progress events and the broadcast event bus

pub mod config;
pub mod error;
pub mod events;

pub use error::{Error, Result};
pub use events::{EventBus, ImportEvent};
