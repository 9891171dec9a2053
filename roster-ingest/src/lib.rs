//! roster-ingest library interface
//!
//! Streaming CSV contact import: the [`pipeline`] reads and validates rows and
//! hands batches to a [`pipeline::RecordSink`]; [`db`] provides the SQLite sink.
//! The HTTP surface in [`api`] wraps both.

pub mod api;
pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod pagination;
pub mod pipeline;
pub mod utils;

pub use crate::error::{ApiError, ApiResult};

use axum::Router;
use chrono::{DateTime, Utc};
use roster_common::events::EventBus;
use sqlx::SqlitePool;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};

use crate::config::ImportConfig;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub db: SqlitePool,
    pub config: Arc<ImportConfig>,
    /// Progress events for SSE subscribers
    pub event_bus: EventBus,
    /// Held for the duration of one import; only one runs at a time
    pub import_lock: Arc<Mutex<()>>,
    pub startup_time: DateTime<Utc>,
    /// Last import error, for diagnostics
    pub last_error: Arc<RwLock<Option<String>>>,
}

impl AppState {
    pub fn new(db: SqlitePool, config: ImportConfig, event_bus: EventBus) -> Self {
        Self {
            db,
            config: Arc::new(config),
            event_bus,
            import_lock: Arc::new(Mutex::new(())),
            startup_time: Utc::now(),
            last_error: Arc::new(RwLock::new(None)),
        }
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    use axum::routing::get;

    Router::new()
        .merge(api::import_routes())
        .route("/import/events", get(api::import_event_stream))
        .merge(api::contact_routes())
        .merge(api::health_routes())
        .with_state(state)
}
