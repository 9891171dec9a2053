//! HTTP API handlers for roster-ingest
//!
//! REST endpoints for importing and browsing contacts, plus an SSE stream of
//! import progress.

pub mod contacts;
pub mod health;
pub mod import;
pub mod sse;

pub use contacts::contact_routes;
pub use health::health_routes;
pub use import::import_routes;
pub use sse::import_event_stream;
