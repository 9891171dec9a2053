//! POST /import
//!
//! The request body is the CSV itself. It is streamed straight into the
//! pipeline's reader thread; the full upload is never buffered.

use axum::{
    body::Body,
    extract::{DefaultBodyLimit, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use futures::TryStreamExt;
use tokio_util::io::{StreamReader, SyncIoBridge};

use crate::{
    db::SqliteRecordStore,
    error::{ApiError, ApiResult},
    pipeline::ImportPipeline,
    AppState,
};

/// POST /import
///
/// 200 with the report when the import succeeded, 422 with the report when it
/// did not, 409 when another import is running.
pub async fn import_contacts(State(state): State<AppState>, body: Body) -> ApiResult<Response> {
    let _running = state
        .import_lock
        .try_lock()
        .map_err(|_| ApiError::Conflict("An import is already running".to_string()))?;

    let stream = body
        .into_data_stream()
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e));
    let reader = SyncIoBridge::new(StreamReader::new(stream));

    let sink = SqliteRecordStore::from_config(state.db.clone(), &state.config);
    let pipeline = ImportPipeline::new(sink, state.config.as_ref().clone())
        .with_events(state.event_bus.clone());

    let report = pipeline.run(reader).await;

    if !report.success {
        *state.last_error.write().await = report.error.clone();
    }

    let status = if report.success {
        StatusCode::OK
    } else {
        StatusCode::UNPROCESSABLE_ENTITY
    };
    Ok((status, Json(report)).into_response())
}

/// Build import routes
pub fn import_routes() -> Router<AppState> {
    Router::new()
        .route("/import", post(import_contacts))
        .layer(DefaultBodyLimit::disable())
}
