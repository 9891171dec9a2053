//! GET /contacts, paginated

use axum::{
    extract::{Query, State},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::{
    db::{contacts, StoredContact},
    error::ApiResult,
    pagination::{calculate_pagination, PAGE_SIZE},
    AppState,
};

#[derive(Debug, Deserialize)]
pub struct ContactsQuery {
    /// Page number (1-indexed)
    #[serde(default = "default_page")]
    pub page: i64,
}

fn default_page() -> i64 {
    1
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ContactsResponse {
    pub total_results: i64,
    pub page: i64,
    pub page_size: i64,
    pub total_pages: i64,
    pub contacts: Vec<StoredContact>,
}

/// GET /contacts?page=N
pub async fn list_contacts(
    State(state): State<AppState>,
    Query(query): Query<ContactsQuery>,
) -> ApiResult<Json<ContactsResponse>> {
    let total_results = contacts::count_contacts(&state.db).await?;
    let p = calculate_pagination(total_results, query.page);
    let rows = contacts::list_contacts(&state.db, PAGE_SIZE, p.offset).await?;

    Ok(Json(ContactsResponse {
        total_results,
        page: p.page,
        page_size: PAGE_SIZE,
        total_pages: p.total_pages,
        contacts: rows,
    }))
}

/// Build contact routes
pub fn contact_routes() -> Router<AppState> {
    Router::new().route("/contacts", get(list_contacts))
}
