use axum::Json;
use axum::extract::{Query, State};
use serde::Deserialize;
use wahoo_db::Contact;
use wahoo_ipc::SessionTransport;

use super::error::ApiError;
use super::state::AppState;

#[derive(Debug, Deserialize)]
pub struct ContactsQuery {
    q: Option<String>,
}

/// GET /api/contacts
pub async fn search_contacts<T: SessionTransport>(
    State(state): State<AppState<T>>,
    Query(query): Query<ContactsQuery>,
) -> Result<Json<Vec<Contact>>, ApiError> {
    let q = query
        .q
        .filter(|q| !q.is_empty())
        .ok_or_else(|| ApiError::BadRequest("q (query) required".to_string()))?;

    Ok(Json(state.store.search_contacts(&q).await?))
}
