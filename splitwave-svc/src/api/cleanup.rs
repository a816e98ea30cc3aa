//! Explicit session deletion

use axum::{
    extract::{Path, State},
    routing::delete,
    Json, Router,
};
use serde_json::{json, Value};

use crate::{ApiResult, AppState};

/// DELETE /cleanup/:session_id
///
/// Removes the session regardless of age. Unknown or malformed ids succeed
/// too; there is nothing left to clean.
pub async fn cleanup_session(
    State(state): State<AppState>,
    Path(session): Path<String>,
) -> ApiResult<Json<Value>> {
    if let Ok(session_id) = uuid::Uuid::parse_str(&session) {
        state.store.delete_session(session_id).await?;
    }

    Ok(Json(json!({ "message": "Session cleaned up successfully" })))
}

pub fn cleanup_routes() -> Router<AppState> {
    Router::new().route("/cleanup/:session_id", delete(cleanup_session))
}
