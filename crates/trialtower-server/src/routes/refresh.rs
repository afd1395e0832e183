use axum::{extract::State, routing::post, Json, Router};

use crate::routes::ApiError;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/refresh", post(refresh))
}

/// Manual cache refresh: clears every loader cache so the next read hits
/// the warehouse.
async fn refresh(State(state): State<AppState>) -> Result<Json<serde_json::Value>, ApiError> {
    state.loaders()?.invalidate_all();
    Ok(Json(serde_json::json!({ "status": "refreshed" })))
}
