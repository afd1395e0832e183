use axum::{extract::State, routing::get, Json, Router};

use trialtower_core::{load_playbook, Chapter};

use crate::routes::ApiError;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/docs", get(get_docs))
}

async fn get_docs(State(state): State<AppState>) -> Result<Json<Vec<Chapter>>, ApiError> {
    let path = state
        .playbook_path
        .as_ref()
        .ok_or_else(|| ApiError::not_found("no playbook configured"))?;
    let chapters = load_playbook(path).map_err(|e| ApiError::not_found(e.to_string()))?;
    Ok(Json(chapters))
}
