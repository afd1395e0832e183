use axum::{extract::State, routing::get, Json, Router};

use trialtower_schema::AgentInfo;

use crate::routes::ApiError;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/agent/info", get(get_agent_info))
}

/// Agent metadata comes from the warehouse (DESCRIBE), so this needs both
/// the warehouse connection and a configured agent name.
async fn get_agent_info(State(state): State<AppState>) -> Result<Json<AgentInfo>, ApiError> {
    let loaders = state.loaders()?;
    let agent_name = state.agent_name.as_deref().ok_or_else(|| {
        ApiError::unavailable(
            state
                .agent_error
                .as_deref()
                .unwrap_or("agent is not configured"),
        )
    })?;

    let info = loaders
        .agent_info(agent_name)
        .await
        .map_err(|e| ApiError::bad_gateway(e.to_string()))?;
    Ok(Json(info))
}
