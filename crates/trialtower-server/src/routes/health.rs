use axum::{extract::State, routing::get, Json, Router};
use serde::Serialize;

use crate::state::AppState;

#[derive(Serialize)]
pub struct Health {
    pub status: &'static str,
    pub warehouse: BackendHealth,
    pub agent: BackendHealth,
    pub sessions_active: usize,
}

#[derive(Serialize)]
pub struct BackendHealth {
    pub configured: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

pub fn router() -> Router<AppState> {
    Router::new().route("/health", get(get_health))
}

async fn get_health(State(state): State<AppState>) -> Json<Health> {
    Json(Health {
        status: "ok",
        warehouse: BackendHealth {
            configured: state.loaders.is_some(),
            error: state.warehouse_error.clone(),
        },
        agent: BackendHealth {
            configured: state.agent.is_some(),
            error: state.agent_error.clone(),
        },
        sessions_active: state.sessions.len(),
    })
}
