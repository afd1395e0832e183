use axum::{
    extract::{Path, State},
    routing::get,
    Json, Router,
};
use serde::Serialize;

use trialtower_schema::{
    build_cumulative, CumulativePoint, EnrollmentMetrics, PortfolioSummary, TrialSummary,
};

use crate::routes::ApiError;
use crate::state::AppState;

#[derive(Serialize)]
pub struct EnrollmentDetail {
    pub study_id: String,
    pub points: Vec<CumulativePoint>,
    pub metrics: EnrollmentMetrics,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/trials", get(list_trials))
        .route("/trials/{study_id}/enrollment", get(get_enrollment))
        .route("/portfolio", get(get_portfolio))
}

async fn list_trials(State(state): State<AppState>) -> Result<Json<Vec<TrialSummary>>, ApiError> {
    let trials = state
        .loaders()?
        .trial_summary()
        .await
        .map_err(|e| ApiError::bad_gateway(e.to_string()))?;
    Ok(Json(trials))
}

async fn get_enrollment(
    State(state): State<AppState>,
    Path(study_id): Path<String>,
) -> Result<Json<EnrollmentDetail>, ApiError> {
    let loaders = state.loaders()?;
    let trials = loaders
        .trial_summary()
        .await
        .map_err(|e| ApiError::bad_gateway(e.to_string()))?;
    let summary = trials
        .iter()
        .find(|t| t.study_id == study_id)
        .ok_or_else(|| ApiError::not_found(format!("unknown study: {study_id}")))?;

    let points = loaders
        .enrollment_series(&study_id)
        .await
        .map_err(|e| ApiError::bad_gateway(e.to_string()))?;

    let metrics = EnrollmentMetrics::compute(summary, &points, chrono::Utc::now().date_naive());
    Ok(Json(EnrollmentDetail {
        study_id,
        points: build_cumulative(points),
        metrics,
    }))
}

async fn get_portfolio(State(state): State<AppState>) -> Result<Json<PortfolioSummary>, ApiError> {
    let trials = state
        .loaders()?
        .trial_summary()
        .await
        .map_err(|e| ApiError::bad_gateway(e.to_string()))?;
    Ok(Json(PortfolioSummary::from_trials(&trials)))
}
