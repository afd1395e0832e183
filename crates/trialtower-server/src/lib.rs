pub mod routes;
pub mod state;

use std::time::Duration;

use anyhow::Result;
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::state::AppState;

const EVICTION_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .nest("/api", routes::api_router())
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn serve(state: AppState, addr: &str) -> Result<()> {
    let sessions = state.sessions.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(EVICTION_SWEEP_INTERVAL);
        loop {
            interval.tick().await;
            let evicted = sessions.evict_idle();
            if evicted > 0 {
                tracing::info!(evicted, "evicted idle chat sessions");
            }
        }
    });

    let app = create_router(state);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("trialtower-server listening on {}", addr);
    axum::serve(listener, app).await?;
    Ok(())
}
