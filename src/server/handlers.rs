use axum::Json;
use axum::extract::State;
use chrono::Utc;

use super::AppState;
use super::responses::{HealthResponse, StatusResponse};

const SERVICE: &str = env!("CARGO_PKG_NAME");
const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Liveness probe: service identity and a timestamp, nothing that can fail.
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        service: SERVICE,
        version: VERSION,
        timestamp: Utc::now(),
    })
}

/// Registry shape plus the latest run report.
pub async fn status(State(state): State<AppState>) -> Json<StatusResponse> {
    let last_run = state.last_run.read().await.clone();
    Json(StatusResponse {
        service: SERVICE,
        version: VERSION,
        timestamp: Utc::now(),
        sources_total: state.sources_total,
        sources_enabled: state.sources_enabled,
        last_run,
    })
}
