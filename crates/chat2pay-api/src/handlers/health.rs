use axum::{extract::State, http::StatusCode, Json};
use serde::Serialize;
use tracing::warn;

use crate::state::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    status: String,
    version: String,
}

pub async fn health_check() -> (StatusCode, Json<HealthResponse>) {
    (
        StatusCode::OK,
        Json(HealthResponse {
            status: "healthy".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }),
    )
}

/// Ready when the session store and (if configured) Postgres answer
pub async fn readiness_check(State(state): State<AppState>) -> StatusCode {
    if let Err(e) = state.session_store.ping().await {
        warn!("Readiness: session store unavailable: {}", e);
        return StatusCode::SERVICE_UNAVAILABLE;
    }

    if let Some(pool) = &state.db_pool {
        if let Err(e) = pool.ping().await {
            warn!("Readiness: database unavailable: {}", e);
            return StatusCode::SERVICE_UNAVAILABLE;
        }
    }

    StatusCode::OK
}
