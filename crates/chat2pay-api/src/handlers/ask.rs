use axum::{
    extract::{rejection::JsonRejection, State},
    Json,
};
use std::time::Instant;
use tracing::info;

use crate::models::chat::{AskProductRequest, DialogueResult};
use crate::models::response::ApiResponse;
use crate::state::AppState;
use crate::utils::error::ApiError;

pub async fn ask_product_handler(
    State(state): State<AppState>,
    payload: Result<Json<AskProductRequest>, JsonRejection>,
) -> Result<Json<ApiResponse<DialogueResult>>, ApiError> {
    let Json(request) = payload.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    let session_id = request.session_id.trim();
    if session_id.is_empty() {
        return Err(ApiError::BadRequest("session_id is required".to_string()));
    }
    if request.prompt.trim().is_empty() {
        return Err(ApiError::BadRequest("prompt is required".to_string()));
    }

    let start = Instant::now();
    info!(
        "Ask request: session={}, prompt_len={}",
        session_id,
        request.prompt.len()
    );

    let result = state
        .orchestrator
        .ask_with_deadline(session_id, request.prompt.trim(), state.request_timeout())
        .await?;

    info!(
        "Ask completed: session={}, products={:?}, took={:?}",
        session_id,
        result.products.as_ref().map(Vec::len),
        start.elapsed()
    );

    Ok(Json(ApiResponse::success(result)))
}
