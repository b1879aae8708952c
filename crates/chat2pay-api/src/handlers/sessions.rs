use axum::{
    extract::{Path, State},
    Json,
};
use serde::Serialize;
use std::sync::Arc;

use crate::models::response::ApiResponse;
use crate::services::conversation::Turn;
use crate::services::DialogueOrchestrator;
use crate::utils::error::ApiError;

#[derive(Debug, Serialize)]
pub struct SessionHistory {
    pub session_id: String,
    pub turns: Vec<Turn>,
}

pub async fn connect_session_handler(
    State(orchestrator): State<Arc<DialogueOrchestrator>>,
    Path(session_id): Path<String>,
) -> Result<Json<ApiResponse<SessionHistory>>, ApiError> {
    let conversation = orchestrator
        .connect(&session_id)
        .await
        .map_err(|e| ApiError::InternalError(format!("Failed to open session: {}", e)))?;

    Ok(Json(ApiResponse::success(SessionHistory {
        session_id,
        turns: conversation.turns().to_vec(),
    })))
}

pub async fn reset_session_handler(
    State(orchestrator): State<Arc<DialogueOrchestrator>>,
    Path(session_id): Path<String>,
) -> Result<Json<ApiResponse<SessionHistory>>, ApiError> {
    orchestrator
        .reset(&session_id)
        .await
        .map_err(|e| ApiError::InternalError(format!("Failed to reset session: {}", e)))?;

    Ok(Json(ApiResponse::success(SessionHistory {
        session_id,
        turns: Vec::new(),
    })))
}

pub async fn session_history_handler(
    State(orchestrator): State<Arc<DialogueOrchestrator>>,
    Path(session_id): Path<String>,
) -> Result<Json<ApiResponse<SessionHistory>>, ApiError> {
    let conversation = orchestrator
        .history(&session_id)
        .await
        .map_err(|e| ApiError::InternalError(format!("Failed to load history: {}", e)))?
        .ok_or_else(|| ApiError::NotFound(format!("session {} has no history", session_id)))?;

    Ok(Json(ApiResponse::success(SessionHistory {
        session_id,
        turns: conversation.turns().to_vec(),
    })))
}
