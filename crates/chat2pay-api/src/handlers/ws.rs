use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Path, State,
    },
    response::Response,
};
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::models::chat::DialogueResult;
use crate::models::response::ApiResponse;
use crate::state::AppState;
use crate::utils::error::ApiError;

/// Optional JSON form of an inbound frame; plain text is taken as the prompt
#[derive(Debug, Deserialize)]
struct PromptFrame {
    prompt: String,
}

pub async fn ws_chat_handler(
    ws: WebSocketUpgrade,
    Path(session_id): Path<String>,
    State(state): State<AppState>,
) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, session_id, state))
}

async fn handle_socket(socket: WebSocket, session_id: String, state: AppState) {
    let (mut sink, mut stream) = socket.split();
    let (connection_id, mut outbound) = state.connections.register(&session_id);
    info!(
        "WebSocket connected: session={}, connection={}, open={}",
        session_id,
        connection_id,
        state.connections.len()
    );

    if let Err(e) = state.orchestrator.connect(&session_id).await {
        warn!("Failed to open session {}: {}", session_id, e);
    }

    let writer = tokio::spawn(async move {
        while let Some(frame) = outbound.recv().await {
            if sink.send(Message::Text(frame.into())).await.is_err() {
                break;
            }
        }
    });

    let greeting = ApiResponse::success(DialogueResult::message(format!(
        "Selamat datang, {}! Ada produk yang sedang Anda cari?",
        session_id
    )));
    state.connections.send(&session_id, encode(&greeting));

    while let Some(message) = stream.next().await {
        // a newer connection for this session takes over
        if state.connections.connection_id(&session_id) != Some(connection_id) {
            debug!("Connection {} superseded for session {}", connection_id, session_id);
            break;
        }

        match message {
            Ok(Message::Text(text)) => {
                let prompt = prompt_from_frame(text.as_str());
                if prompt.is_empty() {
                    continue;
                }
                let reply = answer(&state, &session_id, &prompt).await;
                if !state.connections.send(&session_id, reply) {
                    break;
                }
            }
            Ok(Message::Close(_)) => break,
            Ok(_) => {}
            Err(e) => {
                debug!("WebSocket error for session {}: {}", session_id, e);
                break;
            }
        }
    }

    state.connections.unregister(&session_id, connection_id);
    writer.abort();
    info!("WebSocket disconnected: session={}, connection={}", session_id, connection_id);
}

fn prompt_from_frame(text: &str) -> String {
    match serde_json::from_str::<PromptFrame>(text) {
        Ok(frame) => frame.prompt.trim().to_string(),
        Err(_) => text.trim().to_string(),
    }
}

async fn answer(state: &AppState, session_id: &str, prompt: &str) -> String {
    match state
        .orchestrator
        .ask_with_deadline(session_id, prompt, state.request_timeout())
        .await
    {
        Ok(result) => encode(&ApiResponse::success(result)),
        Err(e) => {
            let err: ApiError = e.into();
            warn!("WebSocket ask failed for session {}: {}", session_id, err);
            encode(&ApiResponse::<()>::failure(err.to_string()))
        }
    }
}

fn encode<T: Serialize>(response: &T) -> String {
    serde_json::to_string(response)
        .unwrap_or_else(|e| format!(r#"{{"status":false,"data":null,"error":"{}"}}"#, e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prompt_from_json_or_plain_frame() {
        assert_eq!(prompt_from_frame(r#"{"prompt":" laptop "}"#), "laptop");
        assert_eq!(prompt_from_frame("  hi  "), "hi");
        assert_eq!(prompt_from_frame(r#"{"other":1}"#), r#"{"other":1}"#);
    }
}
