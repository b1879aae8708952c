use serde::{Deserialize, Serialize};

use crate::database::models::Product;

// ===== REQUEST MODELS =====

#[derive(Debug, Deserialize)]
pub struct AskProductRequest {
    #[serde(rename = "sessionId", alias = "session_id")]
    pub session_id: String,
    pub prompt: String,
}

// ===== RESPONSE MODELS =====

/// Output of one dialogue turn
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct DialogueResult {
    /// `Some` only when a retrieval ran (the list may be empty)
    pub products: Option<Vec<Product>>,
    pub message: String,
}

impl DialogueResult {
    pub fn message(message: impl Into<String>) -> Self {
        Self {
            products: None,
            message: message.into(),
        }
    }

    pub fn with_products(products: Vec<Product>, message: impl Into<String>) -> Self {
        Self {
            products: Some(products),
            message: message.into(),
        }
    }
}

// ===== LLM WIRE MODELS =====

/// Chat message in the OpenAI-compatible wire format
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ask_request_accepts_camel_and_snake_session_id() {
        let camel: AskProductRequest =
            serde_json::from_str(r#"{"sessionId":"s1","prompt":"hi"}"#).unwrap();
        assert_eq!(camel.session_id, "s1");

        let snake: AskProductRequest =
            serde_json::from_str(r#"{"session_id":"s2","prompt":"hi"}"#).unwrap();
        assert_eq!(snake.session_id, "s2");
    }
}
