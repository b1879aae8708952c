pub mod llama_server;
pub mod openai_compat;

pub use llama_server::LlamaServerProvider;
pub use openai_compat::OpenAiCompatibleProvider;

use crate::config::{EmbeddingConfig, LlmConfig, LlmProviderKind};
use crate::models::chat::ChatMessage;
use crate::utils::limiters::Limiters;
use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::info;

/// Text completion and embedding capability consumed by the dialogue pipeline.
///
/// One adapter is selected at startup from `llm.provider`; everything above
/// this trait is provider-agnostic.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Complete a chat transcript, returning the assistant text
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String>;

    /// Run a closed-set classification prompt and return the raw label text.
    /// Callers must treat the output as untrusted.
    async fn classify(&self, instructions: &str, text: &str) -> Result<String> {
        let messages = [ChatMessage::system(instructions), ChatMessage::user(text)];
        self.complete(&messages).await
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Embed several texts; output order matches input order
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;
}

/// Build the configured provider adapter
pub fn build_provider(
    llm: &LlmConfig,
    embedding: &EmbeddingConfig,
    limiters: Arc<Limiters>,
) -> Result<Arc<dyn LlmProvider>> {
    let provider: Arc<dyn LlmProvider> = match llm.provider {
        LlmProviderKind::LlamaServer => {
            Arc::new(LlamaServerProvider::new(llm, embedding.dimension, limiters)?)
        }
        LlmProviderKind::Openai
        | LlmProviderKind::Mistral
        | LlmProviderKind::Gemini
        | LlmProviderKind::Kolosal => {
            Arc::new(OpenAiCompatibleProvider::new(llm, embedding.dimension, limiters)?)
        }
    };

    info!(
        "LLM provider: {:?} at {} (chat={}, embedding={})",
        llm.provider,
        llm.resolved_base_url(),
        llm.chat_model,
        llm.embedding_model
    );

    Ok(provider)
}

/// Reject empty vectors and vectors of the wrong length
pub(crate) fn check_dimension(embedding: Vec<f32>, expected: usize) -> Result<Vec<f32>> {
    if embedding.is_empty() {
        anyhow::bail!("Generated embedding is empty");
    }
    if embedding.len() != expected {
        anyhow::bail!(
            "Embedding dimension mismatch: expected {}, got {}",
            expected,
            embedding.len()
        );
    }
    Ok(embedding)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Recorder(parking_lot::Mutex<Vec<ChatMessage>>);

    #[async_trait]
    impl LlmProvider for Recorder {
        async fn complete(&self, messages: &[ChatMessage]) -> Result<String> {
            *self.0.lock() = messages.to_vec();
            Ok("  Chit_Chat\n".to_string())
        }
        async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
            Ok(vec![1.0])
        }
        async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            Ok(texts.iter().map(|_| vec![1.0]).collect())
        }
    }

    #[tokio::test]
    async fn test_classify_sends_instructions_then_text() {
        let recorder = Recorder(parking_lot::Mutex::new(Vec::new()));

        // raw label is returned untouched; parsing happens upstream
        let label = recorder.classify("labels only", "halo").await.unwrap();
        assert_eq!(label, "  Chit_Chat\n");

        let sent = recorder.0.lock().clone();
        assert_eq!(
            sent,
            vec![ChatMessage::system("labels only"), ChatMessage::user("halo")]
        );
    }

    #[test]
    fn test_check_dimension() {
        assert!(check_dimension(vec![0.1, 0.2], 2).is_ok());
        assert!(check_dimension(vec![0.1], 2).is_err());
        assert!(check_dimension(Vec::new(), 0).is_err());
    }
}
