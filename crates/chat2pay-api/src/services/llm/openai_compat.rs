use super::{check_dimension, LlmProvider};
use crate::config::LlmConfig;
use crate::models::chat::ChatMessage;
use crate::utils::limiters::Limiters;
use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

#[derive(Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    max_tokens: usize,
    temperature: f32,
    stream: bool,
}

#[derive(Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Serialize)]
struct EmbeddingRequest<'a, I: Serialize> {
    model: &'a str,
    input: I,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Deserialize)]
struct EmbeddingData {
    #[serde(default)]
    index: usize,
    embedding: Vec<f32>,
}

/// Providers may return batch items out of order; `index` is authoritative
fn ordered(mut data: Vec<EmbeddingData>) -> Vec<EmbeddingData> {
    data.sort_by_key(|d| d.index);
    data
}

/// Adapter for providers exposing `/chat/completions` and `/embeddings`
/// in the OpenAI wire format (OpenAI, Mistral, Gemini's OpenAI endpoint, Kolosal).
#[derive(Clone)]
pub struct OpenAiCompatibleProvider {
    client: Client,
    base_url: String,
    api_key: String,
    chat_model: String,
    embedding_model: String,
    max_tokens: usize,
    temperature: f32,
    dimension: usize,
    limiters: Arc<Limiters>,
}

impl OpenAiCompatibleProvider {
    pub fn new(config: &LlmConfig, dimension: usize, limiters: Arc<Limiters>) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            base_url: config.resolved_base_url(),
            api_key: config.api_key.clone(),
            chat_model: config.chat_model.clone(),
            embedding_model: config.embedding_model.clone(),
            max_tokens: config.max_tokens,
            temperature: config.temperature,
            dimension,
            limiters,
        })
    }

    fn post(&self, path: &str) -> RequestBuilder {
        let request = self.client.post(format!("{}{}", self.base_url, path));
        if self.api_key.is_empty() {
            request
        } else {
            request.bearer_auth(&self.api_key)
        }
    }

    async fn send_embeddings<I: Serialize + Send + Sync>(&self, input: I) -> Result<Vec<EmbeddingData>> {
        let (_permit, wait) = Limiters::acquire_timed(
            self.limiters.embedding.clone(),
            self.limiters.acquire_timeout,
            "embedding",
        )
        .await?;
        debug!("Embedding permit acquired after {:?}", wait);

        let request = EmbeddingRequest {
            model: &self.embedding_model,
            input,
        };

        let response = self
            .post("/embeddings")
            .json(&request)
            .send()
            .await
            .context("Failed to connect to embedding endpoint")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Embedding API error ({}): {}", status, body);
        }

        let body: EmbeddingResponse = response
            .json()
            .await
            .context("Failed to parse embedding response")?;

        Ok(ordered(body.data))
    }
}

#[async_trait]
impl LlmProvider for OpenAiCompatibleProvider {
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String> {
        let (_permit, wait) =
            Limiters::acquire_timed(self.limiters.llm.clone(), self.limiters.acquire_timeout, "chat")
                .await?;
        debug!(
            "Chat completion with {} messages (permit wait {:?})",
            messages.len(),
            wait
        );

        let request = ChatCompletionRequest {
            model: &self.chat_model,
            messages,
            max_tokens: self.max_tokens,
            temperature: self.temperature,
            stream: false,
        };

        let response = self
            .post("/chat/completions")
            .json(&request)
            .send()
            .await
            .context("Failed to call LLM API")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("LLM API error: {} - {}", status, body);
        }

        let body: ChatCompletionResponse = response
            .json()
            .await
            .context("Failed to parse LLM response")?;

        body.choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| anyhow::anyhow!("No choices returned from LLM"))
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        debug!("Generating embedding for {} chars", text.len());

        let data = self.send_embeddings(text).await?;
        let embedding = data
            .into_iter()
            .next()
            .map(|d| d.embedding)
            .ok_or_else(|| anyhow::anyhow!("Provider returned no embedding data"))?;

        check_dimension(embedding, self.dimension)
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let data = self.send_embeddings(texts).await?;
        if data.len() != texts.len() {
            anyhow::bail!(
                "Embedding batch size mismatch: sent {}, got {}",
                texts.len(),
                data.len()
            );
        }

        data.into_iter()
            .map(|d| check_dimension(d.embedding, self.dimension))
            .collect()
    }
}
