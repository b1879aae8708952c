use super::{check_dimension, LlmProvider};
use crate::config::LlmConfig;
use crate::models::chat::ChatMessage;
use crate::utils::limiters::Limiters;
use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
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
    message: Message,
}

#[derive(Deserialize)]
struct Message {
    content: String,
}

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    content: &'a str,
}

/// Adapter for a local llama.cpp `llama-server`
#[derive(Clone)]
pub struct LlamaServerProvider {
    client: Client,
    base_url: String,
    max_tokens: usize,
    temperature: f32,
    dimension: usize,
    limiters: Arc<Limiters>,
}

impl LlamaServerProvider {
    pub fn new(config: &LlmConfig, dimension: usize, limiters: Arc<Limiters>) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            base_url: config.resolved_base_url(),
            max_tokens: config.max_tokens,
            temperature: config.temperature,
            dimension,
            limiters,
        })
    }
}

/// Accepts the llama.cpp `{"embedding": [...]}` shape as well as the
/// array and OpenAI `{"data": [...]}` shapes different server builds return.
fn parse_embedding(value: &Value) -> Result<Vec<f32>> {
    fn floats(arr: &[Value]) -> Vec<f32> {
        arr.iter().filter_map(|v| v.as_f64().map(|f| f as f32)).collect()
    }

    if let Some(arr) = value.as_array() {
        let first = arr
            .first()
            .ok_or_else(|| anyhow::anyhow!("Empty array returned from embedding server"))?;
        if let Some(inner) = first.get("embedding") {
            return parse_embedding(inner);
        }
        // llama-server may nest one vector per pooled token
        if let Some(nested) = first.as_array() {
            return Ok(floats(nested));
        }
        return Ok(floats(arr));
    }

    if let Some(inner) = value.get("embedding") {
        return parse_embedding(inner);
    }

    if let Some(first) = value.get("data").and_then(|d| d.as_array()).and_then(|d| d.first()) {
        if let Some(inner) = first.get("embedding") {
            return parse_embedding(inner);
        }
    }

    anyhow::bail!("Unrecognized embedding response format: {}", value)
}

#[async_trait]
impl LlmProvider for LlamaServerProvider {
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String> {
        let (_permit, _wait) =
            Limiters::acquire_timed(self.limiters.llm.clone(), self.limiters.acquire_timeout, "chat")
                .await?;
        debug!("Starting chat generation with {} messages", messages.len());

        let request = ChatCompletionRequest {
            messages,
            max_tokens: self.max_tokens,
            temperature: self.temperature,
            stream: false,
        };

        let response = self
            .client
            .post(format!("{}/v1/chat/completions", self.base_url))
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
            .map(|c| c.message.content)
            .ok_or_else(|| anyhow::anyhow!("No choices returned from LLM"))
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let (_permit, _wait) = Limiters::acquire_timed(
            self.limiters.embedding.clone(),
            self.limiters.acquire_timeout,
            "embedding",
        )
        .await?;
        debug!("Generating embedding for {} chars", text.len());

        let response = self
            .client
            .post(format!("{}/embedding", self.base_url))
            .json(&EmbeddingRequest { content: text })
            .send()
            .await
            .context("Failed to connect to embedding server")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Embedding API error ({}): {}", status, body);
        }

        let value: Value = response
            .json()
            .await
            .context("Failed to parse embedding response as JSON")?;

        check_dimension(parse_embedding(&value)?, self.dimension)
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut embeddings = Vec::with_capacity(texts.len());
        for text in texts {
            embeddings.push(self.embed(text).await?);
        }
        Ok(embeddings)
    }
}
