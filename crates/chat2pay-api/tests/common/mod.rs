#![allow(dead_code)]

use anyhow::{bail, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::json;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chat2pay_api::config::Settings;
use chat2pay_api::database::models::Product;
use chat2pay_api::database::InMemoryProductRepository;
use chat2pay_api::logging::ActivityLogger;
use chat2pay_api::models::chat::ChatMessage;
use chat2pay_api::models::product::ProductRequest;
use chat2pay_api::services::conversation::InMemorySessionStore;
use chat2pay_api::services::LlmProvider;
use chat2pay_api::state::AppState;

pub const SESSION: &str = "s1";

/// Deterministic LLM stand-in: routes on prompt content and records every prompt.
#[derive(Default)]
pub struct ScriptedLlm {
    labels: Mutex<HashMap<String, String>>,
    prompts: Mutex<Vec<String>>,
    rewrite: Mutex<Option<String>>,
    pub fail_classify: AtomicBool,
    pub fail_rewrite: AtomicBool,
    pub fail_alternatives: AtomicBool,
    pub fail_embed: AtomicBool,
    pub fail_complete: AtomicBool,
    pub slow_embed: AtomicBool,
}

impl ScriptedLlm {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn label(&self, utterance: &str, intent: &str) {
        self.labels
            .lock()
            .insert(utterance.to_string(), intent.to_string());
    }

    /// Query returned by the rewrite prompt
    pub fn rewrite_to(&self, query: &str) {
        *self.rewrite.lock() = Some(query.to_string());
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().clone()
    }

    pub fn prompt_containing(&self, needle: &str) -> Option<String> {
        self.prompts().into_iter().find(|p| p.contains(needle))
    }

    fn vector_for(text: &str) -> Vec<f32> {
        let text = text.to_lowercase();
        if text.contains("laptop") {
            vec![1.0, 0.0, 0.0]
        } else if text.contains("mouse") {
            vec![0.0, 1.0, 0.0]
        } else {
            vec![0.0, 0.0, 1.0]
        }
    }
}

#[async_trait]
impl LlmProvider for ScriptedLlm {
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String> {
        let user = messages
            .last()
            .map(|m| m.content.clone())
            .unwrap_or_default();
        self.prompts.lock().push(user.clone());

        let is_classifier = messages
            .first()
            .is_some_and(|m| m.role == "system" && m.content.starts_with("You are an intent classifier"));
        if is_classifier {
            if self.fail_classify.load(Ordering::SeqCst) {
                bail!("classifier offline");
            }
            let label = self
                .labels
                .lock()
                .get(user.trim())
                .cloned()
                .unwrap_or_else(|| "chit_chat".to_string());
            return Ok(label);
        }

        if self.fail_complete.load(Ordering::SeqCst) {
            bail!("completion offline");
        }

        if user.contains("Jawab HANYA dengan angka") {
            return Ok(if user.contains("15 juta") { "15000000" } else { "0" }.to_string());
        }
        if user.contains("Susun satu query") {
            if self.fail_rewrite.load(Ordering::SeqCst) {
                bail!("rewrite rejected");
            }
            let query = self
                .rewrite
                .lock()
                .clone()
                .unwrap_or_else(|| "laptop gaming yang lebih murah".to_string());
            return Ok(format!("\"{}\"", query));
        }
        if user.contains("saran alternatif") && self.fail_alternatives.load(Ordering::SeqCst) {
            bail!("alternatives rejected");
        }
        if let Some(context) = quoted_after(&user, "Konteks sebelumnya: \"") {
            return Ok(format!("Melanjutkan dari \"{}\": ini pilihan lainnya.", context));
        }

        Ok(format!("reply #{}", self.prompts.lock().len()))
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        if self.slow_embed.load(Ordering::SeqCst) {
            tokio::time::sleep(Duration::from_secs(5)).await;
        }
        if self.fail_embed.load(Ordering::SeqCst) {
            bail!("embedding endpoint offline");
        }
        Ok(Self::vector_for(text))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut out = Vec::with_capacity(texts.len());
        for text in texts {
            out.push(self.embed(text).await?);
        }
        Ok(out)
    }
}

fn quoted_after<'a>(text: &'a str, marker: &str) -> Option<&'a str> {
    let start = text.find(marker)? + marker.len();
    let len = text[start..].find('"')?;
    Some(&text[start..start + len])
}

pub fn test_settings() -> Settings {
    serde_json::from_value(json!({
        "server": { "host": "127.0.0.1", "port": 0, "request_timeout_seconds": 10 },
        "security": { "custom_headers": {
            "app_id": "merchant-app",
            "api_key": "secret",
            "request_signature": "disabled",
            "timestamp_tolerance": 300
        }},
        "database": { "url": "postgres://unused", "pool_max_size": 1, "pool_timeout_seconds": 1 },
        "storage": { "backend": "memory" },
        "redis": { "url": "redis://unused", "pool_max_size": 1 },
        "llm": {
            "provider": "openai",
            "chat_model": "test-chat",
            "embedding_model": "test-embed",
            "timeout_seconds": 5,
            "max_tokens": 256,
            "temperature": 0.0
        },
        "embedding": { "dimension": 3 },
        "limits": { "embedding_concurrency": 2, "llm_concurrency": 2, "acquire_timeout_ms": 1000 }
    }))
    .expect("test settings")
}

pub struct Harness {
    pub llm: Arc<ScriptedLlm>,
    pub repo: InMemoryProductRepository,
    pub state: AppState,
}

pub fn harness() -> Harness {
    let llm = ScriptedLlm::new();
    let repo = InMemoryProductRepository::new();
    let state = AppState::assemble(
        test_settings(),
        llm.clone(),
        Arc::new(repo.clone()),
        Arc::new(InMemorySessionStore::new()),
        ActivityLogger::disabled(),
        None,
    );
    Harness { llm, repo, state }
}

pub fn product_request(name: &str, description: &str, price: f64, stock: i32) -> ProductRequest {
    serde_json::from_value(json!({
        "merchant_id": "7d0c8a5e-3c55-4b1e-9a39-0f4f3c9b2a11",
        "name": name,
        "description": description,
        "price": price,
        "stock": stock
    }))
    .expect("product request")
}

/// Three laptops (one above 15 juta) and a mouse
pub async fn seed_catalog(state: &AppState) -> Vec<Product> {
    let requests = vec![
        product_request("Laptop Gaming Alpha", "RTX 4050, 16GB RAM", 12_000_000.0, 5),
        product_request("Laptop Gaming Beta", "RTX 4060, 16GB RAM", 14_500_000.0, 3),
        product_request("Laptop Gaming Omega", "RTX 4080, 32GB RAM", 25_000_000.0, 2),
        product_request("Mouse Wireless", "Silent click", 300_000.0, 20),
    ];
    state
        .product_service
        .create_batch(requests)
        .await
        .expect("seed catalog")
}
