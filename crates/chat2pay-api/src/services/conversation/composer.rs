use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use super::budget::format_price;
use super::types::Conversation;
use crate::database::models::Product;
use crate::models::chat::ChatMessage;
use crate::services::llm::LlmProvider;
use crate::utils::limiters::call_with_timeout;

pub const FALLBACK_FOUND_PRODUCTS: &str = "Berikut produk yang saya temukan untuk Anda:";
pub const FALLBACK_CONTEXT_PRODUCTS: &str =
    "Berdasarkan preferensi Anda, berikut produk yang saya rekomendasikan:";
pub const FALLBACK_UNAVAILABLE: &str =
    "Maaf, saya sedang mengalami kendala. Silakan coba lagi sebentar lagi.";
pub const NO_MATCH_WITHOUT_BUDGET: &str =
    "Maaf, saya tidak menemukan produk yang sesuai dengan kriteria Anda. Coba dengan kata kunci lain.";

pub fn no_match_with_budget(max_price: f64) -> String {
    format!(
        "Maaf, saya tidak menemukan produk yang sesuai dengan budget Rp {}. \
         Coba naikkan budget atau ubah kriteria pencarian.",
        format_price(max_price)
    )
}

/// Numbered product lines used to ground recommendation prompts
pub fn product_list(products: &[Product]) -> String {
    products
        .iter()
        .enumerate()
        .map(|(i, p)| {
            let mut line = format!("{}. {} (Rp {:.0})", i + 1, p.name, p.price);
            if let Some(desc) = p.description.as_deref().filter(|d| !d.is_empty()) {
                line.push_str(" - ");
                line.push_str(desc);
            }
            line
        })
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn budget_prompt(utterance: &str) -> String {
    format!(
        r#"Dari pesan user: "{utterance}"

Tentukan budget atau harga maksimal yang disebutkan dalam Rupiah.
Ubah bentuk seperti "15 juta", "15jt", atau "15.000.000" menjadi angka.
Jika user tidak menyebut budget, jawab: 0

Jawab HANYA dengan angka tanpa format (contoh: 15000000), tanpa penjelasan."#
    )
}

pub fn rewrite_prompt(last_context: &str, utterance: &str) -> String {
    format!(
        r#"Konteks percakapan sebelumnya: "{last_context}"
Preferensi atau jawaban terbaru user: "{utterance}"

Susun satu query pencarian produk yang menggabungkan keduanya.
Contoh: "laptop gaming budget 15 juta untuk sehari-hari"
Jawab hanya dengan query, tanpa penjelasan."#
    )
}

pub fn recommendation_prompt(utterance: &str, products: &[Product]) -> String {
    format!(
        r#"Permintaan user: "{utterance}"

Ditemukan {count} produk yang relevan:
{list}

Berikan rekomendasi singkat (2-3 kalimat) yang menjelaskan kenapa produk-produk ini cocok untuk user dan fitur atau budget apa yang perlu dipertimbangkan.
Jawab dalam Bahasa Indonesia, singkat dan informatif."#,
        count = products.len(),
        list = product_list(products),
    )
}

pub fn context_recommendation_prompt(
    last_context: &str,
    utterance: &str,
    products: &[Product],
) -> String {
    format!(
        r#"Konteks sebelumnya: "{last_context}"
Preferensi terbaru user: "{utterance}"

Ditemukan {count} produk yang relevan:
{list}

Berikan rekomendasi singkat (2-3 kalimat) yang mengaitkan produk-produk ini dengan kebutuhan dan budget user, serta fitur yang perlu diperhatikan.
Jawab dalam Bahasa Indonesia, ramah dan informatif."#,
        count = products.len(),
        list = product_list(products),
    )
}

pub fn product_question_prompt(last_context: &str, question: &str) -> String {
    format!(
        r#"Konteks percakapan sebelumnya (produk yang sudah ditampilkan): "{last_context}"

Pertanyaan user: "{question}"

Jawab pertanyaan tersebut tentang produk yang sudah ditampilkan, berdasarkan konteks di atas.
Jika user bertanya kenapa produk itu disarankan, jelaskan kecocokannya dengan kebutuhan user.
Jika user menanyakan spesifikasi, jelaskan spesifikasi utamanya.
Jawab dalam Bahasa Indonesia, ramah dan membantu."#
    )
}

pub fn clarifying_instruction(utterance: &str) -> String {
    format!("User message: '{utterance}'. Ask a clarifying question.")
}

pub fn alternatives_instruction(query: &str) -> String {
    format!("User mencari: {query}. Tidak ada produk yang cocok, berikan saran alternatif.")
}

/// Assembles prompts and completes them through the LLM provider.
/// Every call is bounded by the per-call deadline; empty completions are errors.
pub struct ResponseComposer {
    llm: Arc<dyn LlmProvider>,
    persona: String,
    call_timeout: Duration,
    history_window: usize,
}

impl ResponseComposer {
    pub fn new(
        llm: Arc<dyn LlmProvider>,
        persona: impl Into<String>,
        call_timeout: Duration,
        history_window: usize,
    ) -> Self {
        Self {
            llm,
            persona: persona.into(),
            call_timeout,
            history_window,
        }
    }

    /// `Complete(systemPrompt?, history?, userText)`
    pub async fn complete(
        &self,
        system_prompt: Option<&str>,
        history: Option<&Conversation>,
        user_text: &str,
    ) -> Result<String> {
        let mut messages = match history {
            Some(conversation) => conversation.to_messages(self.history_window),
            None => Vec::new(),
        };
        if let Some(system) = system_prompt {
            if messages.first().map(|m| m.role.as_str()) != Some("system") {
                messages.insert(0, ChatMessage::system(system));
            }
        }
        messages.push(ChatMessage::user(user_text));

        debug!("Composer call with {} messages", messages.len());

        let text =
            call_with_timeout(self.call_timeout, "complete", self.llm.complete(&messages)).await?;
        let text = text.trim();
        if text.is_empty() {
            anyhow::bail!("LLM returned an empty completion");
        }
        Ok(text.to_string())
    }

    /// Plain chat over the conversation so far
    pub async fn chat(&self, history: &Conversation, utterance: &str) -> Result<String> {
        self.complete(Some(&self.persona), Some(history), utterance).await
    }

    pub async fn clarifying_question(&self, history: &Conversation, utterance: &str) -> Result<String> {
        self.chat(history, &clarifying_instruction(utterance)).await
    }

    /// Raw budget digits as emitted by the model
    pub async fn normalize_budget(&self, utterance: &str) -> Result<String> {
        self.complete(None, None, &budget_prompt(utterance)).await
    }

    pub async fn rewrite_query(&self, last_context: &str, utterance: &str) -> Result<String> {
        let query = self
            .complete(None, None, &rewrite_prompt(last_context, utterance))
            .await?;
        Ok(query.trim_matches('"').trim().to_string())
    }

    pub async fn recommend(&self, utterance: &str, products: &[Product]) -> Result<String> {
        self.complete(
            Some(&self.persona),
            None,
            &recommendation_prompt(utterance, products),
        )
        .await
    }

    pub async fn recommend_in_context(
        &self,
        last_context: &str,
        utterance: &str,
        products: &[Product],
    ) -> Result<String> {
        self.complete(
            Some(&self.persona),
            None,
            &context_recommendation_prompt(last_context, utterance, products),
        )
        .await
    }

    pub async fn answer_product_question(&self, last_context: &str, question: &str) -> Result<String> {
        self.complete(
            Some(&self.persona),
            None,
            &product_question_prompt(last_context, question),
        )
        .await
    }

    pub async fn suggest_alternatives(&self, history: &Conversation, query: &str) -> Result<String> {
        self.chat(history, &alternatives_instruction(query)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::conversation::types::Turn;
    use crate::services::llm::MockLlmProvider;
    use chrono::Utc;
    use uuid::Uuid;

    fn product(name: &str, price: f64) -> Product {
        Product {
            id: Uuid::new_v4(),
            merchant_id: Uuid::nil(),
            outlet_id: None,
            category_id: None,
            name: name.to_string(),
            description: Some("RTX 4060".to_string()),
            sku: None,
            price,
            stock: 3,
            status: "active".to_string(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn composer(llm: MockLlmProvider) -> ResponseComposer {
        ResponseComposer::new(Arc::new(llm), "persona", Duration::from_secs(5), 20)
    }

    #[test]
    fn test_no_match_wording() {
        assert_eq!(
            no_match_with_budget(15_000_000.0),
            "Maaf, saya tidak menemukan produk yang sesuai dengan budget Rp 15 juta. \
             Coba naikkan budget atau ubah kriteria pencarian."
        );
    }

    #[test]
    fn test_recommendation_prompt_grounds_products() {
        let prompt = recommendation_prompt("laptop gaming", &[product("ROG", 14_500_000.0)]);
        assert!(prompt.contains("Ditemukan 1 produk"));
        assert!(prompt.contains("1. ROG (Rp 14500000) - RTX 4060"));
    }

    #[tokio::test]
    async fn test_chat_sends_history_then_utterance() {
        let mut llm = MockLlmProvider::new();
        llm.expect_complete()
            .withf(|m| {
                m.len() == 3
                    && m[0].role == "system"
                    && m[1].content == "hi"
                    && m[2].role == "user"
                    && m[2].content == "cari laptop"
            })
            .returning(|_| Ok("  Siap!  ".to_string()));

        let mut history = Conversation::with_persona("persona");
        history.extend([Turn::human("hi")]);

        let reply = composer(llm).chat(&history, "cari laptop").await.unwrap();
        assert_eq!(reply, "Siap!");
    }

    #[tokio::test]
    async fn test_empty_completion_is_error() {
        let mut llm = MockLlmProvider::new();
        llm.expect_complete().returning(|_| Ok("   ".to_string()));
        assert!(composer(llm).normalize_budget("x").await.is_err());
    }

    #[tokio::test]
    async fn test_rewrite_strips_quotes() {
        let mut llm = MockLlmProvider::new();
        llm.expect_complete()
            .withf(|m| m.len() == 1 && m[0].content.contains("yang lebih murah"))
            .returning(|_| Ok("\"laptop gaming murah\"".to_string()));

        let query = composer(llm)
            .rewrite_query("laptop gaming", "yang lebih murah")
            .await
            .unwrap();
        assert_eq!(query, "laptop gaming murah");
    }
}
