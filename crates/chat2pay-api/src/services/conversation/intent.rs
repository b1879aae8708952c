use anyhow::Result;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

use crate::services::llm::LlmProvider;

/// Closed intent taxonomy. Anything else the classifier emits is `Unknown`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    ChitChat,
    GeneralProductRequest,
    SpecificProductSearch,
    ProductClarification,
    ProductQuestion,
    FollowUp,
    Unknown,
}

impl Intent {
    pub const KNOWN: [Intent; 6] = [
        Intent::ChitChat,
        Intent::GeneralProductRequest,
        Intent::SpecificProductSearch,
        Intent::ProductClarification,
        Intent::ProductQuestion,
        Intent::FollowUp,
    ];

    /// Decode raw classifier output: trimmed, case-insensitive exact match
    pub fn parse(raw: &str) -> Self {
        let label = raw.trim().to_lowercase();
        Self::KNOWN
            .into_iter()
            .find(|intent| intent.as_str() == label)
            .unwrap_or(Intent::Unknown)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ChitChat => "chit_chat",
            Self::GeneralProductRequest => "general_product_request",
            Self::SpecificProductSearch => "specific_product_search",
            Self::ProductClarification => "product_clarification",
            Self::ProductQuestion => "product_question",
            Self::FollowUp => "follow_up",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for Intent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub const INTENT_CLASSIFIER_PROMPT: &str = r#"You are an intent classifier for an online shop assistant.
Judge ONLY the current user message. Classify it into EXACTLY one label:

chit_chat
- Greetings or small talk unrelated to products.
  Examples: "hi", "apa kabar", "lagi apa?"

general_product_request
- Mentions a product category WITHOUT any requirement.
  Examples: "Looking for a laptop", "Ada mouse bagus?", "mau beli jam tangan"

specific_product_search
- Mentions a product together with ANY requirement: budget, brand,
  feature, use case or specification.
  Examples: "laptop gaming budget 15 juta", "mouse wireless Logitech", "HP RAM besar"

product_clarification
- Adds or changes requirements for a search already in progress.
  Examples: "warnanya hitam saja", "yang bluetooth", "maksud saya untuk kantor"

product_question
- Asks about details of products already shown: specification,
  features, warranty, comparison.
  Examples: "spesifikasinya apa?", "fiturnya apa saja?", "garansinya berapa lama?"

follow_up
- Asks for alternatives or more options relative to earlier suggestions.
  Examples: "yang lebih murah", "ada warna lain?", "show more options"

RULES:
- Output MUST be ONLY the label, one of:
chit_chat
general_product_request
specific_product_search
product_clarification
product_question
follow_up
- No explanation, no formatting, no JSON. Just the label."#;

/// Stateless per-turn classifier: sees the current utterance only
pub struct IntentClassifier {
    llm: Arc<dyn LlmProvider>,
}

impl IntentClassifier {
    pub fn new(llm: Arc<dyn LlmProvider>) -> Self {
        Self { llm }
    }

    pub async fn classify(&self, utterance: &str) -> Result<Intent> {
        let raw = self.llm.classify(INTENT_CLASSIFIER_PROMPT, utterance).await?;
        let intent = Intent::parse(&raw);
        debug!("Classifier output {:?} -> {}", raw, intent);
        Ok(intent)
    }
}
