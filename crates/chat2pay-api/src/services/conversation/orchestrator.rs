use anyhow::Result;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

use super::budget::extract_budget;
use super::composer::{
    no_match_with_budget, ResponseComposer, FALLBACK_CONTEXT_PRODUCTS, FALLBACK_FOUND_PRODUCTS,
    FALLBACK_UNAVAILABLE, NO_MATCH_WITHOUT_BUDGET,
};
use super::intent::{Intent, IntentClassifier};
use super::memory::SessionMemory;
use super::types::{Conversation, Turn};
use crate::config::AssistantConfig;
use crate::database::models::Product;
use crate::logging::{ActivityLog, ActivityLogger, ActivityStatus, ActivityType};
use crate::models::chat::DialogueResult;
use crate::services::llm::LlmProvider;
use crate::services::vector_index::ProductVectorIndex;
use crate::utils::limiters::call_with_timeout;

pub const UNKNOWN_INTENT_REPLY: &str = "ok";

/// Hard failures of one dialogue turn. Everything else degrades to a message.
#[derive(Debug, thiserror::Error)]
pub enum DialogueError {
    #[error("intent classification failed: {0}")]
    Classification(String),

    #[error("dialogue turn cancelled before completion")]
    Cancelled,
}

/// Per-turn state shared by the intent branches
struct TurnContext<'a> {
    session_id: &'a str,
    utterance: &'a str,
    history: Conversation,
}

/// Branch output: the caller-facing result plus the turns to commit
struct Outcome {
    result: DialogueResult,
    turns: Vec<Turn>,
}

pub struct DialogueOrchestrator {
    llm: Arc<dyn LlmProvider>,
    classifier: IntentClassifier,
    composer: ResponseComposer,
    index: ProductVectorIndex,
    memory: Arc<SessionMemory>,
    activity: ActivityLogger,
    call_timeout: Duration,
}

impl DialogueOrchestrator {
    pub fn new(
        llm: Arc<dyn LlmProvider>,
        index: ProductVectorIndex,
        memory: Arc<SessionMemory>,
        activity: ActivityLogger,
        config: &AssistantConfig,
    ) -> Self {
        let call_timeout = Duration::from_secs(config.call_timeout_seconds.max(1));

        Self {
            classifier: IntentClassifier::new(llm.clone()),
            composer: ResponseComposer::new(
                llm.clone(),
                memory.persona().to_string(),
                call_timeout,
                config.history_window,
            ),
            llm,
            index,
            memory,
            activity,
            call_timeout,
        }
    }

    pub fn memory(&self) -> &Arc<SessionMemory> {
        &self.memory
    }

    /// `ask` bounded by an overall deadline. Elapsing it cancels the turn
    /// before anything is written to history.
    pub async fn ask_with_deadline(
        &self,
        session_id: &str,
        utterance: &str,
        deadline: Duration,
    ) -> Result<DialogueResult, DialogueError> {
        match tokio::time::timeout(deadline, self.ask(session_id, utterance)).await {
            Ok(result) => result,
            Err(_) => {
                warn!("Turn for session {} cancelled after {:?}", session_id, deadline);
                self.activity.log(
                    ActivityLog::builder(session_id, ActivityType::MessageSent)
                        .message(utterance)
                        .error("deadline elapsed", "cancelled")
                        .build(),
                );
                Err(DialogueError::Cancelled)
            }
        }
    }

    /// Run one dialogue turn: classify, dispatch on intent, commit history.
    pub async fn ask(&self, session_id: &str, utterance: &str) -> Result<DialogueResult, DialogueError> {
        let started = Instant::now();
        let _guard = self.memory.lock(session_id).await;

        self.activity.log(
            ActivityLog::builder(session_id, ActivityType::RequestReceived)
                .status(ActivityStatus::Info)
                .message(utterance)
                .build(),
        );

        let intent = match call_with_timeout(
            self.call_timeout,
            "classify",
            self.classifier.classify(utterance),
        )
        .await
        {
            Ok(intent) => intent,
            Err(e) => {
                error!("Intent classification failed for session {}: {}", session_id, e);
                self.activity.log(
                    ActivityLog::builder(session_id, ActivityType::IntentClassified)
                        .message(utterance)
                        .error(e.to_string(), "classification")
                        .build(),
                );
                return Err(DialogueError::Classification(e.to_string()));
            }
        };

        info!("Session {} intent: {}", session_id, intent);
        self.activity.log(
            ActivityLog::builder(session_id, ActivityType::IntentClassified)
                .intent(intent.as_str())
                .llm_duration(started.elapsed().as_millis())
                .build(),
        );

        let ctx = TurnContext {
            session_id,
            utterance,
            history: self.load_history(session_id).await,
        };

        let outcome = match intent {
            Intent::ChitChat => self.plain_chat(&ctx).await,
            Intent::GeneralProductRequest => self.clarifying_question(&ctx).await,
            Intent::SpecificProductSearch => self.specific_search(&ctx).await,
            Intent::ProductClarification | Intent::FollowUp => self.contextual_search(&ctx).await,
            Intent::ProductQuestion => self.product_question(&ctx).await,
            Intent::Unknown => {
                debug!("Unrecognized intent for session {}, acknowledging", session_id);
                Outcome {
                    result: DialogueResult::message(UNKNOWN_INTENT_REPLY),
                    turns: Vec::new(),
                }
            }
        };

        self.commit(session_id, outcome.turns).await;

        let result = outcome.result;
        let mut log = ActivityLog::builder(session_id, ActivityType::MessageSent)
            .intent(intent.as_str())
            .response(&result.message)
            .processing_time(started.elapsed().as_millis());
        if let Some(products) = &result.products {
            log = log.product_count(products.len());
        }
        self.activity.log(log.build());

        Ok(result)
    }

    /// Create the session's conversation if absent
    pub async fn connect(&self, session_id: &str) -> Result<Conversation> {
        let _guard = self.memory.lock(session_id).await;
        let (conversation, created) = self.memory.new_connection(session_id).await?;
        if created {
            info!("Session {} created", session_id);
            self.activity
                .log(ActivityLog::builder(session_id, ActivityType::SessionCreated).build());
        }
        Ok(conversation)
    }

    pub async fn reset(&self, session_id: &str) -> Result<()> {
        let _guard = self.memory.lock(session_id).await;
        self.memory.reset(session_id).await?;
        self.activity
            .log(ActivityLog::builder(session_id, ActivityType::HistoryReset).build());
        Ok(())
    }

    pub async fn history(&self, session_id: &str) -> Result<Option<Conversation>> {
        self.memory.get(session_id).await
    }

    // ===== BRANCHES =====

    async fn plain_chat(&self, ctx: &TurnContext<'_>) -> Outcome {
        let (message, composed) = self.chat_or_apology(ctx).await;
        let mut turns = vec![Turn::human(ctx.utterance)];
        if composed {
            turns.push(Turn::assistant(message.clone()));
        }
        Outcome {
            result: DialogueResult::message(message),
            turns,
        }
    }

    async fn clarifying_question(&self, ctx: &TurnContext<'_>) -> Outcome {
        match self
            .composer
            .clarifying_question(&ctx.history, ctx.utterance)
            .await
        {
            Ok(question) => Outcome {
                result: DialogueResult::message(question.clone()),
                turns: vec![Turn::human(ctx.utterance), Turn::assistant(question)],
            },
            Err(e) => {
                self.composition_failed(ctx, &e);
                self.plain_chat(ctx).await
            }
        }
    }

    async fn specific_search(&self, ctx: &TurnContext<'_>) -> Outcome {
        let (budget, embedding) = tokio::join!(
            self.detect_budget(ctx.utterance),
            self.embed(ctx.utterance)
        );
        let max_price = (budget > 0.0).then_some(budget);
        debug!("Session {} budget ceiling: {:?}", ctx.session_id, max_price);

        let products = match embedding {
            Ok(embedding) => self.retrieve(ctx, &embedding, max_price).await,
            Err(e) => Err(e),
        };
        let products = match products {
            Ok(products) => products,
            Err(e) => return self.retrieval_failed(ctx, &e).await,
        };

        let message = if products.is_empty() {
            match max_price {
                Some(price) => no_match_with_budget(price),
                None => NO_MATCH_WITHOUT_BUDGET.to_string(),
            }
        } else {
            match self.composer.recommend(ctx.utterance, &products).await {
                Ok(recommendation) => recommendation,
                Err(e) => {
                    self.composition_failed(ctx, &e);
                    FALLBACK_FOUND_PRODUCTS.to_string()
                }
            }
        };

        let turns = vec![
            Turn::human(ctx.utterance),
            Turn::assistant(retrieval_summary(ctx.utterance, &products)),
        ];
        Outcome {
            result: DialogueResult::with_products(products, message),
            turns,
        }
    }

    /// Shared by `product_clarification` and `follow_up`
    async fn contextual_search(&self, ctx: &TurnContext<'_>) -> Outcome {
        let Ok(last_context) = ctx.history.last_context() else {
            debug!("Session {} has no prior context, falling back to chat", ctx.session_id);
            return self.plain_chat(ctx).await;
        };

        let query = match self.composer.rewrite_query(last_context, ctx.utterance).await {
            Ok(query) => query,
            Err(e) => {
                warn!("Query rewrite failed for session {}: {}", ctx.session_id, e);
                format!("{} {}", last_context, ctx.utterance)
            }
        };
        debug!("Session {} rewritten query: {}", ctx.session_id, query);

        let products = match self.embed(&query).await {
            Ok(embedding) => self.retrieve(ctx, &embedding, None).await,
            Err(e) => Err(e),
        };
        let products = match products {
            Ok(products) => products,
            Err(e) => return self.retrieval_failed(ctx, &e).await,
        };

        let message = if products.is_empty() {
            match self.composer.suggest_alternatives(&ctx.history, &query).await {
                Ok(suggestion) => suggestion,
                Err(e) => {
                    self.composition_failed(ctx, &e);
                    self.chat_or_apology(ctx).await.0
                }
            }
        } else {
            match self
                .composer
                .recommend_in_context(last_context, ctx.utterance, &products)
                .await
            {
                Ok(recommendation) => recommendation,
                Err(e) => {
                    self.composition_failed(ctx, &e);
                    FALLBACK_CONTEXT_PRODUCTS.to_string()
                }
            }
        };

        let turns = vec![
            Turn::human(ctx.utterance),
            Turn::assistant(retrieval_summary(&query, &products)),
        ];
        Outcome {
            result: DialogueResult::with_products(products, message),
            turns,
        }
    }

    async fn product_question(&self, ctx: &TurnContext<'_>) -> Outcome {
        let Ok(last_context) = ctx.history.last_context() else {
            debug!("Session {} has no shown products, falling back to chat", ctx.session_id);
            return self.plain_chat(ctx).await;
        };

        match self
            .composer
            .answer_product_question(last_context, ctx.utterance)
            .await
        {
            Ok(answer) => Outcome {
                result: DialogueResult::message(answer.clone()),
                turns: vec![Turn::human(ctx.utterance), Turn::assistant(answer)],
            },
            Err(e) => {
                self.composition_failed(ctx, &e);
                self.plain_chat(ctx).await
            }
        }
    }

    // ===== STEPS =====

    async fn load_history(&self, session_id: &str) -> Conversation {
        let persona = self.memory.persona();
        match self.memory.get(session_id).await {
            Ok(Some(mut conversation)) => {
                conversation.ensure_persona(persona);
                conversation
            }
            Ok(None) => Conversation::with_persona(persona),
            Err(e) => {
                warn!("History unavailable for session {}, using empty: {}", session_id, e);
                Conversation::with_persona(persona)
            }
        }
    }

    async fn commit(&self, session_id: &str, turns: Vec<Turn>) {
        if turns.is_empty() {
            return;
        }
        if let Err(e) = self.memory.append(session_id, turns).await {
            warn!("Failed to persist history for session {}: {}", session_id, e);
        }
    }

    /// LLM-normalized budget, falling back to the raw utterance
    async fn detect_budget(&self, utterance: &str) -> f64 {
        match self.composer.normalize_budget(utterance).await {
            Ok(normalized) => extract_budget(&normalized),
            Err(e) => {
                warn!("Budget normalization failed, parsing raw text: {}", e);
                extract_budget(utterance)
            }
        }
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        call_with_timeout(self.call_timeout, "embed", self.llm.embed(text)).await
    }

    async fn retrieve(
        &self,
        ctx: &TurnContext<'_>,
        embedding: &[f32],
        max_price: Option<f64>,
    ) -> Result<Vec<Product>> {
        let started = Instant::now();
        let products = call_with_timeout(
            self.call_timeout,
            "retrieve",
            self.index.search(embedding, max_price),
        )
        .await?;

        self.activity.log(
            ActivityLog::builder(ctx.session_id, ActivityType::RetrievalExecuted)
                .message(ctx.utterance)
                .product_count(products.len())
                .max_price(max_price)
                .retrieval_duration(started.elapsed().as_millis())
                .build(),
        );

        Ok(products)
    }

    async fn retrieval_failed(&self, ctx: &TurnContext<'_>, e: &anyhow::Error) -> Outcome {
        warn!("Retrieval failed for session {}, falling back to chat: {}", ctx.session_id, e);
        self.activity.log(
            ActivityLog::builder(ctx.session_id, ActivityType::RetrievalError)
                .message(ctx.utterance)
                .error(e.to_string(), "retrieval")
                .build(),
        );
        self.plain_chat(ctx).await
    }

    fn composition_failed(&self, ctx: &TurnContext<'_>, e: &anyhow::Error) {
        warn!("Composition failed for session {}: {}", ctx.session_id, e);
        self.activity.log(
            ActivityLog::builder(ctx.session_id, ActivityType::CompositionError)
                .message(ctx.utterance)
                .error(e.to_string(), "composition")
                .build(),
        );
    }

    /// Plain chat reply and whether the composer produced it
    async fn chat_or_apology(&self, ctx: &TurnContext<'_>) -> (String, bool) {
        match self.composer.chat(&ctx.history, ctx.utterance).await {
            Ok(reply) => (reply, true),
            Err(e) => {
                self.composition_failed(ctx, &e);
                (FALLBACK_UNAVAILABLE.to_string(), false)
            }
        }
    }
}

/// Assistant turn recorded after a retrieval so later turns can refer to it
pub fn retrieval_summary(query: &str, products: &[Product]) -> String {
    if products.is_empty() {
        return format!("User mencari: {}. Tidak ditemukan produk yang cocok.", query);
    }

    let names = products
        .iter()
        .map(|p| format!("{} (Rp {:.0})", p.name, p.price))
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        "User mencari: {}. Ditemukan {} produk: {}.",
        query,
        products.len(),
        names
    )
}
