use anyhow::Result;
use axum::extract::FromRef;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use crate::config::{Settings, StorageBackend};
use crate::database::{DbPool, InMemoryProductRepository, PgProductRepository, ProductRepository};
use crate::logging::{ActivityLogger, LoggerConfig};
use crate::security::CustomHeaderValidator;
use crate::services::conversation::{
    InMemorySessionStore, RedisSessionStore, SessionMemory, SessionStore,
};
use crate::services::llm::{build_provider, LlmProvider};
use crate::services::{ConnectionRegistry, DialogueOrchestrator, ProductService, ProductVectorIndex};
use crate::utils::limiters::Limiters;

/// How often the in-memory backend drops expired sessions
const SESSION_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<Settings>,
    pub orchestrator: Arc<DialogueOrchestrator>,
    pub product_service: Arc<ProductService>,
    pub connections: Arc<ConnectionRegistry>,
    pub header_validator: Arc<CustomHeaderValidator>,
    pub session_store: Arc<dyn SessionStore>,
    /// `None` on the memory backend
    pub db_pool: Option<DbPool>,
}

impl AppState {
    /// Wire every component for the configured storage backend
    pub async fn from_settings(settings: Settings) -> Result<Self> {
        let limiters = Arc::new(Limiters::new(&settings.limits));
        let llm = build_provider(&settings.llm, &settings.embedding, limiters)?;

        match settings.storage.backend {
            StorageBackend::Postgres => {
                let db_pool = DbPool::new(&settings.database).await?;
                info!("Database connection established");

                let store = Arc::new(RedisSessionStore::new(&settings.redis)?);
                let repo = Arc::new(PgProductRepository::new(db_pool.clone()));
                let activity = ActivityLogger::new(db_pool.get_pool().clone(), LoggerConfig::default());

                Ok(Self::assemble(settings, llm, repo, store, activity, Some(db_pool)))
            }
            StorageBackend::Memory => {
                info!("Running with in-memory storage backend");
                let store = InMemorySessionStore::new();
                store.start_sweeper(SESSION_SWEEP_INTERVAL);

                Ok(Self::assemble(
                    settings,
                    llm,
                    Arc::new(InMemoryProductRepository::new()),
                    Arc::new(store),
                    ActivityLogger::disabled(),
                    None,
                ))
            }
        }
    }

    /// Build state from already constructed collaborators
    pub fn assemble(
        settings: Settings,
        llm: Arc<dyn LlmProvider>,
        repo: Arc<dyn ProductRepository>,
        store: Arc<dyn SessionStore>,
        activity: ActivityLogger,
        db_pool: Option<DbPool>,
    ) -> Self {
        let assistant = &settings.assistant;

        let memory = Arc::new(SessionMemory::new(
            store.clone(),
            Duration::from_secs(assistant.history_ttl_seconds),
            assistant.persona.clone(),
        ));
        let index = ProductVectorIndex::new(repo.clone(), assistant.min_similarity, assistant.max_results);
        let orchestrator = Arc::new(DialogueOrchestrator::new(
            llm.clone(),
            index,
            memory,
            activity,
            assistant,
        ));

        Self {
            orchestrator,
            product_service: Arc::new(ProductService::new(repo, llm)),
            connections: Arc::new(ConnectionRegistry::new()),
            header_validator: Arc::new(CustomHeaderValidator::from_config(
                &settings.security.custom_headers,
            )),
            session_store: store,
            db_pool,
            settings: Arc::new(settings),
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.settings.server.request_timeout_seconds.max(1))
    }
}

impl FromRef<AppState> for Arc<CustomHeaderValidator> {
    fn from_ref(state: &AppState) -> Self {
        state.header_validator.clone()
    }
}

impl FromRef<AppState> for Arc<DialogueOrchestrator> {
    fn from_ref(state: &AppState) -> Self {
        state.orchestrator.clone()
    }
}

impl FromRef<AppState> for Arc<ProductService> {
    fn from_ref(state: &AppState) -> Self {
        state.product_service.clone()
    }
}

impl FromRef<AppState> for Arc<ConnectionRegistry> {
    fn from_ref(state: &AppState) -> Self {
        state.connections.clone()
    }
}
