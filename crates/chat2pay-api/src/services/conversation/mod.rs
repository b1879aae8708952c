//! Conversational product discovery
//!
//! - Session memory over a TTL key/value store (Redis or in-process)
//! - Closed-set intent classification
//! - Budget extraction and prompt assembly
//! - The dialogue orchestrator tying retrieval and generation together

pub mod budget;
pub mod composer;
pub mod intent;
pub mod memory;
pub mod orchestrator;
pub mod store;
pub mod types;

pub use budget::{extract_budget, format_price};
pub use composer::ResponseComposer;
pub use intent::{Intent, IntentClassifier};
pub use memory::{history_key, SessionMemory};
pub use orchestrator::{DialogueError, DialogueOrchestrator};
pub use store::{InMemorySessionStore, RedisSessionStore, SessionStore};
pub use types::{Conversation, NoHistory, Role, Turn};
