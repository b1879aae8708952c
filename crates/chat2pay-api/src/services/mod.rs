pub mod connection_registry;
pub mod conversation;
pub mod llm;
pub mod product_service;
pub mod vector_index;

pub use connection_registry::ConnectionRegistry;
pub use conversation::DialogueOrchestrator;
pub use llm::LlmProvider;
pub use product_service::ProductService;
pub use vector_index::ProductVectorIndex;
