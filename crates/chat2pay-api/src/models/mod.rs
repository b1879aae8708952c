pub mod chat;
pub mod product;
pub mod response;

pub use chat::{AskProductRequest, ChatMessage, DialogueResult};
pub use product::ProductRequest;
pub use response::ApiResponse;
