pub mod client;
pub mod error;
pub mod types;

pub use client::{ChatClient, Generator};
pub use error::GenerationError;
pub use types::{ChatMessage, ChatRequest, ChatResponse, Usage};
