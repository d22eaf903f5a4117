//! LLM module - chat-completion integrations
//!
//! Provides the provider abstraction and the OpenAI-compatible client.

pub mod openai;
pub mod traits;

pub use openai::OpenAiClient;
pub use traits::{ChatProvider, ChatResponse, GenerateOptions, TokenUsage};
