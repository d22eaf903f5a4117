//! Custom error types for webswarm
//!
//! Provides a unified error handling system across all modules.

use thiserror::Error;

/// Main error type for webswarm operations
#[derive(Error, Debug)]
pub enum SwarmError {
    /// Chat-completion endpoint or response errors
    #[error("LLM error: {0}")]
    Llm(String),

    /// Browser automation errors
    #[error("Browser error: {0}")]
    Browser(String),

    /// Tool execution errors
    #[error("Tool execution error: {0}")]
    ToolExecution(String),

    /// Group-chat backend errors
    #[error("Chat bus error: {0}")]
    ChatBus(String),

    /// Agent capacity or depth limit reached
    #[error("Capacity error: {0}")]
    Capacity(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// JSON parsing errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// HTTP request errors
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Redis errors
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic error for other cases
    #[error("{0}")]
    Other(String),
}

/// Convenience Result type for webswarm operations
pub type Result<T> = std::result::Result<T, SwarmError>;

impl SwarmError {
    /// Create an LLM error
    pub fn llm(msg: impl Into<String>) -> Self {
        Self::Llm(msg.into())
    }

    /// Create a browser error
    pub fn browser(msg: impl Into<String>) -> Self {
        Self::Browser(msg.into())
    }

    /// Create a tool execution error
    pub fn tool(msg: impl Into<String>) -> Self {
        Self::ToolExecution(msg.into())
    }

    /// Create a chat bus error
    pub fn chat(msg: impl Into<String>) -> Self {
        Self::ChatBus(msg.into())
    }

    /// Create a capacity error
    pub fn capacity(msg: impl Into<String>) -> Self {
        Self::Capacity(msg.into())
    }

    /// Create a config error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }
}
