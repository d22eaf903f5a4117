//! webswarm - self-cloning web automation agents
//!
//! A root agent receives a natural-language task, drives a live Chromium
//! browser through a grounded action vocabulary, and can fan out isolated
//! clone sub-agents that pursue subtasks in parallel and coordinate over a
//! shared group chat.
//!
//! # Architecture
//!
//! - **Core**: shared types, configuration, and error handling
//! - **LLM**: chat-completion provider abstraction
//! - **Tools**: observation builder, action executor, tool registry
//! - **Chat**: the bounded per-room group-chat bus
//! - **Agent**: the reason/act loop, clone orchestration, and the façade
//! - **CLI**: command-line entry point
//!
//! # Usage
//!
//! ```rust,no_run
//! use webswarm::agent::Agent;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let answer = Agent::new("Find the number of stars of the rust-lang/rust repo")
//!         .run()
//!         .await?;
//!     println!("{}", answer);
//!     Ok(())
//! }
//! ```

pub mod agent;
pub mod chat;
pub mod cli;
pub mod core;
pub mod llm;
pub mod tools;

// Re-export commonly used items
pub use agent::{Agent, SwarmAgent, TurnUpdate};
pub use core::{Config, Result, SwarmError};
