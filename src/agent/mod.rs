//! Agent module - the reason/act loop and its delegation fabric
//!
//! Contains the loop orchestrator, the clone fan-out, the handoff
//! summarizer, identity management, and the public façade.

pub mod clone;
pub mod conversation;
pub mod facade;
pub mod identity;
pub mod orchestrator;
pub mod summarizer;

pub use conversation::Conversation;
pub use facade::Agent;
pub use identity::{AgentPermit, AgentRegistry};
pub use orchestrator::{AgentOptions, SwarmAgent, TurnUpdate, NO_ANSWER_SENTINEL};
