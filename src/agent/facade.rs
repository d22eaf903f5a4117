//! Public agent façade
//!
//! Stateless-by-default entry point: build an [`Agent`] with a task, call
//! [`Agent::run`], get the final answer. The façade owns browser launch
//! and teardown; everything below it is browser-agnostic behind the
//! driver traits.

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::warn;

use crate::agent::identity::AgentRegistry;
use crate::agent::orchestrator::{AgentOptions, SwarmAgent, TurnUpdate};
use crate::chat::GroupChat;
use crate::core::{Config, Result};
use crate::llm::{ChatProvider, OpenAiClient};
use crate::tools::browser::cdp::CdpBrowser;

/// A single web-automation task, from browser launch to final answer.
///
/// ```rust,no_run
/// use webswarm::agent::Agent;
///
/// #[tokio::main]
/// async fn main() -> anyhow::Result<()> {
///     let answer = Agent::new("What is the page title of example.com?")
///         .headless(true)
///         .run()
///         .await?;
///     println!("{}", answer);
///     Ok(())
/// }
/// ```
pub struct Agent {
    task: String,
    config: Config,
    room: Option<String>,
    name: Option<String>,
    enable_summarization: bool,
    provider: Option<Arc<dyn ChatProvider>>,
}

impl Agent {
    /// Create an agent for `task` with configuration from file/env
    pub fn new(task: impl Into<String>) -> Self {
        Self::with_config(task, Config::load())
    }

    /// Create an agent with an explicit configuration
    pub fn with_config(task: impl Into<String>, config: Config) -> Self {
        Self {
            task: task.into(),
            config,
            room: None,
            name: None,
            enable_summarization: false,
            provider: None,
        }
    }

    /// Override the loop model
    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.llm.model = model.into();
        self
    }

    /// Run the browser without a visible window
    pub fn headless(mut self, headless: bool) -> Self {
        self.config.browser.headless = headless;
        self
    }

    /// Viewport size in CSS pixels
    pub fn viewport(mut self, width: u32, height: u32) -> Self {
        self.config.browser.viewport_width = width;
        self.config.browser.viewport_height = height;
        self
    }

    /// Use a persistent browser profile directory
    pub fn user_data_dir(mut self, dir: impl Into<String>) -> Self {
        self.config.browser.user_data_dir = Some(dir.into());
        self
    }

    /// Group-chat room to coordinate in
    pub fn room(mut self, room: impl Into<String>) -> Self {
        self.room = Some(room.into());
        self
    }

    /// Explicit agent identity instead of a generated petname
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Append model-written summaries after each action batch
    pub fn summarization(mut self, enabled: bool) -> Self {
        self.enable_summarization = enabled;
        self
    }

    /// Replace the chat provider (tests, alternate endpoints)
    pub fn provider(mut self, provider: Arc<dyn ChatProvider>) -> Self {
        self.provider = Some(provider);
        self
    }

    /// Run the task to completion and return the final answer
    pub async fn run(self) -> Result<String> {
        self.run_with(None).await
    }

    /// Run the task, streaming per-turn updates into `updates`
    pub async fn run_streamed(
        self,
        updates: mpsc::UnboundedSender<TurnUpdate>,
    ) -> Result<String> {
        self.run_with(Some(updates)).await
    }

    async fn run_with(
        self,
        updates: Option<mpsc::UnboundedSender<TurnUpdate>>,
    ) -> Result<String> {
        let provider: Arc<dyn ChatProvider> = match self.provider {
            Some(provider) => provider,
            None => Arc::new(OpenAiClient::from_config(&self.config)),
        };

        // The chat bus is optional: without a reachable backend the swarm
        // still works, just without coordination.
        let chat = match GroupChat::connect(&self.config.chat).await {
            Ok(chat) => Some(chat),
            Err(e) => {
                warn!("group chat backend unavailable: {}", e);
                None
            }
        };

        let registry = AgentRegistry::new(self.config.limits.max_agents);

        let browser = CdpBrowser::launch(&self.config.browser).await?;
        let context = match browser.driver().new_context().await {
            Ok(context) => context,
            Err(e) => {
                let _ = browser.close().await;
                return Err(e);
            }
        };

        let options = AgentOptions {
            name: self.name,
            room: self.room,
            clone_depth: 0,
            enable_summarization: self.enable_summarization,
        };

        let result = async {
            let mut agent = SwarmAgent::create(
                self.config.clone(),
                provider,
                Arc::clone(&context),
                chat,
                registry,
                options,
            )
            .await?;

            let answer = match updates {
                Some(tx) => agent.run_streamed(&self.task, tx).await,
                None => agent.run(&self.task).await,
            };
            agent.dispose();
            answer
        }
        .await;

        if let Err(e) = context.close().await {
            warn!("failed to close root context: {}", e);
        }
        if let Err(e) = browser.close().await {
            warn!("failed to close browser: {}", e);
        }

        result
    }
}
