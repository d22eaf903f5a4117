//! The reason/act loop
//!
//! Drives the LLM through observe -> think -> act cycles grounded in page
//! observations. Each turn builds a fresh observation, assembles the
//! prompt (system prompt, identity and chat context, prior history, page
//! context with screenshot), and dispatches any tool calls. The loop
//! terminates when the assistant replies without tool calls; that message
//! is the final answer.

use std::sync::Arc;

use base64::Engine;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::agent::clone::{self, DelegationContext};
use crate::agent::conversation::Conversation;
use crate::agent::identity::{AgentPermit, AgentRegistry};
use crate::chat::GroupChat;
use crate::core::config::SYSTEM_PROMPT;
use crate::core::{Config, Content, ContentPart, Message, Result, SwarmError, ToolCall, ToolDefinition, ToolOutcome};
use crate::llm::{ChatProvider, GenerateOptions};
use crate::tools::browser::{BrowserSession, ContextDriver, Humanize, Observation};
use crate::tools::registry::{self, TOOL_DELEGATE, TOOL_POST_GROUPCHAT};

/// Sentinel answer used when the turn cap is reached without a reply
pub const NO_ANSWER_SENTINEL: &str = "Task completed, but no specific answer was provided.";

/// Number of chat messages injected into the prompt each turn
const CHAT_CONTEXT_LIMIT: usize = 50;

/// Streaming event emitted once per assistant reply / tool result
#[derive(Debug, Clone)]
pub enum TurnUpdate {
    /// The assistant spoke, possibly requesting tool calls
    Assistant {
        content: String,
        tool_calls: Vec<ToolCall>,
    },
    /// One tool call finished
    ToolResult(ToolOutcome),
}

/// Options for constructing an agent
#[derive(Debug, Clone, Default)]
pub struct AgentOptions {
    /// Explicit identity; generated when absent
    pub name: Option<String>,
    /// Group-chat room; falls back to the configured default
    pub room: Option<String>,
    /// Distance from the root agent in the delegation tree
    pub clone_depth: usize,
    /// Whether to append a model-written summary after each action batch
    pub enable_summarization: bool,
}

/// One running instance of the reason/act loop, bound to exactly one
/// browser context and one identity.
pub struct SwarmAgent {
    config: Config,
    provider: Arc<dyn ChatProvider>,
    session: BrowserSession,
    chat: Option<GroupChat>,
    registry: Arc<AgentRegistry>,
    permit: Option<AgentPermit>,
    name: String,
    room: String,
    clone_depth: usize,
    enable_summarization: bool,
    cancel: CancellationToken,
    /// In-memory history persisted across runs on this instance
    persistent_messages: Vec<Message>,
    tools: Vec<ToolDefinition>,
    introduced: bool,
}

impl SwarmAgent {
    /// Create an agent bound to `context`. Claims a live-agent slot and
    /// fails with a capacity error when the global cap is reached.
    pub async fn create(
        config: Config,
        provider: Arc<dyn ChatProvider>,
        context: Arc<dyn ContextDriver>,
        chat: Option<GroupChat>,
        registry: Arc<AgentRegistry>,
        options: AgentOptions,
    ) -> Result<Self> {
        let permit = registry.try_acquire().ok_or_else(|| {
            SwarmError::capacity(format!(
                "max agents reached ({})",
                registry.max_agents()
            ))
        })?;
        let name = registry.reserve_name(options.name);

        let humanize = if config.agent.humanize {
            Humanize::default()
        } else {
            Humanize::disabled()
        };
        let mut session = BrowserSession::new(context, humanize);
        session.ensure_page().await?;

        let mut tools = registry::browser_tool_definitions();
        tools.extend(registry::swarm_tool_definitions());

        Ok(Self {
            room: options.room.unwrap_or_else(|| config.chat.room.clone()),
            config,
            provider,
            session,
            chat,
            registry,
            permit: Some(permit),
            name,
            clone_depth: options.clone_depth,
            enable_summarization: options.enable_summarization,
            cancel: CancellationToken::new(),
            persistent_messages: Vec::new(),
            tools,
            introduced: false,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn clone_depth(&self) -> usize {
        self.clone_depth
    }

    pub fn action_count(&self) -> u64 {
        self.session.action_count()
    }

    pub async fn current_url(&self) -> Result<String> {
        self.session.current_url().await
    }

    pub async fn current_title(&self) -> Result<String> {
        self.session.current_title().await
    }

    /// Token observed at turn boundaries; cancel it to stop the loop after
    /// the in-flight action completes.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Release this agent's slot. Idempotent; also runs on drop.
    pub fn dispose(&mut self) {
        if let Some(permit) = self.permit.take() {
            permit.release();
        }
    }

    /// Run the loop to completion and return the final answer
    pub async fn run(&mut self, task: &str) -> Result<String> {
        self.run_inner(task, None).await
    }

    /// Run the loop, emitting a `TurnUpdate` per assistant reply and per
    /// tool result as it lands.
    pub async fn run_streamed(
        &mut self,
        task: &str,
        updates: mpsc::UnboundedSender<TurnUpdate>,
    ) -> Result<String> {
        self.run_inner(task, Some(updates)).await
    }

    async fn run_inner(
        &mut self,
        task: &str,
        updates: Option<mpsc::UnboundedSender<TurnUpdate>>,
    ) -> Result<String> {
        info!(agent = %self.name, depth = self.clone_depth, "starting task: {}", task);
        self.announce(task).await;

        let mut conversation =
            Conversation::with_messages(self.persistent_messages.clone());
        conversation.push_user(task);

        let mut final_answer: Option<String> = None;

        for turn in 0..self.config.limits.max_turns {
            if self.cancel.is_cancelled() {
                info!(agent = %self.name, "cancelled at turn boundary {}", turn);
                break;
            }

            let observation = self.session.observe().await;
            let messages = self.build_prompt(&conversation, &observation).await;

            let response = self
                .provider
                .chat(
                    &self.config.llm.model,
                    &messages,
                    &self.tools,
                    Some(GenerateOptions {
                        temperature: Some(self.config.llm.temperature),
                        ..Default::default()
                    }),
                )
                .await?;

            let assistant =
                Message::assistant_with_calls(response.content.clone(), response.tool_calls.clone());
            conversation.push(assistant);
            if let Some(tx) = &updates {
                let _ = tx.send(TurnUpdate::Assistant {
                    content: response.content.clone(),
                    tool_calls: response.tool_calls.clone(),
                });
            }

            if response.tool_calls.is_empty() {
                if response.content.trim().is_empty() {
                    final_answer = conversation.final_answer();
                } else {
                    final_answer = Some(response.content);
                }
                break;
            }

            let mut outcomes = Vec::with_capacity(response.tool_calls.len());
            for call in &response.tool_calls {
                let output = self.dispatch(call, conversation.messages()).await;
                let outcome = ToolOutcome::new(&call.id, &call.name, output);
                conversation.push(Message::tool_result(
                    &outcome.call_id,
                    &outcome.tool_name,
                    &outcome.output,
                ));
                if let Some(tx) = &updates {
                    let _ = tx.send(TurnUpdate::ToolResult(outcome.clone()));
                }
                outcomes.push(outcome);
            }

            if self.enable_summarization {
                self.summarize_action_batch(&mut conversation, &outcomes)
                    .await;
            }
        }

        let answer = final_answer
            .or_else(|| conversation.final_answer())
            .unwrap_or_else(|| NO_ANSWER_SENTINEL.to_string());

        debug_assert!(conversation.pairing_violation().is_none());
        self.persistent_messages = conversation.into_messages();

        info!(
            agent = %self.name,
            actions = self.session.action_count(),
            "task finished"
        );
        Ok(answer)
    }

    /// Dispatch one tool call to the right component
    async fn dispatch(&mut self, call: &ToolCall, history: &[Message]) -> String {
        match call.name.as_str() {
            TOOL_DELEGATE => {
                let tasks = call.get_string_array("tasks").unwrap_or_default();
                let ctx = DelegationContext {
                    config: self.config.clone(),
                    provider: Arc::clone(&self.provider),
                    registry: Arc::clone(&self.registry),
                    chat: self.chat.clone(),
                    room: self.room.clone(),
                    parent_name: self.name.clone(),
                    clone_depth: self.clone_depth,
                    browser: self.session.browser_handle(),
                };
                clone::delegate(ctx, tasks, history).await
            }
            TOOL_POST_GROUPCHAT => {
                let Some(message) = call.get_string("message") else {
                    return "Error: 'message' argument is required".to_string();
                };
                match &self.chat {
                    Some(chat) => match chat.post(&self.room, &self.name, &message).await {
                        Ok(()) => format!("Posted to group chat ({})", self.room),
                        Err(e) => {
                            warn!("post_groupchat failed: {}", e);
                            format!("Error posting to group chat: {}", e)
                        }
                    },
                    None => "Error posting to group chat: chat backend unavailable".to_string(),
                }
            }
            _ => registry::execute_browser_tool(&mut self.session, call).await,
        }
    }

    /// Assemble the full LLM input for one turn
    async fn build_prompt(
        &self,
        conversation: &Conversation,
        observation: &Observation,
    ) -> Vec<Message> {
        let mut messages = vec![Message::system(SYSTEM_PROMPT)];

        // Identity plus recent group-chat context
        let chat_block = match &self.chat {
            Some(chat) => match chat.history(&self.room, CHAT_CONTEXT_LIMIT).await {
                Ok(history) => GroupChat::format_history(&history),
                Err(e) => {
                    warn!("chat history unavailable: {}", e);
                    "(group chat unavailable)".to_string()
                }
            },
            None => "(group chat unavailable)".to_string(),
        };
        messages.push(Message::system(format!(
            "Your name is {}.\n\nHere is the group chat history:\n\n{}",
            self.name, chat_block
        )));

        // Warn the model off making claims before it has navigated anywhere
        if let Ok(url) = self.session.current_url().await {
            if is_neutral_start_page(&url) {
                messages.push(Message::system(format!(
                    "You are currently on a start page ({}). You have not navigated anywhere \
                     yet: do not make any factual claims before navigating to a relevant page \
                     and observing its content.",
                    if url.is_empty() { "about:blank" } else { &url }
                )));
            }
        }

        messages.extend(conversation.messages().iter().cloned());
        messages.push(page_context_message(observation));
        messages
    }

    /// Post the intro and start-of-task announcements, failing soft
    async fn announce(&mut self, task: &str) {
        if !self.config.agent.announce_tasks {
            return;
        }
        let Some(chat) = &self.chat else { return };
        if !self.introduced {
            self.introduced = true;
            crate::chat::post_soft(
                chat,
                &self.room,
                &self.name,
                &format!(
                    "Hello, I am {}. I will collaborate here while working on tasks.",
                    self.name
                ),
            )
            .await;
        }
        crate::chat::post_soft(
            chat,
            &self.room,
            &self.name,
            &format!("Starting task: {}", task),
        )
        .await;
    }

    /// Append a short model-written summary of the last action batch
    async fn summarize_action_batch(
        &mut self,
        conversation: &mut Conversation,
        outcomes: &[ToolOutcome],
    ) {
        let results = outcomes
            .iter()
            .map(|o| format!("{} -> {}", o.tool_name, o.output))
            .collect::<Vec<_>>()
            .join("\n");
        let messages = vec![
            Message::system(
                "Summarize what just happened on the page after these tool executions in one \
                 or two sentences, from the user's point of view. Start with 'After executing \
                 the tool,'.",
            ),
            Message::user(results),
        ];
        match self
            .provider
            .chat(&self.config.llm.summarizer_model, &messages, &[], None)
            .await
        {
            Ok(response) if !response.content.trim().is_empty() => {
                conversation.push(Message::system(format!(
                    "Summary of last action: {}",
                    response.content
                )));
            }
            Ok(_) => {}
            Err(e) => warn!("action summarization failed: {}", e),
        }
    }
}

impl Drop for SwarmAgent {
    fn drop(&mut self) {
        self.dispose();
    }
}

/// Build the multi-part page-context message: screenshot plus the rendered
/// tab list, element index, and markdown overview.
fn page_context_message(observation: &Observation) -> Message {
    let text = crate::tools::browser::format::format_page_context(observation);
    if observation.screenshot.is_empty() {
        return Message::user(format!("Current state of the page:\n\n{}", text));
    }

    let encoded = base64::engine::general_purpose::STANDARD.encode(&observation.screenshot);
    Message::User {
        content: Content::Parts(vec![
            ContentPart::Image {
                media_type: "image/png".to_string(),
                data: encoded,
            },
            ContentPart::Text {
                text: format!("Current state of the page:\n\n{}", text),
            },
        ]),
    }
}

/// Start pages where the agent has not meaningfully navigated yet
fn is_neutral_start_page(url: &str) -> bool {
    if url.is_empty() || url == "about:blank" {
        return true;
    }
    let trimmed = url
        .trim_start_matches("https://")
        .trim_start_matches("http://")
        .trim_start_matches("www.")
        .trim_end_matches('/');
    matches!(
        trimmed,
        "google.com" | "bing.com" | "duckduckgo.com" | "start.duckduckgo.com"
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::browser::observe::FrameStats;

    #[test]
    fn test_neutral_start_pages() {
        assert!(is_neutral_start_page(""));
        assert!(is_neutral_start_page("about:blank"));
        assert!(is_neutral_start_page("https://www.google.com/"));
        assert!(is_neutral_start_page("https://duckduckgo.com"));
        assert!(!is_neutral_start_page("https://example.com"));
        assert!(!is_neutral_start_page("https://google.com/search?q=rust"));
    }

    #[test]
    fn test_page_context_message_with_screenshot() {
        let observation = Observation {
            screenshot: vec![1, 2, 3],
            markdown: "hello".into(),
            frame_stats: FrameStats::default(),
            ..Default::default()
        };
        let message = page_context_message(&observation);
        match message {
            Message::User {
                content: Content::Parts(parts),
            } => {
                assert!(matches!(parts[0], ContentPart::Image { .. }));
                assert!(matches!(parts[1], ContentPart::Text { .. }));
            }
            other => panic!("unexpected message shape: {:?}", other),
        }
    }

    #[test]
    fn test_page_context_message_degraded() {
        let observation = Observation::degraded("Failed to stabilize page load.", Vec::new());
        let message = page_context_message(&observation);
        assert!(message.text().contains("Failed to stabilize"));
    }
}
