//! Clone orchestrator
//!
//! Implements the `delegate` tool: capacity- and depth-limited parallel
//! fan-out of clone agents, each bound to a fresh isolated browser context
//! and briefed with a summary of the parent's conversation. Subtasks run
//! concurrently and settle independently; one failing clone never fails
//! the whole call.

use std::sync::Arc;

use tokio::task::JoinSet;
use tracing::{error, info};

use crate::agent::identity::AgentRegistry;
use crate::agent::orchestrator::{AgentOptions, SwarmAgent};
use crate::agent::summarizer;
use crate::chat::GroupChat;
use crate::core::{Config, Message, SwarmError};
use crate::llm::ChatProvider;
use crate::tools::browser::{BrowserDriver, ContextDriver};

/// Everything a `delegate` call needs from its calling agent
pub struct DelegationContext {
    pub config: Config,
    pub provider: Arc<dyn ChatProvider>,
    pub registry: Arc<AgentRegistry>,
    pub chat: Option<GroupChat>,
    pub room: String,
    pub parent_name: String,
    pub clone_depth: usize,
    /// Parent browser handle, used only to create clone contexts
    pub browser: Option<Arc<dyn BrowserDriver>>,
}

/// Run `delegate(tasks)`: returns a JSON array of
/// `{task, status: "ok"|"denied"|"error", result?|error?}` in input order,
/// or a single structured error object when the whole call is invalid.
pub fn delegate<'a>(
    ctx: DelegationContext,
    tasks: Vec<String>,
    parent_history: &'a [Message],
) -> std::pin::Pin<Box<dyn std::future::Future<Output = String> + Send + 'a>> {
    Box::pin(delegate_inner(ctx, tasks, parent_history))
}

async fn delegate_inner(
    ctx: DelegationContext,
    tasks: Vec<String>,
    parent_history: &[Message],
) -> String {
    if tasks.is_empty() {
        return serde_json::json!({
            "error": "'tasks' must be a non-empty list of strings"
        })
        .to_string();
    }

    if ctx.clone_depth + 1 > ctx.config.limits.max_clone_depth {
        return serde_json::json!({
            "error": format!(
                "Maximum clone depth ({}) reached. Consider alternative approaches.",
                ctx.clone_depth
            )
        })
        .to_string();
    }

    let Some(browser) = ctx.browser.clone() else {
        return serde_json::json!({
            "error": "Cannot create a new browser context from the current context"
        })
        .to_string();
    };

    // One summary per delegate call, shared by every clone of this batch.
    let summary = summarizer::summarize(
        &ctx.provider,
        &ctx.config.llm.summarizer_model,
        parent_history,
        &ctx.parent_name,
    )
    .await;

    info!(
        parent = %ctx.parent_name,
        depth = ctx.clone_depth,
        "delegating {} subtask(s)",
        tasks.len()
    );

    let mut set: JoinSet<(usize, serde_json::Value)> = JoinSet::new();
    for (index, task) in tasks.iter().enumerate() {
        let task = task.clone();
        let browser = Arc::clone(&browser);
        let config = ctx.config.clone();
        let provider = Arc::clone(&ctx.provider);
        let registry = Arc::clone(&ctx.registry);
        let chat = ctx.chat.clone();
        let room = ctx.room.clone();
        let parent_name = ctx.parent_name.clone();
        let summary = summary.clone();
        let depth = ctx.clone_depth + 1;

        set.spawn(async move {
            let entry = run_single_task(
                task, browser, config, provider, registry, chat, room, parent_name, summary,
                depth,
            )
            .await;
            (index, entry)
        });
    }

    let mut entries: Vec<Option<serde_json::Value>> = vec![None; tasks.len()];
    while let Some(joined) = set.join_next().await {
        match joined {
            Ok((index, entry)) => entries[index] = Some(entry),
            Err(e) => error!("delegate subtask panicked: {}", e),
        }
    }

    let results: Vec<serde_json::Value> = entries
        .into_iter()
        .enumerate()
        .map(|(index, entry)| {
            entry.unwrap_or_else(|| {
                serde_json::json!({
                    "task": tasks[index],
                    "status": "error",
                    "error": "subtask aborted unexpectedly"
                })
            })
        })
        .collect();

    serde_json::to_string(&results).unwrap_or_else(|e| format!("Error encoding results: {}", e))
}

#[allow(clippy::too_many_arguments)]
async fn run_single_task(
    task: String,
    browser: Arc<dyn BrowserDriver>,
    config: Config,
    provider: Arc<dyn ChatProvider>,
    registry: Arc<AgentRegistry>,
    chat: Option<GroupChat>,
    room: String,
    parent_name: String,
    summary: String,
    depth: usize,
) -> serde_json::Value {
    // Best-effort check before paying for a context; creation re-checks.
    if !registry.has_capacity() {
        return serde_json::json!({
            "task": task,
            "status": "denied",
            "error": format!("Delegation denied: max agents reached ({}).", registry.max_agents()),
        });
    }

    let context: Arc<dyn ContextDriver> = match browser.new_context().await {
        Ok(context) => context,
        Err(e) => {
            return serde_json::json!({
                "task": task,
                "status": "error",
                "error": format!("could not create an isolated browser context: {}", e),
            });
        }
    };

    let options = AgentOptions {
        name: None,
        room: Some(room),
        clone_depth: depth,
        enable_summarization: false,
    };

    let entry = match SwarmAgent::create(
        config,
        provider,
        Arc::clone(&context),
        chat,
        Arc::clone(&registry),
        options,
    )
    .await
    {
        Ok(mut agent) => {
            let briefing = clone_briefing(&parent_name, depth, &summary, &task);
            // Boxed to keep the recursive delegate -> run cycle finite.
            let outcome = Box::pin(agent.run(&briefing)).await;
            agent.dispose();
            match outcome {
                Ok(result) => serde_json::json!({
                    "task": task,
                    "status": "ok",
                    "result": result,
                }),
                Err(e) => {
                    error!("clone task failed: {}", e);
                    serde_json::json!({
                        "task": task,
                        "status": "error",
                        "error": e.to_string(),
                    })
                }
            }
        }
        Err(SwarmError::Capacity(msg)) => serde_json::json!({
            "task": task,
            "status": "denied",
            "error": format!("Delegation denied: {}", msg),
        }),
        Err(e) => serde_json::json!({
            "task": task,
            "status": "error",
            "error": e.to_string(),
        }),
    };

    if let Err(e) = context.close().await {
        error!("failed to close clone context: {}", e);
    }

    entry
}

/// The briefing message a clone receives as its task
fn clone_briefing(parent_name: &str, depth: usize, summary: &str, task: &str) -> String {
    format!(
        "CLONE BRIEFING: You are a clone of {parent} (depth {depth}).\n\n\
         PARENT CONTEXT: {summary}\n\n\
         YOUR MISSION: {task}\n\n\
         Ground every claim in pages you actually visited: navigate first, conclude second. \
         Never report facts you have not observed in this session.\n\n\
         You keep full delegation rights; if your mission splits into independent parts, spawn \
         your own clones with the delegate tool. Use the group chat to coordinate with your \
         parent and the other agents.",
        parent = parent_name,
        depth = depth,
        summary = summary,
        task = task,
    )
}
