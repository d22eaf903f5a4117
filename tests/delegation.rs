//! Integration tests for the clone orchestrator: parallel fan-out,
//! capacity and depth enforcement, isolation, and cleanup.

mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use common::*;
use webswarm::agent::{AgentOptions, AgentRegistry, SwarmAgent, TurnUpdate};
use webswarm::chat::{GroupChat, MemoryStore};
use webswarm::core::{Config, Message};
use webswarm::llm::ChatResponse;

fn test_config() -> Config {
    let mut config = Config::default();
    config.agent.humanize = false;
    config
}

fn memory_chat() -> GroupChat {
    GroupChat::with_store(Arc::new(MemoryStore::new()), "test:chat", 200)
}

/// The briefing arrives as the clone's own user message; chat history may
/// quote it, so only a user message counts.
fn briefing_mission(messages: &[Message]) -> Option<String> {
    messages.iter().find_map(|m| match m {
        Message::User { .. } => {
            let text = m.text();
            if text.starts_with("CLONE BRIEFING") {
                text.lines()
                    .find_map(|line| line.strip_prefix("YOUR MISSION: "))
                    .map(String::from)
            } else {
                None
            }
        }
        _ => None,
    })
}

/// Whether this batch already carries a delegate result for the root
fn has_delegate_result(messages: &[Message]) -> bool {
    messages.iter().any(|m| {
        matches!(m, Message::ToolResult { tool_name, .. } if tool_name == "delegate")
    })
}

/// A provider that plays three roles: the summarizer, the clones (reply
/// with their mission), and the root (delegate once, then conclude).
fn swarm_provider(
    tasks: Vec<String>,
    registry: Arc<AgentRegistry>,
    peak_live: Arc<AtomicUsize>,
) -> Arc<FnProvider<impl Fn(&[Message]) -> ChatResponse + Send + Sync>> {
    Arc::new(FnProvider(move |messages: &[Message]| {
        let text = batch_text(messages);

        if text.contains("handoff summary") {
            return answer("Parent is collecting page titles for a comparison.");
        }

        if let Some(mission) = briefing_mission(messages) {
            peak_live.fetch_max(registry.live_count(), Ordering::SeqCst);
            return answer(&format!("completed: {}", mission));
        }

        // Root: delegate once, then wrap up after the results arrive
        if has_delegate_result(messages) {
            answer("all subtasks settled")
        } else {
            calls(vec![call(
                "d1",
                "delegate",
                serde_json::json!({ "tasks": tasks }),
            )])
        }
    }))
}

/// Run a root agent that delegates `tasks`, returning the parsed delegate
/// result plus the swarm fixtures for assertions.
async fn run_delegation(
    max_agents: usize,
    tasks: Vec<&str>,
) -> (
    serde_json::Value,
    Arc<AgentRegistry>,
    Arc<MockBrowser>,
    Arc<AtomicUsize>,
    String,
) {
    let tasks: Vec<String> = tasks.into_iter().map(String::from).collect();
    let registry = AgentRegistry::new(max_agents);
    let peak_live = Arc::new(AtomicUsize::new(0));
    let provider = swarm_provider(tasks, Arc::clone(&registry), Arc::clone(&peak_live));

    let browser = MockBrowser::new(SiteMap::new());
    let context = browser.make_context();
    let mut root = SwarmAgent::create(
        test_config(),
        provider,
        context,
        Some(memory_chat()),
        Arc::clone(&registry),
        AgentOptions::default(),
    )
    .await
    .unwrap();

    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    let final_answer = root
        .run_streamed("fetch the page titles concurrently", tx)
        .await
        .unwrap();

    let mut delegate_result = serde_json::Value::Null;
    while let Ok(update) = rx.try_recv() {
        if let TurnUpdate::ToolResult(outcome) = update {
            if outcome.tool_name == "delegate" {
                delegate_result =
                    serde_json::from_str(&outcome.output).expect("delegate result is JSON");
            }
        }
    }

    let live_after = registry.live_count();
    root.dispose();
    assert_eq!(registry.live_count(), live_after - 1);

    (delegate_result, registry, browser, peak_live, final_answer)
}

#[tokio::test(start_paused = true)]
async fn parallel_delegate_runs_isolated_clones() {
    let (result, registry, browser, peak_live, final_answer) = run_delegation(
        5,
        vec!["get title of a.test", "get title of b.test"],
    )
    .await;

    let entries = result.as_array().expect("array of results");
    assert_eq!(entries.len(), 2);

    // Results come back in input order, each from its own clone
    assert_eq!(entries[0]["task"], "get title of a.test");
    assert_eq!(entries[0]["status"], "ok");
    assert!(entries[0]["result"]
        .as_str()
        .unwrap()
        .contains("get title of a.test"));
    assert_eq!(entries[1]["task"], "get title of b.test");
    assert_eq!(entries[1]["status"], "ok");

    // Both clones were alive at once, on top of the root
    assert_eq!(peak_live.load(Ordering::SeqCst), 3);
    assert_eq!(registry.live_count(), 0);

    // One context for the root, one fresh context per clone; the clone
    // contexts never coincide and are closed afterwards
    let contexts = browser.contexts();
    assert_eq!(contexts.len(), 3);
    for clone_context in &contexts[1..] {
        assert!(clone_context.is_closed());
    }
    assert!(!contexts[0].is_closed());

    assert_eq!(final_answer, "all subtasks settled");
}

#[tokio::test(start_paused = true)]
async fn capacity_denials_match_the_overflow() {
    // Root occupies one of two slots; three subtasks fight over the rest
    let (result, _registry, _browser, _peak, _answer) = run_delegation(
        2,
        vec!["task one", "task two", "task three"],
    )
    .await;

    let entries = result.as_array().expect("array of results");
    assert_eq!(entries.len(), 3);

    let ok = entries.iter().filter(|e| e["status"] == "ok").count();
    let denied = entries.iter().filter(|e| e["status"] == "denied").count();
    assert_eq!(ok, 1);
    assert_eq!(denied, 2);

    for entry in entries.iter().filter(|e| e["status"] == "denied") {
        assert!(entry["error"].as_str().unwrap().contains("max agents"));
    }
}

#[tokio::test(start_paused = true)]
async fn depth_cap_denies_with_a_structured_error() {
    let mut config = test_config();
    config.limits.max_clone_depth = 1;

    let registry = AgentRegistry::new(5);
    let peak = Arc::new(AtomicUsize::new(0));
    let provider = swarm_provider(
        vec!["anything".to_string()],
        Arc::clone(&registry),
        peak,
    );

    let browser = MockBrowser::new(SiteMap::new());
    let context = browser.make_context();
    // This agent already sits at the maximum depth
    let mut agent = SwarmAgent::create(
        config,
        provider,
        context,
        None,
        Arc::clone(&registry),
        AgentOptions {
            clone_depth: 1,
            ..Default::default()
        },
    )
    .await
    .unwrap();

    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    agent.run_streamed("try to delegate", tx).await.unwrap();

    let mut delegate_output = String::new();
    while let Ok(update) = rx.try_recv() {
        if let TurnUpdate::ToolResult(outcome) = update {
            if outcome.tool_name == "delegate" {
                delegate_output = outcome.output;
            }
        }
    }

    let parsed: serde_json::Value = serde_json::from_str(&delegate_output).unwrap();
    assert!(parsed["error"]
        .as_str()
        .unwrap()
        .contains("Maximum clone depth"));

    // Nothing was spawned: no extra contexts, no extra live agents
    assert_eq!(browser.contexts().len(), 1);
    assert_eq!(registry.live_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn empty_task_list_is_an_invalid_argument() {
    let provider = ScriptedProvider::new(vec![
        calls(vec![call("d1", "delegate", serde_json::json!({"tasks": []}))]),
        answer("noted"),
    ]);

    let registry = AgentRegistry::new(5);
    let browser = MockBrowser::new(SiteMap::new());
    let context = browser.make_context();
    let mut agent = SwarmAgent::create(
        test_config(),
        provider,
        context,
        None,
        registry,
        AgentOptions::default(),
    )
    .await
    .unwrap();

    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    agent.run_streamed("delegate nothing", tx).await.unwrap();

    let mut delegate_output = String::new();
    while let Ok(update) = rx.try_recv() {
        if let TurnUpdate::ToolResult(outcome) = update {
            if outcome.tool_name == "delegate" {
                delegate_output = outcome.output;
            }
        }
    }
    assert!(delegate_output.contains("'tasks' must be a non-empty list"));
}

#[tokio::test(start_paused = true)]
async fn missing_browser_handle_fails_the_whole_call() {
    let provider = ScriptedProvider::new(vec![
        calls(vec![call(
            "d1",
            "delegate",
            serde_json::json!({"tasks": ["task"]}),
        )]),
        answer("noted"),
    ]);

    let registry = AgentRegistry::new(5);
    let browser = MockBrowser::new(SiteMap::new());
    let context = browser.make_context();
    context.detach_browser();

    let mut agent = SwarmAgent::create(
        test_config(),
        provider,
        context,
        None,
        registry,
        AgentOptions::default(),
    )
    .await
    .unwrap();

    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    agent.run_streamed("delegate without a browser", tx).await.unwrap();

    let mut delegate_output = String::new();
    while let Ok(update) = rx.try_recv() {
        if let TurnUpdate::ToolResult(outcome) = update {
            if outcome.tool_name == "delegate" {
                delegate_output = outcome.output;
            }
        }
    }
    assert!(delegate_output.contains("Cannot create a new browser context"));
}

#[tokio::test(start_paused = true)]
async fn clones_inherit_the_parent_summary() {
    let saw_summary = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&saw_summary);
    let provider = Arc::new(FnProvider(move |messages: &[Message]| {
        let text = batch_text(messages);
        if text.contains("handoff summary") {
            return answer("Parent compared prices on two shops.");
        }
        if briefing_mission(messages).is_some() {
            if text.contains("PARENT CONTEXT: Parent compared prices on two shops.") {
                counter.fetch_add(1, Ordering::SeqCst);
            }
            return answer("clone done");
        }
        if has_delegate_result(messages) {
            answer("done")
        } else {
            calls(vec![call(
                "d1",
                "delegate",
                serde_json::json!({"tasks": ["subtask a", "subtask b"]}),
            )])
        }
    }));

    let registry = AgentRegistry::new(5);
    let browser = MockBrowser::new(SiteMap::new());
    let context = browser.make_context();
    let mut agent = SwarmAgent::create(
        test_config(),
        provider,
        context,
        None,
        registry,
        AgentOptions::default(),
    )
    .await
    .unwrap();

    agent.run("compare prices").await.unwrap();

    // Both clones were briefed with the same parent summary
    assert_eq!(saw_summary.load(Ordering::SeqCst), 2);
}
