//! Conversation summarizer
//!
//! Condenses a parent's message log into a short handoff summary for a
//! spawned clone: small, actionable, and free of stale element indices or
//! screenshots. The condensation is deterministic; a small model turns it
//! into 2-4 sentences, with a terse fallback when the model is unreachable.

use std::sync::Arc;

use tracing::warn;

use crate::core::Message;
use crate::llm::{ChatProvider, GenerateOptions};

/// Number of trailing messages kept in the condensed log
const TAIL_MESSAGES: usize = 200;
const TEXT_LIMIT: usize = 400;
const ARGS_LIMIT: usize = 120;

const HANDOFF_PROMPT: &str = "You are an expert assistant preparing a crisp handoff summary for a \
clone agent. Write 2-4 concise sentences that clearly state: (1) the main objective, (2) key \
actions and important tool results so far, and (3) current status and blockers or next focus. Be \
concrete and actionable; avoid boilerplate and internal prompts.";

/// Deterministically condense a history into one line per message.
///
/// System messages are dropped, the first user message is kept as the
/// initial request, and only the trailing window is rendered.
pub fn condense(history: &[Message]) -> String {
    if history.is_empty() {
        return String::new();
    }

    let mut lines = Vec::new();

    if let Some(first_user) = history.iter().find_map(|m| match m {
        Message::User { content } => Some(content.text()),
        _ => None,
    }) {
        lines.push(format!("Initial request: {}", shorten(&first_user, TEXT_LIMIT)));
    }

    let tail_start = history.len().saturating_sub(TAIL_MESSAGES);
    for msg in &history[tail_start..] {
        match msg {
            Message::System { .. } => continue,
            Message::Assistant {
                content,
                tool_calls,
            } => {
                if !tool_calls.is_empty() {
                    let calls = tool_calls
                        .iter()
                        .map(|tc| format!("{}({})", tc.name, shorten(&tc.arguments.to_string(), ARGS_LIMIT)))
                        .collect::<Vec<_>>()
                        .join(", ");
                    lines.push(format!("AI called: {}", calls));
                } else if !content.trim().is_empty() {
                    lines.push(format!("AI: {}", shorten(content, TEXT_LIMIT)));
                }
            }
            Message::ToolResult {
                tool_name, content, ..
            } => {
                lines.push(format!("Tool[{}] -> {}", tool_name, shorten(content, TEXT_LIMIT)));
            }
            Message::User { content } => {
                lines.push(format!("User: {}", shorten(&content.text(), TEXT_LIMIT)));
            }
        }
    }

    lines.join("\n")
}

/// Produce the 2-4 sentence handoff summary for a clone
pub async fn summarize(
    provider: &Arc<dyn ChatProvider>,
    model: &str,
    history: &[Message],
    parent_name: &str,
) -> String {
    if history.is_empty() {
        return "No prior conversation history.".to_string();
    }

    let condensed = condense(history);
    if condensed.is_empty() {
        return "No meaningful conversation history to summarize.".to_string();
    }

    let messages = vec![
        Message::system(HANDOFF_PROMPT),
        Message::user(format!(
            "Conversation history (chronological, trimmed):\n{}\n\nProduce the handoff summary now.",
            condensed
        )),
    ];

    match provider
        .chat(model, &messages, &[], Some(GenerateOptions::default()))
        .await
    {
        Ok(response) if !response.content.trim().is_empty() => response.content,
        Ok(_) => fallback(parent_name),
        Err(e) => {
            warn!("handoff summarization failed: {}", e);
            fallback(parent_name)
        }
    }
}

fn fallback(parent_name: &str) -> String {
    format!(
        "Parent agent {} was working on tasks (summary unavailable).",
        parent_name
    )
}

fn shorten(text: &str, max_len: usize) -> String {
    let trimmed = text.trim();
    if trimmed.chars().count() <= max_len {
        return trimmed.to_string();
    }
    let mut out: String = trimmed.chars().take(max_len.saturating_sub(3)).collect();
    out.push_str("...");
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ToolCall;

    #[test]
    fn test_condense_keeps_initial_request() {
        let history = vec![
            Message::system("long system prompt that should be ignored"),
            Message::user("Search for rust tutorials"),
            Message::assistant("I'll search"),
        ];
        let condensed = condense(&history);
        assert!(condensed.contains("Initial request: Search for rust tutorials"));
        assert!(!condensed.contains("long system prompt"));
    }

    #[test]
    fn test_condense_formats_tool_calls_and_results() {
        let history = vec![
            Message::user("click something"),
            Message::assistant_with_calls(
                "",
                vec![
                    ToolCall::new("c1", "click", serde_json::json!({"element_index": 1})),
                    ToolCall::new("c2", "goto", serde_json::json!({"url": "https://example.com"})),
                ],
            ),
            Message::tool_result("c1", "click", "Successfully clicked element 1."),
        ];
        let condensed = condense(&history);
        assert!(condensed.contains("AI called: click("));
        assert!(condensed.contains("goto("));
        assert!(condensed.contains("Tool[click] -> Successfully clicked element 1."));
    }

    #[test]
    fn test_condense_limits_tail() {
        let mut history = Vec::new();
        for i in 0..250 {
            history.push(Message::user(format!("message {}", i)));
        }
        let condensed = condense(&history);
        assert!(!condensed.contains("User: message 40\n"));
        assert!(condensed.contains("message 249"));
        // The first user message survives as the initial request
        assert!(condensed.contains("Initial request: message 0"));
    }

    #[test]
    fn test_condense_truncates_long_content() {
        let history = vec![Message::user("x".repeat(600))];
        let condensed = condense(&history);
        assert!(condensed.len() < 600);
        assert!(condensed.contains("..."));
    }

    #[test]
    fn test_empty_history() {
        assert_eq!(condense(&[]), "");
    }
}
