//! Conversation history management
//!
//! Holds the ordered per-run message log and enforces the pairing
//! discipline: every assistant message carrying K tool calls is followed by
//! exactly K tool results, matched by call id, before the next assistant
//! message.

use crate::core::Message;

/// Ordered message history for one agent run
#[derive(Debug, Clone, Default)]
pub struct Conversation {
    messages: Vec<Message>,
}

impl Conversation {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a conversation with prior messages (persisted across turns)
    pub fn with_messages(messages: Vec<Message>) -> Self {
        Self { messages }
    }

    pub fn push(&mut self, message: Message) {
        self.messages.push(message);
    }

    pub fn push_user(&mut self, content: impl Into<String>) {
        self.messages.push(Message::user(content.into()));
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn into_messages(self) -> Vec<Message> {
        self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// The final answer of the run: the latest assistant message with text
    /// content and no pending tool calls, if any.
    pub fn final_answer(&self) -> Option<String> {
        self.messages.iter().rev().find_map(|msg| match msg {
            Message::Assistant { content, .. } if !content.trim().is_empty() => {
                Some(content.clone())
            }
            _ => None,
        })
    }

    /// Check the tool-call/result pairing invariant. Returns a description
    /// of the first violation, or `None` when the history is well formed.
    pub fn pairing_violation(&self) -> Option<String> {
        let mut i = 0;
        while i < self.messages.len() {
            if let Message::Assistant { tool_calls, .. } = &self.messages[i] {
                for (k, call) in tool_calls.iter().enumerate() {
                    match self.messages.get(i + 1 + k) {
                        Some(Message::ToolResult { call_id, .. }) if *call_id == call.id => {}
                        Some(other) => {
                            return Some(format!(
                                "call {} expected a matching tool result, found {:?}",
                                call.id, other
                            ));
                        }
                        None => {
                            return Some(format!("call {} has no tool result", call.id));
                        }
                    }
                }
                i += 1 + tool_calls.len();
            } else {
                i += 1;
            }
        }
        None
    }
}
