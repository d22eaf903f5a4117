//! Group-chat bus
//!
//! Per-room bounded append-only log over a shared list store. Agents post
//! short coordination messages and read the recent history each turn. The
//! backend is redis; an in-memory store backs tests and offline runs.
//!
//! Losing the backend is a degraded but non-fatal condition: posts and
//! reads fail soft at the tool layer and the loop continues.

use std::collections::HashMap;
use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::warn;

use crate::core::config::ChatConfig;
use crate::core::Result;

/// A single group-chat message
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Agent name that posted the message
    pub sender: String,
    /// Message body
    pub text: String,
    /// Wall-clock timestamp, milliseconds since the epoch
    pub timestamp: i64,
}

/// Backend list store for the chat bus.
///
/// Keys map to per-room lists ordered newest-first (push prepends).
#[async_trait]
pub trait ChatStore: Send + Sync {
    /// Prepend a payload to the list at `key`
    async fn push(&self, key: &str, payload: &str) -> Result<()>;
    /// Read up to `limit` payloads, newest first
    async fn recent(&self, key: &str, limit: usize) -> Result<Vec<String>>;
    /// Trim the list at `key` to its newest `max` entries
    async fn trim(&self, key: &str, max: usize) -> Result<()>;
}

/// Redis-backed store using `lpush`/`lrange`/`ltrim`
pub struct RedisStore {
    manager: ConnectionManager,
}

impl RedisStore {
    /// Connect to redis at the given URL
    pub async fn connect(url: &str) -> Result<Self> {
        let client = redis::Client::open(url)?;
        let manager = client.get_connection_manager().await?;
        Ok(Self { manager })
    }
}

#[async_trait]
impl ChatStore for RedisStore {
    async fn push(&self, key: &str, payload: &str) -> Result<()> {
        let mut con = self.manager.clone();
        let _: () = con.lpush(key, payload).await?;
        Ok(())
    }

    async fn recent(&self, key: &str, limit: usize) -> Result<Vec<String>> {
        let mut con = self.manager.clone();
        let stop = limit.saturating_sub(1) as isize;
        let entries: Vec<String> = con.lrange(key, 0, stop).await?;
        Ok(entries)
    }

    async fn trim(&self, key: &str, max: usize) -> Result<()> {
        let mut con = self.manager.clone();
        let stop = max.saturating_sub(1) as isize;
        let _: () = con.ltrim(key, 0, stop).await?;
        Ok(())
    }
}

/// In-memory store with the same newest-first semantics
#[derive(Default)]
pub struct MemoryStore {
    rooms: Mutex<HashMap<String, VecDeque<String>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ChatStore for MemoryStore {
    async fn push(&self, key: &str, payload: &str) -> Result<()> {
        let mut rooms = self.rooms.lock().await;
        rooms
            .entry(key.to_string())
            .or_default()
            .push_front(payload.to_string());
        Ok(())
    }

    async fn recent(&self, key: &str, limit: usize) -> Result<Vec<String>> {
        let rooms = self.rooms.lock().await;
        Ok(rooms
            .get(key)
            .map(|list| list.iter().take(limit).cloned().collect())
            .unwrap_or_default())
    }

    async fn trim(&self, key: &str, max: usize) -> Result<()> {
        let mut rooms = self.rooms.lock().await;
        if let Some(list) = rooms.get_mut(key) {
            list.truncate(max);
        }
        Ok(())
    }
}

/// Client for the group-chat bus
#[derive(Clone)]
pub struct GroupChat {
    store: Arc<dyn ChatStore>,
    prefix: String,
    max_messages: usize,
}

impl GroupChat {
    /// Connect to the redis backend described by `config`
    pub async fn connect(config: &ChatConfig) -> Result<Self> {
        let store = RedisStore::connect(&config.url()).await?;
        Ok(Self {
            store: Arc::new(store),
            prefix: config.prefix.clone(),
            max_messages: config.max_messages,
        })
    }

    /// Build a bus over an explicit store (tests, offline runs)
    pub fn with_store(store: Arc<dyn ChatStore>, prefix: impl Into<String>, max_messages: usize) -> Self {
        Self {
            store,
            prefix: prefix.into(),
            max_messages,
        }
    }

    fn key(&self, room: &str) -> String {
        format!("{}:{}", self.prefix, room)
    }

    /// Append a message to a room and trim the room to its bound
    pub async fn post(&self, room: &str, sender: &str, text: &str) -> Result<()> {
        let message = ChatMessage {
            sender: sender.to_string(),
            text: text.to_string(),
            timestamp: Utc::now().timestamp_millis(),
        };
        let payload = serde_json::to_string(&message)?;
        let key = self.key(room);
        self.store.push(&key, &payload).await?;
        self.store.trim(&key, self.max_messages).await?;
        Ok(())
    }

    /// Most recent up to `limit` messages, in chronological order
    pub async fn history(&self, room: &str, limit: usize) -> Result<Vec<ChatMessage>> {
        let entries = self.store.recent(&self.key(room), limit).await?;
        let mut messages: Vec<ChatMessage> = entries
            .iter()
            .filter_map(|payload| match serde_json::from_str(payload) {
                Ok(msg) => Some(msg),
                Err(e) => {
                    warn!("dropping malformed chat payload: {}", e);
                    None
                }
            })
            .collect();
        // Store returns newest first
        messages.reverse();
        Ok(messages)
    }

    /// Render messages as lines for inclusion in the LLM prompt
    pub fn format_history(messages: &[ChatMessage]) -> String {
        if messages.is_empty() {
            return "(no messages yet)".to_string();
        }
        messages
            .iter()
            .map(|msg| {
                let when = Utc
                    .timestamp_millis_opt(msg.timestamp)
                    .single()
                    .map(|dt| dt.format("%H:%M:%S").to_string())
                    .unwrap_or_else(|| "--:--:--".to_string());
                format!("[{}] {}: {}", when, msg.sender, msg.text)
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

impl std::fmt::Debug for GroupChat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GroupChat")
            .field("prefix", &self.prefix)
            .field("max_messages", &self.max_messages)
            .finish()
    }
}

/// Post with a logged warning instead of an error (fire-and-forget paths)
pub async fn post_soft(chat: &GroupChat, room: &str, sender: &str, text: &str) {
    if let Err(e) = chat.post(room, sender, text).await {
        warn!("group chat post failed: {}", e);
    }
}
