//! Configuration management for webswarm
//!
//! Supports environment variables, config files, and runtime overrides.
//!
//! Config file location: ~/.config/webswarm/config.toml

use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::PathBuf;

use crate::core::error::{Result, SwarmError};

/// Fixed system prompt for the reason/act loop.
///
/// The prompt mandates grounding claims in observed content, one action at
/// a time, think-then-act, and the collaboration/delegation rules. Tool
/// usage details live in the tool schemas, not here.
pub const SYSTEM_PROMPT: &str = r#"You are an expert web-browsing agent that solves user queries through careful observation, reasoning, and grounded action.

## Context
- A Chromium browser is already open. Each turn you receive a screenshot of the current page annotated with numbered bounding boxes, plus a text index of those elements and a markdown overview.
- Element indices are only valid for the observation they came from. Always pick indices from the LATEST observation.
- Tab indices are positional and may shift when a tab is closed; list tabs again after closing one.
- Never answer from prior knowledge. If the user asks for information from the web, navigate, observe, and base your answer only on what you saw.
- Before concluding something is missing, scroll to reveal more of the page.
- Do not try to solve CAPTCHAs. Find another route, and report the blocker in your final answer if there is none.

## Working style
- Think, then act: every step, state what you observe, your reasoning, the single action you will take, and what you expect it to do.
- Take ONE action at a time and evaluate its result before the next.
- If an action had no effect or the page looks wrong, try waiting, refreshing, or a different element.
- Use new tabs for side research so you do not lose progress.
- Use take_note to record facts you will need later in a long task.

## Collaboration
- You may be part of a team of agents. Recent group-chat history is included every turn; use it to avoid duplicated effort.
- Use post_groupchat for status reports, findings worth sharing, and requests for help.

## Delegation
- Use delegate to run independent subtasks in parallel: pass one concise instruction per clone.
- Each clone gets a fresh, isolated browser context and closes it when done. Ask clones for compact, structured results so you can merge them.
- Clones can delegate further themselves; be deliberate about when parallelism actually helps.

## Finishing
- When the task is complete (or truly impossible), reply WITHOUT any tool call; that message is the final answer. Format it in markdown unless asked otherwise."#;

/// Main configuration for webswarm
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// LLM endpoint configuration
    pub llm: LlmConfig,
    /// Browser configuration
    pub browser: BrowserConfig,
    /// Group-chat backend configuration
    pub chat: ChatConfig,
    /// Swarm limits
    #[serde(default)]
    pub limits: LimitsConfig,
    /// Agent behavior configuration
    #[serde(default)]
    pub agent: AgentConfig,
}

/// Chat-completions endpoint configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Base URL of an OpenAI-compatible endpoint
    pub base_url: String,
    /// Environment variable holding the API key
    pub api_key_env: String,
    /// Model driving the reason/act loop
    pub model: String,
    /// Cheaper model used for handoff summaries
    pub summarizer_model: String,
    /// Sampling temperature
    pub temperature: f32,
    /// Request timeout in seconds
    pub timeout_secs: u64,
}

/// Browser automation configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrowserConfig {
    /// Whether to run without a visible window
    pub headless: bool,
    /// Viewport width in CSS pixels
    pub viewport_width: u32,
    /// Viewport height in CSS pixels
    pub viewport_height: u32,
    /// Optional path to a Chrome/Chromium executable
    pub executable: Option<String>,
    /// Optional persistent profile directory
    pub user_data_dir: Option<String>,
}

/// Group-chat backend configuration (redis list store)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatConfig {
    /// Redis host
    pub host: String,
    /// Redis port
    pub port: u16,
    /// Redis database number
    pub db: i64,
    /// Key prefix: rooms live at "{prefix}:{room}"
    pub prefix: String,
    /// Default room name
    pub room: String,
    /// Maximum messages retained per room
    pub max_messages: usize,
}

/// Hard limits on the delegation swarm
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimitsConfig {
    /// Maximum live agents per process (root included)
    pub max_agents: usize,
    /// Maximum clone depth (root is depth 0)
    pub max_clone_depth: usize,
    /// Maximum reason/act turns per run
    pub max_turns: usize,
}

/// Agent behavior configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Master switch for the human-like action fallback
    pub humanize: bool,
    /// Whether the loop posts its start-of-task announcement to the chat
    pub announce_tasks: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            llm: LlmConfig::default(),
            browser: BrowserConfig::default(),
            chat: ChatConfig::default(),
            limits: LimitsConfig::default(),
            agent: AgentConfig::default(),
        }
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: env::var("OPENAI_BASE_URL")
                .unwrap_or_else(|_| "https://api.openai.com/v1".to_string()),
            api_key_env: "OPENAI_API_KEY".to_string(),
            model: env::var("WEBSWARM_MODEL").unwrap_or_else(|_| "gpt-4o".to_string()),
            summarizer_model: env::var("WEBSWARM_SUMMARIZER_MODEL")
                .unwrap_or_else(|_| "gpt-4o-mini".to_string()),
            temperature: 1.0,
            timeout_secs: 120,
        }
    }
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            headless: env::var("WEBSWARM_HEADLESS")
                .map(|v| v == "true" || v == "1")
                .unwrap_or(false),
            viewport_width: 1280,
            viewport_height: 800,
            executable: env::var("WEBSWARM_BROWSER_PATH").ok(),
            user_data_dir: env::var("WEBSWARM_USER_DATA_DIR").ok(),
        }
    }
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            host: env::var("REDIS_HOST").unwrap_or_else(|_| "localhost".to_string()),
            port: env::var("REDIS_PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(6379),
            db: env::var("REDIS_DB")
                .ok()
                .and_then(|d| d.parse().ok())
                .unwrap_or(0),
            prefix: env::var("WEBSWARM_CHAT_PREFIX").unwrap_or_else(|_| "webswarm:chat".to_string()),
            room: env::var("WEBSWARM_CHAT_ROOM").unwrap_or_else(|_| "lobby".to_string()),
            max_messages: env::var("WEBSWARM_CHAT_MAX_MESSAGES")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(200),
        }
    }
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_agents: env::var("WEBSWARM_MAX_AGENTS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(5),
            max_clone_depth: env::var("WEBSWARM_MAX_CLONE_DEPTH")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(3),
            max_turns: 150,
        }
    }
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            humanize: env::var("WEBSWARM_HUMANIZE")
                .map(|v| v != "false" && v != "0")
                .unwrap_or(true),
            announce_tasks: true,
        }
    }
}

impl Config {
    /// Get the config directory path
    pub fn config_dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("webswarm")
    }

    /// Get the config file path
    pub fn config_file() -> PathBuf {
        Self::config_dir().join("config.toml")
    }

    /// Load configuration from file, environment, and defaults
    pub fn load() -> Self {
        let _ = dotenvy::dotenv();

        if let Ok(config) = Self::load_from_file() {
            return config;
        }

        Self::default()
    }

    /// Load configuration from file only
    pub fn load_from_file() -> Result<Self> {
        let config_path = Self::config_file();

        if !config_path.exists() {
            return Err(SwarmError::config("Config file not found"));
        }

        let content = fs::read_to_string(&config_path)
            .map_err(|e| SwarmError::config(format!("Failed to read config: {}", e)))?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| SwarmError::config(format!("Failed to parse config: {}", e)))?;

        Ok(config)
    }

    /// Save configuration to file
    pub fn save(&self) -> Result<()> {
        let config_dir = Self::config_dir();
        let config_path = Self::config_file();

        if !config_dir.exists() {
            fs::create_dir_all(&config_dir)
                .map_err(|e| SwarmError::config(format!("Failed to create config dir: {}", e)))?;
        }

        let content = toml::to_string_pretty(self)
            .map_err(|e| SwarmError::config(format!("Failed to serialize config: {}", e)))?;

        fs::write(&config_path, content)
            .map_err(|e| SwarmError::config(format!("Failed to write config: {}", e)))?;

        Ok(())
    }

    /// The API key for the LLM endpoint, if set in the environment
    pub fn api_key(&self) -> Option<String> {
        env::var(&self.llm.api_key_env).ok()
    }

    /// Redis connection URL for the chat backend
    pub fn chat_url(&self) -> String {
        self.chat.url()
    }
}

impl ChatConfig {
    /// Redis connection URL for this backend
    pub fn url(&self) -> String {
        format!("redis://{}:{}/{}", self.host, self.port, self.db)
    }
}
