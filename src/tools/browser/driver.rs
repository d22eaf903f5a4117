//! Browser capability traits
//!
//! The core depends on these traits only; the chromiumoxide adapter in
//! `cdp` implements them for a real browser and the test suite provides an
//! in-memory driver. One `ContextDriver` corresponds to one isolated
//! browser context owned by exactly one agent.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::core::Result;

/// Page load milestone to wait for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadState {
    /// No in-flight network requests
    NetworkIdle,
    /// The document load event fired
    Load,
}

/// Element lifecycle state to wait for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElementState {
    /// Present in the DOM
    Attached,
    /// Removed from the DOM
    Detached,
}

impl ElementState {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "attached" => Some(Self::Attached),
            "detached" => Some(Self::Detached),
            _ => None,
        }
    }
}

/// Handle to a running browser, used only to create isolated contexts
#[async_trait]
pub trait BrowserDriver: Send + Sync {
    /// Create a fresh, isolated context with the default permission set
    async fn new_context(&self) -> Result<Arc<dyn ContextDriver>>;
}

/// Handle to one isolated browser context (a set of tabs)
#[async_trait]
pub trait ContextDriver: Send + Sync {
    /// All open pages, in creation order
    async fn pages(&self) -> Result<Vec<Arc<dyn PageDriver>>>;

    /// Open a new blank page in this context
    async fn new_page(&self) -> Result<Arc<dyn PageDriver>>;

    /// The owning browser handle, if this context can spawn siblings
    fn browser(&self) -> Option<Arc<dyn BrowserDriver>>;

    /// Fetch raw bytes over HTTP with this context's cookies (PDF retrieval)
    async fn fetch(&self, url: &str) -> Result<Vec<u8>>;

    /// Close the context and all its pages
    async fn close(&self) -> Result<()>;
}

/// Handle to one page (tab)
#[async_trait]
pub trait PageDriver: Send + Sync {
    /// Stable identifier for set-diff comparisons across snapshots
    fn id(&self) -> &str;

    async fn url(&self) -> Result<String>;
    async fn title(&self) -> Result<String>;
    async fn goto(&self, url: &str) -> Result<()>;
    async fn go_back(&self) -> Result<()>;
    async fn go_forward(&self) -> Result<()>;
    async fn reload(&self) -> Result<()>;
    async fn close(&self) -> Result<()>;

    /// Serialized page content (outer HTML)
    async fn content(&self) -> Result<String>;

    /// Viewport screenshot as PNG bytes
    async fn screenshot(&self) -> Result<Vec<u8>>;

    /// Make this page the active (frontmost) tab
    async fn bring_to_front(&self) -> Result<()>;

    async fn wait_for_load(&self, state: LoadState, timeout: Duration) -> Result<()>;

    async fn wait_for_selector(
        &self,
        selector: &str,
        state: ElementState,
        timeout: Duration,
    ) -> Result<()>;

    /// Evaluate a script in the page, returning its JSON result
    async fn evaluate(&self, script: &str) -> Result<serde_json::Value>;

    /// Register a script evaluated on every new document
    async fn add_init_script(&self, script: &str) -> Result<()>;

    // Native element interaction (driver resolves the selector)
    async fn click(&self, selector: &str, timeout: Duration) -> Result<()>;
    async fn fill(&self, selector: &str, text: &str, timeout: Duration) -> Result<()>;
    async fn select_option(
        &self,
        selector: &str,
        values: &[String],
        timeout: Duration,
    ) -> Result<()>;
    async fn hover(&self, selector: &str, timeout: Duration) -> Result<()>;
    async fn drag_and_drop(&self, source: &str, target: &str) -> Result<()>;

    // Raw input primitives for the human-like fallback
    async fn press_key(&self, key: &str) -> Result<()>;
    async fn type_char(&self, ch: char) -> Result<()>;
    async fn mouse_move(&self, x: f64, y: f64) -> Result<()>;
    async fn mouse_click(&self, x: f64, y: f64) -> Result<()>;

    /// Scroll by `delta_y` CSS pixels at the given origin (negative = up)
    async fn scroll_by(&self, origin_x: f64, origin_y: f64, delta_y: f64) -> Result<()>;
}
