//! Browser session: the grounded action executor
//!
//! Owns one browser context on behalf of one agent and executes the action
//! vocabulary against it, one action at a time. Click, type and select run
//! a two-stage discipline: the fast native path first, then the human-like
//! fallback, with success judged by an observed page-state change rather
//! than by the driver's return value.
//!
//! Invalid arguments, CAPTCHA refusals and no-effect actions come back as
//! `Ok` strings the LLM can read; `Err` is reserved for driver-level
//! failures, which the registry also flattens into strings.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use sha2::{Digest, Sha256};
use tracing::{info, warn};

use crate::core::Result;
use crate::tools::browser::driver::{
    BrowserDriver, ContextDriver, ElementState, PageDriver,
};
use crate::tools::browser::humanize::{ActionKind, Humanize};
use crate::tools::browser::observe::{self, Observation, PageElement};

const NATIVE_TIMEOUT: Duration = Duration::from_secs(5);
const ELEMENT_WAIT_TIMEOUT: Duration = Duration::from_secs(5);
const SETTLE_AFTER_ACTION: Duration = Duration::from_secs(1);
const MAX_WAIT_SECS: f64 = 20.0;
const PAGE_SCROLL_AMOUNT: f64 = 500.0;
const ELEMENT_SCROLL_AMOUNT: f64 = 200.0;

/// Pre/post state captured around an action: URL, content digest, tab count
type PageFingerprint = (String, String, usize);

/// One agent's exclusive view of a browser context
pub struct BrowserSession {
    context: Arc<dyn ContextDriver>,
    humanize: Humanize,
    active_tab: usize,
    action_count: u64,
    /// Elements of the most recent observation; indices are scoped to it
    elements: Vec<PageElement>,
    /// Where the simulated cursor last landed; humanized paths start here
    /// so consecutive actions trace a continuous movement
    last_mouse: (f64, f64),
}

impl BrowserSession {
    pub fn new(context: Arc<dyn ContextDriver>, humanize: Humanize) -> Self {
        Self {
            context,
            humanize,
            active_tab: 0,
            action_count: 0,
            elements: Vec::new(),
            last_mouse: (0.0, 0.0),
        }
    }

    /// Make sure the context has at least one page to act on
    pub async fn ensure_page(&mut self) -> Result<()> {
        if self.context.pages().await?.is_empty() {
            self.context.new_page().await?;
            self.active_tab = 0;
        }
        Ok(())
    }

    pub fn context(&self) -> &Arc<dyn ContextDriver> {
        &self.context
    }

    /// The owning browser handle, used by delegation to create clone contexts
    pub fn browser_handle(&self) -> Option<Arc<dyn BrowserDriver>> {
        self.context.browser()
    }

    pub fn action_count(&self) -> u64 {
        self.action_count
    }

    pub fn active_tab(&self) -> usize {
        self.active_tab
    }

    /// Build a fresh observation and adopt its element index
    pub async fn observe(&mut self) -> Observation {
        let observation = observe::observe(&self.context, self.active_tab).await;
        self.elements = observation.elements.clone();
        observation
    }

    pub async fn current_url(&self) -> Result<String> {
        self.active_page().await?.url().await
    }

    pub async fn current_title(&self) -> Result<String> {
        self.active_page().await?.title().await
    }

    async fn active_page(&self) -> Result<Arc<dyn PageDriver>> {
        let pages = self.context.pages().await?;
        pages.get(self.active_tab).cloned().ok_or_else(|| {
            crate::core::SwarmError::browser(format!(
                "active tab {} out of range (have {} tabs)",
                self.active_tab,
                pages.len()
            ))
        })
    }

    /// `(url, content digest, tab count)` for change detection.
    ///
    /// Known limitation: the digest covers serialized page content, so
    /// mutations confined to shadow DOM may not register as a change.
    async fn fingerprint(&self) -> PageFingerprint {
        let tab_count = self
            .context
            .pages()
            .await
            .map(|pages| pages.len())
            .unwrap_or(0);
        let (url, digest) = match self.active_page().await {
            Ok(page) => {
                let url = page.url().await.unwrap_or_default();
                let digest = match page.content().await {
                    Ok(content) => content_digest(&content),
                    // Unreadable content: digest the clock so states differ
                    Err(_) => content_digest(&format!(
                        "{:?}",
                        std::time::SystemTime::now()
                    )),
                };
                (url, digest)
            }
            Err(_) => (String::new(), String::new()),
        };
        (url, digest, tab_count)
    }

    /// After an action that may open a tab, diff the page set and switch to
    /// the newest page if one appeared.
    async fn check_for_new_tabs(&mut self, before_ids: &HashSet<String>) {
        let Ok(pages) = self.context.pages().await else {
            return;
        };
        if pages.len() <= before_ids.len() {
            return;
        }
        if let Some((index, page)) = pages
            .iter()
            .enumerate()
            .find(|(_, p)| !before_ids.contains(p.id()))
        {
            let _ = page.bring_to_front().await;
            self.active_tab = index;
            info!("detected a new tab, switched to tab index {}", index);
        }
    }

    async fn page_ids(&self) -> HashSet<String> {
        match self.context.pages().await {
            Ok(pages) => pages.iter().map(|p| p.id().to_string()).collect(),
            Err(_) => HashSet::new(),
        }
    }

    // =========================================================
    // Two-stage actions: native first, human-like fallback
    // =========================================================

    /// Click an element by its observation index
    pub async fn click(&mut self, element_index: i64) -> Result<String> {
        let (selector, bbox) = match resolve_element(&self.elements, element_index) {
            Ok(el) => (el.selector.clone(), el.bounding_box.clone()),
            Err(msg) => return Ok(msg),
        };

        let before_ids = self.page_ids().await;
        let before = self.fingerprint().await;
        let page = self.active_page().await?;

        // Stage 1: native click
        match page.click(&selector, NATIVE_TIMEOUT).await {
            Ok(()) => {
                tokio::time::sleep(SETTLE_AFTER_ACTION).await;
                if self.fingerprint().await != before {
                    self.action_count += 1;
                    self.check_for_new_tabs(&before_ids).await;
                    return Ok(format!("Successfully clicked element {}.", element_index));
                }
                warn!("native click on element {} had no effect, falling back", element_index);
            }
            Err(e) => {
                warn!("native click on element {} failed: {}, falling back", element_index, e);
            }
        }

        // Stage 2: human-like click at a random point inside the box
        let (x, y) = self.humanize.point_in_box(&bbox);
        self.humanize.delay_before(ActionKind::Click).await;
        self.humanize
            .mouse_move(page.as_ref(), self.last_mouse, (x, y))
            .await?;
        self.last_mouse = (x, y);
        self.humanize.pause(50, 200).await;
        page.mouse_click(x, y).await?;
        tokio::time::sleep(SETTLE_AFTER_ACTION).await;

        if self.fingerprint().await != before {
            self.action_count += 1;
            self.check_for_new_tabs(&before_ids).await;
            Ok(format!(
                "Successfully clicked element {} using fallback.",
                element_index
            ))
        } else {
            Ok(format!(
                "Error: Clicking element {} had no effect on the page.",
                element_index
            ))
        }
    }

    /// Focus an element, erase its value, type `text`, press Enter
    pub async fn type_text(&mut self, element_index: i64, text: &str) -> Result<String> {
        let (selector, bbox) = match resolve_element(&self.elements, element_index) {
            Ok(el) => (el.selector.clone(), el.bounding_box.clone()),
            Err(msg) => return Ok(msg),
        };

        let before_ids = self.page_ids().await;
        let before = self.fingerprint().await;
        let page = self.active_page().await?;

        // Stage 1: native fill + Enter
        let native = async {
            page.fill(&selector, text, NATIVE_TIMEOUT).await?;
            page.press_key("Enter").await
        };
        match native.await {
            Ok(()) => {
                tokio::time::sleep(SETTLE_AFTER_ACTION).await;
                if self.fingerprint().await != before {
                    self.action_count += 1;
                    self.check_for_new_tabs(&before_ids).await;
                    return Ok(format!(
                        "Successfully typed '{}' into element {}.",
                        text, element_index
                    ));
                }
                warn!("native type into element {} had no effect, falling back", element_index);
            }
            Err(e) => {
                warn!("native type into element {} failed: {}, falling back", element_index, e);
            }
        }

        // Stage 2: human-like focus, select-all, erase, retype
        let (x, y) = self.humanize.point_in_box(&bbox);
        self.humanize.delay_before(ActionKind::Type).await;
        self.humanize
            .mouse_move(page.as_ref(), self.last_mouse, (x, y))
            .await?;
        self.last_mouse = (x, y);
        page.mouse_click(x, y).await?;
        self.humanize.pause(100, 300).await;
        page.press_key("Control+A").await?;
        self.humanize.pause(50, 150).await;
        page.press_key("Backspace").await?;
        self.humanize.pause(100, 200).await;
        self.humanize.type_text(page.as_ref(), text).await?;
        self.humanize.pause(200, 600).await;
        page.press_key("Enter").await?;
        tokio::time::sleep(SETTLE_AFTER_ACTION).await;

        if self.fingerprint().await != before {
            self.action_count += 1;
            self.check_for_new_tabs(&before_ids).await;
            Ok(format!(
                "Successfully typed '{}' into element {} using fallback.",
                text, element_index
            ))
        } else {
            Ok(format!(
                "Error: Typing into element {} had no effect on the page.",
                element_index
            ))
        }
    }

    /// Choose options in a native select element
    pub async fn select_option(
        &mut self,
        element_index: i64,
        values: Vec<String>,
    ) -> Result<String> {
        let (selector, bbox) = match resolve_element(&self.elements, element_index) {
            Ok(el) => (el.selector.clone(), el.bounding_box.clone()),
            Err(msg) => return Ok(msg),
        };

        let before_ids = self.page_ids().await;
        let before = self.fingerprint().await;
        let page = self.active_page().await?;

        // Stage 1: native select
        match page.select_option(&selector, &values, NATIVE_TIMEOUT).await {
            Ok(()) => {
                tokio::time::sleep(SETTLE_AFTER_ACTION).await;
                if self.fingerprint().await != before {
                    self.action_count += 1;
                    self.check_for_new_tabs(&before_ids).await;
                    return Ok(format!(
                        "Successfully selected {:?} in element {}.",
                        values, element_index
                    ));
                }
                warn!("native select on element {} had no effect, falling back", element_index);
            }
            Err(e) => {
                warn!("native select on element {} failed: {}, falling back", element_index, e);
            }
        }

        // Stage 2: approach the element like a user, then select
        let (x, y) = self.humanize.point_in_box(&bbox);
        self.humanize.delay_before(ActionKind::Click).await;
        self.humanize
            .mouse_move(page.as_ref(), self.last_mouse, (x, y))
            .await?;
        self.last_mouse = (x, y);
        self.humanize.pause(100, 300).await;
        page.select_option(&selector, &values, NATIVE_TIMEOUT).await?;
        self.humanize.pause(200, 500).await;
        tokio::time::sleep(SETTLE_AFTER_ACTION).await;

        if self.fingerprint().await != before {
            self.action_count += 1;
            self.check_for_new_tabs(&before_ids).await;
            Ok(format!(
                "Successfully selected {:?} in element {} using fallback.",
                values, element_index
            ))
        } else {
            Ok(format!(
                "Error: Selecting in element {} had no effect on the page.",
                element_index
            ))
        }
    }

    // =========================================================
    // Direct actions
    // =========================================================

    /// Scroll the page or an element up/down
    pub async fn scroll(&mut self, target: &str, direction: &str) -> Result<String> {
        let direction = direction.to_lowercase();
        let sign = match direction.as_str() {
            "down" => 1.0,
            "up" => -1.0,
            _ => return Ok("Error: Direction must be 'up' or 'down'".to_string()),
        };

        let page = self.active_page().await?;
        self.humanize.delay_before(ActionKind::Scroll).await;

        if target.eq_ignore_ascii_case("page") {
            self.humanize
                .scroll(page.as_ref(), (0.0, 0.0), sign * PAGE_SCROLL_AMOUNT)
                .await?;
        } else {
            let Ok(element_index) = target.parse::<i64>() else {
                return Ok(format!(
                    "Error: Invalid target '{}'. Use 'page' or an element index number",
                    target
                ));
            };
            let bbox = match resolve_element(&self.elements, element_index) {
                Ok(el) => el.bounding_box.clone(),
                Err(msg) => return Ok(msg),
            };
            self.humanize
                .scroll(
                    page.as_ref(),
                    (bbox.x, bbox.y),
                    sign * ELEMENT_SCROLL_AMOUNT,
                )
                .await?;
        }

        self.action_count += 1;
        tokio::time::sleep(Duration::from_millis(300)).await;
        Ok(format!("Successfully scrolled {}", direction))
    }

    /// Hover the mouse over an element
    pub async fn hover(&mut self, element_index: i64) -> Result<String> {
        let (selector, bbox) = match resolve_element(&self.elements, element_index) {
            Ok(el) => (el.selector.clone(), el.bounding_box.clone()),
            Err(msg) => return Ok(msg),
        };
        let page = self.active_page().await?;
        match page.hover(&selector, NATIVE_TIMEOUT).await {
            Ok(()) => {
                // The cursor now sits on the element
                self.last_mouse = (
                    bbox.x + bbox.width / 2.0,
                    bbox.y + bbox.height / 2.0,
                );
                self.action_count += 1;
                Ok(format!("Hovered over element {}.", element_index))
            }
            Err(e) => Ok(format!("Error hovering over element {}: {}", element_index, e)),
        }
    }

    /// Press a keyboard key globally
    pub async fn press_key(&mut self, key: &str) -> Result<String> {
        let page = self.active_page().await?;
        match page.press_key(key).await {
            Ok(()) => {
                self.action_count += 1;
                Ok(format!("Pressed key '{}'.", key))
            }
            Err(e) => Ok(format!("Error pressing key '{}': {}", key, e)),
        }
    }

    /// Drag one element onto another
    pub async fn drag(&mut self, start_index: i64, end_index: i64) -> Result<String> {
        let start = match resolve_element(&self.elements, start_index) {
            Ok(el) => el.selector.clone(),
            Err(msg) => return Ok(msg),
        };
        let end = match resolve_element(&self.elements, end_index) {
            Ok(el) => el.selector.clone(),
            Err(msg) => return Ok(msg),
        };
        let page = self.active_page().await?;
        match page.drag_and_drop(&start, &end).await {
            Ok(()) => {
                self.action_count += 1;
                Ok(format!(
                    "Dragged element {} to element {}.",
                    start_index, end_index
                ))
            }
            Err(e) => Ok(format!(
                "Error dragging from {} to {}: {}",
                start_index, end_index, e
            )),
        }
    }

    /// Wait for a duration or for an element state
    pub async fn wait_for(
        &mut self,
        time: Option<f64>,
        element_index: Option<i64>,
        state: &str,
    ) -> Result<String> {
        if let Some(seconds) = time {
            if seconds > MAX_WAIT_SECS {
                return Ok("Error: Time cannot be greater than 20 seconds".to_string());
            }
            if seconds < 0.0 {
                return Ok("Error: Time cannot be negative".to_string());
            }
            tokio::time::sleep(Duration::from_millis((seconds * 1000.0) as u64)).await;
            return Ok(format!("Waited for {} seconds.", seconds));
        }

        if let Some(index) = element_index {
            let Some(element_state) = ElementState::parse(state) else {
                return Ok("Error: state must be 'attached' or 'detached'".to_string());
            };
            let selector = match resolve_element(&self.elements, index) {
                Ok(el) => el.selector.clone(),
                Err(msg) => return Ok(msg),
            };
            let page = self.active_page().await?;
            return match page
                .wait_for_selector(&selector, element_state, ELEMENT_WAIT_TIMEOUT)
                .await
            {
                Ok(()) => {
                    let verb = match element_state {
                        ElementState::Attached => "appear",
                        ElementState::Detached => "disappear",
                    };
                    Ok(format!("Waited for element {} to {}.", index, verb))
                }
                Err(e) => Ok(format!("Error in wait_for: {}", e)),
            };
        }

        Ok("No wait condition provided.".to_string())
    }

    // =========================================================
    // Navigation
    // =========================================================

    /// Navigate the active tab to a URL, prefixing https:// when missing
    pub async fn goto(&mut self, url: &str) -> Result<String> {
        let url = normalize_url(url);
        if url::Url::parse(&url).is_err() {
            return Ok(format!("Error: '{}' is not a valid URL", url));
        }
        let page = self.active_page().await?;
        self.humanize.delay_before(ActionKind::Navigate).await;
        match page.goto(&url).await {
            Ok(()) => {
                self.action_count += 1;
                tokio::time::sleep(Duration::from_secs(2)).await;
                Ok(format!("Successfully navigated to {}", url))
            }
            Err(e) => Ok(format!("Error navigating to {}: {}", url, e)),
        }
    }

    pub async fn go_back(&mut self) -> Result<String> {
        let page = self.active_page().await?;
        self.humanize.delay_before(ActionKind::Navigate).await;
        match page.go_back().await {
            Ok(()) => {
                self.action_count += 1;
                tokio::time::sleep(SETTLE_AFTER_ACTION).await;
                Ok("Successfully navigated back".to_string())
            }
            Err(e) => Ok(format!("Error going back: {}", e)),
        }
    }

    pub async fn go_forward(&mut self) -> Result<String> {
        let page = self.active_page().await?;
        self.humanize.delay_before(ActionKind::Navigate).await;
        match page.go_forward().await {
            Ok(()) => {
                self.action_count += 1;
                tokio::time::sleep(SETTLE_AFTER_ACTION).await;
                Ok("Successfully navigated forward".to_string())
            }
            Err(e) => Ok(format!("Error going forward: {}", e)),
        }
    }

    pub async fn refresh(&mut self) -> Result<String> {
        let page = self.active_page().await?;
        match page.reload().await {
            Ok(()) => {
                self.action_count += 1;
                tokio::time::sleep(SETTLE_AFTER_ACTION).await;
                Ok("Successfully refreshed the page.".to_string())
            }
            Err(e) => Ok(format!("Error refreshing page: {}", e)),
        }
    }

    // =========================================================
    // Tab management
    // =========================================================

    /// List all open tabs with indices, titles and URLs
    pub async fn list_tabs(&self) -> Result<String> {
        let pages = self.context.pages().await?;
        if pages.is_empty() {
            return Ok("No tabs found.".to_string());
        }

        let mut lines = vec!["Available tabs:".to_string()];
        for (i, page) in pages.iter().enumerate() {
            let title = page.title().await.unwrap_or_default();
            let url = page.url().await.unwrap_or_default();
            let status = if i == self.active_tab { " (ACTIVE)" } else { "" };
            lines.push(format!(
                "  {}: {} - {}{}",
                i,
                crate::tools::browser::format::truncate_chars(&title, 50),
                crate::tools::browser::format::truncate_chars(&url, 60),
                status
            ));
        }
        Ok(lines.join("\n"))
    }

    /// Switch to a tab by positional index
    pub async fn switch_tab(&mut self, tab_index: i64) -> Result<String> {
        let pages = self.context.pages().await?;
        if tab_index < 0 || tab_index as usize >= pages.len() {
            return Ok(format!(
                "Error: Invalid tab index {}. Available tabs: 0-{}",
                tab_index,
                pages.len().saturating_sub(1)
            ));
        }
        let index = tab_index as usize;
        let page = &pages[index];
        page.bring_to_front().await?;
        let title = page.title().await.unwrap_or_default();
        self.active_tab = index;
        self.action_count += 1;
        Ok(format!("Successfully switched to tab {}: {}", index, title))
    }

    /// Open a new tab, optionally navigating it to a URL
    pub async fn open_new_tab(&mut self, url: Option<&str>) -> Result<String> {
        let page = self.context.new_page().await?;
        let mut summary = String::new();
        if let Some(url) = url {
            let url = normalize_url(url);
            page.goto(&url).await?;
            summary = format!(" and navigated to {}", url);
        }
        page.bring_to_front().await?;
        self.active_tab = self.context.pages().await?.len().saturating_sub(1);
        self.action_count += 1;
        Ok(format!(
            "Successfully opened new tab (index {}){}",
            self.active_tab, summary
        ))
    }

    /// Close a tab; closing the current tab switches back to tab 0
    pub async fn close_tab(&mut self, tab_index: Option<i64>) -> Result<String> {
        let pages = self.context.pages().await?;
        if pages.len() <= 1 {
            return Ok("Error: Cannot close the last remaining tab.".to_string());
        }

        let index = match tab_index {
            None => self.active_tab,
            Some(i) if i < 0 || i as usize >= pages.len() => {
                return Ok(format!(
                    "Error: Invalid tab index {}. Available tabs: 0-{}",
                    i,
                    pages.len() - 1
                ));
            }
            Some(i) => i as usize,
        };

        let page = &pages[index];
        let title = page.title().await.unwrap_or_default();
        page.close().await?;

        if index == self.active_tab {
            if let Some(first) = self.context.pages().await?.first() {
                let _ = first.bring_to_front().await;
            }
            self.active_tab = 0;
        } else if index < self.active_tab {
            // Positional indices shift left past the closed tab
            self.active_tab -= 1;
        }

        self.action_count += 1;
        Ok(format!("Successfully closed tab {}: {}", index, title))
    }

    // =========================================================
    // Read-only actions
    // =========================================================

    /// Full visible page content as markdown, with URL and title
    pub async fn extract_page_content(&mut self) -> Result<String> {
        let page = self.active_page().await?;
        let url = page.url().await.unwrap_or_default();
        let title = page.title().await.unwrap_or_default();
        let markdown = match page.content().await {
            Ok(html) => observe::html_to_markdown(&html),
            Err(e) => return Ok(format!("Error extracting page content: {}", e)),
        };
        self.action_count += 1;
        Ok(format!("URL: {}\nTitle: {}\n\n{}", url, title, markdown))
    }

    /// Echo a note into the result; audit only
    pub fn take_note(&self, note: &str) -> String {
        info!("agent note: {}", note);
        format!("Note recorded: {}", note)
    }
}

/// Resolve an observation-local index, refusing CAPTCHA-marked elements.
/// Failures are returned as LLM-readable strings.
fn resolve_element(
    elements: &[PageElement],
    index: i64,
) -> std::result::Result<&PageElement, String> {
    if index < 0 || index as usize >= elements.len() {
        return Err(format!(
            "Error: Invalid element index {}. Valid range: 0-{}",
            index,
            elements.len().saturating_sub(1)
        ));
    }
    let element = &elements[index as usize];
    if element.is_captcha {
        return Err(format!(
            "Error: Element {} is identified as a CAPTCHA; refusing to interact with it.",
            index
        ));
    }
    Ok(element)
}

/// Stable digest of serialized page content, used only for change detection
fn content_digest(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Prefix bare hosts with https://
fn normalize_url(url: &str) -> String {
    if url.starts_with("http://") || url.starts_with("https://") {
        url.to_string()
    } else {
        format!("https://{}", url)
    }
}
