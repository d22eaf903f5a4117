#![allow(dead_code)]
//! Shared test harness: an in-memory browser driver and scriptable chat
//! providers. The mock web is a map of URL -> site; pages load sites,
//! elements carry click effects (navigate, open a tab, mutate content, or
//! nothing), and the driver implements the same capability traits the
//! chromiumoxide adapter does.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use webswarm::core::{Message, Result, SwarmError, ToolCall, ToolDefinition};
use webswarm::llm::{ChatProvider, ChatResponse, GenerateOptions};
use webswarm::tools::browser::{
    BrowserDriver, ContextDriver, ElementState, LoadState, PageDriver,
};

// =========================================================
// Mock web
// =========================================================

/// What clicking an element does
#[derive(Debug, Clone)]
pub enum ClickEffect {
    /// The click lands but nothing on the page changes
    Nothing,
    /// Navigate the current tab
    Navigate(String),
    /// Open the URL in a new tab
    OpenTab(String),
    /// Replace the page content in place
    MutateContent(String),
}

/// One interactive element on a mock site
#[derive(Debug, Clone)]
pub struct ElemSpec {
    pub kind: String,
    pub text: String,
    pub is_captcha: bool,
    pub on_click: ClickEffect,
}

impl ElemSpec {
    pub fn link(text: &str, effect: ClickEffect) -> Self {
        Self {
            kind: "a".into(),
            text: text.into(),
            is_captcha: false,
            on_click: effect,
        }
    }

    pub fn button(text: &str, effect: ClickEffect) -> Self {
        Self {
            kind: "button".into(),
            text: text.into(),
            is_captcha: false,
            on_click: effect,
        }
    }
}

/// A mock site at some URL
#[derive(Debug, Clone, Default)]
pub struct Site {
    pub title: String,
    pub content: String,
    pub elements: Vec<ElemSpec>,
}

/// URL -> Site registry shared by every context of a mock browser
#[derive(Clone, Default)]
pub struct SiteMap {
    sites: Arc<Mutex<HashMap<String, Site>>>,
}

impl SiteMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, url: &str, site: Site) {
        self.sites.lock().unwrap().insert(url.to_string(), site);
    }

    fn resolve(&self, url: &str) -> Site {
        self.sites.lock().unwrap().get(url).cloned().unwrap_or(Site {
            title: format!("Page at {}", url),
            content: format!("<html><body><p>{}</p></body></html>", url),
            elements: Vec::new(),
        })
    }
}

struct PageState {
    url: String,
    title: String,
    content: String,
    elements: Vec<ElemSpec>,
    history: Vec<String>,
    closed: bool,
}

pub struct MockPage {
    id: String,
    sites: SiteMap,
    context: Mutex<Option<Arc<MockContext>>>,
    state: Mutex<PageState>,
}

impl MockPage {
    fn new(id: String, sites: SiteMap) -> Arc<Self> {
        Arc::new(Self {
            id,
            sites,
            context: Mutex::new(None),
            state: Mutex::new(PageState {
                url: "about:blank".into(),
                title: String::new(),
                content: "<html><body></body></html>".into(),
                elements: Vec::new(),
                history: Vec::new(),
                closed: false,
            }),
        })
    }

    fn load(&self, url: &str) {
        let site = self.sites.resolve(url);
        let mut state = self.state.lock().unwrap();
        let previous = state.url.clone();
        state.history.push(previous);
        state.url = url.to_string();
        state.title = site.title;
        state.content = site.content;
        state.elements = site.elements;
    }

    fn element_index(selector: &str) -> Option<usize> {
        selector
            .strip_prefix("[data-ai-label=\"")?
            .strip_suffix("\"]")?
            .parse()
            .ok()
    }

    fn mark_page_result(&self) -> serde_json::Value {
        let state = self.state.lock().unwrap();
        let coordinates: Vec<serde_json::Value> = state
            .elements
            .iter()
            .enumerate()
            .map(|(i, el)| {
                serde_json::json!({
                    "x": 50.0 + 10.0 * i as f64,
                    "y": 100.0 + 30.0 * i as f64,
                    "text": el.text,
                    "type": el.kind,
                    "ariaLabel": "",
                    "isCaptcha": el.is_captcha,
                    "selector": format!("[data-ai-label=\"{}\"]", i),
                    "frameContext": "main",
                    "viewportPosition": "in-viewport",
                    "distanceFromViewport": 0.0,
                    "boundingBox": {
                        "left": 40.0,
                        "top": 90.0 + 30.0 * i as f64,
                        "width": 120.0,
                        "height": 24.0
                    }
                })
            })
            .collect();
        let indices: Vec<usize> = (0..coordinates.len()).collect();
        serde_json::json!({
            "coordinates": coordinates,
            "viewportCategories": { "in-viewport": indices },
            "frameStats": { "totalFrames": 0, "accessibleFrames": 0, "maxDepth": 0 }
        })
    }

    fn apply_effect(&self, effect: ClickEffect) {
        match effect {
            ClickEffect::Nothing => {}
            ClickEffect::Navigate(url) => self.load(&url),
            ClickEffect::MutateContent(content) => {
                self.state.lock().unwrap().content = content;
            }
            ClickEffect::OpenTab(url) => {
                let context = self.context.lock().unwrap().clone();
                if let Some(context) = context {
                    let page = context.add_page();
                    page.load(&url);
                }
            }
        }
    }
}

#[async_trait]
impl PageDriver for MockPage {
    fn id(&self) -> &str {
        &self.id
    }

    async fn url(&self) -> Result<String> {
        Ok(self.state.lock().unwrap().url.clone())
    }

    async fn title(&self) -> Result<String> {
        Ok(self.state.lock().unwrap().title.clone())
    }

    async fn goto(&self, url: &str) -> Result<()> {
        self.load(url);
        Ok(())
    }

    async fn go_back(&self) -> Result<()> {
        let previous = {
            let mut state = self.state.lock().unwrap();
            state.history.pop()
        };
        match previous {
            Some(url) => {
                let site = self.sites.resolve(&url);
                let mut state = self.state.lock().unwrap();
                state.url = url;
                state.title = site.title;
                state.content = site.content;
                state.elements = site.elements;
                Ok(())
            }
            None => Err(SwarmError::browser("no previous history entry")),
        }
    }

    async fn go_forward(&self) -> Result<()> {
        Err(SwarmError::browser("no next history entry"))
    }

    async fn reload(&self) -> Result<()> {
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.state.lock().unwrap().closed = true;
        let context = self.context.lock().unwrap().clone();
        if let Some(context) = context {
            context.remove_page(&self.id);
        }
        Ok(())
    }

    async fn content(&self) -> Result<String> {
        Ok(self.state.lock().unwrap().content.clone())
    }

    async fn screenshot(&self) -> Result<Vec<u8>> {
        Ok(vec![0x89, 0x50, 0x4e, 0x47])
    }

    async fn bring_to_front(&self) -> Result<()> {
        Ok(())
    }

    async fn wait_for_load(&self, _state: LoadState, _timeout: Duration) -> Result<()> {
        Ok(())
    }

    async fn wait_for_selector(
        &self,
        selector: &str,
        state: ElementState,
        _timeout: Duration,
    ) -> Result<()> {
        let exists = Self::element_index(selector)
            .map(|i| i < self.state.lock().unwrap().elements.len())
            .unwrap_or(false);
        match (state, exists) {
            (ElementState::Attached, true) | (ElementState::Detached, false) => Ok(()),
            _ => Err(SwarmError::browser("wait timed out")),
        }
    }

    async fn evaluate(&self, script: &str) -> Result<serde_json::Value> {
        if script.trim_end_matches(';') == "markPage()" {
            return Ok(self.mark_page_result());
        }
        Ok(serde_json::Value::Null)
    }

    async fn add_init_script(&self, _script: &str) -> Result<()> {
        Ok(())
    }

    async fn click(&self, selector: &str, _timeout: Duration) -> Result<()> {
        let index = Self::element_index(selector)
            .ok_or_else(|| SwarmError::browser("bad selector"))?;
        let effect = {
            let state = self.state.lock().unwrap();
            state
                .elements
                .get(index)
                .map(|el| el.on_click.clone())
                .ok_or_else(|| SwarmError::browser("element not found"))?
        };
        self.apply_effect(effect);
        Ok(())
    }

    async fn fill(&self, selector: &str, text: &str, _timeout: Duration) -> Result<()> {
        let index = Self::element_index(selector)
            .ok_or_else(|| SwarmError::browser("bad selector"))?;
        let mut state = self.state.lock().unwrap();
        if index >= state.elements.len() {
            return Err(SwarmError::browser("element not found"));
        }
        state.content = format!("{}<!-- typed: {} -->", state.content, text);
        Ok(())
    }

    async fn select_option(
        &self,
        selector: &str,
        values: &[String],
        _timeout: Duration,
    ) -> Result<()> {
        let index = Self::element_index(selector)
            .ok_or_else(|| SwarmError::browser("bad selector"))?;
        let mut state = self.state.lock().unwrap();
        if index >= state.elements.len() {
            return Err(SwarmError::browser("element not found"));
        }
        state.content = format!("{}<!-- selected: {:?} -->", state.content, values);
        Ok(())
    }

    async fn hover(&self, _selector: &str, _timeout: Duration) -> Result<()> {
        Ok(())
    }

    async fn drag_and_drop(&self, _source: &str, _target: &str) -> Result<()> {
        Ok(())
    }

    async fn press_key(&self, _key: &str) -> Result<()> {
        Ok(())
    }

    async fn type_char(&self, _ch: char) -> Result<()> {
        Ok(())
    }

    async fn mouse_move(&self, _x: f64, _y: f64) -> Result<()> {
        Ok(())
    }

    async fn mouse_click(&self, _x: f64, _y: f64) -> Result<()> {
        Ok(())
    }

    async fn scroll_by(&self, _x: f64, _y: f64, _delta_y: f64) -> Result<()> {
        Ok(())
    }
}

pub struct MockContext {
    pub id: usize,
    sites: SiteMap,
    this: Mutex<std::sync::Weak<MockContext>>,
    browser: Mutex<Option<Arc<MockBrowser>>>,
    pages: Mutex<Vec<Arc<MockPage>>>,
    next_page: AtomicUsize,
    pub closed: Mutex<bool>,
}

impl MockContext {
    fn new(id: usize, sites: SiteMap) -> Arc<Self> {
        let context = Arc::new(Self {
            id,
            sites,
            this: Mutex::new(std::sync::Weak::new()),
            browser: Mutex::new(None),
            pages: Mutex::new(Vec::new()),
            next_page: AtomicUsize::new(0),
            closed: Mutex::new(false),
        });
        *context.this.lock().unwrap() = Arc::downgrade(&context);
        context
    }

    pub fn add_page(self: &Arc<Self>) -> Arc<MockPage> {
        let n = self.next_page.fetch_add(1, Ordering::SeqCst);
        let page = MockPage::new(format!("ctx{}-page{}", self.id, n), self.sites.clone());
        *page.context.lock().unwrap() = Some(Arc::clone(self));
        self.pages.lock().unwrap().push(Arc::clone(&page));
        page
    }

    fn remove_page(&self, id: &str) {
        self.pages.lock().unwrap().retain(|p| p.id != id);
    }

    pub fn is_closed(&self) -> bool {
        *self.closed.lock().unwrap()
    }

    /// Sever the back-pointer so `browser()` returns None
    pub fn detach_browser(&self) {
        *self.browser.lock().unwrap() = None;
    }
}

#[async_trait]
impl ContextDriver for MockContext {
    async fn pages(&self) -> Result<Vec<Arc<dyn PageDriver>>> {
        Ok(self
            .pages
            .lock()
            .unwrap()
            .iter()
            .map(|p| Arc::clone(p) as Arc<dyn PageDriver>)
            .collect())
    }

    async fn new_page(&self) -> Result<Arc<dyn PageDriver>> {
        let this = self
            .this
            .lock()
            .unwrap()
            .upgrade()
            .ok_or_else(|| SwarmError::browser("mock context dropped"))?;
        Ok(this.add_page() as Arc<dyn PageDriver>)
    }

    fn browser(&self) -> Option<Arc<dyn BrowserDriver>> {
        self.browser
            .lock()
            .unwrap()
            .clone()
            .map(|b| b as Arc<dyn BrowserDriver>)
    }

    async fn fetch(&self, url: &str) -> Result<Vec<u8>> {
        Ok(self.sites.resolve(url).content.into_bytes())
    }

    async fn close(&self) -> Result<()> {
        *self.closed.lock().unwrap() = true;
        Ok(())
    }
}

#[derive(Default)]
pub struct MockBrowser {
    sites: SiteMap,
    this: Mutex<std::sync::Weak<MockBrowser>>,
    contexts: Mutex<Vec<Arc<MockContext>>>,
    next_context: AtomicUsize,
}

impl MockBrowser {
    pub fn new(sites: SiteMap) -> Arc<Self> {
        let browser = Arc::new(Self {
            sites,
            this: Mutex::new(std::sync::Weak::new()),
            contexts: Mutex::new(Vec::new()),
            next_context: AtomicUsize::new(0),
        });
        *browser.this.lock().unwrap() = Arc::downgrade(&browser);
        browser
    }

    /// Create a context and hand back the concrete type for assertions
    pub fn make_context(self: &Arc<Self>) -> Arc<MockContext> {
        let id = self.next_context.fetch_add(1, Ordering::SeqCst);
        let context = MockContext::new(id, self.sites.clone());
        *context.browser.lock().unwrap() = Some(Arc::clone(self));
        self.contexts.lock().unwrap().push(Arc::clone(&context));
        context
    }

    pub fn contexts(&self) -> Vec<Arc<MockContext>> {
        self.contexts.lock().unwrap().clone()
    }
}

#[async_trait]
impl BrowserDriver for MockBrowser {
    async fn new_context(&self) -> Result<Arc<dyn ContextDriver>> {
        let this = self
            .this
            .lock()
            .unwrap()
            .upgrade()
            .ok_or_else(|| SwarmError::browser("mock browser dropped"))?;
        Ok(this.make_context() as Arc<dyn ContextDriver>)
    }
}

// =========================================================
// Chat providers
// =========================================================

/// Fixed sequence of responses, then a plain final answer
pub struct ScriptedProvider {
    responses: Mutex<Vec<ChatResponse>>,
    pub requests: Mutex<Vec<Vec<Message>>>,
}

impl ScriptedProvider {
    pub fn new(responses: Vec<ChatResponse>) -> Arc<Self> {
        Arc::new(Self {
            responses: Mutex::new(responses),
            requests: Mutex::new(Vec::new()),
        })
    }
}

/// Convenience: an assistant reply with tool calls
pub fn calls(tool_calls: Vec<ToolCall>) -> ChatResponse {
    ChatResponse {
        content: String::new(),
        tool_calls,
        usage: None,
        model: "scripted".into(),
    }
}

/// Convenience: a final text answer
pub fn answer(content: &str) -> ChatResponse {
    ChatResponse {
        content: content.into(),
        tool_calls: Vec::new(),
        usage: None,
        model: "scripted".into(),
    }
}

/// Convenience: a tool call with arguments
pub fn call(id: &str, name: &str, args: serde_json::Value) -> ToolCall {
    ToolCall::new(id, name, args)
}

#[async_trait]
impl ChatProvider for ScriptedProvider {
    async fn chat(
        &self,
        _model: &str,
        messages: &[Message],
        _tools: &[ToolDefinition],
        _options: Option<GenerateOptions>,
    ) -> Result<ChatResponse> {
        self.requests.lock().unwrap().push(messages.to_vec());
        let mut responses = self.responses.lock().unwrap();
        if responses.is_empty() {
            Ok(answer("done"))
        } else {
            Ok(responses.remove(0))
        }
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

/// Closure-driven provider for concurrent scenarios: the closure sees the
/// full message batch and decides the reply.
pub struct FnProvider<F>(pub F)
where
    F: Fn(&[Message]) -> ChatResponse + Send + Sync;

#[async_trait]
impl<F> ChatProvider for FnProvider<F>
where
    F: Fn(&[Message]) -> ChatResponse + Send + Sync,
{
    async fn chat(
        &self,
        _model: &str,
        messages: &[Message],
        _tools: &[ToolDefinition],
        _options: Option<GenerateOptions>,
    ) -> Result<ChatResponse> {
        Ok((self.0)(messages))
    }

    fn name(&self) -> &str {
        "fn-provider"
    }
}

/// Concatenated text of every message in a batch
pub fn batch_text(messages: &[Message]) -> String {
    messages
        .iter()
        .map(|m| m.text())
        .collect::<Vec<_>>()
        .join("\n")
}
