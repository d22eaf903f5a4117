//! Observation builder
//!
//! Derives a structured snapshot of the active page: viewport screenshot,
//! indexed interactive elements from the injected instrumentation script,
//! cleaned markdown, and the tab list. Observations are built on demand,
//! consumed within the turn, and never cached.
//!
//! The builder never returns an error to the loop. Every failure mode
//! degrades into an observation with empty elements and a markdown field
//! explaining what happened, so the loop can always continue with a
//! grounded (possibly empty) view.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Deserializer, Serialize};
use tracing::{debug, warn};

use crate::core::Result;
use crate::tools::browser::driver::{ContextDriver, LoadState, PageDriver};

/// DOM instrumentation script, consumed as a black box. Exposes
/// `markPage()` -> { coordinates, viewportCategories, frameStats } and
/// `unmarkPage()`.
pub const MARK_PAGE_JS: &str = include_str!("mark_page.js");

const MARK_RETRIES: usize = 10;
const MARK_RETRY_DELAY: Duration = Duration::from_millis(500);
const NETWORK_IDLE_TIMEOUT: Duration = Duration::from_secs(3);
const LOAD_TIMEOUT: Duration = Duration::from_secs(5);
const PDF_TOKEN_LIMIT: usize = 5000;

/// Position of an element relative to the viewport
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ViewportPosition {
    #[serde(rename = "in-viewport")]
    InViewport,
    #[serde(rename = "above-viewport")]
    Above,
    #[serde(rename = "below-viewport")]
    Below,
    #[serde(rename = "left-of-viewport")]
    Left,
    #[serde(rename = "right-of-viewport")]
    Right,
}

impl Default for ViewportPosition {
    fn default() -> Self {
        Self::InViewport
    }
}

impl ViewportPosition {
    /// Human-readable section label for prompt rendering
    pub fn label(&self) -> &'static str {
        match self {
            Self::InViewport => "CURRENT VIEWPORT",
            Self::Above => "ABOVE VIEWPORT",
            Self::Below => "BELOW VIEWPORT",
            Self::Left => "LEFT OF VIEWPORT",
            Self::Right => "RIGHT OF VIEWPORT",
        }
    }

    pub fn all() -> [ViewportPosition; 5] {
        [
            Self::InViewport,
            Self::Above,
            Self::Below,
            Self::Left,
            Self::Right,
        ]
    }
}

/// Element position and size in page coordinates
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BoundingBox {
    #[serde(default, alias = "left")]
    pub x: f64,
    #[serde(default, alias = "top")]
    pub y: f64,
    #[serde(default)]
    pub width: f64,
    #[serde(default)]
    pub height: f64,
}

/// DOM-tree placement of an element
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Hierarchy {
    #[serde(default)]
    pub depth: usize,
    #[serde(default)]
    pub sibling_index: usize,
    #[serde(default)]
    pub total_siblings: usize,
    #[serde(default)]
    pub children_count: usize,
    #[serde(default)]
    pub interactive_children_count: usize,
    #[serde(default)]
    pub semantic_role: String,
}

/// Frame nesting statistics for the annotated page
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FrameStats {
    #[serde(default)]
    pub total_frames: usize,
    #[serde(default)]
    pub accessible_frames: usize,
    #[serde(default)]
    pub max_depth: usize,
}

/// One interactive element, indexed within a single observation.
///
/// Both `index` and `selector` are only guaranteed to resolve until the
/// next navigation, scroll, or re-annotation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageElement {
    /// Observation-local index, assigned in instrumentation order
    #[serde(default)]
    pub index: usize,
    /// Element kind (button, link, input, select, ...)
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub aria_label: String,
    /// CSS selector valid for the lifetime of this observation
    #[serde(default)]
    pub selector: String,
    #[serde(default)]
    pub bounding_box: BoundingBox,
    #[serde(default)]
    pub viewport_position: ViewportPosition,
    /// "main" or a frame path like "main>frame[0]"
    #[serde(default = "default_frame_context")]
    pub frame_context: String,
    #[serde(default, deserialize_with = "flexible_bool")]
    pub is_captcha: bool,
    #[serde(default)]
    pub hierarchy: Option<Hierarchy>,
}

fn default_frame_context() -> String {
    "main".to_string()
}

/// The instrumentation script reports `isCaptcha` as a bool, a string, or
/// an empty value depending on the page; coerce them all.
fn flexible_bool<'de, D>(deserializer: D) -> std::result::Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(match value {
        serde_json::Value::Bool(b) => b,
        serde_json::Value::String(s) => matches!(s.to_lowercase().as_str(), "true" | "1" | "yes"),
        serde_json::Value::Number(n) => n.as_i64().map(|v| v != 0).unwrap_or(false),
        _ => false,
    })
}

/// One browser tab
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tab {
    pub index: usize,
    pub title: String,
    pub url: String,
    pub is_active: bool,
}

/// Derived snapshot of the active page at a point in time
#[derive(Debug, Clone, Default)]
pub struct Observation {
    /// Viewport screenshot (PNG bytes), empty when capture failed
    pub screenshot: Vec<u8>,
    /// Interactive elements, indexed in instrumentation order
    pub elements: Vec<PageElement>,
    /// Cleaned textual rendering of the page, or a failure explanation
    pub markdown: String,
    /// Open tabs; exactly one is active
    pub tabs: Vec<Tab>,
    /// Element counts by viewport position
    pub viewport_counts: HashMap<ViewportPosition, usize>,
    /// Frame nesting statistics
    pub frame_stats: FrameStats,
    /// Whether this observation came from the PDF extraction path
    pub is_pdf: bool,
}

impl Observation {
    /// Degraded observation carrying only an explanation
    pub fn degraded(reason: impl Into<String>, tabs: Vec<Tab>) -> Self {
        Self {
            markdown: reason.into(),
            tabs,
            ..Default::default()
        }
    }

    /// Look up an element by observation-local index
    pub fn element(&self, index: usize) -> Option<&PageElement> {
        self.elements.get(index)
    }
}

/// Raw result of `markPage()`
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MarkPageResult {
    #[serde(default)]
    coordinates: Vec<PageElement>,
    #[serde(default)]
    viewport_categories: HashMap<String, serde_json::Value>,
    #[serde(default)]
    frame_stats: FrameStats,
}

/// Build an observation of the context's active page.
///
/// Pure with respect to the page: no navigation, no clicks. Never fails;
/// see the module docs for the degradation contract.
pub async fn observe(context: &Arc<dyn ContextDriver>, active_index: usize) -> Observation {
    let (page, tabs) = match active_page_and_tabs(context, active_index).await {
        Ok(pair) => pair,
        Err(e) => {
            warn!("could not enumerate pages: {}", e);
            return Observation::degraded(format!("Failed to read browser state: {}", e), Vec::new());
        }
    };

    // PDF pages get the text-extraction path; everything else is annotated.
    if let Ok(content) = page.content().await {
        if looks_like_pdf(&content) {
            return observe_pdf(context, &page, tabs).await;
        }
    }

    observe_html(&page, tabs).await
}

/// Enumerate tabs and pick the active page
async fn active_page_and_tabs(
    context: &Arc<dyn ContextDriver>,
    active_index: usize,
) -> Result<(Arc<dyn PageDriver>, Vec<Tab>)> {
    let pages = context.pages().await?;
    let mut tabs = Vec::with_capacity(pages.len());
    for (i, page) in pages.iter().enumerate() {
        let title = page.title().await.unwrap_or_default();
        let url = page.url().await.unwrap_or_default();
        tabs.push(Tab {
            index: i,
            title,
            url,
            is_active: i == active_index,
        });
    }
    let page = pages
        .get(active_index)
        .cloned()
        .ok_or_else(|| crate::core::SwarmError::browser("active tab index out of range"))?;
    Ok((page, tabs))
}

/// Served-content markers used to detect an embedded PDF viewer
fn looks_like_pdf(content: &str) -> bool {
    content.contains(r#"type="application/pdf""#) || content.contains(r#"class="pdf"#)
}

/// PDF path: fetch the raw bytes through the context's HTTP facility,
/// extract text, truncate, and keep a screenshot for visual context.
async fn observe_pdf(
    context: &Arc<dyn ContextDriver>,
    page: &Arc<dyn PageDriver>,
    tabs: Vec<Tab>,
) -> Observation {
    let url = match page.url().await {
        Ok(url) => url,
        Err(e) => return Observation::degraded(format!("Failed to read PDF URL: {}", e), tabs),
    };

    let markdown = match context.fetch(&url).await {
        Ok(bytes) => match pdf_extract::extract_text_from_mem(&bytes) {
            Ok(text) => truncate_tokens(&text, PDF_TOKEN_LIMIT),
            Err(e) => format!("Failed to extract text from PDF at {}. Error: {}", url, e),
        },
        Err(e) => format!("Failed to fetch PDF bytes from {}. Error: {}", url, e),
    };

    let screenshot = page.screenshot().await.unwrap_or_default();

    Observation {
        screenshot,
        elements: Vec::new(),
        markdown,
        tabs,
        viewport_counts: HashMap::new(),
        frame_stats: FrameStats::default(),
        is_pdf: true,
    }
}

/// HTML path: settle, instrument, screenshot.
async fn observe_html(page: &Arc<dyn PageDriver>, tabs: Vec<Tab>) -> Observation {
    // Give late redirects and client-side rendering a moment to land.
    tokio::time::sleep(Duration::from_secs(1)).await;

    if page
        .wait_for_load(LoadState::NetworkIdle, NETWORK_IDLE_TIMEOUT)
        .await
        .is_err()
    {
        debug!("networkidle not reached, falling back to load state");
        if let Err(e) = page.wait_for_load(LoadState::Load, LOAD_TIMEOUT).await {
            return Observation::degraded(format!("Failed to stabilize page load. Error: {}", e), tabs);
        }
    }

    let mark = match run_mark_page(page).await {
        Ok(mark) => mark,
        Err(e) => {
            return Observation::degraded(format!("Failed to annotate page. Error: {}", e), tabs)
        }
    };

    let mut elements = mark.coordinates;
    for (i, element) in elements.iter_mut().enumerate() {
        element.index = i;
    }

    let viewport_counts = mark
        .viewport_categories
        .iter()
        .filter_map(|(key, value)| {
            let position = serde_json::from_value::<ViewportPosition>(serde_json::Value::String(
                key.clone(),
            ))
            .ok()?;
            let count = match value {
                serde_json::Value::Array(items) => items.len(),
                serde_json::Value::Number(n) => n.as_u64().unwrap_or(0) as usize,
                _ => 0,
            };
            Some((position, count))
        })
        .collect();

    let markdown = match page.content().await {
        Ok(html) => html_to_markdown(&html),
        Err(_) => String::new(),
    };

    let screenshot = page.screenshot().await.unwrap_or_default();

    // Overlays are only needed while the screenshot is taken.
    let _ = page.evaluate("unmarkPage()").await;

    Observation {
        screenshot,
        elements,
        markdown,
        tabs,
        viewport_counts,
        frame_stats: mark.frame_stats,
        is_pdf: false,
    }
}

/// Inject the instrumentation script and invoke `markPage()`, retrying on
/// transient failures (overlays racing layout, frames mid-navigation).
async fn run_mark_page(page: &Arc<dyn PageDriver>) -> Result<MarkPageResult> {
    page.evaluate(MARK_PAGE_JS).await?;

    let mut last_err = None;
    for attempt in 0..MARK_RETRIES {
        match page.evaluate("markPage()").await {
            Ok(value) => {
                return Ok(serde_json::from_value(value)?);
            }
            Err(e) => {
                debug!("markPage attempt {} failed: {}", attempt + 1, e);
                last_err = Some(e);
                tokio::time::sleep(MARK_RETRY_DELAY).await;
            }
        }
    }

    Err(last_err.unwrap_or_else(|| crate::core::SwarmError::browser("markPage never succeeded")))
}

/// Convert visible HTML to markdown, dropping non-content tags
pub fn html_to_markdown(html: &str) -> String {
    if html.is_empty() {
        return String::new();
    }
    htmd::HtmlToMarkdown::builder()
        .skip_tags(vec!["script", "style", "head", "meta", "link", "noscript", "svg"])
        .build()
        .convert(html)
        .unwrap_or_default()
}

/// Keep the first `limit` whitespace-separated tokens
pub fn truncate_tokens(text: &str, limit: usize) -> String {
    text.split_whitespace()
        .take(limit)
        .collect::<Vec<_>>()
        .join(" ")
}
