//! Prompt rendering of observations
//!
//! Turns the element index, tab list, and markdown overview into the text
//! block that accompanies the screenshot in the page-context message.

use std::collections::BTreeMap;

use crate::tools::browser::observe::{Observation, PageElement, Tab, ViewportPosition};

const MARKDOWN_OVERVIEW_CHARS: usize = 1500;
const ELEMENT_TEXT_CHARS: usize = 100;

/// Render the full page-context text block for an observation
pub fn format_page_context(observation: &Observation) -> String {
    let mut sections = Vec::new();

    if observation.tabs.len() > 1 {
        sections.push(format_tabs(&observation.tabs));
    }

    if observation.frame_stats.total_frames > 0 {
        sections.push(format!(
            "FRAMES: {} total, {} accessible, max nesting depth {}",
            observation.frame_stats.total_frames,
            observation.frame_stats.accessible_frames,
            observation.frame_stats.max_depth,
        ));
    }

    sections.push(format_elements(&observation.elements));

    if !observation.markdown.is_empty() {
        sections.push(format!(
            "PAGE CONTENT OVERVIEW:\n{}",
            truncate_chars(&observation.markdown, MARKDOWN_OVERVIEW_CHARS)
        ));
    }

    sections.join("\n\n")
}

/// Render the tab list with the active tab marked
pub fn format_tabs(tabs: &[Tab]) -> String {
    if tabs.is_empty() {
        return "Browser tabs: none".to_string();
    }

    let mut lines = vec!["Browser tabs:".to_string()];
    for tab in tabs {
        let marker = if tab.is_active { "[CURRENT] " } else { "" };
        lines.push(format!(
            "  {}Tab [index={}]: {} - {}",
            marker,
            tab.index,
            truncate_chars(&tab.title, 50),
            truncate_chars(&tab.url, 60),
        ));
    }
    lines.push("Tab indices are positional: re-run list_tabs after closing a tab.".to_string());
    lines.join("\n")
}

/// Render the element index grouped by viewport position and frame.
///
/// Elements outside the viewport are listed with index `N/A` so the model
/// scrolls before interacting with them.
pub fn format_elements(elements: &[PageElement]) -> String {
    if elements.is_empty() {
        return "No interactive elements found on this page.".to_string();
    }

    let mut sections = Vec::new();
    for position in ViewportPosition::all() {
        let group: Vec<&PageElement> = elements
            .iter()
            .filter(|el| el.viewport_position == position)
            .collect();
        if group.is_empty() {
            continue;
        }

        let mut lines = vec![format!("{} ({} elements):", position.label(), group.len())];

        // Group by frame so nested-document elements read together
        let mut frames: BTreeMap<&str, Vec<&PageElement>> = BTreeMap::new();
        for el in group {
            frames.entry(el.frame_context.as_str()).or_default().push(el);
        }

        for (frame, frame_elements) in frames {
            let frame_indent = if frame != "main" {
                lines.push(format!("  [frame {}]:", frame));
                "  "
            } else {
                ""
            };
            for el in frame_elements {
                lines.push(format!(
                    "{}{}",
                    frame_indent,
                    format_element(el, position == ViewportPosition::InViewport)
                ));
            }
        }

        sections.push(lines.join("\n"));
    }

    sections.join("\n\n")
}

fn format_element(el: &PageElement, interactable: bool) -> String {
    let mut text = el.aria_label.trim().to_string();
    if text.is_empty() {
        text = truncate_chars(&el.text, ELEMENT_TEXT_CHARS);
    }

    let index = if interactable {
        el.index.to_string()
    } else {
        "N/A".to_string()
    };

    let captcha = if el.is_captcha { " [CAPTCHA]" } else { "" };

    let indent = el
        .hierarchy
        .as_ref()
        .map(|h| "\t".repeat(h.depth.min(4)))
        .unwrap_or_default();

    let mut line = format!(
        "{}element_index: {} (<{}/>{}): \"{}\"",
        indent, index, el.kind, captcha, text
    );

    if let Some(h) = &el.hierarchy {
        if h.interactive_children_count > 0 {
            line.push_str(&format!(
                "\n{}\t- contains {} interactive children",
                indent, h.interactive_children_count
            ));
        }
    }

    line
}

/// Truncate on a char boundary, appending an ellipsis when trimmed
pub fn truncate_chars(s: &str, limit: usize) -> String {
    if s.chars().count() <= limit {
        return s.to_string();
    }
    let mut out: String = s.chars().take(limit.saturating_sub(3)).collect();
    out.push_str("...");
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::browser::observe::{BoundingBox, FrameStats, Hierarchy};

    fn element(index: usize, kind: &str, text: &str, position: ViewportPosition) -> PageElement {
        PageElement {
            index,
            kind: kind.to_string(),
            text: text.to_string(),
            aria_label: String::new(),
            selector: format!("[data-ai-label=\"{}\"]", index),
            bounding_box: BoundingBox::default(),
            viewport_position: position,
            frame_context: "main".to_string(),
            is_captcha: false,
            hierarchy: None,
        }
    }

    #[test]
    fn test_format_elements_groups_by_viewport() {
        let elements = vec![
            element(0, "button", "Search", ViewportPosition::InViewport),
            element(1, "a", "Footer link", ViewportPosition::Below),
        ];
        let block = format_elements(&elements);
        assert!(block.contains("CURRENT VIEWPORT (1 elements):"));
        assert!(block.contains("BELOW VIEWPORT (1 elements):"));
        assert!(block.contains("element_index: 0 (<button/>): \"Search\""));
        // Out-of-viewport elements are not directly interactable
        assert!(block.contains("element_index: N/A (<a/>): \"Footer link\""));
    }

    #[test]
    fn test_format_elements_marks_captcha() {
        let mut el = element(0, "iframe", "verify you are human", ViewportPosition::InViewport);
        el.is_captcha = true;
        let block = format_elements(&[el]);
        assert!(block.contains("[CAPTCHA]"));
    }

    #[test]
    fn test_format_elements_frame_grouping() {
        let mut el = element(2, "input", "search box", ViewportPosition::InViewport);
        el.frame_context = "main>frame[0]".to_string();
        let block = format_elements(&[el]);
        assert!(block.contains("[frame main>frame[0]]:"));
    }

    #[test]
    fn test_format_elements_empty() {
        assert_eq!(
            format_elements(&[]),
            "No interactive elements found on this page."
        );
    }

    #[test]
    fn test_format_tabs_marks_active() {
        let tabs = vec![
            Tab {
                index: 0,
                title: "Example Domain".into(),
                url: "https://example.com".into(),
                is_active: false,
            },
            Tab {
                index: 1,
                title: "Docs".into(),
                url: "https://a.test/docs".into(),
                is_active: true,
            },
        ];
        let block = format_tabs(&tabs);
        assert!(block.contains("[CURRENT] Tab [index=1]: Docs"));
        assert!(block.contains("Tab [index=0]: Example Domain"));
    }

    #[test]
    fn test_page_context_includes_markdown_overview() {
        let mut obs = Observation::default();
        obs.markdown = "# Example Domain\nThis domain is for use in examples.".to_string();
        obs.frame_stats = FrameStats::default();
        let block = format_page_context(&obs);
        assert!(block.contains("PAGE CONTENT OVERVIEW:"));
        assert!(block.contains("Example Domain"));
    }

    #[test]
    fn test_hierarchy_indentation_and_children() {
        let mut el = element(0, "nav", "Menu", ViewportPosition::InViewport);
        el.hierarchy = Some(Hierarchy {
            depth: 2,
            interactive_children_count: 3,
            ..Default::default()
        });
        let block = format_elements(&[el]);
        assert!(block.contains("\t\telement_index: 0"));
        assert!(block.contains("contains 3 interactive children"));
    }

    #[test]
    fn test_truncate_chars_utf8_safe() {
        let s = "héllo wörld, this is a long line";
        let t = truncate_chars(s, 10);
        assert!(t.ends_with("..."));
        assert!(t.chars().count() <= 10);
    }
}
