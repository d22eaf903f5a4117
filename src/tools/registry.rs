//! Tool registry - schemas and dispatch for the grounded action vocabulary
//!
//! The registry is static: every tool the LLM can call is declared here
//! with a JSON-schema parameter block, and `execute_browser_tool` routes a
//! call to the session by name. The two swarm tools (`delegate`,
//! `post_groupchat`) are declared here but dispatched by the orchestrator,
//! which owns the clone fan-out and the chat bus.

use crate::core::{ToolCall, ToolDefinition};
use crate::tools::browser::BrowserSession;

/// Name of the delegation tool
pub const TOOL_DELEGATE: &str = "delegate";
/// Name of the group-chat post tool
pub const TOOL_POST_GROUPCHAT: &str = "post_groupchat";

/// Definitions for every browser action
pub fn browser_tool_definitions() -> Vec<ToolDefinition> {
    vec![
        ToolDefinition::function(
            "click",
            "Click an interactive element identified by its index from the current observation.",
            serde_json::json!({
                "type": "object",
                "properties": {
                    "element_index": {
                        "type": "integer",
                        "description": "Index of the element to click, from the latest observation"
                    }
                },
                "required": ["element_index"]
            }),
        ),
        ToolDefinition::function(
            "type_text",
            "Type text into an input element: focuses it, clears it, types, and presses Enter.",
            serde_json::json!({
                "type": "object",
                "properties": {
                    "element_index": {
                        "type": "integer",
                        "description": "Index of the input element"
                    },
                    "text": {
                        "type": "string",
                        "description": "The text to type"
                    }
                },
                "required": ["element_index", "text"]
            }),
        ),
        ToolDefinition::function(
            "select_option",
            "Select one or more options in a native select element.",
            serde_json::json!({
                "type": "object",
                "properties": {
                    "element_index": {
                        "type": "integer",
                        "description": "Index of the select element"
                    },
                    "values": {
                        "type": "array",
                        "items": {"type": "string"},
                        "description": "Option values or labels to select"
                    }
                },
                "required": ["element_index", "values"]
            }),
        ),
        ToolDefinition::function(
            "scroll",
            "Scroll the page or a specific element up or down to reveal more content.",
            serde_json::json!({
                "type": "object",
                "properties": {
                    "target": {
                        "type": "string",
                        "description": "\"page\" to scroll the whole page, or an element index number"
                    },
                    "direction": {
                        "type": "string",
                        "enum": ["up", "down"]
                    }
                },
                "required": ["target", "direction"]
            }),
        ),
        ToolDefinition::function(
            "hover",
            "Hover the mouse over an element to reveal menus or tooltips.",
            serde_json::json!({
                "type": "object",
                "properties": {
                    "element_index": {
                        "type": "integer",
                        "description": "Index of the element to hover over"
                    }
                },
                "required": ["element_index"]
            }),
        ),
        ToolDefinition::function(
            "press_key",
            "Press a keyboard key globally (e.g. 'Enter', 'Escape', 'ArrowDown').",
            serde_json::json!({
                "type": "object",
                "properties": {
                    "key": {
                        "type": "string",
                        "description": "The key to press"
                    }
                },
                "required": ["key"]
            }),
        ),
        ToolDefinition::function(
            "drag",
            "Drag one element onto another.",
            serde_json::json!({
                "type": "object",
                "properties": {
                    "start_index": {
                        "type": "integer",
                        "description": "Index of the element to drag"
                    },
                    "end_index": {
                        "type": "integer",
                        "description": "Index of the element to drop onto"
                    }
                },
                "required": ["start_index", "end_index"]
            }),
        ),
        ToolDefinition::function(
            "wait_for",
            "Wait for a number of seconds (max 20), or for an element to appear/disappear.",
            serde_json::json!({
                "type": "object",
                "properties": {
                    "seconds": {
                        "type": "number",
                        "description": "Time to wait in seconds, at most 20"
                    },
                    "element_index": {
                        "type": "integer",
                        "description": "Index of an element to wait for"
                    },
                    "state": {
                        "type": "string",
                        "enum": ["attached", "detached"],
                        "description": "Wait for the element to appear (attached) or disappear (detached)"
                    }
                }
            }),
        ),
        ToolDefinition::function(
            "goto",
            "Navigate the current tab to a URL (https:// is prefixed when missing).",
            serde_json::json!({
                "type": "object",
                "properties": {
                    "url": {
                        "type": "string",
                        "description": "The URL to navigate to"
                    }
                },
                "required": ["url"]
            }),
        ),
        ToolDefinition::function(
            "go_back",
            "Navigate back in the current tab's history.",
            serde_json::json!({"type": "object", "properties": {}}),
        ),
        ToolDefinition::function(
            "go_forward",
            "Navigate forward in the current tab's history.",
            serde_json::json!({"type": "object", "properties": {}}),
        ),
        ToolDefinition::function(
            "refresh",
            "Reload the current page.",
            serde_json::json!({"type": "object", "properties": {}}),
        ),
        ToolDefinition::function(
            "open_new_tab",
            "Open a new browser tab, optionally navigating to a URL.",
            serde_json::json!({
                "type": "object",
                "properties": {
                    "url": {
                        "type": "string",
                        "description": "Optional URL to open in the new tab"
                    }
                }
            }),
        ),
        ToolDefinition::function(
            "close_tab",
            "Close a tab by index, or the current tab when no index is given.",
            serde_json::json!({
                "type": "object",
                "properties": {
                    "tab_index": {
                        "type": "integer",
                        "description": "Index of the tab to close"
                    }
                }
            }),
        ),
        ToolDefinition::function(
            "switch_tab",
            "Switch to a tab by its index from list_tabs.",
            serde_json::json!({
                "type": "object",
                "properties": {
                    "tab_index": {
                        "type": "integer",
                        "description": "Index of the tab to activate"
                    }
                },
                "required": ["tab_index"]
            }),
        ),
        ToolDefinition::function(
            "list_tabs",
            "List all open tabs with their indices, titles, and URLs.",
            serde_json::json!({"type": "object", "properties": {}}),
        ),
        ToolDefinition::function(
            "extract_page_content",
            "Read the entire page: returns URL, title, and a cleaned markdown rendering of the content.",
            serde_json::json!({"type": "object", "properties": {}}),
        ),
        ToolDefinition::function(
            "take_note",
            "Record a note for later reference during this session.",
            serde_json::json!({
                "type": "object",
                "properties": {
                    "note": {
                        "type": "string",
                        "description": "The note to record"
                    }
                },
                "required": ["note"]
            }),
        ),
    ]
}

/// Definitions for the delegation and chat tools
pub fn swarm_tool_definitions() -> Vec<ToolDefinition> {
    vec![
        ToolDefinition::function(
            TOOL_DELEGATE,
            "Spawn clone agents in parallel, one per subtask, each in a fresh isolated \
             browser context. Returns a JSON array of {task, status, result|error}.",
            serde_json::json!({
                "type": "object",
                "properties": {
                    "tasks": {
                        "type": "array",
                        "items": {"type": "string"},
                        "description": "Subtasks to execute; one clone is spawned per task"
                    }
                },
                "required": ["tasks"]
            }),
        ),
        ToolDefinition::function(
            TOOL_POST_GROUPCHAT,
            "Post a short message to the shared agent group chat for coordination.",
            serde_json::json!({
                "type": "object",
                "properties": {
                    "message": {
                        "type": "string",
                        "description": "The message to broadcast to other agents"
                    }
                },
                "required": ["message"]
            }),
        ),
    ]
}

/// Whether a tool name belongs to the browser vocabulary
pub fn is_browser_tool(name: &str) -> bool {
    matches!(
        name,
        "click"
            | "type_text"
            | "select_option"
            | "scroll"
            | "hover"
            | "press_key"
            | "drag"
            | "wait_for"
            | "goto"
            | "go_back"
            | "go_forward"
            | "refresh"
            | "open_new_tab"
            | "close_tab"
            | "switch_tab"
            | "list_tabs"
            | "extract_page_content"
            | "take_note"
    )
}

/// Execute a browser tool call against the session.
///
/// Every failure mode, including driver errors, comes back as a string the
/// LLM can read; this function never fails.
pub async fn execute_browser_tool(session: &mut BrowserSession, call: &ToolCall) -> String {
    let result = match call.name.as_str() {
        "click" => match call.get_i64("element_index") {
            Some(index) => session.click(index).await,
            None => Ok("Error: 'element_index' argument is required".to_string()),
        },
        "type_text" => match (call.get_i64("element_index"), call.get_string("text")) {
            (Some(index), Some(text)) => session.type_text(index, &text).await,
            _ => Ok("Error: 'element_index' and 'text' arguments are required".to_string()),
        },
        "select_option" => match (call.get_i64("element_index"), call.get_string_array("values")) {
            (Some(index), Some(values)) => session.select_option(index, values).await,
            _ => Ok("Error: 'element_index' and 'values' arguments are required".to_string()),
        },
        "scroll" => match (call.get_string("target"), call.get_string("direction")) {
            (Some(target), Some(direction)) => session.scroll(&target, &direction).await,
            _ => Ok("Error: 'target' and 'direction' arguments are required".to_string()),
        },
        "hover" => match call.get_i64("element_index") {
            Some(index) => session.hover(index).await,
            None => Ok("Error: 'element_index' argument is required".to_string()),
        },
        "press_key" => match call.get_string("key") {
            Some(key) => session.press_key(&key).await,
            None => Ok("Error: 'key' argument is required".to_string()),
        },
        "drag" => match (call.get_i64("start_index"), call.get_i64("end_index")) {
            (Some(start), Some(end)) => session.drag(start, end).await,
            _ => Ok("Error: 'start_index' and 'end_index' arguments are required".to_string()),
        },
        "wait_for" => {
            let state = call.get_string("state").unwrap_or_else(|| "attached".to_string());
            session
                .wait_for(call.get_f64("seconds"), call.get_i64("element_index"), &state)
                .await
        }
        "goto" => match call.get_string("url") {
            Some(url) => session.goto(&url).await,
            None => Ok("Error: 'url' argument is required".to_string()),
        },
        "go_back" => session.go_back().await,
        "go_forward" => session.go_forward().await,
        "refresh" => session.refresh().await,
        "open_new_tab" => session.open_new_tab(call.get_string("url").as_deref()).await,
        "close_tab" => session.close_tab(call.get_i64("tab_index")).await,
        "switch_tab" => match call.get_i64("tab_index") {
            Some(index) => session.switch_tab(index).await,
            None => Ok("Error: 'tab_index' argument is required".to_string()),
        },
        "list_tabs" => session.list_tabs().await,
        "extract_page_content" => session.extract_page_content().await,
        "take_note" => match call.get_string("note") {
            Some(note) => Ok(session.take_note(&note)),
            None => Ok("Error: 'note' argument is required".to_string()),
        },
        other => Ok(format!("Error: Unknown tool '{}'", other)),
    };

    result.unwrap_or_else(|e| format!("Error executing {}: {}", call.name, e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_browser_tool_names_are_registered() {
        let defs = browser_tool_definitions();
        for def in &defs {
            assert!(
                is_browser_tool(&def.function.name),
                "{} missing from dispatch",
                def.function.name
            );
        }
        assert_eq!(defs.len(), 18);
    }

    #[test]
    fn test_swarm_tools_are_not_browser_tools() {
        assert!(!is_browser_tool(TOOL_DELEGATE));
        assert!(!is_browser_tool(TOOL_POST_GROUPCHAT));
    }

    #[test]
    fn test_definitions_serialize_with_schema() {
        let defs = swarm_tool_definitions();
        let json = serde_json::to_value(&defs).unwrap();
        assert_eq!(json[0]["function"]["name"], TOOL_DELEGATE);
        assert_eq!(json[0]["type"], "function");
        assert!(json[0]["function"]["parameters"]["properties"]["tasks"].is_object());
    }
}
