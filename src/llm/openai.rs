//! Chat-completions client
//!
//! Async HTTP client for an OpenAI-compatible endpoint with tool calling
//! and multi-part (text + image) message content.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::core::{
    Config, Content, ContentPart, Message, Result, SwarmError, ToolCall, ToolDefinition,
};
use crate::llm::traits::{ChatProvider, ChatResponse, GenerateOptions, TokenUsage};

/// Client for an OpenAI-compatible chat-completions API
#[derive(Clone)]
pub struct OpenAiClient {
    client: Client,
    base_url: String,
    api_key: Option<String>,
}

/// Chat request body
#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<WireMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<&'a [ToolDefinition]>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
}

/// Message in the provider's wire format
#[derive(Debug, Serialize, Deserialize)]
struct WireMessage {
    role: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<WireToolCall>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
}

/// Tool call in the provider's wire format
#[derive(Debug, Clone, Serialize, Deserialize)]
struct WireToolCall {
    id: String,
    #[serde(rename = "type")]
    call_type: String,
    function: WireFunction,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct WireFunction {
    name: String,
    /// Arguments arrive JSON-encoded as a string
    arguments: String,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    model: String,
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<WireUsage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<WireToolCall>>,
}

#[derive(Debug, Deserialize)]
struct WireUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
    total_tokens: u32,
}

impl OpenAiClient {
    /// Create a client from configuration
    pub fn from_config(config: &Config) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.llm.timeout_secs))
            .build()
            .expect("Failed to create HTTP client");

        Self {
            client,
            base_url: config.llm.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key(),
        }
    }

    /// Create a client with a custom base URL
    pub fn with_base_url(base_url: impl Into<String>, api_key: Option<String>) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(120))
            .build()
            .expect("Failed to create HTTP client");

        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
        }
    }

    /// Convert internal content to the wire representation
    fn to_wire_content(content: &Content) -> serde_json::Value {
        match content {
            Content::Text(text) => serde_json::Value::String(text.clone()),
            Content::Parts(parts) => serde_json::Value::Array(
                parts
                    .iter()
                    .map(|part| match part {
                        ContentPart::Text { text } => serde_json::json!({
                            "type": "text",
                            "text": text,
                        }),
                        ContentPart::Image { media_type, data } => serde_json::json!({
                            "type": "image_url",
                            "image_url": {
                                "url": format!("data:{};base64,{}", media_type, data),
                            },
                        }),
                    })
                    .collect(),
            ),
        }
    }

    /// Convert an internal message to the wire representation
    fn to_wire_message(msg: &Message) -> WireMessage {
        match msg {
            Message::System { content } => WireMessage {
                role: "system".to_string(),
                content: Some(Self::to_wire_content(content)),
                tool_calls: None,
                tool_call_id: None,
            },
            Message::User { content } => WireMessage {
                role: "user".to_string(),
                content: Some(Self::to_wire_content(content)),
                tool_calls: None,
                tool_call_id: None,
            },
            Message::Assistant {
                content,
                tool_calls,
            } => WireMessage {
                role: "assistant".to_string(),
                content: if content.is_empty() {
                    None
                } else {
                    Some(serde_json::Value::String(content.clone()))
                },
                tool_calls: if tool_calls.is_empty() {
                    None
                } else {
                    Some(
                        tool_calls
                            .iter()
                            .map(|tc| WireToolCall {
                                id: tc.id.clone(),
                                call_type: "function".to_string(),
                                function: WireFunction {
                                    name: tc.name.clone(),
                                    arguments: tc.arguments.to_string(),
                                },
                            })
                            .collect(),
                    )
                },
                tool_call_id: None,
            },
            Message::ToolResult {
                call_id, content, ..
            } => WireMessage {
                role: "tool".to_string(),
                content: Some(serde_json::Value::String(content.clone())),
                tool_calls: None,
                tool_call_id: Some(call_id.clone()),
            },
        }
    }

    /// Convert a wire tool call back, parsing the argument string
    fn from_wire_tool_call(tc: WireToolCall) -> ToolCall {
        let arguments = serde_json::from_str(&tc.function.arguments)
            .unwrap_or(serde_json::Value::Object(Default::default()));
        ToolCall {
            id: tc.id,
            name: tc.function.name,
            arguments,
        }
    }
}

#[async_trait]
impl ChatProvider for OpenAiClient {
    async fn chat(
        &self,
        model: &str,
        messages: &[Message],
        tools: &[ToolDefinition],
        options: Option<GenerateOptions>,
    ) -> Result<ChatResponse> {
        let options = options.unwrap_or_default();
        let request = ChatRequest {
            model,
            messages: messages.iter().map(Self::to_wire_message).collect(),
            tools: if tools.is_empty() { None } else { Some(tools) },
            temperature: options.temperature,
            max_tokens: options.max_tokens,
        };

        let url = format!("{}/chat/completions", self.base_url);
        let mut req = self.client.post(&url).json(&request);
        if let Some(ref key) = self.api_key {
            req = req.bearer_auth(key);
        }

        let response = req.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SwarmError::llm(format!(
                "chat completion failed with {}: {}",
                status, body
            )));
        }

        let completion: ChatCompletionResponse = response.json().await?;
        let choice = completion
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| SwarmError::llm("chat completion returned no choices"))?;

        Ok(ChatResponse {
            content: choice.message.content.unwrap_or_default(),
            tool_calls: choice
                .message
                .tool_calls
                .unwrap_or_default()
                .into_iter()
                .map(Self::from_wire_tool_call)
                .collect(),
            usage: completion.usage.map(|u| TokenUsage {
                prompt_tokens: u.prompt_tokens,
                completion_tokens: u.completion_tokens,
                total_tokens: u.total_tokens,
            }),
            model: completion.model,
        })
    }

    fn name(&self) -> &str {
        "openai-compatible"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_message_for_tool_result() {
        let msg = Message::tool_result("call_9", "click", "Successfully clicked element 3.");
        let wire = OpenAiClient::to_wire_message(&msg);
        assert_eq!(wire.role, "tool");
        assert_eq!(wire.tool_call_id.as_deref(), Some("call_9"));
    }

    #[test]
    fn test_wire_content_with_image_part() {
        let content = Content::Parts(vec![
            ContentPart::Image {
                media_type: "image/png".into(),
                data: "QUJD".into(),
            },
            ContentPart::Text {
                text: "tab list".into(),
            },
        ]);
        let wire = OpenAiClient::to_wire_content(&content);
        let parts = wire.as_array().unwrap();
        assert_eq!(parts[0]["type"], "image_url");
        assert!(parts[0]["image_url"]["url"]
            .as_str()
            .unwrap()
            .starts_with("data:image/png;base64,"));
    }

    #[test]
    fn test_from_wire_tool_call_parses_arguments() {
        let tc = WireToolCall {
            id: "call_1".into(),
            call_type: "function".into(),
            function: WireFunction {
                name: "goto".into(),
                arguments: r#"{"url": "example.com"}"#.into(),
            },
        };
        let call = OpenAiClient::from_wire_tool_call(tc);
        assert_eq!(call.get_string("url").as_deref(), Some("example.com"));
    }

    #[test]
    fn test_from_wire_tool_call_tolerates_bad_arguments() {
        let tc = WireToolCall {
            id: "call_2".into(),
            call_type: "function".into(),
            function: WireFunction {
                name: "refresh".into(),
                arguments: "not json".into(),
            },
        };
        let call = OpenAiClient::from_wire_tool_call(tc);
        assert!(call.arguments.is_object());
    }
}
