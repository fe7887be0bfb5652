// Anthropic provider (spec §4.4). Messages API shape: system prompt is a
// top-level field rather than a message, tool results are user-role
// messages carrying a `tool_result` content block, and the tool-call
// id lives on the content block rather than a sibling field.

use super::{AiProvider, ChatRequest, ChatResponse, ProviderSettings};
use crate::atoms::error::{CoreError, CoreResult};
use crate::atoms::types::{ProviderKind, Role, ToolCallRequest};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use std::time::Duration;

const ANTHROPIC_VERSION: &str = "2023-06-01";

pub struct AnthropicProvider {
    client: Client,
    base_url: String,
    api_key: String,
}

impl AnthropicProvider {
    pub fn new(settings: &ProviderSettings) -> Self {
        let base_url = settings.base_url.clone().unwrap_or_else(|| "https://api.anthropic.com/v1".to_string());
        AnthropicProvider {
            client: Client::builder()
                .connect_timeout(Duration::from_secs(10))
                .timeout(Duration::from_secs(120))
                .build()
                .unwrap_or_default(),
            base_url,
            api_key: settings.api_key.clone(),
        }
    }

    /// Returns (system_prompt, formatted_messages). Anthropic requires the
    /// system message out-of-band and tool results adjacent to their call.
    fn format_messages(messages: &[crate::atoms::types::Turn]) -> (Option<String>, Vec<Value>) {
        let mut system = None;
        let mut formatted = Vec::new();

        for turn in messages {
            match turn.role {
                Role::System => {
                    system = Some(match &system {
                        Some(existing) => format!("{existing}\n\n{}", turn.content),
                        None => turn.content.clone(),
                    });
                }
                Role::Tool => {
                    if let Some(id) = &turn.tool_call_id {
                        formatted.push(json!({
                            "role": "user",
                            "content": [{ "type": "tool_result", "tool_use_id": id, "content": turn.content }],
                        }));
                    }
                }
                Role::Assistant if !turn.tool_calls.is_empty() => {
                    let mut blocks = Vec::new();
                    if !turn.content.is_empty() {
                        blocks.push(json!({ "type": "text", "text": turn.content }));
                    }
                    for call in &turn.tool_calls {
                        blocks.push(json!({
                            "type": "tool_use",
                            "id": call.id,
                            "name": call.name,
                            "input": call.arguments,
                        }));
                    }
                    formatted.push(json!({ "role": "assistant", "content": blocks }));
                }
                Role::Assistant => {
                    formatted.push(json!({ "role": "assistant", "content": turn.content }));
                }
                Role::User => {
                    formatted.push(json!({ "role": "user", "content": turn.content }));
                }
            }
        }

        (system, formatted)
    }

    fn format_tools(schemas: &[Value]) -> Vec<Value> {
        schemas
            .iter()
            .map(|s| {
                json!({
                    "name": s["name"],
                    "description": s["description"],
                    "input_schema": s["parameters"],
                })
            })
            .collect()
    }
}

#[async_trait]
impl AiProvider for AnthropicProvider {
    async fn chat(&self, request: &ChatRequest<'_>) -> CoreResult<ChatResponse> {
        let (system, messages) = Self::format_messages(request.messages);
        let mut body = json!({
            "model": request.model,
            "max_tokens": 4096,
            "messages": messages,
        });
        if let Some(sys) = system {
            body["system"] = json!(sys);
        }
        if !request.tool_schemas.is_empty() {
            body["tools"] = json!(Self::format_tools(request.tool_schemas));
        }
        if let Some(t) = request.temperature {
            body["temperature"] = json!(t);
        }

        let resp = self
            .client
            .post(format!("{}/messages", self.base_url))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&body)
            .send()
            .await
            .map_err(|e| CoreError::provider("anthropic", e.to_string()))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(CoreError::provider("anthropic", format!("{status}: {text}")));
        }

        let payload: Value = resp.json().await.map_err(|e| CoreError::provider("anthropic", e.to_string()))?;
        parse_response(&payload)
    }

    fn kind(&self) -> ProviderKind {
        ProviderKind::Anthropic
    }
}

fn parse_response(payload: &Value) -> CoreResult<ChatResponse> {
    let blocks = payload["content"]
        .as_array()
        .ok_or_else(|| CoreError::provider("anthropic", "missing content blocks"))?;

    let mut content = String::new();
    let mut tool_calls = Vec::new();
    for block in blocks {
        match block["type"].as_str() {
            Some("text") => content.push_str(block["text"].as_str().unwrap_or_default()),
            Some("tool_use") => {
                if let (Some(id), Some(name)) = (block["id"].as_str(), block["name"].as_str()) {
                    tool_calls.push(ToolCallRequest {
                        id: id.to_string(),
                        name: name.to_string(),
                        arguments: block["input"].clone(),
                    });
                }
            }
            _ => {}
        }
    }

    let finish_reason = payload["stop_reason"].as_str().unwrap_or("end_turn").to_string();
    let in_tokens = payload["usage"]["input_tokens"].as_i64().unwrap_or(0);
    let out_tokens = payload["usage"]["output_tokens"].as_i64().unwrap_or(0);

    Ok(ChatResponse { content, tool_calls, finish_reason, in_tokens, out_tokens })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_text_response() {
        let payload = json!({
            "content": [{ "type": "text", "text": "hi" }],
            "stop_reason": "end_turn",
            "usage": { "input_tokens": 4, "output_tokens": 1 },
        });
        let resp = parse_response(&payload).unwrap();
        assert_eq!(resp.content, "hi");
        assert_eq!(resp.finish_reason, "end_turn");
    }

    #[test]
    fn parses_tool_use_block() {
        let payload = json!({
            "content": [
                { "type": "text", "text": "let me check" },
                { "type": "tool_use", "id": "call_1", "name": "read_file", "input": { "path": "a.txt" } },
            ],
            "stop_reason": "tool_use",
            "usage": { "input_tokens": 4, "output_tokens": 1 },
        });
        let resp = parse_response(&payload).unwrap();
        assert_eq!(resp.content, "let me check");
        assert_eq!(resp.tool_calls.len(), 1);
        assert_eq!(resp.tool_calls[0].name, "read_file");
    }
}
