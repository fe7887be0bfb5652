// OpenAI-compatible provider (spec §4.4). Handles OpenAI itself and any
// OpenAI-wire-compatible endpoint reached through a custom base_url
// (OpenRouter, Ollama, local inference servers).

use super::{AiProvider, ChatRequest, ChatResponse, ProviderSettings};
use crate::atoms::error::{CoreError, CoreResult};
use crate::atoms::types::{ProviderKind, Role, ToolCallRequest};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use std::time::Duration;

pub struct OpenAiProvider {
    client: Client,
    base_url: String,
    api_key: String,
}

impl OpenAiProvider {
    pub fn new(settings: &ProviderSettings) -> Self {
        let base_url = settings
            .base_url
            .clone()
            .unwrap_or_else(|| "https://api.openai.com/v1".to_string());
        OpenAiProvider {
            client: Client::builder()
                .connect_timeout(Duration::from_secs(10))
                .timeout(Duration::from_secs(120))
                .build()
                .unwrap_or_default(),
            base_url,
            api_key: settings.api_key.clone(),
        }
    }

    fn format_messages(messages: &[crate::atoms::types::Turn]) -> Vec<Value> {
        messages
            .iter()
            .map(|turn| {
                let role = match turn.role {
                    Role::System => "system",
                    Role::User => "user",
                    Role::Assistant => "assistant",
                    Role::Tool => "tool",
                };
                let mut m = json!({ "role": role });
                if turn.role == Role::Assistant && !turn.tool_calls.is_empty() {
                    m["content"] = Value::Null;
                    m["tool_calls"] = json!(turn
                        .tool_calls
                        .iter()
                        .map(|c| json!({
                            "id": c.id,
                            "type": "function",
                            "function": { "name": c.name, "arguments": c.arguments.to_string() },
                        }))
                        .collect::<Vec<_>>());
                } else {
                    m["content"] = json!(turn.content);
                }
                if let Some(id) = &turn.tool_call_id {
                    m["tool_call_id"] = json!(id);
                }
                m
            })
            .collect()
    }
}

#[async_trait]
impl AiProvider for OpenAiProvider {
    async fn chat(&self, request: &ChatRequest<'_>) -> CoreResult<ChatResponse> {
        let mut body = json!({
            "model": request.model,
            "messages": Self::format_messages(request.messages),
        });
        if !request.tool_schemas.is_empty() {
            body["tools"] = json!(request.tool_schemas);
        }
        if let Some(t) = request.temperature {
            body["temperature"] = json!(t);
        }

        let resp = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| CoreError::provider("openai", e.to_string()))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(CoreError::provider("openai", format!("{status}: {text}")));
        }

        let payload: Value = resp.json().await.map_err(|e| CoreError::provider("openai", e.to_string()))?;
        parse_response(&payload)
    }

    fn kind(&self) -> ProviderKind {
        ProviderKind::OpenAi
    }
}

fn parse_response(payload: &Value) -> CoreResult<ChatResponse> {
    let choice = payload["choices"].get(0).ok_or_else(|| CoreError::provider("openai", "no choices in response"))?;
    let message = &choice["message"];
    let content = message["content"].as_str().unwrap_or_default().to_string();
    let finish_reason = choice["finish_reason"].as_str().unwrap_or("stop").to_string();

    let tool_calls = message["tool_calls"]
        .as_array()
        .map(|arr| {
            arr.iter()
                .filter_map(|tc| {
                    let id = tc["id"].as_str()?.to_string();
                    let name = tc["function"]["name"].as_str()?.to_string();
                    let args_str = tc["function"]["arguments"].as_str().unwrap_or("{}");
                    let arguments = serde_json::from_str(args_str).unwrap_or(json!({}));
                    Some(ToolCallRequest { id, name, arguments })
                })
                .collect()
        })
        .unwrap_or_default();

    let in_tokens = payload["usage"]["prompt_tokens"].as_i64().unwrap_or(0);
    let out_tokens = payload["usage"]["completion_tokens"].as_i64().unwrap_or(0);

    Ok(ChatResponse { content, tool_calls, finish_reason, in_tokens, out_tokens })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_text_only_response() {
        let payload = json!({
            "choices": [{ "message": { "content": "hello there" }, "finish_reason": "stop" }],
            "usage": { "prompt_tokens": 10, "completion_tokens": 3 },
        });
        let resp = parse_response(&payload).unwrap();
        assert_eq!(resp.content, "hello there");
        assert_eq!(resp.finish_reason, "stop");
        assert!(resp.tool_calls.is_empty());
        assert_eq!(resp.in_tokens, 10);
    }

    #[test]
    fn parses_tool_call_response() {
        let payload = json!({
            "choices": [{
                "message": {
                    "content": null,
                    "tool_calls": [{
                        "id": "call_1",
                        "function": { "name": "read_file", "arguments": "{\"path\":\"a.txt\"}" }
                    }]
                },
                "finish_reason": "tool_calls"
            }],
            "usage": { "prompt_tokens": 5, "completion_tokens": 2 },
        });
        let resp = parse_response(&payload).unwrap();
        assert_eq!(resp.tool_calls.len(), 1);
        assert_eq!(resp.tool_calls[0].name, "read_file");
    }

    #[test]
    fn missing_choices_is_a_provider_error() {
        let payload = json!({"choices": []});
        assert!(parse_response(&payload).is_err());
    }
}
