// Google Gemini provider (spec §4.4). `contents` array of turns made of
// `parts`, with `functionCall`/`functionResponse` parts replacing OpenAI's
// separate tool_calls array, a top-level `systemInstruction`, and the API
// key passed as a query parameter rather than a header.

use super::{AiProvider, ChatRequest, ChatResponse, ProviderSettings};
use crate::atoms::error::{CoreError, CoreResult};
use crate::atoms::types::{ProviderKind, Role, ToolCallRequest};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use std::time::Duration;

pub struct GoogleProvider {
    client: Client,
    base_url: String,
    api_key: String,
}

impl GoogleProvider {
    pub fn new(settings: &ProviderSettings) -> Self {
        let base_url = settings
            .base_url
            .clone()
            .unwrap_or_else(|| "https://generativelanguage.googleapis.com/v1beta".to_string());
        GoogleProvider {
            client: Client::builder()
                .connect_timeout(Duration::from_secs(10))
                .timeout(Duration::from_secs(120))
                .build()
                .unwrap_or_default(),
            base_url,
            api_key: settings.api_key.clone(),
        }
    }

    fn format_messages(messages: &[crate::atoms::types::Turn]) -> (Option<String>, Vec<Value>) {
        let mut system = None;
        let mut contents = Vec::new();

        for turn in messages {
            match turn.role {
                Role::System => {
                    system = Some(match &system {
                        Some(existing) => format!("{existing}\n\n{}", turn.content),
                        None => turn.content.clone(),
                    });
                }
                Role::Tool => {
                    let name = turn.tool_call_id.clone().unwrap_or_default();
                    contents.push(json!({
                        "role": "function",
                        "parts": [{ "functionResponse": { "name": name, "response": { "content": turn.content } } }],
                    }));
                }
                Role::Assistant if !turn.tool_calls.is_empty() => {
                    let mut parts = Vec::new();
                    if !turn.content.is_empty() {
                        parts.push(json!({ "text": turn.content }));
                    }
                    for call in &turn.tool_calls {
                        parts.push(json!({ "functionCall": { "name": call.name, "args": call.arguments } }));
                    }
                    contents.push(json!({ "role": "model", "parts": parts }));
                }
                Role::Assistant => {
                    contents.push(json!({ "role": "model", "parts": [{ "text": turn.content }] }));
                }
                Role::User => {
                    contents.push(json!({ "role": "user", "parts": [{ "text": turn.content }] }));
                }
            }
        }

        (system, contents)
    }

    fn format_tools(schemas: &[Value]) -> Value {
        let declarations: Vec<Value> = schemas
            .iter()
            .map(|s| {
                json!({
                    "name": s["name"],
                    "description": s["description"],
                    "parameters": s["parameters"],
                })
            })
            .collect();
        json!([{ "functionDeclarations": declarations }])
    }
}

#[async_trait]
impl AiProvider for GoogleProvider {
    async fn chat(&self, request: &ChatRequest<'_>) -> CoreResult<ChatResponse> {
        let (system, contents) = Self::format_messages(request.messages);
        let mut body = json!({ "contents": contents });
        if let Some(sys) = system {
            body["systemInstruction"] = json!({ "parts": [{ "text": sys }] });
        }
        if !request.tool_schemas.is_empty() {
            body["tools"] = Self::format_tools(request.tool_schemas);
        }
        if let Some(t) = request.temperature {
            body["generationConfig"] = json!({ "temperature": t });
        }

        let url = format!("{}/models/{}:generateContent", self.base_url, request.model);
        let resp = self
            .client
            .post(&url)
            .query(&[("key", &self.api_key)])
            .json(&body)
            .send()
            .await
            .map_err(|e| CoreError::provider("google", e.to_string()))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(CoreError::provider("google", format!("{status}: {text}")));
        }

        let payload: Value = resp.json().await.map_err(|e| CoreError::provider("google", e.to_string()))?;
        parse_response(&payload)
    }

    fn kind(&self) -> ProviderKind {
        ProviderKind::Google
    }
}

fn parse_response(payload: &Value) -> CoreResult<ChatResponse> {
    let candidate = payload["candidates"]
        .get(0)
        .ok_or_else(|| CoreError::provider("google", "no candidates in response"))?;

    let parts = candidate["content"]["parts"]
        .as_array()
        .ok_or_else(|| CoreError::provider("google", "missing content parts"))?;

    let mut content = String::new();
    let mut tool_calls = Vec::new();
    for (idx, part) in parts.iter().enumerate() {
        if let Some(text) = part["text"].as_str() {
            content.push_str(text);
        }
        if let Some(call) = part.get("functionCall") {
            if let Some(name) = call["name"].as_str() {
                tool_calls.push(ToolCallRequest {
                    id: format!("call_{idx}"),
                    name: name.to_string(),
                    arguments: call["args"].clone(),
                });
            }
        }
    }

    let finish_reason = candidate["finishReason"].as_str().unwrap_or("STOP").to_string();
    let in_tokens = payload["usageMetadata"]["promptTokenCount"].as_i64().unwrap_or(0);
    let out_tokens = payload["usageMetadata"]["candidatesTokenCount"].as_i64().unwrap_or(0);

    Ok(ChatResponse { content, tool_calls, finish_reason, in_tokens, out_tokens })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_text_response() {
        let payload = json!({
            "candidates": [{ "content": { "parts": [{ "text": "hi there" }] }, "finishReason": "STOP" }],
            "usageMetadata": { "promptTokenCount": 7, "candidatesTokenCount": 2 },
        });
        let resp = parse_response(&payload).unwrap();
        assert_eq!(resp.content, "hi there");
        assert_eq!(resp.finish_reason, "STOP");
    }

    #[test]
    fn parses_function_call_part() {
        let payload = json!({
            "candidates": [{
                "content": { "parts": [{ "functionCall": { "name": "read_file", "args": { "path": "a.txt" } } }] },
                "finishReason": "STOP",
            }],
            "usageMetadata": { "promptTokenCount": 3, "candidatesTokenCount": 1 },
        });
        let resp = parse_response(&payload).unwrap();
        assert_eq!(resp.tool_calls.len(), 1);
        assert_eq!(resp.tool_calls[0].name, "read_file");
    }

    #[test]
    fn missing_candidates_is_a_provider_error() {
        let payload = json!({ "candidates": [] });
        assert!(parse_response(&payload).is_err());
    }
}
