// Provider trait + type-erased factory (spec §4.4). Adding a provider is
// implementing this trait and adding one arm to `AnyProvider::from_config`
// — the router never needs to change.

pub mod anthropic;
pub mod google;
pub mod openai;

pub use anthropic::AnthropicProvider;
pub use google::GoogleProvider;
pub use openai::OpenAiProvider;

use crate::atoms::error::CoreResult;
use crate::atoms::types::{ProviderKind, Turn};
use async_trait::async_trait;

#[derive(Debug, Clone)]
pub struct ChatRequest<'a> {
    pub messages: &'a [Turn],
    pub tool_schemas: &'a [serde_json::Value],
    pub model: &'a str,
    pub temperature: Option<f64>,
}

#[derive(Debug, Clone)]
pub struct ChatResponse {
    pub content: String,
    pub tool_calls: Vec<crate::atoms::types::ToolCallRequest>,
    pub finish_reason: String,
    pub in_tokens: i64,
    pub out_tokens: i64,
}

#[async_trait]
pub trait AiProvider: Send + Sync {
    async fn chat(&self, request: &ChatRequest<'_>) -> CoreResult<ChatResponse>;
    fn kind(&self) -> ProviderKind;
}

pub struct ProviderSettings {
    pub kind: ProviderKind,
    pub base_url: Option<String>,
    pub api_key: String,
}

/// Type-erased provider. Callers hold `AnyProvider` and call `.chat()`
/// without knowing which concrete backend is in use.
pub struct AnyProvider(Box<dyn AiProvider>);

impl AnyProvider {
    pub fn from_settings(settings: &ProviderSettings) -> Self {
        let provider: Box<dyn AiProvider> = match settings.kind {
            ProviderKind::Anthropic => Box::new(AnthropicProvider::new(settings)),
            ProviderKind::Google => Box::new(GoogleProvider::new(settings)),
            ProviderKind::OpenAi | ProviderKind::LocalOnly => Box::new(OpenAiProvider::new(settings)),
        };
        AnyProvider(provider)
    }

    pub async fn chat(&self, request: &ChatRequest<'_>) -> CoreResult<ChatResponse> {
        self.0.chat(request).await
    }

    pub fn kind(&self) -> ProviderKind {
        self.0.kind()
    }
}
