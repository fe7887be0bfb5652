// LLM Router (spec §4.4). Given (task_type, messages, tools?, constraints),
// selects a provider and model, makes the call, and returns a response
// normalized across provider wire formats, falling back on provider error.

use super::providers::{AnyProvider, ChatRequest, ChatResponse, ProviderSettings};
use super::truncation::suspected_truncated;
use crate::atoms::error::{CoreError, CoreResult};
use crate::atoms::types::{ProviderKind, TaskType, Turn};
use crate::config::{task_type_key, LlmConfig, ProviderEntry};
use crate::policy::vault::Vault;
use crate::store::Store;
use std::time::Instant;

/// Result of a routed call, normalized across provider wire shapes.
#[derive(Debug, Clone)]
pub struct RoutedResponse {
    pub content: String,
    pub tool_calls: Vec<crate::atoms::types::ToolCallRequest>,
    pub finish_reason: String,
    pub latency_ms: i64,
    pub in_tokens: i64,
    pub out_tokens: i64,
    pub cost_usd: f64,
    pub provider: ProviderKind,
    pub model: String,
    pub fallback_from: Option<String>,
    pub suspected_truncated: bool,
}

pub struct RouteRequest<'a> {
    pub task_type: TaskType,
    pub messages: &'a [Turn],
    pub tool_schemas: &'a [serde_json::Value],
    pub explicit_model: Option<(ProviderKind, &'a str)>,
    /// Architecture family of whoever wrote the content under review, for
    /// cross-architecture preference on `review` tasks.
    pub writer_architecture: Option<&'static str>,
}

pub struct Router<'a> {
    pub cfg: &'a LlmConfig,
    pub vault: &'a Vault,
    pub store: &'a Store,
}

impl<'a> Router<'a> {
    pub fn new(cfg: &'a LlmConfig, vault: &'a Vault, store: &'a Store) -> Self {
        Router { cfg, vault, store }
    }

    fn under_budget(&self, entry: &ProviderEntry) -> bool {
        let cap = entry.daily_budget_usd.unwrap_or(self.cfg.daily_budget_usd);
        self.store.cost_today_for_provider(provider_name(entry.kind)).map(|spent| spent < cap).unwrap_or(false)
    }

    /// Ordered provider priority list, filtered to what's eligible right now
    /// (configured model for this task type, key present in the vault, under
    /// budget), with `review` tasks preferring a different architecture.
    fn eligible_chain(&self, request: &RouteRequest) -> Vec<&'a ProviderEntry> {
        let mut chain: Vec<&ProviderEntry> = self
            .cfg
            .providers
            .iter()
            .filter(|p| p.enabled)
            .filter(|p| p.model_for(request.task_type).is_some())
            .filter(|p| self.vault.get(&p.api_key_ref).is_some())
            .filter(|p| self.under_budget(p))
            .collect();

        if request.task_type == TaskType::Review {
            if let Some(writer) = request.writer_architecture {
                if let Some(pos) = chain.iter().position(|p| p.kind.architecture_family() != writer) {
                    let preferred = chain.remove(pos);
                    chain.insert(0, preferred);
                }
            }
        }
        chain
    }

    /// Routes a call, falling back to the next eligible provider on error.
    pub async fn route(&self, task_id: Option<&str>, request: RouteRequest<'_>) -> CoreResult<RoutedResponse> {
        if let Some((kind, model)) = request.explicit_model {
            let entry = self
                .cfg
                .providers
                .iter()
                .find(|p| p.kind == kind && p.enabled)
                .ok_or_else(|| CoreError::provider("router", format!("no enabled provider for {kind:?}")))?;
            return self.call_provider(task_id, entry, model, &request, None).await;
        }

        let mut remaining = self.eligible_chain(&request);
        let mut fallback_from = None;
        loop {
            if remaining.is_empty() {
                return Err(CoreError::provider("router", "all providers exhausted"));
            }
            let entry = remaining.remove(0);
            let model = match entry.model_for(request.task_type) {
                Some(m) => m.to_string(),
                None => continue,
            };
            match self.call_provider(task_id, entry, &model, &request, fallback_from.clone()).await {
                Ok(resp) => return Ok(resp),
                Err(_) => {
                    fallback_from = Some(format!("{:?}:{}", entry.kind, model));
                    continue;
                }
            }
        }
    }

    async fn call_provider(
        &self,
        task_id: Option<&str>,
        entry: &ProviderEntry,
        model: &str,
        request: &RouteRequest<'_>,
        fallback_from: Option<String>,
    ) -> CoreResult<RoutedResponse> {
        let api_key = self
            .vault
            .get(&entry.api_key_ref)
            .ok_or_else(|| CoreError::provider("router", "api key missing from vault"))?
            .to_string();
        let settings = ProviderSettings { kind: entry.kind, base_url: entry.base_url.clone(), api_key };
        let provider = AnyProvider::from_settings(&settings);

        let chat_request =
            ChatRequest { messages: request.messages, tool_schemas: request.tool_schemas, model, temperature: None };

        let start = Instant::now();
        let ChatResponse { content, tool_calls, finish_reason, in_tokens, out_tokens } =
            provider.chat(&chat_request).await?;
        let latency_ms = start.elapsed().as_millis() as i64;

        let cost_usd = estimate_cost(entry.kind, in_tokens, out_tokens);
        let truncated = suspected_truncated(&content, &finish_reason, out_tokens);

        self.store.record_llm_usage(
            task_id,
            model,
            provider_name(entry.kind),
            in_tokens,
            out_tokens,
            cost_usd,
            &finish_reason,
            latency_ms,
            fallback_from.as_deref(),
            truncated,
            task_type_key(request.task_type),
        )?;

        Ok(RoutedResponse {
            content,
            tool_calls,
            finish_reason,
            latency_ms,
            in_tokens,
            out_tokens,
            cost_usd,
            provider: entry.kind,
            model: model.to_string(),
            fallback_from,
            suspected_truncated: truncated,
        })
    }
}

fn provider_name(kind: ProviderKind) -> &'static str {
    match kind {
        ProviderKind::Anthropic => "anthropic",
        ProviderKind::OpenAi => "openai",
        ProviderKind::Google => "google",
        ProviderKind::LocalOnly => "local",
    }
}

/// Rough per-1k-token cost estimate used for budget accounting. Providers
/// don't return cost directly; this is a coarse blended rate per family,
/// good enough for the warn/hard-stop thresholds it feeds.
fn estimate_cost(kind: ProviderKind, in_tokens: i64, out_tokens: i64) -> f64 {
    let (in_rate, out_rate) = match kind {
        ProviderKind::Anthropic => (0.003, 0.015),
        ProviderKind::OpenAi => (0.0025, 0.01),
        ProviderKind::Google => (0.00125, 0.005),
        ProviderKind::LocalOnly => (0.0, 0.0),
    };
    (in_tokens as f64 / 1000.0) * in_rate + (out_tokens as f64 / 1000.0) * out_rate
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn estimate_cost_is_zero_for_local_only() {
        assert_eq!(estimate_cost(ProviderKind::LocalOnly, 1000, 1000), 0.0);
    }

    #[test]
    fn estimate_cost_scales_with_tokens() {
        let small = estimate_cost(ProviderKind::OpenAi, 100, 100);
        let large = estimate_cost(ProviderKind::OpenAi, 1000, 1000);
        assert!(large > small);
    }

    #[test]
    fn provider_name_round_trips_known_kinds() {
        assert_eq!(provider_name(ProviderKind::Anthropic), "anthropic");
        assert_eq!(provider_name(ProviderKind::Google), "google");
    }
}
