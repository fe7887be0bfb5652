// Tool contract (spec §4.2, §4.6). Every tool the agent can call is a
// struct of function pointers plus metadata used for permission decisions:
// its required authority tier, its permission level (used by the pipeline
// to pick an approval mode), and which of its parameters must never appear
// unredacted in a log line or the system prompt.

use crate::atoms::error::CoreResult;
use crate::atoms::types::{AuthorityTier, PermissionLevel};
use async_trait::async_trait;
use serde_json::Value;

/// Context handed to every tool invocation. Carries only what a tool needs
/// to act — no direct access to the store, vault, or LLM router, so a tool
/// cannot reach outside the surface this struct exposes.
pub struct ToolContext<'a> {
    pub session_id: &'a str,
    pub authority_tier: AuthorityTier,
    pub workspace_dir: &'a std::path::Path,
}

#[async_trait]
pub trait ToolHandler: Send + Sync {
    async fn call(&self, ctx: &ToolContext<'_>, args: &Value) -> CoreResult<String>;
}

/// A tool implemented as a plain async function pointer, for the common
/// case where a tool has no state beyond its closure captures.
pub struct FnToolHandler<F>(pub F);

#[async_trait]
impl<F, Fut> ToolHandler for FnToolHandler<F>
where
    F: Fn(ToolContext<'_>, Value) -> Fut + Send + Sync,
    Fut: std::future::Future<Output = CoreResult<String>> + Send,
{
    async fn call(&self, ctx: &ToolContext<'_>, args: &Value) -> CoreResult<String> {
        let owned_ctx = ToolContext {
            session_id: ctx.session_id,
            authority_tier: ctx.authority_tier,
            workspace_dir: ctx.workspace_dir,
        };
        (self.0)(owned_ctx, args.clone()).await
    }
}

pub struct ToolContract {
    pub name: &'static str,
    pub description: &'static str,
    pub input_schema: Value,
    pub permission_level: PermissionLevel,
    pub authority_tier_required: AuthorityTier,
    /// Argument keys whose values must be redacted before the call or its
    /// result is logged or summarized into a conversation turn.
    pub sensitive_params: &'static [&'static str],
    /// Whether this tool can mutate state outside the conversation (spec
    /// §4.2 Rule 1 applies only to writer tools, not read-only ones).
    pub is_writer: bool,
    pub handler: Box<dyn ToolHandler>,
}

impl ToolContract {
    pub fn redact_args(&self, args: &Value) -> Value {
        let mut redacted = args.clone();
        if let Some(obj) = redacted.as_object_mut() {
            for key in self.sensitive_params {
                if obj.contains_key(*key) {
                    obj.insert((*key).to_string(), Value::String("[REDACTED]".to_string()));
                }
            }
        }
        redacted
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::atoms::types::{AuthorityTier, PermissionLevel};

    struct EchoHandler;

    #[async_trait]
    impl ToolHandler for EchoHandler {
        async fn call(&self, _ctx: &ToolContext<'_>, args: &Value) -> CoreResult<String> {
            Ok(args.to_string())
        }
    }

    fn echo_contract() -> ToolContract {
        ToolContract {
            name: "echo",
            description: "echoes its input",
            input_schema: serde_json::json!({"type": "object"}),
            permission_level: PermissionLevel::Safe,
            authority_tier_required: AuthorityTier::Public,
            sensitive_params: &["secret"],
            is_writer: false,
            handler: Box::new(EchoHandler),
        }
    }

    #[test]
    fn redact_args_masks_only_sensitive_keys() {
        let contract = echo_contract();
        let args = serde_json::json!({"secret": "sk-abc", "note": "hello"});
        let redacted = contract.redact_args(&args);
        assert_eq!(redacted["secret"], "[REDACTED]");
        assert_eq!(redacted["note"], "hello");
    }

    #[tokio::test]
    async fn handler_invokes_through_contract() {
        let contract = echo_contract();
        let dir = std::path::PathBuf::from(".");
        let ctx = ToolContext { session_id: "s1", authority_tier: AuthorityTier::Owner, workspace_dir: &dir };
        let result = contract.handler.call(&ctx, &serde_json::json!({"x": 1})).await.unwrap();
        assert_eq!(result, serde_json::json!({"x": 1}).to_string());
    }
}
