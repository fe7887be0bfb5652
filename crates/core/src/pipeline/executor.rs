// Execution pipeline (spec §4.2): plan -> execute -> reflect. A turn is at
// most `max_rounds` iterations of calling the LLM router, dispatching zero
// or more tool calls through the permission gate, and appending sanitized
// results back into history until the model returns a terminal message with
// no tool calls, at which point a cheap reflection call writes a memory row.

use super::permission::{decide, PermissionCheckInput, PermissionDecision};
use crate::atoms::error::{CoreError, CoreResult};
use crate::atoms::types::{ApprovalStatus, AuthorityTier, Role, ToolCallRequest, Turn, TurnContext};
use crate::config::Config;
use crate::llm::{RouteRequest, Router};
use crate::store::Store;
use crate::tools::contract::ToolContext;
use crate::tools::registry::ToolRegistry;
use crate::tools::sanitize::sanitize_tool_output;
use async_trait::async_trait;
use std::path::Path;

/// Bound to the session that originated the current turn (spec §4.1
/// "per-call callback"). The goal runner and mind override this with a
/// broadcast-to-all-qualifying-clients variant (spec §4.3 step 4).
#[async_trait]
pub trait ApprovalCallback: Send + Sync {
    async fn request_approval(
        &self,
        tool_name: &str,
        params: &serde_json::Value,
        context: &str,
    ) -> CoreResult<ApprovalStatus>;
}

/// Resolves approvals through the store: persist a pending row, poll until
/// resolved/expired. Real gateway wiring replaces the polling with an
/// in-memory resolver woken by the session's approval_response frame; this
/// is the fallback used by callers (tests, headless goal runs) with no
/// connected client to interrupt.
pub struct StorePollingApproval<'a> {
    pub store: &'a Store,
    pub session_id: &'a str,
    pub timeout_secs: u64,
    pub poll_interval_ms: u64,
}

#[async_trait]
impl<'a> ApprovalCallback for StorePollingApproval<'a> {
    async fn request_approval(
        &self,
        tool_name: &str,
        params: &serde_json::Value,
        context: &str,
    ) -> CoreResult<ApprovalStatus> {
        let req = self.store.create_approval(tool_name, params, context, self.session_id, self.timeout_secs)?;
        loop {
            if let Some(current) = self.store.get_approval(&req.id)? {
                if current.status != ApprovalStatus::Pending {
                    return Ok(current.status);
                }
                if current.timeout_at <= chrono::Utc::now() {
                    self.store.resolve_approval(&req.id, ApprovalStatus::Expired)?;
                    return Ok(ApprovalStatus::Expired);
                }
            } else {
                return Ok(ApprovalStatus::Cancelled);
            }
            tokio::time::sleep(std::time::Duration::from_millis(self.poll_interval_ms)).await;
        }
    }
}

pub struct TurnOutcome {
    pub final_content: String,
    pub rounds_used: usize,
    pub safety_terminated: bool,
}

/// One plan -> execute -> reflect turn over `conversation`, mutating it in
/// place. `tool_schemas` is the JSON-schema view of tools visible at `tier`.
pub struct Executor<'a> {
    pub cfg: &'a Config,
    pub store: &'a Store,
    pub router: &'a Router<'a>,
    pub registry: &'a ToolRegistry,
    pub workspace_dir: &'a Path,
}

impl<'a> Executor<'a> {
    pub async fn run_turn(
        &self,
        task_id: Option<&str>,
        session_id: &str,
        tier: AuthorityTier,
        turn_context: TurnContext,
        conversation: &mut Vec<Turn>,
        approvals: &dyn ApprovalCallback,
    ) -> CoreResult<TurnOutcome> {
        let visible = self.registry.visible_to(tier);
        let schemas: Vec<serde_json::Value> =
            visible.iter().map(|t| serde_json::json!({"name": t.name, "description": t.description, "parameters": t.input_schema})).collect();

        let mut rounds = 0usize;
        while rounds < self.cfg.max_rounds {
            rounds += 1;
            let request = RouteRequest {
                task_type: task_type_for(turn_context),
                messages: conversation,
                tool_schemas: &schemas,
                explicit_model: None,
                writer_architecture: None,
            };
            let response = self.router.route(task_id, request).await?;

            if response.tool_calls.is_empty() {
                conversation.push(assistant_turn(response.content.clone(), vec![]));
                let reflect_id = task_id.unwrap_or(session_id);
                if let Err(e) = self.reflect(reflect_id, conversation).await {
                    log::warn!("reflection failed for {reflect_id}: {e}");
                }
                return Ok(TurnOutcome { final_content: response.content, rounds_used: rounds, safety_terminated: false });
            }

            conversation.push(assistant_turn(response.content, response.tool_calls.clone()));

            for call in &response.tool_calls {
                match self.dispatch_call(session_id, tier, call, approvals).await {
                    Ok(result) => {
                        let sanitized = sanitize_tool_output(&result, tier);
                        conversation.push(tool_result_turn(call.id.clone(), sanitized));
                    }
                    Err(DispatchOutcome::Fatal(message)) => {
                        conversation.push(tool_result_turn(call.id.clone(), format!("[safety] {message}")));
                        return Ok(TurnOutcome { final_content: message, rounds_used: rounds, safety_terminated: true });
                    }
                    Err(DispatchOutcome::Recoverable(message)) => {
                        conversation.push(tool_result_turn(call.id.clone(), format!("[error] {message}")));
                    }
                }
            }
        }

        Ok(TurnOutcome {
            final_content: "round limit reached".to_string(),
            rounds_used: rounds,
            safety_terminated: false,
        })
    }

    /// Reflection: a lightweight separate LLM call that writes a memory row
    /// (spec §4.2 "Reflection is a lightweight separate LLM call").
    pub async fn reflect(&self, task_id: &str, conversation: &[Turn]) -> CoreResult<String> {
        let request = RouteRequest {
            task_type: crate::atoms::types::TaskType::Simple,
            messages: conversation,
            tool_schemas: &[],
            explicit_model: None,
            writer_architecture: None,
        };
        let response = self.router.route(Some(task_id), request).await?;
        self.store.record_memory(task_id, &response.content, "completed", None)?;
        Ok(response.content)
    }

    async fn dispatch_call(
        &self,
        session_id: &str,
        tier: AuthorityTier,
        call: &ToolCallRequest,
        approvals: &dyn ApprovalCallback,
    ) -> Result<String, DispatchOutcome> {
        let contract = self
            .registry
            .get(&call.name)
            .ok_or_else(|| DispatchOutcome::Recoverable(format!("unknown tool: {}", call.name)))?;

        crate::policy::authority::check_execution(tier, contract.authority_tier_required, contract.name)
            .map_err(|e| DispatchOutcome::Recoverable(e.to_string()))?;

        // Rule 1 (protected-file) only applies to tools that can mutate state;
        // a read-only tool carrying a `path` argument shouldn't trip it.
        let target_path = if contract.is_writer {
            call.arguments.get("path").and_then(|v| v.as_str()).map(std::path::PathBuf::from)
        } else {
            None
        };
        let shell_command = call.arguments.get("command").and_then(|v| v.as_str());

        let decision = decide(
            &self.cfg.permission,
            &PermissionCheckInput {
                tool_name: contract.name,
                permission_level: contract.permission_level,
                target_path: target_path.as_deref(),
                shell_command,
                protected_prefixes: &self.cfg.protected_paths,
            },
        );

        match decision {
            PermissionDecision::RejectFatal(reason) => Err(DispatchOutcome::Fatal(reason)),
            PermissionDecision::RequireApproval => {
                let context = format!("{}: {}", contract.name, contract.redact_args(&call.arguments));
                let status = approvals
                    .request_approval(contract.name, &call.arguments, &context)
                    .await
                    .map_err(|e| DispatchOutcome::Recoverable(e.to_string()))?;
                match status {
                    ApprovalStatus::Approved => self.execute(session_id, tier, contract, call).await,
                    _ => Err(DispatchOutcome::Recoverable(format!("approval {status:?}"))),
                }
            }
            PermissionDecision::Allow => self.execute(session_id, tier, contract, call).await,
        }
    }

    async fn execute(
        &self,
        session_id: &str,
        tier: AuthorityTier,
        contract: &crate::tools::contract::ToolContract,
        call: &ToolCallRequest,
    ) -> Result<String, DispatchOutcome> {
        let ctx = ToolContext { session_id, authority_tier: tier, workspace_dir: self.workspace_dir };
        contract
            .handler
            .call(&ctx, &call.arguments)
            .await
            .map_err(|e| DispatchOutcome::Recoverable(e.to_string()))
    }
}

enum DispatchOutcome {
    Recoverable(String),
    Fatal(String),
}

fn task_type_for(ctx: TurnContext) -> crate::atoms::types::TaskType {
    use crate::atoms::types::TaskType;
    match ctx {
        TurnContext::UserChat => TaskType::Simple,
        TurnContext::GoalExecution => TaskType::Planning,
        TurnContext::MindWakeup => TaskType::Analysis,
    }
}

fn assistant_turn(content: String, tool_calls: Vec<ToolCallRequest>) -> Turn {
    Turn { role: Role::Assistant, content, tool_calls, tool_call_id: None, attachments: vec![], created_at: chrono::Utc::now() }
}

fn tool_result_turn(tool_call_id: String, content: String) -> Turn {
    Turn {
        role: Role::Tool,
        content,
        tool_calls: vec![],
        tool_call_id: Some(tool_call_id),
        attachments: vec![],
        created_at: chrono::Utc::now(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn task_type_maps_each_turn_context() {
        use crate::atoms::types::TaskType;
        assert!(matches!(task_type_for(TurnContext::UserChat), TaskType::Simple));
        assert!(matches!(task_type_for(TurnContext::GoalExecution), TaskType::Planning));
        assert!(matches!(task_type_for(TurnContext::MindWakeup), TaskType::Analysis));
    }

    #[test]
    fn assistant_turn_carries_tool_calls() {
        let call = ToolCallRequest { id: "c1".into(), name: "read_file".into(), arguments: serde_json::json!({}) };
        let turn = assistant_turn("thinking".into(), vec![call]);
        assert_eq!(turn.role, Role::Assistant);
        assert_eq!(turn.tool_calls.len(), 1);
    }

    #[test]
    fn tool_result_turn_carries_call_id() {
        let turn = tool_result_turn("c1".into(), "result".into());
        assert_eq!(turn.tool_call_id, Some("c1".into()));
        assert_eq!(turn.role, Role::Tool);
    }
}
