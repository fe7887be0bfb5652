// Goal Runner (spec §4.3). A long-lived cooperative worker driving a goal's
// checkpoints to completion, sharing the agent loop's executor with user
// turns and the autonomous mind via the exclusion token each acquires.

use crate::atoms::error::CoreResult;
use crate::atoms::types::{CheckpointStatus, GoalStatus, Role, TurnContext};
use crate::config::GoalLoopConfig;
use crate::pipeline::executor::{ApprovalCallback, Executor};
use crate::store::goals::Goal;
use crate::store::Store;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

/// Set by the gateway on every inbound user message; the runner yields at
/// the next checkpoint boundary rather than mid-call (spec §4.3 "Shared
/// primitives").
#[derive(Default)]
pub struct PauseToken(AtomicBool);

impl PauseToken {
    pub fn set(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn clear(&self) {
        self.0.store(false, Ordering::SeqCst);
    }

    pub fn is_set(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

pub enum StepOutcome {
    GoalCompleted,
    CheckpointAdvanced,
    Paused,
    BudgetExceeded,
}

pub struct GoalRunner<'a> {
    pub cfg: &'a GoalLoopConfig,
    pub store: &'a Store,
    pub executor: &'a Executor<'a>,
}

impl<'a> GoalRunner<'a> {
    /// Runs a single execution-loop iteration (spec §4.3 steps 1-9) for
    /// `goal`. The caller loops this until a terminal `StepOutcome`.
    pub async fn step(&self, goal: &Goal, pause: &PauseToken, approvals: &dyn ApprovalCallback) -> CoreResult<StepOutcome> {
        // Step 1: fetch next pending checkpoint, or finish the goal.
        let checkpoint = match self.store.next_pending_checkpoint(&goal.goal_id)? {
            Some(c) => c,
            None => {
                self.store.set_goal_status(&goal.goal_id, GoalStatus::Completed)?;
                return Ok(StepOutcome::GoalCompleted);
            }
        };

        // Step 2: safety limits.
        let elapsed_secs = chrono::Utc::now().signed_duration_since(goal.created_at).num_seconds().max(0) as u64;
        if goal.llm_calls_used as u32 >= self.cfg.max_llm_calls_per_goal
            || goal.cost_usd >= self.cfg.cost_budget_per_goal_usd
            || elapsed_secs >= self.cfg.max_total_time_per_goal_seconds
        {
            self.store.set_goal_status(&goal.goal_id, GoalStatus::Paused)?;
            return Ok(StepOutcome::BudgetExceeded);
        }

        // Step 3: build a fresh conversation seeded with goal context, not
        // the user's session history (conversation isolation, spec §4.2).
        let mut conversation = vec![goal_context_turn(goal, &checkpoint)];

        self.store.activate_checkpoint(&goal.goal_id, checkpoint.order)?;

        // Step 4: run one agent turn.
        let outcome = self
            .executor
            .run_turn(
                Some(&goal.goal_id),
                &goal.session_id,
                crate::atoms::types::AuthorityTier::Owner,
                TurnContext::GoalExecution,
                &mut conversation,
                approvals,
            )
            .await?;

        // Step 5: summarize and mark the checkpoint done, counting attempts
        // on failure (spec §4.3 "mark checkpoint completed (or failed if
        // attempts exceed max_checkpoint_attempts)").
        if outcome.safety_terminated {
            let attempts = self.store.increment_checkpoint_attempts(&goal.goal_id, checkpoint.order)?;
            if attempts >= self.cfg.max_checkpoint_attempts as i64 {
                self.store.finish_checkpoint(&goal.goal_id, checkpoint.order, CheckpointStatus::Failed, Some(&outcome.final_content))?;
            }
        } else {
            self.store.finish_checkpoint(
                &goal.goal_id,
                checkpoint.order,
                CheckpointStatus::Completed,
                Some(&outcome.final_content),
            )?;
        }

        // Step 6: every N checkpoints, evaluate_progress is invoked by the
        // caller loop (it owns the checkpoint counter across steps); this
        // step only reports the advance.
        // Step 7: context compression is likewise a caller-loop concern once
        // it has the updated goal row.
        // Step 8: yield to the pause token.
        if pause.is_set() {
            return Ok(StepOutcome::Paused);
        }

        Ok(StepOutcome::CheckpointAdvanced)
    }

    /// Step 6: `evaluate_progress`. Runs every `EVALUATE_PROGRESS_EVERY_N_CHECKPOINTS`
    /// completed checkpoints; either confirms the remaining plan or replaces it.
    pub async fn evaluate_progress(&self, goal: &Goal) -> CoreResult<()> {
        let checkpoints = self.store.list_checkpoints(&goal.goal_id)?;
        let remaining: Vec<_> = checkpoints.iter().filter(|c| c.status == CheckpointStatus::Pending).collect();
        if remaining.is_empty() {
            return Ok(());
        }
        let summary = remaining.iter().map(|c| format!("- {}: {}", c.title, c.description)).collect::<Vec<_>>().join("\n");
        let prompt = crate::atoms::types::Turn {
            role: Role::User,
            content: format!(
                "Goal: {}\nCompleted so far: {}/{}\nRemaining plan:\n{}\nReply `continue` if this plan still holds, otherwise give a revised remaining checkpoint list.",
                goal.goal, goal.current_checkpoint, goal.total_checkpoints, summary
            ),
            tool_calls: vec![],
            tool_call_id: None,
            attachments: vec![],
            created_at: chrono::Utc::now(),
        };
        let schemas = [revise_plan_schema()];
        let request = crate::llm::RouteRequest {
            task_type: crate::atoms::types::TaskType::Planning,
            messages: std::slice::from_ref(&prompt),
            tool_schemas: &schemas,
            explicit_model: None,
            writer_architecture: None,
        };
        let response = self.executor.router.route(Some(&goal.goal_id), request).await?;

        let revision = response.tool_calls.iter().find(|c| c.name == "revise_plan");
        let Some(call) = revision else {
            // No revision offered: either plain `continue` text or a model
            // that ignored the tool schema. Either way, keep the plan as is.
            return Ok(());
        };
        let checkpoints: Vec<CheckpointDraft> = serde_json::from_value(call.arguments["checkpoints"].clone())
            .map_err(|e| crate::atoms::error::CoreError::Other(format!("malformed plan revision: {e}")))?;
        if checkpoints.is_empty() {
            return Ok(());
        }
        let new_pending: Vec<(String, String, String)> = checkpoints
            .into_iter()
            .map(|c| (c.title, c.description, c.success_criteria))
            .collect();
        self.store.revise_remaining_checkpoints(&goal.goal_id, &new_pending)?;
        Ok(())
    }

    /// Sleep between checkpoints, subject to the pause token (spec §4.3 step 9).
    pub async fn pause_between_checkpoints(&self, pause: &PauseToken) {
        let deadline = Instant::now() + Duration::from_secs(self.cfg.pause_between_checkpoints_seconds);
        while Instant::now() < deadline && !pause.is_set() {
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    }
}

#[derive(serde::Deserialize)]
struct CheckpointDraft {
    title: String,
    description: String,
    success_criteria: String,
}

/// Decomposition (spec §4.3 "on goal creation, a single LLM call produces an
/// ordered list of 3-20 checkpoints"). Persists the goal and its checkpoints
/// atomically via `Store::create_goal_with_checkpoints`.
pub async fn create_goal(
    executor: &Executor<'_>,
    session_id: &str,
    goal_text: &str,
    max_attempts: i64,
    max_checkpoints: usize,
) -> CoreResult<Goal> {
    let prompt = crate::atoms::types::Turn {
        role: Role::User,
        content: format!(
            "Decompose this goal into an ordered list of {}-{max_checkpoints} checkpoints, each with a title, description, and objective success criteria:\n{goal_text}",
            crate::atoms::constants::MIN_CHECKPOINTS,
        ),
        tool_calls: vec![],
        tool_call_id: None,
        attachments: vec![],
        created_at: chrono::Utc::now(),
    };
    let schemas = [decompose_goal_schema()];
    let request = crate::llm::RouteRequest {
        task_type: crate::atoms::types::TaskType::Planning,
        messages: std::slice::from_ref(&prompt),
        tool_schemas: &schemas,
        explicit_model: None,
        writer_architecture: None,
    };
    let response = executor.router.route(None, request).await?;

    let call = response
        .tool_calls
        .iter()
        .find(|c| c.name == "decompose_goal")
        .ok_or_else(|| crate::atoms::error::CoreError::Other("model did not decompose the goal into checkpoints".into()))?;
    let checkpoints: Vec<CheckpointDraft> = serde_json::from_value(call.arguments["checkpoints"].clone())
        .map_err(|e| crate::atoms::error::CoreError::Other(format!("malformed goal decomposition: {e}")))?;
    if checkpoints.len() < crate::atoms::constants::MIN_CHECKPOINTS || checkpoints.len() > max_checkpoints {
        return Err(crate::atoms::error::CoreError::Other(format!(
            "decomposition produced {} checkpoints, expected {}-{max_checkpoints}",
            checkpoints.len(),
            crate::atoms::constants::MIN_CHECKPOINTS,
        )));
    }
    let tuples: Vec<(String, String, String)> =
        checkpoints.into_iter().map(|c| (c.title, c.description, c.success_criteria)).collect();
    executor.store.create_goal_with_checkpoints(session_id, goal_text, max_attempts, &tuples)
}

fn decompose_goal_schema() -> serde_json::Value {
    serde_json::json!({
        "name": "decompose_goal",
        "description": "Decompose a goal into an ordered list of 3-20 checkpoints, each with a title, description, and objective success criteria.",
        "parameters": {
            "type": "object",
            "properties": {
                "checkpoints": {
                    "type": "array",
                    "items": {
                        "type": "object",
                        "properties": {
                            "title": {"type": "string"},
                            "description": {"type": "string"},
                            "success_criteria": {"type": "string"}
                        },
                        "required": ["title", "description", "success_criteria"]
                    }
                }
            },
            "required": ["checkpoints"]
        }
    })
}

/// Tool schema forcing a structured plan revision reply out of
/// `evaluate_progress`'s model call, rather than parsing free text.
fn revise_plan_schema() -> serde_json::Value {
    serde_json::json!({
        "name": "revise_plan",
        "description": "Replace the goal's remaining pending checkpoints with a revised list. Omit to keep the current plan.",
        "parameters": {
            "type": "object",
            "properties": {
                "checkpoints": {
                    "type": "array",
                    "items": {
                        "type": "object",
                        "properties": {
                            "title": {"type": "string"},
                            "description": {"type": "string"},
                            "success_criteria": {"type": "string"}
                        },
                        "required": ["title", "description", "success_criteria"]
                    }
                }
            },
            "required": ["checkpoints"]
        }
    })
}

fn goal_context_turn(goal: &Goal, checkpoint: &crate::store::goals::Checkpoint) -> crate::atoms::types::Turn {
    crate::atoms::types::Turn {
        role: Role::System,
        content: format!(
            "Active goal: {}\nProgress: {}/{}\nCurrent checkpoint: {} — {}\nSuccess criteria: {}\nContext summary: {}",
            goal.goal,
            goal.current_checkpoint,
            goal.total_checkpoints,
            checkpoint.title,
            checkpoint.description,
            checkpoint.success_criteria,
            goal.context_summary,
        ),
        tool_calls: vec![],
        tool_call_id: None,
        attachments: vec![],
        created_at: chrono::Utc::now(),
    }
}

/// On startup, resume all goals with `status=active` if `auto_continue`
/// (spec §4.3 "On startup, if auto_continue=true...").
pub fn goals_to_auto_resume(store: &Store, auto_continue: bool) -> CoreResult<Vec<Goal>> {
    if !auto_continue {
        return Ok(vec![]);
    }
    store.list_goals_by_status(GoalStatus::Active)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pause_token_defaults_clear() {
        let token = PauseToken::default();
        assert!(!token.is_set());
        token.set();
        assert!(token.is_set());
        token.clear();
        assert!(!token.is_set());
    }

    #[test]
    fn auto_resume_is_empty_when_disabled() {
        let store = Store::open_in_memory().unwrap();
        assert!(goals_to_auto_resume(&store, false).unwrap().is_empty());
    }
}
