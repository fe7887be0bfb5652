// Autonomous Mind (spec §4.3). A long-lived worker that wakes on its own
// schedule, builds a priority stack from live state, runs one restricted
// agent turn, writes the scratchpad, and reschedules its next wakeup.

use crate::atoms::types::{Role, TaskType, TurnContext};
use crate::config::MindConfig;
use crate::goalrunner::PauseToken;
use crate::llm::RouteRequest;
use crate::pipeline::executor::{ApprovalCallback, Executor};
use crate::policy::resource_guards::InterAgentCooldown;
use crate::store::Store;
use crate::atoms::error::CoreResult;
use std::sync::Mutex;
use std::time::Duration;

/// One entry in the deterministic priority stack (spec §4.3 step 4).
#[derive(Debug, Clone)]
pub struct PriorityItem {
    pub category: &'static str,
    pub summary: String,
}

/// Thread-safe inbox for `mind.inject_event` (spec §4.3 "Event injection").
#[derive(Default)]
pub struct EventInbox(Mutex<Vec<String>>);

impl EventInbox {
    pub fn inject(&self, text: String) {
        self.0.lock().unwrap().push(text);
    }

    pub fn drain(&self) -> Vec<String> {
        std::mem::take(&mut *self.0.lock().unwrap())
    }
}

pub struct WakeupOutcome {
    pub content: String,
    pub next_wakeup_seconds: u64,
}

pub struct Mind<'a> {
    pub cfg: &'a MindConfig,
    pub store: &'a Store,
    pub executor: &'a Executor<'a>,
    pub inbox: &'a EventInbox,
}

impl<'a> Mind<'a> {
    /// Builds the priority stack (step 4): active goals, revenue/scheduled
    /// items, capability gaps, presence, knowledge staleness, ranked by
    /// category presence then the configured category order.
    pub fn build_priority_stack(&self) -> CoreResult<Vec<PriorityItem>> {
        let mut by_category: std::collections::HashMap<&'static str, Vec<PriorityItem>> = std::collections::HashMap::new();

        let active_goals = self.store.list_goals_by_status(crate::atoms::types::GoalStatus::Active)?;
        for goal in &active_goals {
            by_category.entry("active_goals").or_default().push(PriorityItem {
                category: "active_goals",
                summary: format!("{} ({}/{})", goal.goal, goal.current_checkpoint, goal.total_checkpoints),
            });
        }

        let due = self.store.due_scheduled_tasks(chrono::Utc::now())?;
        for task in &due {
            by_category.entry("scheduled").or_default().push(PriorityItem {
                category: "scheduled",
                summary: format!("{}: {}", task.name, task.goal),
            });
        }

        for row in self.store.list_payment_audit(20)? {
            if row.status == "received" {
                by_category.entry("revenue").or_default().push(PriorityItem {
                    category: "revenue",
                    summary: format!("received {} {} from {}", row.amount, row.currency, row.recipient),
                });
            }
        }

        for memory in self.store.recent_memories(20)? {
            if memory.outcome == "failed" {
                by_category.entry("capability_gaps").or_default().push(PriorityItem {
                    category: "capability_gaps",
                    summary: memory.summary,
                });
            }
        }

        let now = chrono::Utc::now();
        for session in self.store.list_sessions()? {
            if session.authority_tier == crate::atoms::types::AuthorityTier::Owner
                && now.signed_duration_since(session.last_active).num_hours() >= crate::atoms::constants::PRESENCE_SILENCE_HOURS
            {
                by_category.entry("presence").or_default().push(PriorityItem {
                    category: "presence",
                    summary: format!("no contact from {} on {} in over {}h", session.user_id, session.channel, crate::atoms::constants::PRESENCE_SILENCE_HOURS),
                });
            }
        }

        for chunk in self.store.list_knowledge_chunks()? {
            if now.signed_duration_since(chunk.updated_at).num_days() >= crate::atoms::constants::KNOWLEDGE_STALENESS_DAYS {
                by_category.entry("knowledge_staleness").or_default().push(PriorityItem {
                    category: "knowledge_staleness",
                    summary: format!("{} last refreshed over {}d ago", chunk.file_path, crate::atoms::constants::KNOWLEDGE_STALENESS_DAYS),
                });
            }
        }

        let mut stack = Vec::new();
        for category in &self.cfg.priority_order {
            if let Some(items) = by_category.remove(category.as_str()) {
                stack.extend(items);
            }
        }
        Ok(stack)
    }

    /// One full wake cycle (spec §4.3 steps 2-9, minus the sleep in step 1
    /// and 9 which the caller's scheduling loop owns).
    pub async fn wake(&self, session_id: &str, approvals: &dyn ApprovalCallback, daily_spend_pct: f64) -> CoreResult<WakeupOutcome> {
        // Step 3: budget check.
        if daily_spend_pct >= self.cfg.budget_pct {
            return Ok(WakeupOutcome { content: "budget exhausted, skipping wakeup".into(), next_wakeup_seconds: self.cfg.max_wakeup_seconds });
        }

        // Step 4 + 5: assemble context.
        let stack = self.build_priority_stack()?;
        let scratchpad = self.store.read_scratchpad()?;
        let events = self.inbox.drain();

        let system_turn = crate::atoms::types::Turn {
            role: Role::System,
            content: format!(
                "You are operating in an autonomous wakeup cycle.\nPriority stack:\n{}\nScratchpad:\n{}\nEvents since last wake:\n{}",
                stack.iter().map(|i| format!("- [{}] {}", i.category, i.summary)).collect::<Vec<_>>().join("\n"),
                scratchpad,
                events.join("\n"),
            ),
            tool_calls: vec![],
            tool_call_id: None,
            attachments: vec![],
            created_at: chrono::Utc::now(),
        };
        let mut conversation = vec![system_turn];

        // Step 6: run one agent turn with the pipeline's normal tool gating
        // (the mind's restricted whitelist is enforced at tool-registry
        // construction time for the mind's session, not here).
        let outcome = self
            .executor
            .run_turn(None, session_id, crate::atoms::types::AuthorityTier::Owner, TurnContext::MindWakeup, &mut conversation, approvals)
            .await?;

        // Step 7: scratchpad write.
        self.store.write_scratchpad(&outcome.final_content)?;

        // Step 8: next wakeup, clamped to [min, max].
        let next = self.propose_next_wakeup(&conversation).await.unwrap_or(self.cfg.wakeup_seconds);
        let clamped = next.clamp(self.cfg.min_wakeup_seconds, self.cfg.max_wakeup_seconds);

        Ok(WakeupOutcome { content: outcome.final_content, next_wakeup_seconds: clamped })
    }

    async fn propose_next_wakeup(&self, conversation: &[crate::atoms::types::Turn]) -> CoreResult<u64> {
        let request = RouteRequest {
            task_type: TaskType::Simple,
            messages: conversation,
            tool_schemas: &[],
            explicit_model: None,
            writer_architecture: None,
        };
        let response = self.executor.router.route(None, request).await?;
        Ok(response
            .content
            .split_whitespace()
            .find_map(|tok| tok.parse::<u64>().ok())
            .unwrap_or(self.cfg.wakeup_seconds))
    }
}

/// Proactive outbound messages are rate-limited per recipient (spec §4.3,
/// §6.3 "max_messages_per_hour") using the same cooldown primitive as the
/// policy kernel's inter-agent messaging guard.
pub fn proactive_rate_limit_window(max_messages_per_hour: u32) -> Duration {
    if max_messages_per_hour == 0 {
        return Duration::from_secs(u64::MAX / 2);
    }
    Duration::from_secs(3600 / max_messages_per_hour as u64)
}

pub fn should_allow_proactive_message(cooldown: &mut InterAgentCooldown, recipient: &str, max_messages_per_hour: u32) -> bool {
    cooldown.allow(recipient, proactive_rate_limit_window(max_messages_per_hour))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inbox_drains_in_fifo_order() {
        let inbox = EventInbox::default();
        inbox.inject("a".into());
        inbox.inject("b".into());
        assert_eq!(inbox.drain(), vec!["a".to_string(), "b".to_string()]);
        assert!(inbox.drain().is_empty());
    }

    #[test]
    fn rate_limit_window_scales_inversely_with_cap() {
        assert!(proactive_rate_limit_window(1) > proactive_rate_limit_window(5));
    }

    #[test]
    fn second_message_within_window_is_blocked() {
        let mut cooldown = InterAgentCooldown::new();
        assert!(should_allow_proactive_message(&mut cooldown, "owner", 1));
        assert!(!should_allow_proactive_message(&mut cooldown, "owner", 1));
    }

    #[test]
    fn priority_stack_surfaces_revenue_and_capability_gaps() {
        let store = Store::open_in_memory().unwrap();
        store
            .record_payment_audit("send_payment", 12.5, "USD", "alice", "stripe", None, "received", None, "s1", "cli", None, None, None, None)
            .unwrap();
        store.record_memory("t1", "tried to book a flight", "failed", None).unwrap();

        let cfg = MindConfig::default();
        let executor_cfg = crate::config::Config::default();
        let vault_dir = std::env::temp_dir().join(format!("mind-test-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&vault_dir).unwrap();
        let vault = crate::policy::vault::Vault::open(&vault_dir, "correct horse battery staple").unwrap();
        let router = crate::llm::Router { cfg: &executor_cfg.llm, vault: &vault, store: &store };
        let registry = crate::tools::registry::ToolRegistry::new(vec![]);
        let workspace = vault_dir.join("workspace");
        let executor = Executor { cfg: &executor_cfg, store: &store, router: &router, registry: &registry, workspace_dir: &workspace };
        let inbox = EventInbox::default();
        let mind = Mind { cfg: &cfg, store: &store, executor: &executor, inbox: &inbox };

        let stack = mind.build_priority_stack().unwrap();
        assert!(stack.iter().any(|i| i.category == "revenue"));
        assert!(stack.iter().any(|i| i.category == "capability_gaps"));

        std::fs::remove_dir_all(&vault_dir).ok();
    }
}
