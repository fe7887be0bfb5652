// Store: Goal and Checkpoint entities (spec §3). A goal's `current_checkpoint`
// equals the count of checkpoints with status in {completed, failed} until
// all are done (invariant #2, spec §8).

use super::Store;
use crate::atoms::error::CoreResult;
use crate::atoms::types::{CheckpointStatus, GoalStatus};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Checkpoint {
    pub goal_id: String,
    pub order: i64,
    pub title: String,
    pub description: String,
    pub success_criteria: String,
    pub status: CheckpointStatus,
    pub result_summary: Option<String>,
    pub attempts: i64,
    pub started_at: Option<chrono::DateTime<chrono::Utc>>,
    pub completed_at: Option<chrono::DateTime<chrono::Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Goal {
    pub goal_id: String,
    pub session_id: String,
    pub goal: String,
    pub status: GoalStatus,
    pub context_summary: String,
    pub current_checkpoint: i64,
    pub total_checkpoints: i64,
    pub attempts: i64,
    pub max_attempts: i64,
    pub llm_calls_used: i64,
    pub cost_usd: f64,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

fn goal_status_str(s: GoalStatus) -> &'static str {
    match s {
        GoalStatus::Planning => "planning",
        GoalStatus::Active => "active",
        GoalStatus::Paused => "paused",
        GoalStatus::Completed => "completed",
        GoalStatus::Failed => "failed",
        GoalStatus::Cancelled => "cancelled",
    }
}

fn goal_status_from_str(s: &str) -> GoalStatus {
    match s {
        "planning" => GoalStatus::Planning,
        "active" => GoalStatus::Active,
        "paused" => GoalStatus::Paused,
        "completed" => GoalStatus::Completed,
        "failed" => GoalStatus::Failed,
        _ => GoalStatus::Cancelled,
    }
}

fn checkpoint_status_str(s: CheckpointStatus) -> &'static str {
    match s {
        CheckpointStatus::Pending => "pending",
        CheckpointStatus::Active => "active",
        CheckpointStatus::Completed => "completed",
        CheckpointStatus::Failed => "failed",
    }
}

fn checkpoint_status_from_str(s: &str) -> CheckpointStatus {
    match s {
        "active" => CheckpointStatus::Active,
        "completed" => CheckpointStatus::Completed,
        "failed" => CheckpointStatus::Failed,
        _ => CheckpointStatus::Pending,
    }
}

impl Store {
    /// Create a goal and its decomposed checkpoints atomically (spec §4.3
    /// "Decomposition ... Persisted atomically").
    pub fn create_goal_with_checkpoints(
        &self,
        session_id: &str,
        goal_text: &str,
        max_attempts: i64,
        checkpoints: &[(String, String, String)], // (title, description, success_criteria)
    ) -> CoreResult<Goal> {
        let now = chrono::Utc::now();
        let goal = Goal {
            goal_id: uuid::Uuid::new_v4().to_string(),
            session_id: session_id.to_string(),
            goal: goal_text.to_string(),
            status: GoalStatus::Planning,
            context_summary: String::new(),
            current_checkpoint: 0,
            total_checkpoints: checkpoints.len() as i64,
            attempts: 0,
            max_attempts,
            llm_calls_used: 0,
            cost_usd: 0.0,
            created_at: now,
            updated_at: now,
        };
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        tx.execute(
            "INSERT INTO goals (goal_id, session_id, goal, status, plan, context_summary, current_checkpoint, total_checkpoints, attempts, max_attempts, llm_calls_used, cost_usd, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, '[]', ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
            rusqlite::params![
                goal.goal_id, goal.session_id, goal.goal, goal_status_str(goal.status),
                goal.context_summary, goal.current_checkpoint, goal.total_checkpoints,
                goal.attempts, goal.max_attempts, goal.llm_calls_used, goal.cost_usd,
                goal.created_at.to_rfc3339(), goal.updated_at.to_rfc3339(),
            ],
        )?;
        for (i, (title, description, criteria)) in checkpoints.iter().enumerate() {
            tx.execute(
                "INSERT INTO checkpoints (goal_id, \"order\", title, description, success_criteria, status, attempts)
                 VALUES (?1, ?2, ?3, ?4, ?5, 'pending', 0)",
                rusqlite::params![goal.goal_id, i as i64, title, description, criteria],
            )?;
        }
        tx.commit()?;
        Ok(goal)
    }

    pub fn get_goal(&self, goal_id: &str) -> CoreResult<Option<Goal>> {
        let conn = self.conn.lock();
        let r = conn.query_row(
            "SELECT goal_id, session_id, goal, status, context_summary, current_checkpoint, total_checkpoints, attempts, max_attempts, llm_calls_used, cost_usd, created_at, updated_at
             FROM goals WHERE goal_id = ?1",
            [goal_id],
            row_to_goal,
        );
        optional(r)
    }

    pub fn list_goals_by_status(&self, status: GoalStatus) -> CoreResult<Vec<Goal>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT goal_id, session_id, goal, status, context_summary, current_checkpoint, total_checkpoints, attempts, max_attempts, llm_calls_used, cost_usd, created_at, updated_at
             FROM goals WHERE status = ?1",
        )?;
        let rows = stmt.query_map([goal_status_str(status)], row_to_goal)?;
        let mut out = vec![];
        for r in rows {
            out.push(r?);
        }
        Ok(out)
    }

    pub fn set_goal_status(&self, goal_id: &str, status: GoalStatus) -> CoreResult<()> {
        let conn = self.conn.lock();
        conn.execute(
            "UPDATE goals SET status = ?1, updated_at = ?2 WHERE goal_id = ?3",
            rusqlite::params![goal_status_str(status), chrono::Utc::now().to_rfc3339(), goal_id],
        )?;
        Ok(())
    }

    pub fn set_goal_context_summary(&self, goal_id: &str, summary: &str) -> CoreResult<()> {
        let conn = self.conn.lock();
        conn.execute(
            "UPDATE goals SET context_summary = ?1, updated_at = ?2 WHERE goal_id = ?3",
            rusqlite::params![summary, chrono::Utc::now().to_rfc3339(), goal_id],
        )?;
        Ok(())
    }

    pub fn record_goal_llm_usage(&self, goal_id: &str, calls: i64, cost_usd: f64) -> CoreResult<()> {
        let conn = self.conn.lock();
        conn.execute(
            "UPDATE goals SET llm_calls_used = llm_calls_used + ?1, cost_usd = cost_usd + ?2, updated_at = ?3 WHERE goal_id = ?4",
            rusqlite::params![calls, cost_usd, chrono::Utc::now().to_rfc3339(), goal_id],
        )?;
        Ok(())
    }

    pub fn list_checkpoints(&self, goal_id: &str) -> CoreResult<Vec<Checkpoint>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT goal_id, \"order\", title, description, success_criteria, status, result_summary, attempts, started_at, completed_at
             FROM checkpoints WHERE goal_id = ?1 ORDER BY \"order\" ASC",
        )?;
        let rows = stmt.query_map([goal_id], row_to_checkpoint)?;
        let mut out = vec![];
        for r in rows {
            out.push(r?);
        }
        Ok(out)
    }

    /// Fetch the first pending checkpoint in order, if any.
    pub fn next_pending_checkpoint(&self, goal_id: &str) -> CoreResult<Option<Checkpoint>> {
        let checkpoints = self.list_checkpoints(goal_id)?;
        Ok(checkpoints.into_iter().find(|c| c.status == CheckpointStatus::Pending))
    }

    /// Transition pending -> active, persisted before execution begins
    /// (spec §5 "Checkpoint transitions: persisted before the next
    /// checkpoint begins").
    pub fn activate_checkpoint(&self, goal_id: &str, order: i64) -> CoreResult<()> {
        let conn = self.conn.lock();
        conn.execute(
            "UPDATE checkpoints SET status = 'active', started_at = ?1 WHERE goal_id = ?2 AND \"order\" = ?3",
            rusqlite::params![chrono::Utc::now().to_rfc3339(), goal_id, order],
        )?;
        Ok(())
    }

    /// Complete or fail a checkpoint, then recompute `current_checkpoint` on
    /// the parent goal to satisfy the invariant that it equals the count of
    /// checkpoints in {completed, failed}.
    pub fn finish_checkpoint(
        &self,
        goal_id: &str,
        order: i64,
        status: CheckpointStatus,
        result_summary: Option<&str>,
    ) -> CoreResult<()> {
        debug_assert!(matches!(status, CheckpointStatus::Completed | CheckpointStatus::Failed));
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        tx.execute(
            "UPDATE checkpoints SET status = ?1, result_summary = ?2, completed_at = ?3 WHERE goal_id = ?4 AND \"order\" = ?5",
            rusqlite::params![
                checkpoint_status_str(status), result_summary,
                chrono::Utc::now().to_rfc3339(), goal_id, order,
            ],
        )?;
        let done: i64 = tx.query_row(
            "SELECT COUNT(*) FROM checkpoints WHERE goal_id = ?1 AND status IN ('completed','failed')",
            [goal_id],
            |r| r.get(0),
        )?;
        tx.execute(
            "UPDATE goals SET current_checkpoint = ?1, updated_at = ?2 WHERE goal_id = ?3",
            rusqlite::params![done, chrono::Utc::now().to_rfc3339(), goal_id],
        )?;
        tx.commit()?;
        Ok(())
    }

    pub fn increment_checkpoint_attempts(&self, goal_id: &str, order: i64) -> CoreResult<i64> {
        let conn = self.conn.lock();
        conn.execute(
            "UPDATE checkpoints SET attempts = attempts + 1 WHERE goal_id = ?1 AND \"order\" = ?2",
            rusqlite::params![goal_id, order],
        )?;
        conn.query_row(
            "SELECT attempts FROM checkpoints WHERE goal_id = ?1 AND \"order\" = ?2",
            rusqlite::params![goal_id, order],
            |r| r.get(0),
        ).map_err(Into::into)
    }

    /// Replace all pending checkpoints (preserving completed ones) with a
    /// revised plan, atomically (spec §4.3 step 6 "Revisions preserve
    /// completed checkpoints and replace pending ones atomically").
    pub fn revise_remaining_checkpoints(
        &self,
        goal_id: &str,
        new_pending: &[(String, String, String)],
    ) -> CoreResult<()> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        let max_done_order: i64 = tx.query_row(
            "SELECT COALESCE(MAX(\"order\"), -1) FROM checkpoints WHERE goal_id = ?1 AND status IN ('completed','failed')",
            [goal_id],
            |r| r.get(0),
        )?;
        tx.execute(
            "DELETE FROM checkpoints WHERE goal_id = ?1 AND status NOT IN ('completed','failed')",
            [goal_id],
        )?;
        for (i, (title, description, criteria)) in new_pending.iter().enumerate() {
            tx.execute(
                "INSERT INTO checkpoints (goal_id, \"order\", title, description, success_criteria, status, attempts)
                 VALUES (?1, ?2, ?3, ?4, ?5, 'pending', 0)",
                rusqlite::params![goal_id, max_done_order + 1 + i as i64, title, description, criteria],
            )?;
        }
        let total: i64 = tx.query_row("SELECT COUNT(*) FROM checkpoints WHERE goal_id = ?1", [goal_id], |r| r.get(0))?;
        tx.execute(
            "UPDATE goals SET total_checkpoints = ?1, updated_at = ?2 WHERE goal_id = ?3",
            rusqlite::params![total, chrono::Utc::now().to_rfc3339(), goal_id],
        )?;
        tx.commit()?;
        Ok(())
    }
}

fn row_to_goal(row: &rusqlite::Row) -> rusqlite::Result<Goal> {
    Ok(Goal {
        goal_id: row.get(0)?,
        session_id: row.get(1)?,
        goal: row.get(2)?,
        status: goal_status_from_str(&row.get::<_, String>(3)?),
        context_summary: row.get(4)?,
        current_checkpoint: row.get(5)?,
        total_checkpoints: row.get(6)?,
        attempts: row.get(7)?,
        max_attempts: row.get(8)?,
        llm_calls_used: row.get(9)?,
        cost_usd: row.get(10)?,
        created_at: parse_dt(&row.get::<_, String>(11)?),
        updated_at: parse_dt(&row.get::<_, String>(12)?),
    })
}

fn row_to_checkpoint(row: &rusqlite::Row) -> rusqlite::Result<Checkpoint> {
    Ok(Checkpoint {
        goal_id: row.get(0)?,
        order: row.get(1)?,
        title: row.get(2)?,
        description: row.get(3)?,
        success_criteria: row.get(4)?,
        status: checkpoint_status_from_str(&row.get::<_, String>(5)?),
        result_summary: row.get(6)?,
        attempts: row.get(7)?,
        started_at: row.get::<_, Option<String>>(8)?.map(|s| parse_dt(&s)),
        completed_at: row.get::<_, Option<String>>(9)?.map(|s| parse_dt(&s)),
    })
}

fn parse_dt(s: &str) -> chrono::DateTime<chrono::Utc> {
    chrono::DateTime::parse_from_rfc3339(s)
        .map(|d| d.with_timezone(&chrono::Utc))
        .unwrap_or_else(|_| chrono::Utc::now())
}

fn optional<T>(r: rusqlite::Result<T>) -> CoreResult<Option<T>> {
    match r {
        Ok(v) => Ok(Some(v)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cps(n: usize) -> Vec<(String, String, String)> {
        (0..n).map(|i| (format!("cp{i}"), "desc".into(), "done".into())).collect()
    }

    #[test]
    fn current_checkpoint_tracks_completed_and_failed_count() {
        let store = Store::open_in_memory().unwrap();
        let goal = store.create_goal_with_checkpoints("s1", "grow stars", 3, &cps(4)).unwrap();
        store.activate_checkpoint(&goal.goal_id, 0).unwrap();
        store.finish_checkpoint(&goal.goal_id, 0, CheckpointStatus::Completed, Some("ok")).unwrap();
        let reloaded = store.get_goal(&goal.goal_id).unwrap().unwrap();
        assert_eq!(reloaded.current_checkpoint, 1);

        store.activate_checkpoint(&goal.goal_id, 1).unwrap();
        store.finish_checkpoint(&goal.goal_id, 1, CheckpointStatus::Failed, Some("err")).unwrap();
        let reloaded = store.get_goal(&goal.goal_id).unwrap().unwrap();
        assert_eq!(reloaded.current_checkpoint, 2);
    }

    #[test]
    fn revision_preserves_completed_checkpoints() {
        let store = Store::open_in_memory().unwrap();
        let goal = store.create_goal_with_checkpoints("s1", "g", 3, &cps(3)).unwrap();
        store.finish_checkpoint(&goal.goal_id, 0, CheckpointStatus::Completed, None).unwrap();
        store.revise_remaining_checkpoints(&goal.goal_id, &cps(2)).unwrap();
        let list = store.list_checkpoints(&goal.goal_id).unwrap();
        assert_eq!(list[0].status, CheckpointStatus::Completed);
        assert_eq!(list.len(), 3); // 1 completed + 2 new pending
        assert!(list[1..].iter().all(|c| c.status == CheckpointStatus::Pending));
    }

    #[test]
    fn next_pending_returns_in_order() {
        let store = Store::open_in_memory().unwrap();
        let goal = store.create_goal_with_checkpoints("s1", "g", 3, &cps(3)).unwrap();
        store.finish_checkpoint(&goal.goal_id, 0, CheckpointStatus::Completed, None).unwrap();
        let next = store.next_pending_checkpoint(&goal.goal_id).unwrap().unwrap();
        assert_eq!(next.order, 1);
    }
}
