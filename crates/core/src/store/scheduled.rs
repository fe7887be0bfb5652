// Store: Scheduled Task entity — cron-like recurring goals (spec §4.4
// "schedule" command family).

use super::Store;
use crate::atoms::error::CoreResult;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduledTask {
    pub id: String,
    pub name: String,
    pub schedule_expr: String,
    pub goal: String,
    pub enabled: bool,
    pub last_run: Option<chrono::DateTime<chrono::Utc>>,
    pub next_run: Option<chrono::DateTime<chrono::Utc>>,
}

impl Store {
    pub fn create_scheduled_task(
        &self,
        name: &str,
        schedule_expr: &str,
        goal: &str,
        next_run: Option<chrono::DateTime<chrono::Utc>>,
    ) -> CoreResult<ScheduledTask> {
        let task = ScheduledTask {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.to_string(),
            schedule_expr: schedule_expr.to_string(),
            goal: goal.to_string(),
            enabled: true,
            last_run: None,
            next_run,
        };
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO scheduled_tasks (id, name, schedule_expr, goal, enabled, last_run, next_run)
             VALUES (?1, ?2, ?3, ?4, 1, NULL, ?5)",
            rusqlite::params![task.id, task.name, task.schedule_expr, task.goal, task.next_run.map(|d| d.to_rfc3339())],
        )?;
        Ok(task)
    }

    pub fn list_scheduled_tasks(&self) -> CoreResult<Vec<ScheduledTask>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT id, name, schedule_expr, goal, enabled, last_run, next_run FROM scheduled_tasks",
        )?;
        let rows = stmt.query_map([], row_to_scheduled)?;
        let mut out = vec![];
        for r in rows {
            out.push(r?);
        }
        Ok(out)
    }

    pub fn delete_scheduled_task(&self, id: &str) -> CoreResult<bool> {
        let conn = self.conn.lock();
        let changed = conn.execute("DELETE FROM scheduled_tasks WHERE id = ?1", [id])?;
        Ok(changed == 1)
    }

    pub fn mark_scheduled_task_run(
        &self,
        id: &str,
        ran_at: chrono::DateTime<chrono::Utc>,
        next_run: Option<chrono::DateTime<chrono::Utc>>,
    ) -> CoreResult<()> {
        let conn = self.conn.lock();
        conn.execute(
            "UPDATE scheduled_tasks SET last_run = ?1, next_run = ?2 WHERE id = ?3",
            rusqlite::params![ran_at.to_rfc3339(), next_run.map(|d| d.to_rfc3339()), id],
        )?;
        Ok(())
    }

    /// Tasks whose `next_run` has arrived and which are still enabled.
    pub fn due_scheduled_tasks(&self, now: chrono::DateTime<chrono::Utc>) -> CoreResult<Vec<ScheduledTask>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT id, name, schedule_expr, goal, enabled, last_run, next_run
             FROM scheduled_tasks WHERE enabled = 1 AND next_run IS NOT NULL AND next_run <= ?1",
        )?;
        let rows = stmt.query_map([now.to_rfc3339()], row_to_scheduled)?;
        let mut out = vec![];
        for r in rows {
            out.push(r?);
        }
        Ok(out)
    }
}

fn row_to_scheduled(row: &rusqlite::Row) -> rusqlite::Result<ScheduledTask> {
    let last_run_raw: Option<String> = row.get(5)?;
    let next_run_raw: Option<String> = row.get(6)?;
    Ok(ScheduledTask {
        id: row.get(0)?,
        name: row.get(1)?,
        schedule_expr: row.get(2)?,
        goal: row.get(3)?,
        enabled: row.get::<_, i64>(4)? != 0,
        last_run: last_run_raw.map(|s| {
            chrono::DateTime::parse_from_rfc3339(&s)
                .map(|d| d.with_timezone(&chrono::Utc))
                .unwrap_or_else(|_| chrono::Utc::now())
        }),
        next_run: next_run_raw.map(|s| {
            chrono::DateTime::parse_from_rfc3339(&s)
                .map(|d| d.with_timezone(&chrono::Utc))
                .unwrap_or_else(|_| chrono::Utc::now())
        }),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delete_is_idempotent() {
        let store = Store::open_in_memory().unwrap();
        let t = store.create_scheduled_task("daily digest", "0 9 * * *", "summarize news", None).unwrap();
        assert!(store.delete_scheduled_task(&t.id).unwrap());
        assert!(!store.delete_scheduled_task(&t.id).unwrap());
    }

    #[test]
    fn due_tasks_filters_on_next_run_and_enabled() {
        let store = Store::open_in_memory().unwrap();
        let now = chrono::Utc::now();
        let past = now - chrono::Duration::seconds(10);
        let future = now + chrono::Duration::seconds(3600);
        let due = store.create_scheduled_task("a", "* * * * *", "goal a", Some(past)).unwrap();
        store.create_scheduled_task("b", "* * * * *", "goal b", Some(future)).unwrap();
        let due_now = store.due_scheduled_tasks(now).unwrap();
        assert_eq!(due_now.len(), 1);
        assert_eq!(due_now[0].id, due.id);
    }
}
