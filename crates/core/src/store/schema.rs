// Persistence: versioned migration list, linear, applied in order on
// startup. Failure aborts startup (spec §4.5, §7).

use crate::atoms::error::{CoreError, CoreResult};
use rusqlite::Connection;

struct Migration {
    version: i64,
    sql: &'static str,
}

const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        sql: r#"
            CREATE TABLE IF NOT EXISTS schema_migrations (
                version INTEGER PRIMARY KEY,
                applied_at TEXT NOT NULL DEFAULT (datetime('now'))
            );

            CREATE TABLE IF NOT EXISTS sessions (
                session_id TEXT PRIMARY KEY,
                channel TEXT NOT NULL,
                user_id TEXT NOT NULL,
                authority_tier TEXT NOT NULL,
                conversation TEXT NOT NULL DEFAULT '[]',
                created_at TEXT NOT NULL,
                last_active TEXT NOT NULL,
                metadata TEXT NOT NULL DEFAULT '{}',
                UNIQUE(channel, user_id)
            );

            CREATE TABLE IF NOT EXISTS tasks (
                task_id TEXT PRIMARY KEY,
                session_id TEXT NOT NULL,
                goal TEXT NOT NULL,
                status TEXT NOT NULL,
                plan_json TEXT NOT NULL DEFAULT '[]',
                result TEXT,
                tokens INTEGER NOT NULL DEFAULT 0,
                cost_usd REAL NOT NULL DEFAULT 0,
                started_at TEXT NOT NULL,
                completed_at TEXT
            );

            CREATE TABLE IF NOT EXISTS goals (
                goal_id TEXT PRIMARY KEY,
                session_id TEXT NOT NULL,
                goal TEXT NOT NULL,
                status TEXT NOT NULL,
                plan TEXT NOT NULL DEFAULT '[]',
                context_summary TEXT NOT NULL DEFAULT '',
                current_checkpoint INTEGER NOT NULL DEFAULT 0,
                total_checkpoints INTEGER NOT NULL DEFAULT 0,
                attempts INTEGER NOT NULL DEFAULT 0,
                max_attempts INTEGER NOT NULL DEFAULT 3,
                llm_calls_used INTEGER NOT NULL DEFAULT 0,
                cost_usd REAL NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS checkpoints (
                goal_id TEXT NOT NULL,
                "order" INTEGER NOT NULL,
                title TEXT NOT NULL,
                description TEXT NOT NULL,
                success_criteria TEXT NOT NULL,
                status TEXT NOT NULL,
                result_summary TEXT,
                attempts INTEGER NOT NULL DEFAULT 0,
                started_at TEXT,
                completed_at TEXT,
                PRIMARY KEY (goal_id, "order")
            );

            CREATE TABLE IF NOT EXISTS approval_requests (
                id TEXT PRIMARY KEY,
                tool_name TEXT NOT NULL,
                params_json TEXT NOT NULL,
                context TEXT NOT NULL DEFAULT '',
                status TEXT NOT NULL,
                session_id TEXT NOT NULL,
                created_at TEXT NOT NULL,
                resolved_at TEXT,
                timeout_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS memories (
                id TEXT PRIMARY KEY,
                task_id TEXT NOT NULL,
                summary TEXT NOT NULL,
                outcome TEXT NOT NULL,
                embedding BLOB,
                created_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS knowledge_chunks (
                id TEXT PRIMARY KEY,
                file_path TEXT NOT NULL,
                heading_path TEXT NOT NULL DEFAULT '',
                content TEXT NOT NULL,
                tags TEXT NOT NULL DEFAULT '[]',
                embedding BLOB,
                updated_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS identity (
                id INTEGER PRIMARY KEY CHECK (id = 1),
                creator TEXT NOT NULL,
                display_name TEXT NOT NULL,
                purpose TEXT NOT NULL DEFAULT '',
                "values" TEXT NOT NULL DEFAULT '[]',
                beliefs TEXT NOT NULL DEFAULT '[]',
                curiosities TEXT NOT NULL DEFAULT '[]',
                boundaries TEXT NOT NULL DEFAULT '[]',
                capabilities TEXT NOT NULL DEFAULT '[]',
                personality TEXT NOT NULL DEFAULT '',
                communication_style TEXT NOT NULL DEFAULT '',
                version INTEGER NOT NULL DEFAULT 1,
                updated_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS identity_evolution (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                trigger TEXT NOT NULL,
                field TEXT NOT NULL,
                old TEXT NOT NULL,
                new TEXT NOT NULL,
                reason TEXT NOT NULL,
                confidence REAL NOT NULL,
                created_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS llm_usage (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                task_id TEXT,
                model TEXT NOT NULL,
                provider TEXT NOT NULL,
                in_tokens INTEGER NOT NULL,
                out_tokens INTEGER NOT NULL,
                cost_usd REAL NOT NULL,
                finish_reason TEXT NOT NULL,
                latency_ms INTEGER NOT NULL,
                fallback_from TEXT,
                suspected_truncated INTEGER NOT NULL DEFAULT 0,
                task_type TEXT NOT NULL,
                created_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS scheduled_tasks (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                schedule_expr TEXT NOT NULL,
                goal TEXT NOT NULL,
                enabled INTEGER NOT NULL DEFAULT 1,
                last_run TEXT,
                next_run TEXT
            );

            CREATE TABLE IF NOT EXISTS payment_audit (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                ts TEXT NOT NULL,
                tool TEXT NOT NULL,
                amount REAL NOT NULL,
                currency TEXT NOT NULL,
                recipient TEXT NOT NULL,
                provider TEXT NOT NULL,
                chain TEXT,
                status TEXT NOT NULL,
                approval_id TEXT,
                session_id TEXT NOT NULL,
                channel TEXT NOT NULL,
                task_context TEXT,
                tx_ref TEXT,
                fee REAL,
                error TEXT
            );

            CREATE TABLE IF NOT EXISTS mind_scratchpad (
                id INTEGER PRIMARY KEY CHECK (id = 1),
                version INTEGER NOT NULL DEFAULT 1,
                markdown TEXT NOT NULL DEFAULT '',
                updated_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS kv_config (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );
        "#,
    },
    Migration {
        version: 2,
        sql: r#"
            CREATE INDEX IF NOT EXISTS idx_sessions_channel_user ON sessions(channel, user_id);
            CREATE INDEX IF NOT EXISTS idx_tasks_session ON tasks(session_id);
            CREATE INDEX IF NOT EXISTS idx_goals_session ON goals(session_id);
            CREATE INDEX IF NOT EXISTS idx_goals_status ON goals(status);
            CREATE INDEX IF NOT EXISTS idx_approvals_status ON approval_requests(status);
            CREATE INDEX IF NOT EXISTS idx_llm_usage_created ON llm_usage(created_at);
        "#,
    },
];

/// Apply all migrations newer than the current schema version, each inside
/// its own transaction. Aborts (and leaves the DB at the last successfully
/// applied version) on the first failure.
pub fn run_migrations(conn: &mut Connection) -> CoreResult<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_migrations (version INTEGER PRIMARY KEY, applied_at TEXT NOT NULL DEFAULT (datetime('now')))",
    )?;

    let current: i64 = conn
        .query_row("SELECT COALESCE(MAX(version), 0) FROM schema_migrations", [], |r| r.get(0))
        .unwrap_or(0);

    for m in MIGRATIONS {
        if m.version <= current {
            continue;
        }
        let tx = conn.transaction()?;
        tx.execute_batch(m.sql).map_err(|e| {
            CoreError::Migration(format!("migration {} failed: {}", m.version, e))
        })?;
        tx.execute("INSERT INTO schema_migrations (version) VALUES (?1)", [m.version])?;
        tx.commit()?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn migrations_apply_cleanly_and_are_idempotent() {
        let mut conn = Connection::open_in_memory().unwrap();
        run_migrations(&mut conn).unwrap();
        run_migrations(&mut conn).unwrap(); // second run is a no-op
        let version: i64 = conn
            .query_row("SELECT MAX(version) FROM schema_migrations", [], |r| r.get(0))
            .unwrap();
        assert_eq!(version, MIGRATIONS.last().unwrap().version);
    }

    #[test]
    fn sessions_table_enforces_channel_user_uniqueness() {
        let mut conn = Connection::open_in_memory().unwrap();
        run_migrations(&mut conn).unwrap();
        conn.execute(
            "INSERT INTO sessions (session_id, channel, user_id, authority_tier, created_at, last_active) VALUES ('a','cli','u1','owner','now','now')",
            [],
        ).unwrap();
        let dup = conn.execute(
            "INSERT INTO sessions (session_id, channel, user_id, authority_tier, created_at, last_active) VALUES ('b','cli','u1','owner','now','now')",
            [],
        );
        assert!(dup.is_err());
    }
}
