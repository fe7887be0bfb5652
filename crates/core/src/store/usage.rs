// Store: LLM Usage ledger — one row per completed provider call, plus the
// aggregate queries the router uses for daily budget enforcement (spec §4.3
// "Budget accounting").

use super::Store;
use crate::atoms::error::CoreResult;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsageRow {
    pub id: i64,
    pub task_id: Option<String>,
    pub model: String,
    pub provider: String,
    pub in_tokens: i64,
    pub out_tokens: i64,
    pub cost_usd: f64,
    pub finish_reason: String,
    pub latency_ms: i64,
    pub fallback_from: Option<String>,
    pub suspected_truncated: bool,
    pub task_type: String,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

#[allow(clippy::too_many_arguments)]
impl Store {
    pub fn record_llm_usage(
        &self,
        task_id: Option<&str>,
        model: &str,
        provider: &str,
        in_tokens: i64,
        out_tokens: i64,
        cost_usd: f64,
        finish_reason: &str,
        latency_ms: i64,
        fallback_from: Option<&str>,
        suspected_truncated: bool,
        task_type: &str,
    ) -> CoreResult<i64> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO llm_usage (task_id, model, provider, in_tokens, out_tokens, cost_usd, finish_reason, latency_ms, fallback_from, suspected_truncated, task_type, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
            rusqlite::params![
                task_id,
                model,
                provider,
                in_tokens,
                out_tokens,
                cost_usd,
                finish_reason,
                latency_ms,
                fallback_from,
                suspected_truncated as i64,
                task_type,
                chrono::Utc::now().to_rfc3339(),
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// Total cost in USD attributed to `provider` since the start of the
    /// current UTC day.
    pub fn cost_today_for_provider(&self, provider: &str) -> CoreResult<f64> {
        let conn = self.conn.lock();
        let day_start = chrono::Utc::now()
            .date_naive()
            .and_hms_opt(0, 0, 0)
            .unwrap()
            .and_utc()
            .to_rfc3339();
        let total: f64 = conn.query_row(
            "SELECT COALESCE(SUM(cost_usd), 0) FROM llm_usage WHERE provider = ?1 AND created_at >= ?2",
            rusqlite::params![provider, day_start],
            |r| r.get(0),
        )?;
        Ok(total)
    }

    pub fn cost_today_total(&self) -> CoreResult<f64> {
        let conn = self.conn.lock();
        let day_start = chrono::Utc::now()
            .date_naive()
            .and_hms_opt(0, 0, 0)
            .unwrap()
            .and_utc()
            .to_rfc3339();
        let total: f64 = conn.query_row(
            "SELECT COALESCE(SUM(cost_usd), 0) FROM llm_usage WHERE created_at >= ?1",
            [day_start],
            |r| r.get(0),
        )?;
        Ok(total)
    }

    pub fn count_suspected_truncations(&self, since: chrono::DateTime<chrono::Utc>) -> CoreResult<i64> {
        let conn = self.conn.lock();
        let n: i64 = conn.query_row(
            "SELECT COUNT(*) FROM llm_usage WHERE suspected_truncated = 1 AND created_at >= ?1",
            [since.to_rfc3339()],
            |r| r.get(0),
        )?;
        Ok(n)
    }
}

/// Budget status derived from a spend total and a configured daily cap, per
/// `atoms::constants::DAILY_BUDGET_WARN_PCT` / `DAILY_BUDGET_HARD_PCT`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BudgetStatus {
    Ok,
    Warn,
    Exceeded,
}

pub fn budget_status(spent_usd: f64, daily_cap_usd: f64) -> BudgetStatus {
    use crate::atoms::constants::{DAILY_BUDGET_HARD_PCT, DAILY_BUDGET_WARN_PCT};
    if daily_cap_usd <= 0.0 {
        return BudgetStatus::Ok;
    }
    let ratio = spent_usd / daily_cap_usd;
    if ratio >= DAILY_BUDGET_HARD_PCT {
        BudgetStatus::Exceeded
    } else if ratio >= DAILY_BUDGET_WARN_PCT {
        BudgetStatus::Warn
    } else {
        BudgetStatus::Ok
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cost_today_sums_only_todays_rows() {
        let store = Store::open_in_memory().unwrap();
        store
            .record_llm_usage(None, "claude-x", "anthropic", 100, 50, 0.25, "stop", 900, None, false, "coding")
            .unwrap();
        store
            .record_llm_usage(None, "claude-x", "anthropic", 10, 5, 0.05, "stop", 300, None, false, "simple")
            .unwrap();
        let total = store.cost_today_for_provider("anthropic").unwrap();
        assert!((total - 0.30).abs() < 1e-9);
    }

    #[test]
    fn budget_status_thresholds() {
        assert_eq!(budget_status(0.0, 10.0), BudgetStatus::Ok);
        assert_eq!(budget_status(7.9, 10.0), BudgetStatus::Ok);
        assert_eq!(budget_status(8.0, 10.0), BudgetStatus::Warn);
        assert_eq!(budget_status(10.0, 10.0), BudgetStatus::Exceeded);
        assert_eq!(budget_status(5.0, 0.0), BudgetStatus::Ok);
    }

    #[test]
    fn suspected_truncations_are_counted() {
        let store = Store::open_in_memory().unwrap();
        let since = chrono::Utc::now() - chrono::Duration::minutes(1);
        store
            .record_llm_usage(None, "m", "p", 10, 10, 0.0, "length", 100, None, true, "coding")
            .unwrap();
        store
            .record_llm_usage(None, "m", "p", 10, 10, 0.0, "stop", 100, None, false, "coding")
            .unwrap();
        assert_eq!(store.count_suspected_truncations(since).unwrap(), 1);
    }
}
