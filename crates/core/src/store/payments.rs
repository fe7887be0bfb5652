// Store: Payment Audit — append-only ledger of every payment-tool
// invocation, successful or not (spec §4.6 "Payments always audited").

use super::Store;
use crate::atoms::error::CoreResult;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentAuditRow {
    pub id: i64,
    pub ts: chrono::DateTime<chrono::Utc>,
    pub tool: String,
    pub amount: f64,
    pub currency: String,
    pub recipient: String,
    pub provider: String,
    pub chain: Option<String>,
    pub status: String,
    pub approval_id: Option<String>,
    pub session_id: String,
    pub channel: String,
    pub task_context: Option<String>,
    pub tx_ref: Option<String>,
    pub fee: Option<f64>,
    pub error: Option<String>,
}

#[allow(clippy::too_many_arguments)]
impl Store {
    pub fn record_payment_audit(
        &self,
        tool: &str,
        amount: f64,
        currency: &str,
        recipient: &str,
        provider: &str,
        chain: Option<&str>,
        status: &str,
        approval_id: Option<&str>,
        session_id: &str,
        channel: &str,
        task_context: Option<&str>,
        tx_ref: Option<&str>,
        fee: Option<f64>,
        error: Option<&str>,
    ) -> CoreResult<i64> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO payment_audit (ts, tool, amount, currency, recipient, provider, chain, status, approval_id, session_id, channel, task_context, tx_ref, fee, error)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)",
            rusqlite::params![
                chrono::Utc::now().to_rfc3339(),
                tool,
                amount,
                currency,
                recipient,
                provider,
                chain,
                status,
                approval_id,
                session_id,
                channel,
                task_context,
                tx_ref,
                fee,
                error,
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    pub fn list_payment_audit(&self, limit: i64) -> CoreResult<Vec<PaymentAuditRow>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT id, ts, tool, amount, currency, recipient, provider, chain, status, approval_id, session_id, channel, task_context, tx_ref, fee, error
             FROM payment_audit ORDER BY id DESC LIMIT ?1",
        )?;
        let rows = stmt.query_map([limit], |row| {
            let ts_raw: String = row.get(1)?;
            Ok(PaymentAuditRow {
                id: row.get(0)?,
                ts: chrono::DateTime::parse_from_rfc3339(&ts_raw)
                    .map(|d| d.with_timezone(&chrono::Utc))
                    .unwrap_or_else(|_| chrono::Utc::now()),
                tool: row.get(2)?,
                amount: row.get(3)?,
                currency: row.get(4)?,
                recipient: row.get(5)?,
                provider: row.get(6)?,
                chain: row.get(7)?,
                status: row.get(8)?,
                approval_id: row.get(9)?,
                session_id: row.get(10)?,
                channel: row.get(11)?,
                task_context: row.get(12)?,
                tx_ref: row.get(13)?,
                fee: row.get(14)?,
                error: row.get(15)?,
            })
        })?;
        let mut out = vec![];
        for r in rows {
            out.push(r?);
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payment_audit_records_every_attempt_including_failures() {
        let store = Store::open_in_memory().unwrap();
        store
            .record_payment_audit(
                "crypto_send", 10.0, "USD", "alice", "coinbase", Some("base"),
                "succeeded", Some("appr-1"), "sess-1", "cli", None, Some("0xabc"), Some(0.1), None,
            )
            .unwrap();
        store
            .record_payment_audit(
                "crypto_send", 5.0, "USD", "bob", "coinbase", None,
                "failed", None, "sess-1", "cli", None, None, None, Some("insufficient funds"),
            )
            .unwrap();
        let all = store.list_payment_audit(10).unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].status, "failed");
        assert_eq!(all[1].status, "succeeded");
    }
}
