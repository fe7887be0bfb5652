// Store: Approval Request entity (spec §3, §4.1). Survives restarts;
// resolvers rehydrate lazily when the originating session reconnects
// (spec §9 Open Questions -> durability chosen).

use super::Store;
use crate::atoms::error::CoreResult;
use crate::atoms::types::ApprovalStatus;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApprovalRequest {
    pub id: String,
    pub tool_name: String,
    pub params_json: serde_json::Value,
    pub context: String,
    pub status: ApprovalStatus,
    pub session_id: String,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub resolved_at: Option<chrono::DateTime<chrono::Utc>>,
    pub timeout_at: chrono::DateTime<chrono::Utc>,
}

fn status_str(s: ApprovalStatus) -> &'static str {
    match s {
        ApprovalStatus::Pending => "pending",
        ApprovalStatus::Approved => "approved",
        ApprovalStatus::Denied => "denied",
        ApprovalStatus::Expired => "expired",
        ApprovalStatus::Cancelled => "cancelled",
    }
}

fn status_from_str(s: &str) -> ApprovalStatus {
    match s {
        "approved" => ApprovalStatus::Approved,
        "denied" => ApprovalStatus::Denied,
        "expired" => ApprovalStatus::Expired,
        "cancelled" => ApprovalStatus::Cancelled,
        _ => ApprovalStatus::Pending,
    }
}

impl Store {
    pub fn create_approval(
        &self,
        tool_name: &str,
        params_json: &serde_json::Value,
        context: &str,
        session_id: &str,
        timeout_secs: u64,
    ) -> CoreResult<ApprovalRequest> {
        let now = chrono::Utc::now();
        let req = ApprovalRequest {
            id: uuid::Uuid::new_v4().to_string(),
            tool_name: tool_name.to_string(),
            params_json: params_json.clone(),
            context: context.to_string(),
            status: ApprovalStatus::Pending,
            session_id: session_id.to_string(),
            created_at: now,
            resolved_at: None,
            timeout_at: now + chrono::Duration::seconds(timeout_secs as i64),
        };
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO approval_requests (id, tool_name, params_json, context, status, session_id, created_at, timeout_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            rusqlite::params![
                req.id, req.tool_name, req.params_json.to_string(), req.context,
                status_str(req.status), req.session_id, req.created_at.to_rfc3339(),
                req.timeout_at.to_rfc3339(),
            ],
        )?;
        Ok(req)
    }

    /// Resolve a pending approval. Returns `Ok(true)` if this call performed
    /// the transition, `Ok(false)` if another resolver already won (spec §8
    /// invariant #9: at most one approve/deny transitions a row out of
    /// pending).
    pub fn resolve_approval(&self, id: &str, decision: ApprovalStatus) -> CoreResult<bool> {
        let conn = self.conn.lock();
        let changed = conn.execute(
            "UPDATE approval_requests SET status = ?1, resolved_at = ?2 WHERE id = ?3 AND status = 'pending'",
            rusqlite::params![status_str(decision), chrono::Utc::now().to_rfc3339(), id],
        )?;
        Ok(changed == 1)
    }

    pub fn get_approval(&self, id: &str) -> CoreResult<Option<ApprovalRequest>> {
        let conn = self.conn.lock();
        let r = conn.query_row(
            "SELECT id, tool_name, params_json, context, status, session_id, created_at, resolved_at, timeout_at
             FROM approval_requests WHERE id = ?1",
            [id],
            row_to_approval,
        );
        optional(r)
    }

    /// Expire any pending approvals whose timeout has elapsed. Returns the
    /// ids expired.
    pub fn expire_overdue_approvals(&self) -> CoreResult<Vec<String>> {
        let conn = self.conn.lock();
        let now = chrono::Utc::now().to_rfc3339();
        let mut stmt = conn.prepare(
            "SELECT id FROM approval_requests WHERE status = 'pending' AND timeout_at <= ?1",
        )?;
        let ids: Vec<String> = stmt
            .query_map([&now], |r| r.get::<_, String>(0))?
            .filter_map(Result::ok)
            .collect();
        for id in &ids {
            conn.execute(
                "UPDATE approval_requests SET status = 'expired', resolved_at = ?1 WHERE id = ?2",
                rusqlite::params![now, id],
            )?;
        }
        Ok(ids)
    }

    pub fn cancel_pending_approvals_for_session(&self, session_id: &str) -> CoreResult<Vec<String>> {
        let conn = self.conn.lock();
        let now = chrono::Utc::now().to_rfc3339();
        let mut stmt = conn.prepare(
            "SELECT id FROM approval_requests WHERE status = 'pending' AND session_id = ?1",
        )?;
        let ids: Vec<String> = stmt
            .query_map([session_id], |r| r.get::<_, String>(0))?
            .filter_map(Result::ok)
            .collect();
        for id in &ids {
            conn.execute(
                "UPDATE approval_requests SET status = 'cancelled', resolved_at = ?1 WHERE id = ?2",
                rusqlite::params![now, id],
            )?;
        }
        Ok(ids)
    }

    pub fn list_pending_approvals(&self) -> CoreResult<Vec<ApprovalRequest>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT id, tool_name, params_json, context, status, session_id, created_at, resolved_at, timeout_at
             FROM approval_requests WHERE status = 'pending'",
        )?;
        let rows = stmt.query_map([], row_to_approval)?;
        let mut out = vec![];
        for r in rows {
            out.push(r?);
        }
        Ok(out)
    }
}

fn row_to_approval(row: &rusqlite::Row) -> rusqlite::Result<ApprovalRequest> {
    let params_raw: String = row.get(2)?;
    Ok(ApprovalRequest {
        id: row.get(0)?,
        tool_name: row.get(1)?,
        params_json: serde_json::from_str(&params_raw).unwrap_or(serde_json::json!({})),
        context: row.get(3)?,
        status: status_from_str(&row.get::<_, String>(4)?),
        session_id: row.get(5)?,
        created_at: parse_dt(&row.get::<_, String>(6)?),
        resolved_at: row.get::<_, Option<String>>(7)?.map(|s| parse_dt(&s)),
        timeout_at: parse_dt(&row.get::<_, String>(8)?),
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

    #[test]
    fn only_one_resolver_wins() {
        let store = Store::open_in_memory().unwrap();
        let req = store.create_approval("shell_execute", &serde_json::json!({}), "", "s1", 3600).unwrap();
        assert!(store.resolve_approval(&req.id, ApprovalStatus::Approved).unwrap());
        assert!(!store.resolve_approval(&req.id, ApprovalStatus::Denied).unwrap());
        let reloaded = store.get_approval(&req.id).unwrap().unwrap();
        assert_eq!(reloaded.status, ApprovalStatus::Approved);
    }

    #[test]
    fn overdue_approvals_expire() {
        let store = Store::open_in_memory().unwrap();
        let req = store.create_approval("x", &serde_json::json!({}), "", "s1", 0).unwrap();
        std::thread::sleep(std::time::Duration::from_millis(5));
        let expired = store.expire_overdue_approvals().unwrap();
        assert_eq!(expired, vec![req.id.clone()]);
        let reloaded = store.get_approval(&req.id).unwrap().unwrap();
        assert_eq!(reloaded.status, ApprovalStatus::Expired);
    }

    #[test]
    fn disconnect_cancels_session_approvals() {
        let store = Store::open_in_memory().unwrap();
        let req = store.create_approval("x", &serde_json::json!({}), "", "s1", 3600).unwrap();
        let cancelled = store.cancel_pending_approvals_for_session("s1").unwrap();
        assert_eq!(cancelled, vec![req.id]);
    }
}
