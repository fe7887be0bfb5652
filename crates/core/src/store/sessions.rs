// Store: Session entity (spec §3). Unique on (channel, user_id); created on
// first inbound message; destroyed never (archived by age, not implemented
// as deletion here).

use super::Store;
use crate::atoms::error::CoreResult;
use crate::atoms::types::{AuthorityTier, Turn};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub session_id: String,
    pub channel: String,
    pub user_id: String,
    pub authority_tier: AuthorityTier,
    pub conversation: Vec<Turn>,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub last_active: chrono::DateTime<chrono::Utc>,
    pub metadata: serde_json::Value,
}

fn tier_str(t: AuthorityTier) -> &'static str {
    match t {
        AuthorityTier::Owner => "owner",
        AuthorityTier::Trusted => "trusted",
        AuthorityTier::Public => "public",
    }
}

fn tier_from_str(s: &str) -> AuthorityTier {
    match s {
        "owner" => AuthorityTier::Owner,
        "trusted" => AuthorityTier::Trusted,
        _ => AuthorityTier::Public,
    }
}

impl Store {
    /// connect(channel, user_id) -> session (spec §4.1). Idempotent: reuses
    /// an existing row for the (channel, user_id) pair.
    pub fn connect_session(
        &self,
        channel: &str,
        user_id: &str,
        tier: AuthorityTier,
    ) -> CoreResult<Session> {
        if let Some(existing) = self.get_session_by_identity(channel, user_id)? {
            return Ok(existing);
        }
        let now = chrono::Utc::now();
        let session = Session {
            session_id: uuid::Uuid::new_v4().to_string(),
            channel: channel.to_string(),
            user_id: user_id.to_string(),
            authority_tier: tier,
            conversation: vec![],
            created_at: now,
            last_active: now,
            metadata: serde_json::json!({}),
        };
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO sessions (session_id, channel, user_id, authority_tier, conversation, created_at, last_active, metadata)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            rusqlite::params![
                session.session_id,
                session.channel,
                session.user_id,
                tier_str(tier),
                serde_json::to_string(&session.conversation)?,
                session.created_at.to_rfc3339(),
                session.last_active.to_rfc3339(),
                session.metadata.to_string(),
            ],
        )?;
        Ok(session)
    }

    pub fn get_session_by_identity(&self, channel: &str, user_id: &str) -> CoreResult<Option<Session>> {
        let conn = self.conn.lock();
        let r = conn.query_row(
            "SELECT session_id, channel, user_id, authority_tier, conversation, created_at, last_active, metadata
             FROM sessions WHERE channel = ?1 AND user_id = ?2",
            rusqlite::params![channel, user_id],
            row_to_session,
        );
        optional(r)
    }

    pub fn get_session(&self, session_id: &str) -> CoreResult<Option<Session>> {
        let conn = self.conn.lock();
        let r = conn.query_row(
            "SELECT session_id, channel, user_id, authority_tier, conversation, created_at, last_active, metadata
             FROM sessions WHERE session_id = ?1",
            [session_id],
            row_to_session,
        );
        optional(r)
    }

    /// Append a turn to a session's conversation, trimming to
    /// `max_len` by dropping the oldest user/assistant pairs while keeping
    /// any leading system anchors (spec §3 invariant).
    pub fn append_turn(&self, session_id: &str, turn: Turn, max_len: usize) -> CoreResult<()> {
        let conn = self.conn.lock();
        let raw: String = conn.query_row(
            "SELECT conversation FROM sessions WHERE session_id = ?1",
            [session_id],
            |r| r.get(0),
        )?;
        let mut conv: Vec<Turn> = serde_json::from_str(&raw)?;
        conv.push(turn);
        trim_conversation(&mut conv, max_len);
        let now = chrono::Utc::now().to_rfc3339();
        conn.execute(
            "UPDATE sessions SET conversation = ?1, last_active = ?2 WHERE session_id = ?3",
            rusqlite::params![serde_json::to_string(&conv)?, now, session_id],
        )?;
        Ok(())
    }

    pub fn list_sessions(&self) -> CoreResult<Vec<Session>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT session_id, channel, user_id, authority_tier, conversation, created_at, last_active, metadata FROM sessions",
        )?;
        let rows = stmt.query_map([], row_to_session)?;
        let mut out = vec![];
        for r in rows {
            out.push(r?);
        }
        Ok(out)
    }
}

/// Trim oldest user/assistant pairs, preserving leading `Role::System` turns.
fn trim_conversation(conv: &mut Vec<Turn>, max_len: usize) {
    use crate::atoms::types::Role;
    if conv.len() <= max_len {
        return;
    }
    let anchor_count = conv.iter().take_while(|t| t.role == Role::System).count();
    while conv.len() > max_len && conv.len() > anchor_count {
        conv.remove(anchor_count);
    }
}

fn row_to_session(row: &rusqlite::Row) -> rusqlite::Result<Session> {
    let conv_raw: String = row.get(4)?;
    let meta_raw: String = row.get(7)?;
    let created_raw: String = row.get(5)?;
    let active_raw: String = row.get(6)?;
    Ok(Session {
        session_id: row.get(0)?,
        channel: row.get(1)?,
        user_id: row.get(2)?,
        authority_tier: tier_from_str(&row.get::<_, String>(3)?),
        conversation: serde_json::from_str(&conv_raw).unwrap_or_default(),
        created_at: chrono::DateTime::parse_from_rfc3339(&created_raw)
            .map(|d| d.with_timezone(&chrono::Utc))
            .unwrap_or_else(|_| chrono::Utc::now()),
        last_active: chrono::DateTime::parse_from_rfc3339(&active_raw)
            .map(|d| d.with_timezone(&chrono::Utc))
            .unwrap_or_else(|_| chrono::Utc::now()),
        metadata: serde_json::from_str(&meta_raw).unwrap_or(serde_json::json!({})),
    })
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
    use crate::atoms::types::Role;

    fn turn(role: Role, text: &str) -> Turn {
        Turn {
            role,
            content: text.to_string(),
            tool_calls: vec![],
            tool_call_id: None,
            attachments: vec![],
            created_at: chrono::Utc::now(),
        }
    }

    #[test]
    fn connect_is_idempotent_per_channel_user() {
        let store = Store::open_in_memory().unwrap();
        let a = store.connect_session("cli", "u1", AuthorityTier::Owner).unwrap();
        let b = store.connect_session("cli", "u1", AuthorityTier::Owner).unwrap();
        assert_eq!(a.session_id, b.session_id);
    }

    #[test]
    fn different_users_get_different_sessions() {
        let store = Store::open_in_memory().unwrap();
        let a = store.connect_session("cli", "u1", AuthorityTier::Owner).unwrap();
        let b = store.connect_session("cli", "u2", AuthorityTier::Public).unwrap();
        assert_ne!(a.session_id, b.session_id);
    }

    #[test]
    fn conversation_trims_oldest_but_keeps_system_anchor() {
        let store = Store::open_in_memory().unwrap();
        let s = store.connect_session("cli", "u1", AuthorityTier::Owner).unwrap();
        store.append_turn(&s.session_id, turn(Role::System, "anchor"), 3).unwrap();
        for i in 0..10 {
            store.append_turn(&s.session_id, turn(Role::User, &format!("msg{i}")), 3).unwrap();
        }
        let reloaded = store.get_session(&s.session_id).unwrap().unwrap();
        assert!(reloaded.conversation.len() <= 3);
        assert_eq!(reloaded.conversation[0].role, Role::System);
        assert_eq!(reloaded.conversation[0].content, "anchor");
    }

    #[test]
    fn append_order_is_strictly_chronological() {
        let store = Store::open_in_memory().unwrap();
        let s = store.connect_session("cli", "u1", AuthorityTier::Owner).unwrap();
        for i in 0..5 {
            store.append_turn(&s.session_id, turn(Role::User, &format!("m{i}")), 50).unwrap();
        }
        let reloaded = store.get_session(&s.session_id).unwrap().unwrap();
        for w in reloaded.conversation.windows(2) {
            assert!(w[0].created_at <= w[1].created_at);
        }
    }
}
