// Store: Identity (single row) + Identity Evolution (append-only log).
// `creator` is immutable by convention: callers never update it after the
// first write (spec §4.7).

use super::Store;
use crate::atoms::error::CoreResult;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Identity {
    pub creator: String,
    pub display_name: String,
    pub purpose: String,
    pub values: Vec<String>,
    pub beliefs: Vec<String>,
    pub curiosities: Vec<String>,
    pub boundaries: Vec<String>,
    pub capabilities: Vec<String>,
    pub personality: String,
    pub communication_style: String,
    pub version: i64,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentityEvolutionEntry {
    pub trigger: String,
    pub field: String,
    pub old: String,
    pub new: String,
    pub reason: String,
    pub confidence: f64,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

impl Store {
    pub fn init_identity(&self, creator: &str, display_name: &str) -> CoreResult<Identity> {
        let conn = self.conn.lock();
        let exists: bool = conn
            .query_row("SELECT COUNT(*) FROM identity WHERE id = 1", [], |r| r.get::<_, i64>(0))
            .map(|c| c > 0)
            .unwrap_or(false);
        if exists {
            drop(conn);
            return Ok(self.get_identity()?.expect("identity row known to exist"));
        }
        let now = chrono::Utc::now();
        conn.execute(
            "INSERT INTO identity (id, creator, display_name, updated_at) VALUES (1, ?1, ?2, ?3)",
            rusqlite::params![creator, display_name, now.to_rfc3339()],
        )?;
        drop(conn);
        Ok(self.get_identity()?.expect("identity row just inserted"))
    }

    pub fn get_identity(&self) -> CoreResult<Option<Identity>> {
        let conn = self.conn.lock();
        let r = conn.query_row(
            "SELECT creator, display_name, purpose, \"values\", beliefs, curiosities, boundaries, capabilities, personality, communication_style, version, updated_at
             FROM identity WHERE id = 1",
            [],
            row_to_identity,
        );
        match r {
            Ok(v) => Ok(Some(v)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Update a single identity field and record the change in the
    /// evolution log, inside one transaction. `field` must not be
    /// "creator" — the caller is responsible for that invariant.
    pub fn evolve_identity(
        &self,
        field: &str,
        old: &str,
        new: &str,
        trigger: &str,
        reason: &str,
        confidence: f64,
    ) -> CoreResult<()> {
        debug_assert_ne!(field, "creator", "creator must never be evolved");
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        let column = match field {
            "display_name" | "purpose" | "personality" | "communication_style" => field,
            "values" | "beliefs" | "curiosities" | "boundaries" | "capabilities" => field,
            other => return Err(crate::atoms::error::CoreError::Other(format!("unknown identity field: {other}"))),
        };
        let now = chrono::Utc::now().to_rfc3339();
        tx.execute(
            &format!("UPDATE identity SET \"{column}\" = ?1, version = version + 1, updated_at = ?2 WHERE id = 1"),
            rusqlite::params![new, now],
        )?;
        tx.execute(
            "INSERT INTO identity_evolution (trigger, field, old, new, reason, confidence, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            rusqlite::params![trigger, field, old, new, reason, confidence, now],
        )?;
        tx.commit()?;
        Ok(())
    }

    /// Wipes the identity row and its evolution log so the next `init_identity`
    /// starts a fresh identity (CLI `identity reset`). Sessions, goals, and
    /// memory are untouched.
    pub fn reset_identity(&self) -> CoreResult<()> {
        let conn = self.conn.lock();
        conn.execute("DELETE FROM identity_evolution", [])?;
        conn.execute("DELETE FROM identity WHERE id = 1", [])?;
        Ok(())
    }

    pub fn list_identity_evolution(&self) -> CoreResult<Vec<IdentityEvolutionEntry>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT trigger, field, old, new, reason, confidence, created_at FROM identity_evolution ORDER BY id ASC",
        )?;
        let rows = stmt.query_map([], |row| {
            let created_raw: String = row.get(6)?;
            Ok(IdentityEvolutionEntry {
                trigger: row.get(0)?,
                field: row.get(1)?,
                old: row.get(2)?,
                new: row.get(3)?,
                reason: row.get(4)?,
                confidence: row.get(5)?,
                created_at: chrono::DateTime::parse_from_rfc3339(&created_raw)
                    .map(|d| d.with_timezone(&chrono::Utc))
                    .unwrap_or_else(|_| chrono::Utc::now()),
            })
        })?;
        let mut out = vec![];
        for r in rows {
            out.push(r?);
        }
        Ok(out)
    }
}

fn row_to_identity(row: &rusqlite::Row) -> rusqlite::Result<Identity> {
    let values_raw: String = row.get(4)?;
    let beliefs_raw: String = row.get(5)?;
    let curiosities_raw: String = row.get(6)?;
    let boundaries_raw: String = row.get(7)?;
    let capabilities_raw: String = row.get(8)?;
    let updated_raw: String = row.get(11)?;
    Ok(Identity {
        creator: row.get(0)?,
        display_name: row.get(1)?,
        purpose: row.get(2)?,
        values: serde_json::from_str(&values_raw).unwrap_or_default(),
        beliefs: serde_json::from_str(&beliefs_raw).unwrap_or_default(),
        curiosities: serde_json::from_str(&curiosities_raw).unwrap_or_default(),
        boundaries: serde_json::from_str(&boundaries_raw).unwrap_or_default(),
        capabilities: serde_json::from_str(&capabilities_raw).unwrap_or_default(),
        personality: row.get(9)?,
        communication_style: row.get(10)?,
        version: row.get(3)?,
        updated_at: chrono::DateTime::parse_from_rfc3339(&updated_raw)
            .map(|d| d.with_timezone(&chrono::Utc))
            .unwrap_or_else(|_| chrono::Utc::now()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_is_idempotent_and_creator_sticks() {
        let store = Store::open_in_memory().unwrap();
        let a = store.init_identity("owner-1", "Agent").unwrap();
        let b = store.init_identity("someone-else", "Agent").unwrap();
        assert_eq!(a.creator, "owner-1");
        assert_eq!(b.creator, "owner-1");
    }

    #[test]
    fn evolution_is_recorded_and_version_bumps() {
        let store = Store::open_in_memory().unwrap();
        store.init_identity("owner-1", "Agent").unwrap();
        store
            .evolve_identity("purpose", "", "help with research", "reflection", "observed pattern", 0.8)
            .unwrap();
        let reloaded = store.get_identity().unwrap().unwrap();
        assert_eq!(reloaded.purpose, "help with research");
        assert_eq!(reloaded.version, 2);
        let log = store.list_identity_evolution().unwrap();
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].field, "purpose");
    }

    #[test]
    fn reset_clears_identity_and_its_evolution_log() {
        let store = Store::open_in_memory().unwrap();
        store.init_identity("owner-1", "Agent").unwrap();
        store.evolve_identity("purpose", "", "help", "reflection", "x", 0.5).unwrap();
        store.reset_identity().unwrap();
        assert!(store.get_identity().unwrap().is_none());
        assert!(store.list_identity_evolution().unwrap().is_empty());
    }
}
