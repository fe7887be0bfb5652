// Persistence & indexing (spec §4.5). The store is an embedded relational
// database (bundled SQLite via rusqlite) with row-level JSON columns and a
// vector side-table for embeddings. All state transitions that cross a
// user-visible boundary are committed synchronously before the next step
// runs (spec §4.5 "Durability").

pub mod approvals;
pub mod goals;
pub mod identity;
pub mod memory;
pub mod payments;
pub mod schema;
pub mod scheduled;
pub mod scratchpad;
pub mod sessions;
pub mod usage;
pub mod vector;

use crate::atoms::error::CoreResult;
use parking_lot::Mutex;
use rusqlite::Connection;
use std::path::Path;

/// The embedded relational store. Single-writer via an internal mutex,
/// matching the teacher's `SessionStore` pattern — `rusqlite::Connection`
/// is `!Sync`, so all access goes through one lock rather than a pool.
pub struct Store {
    pub(crate) conn: Mutex<Connection>,
}

impl Store {
    /// Open (creating if absent) the on-disk store at `path`, enable WAL for
    /// concurrent readers, and run pending migrations.
    pub fn open(path: &Path) -> CoreResult<Self> {
        let mut conn = Connection::open(path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        schema::run_migrations(&mut conn)?;
        Ok(Store { conn: Mutex::new(conn) })
    }

    /// In-memory store for tests and ephemeral CLI invocations.
    pub fn open_in_memory() -> CoreResult<Self> {
        let mut conn = Connection::open_in_memory()?;
        schema::run_migrations(&mut conn)?;
        Ok(Store { conn: Mutex::new(conn) })
    }

    pub fn get_config(&self, key: &str) -> CoreResult<Option<String>> {
        let conn = self.conn.lock();
        let r = conn.query_row("SELECT value FROM kv_config WHERE key = ?1", [key], |row| {
            row.get::<_, String>(0)
        });
        match r {
            Ok(v) => Ok(Some(v)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    pub fn set_config(&self, key: &str, value: &str) -> CoreResult<()> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO kv_config (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = ?2",
            rusqlite::params![key, value],
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kv_config_roundtrip() {
        let store = Store::open_in_memory().unwrap();
        assert_eq!(store.get_config("missing").unwrap(), None);
        store.set_config("k", "v1").unwrap();
        assert_eq!(store.get_config("k").unwrap(), Some("v1".into()));
        store.set_config("k", "v2").unwrap();
        assert_eq!(store.get_config("k").unwrap(), Some("v2".into()));
    }
}
