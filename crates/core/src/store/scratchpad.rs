// Store: Mind Scratchpad — single markdown row the autonomous mind reads
// and rewrites between wake cycles (spec §4.8).

use super::Store;
use crate::atoms::error::CoreResult;

impl Store {
    pub fn read_scratchpad(&self) -> CoreResult<String> {
        let conn = self.conn.lock();
        let r = conn.query_row(
            "SELECT markdown FROM mind_scratchpad WHERE id = 1",
            [],
            |row| row.get::<_, String>(0),
        );
        match r {
            Ok(v) => Ok(v),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(String::new()),
            Err(e) => Err(e.into()),
        }
    }

    pub fn write_scratchpad(&self, markdown: &str) -> CoreResult<()> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO mind_scratchpad (id, version, markdown, updated_at) VALUES (1, 1, ?1, ?2)
             ON CONFLICT(id) DO UPDATE SET markdown = ?1, version = version + 1, updated_at = ?2",
            rusqlite::params![markdown, chrono::Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scratchpad_defaults_empty_then_persists() {
        let store = Store::open_in_memory().unwrap();
        assert_eq!(store.read_scratchpad().unwrap(), "");
        store.write_scratchpad("# notes\n- thing to check later").unwrap();
        assert_eq!(store.read_scratchpad().unwrap(), "# notes\n- thing to check later");
        store.write_scratchpad("# notes\n- updated").unwrap();
        assert_eq!(store.read_scratchpad().unwrap(), "# notes\n- updated");
    }
}
