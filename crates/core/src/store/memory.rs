// Store: Memory entity — write-once summaries of completed tasks, plus the
// Knowledge Chunk side-table used for document ingestion (spec §4.5).

use super::Store;
use crate::atoms::error::CoreResult;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryRow {
    pub id: String,
    pub task_id: String,
    pub summary: String,
    pub outcome: String,
    pub embedding: Option<Vec<f32>>,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnowledgeChunk {
    pub id: String,
    pub file_path: String,
    pub heading_path: String,
    pub content: String,
    pub tags: Vec<String>,
    pub embedding: Option<Vec<f32>>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

fn encode_embedding(v: &[f32]) -> Vec<u8> {
    v.iter().flat_map(|f| f.to_le_bytes()).collect()
}

fn decode_embedding(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect()
}

impl Store {
    /// Write a memory row once, at task completion. Never updated afterward.
    pub fn record_memory(
        &self,
        task_id: &str,
        summary: &str,
        outcome: &str,
        embedding: Option<&[f32]>,
    ) -> CoreResult<String> {
        let id = uuid::Uuid::new_v4().to_string();
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO memories (id, task_id, summary, outcome, embedding, created_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            rusqlite::params![
                id,
                task_id,
                summary,
                outcome,
                embedding.map(encode_embedding),
                chrono::Utc::now().to_rfc3339(),
            ],
        )?;
        Ok(id)
    }

    pub fn list_memories_for_task(&self, task_id: &str) -> CoreResult<Vec<MemoryRow>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT id, task_id, summary, outcome, embedding, created_at FROM memories WHERE task_id = ?1",
        )?;
        let rows = stmt.query_map([task_id], row_to_memory)?;
        let mut out = vec![];
        for r in rows {
            out.push(r?);
        }
        Ok(out)
    }

    pub fn recent_memories(&self, limit: i64) -> CoreResult<Vec<MemoryRow>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT id, task_id, summary, outcome, embedding, created_at FROM memories ORDER BY created_at DESC LIMIT ?1",
        )?;
        let rows = stmt.query_map([limit], row_to_memory)?;
        let mut out = vec![];
        for r in rows {
            out.push(r?);
        }
        Ok(out)
    }

    pub fn upsert_knowledge_chunk(
        &self,
        id: &str,
        file_path: &str,
        heading_path: &str,
        content: &str,
        tags: &[String],
        embedding: Option<&[f32]>,
    ) -> CoreResult<()> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO knowledge_chunks (id, file_path, heading_path, content, tags, embedding, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
             ON CONFLICT(id) DO UPDATE SET content = ?4, tags = ?5, embedding = ?6, updated_at = ?7",
            rusqlite::params![
                id,
                file_path,
                heading_path,
                content,
                serde_json::to_string(tags)?,
                embedding.map(encode_embedding),
                chrono::Utc::now().to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    pub fn list_knowledge_chunks(&self) -> CoreResult<Vec<KnowledgeChunk>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT id, file_path, heading_path, content, tags, embedding, updated_at FROM knowledge_chunks",
        )?;
        let rows = stmt.query_map([], |row| {
            let tags_raw: String = row.get(4)?;
            let embedding_raw: Option<Vec<u8>> = row.get(5)?;
            let updated_raw: String = row.get(6)?;
            Ok(KnowledgeChunk {
                id: row.get(0)?,
                file_path: row.get(1)?,
                heading_path: row.get(2)?,
                content: row.get(3)?,
                tags: serde_json::from_str(&tags_raw).unwrap_or_default(),
                embedding: embedding_raw.as_deref().map(decode_embedding),
                updated_at: chrono::DateTime::parse_from_rfc3339(&updated_raw)
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

fn row_to_memory(row: &rusqlite::Row) -> rusqlite::Result<MemoryRow> {
    let embedding_raw: Option<Vec<u8>> = row.get(4)?;
    let created_raw: String = row.get(5)?;
    Ok(MemoryRow {
        id: row.get(0)?,
        task_id: row.get(1)?,
        summary: row.get(2)?,
        outcome: row.get(3)?,
        embedding: embedding_raw.as_deref().map(decode_embedding),
        created_at: chrono::DateTime::parse_from_rfc3339(&created_raw)
            .map(|d| d.with_timezone(&chrono::Utc))
            .unwrap_or_else(|_| chrono::Utc::now()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_roundtrips_with_embedding() {
        let store = Store::open_in_memory().unwrap();
        let emb = vec![0.1f32, 0.2, -0.3];
        let id = store.record_memory("task-1", "did a thing", "success", Some(&emb)).unwrap();
        let rows = store.list_memories_for_task("task-1").unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].id, id);
        let got = rows[0].embedding.as_ref().unwrap();
        assert!((got[0] - 0.1).abs() < 1e-6);
    }

    #[test]
    fn knowledge_chunk_upsert_overwrites_content() {
        let store = Store::open_in_memory().unwrap();
        store.upsert_knowledge_chunk("c1", "notes.md", "intro", "v1", &["a".into()], None).unwrap();
        store.upsert_knowledge_chunk("c1", "notes.md", "intro", "v2", &["b".into()], None).unwrap();
        let all = store.list_knowledge_chunks().unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].content, "v2");
    }
}
