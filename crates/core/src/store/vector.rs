// Store: hybrid retrieval over memories and knowledge chunks — keyword
// overlap scoring blended with cosine similarity against stored embeddings
// (spec §4.5 "Retrieval"). No external vector index: the corpus size this
// runtime targets fits a linear scan comfortably.

use super::memory::{KnowledgeChunk, MemoryRow};
use super::Store;
use crate::atoms::error::CoreResult;

#[derive(Debug, Clone)]
pub struct ScoredChunk {
    pub chunk: KnowledgeChunk,
    pub score: f32,
}

#[derive(Debug, Clone)]
pub struct ScoredMemory {
    pub memory: MemoryRow,
    pub score: f32,
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}

fn keyword_overlap(query: &str, text: &str) -> f32 {
    let query_terms: std::collections::HashSet<String> =
        query.to_lowercase().split_whitespace().map(str::to_string).collect();
    if query_terms.is_empty() {
        return 0.0;
    }
    let text_lower = text.to_lowercase();
    let hits = query_terms.iter().filter(|t| text_lower.contains(t.as_str())).count();
    hits as f32 / query_terms.len() as f32
}

/// Blend keyword overlap and embedding cosine similarity. When no query
/// embedding is available the score is keyword-only.
fn blended_score(query: &str, text: &str, query_embedding: Option<&[f32]>, candidate_embedding: Option<&[f32]>) -> f32 {
    let kw = keyword_overlap(query, text);
    match (query_embedding, candidate_embedding) {
        (Some(q), Some(c)) => 0.4 * kw + 0.6 * cosine_similarity(q, c),
        _ => kw,
    }
}

impl Store {
    pub fn search_knowledge_chunks(
        &self,
        query: &str,
        query_embedding: Option<&[f32]>,
        top_k: usize,
    ) -> CoreResult<Vec<ScoredChunk>> {
        let chunks = self.list_knowledge_chunks()?;
        let mut scored: Vec<ScoredChunk> = chunks
            .into_iter()
            .map(|chunk| {
                let score = blended_score(query, &chunk.content, query_embedding, chunk.embedding.as_deref());
                ScoredChunk { chunk, score }
            })
            .filter(|s| s.score > 0.0)
            .collect();
        scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(top_k);
        Ok(scored)
    }

    pub fn search_memories(
        &self,
        query: &str,
        query_embedding: Option<&[f32]>,
        top_k: usize,
    ) -> CoreResult<Vec<ScoredMemory>> {
        let memories = self.recent_memories(500)?;
        let mut scored: Vec<ScoredMemory> = memories
            .into_iter()
            .map(|memory| {
                let score = blended_score(query, &memory.summary, query_embedding, memory.embedding.as_deref());
                ScoredMemory { memory, score }
            })
            .filter(|s| s.score > 0.0)
            .collect();
        scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(top_k);
        Ok(scored)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cosine_similarity_identical_vectors_is_one() {
        let v = vec![1.0, 2.0, 3.0];
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn cosine_similarity_orthogonal_is_zero() {
        assert_eq!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]), 0.0);
    }

    #[test]
    fn keyword_search_ranks_exact_match_higher() {
        let store = Store::open_in_memory().unwrap();
        store.upsert_knowledge_chunk("c1", "a.md", "", "rust ownership and borrowing rules", &[], None).unwrap();
        store.upsert_knowledge_chunk("c2", "b.md", "", "python list comprehensions", &[], None).unwrap();
        let results = store.search_knowledge_chunks("rust ownership", None, 5).unwrap();
        assert_eq!(results[0].chunk.id, "c1");
    }

    #[test]
    fn search_respects_top_k() {
        let store = Store::open_in_memory().unwrap();
        for i in 0..10 {
            store
                .upsert_knowledge_chunk(&format!("c{i}"), "f.md", "", "shared keyword content", &[], None)
                .unwrap();
        }
        let results = store.search_knowledge_chunks("shared keyword", None, 3).unwrap();
        assert_eq!(results.len(), 3);
    }
}
