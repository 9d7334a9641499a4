//! Ephemeral per-session tier with lazy TTL expiry.
//!
//! Entries are scored by linear scan; a session holds few short-lived items,
//! so there is no index to train or rebuild. Expiry is checked on every read
//! and expired entries are pruned on writes or by [`HotTier::purge_expired`].

use crate::error::{Result, StoreError};
use crate::scoring::{self, normalized};
use crate::types::{Memory, MemoryPatch, SearchResult};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tracing::debug;

/// Default lifetime of a hot memory
pub const DEFAULT_TTL: Duration = Duration::from_secs(24 * 60 * 60);

struct HotEntry {
    memory: Memory,
    // None when now + ttl is not representable
    expires_at: Option<Instant>,
}

impl HotEntry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.map_or(true, |at| now < at)
    }
}

type SessionEntries = HashMap<String, HotEntry>;

pub struct HotTier {
    dimension: usize,
    default_ttl: Duration,
    sessions: RwLock<HashMap<String, SessionEntries>>,
}

impl HotTier {
    pub fn new(dimension: usize, default_ttl: Duration) -> Self {
        Self {
            dimension,
            default_ttl,
            sessions: RwLock::new(HashMap::new()),
        }
    }

    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    /// Number of live entries across all sessions
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.sessions
            .read()
            .values()
            .flat_map(|entries| entries.values())
            .filter(|e| e.is_live(now))
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Store a memory for `ttl` (the tier default when None)
    pub fn put(&self, session_id: &str, memory: Memory, ttl: Option<Duration>) -> Result<()> {
        if memory.embedding.len() != self.dimension {
            return Err(StoreError::invalid_vector(format!(
                "expected dimension {}, got {}",
                self.dimension,
                memory.embedding.len()
            )));
        }
        normalized(&memory.embedding)?;

        let now = Instant::now();
        let ttl = ttl.unwrap_or(self.default_ttl);
        let mut sessions = self.sessions.write();
        let entries = sessions.entry(session_id.to_string()).or_default();
        entries.retain(|_, e| e.is_live(now));

        debug!(session_id, id = %memory.id, ttl_secs = ttl.as_secs(), "hot put");
        entries.insert(
            memory.id.clone(),
            HotEntry {
                memory,
                expires_at: now.checked_add(ttl),
            },
        );
        Ok(())
    }

    pub fn get(&self, session_id: &str, id: &str) -> Result<Memory> {
        let now = Instant::now();
        self.sessions
            .read()
            .get(session_id)
            .and_then(|entries| entries.get(id))
            .filter(|e| e.is_live(now))
            .map(|e| e.memory.clone())
            .ok_or_else(|| StoreError::memory_not_found(id))
    }

    /// Live memories of a session, newest first
    pub fn list_by_session(&self, session_id: &str) -> Vec<Memory> {
        let now = Instant::now();
        let mut memories: Vec<Memory> = self
            .sessions
            .read()
            .get(session_id)
            .map(|entries| {
                entries
                    .values()
                    .filter(|e| e.is_live(now))
                    .map(|e| e.memory.clone())
                    .collect()
            })
            .unwrap_or_default();
        memories.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| a.id.cmp(&b.id)));
        memories
    }

    /// Remove one memory. False if absent or already expired.
    pub fn delete(&self, session_id: &str, id: &str) -> bool {
        let now = Instant::now();
        let mut sessions = self.sessions.write();
        let Some(entries) = sessions.get_mut(session_id) else {
            return false;
        };
        let removed = entries.remove(id).is_some_and(|e| e.is_live(now));
        if entries.is_empty() {
            sessions.remove(session_id);
        }
        removed
    }

    /// Patch a live memory in place. None if absent or expired.
    pub fn update(&self, session_id: &str, id: &str, patch: &MemoryPatch) -> Result<Option<Memory>> {
        if let Some(embedding) = &patch.embedding {
            if embedding.len() != self.dimension {
                return Err(StoreError::invalid_vector(format!(
                    "expected dimension {}, got {}",
                    self.dimension,
                    embedding.len()
                )));
            }
            normalized(embedding)?;
        }

        let now = Instant::now();
        let mut sessions = self.sessions.write();
        let Some(entry) = sessions
            .get_mut(session_id)
            .and_then(|entries| entries.get_mut(id))
            .filter(|e| e.is_live(now))
        else {
            return Ok(None);
        };
        entry.memory.apply(patch);
        Ok(Some(entry.memory.clone()))
    }

    /// Score every live memory of a session against `query`
    pub fn search(&self, session_id: &str, query: &[f32], k: usize) -> Result<Vec<SearchResult>> {
        let mut results = Vec::new();
        for memory in self.list_by_session(session_id) {
            let score = scoring::score(query, &memory.embedding)?;
            results.push(SearchResult { memory, score });
        }
        scoring::rank(&mut results, k);
        Ok(results)
    }

    /// Remove and return every live memory of a session
    pub fn drain_session(&self, session_id: &str) -> Vec<Memory> {
        let now = Instant::now();
        let Some(entries) = self.sessions.write().remove(session_id) else {
            return Vec::new();
        };
        let mut memories: Vec<Memory> = entries
            .into_values()
            .filter(|e| e.is_live(now))
            .map(|e| e.memory)
            .collect();
        memories.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        memories
    }

    /// Drop expired entries everywhere, returning (session id, memory id) pairs
    pub fn purge_expired(&self) -> Vec<(String, String)> {
        let now = Instant::now();
        let mut purged = Vec::new();
        let mut sessions = self.sessions.write();
        for (session_id, entries) in sessions.iter_mut() {
            entries.retain(|id, e| {
                let live = e.is_live(now);
                if !live {
                    purged.push((session_id.clone(), id.clone()));
                }
                live
            });
        }
        sessions.retain(|_, entries| !entries.is_empty());
        if !purged.is_empty() {
            debug!(count = purged.len(), "purged expired hot memories");
        }
        purged
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Metadata;
    use serde_json::json;

    fn memory(text: &str, embedding: Vec<f32>) -> Memory {
        Memory::new(text, embedding, Metadata::new(), Some("s1".to_string()))
    }

    #[test]
    fn test_put_get_list() {
        let hot = HotTier::new(2, DEFAULT_TTL);
        let m = memory("note", vec![1.0, 0.0]);
        let id = m.id.clone();
        hot.put("s1", m, None).unwrap();

        assert_eq!(hot.get("s1", &id).unwrap().text, "note");
        assert!(hot.get("s2", &id).unwrap_err().is_not_found());
        assert_eq!(hot.list_by_session("s1").len(), 1);
        assert!(hot.list_by_session("s2").is_empty());
        assert_eq!(hot.len(), 1);
    }

    #[test]
    fn test_expired_entries_are_invisible() {
        let hot = HotTier::new(2, DEFAULT_TTL);
        let m = memory("gone", vec![1.0, 0.0]);
        let id = m.id.clone();
        hot.put("s1", m, Some(Duration::ZERO)).unwrap();

        assert!(hot.get("s1", &id).is_err());
        assert!(hot.list_by_session("s1").is_empty());
        assert!(hot.search("s1", &[1.0, 0.0], 5).unwrap().is_empty());
        assert!(hot.drain_session("s1").is_empty());
        assert!(hot.is_empty());
    }

    #[test]
    fn test_purge_reports_expired() {
        let hot = HotTier::new(2, DEFAULT_TTL);
        let expired = memory("old", vec![1.0, 0.0]);
        let expired_id = expired.id.clone();
        hot.put("s1", expired, Some(Duration::ZERO)).unwrap();
        hot.put("s2", memory("fresh", vec![1.0, 0.0]), None).unwrap();

        let purged = hot.purge_expired();
        assert_eq!(purged, vec![("s1".to_string(), expired_id)]);
        assert_eq!(hot.len(), 1);
    }

    #[test]
    fn test_update_in_place_merges_metadata() {
        let hot = HotTier::new(2, DEFAULT_TTL);
        let mut m = memory("before", vec![1.0, 0.0]);
        m.metadata.insert("keep".to_string(), json!(1));
        let id = m.id.clone();
        hot.put("s1", m, None).unwrap();

        let mut metadata = Metadata::new();
        metadata.insert("added".to_string(), json!("yes"));
        let patch = MemoryPatch {
            text: Some("after".to_string()),
            metadata: Some(metadata),
            ..Default::default()
        };
        let updated = hot.update("s1", &id, &patch).unwrap().unwrap();
        assert_eq!(updated.text, "after");
        assert_eq!(updated.metadata["keep"], json!(1));
        assert_eq!(updated.metadata["added"], json!("yes"));
        assert!(hot.update("s1", "missing", &patch).unwrap().is_none());
    }

    #[test]
    fn test_search_ranks_and_thresholds() {
        let hot = HotTier::new(2, DEFAULT_TTL);
        hot.put("s1", memory("exact", vec![1.0, 0.0]), None).unwrap();
        hot.put("s1", memory("near", vec![0.8, 0.6]), None).unwrap();
        hot.put("s1", memory("off", vec![0.0, 1.0]), None).unwrap();

        let results = hot.search("s1", &[1.0, 0.0], 1).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].memory.text, "exact");

        let results = hot.search("s1", &[1.0, 0.0], 10).unwrap();
        assert_eq!(results.len(), 2);
    }

    #[test]
    fn test_drain_removes_session() {
        let hot = HotTier::new(2, DEFAULT_TTL);
        hot.put("s1", memory("a", vec![1.0, 0.0]), None).unwrap();
        hot.put("s1", memory("b", vec![0.0, 1.0]), None).unwrap();
        hot.put("s2", memory("c", vec![0.0, 1.0]), None).unwrap();

        let drained = hot.drain_session("s1");
        assert_eq!(drained.len(), 2);
        assert!(hot.list_by_session("s1").is_empty());
        assert!(hot.drain_session("s1").is_empty());
        assert_eq!(hot.len(), 1);
    }

    #[test]
    fn test_delete() {
        let hot = HotTier::new(2, DEFAULT_TTL);
        let m = memory("x", vec![1.0, 0.0]);
        let id = m.id.clone();
        hot.put("s1", m, None).unwrap();
        assert!(hot.delete("s1", &id));
        assert!(!hot.delete("s1", &id));
    }
}
