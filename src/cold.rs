//! Durable tier: SQLite rows mirrored in memory and indexed for k-NN search.

use crate::db::Database;
use crate::error::{Result, StoreError};
use crate::index::{IndexKind, VectorIndex};
use crate::scoring::{self, normalized};
use crate::types::{Memory, MemoryPatch, SearchResult};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

pub struct ColdTier {
    db: Arc<Database>,
    records: RwLock<HashMap<String, Memory>>,
    index: VectorIndex,
    // Held across the row write, the record map and the index so that
    // all three change in the same order for every mutation.
    writer: Mutex<()>,
}

impl ColdTier {
    /// Load every persisted memory and build the index once
    pub fn open(db: Arc<Database>, dimension: usize, kind: IndexKind) -> Result<Self> {
        let memories = db.load_memories()?;
        let index = VectorIndex::new(dimension, kind);
        index.build(
            memories
                .iter()
                .map(|m| (m.id.clone(), m.embedding.clone()))
                .collect(),
        )?;
        debug!(count = memories.len(), "cold tier loaded");

        Ok(Self {
            db,
            records: RwLock::new(memories.into_iter().map(|m| (m.id.clone(), m)).collect()),
            index,
            writer: Mutex::new(()),
        })
    }

    pub fn dimension(&self) -> usize {
        self.index.dimension()
    }

    pub fn index_kind(&self) -> IndexKind {
        self.index.kind()
    }

    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn check_vector(&self, embedding: &[f32]) -> Result<()> {
        if embedding.len() != self.dimension() {
            return Err(StoreError::invalid_vector(format!(
                "expected dimension {}, got {}",
                self.dimension(),
                embedding.len()
            )));
        }
        normalized(embedding).map(|_| ())
    }

    /// Store a memory under its own id
    pub fn put(&self, memory: Memory) -> Result<()> {
        self.check_vector(&memory.embedding)?;
        let _writer = self.writer.lock();

        self.db.put_memory(&memory)?;
        self.index.add(&memory.id, &memory.embedding)?;
        self.records.write().insert(memory.id.clone(), memory);
        Ok(())
    }

    pub fn get(&self, id: &str) -> Result<Memory> {
        self.records
            .read()
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::memory_not_found(id))
    }

    /// Remove a memory, rebuilding the index. False if absent.
    pub fn delete(&self, id: &str) -> Result<bool> {
        let _writer = self.writer.lock();
        if !self.records.read().contains_key(id) {
            return Ok(false);
        }

        self.db.delete_memory(id)?;
        self.records.write().remove(id);
        self.index.remove(id)?;
        Ok(true)
    }

    /// Patch a memory; a new embedding rebuilds the index. None if absent.
    pub fn update(&self, id: &str, patch: &MemoryPatch) -> Result<Option<Memory>> {
        if let Some(embedding) = &patch.embedding {
            self.check_vector(embedding)?;
        }
        let _writer = self.writer.lock();

        let Some(mut memory) = self.records.read().get(id).cloned() else {
            return Ok(None);
        };
        memory.apply(patch);

        self.db.put_memory(&memory)?;
        self.records.write().insert(id.to_string(), memory.clone());
        if patch.embedding.is_some() {
            self.index.update(id, &memory.embedding)?;
        }
        Ok(Some(memory))
    }

    /// Up to `k` memories scoring above the threshold, best first
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<SearchResult>> {
        let hits = match self.index.search(query, k) {
            Ok(hits) => hits,
            Err(StoreError::EmptyIndex) => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };

        let records = self.records.read();
        let mut results = Vec::with_capacity(hits.len());
        for (id, _distance) in hits {
            // Deleted between the index read and this one.
            let Some(memory) = records.get(&id) else {
                continue;
            };
            let score = scoring::score(query, &memory.embedding)?;
            results.push(SearchResult {
                memory: memory.clone(),
                score,
            });
        }
        drop(records);

        scoring::rank(&mut results, k);
        Ok(results)
    }

    /// All memories, or those migrated from one session; newest first
    pub fn list(&self, session_id: Option<&str>) -> Vec<Memory> {
        let mut memories: Vec<Memory> = self
            .records
            .read()
            .values()
            .filter(|m| session_id.map_or(true, |s| m.session_id.as_deref() == Some(s)))
            .cloned()
            .collect();
        memories.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| a.id.cmp(&b.id)));
        memories
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Metadata;

    fn tier() -> ColdTier {
        ColdTier::open(Arc::new(Database::in_memory().unwrap()), 2, IndexKind::Flat).unwrap()
    }

    fn memory(text: &str, embedding: Vec<f32>) -> Memory {
        Memory::new(text, embedding, Metadata::new(), None)
    }

    #[test]
    fn test_put_get_delete() {
        let cold = tier();
        let m = memory("alpha", vec![1.0, 0.0]);
        let id = m.id.clone();
        cold.put(m).unwrap();

        assert_eq!(cold.get(&id).unwrap().text, "alpha");
        assert!(cold.delete(&id).unwrap());
        assert!(!cold.delete(&id).unwrap());
        assert!(cold.get(&id).unwrap_err().is_not_found());
        assert!(cold.search(&[1.0, 0.0], 5).unwrap().is_empty());
    }

    #[test]
    fn test_put_rejects_bad_vectors() {
        let cold = tier();
        assert!(matches!(
            cold.put(memory("wrong", vec![1.0, 0.0, 0.0])),
            Err(StoreError::InvalidVector(_))
        ));
        assert!(matches!(
            cold.put(memory("zero", vec![0.0, 0.0])),
            Err(StoreError::InvalidVector(_))
        ));
        assert!(cold.is_empty());
    }

    #[test]
    fn test_search_on_empty_tier_is_empty() {
        assert!(tier().search(&[1.0, 0.0], 3).unwrap().is_empty());
    }

    #[test]
    fn test_search_drops_sub_threshold() {
        let cold = tier();
        cold.put(memory("exact", vec![1.0, 0.0])).unwrap();
        cold.put(memory("close", vec![0.8, 0.6])).unwrap();
        cold.put(memory("far", vec![0.0, 1.0])).unwrap();

        let results = cold.search(&[1.0, 0.0], 3).unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].memory.text, "exact");
        assert_eq!(results[0].score, 100.0);
        assert_eq!(results[1].memory.text, "close");
        assert!((results[1].score - 50.0).abs() < 1e-3);
    }

    #[test]
    fn test_update_embedding_moves_memory_in_index() {
        let cold = tier();
        let m = memory("mover", vec![0.0, 1.0]);
        let id = m.id.clone();
        cold.put(m).unwrap();
        assert!(cold.search(&[1.0, 0.0], 1).unwrap().is_empty());

        let patch = MemoryPatch {
            embedding: Some(vec![1.0, 0.0]),
            ..Default::default()
        };
        let updated = cold.update(&id, &patch).unwrap().unwrap();
        assert_eq!(updated.embedding, vec![1.0, 0.0]);
        assert_eq!(cold.search(&[1.0, 0.0], 1).unwrap()[0].memory.id, id);
        assert!(cold.update("missing", &patch).unwrap().is_none());
    }

    #[test]
    fn test_reopen_restores_rows_and_index() {
        let db = Arc::new(Database::in_memory().unwrap());
        let cold = ColdTier::open(db.clone(), 2, IndexKind::Flat).unwrap();
        cold.put(memory("kept", vec![1.0, 0.0])).unwrap();
        drop(cold);

        let reopened = ColdTier::open(db, 2, IndexKind::Flat).unwrap();
        assert_eq!(reopened.len(), 1);
        assert_eq!(reopened.search(&[1.0, 0.0], 1).unwrap()[0].memory.text, "kept");
    }
}
