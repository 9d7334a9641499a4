//! Nearest-neighbour index over fixed-dimension embeddings.
//!
//! The search structures behind [`SearchStructure`] cannot be mutated in place
//! except by appending, so `remove` and `update` rebuild the whole structure
//! from the surviving entries. Rebuilds happen outside the state lock and the
//! finished state is swapped in under the write guard: a concurrent `search`
//! sees either the old index or the new one.

mod clustered;
mod flat;

pub use clustered::ClusteredStructure;
pub use flat::FlatStructure;

use crate::error::{Result, StoreError};
use crate::scoring::normalized;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::debug;

/// A search structure over slot-addressed, unit-length vectors
pub trait SearchStructure: Send + Sync {
    fn name(&self) -> &'static str;

    /// Structures that need no training report true from the start
    fn is_trained(&self) -> bool;

    /// Train from every vector currently present and assign them all
    fn train(&mut self, vectors: &[Vec<f32>]);

    /// Register one freshly appended vector with a trained structure
    fn insert(&mut self, slot: usize, vector: &[f32]);

    /// Up to `k` (slot, distance) pairs, nearest first
    fn search(&self, vectors: &[Vec<f32>], query: &[f32], k: usize) -> Vec<(usize, f32)>;
}

/// Which search structure an index uses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum IndexKind {
    /// Exact brute-force search
    #[default]
    Flat,
    /// Inverted lists over k-means centroids, probing the nearest few
    Clustered { lists: usize, probes: usize },
}

impl IndexKind {
    pub fn structure(&self) -> Box<dyn SearchStructure> {
        match *self {
            Self::Flat => Box::new(FlatStructure),
            Self::Clustered { lists, probes } => Box::new(ClusteredStructure::new(lists, probes)),
        }
    }

    pub fn label(&self) -> String {
        match self {
            Self::Flat => "flat".to_string(),
            Self::Clustered { lists, probes } => format!("clustered(lists={lists}, probes={probes})"),
        }
    }
}

/// Cosine distance between two unit vectors
pub(crate) fn distance(a: &[f32], b: &[f32]) -> f32 {
    1.0 - a.iter().zip(b).map(|(x, y)| x * y).sum::<f32>()
}

struct IndexState {
    ids: Vec<String>,
    slots: HashMap<String, usize>,
    vectors: Vec<Vec<f32>>,
    structure: Box<dyn SearchStructure>,
}

impl IndexState {
    fn empty(kind: IndexKind) -> Self {
        Self {
            ids: Vec::new(),
            slots: HashMap::new(),
            vectors: Vec::new(),
            structure: kind.structure(),
        }
    }

    /// Build a complete state from already-normalised entries
    fn build(kind: IndexKind, entries: Vec<(String, Vec<f32>)>) -> Self {
        let mut state = Self::empty(kind);
        for (id, vector) in entries {
            if let Some(&slot) = state.slots.get(&id) {
                state.vectors[slot] = vector;
                continue;
            }
            state.slots.insert(id.clone(), state.ids.len());
            state.ids.push(id);
            state.vectors.push(vector);
        }
        if !state.vectors.is_empty() {
            state.structure.train(&state.vectors);
        }
        state
    }

    fn entries(&self) -> Vec<(String, Vec<f32>)> {
        self.ids.iter().cloned().zip(self.vectors.iter().cloned()).collect()
    }
}

/// Vector index with rebuild-on-mutation and swap-and-publish rebuilds
pub struct VectorIndex {
    dimension: usize,
    kind: IndexKind,
    state: RwLock<IndexState>,
    // Serialises mutators so every rebuild starts from the latest entries.
    writer: Mutex<()>,
}

impl VectorIndex {
    pub fn new(dimension: usize, kind: IndexKind) -> Self {
        Self {
            dimension,
            kind,
            state: RwLock::new(IndexState::empty(kind)),
            writer: Mutex::new(()),
        }
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn kind(&self) -> IndexKind {
        self.kind
    }

    pub fn len(&self) -> usize {
        self.state.read().ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, id: &str) -> bool {
        self.state.read().slots.contains_key(id)
    }

    pub fn is_trained(&self) -> bool {
        self.state.read().structure.is_trained()
    }

    /// Check dimension and normalise
    fn prepare(&self, embedding: &[f32]) -> Result<Vec<f32>> {
        if embedding.len() != self.dimension {
            return Err(StoreError::invalid_vector(format!(
                "expected dimension {}, got {}",
                self.dimension,
                embedding.len()
            )));
        }
        normalized(embedding)
    }

    /// Insert one vector. Re-adding a known id replaces its vector.
    pub fn add(&self, id: &str, embedding: &[f32]) -> Result<()> {
        let vector = self.prepare(embedding)?;
        let _writer = self.writer.lock();

        if self.state.read().slots.contains_key(id) {
            let entries = self.replaced(id, Some(vector));
            self.publish(entries);
            return Ok(());
        }

        let mut guard = self.state.write();
        let state = &mut *guard;
        let slot = state.ids.len();
        state.slots.insert(id.to_string(), slot);
        state.ids.push(id.to_string());
        state.vectors.push(vector);

        if state.structure.is_trained() {
            state.structure.insert(slot, &state.vectors[slot]);
        } else {
            debug!(vectors = state.vectors.len(), structure = state.structure.name(), "training index");
            state.structure.train(&state.vectors);
        }
        Ok(())
    }

    /// Train explicitly from a full set of entries, replacing current contents
    pub fn build(&self, entries: Vec<(String, Vec<f32>)>) -> Result<()> {
        self.rebuild(entries)
    }

    /// Replace the entire contents from `entries`
    pub fn rebuild(&self, entries: Vec<(String, Vec<f32>)>) -> Result<()> {
        let prepared = entries
            .into_iter()
            .map(|(id, v)| Ok((id, self.prepare(&v)?)))
            .collect::<Result<Vec<_>>>()?;
        let _writer = self.writer.lock();
        self.publish(prepared);
        Ok(())
    }

    /// Remove an entry, rebuilding from the rest. False if absent.
    pub fn remove(&self, id: &str) -> Result<bool> {
        let _writer = self.writer.lock();
        if !self.contains(id) {
            return Ok(false);
        }
        let entries = self.replaced(id, None);
        self.publish(entries);
        Ok(true)
    }

    /// Replace an entry's vector, rebuilding. False if absent.
    pub fn update(&self, id: &str, embedding: &[f32]) -> Result<bool> {
        let vector = self.prepare(embedding)?;
        let _writer = self.writer.lock();
        if !self.contains(id) {
            return Ok(false);
        }
        let entries = self.replaced(id, Some(vector));
        self.publish(entries);
        Ok(true)
    }

    /// Nearest neighbours of `query` as (id, cosine distance), nearest first
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<(String, f32)>> {
        let query = self.prepare(query)?;
        let state = self.state.read();
        if state.ids.is_empty() {
            return Err(StoreError::EmptyIndex);
        }
        if k == 0 {
            return Ok(Vec::new());
        }
        Ok(state
            .structure
            .search(&state.vectors, &query, k)
            .into_iter()
            .map(|(slot, dist)| (state.ids[slot].clone(), dist))
            .collect())
    }

    /// Current entries with `id` dropped or given a new vector
    fn replaced(&self, id: &str, vector: Option<Vec<f32>>) -> Vec<(String, Vec<f32>)> {
        let mut entries = self.state.read().entries();
        match vector {
            Some(v) => {
                if let Some(entry) = entries.iter_mut().find(|(eid, _)| eid == id) {
                    entry.1 = v;
                }
            }
            None => entries.retain(|(eid, _)| eid != id),
        }
        entries
    }

    /// Build off to the side, then swap. Caller holds the writer gate.
    fn publish(&self, entries: Vec<(String, Vec<f32>)>) {
        let fresh = IndexState::build(self.kind, entries);
        let count = fresh.ids.len();
        *self.state.write() = fresh;
        debug!(vectors = count, kind = %self.kind.label(), "index rebuilt");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn index(kind: IndexKind) -> VectorIndex {
        let idx = VectorIndex::new(3, kind);
        idx.add("x", &[1.0, 0.0, 0.0]).unwrap();
        idx.add("y", &[0.0, 1.0, 0.0]).unwrap();
        idx.add("xy", &[1.0, 1.0, 0.0]).unwrap();
        idx
    }

    #[test]
    fn test_empty_index_search_fails() {
        let idx = VectorIndex::new(3, IndexKind::Flat);
        assert!(matches!(
            idx.search(&[1.0, 0.0, 0.0], 5),
            Err(StoreError::EmptyIndex)
        ));
    }

    #[test]
    fn test_flat_search_orders_by_distance() {
        let idx = index(IndexKind::Flat);
        let hits = idx.search(&[1.0, 0.1, 0.0], 2).unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].0, "x");
        assert_eq!(hits[1].0, "xy");
        assert!(hits[0].1 <= hits[1].1);
    }

    #[test]
    fn test_dimension_mismatch_rejected() {
        let idx = VectorIndex::new(3, IndexKind::Flat);
        assert!(matches!(
            idx.add("a", &[1.0, 0.0]),
            Err(StoreError::InvalidVector(_))
        ));
        assert!(idx.is_empty());
    }

    #[test]
    fn test_remove_and_update_rebuild() {
        let idx = index(IndexKind::Flat);
        assert!(idx.remove("x").unwrap());
        assert!(!idx.remove("x").unwrap());
        assert_eq!(idx.len(), 2);
        let hits = idx.search(&[1.0, 0.0, 0.0], 3).unwrap();
        assert!(hits.iter().all(|(id, _)| id != "x"));

        assert!(idx.update("y", &[1.0, 0.0, 0.0]).unwrap());
        assert!(!idx.update("missing", &[1.0, 0.0, 0.0]).unwrap());
        let hits = idx.search(&[1.0, 0.0, 0.0], 1).unwrap();
        assert_eq!(hits[0].0, "y");
        assert!(hits[0].1.abs() < 1e-6);
    }

    #[test]
    fn test_re_adding_id_replaces_vector() {
        let idx = index(IndexKind::Flat);
        idx.add("x", &[0.0, 0.0, 1.0]).unwrap();
        assert_eq!(idx.len(), 3);
        let hits = idx.search(&[0.0, 0.0, 1.0], 1).unwrap();
        assert_eq!(hits[0].0, "x");
    }

    #[test]
    fn test_clustered_trains_once_lists_filled() {
        let idx = VectorIndex::new(3, IndexKind::Clustered { lists: 2, probes: 2 });
        assert!(!idx.is_trained());
        idx.add("x", &[1.0, 0.0, 0.0]).unwrap();
        assert!(!idx.is_trained());
        assert_eq!(idx.search(&[1.0, 0.0, 0.0], 1).unwrap()[0].0, "x");

        idx.add("y", &[0.0, 1.0, 0.0]).unwrap();
        assert!(idx.is_trained());
        let hits = idx.search(&[0.0, 1.0, 0.0], 1).unwrap();
        assert_eq!(hits[0].0, "y");
    }

    #[test]
    fn test_clustered_grown_by_adds_probes_few_lists() {
        let idx = VectorIndex::new(4, IndexKind::Clustered { lists: 4, probes: 1 });
        for i in 0..40 {
            let mut v = [0.0f32; 4];
            v[i % 4] = 1.0;
            v[(i + 1) % 4] = 0.01 * (i / 4) as f32;
            idx.add(&format!("m{i}"), &v).unwrap();
        }
        assert!(idx.is_trained());

        let hits = idx.search(&[1.0, 0.0, 0.0, 0.0], 100).unwrap();
        assert_eq!(hits.len(), 10);
        for (id, _) in &hits {
            let i: usize = id[1..].parse().unwrap();
            assert_eq!(i % 4, 0, "{id} is outside the probed list");
        }
    }

    #[test]
    fn test_clustered_rebuild_matches_flat_when_probing_all_lists() {
        let entries: Vec<(String, Vec<f32>)> = (0..20)
            .map(|i| {
                let a = i as f32 * 0.3;
                (format!("m{i}"), vec![a.cos(), a.sin(), 0.5])
            })
            .collect();
        let flat = VectorIndex::new(3, IndexKind::Flat);
        let clustered = VectorIndex::new(3, IndexKind::Clustered { lists: 4, probes: 4 });
        flat.build(entries.clone()).unwrap();
        clustered.build(entries).unwrap();

        let query = [0.2, 0.9, 0.5];
        let a: Vec<String> = flat.search(&query, 5).unwrap().into_iter().map(|h| h.0).collect();
        let b: Vec<String> = clustered.search(&query, 5).unwrap().into_iter().map(|h| h.0).collect();
        assert_eq!(a, b);
    }

    #[test]
    fn test_rebuild_to_empty() {
        let idx = index(IndexKind::Clustered { lists: 2, probes: 1 });
        idx.rebuild(Vec::new()).unwrap();
        assert!(idx.is_empty());
        assert!(!idx.is_trained());
        idx.add("z", &[0.0, 0.0, 1.0]).unwrap();
        assert_eq!(idx.search(&[0.0, 0.0, 1.0], 3).unwrap().len(), 1);
    }
}
