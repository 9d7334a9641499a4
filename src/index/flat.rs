use super::{distance, SearchStructure};

/// Exact search: scores every vector
pub struct FlatStructure;

impl SearchStructure for FlatStructure {
    fn name(&self) -> &'static str {
        "flat"
    }

    fn is_trained(&self) -> bool {
        true
    }

    fn train(&mut self, _vectors: &[Vec<f32>]) {}

    fn insert(&mut self, _slot: usize, _vector: &[f32]) {}

    fn search(&self, vectors: &[Vec<f32>], query: &[f32], k: usize) -> Vec<(usize, f32)> {
        nearest(vectors, 0..vectors.len(), query, k)
    }
}

/// Rank the given slots by distance to `query`, ties by slot, keep `k`
pub(super) fn nearest(
    vectors: &[Vec<f32>],
    slots: impl IntoIterator<Item = usize>,
    query: &[f32],
    k: usize,
) -> Vec<(usize, f32)> {
    let mut hits: Vec<(usize, f32)> = slots
        .into_iter()
        .map(|slot| (slot, distance(&vectors[slot], query)))
        .collect();
    hits.sort_by(|a, b| a.1.total_cmp(&b.1).then(a.0.cmp(&b.0)));
    hits.truncate(k);
    hits
}
