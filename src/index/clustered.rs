use super::flat::nearest;
use super::{distance, SearchStructure};

const TRAIN_ITERATIONS: usize = 10;

/// Inverted-file structure: vectors are bucketed under the nearest of
/// `lists` centroids and a query only scans the `probes` closest buckets.
///
/// Centroids come from spherical k-means seeded with evenly spaced vectors,
/// so training is deterministic for a given entry order. Until there are at
/// least `lists` vectors the structure stays untrained and scans everything.
pub struct ClusteredStructure {
    lists: usize,
    probes: usize,
    centroids: Vec<Vec<f32>>,
    members: Vec<Vec<usize>>,
}

impl ClusteredStructure {
    pub fn new(lists: usize, probes: usize) -> Self {
        Self {
            lists: lists.max(1),
            probes: probes.max(1),
            centroids: Vec::new(),
            members: Vec::new(),
        }
    }

    fn closest_centroid(&self, vector: &[f32]) -> usize {
        self.centroids
            .iter()
            .enumerate()
            .map(|(i, c)| (i, distance(c, vector)))
            .min_by(|a, b| a.1.total_cmp(&b.1))
            .map(|(i, _)| i)
            .unwrap_or(0)
    }
}

impl SearchStructure for ClusteredStructure {
    fn name(&self) -> &'static str {
        "clustered"
    }

    fn is_trained(&self) -> bool {
        !self.centroids.is_empty()
    }

    fn train(&mut self, vectors: &[Vec<f32>]) {
        let n = vectors.len();
        if n < self.lists {
            return;
        }
        let k = self.lists;
        self.centroids = (0..k).map(|i| vectors[i * n / k].clone()).collect();

        let mut assignment = vec![0usize; n];
        for _ in 0..TRAIN_ITERATIONS {
            let mut changed = false;
            for (slot, v) in vectors.iter().enumerate() {
                let c = self.closest_centroid(v);
                if assignment[slot] != c {
                    assignment[slot] = c;
                    changed = true;
                }
            }

            let dim = vectors[0].len();
            let mut sums = vec![vec![0.0f32; dim]; k];
            let mut counts = vec![0usize; k];
            for (slot, v) in vectors.iter().enumerate() {
                counts[assignment[slot]] += 1;
                for (acc, x) in sums[assignment[slot]].iter_mut().zip(v) {
                    *acc += x;
                }
            }
            for (c, sum) in sums.into_iter().enumerate() {
                if counts[c] == 0 {
                    continue;
                }
                let norm = sum.iter().map(|x| x * x).sum::<f32>().sqrt();
                if norm > 0.0 {
                    self.centroids[c] = sum.into_iter().map(|x| x / norm).collect();
                }
            }

            if !changed {
                break;
            }
        }

        self.members = vec![Vec::new(); k];
        for (slot, v) in vectors.iter().enumerate() {
            let c = self.closest_centroid(v);
            self.members[c].push(slot);
        }
    }

    fn insert(&mut self, slot: usize, vector: &[f32]) {
        let c = self.closest_centroid(vector);
        self.members[c].push(slot);
    }

    fn search(&self, vectors: &[Vec<f32>], query: &[f32], k: usize) -> Vec<(usize, f32)> {
        if !self.is_trained() {
            return nearest(vectors, 0..vectors.len(), query, k);
        }
        let probed: Vec<usize> = nearest(&self.centroids, 0..self.centroids.len(), query, self.probes)
            .into_iter()
            .map(|(c, _)| c)
            .collect();
        let candidates = probed.into_iter().flat_map(|c| self.members[c].iter().copied());
        nearest(vectors, candidates, query, k)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn axis(j: usize) -> Vec<f32> {
        let mut v = vec![0.0; 4];
        v[j] = 1.0;
        v
    }

    #[test]
    fn test_untrained_below_list_count() {
        let mut structure = ClusteredStructure::new(4, 1);
        let vectors: Vec<Vec<f32>> = (0..3).map(axis).collect();
        structure.train(&vectors);
        assert!(!structure.is_trained());
        assert_eq!(structure.search(&vectors, &axis(2), 10).len(), 3);

        let vectors: Vec<Vec<f32>> = (0..4).map(axis).collect();
        structure.train(&vectors);
        assert!(structure.is_trained());
        assert_eq!(structure.search(&vectors, &axis(2), 10), vec![(2, 0.0)]);
    }
}
