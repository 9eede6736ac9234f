//! Exact k-nearest-neighbor search
//!
//! Brute-force O(n·d) scan over a [`VectorStore`]. Fine for the dataset sizes
//! this engine targets; there is no approximate index.
//!
//! Results are deterministic:
//! 1. Score every record (single-threaded, ascending id order)
//! 2. Order by score in metric direction, ties by ascending id
//! 3. Keep the first k
//!
//! Scores are compared with `f32::total_cmp`, so ordering never depends on
//! an `Equal` fallback.

use std::cmp::Ordering;

use vecdex_core::{DistanceMetric, VecdexError, VecdexResult, VectorId};

use super::distance::compute_score;
use super::store::VectorStore;

/// Answers k-NN queries with a fixed metric
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SimilaritySearcher {
    metric: DistanceMetric,
}

impl SimilaritySearcher {
    /// Create a searcher for `metric`
    pub fn new(metric: DistanceMetric) -> Self {
        SimilaritySearcher { metric }
    }

    /// Metric used for scoring
    pub fn metric(&self) -> DistanceMetric {
        self.metric
    }

    /// Return the `min(k, store.len())` best records for `query`
    ///
    /// # Errors
    ///
    /// - `DimensionMismatch` if `query.len() != store.dimension()`
    /// - `InvalidArgument` if `k == 0` or the query has non-finite components
    pub fn search(
        &self,
        store: &VectorStore,
        query: &[f32],
        k: usize,
    ) -> VecdexResult<Vec<(VectorId, f32)>> {
        if k == 0 {
            return Err(VecdexError::invalid_argument("k must be at least 1"));
        }
        store.validate_vector(query)?;

        let metric = self.metric;
        let mut results: Vec<(VectorId, f32)> = store
            .iter()
            .map(|record| (record.id, compute_score(query, record.vector, metric)))
            .collect();

        let cmp = |a: &(VectorId, f32), b: &(VectorId, f32)| rank(metric, a, b);
        if k < results.len() {
            // Partition so the best k come first, then order only those
            results.select_nth_unstable_by(k - 1, cmp);
            results.truncate(k);
        }
        results.sort_unstable_by(cmp);
        Ok(results)
    }
}

/// Total order on (id, score) pairs: better score first, then lower id
fn rank(metric: DistanceMetric, a: &(VectorId, f32), b: &(VectorId, f32)) -> Ordering {
    let by_score = if metric.is_distance() {
        a.1.total_cmp(&b.1)
    } else {
        b.1.total_cmp(&a.1)
    };
    by_score.then_with(|| a.0.cmp(&b.0))
}
