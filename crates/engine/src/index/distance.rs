//! Distance functions for vector scoring.
//!
//! Scores keep the natural direction of their metric: `L2` is a squared
//! distance (lower = more similar), `Cosine` a similarity (higher = more
//! similar). Sums are accumulated in f64 in component order, so the same
//! inputs always produce the same score bits.
//!
//! No implicit normalization of vectors. Vectors are used as-is.

use vecdex_core::DistanceMetric;

/// Score `candidate` against `query` under `metric`
pub fn compute_score(query: &[f32], candidate: &[f32], metric: DistanceMetric) -> f32 {
    debug_assert_eq!(
        query.len(),
        candidate.len(),
        "Dimension mismatch in score computation"
    );

    let score = match metric {
        DistanceMetric::L2 => squared_euclidean(query, candidate),
        DistanceMetric::Cosine => cosine_similarity(query, candidate),
    };
    // Fold -0.0 into 0.0 so equal scores stay equal under total_cmp
    score + 0.0
}

/// Map a squared L2 distance into a [0, 1] confidence
///
/// `max(0, 1 - distance / factor)`: an exact match is 1.0, anything at or
/// beyond `factor` is 0.0. `factor` must be positive.
pub fn l2_confidence(distance: f32, factor: f64) -> f32 {
    debug_assert!(factor > 0.0);
    (1.0 - distance as f64 / factor).max(0.0) as f32
}

/// Squared Euclidean distance: sum((a_i - b_i)^2)
///
/// Range: [0, inf), lower = more similar
pub fn squared_euclidean(a: &[f32], b: &[f32]) -> f32 {
    a.iter()
        .zip(b.iter())
        .map(|(&x, &y)| {
            let d = x as f64 - y as f64;
            d * d
        })
        .sum::<f64>() as f32
}

/// Cosine similarity: dot(a,b) / (||a|| * ||b||)
///
/// Range: [-1, 1], higher = more similar
/// Returns 0.0 if either vector has zero norm
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let norm_a = l2_norm(a);
    let norm_b = l2_norm(b);
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    let cos = dot_product(a, b) / (norm_a * norm_b);
    // Rounding can push identical directions a hair past 1.0
    cos.clamp(-1.0, 1.0) as f32
}

/// Dot product accumulated in f64
pub fn dot_product(a: &[f32], b: &[f32]) -> f64 {
    a.iter()
        .zip(b.iter())
        .map(|(&x, &y)| x as f64 * y as f64)
        .sum()
}

/// L2 norm (Euclidean length) in f64
pub fn l2_norm(v: &[f32]) -> f64 {
    v.iter().map(|&x| x as f64 * x as f64).sum::<f64>().sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_l2_confidence() {
        assert_eq!(l2_confidence(0.0, 2.0), 1.0);
        assert_eq!(l2_confidence(1.0, 2.0), 0.5);
        assert_eq!(l2_confidence(2.0, 2.0), 0.0);
        assert_eq!(l2_confidence(7.5, 2.0), 0.0);
        assert!((l2_confidence(1.0, 4.0) - 0.75).abs() < 1e-7);
    }

    #[test]
    fn test_l2_identical_vectors() {
        let v = vec![1.0, 2.0, 3.0];
        assert_eq!(squared_euclidean(&v, &v), 0.0);
    }

    #[test]
    fn test_l2_is_squared() {
        let a = vec![0.0, 0.0];
        let b = vec![3.0, 4.0];
        assert_eq!(squared_euclidean(&a, &b), 25.0);
    }

    #[test]
    fn test_l2_large_components_do_not_overflow_to_nan() {
        let a = vec![f32::MAX, -f32::MAX];
        let b = vec![-f32::MAX, f32::MAX];
        let d = squared_euclidean(&a, &b);
        assert!(!d.is_nan());
    }

    #[test]
    fn test_cosine_identical_vectors() {
        let v = vec![1.0, 2.0, 3.0];
        let sim = cosine_similarity(&v, &v);
        assert!((sim - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_opposite_vectors() {
        let sim = cosine_similarity(&[1.0, 0.0], &[-1.0, 0.0]);
        assert!((sim - (-1.0)).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_orthogonal_vectors() {
        let sim = cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]);
        assert!(sim.abs() < 1e-6);
    }

    #[test]
    fn test_cosine_ignores_magnitude() {
        let sim = cosine_similarity(&[1.0, 1.0], &[100.0, 100.0]);
        assert!((sim - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_zero_vector_handling() {
        let zero = vec![0.0, 0.0, 0.0];
        let nonzero = vec![1.0, 2.0, 3.0];

        assert_eq!(cosine_similarity(&zero, &nonzero), 0.0);
        assert_eq!(cosine_similarity(&nonzero, &zero), 0.0);
        assert_eq!(cosine_similarity(&zero, &zero), 0.0);
    }

    #[test]
    fn test_negative_zero_folded() {
        let score = compute_score(&[0.0, 1.0], &[-1.0, 0.0], DistanceMetric::Cosine);
        assert_eq!(score.to_bits(), 0.0f32.to_bits());
    }

    #[test]
    fn test_compute_score_dispatches_correctly() {
        let a = vec![1.0, 0.0, 0.0];
        let b = vec![0.0, 1.0, 0.0];

        assert_eq!(compute_score(&a, &b, DistanceMetric::L2), 2.0);
        assert!(compute_score(&a, &b, DistanceMetric::Cosine).abs() < 1e-6);
    }
}
