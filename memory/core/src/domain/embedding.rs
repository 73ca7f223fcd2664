// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Embedding Guard and Similarity Engine
//!
//! Pure helpers shared by every memory writer and by both storage adapters.
//! The guard keeps degenerate vectors out of the store; the similarity engine
//! is the single cosine formula used to rank in-process search results so
//! they agree with the PostgreSQL `<=>` operator.
//!
//! # Architecture
//!
//! - **Layer:** Domain Layer
//! - **Purpose:** Embedding validation and cosine similarity

use serde::{Deserialize, Serialize};

/// Fixed-length vector produced by the embedding model.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Embedding(pub Vec<f32>);

impl Embedding {
    pub fn new(values: Vec<f32>) -> Self {
        Self(values)
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// True when the vector must never be persisted or ranked.
    pub fn is_invalid(&self) -> bool {
        is_invalid(&self.0)
    }
}

impl From<Vec<f32>> for Embedding {
    fn from(values: Vec<f32>) -> Self {
        Self(values)
    }
}

impl AsRef<[f32]> for Embedding {
    fn as_ref(&self) -> &[f32] {
        &self.0
    }
}

/// Returns true if the vector is empty, every component is zero, or any
/// component is NaN or infinite.
///
/// A zero vector has no direction, so its cosine similarity against anything
/// is undefined; non-finite components poison every score and pgvector
/// refuses them. Writers reject such vectors; readers skip legacy rows
/// carrying one.
pub fn is_invalid(vector: &[f32]) -> bool {
    vector.is_empty()
        || vector.iter().any(|v| !v.is_finite())
        || vector.iter().all(|v| *v == 0.0)
}

/// Cosine similarity in `[-1, 1]`.
///
/// Returns `0.0` when either side is empty, has zero norm, or the two
/// vectors differ in length. Accumulation happens in `f64`; the result is
/// exactly symmetric because both the dot product and the norm product are
/// evaluated in the same order regardless of argument order.
pub fn similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.is_empty() || b.is_empty() || a.len() != b.len() {
        return 0.0;
    }

    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;
    for (&x, &y) in a.iter().zip(b.iter()) {
        let x = f64::from(x);
        let y = f64::from(y);
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    // sqrt(n*n) == n for a == b, which keeps self-similarity at exactly 1.0
    let denom = (norm_a * norm_b).sqrt();
    if !denom.is_finite() || denom == 0.0 {
        return 0.0;
    }

    (dot / denom).clamp(-1.0, 1.0) as f32
}

/// Cosine distance, `1 - similarity`. Degenerate inputs yield the maximum
/// distance reachable from a zero similarity (`1.0`).
pub fn distance(a: &[f32], b: &[f32]) -> f32 {
    1.0 - similarity(a, b)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_guard_rejects_empty_and_zero() {
        assert!(is_invalid(&[]));
        assert!(is_invalid(&[0.0, 0.0, 0.0]));
        assert!(!is_invalid(&[0.0, 0.0, 1.0]));
        assert!(Embedding::default().is_invalid());
        assert!(!Embedding::new(vec![0.1]).is_invalid());
    }

    #[test]
    fn test_guard_rejects_non_finite_components() {
        assert!(is_invalid(&[1.0, f32::NAN]));
        assert!(is_invalid(&[f32::INFINITY, 0.5]));
        assert!(is_invalid(&[f32::NEG_INFINITY]));
        assert!(!is_invalid(&[f32::MAX, f32::MIN_POSITIVE]));
    }

    #[test]
    fn test_guard_treats_negative_zero_as_zero() {
        assert!(is_invalid(&[-0.0, 0.0]));
    }

    #[test]
    fn test_similarity_known_values() {
        assert_eq!(similarity(&[1.0, 0.0, 0.0], &[1.0, 0.0, 0.0]), 1.0);
        assert_eq!(similarity(&[1.0, 0.0, 0.0], &[0.0, 1.0, 0.0]), 0.0);
        assert_eq!(similarity(&[1.0, 0.0], &[-1.0, 0.0]), -1.0);

        let near = similarity(&[1.0, 0.0, 0.0], &[0.9, 0.1, 0.0]);
        assert!(near > 0.99 && near < 1.0);
    }

    #[test]
    fn test_similarity_degenerate_inputs() {
        assert_eq!(similarity(&[], &[1.0]), 0.0);
        assert_eq!(similarity(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
        assert_eq!(similarity(&[1.0, 0.0], &[1.0, 0.0, 0.0]), 0.0);
        assert_eq!(distance(&[], &[]), 1.0);
    }

    #[test]
    fn test_distance_is_complement() {
        let a = [0.3, 0.4, 0.5];
        let b = [0.5, 0.1, 0.2];
        assert!((distance(&a, &b) - (1.0 - similarity(&a, &b))).abs() < f32::EPSILON);
    }

    fn vector() -> impl Strategy<Value = Vec<f32>> {
        prop::collection::vec(-100.0f32..100.0, 1..32)
    }

    fn reference(a: &[f32], b: &[f32]) -> f64 {
        let dot: f64 = a.iter().zip(b).map(|(x, y)| f64::from(*x) * f64::from(*y)).sum();
        let norm = |v: &[f32]| v.iter().map(|x| f64::from(*x).powi(2)).sum::<f64>().sqrt();
        dot / (norm(a) * norm(b))
    }

    proptest! {
        #[test]
        fn property_guard_is_deterministic(v in prop::collection::vec(-1.0f32..1.0, 0..16)) {
            prop_assert_eq!(is_invalid(&v), is_invalid(&v));
        }

        #[test]
        fn property_similarity_is_symmetric(a in vector(), b in vector()) {
            prop_assert_eq!(similarity(&a, &b), similarity(&b, &a));
        }

        #[test]
        fn property_self_similarity_is_one(a in vector()) {
            prop_assume!(!is_invalid(&a));
            prop_assert!((similarity(&a, &a) - 1.0).abs() <= 1e-6);
        }

        #[test]
        fn property_similarity_is_bounded(a in vector(), b in vector()) {
            let s = similarity(&a, &b);
            prop_assert!((-1.0..=1.0).contains(&s));
        }

        #[test]
        fn property_rank_order_matches_reference(
            q in prop::collection::vec(-1.0f32..1.0, 8),
            x in prop::collection::vec(-1.0f32..1.0, 8),
            y in prop::collection::vec(-1.0f32..1.0, 8),
        ) {
            prop_assume!(!is_invalid(&q) && !is_invalid(&x) && !is_invalid(&y));
            let (rx, ry) = (reference(&q, &x), reference(&q, &y));
            prop_assume!((rx - ry).abs() > 1e-5);
            prop_assert_eq!(similarity(&q, &x) > similarity(&q, &y), rx > ry);
        }
    }
}
