//! Exact nearest-neighbour index over chunk embeddings.
//!
//! [`VectorIndex`] is built once from a complete set of entries and is
//! read-only afterwards. Refreshing the corpus means building a new index and
//! swapping it in; see [`DocChat`](crate::DocChat).

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::document::{Chunk, Embedding, SearchResult};
use crate::error::{RagError, Result};

/// The similarity function an index scores with.
///
/// Scores are always "higher is better": Euclidean scores are the negated L2
/// distance.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Similarity {
    /// Cosine similarity in `[-1, 1]`.
    #[default]
    Cosine,
    /// Negative Euclidean distance in `(-inf, 0]`.
    Euclidean,
}

impl Similarity {
    /// Score `a` against `b`.
    pub fn score(self, a: &[f32], b: &[f32]) -> f32 {
        match self {
            Self::Cosine => cosine_similarity(a, b),
            Self::Euclidean => {
                -a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum::<f32>().sqrt()
            }
        }
    }
}

/// Compute cosine similarity between two vectors.
///
/// Returns 0.0 if either vector has zero magnitude.
fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

fn is_finite(vector: &[f32]) -> bool {
    vector.iter().all(|x| x.is_finite())
}

/// An embedding together with the chunk it was computed from.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IndexEntry {
    /// The chunk's embedding.
    pub embedding: Embedding,
    /// The embedded chunk.
    pub chunk: Chunk,
}

impl IndexEntry {
    /// Pair a chunk with its embedding vector.
    pub fn new(chunk: Chunk, vector: Vec<f32>) -> Self {
        Self { embedding: Embedding { chunk_id: chunk.id.clone(), vector }, chunk }
    }
}

/// An immutable, linearly scanned vector index.
///
/// Entries keep their build order; search ties are broken by that order.
#[derive(Debug, Clone)]
pub struct VectorIndex {
    dimension: usize,
    similarity: Similarity,
    entries: Vec<IndexEntry>,
}

impl VectorIndex {
    /// Build an index from `entries`, using cosine similarity.
    ///
    /// # Errors
    ///
    /// See [`build_with`](Self::build_with).
    pub fn build(entries: Vec<IndexEntry>) -> Result<Self> {
        Self::build_with(entries, Similarity::default())
    }

    /// Build an index from `entries` scored with `similarity`.
    ///
    /// The index dimension is taken from the first entry.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::EmptyIndex`] if `entries` is empty and
    /// [`RagError::DimensionMismatch`] if the entries disagree on dimension
    /// or the first vector is empty, and [`RagError::InvalidArgument`] if a
    /// vector has a NaN or infinite component.
    pub fn build_with(entries: Vec<IndexEntry>, similarity: Similarity) -> Result<Self> {
        let first = entries.first().ok_or(RagError::EmptyIndex)?;
        let dimension = first.embedding.vector.len();
        if dimension == 0 {
            return Err(RagError::DimensionMismatch { expected: 1, actual: 0 });
        }
        if let Some(bad) = entries.iter().find(|e| e.embedding.vector.len() != dimension) {
            return Err(RagError::DimensionMismatch {
                expected: dimension,
                actual: bad.embedding.vector.len(),
            });
        }
        if let Some(bad) = entries.iter().find(|e| !is_finite(&e.embedding.vector)) {
            return Err(RagError::InvalidArgument(format!(
                "embedding for chunk '{}' has a non-finite component",
                bad.chunk.id
            )));
        }

        debug!(entries = entries.len(), dimension, ?similarity, "built vector index");
        Ok(Self { dimension, similarity, entries })
    }

    /// The vector dimension every entry (and every query) must have.
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// The similarity function this index scores with.
    pub fn similarity(&self) -> Similarity {
        self.similarity
    }

    /// Number of stored entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Always `false`: an index cannot be built empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Stored entries in build order.
    pub fn entries(&self) -> &[IndexEntry] {
        &self.entries
    }

    /// Return up to `k` entries most similar to `query`, best first.
    ///
    /// `k` larger than the index is clamped to the index size.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::InvalidArgument`] if `k == 0` or `query` has a
    /// non-finite component, and [`RagError::DimensionMismatch`] if `query`
    /// has the wrong dimension.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<SearchResult>> {
        if k == 0 {
            return Err(RagError::InvalidArgument("k must be at least 1".into()));
        }
        if query.len() != self.dimension {
            return Err(RagError::DimensionMismatch {
                expected: self.dimension,
                actual: query.len(),
            });
        }
        if !is_finite(query) {
            return Err(RagError::InvalidArgument("query has a non-finite component".into()));
        }

        let mut scored: Vec<(usize, f32)> = self
            .entries
            .iter()
            .enumerate()
            .map(|(i, entry)| (i, self.similarity.score(&entry.embedding.vector, query)))
            .collect();

        // Stable sort keeps insertion order among equal scores. Scores can
        // still overflow to NaN, so compare with a total order.
        scored.sort_by(|a, b| b.1.total_cmp(&a.1));
        scored.truncate(k.min(self.entries.len()));

        Ok(scored
            .into_iter()
            .map(|(i, score)| SearchResult { chunk: self.entries[i].chunk.clone(), score })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn entry(id: &str, vector: Vec<f32>) -> IndexEntry {
        IndexEntry::new(
            Chunk {
                id: id.to_string(),
                document_id: "doc".to_string(),
                text: id.to_string(),
                char_offset_start: 0,
                char_offset_end: id.len(),
                metadata: HashMap::new(),
            },
            vector,
        )
    }

    fn ids(results: &[SearchResult]) -> Vec<&str> {
        results.iter().map(|r| r.chunk.id.as_str()).collect()
    }

    #[test]
    fn build_rejects_empty_entries() {
        assert!(matches!(VectorIndex::build(Vec::new()), Err(RagError::EmptyIndex)));
    }

    #[test]
    fn build_rejects_mixed_dimensions() {
        let err = VectorIndex::build(vec![entry("a", vec![1.0, 0.0]), entry("b", vec![1.0])])
            .unwrap_err();
        assert!(matches!(err, RagError::DimensionMismatch { expected: 2, actual: 1 }));
    }

    #[test]
    fn cosine_search_orders_by_similarity() {
        let index = VectorIndex::build(vec![
            entry("x", vec![1.0, 0.0]),
            entry("y", vec![0.0, 1.0]),
            entry("xy", vec![1.0, 1.0]),
        ])
        .unwrap();

        let results = index.search(&[1.0, 0.1], 3).unwrap();
        assert_eq!(ids(&results), vec!["x", "xy", "y"]);
        assert!(results.windows(2).all(|w| w[0].score >= w[1].score));
    }

    #[test]
    fn euclidean_search_prefers_nearest_point() {
        let index = VectorIndex::build_with(
            vec![entry("far", vec![10.0, 10.0]), entry("near", vec![1.0, 1.0])],
            Similarity::Euclidean,
        )
        .unwrap();

        let results = index.search(&[2.0, 2.0], 1).unwrap();
        assert_eq!(ids(&results), vec!["near"]);
        assert!(results[0].score <= 0.0);
    }

    #[test]
    fn ties_keep_insertion_order() {
        let index = VectorIndex::build(vec![
            entry("first", vec![1.0, 0.0]),
            entry("second", vec![2.0, 0.0]),
            entry("third", vec![3.0, 0.0]),
        ])
        .unwrap();

        let results = index.search(&[1.0, 0.0], 3).unwrap();
        assert_eq!(ids(&results), vec!["first", "second", "third"]);
    }

    #[test]
    fn k_is_clamped_to_entry_count() {
        let index =
            VectorIndex::build(vec![entry("a", vec![1.0]), entry("b", vec![-1.0])]).unwrap();
        assert_eq!(index.search(&[1.0], 10).unwrap().len(), 2);
    }

    #[test]
    fn non_finite_vectors_are_rejected() {
        let entries: Vec<IndexEntry> = (0..40)
            .map(|i| {
                let vector = if i % 3 == 0 { vec![f32::NAN, 1.0] } else { vec![1.0, i as f32] };
                entry(&format!("e{i}"), vector)
            })
            .collect();
        assert!(matches!(VectorIndex::build(entries), Err(RagError::InvalidArgument(_))));

        let inf = VectorIndex::build(vec![entry("a", vec![f32::INFINITY, 0.0])]);
        assert!(matches!(inf, Err(RagError::InvalidArgument(_))));

        let index = VectorIndex::build(vec![entry("a", vec![1.0, 0.0])]).unwrap();
        assert!(matches!(index.search(&[f32::NAN, 0.0], 1), Err(RagError::InvalidArgument(_))));
    }

    #[test]
    fn overflowing_scores_do_not_break_search() {
        // Finite inputs whose cosine overflows to NaN, mixed with ordinary scores.
        let entries = (0..40)
            .map(|i| {
                let vector = if i % 3 == 0 { vec![1.0, 0.0] } else { vec![f32::MAX, f32::MAX] };
                entry(&format!("e{i}"), vector)
            })
            .collect();
        let index = VectorIndex::build(entries).unwrap();

        let results = index.search(&[-f32::MAX, f32::MAX], 40).unwrap();
        assert_eq!(results.len(), 40);
    }

    #[test]
    fn search_validates_arguments() {
        let index = VectorIndex::build(vec![entry("a", vec![1.0, 0.0])]).unwrap();
        assert!(matches!(index.search(&[1.0, 0.0], 0), Err(RagError::InvalidArgument(_))));
        assert!(matches!(
            index.search(&[1.0], 1),
            Err(RagError::DimensionMismatch { expected: 2, actual: 1 })
        ));
    }
}
