//! Vector storage backends
//!
//! # Storage Model
//!
//! Each stored record consists of:
//! - Chunk: the original text and metadata
//! - Embedding: the vector representation
//! - Encoder version: which encoder produced the vector
//! - Source weight and insertion sequence number
//!
//! A store instance is bound to one [`Similarity`] metric and, from the first
//! insert on, to one [`EncoderVersion`]. Records from another encoder are
//! refused on insert, and so are query vectors.
//!
//! Ranking score is `similarity * source_weight`. Results are ordered by
//! descending score; equal scores keep insertion order.
//!
//! # Usage
//!
//! ```ignore
//! use hoopsrag_lib::store::{MemoryStore, Record, StoreQuery, VectorStore};
//!
//! let mut store = MemoryStore::new();
//! store.insert(records)?;
//!
//! let results = store.query(&StoreQuery::new(&query_embedding, &encoder, 5))?;
//! ```

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use crate::chunk::{Chunk, ChunkMetadata};
use crate::document::DocumentKind;
use crate::embed::{Embedding, EncoderVersion};
use crate::season::Season;
use crate::Result;

/// Similarity metric a store ranks by
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Similarity {
    /// Cosine of the angle, in [-1, 1]
    #[default]
    Cosine,
    /// Raw dot product; equals cosine for unit-length vectors
    InnerProduct,
}

impl Similarity {
    #[must_use]
    pub fn score(self, a: &[f32], b: &[f32]) -> f32 {
        match self {
            Self::Cosine => cosine_similarity(a, b),
            Self::InnerProduct => a.iter().zip(b).map(|(x, y)| x * y).sum(),
        }
    }
}

/// A chunk and its embedding, ready to insert
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub chunk: Chunk,
    pub embedding: Embedding,
    pub encoder: EncoderVersion,
    /// Multiplier applied to the similarity score
    pub source_weight: f32,
}

impl Record {
    #[must_use]
    pub fn new(chunk: Chunk, embedding: Embedding, encoder: EncoderVersion) -> Self {
        Self {
            chunk,
            embedding,
            encoder,
            source_weight: 1.0,
        }
    }

    #[must_use]
    pub fn with_weight(mut self, source_weight: f32) -> Self {
        self.source_weight = source_weight;
        self
    }
}

/// A search result with similarity score
#[derive(Debug, Clone)]
pub struct SearchResult {
    /// The matched chunk
    pub chunk: Chunk,
    /// Ranking score (higher is more similar)
    pub score: f32,
    /// Insertion sequence number of the record
    pub seq: u64,
}

/// Orders by score, then earlier insertion first: the greater result ranks higher.
impl Ord for SearchResult {
    fn cmp(&self, other: &Self) -> Ordering {
        self.score
            .total_cmp(&other.score)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

impl PartialOrd for SearchResult {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for SearchResult {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for SearchResult {}

/// Metadata predicate evaluated during the scan
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordFilter {
    /// Only these seasons, when set
    pub seasons: Option<Vec<Season>>,
    /// Only these document kinds, when set
    pub kinds: Option<Vec<DocumentKind>>,
}

impl RecordFilter {
    #[must_use]
    pub fn seasons(seasons: impl IntoIterator<Item = Season>) -> Self {
        Self {
            seasons: Some(seasons.into_iter().collect()),
            kinds: None,
        }
    }

    #[must_use]
    pub fn matches(&self, metadata: &ChunkMetadata) -> bool {
        self.seasons.as_ref().is_none_or(|s| s.contains(&metadata.season))
            && self.kinds.as_ref().is_none_or(|k| k.contains(&metadata.kind))
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.seasons.is_none() && self.kinds.is_none()
    }
}

/// A nearest-neighbour request
#[derive(Debug, Clone, Copy)]
pub struct StoreQuery<'a> {
    pub vector: &'a [f32],
    /// Encoder that produced `vector`
    pub encoder: &'a EncoderVersion,
    /// Maximum number of results
    pub k: usize,
    pub filter: Option<&'a RecordFilter>,
}

impl<'a> StoreQuery<'a> {
    #[must_use]
    pub fn new(vector: &'a [f32], encoder: &'a EncoderVersion, k: usize) -> Self {
        Self {
            vector,
            encoder,
            k,
            filter: None,
        }
    }

    #[must_use]
    pub fn with_filter(mut self, filter: &'a RecordFilter) -> Self {
        self.filter = Some(filter);
        self
    }
}

/// Trait for vector storage backends
pub trait VectorStore: Send + Sync {
    /// Insert records, replacing any record with the same chunk id
    ///
    /// The whole batch is validated first; on error nothing is inserted.
    /// Returns the number of distinct chunk ids written.
    fn insert(&mut self, records: Vec<Record>) -> Result<usize>;

    /// Validate `records` against the pinned encoder and dimension without
    /// changing anything
    fn check(&self, records: &[Record]) -> Result<()>;

    /// Replace every chunk of `document_id` with `records`
    ///
    /// Nothing is removed unless the new records validate. Returns how many
    /// chunks were removed and how many written.
    fn replace_document(&mut self, document_id: &str, records: Vec<Record>) -> Result<(usize, usize)> {
        self.check(&records)?;
        let removed = self.delete(document_id);
        let inserted = self.insert(records)?;
        Ok((removed, inserted))
    }

    /// Search for similar chunks
    ///
    /// Returns at most `k` results sorted by score (highest first). An empty
    /// store yields an empty result, never an error.
    fn query(&self, query: &StoreQuery<'_>) -> Result<Vec<SearchResult>>;

    /// Remove every chunk of a document; returns how many were removed
    fn delete(&mut self, document_id: &str) -> usize;

    /// Get total number of stored chunks
    fn len(&self) -> usize;

    /// Check if store is empty
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Clear all stored data, including the pinned encoder
    fn clear(&mut self);

    /// Metric this store ranks by
    fn similarity(&self) -> Similarity;

    /// Encoder pinned by the first insert
    fn encoder(&self) -> Option<&EncoderVersion>;
}

/// Compute cosine similarity between two vectors.
///
/// Returns a value in [-1, 1] where 1 means identical direction.
#[must_use]
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    debug_assert_eq!(a.len(), b.len(), "vectors must have same length");

    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot / (norm_a * norm_b)
}

mod memory;

pub use memory::*;

#[cfg(test)]
mod tests {
    use super::*;

    fn result(score: f32, seq: u64) -> SearchResult {
        SearchResult {
            chunk: crate::testing::make_chunk("c", "doc", "text"),
            score,
            seq,
        }
    }

    #[test]
    fn test_cosine_similarity_identical() {
        let a = vec![1.0, 0.0, 0.0];
        let sim = cosine_similarity(&a, &a);
        assert!((sim - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_similarity_orthogonal() {
        let a = vec![1.0, 0.0, 0.0];
        let b = vec![0.0, 1.0, 0.0];
        let sim = cosine_similarity(&a, &b);
        assert!(sim.abs() < 1e-6);
    }

    #[test]
    fn test_cosine_similarity_opposite() {
        let a = vec![1.0, 0.0, 0.0];
        let b = vec![-1.0, 0.0, 0.0];
        let sim = cosine_similarity(&a, &b);
        assert!((sim + 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_inner_product_ignores_norm() {
        let a = [2.0, 0.0];
        let b = [3.0, 0.0];
        assert_eq!(Similarity::InnerProduct.score(&a, &b), 6.0);
        assert!((Similarity::Cosine.score(&a, &b) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_ordering_breaks_ties_by_insertion() {
        let mut results = vec![result(0.5, 3), result(0.9, 2), result(0.5, 1)];
        results.sort_by(|a, b| b.cmp(a));

        let seqs: Vec<u64> = results.iter().map(|r| r.seq).collect();
        assert_eq!(seqs, vec![2, 1, 3]);
    }

    #[test]
    fn test_filter_matches() {
        let chunk = crate::testing::make_chunk("c", "doc", "text");
        assert!(RecordFilter::default().matches(&chunk.metadata));
        assert!(RecordFilter::seasons([Season::new(2024)]).matches(&chunk.metadata));
        assert!(!RecordFilter::seasons([Season::new(2023)]).matches(&chunk.metadata));

        let kinds = RecordFilter {
            seasons: None,
            kinds: Some(vec![DocumentKind::Article]),
        };
        assert!(!kinds.matches(&chunk.metadata));
    }
}
