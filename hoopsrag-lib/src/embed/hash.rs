use std::collections::BTreeMap;

use sha2::{Digest, Sha256};

use crate::embed::{Embedder, Embedding, check_input_lengths};
use crate::text::content_terms;
use crate::Result;

const DEFAULT_DIMENSION: usize = 384;
const DEFAULT_MAX_INPUT_BYTES: usize = 8192;

/// Deterministic bag-of-words embedder using signed feature hashing.
///
/// Each content term is hashed with SHA-256 into one of `dimension`
/// buckets with a ±1 sign, weighted by `1 + ln(tf)`, and the vector is L2
/// normalised. Identical text always yields an identical vector, across
/// processes and platforms. Lexical overlap only; no semantics.
#[derive(Debug, Clone)]
pub struct HashEmbedder {
    dimension: usize,
    max_input_len: usize,
}

impl HashEmbedder {
    #[must_use]
    pub fn new(dimension: usize, max_input_len: usize) -> Self {
        Self {
            dimension: dimension.max(1),
            max_input_len,
        }
    }

    fn encode(&self, text: &str) -> Embedding {
        let mut counts = BTreeMap::<String, u32>::new();
        for term in content_terms(text) {
            *counts.entry(term).or_default() += 1;
        }

        let mut vector = vec![0.0f32; self.dimension];
        for (term, tf) in counts {
            let digest = Sha256::digest(term.as_bytes());
            let mut bucket = [0u8; 8];
            bucket.copy_from_slice(&digest[..8]);
            let index = (u64::from_le_bytes(bucket) % self.dimension as u64) as usize;
            let sign = if digest[8] & 1 == 0 { 1.0 } else { -1.0 };
            vector[index] += sign * (1.0 + (tf as f32).ln());
        }

        let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            vector.iter_mut().for_each(|x| *x /= norm);
        }
        vector
    }
}

impl Default for HashEmbedder {
    fn default() -> Self {
        Self::new(DEFAULT_DIMENSION, DEFAULT_MAX_INPUT_BYTES)
    }
}

impl Embedder for HashEmbedder {
    fn model_name(&self) -> &str {
        "hash-sha256"
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn max_input_len(&self) -> usize {
        self.max_input_len
    }

    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Embedding>> {
        check_input_lengths(texts, self.max_input_len)?;
        Ok(texts.iter().map(|t| self.encode(t)).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;

    fn dot(a: &[f32], b: &[f32]) -> f32 {
        a.iter().zip(b).map(|(x, y)| x * y).sum()
    }

    #[test]
    fn test_deterministic() {
        let embedder = HashEmbedder::default();
        let text = "Player X: 10.2 assists per game, 2024-25 season";
        assert_eq!(embedder.embed(text).unwrap(), embedder.embed(text).unwrap());
        assert_eq!(
            embedder.embed(text).unwrap(),
            HashEmbedder::default().embed_query(text).unwrap()
        );
    }

    #[test]
    fn test_unit_length() {
        let v = HashEmbedder::default().embed("Team Y won the division").unwrap();
        assert_eq!(v.len(), 384);
        assert!((dot(&v, &v) - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_stopwords_only_is_zero_vector() {
        let v = HashEmbedder::default().embed("what is the").unwrap();
        assert!(v.iter().all(|x| *x == 0.0));
    }

    #[test]
    fn test_overlap_scores_higher() {
        let embedder = HashEmbedder::default();
        let query = embedder.embed_query("Player X assists").unwrap();
        let related = embedder.embed("Player X averaged 10.2 assists").unwrap();
        let unrelated = embedder.embed("Team Q lost on a rainy night").unwrap();

        assert!(dot(&query, &related) > dot(&query, &unrelated));
    }

    #[test]
    fn test_batch_preserves_order() {
        let embedder = HashEmbedder::default();
        let batch = embedder.embed_batch(&["alpha", "beta", "gamma"]).unwrap();
        assert_eq!(batch[1], embedder.embed("beta").unwrap());
        assert_eq!(batch[2], embedder.embed("gamma").unwrap());
    }

    #[test]
    fn test_rejects_overlong_input() {
        let embedder = HashEmbedder::new(16, 10);
        let err = embedder.embed_batch(&["short", "far too long for this"]).unwrap_err();
        assert!(matches!(err, Error::Encoding(_)));
    }

    #[test]
    fn test_version_tag() {
        assert_eq!(HashEmbedder::default().version().as_str(), "hash-sha256@384");
    }
}
