//! Second-stage reranking
//!
//! A cross-encoder scores each (query, chunk) pair together, which ranks
//! more precisely than bi-encoder similarity but costs one model pass per
//! candidate. The retriever applies it to the oversampled candidate list.

use crate::store::SearchResult;
use crate::Result;

pub trait Reranker: Send + Sync {
    /// Rescore candidates for `query` and return the best `top_k`, highest first.
    fn rerank(&self, query: &str, candidates: Vec<SearchResult>, top_k: usize) -> Result<Vec<SearchResult>>;
}

/// Keeps the first-stage order.
pub struct NoReranker;

impl Reranker for NoReranker {
    fn rerank(&self, _query: &str, mut candidates: Vec<SearchResult>, top_k: usize) -> Result<Vec<SearchResult>> {
        candidates.truncate(top_k);
        Ok(candidates)
    }
}

mod bge;

pub use bge::*;
