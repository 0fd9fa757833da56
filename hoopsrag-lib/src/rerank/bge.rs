use std::sync::Mutex;

use fastembed::{RerankInitOptions, RerankerModel, TextRerank};

use crate::rerank::Reranker;
use crate::store::SearchResult;
use crate::{Error, Result};

/// BGE reranker using BAAI/bge-reranker-base.
///
/// Cross-encoder model for two-stage retrieval. Scores query-document pairs
/// together for more accurate relevance ranking than bi-encoder similarity.
pub struct BgeReranker {
    model: Mutex<TextRerank>,
}

impl BgeReranker {
    /// Create a new BGE reranker.
    ///
    /// Downloads the model on first use (~300MB).
    pub fn new() -> Result<Self> {
        let opts = RerankInitOptions::new(RerankerModel::BGERerankerBase)
            .with_show_download_progress(true);

        TextRerank::try_new(opts)
            .map(|model| Self {
                model: Mutex::new(model),
            })
            .map_err(|e| Error::Reranking(e.to_string()))
    }
}

impl Reranker for BgeReranker {
    fn rerank(&self, query: &str, candidates: Vec<SearchResult>, top_k: usize) -> Result<Vec<SearchResult>> {
        if candidates.is_empty() {
            return Ok(candidates);
        }

        // Extract document texts for the model
        let docs: Vec<&str> = candidates.iter().map(|c| c.chunk.content.as_str()).collect();

        let scored = {
            let mut model = self
                .model
                .lock()
                .map_err(|_| Error::Reranking("reranker lock poisoned".to_string()))?;
            model
                .rerank(query, &docs, false, None)
                .map_err(|e| Error::Reranking(e.to_string()))?
        };

        // Wrap candidates in Option to move each one out by index
        let mut slots: Vec<Option<SearchResult>> = candidates.into_iter().map(Some).collect();
        let mut ranked: Vec<SearchResult> = scored
            .into_iter()
            .filter_map(|rr| {
                let mut result = slots.get_mut(rr.index)?.take()?;
                result.score = rr.score;
                Some(result)
            })
            .collect();

        // equal scores keep first-stage insertion order
        ranked.sort_by(|a, b| b.cmp(a));
        ranked.truncate(top_k);
        Ok(ranked)
    }
}
