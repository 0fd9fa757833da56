//! Query-time retrieval
//!
//! Combines embedder, store and optional reranking into one call.
//!
//! # Pipeline
//!
//! ```text
//! query -> embed_query -> store.query(k * oversample, filter) -> [rerank] -> per-document cap -> k
//! ```
//!
//! The store is shared with the indexer behind an `RwLock`; retrieval only
//! ever takes the read side, so concurrent queries never block each other.
//! The query is encoded before the lock is taken.
//!
//! `retrieve` is blocking (model inference, linear scan). Async callers run
//! it on the blocking pool, as [`crate::pipeline::Assistant::ask`] does.
//!
//! # Usage
//!
//! ```ignore
//! use hoopsrag_lib::retrieve::Retriever;
//!
//! // Bi-encoder only
//! let retriever = Retriever::new(embedder, store, config.retrieval.clone());
//! let results = retriever.retrieve("Who leads the league in assists?", 5, None)?;
//!
//! // Two-stage search with reranking
//! let retriever = Retriever::with_rerank(embedder, store, reranker, config.retrieval.clone());
//! ```

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use tracing::debug;

use crate::config::RetrievalConfig;
use crate::embed::Embedder;
use crate::rerank::{NoReranker, Reranker};
use crate::store::{RecordFilter, SearchResult, StoreQuery, VectorStore};
use crate::{Error, Result};

/// Metadata restriction for a query (season set, document kinds).
pub type RetrievalFilter = RecordFilter;

/// Retriever combining embedding, storage, and optional reranking.
pub struct Retriever<E: Embedder, S: VectorStore, R: Reranker = NoReranker> {
    embedder: Arc<E>,
    store: Arc<RwLock<S>>,
    reranker: Option<R>,
    config: RetrievalConfig,
}

// Constructor for retrievers without reranking
impl<E: Embedder, S: VectorStore> Retriever<E, S, NoReranker> {
    #[must_use]
    pub fn new(embedder: Arc<E>, store: Arc<RwLock<S>>, config: RetrievalConfig) -> Self {
        Self {
            embedder,
            store,
            reranker: None,
            config,
        }
    }
}

impl<E: Embedder, S: VectorStore, R: Reranker> Retriever<E, S, R> {
    /// Create a retriever that rescores the oversampled candidates with `reranker`.
    #[must_use]
    pub fn with_rerank(
        embedder: Arc<E>,
        store: Arc<RwLock<S>>,
        reranker: R,
        config: RetrievalConfig,
    ) -> Self {
        Self {
            embedder,
            store,
            reranker: Some(reranker),
            config,
        }
    }

    /// Return up to `k` chunks for `query`, best first.
    ///
    /// Fetches `k * oversample_factor` candidates, optionally reranks them,
    /// then keeps at most `per_document_cap` chunks per document.
    ///
    /// # Errors
    /// [`Error::EmptyCorpus`] when nothing has been ingested; encoder and
    /// store errors otherwise.
    pub fn retrieve(
        &self,
        query: &str,
        k: usize,
        filter: Option<&RetrievalFilter>,
    ) -> Result<Vec<SearchResult>> {
        if self.len()? == 0 {
            return Err(Error::EmptyCorpus);
        }
        if k == 0 {
            return Ok(Vec::new());
        }

        // encode outside the lock so a slow model never holds up the indexer
        let vector = self.embedder.embed_query(query)?;
        let encoder = self.embedder.version();
        let candidates_k = k.saturating_mul(self.config.oversample_factor.max(1));

        let mut request = StoreQuery::new(&vector, &encoder, candidates_k);
        if let Some(filter) = filter.filter(|f| !f.is_empty()) {
            request = request.with_filter(filter);
        }
        let mut candidates = self
            .store
            .read()
            .map_err(|_| Error::Store("vector store lock poisoned".to_string()))?
            .query(&request)?;

        let fetched = candidates.len();
        if let Some(reranker) = &self.reranker {
            candidates = reranker.rerank(query, candidates, fetched)?;
        }

        let results = cap_per_document(candidates, self.config.per_document_cap, k);
        debug!(
            k,
            fetched,
            returned = results.len(),
            reranked = self.reranker.is_some(),
            "retrieved"
        );
        Ok(results)
    }

    /// Returns the number of indexed chunks.
    pub fn len(&self) -> Result<usize> {
        self.store
            .read()
            .map(|s| s.len())
            .map_err(|_| Error::Store("vector store lock poisoned".to_string()))
    }

    /// Returns a reference to the embedder.
    #[must_use]
    pub fn embedder(&self) -> &E {
        &self.embedder
    }

    /// Returns the shared store handle.
    #[must_use]
    pub fn store(&self) -> &Arc<RwLock<S>> {
        &self.store
    }
}

/// Keeps results in order, dropping any beyond `cap` for the same document,
/// and stops after `k`.
#[must_use]
pub fn cap_per_document(results: Vec<SearchResult>, cap: usize, k: usize) -> Vec<SearchResult> {
    let mut per_document: HashMap<String, usize> = HashMap::new();
    results
        .into_iter()
        .filter(|r| {
            let seen = per_document
                .entry(r.chunk.metadata.document_id.clone())
                .or_default();
            *seen += 1;
            *seen <= cap
        })
        .take(k)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embed::HashEmbedder;
    use crate::season::Season;
    use crate::store::{MemoryStore, Record};
    use crate::testing::make_chunk;

    fn config(cap: usize) -> RetrievalConfig {
        RetrievalConfig {
            per_document_cap: cap,
            ..RetrievalConfig::default()
        }
    }

    fn retriever(
        chunks: Vec<crate::chunk::Chunk>,
        cap: usize,
    ) -> Retriever<HashEmbedder, MemoryStore> {
        let embedder = Arc::new(HashEmbedder::default());
        let mut store = MemoryStore::new();
        let records = chunks
            .into_iter()
            .map(|c| {
                let v = embedder.embed(&c.content).unwrap();
                Record::new(c, v, embedder.version())
            })
            .collect();
        store.insert(records).unwrap();
        Retriever::new(embedder, Arc::new(RwLock::new(store)), config(cap))
    }

    #[test]
    fn test_empty_store_is_empty_corpus() {
        let retriever: Retriever<HashEmbedder, MemoryStore> = Retriever::new(
            Arc::new(HashEmbedder::default()),
            Arc::new(RwLock::new(MemoryStore::new())),
            RetrievalConfig::default(),
        );
        assert!(matches!(
            retriever.retrieve("assists", 5, None),
            Err(Error::EmptyCorpus)
        ));
    }

    #[test]
    fn test_retrieve_ranks_by_overlap() {
        let retriever = retriever(
            vec![
                make_chunk("a:0", "a", "Team Q lost a close game on the road"),
                make_chunk("b:0", "b", "Player X averaged 10.2 assists per game"),
                make_chunk("c:0", "c", "The arena was renovated in the summer"),
            ],
            2,
        );

        let results = retriever.retrieve("Player X assists", 3, None).unwrap();
        assert_eq!(results[0].chunk.id, "b:0");
        assert!(results.windows(2).all(|w| w[0].score >= w[1].score));
    }

    #[test]
    fn test_per_document_cap() {
        let chunks = (0..6)
            .map(|i| make_chunk(&format!("big:{i}"), "big", &format!("Player X assists note {i}")))
            .chain([make_chunk("small:0", "small", "Player X assists elsewhere")])
            .collect();
        let retriever = retriever(chunks, 2);

        let results = retriever.retrieve("Player X assists", 5, None).unwrap();
        let from_big = results
            .iter()
            .filter(|r| r.chunk.metadata.document_id == "big")
            .count();
        assert_eq!(from_big, 2);
        assert!(results.iter().any(|r| r.chunk.metadata.document_id == "small"));
        assert_eq!(results.len(), 3);
    }

    #[test]
    fn test_season_filter() {
        let mut old = make_chunk("old:0", "old", "Player X assists leader");
        old.metadata.season = Season::new(2023);
        let new = make_chunk("new:0", "new", "Player X assists leader");
        let retriever = retriever(vec![old, new], 2);

        let filter = RetrievalFilter::seasons([Season::new(2023)]);
        let results = retriever.retrieve("Player X assists", 5, Some(&filter)).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].chunk.id, "old:0");
    }

    /// Prefers longer chunks, ignoring the first-stage score.
    struct LengthReranker;

    impl Reranker for LengthReranker {
        fn rerank(
            &self,
            _query: &str,
            candidates: Vec<SearchResult>,
            top_k: usize,
        ) -> Result<Vec<SearchResult>> {
            let mut ranked: Vec<SearchResult> = candidates
                .into_iter()
                .map(|mut r| {
                    r.score = r.chunk.content.len() as f32;
                    r
                })
                .collect();
            ranked.sort_by(|a, b| b.cmp(a));
            ranked.truncate(top_k);
            Ok(ranked)
        }
    }

    #[test]
    fn test_rerank_runs_before_cap() {
        let embedder = Arc::new(HashEmbedder::default());
        let chunks = vec![
            make_chunk("a:0", "a", "Player X assists"),
            make_chunk("a:1", "a", "Player X assists in the fourth quarter of a long game"),
            make_chunk("b:0", "b", "Player X assists and rebounds"),
        ];
        let records = chunks
            .into_iter()
            .map(|c| {
                let v = embedder.embed(&c.content).unwrap();
                Record::new(c, v, embedder.version())
            })
            .collect();
        let mut store = MemoryStore::new();
        store.insert(records).unwrap();

        let retriever = Retriever::with_rerank(
            embedder,
            Arc::new(RwLock::new(store)),
            LengthReranker,
            config(1),
        );
        let results = retriever.retrieve("Player X assists", 3, None).unwrap();

        let ids: Vec<&str> = results.iter().map(|r| r.chunk.id.as_str()).collect();
        assert_eq!(ids, vec!["a:1", "b:0"]);
    }

    /// Checks that the store can be written while a query is being encoded.
    struct LockCheckingEmbedder {
        inner: HashEmbedder,
        store: Arc<RwLock<MemoryStore>>,
    }

    impl Embedder for LockCheckingEmbedder {
        fn embed_batch(&self, texts: &[&str]) -> Result<Vec<crate::embed::Embedding>> {
            self.inner.embed_batch(texts)
        }

        fn embed_query(&self, text: &str) -> Result<crate::embed::Embedding> {
            assert!(self.store.try_write().is_ok(), "store locked during encoding");
            self.inner.embed_query(text)
        }

        fn dimension(&self) -> usize {
            self.inner.dimension()
        }

        fn model_name(&self) -> &str {
            self.inner.model_name()
        }

        fn max_input_len(&self) -> usize {
            self.inner.max_input_len()
        }
    }

    #[test]
    fn test_query_encoded_outside_store_lock() {
        let inner = HashEmbedder::default();
        let chunk = make_chunk("a:0", "a", "Player X assists");
        let vector = inner.embed(&chunk.content).unwrap();
        let mut store = MemoryStore::new();
        store.insert(vec![Record::new(chunk, vector, inner.version())]).unwrap();
        let store = Arc::new(RwLock::new(store));

        let embedder = Arc::new(LockCheckingEmbedder {
            inner,
            store: store.clone(),
        });
        let retriever = Retriever::new(embedder, store, config(2));
        assert_eq!(retriever.retrieve("Player X assists", 3, None).unwrap().len(), 1);
    }

    #[test]
    fn test_cap_keeps_order() {
        let result = |id: &str, doc: &str, score: f32, seq: u64| SearchResult {
            chunk: make_chunk(id, doc, "x"),
            score,
            seq,
        };
        let capped = cap_per_document(
            vec![
                result("a:0", "a", 0.9, 0),
                result("a:1", "a", 0.8, 1),
                result("b:0", "b", 0.7, 2),
                result("c:0", "c", 0.6, 3),
            ],
            1,
            2,
        );
        let ids: Vec<&str> = capped.iter().map(|r| r.chunk.id.as_str()).collect();
        assert_eq!(ids, vec!["a:0", "b:0"]);
    }
}
