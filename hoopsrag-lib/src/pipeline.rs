//! The query interface
//!
//! [`Assistant::ask`] drives one question through the whole pipeline:
//! temporal gate, retrieval, context assembly and grounded generation.
//!
//! # Usage
//!
//! ```ignore
//! use hoopsrag_lib::pipeline::{Assistant, AskOptions};
//!
//! let assistant = Assistant::new(embedder, store, generator, config)?;
//! let response = assistant
//!     .ask("How many assists does Player X average?", &AskOptions::default())
//!     .await?;
//! println!("{}", response.answer);
//! ```

use std::sync::{Arc, RwLock};

use serde::Serialize;
use tracing::info;

use crate::answer::{
    Answer, Grounding, GroundedAnswerer, Outcome, QueryStage, RefusalReason, transition,
};
use crate::chunk::floor_char_boundary;
use crate::config::RagConfig;
use crate::context::{AssembledContext, ContextEntry, assemble};
use crate::embed::Embedder;
use crate::generate::Generator;
use crate::rerank::{NoReranker, Reranker};
use crate::retrieve::{RetrievalFilter, Retriever};
use crate::store::VectorStore;
use crate::{Error, Result};

/// Longest excerpt returned per source, in bytes.
const EXCERPT_LEN: usize = 300;

/// Per-question parameters; unset fields fall back to the config.
#[derive(Debug, Clone, Default)]
pub struct AskOptions {
    pub top_k: Option<usize>,
    pub model: Option<String>,
    pub filter: Option<RetrievalFilter>,
}

/// A document the answer draws on.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Source {
    pub document_id: String,
    pub excerpt: String,
    pub score: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AskResponse {
    pub answer: String,
    pub sources: Vec<Source>,
    pub outcome: Outcome,
    pub grounding: Grounding,
}

impl AskResponse {
    fn without_sources(answer: Answer) -> Self {
        Self {
            answer: answer.text,
            sources: Vec::new(),
            outcome: answer.outcome,
            grounding: answer.grounding,
        }
    }
}

/// Retrieval plus grounded answering behind one call.
pub struct Assistant<E: Embedder, S: VectorStore, G: Generator, R: Reranker = NoReranker> {
    retriever: Arc<Retriever<E, S, R>>,
    answerer: GroundedAnswerer<G>,
    config: RagConfig,
}

impl<E: Embedder + 'static, S: VectorStore + 'static, G: Generator> Assistant<E, S, G, NoReranker> {
    /// # Errors
    /// [`Error::InvalidConfig`] when `config` does not validate.
    pub fn new(
        embedder: Arc<E>,
        store: Arc<RwLock<S>>,
        generator: G,
        config: RagConfig,
    ) -> Result<Self> {
        let retriever = Retriever::new(embedder, store, config.retrieval.clone());
        Self::with_retriever(retriever, generator, config)
    }
}

impl<E, S, G, R> Assistant<E, S, G, R>
where
    E: Embedder + 'static,
    S: VectorStore + 'static,
    G: Generator,
    R: Reranker + 'static,
{
    /// Build around an existing retriever, e.g. one with reranking.
    pub fn with_retriever(
        retriever: Retriever<E, S, R>,
        generator: G,
        config: RagConfig,
    ) -> Result<Self> {
        config.validate()?;
        let answerer = GroundedAnswerer::new(generator, config.generation.clone(), config.seasons);
        Ok(Self {
            retriever: Arc::new(retriever),
            answerer,
            config,
        })
    }

    /// Answer `question` from the ingested documents.
    ///
    /// Refusals (future period, nothing found, empty corpus) are successful
    /// responses with a fixed text.
    ///
    /// # Errors
    /// [`Error::InvalidConfig`] for an out-of-range `top_k` or unknown
    /// model; generation errors (see [`Error::is_retryable`]).
    pub async fn ask(&self, question: &str, options: &AskOptions) -> Result<AskResponse> {
        transition(QueryStage::Received);
        let top_k = self
            .config
            .check_top_k(options.top_k.unwrap_or(self.config.retrieval.top_k))?;
        let model = options
            .model
            .as_deref()
            .unwrap_or(&self.config.generation.model);
        self.config.check_model(model)?;

        if let Some(refusal) = self.answerer.temporal_gate(question) {
            return Ok(AskResponse::without_sources(refusal));
        }

        transition(QueryStage::Retrieving);
        let retriever = Arc::clone(&self.retriever);
        let query = question.to_owned();
        let filter = options.filter.clone();
        let retrieved =
            tokio::task::spawn_blocking(move || retriever.retrieve(&query, top_k, filter.as_ref()))
                .await
                .map_err(|e| Error::Store(format!("retrieval task failed: {e}")))?;
        let results = match retrieved {
            Ok(results) => results,
            Err(Error::EmptyCorpus) => {
                info!("no documents ingested; answering not found");
                return Ok(AskResponse::without_sources(Answer::not_found(
                    RefusalReason::EmptyCorpus,
                )));
            }
            Err(e) => return Err(e),
        };

        let context = assemble(&results, self.config.context.budget);
        transition(QueryStage::ContextAssembled);
        info!(
            top_k,
            model,
            retrieved = results.len(),
            context_bytes = context.text.len(),
            truncated = context.truncated,
            "context assembled"
        );

        let answer = self.answerer.answer(question, &context, model).await?;
        let sources = match answer.outcome {
            Outcome::Answered => sources(&context, &answer.cited),
            Outcome::Refused(_) => Vec::new(),
        };

        Ok(AskResponse {
            answer: answer.text,
            sources,
            outcome: answer.outcome,
            grounding: answer.grounding,
        })
    }

    #[must_use]
    pub fn retriever(&self) -> &Retriever<E, S, R> {
        &self.retriever
    }

    #[must_use]
    pub fn answerer(&self) -> &GroundedAnswerer<G> {
        &self.answerer
    }

    #[must_use]
    pub fn config(&self) -> &RagConfig {
        &self.config
    }
}

/// Cited documents, or every context document when nothing is cited.
fn sources(context: &AssembledContext, cited: &[usize]) -> Vec<Source> {
    context
        .sources()
        .into_iter()
        .filter(|entry| cited.is_empty() || cited.contains(&entry.marker))
        .map(source)
        .collect()
}

fn source(entry: &ContextEntry) -> Source {
    let excerpt = if entry.excerpt.len() > EXCERPT_LEN {
        let cut = floor_char_boundary(&entry.excerpt, EXCERPT_LEN);
        format!("{}...", entry.excerpt[..cut].trim_end())
    } else {
        entry.excerpt.clone()
    };
    Source {
        document_id: entry.document_id.clone(),
        excerpt,
        score: entry.score,
    }
}
