//! Text embedding
//!
//! Two backends implement [`Embedder`]:
//! - [`BgeEmbedder`]: BAAI/bge-large-en-v1.5 via the fastembed crate (ONNX
//!   runtime), 1024 dimensions, 512 token input limit
//! - [`HashEmbedder`]: deterministic feature hashing, no model download;
//!   used for offline runs and tests
//!
//! Every embedder carries an [`EncoderVersion`]. The vector store pins the
//! version of its first insert and refuses vectors from any other encoder.
//!
//! Inputs the encoder cannot take whole are rejected with
//! [`Error::Encoding`]; embedders never truncate. [`Embedder::max_input_len`]
//! is a byte bound for sizing chunks, and token-based encoders also check
//! their token window.
//!
//! # Usage
//!
//! ```ignore
//! use hoopsrag_lib::embed::{Embedder, HashEmbedder};
//!
//! let embedder = HashEmbedder::default();
//! let doc_embeddings = embedder.embed_batch(&["Box score...", "Trade report..."])?;
//! let query_embedding = embedder.embed_query("Who leads the league in assists?")?;
//! ```

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// A vector embedding - fixed size array of floats
pub type Embedding = Vec<f32>;

/// Identifies the encoding function that produced a vector.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EncoderVersion(String);

impl EncoderVersion {
    #[must_use]
    pub fn new(model_name: &str, dimension: usize) -> Self {
        Self(format!("{model_name}@{dimension}"))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EncoderVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Trait for text embedding models
pub trait Embedder: Send + Sync {
    /// Embed multiple texts for indexing, preserving input order
    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Embedding>>;

    /// Embed a single text for indexing
    fn embed(&self, text: &str) -> Result<Embedding> {
        self.embed_batch(&[text])?
            .into_iter()
            .next()
            .ok_or_else(|| Error::Encoding("model returned no embeddings".to_string()))
    }

    /// Embed a single query for searching
    ///
    /// Note: Some models (like BGE) use different prompts for queries vs documents.
    /// This method handles that distinction.
    fn embed_query(&self, text: &str) -> Result<Embedding> {
        self.embed(text)
    }

    /// Returns the embedding dimension
    fn dimension(&self) -> usize;

    /// Returns the model name/identifier
    fn model_name(&self) -> &str;

    /// Longest accepted input, in bytes
    fn max_input_len(&self) -> usize;

    fn version(&self) -> EncoderVersion {
        EncoderVersion::new(self.model_name(), self.dimension())
    }
}

impl<E: Embedder + ?Sized> Embedder for Box<E> {
    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Embedding>> {
        (**self).embed_batch(texts)
    }

    fn embed(&self, text: &str) -> Result<Embedding> {
        (**self).embed(text)
    }

    fn embed_query(&self, text: &str) -> Result<Embedding> {
        (**self).embed_query(text)
    }

    fn dimension(&self) -> usize {
        (**self).dimension()
    }

    fn model_name(&self) -> &str {
        (**self).model_name()
    }

    fn max_input_len(&self) -> usize {
        (**self).max_input_len()
    }
}

impl<E: Embedder + ?Sized> Embedder for Arc<E> {
    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Embedding>> {
        (**self).embed_batch(texts)
    }

    fn embed(&self, text: &str) -> Result<Embedding> {
        (**self).embed(text)
    }

    fn embed_query(&self, text: &str) -> Result<Embedding> {
        (**self).embed_query(text)
    }

    fn dimension(&self) -> usize {
        (**self).dimension()
    }

    fn model_name(&self) -> &str {
        (**self).model_name()
    }

    fn max_input_len(&self) -> usize {
        (**self).max_input_len()
    }
}

/// Embedding backend selector used by configuration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmbedderKind {
    #[default]
    Bge,
    Hash,
}

impl EmbedderKind {
    /// Loads the selected backend. BGE downloads its model on first use.
    pub fn load(self) -> Result<Box<dyn Embedder>> {
        Ok(match self {
            Self::Bge => Box::new(BgeEmbedder::new()?),
            Self::Hash => Box::new(HashEmbedder::default()),
        })
    }
}

/// Rejects any input longer than `max_len` bytes.
fn check_input_lengths(texts: &[&str], max_len: usize) -> Result<()> {
    match texts.iter().enumerate().find(|(_, t)| t.len() > max_len) {
        Some((i, t)) => Err(Error::Encoding(format!(
            "input {i} is {} bytes, encoder limit is {max_len}",
            t.len()
        ))),
        None => Ok(()),
    }
}

mod bge;
mod hash;

pub use bge::*;
pub use hash::*;
