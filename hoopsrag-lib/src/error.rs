//! Error types for HoopsRAG

use thiserror::Error;

/// Result type alias for HoopsRAG operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in HoopsRAG operations
#[derive(Error, Debug)]
pub enum Error {
    /// Chunking, store or retrieval parameters are unusable
    #[error("invalid config: {0}")]
    InvalidConfig(String),

    /// An ingestion document is missing required fields or cannot be parsed
    #[error("malformed input in {source_id}: {reason}")]
    MalformedInput { source_id: String, reason: String },

    /// Failed to load or run the embedding model, or the input was too long
    #[error("encoding error: {0}")]
    Encoding(String),

    /// The vector store holds no records
    #[error("the corpus is empty")]
    EmptyCorpus,

    /// Embeddings from two different encoders were mixed
    #[error("encoder mismatch: store uses {expected}, got {actual}")]
    EncoderMismatch { expected: String, actual: String },

    /// A vector's length does not match the store's dimension
    #[error("dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// Failed to store or load records
    #[error("store error: {0}")]
    Store(String),

    /// Failed to load or run the reranking model
    #[error("reranking error: {0}")]
    Reranking(String),

    /// The generation service did not answer in time
    #[error("generation timed out after {0}s")]
    GenerationTimeout(u64),

    /// The generation service rejected the call for rate or quota reasons
    #[error("generation quota exceeded: {0}")]
    GenerationQuotaExceeded(String),

    /// The generation service answered with something unusable
    #[error("malformed generation response: {0}")]
    GenerationMalformed(String),

    /// Any other generation service failure
    #[error("generation error: {0}")]
    Generation(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Builds a [`Error::MalformedInput`] for the given source.
    pub fn malformed(source_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::MalformedInput {
            source_id: source_id.into(),
            reason: reason.into(),
        }
    }

    /// True for per-query failures the caller may simply try again.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::GenerationTimeout(_)
                | Self::GenerationQuotaExceeded(_)
                | Self::GenerationMalformed(_)
                | Self::Generation(_)
        )
    }

    /// Short message suitable for showing to an end user.
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::GenerationTimeout(_) => {
                "The answer service took too long to respond. Please try again.".to_string()
            }
            Self::GenerationQuotaExceeded(_) => {
                "The answer service is busy right now. Please try again in a moment.".to_string()
            }
            e if e.is_retryable() => {
                "The answer service failed to respond properly. Please try again.".to_string()
            }
            e => e.to_string(),
        }
    }
}
