use std::sync::Mutex;

use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};

use crate::embed::{Embedder, Embedding, check_input_lengths};
use crate::{Error, Result};

/// Byte budget used to size chunks; the token window is checked separately.
const BGE_MAX_INPUT_BYTES: usize = 1536;

/// Model token window, special tokens included.
const BGE_MAX_TOKENS: usize = 512;

/// Instruction BGE expects in front of search queries.
const QUERY_PREFIX: &str = "Represent this sentence for searching relevant passages: ";

/// BGE embedder using BAAI/bge-large-en-v1.5.
///
/// Uses fastembed for ONNX-based inference. This model produces 1024-dimensional
/// embeddings and supports up to 512 tokens per input.
pub struct BgeEmbedder {
    model: Mutex<TextEmbedding>,
}

impl BgeEmbedder {
    /// Create a new BGE embedder.
    ///
    /// Downloads the model on first use (~1.2GB).
    pub fn new() -> Result<Self> {
        let opts = InitOptions::new(EmbeddingModel::BGELargeENV15)
            .with_show_download_progress(true);

        TextEmbedding::try_new(opts)
            .map(|model| Self {
                model: Mutex::new(model),
            })
            .map_err(|e| Error::Encoding(e.to_string()))
    }

    /// Embeds `texts` exactly as given.
    ///
    /// The model's tokenizer truncates silently, so every input is tokenized
    /// first and anything that overflows the window is refused.
    fn run(&self, texts: &[&str]) -> Result<Vec<Embedding>> {
        let mut model = self
            .model
            .lock()
            .map_err(|_| Error::Encoding("embedding model lock poisoned".to_string()))?;

        for (i, text) in texts.iter().enumerate() {
            let encoding = model
                .tokenizer
                .encode(*text, true)
                .map_err(|e| Error::Encoding(e.to_string()))?;
            let overflow: usize = encoding.get_overflowing().iter().map(|o| o.len()).sum();
            check_token_count(i, encoding.len() + overflow)?;
        }

        model
            .embed(texts, None)
            .map_err(|e| Error::Encoding(e.to_string()))
    }
}

impl Embedder for BgeEmbedder {
    fn model_name(&self) -> &str {
        "BAAI/bge-large-en-v1.5"
    }

    fn dimension(&self) -> usize {
        1024
    }

    fn max_input_len(&self) -> usize {
        BGE_MAX_INPUT_BYTES
    }

    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Embedding>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        check_input_lengths(texts, BGE_MAX_INPUT_BYTES)?;
        self.run(texts)
    }

    fn embed_query(&self, text: &str) -> Result<Embedding> {
        // the prefix counts against the window too
        let query_text = format!("{QUERY_PREFIX}{text}");
        check_input_lengths(&[query_text.as_str()], BGE_MAX_INPUT_BYTES)?;

        self.run(&[query_text.as_str()])?
            .into_iter()
            .next()
            .ok_or_else(|| Error::Encoding("model returned no embeddings".to_string()))
    }
}

fn check_token_count(index: usize, tokens: usize) -> Result<()> {
    if tokens > BGE_MAX_TOKENS {
        return Err(Error::Encoding(format!(
            "input {index} is {tokens} tokens, encoder limit is {BGE_MAX_TOKENS}"
        )));
    }
    Ok(())
}
