use crate::chunk::{Chunk, Chunker, build_chunks, spans, validate};
use crate::document::Document;
use crate::Result;

/// Fixed-size chunker - splits by byte count
///
/// Good for: baseline experiments, consistent chunk sizes
///
/// Each chunk is as long as `max_length` allows (on a UTF-8 boundary); the
/// next one starts `overlap` bytes before the previous end.
#[derive(Debug, Clone)]
pub struct FixedSizeChunker {
    max_length: usize,
    overlap: usize,
}

impl FixedSizeChunker {
    /// Fails with `InvalidConfig` unless `overlap < max_length`.
    pub fn new(max_length: usize, overlap: usize) -> Result<Self> {
        validate(max_length, overlap)?;
        Ok(Self { max_length, overlap })
    }
}

impl Chunker for FixedSizeChunker {
    fn name(&self) -> &str {
        "fixed"
    }

    fn chunk(&self, document: &Document) -> Vec<Chunk> {
        let spans = spans(&document.text, self.max_length, self.overlap, |_, _, _| None);
        build_chunks(document, spans)
    }
}
