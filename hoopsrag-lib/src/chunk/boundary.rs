use crate::chunk::{Chunk, Chunker, build_chunks, spans, validate};
use crate::document::Document;
use crate::Result;

/// Boundary-aware chunker - ends chunks on row, paragraph or sentence breaks
///
/// Good for: stat tables (one row per line) and prose articles
///
/// Within the allowed window a chunk ends at the last line break; failing
/// that, at the last sentence end (`.`, `!` or `?` followed by whitespace);
/// failing that, at `max_length`. The overlap with the next chunk stays
/// exactly `overlap`.
#[derive(Debug, Clone)]
pub struct BoundaryChunker {
    max_length: usize,
    overlap: usize,
}

impl BoundaryChunker {
    /// Fails with `InvalidConfig` unless `overlap < max_length`.
    pub fn new(max_length: usize, overlap: usize) -> Result<Self> {
        validate(max_length, overlap)?;
        Ok(Self { max_length, overlap })
    }
}

impl Chunker for BoundaryChunker {
    fn name(&self) -> &str {
        "boundary"
    }

    fn chunk(&self, document: &Document) -> Vec<Chunk> {
        let spans = spans(&document.text, self.max_length, self.overlap, snap_to_boundary);
        build_chunks(document, spans)
    }
}

/// Last break position in `min_end..=limit`, line breaks first.
///
/// Positions directly follow an ASCII byte, so they are always valid
/// `str` slice boundaries.
fn snap_to_boundary(text: &str, min_end: usize, limit: usize) -> Option<usize> {
    let bytes = text.as_bytes();
    if min_end > limit || limit >= bytes.len() {
        return None;
    }

    let line_break = (min_end..=limit).rev().find(|&p| bytes[p - 1] == b'\n');
    line_break.or_else(|| {
        (min_end..=limit)
            .rev()
            .find(|&p| matches!(bytes[p - 1], b'.' | b'!' | b'?') && bytes[p].is_ascii_whitespace())
    })
}
