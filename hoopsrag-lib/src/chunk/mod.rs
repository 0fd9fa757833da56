//! Document chunking strategies
//!
//! Both strategies share one contract: chunks are at most `max_length` bytes,
//! adjacent chunks overlap by exactly `overlap` bytes (rounded to a char
//! boundary for multi-byte text), and together they cover the whole
//! document in order. They differ only in where a chunk is allowed to end:
//! - [`FixedSizeChunker`]: anywhere, as late as possible
//! - [`BoundaryChunker`]: preferably after a row/paragraph break, then after
//!   a sentence, so a stat row or sentence is not severed
//!
//! # Usage
//!
//! ```ignore
//! use hoopsrag_lib::chunk::{BoundaryChunker, Chunker};
//!
//! let chunker = BoundaryChunker::new(800, 120)?;
//! let chunks = chunker.chunk(&document);
//! ```

use std::ops::Range;

use serde::{Deserialize, Serialize};

use crate::document::{Document, DocumentKind};
use crate::season::Season;
use crate::{Error, Result};

/// A chunk of text with its metadata
#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
pub struct Chunk {
    /// Unique identifier, `<document id>:<start offset>`
    pub id: String,
    /// The text content of this chunk
    pub content: String,
    /// Metadata about the source and position
    pub metadata: ChunkMetadata,
}

/// Metadata associated with a chunk
#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
pub struct ChunkMetadata {
    /// Source document identifier
    pub document_id: String,
    /// Source document kind
    pub kind: DocumentKind,
    /// Season inherited from the document
    pub season: Season,
    /// Byte range within the document text
    pub range: Range<usize>,
    /// Position among the document's chunks (0-indexed)
    pub position: usize,
    /// Total number of chunks from this document
    pub total_chunks: usize,
}

impl Chunk {
    /// Rough token count (four bytes per token).
    #[must_use]
    pub fn token_estimate(&self) -> usize {
        self.content.len().div_ceil(4)
    }
}

/// Trait for document chunking strategies
pub trait Chunker: Send + Sync {
    /// Split a document into ordered, overlapping chunks
    fn chunk(&self, document: &Document) -> Vec<Chunk>;

    /// Returns the name of this chunking strategy
    fn name(&self) -> &str;
}

/// Chunking strategy selector used by configuration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChunkStrategy {
    Fixed,
    #[default]
    Boundary,
}

impl ChunkStrategy {
    /// Builds the chunker for this strategy, validating its parameters.
    pub fn build(self, max_length: usize, overlap: usize) -> Result<Box<dyn Chunker>> {
        Ok(match self {
            Self::Fixed => Box::new(FixedSizeChunker::new(max_length, overlap)?),
            Self::Boundary => Box::new(BoundaryChunker::new(max_length, overlap)?),
        })
    }
}

/// Chunks one document with the boundary-aware strategy.
pub fn chunk_document(document: &Document, max_length: usize, overlap: usize) -> Result<Vec<Chunk>> {
    Ok(BoundaryChunker::new(max_length, overlap)?.chunk(document))
}

/// Widest UTF-8 character; any shorter window could split one.
pub const MIN_CHUNK_LENGTH: usize = 4;

fn validate(max_length: usize, overlap: usize) -> Result<()> {
    if max_length < MIN_CHUNK_LENGTH {
        return Err(Error::InvalidConfig(format!(
            "chunk max_length ({max_length}) must be at least {MIN_CHUNK_LENGTH} bytes"
        )));
    }
    if overlap >= max_length {
        return Err(Error::InvalidConfig(format!(
            "chunk overlap ({overlap}) must be smaller than max_length ({max_length})"
        )));
    }
    Ok(())
}

/// Computes chunk spans over `text`.
///
/// `snap(text, min_end, limit)` may pick an end in `min_end..=limit`;
/// otherwise the chunk ends at `limit`. Every end lies past
/// `start + overlap`, so the next start always advances.
fn spans<F>(text: &str, max_length: usize, overlap: usize, snap: F) -> Vec<Range<usize>>
where
    F: Fn(&str, usize, usize) -> Option<usize>,
{
    let len = text.len();
    let mut spans = Vec::new();
    let mut start = 0;

    while start < len {
        let limit = start + max_length;
        let mut end = if limit >= len {
            len
        } else {
            snap(text, start + overlap + 1, limit)
                .unwrap_or_else(|| floor_char_boundary(text, limit))
        };
        // a single char wider than max_length
        if end <= start {
            end = ceil_char_boundary(text, start + 1);
        }
        spans.push(start..end);
        if end == len {
            break;
        }

        let mut next = floor_char_boundary(text, end - overlap.min(end));
        if next <= start {
            next = ceil_char_boundary(text, start + 1);
        }
        start = next;
    }

    spans
}

fn build_chunks(document: &Document, spans: Vec<Range<usize>>) -> Vec<Chunk> {
    let total = spans.len();
    spans
        .into_iter()
        .enumerate()
        .map(|(position, range)| Chunk {
            id: format!("{}:{}", document.id, range.start),
            content: document.text[range.clone()].to_string(),
            metadata: ChunkMetadata {
                document_id: document.id.clone(),
                kind: document.kind,
                season: document.season,
                range,
                position,
                total_chunks: total,
            },
        })
        .collect()
}

pub(crate) fn floor_char_boundary(s: &str, index: usize) -> usize {
    if index >= s.len() {
        return s.len();
    }
    (0..=index).rev().find(|&i| s.is_char_boundary(i)).unwrap_or(0)
}

pub(crate) fn ceil_char_boundary(s: &str, index: usize) -> usize {
    if index >= s.len() {
        return s.len();
    }
    (index..s.len()).find(|&i| s.is_char_boundary(i)).unwrap_or(s.len())
}

mod boundary;
mod fixed;

pub use boundary::*;
pub use fixed::*;

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn doc(text: &str) -> Document {
        Document::new("doc", DocumentKind::Article, Season::new(2024), text)
    }

    /// Asserts full in-order coverage and exact overlap between neighbours.
    pub(crate) fn assert_contract(text: &str, chunks: &[Chunk], max_length: usize, overlap: usize) {
        if text.is_empty() {
            assert!(chunks.is_empty());
            return;
        }
        assert_eq!(chunks.first().unwrap().metadata.range.start, 0);
        assert_eq!(chunks.last().unwrap().metadata.range.end, text.len());
        for chunk in chunks {
            assert!(chunk.content.len() <= max_length, "chunk too long: {chunk:?}");
            assert_eq!(chunk.content, &text[chunk.metadata.range.clone()]);
        }
        for pair in chunks.windows(2) {
            let (a, b) = (&pair[0].metadata.range, &pair[1].metadata.range);
            assert!(b.start > a.start, "chunks out of order");
            assert_eq!(a.end - b.start, overlap, "overlap mismatch at {a:?} / {b:?}");
        }
    }

    #[test]
    fn test_overlap_must_be_smaller_than_max_length() {
        assert!(matches!(
            FixedSizeChunker::new(10, 10),
            Err(Error::InvalidConfig(_))
        ));
        assert!(matches!(
            BoundaryChunker::new(10, 12),
            Err(Error::InvalidConfig(_))
        ));
        assert!(chunk_document(&doc("abc"), 0, 0).is_err());
    }

    #[test]
    fn test_window_narrower_than_a_char_is_invalid() {
        assert!(matches!(
            FixedSizeChunker::new(3, 0),
            Err(Error::InvalidConfig(_))
        ));

        let text = "👋👋👋";
        let chunks = FixedSizeChunker::new(MIN_CHUNK_LENGTH, 0).unwrap().chunk(&doc(text));
        assert_eq!(chunks.len(), 3);
        assert!(chunks.iter().all(|c| c.content.len() <= MIN_CHUNK_LENGTH));
    }

    #[test]
    fn test_contract_holds_across_configs() {
        let text = "Player X (Team Z), 2024-25 season: assists per game 10.2, points 21.4\n\
                    Player W (Team Y), 2024-25 season: assists per game 3.3\n\
                    Team Y won eleven straight. Their defense held opponents under 100 points! \
                    Was it luck? The schedule was soft, but the margin was real.\n\n\
                    Player X traded to Team Y in December 2024.";
        for &(max_length, overlap) in &[(16, 0), (16, 5), (40, 10), (64, 63), (500, 20), (33, 1)] {
            for strategy in [ChunkStrategy::Fixed, ChunkStrategy::Boundary] {
                let chunker = strategy.build(max_length, overlap).unwrap();
                let chunks = chunker.chunk(&doc(text));
                assert_contract(text, &chunks, max_length, overlap);
            }
        }
    }

    #[test]
    fn test_chunk_ids_derive_from_document_and_offset() {
        let chunks = FixedSizeChunker::new(10, 2).unwrap().chunk(&doc("0123456789abcdefghij"));
        assert_eq!(chunks[0].id, "doc:0");
        assert_eq!(chunks[1].id, "doc:8");
        assert!(chunks.iter().all(|c| c.metadata.total_chunks == chunks.len()));
        assert_eq!(chunks[1].metadata.position, 1);
    }

    #[test]
    fn test_metadata_inherited() {
        let chunks = chunk_document(&doc("Short text."), 100, 10).unwrap();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].metadata.document_id, "doc");
        assert_eq!(chunks[0].metadata.season, Season::new(2024));
        assert_eq!(chunks[0].metadata.kind, DocumentKind::Article);
    }

    #[test]
    fn test_char_boundaries() {
        let s = "a👋b";
        assert_eq!(floor_char_boundary(s, 2), 1);
        assert_eq!(ceil_char_boundary(s, 2), 5);
        assert_eq!(floor_char_boundary(s, 99), s.len());
    }
}
