//! Context assembly
//!
//! Packs retrieval results into the text handed to the generator. Each
//! block is prefixed with a citation marker `[n]` that is stable per source
//! document: two chunks of the same document share a marker.
//!
//! ```text
//! [1] stats.csv#2024-25
//! Player X (Team Z), 2024-25 season: assists per game 10.2
//!
//! [2] trade.txt
//! Player X traded to Team Y ...
//! ```
//!
//! Results are taken greedily in score order and assembly stops at the first
//! block that would push the text over budget. A first block that is too
//! large on its own is cut to fit and flagged.

use std::collections::HashMap;

use crate::chunk::floor_char_boundary;
use crate::store::SearchResult;

const BLOCK_SEPARATOR: &str = "\n\n";

/// One chunk included in the context.
#[derive(Debug, Clone, PartialEq)]
pub struct ContextEntry {
    /// Citation number, 1-based, shared by chunks of one document
    pub marker: usize,
    pub document_id: String,
    pub chunk_id: String,
    /// The chunk text as included (possibly cut short)
    pub excerpt: String,
    pub score: f32,
    pub truncated: bool,
}

/// Context text plus the entries it was built from.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AssembledContext {
    pub text: String,
    pub entries: Vec<ContextEntry>,
    /// Set when any included chunk was cut short
    pub truncated: bool,
}

impl AssembledContext {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Document a citation marker refers to.
    #[must_use]
    pub fn document_for(&self, marker: usize) -> Option<&str> {
        self.entries
            .iter()
            .find(|e| e.marker == marker)
            .map(|e| e.document_id.as_str())
    }

    /// First entry of every cited document, in marker order.
    #[must_use]
    pub fn sources(&self) -> Vec<&ContextEntry> {
        let mut seen = Vec::new();
        self.entries
            .iter()
            .filter(|e| {
                if seen.contains(&e.marker) {
                    false
                } else {
                    seen.push(e.marker);
                    true
                }
            })
            .collect()
    }
}

/// Build the context for `results` (best first) within `budget` bytes.
#[must_use]
pub fn assemble(results: &[SearchResult], budget: usize) -> AssembledContext {
    let mut context = AssembledContext::default();
    let mut markers: HashMap<&str, usize> = HashMap::new();

    for result in results {
        let document_id = result.chunk.metadata.document_id.as_str();
        let next_marker = markers.len() + 1;
        let marker = *markers.entry(document_id).or_insert(next_marker);

        let header = format!("[{marker}] {document_id}\n");
        let separator = if context.text.is_empty() { "" } else { BLOCK_SEPARATOR };
        let needed = separator.len() + header.len() + result.chunk.content.len();

        if context.text.len() + needed <= budget {
            context.text.push_str(separator);
            context.text.push_str(&header);
            context.text.push_str(&result.chunk.content);
            context.entries.push(entry(result, marker, result.chunk.content.clone(), false));
            continue;
        }

        if context.entries.is_empty() {
            // Best chunk alone exceeds the budget: cut it rather than send nothing.
            let mut block = header.clone();
            block.push_str(&result.chunk.content);
            block.truncate(floor_char_boundary(&block, budget));
            let excerpt = block.get(header.len()..).unwrap_or_default().to_string();

            context.text = block;
            context.entries.push(entry(result, marker, excerpt, true));
            context.truncated = true;
        }
        break;
    }

    context
}

fn entry(result: &SearchResult, marker: usize, excerpt: String, truncated: bool) -> ContextEntry {
    ContextEntry {
        marker,
        document_id: result.chunk.metadata.document_id.clone(),
        chunk_id: result.chunk.id.clone(),
        excerpt,
        score: result.score,
        truncated,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::make_chunk;

    fn result(id: &str, doc: &str, content: &str, score: f32) -> SearchResult {
        SearchResult {
            chunk: make_chunk(id, doc, content),
            score,
            seq: 0,
        }
    }

    #[test]
    fn test_markers_stable_per_document() {
        let results = vec![
            result("a:0", "a", "first of a", 0.9),
            result("b:0", "b", "first of b", 0.8),
            result("a:10", "a", "second of a", 0.7),
        ];
        let ctx = assemble(&results, 1000);

        let markers: Vec<usize> = ctx.entries.iter().map(|e| e.marker).collect();
        assert_eq!(markers, vec![1, 2, 1]);
        assert_eq!(ctx.document_for(2), Some("b"));
        assert_eq!(ctx.sources().len(), 2);
        assert!(ctx.text.starts_with("[1] a\nfirst of a\n\n[2] b\n"));
    }

    #[test]
    fn test_budget_never_exceeded() {
        let results: Vec<SearchResult> = (0..10)
            .map(|i| result(&format!("d:{i}"), "d", &"word ".repeat(20), 1.0 - i as f32 * 0.01))
            .collect();

        for budget in [1, 50, 120, 250, 400, 2000] {
            let ctx = assemble(&results, budget);
            assert!(ctx.text.len() <= budget, "budget {budget}");
            assert!(!ctx.is_empty(), "budget {budget}");
        }
    }

    #[test]
    fn test_stops_at_first_block_that_does_not_fit() {
        let results = vec![
            result("a:0", "a", "short", 0.9),
            result("b:0", "b", &"long ".repeat(50), 0.8),
            result("c:0", "c", "tiny", 0.7),
        ];
        let ctx = assemble(&results, 40);

        assert_eq!(ctx.entries.len(), 1);
        assert_eq!(ctx.entries[0].chunk_id, "a:0");
        assert!(!ctx.truncated);
    }

    #[test]
    fn test_oversized_first_chunk_is_truncated() {
        let results = vec![result("a:0", "a", &"assists ".repeat(100), 0.9)];
        let ctx = assemble(&results, 60);

        assert_eq!(ctx.text.len(), 60);
        assert!(ctx.truncated);
        assert!(ctx.entries[0].truncated);
        assert!(ctx.entries[0].excerpt.starts_with("assists"));
    }

    #[test]
    fn test_truncation_respects_char_boundaries() {
        let results = vec![result("a:0", "a", &"é".repeat(100), 0.9)];
        let ctx = assemble(&results, 21);
        assert!(ctx.text.len() <= 21);
        assert!(ctx.entries[0].excerpt.chars().all(|c| c == 'é'));
    }

    #[test]
    fn test_empty_results() {
        let ctx = assemble(&[], 100);
        assert!(ctx.is_empty());
        assert!(ctx.text.is_empty());
    }
}
