//! Corpus ingestion
//!
//! ```text
//! files -> Normalizer -> Documents --(rayon, per document)--> chunk -> embed
//!                                                                       |
//!                                       single writer: delete(doc) + insert(records)
//! ```
//!
//! Documents are independent, so chunking and embedding fan out across the
//! rayon pool. Writes happen afterwards under one write lock. Re-ingesting a
//! document replaces all of its earlier chunks.
//!
//! Failures stay local: an unreadable or malformed file is skipped, a chunk
//! the encoder rejects is dropped, and both are counted in the
//! [`IngestReport`].

use std::collections::HashSet;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use rayon::prelude::*;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::chunk::{Chunk, Chunker};
use crate::config::{RagConfig, SourceWeights};
use crate::document::{Document, DocumentKind, Normalizer};
use crate::embed::Embedder;
use crate::store::{Record, VectorStore};
use crate::{Error, Result};

const EMBED_BATCH_SIZE: usize = 32;

/// A source that could not be ingested.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedSource {
    pub source: String,
    pub reason: String,
}

/// Counts from one ingestion run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IngestReport {
    /// Documents written to the store
    pub documents: usize,
    pub chunks_inserted: usize,
    /// Chunks the encoder refused
    pub rejected_chunks: usize,
    pub skipped: Vec<SkippedSource>,
}

impl fmt::Display for IngestReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} documents, {} chunks inserted, {} chunks rejected, {} sources skipped",
            self.documents,
            self.chunks_inserted,
            self.rejected_chunks,
            self.skipped.len()
        )
    }
}

/// Chunks, embeddings and rejections for one document.
struct Prepared {
    document_id: String,
    records: Vec<Record>,
    rejected: usize,
}

/// Writes documents into a shared vector store.
pub struct Indexer<E: Embedder, S: VectorStore> {
    embedder: Arc<E>,
    store: Arc<RwLock<S>>,
    chunker: Box<dyn Chunker>,
    normalizer: Normalizer,
    weights: SourceWeights,
}

impl<E: Embedder, S: VectorStore> Indexer<E, S> {
    /// # Errors
    /// [`Error::InvalidConfig`] for unusable chunking parameters, or chunks
    /// that could exceed the encoder's input limit.
    pub fn new(embedder: Arc<E>, store: Arc<RwLock<S>>, config: &RagConfig) -> Result<Self> {
        let chunking = &config.chunking;
        let chunker = chunking.strategy.build(chunking.max_length, chunking.overlap)?;
        if chunking.max_length > embedder.max_input_len() {
            return Err(Error::InvalidConfig(format!(
                "chunking.max_length ({}) exceeds the {} input limit ({} bytes)",
                chunking.max_length,
                embedder.model_name(),
                embedder.max_input_len()
            )));
        }

        Ok(Self {
            embedder,
            store,
            chunker,
            normalizer: Normalizer::new(config.seasons),
            weights: config.retrieval.source_weights.clone(),
        })
    }

    /// Chunk, embed and store `documents`, replacing earlier versions.
    ///
    /// A document whose id already appeared earlier in the batch is skipped
    /// and reported as malformed.
    ///
    /// # Errors
    /// Store errors such as an encoder mismatch abort the run before anything
    /// is written; per-chunk encoding failures do not.
    pub fn ingest(&self, documents: Vec<Document>) -> Result<IngestReport> {
        let mut report = IngestReport::default();
        let mut seen = HashSet::new();
        let documents: Vec<Document> = documents
            .into_iter()
            .filter(|document| {
                if seen.insert(document.id.clone()) {
                    return true;
                }
                let e = Error::malformed(&document.id, "duplicate document id in batch");
                warn!(document = %document.id, error = %e, "skipping source");
                report.skipped.push(SkippedSource {
                    source: document.id.clone(),
                    reason: e.to_string(),
                });
                false
            })
            .collect();

        let prepared: Vec<Prepared> = documents
            .par_iter()
            .map(|document| self.prepare(document))
            .collect();

        let mut store = self
            .store
            .write()
            .map_err(|_| Error::Store("vector store lock poisoned".to_string()))?;

        for doc in &prepared {
            store.check(&doc.records)?;
        }

        for doc in prepared {
            let (removed, inserted) = store.replace_document(&doc.document_id, doc.records)?;
            debug!(
                document = %doc.document_id,
                removed,
                inserted,
                rejected = doc.rejected,
                "stored document"
            );
            report.documents += 1;
            report.chunks_inserted += inserted;
            report.rejected_chunks += doc.rejected;
        }

        info!(
            documents = report.documents,
            chunks = report.chunks_inserted,
            rejected = report.rejected_chunks,
            skipped = report.skipped.len(),
            total = store.len(),
            "ingested"
        );
        Ok(report)
    }

    /// Normalize every supported file under `paths`, then ingest.
    ///
    /// Directories are walked recursively; files with an unknown extension
    /// are ignored. A file found under a directory is identified by its path
    /// relative to that directory (`2024/recap.txt`), a file given directly
    /// by its name. Files that fail to normalize are skipped and reported.
    pub fn ingest_paths(&self, paths: &[PathBuf]) -> Result<IngestReport> {
        let mut files = Vec::new();
        for path in paths {
            let root = if path.is_dir() {
                path.as_path()
            } else {
                path.parent().unwrap_or(Path::new(""))
            };
            collect_files(root, path, &mut files)?;
        }
        files.sort();
        files.dedup_by(|a, b| a.path == b.path);

        let mut documents = Vec::new();
        let mut skipped = Vec::new();
        for file in &files {
            match self.normalizer.normalize_file_as(&file.path, &file.source_id) {
                Ok(docs) => {
                    debug!(file = %file.path.display(), documents = docs.len(), "normalized");
                    documents.extend(docs);
                }
                Err(e) => {
                    warn!(file = %file.path.display(), error = %e, "skipping source");
                    skipped.push(SkippedSource {
                        source: file.path.display().to_string(),
                        reason: e.to_string(),
                    });
                }
            }
        }

        let mut report = self.ingest(documents)?;
        skipped.append(&mut report.skipped);
        report.skipped = skipped;
        Ok(report)
    }

    fn prepare(&self, document: &Document) -> Prepared {
        let chunks = self.chunker.chunk(document);
        let weight = self.weights.for_kind(document.kind);
        let encoder = self.embedder.version();

        let mut records = Vec::with_capacity(chunks.len());
        let mut rejected = 0;
        for batch in chunks.chunks(EMBED_BATCH_SIZE) {
            for (chunk, embedding) in self.embed_batch(batch) {
                match embedding {
                    Ok(embedding) => records.push(
                        Record::new(chunk.clone(), embedding, encoder.clone()).with_weight(weight),
                    ),
                    Err(e) => {
                        warn!(chunk = %chunk.id, error = %e, "rejected chunk");
                        rejected += 1;
                    }
                }
            }
        }

        Prepared {
            document_id: document.id.clone(),
            records,
            rejected,
        }
    }

    /// Embeds a batch, falling back to one call per chunk when the batch
    /// fails so a single bad chunk is isolated.
    fn embed_batch<'c>(&self, batch: &'c [Chunk]) -> Vec<(&'c Chunk, Result<Vec<f32>>)> {
        let texts: Vec<&str> = batch.iter().map(|c| c.content.as_str()).collect();
        match self.embedder.embed_batch(&texts) {
            Ok(embeddings) if embeddings.len() == batch.len() => {
                batch.iter().zip(embeddings.into_iter().map(Ok)).collect()
            }
            _ => batch
                .iter()
                .map(|chunk| (chunk, self.embedder.embed(&chunk.content)))
                .collect(),
        }
    }

    #[must_use]
    pub fn normalizer(&self) -> &Normalizer {
        &self.normalizer
    }
}

/// A file to ingest and the id its documents derive from.
#[derive(Debug, PartialEq, Eq, PartialOrd, Ord)]
struct SourceFile {
    path: PathBuf,
    source_id: String,
}

fn collect_files(root: &Path, path: &Path, files: &mut Vec<SourceFile>) -> Result<()> {
    if path.is_dir() {
        for entry in fs::read_dir(path)? {
            collect_files(root, &entry?.path(), files)?;
        }
    } else if DocumentKind::from_path(path).is_some() {
        files.push(SourceFile {
            path: path.to_path_buf(),
            source_id: source_id(root, path),
        });
    } else {
        debug!(file = %path.display(), "ignoring unsupported file");
    }
    Ok(())
}

/// `path` relative to `root`, `/`-separated on every platform.
fn source_id(root: &Path, path: &Path) -> String {
    let relative = path.strip_prefix(root).unwrap_or(path);
    relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}
