use std::collections::{BTreeSet, HashMap, HashSet};
use std::fs::{self, File};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::embed::EncoderVersion;
use crate::store::{Record, SearchResult, Similarity, StoreQuery, VectorStore};
use crate::{Error, Result};

const SNAPSHOT_FORMAT: u32 = 1;

/// In-memory vector store with exact nearest-neighbour search.
///
/// Uses a brute-force linear scan. Suitable for small corpora (thousands of
/// chunks). Persist with [`MemoryStore::save`] and restore with
/// [`MemoryStore::load`].
pub struct MemoryStore {
    records: HashMap<String, StoredRecord>,
    similarity: Similarity,
    encoder: Option<EncoderVersion>,
    dimension: Option<usize>,
    next_seq: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredRecord {
    seq: u64,
    #[serde(flatten)]
    record: Record,
}

#[derive(Debug, Serialize, Deserialize)]
struct SnapshotHeader {
    format: u32,
    similarity: Similarity,
    encoder: Option<EncoderVersion>,
    dimension: Option<usize>,
    records: usize,
}

impl MemoryStore {
    /// Create a new empty in-memory store ranking by cosine similarity.
    #[must_use]
    pub fn new() -> Self {
        Self::with_similarity(Similarity::Cosine)
    }

    #[must_use]
    pub fn with_similarity(similarity: Similarity) -> Self {
        Self {
            records: HashMap::new(),
            similarity,
            encoder: None,
            dimension: None,
            next_seq: 0,
        }
    }

    /// Distinct document ids currently stored.
    #[must_use]
    pub fn document_ids(&self) -> BTreeSet<String> {
        self.records
            .values()
            .map(|r| r.record.chunk.metadata.document_id.clone())
            .collect()
    }

    /// Write a JSON-lines snapshot: a header line, then one record per line
    /// in insertion order.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let mut out = BufWriter::new(File::create(path)?);

        let header = SnapshotHeader {
            format: SNAPSHOT_FORMAT,
            similarity: self.similarity,
            encoder: self.encoder.clone(),
            dimension: self.dimension,
            records: self.records.len(),
        };
        serde_json::to_writer(&mut out, &header)?;
        out.write_all(b"\n")?;

        let mut ordered: Vec<&StoredRecord> = self.records.values().collect();
        ordered.sort_by_key(|r| r.seq);
        for record in ordered {
            serde_json::to_writer(&mut out, record)?;
            out.write_all(b"\n")?;
        }
        out.flush()?;

        info!(path = %path.display(), records = self.records.len(), "saved store snapshot");
        Ok(())
    }

    /// Restore a snapshot written by [`MemoryStore::save`].
    pub fn load(path: &Path) -> Result<Self> {
        let reader = BufReader::new(File::open(path)?);
        let mut lines = reader.lines();

        let header_line = lines
            .next()
            .ok_or_else(|| Error::Store(format!("{} is empty", path.display())))??;
        let header: SnapshotHeader = serde_json::from_str(&header_line)?;
        if header.format != SNAPSHOT_FORMAT {
            return Err(Error::Store(format!(
                "unsupported snapshot format {} in {}",
                header.format,
                path.display()
            )));
        }

        let mut store = Self::with_similarity(header.similarity);
        store.encoder = header.encoder;
        store.dimension = header.dimension;

        for line in lines {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let stored: StoredRecord = serde_json::from_str(&line)?;
            store.next_seq = store.next_seq.max(stored.seq + 1);
            store.records.insert(stored.record.chunk.id.clone(), stored);
        }

        if store.records.len() != header.records {
            return Err(Error::Store(format!(
                "snapshot {} is truncated: expected {} records, found {}",
                path.display(),
                header.records,
                store.records.len()
            )));
        }

        info!(path = %path.display(), records = store.records.len(), "loaded store snapshot");
        Ok(store)
    }

    fn check_encoder(&self, encoder: &EncoderVersion) -> Result<()> {
        match &self.encoder {
            Some(pinned) if pinned != encoder => Err(Error::EncoderMismatch {
                expected: pinned.to_string(),
                actual: encoder.to_string(),
            }),
            _ => Ok(()),
        }
    }

    fn check_dimension(&self, dimension: usize, actual: usize) -> Result<()> {
        if dimension != actual {
            return Err(Error::DimensionMismatch {
                expected: dimension,
                actual,
            });
        }
        Ok(())
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl VectorStore for MemoryStore {
    fn insert(&mut self, records: Vec<Record>) -> Result<usize> {
        let Some(first) = records.first() else {
            return Ok(0);
        };
        self.check(&records)?;

        self.encoder = Some(self.encoder.clone().unwrap_or_else(|| first.encoder.clone()));
        self.dimension = Some(self.dimension.unwrap_or(first.embedding.len()));

        let mut written = HashSet::new();
        for record in records {
            let seq = self.next_seq;
            self.next_seq += 1;
            if self.records.contains_key(&record.chunk.id) {
                debug!(chunk_id = %record.chunk.id, "replacing existing record");
            }
            written.insert(record.chunk.id.clone());
            self.records
                .insert(record.chunk.id.clone(), StoredRecord { seq, record });
        }
        Ok(written.len())
    }

    fn check(&self, records: &[Record]) -> Result<()> {
        let Some(first) = records.first() else {
            return Ok(());
        };
        let encoder = self.encoder.as_ref().unwrap_or(&first.encoder);
        let dimension = self.dimension.unwrap_or(first.embedding.len());
        for record in records {
            if &record.encoder != encoder {
                return Err(Error::EncoderMismatch {
                    expected: encoder.to_string(),
                    actual: record.encoder.to_string(),
                });
            }
            self.check_dimension(dimension, record.embedding.len())?;
        }
        Ok(())
    }

    fn query(&self, query: &StoreQuery<'_>) -> Result<Vec<SearchResult>> {
        if self.records.is_empty() || query.k == 0 {
            return Ok(Vec::new());
        }
        self.check_encoder(query.encoder)?;
        if let Some(dimension) = self.dimension {
            self.check_dimension(dimension, query.vector.len())?;
        }

        let mut results: Vec<SearchResult> = self
            .records
            .values()
            .filter(|r| query.filter.is_none_or(|f| f.matches(&r.record.chunk.metadata)))
            .map(|r| SearchResult {
                chunk: r.record.chunk.clone(),
                score: self.similarity.score(query.vector, &r.record.embedding)
                    * r.record.source_weight,
                seq: r.seq,
            })
            .collect();

        results.sort_unstable_by(|a, b| b.cmp(a));
        results.truncate(query.k);
        Ok(results)
    }

    fn delete(&mut self, document_id: &str) -> usize {
        let before = self.records.len();
        self.records
            .retain(|_, r| r.record.chunk.metadata.document_id != document_id);
        before - self.records.len()
    }

    fn len(&self) -> usize {
        self.records.len()
    }

    fn clear(&mut self) {
        self.records.clear();
        self.encoder = None;
        self.dimension = None;
    }

    fn similarity(&self) -> Similarity {
        self.similarity
    }

    fn encoder(&self) -> Option<&EncoderVersion> {
        self.encoder.as_ref()
    }
}
