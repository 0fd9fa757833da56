//! HoopsRAG - grounded question answering over a private basketball corpus
//!
//! # Architecture
//!
//! ```text
//! Files -> Normalizer -> Chunker -> Embedder -> Store
//!                                                 |
//! Question -> Temporal gate -> Retriever <--------+
//!                                  |
//!                          Context Assembler
//!                                  |
//!                         Grounded Answerer -> Generator (remote)
//!                                  |
//!                         Answer + cited sources
//! ```
//!
//! Everything outside the generator is local and deterministic. Questions
//! about seasons after the corpus are refused before retrieval, and an
//! empty corpus answers "not found" instead of failing.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::{Arc, RwLock};
//! use hoopsrag_lib::{
//!     config::RagConfig, embed::HashEmbedder, generate::build_generator,
//!     ingest::Indexer, pipeline::{AskOptions, Assistant}, store::MemoryStore,
//! };
//!
//! let config = RagConfig::default();
//! let embedder = Arc::new(HashEmbedder::default());
//! let store = Arc::new(RwLock::new(MemoryStore::new()));
//!
//! // Index a corpus directory
//! let indexer = Indexer::new(embedder.clone(), store.clone(), &config)?;
//! let report = indexer.ingest_paths(&["corpus/".into()])?;
//!
//! // Ask
//! let generator = build_generator(&config.generation, api_key)?;
//! let assistant = Assistant::new(embedder, store, generator, config)?;
//! let response = assistant.ask("Who leads the league in assists?", &AskOptions::default()).await?;
//! ```

pub mod answer;
pub mod chunk;
pub mod config;
pub mod context;
pub mod document;
pub mod embed;
pub mod error;
pub mod generate;
pub mod ingest;
pub mod pipeline;
pub mod rerank;
pub mod retrieve;
pub mod season;
pub mod store;
pub mod text;

#[cfg(test)]
pub(crate) mod testing;

pub use error::{Error, Result};
