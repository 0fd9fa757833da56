//! Pipeline configuration.
//!
//! Config is an explicit value handed to the components at construction
//! time; nothing reads process state. It can be loaded from a TOML file,
//! where every field is optional:
//!
//! ```toml
//! [chunking]
//! strategy = "boundary"
//! max_length = 800
//! overlap = 120
//!
//! [retrieval]
//! top_k = 5
//! per_document_cap = 2
//!
//! [generation]
//! provider = "open_ai"
//! model = "gpt-4o-mini"
//! timeout_secs = 30
//!
//! [seasons]
//! lower = "2023-24"
//! upper = "2025-26"
//! ```

use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::chunk::{ChunkStrategy, MIN_CHUNK_LENGTH};
use crate::document::DocumentKind;
use crate::season::SeasonBounds;
use crate::{Error, Result};

// ---------------------------------------------------------------------------
// Config structs (matching the TOML schema)
// ---------------------------------------------------------------------------

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RagConfig {
    #[serde(default)]
    pub chunking: ChunkingConfig,

    #[serde(default)]
    pub retrieval: RetrievalConfig,

    #[serde(default)]
    pub context: ContextConfig,

    #[serde(default)]
    pub generation: GenerationConfig,

    /// Seasons the corpus covers.
    #[serde(default)]
    pub seasons: SeasonBounds,
}

/// `[chunking]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkingConfig {
    #[serde(default)]
    pub strategy: ChunkStrategy,

    /// Maximum chunk length in bytes.
    #[serde(default = "default_max_length")]
    pub max_length: usize,

    /// Bytes shared by adjacent chunks; must be below `max_length`.
    #[serde(default = "default_overlap")]
    pub overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            strategy: ChunkStrategy::default(),
            max_length: default_max_length(),
            overlap: default_overlap(),
        }
    }
}

fn default_max_length() -> usize {
    800
}
fn default_overlap() -> usize {
    120
}

/// `[retrieval]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    /// Chunks returned when the caller does not ask for a number.
    #[serde(default = "default_top_k")]
    pub top_k: usize,

    #[serde(default = "default_min_top_k")]
    pub min_top_k: usize,

    #[serde(default = "default_max_top_k")]
    pub max_top_k: usize,

    /// Candidates fetched from the store per requested chunk.
    #[serde(default = "default_oversample_factor")]
    pub oversample_factor: usize,

    /// Most chunks a single document may contribute to one result.
    #[serde(default = "default_per_document_cap")]
    pub per_document_cap: usize,

    /// Rescore candidates with the cross-encoder before capping.
    #[serde(default)]
    pub rerank: bool,

    #[serde(default)]
    pub source_weights: SourceWeights,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
            min_top_k: default_min_top_k(),
            max_top_k: default_max_top_k(),
            oversample_factor: default_oversample_factor(),
            per_document_cap: default_per_document_cap(),
            rerank: false,
            source_weights: SourceWeights::default(),
        }
    }
}

fn default_top_k() -> usize {
    5
}
fn default_min_top_k() -> usize {
    3
}
fn default_max_top_k() -> usize {
    20
}
fn default_oversample_factor() -> usize {
    3
}
fn default_per_document_cap() -> usize {
    2
}

/// `[retrieval.source_weights]` section: score multipliers per document kind.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceWeights {
    #[serde(default = "default_weight")]
    pub stat_table: f32,

    #[serde(default = "default_weight")]
    pub article: f32,
}

impl Default for SourceWeights {
    fn default() -> Self {
        Self {
            stat_table: default_weight(),
            article: default_weight(),
        }
    }
}

impl SourceWeights {
    #[must_use]
    pub fn for_kind(&self, kind: DocumentKind) -> f32 {
        match kind {
            DocumentKind::StatTable => self.stat_table,
            DocumentKind::Article => self.article,
        }
    }
}

fn default_weight() -> f32 {
    1.0
}

/// `[context]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextConfig {
    /// Assembled context limit in bytes, after room for instructions and
    /// the question has been set aside.
    #[serde(default = "default_budget")]
    pub budget: usize,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            budget: default_budget(),
        }
    }
}

fn default_budget() -> usize {
    6000
}

/// Which generation service to call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    #[default]
    OpenAi,
    Anthropic,
}

/// `[generation]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationConfig {
    #[serde(default)]
    pub provider: ProviderKind,

    /// Default model identifier.
    #[serde(default = "default_model")]
    pub model: String,

    /// Models a caller may pick from.
    #[serde(default = "default_available_models")]
    pub available_models: Vec<String>,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Maximum tokens to request from the completion model.
    #[serde(default = "default_max_tokens")]
    pub max_tokens: usize,

    /// Per-call limit; the query is abandoned when it elapses.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Override for OpenAI-compatible or proxy endpoints.
    #[serde(default)]
    pub base_url: Option<String>,

    /// Name of the env var holding the API key (never store the key itself).
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            provider: ProviderKind::default(),
            model: default_model(),
            available_models: default_available_models(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            timeout_secs: default_timeout_secs(),
            base_url: None,
            api_key_env: default_api_key_env(),
        }
    }
}

impl GenerationConfig {
    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

fn default_model() -> String {
    "gpt-4o-mini".into()
}
fn default_available_models() -> Vec<String> {
    vec!["gpt-4o-mini".into(), "gpt-4o".into(), "gpt-4.1-mini".into()]
}
fn default_temperature() -> f32 {
    0.0
}
fn default_max_tokens() -> usize {
    500
}
fn default_timeout_secs() -> u64 {
    30
}
fn default_api_key_env() -> String {
    "OPENAI_API_KEY".into()
}

// ---------------------------------------------------------------------------
// Loading and validation
// ---------------------------------------------------------------------------

impl RagConfig {
    /// Load and validate a TOML config file.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)?;
        Self::from_toml(&raw)
    }

    /// Parse and validate TOML text.
    pub fn from_toml(raw: &str) -> Result<Self> {
        let config: Self =
            toml::from_str(raw).map_err(|e| Error::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Checks every range and enum constraint; violations are fatal.
    pub fn validate(&self) -> Result<()> {
        let invalid = |msg: String| Err(Error::InvalidConfig(msg));

        let c = &self.chunking;
        if c.max_length < MIN_CHUNK_LENGTH {
            return invalid(format!(
                "chunking.max_length ({}) must be at least {MIN_CHUNK_LENGTH} bytes",
                c.max_length
            ));
        }
        if c.overlap >= c.max_length {
            return invalid(format!(
                "chunking.overlap ({}) must be smaller than chunking.max_length ({})",
                c.overlap, c.max_length
            ));
        }

        let r = &self.retrieval;
        if r.min_top_k == 0 || r.min_top_k > r.max_top_k {
            return invalid(format!(
                "retrieval top_k range {}..={} is empty",
                r.min_top_k, r.max_top_k
            ));
        }
        self.check_top_k(r.top_k)?;
        if r.oversample_factor == 0 {
            return invalid("retrieval.oversample_factor must be at least 1".into());
        }
        if r.per_document_cap == 0 {
            return invalid("retrieval.per_document_cap must be at least 1".into());
        }
        let w = &r.source_weights;
        if !(w.stat_table > 0.0 && w.article > 0.0) {
            return invalid("retrieval.source_weights must be positive".into());
        }

        if self.context.budget == 0 {
            return invalid("context.budget must be positive".into());
        }

        let g = &self.generation;
        self.check_model(&g.model)?;
        if !(0.0..=2.0).contains(&g.temperature) {
            return invalid(format!(
                "generation.temperature {} is outside 0.0..=2.0",
                g.temperature
            ));
        }
        if g.timeout_secs == 0 || g.max_tokens == 0 {
            return invalid("generation.timeout_secs and max_tokens must be positive".into());
        }

        if self.seasons.lower > self.seasons.upper {
            return invalid(format!(
                "seasons.lower ({}) is after seasons.upper ({})",
                self.seasons.lower, self.seasons.upper
            ));
        }
        Ok(())
    }

    /// Accepts `top_k` only inside the configured range.
    pub fn check_top_k(&self, top_k: usize) -> Result<usize> {
        let r = &self.retrieval;
        if (r.min_top_k..=r.max_top_k).contains(&top_k) {
            Ok(top_k)
        } else {
            Err(Error::InvalidConfig(format!(
                "top_k {top_k} is outside {}..={}",
                r.min_top_k, r.max_top_k
            )))
        }
    }

    /// Accepts only models from the configured list.
    pub fn check_model(&self, model: &str) -> Result<()> {
        if self.generation.available_models.iter().any(|m| m == model) {
            Ok(())
        } else {
            Err(Error::InvalidConfig(format!(
                "model '{model}' is not one of {:?}",
                self.generation.available_models
            )))
        }
    }
}
