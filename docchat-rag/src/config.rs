//! Configuration for indexing and question answering.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{RagError, Result};
use crate::index::Similarity;

/// Whether earlier turns are replayed into new questions.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum HistoryMode {
    /// Earlier turns are included in the prompt (multi-turn chat).
    #[default]
    Replay,
    /// Every question is answered as if it were the first.
    Discard,
}

impl FromStr for HistoryMode {
    type Err = RagError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "replay" => Ok(Self::Replay),
            "discard" => Ok(Self::Discard),
            other => Err(RagError::Config(format!("unknown history mode '{other}'"))),
        }
    }
}

impl FromStr for Similarity {
    type Err = RagError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "cosine" => Ok(Self::Cosine),
            "euclidean" | "l2" => Ok(Self::Euclidean),
            other => Err(RagError::Config(format!("unknown similarity '{other}'"))),
        }
    }
}

/// Configuration parameters for the document chat service.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DocChatConfig {
    /// Folder whose files are indexed.
    pub folder: PathBuf,
    /// Maximum chunk size in characters.
    pub chunk_size: usize,
    /// Number of overlapping characters between consecutive chunks.
    pub chunk_overlap: usize,
    /// Number of chunks retrieved per question.
    pub top_k: usize,
    /// Similarity function used by the index.
    pub similarity: Similarity,
    /// Minimum score for a retrieved chunk to be used; `None` keeps all results.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub similarity_threshold: Option<f32>,
    /// Whether history is replayed into prompts.
    pub history_mode: HistoryMode,
    /// Rewrite follow-up questions into standalone ones before retrieval.
    pub condense_question: bool,
    /// Deadline for each embedding or generation call, in seconds.
    pub request_timeout_secs: u64,
    /// Number of chunks sent per embedding request while indexing.
    pub embed_batch_size: usize,
    /// Number of embedding requests in flight while indexing.
    pub embed_concurrency: usize,
}

impl Default for DocChatConfig {
    fn default() -> Self {
        Self {
            folder: PathBuf::from("."),
            chunk_size: 1000,
            chunk_overlap: 10,
            top_k: 6,
            similarity: Similarity::Cosine,
            similarity_threshold: None,
            history_mode: HistoryMode::Replay,
            condense_question: true,
            request_timeout_secs: 60,
            embed_batch_size: 64,
            embed_concurrency: 4,
        }
    }
}

impl DocChatConfig {
    /// Create a new builder for constructing a [`DocChatConfig`].
    pub fn builder() -> DocChatConfigBuilder {
        DocChatConfigBuilder::default()
    }

    /// Build a configuration from `DOCCHAT_*` environment variables over the defaults.
    ///
    /// Recognised variables: `DOCCHAT_FOLDER`, `DOCCHAT_CHUNK_SIZE`,
    /// `DOCCHAT_CHUNK_OVERLAP`, `DOCCHAT_TOP_K`, `DOCCHAT_SIMILARITY`,
    /// `DOCCHAT_HISTORY`, `DOCCHAT_TIMEOUT_SECS`.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::Config`] if a variable is malformed or the result is invalid.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Like [`from_env`](Self::from_env) but reading variables through `lookup`.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut builder = Self::builder();
        if let Some(folder) = lookup("DOCCHAT_FOLDER") {
            builder = builder.folder(folder);
        }
        if let Some(size) = parse_var(&lookup, "DOCCHAT_CHUNK_SIZE")? {
            builder = builder.chunk_size(size);
        }
        if let Some(overlap) = parse_var(&lookup, "DOCCHAT_CHUNK_OVERLAP")? {
            builder = builder.chunk_overlap(overlap);
        }
        if let Some(k) = parse_var(&lookup, "DOCCHAT_TOP_K")? {
            builder = builder.top_k(k);
        }
        if let Some(similarity) = parse_var(&lookup, "DOCCHAT_SIMILARITY")? {
            builder = builder.similarity(similarity);
        }
        if let Some(mode) = parse_var(&lookup, "DOCCHAT_HISTORY")? {
            builder = builder.history_mode(mode);
        }
        if let Some(secs) = parse_var(&lookup, "DOCCHAT_TIMEOUT_SECS")? {
            builder = builder.request_timeout(Duration::from_secs(secs));
        }
        builder.build()
    }

    /// The per-call deadline for external model requests.
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Check that the parameters are consistent.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::Config`] describing the first problem found.
    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            return Err(RagError::Config("chunk_size must be greater than zero".to_string()));
        }
        if self.chunk_overlap >= self.chunk_size {
            return Err(RagError::Config(format!(
                "chunk_overlap ({}) must be less than chunk_size ({})",
                self.chunk_overlap, self.chunk_size
            )));
        }
        if self.top_k == 0 {
            return Err(RagError::Config("top_k must be greater than zero".to_string()));
        }
        if self.request_timeout_secs == 0 {
            return Err(RagError::Config("request timeout must be at least one second".into()));
        }
        if self.embed_batch_size == 0 || self.embed_concurrency == 0 {
            return Err(RagError::Config(
                "embed_batch_size and embed_concurrency must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

fn parse_var<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    lookup(key)
        .map(|raw| {
            raw.trim()
                .parse::<T>()
                .map_err(|e| RagError::Config(format!("{key}={raw:?} is invalid: {e}")))
        })
        .transpose()
}

/// Builder for constructing a validated [`DocChatConfig`].
#[derive(Debug, Clone, Default)]
pub struct DocChatConfigBuilder {
    config: DocChatConfig,
}

impl DocChatConfigBuilder {
    /// Set the folder to index.
    pub fn folder(mut self, folder: impl Into<PathBuf>) -> Self {
        self.config.folder = folder.into();
        self
    }

    /// Set the maximum chunk size in characters.
    pub fn chunk_size(mut self, size: usize) -> Self {
        self.config.chunk_size = size;
        self
    }

    /// Set the overlap between consecutive chunks in characters.
    pub fn chunk_overlap(mut self, overlap: usize) -> Self {
        self.config.chunk_overlap = overlap;
        self
    }

    /// Set the number of chunks retrieved per question.
    pub fn top_k(mut self, k: usize) -> Self {
        self.config.top_k = k;
        self
    }

    /// Set the index similarity function.
    pub fn similarity(mut self, similarity: Similarity) -> Self {
        self.config.similarity = similarity;
        self
    }

    /// Set the minimum score for retrieved chunks.
    pub fn similarity_threshold(mut self, threshold: f32) -> Self {
        self.config.similarity_threshold = Some(threshold);
        self
    }

    /// Choose whether history is replayed into prompts.
    pub fn history_mode(mut self, mode: HistoryMode) -> Self {
        self.config.history_mode = mode;
        self
    }

    /// Enable or disable rewriting follow-ups into standalone questions.
    pub fn condense_question(mut self, enabled: bool) -> Self {
        self.config.condense_question = enabled;
        self
    }

    /// Set the deadline for each external model call (whole seconds).
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.config.request_timeout_secs = timeout.as_secs();
        self
    }

    /// Set the number of chunks per embedding request.
    pub fn embed_batch_size(mut self, size: usize) -> Self {
        self.config.embed_batch_size = size;
        self
    }

    /// Set the number of concurrent embedding requests.
    pub fn embed_concurrency(mut self, concurrency: usize) -> Self {
        self.config.embed_concurrency = concurrency;
        self
    }

    /// Build the [`DocChatConfig`], validating that parameters are consistent.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::Config`] if:
    /// - `chunk_size == 0` or `chunk_overlap >= chunk_size`
    /// - `top_k == 0`
    /// - the request timeout, batch size or concurrency is zero
    pub fn build(self) -> Result<DocChatConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}
