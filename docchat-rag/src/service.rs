//! The document chat service: index lifecycle plus question answering.
//!
//! [`DocChat`] is what a front end talks to. It owns the backends and an
//! atomically swappable handle to the current index. A refresh builds a
//! complete new index off to the side and publishes it with a single pointer
//! swap; questions already in flight keep answering from the index they
//! started with.
//!
//! # Example
//!
//! ```rust,ignore
//! use docchat_rag::{Conversation, DocChat, DocChatConfig};
//!
//! let chat = DocChat::builder()
//!     .config(DocChatConfig::builder().folder("./docs").build()?)
//!     .embedding_provider(Arc::new(embedder))
//!     .generator(Arc::new(generator))
//!     .open()
//!     .await?;
//!
//! let mut conversation = Conversation::new();
//! let answer = chat.ask("What is the refund policy?", conversation.turns()).await?;
//! conversation.record("What is the refund policy?", &answer);
//! ```

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use futures::{StreamExt, TryStreamExt, stream};
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, RwLock};
use tracing::{error, info, warn};

use crate::chunking::{Chunker, FixedSizeChunker};
use crate::config::DocChatConfig;
use crate::document::Chunk;
use crate::embedding::EmbeddingProvider;
use crate::error::{RagError, Result};
use crate::generation::Generator;
use crate::index::{IndexEntry, VectorIndex};
use crate::loader::Loader;
use crate::qa::{Answer, ConversationTurn, RetrievalQa, with_timeout};

/// A file that matched a handler but could not be indexed.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SkippedFile {
    /// The file that failed.
    pub path: PathBuf,
    /// Why it failed.
    pub reason: String,
}

/// A summary of the index currently being served.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexStats {
    /// Files that contributed at least one chunk, sorted.
    pub files: Vec<PathBuf>,
    /// Files that were skipped because they failed to load.
    pub skipped: Vec<SkippedFile>,
    /// Number of loaded documents.
    pub documents: usize,
    /// Number of indexed chunks.
    pub chunks: usize,
    /// Embedding dimension of the index.
    pub dimension: usize,
    /// When the index finished building.
    pub built_at: DateTime<Utc>,
}

/// One fully built index together with the chain that queries it.
struct Snapshot {
    qa: RetrievalQa,
    stats: IndexStats,
}

/// Indexes a folder of documents and answers questions about it.
///
/// A `DocChat` always holds a successfully built index: [`open`](DocChatBuilder::open)
/// fails instead of returning a service with nothing to search.
pub struct DocChat {
    config: DocChatConfig,
    loader: Loader,
    chunker: Arc<dyn Chunker>,
    embedder: Arc<dyn EmbeddingProvider>,
    generator: Arc<dyn Generator>,
    current: RwLock<Arc<Snapshot>>,
    refresh_lock: Mutex<()>,
}

impl DocChat {
    /// Create a new [`DocChatBuilder`].
    pub fn builder() -> DocChatBuilder {
        DocChatBuilder::default()
    }

    /// Return a reference to the service configuration.
    pub fn config(&self) -> &DocChatConfig {
        &self.config
    }

    /// Answer `question` against the current index.
    ///
    /// `history` is the caller's record of earlier turns; see
    /// [`RetrievalQa::ask`] for how it is used.
    ///
    /// # Errors
    ///
    /// Propagates embedding, generation and timeout errors; nothing is retried.
    pub async fn ask(&self, question: &str, history: &[ConversationTurn]) -> Result<Answer> {
        let snapshot = self.snapshot().await;
        snapshot.qa.ask(question, history).await
    }

    /// Reload the folder, rebuild the index, and swap it in.
    ///
    /// On failure the previous index keeps serving and the error is returned.
    /// Concurrent refreshes are serialised.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::EmptyIndex`] if the folder yields no chunks, and
    /// propagates loading-folder, embedding and timeout errors.
    pub async fn refresh_index(&self) -> Result<IndexStats> {
        let _guard = self.refresh_lock.lock().await;
        let snapshot = self.build_snapshot().await.inspect_err(|e| {
            warn!(error = %e, "index refresh failed; keeping previous index");
        })?;
        let stats = snapshot.stats.clone();
        *self.current.write().await = Arc::new(snapshot);
        Ok(stats)
    }

    /// Files that contributed to the current index.
    pub async fn indexed_files(&self) -> Vec<PathBuf> {
        self.snapshot().await.stats.files.clone()
    }

    /// Summary of the current index.
    pub async fn stats(&self) -> IndexStats {
        self.snapshot().await.stats.clone()
    }

    /// Supported files currently in the folder, whether indexed yet or not.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::Load`] if the folder cannot be read.
    pub async fn folder_files(&self) -> Result<Vec<PathBuf>> {
        let loader = self.loader.clone();
        let folder = self.config.folder.clone();
        tokio::task::spawn_blocking(move || loader.list_files(&folder))
            .await
            .map_err(|e| RagError::load(&self.config.folder, format!("listing task failed: {e}")))?
    }

    /// The index currently being served.
    pub async fn current_index(&self) -> Arc<VectorIndex> {
        self.snapshot().await.qa.index().clone()
    }

    async fn snapshot(&self) -> Arc<Snapshot> {
        self.current.read().await.clone()
    }

    async fn build_snapshot(&self) -> Result<Snapshot> {
        build_snapshot(
            &self.config,
            &self.loader,
            self.chunker.as_ref(),
            &self.embedder,
            &self.generator,
        )
        .await
    }
}

/// Load → chunk → embed → index.
async fn build_snapshot(
    config: &DocChatConfig,
    loader: &Loader,
    chunker: &dyn Chunker,
    embedder: &Arc<dyn EmbeddingProvider>,
    generator: &Arc<dyn Generator>,
) -> Result<Snapshot> {
    let started = Instant::now();

    let folder = config.folder.clone();
    let task_loader = loader.clone();
    let task_folder = folder.clone();
    let report = tokio::task::spawn_blocking(move || task_loader.load(task_folder))
        .await
        .map_err(|e| RagError::load(&folder, format!("loader task failed: {e}")))??;

    let skipped: Vec<SkippedFile> = report
        .errors
        .iter()
        .map(|e| match e {
            RagError::Load { path, message } => {
                SkippedFile { path: path.clone(), reason: message.clone() }
            }
            other => SkippedFile { path: PathBuf::new(), reason: other.to_string() },
        })
        .collect();

    let chunks = chunker.chunk_all(&report.documents);
    if chunks.is_empty() {
        error!(folder = %folder.display(), skipped = skipped.len(), "no indexable text found");
        return Err(RagError::EmptyIndex);
    }

    let timeout = config.request_timeout();
    let batch_vectors: Vec<Vec<Vec<f32>>> = stream::iter(
        chunks.chunks(config.embed_batch_size).map(|batch| embed_batch(embedder, batch, timeout)),
    )
    // `buffered` yields in submission order, so chunk order survives.
    .buffered(config.embed_concurrency)
    .try_collect()
    .await
    .inspect_err(|e| error!(error = %e, "embedding failed while indexing"))?;

    // Index dimension comes from the vectors, not `dimensions()`.
    let declared = embedder.dimensions();
    let entries: Vec<IndexEntry> = chunks
        .into_iter()
        .zip(batch_vectors.into_iter().flatten())
        .map(|(chunk, vector)| IndexEntry::new(chunk, vector))
        .collect();
    let actual = entries.first().map_or(declared, |e| e.embedding.vector.len());
    if actual != declared {
        warn!(declared, actual, "embedding size differs from the provider's declared size");
    }

    let index = Arc::new(VectorIndex::build_with(entries, config.similarity)?);

    let mut files: Vec<PathBuf> = report.documents.iter().map(|d| d.source_path.clone()).collect();
    files.sort();
    let stats = IndexStats {
        files,
        skipped,
        documents: report.documents.len(),
        chunks: index.len(),
        dimension: index.dimension(),
        built_at: Utc::now(),
    };

    info!(
        documents = stats.documents,
        chunks = stats.chunks,
        skipped = stats.skipped.len(),
        dimension = stats.dimension,
        elapsed_ms = started.elapsed().as_millis() as u64,
        "index built"
    );

    let qa = RetrievalQa::new(index, embedder.clone(), generator.clone(), config);
    Ok(Snapshot { qa, stats })
}

async fn embed_batch(
    embedder: &Arc<dyn EmbeddingProvider>,
    batch: &[Chunk],
    timeout: Duration,
) -> Result<Vec<Vec<f32>>> {
    let texts: Vec<&str> = batch.iter().map(|c| c.text.as_str()).collect();
    let vectors = with_timeout("chunk embedding", timeout, embedder.embed_batch(&texts)).await?;
    if vectors.len() != texts.len() {
        return Err(RagError::Embedding {
            provider: "batch".into(),
            message: format!("expected {} embeddings, received {}", texts.len(), vectors.len()),
        });
    }
    Ok(vectors)
}

/// Builder for constructing a [`DocChat`].
///
/// The embedding provider and generator are required. The configuration
/// defaults to [`DocChatConfig::default`], the loader to [`Loader::new`], and
/// the chunker to a [`FixedSizeChunker`] using the configured sizes.
#[derive(Default)]
pub struct DocChatBuilder {
    config: Option<DocChatConfig>,
    loader: Option<Loader>,
    chunker: Option<Arc<dyn Chunker>>,
    embedder: Option<Arc<dyn EmbeddingProvider>>,
    generator: Option<Arc<dyn Generator>>,
}

impl DocChatBuilder {
    /// Set the service configuration.
    pub fn config(mut self, config: DocChatConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Set the document loader.
    pub fn loader(mut self, loader: Loader) -> Self {
        self.loader = Some(loader);
        self
    }

    /// Set the document chunker.
    pub fn chunker(mut self, chunker: Arc<dyn Chunker>) -> Self {
        self.chunker = Some(chunker);
        self
    }

    /// Set the embedding provider.
    pub fn embedding_provider(mut self, provider: Arc<dyn EmbeddingProvider>) -> Self {
        self.embedder = Some(provider);
        self
    }

    /// Set the answer generator.
    pub fn generator(mut self, generator: Arc<dyn Generator>) -> Self {
        self.generator = Some(generator);
        self
    }

    /// Build the first index and return the ready service.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::Config`] if a required field is missing or the
    /// configuration is invalid, and any error from the initial build
    /// (notably [`RagError::EmptyIndex`]).
    pub async fn open(self) -> Result<DocChat> {
        let config = self.config.unwrap_or_default();
        config.validate()?;
        let embedder = self
            .embedder
            .ok_or_else(|| RagError::Config("embedding_provider is required".to_string()))?;
        let generator =
            self.generator.ok_or_else(|| RagError::Config("generator is required".to_string()))?;
        let chunker = match self.chunker {
            Some(chunker) => chunker,
            None => Arc::new(FixedSizeChunker::new(config.chunk_size, config.chunk_overlap)?),
        };
        let loader = self.loader.unwrap_or_default();

        let snapshot =
            build_snapshot(&config, &loader, chunker.as_ref(), &embedder, &generator).await?;

        Ok(DocChat {
            config,
            loader,
            chunker,
            embedder,
            generator,
            current: RwLock::new(Arc::new(snapshot)),
            refresh_lock: Mutex::new(()),
        })
    }
}
