mod repl;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use docchat_rag::openai::{OpenAIChatGenerator, OpenAIEmbeddingProvider};
use docchat_rag::{DocChat, DocChatConfig, HistoryMode, Similarity};
use tracing_subscriber::EnvFilter;

/// Chat with the PDF, Word and text documents in a folder.
#[derive(Parser, Debug)]
#[command(name = "docchat", version, about)]
struct Args {
    /// Folder whose documents are indexed
    #[arg(long, short, value_name = "DIR")]
    folder: Option<PathBuf>,
    /// Number of chunks retrieved per question
    #[arg(long, value_name = "INT")]
    top_k: Option<usize>,
    /// Maximum chunk size in characters
    #[arg(long, value_name = "INT")]
    chunk_size: Option<usize>,
    /// Characters shared by consecutive chunks
    #[arg(long, value_name = "INT")]
    chunk_overlap: Option<usize>,
    /// Similarity function: cosine or euclidean
    #[arg(long, value_name = "NAME")]
    similarity: Option<Similarity>,
    /// Drop chunks scoring below this value
    #[arg(long, value_name = "SCORE")]
    min_score: Option<f32>,
    /// Replay earlier turns into prompts, or discard them
    #[arg(long, value_name = "replay|discard")]
    history: Option<HistoryMode>,
    /// Do not rewrite follow-up questions before retrieval
    #[arg(long)]
    no_condense: bool,
    /// Per-request deadline for model calls
    #[arg(long, value_name = "SECS")]
    timeout_secs: Option<u64>,
    /// Chat model name
    #[arg(long, env = "DOCCHAT_MODEL", value_name = "MODEL")]
    model: Option<String>,
    /// Embedding model name
    #[arg(long, env = "DOCCHAT_EMBEDDING_MODEL", value_name = "MODEL")]
    embedding_model: Option<String>,
    /// Request vectors of this size from the embedding model
    #[arg(long, env = "DOCCHAT_EMBEDDING_DIMENSIONS", value_name = "INT")]
    embedding_dimensions: Option<usize>,
    /// OpenAI-compatible API base URL
    #[arg(long, env = "OPENAI_BASE_URL", value_name = "URL")]
    base_url: Option<String>,
    /// Print the retrieved sources under every answer
    #[arg(long)]
    show_sources: bool,
}

impl Args {
    /// Apply command-line overrides on top of the environment configuration.
    fn config(&self) -> Result<DocChatConfig> {
        let mut config = DocChatConfig::from_env()?;
        if let Some(folder) = &self.folder {
            config.folder = folder.clone();
        }
        if let Some(k) = self.top_k {
            config.top_k = k;
        }
        if let Some(size) = self.chunk_size {
            config.chunk_size = size;
        }
        if let Some(overlap) = self.chunk_overlap {
            config.chunk_overlap = overlap;
        }
        if let Some(similarity) = self.similarity {
            config.similarity = similarity;
        }
        if self.min_score.is_some() {
            config.similarity_threshold = self.min_score;
        }
        if let Some(mode) = self.history {
            config.history_mode = mode;
        }
        if self.no_condense {
            config.condense_question = false;
        }
        if let Some(secs) = self.timeout_secs {
            config.request_timeout_secs = secs;
        }
        config.validate()?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("docchat_rag=info,docchat=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let config = args.config()?;

    let mut embedder = OpenAIEmbeddingProvider::from_env()?;
    let mut generator = OpenAIChatGenerator::from_env()?;
    if let Some(base_url) = &args.base_url {
        embedder = embedder.with_base_url(base_url.as_str());
        generator = generator.with_base_url(base_url.as_str());
    }
    if let Some(model) = &args.embedding_model {
        embedder = embedder.with_model(model.as_str());
    }
    if let Some(dims) = args.embedding_dimensions {
        embedder = embedder.with_dimensions(dims);
    }
    if let Some(model) = &args.model {
        generator = generator.with_model(model.as_str());
    }

    let folder = config.folder.clone();
    eprintln!("Indexing {} ...", folder.display());
    let chat = DocChat::builder()
        .config(config)
        .embedding_provider(Arc::new(embedder))
        .generator(Arc::new(generator))
        .open()
        .await
        .with_context(|| format!("failed to index {}", folder.display()))?;

    repl::run(&chat, args.show_sources).await
}
