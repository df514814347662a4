//! Question answering over a folder of documents.
//!
//! This crate provides the retrieval core of a document chatbot:
//! - [`Loader`]: reads PDF, DOC/DOCX and TXT files into [`Document`]s
//! - [`FixedSizeChunker`]: splits documents into overlapping character windows
//! - [`EmbeddingProvider`]: maps text to vectors (OpenAI backend in [`openai`])
//! - [`VectorIndex`]: exact nearest-neighbour search over chunk embeddings
//! - [`RetrievalQa`]: embed → search → prompt → [`Generator`]
//! - [`DocChat`]: the service a front end drives (`ask`, `refresh_index`)
//!
//! Conversation history is owned by the caller ([`Conversation`]) and passed
//! into every question explicitly.

pub mod chunking;
pub mod config;
pub mod document;
pub mod embedding;
pub mod error;
pub mod generation;
pub mod index;
pub mod loader;
pub mod openai;
pub mod qa;
pub mod service;

pub use chunking::{Chunker, FixedSizeChunker, split};
pub use config::{DocChatConfig, DocChatConfigBuilder, HistoryMode};
pub use document::{Chunk, Document, DocumentFormat, Embedding, SearchResult};
pub use embedding::EmbeddingProvider;
pub use error::{RagError, Result};
pub use generation::{Generator, Message, Prompt, Role};
pub use index::{IndexEntry, Similarity, VectorIndex};
pub use loader::{DocxHandler, FormatHandler, LoadReport, Loader, PdfHandler, TextHandler};
pub use qa::{Answer, Conversation, ConversationTurn, RetrievalQa};
pub use service::{DocChat, DocChatBuilder, IndexStats, SkippedFile};
