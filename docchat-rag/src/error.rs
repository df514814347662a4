//! Error types for the `docchat-rag` crate.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Errors that can occur while indexing documents or answering questions.
#[derive(Debug, Error)]
pub enum RagError {
    /// A file (or the document folder itself) could not be read or parsed.
    #[error("Failed to load {}: {message}", path.display())]
    Load {
        /// The file or folder that failed.
        path: PathBuf,
        /// A description of the failure.
        message: String,
    },

    /// A caller supplied an out-of-range parameter.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// An error occurred during embedding generation.
    #[error("Embedding error ({provider}): {message}")]
    Embedding {
        /// The embedding provider that produced the error.
        provider: String,
        /// A description of the failure.
        message: String,
    },

    /// An error occurred while generating an answer.
    #[error("Generation error ({provider}): {message}")]
    Generation {
        /// The generation backend that produced the error.
        provider: String,
        /// A description of the failure.
        message: String,
    },

    /// An external model call exceeded its deadline.
    #[error("{operation} timed out after {after:?}")]
    Timeout {
        /// The operation that timed out (e.g. `"query embedding"`).
        operation: String,
        /// The deadline that was exceeded.
        after: Duration,
    },

    /// There was nothing to index.
    #[error("Cannot build an index from zero entries")]
    EmptyIndex,

    /// A vector did not have the dimension declared by the index.
    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch {
        /// The index dimension.
        expected: usize,
        /// The offending vector's dimension.
        actual: usize,
    },

    /// A configuration validation error.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl RagError {
    pub(crate) fn load(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::Load { path: path.into(), message: message.into() }
    }
}

/// A convenience result type for RAG operations.
pub type Result<T> = std::result::Result<T, RagError>;
