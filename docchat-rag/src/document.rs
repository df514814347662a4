//! Data types for documents, chunks, embeddings, and search results.

use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// The source format a [`Document`] was extracted from.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum DocumentFormat {
    /// Portable Document Format.
    Pdf,
    /// Word documents (`.docx`, and `.doc` files that are OOXML inside).
    Docx,
    /// Plain UTF-8 text.
    Text,
}

impl fmt::Display for DocumentFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Pdf => "pdf",
            Self::Docx => "docx",
            Self::Text => "txt",
        };
        f.write_str(name)
    }
}

/// A source document with its extracted text.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Document {
    /// Unique identifier for the document.
    pub id: String,
    /// The file the text was extracted from.
    pub source_path: PathBuf,
    /// The format of the source file.
    pub format: DocumentFormat,
    /// The extracted text content.
    pub raw_text: String,
}

/// A segment of a [`Document`].
///
/// Offsets are measured in characters, not bytes, and are half-open:
/// `text` equals the characters `char_offset_start..char_offset_end`
/// of the parent document.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Chunk {
    /// Unique identifier for the chunk.
    pub id: String,
    /// The ID of the parent [`Document`].
    pub document_id: String,
    /// The text content of the chunk.
    pub text: String,
    /// First character of the chunk within the parent document.
    pub char_offset_start: usize,
    /// One past the last character of the chunk within the parent document.
    pub char_offset_end: usize,
    /// Key-value metadata: the parent's `source` path and the `chunk_index`.
    pub metadata: HashMap<String, String>,
}

impl Chunk {
    /// The source file recorded in the chunk metadata, if any.
    pub fn source(&self) -> Option<&str> {
        self.metadata.get("source").map(String::as_str)
    }
}

/// The vector embedding of a single [`Chunk`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Embedding {
    /// The ID of the embedded chunk.
    pub chunk_id: String,
    /// The embedding vector.
    pub vector: Vec<f32>,
}

/// A retrieved [`Chunk`] paired with a relevance score.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResult {
    /// The retrieved chunk.
    pub chunk: Chunk,
    /// The similarity score (higher is more relevant).
    pub score: f32,
}
