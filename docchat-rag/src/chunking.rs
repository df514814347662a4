//! Document chunking.
//!
//! This module provides the [`Chunker`] trait and [`FixedSizeChunker`], which
//! splits text into fixed-size character windows with a configurable overlap.

use crate::document::{Chunk, Document};
use crate::error::{RagError, Result};

/// A strategy for splitting documents into chunks.
pub trait Chunker: Send + Sync {
    /// Split a document into chunks.
    ///
    /// Returns an empty `Vec` if the document has empty text. Chunks are
    /// returned in offset order.
    fn chunk(&self, document: &Document) -> Vec<Chunk>;

    /// Split every document, preserving document order and then offset order.
    fn chunk_all(&self, documents: &[Document]) -> Vec<Chunk> {
        documents.iter().flat_map(|document| self.chunk(document)).collect()
    }
}

/// Splits text into fixed-size chunks by character count with configurable overlap.
///
/// Chunk IDs are generated as `{document_id}_{chunk_index}`. Each chunk records
/// the parent's source path and its own `chunk_index` in its metadata.
///
/// # Example
///
/// ```rust,ignore
/// use docchat_rag::{Chunker, FixedSizeChunker};
///
/// let chunker = FixedSizeChunker::new(1000, 10)?;
/// let chunks = chunker.chunk(&document);
/// ```
#[derive(Debug, Clone)]
pub struct FixedSizeChunker {
    chunk_size: usize,
    chunk_overlap: usize,
}

impl FixedSizeChunker {
    /// Create a new `FixedSizeChunker`.
    ///
    /// # Arguments
    ///
    /// * `chunk_size` - maximum number of characters per chunk
    /// * `chunk_overlap` - number of overlapping characters between consecutive chunks
    ///
    /// # Errors
    ///
    /// Returns [`RagError::InvalidArgument`] unless `chunk_size > 0` and
    /// `chunk_overlap < chunk_size`.
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Result<Self> {
        if chunk_size == 0 {
            return Err(RagError::InvalidArgument("chunk_size must be greater than zero".into()));
        }
        if chunk_overlap >= chunk_size {
            return Err(RagError::InvalidArgument(format!(
                "chunk_overlap ({chunk_overlap}) must be less than chunk_size ({chunk_size})"
            )));
        }
        Ok(Self { chunk_size, chunk_overlap })
    }

    /// Maximum number of characters per chunk.
    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Number of characters shared by consecutive chunks.
    pub fn chunk_overlap(&self) -> usize {
        self.chunk_overlap
    }

    /// Character windows `(start, end)` covering a text of `char_count` characters.
    fn windows(&self, char_count: usize) -> Vec<(usize, usize)> {
        let mut windows = Vec::new();
        if char_count == 0 {
            return windows;
        }

        let step = self.chunk_size - self.chunk_overlap;
        let mut start = 0;
        loop {
            let end = (start + self.chunk_size).min(char_count);
            windows.push((start, end));
            if end == char_count {
                break;
            }
            start += step;
        }
        windows
    }
}

impl Chunker for FixedSizeChunker {
    fn chunk(&self, document: &Document) -> Vec<Chunk> {
        let text = &document.raw_text;
        // Byte position of every char boundary, including the end of the text.
        let boundaries: Vec<usize> =
            text.char_indices().map(|(i, _)| i).chain(std::iter::once(text.len())).collect();
        let char_count = boundaries.len() - 1;
        let source = document.source_path.display().to_string();

        self.windows(char_count)
            .into_iter()
            .enumerate()
            .map(|(chunk_index, (start, end))| Chunk {
                id: format!("{}_{chunk_index}", document.id),
                document_id: document.id.clone(),
                text: text[boundaries[start]..boundaries[end]].to_string(),
                char_offset_start: start,
                char_offset_end: end,
                metadata: [
                    ("source".to_string(), source.clone()),
                    ("chunk_index".to_string(), chunk_index.to_string()),
                ]
                .into_iter()
                .collect(),
            })
            .collect()
    }
}

/// Split `documents` into overlapping fixed-size chunks.
///
/// # Errors
///
/// Returns [`RagError::InvalidArgument`] for invalid chunking parameters.
pub fn split(documents: &[Document], chunk_size: usize, overlap: usize) -> Result<Vec<Chunk>> {
    Ok(FixedSizeChunker::new(chunk_size, overlap)?.chunk_all(documents))
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;
    use crate::document::DocumentFormat;

    fn doc(id: &str, text: &str) -> Document {
        Document {
            id: id.to_string(),
            source_path: PathBuf::from(format!("/docs/{id}.txt")),
            format: DocumentFormat::Text,
            raw_text: text.to_string(),
        }
    }

    #[test]
    fn splits_with_overlap() {
        let chunks = split(&[doc("d", "ABCDEFGHIJ")], 4, 1).unwrap();
        let texts: Vec<&str> = chunks.iter().map(|c| c.text.as_str()).collect();
        let offsets: Vec<(usize, usize)> =
            chunks.iter().map(|c| (c.char_offset_start, c.char_offset_end)).collect();

        assert_eq!(texts, vec!["ABCD", "DEFG", "GHIJ"]);
        assert_eq!(offsets, vec![(0, 4), (3, 7), (6, 10)]);
        assert_eq!(chunks[2].id, "d_2");
        assert_eq!(chunks[2].metadata["chunk_index"], "2");
        assert_eq!(chunks[0].source(), Some("/docs/d.txt"));
    }

    #[test]
    fn final_window_may_be_short() {
        let chunks = split(&[doc("d", "ABCDEFG")], 4, 0).unwrap();
        let texts: Vec<&str> = chunks.iter().map(|c| c.text.as_str()).collect();
        assert_eq!(texts, vec!["ABCD", "EFG"]);
    }

    #[test]
    fn short_document_is_one_chunk() {
        let chunks = split(&[doc("d", "abc")], 1000, 10).unwrap();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].text, "abc");
        assert_eq!((chunks[0].char_offset_start, chunks[0].char_offset_end), (0, 3));
    }

    #[test]
    fn empty_document_yields_no_chunks() {
        assert!(split(&[doc("d", "")], 4, 1).unwrap().is_empty());
    }

    #[test]
    fn offsets_count_characters_not_bytes() {
        let chunks = split(&[doc("d", "héllo wörld")], 5, 2).unwrap();
        assert_eq!(chunks[0].text, "héllo");
        assert_eq!(chunks[1].text, "lo wö");
        assert_eq!((chunks[1].char_offset_start, chunks[1].char_offset_end), (3, 8));
    }

    #[test]
    fn chunks_never_cross_documents() {
        let chunks = split(&[doc("a", "AAAAA"), doc("b", "BBB")], 4, 1).unwrap();
        let ids: Vec<&str> = chunks.iter().map(|c| c.document_id.as_str()).collect();
        assert_eq!(ids, vec!["a", "a", "b"]);
        for chunk in &chunks {
            let first = chunk.text.chars().next().unwrap();
            assert!(chunk.text.chars().all(|ch| ch == first));
        }
    }

    #[test]
    fn rejects_invalid_parameters() {
        assert!(matches!(split(&[], 0, 0), Err(RagError::InvalidArgument(_))));
        assert!(matches!(split(&[], 4, 4), Err(RagError::InvalidArgument(_))));
        assert!(matches!(FixedSizeChunker::new(4, 9), Err(RagError::InvalidArgument(_))));
    }

    #[test]
    fn split_is_deterministic() {
        let docs =
            [doc("a", "the quick brown fox jumps over the lazy dog"), doc("b", "lorem ipsum")];
        assert_eq!(split(&docs, 7, 3).unwrap(), split(&docs, 7, 3).unwrap());
    }
}
