//! Loading a folder of heterogeneous files into [`Document`]s.
//!
//! Dispatch is driven by a registry that maps lower-case file extensions to a
//! [`FormatHandler`]. Files with an unregistered extension are skipped. A file
//! whose handler fails is reported in the [`LoadReport`] and skipped; the rest
//! of the folder still loads.

use std::collections::BTreeMap;
use std::fs;
use std::io::Read;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use quick_xml::Reader;
use quick_xml::events::Event;
use tracing::{debug, info, warn};

use crate::document::{Document, DocumentFormat};
use crate::error::{RagError, Result};

/// Extracts plain text from one file format.
pub trait FormatHandler: Send + Sync {
    /// The format this handler produces documents for.
    fn format(&self) -> DocumentFormat;

    /// Extract the text of the file at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::Load`] if the file cannot be read or parsed.
    fn extract(&self, path: &Path) -> Result<String>;
}

/// Reads `.txt` files as UTF-8.
#[derive(Debug, Clone, Copy, Default)]
pub struct TextHandler;

impl FormatHandler for TextHandler {
    fn format(&self) -> DocumentFormat {
        DocumentFormat::Text
    }

    fn extract(&self, path: &Path) -> Result<String> {
        let bytes = fs::read(path).map_err(|e| RagError::load(path, e.to_string()))?;
        String::from_utf8(bytes).map_err(|e| RagError::load(path, format!("not valid UTF-8: {e}")))
    }
}

/// Extracts text from PDF files with `pdf-extract`.
#[derive(Debug, Clone, Copy, Default)]
pub struct PdfHandler;

impl FormatHandler for PdfHandler {
    fn format(&self) -> DocumentFormat {
        DocumentFormat::Pdf
    }

    fn extract(&self, path: &Path) -> Result<String> {
        // pdf-extract can panic on malformed fonts and streams.
        match catch_unwind(AssertUnwindSafe(|| pdf_extract::extract_text(path))) {
            Ok(Ok(text)) => Ok(text),
            Ok(Err(e)) => Err(RagError::load(path, format!("invalid PDF: {e}"))),
            Err(_) => Err(RagError::load(path, "PDF extractor panicked")),
        }
    }
}

/// Extracts paragraph text from Office Open XML word documents.
///
/// Registered for both `.docx` and `.doc`; legacy binary `.doc` files are not
/// zip archives and fail with a [`RagError::Load`].
#[derive(Debug, Clone, Copy, Default)]
pub struct DocxHandler;

impl FormatHandler for DocxHandler {
    fn format(&self) -> DocumentFormat {
        DocumentFormat::Docx
    }

    fn extract(&self, path: &Path) -> Result<String> {
        let file = fs::File::open(path).map_err(|e| RagError::load(path, e.to_string()))?;
        let mut archive = zip::ZipArchive::new(file)
            .map_err(|e| RagError::load(path, format!("invalid DOCX archive: {e}")))?;
        let mut entry = archive
            .by_name("word/document.xml")
            .map_err(|_| RagError::load(path, "no word/document.xml in archive"))?;

        let mut xml = String::new();
        entry
            .read_to_string(&mut xml)
            .map_err(|e| RagError::load(path, format!("failed to read document.xml: {e}")))?;

        docx_xml_to_text(&xml).map_err(|message| RagError::load(path, message))
    }
}

/// Collect the `<w:t>` runs of a `word/document.xml`, one line per paragraph.
///
/// Tabs and breaks only count inside a `<w:r>` run; the `<w:tab>` elements of
/// paragraph properties are tab-stop definitions, not text.
fn docx_xml_to_text(xml: &str) -> std::result::Result<String, String> {
    let mut reader = Reader::from_str(xml);
    let mut text = String::new();
    let mut in_run = false;
    let mut in_run_text = false;

    loop {
        match reader.read_event().map_err(|e| format!("malformed document.xml: {e}"))? {
            Event::Start(e) => match e.name().as_ref() {
                b"w:r" => in_run = true,
                b"w:t" => in_run_text = true,
                b"w:p" if !text.is_empty() && !text.ends_with('\n') => text.push('\n'),
                _ => {}
            },
            Event::End(e) => match e.name().as_ref() {
                b"w:r" => in_run = false,
                b"w:t" => in_run_text = false,
                _ => {}
            },
            Event::Empty(e) if in_run => match e.name().as_ref() {
                b"w:tab" => text.push('\t'),
                b"w:br" | b"w:cr" => text.push('\n'),
                _ => {}
            },
            Event::Text(t) if in_run_text => {
                let unescaped = t.unescape().map_err(|e| format!("bad XML escape: {e}"))?;
                text.push_str(&unescaped);
            }
            Event::Eof => break,
            _ => {}
        }
    }

    Ok(text)
}

/// The outcome of loading a folder: documents that loaded plus per-file failures.
#[derive(Debug, Default)]
pub struct LoadReport {
    /// Successfully loaded documents, in file-name order.
    pub documents: Vec<Document>,
    /// One [`RagError::Load`] per file that matched a handler but failed or
    /// yielded only whitespace.
    pub errors: Vec<RagError>,
}

/// Loads documents from a folder through a registry of [`FormatHandler`]s.
///
/// # Example
///
/// ```rust,ignore
/// use docchat_rag::Loader;
///
/// let report = Loader::new().load("./docs")?;
/// for error in &report.errors {
///     eprintln!("skipped: {error}");
/// }
/// ```
#[derive(Clone)]
pub struct Loader {
    handlers: BTreeMap<String, Arc<dyn FormatHandler>>,
}

impl Default for Loader {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Loader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Loader").field("extensions", &self.extensions()).finish()
    }
}

impl Loader {
    /// Create a loader with handlers for `pdf`, `doc`, `docx`, and `txt`.
    pub fn new() -> Self {
        let docx: Arc<dyn FormatHandler> = Arc::new(DocxHandler);
        Self::empty()
            .register("pdf", Arc::new(PdfHandler))
            .register("doc", docx.clone())
            .register("docx", docx)
            .register("txt", Arc::new(TextHandler))
    }

    /// Create a loader with no handlers registered.
    pub fn empty() -> Self {
        Self { handlers: BTreeMap::new() }
    }

    /// Register `handler` for files ending in `.{extension}` (case-insensitive).
    ///
    /// Replaces any handler previously registered for the extension.
    pub fn register(mut self, extension: &str, handler: Arc<dyn FormatHandler>) -> Self {
        let extension = extension.trim_start_matches('.').to_ascii_lowercase();
        self.handlers.insert(extension, handler);
        self
    }

    /// The registered extensions, sorted.
    pub fn extensions(&self) -> Vec<&str> {
        self.handlers.keys().map(String::as_str).collect()
    }

    fn handler_for(&self, path: &Path) -> Option<&Arc<dyn FormatHandler>> {
        let extension = path.extension()?.to_str()?.to_ascii_lowercase();
        self.handlers.get(&extension)
    }

    /// List the files in `folder` that a registered handler accepts, sorted by path.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::Load`] if the folder cannot be read.
    pub fn list_files(&self, folder: impl AsRef<Path>) -> Result<Vec<PathBuf>> {
        let folder = folder.as_ref();
        let entries = fs::read_dir(folder).map_err(|e| RagError::load(folder, e.to_string()))?;

        let mut files = entries
            .filter_map(std::result::Result::ok)
            .map(|entry| entry.path())
            .filter(|path| path.is_file())
            .filter(|path| {
                let known = self.handler_for(path).is_some();
                if !known {
                    debug!(path = %path.display(), "skipping file with unrecognized extension");
                }
                known
            })
            .collect::<Vec<_>>();

        files.sort();
        Ok(files)
    }

    /// Load every supported file in `folder` (non-recursive).
    ///
    /// Document IDs are the file names, which are unique within the folder.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::Load`] only if the folder itself cannot be read;
    /// per-file failures are collected in [`LoadReport::errors`].
    pub fn load(&self, folder: impl AsRef<Path>) -> Result<LoadReport> {
        let folder = folder.as_ref();
        let mut report = LoadReport::default();

        for path in self.list_files(folder)? {
            let Some(handler) = self.handler_for(&path) else { continue };

            match handler.extract(&path) {
                Ok(text) if text.trim().is_empty() => {
                    warn!(path = %path.display(), "skipping document with no extractable text");
                    report.errors.push(RagError::load(path, "no extractable text"));
                }
                Ok(raw_text) => {
                    let id = path
                        .file_name()
                        .map(|name| name.to_string_lossy().into_owned())
                        .unwrap_or_else(|| path.display().to_string());
                    debug!(document.id = %id, chars = raw_text.chars().count(), "loaded document");
                    report.documents.push(Document {
                        id,
                        source_path: path,
                        format: handler.format(),
                        raw_text,
                    });
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "skipping unreadable document");
                    report.errors.push(e);
                }
            }
        }

        info!(
            folder = %folder.display(),
            documents = report.documents.len(),
            errors = report.errors.len(),
            "loaded document folder"
        );
        Ok(report)
    }
}
