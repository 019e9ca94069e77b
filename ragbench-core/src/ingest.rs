//! Document loaders for PDF, Markdown and plain-text files.
//!
//! Loading is a dispatch on file extension; every loaded document carries
//! `source` and `file_type` metadata. PDFs yield one document per page.

use crate::document::Document;
use crate::error::LoaderError;
use serde_json::Value;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use walkdir::WalkDir;

/// Extensions accepted by [`load_document`].
pub const SUPPORTED_EXTENSIONS: &[&str] = &[".pdf", ".md", ".markdown", ".txt"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FileKind {
    Pdf,
    Markdown,
    Text,
}

impl FileKind {
    fn from_extension(ext: &str) -> Option<Self> {
        match ext {
            ".pdf" => Some(Self::Pdf),
            ".md" | ".markdown" => Some(Self::Markdown),
            ".txt" => Some(Self::Text),
            _ => None,
        }
    }

    fn label(self) -> &'static str {
        match self {
            Self::Pdf => "pdf",
            Self::Markdown => "markdown",
            Self::Text => "text",
        }
    }
}

fn dotted_extension(path: &Path) -> String {
    path.extension()
        .map(|e| format!(".{}", e.to_string_lossy().to_lowercase()))
        .unwrap_or_default()
}

fn load_as(path: &Path, kind: FileKind) -> Result<Vec<Document>, LoaderError> {
    if !path.exists() {
        return Err(LoaderError::FileNotFound {
            path: path.to_path_buf(),
        });
    }
    if kind == FileKind::Pdf {
        return load_pdf_pages(path);
    }
    let content = std::fs::read_to_string(path).map_err(|e| LoaderError::ReadFailed {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;
    let doc = Document::new(content)
        .with_metadata("source", Value::String(path.display().to_string()))
        .with_metadata("file_type", kind.label());
    Ok(vec![doc])
}

fn load_pdf_pages(path: &Path) -> Result<Vec<Document>, LoaderError> {
    let bytes = std::fs::read(path).map_err(|e| LoaderError::ReadFailed {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;
    let pages = pdf_extract::extract_text_from_mem_by_pages(&bytes).map_err(|e| {
        LoaderError::PdfExtraction {
            path: path.to_path_buf(),
            message: e.to_string(),
        }
    })?;

    let source = path.display().to_string();
    let documents: Vec<Document> = pages
        .into_iter()
        .enumerate()
        .map(|(page, text)| {
            Document::new(text)
                .with_metadata("source", Value::String(source.clone()))
                .with_metadata("file_type", FileKind::Pdf.label())
                .with_metadata("page", Value::from(page))
        })
        .collect();
    if documents.iter().all(|d| d.page_content.trim().is_empty()) {
        warn!(path = %path.display(), "PDF contains no extractable text");
    }
    Ok(documents)
}

/// Load a PDF file, one document per page. Pages carry a 0-based `page`.
pub fn load_pdf(path: &Path) -> Result<Vec<Document>, LoaderError> {
    load_as(path, FileKind::Pdf)
}

/// Load a Markdown file as a single document.
pub fn load_markdown(path: &Path) -> Result<Vec<Document>, LoaderError> {
    load_as(path, FileKind::Markdown)
}

/// Load a plain-text file as a single document.
pub fn load_text(path: &Path) -> Result<Vec<Document>, LoaderError> {
    load_as(path, FileKind::Text)
}

/// Load a document based on its file extension.
pub fn load_document(path: &Path) -> Result<Vec<Document>, LoaderError> {
    let ext = dotted_extension(path);
    let kind = FileKind::from_extension(&ext).ok_or_else(|| LoaderError::Unsupported {
        extension: ext.clone(),
        supported: SUPPORTED_EXTENSIONS.join(", "),
    })?;
    load_as(path, kind)
}

/// Load all supported documents directly inside `directory`.
///
/// `extensions` narrows the accepted types (with or without a leading dot);
/// unsupported entries in it are ignored. Files that fail to load are logged
/// and skipped.
pub fn load_directory(
    directory: &Path,
    extensions: Option<&[&str]>,
) -> Result<Vec<Document>, LoaderError> {
    if !directory.exists() {
        return Err(LoaderError::DirectoryNotFound {
            path: directory.to_path_buf(),
        });
    }
    if !directory.is_dir() {
        return Err(LoaderError::NotADirectory {
            path: directory.to_path_buf(),
        });
    }

    let wanted: Vec<String> = match extensions {
        Some(exts) if !exts.is_empty() => exts
            .iter()
            .map(|e| {
                let lower = e.to_lowercase();
                if lower.starts_with('.') {
                    lower
                } else {
                    format!(".{lower}")
                }
            })
            .filter(|e| SUPPORTED_EXTENSIONS.contains(&e.as_str()))
            .collect(),
        _ => SUPPORTED_EXTENSIONS.iter().map(|e| e.to_string()).collect(),
    };

    let mut paths: Vec<PathBuf> = WalkDir::new(directory)
        .min_depth(1)
        .max_depth(1)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| entry.into_path())
        .filter(|path| wanted.contains(&dotted_extension(path)))
        .collect();
    paths.sort();

    let mut documents = Vec::new();
    for path in paths {
        match load_document(&path) {
            Ok(docs) => {
                debug!(path = %path.display(), "Loaded document");
                documents.extend(docs);
            }
            Err(e) => warn!(error = %e, "Skipping document"),
        }
    }
    Ok(documents)
}
