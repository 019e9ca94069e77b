//! Recursive character text splitting.
//!
//! Text is split on the first separator (in priority order) that occurs in it;
//! pieces still larger than `chunk_size` are split again with the remaining
//! separators. Small pieces are then merged back up to `chunk_size`, carrying
//! up to `chunk_overlap` characters from the end of one chunk into the next.
//! All lengths are measured in characters.

use crate::config::ChunkingConfig;
use crate::document::{Document, Metadata};
use serde_json::Value;
use tracing::debug;

/// A recursive splitter bound to a validated [`ChunkingConfig`].
#[derive(Debug, Clone)]
pub struct RecursiveSplitter {
    chunk_size: usize,
    chunk_overlap: usize,
    separators: Vec<String>,
}

impl RecursiveSplitter {
    pub fn new(config: &ChunkingConfig) -> Self {
        Self {
            chunk_size: config.chunk_size,
            chunk_overlap: config.chunk_overlap,
            separators: config.separators.clone(),
        }
    }

    /// Split `text` into trimmed, non-empty chunks.
    pub fn split_text(&self, text: &str) -> Vec<String> {
        self.split_recursive(text, &self.separators)
    }

    fn split_recursive(&self, text: &str, separators: &[String]) -> Vec<String> {
        let mut separator = separators.last().map(String::as_str).unwrap_or("");
        let mut remaining: &[String] = &[];
        for (i, sep) in separators.iter().enumerate() {
            if sep.is_empty() {
                separator = "";
                break;
            }
            if text.contains(sep.as_str()) {
                separator = sep;
                remaining = &separators[i + 1..];
                break;
            }
        }

        let mut chunks = Vec::new();
        let mut pending: Vec<String> = Vec::new();
        for piece in split_keeping_separator(text, separator) {
            if char_len(&piece) < self.chunk_size {
                pending.push(piece);
                continue;
            }
            if !pending.is_empty() {
                chunks.extend(self.merge(&pending));
                pending.clear();
            }
            if remaining.is_empty() {
                let trimmed = piece.trim();
                if !trimmed.is_empty() {
                    chunks.push(trimmed.to_string());
                }
            } else {
                chunks.extend(self.split_recursive(&piece, remaining));
            }
        }
        if !pending.is_empty() {
            chunks.extend(self.merge(&pending));
        }
        chunks
    }

    /// Merge small pieces into chunks, keeping an overlap window between them.
    fn merge(&self, pieces: &[String]) -> Vec<String> {
        let mut out = Vec::new();
        let mut window: Vec<&str> = Vec::new();
        let mut total = 0usize;

        for piece in pieces {
            let len = char_len(piece);
            if total + len > self.chunk_size && !window.is_empty() {
                push_trimmed(&mut out, &window.concat());
                while total > self.chunk_overlap
                    || (total + len > self.chunk_size && total > 0)
                {
                    let Some(first) = window.first() else { break };
                    total -= char_len(first);
                    window.remove(0);
                }
            }
            window.push(piece);
            total += len;
        }
        push_trimmed(&mut out, &window.concat());
        out
    }
}

fn push_trimmed(out: &mut Vec<String>, chunk: &str) {
    let trimmed = chunk.trim();
    if !trimmed.is_empty() {
        out.push(trimmed.to_string());
    }
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

/// Split on `separator`, attaching each separator to the start of the piece
/// that follows it. An empty separator splits into single characters.
fn split_keeping_separator(text: &str, separator: &str) -> Vec<String> {
    if separator.is_empty() {
        return text.chars().map(String::from).collect();
    }
    let mut pieces = Vec::new();
    let mut parts = text.split(separator);
    if let Some(first) = parts.next()
        && !first.is_empty()
    {
        pieces.push(first.to_string());
    }
    for part in parts {
        pieces.push(format!("{separator}{part}"));
    }
    pieces
}

/// Split `text` into documents, each carrying `metadata` plus a `chunk_index`.
pub fn chunk_text(text: &str, config: &ChunkingConfig, metadata: &Metadata) -> Vec<Document> {
    RecursiveSplitter::new(config)
        .split_text(text)
        .into_iter()
        .enumerate()
        .map(|(i, content)| {
            let mut meta = metadata.clone();
            meta.insert("chunk_index".into(), Value::from(i));
            Document {
                page_content: content,
                metadata: meta,
            }
        })
        .collect()
}

/// Split every document, numbering chunks across the whole batch.
pub fn chunk_documents(documents: &[Document], config: &ChunkingConfig) -> Vec<Document> {
    let splitter = RecursiveSplitter::new(config);
    let mut chunks = Vec::new();
    for doc in documents {
        for content in splitter.split_text(&doc.page_content) {
            let mut meta = doc.metadata.clone();
            meta.insert("chunk_index".into(), Value::from(chunks.len()));
            chunks.push(Document {
                page_content: content,
                metadata: meta,
            });
        }
    }
    debug!(
        documents = documents.len(),
        chunks = chunks.len(),
        chunk_size = config.chunk_size,
        chunk_overlap = config.chunk_overlap,
        "Chunked documents"
    );
    chunks
}
