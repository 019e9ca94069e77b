//! Documents and the source records attached to generated answers.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Free-form document metadata (`source`, `file_type`, `chunk_index`, ...).
pub type Metadata = serde_json::Map<String, Value>;

/// A unit of text flowing through loading, chunking, indexing and retrieval.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub page_content: String,
    #[serde(default)]
    pub metadata: Metadata,
}

impl Document {
    pub fn new(page_content: impl Into<String>) -> Self {
        Self {
            page_content: page_content.into(),
            metadata: Metadata::new(),
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// The `source` metadata entry, if it is a string.
    pub fn source(&self) -> Option<&str> {
        self.metadata.get("source").and_then(Value::as_str)
    }
}

/// A retrieved source as returned alongside an answer.
///
/// Missing fields deserialize to empty values rather than failing.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SourceRecord {
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub metadata: Metadata,
}

impl SourceRecord {
    pub fn new(content: impl Into<String>, metadata: Metadata) -> Self {
        Self {
            content: content.into(),
            metadata,
        }
    }

    /// Build a record from loosely-shaped JSON.
    ///
    /// A non-string `content` or non-object `metadata` degrades to empty.
    pub fn from_value(value: &Value) -> Self {
        let content = value
            .get("content")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let metadata = value
            .get("metadata")
            .and_then(Value::as_object)
            .cloned()
            .unwrap_or_default();
        Self { content, metadata }
    }

    /// Convert to a document for scoring.
    pub fn to_document(&self) -> Document {
        Document {
            page_content: self.content.clone(),
            metadata: self.metadata.clone(),
        }
    }
}

impl From<&Document> for SourceRecord {
    fn from(doc: &Document) -> Self {
        Self {
            content: doc.page_content.clone(),
            metadata: doc.metadata.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_source_lookup() {
        let doc = Document::new("text").with_metadata("source", "notes_de.md");
        assert_eq!(doc.source(), Some("notes_de.md"));
        assert_eq!(Document::new("x").source(), None);
    }

    #[test]
    fn test_source_record_from_malformed_value() {
        let record = SourceRecord::from_value(&json!({"metadata": 3}));
        assert_eq!(record.content, "");
        assert!(record.metadata.is_empty());

        let record = SourceRecord::from_value(&json!("just a string"));
        assert_eq!(record, SourceRecord::default());
    }

    #[test]
    fn test_source_record_deserialize_missing_fields() {
        let record: SourceRecord = serde_json::from_str("{}").unwrap();
        assert_eq!(record.content, "");
        assert!(record.metadata.is_empty());
    }

    #[test]
    fn test_source_record_to_document() {
        let mut meta = Metadata::new();
        meta.insert("source".into(), json!("a.txt"));
        let record = SourceRecord::new("hello", meta);
        let doc = record.to_document();
        assert_eq!(doc.page_content, "hello");
        assert_eq!(doc.source(), Some("a.txt"));
    }
}
