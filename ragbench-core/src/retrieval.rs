//! The retrieval seam between the vector store and its consumers.

use crate::document::{Document, SourceRecord};
use crate::error::RagError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Anything that returns ranked documents for a query.
///
/// Implementations return at most `k` documents, most relevant first.
#[async_trait]
pub trait Retriever: Send + Sync {
    async fn search(&self, query: &str, k: usize) -> Result<Vec<Document>, RagError>;
}

/// A generated answer together with the sources it was grounded on.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RagAnswer {
    pub answer: String,
    #[serde(default)]
    pub sources: Vec<SourceRecord>,
}

impl RagAnswer {
    pub fn new(answer: impl Into<String>, sources: Vec<SourceRecord>) -> Self {
        Self {
            answer: answer.into(),
            sources,
        }
    }
}

/// A fixed in-memory retriever returning the first `k` of its documents.
///
/// Useful for tests and for scoring against a known corpus.
#[derive(Debug, Clone, Default)]
pub struct StaticRetriever {
    documents: Vec<Document>,
}

impl StaticRetriever {
    pub fn new(documents: Vec<Document>) -> Self {
        Self { documents }
    }
}

#[async_trait]
impl Retriever for StaticRetriever {
    async fn search(&self, _query: &str, k: usize) -> Result<Vec<Document>, RagError> {
        Ok(self.documents.iter().take(k).cloned().collect())
    }
}
