//! # Ragbench Core
//!
//! The retrieval-augmented generation pipeline evaluated by Ragbench:
//! layered configuration, document loading and chunking, embedding backends,
//! a SQLite-backed vector store, chat model providers, prompt templates and
//! the RAG chain that ties them together.

pub mod brain;
pub mod chain;
pub mod chunk;
pub mod config;
pub mod document;
pub mod embeddings;
pub mod error;
pub mod ingest;
pub mod language;
pub mod prompts;
pub mod providers;
pub mod retrieval;
pub mod store;
pub mod types;

// Re-export commonly used types at the crate root.
pub use brain::{ChatModel, LlmProvider, MockLlmProvider, ProviderInfo, list_providers};
pub use chain::{AnswerStream, RagChain};
pub use chunk::{RecursiveSplitter, chunk_documents, chunk_text};
pub use config::{
    ChunkingConfig, EmbeddingProviderKind, EmbeddingSettings, LlmProviderKind, LlmSettings,
    RagConfig, RetrievalConfig, TrackingConfig, load_config,
};
pub use document::{Document, Metadata, SourceRecord};
pub use embeddings::{Embedder, EmbeddingModel, LocalEmbedder, cosine_similarity};
pub use error::{ConfigError, LlmError, LoaderError, RagError, Result, StoreError};
pub use ingest::{load_directory, load_document};
pub use language::{HeuristicDetector, LanguageDetector};
pub use prompts::{PromptSet, format_documents};
pub use retrieval::{RagAnswer, Retriever, StaticRetriever};
pub use store::VectorStore;
pub use types::{CompletionRequest, CompletionResponse, Message, Role, StreamEvent, TokenUsage};
