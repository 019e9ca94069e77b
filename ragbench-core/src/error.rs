//! Error types for the Ragbench core library.
//!
//! Uses `thiserror` for public API error types with structured variants
//! covering configuration, LLM providers, document loading, and the vector store.

use std::path::PathBuf;

/// Top-level error type for the Ragbench core library.
#[derive(Debug, thiserror::Error)]
pub enum RagError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    #[error("Document loader error: {0}")]
    Loader(#[from] LoaderError),

    #[error("Vector store error: {0}")]
    Store(#[from] StoreError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Errors from the configuration system.
///
/// These are raised at construction time, before any work is attempted.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration: {message}")]
    Invalid { message: String },

    #[error("Environment variable not set: {var}")]
    EnvVarMissing { var: String },

    #[error("Configuration parse error: {message}")]
    ParseError { message: String },
}

impl ConfigError {
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::Invalid {
            message: message.into(),
        }
    }
}

/// Errors from LLM and embedding provider interactions.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("API request failed: {message}")]
    ApiRequest { message: String },

    #[error("API response parse error: {message}")]
    ResponseParse { message: String },

    #[error("Streaming error: {message}")]
    Streaming { message: String },

    #[error("Authentication failed for provider {provider}")]
    AuthFailed { provider: String },

    #[error("Rate limited by provider, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Provider connection failed: {message}")]
    Connection { message: String },
}

/// Errors raised while loading documents from disk.
#[derive(Debug, thiserror::Error)]
pub enum LoaderError {
    #[error("File not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error("Directory not found: {path}")]
    DirectoryNotFound { path: PathBuf },

    #[error("Not a directory: {path}")]
    NotADirectory { path: PathBuf },

    #[error("Unsupported file type: {extension}. Supported: {supported}")]
    Unsupported {
        extension: String,
        supported: String,
    },

    #[error("Failed to load {path}: {message}")]
    ReadFailed { path: PathBuf, message: String },

    #[error("Failed to extract text from PDF {path}: {message}")]
    PdfExtraction { path: PathBuf, message: String },
}

/// Errors from the vector store.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Cannot create store directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to add documents: {message}")]
    AddFailed { message: String },

    #[error("Embedding dimension mismatch: store holds {stored}, query has {query}")]
    DimensionMismatch { stored: usize, query: usize },
}

/// Convenience type alias for Ragbench core results.
pub type Result<T> = std::result::Result<T, RagError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = RagError::Config(ConfigError::invalid("chunk_overlap must be less than chunk_size"));
        assert_eq!(
            err.to_string(),
            "Configuration error: Invalid configuration: chunk_overlap must be less than chunk_size"
        );
    }

    #[test]
    fn test_loader_error_display() {
        let err = LoaderError::Unsupported {
            extension: ".pdf".into(),
            supported: ".md, .markdown, .txt".into(),
        };
        assert!(err.to_string().contains("Unsupported file type: .pdf"));
    }

    #[test]
    fn test_llm_error_converts() {
        let err: RagError = LlmError::AuthFailed {
            provider: "openai".into(),
        }
        .into();
        assert!(matches!(err, RagError::Llm(LlmError::AuthFailed { .. })));
    }
}
