//! Error types for the ragbench-eval crate.

use ragbench_core::RagError;
use std::path::PathBuf;
use thiserror::Error;

/// Top-level error type for evaluation operations.
#[derive(Debug, Error)]
pub enum EvalError {
    #[error("Tracker error: {0}")]
    Tracker(#[from] TrackerError),

    /// A retrieval, generation or ingestion failure, passed through as-is.
    #[error(transparent)]
    Rag(#[from] RagError),

    #[error("Invalid test questions file {path}: {message}")]
    Questions { path: PathBuf, message: String },

    #[error("Probe configuration error: {0}")]
    Probe(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl EvalError {
    pub fn probe(msg: impl Into<String>) -> Self {
        Self::Probe(msg.into())
    }
}

/// Errors from the experiment tracker and its backends.
#[derive(Debug, Error)]
pub enum TrackerError {
    #[error("No active run; call start_run first")]
    NoActiveRun,

    #[error("Run {run_id} is still active; call end_run first")]
    RunAlreadyActive { run_id: String },

    #[error("Unknown run: {run_id}")]
    UnknownRun { run_id: String },

    #[error("Invalid artifact path: {path}")]
    InvalidArtifactPath { path: String },

    #[error("Tracking backend IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Tracking backend serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
