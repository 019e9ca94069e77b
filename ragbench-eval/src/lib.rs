//! # Ragbench Eval
//!
//! Evaluation harness for the Ragbench pipeline: lexical relevance and
//! faithfulness scoring, a sequential batch runner, experiment tracking
//! with pluggable backends, and the cross-lingual retrieval probe.

pub mod crosslingual;
pub mod error;
pub mod evaluator;
pub mod runner;
pub mod scorer;
pub mod tracker;

pub use crosslingual::{
    Band, CrossLingualProbe, CrossLingualResult, CrossLingualTestCase, FilenameMarker,
    ProbeConfiguration, ProbeMetrics, ProbeReport, SourceLanguage, index_corpus,
};
pub use error::{EvalError, TrackerError};
pub use evaluator::{EvaluationRecord, EvaluationResult, evaluate_response};
pub use runner::{
    AnswerSource, BatchOutcome, BatchSummary, FailurePolicy, FullEvaluationOptions, ItemFailure,
    TestQuestion, aggregate, load_test_questions, run_batch, run_full_evaluation,
};
pub use scorer::{STOP_WORDS, faithfulness_score, relevance_score};
pub use tracker::{
    ExperimentTracker, FileBackend, MemoryBackend, RunConfig, RunInfo, RunStatus, TrackingBackend,
};
