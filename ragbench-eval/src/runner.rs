//! Sequential batch evaluation and the end-to-end evaluation pipeline.

use crate::error::EvalError;
use crate::evaluator::{EvaluationRecord, EvaluationResult, evaluate_response};
use crate::tracker::{ExperimentTracker, Metrics, Params, RunConfig, RunStatus, Tags};
use async_trait::async_trait;
use ragbench_core::{
    Embedder, LlmProvider, RagAnswer, RagChain, RagConfig, RagError, VectorStore,
    chunk_documents, load_directory,
};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

/// Collection used to index the corpus of a full evaluation.
pub const EVAL_COLLECTION: &str = "eval_collection";

/// Artifact file holding the per-question records of a full evaluation.
pub const RESULTS_ARTIFACT: &str = "evaluation_results.json";

/// The retrieval and generation step under evaluation.
#[async_trait]
pub trait AnswerSource: Send + Sync {
    /// Answer `question` from at most `k` retrieved documents.
    async fn answer(&self, question: &str, k: usize) -> Result<RagAnswer, RagError>;
}

#[async_trait]
impl AnswerSource for RagChain {
    async fn answer(&self, question: &str, k: usize) -> Result<RagAnswer, RagError> {
        self.invoke_with_k(question, k, false).await
    }
}

/// A question with optional ground truth.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TestQuestion {
    #[serde(default, deserialize_with = "id_as_string")]
    pub id: Option<String>,
    pub question: String,
    #[serde(default)]
    pub expected_keywords: Vec<String>,
    #[serde(default)]
    pub expected_answer: Option<String>,
}

impl TestQuestion {
    pub fn new(question: impl Into<String>) -> Self {
        Self {
            question: question.into(),
            ..Self::default()
        }
    }

    pub fn with_keywords(mut self, keywords: &[&str]) -> Self {
        self.expected_keywords = keywords.iter().map(|k| k.to_string()).collect();
        self
    }
}

// Question ids appear both as strings and as numbers.
fn id_as_string<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
    Ok(match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) => Some(s),
        Some(other) => Some(other.to_string()),
    })
}

#[derive(Debug, Deserialize)]
struct QuestionFile {
    #[serde(default)]
    questions: Vec<TestQuestion>,
}

/// Read `{"questions": [...]}`. A file without the key yields no questions.
pub fn load_test_questions(path: &Path) -> Result<Vec<TestQuestion>, EvalError> {
    let content = std::fs::read_to_string(path).map_err(|e| EvalError::Questions {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;
    let file: QuestionFile = serde_json::from_str(&content).map_err(|e| EvalError::Questions {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;
    Ok(file.questions)
}

/// What a batch does when answering one question fails.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FailurePolicy {
    /// Stop at the first failure and return its error.
    #[default]
    Abort,
    /// Record the failure and continue with the next question.
    SkipAndRecord,
}

/// A question that could not be answered under [`FailurePolicy::SkipAndRecord`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemFailure {
    pub index: usize,
    pub question: String,
    pub error: String,
}

/// Results in input order plus any skipped failures.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchOutcome {
    pub results: Vec<EvaluationResult>,
    pub failures: Vec<ItemFailure>,
}

impl BatchOutcome {
    pub fn records(&self) -> Vec<EvaluationRecord> {
        self.results.iter().map(EvaluationResult::record).collect()
    }

    pub fn summary(&self) -> Option<BatchSummary> {
        aggregate(&self.results)
    }
}

/// Batch averages.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BatchSummary {
    pub avg_latency_seconds: f64,
    pub avg_relevance_score: f64,
    pub avg_faithfulness_score: f64,
    pub total_queries: usize,
}

impl BatchSummary {
    pub fn to_metrics(&self) -> Metrics {
        let mut metrics = Metrics::new();
        metrics.insert("avg_latency_seconds".into(), self.avg_latency_seconds);
        metrics.insert("avg_relevance_score".into(), self.avg_relevance_score);
        metrics.insert("avg_faithfulness_score".into(), self.avg_faithfulness_score);
        metrics.insert("total_queries".into(), self.total_queries as f64);
        metrics
    }
}

/// Arithmetic means over `results`; `None` when empty.
///
/// A missing score counts as 0.0, so unscored results lower the average.
pub fn aggregate(results: &[EvaluationResult]) -> Option<BatchSummary> {
    if results.is_empty() {
        return None;
    }
    let n = results.len() as f64;
    let mean = |f: fn(&EvaluationResult) -> f64| results.iter().map(f).sum::<f64>() / n;
    Some(BatchSummary {
        avg_latency_seconds: mean(|r| r.latency_seconds),
        avg_relevance_score: mean(|r| r.relevance_score.unwrap_or(0.0)),
        avg_faithfulness_score: mean(|r| r.faithfulness_score.unwrap_or(0.0)),
        total_queries: results.len(),
    })
}

/// Answer and score each question in order, one at a time.
///
/// With a tracker, each result's metrics are logged with its position as the
/// step before the next question is asked. Tracker errors always abort.
pub async fn run_batch(
    source: &dyn AnswerSource,
    questions: &[TestQuestion],
    k: usize,
    tracker: Option<&ExperimentTracker>,
    policy: FailurePolicy,
) -> Result<BatchOutcome, EvalError> {
    let mut outcome = BatchOutcome::default();

    for (index, question) in questions.iter().enumerate() {
        info!(step = index, total = questions.len(), question = %question.question, "Evaluating");

        let start = Instant::now();
        let answered = source.answer(&question.question, k).await;
        let latency = start.elapsed().as_secs_f64();

        let answer = match answered {
            Ok(answer) => answer,
            Err(e) if policy == FailurePolicy::SkipAndRecord => {
                warn!(step = index, error = %e, "Question failed, skipping");
                outcome.failures.push(ItemFailure {
                    index,
                    question: question.question.clone(),
                    error: e.to_string(),
                });
                continue;
            }
            Err(e) => return Err(e.into()),
        };

        let result = evaluate_response(
            &question.question,
            &answer.answer,
            answer.sources,
            latency,
            question.expected_answer.as_deref(),
            Some(question.expected_keywords.as_slice()),
        );
        info!(
            step = index,
            latency_seconds = latency,
            relevance = result.relevance_score.unwrap_or_default(),
            faithfulness = result.faithfulness_score.unwrap_or_default(),
            "Evaluated"
        );

        if let Some(tracker) = tracker {
            tracker.log_evaluation(&result, Some(index))?;
        }
        outcome.results.push(result);
    }

    Ok(outcome)
}

/// Inputs of [`run_full_evaluation`].
#[derive(Debug, Clone)]
pub struct FullEvaluationOptions {
    pub docs_dir: PathBuf,
    pub questions_path: PathBuf,
    pub config: RagConfig,
    pub run_name: Option<String>,
    pub tags: Tags,
    pub failure_policy: FailurePolicy,
}

impl FullEvaluationOptions {
    pub fn new(docs_dir: impl Into<PathBuf>, questions_path: impl Into<PathBuf>) -> Self {
        Self {
            docs_dir: docs_dir.into(),
            questions_path: questions_path.into(),
            config: RagConfig::default(),
            run_name: None,
            tags: Tags::new(),
            failure_policy: FailurePolicy::default(),
        }
    }
}

/// Index a corpus, evaluate a question set against it and record the run.
///
/// The run is always ended: `finished` on success, `failed` otherwise.
pub async fn run_full_evaluation(
    tracker: &mut ExperimentTracker,
    llm: Arc<dyn LlmProvider>,
    embedder: Arc<dyn Embedder>,
    options: &FullEvaluationOptions,
) -> Result<BatchOutcome, EvalError> {
    tracker.start_run(options.run_name.as_deref(), options.tags.clone())?;

    let outcome = evaluate_in_run(tracker, llm, embedder, options).await;
    let status = if outcome.is_ok() {
        RunStatus::Finished
    } else {
        RunStatus::Failed
    };
    let ended = tracker.end_run_with_status(status);

    let outcome = outcome?;
    ended?;
    Ok(outcome)
}

async fn evaluate_in_run(
    tracker: &ExperimentTracker,
    llm: Arc<dyn LlmProvider>,
    embedder: Arc<dyn Embedder>,
    options: &FullEvaluationOptions,
) -> Result<BatchOutcome, EvalError> {
    let config = &options.config;
    let k = config.retrieval.k;

    tracker.log_config(&RunConfig {
        llm_provider: llm.provider_name().to_string(),
        llm_model: llm.model_name().to_string(),
        embedding_model: embedder.model_name().to_string(),
        chunk_size: config.chunking.chunk_size,
        chunk_overlap: config.chunking.chunk_overlap,
        retrieval_k: k,
    })?;

    let documents = load_directory(&options.docs_dir, None).map_err(RagError::from)?;
    let chunks = chunk_documents(&documents, &config.chunking);
    info!(documents = documents.len(), chunks = chunks.len(), "Loaded corpus");

    let mut params = Params::new();
    params.insert("num_documents".into(), documents.len().into());
    params.insert("num_chunks".into(), chunks.len().into());
    tracker.log_params(&params)?;

    let mut retrieval = config.retrieval.clone();
    retrieval.collection = EVAL_COLLECTION.to_string();
    let store = VectorStore::from_config(&retrieval, embedder).map_err(RagError::from)?;
    store.replace_documents(&chunks).await?;

    let questions = load_test_questions(&options.questions_path)?;
    info!(questions = questions.len(), "Running evaluation");

    let chain = RagChain::new(Arc::new(store), llm)
        .with_k(k)
        .with_generation(config.llm.temperature, Some(config.llm.max_tokens));
    let outcome = run_batch(&chain, &questions, k, Some(tracker), options.failure_policy).await?;

    tracker.log_batch_results(&outcome.results)?;

    let mut artifact = serde_json::json!({ "results": outcome.records() });
    if !outcome.failures.is_empty() {
        artifact["failures"] = serde_json::to_value(&outcome.failures)?;
    }
    tracker.log_dict_artifact(&artifact, RESULTS_ARTIFACT)?;

    if let Some(summary) = outcome.summary() {
        info!(
            total = summary.total_queries,
            failures = outcome.failures.len(),
            avg_latency = summary.avg_latency_seconds,
            avg_relevance = summary.avg_relevance_score,
            avg_faithfulness = summary.avg_faithfulness_score,
            "Evaluation complete"
        );
    }
    Ok(outcome)
}
