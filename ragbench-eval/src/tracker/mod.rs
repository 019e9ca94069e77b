//! Experiment tracking: parameters, stepped metrics and artifacts per run.
//!
//! An [`ExperimentTracker`] owns at most one open run at a time and writes
//! through an explicit [`TrackingBackend`] handle. Every write fails with
//! [`TrackerError::NoActiveRun`] while no run is open.

pub mod file;
pub mod memory;

pub use file::FileBackend;
pub use memory::MemoryBackend;

use crate::error::TrackerError;
use crate::evaluator::EvaluationResult;
use crate::runner::aggregate;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::{Component, Path};
use std::sync::Arc;
use tracing::{debug, info};

/// Run parameters; a later write to the same key replaces the earlier value.
pub type Params = BTreeMap<String, Value>;

/// A batch of named metric values logged together.
pub type Metrics = BTreeMap<String, f64>;

/// Free-form run tags.
pub type Tags = BTreeMap<String, String>;

/// Artifact directory used by [`ExperimentTracker::log_dict_artifact`].
pub const RESULTS_ARTIFACT_DIR: &str = "results";

/// A named group of runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Experiment {
    pub id: String,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

/// Lifecycle status of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Running,
    Finished,
    Failed,
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.pad(match self {
            Self::Running => "running",
            Self::Finished => "finished",
            Self::Failed => "failed",
        })
    }
}

/// Metadata of a single run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunInfo {
    pub run_id: String,
    pub experiment_id: String,
    pub run_name: Option<String>,
    pub status: RunStatus,
    #[serde(default)]
    pub tags: Tags,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
}

/// One logged metric value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricRecord {
    pub key: String,
    pub value: f64,
    pub step: Option<usize>,
    pub timestamp: DateTime<Utc>,
}

/// Storage for experiments, runs and everything logged to them.
///
/// Backends are passed to the tracker explicitly; nothing is registered
/// globally.
pub trait TrackingBackend: Send + Sync {
    /// Look up an experiment by name, creating it if absent.
    fn get_or_create_experiment(&self, name: &str) -> Result<Experiment, TrackerError>;

    /// Create a run in the `Running` state.
    fn create_run(
        &self,
        experiment_id: &str,
        run_name: Option<&str>,
        tags: &Tags,
    ) -> Result<RunInfo, TrackerError>;

    /// Mark a run as ended with `status`.
    fn finish_run(&self, run_id: &str, status: RunStatus) -> Result<(), TrackerError>;

    fn log_params(&self, run_id: &str, params: &Params) -> Result<(), TrackerError>;

    fn log_metrics(&self, run_id: &str, metrics: &[MetricRecord]) -> Result<(), TrackerError>;

    /// Store `contents` at the relative artifact path `path`.
    fn log_artifact(&self, run_id: &str, path: &str, contents: &[u8]) -> Result<(), TrackerError>;

    fn list_experiments(&self) -> Result<Vec<Experiment>, TrackerError>;

    /// Runs of an experiment, oldest first.
    fn list_runs(&self, experiment_id: &str) -> Result<Vec<RunInfo>, TrackerError>;

    fn run_params(&self, run_id: &str) -> Result<Params, TrackerError>;

    /// Metrics of a run in logging order.
    fn run_metrics(&self, run_id: &str) -> Result<Vec<MetricRecord>, TrackerError>;
}

/// Reject artifact paths that are absolute or escape the run directory.
pub(crate) fn validate_artifact_path(path: &str) -> Result<(), TrackerError> {
    let p = Path::new(path);
    let valid = !path.is_empty()
        && p.components().all(|c| matches!(c, Component::Normal(_)));
    if valid {
        Ok(())
    } else {
        Err(TrackerError::InvalidArtifactPath {
            path: path.to_string(),
        })
    }
}

/// The pipeline settings recorded as run parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunConfig {
    pub llm_provider: String,
    pub llm_model: String,
    pub embedding_model: String,
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub retrieval_k: usize,
}

impl RunConfig {
    fn to_params(&self) -> Params {
        let mut params = Params::new();
        params.insert("llm_provider".into(), self.llm_provider.clone().into());
        params.insert("llm_model".into(), self.llm_model.clone().into());
        params.insert("embedding_model".into(), self.embedding_model.clone().into());
        params.insert("chunk_size".into(), self.chunk_size.into());
        params.insert("chunk_overlap".into(), self.chunk_overlap.into());
        params.insert("retrieval_k".into(), self.retrieval_k.into());
        params
    }
}

/// Records one experiment's runs through a [`TrackingBackend`].
pub struct ExperimentTracker {
    backend: Arc<dyn TrackingBackend>,
    experiment: Experiment,
    active: Option<RunInfo>,
}

impl std::fmt::Debug for ExperimentTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExperimentTracker")
            .field("experiment", &self.experiment.name)
            .field("run_id", &self.run_id())
            .finish()
    }
}

impl ExperimentTracker {
    /// Bind to `experiment_name`, creating the experiment if needed.
    pub fn new(
        backend: Arc<dyn TrackingBackend>,
        experiment_name: &str,
    ) -> Result<Self, TrackerError> {
        let experiment = backend.get_or_create_experiment(experiment_name)?;
        debug!(experiment = %experiment.name, id = %experiment.id, "Tracking experiment");
        Ok(Self {
            backend,
            experiment,
            active: None,
        })
    }

    pub fn experiment(&self) -> &Experiment {
        &self.experiment
    }

    pub fn backend(&self) -> &Arc<dyn TrackingBackend> {
        &self.backend
    }

    /// The open run's id, if any.
    pub fn run_id(&self) -> Option<&str> {
        self.active.as_ref().map(|r| r.run_id.as_str())
    }

    pub fn is_active(&self) -> bool {
        self.active.is_some()
    }

    /// Open a new run and return its id.
    pub fn start_run(&mut self, run_name: Option<&str>, tags: Tags) -> Result<String, TrackerError> {
        if let Some(run) = &self.active {
            return Err(TrackerError::RunAlreadyActive {
                run_id: run.run_id.clone(),
            });
        }
        let run = self
            .backend
            .create_run(&self.experiment.id, run_name, &tags)?;
        info!(
            experiment = %self.experiment.name,
            run_id = %run.run_id,
            run_name = run_name.unwrap_or_default(),
            "Started run"
        );
        let run_id = run.run_id.clone();
        self.active = Some(run);
        Ok(run_id)
    }

    /// Close the open run as finished. Does nothing when no run is open.
    pub fn end_run(&mut self) -> Result<(), TrackerError> {
        self.end_run_with_status(RunStatus::Finished)
    }

    /// Close the open run with an explicit status.
    pub fn end_run_with_status(&mut self, status: RunStatus) -> Result<(), TrackerError> {
        let Some(run) = self.active.take() else {
            return Ok(());
        };
        self.backend.finish_run(&run.run_id, status)?;
        info!(run_id = %run.run_id, %status, "Ended run");
        Ok(())
    }

    fn active_run_id(&self) -> Result<&str, TrackerError> {
        self.run_id().ok_or(TrackerError::NoActiveRun)
    }

    pub fn log_params(&self, params: &Params) -> Result<(), TrackerError> {
        let run_id = self.active_run_id()?;
        self.backend.log_params(run_id, params)
    }

    pub fn log_config(&self, config: &RunConfig) -> Result<(), TrackerError> {
        self.log_params(&config.to_params())
    }

    pub fn log_metrics(&self, metrics: &Metrics, step: Option<usize>) -> Result<(), TrackerError> {
        let run_id = self.active_run_id()?;
        let timestamp = Utc::now();
        let records: Vec<MetricRecord> = metrics
            .iter()
            .map(|(key, value)| MetricRecord {
                key: key.clone(),
                value: *value,
                step,
                timestamp,
            })
            .collect();
        self.backend.log_metrics(run_id, &records)
    }

    /// Record latency, source count and any scores of one result.
    pub fn log_evaluation(
        &self,
        result: &EvaluationResult,
        step: Option<usize>,
    ) -> Result<(), TrackerError> {
        let mut metrics = Metrics::new();
        metrics.insert("latency_seconds".into(), result.latency_seconds);
        metrics.insert("num_sources".into(), result.num_sources() as f64);
        if let Some(score) = result.relevance_score {
            metrics.insert("relevance_score".into(), score);
        }
        if let Some(score) = result.faithfulness_score {
            metrics.insert("faithfulness_score".into(), score);
        }
        self.log_metrics(&metrics, step)
    }

    /// Record batch averages. An empty batch writes nothing.
    pub fn log_batch_results(&self, results: &[EvaluationResult]) -> Result<(), TrackerError> {
        let run_id = self.active_run_id()?;
        let Some(summary) = aggregate(results) else {
            debug!(run_id, "Empty batch, no aggregate metrics logged");
            return Ok(());
        };
        self.log_metrics(&summary.to_metrics(), None)
    }

    /// Copy a local file into the run, optionally under `artifact_dir`.
    pub fn log_artifact(
        &self,
        local_path: &Path,
        artifact_dir: Option<&str>,
    ) -> Result<(), TrackerError> {
        let run_id = self.active_run_id()?;
        let file_name = local_path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| TrackerError::InvalidArtifactPath {
                path: local_path.display().to_string(),
            })?;
        let contents = std::fs::read(local_path)?;
        let path = match artifact_dir {
            Some(dir) => format!("{}/{file_name}", dir.trim_end_matches('/')),
            None => file_name.to_string(),
        };
        self.backend.log_artifact(run_id, &path, &contents)
    }

    /// Store `value` as pretty JSON at `results/<filename>`.
    pub fn log_dict_artifact<T: Serialize + ?Sized>(
        &self,
        value: &T,
        filename: &str,
    ) -> Result<(), TrackerError> {
        let run_id = self.active_run_id()?;
        let contents = serde_json::to_vec_pretty(value)?;
        self.backend.log_artifact(
            run_id,
            &format!("{RESULTS_ARTIFACT_DIR}/{filename}"),
            &contents,
        )
    }
}
