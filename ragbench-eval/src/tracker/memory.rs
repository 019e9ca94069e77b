//! In-process tracking backend.

use super::{
    Experiment, MetricRecord, Params, RunInfo, RunStatus, Tags, TrackingBackend,
    validate_artifact_path,
};
use crate::error::TrackerError;
use chrono::Utc;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard};

#[derive(Debug, Default)]
struct State {
    experiments: Vec<Experiment>,
    runs: Vec<RunInfo>,
    params: HashMap<String, Params>,
    metrics: HashMap<String, Vec<MetricRecord>>,
    artifacts: HashMap<String, BTreeMap<String, Vec<u8>>>,
}

impl State {
    fn run_mut(&mut self, run_id: &str) -> Result<&mut RunInfo, TrackerError> {
        self.runs
            .iter_mut()
            .find(|r| r.run_id == run_id)
            .ok_or_else(|| TrackerError::UnknownRun {
                run_id: run_id.to_string(),
            })
    }

    fn ensure_run(&mut self, run_id: &str) -> Result<(), TrackerError> {
        self.run_mut(run_id).map(|_| ())
    }
}

/// Keeps everything in memory; contents can be inspected directly.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    state: Mutex<State>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|p| p.into_inner())
    }

    /// Contents of a stored artifact.
    pub fn artifact(&self, run_id: &str, path: &str) -> Option<Vec<u8>> {
        self.lock()
            .artifacts
            .get(run_id)
            .and_then(|files| files.get(path))
            .cloned()
    }

    /// Artifact paths stored for a run, sorted.
    pub fn artifact_paths(&self, run_id: &str) -> Vec<String> {
        self.lock()
            .artifacts
            .get(run_id)
            .map(|files| files.keys().cloned().collect())
            .unwrap_or_default()
    }
}

impl TrackingBackend for MemoryBackend {
    fn get_or_create_experiment(&self, name: &str) -> Result<Experiment, TrackerError> {
        let mut state = self.lock();
        if let Some(existing) = state.experiments.iter().find(|e| e.name == name) {
            return Ok(existing.clone());
        }
        let experiment = Experiment {
            id: state.experiments.len().to_string(),
            name: name.to_string(),
            created_at: Utc::now(),
        };
        state.experiments.push(experiment.clone());
        Ok(experiment)
    }

    fn create_run(
        &self,
        experiment_id: &str,
        run_name: Option<&str>,
        tags: &Tags,
    ) -> Result<RunInfo, TrackerError> {
        let run = RunInfo {
            run_id: uuid::Uuid::new_v4().simple().to_string(),
            experiment_id: experiment_id.to_string(),
            run_name: run_name.map(str::to_string),
            status: RunStatus::Running,
            tags: tags.clone(),
            start_time: Utc::now(),
            end_time: None,
        };
        self.lock().runs.push(run.clone());
        Ok(run)
    }

    fn finish_run(&self, run_id: &str, status: RunStatus) -> Result<(), TrackerError> {
        let mut state = self.lock();
        let run = state.run_mut(run_id)?;
        run.status = status;
        run.end_time = Some(Utc::now());
        Ok(())
    }

    fn log_params(&self, run_id: &str, params: &Params) -> Result<(), TrackerError> {
        let mut state = self.lock();
        state.ensure_run(run_id)?;
        let stored = state.params.entry(run_id.to_string()).or_default();
        for (key, value) in params {
            stored.insert(key.clone(), value.clone());
        }
        Ok(())
    }

    fn log_metrics(&self, run_id: &str, metrics: &[MetricRecord]) -> Result<(), TrackerError> {
        let mut state = self.lock();
        state.ensure_run(run_id)?;
        state
            .metrics
            .entry(run_id.to_string())
            .or_default()
            .extend_from_slice(metrics);
        Ok(())
    }

    fn log_artifact(&self, run_id: &str, path: &str, contents: &[u8]) -> Result<(), TrackerError> {
        validate_artifact_path(path)?;
        let mut state = self.lock();
        state.ensure_run(run_id)?;
        state
            .artifacts
            .entry(run_id.to_string())
            .or_default()
            .insert(path.to_string(), contents.to_vec());
        Ok(())
    }

    fn list_experiments(&self) -> Result<Vec<Experiment>, TrackerError> {
        Ok(self.lock().experiments.clone())
    }

    fn list_runs(&self, experiment_id: &str) -> Result<Vec<RunInfo>, TrackerError> {
        Ok(self
            .lock()
            .runs
            .iter()
            .filter(|r| r.experiment_id == experiment_id)
            .cloned()
            .collect())
    }

    fn run_params(&self, run_id: &str) -> Result<Params, TrackerError> {
        let mut state = self.lock();
        state.ensure_run(run_id)?;
        Ok(state.params.get(run_id).cloned().unwrap_or_default())
    }

    fn run_metrics(&self, run_id: &str) -> Result<Vec<MetricRecord>, TrackerError> {
        let mut state = self.lock();
        state.ensure_run(run_id)?;
        Ok(state.metrics.get(run_id).cloned().unwrap_or_default())
    }
}
