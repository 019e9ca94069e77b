//! Directory-tree tracking backend.
//!
//! Layout under the root directory:
//!
//! ```text
//! experiments.json
//! <experiment_id>/<run_id>/meta.json
//! <experiment_id>/<run_id>/params.json
//! <experiment_id>/<run_id>/metrics.jsonl
//! <experiment_id>/<run_id>/artifacts/...
//! ```

use super::{
    Experiment, MetricRecord, Params, RunInfo, RunStatus, Tags, TrackingBackend,
    validate_artifact_path,
};
use crate::error::TrackerError;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

const REGISTRY_FILE: &str = "experiments.json";
const META_FILE: &str = "meta.json";
const PARAMS_FILE: &str = "params.json";
const METRICS_FILE: &str = "metrics.jsonl";
const ARTIFACTS_DIR: &str = "artifacts";

#[derive(Debug, Default, Serialize, Deserialize)]
struct ExperimentRegistry {
    experiments: Vec<Experiment>,
}

impl ExperimentRegistry {
    fn load(path: &Path) -> Result<Self, TrackerError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    fn save(&self, path: &Path) -> Result<(), TrackerError> {
        write_json_atomic(path, self)
    }
}

fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<(), TrackerError> {
    let content = serde_json::to_string_pretty(value)?;
    let tmp = path.with_extension("tmp");
    std::fs::write(&tmp, &content)?;
    std::fs::rename(&tmp, path)?;
    Ok(())
}

fn read_json<T: for<'de> Deserialize<'de>>(path: &Path) -> Result<T, TrackerError> {
    let content = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&content)?)
}

/// Persists experiments and runs as plain files under a root directory.
#[derive(Debug)]
pub struct FileBackend {
    root: PathBuf,
    // Serializes read-modify-write cycles on shared files.
    write_lock: Mutex<()>,
}

impl FileBackend {
    /// Use `root`, creating it if missing.
    pub fn new(root: impl Into<PathBuf>) -> Result<Self, TrackerError> {
        let root = root.into();
        std::fs::create_dir_all(&root)?;
        Ok(Self {
            root,
            write_lock: Mutex::new(()),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory of a run, or `UnknownRun` if no experiment holds it.
    pub fn run_dir(&self, run_id: &str) -> Result<PathBuf, TrackerError> {
        let unknown = || TrackerError::UnknownRun {
            run_id: run_id.to_string(),
        };
        if run_id.is_empty() || run_id.contains(['/', '\\', '.']) {
            return Err(unknown());
        }
        let registry = ExperimentRegistry::load(&self.registry_path())?;
        registry
            .experiments
            .iter()
            .map(|e| self.root.join(&e.id).join(run_id))
            .find(|dir| dir.join(META_FILE).is_file())
            .ok_or_else(unknown)
    }

    fn registry_path(&self) -> PathBuf {
        self.root.join(REGISTRY_FILE)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ()> {
        self.write_lock.lock().unwrap_or_else(|p| p.into_inner())
    }
}

impl TrackingBackend for FileBackend {
    fn get_or_create_experiment(&self, name: &str) -> Result<Experiment, TrackerError> {
        let _guard = self.lock();
        let path = self.registry_path();
        let mut registry = ExperimentRegistry::load(&path)?;
        if let Some(existing) = registry.experiments.iter().find(|e| e.name == name) {
            return Ok(existing.clone());
        }
        let experiment = Experiment {
            id: registry.experiments.len().to_string(),
            name: name.to_string(),
            created_at: Utc::now(),
        };
        std::fs::create_dir_all(self.root.join(&experiment.id))?;
        registry.experiments.push(experiment.clone());
        registry.save(&path)?;
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
        let dir = self.root.join(experiment_id).join(&run.run_id);
        std::fs::create_dir_all(dir.join(ARTIFACTS_DIR))?;
        write_json_atomic(&dir.join(META_FILE), &run)?;
        Ok(run)
    }

    fn finish_run(&self, run_id: &str, status: RunStatus) -> Result<(), TrackerError> {
        let _guard = self.lock();
        let meta = self.run_dir(run_id)?.join(META_FILE);
        let mut run: RunInfo = read_json(&meta)?;
        run.status = status;
        run.end_time = Some(Utc::now());
        write_json_atomic(&meta, &run)
    }

    fn log_params(&self, run_id: &str, params: &Params) -> Result<(), TrackerError> {
        let _guard = self.lock();
        let path = self.run_dir(run_id)?.join(PARAMS_FILE);
        let mut stored: Params = if path.exists() {
            read_json(&path)?
        } else {
            Params::new()
        };
        for (key, value) in params {
            stored.insert(key.clone(), value.clone());
        }
        write_json_atomic(&path, &stored)
    }

    fn log_metrics(&self, run_id: &str, metrics: &[MetricRecord]) -> Result<(), TrackerError> {
        let _guard = self.lock();
        let path = self.run_dir(run_id)?.join(METRICS_FILE);
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)?;
        for record in metrics {
            let line = serde_json::to_string(record)?;
            writeln!(file, "{line}")?;
        }
        Ok(())
    }

    fn log_artifact(&self, run_id: &str, path: &str, contents: &[u8]) -> Result<(), TrackerError> {
        validate_artifact_path(path)?;
        let target = self.run_dir(run_id)?.join(ARTIFACTS_DIR).join(path);
        if let Some(parent) = target.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(target, contents)?;
        Ok(())
    }

    fn list_experiments(&self) -> Result<Vec<Experiment>, TrackerError> {
        Ok(ExperimentRegistry::load(&self.registry_path())?.experiments)
    }

    fn list_runs(&self, experiment_id: &str) -> Result<Vec<RunInfo>, TrackerError> {
        let dir = self.root.join(experiment_id);
        let mut runs = Vec::new();
        if !dir.is_dir() {
            return Ok(runs);
        }
        for entry in std::fs::read_dir(&dir)? {
            let meta = entry?.path().join(META_FILE);
            if meta.is_file() {
                runs.push(read_json::<RunInfo>(&meta)?);
            }
        }
        runs.sort_by_key(|r| r.start_time);
        Ok(runs)
    }

    fn run_params(&self, run_id: &str) -> Result<Params, TrackerError> {
        let path = self.run_dir(run_id)?.join(PARAMS_FILE);
        if !path.exists() {
            return Ok(Params::new());
        }
        read_json(&path)
    }

    fn run_metrics(&self, run_id: &str) -> Result<Vec<MetricRecord>, TrackerError> {
        let path = self.run_dir(run_id)?.join(METRICS_FILE);
        if !path.exists() {
            return Ok(Vec::new());
        }
        let content = std::fs::read_to_string(path)?;
        content
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(|line| serde_json::from_str(line).map_err(TrackerError::from))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    #[test]
    fn test_layout_on_disk() {
        let tmp = tempfile::tempdir().unwrap();
        let backend = FileBackend::new(tmp.path().join("mlruns")).unwrap();
        let exp = backend.get_or_create_experiment("rag-evaluation").unwrap();
        let run = backend.create_run(&exp.id, Some("r1"), &Tags::new()).unwrap();

        let run_dir = backend.run_dir(&run.run_id).unwrap();
        assert_eq!(run_dir, backend.root().join(&exp.id).join(&run.run_id));
        assert!(backend.root().join("experiments.json").is_file());
        assert!(run_dir.join("meta.json").is_file());
        assert!(run_dir.join("artifacts").is_dir());
    }

    #[test]
    fn test_registry_survives_reopen() {
        let tmp = tempfile::tempdir().unwrap();
        let first = FileBackend::new(tmp.path()).unwrap();
        let exp = first.get_or_create_experiment("exp").unwrap();

        let second = FileBackend::new(tmp.path()).unwrap();
        assert_eq!(second.get_or_create_experiment("exp").unwrap().id, exp.id);
        assert_eq!(second.list_experiments().unwrap().len(), 1);
    }

    #[test]
    fn test_metrics_append_and_read_back() {
        let tmp = tempfile::tempdir().unwrap();
        let backend = FileBackend::new(tmp.path()).unwrap();
        let exp = backend.get_or_create_experiment("exp").unwrap();
        let run = backend.create_run(&exp.id, None, &Tags::new()).unwrap();

        let record = |key: &str, step| MetricRecord {
            key: key.into(),
            value: 0.5,
            step,
            timestamp: Utc::now(),
        };
        backend
            .log_metrics(&run.run_id, &[record("a", Some(0))])
            .unwrap();
        backend
            .log_metrics(&run.run_id, &[record("b", Some(1)), record("c", None)])
            .unwrap();

        let metrics = backend.run_metrics(&run.run_id).unwrap();
        let keys: Vec<&str> = metrics.iter().map(|m| m.key.as_str()).collect();
        assert_eq!(keys, vec!["a", "b", "c"]);
        assert_eq!(metrics[2].step, None);
    }

    #[test]
    fn test_params_merge_and_finish() {
        let tmp = tempfile::tempdir().unwrap();
        let backend = FileBackend::new(tmp.path()).unwrap();
        let exp = backend.get_or_create_experiment("exp").unwrap();
        let run = backend.create_run(&exp.id, None, &Tags::new()).unwrap();

        let mut params = Params::new();
        params.insert("k".into(), Value::from(2));
        params.insert("model".into(), Value::from("local"));
        backend.log_params(&run.run_id, &params).unwrap();
        let mut update = Params::new();
        update.insert("k".into(), Value::from(4));
        backend.log_params(&run.run_id, &update).unwrap();

        let stored = backend.run_params(&run.run_id).unwrap();
        assert_eq!(stored["k"], Value::from(4));
        assert_eq!(stored["model"], Value::from("local"));

        backend.finish_run(&run.run_id, RunStatus::Finished).unwrap();
        let runs = backend.list_runs(&exp.id).unwrap();
        assert_eq!(runs[0].status, RunStatus::Finished);
        assert!(runs[0].end_time.is_some());
    }

    #[test]
    fn test_artifact_written_under_run() {
        let tmp = tempfile::tempdir().unwrap();
        let backend = FileBackend::new(tmp.path()).unwrap();
        let exp = backend.get_or_create_experiment("exp").unwrap();
        let run = backend.create_run(&exp.id, None, &Tags::new()).unwrap();

        backend
            .log_artifact(&run.run_id, "results/out.json", b"{}")
            .unwrap();
        let path = backend
            .run_dir(&run.run_id)
            .unwrap()
            .join("artifacts/results/out.json");
        assert_eq!(std::fs::read(path).unwrap(), b"{}");
        assert!(backend.log_artifact(&run.run_id, "../x", b"").is_err());
    }

    #[test]
    fn test_unknown_run() {
        let tmp = tempfile::tempdir().unwrap();
        let backend = FileBackend::new(tmp.path()).unwrap();
        backend.get_or_create_experiment("exp").unwrap();
        assert!(matches!(
            backend.run_metrics("nope"),
            Err(TrackerError::UnknownRun { .. })
        ));
        assert!(matches!(
            backend.run_dir("../0"),
            Err(TrackerError::UnknownRun { .. })
        ));
    }
}
