//! End-to-end evaluation runs against a temporary corpus with an offline model.

use pretty_assertions::assert_eq;
use ragbench_core::{LocalEmbedder, MockLlmProvider};
use ragbench_eval::tracker::TrackingBackend;
use ragbench_eval::{
    EvalError, ExperimentTracker, FailurePolicy, FileBackend, FullEvaluationOptions, RunStatus,
    run_full_evaluation,
};
use serde_json::Value;
use std::path::Path;
use std::sync::Arc;

fn write_corpus(dir: &Path) {
    std::fs::write(
        dir.join("pets.md"),
        "# Pets\n\nCats are popular pets that require care.\n\nDogs are loyal companions and need exercise.",
    )
    .unwrap();
    std::fs::write(dir.join("notes.txt"), "Parrots can learn to mimic speech.").unwrap();
    std::fs::write(dir.join("ignored.csv"), "a,b,c").unwrap();
}

fn write_questions(path: &Path) {
    std::fs::write(
        path,
        r#"{"questions": [
            {"id": 1, "question": "Which pets need care?", "expected_keywords": ["cats", "care"]},
            {"id": 2, "question": "What can parrots do?", "expected_keywords": ["parrots", "fly"]}
        ]}"#,
    )
    .unwrap();
}

#[tokio::test]
async fn full_evaluation_records_run() {
    let tmp = tempfile::tempdir().unwrap();
    let docs = tmp.path().join("docs");
    std::fs::create_dir(&docs).unwrap();
    write_corpus(&docs);
    let questions = tmp.path().join("questions.json");
    write_questions(&questions);

    let backend = Arc::new(FileBackend::new(tmp.path().join("mlruns")).unwrap());
    let mut tracker = ExperimentTracker::new(backend.clone(), "rag-evaluation").unwrap();
    let llm = Arc::new(MockLlmProvider::with_response("Cats are popular pets."));
    let embedder = Arc::new(LocalEmbedder::new(128));

    let mut options = FullEvaluationOptions::new(&docs, &questions);
    options.run_name = Some("smoke".into());
    let outcome = run_full_evaluation(&mut tracker, llm, embedder, &options)
        .await
        .unwrap();

    assert_eq!(outcome.results.len(), 2);
    assert!(outcome.failures.is_empty());
    assert!(!tracker.is_active());

    let runs = backend.list_runs(&tracker.experiment().id).unwrap();
    assert_eq!(runs.len(), 1);
    let run = &runs[0];
    assert_eq!(run.status, RunStatus::Finished);
    assert_eq!(run.run_name.as_deref(), Some("smoke"));

    let params = backend.run_params(&run.run_id).unwrap();
    assert_eq!(params["num_documents"], Value::from(2));
    assert_eq!(params["llm_provider"], Value::from("mock"));
    assert_eq!(params["embedding_model"], Value::from("local"));
    assert_eq!(params["retrieval_k"], Value::from(4));

    let metrics = backend.run_metrics(&run.run_id).unwrap();
    let total = metrics.iter().find(|m| m.key == "total_queries").unwrap();
    assert_eq!(total.value, 2.0);
    let steps: Vec<usize> = metrics
        .iter()
        .filter(|m| m.key == "relevance_score")
        .filter_map(|m| m.step)
        .collect();
    assert_eq!(steps, vec![0, 1]);

    let artifact = backend
        .run_dir(&run.run_id)
        .unwrap()
        .join("artifacts/results/evaluation_results.json");
    let saved: Value = serde_json::from_str(&std::fs::read_to_string(artifact).unwrap()).unwrap();
    assert_eq!(saved["results"].as_array().unwrap().len(), 2);
    assert_eq!(saved["results"][0]["question"], "Which pets need care?");
    assert!(saved.get("failures").is_none());
}

#[tokio::test]
async fn failed_evaluation_still_ends_run() {
    let tmp = tempfile::tempdir().unwrap();
    let docs = tmp.path().join("docs");
    std::fs::create_dir(&docs).unwrap();
    write_corpus(&docs);

    let backend = Arc::new(FileBackend::new(tmp.path().join("mlruns")).unwrap());
    let mut tracker = ExperimentTracker::new(backend.clone(), "rag-evaluation").unwrap();
    let options = FullEvaluationOptions::new(&docs, tmp.path().join("missing.json"));

    let err = run_full_evaluation(
        &mut tracker,
        Arc::new(MockLlmProvider::with_response("x")),
        Arc::new(LocalEmbedder::new(64)),
        &options,
    )
    .await
    .unwrap_err();
    assert!(matches!(err, EvalError::Questions { .. }));
    assert!(!tracker.is_active());

    let runs = backend.list_runs(&tracker.experiment().id).unwrap();
    assert_eq!(runs[0].status, RunStatus::Failed);
}

#[tokio::test]
async fn skip_policy_keeps_partial_results() {
    let tmp = tempfile::tempdir().unwrap();
    let docs = tmp.path().join("docs");
    std::fs::create_dir(&docs).unwrap();
    write_corpus(&docs);
    let questions = tmp.path().join("questions.json");
    write_questions(&questions);

    let backend = Arc::new(FileBackend::new(tmp.path().join("mlruns")).unwrap());
    let mut tracker = ExperimentTracker::new(backend.clone(), "rag-evaluation").unwrap();
    let llm = Arc::new(MockLlmProvider::with_response("Parrots mimic speech."));
    llm.queue_error("provider unavailable");

    let mut options = FullEvaluationOptions::new(&docs, &questions);
    options.failure_policy = FailurePolicy::SkipAndRecord;
    let outcome = run_full_evaluation(&mut tracker, llm, Arc::new(LocalEmbedder::new(64)), &options)
        .await
        .unwrap();

    assert_eq!(outcome.results.len(), 1);
    assert_eq!(outcome.failures.len(), 1);
    assert_eq!(outcome.failures[0].index, 0);

    let run = &backend.list_runs(&tracker.experiment().id).unwrap()[0];
    let artifact = backend
        .run_dir(&run.run_id)
        .unwrap()
        .join("artifacts/results/evaluation_results.json");
    let saved: Value = serde_json::from_str(&std::fs::read_to_string(artifact).unwrap()).unwrap();
    assert_eq!(saved["failures"][0]["question"], "Which pets need care?");
}

#[tokio::test]
async fn abort_policy_fails_run() {
    let tmp = tempfile::tempdir().unwrap();
    let docs = tmp.path().join("docs");
    std::fs::create_dir(&docs).unwrap();
    write_corpus(&docs);
    let questions = tmp.path().join("questions.json");
    write_questions(&questions);

    let backend = Arc::new(FileBackend::new(tmp.path().join("mlruns")).unwrap());
    let mut tracker = ExperimentTracker::new(backend.clone(), "rag-evaluation").unwrap();
    let llm = Arc::new(MockLlmProvider::with_response("ok"));
    llm.queue_response("first answer");
    llm.queue_error("provider unavailable");

    let options = FullEvaluationOptions::new(&docs, &questions);
    let err = run_full_evaluation(&mut tracker, llm, Arc::new(LocalEmbedder::new(64)), &options)
        .await
        .unwrap_err();
    assert!(matches!(err, EvalError::Rag(_)));

    let run = &backend.list_runs(&tracker.experiment().id).unwrap()[0];
    assert_eq!(run.status, RunStatus::Failed);
    // The first question was logged before the failure.
    let logged = backend.run_metrics(&run.run_id).unwrap();
    assert!(logged.iter().any(|m| m.key == "latency_seconds" && m.step == Some(0)));
    assert!(!logged.iter().any(|m| m.key == "total_queries"));
}
