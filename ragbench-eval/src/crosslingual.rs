//! Cross-lingual retrieval probe.
//!
//! Each test case asks in one language and expects at least one retrieved
//! source in another. The share of successful cases is classified into a
//! PASS/PARTIAL/FAIL [`Band`] and written as a [`ProbeReport`].

use crate::error::EvalError;
use chrono::{DateTime, Utc};
use ragbench_core::{
    ChunkingConfig, Embedder, HeuristicDetector, LanguageDetector, RagError, Retriever,
    VectorStore, chunk_documents, load_directory,
};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

pub const EXPERIMENT_ID: &str = "EXP-002";
pub const EXPERIMENT_NAME: &str = "Cross-Lingual Retrieval Capability";

pub const PROBE_CHUNK_SIZE: usize = 500;
pub const PROBE_CHUNK_OVERLAP: usize = 50;
pub const PROBE_K: usize = 2;

/// Collection the probe corpus is indexed into.
pub const PROBE_COLLECTION: &str = "crosslingual_probe";

/// Multilingual benchmark, embedding model and CLIR literature cited by reports.
pub const REFERENCES: [&str; 4] = [
    "https://arxiv.org/html/2502.13595v4",
    "https://arxiv.org/html/2402.05672v1",
    "https://arxiv.org/html/2510.00908v1",
    "https://huggingface.co/intfloat/multilingual-e5-large",
];

/// A query and the language its answer is expected in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrossLingualTestCase {
    pub query: String,
    pub query_lang: String,
    pub target_lang: String,
    pub description: String,
}

impl CrossLingualTestCase {
    pub fn new(query: &str, query_lang: &str, target_lang: &str, description: &str) -> Self {
        Self {
            query: query.to_string(),
            query_lang: query_lang.to_string(),
            target_lang: target_lang.to_string(),
            description: description.to_string(),
        }
    }

    /// The four German/English cases run by default.
    pub fn reference_battery() -> Vec<Self> {
        vec![
            Self::new(
                "Was testet das RAG-System?",
                "de",
                "en",
                "German query → English document (RAG system testing)",
            ),
            Self::new(
                "What does the document loader test?",
                "en",
                "de",
                "English query → German document (loader testing)",
            ),
            Self::new(
                "Welche Abschnitte hat das Markdown-Dokument?",
                "de",
                "en",
                "German query → English document (markdown sections)",
            ),
            Self::new(
                "What are the bullet points in the example?",
                "en",
                "de",
                "English query → German document (bullet points)",
            ),
        ]
    }
}

/// Decides whether a retrieved source belongs to a language.
pub trait SourceLanguage: Send + Sync {
    fn is_language(&self, source_id: &str, language: &str) -> bool;
}

/// Sources whose file name contains `marker` are in `language`; all others
/// are not. Directory components of a path-like id are ignored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilenameMarker {
    pub marker: String,
    pub language: String,
}

impl FilenameMarker {
    pub fn new(marker: impl Into<String>, language: impl Into<String>) -> Self {
        Self {
            marker: marker.into(),
            language: language.into(),
        }
    }
}

impl Default for FilenameMarker {
    /// German documents carry `_de` in their file name.
    fn default() -> Self {
        Self::new("_de", "de")
    }
}

impl SourceLanguage for FilenameMarker {
    fn is_language(&self, source_id: &str, language: &str) -> bool {
        let file_name = Path::new(source_id)
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or(source_id);
        file_name.contains(&self.marker) == (language == self.language)
    }
}

/// The outcome of one test case.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrossLingualResult {
    /// 1-based position in the battery.
    pub test_id: usize,
    pub query: String,
    pub query_lang: String,
    pub detected_lang: String,
    pub target_lang: String,
    #[serde(rename = "sources")]
    pub retrieved_sources: Vec<String>,
    pub cross_lingual_success: bool,
    pub description: String,
}

/// Classification of an aggregate success rate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Band {
    Pass,
    Partial,
    Fail,
}

impl Band {
    /// PASS from 75%, PARTIAL from 50%, FAIL below.
    pub fn from_rate(success_rate: f64) -> Self {
        if success_rate >= 75.0 {
            Self::Pass
        } else if success_rate >= 50.0 {
            Self::Partial
        } else {
            Self::Fail
        }
    }

    pub fn finding(&self) -> &'static str {
        match self {
            Self::Pass => "PASS: Cross-lingual retrieval effective",
            Self::Partial => "PARTIAL: Cross-lingual retrieval partially working",
            Self::Fail => "FAIL: Cross-lingual retrieval needs improvement",
        }
    }

    pub fn detail(&self, embedding_model: &str, success_rate: f64) -> String {
        match self {
            Self::Pass => {
                format!("{embedding_model} achieves {success_rate:.0}% cross-lingual retrieval")
            }
            Self::Partial => "Semantic alignment works but not consistently".to_string(),
            Self::Fail => "Semantic alignment insufficient for reliable CLIR".to_string(),
        }
    }

    pub fn limitation(&self) -> Option<&'static str> {
        match self {
            Self::Pass => None,
            Self::Partial => Some("Consider: Query preprocessing, language-specific boosting"),
            Self::Fail => Some("Consider: Query translation fallback, different embedding model"),
        }
    }
}

/// Successes as a percentage of `total`; 0.0 for an empty battery.
pub fn success_rate(successes: usize, total: usize) -> f64 {
    if total == 0 {
        return 0.0;
    }
    successes as f64 / total as f64 * 100.0
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProbeConfiguration {
    pub embedding_model: String,
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub k: usize,
}

impl ProbeConfiguration {
    /// The reference chunking (500/50) and k (2) for `embedding_model`.
    pub fn reference(embedding_model: impl Into<String>) -> Self {
        Self {
            embedding_model: embedding_model.into(),
            chunk_size: PROBE_CHUNK_SIZE,
            chunk_overlap: PROBE_CHUNK_OVERLAP,
            k: PROBE_K,
        }
    }

    pub fn chunking(&self) -> Result<ChunkingConfig, EvalError> {
        ChunkingConfig::new(self.chunk_size, self.chunk_overlap)
            .map_err(|e| EvalError::probe(e.to_string()))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProbeMetrics {
    pub total_tests: usize,
    pub successes: usize,
    pub success_rate: f64,
}

/// The persisted probe report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProbeReport {
    pub experiment_id: String,
    pub name: String,
    pub timestamp: DateTime<Utc>,
    pub configuration: ProbeConfiguration,
    pub metrics: ProbeMetrics,
    pub finding: String,
    pub detail: String,
    pub limitation: Option<String>,
    pub results: Vec<CrossLingualResult>,
    pub references: Vec<String>,
}

impl ProbeReport {
    /// Aggregate `results` and classify the success rate.
    pub fn from_results(
        configuration: ProbeConfiguration,
        results: Vec<CrossLingualResult>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        let total_tests = results.len();
        let successes = results.iter().filter(|r| r.cross_lingual_success).count();
        let rate = success_rate(successes, total_tests);
        let band = Band::from_rate(rate);

        Self {
            experiment_id: EXPERIMENT_ID.to_string(),
            name: EXPERIMENT_NAME.to_string(),
            timestamp,
            detail: band.detail(&configuration.embedding_model, rate),
            configuration,
            metrics: ProbeMetrics {
                total_tests,
                successes,
                success_rate: rate,
            },
            finding: band.finding().to_string(),
            limitation: band.limitation().map(str::to_string),
            results,
            references: REFERENCES.iter().map(|r| r.to_string()).collect(),
        }
    }

    pub fn band(&self) -> Band {
        Band::from_rate(self.metrics.success_rate)
    }

    /// Write as indented JSON, creating parent directories.
    pub fn write_json(&self, path: &Path) -> Result<(), EvalError> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    pub fn read_json(path: &Path) -> Result<Self, EvalError> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }
}

/// Load and chunk every supported document in `dir` into a fresh in-memory store.
pub async fn index_corpus(
    dir: &Path,
    embedder: Arc<dyn Embedder>,
    chunking: &ChunkingConfig,
) -> Result<VectorStore, EvalError> {
    let documents = load_directory(dir, None).map_err(RagError::from)?;
    let chunks = chunk_documents(&documents, chunking);
    info!(
        documents = documents.len(),
        chunks = chunks.len(),
        "Indexing probe corpus"
    );
    let store = VectorStore::in_memory(PROBE_COLLECTION, embedder).map_err(RagError::from)?;
    store.add_documents(&chunks).await?;
    Ok(store)
}

/// Runs a battery of cross-lingual test cases against a retriever.
pub struct CrossLingualProbe {
    cases: Vec<CrossLingualTestCase>,
    configuration: ProbeConfiguration,
    detector: Arc<dyn LanguageDetector>,
    membership: Arc<dyn SourceLanguage>,
}

impl CrossLingualProbe {
    /// Fails when `cases` is empty.
    pub fn new(
        cases: Vec<CrossLingualTestCase>,
        configuration: ProbeConfiguration,
    ) -> Result<Self, EvalError> {
        if cases.is_empty() {
            return Err(EvalError::probe("the test battery must not be empty"));
        }
        if configuration.k == 0 {
            return Err(EvalError::probe("k must be positive"));
        }
        Ok(Self {
            cases,
            configuration,
            detector: Arc::new(HeuristicDetector),
            membership: Arc::new(FilenameMarker::default()),
        })
    }

    pub fn with_detector(mut self, detector: Arc<dyn LanguageDetector>) -> Self {
        self.detector = detector;
        self
    }

    pub fn with_membership(mut self, membership: Arc<dyn SourceLanguage>) -> Self {
        self.membership = membership;
        self
    }

    pub fn cases(&self) -> &[CrossLingualTestCase] {
        &self.cases
    }

    pub fn configuration(&self) -> &ProbeConfiguration {
        &self.configuration
    }

    /// Run every case in order. A retrieval failure aborts the probe.
    pub async fn run(&self, retriever: &dyn Retriever) -> Result<ProbeReport, EvalError> {
        let mut results = Vec::with_capacity(self.cases.len());

        for (i, case) in self.cases.iter().enumerate() {
            let detected_lang = self.detector.detect(&case.query);
            let documents = retriever.search(&case.query, self.configuration.k).await?;
            let sources: Vec<String> = documents
                .iter()
                .map(|d| d.source().unwrap_or("unknown").to_string())
                .collect();
            let success = sources
                .iter()
                .any(|s| self.membership.is_language(s, &case.target_lang));

            if success {
                info!(test_id = i + 1, detected_lang = %detected_lang, ?sources, "Cross-lingual hit");
            } else {
                warn!(test_id = i + 1, detected_lang = %detected_lang, ?sources, "Cross-lingual miss");
            }

            results.push(CrossLingualResult {
                test_id: i + 1,
                query: case.query.clone(),
                query_lang: case.query_lang.clone(),
                detected_lang,
                target_lang: case.target_lang.clone(),
                retrieved_sources: sources,
                cross_lingual_success: success,
                description: case.description.clone(),
            });
        }

        let report = ProbeReport::from_results(self.configuration.clone(), results, Utc::now());
        info!(
            successes = report.metrics.successes,
            total = report.metrics.total_tests,
            success_rate = report.metrics.success_rate,
            finding = %report.finding,
            "Probe complete"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use ragbench_core::{Document, StaticRetriever};

    fn result(success: bool) -> CrossLingualResult {
        CrossLingualResult {
            test_id: 1,
            query: "q".into(),
            query_lang: "en".into(),
            detected_lang: "en".into(),
            target_lang: "de".into(),
            retrieved_sources: vec!["notes_de.md".into()],
            cross_lingual_success: success,
            description: "d".into(),
        }
    }

    #[test]
    fn test_band_thresholds() {
        assert_eq!(Band::from_rate(100.0), Band::Pass);
        assert_eq!(Band::from_rate(75.0), Band::Pass);
        assert_eq!(Band::from_rate(74.9), Band::Partial);
        assert_eq!(Band::from_rate(50.0), Band::Partial);
        assert_eq!(Band::from_rate(49.9), Band::Fail);
        assert_eq!(Band::from_rate(0.0), Band::Fail);
    }

    #[test]
    fn test_band_texts() {
        assert_eq!(
            Band::Pass.detail("local", 75.0),
            "local achieves 75% cross-lingual retrieval"
        );
        assert!(Band::Pass.limitation().is_none());
        assert!(Band::Partial.finding().starts_with("PARTIAL"));
        assert!(Band::Fail.limitation().unwrap().contains("Query translation"));
    }

    #[test]
    fn test_filename_marker() {
        let marker = FilenameMarker::default();
        assert!(marker.is_language("docs/loader_de.md", "de"));
        assert!(!marker.is_language("docs/loader_de.md", "en"));
        assert!(marker.is_language("docs/loader.md", "en"));
        assert!(marker.is_language("unknown", "en"));
        assert!(!marker.is_language("unknown", "de"));
    }

    #[test]
    fn test_filename_marker_ignores_directories() {
        let marker = FilenameMarker::default();
        assert!(marker.is_language("/tmp/my_dev_corpus/loader.md", "en"));
        assert!(!marker.is_language("/tmp/my_dev_corpus/loader.md", "de"));
        assert!(marker.is_language("data_de/notes_de.txt", "de"));
        assert!(marker.is_language("data_de/notes.txt", "en"));
    }

    #[test]
    fn test_report_all_successes() {
        let results = vec![result(true), result(true), result(true), result(true)];
        let report =
            ProbeReport::from_results(ProbeConfiguration::reference("local"), results, Utc::now());
        assert_eq!(report.metrics.success_rate, 100.0);
        assert!(report.finding.starts_with("PASS"));
        assert_eq!(report.limitation, None);
        assert_eq!(report.experiment_id, "EXP-002");
        assert_eq!(report.references.len(), 4);
    }

    #[test]
    fn test_report_partial() {
        let results = vec![result(true), result(false), result(true), result(false)];
        let report =
            ProbeReport::from_results(ProbeConfiguration::reference("local"), results, Utc::now());
        assert_eq!(report.band(), Band::Partial);
        assert_eq!(report.detail, "Semantic alignment works but not consistently");
    }

    #[test]
    fn test_report_json_shape_and_round_trip() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("out/report.json");
        let report = ProbeReport::from_results(
            ProbeConfiguration::reference("local"),
            vec![result(false)],
            Utc::now(),
        );
        report.write_json(&path).unwrap();

        let value: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(value["results"][0]["sources"][0], "notes_de.md");
        assert_eq!(value["configuration"]["chunk_size"], 500);
        assert!(value["limitation"].is_string());

        assert_eq!(ProbeReport::read_json(&path).unwrap(), report);
    }

    #[test]
    fn test_empty_battery_rejected() {
        let err = CrossLingualProbe::new(Vec::new(), ProbeConfiguration::reference("local"));
        assert!(matches!(err, Err(EvalError::Probe(_))));
    }

    #[tokio::test]
    async fn test_run_against_static_corpus() {
        let retriever = StaticRetriever::new(vec![
            Document::new("Der Loader testet Dateien.").with_metadata("source", "loader_de.md"),
            Document::new("no source"),
        ]);
        let probe = CrossLingualProbe::new(
            CrossLingualTestCase::reference_battery(),
            ProbeConfiguration::reference("local"),
        )
        .unwrap();
        let report = probe.run(&retriever).await.unwrap();

        // Every case sees one German and one unknown (English) source.
        assert_eq!(report.metrics.successes, 4);
        assert_eq!(report.results[0].detected_lang, "de");
        assert_eq!(report.results[1].detected_lang, "en");
        assert_eq!(report.results[3].test_id, 4);
        assert_eq!(
            report.results[0].retrieved_sources,
            vec!["loader_de.md".to_string(), "unknown".to_string()]
        );
    }
}
