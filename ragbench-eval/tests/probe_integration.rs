//! The cross-lingual probe over an indexed bilingual corpus.

use ragbench_core::{LocalEmbedder, Retriever};
use ragbench_eval::{
    CrossLingualProbe, CrossLingualTestCase, FilenameMarker, ProbeConfiguration, ProbeReport,
    index_corpus,
};
use std::sync::Arc;

#[tokio::test]
async fn probe_over_bilingual_corpus() {
    let tmp = tempfile::tempdir().unwrap();
    let docs = tmp.path().join("docs");
    std::fs::create_dir(&docs).unwrap();
    std::fs::write(
        docs.join("loader.md"),
        "# Loader\n\nThe document loader test checks markdown sections and bullet points.",
    )
    .unwrap();
    std::fs::write(
        docs.join("loader_de.md"),
        "# Lader\n\nDer Dokumentlader prüft Abschnitte und Aufzählungspunkte.",
    )
    .unwrap();

    let configuration = ProbeConfiguration::reference("local");
    let embedder = Arc::new(LocalEmbedder::new(256));
    let store = index_corpus(&docs, embedder, &configuration.chunking().unwrap())
        .await
        .unwrap();
    assert_eq!(store.count().unwrap(), 2);

    // With k=2 both documents come back, so every case finds its target language.
    let hits = store.search("What does the document loader test?", 2).await.unwrap();
    assert_eq!(hits.len(), 2);

    let probe = CrossLingualProbe::new(CrossLingualTestCase::reference_battery(), configuration)
        .unwrap()
        .with_membership(Arc::new(FilenameMarker::new("_de", "de")));
    let report = probe.run(&store).await.unwrap();

    assert_eq!(report.metrics.total_tests, 4);
    assert_eq!(report.metrics.successes, 4);
    assert!(report.finding.starts_with("PASS"));
    assert_eq!(report.detail, "local achieves 100% cross-lingual retrieval");

    let out = tmp.path().join("exp_002_results.json");
    report.write_json(&out).unwrap();
    assert_eq!(ProbeReport::read_json(&out).unwrap(), report);
}

#[tokio::test]
async fn probe_fails_on_single_language_corpus() {
    let tmp = tempfile::tempdir().unwrap();
    let docs = tmp.path().join("docs");
    std::fs::create_dir(&docs).unwrap();
    std::fs::write(docs.join("guide.txt"), "An English only guide to the RAG system.").unwrap();

    let configuration = ProbeConfiguration::reference("local");
    let store = index_corpus(
        &docs,
        Arc::new(LocalEmbedder::new(64)),
        &configuration.chunking().unwrap(),
    )
    .await
    .unwrap();
    let probe =
        CrossLingualProbe::new(CrossLingualTestCase::reference_battery(), configuration).unwrap();
    let report = probe.run(&store).await.unwrap();

    // Only the two German-query cases can find an English source.
    assert_eq!(report.metrics.successes, 2);
    assert_eq!(report.metrics.success_rate, 50.0);
    assert!(report.finding.starts_with("PARTIAL"));
    assert!(report.limitation.is_some());
}

#[tokio::test]
async fn marker_in_directory_name_is_ignored() {
    let tmp = tempfile::tempdir().unwrap();
    let docs = tmp.path().join("my_dev_corpus");
    std::fs::create_dir(&docs).unwrap();
    std::fs::write(
        docs.join("loader.md"),
        "# Loader\n\nThe document loader test checks markdown sections and bullet points.",
    )
    .unwrap();
    std::fs::write(
        docs.join("loader_de.md"),
        "# Lader\n\nDer Dokumentlader prüft Abschnitte und Aufzählungspunkte.",
    )
    .unwrap();

    let configuration = ProbeConfiguration::reference("local");
    let store = index_corpus(
        &docs,
        Arc::new(LocalEmbedder::new(256)),
        &configuration.chunking().unwrap(),
    )
    .await
    .unwrap();
    let probe =
        CrossLingualProbe::new(CrossLingualTestCase::reference_battery(), configuration).unwrap();
    let report = probe.run(&store).await.unwrap();

    assert!(report.results[0].retrieved_sources[0].contains("my_dev_corpus"));
    assert_eq!(report.metrics.successes, 4);
    assert!(report.finding.starts_with("PASS"));
}
