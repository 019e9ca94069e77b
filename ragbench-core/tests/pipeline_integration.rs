//! Integration tests for the RAG pipeline.
//!
//! These tests exercise load → chunk → index → retrieve → answer end-to-end
//! using the local embedder and MockLlmProvider, so no network is needed.

use pretty_assertions::assert_eq;
use ragbench_core::brain::MockLlmProvider;
use ragbench_core::config::ChunkingConfig;
use ragbench_core::embeddings::LocalEmbedder;
use ragbench_core::{RagChain, Retriever, VectorStore, chunk_documents, load_directory};
use std::path::Path;
use std::sync::Arc;

fn write_corpus(dir: &Path) {
    std::fs::write(
        dir.join("rag_testing.md"),
        "# RAG Testing\n\nThe RAG system is tested with evaluation questions.\n\n\
         Relevance and faithfulness scores are computed for every answer.",
    )
    .unwrap();
    std::fs::write(
        dir.join("loader_de.md"),
        "# Dokumentenlader\n\nDer Dokumentenlader testet Markdown und Textdateien.\n\n\
         - Erster Punkt\n- Zweiter Punkt",
    )
    .unwrap();
    std::fs::write(dir.join("notes.txt"), "Plain text notes about chunk overlap.").unwrap();
}

async fn indexed_store(dir: &Path) -> (VectorStore, usize) {
    let docs = load_directory(dir, None).unwrap();
    let chunks = chunk_documents(&docs, &ChunkingConfig::new(120, 20).unwrap());
    let store = VectorStore::in_memory("integration", Arc::new(LocalEmbedder::new(256))).unwrap();
    store.add_documents(&chunks).await.unwrap();
    (store, chunks.len())
}

#[tokio::test]
async fn test_index_and_retrieve() {
    let dir = tempfile::tempdir().unwrap();
    write_corpus(dir.path());
    let (store, chunk_count) = indexed_store(dir.path()).await;
    assert_eq!(store.count().unwrap(), chunk_count);

    let hits = store.search("faithfulness scores answer", 1).await.unwrap();
    assert_eq!(hits.len(), 1);
    assert!(hits[0].source().unwrap().ends_with("rag_testing.md"));
    assert!(hits[0].metadata.contains_key("chunk_index"));
    assert_eq!(hits[0].metadata["file_type"], "markdown");
}

#[tokio::test]
async fn test_chain_over_store() {
    let dir = tempfile::tempdir().unwrap();
    write_corpus(dir.path());
    let (store, _) = indexed_store(dir.path()).await;

    let llm = Arc::new(MockLlmProvider::with_response(
        "The loader tests Markdown files (loader_de.md).",
    ));
    let chain = RagChain::new(Arc::new(store), llm.clone()).with_k(2);
    let answer = chain
        .invoke("Dokumentenlader testet Markdown", false)
        .await
        .unwrap();

    assert_eq!(answer.sources.len(), 2);
    assert!(answer.sources[0]
        .metadata
        .get("source")
        .and_then(|s| s.as_str())
        .unwrap()
        .ends_with("loader_de.md"));
    let system = &llm.requests()[0][0].content;
    assert!(system.contains("[Document 1] (Source: "));
    assert!(system.contains("[Document 2] (Source: "));
}

#[tokio::test]
async fn test_streamed_answer_matches_invoke() {
    let dir = tempfile::tempdir().unwrap();
    write_corpus(dir.path());
    let (store, _) = indexed_store(dir.path()).await;
    let chain = RagChain::new(
        Arc::new(store),
        Arc::new(MockLlmProvider::with_response("Chunks overlap by twenty characters.")),
    );

    let streamed = chain.stream("chunk overlap", true).await.unwrap().collect().await.unwrap();
    let invoked = chain.invoke("chunk overlap", false).await.unwrap();
    assert_eq!(streamed, invoked);
    assert_eq!(chain.chat_history().len(), 2);
}
