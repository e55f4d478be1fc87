//! Indexing and question answering over real files

mod common;

use common::{indexer, memory_config, rag, store, write_sky_corpus, MockLlm};
use flowrag::{Error, RagConfig};
use std::sync::Arc;

#[tokio::test]
async fn test_index_skips_corrupt_pdf() {
    let dir = tempfile::tempdir().unwrap();
    write_sky_corpus(dir.path());

    let config = memory_config();
    let store = store(&config);
    let report = indexer(&config, store.clone()).run(dir.path()).await.unwrap();

    assert_eq!(report.files_total, 3);
    assert!(report.documents_written >= 2);
    assert_eq!(report.files_skipped.len(), 1);
    let skipped = &report.files_skipped[0];
    assert!(skipped.path.ends_with("c.pdf"));
    assert_eq!(skipped.kind, "ConversionError");
    assert!(skipped.reason.starts_with("ConversionError"));
    assert_eq!(store.count("documents").await.unwrap(), report.documents_written);
}

#[tokio::test]
async fn test_ask_retrieves_both_snippets() {
    let dir = tempfile::tempdir().unwrap();
    write_sky_corpus(dir.path());

    let config = memory_config();
    let store = store(&config);
    indexer(&config, store.clone()).run(dir.path()).await.unwrap();

    let llm = Arc::new(MockLlm::echo());
    let response = rag(&config, store, llm.clone())
        .ask("What color is the sky?")
        .await
        .unwrap();

    assert_eq!(response.documents.len(), 2);
    let prompts = llm.prompts();
    assert_eq!(prompts.len(), 1);
    assert!(prompts[0].contains("The sky is blue."));
    assert!(prompts[0].contains("The sky is blue at noon."));
    assert!(prompts[0].contains("Question: What color is the sky?"));
    assert!(!response.reply.is_empty());
}

#[tokio::test]
async fn test_ask_on_empty_store_uses_empty_context() {
    let config = memory_config();
    let llm = Arc::new(MockLlm::scripted(&["I don't know.", "discarded"]));
    let response = rag(&config, store(&config), llm.clone())
        .ask("What color is the sky?")
        .await
        .unwrap();

    assert_eq!(response.reply, "I don't know.");
    assert!(response.documents.is_empty());
    assert!(llm.prompts()[0].contains("Context:\n\n\nQuestion: What color is the sky?"));
}

#[tokio::test]
async fn test_generation_without_candidates_fails_the_ask() {
    let config = memory_config();
    let llm = Arc::new(MockLlm::scripted(&[]));
    let err = rag(&config, store(&config), llm).ask("anything").await.unwrap_err();
    assert_eq!(err.kind(), "GenerationError");
    assert!(err.to_string().contains("llm"));
}

#[tokio::test]
async fn test_recreate_resets_and_append_grows() {
    let docs = tempfile::tempdir().unwrap();
    let data = tempfile::tempdir().unwrap();
    write_sky_corpus(docs.path());

    let location = data.path().to_string_lossy().to_string();
    let config = common::config(&location);

    let first = indexer(&config, store(&config)).run(docs.path()).await.unwrap();
    let second = indexer(&config, store(&config)).run(docs.path()).await.unwrap();
    assert_eq!(first.documents_written, second.documents_written);
    assert_eq!(
        store(&config).count("documents").await.unwrap(),
        first.documents_written
    );

    // Same content upserts by id, so appending it again adds nothing
    let mut append = config.clone();
    append.vector_db.recreate_index = false;
    let unchanged = indexer(&append, store(&append)).run(docs.path()).await.unwrap();
    assert_eq!(unchanged.documents_written, first.documents_written);
    assert_eq!(
        store(&append).count("documents").await.unwrap(),
        first.documents_written
    );

    std::fs::write(docs.path().join("d.txt"), "Grass is green.").unwrap();
    indexer(&append, store(&append)).run(docs.path()).await.unwrap();
    assert_eq!(
        store(&append).count("documents").await.unwrap(),
        first.documents_written + 1
    );

    // A fresh handle sees the persisted index
    let llm = Arc::new(MockLlm::echo());
    let response = rag(&append, store(&append), llm).ask("What color is grass?").await.unwrap();
    assert_eq!(response.documents[0].content, "Grass is green.");
}

#[tokio::test]
async fn test_invalid_chunking_fails_before_touching_files() {
    let mut config = memory_config();
    config.chunking.split_length = 10;
    config.chunking.split_overlap = 10;
    let store = store(&RagConfig::default());
    let embedder = Arc::new(flowrag::providers::HashEmbedder::new(512));
    let err = flowrag::IndexingPipeline::new(config, embedder, store).err().unwrap();
    assert!(matches!(err, Error::Config(_)));
}

#[tokio::test]
async fn test_missing_root_is_an_error() {
    let config = memory_config();
    let err = indexer(&config, store(&config))
        .run("/definitely/not/here")
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "IoError");
}
