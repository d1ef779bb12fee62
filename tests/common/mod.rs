//! Shared fixtures for the integration suites.
//!
//! All suites run on the stub encoder and the flat fallback index inside a
//! temporary directory, so no model files or external services are needed.

// Not every suite uses every fixture.
#![allow(dead_code)]

use std::sync::Arc;

use serde_json::{Map, json};

use quarry::{Config, Document, EmbeddingService, Retriever, VectorIndex};

/// Initializes tracing once for the whole test binary.
pub fn init_tracing() {
    use std::sync::Once;
    static INIT: Once = Once::new();

    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
            )
            .with_test_writer()
            .try_init();
    });
}

/// Config rooted in a temporary directory, stub encoder, caching on.
pub fn test_config(data_dir: &std::path::Path) -> Config {
    Config {
        data_dir: data_dir.to_path_buf(),
        ..Config::default()
    }
}

/// Builds a retriever over a fresh flat index in `data_dir`.
pub fn test_retriever(data_dir: &std::path::Path) -> (Retriever, Arc<VectorIndex>) {
    init_tracing();

    let config = test_config(data_dir);
    let embeddings = EmbeddingService::new(&config).expect("stub embedding service");
    let index = Arc::new(
        VectorIndex::open_fallback(&config, embeddings).expect("flat index should open"),
    );
    let retriever = Retriever::new(Arc::clone(&index), &config);

    (retriever, index)
}

/// A document with explicit id and a `topic` metadata field.
pub fn doc_with_topic(id: &str, content: &str, topic: &str) -> Document {
    let mut metadata = Map::new();
    metadata.insert("topic".to_string(), json!(topic));
    Document::with_id(id, content, metadata)
}

/// The three-document corpus from the capital-city scenario.
pub fn capitals_corpus() -> Vec<Document> {
    vec![
        Document::with_id("paris", "Paris is the capital of France", Map::new()),
        Document::with_id("berlin", "Berlin is the capital of Germany", Map::new()),
        Document::with_id("python", "Python is a programming language", Map::new()),
    ]
}
