use super::*;
use crate::config::Config;
use serde_json::json;

fn service(data_dir: &std::path::Path) -> EmbeddingService {
    let config = Config {
        data_dir: data_dir.to_path_buf(),
        ..Config::default()
    };
    EmbeddingService::new(&config).expect("stub service should construct")
}

fn store(tmp: &tempfile::TempDir) -> FlatStore {
    FlatStore::open(tmp.path().join("index"), service(tmp.path()), 0.1)
        .expect("flat store should open")
}

fn doc(id: &str, content: &str) -> Document {
    Document::with_id(id, content, serde_json::Map::new())
}

fn doc_with_topic(id: &str, content: &str, topic: &str) -> Document {
    let mut metadata = serde_json::Map::new();
    metadata.insert("topic".to_string(), json!(topic));
    Document::with_id(id, content, metadata)
}

#[tokio::test]
async fn test_add_returns_ids_in_input_order() {
    let tmp = tempfile::tempdir().unwrap();
    let store = store(&tmp);

    let ids = store
        .add(vec![doc("a", "first"), doc("b", "second"), doc("c", "third")])
        .await
        .unwrap();

    assert_eq!(ids, vec!["a", "b", "c"]);
}

#[tokio::test]
async fn test_stored_rows_are_unit_norm() {
    let tmp = tempfile::tempdir().unwrap();
    let store = store(&tmp);

    store
        .add(vec![doc("a", "the quick brown fox jumps")])
        .await
        .unwrap();

    // A normalized row dotted with the identically-embedded query is 1.
    let hits = store.search("the quick brown fox jumps", 1, None).await.unwrap();
    assert_eq!(hits.len(), 1);
    assert!((hits[0].similarity - 1.0).abs() < 1e-5);
}

#[tokio::test]
async fn test_search_on_empty_index_returns_nothing() {
    let tmp = tempfile::tempdir().unwrap();
    let store = store(&tmp);

    let hits = store.search("anything", 5, None).await.unwrap();
    assert!(hits.is_empty());
}

#[tokio::test]
async fn test_search_ranks_by_token_overlap() {
    let tmp = tempfile::tempdir().unwrap();
    let store = store(&tmp);

    store
        .add(vec![
            doc("paris", "Paris is the capital of France"),
            doc("berlin", "Berlin is the capital of Germany"),
            doc("python", "Python is a programming language"),
        ])
        .await
        .unwrap();

    let hits = store.search("capital of France", 3, None).await.unwrap();

    assert!(!hits.is_empty());
    assert_eq!(hits[0].id, "paris");
}

#[tokio::test]
async fn test_unrelated_query_is_filtered_by_threshold() {
    let tmp = tempfile::tempdir().unwrap();
    let store = store(&tmp);

    store
        .add(vec![doc("paris", "Paris is the capital of France")])
        .await
        .unwrap();

    let hits = store
        .search("zymurgy telescope quark", 5, None)
        .await
        .unwrap();

    assert!(hits.is_empty());
}

#[tokio::test]
async fn test_deleted_document_is_invisible_but_row_remains() {
    let tmp = tempfile::tempdir().unwrap();
    let store = store(&tmp);

    store
        .add(vec![
            doc("keep", "Paris is the capital of France"),
            doc("drop", "France and its capital Paris"),
        ])
        .await
        .unwrap();

    assert!(store.delete("drop").await.unwrap());

    assert!(store.get("drop").await.unwrap().is_none());
    assert_eq!(store.count(None).await.unwrap(), 1);

    let hits = store.search("capital of France Paris", 5, None).await.unwrap();
    assert!(hits.iter().all(|h| h.id != "drop"));

    // The tombstoned row still occupies arena space.
    let stats = store.stats().await.unwrap();
    assert_eq!(stats.document_count, 1);
    assert_eq!(stats.index_rows, 2);
}

#[tokio::test]
async fn test_delete_missing_id_returns_false() {
    let tmp = tempfile::tempdir().unwrap();
    let store = store(&tmp);

    assert!(!store.delete("ghost").await.unwrap());
}

#[tokio::test]
async fn test_delete_many_counts_only_existing() {
    let tmp = tempfile::tempdir().unwrap();
    let store = store(&tmp);

    store
        .add(vec![doc("a", "one"), doc("b", "two")])
        .await
        .unwrap();

    let deleted = store
        .delete_many(&["a".to_string(), "b".to_string(), "ghost".to_string()])
        .await
        .unwrap();

    assert_eq!(deleted, 2);
    assert_eq!(store.count(None).await.unwrap(), 0);
}

#[tokio::test]
async fn test_metadata_filter_restricts_search_and_list() {
    let tmp = tempfile::tempdir().unwrap();
    let store = store(&tmp);

    store
        .add(vec![
            doc_with_topic("x1", "shared words here", "x"),
            doc_with_topic("x2", "shared words there", "x"),
            doc_with_topic("y1", "shared words everywhere", "y"),
        ])
        .await
        .unwrap();

    let mut filter = serde_json::Map::new();
    filter.insert("topic".to_string(), json!("x"));

    let hits = store.search("shared words", 5, Some(&filter)).await.unwrap();
    assert!(hits.iter().all(|h| h.metadata.get("topic") == Some(&json!("x"))));

    let listed = store.list(Some(&filter), None).await.unwrap();
    assert_eq!(listed.len(), 2);

    assert_eq!(store.count(Some(&filter)).await.unwrap(), 2);
}

#[tokio::test]
async fn test_list_respects_limit() {
    let tmp = tempfile::tempdir().unwrap();
    let store = store(&tmp);

    store
        .add(vec![doc("a", "one"), doc("b", "two"), doc("c", "three")])
        .await
        .unwrap();

    let listed = store.list(None, Some(2)).await.unwrap();
    assert_eq!(listed.len(), 2);
}

#[tokio::test]
async fn test_update_replaces_content_and_keeps_id() {
    let tmp = tempfile::tempdir().unwrap();
    let store = store(&tmp);

    store.add(vec![doc("a", "old content words")]).await.unwrap();

    let replaced = store
        .update("a", doc("ignored-id", "entirely new content"))
        .await
        .unwrap();
    assert!(replaced);

    let fetched = store.get("a").await.unwrap().unwrap();
    assert_eq!(fetched.id, "a");
    assert_eq!(fetched.content, "entirely new content");

    // Searchable under the new content, not the old.
    let hits = store.search("entirely new content", 1, None).await.unwrap();
    assert_eq!(hits[0].id, "a");
}

#[tokio::test]
async fn test_update_missing_id_returns_false() {
    let tmp = tempfile::tempdir().unwrap();
    let store = store(&tmp);

    assert!(!store.update("ghost", doc("ghost", "content")).await.unwrap());
}

#[tokio::test]
async fn test_snapshot_survives_reopen() {
    let tmp = tempfile::tempdir().unwrap();
    let index_dir = tmp.path().join("index");

    {
        let store =
            FlatStore::open(index_dir.clone(), service(tmp.path()), 0.1).unwrap();
        store
            .add(vec![doc("persisted", "Paris is the capital of France")])
            .await
            .unwrap();
    }

    let store = FlatStore::open(index_dir, service(tmp.path()), 0.1).unwrap();

    assert_eq!(store.count(None).await.unwrap(), 1);
    let hits = store.search("capital of France", 1, None).await.unwrap();
    assert_eq!(hits[0].id, "persisted");
}

#[tokio::test]
async fn test_clear_empties_index_and_persists() {
    let tmp = tempfile::tempdir().unwrap();
    let index_dir = tmp.path().join("index");

    {
        let store =
            FlatStore::open(index_dir.clone(), service(tmp.path()), 0.1).unwrap();
        store.add(vec![doc("a", "content")]).await.unwrap();
        store.clear().await.unwrap();
    }

    let store = FlatStore::open(index_dir, service(tmp.path()), 0.1).unwrap();
    assert_eq!(store.count(None).await.unwrap(), 0);
    assert_eq!(store.stats().await.unwrap().index_rows, 0);
}

#[tokio::test]
async fn test_compact_reclaims_tombstoned_rows() {
    let tmp = tempfile::tempdir().unwrap();
    let store = store(&tmp);

    store
        .add(vec![
            doc("a", "Paris is the capital of France"),
            doc("b", "Berlin is the capital of Germany"),
            doc("c", "Madrid is the capital of Spain"),
        ])
        .await
        .unwrap();

    store.delete("b").await.unwrap();

    let reclaimed = store.compact().unwrap();
    assert_eq!(reclaimed, 1);

    let stats = store.stats().await.unwrap();
    assert_eq!(stats.document_count, 2);
    assert_eq!(stats.index_rows, 2);

    // Survivors remain searchable after the rebuild.
    let hits = store.search("capital of France", 1, None).await.unwrap();
    assert_eq!(hits[0].id, "a");
    let hits = store.search("capital of Spain", 1, None).await.unwrap();
    assert_eq!(hits[0].id, "c");
}

#[tokio::test]
async fn test_readding_an_id_tombstones_the_old_row() {
    let tmp = tempfile::tempdir().unwrap();
    let store = store(&tmp);

    store.add(vec![doc("a", "original words")]).await.unwrap();
    store.add(vec![doc("a", "replacement words")]).await.unwrap();

    assert_eq!(store.count(None).await.unwrap(), 1);
    let stats = store.stats().await.unwrap();
    assert_eq!(stats.index_rows, 2);

    let hits = store.search("replacement words", 1, None).await.unwrap();
    assert_eq!(hits[0].content, "replacement words");
}
