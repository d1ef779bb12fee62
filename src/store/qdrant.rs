//! Primary store: adapter over a Qdrant collection.
//!
//! Translates [`Document`]s into Qdrant points (uuid point ids, payload
//! carrying `doc_id`, `content` and the metadata map), converts backend
//! distance into `[0, 1]`-ish similarity, and drops hits under the
//! configured threshold after the backend call returns. Construction probes
//! the backend once; any failure there makes [`VectorIndex`](super::VectorIndex)
//! substitute the fallback store for the process lifetime.

use std::collections::HashMap;

use qdrant_client::Qdrant;
use qdrant_client::qdrant::value::Kind;
use qdrant_client::qdrant::{
    Condition, CountPointsBuilder, CreateCollectionBuilder, DeletePointsBuilder, Distance, Filter,
    GetPointsBuilder, ListValue, PointId, PointStruct, PointsIdsList, ScrollPointsBuilder,
    SearchPointsBuilder, Struct, UpsertPointsBuilder, Value as QdrantValue, VectorParamsBuilder,
};
use serde_json::{Map, Value};
use tracing::{debug, info};
use uuid::Uuid;

use crate::config::Config;
use crate::embedding::EmbeddingService;
use crate::store::DocumentStore;
use crate::store::error::StoreError;
use crate::store::model::{Document, IndexStats, MetadataFilter, SearchHit, matches_filter};

const SCROLL_PAGE_SIZE: u32 = 256;

/// Qdrant-backed document store (primary).
pub struct QdrantStore {
    client: Qdrant,
    collection: String,
    embeddings: EmbeddingService,
    threshold: f32,
    url: String,
}

impl std::fmt::Debug for QdrantStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QdrantStore")
            .field("collection", &self.collection)
            .field("url", &self.url)
            .field("threshold", &self.threshold)
            .finish_non_exhaustive()
    }
}

impl QdrantStore {
    /// Connects to the backend and ensures the collection exists.
    ///
    /// This is the capability probe: connection, health check, or collection
    /// setup failing here means the caller falls back to the flat store.
    pub async fn connect(config: &Config, embeddings: EmbeddingService) -> Result<Self, StoreError> {
        let url = config.qdrant_url.clone();

        let client = Qdrant::from_url(&url)
            .build()
            .map_err(|e| StoreError::ConnectionFailed {
                url: url.clone(),
                message: e.to_string(),
            })?;

        client
            .health_check()
            .await
            .map_err(|e| StoreError::ConnectionFailed {
                url: url.clone(),
                message: e.to_string(),
            })?;

        let store = Self {
            client,
            collection: config.collection_name.clone(),
            embeddings,
            threshold: config.similarity_threshold,
            url,
        };

        store.ensure_collection().await?;

        info!(
            collection = %store.collection,
            url = %store.url,
            "Connected to Qdrant vector store"
        );
        Ok(store)
    }

    /// Returns the collection name.
    pub fn collection(&self) -> &str {
        &self.collection
    }

    async fn ensure_collection(&self) -> Result<(), StoreError> {
        let exists = self
            .client
            .collection_exists(&self.collection)
            .await
            .map_err(|e| StoreError::CollectionFailed {
                collection: self.collection.clone(),
                message: e.to_string(),
            })?;

        if !exists {
            self.create_collection().await?;
        }

        Ok(())
    }

    async fn create_collection(&self) -> Result<(), StoreError> {
        let vectors_config =
            VectorParamsBuilder::new(self.embeddings.dimension() as u64, Distance::Cosine);

        self.client
            .create_collection(
                CreateCollectionBuilder::new(&self.collection)
                    .vectors_config(vectors_config)
                    .on_disk_payload(true),
            )
            .await
            .map_err(|e| StoreError::CollectionFailed {
                collection: self.collection.clone(),
                message: e.to_string(),
            })?;

        info!(collection = %self.collection, "Created Qdrant collection");
        Ok(())
    }

    async fn embed_contents(&self, documents: &[Document]) -> Result<Vec<Vec<f32>>, StoreError> {
        let texts: Vec<String> = documents.iter().map(|d| d.content.clone()).collect();
        self.embeddings
            .encode_batch_async(texts)
            .await
            .map_err(|e| StoreError::EmbeddingFailed {
                reason: e.to_string(),
            })
    }

    async fn upsert(&self, documents: Vec<Document>) -> Result<Vec<String>, StoreError> {
        let vectors = self.embed_contents(&documents).await?;

        let mut ids = Vec::with_capacity(documents.len());
        let points: Vec<PointStruct> = documents
            .into_iter()
            .zip(vectors)
            .map(|(document, vector)| {
                ids.push(document.id.clone());
                PointStruct::new(point_id_for(&document.id), vector, payload_for(&document))
            })
            .collect();

        self.client
            .upsert_points(UpsertPointsBuilder::new(&self.collection, points).wait(true))
            .await
            .map_err(|e| StoreError::UpsertFailed {
                collection: self.collection.clone(),
                message: e.to_string(),
            })?;

        Ok(ids)
    }

    fn backend_filter(filter: Option<&MetadataFilter>) -> Option<Filter> {
        let filter = filter?;

        // Scalar equality pushes down to the backend; anything else (floats,
        // nested values) is enforced by the client-side re-check.
        let conditions: Vec<Condition> = filter
            .iter()
            .filter_map(|(key, value)| {
                let field = format!("metadata.{key}");
                match value {
                    Value::String(s) => Some(Condition::matches(field, s.clone())),
                    Value::Bool(b) => Some(Condition::matches(field, *b)),
                    Value::Number(n) => n.as_i64().map(|i| Condition::matches(field, i)),
                    _ => None,
                }
            })
            .collect();

        if conditions.is_empty() {
            None
        } else {
            Some(Filter::must(conditions))
        }
    }

    async fn fetch(&self, id: &str) -> Result<Option<Document>, StoreError> {
        let response = self
            .client
            .get_points(
                GetPointsBuilder::new(&self.collection, vec![point_id_for(id)]).with_payload(true),
            )
            .await
            .map_err(|e| StoreError::SearchFailed {
                collection: self.collection.clone(),
                message: e.to_string(),
            })?;

        Ok(response
            .result
            .into_iter()
            .find_map(|point| document_from_payload(&point.payload)))
    }
}

impl DocumentStore for QdrantStore {
    async fn add(&self, documents: Vec<Document>) -> Result<Vec<String>, StoreError> {
        if documents.is_empty() {
            return Ok(vec![]);
        }

        let count = documents.len();
        let ids = self.upsert(documents).await?;

        debug!(added = count, collection = %self.collection, "Documents added to Qdrant");
        Ok(ids)
    }

    async fn search(
        &self,
        query: &str,
        n_results: usize,
        filter: Option<&MetadataFilter>,
    ) -> Result<Vec<SearchHit>, StoreError> {
        let query_vec = self
            .embeddings
            .encode_async(query.to_string())
            .await
            .map_err(|e| StoreError::EmbeddingFailed {
                reason: e.to_string(),
            })?;

        let mut builder =
            SearchPointsBuilder::new(&self.collection, query_vec, n_results as u64)
                .with_payload(true);
        if let Some(backend_filter) = Self::backend_filter(filter) {
            builder = builder.filter(backend_filter);
        }

        let response = self
            .client
            .search_points(builder)
            .await
            .map_err(|e| StoreError::SearchFailed {
                collection: self.collection.clone(),
                message: e.to_string(),
            })?;

        let mut hits = Vec::new();
        for point in response.result {
            let Some(document) = document_from_payload(&point.payload) else {
                continue;
            };

            if let Some(filter) = filter {
                if !matches_filter(&document.metadata, filter) {
                    continue;
                }
            }

            // Qdrant reports cosine scores; the adapter contract works in
            // distances, so convert before applying the shared rule.
            let distance = cosine_distance(point.score);
            let similarity = similarity_from_distance(distance);

            if similarity < self.threshold {
                continue;
            }

            hits.push(SearchHit {
                id: document.id,
                content: document.content,
                metadata: document.metadata,
                similarity,
                distance,
            });
        }

        debug!(
            returned = hits.len(),
            threshold = self.threshold,
            "Qdrant search complete"
        );
        Ok(hits)
    }

    async fn get(&self, id: &str) -> Result<Option<Document>, StoreError> {
        self.fetch(id).await
    }

    async fn update(&self, id: &str, document: Document) -> Result<bool, StoreError> {
        if self.fetch(id).await?.is_none() {
            return Ok(false);
        }

        let mut document = document;
        document.id = id.to_string();
        self.upsert(vec![document]).await?;

        Ok(true)
    }

    async fn delete(&self, id: &str) -> Result<bool, StoreError> {
        if self.fetch(id).await?.is_none() {
            return Ok(false);
        }

        self.client
            .delete_points(
                DeletePointsBuilder::new(&self.collection)
                    .points(PointsIdsList {
                        ids: vec![point_id_for(id)],
                    })
                    .wait(true),
            )
            .await
            .map_err(|e| StoreError::DeleteFailed {
                collection: self.collection.clone(),
                message: e.to_string(),
            })?;

        Ok(true)
    }

    async fn delete_many(&self, ids: &[String]) -> Result<usize, StoreError> {
        let mut deleted = 0;
        for id in ids {
            if self.delete(id).await? {
                deleted += 1;
            }
        }
        Ok(deleted)
    }

    async fn list(
        &self,
        filter: Option<&MetadataFilter>,
        limit: Option<usize>,
    ) -> Result<Vec<Document>, StoreError> {
        let mut documents = Vec::new();
        let mut offset: Option<PointId> = None;

        loop {
            let mut builder = ScrollPointsBuilder::new(&self.collection)
                .limit(SCROLL_PAGE_SIZE)
                .with_payload(true);
            if let Some(backend_filter) = Self::backend_filter(filter) {
                builder = builder.filter(backend_filter);
            }
            if let Some(ref page_offset) = offset {
                builder = builder.offset(page_offset.clone());
            }

            let response =
                self.client
                    .scroll(builder)
                    .await
                    .map_err(|e| StoreError::SearchFailed {
                        collection: self.collection.clone(),
                        message: e.to_string(),
                    })?;

            for point in response.result {
                let Some(document) = document_from_payload(&point.payload) else {
                    continue;
                };

                if let Some(filter) = filter {
                    if !matches_filter(&document.metadata, filter) {
                        continue;
                    }
                }

                documents.push(document);

                if limit.is_some_and(|limit| documents.len() >= limit) {
                    return Ok(documents);
                }
            }

            match response.next_page_offset {
                Some(next) => offset = Some(next),
                None => break,
            }
        }

        Ok(documents)
    }

    async fn count(&self, filter: Option<&MetadataFilter>) -> Result<usize, StoreError> {
        match filter {
            // Filtered counts scroll the matching set; the backend's own
            // counter only understands its pushed-down conditions.
            Some(_) => Ok(self.list(filter, None).await?.len()),
            None => {
                let response = self
                    .client
                    .count(CountPointsBuilder::new(&self.collection).exact(true))
                    .await
                    .map_err(|e| StoreError::SearchFailed {
                        collection: self.collection.clone(),
                        message: e.to_string(),
                    })?;

                Ok(response.result.map(|r| r.count as usize).unwrap_or(0))
            }
        }
    }

    async fn clear(&self) -> Result<(), StoreError> {
        self.client
            .delete_collection(&self.collection)
            .await
            .map_err(|e| StoreError::CollectionFailed {
                collection: self.collection.clone(),
                message: e.to_string(),
            })?;

        self.create_collection().await?;

        info!(collection = %self.collection, "Qdrant collection cleared");
        Ok(())
    }

    async fn stats(&self) -> Result<IndexStats, StoreError> {
        let count = self.count(None).await?;
        Ok(IndexStats {
            name: self.collection.clone(),
            document_count: count,
            index_rows: count,
            dimension: self.embeddings.dimension(),
            backend: "qdrant",
        })
    }
}

/// Converts a backend cosine score into a distance.
fn cosine_distance(score: f32) -> f32 {
    1.0 - score
}

/// Converts a backend distance into the similarity the contract exposes.
fn similarity_from_distance(distance: f32) -> f32 {
    1.0 - distance
}

/// Maps a document id onto a Qdrant point id.
///
/// Qdrant accepts only integers or UUIDs as point ids; non-UUID caller ids
/// are hashed into a deterministic UUID, and the original id travels in the
/// payload.
fn point_id_for(doc_id: &str) -> PointId {
    match Uuid::parse_str(doc_id) {
        Ok(uuid) => PointId::from(uuid.to_string()),
        Err(_) => {
            let hash = blake3::hash(doc_id.as_bytes());
            let bytes: [u8; 16] = hash.as_bytes()[0..16]
                .try_into()
                .unwrap_or([0; 16]);
            PointId::from(Uuid::from_bytes(bytes).to_string())
        }
    }
}

fn payload_for(document: &Document) -> HashMap<String, QdrantValue> {
    let mut payload = HashMap::new();
    payload.insert(
        "doc_id".to_string(),
        QdrantValue {
            kind: Some(Kind::StringValue(document.id.clone())),
        },
    );
    payload.insert(
        "content".to_string(),
        QdrantValue {
            kind: Some(Kind::StringValue(document.content.clone())),
        },
    );
    payload.insert(
        "metadata".to_string(),
        json_to_qdrant(Value::Object(document.metadata.clone())),
    );
    payload
}

fn document_from_payload(payload: &HashMap<String, QdrantValue>) -> Option<Document> {
    let id = payload.get("doc_id")?.as_str()?.to_string();
    let content = payload.get("content")?.as_str()?.to_string();

    let metadata = match payload.get("metadata").cloned().map(qdrant_to_json) {
        Some(Value::Object(map)) => map,
        _ => Map::new(),
    };

    Some(Document {
        id,
        content,
        metadata,
    })
}

fn json_to_qdrant(value: Value) -> QdrantValue {
    let kind = match value {
        Value::Null => Kind::NullValue(0),
        Value::Bool(b) => Kind::BoolValue(b),
        Value::Number(n) => match n.as_i64() {
            Some(i) => Kind::IntegerValue(i),
            None => Kind::DoubleValue(n.as_f64().unwrap_or(0.0)),
        },
        Value::String(s) => Kind::StringValue(s),
        Value::Array(items) => Kind::ListValue(ListValue {
            values: items.into_iter().map(json_to_qdrant).collect(),
        }),
        Value::Object(map) => Kind::StructValue(Struct {
            fields: map
                .into_iter()
                .map(|(key, value)| (key, json_to_qdrant(value)))
                .collect(),
        }),
    };

    QdrantValue { kind: Some(kind) }
}

fn qdrant_to_json(value: QdrantValue) -> Value {
    match value.kind {
        None | Some(Kind::NullValue(_)) => Value::Null,
        Some(Kind::BoolValue(b)) => Value::Bool(b),
        Some(Kind::IntegerValue(i)) => Value::Number(i.into()),
        Some(Kind::DoubleValue(d)) => serde_json::Number::from_f64(d)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        Some(Kind::StringValue(s)) => Value::String(s),
        Some(Kind::ListValue(list)) => {
            Value::Array(list.values.into_iter().map(qdrant_to_json).collect())
        }
        Some(Kind::StructValue(fields)) => Value::Object(
            fields
                .fields
                .into_iter()
                .map(|(key, value)| (key, qdrant_to_json(value)))
                .collect(),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_similarity_is_one_minus_distance() {
        let distance = cosine_distance(0.85);
        assert!((distance - 0.15).abs() < 1e-6);
        assert!((similarity_from_distance(distance) - 0.85).abs() < 1e-6);
    }

    #[test]
    fn test_point_id_passes_uuids_through() {
        let uuid = Uuid::new_v4().to_string();
        let point_id = point_id_for(&uuid);
        assert_eq!(point_id, PointId::from(uuid));
    }

    #[test]
    fn test_point_id_for_plain_strings_is_deterministic() {
        let a = point_id_for("chunk-42");
        let b = point_id_for("chunk-42");
        let c = point_id_for("chunk-43");

        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_payload_round_trips_document() {
        let mut metadata = Map::new();
        metadata.insert("source".to_string(), json!("notes.md"));
        metadata.insert("page".to_string(), json!(7));
        metadata.insert("score".to_string(), json!(0.5));
        metadata.insert("origin".to_string(), json!({"nested": true}));

        let document = Document::with_id("my-chunk", "some content", metadata);

        let payload = payload_for(&document);
        let restored = document_from_payload(&payload).expect("payload should parse");

        assert_eq!(restored.id, document.id);
        assert_eq!(restored.content, document.content);
        assert_eq!(restored.metadata, document.metadata);
    }

    #[test]
    fn test_payload_without_doc_id_is_rejected() {
        let document = Document::with_id("x", "content", Map::new());
        let mut payload = payload_for(&document);
        payload.remove("doc_id");

        assert!(document_from_payload(&payload).is_none());
    }

    #[test]
    fn test_backend_filter_skips_unsupported_value_types() {
        let mut filter = Map::new();
        filter.insert("name".to_string(), json!("x"));
        filter.insert("ratio".to_string(), json!(0.5));

        // Only the string condition pushes down; the float stays client-side.
        let backend = QdrantStore::backend_filter(Some(&filter)).expect("one condition expected");
        assert_eq!(backend.must.len(), 1);
    }

    #[test]
    fn test_backend_filter_of_only_floats_is_none() {
        let mut filter = Map::new();
        filter.insert("ratio".to_string(), json!(0.5));

        assert!(QdrantStore::backend_filter(Some(&filter)).is_none());
    }

    #[test]
    fn test_json_qdrant_value_round_trip() {
        let original = json!({
            "string": "value",
            "int": 12,
            "float": 2.5,
            "bool": false,
            "null": null,
            "list": [1, "two", {"three": 3}],
        });

        let round_tripped = qdrant_to_json(json_to_qdrant(original.clone()));
        assert_eq!(round_tripped, original);
    }
}
