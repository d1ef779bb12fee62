//! Self-managed flat vector index (fallback store).
//!
//! A contiguous arena of L2-normalized rows addressed by dense positions,
//! with separate id↔position liveness maps. Inner product over normalized
//! rows approximates cosine similarity. Insertion is O(1) (append); deletion
//! tombstones the row by dropping its mappings and leaves the storage in
//! place — [`FlatStore::compact`] rebuilds the arena with live rows only.

mod snapshot;

#[cfg(test)]
mod tests;

pub use snapshot::SnapshotMeta;

use std::collections::HashMap;
use std::path::PathBuf;

use parking_lot::RwLock;
use tracing::{debug, info};

use crate::constants::FLAT_THRESHOLD_CEILING;
use crate::embedding::EmbeddingService;
use crate::store::error::StoreError;
use crate::store::model::{Document, IndexStats, MetadataFilter, SearchHit, matches_filter};
use crate::store::DocumentStore;

use snapshot::LoadedSnapshot;

#[derive(Default)]
struct FlatState {
    /// Row-major normalized vectors, `rows × dim`.
    vectors: Vec<f32>,
    rows: usize,
    documents: HashMap<String, Document>,
    id_to_pos: HashMap<String, usize>,
    pos_to_id: HashMap<usize, String>,
}

/// Flat in-memory vector index with disk persistence.
pub struct FlatStore {
    embeddings: EmbeddingService,
    state: RwLock<FlatState>,
    dir: PathBuf,
    dim: usize,
    threshold: f32,
}

impl std::fmt::Debug for FlatStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.read();
        f.debug_struct("FlatStore")
            .field("dir", &self.dir)
            .field("dim", &self.dim)
            .field("rows", &state.rows)
            .field("documents", &state.documents.len())
            .finish()
    }
}

impl FlatStore {
    /// Opens the index at `dir`, restoring a persisted snapshot if present.
    ///
    /// Missing or corrupt snapshot files start an empty index with a logged
    /// warning; a snapshot whose dimension disagrees with the embedding
    /// service is a fatal configuration error.
    pub fn open(
        dir: PathBuf,
        embeddings: EmbeddingService,
        threshold: f32,
    ) -> Result<Self, StoreError> {
        let dim = embeddings.dimension();

        let state = match snapshot::load(&dir, dim)? {
            LoadedSnapshot::Restored { vectors, rows, meta } => {
                info!(
                    dir = %dir.display(),
                    rows,
                    documents = meta.documents.len(),
                    "Restored flat index from disk"
                );
                FlatState {
                    vectors,
                    rows,
                    documents: meta.documents,
                    id_to_pos: meta.id_to_pos,
                    pos_to_id: meta.pos_to_id,
                }
            }
            LoadedSnapshot::Fresh => {
                info!(dir = %dir.display(), dim, "Created new flat index");
                FlatState::default()
            }
        };

        Ok(Self {
            embeddings,
            state: RwLock::new(state),
            dir,
            dim,
            threshold,
        })
    }

    /// The similarity cutoff actually applied by this store.
    ///
    /// Inner-product scores over normalized vectors sit on a different scale
    /// than the primary store's distance-derived similarity, so the
    /// configured threshold is capped rather than used as-is.
    fn effective_threshold(&self) -> f32 {
        self.threshold.min(FLAT_THRESHOLD_CEILING)
    }

    /// Rebuilds the arena with live rows only and returns how many
    /// tombstoned rows were reclaimed.
    ///
    /// Recommended for callers who delete frequently; skipping it is a
    /// valid, if wasteful, steady state.
    pub fn compact(&self) -> Result<usize, StoreError> {
        let mut state = self.state.write();

        let mut live: Vec<(usize, String)> = state
            .id_to_pos
            .iter()
            .map(|(id, &pos)| (pos, id.clone()))
            .collect();
        live.sort_unstable_by_key(|(pos, _)| *pos);

        let mut vectors = Vec::with_capacity(live.len() * self.dim);
        let mut id_to_pos = HashMap::with_capacity(live.len());
        let mut pos_to_id = HashMap::with_capacity(live.len());

        for (new_pos, (old_pos, id)) in live.into_iter().enumerate() {
            let row = &state.vectors[old_pos * self.dim..(old_pos + 1) * self.dim];
            vectors.extend_from_slice(row);
            id_to_pos.insert(id.clone(), new_pos);
            pos_to_id.insert(new_pos, id);
        }

        let reclaimed = state.rows - id_to_pos.len();
        state.rows = id_to_pos.len();
        state.vectors = vectors;
        state.id_to_pos = id_to_pos;
        state.pos_to_id = pos_to_id;

        self.persist(&state)?;

        info!(reclaimed, rows = state.rows, "Compacted flat index");
        Ok(reclaimed)
    }

    fn persist(&self, state: &FlatState) -> Result<(), StoreError> {
        let meta = SnapshotMeta {
            documents: state.documents.clone(),
            id_to_pos: state.id_to_pos.clone(),
            pos_to_id: state.pos_to_id.clone(),
        };
        snapshot::save(&self.dir, self.dim, state.rows, &state.vectors, &meta)
    }

    fn append_row(&self, state: &mut FlatState, id: &str, vector: Vec<f32>) {
        let mut row = vector;
        normalize(&mut row);

        // Re-adding an existing id tombstones its old row; drop the stale
        // reverse mapping so both directions stay consistent.
        if let Some(old_pos) = state.id_to_pos.remove(id) {
            state.pos_to_id.remove(&old_pos);
        }

        let pos = state.rows;
        state.vectors.extend_from_slice(&row);
        state.rows += 1;
        state.id_to_pos.insert(id.to_string(), pos);
        state.pos_to_id.insert(pos, id.to_string());
    }

    async fn embed_contents(&self, documents: &[Document]) -> Result<Vec<Vec<f32>>, StoreError> {
        let texts: Vec<String> = documents.iter().map(|d| d.content.clone()).collect();

        let vectors = self
            .embeddings
            .encode_batch_async(texts)
            .await
            .map_err(|e| StoreError::EmbeddingFailed {
                reason: e.to_string(),
            })?;

        for vector in &vectors {
            if vector.len() != self.dim {
                return Err(StoreError::DimensionMismatch {
                    expected: self.dim,
                    actual: vector.len(),
                });
            }
        }

        Ok(vectors)
    }
}

impl DocumentStore for FlatStore {
    async fn add(&self, documents: Vec<Document>) -> Result<Vec<String>, StoreError> {
        if documents.is_empty() {
            return Ok(vec![]);
        }

        // Embedding happens outside the writer lock; only the append +
        // persist critical section is serialized.
        let vectors = self.embed_contents(&documents).await?;

        let mut state = self.state.write();
        let mut ids = Vec::with_capacity(documents.len());

        for (document, vector) in documents.into_iter().zip(vectors) {
            self.append_row(&mut state, &document.id, vector);
            ids.push(document.id.clone());
            state.documents.insert(document.id.clone(), document);
        }

        self.persist(&state)?;

        debug!(added = ids.len(), rows = state.rows, "Documents added to flat index");
        Ok(ids)
    }

    async fn search(
        &self,
        query: &str,
        n_results: usize,
        filter: Option<&MetadataFilter>,
    ) -> Result<Vec<SearchHit>, StoreError> {
        let mut query_vec = self
            .embeddings
            .encode_async(query.to_string())
            .await
            .map_err(|e| StoreError::EmbeddingFailed {
                reason: e.to_string(),
            })?;
        normalize(&mut query_vec);

        let state = self.state.read();
        if state.rows == 0 {
            return Ok(vec![]);
        }

        let mut scored: Vec<(usize, f32)> = (0..state.rows)
            .map(|pos| {
                let row = &state.vectors[pos * self.dim..(pos + 1) * self.dim];
                let score: f32 = row.iter().zip(&query_vec).map(|(a, b)| a * b).sum();
                (pos, score)
            })
            .collect();

        scored.sort_unstable_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));

        // Over-fetch so tombstones and filtered rows do not starve the
        // result set.
        let search_k = (n_results * 2).min(state.rows);
        let threshold = self.effective_threshold();

        let mut hits = Vec::new();
        for &(pos, score) in scored.iter().take(search_k) {
            let Some(id) = state.pos_to_id.get(&pos) else {
                continue; // tombstoned row
            };
            let Some(document) = state.documents.get(id) else {
                continue;
            };

            if let Some(filter) = filter {
                if !matches_filter(&document.metadata, filter) {
                    continue;
                }
            }

            if score < threshold {
                continue;
            }

            hits.push(SearchHit {
                id: id.clone(),
                content: document.content.clone(),
                metadata: document.metadata.clone(),
                similarity: score,
                distance: 1.0 - score,
            });
        }

        hits.truncate(n_results);

        debug!(
            candidates = search_k,
            returned = hits.len(),
            threshold,
            "Flat index search complete"
        );
        Ok(hits)
    }

    async fn get(&self, id: &str) -> Result<Option<Document>, StoreError> {
        Ok(self.state.read().documents.get(id).cloned())
    }

    async fn update(&self, id: &str, document: Document) -> Result<bool, StoreError> {
        if !self.state.read().documents.contains_key(id) {
            return Ok(false);
        }

        let mut document = document;
        document.id = id.to_string();

        let vectors = self.embed_contents(std::slice::from_ref(&document)).await?;
        let vector = vectors.into_iter().next().unwrap_or_default();

        let mut state = self.state.write();
        self.append_row(&mut state, id, vector);
        state.documents.insert(id.to_string(), document);
        self.persist(&state)?;

        Ok(true)
    }

    async fn delete(&self, id: &str) -> Result<bool, StoreError> {
        let mut state = self.state.write();

        if state.documents.remove(id).is_none() {
            return Ok(false);
        }

        if let Some(pos) = state.id_to_pos.remove(id) {
            state.pos_to_id.remove(&pos);
        }

        // The row itself stays in the arena; with no position mapping left
        // it is unreachable and search skips it.
        self.persist(&state)?;

        debug!(id, rows = state.rows, live = state.documents.len(), "Document tombstoned");
        Ok(true)
    }

    async fn delete_many(&self, ids: &[String]) -> Result<usize, StoreError> {
        let mut state = self.state.write();
        let mut deleted = 0;

        for id in ids {
            if state.documents.remove(id).is_none() {
                continue;
            }
            if let Some(pos) = state.id_to_pos.remove(id) {
                state.pos_to_id.remove(&pos);
            }
            deleted += 1;
        }

        if deleted > 0 {
            self.persist(&state)?;
        }

        Ok(deleted)
    }

    async fn list(
        &self,
        filter: Option<&MetadataFilter>,
        limit: Option<usize>,
    ) -> Result<Vec<Document>, StoreError> {
        let state = self.state.read();

        let mut documents = Vec::new();
        for document in state.documents.values() {
            if let Some(filter) = filter {
                if !matches_filter(&document.metadata, filter) {
                    continue;
                }
            }

            documents.push(document.clone());

            if limit.is_some_and(|limit| documents.len() >= limit) {
                break;
            }
        }

        Ok(documents)
    }

    async fn count(&self, filter: Option<&MetadataFilter>) -> Result<usize, StoreError> {
        let state = self.state.read();

        match filter {
            None => Ok(state.documents.len()),
            Some(filter) => Ok(state
                .documents
                .values()
                .filter(|d| matches_filter(&d.metadata, filter))
                .count()),
        }
    }

    async fn clear(&self) -> Result<(), StoreError> {
        let mut state = self.state.write();
        *state = FlatState::default();
        self.persist(&state)?;

        info!("Flat index cleared");
        Ok(())
    }

    async fn stats(&self) -> Result<IndexStats, StoreError> {
        let state = self.state.read();
        Ok(IndexStats {
            name: "flat_index".to_string(),
            document_count: state.documents.len(),
            index_rows: state.rows,
            dimension: self.dim,
            backend: "flat",
        })
    }
}

fn normalize(vector: &mut [f32]) {
    let norm: f32 = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for x in vector.iter_mut() {
            *x /= norm;
        }
    }
}
