//! Engine wiring: configuration → embedding service → vector index →
//! retriever, plus the document-side operations built on top of the core
//! (chunk ingestion, source-level deletion, export/import).
//!
//! Text extraction and chunk splitting happen upstream; the engine assumes
//! chunk boundaries are already decided and receives plain chunk texts.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use thiserror::Error;
use tracing::info;

use crate::config::{Config, ConfigError};
use crate::embedding::{EmbeddingError, EmbeddingService};
use crate::retrieve::{META_PROCESSED_AT, Retriever};
use crate::store::{Document, DocumentStore, IndexStats, StoreError, VectorIndex};

#[derive(Debug, Error)]
/// Errors from engine construction and document operations.
pub enum EngineError {
    /// Invalid configuration (fatal at startup).
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Encoder failed to load (fatal at startup).
    #[error(transparent)]
    Embedding(#[from] EmbeddingError),

    /// Vector index operation failed.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Export/import file handling failed.
    #[error("document export/import failed: {reason}")]
    Transfer {
        /// Error message.
        reason: String,
    },
}

#[derive(Debug, Serialize, Deserialize)]
struct ExportFile {
    exported_at: String,
    document_count: usize,
    documents: Vec<Document>,
}

/// The retrieval engine: one constructed instance owns the process-wide
/// index and is shared by reference across request handlers.
pub struct Engine {
    embeddings: EmbeddingService,
    index: Arc<VectorIndex>,
    retriever: Retriever,
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("embeddings", &self.embeddings)
            .field("fallback_index", &self.index.is_fallback())
            .finish()
    }
}

impl Engine {
    /// Builds the engine from configuration.
    ///
    /// Validation, encoder loading, and the store probe all happen here;
    /// any failure aborts startup rather than degrading silently.
    pub async fn new(config: Config) -> Result<Self, EngineError> {
        config.validate()?;

        let embeddings = EmbeddingService::new(&config)?;
        let index = Arc::new(VectorIndex::connect(&config, embeddings.clone()).await?);
        let retriever = Retriever::new(Arc::clone(&index), &config);

        info!(
            model = %embeddings.model_info().model_id,
            fallback = index.is_fallback(),
            "Retrieval engine ready"
        );

        Ok(Self {
            embeddings,
            index,
            retriever,
        })
    }

    /// Returns the retriever.
    pub fn retriever(&self) -> &Retriever {
        &self.retriever
    }

    /// Returns the shared index handle.
    pub fn index(&self) -> &Arc<VectorIndex> {
        &self.index
    }

    /// Returns the embedding service.
    pub fn embeddings(&self) -> &EmbeddingService {
        &self.embeddings
    }

    /// Ingests pre-split chunk texts as documents of one source.
    ///
    /// Each chunk is stamped with `chunk_index`, `total_chunks` and a
    /// `processed_at` timestamp on top of `base_metadata`, then embedded and
    /// inserted in input order. Returns the new document ids.
    pub async fn add_chunks(
        &self,
        chunks: Vec<String>,
        base_metadata: Map<String, Value>,
    ) -> Result<Vec<String>, EngineError> {
        if chunks.is_empty() {
            return Ok(vec![]);
        }

        let total_chunks = chunks.len();
        let processed_at = Utc::now().to_rfc3339();

        let documents: Vec<Document> = chunks
            .into_iter()
            .enumerate()
            .map(|(chunk_index, content)| {
                let mut metadata = base_metadata.clone();
                metadata.insert("chunk_index".to_string(), json!(chunk_index));
                metadata.insert("total_chunks".to_string(), json!(total_chunks));
                metadata.insert(META_PROCESSED_AT.to_string(), json!(processed_at));
                Document::with_metadata(content, metadata)
            })
            .collect();

        let ids = self.index.add(documents).await?;

        info!(chunks = total_chunks, "Source ingested");
        Ok(ids)
    }

    /// Fetches one document by id.
    pub async fn get_document(&self, id: &str) -> Result<Option<Document>, EngineError> {
        Ok(self.index.get(id).await?)
    }

    /// Deletes one document by id (`false` when absent).
    pub async fn delete_document(&self, id: &str) -> Result<bool, EngineError> {
        Ok(self.index.delete(id).await?)
    }

    /// Deletes every chunk whose `source` metadata equals `source`.
    ///
    /// Returns how many chunks were removed.
    pub async fn delete_source(&self, source: &str) -> Result<usize, EngineError> {
        let mut filter = Map::new();
        filter.insert("source".to_string(), json!(source));

        let ids: Vec<String> = self
            .index
            .list(Some(&filter), None)
            .await?
            .into_iter()
            .map(|document| document.id)
            .collect();

        if ids.is_empty() {
            return Ok(0);
        }

        let deleted = self.index.delete_many(&ids).await?;
        info!(source, deleted, "Source removed");
        Ok(deleted)
    }

    /// Counts stored documents.
    pub async fn document_count(&self) -> Result<usize, EngineError> {
        Ok(self.index.count(None).await?)
    }

    /// Returns index statistics.
    pub async fn stats(&self) -> Result<IndexStats, EngineError> {
        Ok(self.index.stats().await?)
    }

    /// Removes every stored document.
    pub async fn clear(&self) -> Result<(), EngineError> {
        self.index.clear().await?;
        Ok(())
    }

    /// Reclaims tombstoned rows in the fallback index (no-op on the
    /// primary). Returns the number of reclaimed rows.
    pub fn compact(&self) -> Result<usize, EngineError> {
        Ok(self.index.compact()?)
    }

    /// Writes every stored document to a JSON file.
    pub async fn export_documents(&self, path: &Path) -> Result<usize, EngineError> {
        let documents = self.index.list(None, None).await?;

        let export = ExportFile {
            exported_at: Utc::now().to_rfc3339(),
            document_count: documents.len(),
            documents,
        };

        let json = serde_json::to_vec_pretty(&export).map_err(|e| EngineError::Transfer {
            reason: e.to_string(),
        })?;
        std::fs::write(path, json).map_err(|e| EngineError::Transfer {
            reason: e.to_string(),
        })?;

        info!(path = %path.display(), count = export.document_count, "Documents exported");
        Ok(export.document_count)
    }

    /// Loads documents from a JSON export and re-embeds them into the index.
    pub async fn import_documents(&self, path: &Path) -> Result<usize, EngineError> {
        let json = std::fs::read_to_string(path).map_err(|e| EngineError::Transfer {
            reason: e.to_string(),
        })?;
        let export: ExportFile =
            serde_json::from_str(&json).map_err(|e| EngineError::Transfer {
                reason: e.to_string(),
            })?;

        let count = export.documents.len();
        self.index.add(export.documents).await?;

        info!(path = %path.display(), count, "Documents imported");
        Ok(count)
    }

    /// Groups stored documents by their `source` metadata value.
    pub async fn sources(&self) -> Result<HashMap<String, usize>, EngineError> {
        let documents = self.index.list(None, None).await?;

        let mut sources: HashMap<String, usize> = HashMap::new();
        for document in documents {
            if let Some(source) = document.metadata.get("source").and_then(Value::as_str) {
                *sources.entry(source.to_string()).or_insert(0) += 1;
            }
        }

        Ok(sources)
    }
}
