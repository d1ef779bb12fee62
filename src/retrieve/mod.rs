//! Retrieval: query embedding, index search, reranking, hybrid merge.
//!
//! Every public retrieval path absorbs per-call failures into an empty
//! result list with the error logged — "no results" is a valid, non-fatal
//! outcome, and a single bad query never takes down the caller.

pub mod rerank;
mod types;


pub use rerank::META_PROCESSED_AT;
pub use types::{HybridWeights, RetrievalResult, RetrievalStats, RetrieveOptions};

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tracing::{debug, error, info};

use crate::config::Config;
use crate::store::{DocumentStore, StoreError, VectorIndex};

/// Retrieves relevant documents from the active vector index.
pub struct Retriever {
    index: Arc<VectorIndex>,
    default_top_k: usize,
}

impl std::fmt::Debug for Retriever {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Retriever")
            .field("default_top_k", &self.default_top_k)
            .field("fallback_index", &self.index.is_fallback())
            .finish()
    }
}

impl Retriever {
    /// Creates a retriever over the shared index.
    pub fn new(index: Arc<VectorIndex>, config: &Config) -> Self {
        Self {
            index,
            default_top_k: config.top_k,
        }
    }

    /// Returns the shared index handle.
    pub fn index(&self) -> &Arc<VectorIndex> {
        &self.index
    }

    /// Retrieves relevant documents for a query.
    ///
    /// When reranking, `2×top_k` candidates are fetched and re-scored; the
    /// rerank pass only runs if more candidates than requested actually came
    /// back. A per-call `similarity_threshold` drops results below it on top
    /// of the store's own cutoff.
    pub async fn retrieve(&self, query: &str, opts: RetrieveOptions) -> Vec<RetrievalResult> {
        let top_k = opts.top_k.unwrap_or(self.default_top_k);

        info!(top_k, rerank = opts.rerank, "Retrieving documents");

        match self.retrieve_inner(query, top_k, &opts).await {
            Ok(results) => {
                info!(returned = results.len(), "Retrieval complete");
                results
            }
            Err(e) => {
                error!(error = %e, "Retrieval failed, returning empty result set");
                vec![]
            }
        }
    }

    async fn retrieve_inner(
        &self,
        query: &str,
        top_k: usize,
        opts: &RetrieveOptions,
    ) -> Result<Vec<RetrievalResult>, StoreError> {
        let fetch_n = if opts.rerank { top_k * 2 } else { top_k };

        let hits = self
            .index
            .search(query, fetch_n, opts.metadata_filter.as_ref())
            .await?;

        let mut results: Vec<RetrievalResult> =
            hits.into_iter().map(RetrievalResult::from_hit).collect();

        if let Some(threshold) = opts.similarity_threshold {
            results.retain(|r| r.similarity >= threshold);
        }

        if opts.rerank && results.len() > top_k {
            results = rerank::rerank(query, results);
            results.truncate(top_k);
        }

        Ok(results)
    }

    /// Retrieves documents for a keyword set (space-joined into one query).
    pub async fn retrieve_by_keywords(
        &self,
        keywords: &[String],
        opts: RetrieveOptions,
    ) -> Vec<RetrievalResult> {
        let query = keywords.join(" ");
        self.retrieve(&query, opts).await
    }

    /// Retrieves documents similar to a stored document, excluding itself.
    ///
    /// The reference document's own content is the query; one extra
    /// candidate is fetched so the self-match can be removed before
    /// truncating to `top_k`.
    pub async fn retrieve_similar_to_document(
        &self,
        doc_id: &str,
        opts: RetrieveOptions,
    ) -> Vec<RetrievalResult> {
        let reference = match self.index.get(doc_id).await {
            Ok(Some(document)) => document,
            Ok(None) => {
                error!(doc_id, "Reference document not found");
                return vec![];
            }
            Err(e) => {
                error!(doc_id, error = %e, "Failed to load reference document");
                return vec![];
            }
        };

        let top_k = opts.top_k.unwrap_or(self.default_top_k);
        let fetch_opts = RetrieveOptions {
            top_k: Some(top_k + 1),
            ..opts
        };

        self.retrieve(&reference.content, fetch_opts)
            .await
            .into_iter()
            .filter(|r| r.doc_id != doc_id)
            .take(top_k)
            .collect()
    }

    /// Retrieves documents by metadata only, bypassing similarity search.
    ///
    /// Every result carries the sentinel similarity `1.0` since no vector
    /// comparison occurred.
    pub async fn retrieve_by_metadata(
        &self,
        filter: &crate::store::MetadataFilter,
        limit: Option<usize>,
    ) -> Vec<RetrievalResult> {
        match self.index.list(Some(filter), limit).await {
            Ok(documents) => documents
                .into_iter()
                .map(|document| RetrievalResult {
                    content: document.content,
                    metadata: document.metadata,
                    similarity: 1.0,
                    doc_id: document.id,
                })
                .collect(),
            Err(e) => {
                error!(error = %e, "Metadata retrieval failed, returning empty result set");
                vec![]
            }
        }
    }

    /// Hybrid retrieval: semantic and keyword legs merged by weighted score.
    ///
    /// Both legs run un-reranked; documents present in both result sets sum
    /// their weighted similarities, documents in only one keep their single
    /// weighted score.
    pub async fn retrieve_hybrid(
        &self,
        query: &str,
        keywords: &[String],
        opts: RetrieveOptions,
        weights: HybridWeights,
    ) -> Vec<RetrievalResult> {
        let top_k = opts.top_k.unwrap_or(self.default_top_k);

        let leg_opts = RetrieveOptions {
            top_k: Some(top_k),
            rerank: false,
            ..opts
        };

        let semantic_results = self.retrieve(query, leg_opts.clone()).await;

        let keyword_results = if keywords.is_empty() {
            vec![]
        } else {
            self.retrieve_by_keywords(keywords, leg_opts).await
        };

        debug!(
            semantic = semantic_results.len(),
            keyword = keyword_results.len(),
            "Merging hybrid result sets"
        );

        let mut combined = combine_hybrid(semantic_results, keyword_results, weights);
        combined.truncate(top_k);
        combined
    }

    /// Summarizes a result set (counts, score spread, source coverage).
    pub fn retrieval_stats(&self, results: &[RetrievalResult]) -> RetrievalStats {
        if results.is_empty() {
            return RetrievalStats::default();
        }

        let similarities: Vec<f32> = results.iter().map(|r| r.similarity).collect();
        let content_lengths: Vec<usize> =
            results.iter().map(|r| r.content.chars().count()).collect();

        let mut sources: HashSet<&str> = HashSet::new();
        for result in results {
            if let Some(source) = result
                .metadata
                .get("source_file")
                .or_else(|| result.metadata.get("source"))
                .and_then(serde_json::Value::as_str)
            {
                sources.insert(source);
            }
        }

        let total_content_length: usize = content_lengths.iter().sum();

        RetrievalStats {
            total_results: results.len(),
            avg_similarity: similarities.iter().sum::<f32>() / similarities.len() as f32,
            max_similarity: similarities.iter().copied().fold(f32::MIN, f32::max),
            min_similarity: similarities.iter().copied().fold(f32::MAX, f32::min),
            total_content_length,
            avg_content_length: total_content_length as f32 / content_lengths.len() as f32,
            unique_sources: sources.len(),
            above_0_8: similarities.iter().filter(|&&s| s >= 0.8).count(),
            above_0_6: similarities.iter().filter(|&&s| s >= 0.6).count(),
            above_0_4: similarities.iter().filter(|&&s| s >= 0.4).count(),
            below_0_4: similarities.iter().filter(|&&s| s < 0.4).count(),
        }
    }
}

/// Merges semantic and keyword result sets by `doc_id` with weighted scores.
fn combine_hybrid(
    semantic_results: Vec<RetrievalResult>,
    keyword_results: Vec<RetrievalResult>,
    weights: HybridWeights,
) -> Vec<RetrievalResult> {
    let mut result_map: HashMap<String, RetrievalResult> = HashMap::new();

    for mut result in semantic_results {
        result.similarity *= weights.semantic;
        result_map.insert(result.doc_id.clone(), result);
    }

    for mut result in keyword_results {
        match result_map.get_mut(&result.doc_id) {
            Some(existing) => {
                existing.similarity += result.similarity * weights.keyword;
            }
            None => {
                result.similarity *= weights.keyword;
                result_map.insert(result.doc_id.clone(), result);
            }
        }
    }

    let mut combined: Vec<RetrievalResult> = result_map.into_values().collect();
    combined.sort_by(|a, b| {
        b.similarity
            .partial_cmp(&a.similarity)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    combined
}
