//! Similarity adapter
//!
//! Augments lexical results with nearest-neighbour matches:
//!
//! 1. embed the query's text (dialogue, else action, else free text)
//! 2. fetch `multiplier × limit` scene candidates and, when reference
//!    documents are requested, `limit` chunk candidates
//! 3. drop candidates below the similarity threshold or already present
//! 4. hydrate the survivors from the structured store and re-apply the
//!    query's structural filters
//!
//! Any failure along the way degrades to the lexical input, unchanged.

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use crate::embeddings::EmbeddingProvider;
use crate::error::{Result, SearchError};
use crate::filters::FilterChain;
use crate::lexical::LexicalExecutor;
use crate::query::Query;
use crate::results::{ContentResult, MatchType, ReferenceResult};
use crate::schema::entity_kinds;
use crate::store::StoreConnection;
use crate::vector::{rank_hits, VectorHit, VectorStore};

/// Minimum cosine similarity for a candidate to count as a match
pub const DEFAULT_SIMILARITY_THRESHOLD: f32 = 0.5;

/// Scene candidates fetched per requested result, leaving room for
/// de-duplication and filter loss
pub const DEFAULT_CANDIDATE_MULTIPLIER: usize = 2;

/// Tunables for the similarity stage
#[derive(Debug, Clone)]
pub struct SimilarityConfig {
    pub threshold: f32,
    pub candidate_multiplier: usize,
    /// Model id passed to the provider and used to select stored embeddings
    pub model_id: String,
    /// Upper bound on the provider call; `None` waits indefinitely
    pub embedding_timeout: Option<Duration>,
}

impl Default for SimilarityConfig {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_SIMILARITY_THRESHOLD,
            candidate_multiplier: DEFAULT_CANDIDATE_MULTIPLIER,
            model_id: String::new(),
            embedding_timeout: None,
        }
    }
}

/// Output of one enhancement pass
#[derive(Debug, Clone, Default)]
pub struct Enhancement {
    /// Lexical results followed by novel similarity matches
    pub content_results: Vec<ContentResult>,
    /// Similarity matches among reference chunks
    pub reference_results: Vec<ReferenceResult>,
    /// Number of scenes appended to the lexical input
    pub content_added: usize,
    /// Whether the stage ran to completion
    pub applied: bool,
}

impl Enhancement {
    fn degraded(existing: Vec<ContentResult>) -> Self {
        Self {
            content_results: existing,
            ..Self::default()
        }
    }
}

/// Combines an embedding provider with a vector store
pub struct SimilarityAdapter {
    provider: Arc<dyn EmbeddingProvider>,
    vectors: Arc<dyn VectorStore>,
    database_path: PathBuf,
    config: SimilarityConfig,
}

impl SimilarityAdapter {
    pub fn new(
        provider: Arc<dyn EmbeddingProvider>,
        vectors: Arc<dyn VectorStore>,
        database_path: impl Into<PathBuf>,
        config: SimilarityConfig,
    ) -> Self {
        Self {
            provider,
            vectors,
            database_path: database_path.into(),
            config,
        }
    }

    pub fn config(&self) -> &SimilarityConfig {
        &self.config
    }

    /// Augment `existing` with similarity matches.
    ///
    /// Never fails: provider, vector-store and hydration errors are logged
    /// and the input comes back unchanged with no reference results.
    pub async fn enhance(
        &self,
        query: &Query,
        existing: Vec<ContentResult>,
        limit: usize,
    ) -> Enhancement {
        match self.try_enhance(query, &existing, limit).await {
            Ok((additions, reference_results)) => {
                let content_added = additions.len();
                let mut content_results = existing;
                content_results.extend(additions);
                debug!(
                    content_added,
                    references = reference_results.len(),
                    "Similarity enhancement complete"
                );
                Enhancement {
                    content_results,
                    reference_results,
                    content_added,
                    applied: true,
                }
            }
            Err(e) => {
                warn!(
                    stage = "similarity",
                    error = %e,
                    "EnhancementDegraded: falling back to lexical results"
                );
                Enhancement::degraded(existing)
            }
        }
    }

    async fn try_enhance(
        &self,
        query: &Query,
        existing: &[ContentResult],
        limit: usize,
    ) -> Result<(Vec<ContentResult>, Vec<ReferenceResult>)> {
        let Some(text) = query.semantic_text() else {
            return Ok((Vec::new(), Vec::new()));
        };
        let query_vector = self.embed(text).await?;

        let additions = if query.searches_content() {
            self.scene_additions(query, &query_vector, existing, limit)
                .await?
        } else {
            Vec::new()
        };

        let references = if query.searches_references() {
            self.reference_matches(query, &query_vector, limit).await?
        } else {
            Vec::new()
        };

        Ok((additions, references))
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let call = self.provider.embed(text, &self.config.model_id);
        let vector = match self.config.embedding_timeout {
            Some(timeout) => tokio::time::timeout(timeout, call).await.map_err(|_| {
                SearchError::ProviderUnavailable(format!(
                    "embedding timed out after {:?}",
                    timeout
                ))
            })??,
            None => call.await?,
        };
        if vector.is_empty() {
            return Err(SearchError::Embedding("provider returned an empty vector".into()));
        }
        Ok(vector)
    }

    /// Candidates above the threshold, best first, excluding `exclude`
    async fn candidates(
        &self,
        query_vector: &[f32],
        entity_kind: &str,
        top_k: usize,
        exclude: &HashSet<i64>,
    ) -> Result<Vec<VectorHit>> {
        let mut hits = self.vectors.nearest(query_vector, entity_kind, top_k).await?;
        rank_hits(&mut hits);

        let fetched = hits.len();
        let mut seen = HashSet::new();
        hits.retain(|hit| {
            hit.similarity >= self.config.threshold
                && !exclude.contains(&hit.entity_id)
                && seen.insert(hit.entity_id)
        });
        debug!(
            entity_kind,
            fetched,
            kept = hits.len(),
            threshold = self.config.threshold,
            "Similarity candidates"
        );
        Ok(hits)
    }

    async fn scene_additions(
        &self,
        query: &Query,
        query_vector: &[f32],
        existing: &[ContentResult],
        limit: usize,
    ) -> Result<Vec<ContentResult>> {
        let existing_ids: HashSet<i64> = existing.iter().map(|r| r.scene_id).collect();
        let top_k = limit.saturating_mul(self.config.candidate_multiplier.max(1));
        let hits = self
            .candidates(query_vector, entity_kinds::SCENE, top_k, &existing_ids)
            .await?;
        if hits.is_empty() {
            return Ok(Vec::new());
        }

        let ids: Vec<i64> = hits.iter().map(|h| h.entity_id).collect();
        let mut scenes = self
            .hydrate(move |executor| executor.scenes_by_id(&ids))
            .await?;
        for scene in &mut scenes {
            scene.match_type = MatchType::Semantic;
            scene.relevance_score = score_of(&hits, scene.scene_id);
        }

        let mut scenes = FilterChain::for_content(query).apply(scenes, query);
        scenes.truncate(limit);
        Ok(scenes)
    }

    async fn reference_matches(
        &self,
        query: &Query,
        query_vector: &[f32],
        limit: usize,
    ) -> Result<Vec<ReferenceResult>> {
        let hits = self
            .candidates(query_vector, entity_kinds::BIBLE_CHUNK, limit, &HashSet::new())
            .await?;
        if hits.is_empty() {
            return Ok(Vec::new());
        }

        let ids: Vec<i64> = hits.iter().map(|h| h.entity_id).collect();
        let mut chunks = self
            .hydrate(move |executor| executor.chunks_by_id(&ids))
            .await?;
        for chunk in &mut chunks {
            chunk.match_type = MatchType::Semantic;
            chunk.relevance_score = score_of(&hits, chunk.chunk_id);
        }

        let mut chunks = FilterChain::for_references(query).apply(chunks, query);
        chunks.truncate(limit);
        Ok(chunks)
    }

    /// Run a lookup against a fresh read-only connection off the async runtime
    async fn hydrate<T, F>(&self, lookup: F) -> Result<Vec<T>>
    where
        T: Send + 'static,
        F: FnOnce(&LexicalExecutor<'_>) -> Result<Vec<T>> + Send + 'static,
    {
        let path = self.database_path.clone();
        tokio::task::spawn_blocking(move || {
            let store = StoreConnection::open(&path)?;
            lookup(&LexicalExecutor::new(&store))
        })
        .await
        .map_err(|e| SearchError::VectorStore(format!("hydration task failed: {}", e)))?
    }
}

fn score_of(hits: &[VectorHit], entity_id: i64) -> Option<f32> {
    hits.iter()
        .find(|h| h.entity_id == entity_id)
        .map(|h| h.similarity)
}
