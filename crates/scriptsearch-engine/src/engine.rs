//! Retrieval orchestrator
//!
//! [`SearchEngine::search`] is the single entry point:
//!
//! 1. validate the query (no I/O on failure)
//! 2. lexical scene search, unless only reference documents are requested
//! 3. lexical reference search, when reference documents are requested
//! 4. similarity augmentation, when the query is eligible and a provider is
//!    configured
//! 5. de-duplicate, compute totals and `has_more`, freeze the response
//!
//! The engine holds only immutable configuration. Every call opens its own
//! read-only store connection.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, info};

use crate::embeddings::EmbeddingProvider;
use crate::error::{Result, SearchError, StoreFault};
use crate::filters::{DuplicateFilter, ResultFilter};
use crate::lexical::{LexicalExecutor, LexicalPage};
use crate::query::{Query, MAX_LIMIT};
use crate::results::{has_more, ContentResult, ReferenceResult, SearchMethod, SearchResponse};
use crate::semantic::{
    SimilarityAdapter, SimilarityConfig, DEFAULT_CANDIDATE_MULTIPLIER,
    DEFAULT_SIMILARITY_THRESHOLD,
};
use crate::store::StoreConnection;
use crate::vector::{SqliteVectorStore, VectorStore};

/// Engine configuration, passed in explicitly by the caller
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Structured store (SQLite file)
    pub database_path: PathBuf,
    /// Minimum cosine similarity for similarity matches
    pub similarity_threshold: f32,
    /// Scene candidates fetched per requested result
    pub candidate_multiplier: usize,
    /// Largest accepted page size
    pub max_limit: usize,
    /// Embedding model id (provider requests and stored-embedding selection)
    pub model_id: String,
    /// Master switch for the similarity stage
    pub semantic_enabled: bool,
    /// Upper bound on the embedding call
    pub embedding_timeout: Option<Duration>,
}

impl EngineConfig {
    pub fn new(database_path: impl Into<PathBuf>) -> Self {
        Self {
            database_path: database_path.into(),
            similarity_threshold: DEFAULT_SIMILARITY_THRESHOLD,
            candidate_multiplier: DEFAULT_CANDIDATE_MULTIPLIER,
            max_limit: MAX_LIMIT,
            model_id: String::new(),
            semantic_enabled: true,
            embedding_timeout: None,
        }
    }

    pub fn with_similarity_threshold(mut self, threshold: f32) -> Self {
        self.similarity_threshold = threshold;
        self
    }

    pub fn with_candidate_multiplier(mut self, multiplier: usize) -> Self {
        self.candidate_multiplier = multiplier;
        self
    }

    pub fn with_max_limit(mut self, max_limit: usize) -> Self {
        self.max_limit = max_limit;
        self
    }

    pub fn with_model_id(mut self, model_id: impl Into<String>) -> Self {
        self.model_id = model_id.into();
        self
    }

    pub fn with_semantic_enabled(mut self, enabled: bool) -> Self {
        self.semantic_enabled = enabled;
        self
    }

    pub fn with_embedding_timeout(mut self, timeout: Duration) -> Self {
        self.embedding_timeout = Some(timeout);
        self
    }

    fn similarity_config(&self) -> SimilarityConfig {
        SimilarityConfig {
            threshold: self.similarity_threshold,
            candidate_multiplier: self.candidate_multiplier,
            model_id: self.model_id.clone(),
            embedding_timeout: self.embedding_timeout,
        }
    }
}

/// Lexical output for one query
struct LexicalOutcome {
    content: LexicalPage<ContentResult>,
    references: LexicalPage<ReferenceResult>,
}

/// Hybrid retrieval engine
pub struct SearchEngine {
    config: EngineConfig,
    similarity: Option<SimilarityAdapter>,
}

impl SearchEngine {
    /// Create an engine.
    ///
    /// Similarity search is available when `semantic_enabled` is set and a
    /// provider is given. Without an explicit vector store, embeddings are
    /// read from the structured store itself.
    pub fn new(
        config: EngineConfig,
        provider: Option<Arc<dyn EmbeddingProvider>>,
        vectors: Option<Arc<dyn VectorStore>>,
    ) -> Self {
        let similarity = match provider {
            Some(provider) if config.semantic_enabled => {
                let vectors: Arc<dyn VectorStore> = match vectors {
                    Some(vectors) => vectors,
                    None => Arc::new(SqliteVectorStore::new(
                        config.database_path.clone(),
                        config.model_id.clone(),
                    )),
                };
                Some(SimilarityAdapter::new(
                    provider,
                    vectors,
                    config.database_path.clone(),
                    config.similarity_config(),
                ))
            }
            _ => None,
        };

        Self { config, similarity }
    }

    /// Engine without a similarity stage
    pub fn lexical_only(config: EngineConfig) -> Self {
        Self::new(config, None, None)
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn database_path(&self) -> &Path {
        &self.config.database_path
    }

    /// Whether similarity augmentation can run at all
    pub fn semantic_available(&self) -> bool {
        self.similarity.is_some()
    }

    /// Answer one query
    pub async fn search(&self, query: &Query) -> Result<SearchResponse> {
        let start = Instant::now();
        query.validate(self.config.max_limit)?;

        info!(
            query = %query.raw_text,
            mode = %query.mode,
            limit = query.limit,
            offset = query.offset,
            "Search"
        );

        let LexicalOutcome {
            content,
            references,
        } = self.run_lexical(query).await?;

        let mut methods_used = BTreeSet::from([SearchMethod::Lexical]);
        let mut content_results = content.results;
        let mut content_total = content.total;
        let mut reference_results = references.results;
        let mut reference_total = references.total;

        if let Some(adapter) = self.eligible_adapter(query) {
            let enhancement = adapter.enhance(query, content_results, query.limit).await;
            if enhancement.applied {
                methods_used.insert(SearchMethod::Semantic);
            }
            content_results = enhancement.content_results;
            content_total += enhancement.content_added;

            let (merged, added) =
                merge_references(reference_results, enhancement.reference_results, query);
            reference_results = merged;
            reference_total += added;
        }

        let content_results = DuplicateFilter.apply(content_results, query);
        let reference_results = DuplicateFilter.apply(reference_results, query);

        let response = SearchResponse {
            has_more: has_more(content_total, reference_total, query.offset, query.limit),
            content_results,
            reference_results,
            content_total,
            reference_total,
            execution_time: start.elapsed(),
            methods_used,
        };

        info!(
            content = response.content_results.len(),
            references = response.reference_results.len(),
            total = response.total(),
            has_more = response.has_more,
            elapsed_ms = response.execution_time_ms(),
            "Search complete"
        );
        Ok(response)
    }

    fn eligible_adapter(&self, query: &Query) -> Option<&SimilarityAdapter> {
        if !query.wants_semantic() {
            debug!(mode = %query.mode, "Similarity stage skipped");
            return None;
        }
        self.similarity.as_ref()
    }

    /// Lexical content and reference search on a blocking thread
    async fn run_lexical(&self, query: &Query) -> Result<LexicalOutcome> {
        let path = self.config.database_path.clone();
        let query = query.clone();

        tokio::task::spawn_blocking(move || {
            let store = StoreConnection::open(&path)?;
            let executor = LexicalExecutor::new(&store);

            let content = if query.searches_content() {
                executor.search_content(&query)?
            } else {
                LexicalPage {
                    results: Vec::new(),
                    total: 0,
                }
            };
            let references = if query.searches_references() {
                executor.search_references(&query)?
            } else {
                LexicalPage {
                    results: Vec::new(),
                    total: 0,
                }
            };

            Ok(LexicalOutcome {
                content,
                references,
            })
        })
        .await
        .map_err(|e| SearchError::StoreExecution {
            context: "lexical search task".into(),
            fault: StoreFault::Other(e.to_string()),
        })?
    }
}

/// Append novel similarity chunks after the lexical ones.
///
/// Returns the merged list and how many chunks were added.
fn merge_references(
    lexical: Vec<ReferenceResult>,
    semantic: Vec<ReferenceResult>,
    query: &Query,
) -> (Vec<ReferenceResult>, usize) {
    let before = lexical.len();
    let mut merged = lexical;
    merged.extend(semantic);
    let merged = DuplicateFilter.apply(merged, query);
    let added = merged.len() - before;
    (merged, added)
}
