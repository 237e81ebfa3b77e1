//! ScriptSearch Engine - hybrid retrieval over screenplay content
//!
//! Answers structured queries against a corpus of scenes, dialogue, action
//! lines and reference documents ("bibles") by combining lexical matching
//! against a SQLite structured store with similarity ranking over stored
//! embeddings.
//!
//! # Features
//!
//! - **Predicate builder**: parameterized SQL assembled from ordered, pure predicates
//! - **Read-only execution**: the store is opened read-only for every call
//! - **Similarity augmentation**: threshold-gated nearest neighbours, de-duplicated
//!   against lexical hits, degrading to lexical-only on any provider failure
//! - **Filter chain**: composable post-filters over any result list
//!
//! # Example
//!
//! ```ignore
//! use scriptsearch_engine::{EngineConfig, Query, SearchEngine};
//!
//! #[tokio::main]
//! async fn main() -> scriptsearch_engine::Result<()> {
//!     let engine = SearchEngine::lexical_only(EngineConfig::new("scripts.db"));
//!     let query = Query::builder()
//!         .dialogue("coffee")
//!         .character("SARAH")
//!         .build()?;
//!
//!     let response = engine.search(&query).await?;
//!     for scene in &response.content_results {
//!         println!("{} #{}: {}", scene.script_title, scene.scene_number, scene.scene_heading);
//!     }
//!     Ok(())
//! }
//! ```

pub mod embeddings;
pub mod engine;
pub mod error;
pub mod filters;
pub mod lexical;
pub mod predicate;
pub mod query;
pub mod results;
pub mod schema;
pub mod semantic;
pub mod store;
pub mod vector;

// Re-exports for convenience
pub use engine::{EngineConfig, SearchEngine};
pub use error::{Result, SearchError, StoreFault};
pub use filters::{
    CharacterFilter, DuplicateFilter, FilterChain, LocationFilter, ProjectFilter, ResultFilter,
    SceneTypeFilter, SeasonEpisodeFilter, TimeOfDayFilter,
};
pub use query::{Query, QueryBuilder, SceneType, SearchMode, DEFAULT_LIMIT, MAX_LIMIT};
pub use results::{
    ContentResult, HighlightSpan, MatchType, ReferenceResult, SearchHit, SearchMethod,
    SearchResponse,
};
pub use semantic::{DEFAULT_CANDIDATE_MULTIPLIER, DEFAULT_SIMILARITY_THRESHOLD};
pub use vector::{cosine_similarity, SqliteVectorStore, VectorHit, VectorStore};

pub use embeddings::{
    create_provider, EmbeddingConfig, EmbeddingProvider, EmbeddingProviderType, OpenAIConfig,
    OpenAIProvider, ProviderStatus,
};
