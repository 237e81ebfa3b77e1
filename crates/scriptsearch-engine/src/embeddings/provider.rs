//! Embedding provider trait and types
//!
//! Defines the abstraction the similarity stage uses to turn query text into
//! a vector. The only bundled implementation is `OpenAIProvider`; callers may
//! hand any other implementation straight to the engine.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Type of embedding provider
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum EmbeddingProviderType {
    /// No provider; similarity search is skipped
    #[default]
    #[serde(rename = "none")]
    Disabled,
    /// OpenAI-compatible API (OpenAI, Azure OpenAI, Ollama)
    Openai,
    /// Implementation supplied by the caller
    Custom,
}

impl std::fmt::Display for EmbeddingProviderType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EmbeddingProviderType::Disabled => write!(f, "none"),
            EmbeddingProviderType::Openai => write!(f, "openai"),
            EmbeddingProviderType::Custom => write!(f, "custom"),
        }
    }
}

/// Status of an embedding provider
///
/// Contains health information for diagnostics.
#[derive(Debug, Clone)]
pub struct ProviderStatus {
    /// Whether the provider is available and responding
    pub available: bool,
    /// Type of provider
    pub provider_type: EmbeddingProviderType,
    /// Endpoint being used
    pub endpoint: String,
    /// Last health check latency in milliseconds
    pub latency_ms: Option<u64>,
    /// Error message if provider is unavailable
    pub error: Option<String>,
}

impl ProviderStatus {
    /// Create a status for a healthy provider
    pub fn healthy(provider_type: EmbeddingProviderType, endpoint: impl Into<String>) -> Self {
        Self {
            available: true,
            provider_type,
            endpoint: endpoint.into(),
            latency_ms: None,
            error: None,
        }
    }

    /// Create a status for an unavailable provider
    pub fn unavailable(provider_type: EmbeddingProviderType, error: impl Into<String>) -> Self {
        Self {
            available: false,
            provider_type,
            endpoint: "N/A".into(),
            latency_ms: None,
            error: Some(error.into()),
        }
    }

    /// Set latency from a health check
    pub fn with_latency(mut self, latency_ms: u64) -> Self {
        self.latency_ms = Some(latency_ms);
        self
    }
}

/// Embedding provider trait
///
/// Implementations must be `Send + Sync`; the engine shares one provider
/// across concurrent searches behind an `Arc`.
///
/// # Example
///
/// ```ignore
/// use scriptsearch_engine::embeddings::EmbeddingProvider;
///
/// async fn example(provider: &dyn EmbeddingProvider) -> scriptsearch_engine::Result<()> {
///     let vector = provider.embed("she spills the coffee", "text-embedding-3-small").await?;
///     assert!(!vector.is_empty());
///     Ok(())
/// }
/// ```
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Embed one piece of text with the given model
    async fn embed(&self, text: &str, model_id: &str) -> Result<Vec<f32>>;

    /// Check provider connectivity and status
    async fn check_status(&self) -> Result<ProviderStatus>;

    /// Get the provider type identifier
    fn provider_type(&self) -> EmbeddingProviderType;
}
