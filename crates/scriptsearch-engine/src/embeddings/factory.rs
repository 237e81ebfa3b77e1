//! Provider factory for creating embedding providers from configuration

use std::sync::Arc;

use tracing::info;

use crate::error::{Result, SearchError};

use super::openai::{OpenAIConfig, OpenAIProvider};
use super::provider::{EmbeddingProvider, EmbeddingProviderType};

/// Configuration for embedding providers
///
/// If `openai` settings are absent for the OpenAI provider, the factory reads
/// them from environment variables.
#[derive(Debug, Clone, Default)]
pub struct EmbeddingConfig {
    /// Which provider to use
    pub provider: EmbeddingProviderType,
    /// OpenAI provider settings (used when provider = Openai)
    pub openai: Option<OpenAIConfig>,
}

impl EmbeddingConfig {
    /// No provider; similarity search is skipped
    pub fn disabled() -> Self {
        Self::default()
    }

    /// Create config for OpenAI provider with explicit config
    pub fn openai_with_config(config: OpenAIConfig) -> Self {
        Self {
            provider: EmbeddingProviderType::Openai,
            openai: Some(config),
        }
    }

    /// Create config for OpenAI-compatible provider (reads from environment)
    pub fn openai() -> Self {
        Self {
            provider: EmbeddingProviderType::Openai,
            openai: None,
        }
    }
}

/// Create an embedding provider from configuration
///
/// Returns `Ok(None)` when embeddings are disabled. Custom providers cannot
/// be built from configuration; pass them to the engine directly.
pub fn create(config: &EmbeddingConfig) -> Result<Option<Arc<dyn EmbeddingProvider>>> {
    match config.provider {
        EmbeddingProviderType::Disabled => Ok(None),
        EmbeddingProviderType::Openai => {
            let provider = match config.openai {
                Some(ref openai_config) => OpenAIProvider::new(openai_config.clone())?,
                None => OpenAIProvider::from_env()?,
            };
            info!("Using embedding provider: {:?}", provider);
            Ok(Some(Arc::new(provider)))
        }
        EmbeddingProviderType::Custom => Err(SearchError::ProviderUnavailable(
            "custom embedding providers must be supplied directly to the engine".into(),
        )),
    }
}
