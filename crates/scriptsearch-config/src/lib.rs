//! ScriptSearch Configuration Management
//!
//! Provides configuration loading with support for:
//! - Global config: `~/.scriptsearch/config.toml`
//! - Local config: `.scriptsearch/config.toml` (in the project directory)
//! - CLI overrides via `ConfigOverrides`
//!
//! Configuration is merged in order: global → local → CLI overrides.

mod error;
mod loader;

pub use error::ConfigError;
pub use loader::ConfigLoader;

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Default structured store file name
pub const DEFAULT_DATABASE_PATH: &str = "scripts.db";

/// Default minimum cosine similarity for similarity matches
pub const DEFAULT_SIMILARITY_THRESHOLD: f32 = 0.5;

/// Default scene candidates fetched per requested result
pub const DEFAULT_CANDIDATE_MULTIPLIER: usize = 2;

/// Default page size
pub const DEFAULT_LIMIT: usize = 10;

/// Default largest accepted page size
pub const DEFAULT_MAX_LIMIT: usize = 100;

/// Default embedding model
pub const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-3-small";

/// Default log level
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Root configuration for ScriptSearch.
///
/// Represents the fully merged configuration from all sources.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ScriptSearchConfig {
    /// Structured store location
    pub storage: StorageConfig,

    /// Retrieval tunables
    pub search: SearchConfig,

    /// Embedding provider configuration
    pub embedding: EmbeddingConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

/// Storage configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Structured store (SQLite file). Relative paths resolve against the
    /// project directory.
    pub database_path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: PathBuf::from(DEFAULT_DATABASE_PATH),
        }
    }
}

/// Retrieval tunables.
///
/// # Example TOML
///
/// ```toml
/// [search]
/// similarity_threshold = 0.6
/// semantic_candidate_multiplier = 3
/// default_limit = 20
/// max_limit = 100
/// semantic_enabled = true
/// embedding_timeout_secs = 5
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// Minimum cosine similarity, in [-1, 1]
    pub similarity_threshold: f32,

    /// Scene candidates fetched per requested result
    pub semantic_candidate_multiplier: usize,

    /// Page size when the caller gives none
    pub default_limit: usize,

    /// Largest accepted page size
    pub max_limit: usize,

    /// Master switch for similarity augmentation
    pub semantic_enabled: bool,

    /// Upper bound on the query embedding call (None = no bound)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub embedding_timeout_secs: Option<u64>,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            similarity_threshold: DEFAULT_SIMILARITY_THRESHOLD,
            semantic_candidate_multiplier: DEFAULT_CANDIDATE_MULTIPLIER,
            default_limit: DEFAULT_LIMIT,
            max_limit: DEFAULT_MAX_LIMIT,
            semantic_enabled: true,
            embedding_timeout_secs: None,
        }
    }
}

impl SearchConfig {
    /// Validate ranges and limits.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(-1.0..=1.0).contains(&self.similarity_threshold) {
            return Err(ConfigError::invalid_value(
                "search.similarity_threshold",
                format!("must be within [-1, 1], got {}", self.similarity_threshold),
            ));
        }
        if self.semantic_candidate_multiplier == 0 {
            return Err(ConfigError::invalid_value(
                "search.semantic_candidate_multiplier",
                "must be at least 1",
            ));
        }
        if self.max_limit == 0 {
            return Err(ConfigError::invalid_value(
                "search.max_limit",
                "must be at least 1",
            ));
        }
        if self.default_limit == 0 || self.default_limit > self.max_limit {
            return Err(ConfigError::invalid_value(
                "search.default_limit",
                format!(
                    "must be between 1 and max_limit ({}), got {}",
                    self.max_limit, self.default_limit
                ),
            ));
        }
        Ok(())
    }
}

/// Embedding provider configuration.
///
/// Controls which provider embeds query text for similarity search. Stored
/// embeddings are selected by the same `model`.
///
/// # Example TOML
///
/// ```toml
/// [embedding]
/// provider = "openai"  # or "none"
/// model = "text-embedding-3-small"
///
/// [embedding.openai]
/// url = "https://api.openai.com/v1"
/// api_key_env = "OPENAI_API_KEY"
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    /// Which embedding provider to use
    pub provider: EmbeddingProviderType,

    /// Embedding model id
    pub model: String,

    /// OpenAI-compatible provider settings (required when provider = "openai")
    pub openai: Option<OpenAISettings>,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: EmbeddingProviderType::default(),
            model: DEFAULT_EMBEDDING_MODEL.to_string(),
            openai: None,
        }
    }
}

impl EmbeddingConfig {
    /// Validate that required settings exist for the selected provider.
    pub fn validate(&self) -> Result<(), ConfigError> {
        match self.provider {
            EmbeddingProviderType::None => Ok(()),
            EmbeddingProviderType::Openai => {
                let Some(ref settings) = self.openai else {
                    return Err(ConfigError::ValidationError(
                        "embedding.provider is 'openai' but [embedding.openai] section is missing"
                            .to_string(),
                    ));
                };
                if settings.url.is_empty() {
                    return Err(ConfigError::ValidationError(
                        "embedding.openai.url is required".to_string(),
                    ));
                }
                if self.model.is_empty() {
                    return Err(ConfigError::ValidationError(
                        "embedding.model is required".to_string(),
                    ));
                }
                Ok(())
            }
        }
    }
}

/// Embedding provider type selection.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum EmbeddingProviderType {
    /// No provider; lexical search only (default)
    #[default]
    None,
    /// OpenAI-compatible API (OpenAI, Azure OpenAI, Ollama, etc.)
    Openai,
}

impl std::fmt::Display for EmbeddingProviderType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::None => write!(f, "none"),
            Self::Openai => write!(f, "openai"),
        }
    }
}

impl std::str::FromStr for EmbeddingProviderType {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "none" | "off" | "disabled" => Ok(Self::None),
            "openai" => Ok(Self::Openai),
            _ => Err(ConfigError::ValidationError(format!(
                "Unknown embedding provider: '{}'. Valid values: none, openai",
                s
            ))),
        }
    }
}

/// OpenAI-compatible provider settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OpenAISettings {
    /// API base URL (e.g., "https://api.openai.com/v1")
    pub url: String,

    /// Environment variable name containing API key
    pub api_key_env: Option<String>,

    /// Request timeout in seconds
    pub timeout_secs: u64,

    /// Maximum retry attempts
    pub max_retries: u32,

    /// Use Azure OpenAI authentication (api-key header)
    pub azure_mode: bool,
}

impl Default for OpenAISettings {
    fn default() -> Self {
        Self {
            url: "https://api.openai.com/v1".to_string(),
            api_key_env: Some("OPENAI_API_KEY".to_string()),
            timeout_secs: 30,
            max_retries: 3,
            azure_mode: false,
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Log format (text, json)
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: DEFAULT_LOG_LEVEL.to_string(),
            format: LogFormat::default(),
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable text format
    #[default]
    Text,
    /// JSON structured logging
    Json,
}

/// CLI overrides for configuration values.
///
/// Used to apply command-line arguments over file-based config.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    /// Override structured store path
    pub database_path: Option<PathBuf>,

    /// Override similarity threshold
    pub similarity_threshold: Option<f32>,

    /// Override embedding provider type
    pub embedding_provider: Option<EmbeddingProviderType>,

    /// Override embedding model
    pub embedding_model: Option<String>,

    /// Force similarity augmentation off
    pub disable_semantic: bool,

    /// Override log level
    pub log_level: Option<String>,
}

impl ScriptSearchConfig {
    /// Apply CLI overrides to this configuration.
    pub fn apply_overrides(&mut self, overrides: &ConfigOverrides) {
        if let Some(ref path) = overrides.database_path {
            self.storage.database_path = path.clone();
        }

        if let Some(threshold) = overrides.similarity_threshold {
            self.search.similarity_threshold = threshold;
        }

        if let Some(provider) = overrides.embedding_provider {
            self.embedding.provider = provider;
        }

        if let Some(ref model) = overrides.embedding_model {
            self.embedding.model = model.clone();
        }

        if overrides.disable_semantic {
            self.search.semantic_enabled = false;
        }

        if let Some(ref level) = overrides.log_level {
            self.logging.level = level.clone();
        }
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.search.validate()?;
        self.embedding.validate()?;
        Ok(())
    }

    /// Effective structured store path for a project directory.
    pub fn database_path(&self, project_root: &Path) -> PathBuf {
        if self.storage.database_path.is_absolute() {
            self.storage.database_path.clone()
        } else {
            project_root.join(&self.storage.database_path)
        }
    }

    /// Whether the similarity stage can run with this configuration
    pub fn semantic_configured(&self) -> bool {
        self.search.semantic_enabled && self.embedding.provider != EmbeddingProviderType::None
    }
}
