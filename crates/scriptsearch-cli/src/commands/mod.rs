//! CLI command implementations

pub mod config;
pub mod search;
pub mod status;

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use scriptsearch_config::{ConfigLoader, EmbeddingProviderType, LoggingConfig, ScriptSearchConfig};
use scriptsearch_engine::embeddings::{EmbeddingConfig as SearchEmbeddingConfig, OpenAIConfig};
use scriptsearch_engine::{create_provider, EngineConfig, SearchEngine};
use crate::GlobalOptions;

/// Resolve the project directory from options or current directory.
pub fn resolve_project(global: &GlobalOptions) -> Result<PathBuf> {
    match global.project {
        Some(ref path) => {
            if !path.is_dir() {
                anyhow::bail!("Project directory not found: {}", path.display());
            }
            path.canonicalize()
                .with_context(|| format!("Failed to resolve {}", path.display()))
        }
        None => std::env::current_dir().context("Failed to get current directory"),
    }
}

/// Load configuration (explicit file, or global → local) with CLI overrides.
pub fn load_config(global: &GlobalOptions, project: &Path) -> Result<ScriptSearchConfig> {
    let overrides = global.to_config_overrides();
    let mut loader = ConfigLoader::new();

    match global.config {
        Some(ref config_path) => loader
            .load_file(config_path, Some(&overrides))
            .with_context(|| format!("Failed to load config file {}", config_path.display())),
        None => loader
            .load(project, Some(&overrides))
            .context("Failed to load configuration"),
    }
}

/// `[logging]` settings, read before any subscriber exists.
///
/// Configuration errors are reported later by the command itself.
pub fn configured_logging(global: &GlobalOptions) -> LoggingConfig {
    resolve_project(global)
        .ok()
        .and_then(|project| load_config(global, &project).ok())
        .map(|config| config.logging)
        .unwrap_or_default()
}

/// Engine settings from the loaded configuration
pub fn to_engine_config(config: &ScriptSearchConfig, project: &Path) -> EngineConfig {
    let mut engine_config = EngineConfig::new(config.database_path(project))
        .with_similarity_threshold(config.search.similarity_threshold)
        .with_candidate_multiplier(config.search.semantic_candidate_multiplier)
        .with_max_limit(config.search.max_limit)
        .with_model_id(config.embedding.model.clone())
        .with_semantic_enabled(config.search.semantic_enabled);

    if let Some(secs) = config.search.embedding_timeout_secs {
        engine_config = engine_config.with_embedding_timeout(Duration::from_secs(secs));
    }
    engine_config
}

/// Convert scriptsearch_config's embedding settings to the engine's EmbeddingConfig.
///
/// The API key is read from the environment variable named by `api_key_env`.
pub fn to_search_embedding_config(config: &ScriptSearchConfig) -> SearchEmbeddingConfig {
    match config.embedding.provider {
        EmbeddingProviderType::None => SearchEmbeddingConfig::disabled(),
        EmbeddingProviderType::Openai => match config.embedding.openai {
            Some(ref openai) => {
                let mut openai_config =
                    OpenAIConfig::new(openai.url.clone(), config.embedding.model.clone())
                        .with_timeout(openai.timeout_secs)
                        .with_max_retries(openai.max_retries)
                        .with_azure_mode(openai.azure_mode);

                if let Some(key) = openai
                    .api_key_env
                    .as_ref()
                    .and_then(|env_var| std::env::var(env_var).ok())
                {
                    openai_config = openai_config.with_api_key(key);
                }
                SearchEmbeddingConfig::openai_with_config(openai_config)
            }
            // No settings provided, let the factory read from environment
            None => SearchEmbeddingConfig::openai(),
        },
    }
}

/// Build a search engine for the resolved project.
pub fn create_engine(global: &GlobalOptions) -> Result<(SearchEngine, ScriptSearchConfig)> {
    let project = resolve_project(global)?;
    let config = load_config(global, &project)?;
    let engine_config = to_engine_config(&config, &project);

    let provider = if config.semantic_configured() {
        create_provider(&to_search_embedding_config(&config))
            .context("Failed to create embedding provider")?
    } else {
        None
    };

    Ok((SearchEngine::new(engine_config, provider, None), config))
}

/// Print an info message (respects quiet flag).
pub fn print_info(message: &str, quiet: bool) {
    if !quiet {
        eprintln!("{}", message);
    }
}
