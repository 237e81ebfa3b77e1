//! Configuration loader with inheritance support.
//!
//! Loads configuration from multiple sources and merges them:
//! 1. Global config: `~/.scriptsearch/config.toml`
//! 2. Local config: `.scriptsearch/config.toml` (in the project directory)
//! 3. CLI overrides
//!
//! Later sources override earlier ones. A value equal to its default counts
//! as "not set" when merging, so a local file only needs the keys it changes.

use crate::error::ConfigError;
use crate::{
    ConfigOverrides, EmbeddingConfig, EmbeddingProviderType, LoggingConfig, ScriptSearchConfig,
    SearchConfig, StorageConfig,
};
use std::path::{Path, PathBuf};
use tracing::{debug, trace};

const CONFIG_FILE_NAME: &str = "config.toml";

/// Directory under the home directory holding the global config
const GLOBAL_CONFIG_DIR: &str = ".scriptsearch";

/// Directory under the project root holding the local config
const LOCAL_CONFIG_DIR: &str = ".scriptsearch";

/// Configuration loader with caching and inheritance support.
#[derive(Debug, Clone)]
pub struct ConfigLoader {
    /// Global config directory (e.g., `~/.scriptsearch`)
    global_config_dir: Option<PathBuf>,

    /// Cached global config
    global_config: Option<ScriptSearchConfig>,
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigLoader {
    /// Create a loader rooted at `~/.scriptsearch`.
    pub fn new() -> Self {
        Self {
            global_config_dir: dirs::home_dir().map(|h| h.join(GLOBAL_CONFIG_DIR)),
            global_config: None,
        }
    }

    /// Create a loader with a custom global config directory.
    pub fn with_global_dir(global_dir: impl Into<PathBuf>) -> Self {
        Self {
            global_config_dir: Some(global_dir.into()),
            global_config: None,
        }
    }

    pub fn global_config_path(&self) -> Option<PathBuf> {
        self.global_config_dir
            .as_ref()
            .map(|d| d.join(CONFIG_FILE_NAME))
    }

    pub fn local_config_path(&self, project_root: &Path) -> PathBuf {
        project_root.join(LOCAL_CONFIG_DIR).join(CONFIG_FILE_NAME)
    }

    /// Load and validate configuration for a project directory.
    ///
    /// Merges config in order: global → local → overrides.
    pub fn load(
        &mut self,
        project_root: &Path,
        overrides: Option<&ConfigOverrides>,
    ) -> Result<ScriptSearchConfig, ConfigError> {
        let mut config = ScriptSearchConfig::default();

        if let Some(global) = self.load_global()? {
            config = merge_configs(config, global);
        }

        if let Some(local) = self.load_local(project_root)? {
            config = merge_configs(config, local);
        }

        if let Some(ovr) = overrides {
            config.apply_overrides(ovr);
        }

        config.validate()?;
        Ok(config)
    }

    /// Load a single config file, bypassing global and local lookup.
    pub fn load_file(
        &self,
        path: &Path,
        overrides: Option<&ConfigOverrides>,
    ) -> Result<ScriptSearchConfig, ConfigError> {
        debug!("Loading config from {:?}", path);
        let mut config = load_config_file(path)?;
        if let Some(ovr) = overrides {
            config.apply_overrides(ovr);
        }
        config.validate()?;
        Ok(config)
    }

    /// Load only the global configuration.
    pub fn load_global(&mut self) -> Result<Option<ScriptSearchConfig>, ConfigError> {
        if let Some(ref config) = self.global_config {
            return Ok(Some(config.clone()));
        }

        let Some(global_path) = self.global_config_path() else {
            debug!("No home directory found, skipping global config");
            return Ok(None);
        };

        if !global_path.exists() {
            trace!("Global config not found at {:?}", global_path);
            return Ok(None);
        }

        debug!("Loading global config from {:?}", global_path);
        let config = load_config_file(&global_path)?;
        self.global_config = Some(config.clone());

        Ok(Some(config))
    }

    /// Load only the local configuration for a project directory.
    pub fn load_local(
        &self,
        project_root: &Path,
    ) -> Result<Option<ScriptSearchConfig>, ConfigError> {
        let local_path = self.local_config_path(project_root);

        if !local_path.exists() {
            trace!("Local config not found at {:?}", local_path);
            return Ok(None);
        }

        debug!("Loading local config from {:?}", local_path);
        load_config_file(&local_path).map(Some)
    }

    pub fn save_global(&self, config: &ScriptSearchConfig) -> Result<(), ConfigError> {
        let Some(ref global_dir) = self.global_config_dir else {
            return Err(ConfigError::NoHomeDir);
        };
        save_config_file(&global_dir.join(CONFIG_FILE_NAME), config)
    }

    pub fn save_local(
        &self,
        project_root: &Path,
        config: &ScriptSearchConfig,
    ) -> Result<(), ConfigError> {
        save_config_file(&self.local_config_path(project_root), config)
    }

    /// Write `~/.scriptsearch/config.toml` with defaults unless it exists.
    pub fn init_global(&self) -> Result<PathBuf, ConfigError> {
        let Some(ref global_dir) = self.global_config_dir else {
            return Err(ConfigError::NoHomeDir);
        };
        init_config_file(&global_dir.join(CONFIG_FILE_NAME))
    }

    /// Write `.scriptsearch/config.toml` with defaults unless it exists.
    pub fn init_local(&self, project_root: &Path) -> Result<PathBuf, ConfigError> {
        init_config_file(&self.local_config_path(project_root))
    }

    /// Forget the cached global config; the next load re-reads it.
    pub fn clear_cache(&mut self) {
        self.global_config = None;
    }
}

fn load_config_file(path: &Path) -> Result<ScriptSearchConfig, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::read_file(path, e))?;
    toml::from_str(&content).map_err(|e| ConfigError::parse_toml(path, e))
}

fn save_config_file(path: &Path, config: &ScriptSearchConfig) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        if !parent.exists() {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::create_dir(parent, e))?;
        }
    }

    let content = toml::to_string_pretty(config)?;
    std::fs::write(path, content).map_err(|e| ConfigError::write_file(path, e))
}

fn init_config_file(path: &Path) -> Result<PathBuf, ConfigError> {
    if !path.exists() {
        save_config_file(path, &ScriptSearchConfig::default())?;
    }
    Ok(path.to_path_buf())
}

/// `overlay` when it differs from the default, else `base`
fn pick<T: PartialEq>(base: T, overlay: T, default: T) -> T {
    if overlay != default {
        overlay
    } else {
        base
    }
}

/// Merge two configurations, with `overlay` taking precedence.
fn merge_configs(base: ScriptSearchConfig, overlay: ScriptSearchConfig) -> ScriptSearchConfig {
    ScriptSearchConfig {
        storage: merge_storage(base.storage, overlay.storage),
        search: merge_search(base.search, overlay.search),
        embedding: merge_embedding(base.embedding, overlay.embedding),
        logging: merge_logging(base.logging, overlay.logging),
    }
}

fn merge_storage(base: StorageConfig, overlay: StorageConfig) -> StorageConfig {
    StorageConfig {
        database_path: pick(
            base.database_path,
            overlay.database_path,
            StorageConfig::default().database_path,
        ),
    }
}

fn merge_search(base: SearchConfig, overlay: SearchConfig) -> SearchConfig {
    let default = SearchConfig::default();
    SearchConfig {
        similarity_threshold: pick(
            base.similarity_threshold,
            overlay.similarity_threshold,
            default.similarity_threshold,
        ),
        semantic_candidate_multiplier: pick(
            base.semantic_candidate_multiplier,
            overlay.semantic_candidate_multiplier,
            default.semantic_candidate_multiplier,
        ),
        default_limit: pick(base.default_limit, overlay.default_limit, default.default_limit),
        max_limit: pick(base.max_limit, overlay.max_limit, default.max_limit),
        // Turning the stage off anywhere wins
        semantic_enabled: base.semantic_enabled && overlay.semantic_enabled,
        embedding_timeout_secs: overlay.embedding_timeout_secs.or(base.embedding_timeout_secs),
    }
}

fn merge_embedding(base: EmbeddingConfig, overlay: EmbeddingConfig) -> EmbeddingConfig {
    let default = EmbeddingConfig::default();
    EmbeddingConfig {
        provider: pick(base.provider, overlay.provider, EmbeddingProviderType::None),
        model: pick(base.model, overlay.model, default.model),
        openai: overlay.openai.or(base.openai),
    }
}

fn merge_logging(base: LoggingConfig, overlay: LoggingConfig) -> LoggingConfig {
    let default = LoggingConfig::default();
    LoggingConfig {
        level: pick(base.level, overlay.level, default.level),
        format: pick(base.format, overlay.format, default.format),
    }
}
