//! Config command - View and manage configuration
//!
//! - List all configuration with sources
//! - Get or set a single key (local or global file)
//! - Create a starter config file
//! - Show configuration file paths

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Subcommand;
use scriptsearch_config::{ConfigLoader, LogFormat, OpenAISettings, ScriptSearchConfig};
use serde::Serialize;

use super::resolve_project;
use crate::GlobalOptions;

/// Config management commands
#[derive(Subcommand, Debug)]
pub enum ConfigCommand {
    /// List all configuration values with their sources
    List(ListArgs),

    /// Get a specific configuration value
    Get(GetArgs),

    /// Set a configuration value
    Set(SetArgs),

    /// Write a default config file if none exists
    Init(InitArgs),

    /// Show configuration file paths
    Path(PathArgs),
}

/// Arguments for the list command
#[derive(clap::Args, Debug)]
pub struct ListArgs {
    /// Output as JSON
    #[arg(long)]
    json: bool,

    /// Show only effective values (hide sources)
    #[arg(long)]
    effective: bool,
}

/// Arguments for the get command
#[derive(clap::Args, Debug)]
pub struct GetArgs {
    /// Configuration key (e.g., "search.similarity_threshold")
    key: String,

    /// Output as JSON
    #[arg(long)]
    json: bool,
}

/// Arguments for the set command
#[derive(clap::Args, Debug)]
pub struct SetArgs {
    /// Configuration key (e.g., "search.similarity_threshold")
    key: String,

    /// Value to set
    value: String,

    /// Set in global config (~/.scriptsearch/config.toml) instead of local
    #[arg(long)]
    global: bool,
}

/// Arguments for the init command
#[derive(clap::Args, Debug)]
pub struct InitArgs {
    /// Create the global config instead of the project one
    #[arg(long)]
    global: bool,
}

/// Arguments for the path command
#[derive(clap::Args, Debug)]
pub struct PathArgs {
    /// Output as JSON
    #[arg(long)]
    json: bool,
}

/// Configuration value with source information
#[derive(Debug, Clone, Serialize)]
pub struct ConfigValue {
    pub key: String,
    pub value: serde_json::Value,
    /// default, global or local
    pub source: String,
}

/// Configuration paths
#[derive(Debug, Clone, Serialize)]
pub struct ConfigPaths {
    pub global: Option<PathBuf>,
    pub local: PathBuf,
    pub global_exists: bool,
    pub local_exists: bool,
}

/// Execute the config command
pub async fn execute(cmd: ConfigCommand, global: GlobalOptions) -> Result<()> {
    match cmd {
        ConfigCommand::List(args) => execute_list(args, global),
        ConfigCommand::Get(args) => execute_get(args, global),
        ConfigCommand::Set(args) => execute_set(args, global),
        ConfigCommand::Init(args) => execute_init(args, global),
        ConfigCommand::Path(args) => execute_path(args, global),
    }
}

fn execute_list(args: ListArgs, global: GlobalOptions) -> Result<()> {
    let project = resolve_project(&global)?;
    let mut loader = ConfigLoader::new();

    let default_config = ScriptSearchConfig::default();
    let global_config = loader.load_global()?.unwrap_or_default();
    let local_config = loader.load_local(&project)?.unwrap_or_default();
    let effective = loader.load(&project, None)?;

    if args.json {
        if args.effective {
            println!("{}", serde_json::to_string_pretty(&effective)?);
        } else {
            let values = collect_config_values(&default_config, &global_config, &local_config)?;
            println!("{}", serde_json::to_string_pretty(&values)?);
        }
        return Ok(());
    }

    print_paths(&loader, &project);
    if args.effective {
        print!("{}", toml::to_string_pretty(&effective)?);
    } else {
        for value in collect_config_values(&default_config, &global_config, &local_config)? {
            let source = match value.source.as_str() {
                "default" => String::new(),
                other => format!(" ({})", other),
            };
            println!("{} = {}{}", value.key, value.value, source);
        }
    }
    Ok(())
}

fn execute_get(args: GetArgs, global: GlobalOptions) -> Result<()> {
    let project = resolve_project(&global)?;
    let mut loader = ConfigLoader::new();
    let config = loader.load(&project, None)?;

    let value = get_config_value(&config, &args.key)?
        .ok_or_else(|| anyhow::anyhow!("Unknown configuration key: {}", args.key))?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&value)?);
    } else {
        match value {
            serde_json::Value::String(s) => println!("{}", s),
            serde_json::Value::Null => println!("null"),
            other => println!("{}", other),
        }
    }
    Ok(())
}

fn execute_set(args: SetArgs, global: GlobalOptions) -> Result<()> {
    let project = resolve_project(&global)?;
    let mut loader = ConfigLoader::new();

    let mut config = if args.global {
        loader.load_global()?.unwrap_or_default()
    } else {
        loader.load_local(&project)?.unwrap_or_default()
    };

    set_config_value(&mut config, &args.key, &args.value)
        .with_context(|| format!("Failed to set configuration key: {}", args.key))?;
    config
        .validate()
        .with_context(|| format!("Rejected value for {}", args.key))?;

    if args.global {
        loader.save_global(&config)?;
        println!("Set {} = {} in global config", args.key, args.value);
    } else {
        loader.save_local(&project, &config)?;
        println!("Set {} = {} in local config", args.key, args.value);
    }
    Ok(())
}

fn execute_init(args: InitArgs, global: GlobalOptions) -> Result<()> {
    let loader = ConfigLoader::new();
    let path = if args.global {
        loader.init_global()?
    } else {
        let project = resolve_project(&global)?;
        loader.init_local(&project)?
    };

    println!("Config file: {}", path.display());
    Ok(())
}

fn execute_path(args: PathArgs, global: GlobalOptions) -> Result<()> {
    let project = resolve_project(&global)?;
    let loader = ConfigLoader::new();
    let paths = config_paths(&loader, &project);

    if args.json {
        println!("{}", serde_json::to_string_pretty(&paths)?);
    } else {
        print_paths(&loader, &project);
    }
    Ok(())
}

fn config_paths(loader: &ConfigLoader, project: &Path) -> ConfigPaths {
    let global = loader.global_config_path();
    let local = loader.local_config_path(project);
    ConfigPaths {
        global_exists: global.as_ref().is_some_and(|p| p.exists()),
        local_exists: local.exists(),
        global,
        local,
    }
}

fn print_paths(loader: &ConfigLoader, project: &Path) {
    let paths = config_paths(loader, project);
    let status = |exists: bool| if exists { "exists" } else { "not found" };

    match paths.global {
        Some(ref path) => println!(
            "Global: {} ({})",
            path.display(),
            status(paths.global_exists)
        ),
        None => println!("Global: not available (no home directory)"),
    }
    println!(
        "Local:  {} ({})\n",
        paths.local.display(),
        status(paths.local_exists)
    );
}

/// Look up a dotted key path in the serialized configuration
fn get_config_value(config: &ScriptSearchConfig, key: &str) -> Result<Option<serde_json::Value>> {
    let json = serde_json::to_value(config)?;
    let mut current = &json;
    for part in key.split('.') {
        match current.get(part) {
            Some(v) => current = v,
            None => return Ok(None),
        }
    }
    Ok(Some(current.clone()))
}

/// Set a configuration value by key path
fn set_config_value(config: &mut ScriptSearchConfig, key: &str, value: &str) -> Result<()> {
    match key {
        "storage.database_path" => config.storage.database_path = PathBuf::from(value),

        "search.similarity_threshold" => config.search.similarity_threshold = value.parse()?,
        "search.semantic_candidate_multiplier" => {
            config.search.semantic_candidate_multiplier = value.parse()?
        }
        "search.default_limit" => config.search.default_limit = value.parse()?,
        "search.max_limit" => config.search.max_limit = value.parse()?,
        "search.semantic_enabled" => config.search.semantic_enabled = value.parse()?,
        "search.embedding_timeout_secs" => {
            config.search.embedding_timeout_secs = match value {
                "" | "none" => None,
                secs => Some(secs.parse()?),
            }
        }

        "embedding.provider" => config.embedding.provider = value.parse()?,
        "embedding.model" => config.embedding.model = value.to_string(),
        key if key.starts_with("embedding.openai.") => {
            let openai = config.embedding.openai.get_or_insert_with(OpenAISettings::default);
            match &key["embedding.openai.".len()..] {
                "url" => openai.url = value.to_string(),
                "api_key_env" => openai.api_key_env = Some(value.to_string()),
                "timeout_secs" => openai.timeout_secs = value.parse()?,
                "max_retries" => openai.max_retries = value.parse()?,
                "azure_mode" => openai.azure_mode = value.parse()?,
                _ => anyhow::bail!("Unknown configuration key: {}", key),
            }
        }

        "logging.level" => config.logging.level = value.to_string(),
        "logging.format" => {
            config.logging.format = match value.to_lowercase().as_str() {
                "text" => LogFormat::Text,
                "json" => LogFormat::Json,
                other => anyhow::bail!("Unknown log format: {} (expected text or json)", other),
            }
        }

        _ => anyhow::bail!("Unknown or read-only configuration key: {}", key),
    }
    Ok(())
}

/// Collect configuration values with source information
fn collect_config_values(
    default: &ScriptSearchConfig,
    global: &ScriptSearchConfig,
    local: &ScriptSearchConfig,
) -> Result<Vec<ConfigValue>> {
    let default_json = serde_json::to_value(default)?;
    let global_json = serde_json::to_value(global)?;
    let local_json = serde_json::to_value(local)?;

    let mut values = Vec::new();
    flatten_config("", &local_json, &global_json, &default_json, &mut values);
    Ok(values)
}

/// Recursively flatten config into key-value pairs with sources
fn flatten_config(
    prefix: &str,
    local: &serde_json::Value,
    global: &serde_json::Value,
    default: &serde_json::Value,
    values: &mut Vec<ConfigValue>,
) {
    if let serde_json::Value::Object(map) = local {
        for (key, value) in map {
            let path = if prefix.is_empty() {
                key.clone()
            } else {
                format!("{}.{}", prefix, key)
            };
            let global_val = global.get(key).unwrap_or(&serde_json::Value::Null);
            let default_val = default.get(key).unwrap_or(&serde_json::Value::Null);
            flatten_config(&path, value, global_val, default_val, values);
        }
        return;
    }

    // A local file that leaves a key at its default still inherits the global value
    let (value, source) = if local != default {
        (local, "local")
    } else if !global.is_null() && global != default {
        (global, "global")
    } else {
        (local, "default")
    };

    values.push(ConfigValue {
        key: prefix.to_string(),
        value: value.clone(),
        source: source.to_string(),
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_config_value() {
        let config = ScriptSearchConfig::default();

        let threshold = get_config_value(&config, "search.similarity_threshold").unwrap();
        assert_eq!(threshold, Some(serde_json::json!(0.5)));

        let model = get_config_value(&config, "embedding.model").unwrap();
        assert_eq!(model, Some(serde_json::json!("text-embedding-3-small")));

        assert!(get_config_value(&config, "nonexistent.key").unwrap().is_none());
    }

    #[test]
    fn test_set_config_value() {
        let mut config = ScriptSearchConfig::default();

        set_config_value(&mut config, "search.similarity_threshold", "0.75").unwrap();
        assert_eq!(config.search.similarity_threshold, 0.75);

        set_config_value(&mut config, "search.semantic_enabled", "false").unwrap();
        assert!(!config.search.semantic_enabled);

        set_config_value(&mut config, "search.embedding_timeout_secs", "4").unwrap();
        assert_eq!(config.search.embedding_timeout_secs, Some(4));
        set_config_value(&mut config, "search.embedding_timeout_secs", "none").unwrap();
        assert_eq!(config.search.embedding_timeout_secs, None);

        set_config_value(&mut config, "logging.format", "json").unwrap();
        assert_eq!(config.logging.format, LogFormat::Json);
    }

    #[test]
    fn test_set_openai_creates_section() {
        let mut config = ScriptSearchConfig::default();
        assert!(config.embedding.openai.is_none());

        set_config_value(&mut config, "embedding.provider", "openai").unwrap();
        set_config_value(&mut config, "embedding.openai.url", "http://localhost:11434/v1").unwrap();

        let openai = config.embedding.openai.as_ref().unwrap();
        assert_eq!(openai.url, "http://localhost:11434/v1");
        assert_eq!(openai.timeout_secs, 30);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_set_config_value_invalid() {
        let mut config = ScriptSearchConfig::default();

        assert!(set_config_value(&mut config, "search.semantic_enabled", "maybe").is_err());
        assert!(set_config_value(&mut config, "search.max_limit", "-1").is_err());
        assert!(set_config_value(&mut config, "embedding.provider", "cohere").is_err());
        assert!(set_config_value(&mut config, "embedding.openai.colour", "blue").is_err());
        assert!(set_config_value(&mut config, "unknown.key", "value").is_err());
    }

    #[test]
    fn test_sources() {
        let default = ScriptSearchConfig::default();
        let mut global = ScriptSearchConfig::default();
        global.search.default_limit = 25;
        let mut local = ScriptSearchConfig::default();
        local.search.similarity_threshold = 0.8;

        let values = collect_config_values(&default, &global, &local).unwrap();
        let find = |key: &str| values.iter().find(|v| v.key == key).unwrap();

        assert_eq!(find("search.similarity_threshold").source, "local");
        assert_eq!(find("search.default_limit").source, "global");
        assert_eq!(find("search.default_limit").value, serde_json::json!(25));
        assert_eq!(find("search.max_limit").source, "default");
    }

    #[test]
    fn test_config_paths_serialization() {
        let paths = ConfigPaths {
            global: Some(PathBuf::from("/home/user/.scriptsearch/config.toml")),
            local: PathBuf::from("/show/.scriptsearch/config.toml"),
            global_exists: true,
            local_exists: false,
        };

        let json = serde_json::to_string(&paths).unwrap();
        assert!(json.contains("\"global_exists\":true"));
        assert!(json.contains("\"local_exists\":false"));
    }
}
