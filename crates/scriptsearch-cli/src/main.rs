//! ScriptSearch CLI - hybrid search over screenplay scenes and series bibles
//!
//! # Usage
//!
//! ```bash
//! # Scenes where SARAH talks about coffee
//! scriptsearch search --dialogue coffee --character SARAH
//!
//! # Free-form query string: quoted dialogue, ALL-CAPS characters, s1e2 bounds
//! scriptsearch search '"coffee" SARAH s1e2'
//!
//! # Series bible only, JSON output
//! scriptsearch search --only-bible "backstory" --json
//!
//! # Store and provider health
//! scriptsearch status
//! ```

use std::path::PathBuf;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use scriptsearch_config::LogFormat;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

mod commands;

/// ScriptSearch - Hybrid lexical and semantic search over screenplays
#[derive(Parser, Debug)]
#[command(name = "scriptsearch")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[command(flatten)]
    global: GlobalOptions,
}

/// Global options available to all commands
#[derive(Args, Debug, Clone)]
struct GlobalOptions {
    /// Project directory holding `.scriptsearch/config.toml`
    #[arg(long, short = 'p', global = true, env = "SCRIPTSEARCH_PROJECT")]
    project: Option<PathBuf>,

    /// Path to configuration file (replaces global and local config)
    #[arg(long, short = 'c', global = true, env = "SCRIPTSEARCH_CONFIG")]
    config: Option<PathBuf>,

    /// Structured store (SQLite file)
    #[arg(long, short = 'd', global = true, env = "SCRIPTSEARCH_DATABASE")]
    database: Option<PathBuf>,

    /// Enable verbose output
    #[arg(long, short = 'v', global = true)]
    verbose: bool,

    /// Suppress non-essential output
    #[arg(long, short = 'q', global = true)]
    quiet: bool,

    /// Embedding provider type (none, openai)
    #[arg(long, global = true, env = "SCRIPTSEARCH_EMBEDDING_PROVIDER", value_parser = parse_embedding_provider)]
    embedding_provider: Option<scriptsearch_config::EmbeddingProviderType>,

    /// Embedding model id
    #[arg(long, global = true, env = "SCRIPTSEARCH_EMBEDDING_MODEL")]
    embedding_model: Option<String>,

    /// Lexical results only, even when a provider is configured
    #[arg(long, global = true)]
    no_semantic: bool,
}

fn parse_embedding_provider(s: &str) -> Result<scriptsearch_config::EmbeddingProviderType, String> {
    s.parse()
        .map_err(|e: scriptsearch_config::ConfigError| e.to_string())
}

impl GlobalOptions {
    /// Convert global options to config overrides
    pub fn to_config_overrides(&self) -> scriptsearch_config::ConfigOverrides {
        scriptsearch_config::ConfigOverrides {
            database_path: self.database.clone(),
            embedding_provider: self.embedding_provider,
            embedding_model: self.embedding_model.clone(),
            disable_semantic: self.no_semantic,
            ..Default::default()
        }
    }

    /// Level from flags; `None` defers to the `[logging] level` config key
    fn cli_log_level(&self) -> Option<Level> {
        if self.quiet {
            Some(Level::ERROR)
        } else if self.verbose {
            Some(Level::DEBUG)
        } else {
            None
        }
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Search scenes and bible documents
    Search(commands::search::SearchArgs),

    /// Show store contents and embedding provider health
    Status(commands::status::StatusArgs),

    /// View and manage configuration
    #[command(subcommand)]
    Config(commands::config::ConfigCommand),
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let logging = commands::configured_logging(&cli.global);
    let log_level = cli
        .global
        .cli_log_level()
        .unwrap_or_else(|| logging.level.parse().unwrap_or(Level::INFO));

    let builder = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_writer(std::io::stderr);
    match logging.format {
        LogFormat::Json => tracing::subscriber::set_global_default(builder.json().finish())?,
        LogFormat::Text => {
            tracing::subscriber::set_global_default(builder.with_ansi(true).finish())?
        }
    }

    match cli.command {
        Commands::Search(args) => commands::search::execute(args, cli.global).await,
        Commands::Status(args) => commands::status::execute(args, cli.global).await,
        Commands::Config(cmd) => commands::config::execute(cmd, cli.global).await,
    }
}
