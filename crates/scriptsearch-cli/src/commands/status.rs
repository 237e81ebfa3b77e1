//! Status command - Show store contents and embedding provider health

use std::path::Path;

use anyhow::{Context, Result};
use clap::Args;
use scriptsearch_engine::create_provider;
use scriptsearch_engine::predicate::BuiltQuery;
use scriptsearch_engine::schema::entity_kinds;
use scriptsearch_engine::store::StoreConnection;
use serde::Serialize;

use super::{load_config, resolve_project, to_search_embedding_config};
use crate::GlobalOptions;

/// Arguments for the status command
#[derive(Args, Debug)]
pub struct StatusArgs {
    /// Show configuration details
    #[arg(long = "show-config")]
    show_config: bool,

    /// Skip the embedding provider health check
    #[arg(long)]
    offline: bool,

    /// Output as JSON
    #[arg(long)]
    json: bool,
}

/// Row counts in the structured store
#[derive(Debug, Default, Serialize)]
struct StoreCounts {
    scripts: usize,
    scenes: usize,
    dialogues: usize,
    bible_chunks: usize,
    scene_embeddings: usize,
    chunk_embeddings: usize,
}

#[derive(Debug, Serialize)]
struct ProviderReport {
    provider: String,
    model: String,
    available: bool,
    endpoint: Option<String>,
    latency_ms: Option<u64>,
    error: Option<String>,
}

#[derive(Debug, Serialize)]
struct StatusReport {
    project: String,
    database: String,
    store_available: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    store_error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    counts: Option<StoreCounts>,
    semantic_enabled: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    provider: Option<ProviderReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    config: Option<scriptsearch_config::ScriptSearchConfig>,
}

fn count(store: &StoreConnection, sql: &str, model: Option<&str>) -> Result<usize> {
    let built = BuiltQuery {
        sql: sql.to_string(),
        params: model
            .map(|m| vec![(":model".to_string(), m.to_string().into())])
            .unwrap_or_default(),
    };
    store.query_count("status", &built).map_err(Into::into)
}

fn embedding_count_sql(kind: &str) -> String {
    format!(
        "SELECT COUNT(*) FROM embeddings WHERE entity_type = '{}' AND embedding_model = :model",
        kind
    )
}

fn store_counts(database: &Path, model: &str) -> Result<StoreCounts> {
    let store = StoreConnection::open(database)?;

    Ok(StoreCounts {
        scripts: count(&store, "SELECT COUNT(*) FROM scripts", None)?,
        scenes: count(&store, "SELECT COUNT(*) FROM scenes", None)?,
        dialogues: count(&store, "SELECT COUNT(*) FROM dialogues", None)?,
        bible_chunks: count(&store, "SELECT COUNT(*) FROM bible_chunks", None)?,
        scene_embeddings: count(&store, &embedding_count_sql(entity_kinds::SCENE), Some(model))?,
        chunk_embeddings: count(
            &store,
            &embedding_count_sql(entity_kinds::BIBLE_CHUNK),
            Some(model),
        )?,
    })
}

/// Execute the status command
pub async fn execute(args: StatusArgs, global: GlobalOptions) -> Result<()> {
    let project = resolve_project(&global)?;
    let config = load_config(&global, &project)?;
    let database = config.database_path(&project);
    let model = config.embedding.model.clone();

    let counts = {
        let database = database.clone();
        let model = model.clone();
        tokio::task::spawn_blocking(move || store_counts(&database, &model))
            .await
            .context("Store inspection task failed")?
    };

    let provider = if args.offline || !config.semantic_configured() {
        None
    } else {
        Some(check_provider(&config).await)
    };

    let report = StatusReport {
        project: project.display().to_string(),
        database: database.display().to_string(),
        store_available: counts.is_ok(),
        store_error: counts.as_ref().err().map(|e| format!("{:#}", e)),
        counts: counts.ok(),
        semantic_enabled: config.semantic_configured(),
        provider,
        config: args.show_config.then(|| config.clone()),
    };

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    print_report(&report, &config);
    Ok(())
}

async fn check_provider(config: &scriptsearch_config::ScriptSearchConfig) -> ProviderReport {
    let mut report = ProviderReport {
        provider: config.embedding.provider.to_string(),
        model: config.embedding.model.clone(),
        available: false,
        endpoint: None,
        latency_ms: None,
        error: None,
    };

    let provider = match create_provider(&to_search_embedding_config(config)) {
        Ok(Some(provider)) => provider,
        Ok(None) => {
            report.error = Some("no provider configured".to_string());
            return report;
        }
        Err(e) => {
            report.error = Some(e.to_string());
            return report;
        }
    };

    match provider.check_status().await {
        Ok(status) => {
            report.available = status.available;
            report.endpoint = Some(status.endpoint);
            report.latency_ms = status.latency_ms;
            report.error = status.error;
        }
        Err(e) => report.error = Some(e.to_string()),
    }
    report
}

fn print_report(report: &StatusReport, config: &scriptsearch_config::ScriptSearchConfig) {
    println!("ScriptSearch Status");
    println!("===================\n");

    println!("Project:  {}", report.project);
    println!("Database: {}", report.database);

    println!("\nStore:");
    match (&report.counts, &report.store_error) {
        (Some(counts), _) => {
            println!("  Scripts:      {}", counts.scripts);
            println!("  Scenes:       {}", counts.scenes);
            println!("  Dialogues:    {}", counts.dialogues);
            println!("  Bible chunks: {}", counts.bible_chunks);
            println!(
                "  Embeddings:   {} scenes, {} chunks ({})",
                counts.scene_embeddings, counts.chunk_embeddings, config.embedding.model
            );
        }
        (None, Some(error)) => {
            println!("  Status: Unavailable");
            println!("  Error:  {}", error);
        }
        (None, None) => println!("  Status: Unknown"),
    }

    println!("\nSimilarity search:");
    if !report.semantic_enabled {
        println!("  Disabled (lexical results only)");
    } else if let Some(ref provider) = report.provider {
        println!("  Provider:  {} ({})", provider.provider, provider.model);
        if let Some(ref endpoint) = provider.endpoint {
            println!("  Endpoint:  {}", endpoint);
        }
        if provider.available {
            match provider.latency_ms {
                Some(ms) => println!("  Status:    Ready ({}ms)", ms),
                None => println!("  Status:    Ready"),
            }
        } else {
            println!("  Status:    Unavailable - searches fall back to lexical");
        }
        if let Some(ref error) = provider.error {
            println!("  Error:     {}", error);
        }
    } else {
        println!("  Provider:  {} (not checked)", config.embedding.provider);
    }

    if report.config.is_some() {
        println!("\nConfiguration:");
        println!(
            "  Similarity threshold: {}",
            config.search.similarity_threshold
        );
        println!(
            "  Candidate multiplier: {}",
            config.search.semantic_candidate_multiplier
        );
        println!(
            "  Limits:               default {}, max {}",
            config.search.default_limit, config.search.max_limit
        );
        println!("  Log level:            {}", config.logging.level);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::Connection;
    use scriptsearch_engine::schema::SCHEMA_ALL;
    use tempfile::TempDir;

    fn fixture() -> (TempDir, std::path::PathBuf) {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("scripts.db");
        let conn = Connection::open(&path).unwrap();
        for statement in SCHEMA_ALL {
            conn.execute_batch(statement).unwrap();
        }
        conn.execute_batch(
            "INSERT INTO scripts (id, title) VALUES (1, 'The Grind');
             INSERT INTO scenes (id, script_id, scene_number, heading, content)
                 VALUES (1, 1, 1, 'INT. COFFEE SHOP - DAY', 'SARAH orders.');",
        )
        .unwrap();
        (dir, path)
    }

    #[test]
    fn test_store_counts() {
        let (_dir, path) = fixture();
        let counts = store_counts(&path, "text-embedding-3-small").unwrap();
        assert_eq!(counts.scripts, 1);
        assert_eq!(counts.scenes, 1);
        assert_eq!(counts.bible_chunks, 0);
        assert_eq!(counts.scene_embeddings, 0);
    }

    #[test]
    fn test_missing_store() {
        let dir = TempDir::new().unwrap();
        assert!(store_counts(&dir.path().join("missing.db"), "m").is_err());
    }
}
