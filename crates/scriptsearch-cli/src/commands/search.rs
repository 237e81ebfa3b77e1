//! Search command - structured and hybrid screenplay search

use anyhow::{Context, Result};
use clap::{Args, ValueEnum};
use scriptsearch_engine::{
    ContentResult, FilterChain, Query, QueryBuilder, ReferenceResult, SearchResponse,
    TimeOfDayFilter,
};
use scriptsearch_engine::results::has_more;

use super::{create_engine, print_info};
use crate::GlobalOptions;

/// Search mode
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum SearchMode {
    /// Lexical only; never call the embedding provider
    Strict,
    /// Lexical plus similarity augmentation
    Fuzzy,
    /// Let the engine decide (default)
    Auto,
}

impl From<SearchMode> for scriptsearch_engine::SearchMode {
    fn from(mode: SearchMode) -> Self {
        match mode {
            SearchMode::Strict => Self::Strict,
            SearchMode::Fuzzy => Self::Fuzzy,
            SearchMode::Auto => Self::Auto,
        }
    }
}

/// Arguments for the search command
#[derive(Args, Debug)]
pub struct SearchArgs {
    /// Free-form query: "quoted" dialogue, (parenthetical), ALL-CAPS
    /// characters, s1e2 or s1e2-s1e5 bounds, INT/EXT, remaining words as text
    query: Option<String>,

    /// Match text within dialogue lines
    #[arg(long)]
    dialogue: Option<String>,

    /// Match text within action lines
    #[arg(long)]
    action: Option<String>,

    /// Match a dialogue parenthetical, e.g. "whispering"
    #[arg(long)]
    parenthetical: Option<String>,

    /// Character who speaks in the scene (repeatable)
    #[arg(long = "character", short = 'C')]
    characters: Vec<String>,

    /// Scene location substring (repeatable)
    #[arg(long = "location", short = 'L')]
    locations: Vec<String>,

    /// Scene type: INT, EXT or INT/EXT
    #[arg(long = "scene-type")]
    scene_type: Option<String>,

    /// Time of day, e.g. NIGHT (repeatable)
    #[arg(long = "time")]
    times: Vec<String>,

    /// Season (start of range when --season-end is given)
    #[arg(long)]
    season: Option<i64>,

    /// Last season of a range
    #[arg(long, requires = "season")]
    season_end: Option<i64>,

    /// Episode (start of range when --episode-end is given)
    #[arg(long, requires = "season")]
    episode: Option<i64>,

    /// Last episode of a range
    #[arg(long, requires = "episode")]
    episode_end: Option<i64>,

    /// Script title substring
    #[arg(long)]
    project: Option<String>,

    /// Search mode
    #[arg(long, short = 'm', value_enum, default_value = "auto")]
    mode: SearchMode,

    /// Also search series bible documents
    #[arg(long)]
    bible: bool,

    /// Search series bible documents only
    #[arg(long, conflicts_with = "bible")]
    only_bible: bool,

    /// Maximum number of results per page (default from config)
    #[arg(long, short = 'n')]
    limit: Option<usize>,

    /// Results to skip
    #[arg(long, default_value = "0")]
    offset: usize,

    /// Output as JSON
    #[arg(long)]
    json: bool,
}

impl SearchArgs {
    /// Fold the raw query string and explicit flags into one query.
    ///
    /// Explicit flags win over values parsed from the query string.
    fn to_query(&self, default_limit: usize, max_limit: usize) -> Result<Query> {
        let parsed = match self.query {
            Some(ref raw) => Query::parse(raw).context("Invalid query string")?,
            None => Query::default(),
        };

        let mut builder = QueryBuilder::default()
            .raw_text(parsed.raw_text.clone())
            .characters(parsed.characters.iter().cloned())
            .characters(self.characters.iter().cloned())
            .locations(parsed.locations.iter().cloned())
            .locations(self.locations.iter().cloned())
            .mode(self.mode.into())
            .limit(self.limit.unwrap_or(default_limit))
            .offset(self.offset);

        if let Some(text) = parsed.free_text {
            builder = builder.free_text(text);
        }
        if let Some(text) = self.dialogue.clone().or(parsed.dialogue_text) {
            builder = builder.dialogue(text);
        }
        if let Some(text) = self.action.clone().or(parsed.action_text) {
            builder = builder.action(text);
        }
        if let Some(text) = self.parenthetical.clone().or(parsed.parenthetical) {
            builder = builder.parenthetical(text);
        }
        if let Some(ref token) = self.scene_type {
            builder = builder.scene_type(token.clone());
        } else if let Some(scene_type) = parsed.scene_type {
            builder = builder.scene_type(scene_type.as_str());
        }

        builder = match (self.season, self.season_end) {
            (Some(start), Some(end)) => builder.season_range(start, end),
            (Some(start), None) => builder.season(start),
            _ => match (parsed.season_start, parsed.season_end) {
                (Some(start), Some(end)) => builder.season_range(start, end),
                (Some(start), None) => builder.season(start),
                _ => builder,
            },
        };
        builder = match (self.episode, self.episode_end) {
            (Some(start), Some(end)) => builder.episode_range(start, end),
            (Some(start), None) => builder.episode(start),
            _ => match (parsed.episode_start, parsed.episode_end) {
                (Some(start), Some(end)) => builder.episode_range(start, end),
                (Some(start), None) => builder.episode(start),
                _ => builder,
            },
        };

        if let Some(ref project) = self.project {
            builder = builder.project(project.clone());
        }
        if self.only_bible {
            builder = builder.only_reference_docs();
        } else if self.bible {
            builder = builder.include_reference_docs(true);
        }

        builder
            .build_with_max_limit(max_limit)
            .context("Invalid search options")
    }
}

/// Execute the search command
pub async fn execute(args: SearchArgs, global: GlobalOptions) -> Result<()> {
    let (engine, config) = create_engine(&global)?;
    let query = args.to_query(config.search.default_limit, config.search.max_limit)?;

    let mut response = engine.search(&query).await.context("Search failed")?;

    if !args.times.is_empty() {
        apply_time_filter(&mut response, &query, &args.times);
    }

    if args.json {
        let json = serde_json::to_string_pretty(&response).context("Failed to serialize results")?;
        println!("{}", json);
        return Ok(());
    }

    if response.is_empty() {
        print_info("No results found", global.quiet);
        return Ok(());
    }

    print_text(&response, &query, global.quiet);
    Ok(())
}

/// Time of day is filtered after retrieval, so only the current page shrinks.
/// Totals drop by what this page lost; rows on other pages are not inspected.
fn apply_time_filter(response: &mut SearchResponse, query: &Query, times: &[String]) {
    let chain = FilterChain::<ContentResult>::new().with(TimeOfDayFilter::new(times.iter()));
    let before = response.content_results.len();
    let kept = chain.apply(std::mem::take(&mut response.content_results), query);

    response.content_total = response
        .content_total
        .saturating_sub(before - kept.len());
    response.content_results = kept;
    response.has_more = has_more(
        response.content_total,
        response.reference_total,
        query.offset,
        query.limit,
    );
}

fn print_text(response: &SearchResponse, query: &Query, quiet: bool) {
    if !quiet {
        let methods: Vec<String> = response.methods_used.iter().map(|m| m.to_string()).collect();
        println!(
            "{} scene(s), {} bible chunk(s) of {} total [{}] in {:.1}ms\n",
            response.content_results.len(),
            response.reference_results.len(),
            response.total(),
            methods.join("+"),
            response.execution_time_ms()
        );
    }

    for (i, scene) in response.content_results.iter().enumerate() {
        print_scene(query.offset + i + 1, scene);
    }
    for (i, chunk) in response.reference_results.iter().enumerate() {
        print_chunk(i + 1, chunk);
    }

    if response.has_more && !quiet {
        println!(
            "More results available: --offset {}",
            query.offset + query.limit
        );
    }
}

fn print_scene(position: usize, scene: &ContentResult) {
    let episode = match (scene.season, scene.episode) {
        (Some(s), Some(e)) => format!(" S{:02}E{:02}", s, e),
        (Some(s), None) => format!(" S{:02}", s),
        _ => String::new(),
    };
    println!(
        "{}. {}{} #{} {}",
        position, scene.script_title, episode, scene.scene_number, scene.scene_heading
    );

    let score = scene
        .relevance_score
        .map(|s| format!("  Score: {:.3}", s))
        .unwrap_or_default();
    println!("   Match: {}{}", scene.match_type, score);

    if let Some(span) = scene.highlights.first() {
        println!("   ... {} ...", excerpt(&scene.scene_content, span.start, span.end));
    }
    println!();
}

fn print_chunk(position: usize, chunk: &ReferenceResult) {
    println!(
        "B{}. {} / {}{}",
        position,
        chunk.script_title,
        chunk.document_title,
        chunk
            .chunk_heading
            .as_deref()
            .map(|h| format!(" > {}", h))
            .unwrap_or_default()
    );
    println!("   Match: {}", chunk.match_type);
    for line in chunk.chunk_content.lines().take(3) {
        println!("   {}", line);
    }
    println!();
}

/// Up to 40 bytes of context on each side of a highlight, on char boundaries
fn excerpt(text: &str, start: usize, end: usize) -> String {
    let mut from = start.saturating_sub(40);
    while !text.is_char_boundary(from) {
        from -= 1;
    }
    let mut to = (end + 40).min(text.len());
    while !text.is_char_boundary(to) {
        to += 1;
    }
    text[from..to].replace('\n', " ")
}
