//! Structured retrieval queries
//!
//! A [`Query`] is built once per retrieval call, through [`QueryBuilder`] or
//! [`Query::parse`], and is never mutated afterwards. Structural validation
//! happens in [`QueryBuilder::build`]; the engine repeats it with its own
//! configured limits before touching the store.

use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{Result, SearchError};

/// Default page size
pub const DEFAULT_LIMIT: usize = 10;

/// Largest page size accepted unless the engine is configured otherwise
pub const MAX_LIMIT: usize = 100;

/// Governs whether similarity search is attempted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SearchMode {
    /// Lexical matching only
    Strict,
    /// Lexical matching plus similarity augmentation
    Fuzzy,
    /// Similarity augmentation whenever a text term is present
    #[default]
    Auto,
}

impl fmt::Display for SearchMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SearchMode::Strict => write!(f, "strict"),
            SearchMode::Fuzzy => write!(f, "fuzzy"),
            SearchMode::Auto => write!(f, "auto"),
        }
    }
}

impl FromStr for SearchMode {
    type Err = SearchError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "strict" => Ok(Self::Strict),
            "fuzzy" => Ok(Self::Fuzzy),
            "auto" => Ok(Self::Auto),
            _ => Err(SearchError::validation(format!(
                "Unknown search mode: '{}'. Valid values: strict, fuzzy, auto",
                s
            ))),
        }
    }
}

/// Interior/exterior marker from a scene heading
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SceneType {
    #[serde(rename = "INT")]
    Int,
    #[serde(rename = "EXT")]
    Ext,
    #[serde(rename = "INT/EXT")]
    IntExt,
}

impl SceneType {
    /// Canonical token
    pub fn as_str(&self) -> &'static str {
        match self {
            SceneType::Int => "INT",
            SceneType::Ext => "EXT",
            SceneType::IntExt => "INT/EXT",
        }
    }
}

impl fmt::Display for SceneType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SceneType {
    type Err = SearchError;

    /// Unknown tokens are a query-build failure, not a validation failure:
    /// the token reached predicate construction without a known mapping.
    fn from_str(s: &str) -> Result<Self> {
        let token = s.trim().trim_end_matches('.').to_uppercase();
        match token.as_str() {
            "INT" | "INTERIOR" => Ok(Self::Int),
            "EXT" | "EXTERIOR" => Ok(Self::Ext),
            "INT/EXT" | "INT./EXT" | "I/E" | "EXT/INT" | "EXT./INT" => Ok(Self::IntExt),
            _ => Err(SearchError::query_build(format!(
                "unknown scene type token '{}'",
                s
            ))),
        }
    }
}

/// Immutable description of one retrieval request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Query {
    /// Text as the caller originally typed it
    pub raw_text: String,
    /// General text match against scene content and heading
    pub free_text: Option<String>,
    /// Text match restricted to dialogue lines
    pub dialogue_text: Option<String>,
    /// Text match restricted to action lines
    pub action_text: Option<String>,
    /// Parenthetical attached to a matched dialogue line
    pub parenthetical: Option<String>,
    /// Speaker names (ordered, no duplicates)
    pub characters: Vec<String>,
    /// Location substrings (ordered, no duplicates)
    pub locations: Vec<String>,
    pub scene_type: Option<SceneType>,
    pub season_start: Option<i64>,
    pub season_end: Option<i64>,
    pub episode_start: Option<i64>,
    pub episode_end: Option<i64>,
    /// Script title substring
    pub project: Option<String>,
    pub mode: SearchMode,
    pub include_reference_docs: bool,
    pub only_reference_docs: bool,
    pub limit: usize,
    pub offset: usize,
}

impl Default for Query {
    fn default() -> Self {
        Self {
            raw_text: String::new(),
            free_text: None,
            dialogue_text: None,
            action_text: None,
            parenthetical: None,
            characters: Vec::new(),
            locations: Vec::new(),
            scene_type: None,
            season_start: None,
            season_end: None,
            episode_start: None,
            episode_end: None,
            project: None,
            mode: SearchMode::default(),
            include_reference_docs: false,
            only_reference_docs: false,
            limit: DEFAULT_LIMIT,
            offset: 0,
        }
    }
}

impl Query {
    /// Start building a query
    pub fn builder() -> QueryBuilder {
        QueryBuilder::default()
    }

    /// Text handed to the embedding provider.
    ///
    /// Dialogue wins over action, action over free text.
    pub fn semantic_text(&self) -> Option<&str> {
        [&self.dialogue_text, &self.action_text, &self.free_text]
            .into_iter()
            .filter_map(|term| term.as_deref())
            .find(|term| !term.trim().is_empty())
    }

    /// Whether content (scene) search runs at all
    pub fn searches_content(&self) -> bool {
        !self.only_reference_docs
    }

    /// Whether reference-document search runs
    pub fn searches_references(&self) -> bool {
        self.include_reference_docs || self.only_reference_docs
    }

    /// Whether the similarity stage is eligible for this query
    pub fn wants_semantic(&self) -> bool {
        self.mode != SearchMode::Strict && self.semantic_text().is_some()
    }

    /// Whether any season/episode bound is present
    pub fn has_episode_filter(&self) -> bool {
        self.season_start.is_some() || self.episode_start.is_some()
    }

    /// Episode bounds that actually constrain results.
    ///
    /// A season range only narrows episodes when both episode bounds are
    /// given; a lone episode start under a season range is ignored.
    pub fn episode_bounds(&self) -> (Option<i64>, Option<i64>) {
        if self.season_end.is_some() && self.episode_end.is_none() {
            (None, None)
        } else {
            (self.episode_start, self.episode_end)
        }
    }

    /// Reject malformed queries.
    ///
    /// Runs before any I/O; `max_limit` comes from engine configuration.
    pub fn validate(&self, max_limit: usize) -> Result<()> {
        if self.limit == 0 || self.limit > max_limit {
            return Err(SearchError::validation(format!(
                "limit must be between 1 and {}, got {}",
                max_limit, self.limit
            )));
        }
        self.validate_structure()
    }

    /// Everything [`validate`](Self::validate) checks except the page-size cap
    fn validate_structure(&self) -> Result<()> {
        if self.limit == 0 {
            return Err(SearchError::validation("limit must be at least 1"));
        }
        // The store takes OFFSET and LIMIT as signed 64-bit integers
        let offset_fits = i64::try_from(self.offset).is_ok()
            && self
                .offset
                .checked_add(self.limit)
                .is_some_and(|end| i64::try_from(end).is_ok());
        if !offset_fits {
            return Err(SearchError::validation(format!(
                "offset {} is out of range for limit {}",
                self.offset, self.limit
            )));
        }
        if self.only_reference_docs && !self.include_reference_docs {
            return Err(SearchError::validation(
                "only_reference_docs requires include_reference_docs",
            ));
        }
        if self.season_end.is_some() && self.season_start.is_none() {
            return Err(SearchError::validation(
                "season_end given without season_start",
            ));
        }
        if self.episode_end.is_some() && self.episode_start.is_none() {
            return Err(SearchError::validation(
                "episode_end given without episode_start",
            ));
        }
        if self.episode_start.is_some() && self.season_start.is_none() {
            return Err(SearchError::validation(
                "episode_start given without season_start",
            ));
        }
        check_range("season", self.season_start, self.season_end)?;
        check_range("episode", self.episode_start, self.episode_end)?;
        Ok(())
    }

    /// Parse a free-form search string.
    ///
    /// - `"quoted text"` searches dialogue
    /// - `(text)` matches a parenthetical
    /// - `s1e2` or `s1e2-s1e5` sets season/episode bounds
    /// - `INT`, `EXT`, `INT/EXT` set the scene type
    /// - ALL-CAPS words name characters
    /// - anything left over is free text
    pub fn parse(raw: &str) -> Result<Query> {
        parse_raw(raw)?.build()
    }
}

fn check_range(dimension: &str, start: Option<i64>, end: Option<i64>) -> Result<()> {
    if let (Some(start), Some(end)) = (start, end) {
        if start > end {
            return Err(SearchError::validation(format!(
                "{} range is inverted: {} > {}",
                dimension, start, end
            )));
        }
    }
    Ok(())
}

/// Builder for [`Query`]
#[derive(Debug, Clone, Default)]
pub struct QueryBuilder {
    query: Query,
    scene_type_token: Option<String>,
}

impl QueryBuilder {
    pub fn raw_text(mut self, text: impl Into<String>) -> Self {
        self.query.raw_text = text.into();
        self
    }

    pub fn free_text(mut self, text: impl Into<String>) -> Self {
        self.query.free_text = non_blank(text.into());
        self
    }

    pub fn dialogue(mut self, text: impl Into<String>) -> Self {
        self.query.dialogue_text = non_blank(text.into());
        self
    }

    pub fn action(mut self, text: impl Into<String>) -> Self {
        self.query.action_text = non_blank(text.into());
        self
    }

    pub fn parenthetical(mut self, text: impl Into<String>) -> Self {
        self.query.parenthetical = non_blank(text.into());
        self
    }

    pub fn character(mut self, name: impl Into<String>) -> Self {
        push_unique(&mut self.query.characters, name.into());
        self
    }

    pub fn characters<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for name in names {
            push_unique(&mut self.query.characters, name.into());
        }
        self
    }

    pub fn location(mut self, location: impl Into<String>) -> Self {
        push_unique(&mut self.query.locations, location.into());
        self
    }

    pub fn locations<I, S>(mut self, locations: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for location in locations {
            push_unique(&mut self.query.locations, location.into());
        }
        self
    }

    /// Scene type token (`INT`, `EXT`, `INT/EXT`); checked in [`build`](Self::build)
    pub fn scene_type(mut self, token: impl Into<String>) -> Self {
        self.scene_type_token = non_blank(token.into());
        self
    }

    pub fn season(mut self, season: i64) -> Self {
        self.query.season_start = Some(season);
        self
    }

    pub fn season_range(mut self, start: i64, end: i64) -> Self {
        self.query.season_start = Some(start);
        self.query.season_end = Some(end);
        self
    }

    pub fn episode(mut self, episode: i64) -> Self {
        self.query.episode_start = Some(episode);
        self
    }

    pub fn episode_range(mut self, start: i64, end: i64) -> Self {
        self.query.episode_start = Some(start);
        self.query.episode_end = Some(end);
        self
    }

    pub fn project(mut self, title: impl Into<String>) -> Self {
        self.query.project = non_blank(title.into());
        self
    }

    pub fn mode(mut self, mode: SearchMode) -> Self {
        self.query.mode = mode;
        self
    }

    pub fn include_reference_docs(mut self, include: bool) -> Self {
        self.query.include_reference_docs = include;
        self
    }

    /// Search reference documents only (implies inclusion)
    pub fn only_reference_docs(mut self) -> Self {
        self.query.include_reference_docs = true;
        self.query.only_reference_docs = true;
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.query.limit = limit;
        self
    }

    pub fn offset(mut self, offset: usize) -> Self {
        self.query.offset = offset;
        self
    }

    /// Finish the query.
    ///
    /// Fails with `QueryBuild` on an unknown scene-type token and with
    /// `Validation` on structural problems. The page-size cap is left to
    /// [`SearchEngine::search`](crate::SearchEngine::search), which knows its
    /// configured maximum.
    pub fn build(self) -> Result<Query> {
        let query = self.finish()?;
        query.validate_structure()?;
        Ok(query)
    }

    /// Finish the query, also enforcing `max_limit` up front
    pub fn build_with_max_limit(self, max_limit: usize) -> Result<Query> {
        let query = self.finish()?;
        query.validate(max_limit)?;
        Ok(query)
    }

    fn finish(self) -> Result<Query> {
        let mut query = self.query;
        if let Some(token) = self.scene_type_token {
            query.scene_type = Some(token.parse()?);
        }
        Ok(query)
    }
}

fn non_blank(text: String) -> Option<String> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

fn push_unique(values: &mut Vec<String>, value: String) {
    let Some(value) = non_blank(value) else {
        return;
    };
    if !values.iter().any(|v| v.eq_ignore_ascii_case(&value)) {
        values.push(value);
    }
}

fn quoted_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r#""([^"]*)""#).expect("valid quoted pattern"))
}

fn parenthetical_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"\(([^)]*)\)").expect("valid parenthetical pattern"))
}

fn episode_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?i)\bs(\d+)e(\d+)(?:\s*-\s*s(\d+)e(\d+))?\b").expect("valid episode pattern")
    })
}

fn parse_raw(raw: &str) -> Result<QueryBuilder> {
    let mut builder = Query::builder().raw_text(raw);
    let mut rest = raw.to_string();

    if let Some(caps) = quoted_pattern().captures(&rest) {
        builder = builder.dialogue(&caps[1]);
    }
    rest = quoted_pattern().replace_all(&rest, " ").into_owned();

    if let Some(caps) = parenthetical_pattern().captures(&rest) {
        builder = builder.parenthetical(&caps[1]);
    }
    rest = parenthetical_pattern().replace_all(&rest, " ").into_owned();

    if let Some(caps) = episode_pattern().captures(&rest) {
        let number = |i: usize| -> Result<Option<i64>> {
            caps.get(i)
                .map(|m| {
                    m.as_str().parse::<i64>().map_err(|e| {
                        SearchError::validation(format!("bad episode number '{}': {}", m.as_str(), e))
                    })
                })
                .transpose()
        };
        let (season, episode) = (number(1)?, number(2)?);
        let (season_end, episode_end) = (number(3)?, number(4)?);
        if let (Some(season), Some(episode)) = (season, episode) {
            builder = match (season_end, episode_end) {
                (Some(season_end), Some(episode_end)) => builder
                    .season_range(season, season_end)
                    .episode_range(episode, episode_end),
                _ => builder.season(season).episode(episode),
            };
        }
    }
    rest = episode_pattern().replace_all(&rest, " ").into_owned();

    let mut free_words = Vec::new();
    for word in rest.split_whitespace() {
        if let Ok(scene_type) = word.parse::<SceneType>() {
            builder = builder.scene_type(scene_type.as_str());
        } else if is_character_name(word) {
            builder = builder.character(word.trim_matches(|c: char| !c.is_alphanumeric()));
        } else {
            free_words.push(word);
        }
    }
    if !free_words.is_empty() {
        builder = builder.free_text(free_words.join(" "));
    }

    Ok(builder)
}

fn is_character_name(word: &str) -> bool {
    let letters: Vec<char> = word.chars().filter(|c| c.is_alphabetic()).collect();
    letters.len() >= 2 && letters.iter().all(|c| c.is_uppercase())
}
