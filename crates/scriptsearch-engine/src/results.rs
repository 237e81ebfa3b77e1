//! Result records and the assembled search response

use std::collections::BTreeSet;
use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Why a record matched
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum MatchType {
    Dialogue,
    Action,
    #[default]
    Text,
    Character,
    Location,
    /// Found by similarity ranking only
    Semantic,
}

impl MatchType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MatchType::Dialogue => "dialogue",
            MatchType::Action => "action",
            MatchType::Text => "text",
            MatchType::Character => "character",
            MatchType::Location => "location",
            MatchType::Semantic => "semantic",
        }
    }
}

impl fmt::Display for MatchType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Retrieval path that contributed to a response
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchMethod {
    Lexical,
    Semantic,
}

impl fmt::Display for SearchMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SearchMethod::Lexical => write!(f, "lexical"),
            SearchMethod::Semantic => write!(f, "semantic"),
        }
    }
}

/// Byte span of a matched term inside `scene_content`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HighlightSpan {
    pub start: usize,
    pub end: usize,
}

/// One matched scene
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentResult {
    pub script_id: i64,
    pub script_title: String,
    pub script_author: Option<String>,
    pub scene_id: i64,
    pub scene_number: i64,
    pub scene_heading: String,
    pub scene_location: Option<String>,
    pub scene_time: Option<String>,
    pub scene_content: String,
    pub season: Option<i64>,
    pub episode: Option<i64>,
    pub match_type: MatchType,
    /// Similarity score for semantic matches
    pub relevance_score: Option<f32>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub highlights: Vec<HighlightSpan>,
}

/// One matched reference-document chunk
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReferenceResult {
    pub script_id: i64,
    pub script_title: String,
    pub document_id: i64,
    pub document_title: String,
    pub chunk_id: i64,
    pub chunk_heading: Option<String>,
    pub chunk_level: Option<i64>,
    pub chunk_content: String,
    pub match_type: MatchType,
    pub relevance_score: Option<f32>,
}

/// Common view over result records, used by the filter chain
pub trait SearchHit: Clone + Send + Sync {
    /// Scene id or chunk id
    fn entity_id(&self) -> i64;
    fn text(&self) -> &str;
    fn heading(&self) -> Option<&str>;
    fn location(&self) -> Option<&str>;
    fn time_of_day(&self) -> Option<&str>;
    fn script_title(&self) -> &str;
    fn season(&self) -> Option<i64>;
    fn episode(&self) -> Option<i64>;
}

impl SearchHit for ContentResult {
    fn entity_id(&self) -> i64 {
        self.scene_id
    }

    fn text(&self) -> &str {
        &self.scene_content
    }

    fn heading(&self) -> Option<&str> {
        Some(&self.scene_heading)
    }

    fn location(&self) -> Option<&str> {
        self.scene_location.as_deref()
    }

    fn time_of_day(&self) -> Option<&str> {
        self.scene_time.as_deref()
    }

    fn script_title(&self) -> &str {
        &self.script_title
    }

    fn season(&self) -> Option<i64> {
        self.season
    }

    fn episode(&self) -> Option<i64> {
        self.episode
    }
}

impl SearchHit for ReferenceResult {
    fn entity_id(&self) -> i64 {
        self.chunk_id
    }

    fn text(&self) -> &str {
        &self.chunk_content
    }

    fn heading(&self) -> Option<&str> {
        self.chunk_heading.as_deref()
    }

    fn location(&self) -> Option<&str> {
        None
    }

    fn time_of_day(&self) -> Option<&str> {
        None
    }

    fn script_title(&self) -> &str {
        &self.script_title
    }

    fn season(&self) -> Option<i64> {
        None
    }

    fn episode(&self) -> Option<i64> {
        None
    }
}

/// Whether more results exist past the current page, across both sources
pub fn has_more(content_total: usize, reference_total: usize, offset: usize, limit: usize) -> bool {
    content_total.saturating_add(reference_total) > offset.saturating_add(limit)
}

/// Frozen result of one `search` call
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResponse {
    pub content_results: Vec<ContentResult>,
    pub reference_results: Vec<ReferenceResult>,
    pub content_total: usize,
    pub reference_total: usize,
    pub has_more: bool,
    pub execution_time: Duration,
    pub methods_used: BTreeSet<SearchMethod>,
}

impl SearchResponse {
    pub fn is_empty(&self) -> bool {
        self.content_results.is_empty() && self.reference_results.is_empty()
    }

    pub fn total(&self) -> usize {
        self.content_total + self.reference_total
    }

    pub fn used(&self, method: SearchMethod) -> bool {
        self.methods_used.contains(&method)
    }

    pub fn execution_time_ms(&self) -> f64 {
        self.execution_time.as_secs_f64() * 1000.0
    }
}
