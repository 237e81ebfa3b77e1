//! Lexical executor
//!
//! Runs built predicates against a [`StoreConnection`] and maps rows into
//! [`ContentResult`] / [`ReferenceResult`] records. Row mapping goes through
//! one explicit function per record type; nullable columns get defaults there
//! and nowhere else.

use regex::RegexBuilder;
use rusqlite::Row;
use serde_json::Value as JsonValue;
use tracing::{debug, warn};

use crate::error::Result;
use crate::predicate::{
    build_chunk_lookup_query, build_content_count_query, build_content_query,
    build_reference_count_query, build_reference_query, build_scene_lookup_query,
};
use crate::query::Query;
use crate::results::{ContentResult, HighlightSpan, MatchType, ReferenceResult};
use crate::store::StoreConnection;

/// Season/episode read from a script's metadata JSON
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScriptMetadata {
    pub season: Option<i64>,
    pub episode: Option<i64>,
}

impl ScriptMetadata {
    /// Parse script metadata.
    ///
    /// Missing or unparsable JSON yields empty metadata with a warning; it
    /// never fails the query.
    pub fn parse(raw: Option<&str>, script_id: i64) -> Self {
        let Some(raw) = raw.filter(|r| !r.trim().is_empty()) else {
            return Self::default();
        };

        match serde_json::from_str::<JsonValue>(raw) {
            Ok(value) => Self {
                season: integer_field(&value, "season"),
                episode: integer_field(&value, "episode"),
            },
            Err(e) => {
                warn!(script_id, error = %e, "Malformed script metadata, treating as empty");
                Self::default()
            }
        }
    }
}

/// Integer field that may have been stored as a number or a numeric string
fn integer_field(value: &JsonValue, key: &str) -> Option<i64> {
    match value.get(key)? {
        JsonValue::Number(n) => n.as_i64(),
        JsonValue::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Why a lexical result matched, by fixed precedence:
/// dialogue > action > text > character > location > text.
pub fn derive_match_type(query: &Query) -> MatchType {
    if query.dialogue_text.is_some() || query.parenthetical.is_some() {
        MatchType::Dialogue
    } else if query.action_text.is_some() {
        MatchType::Action
    } else if query.free_text.is_some() {
        MatchType::Text
    } else if !query.characters.is_empty() {
        MatchType::Character
    } else if !query.locations.is_empty() {
        MatchType::Location
    } else {
        MatchType::Text
    }
}

/// Byte spans of every case-insensitive occurrence of `term` in `text`
pub fn find_highlights(text: &str, term: &str) -> Vec<HighlightSpan> {
    if term.trim().is_empty() {
        return Vec::new();
    }
    let Ok(pattern) = RegexBuilder::new(&regex::escape(term))
        .case_insensitive(true)
        .build()
    else {
        return Vec::new();
    };
    pattern
        .find_iter(text)
        .map(|m| HighlightSpan {
            start: m.start(),
            end: m.end(),
        })
        .collect()
}

/// Scene row before query-dependent fields are attached
#[derive(Debug, Clone)]
struct ContentRow {
    script_id: i64,
    script_title: String,
    script_author: Option<String>,
    script_metadata: Option<String>,
    scene_id: i64,
    scene_number: i64,
    scene_heading: String,
    scene_location: Option<String>,
    scene_time: Option<String>,
    scene_content: Option<String>,
}

impl ContentRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            script_id: row.get("script_id")?,
            script_title: row.get("script_title")?,
            script_author: row.get("script_author")?,
            script_metadata: row.get("script_metadata")?,
            scene_id: row.get("scene_id")?,
            scene_number: row.get("scene_number")?,
            scene_heading: row.get("scene_heading")?,
            scene_location: row.get("scene_location")?,
            scene_time: row.get("scene_time")?,
            scene_content: row.get("scene_content")?,
        })
    }

    fn into_result(self, match_type: MatchType, highlight_term: Option<&str>) -> ContentResult {
        let metadata = ScriptMetadata::parse(self.script_metadata.as_deref(), self.script_id);
        let scene_content = self.scene_content.unwrap_or_default();
        let highlights = highlight_term
            .map(|term| find_highlights(&scene_content, term))
            .unwrap_or_default();

        ContentResult {
            script_id: self.script_id,
            script_title: self.script_title,
            script_author: self.script_author,
            scene_id: self.scene_id,
            scene_number: self.scene_number,
            scene_heading: self.scene_heading,
            scene_location: self.scene_location,
            scene_time: self.scene_time,
            scene_content,
            season: metadata.season,
            episode: metadata.episode,
            match_type,
            relevance_score: None,
            highlights,
        }
    }
}

fn row_to_reference(row: &Row<'_>) -> rusqlite::Result<ReferenceResult> {
    let content: Option<String> = row.get("chunk_content")?;
    Ok(ReferenceResult {
        script_id: row.get("script_id")?,
        script_title: row.get("script_title")?,
        document_id: row.get("bible_id")?,
        document_title: row.get("bible_title")?,
        chunk_id: row.get("chunk_id")?,
        chunk_heading: row.get("chunk_heading")?,
        chunk_level: row.get("chunk_level")?,
        chunk_content: content.unwrap_or_default(),
        match_type: MatchType::Text,
        relevance_score: None,
    })
}

/// One page of lexical results plus the unpaged total
#[derive(Debug, Clone)]
pub struct LexicalPage<T> {
    pub results: Vec<T>,
    pub total: usize,
}

/// Executes lexical queries over one read-only store connection
pub struct LexicalExecutor<'a> {
    store: &'a StoreConnection,
}

impl<'a> LexicalExecutor<'a> {
    pub fn new(store: &'a StoreConnection) -> Self {
        Self { store }
    }

    /// Paged scene matches and their total
    pub fn search_content(&self, query: &Query) -> Result<LexicalPage<ContentResult>> {
        let built = build_content_query(query)?;
        let match_type = derive_match_type(query);
        let highlight_term = query.semantic_text();

        let rows = self
            .store
            .query_rows("content search", &built, ContentRow::from_row)?;
        let results: Vec<ContentResult> = rows
            .into_iter()
            .map(|row| row.into_result(match_type, highlight_term))
            .collect();

        let total = self
            .store
            .query_count("content count", &build_content_count_query(query)?)?;

        debug!(
            returned = results.len(),
            total, "Lexical content search complete"
        );
        Ok(LexicalPage { results, total })
    }

    /// Paged reference-chunk matches and their total
    pub fn search_references(&self, query: &Query) -> Result<LexicalPage<ReferenceResult>> {
        let built = build_reference_query(query)?;
        let results = self
            .store
            .query_rows("reference search", &built, row_to_reference)?;

        let total = self
            .store
            .query_count("reference count", &build_reference_count_query(query)?)?;

        debug!(
            returned = results.len(),
            total, "Lexical reference search complete"
        );
        Ok(LexicalPage { results, total })
    }

    /// Scenes by id, in the order of `ids`; unknown ids are skipped
    pub fn scenes_by_id(&self, ids: &[i64]) -> Result<Vec<ContentResult>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let rows = self.store.query_rows(
            "scene lookup",
            &build_scene_lookup_query(ids),
            ContentRow::from_row,
        )?;
        let mut results: Vec<ContentResult> = rows
            .into_iter()
            .map(|row| row.into_result(MatchType::Semantic, None))
            .collect();
        sort_by_position(&mut results, ids, |r| r.scene_id);
        Ok(results)
    }

    /// Reference chunks by id, in the order of `ids`; unknown ids are skipped
    pub fn chunks_by_id(&self, ids: &[i64]) -> Result<Vec<ReferenceResult>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let mut results = self.store.query_rows(
            "chunk lookup",
            &build_chunk_lookup_query(ids),
            row_to_reference,
        )?;
        for result in &mut results {
            result.match_type = MatchType::Semantic;
        }
        sort_by_position(&mut results, ids, |r| r.chunk_id);
        Ok(results)
    }
}

fn sort_by_position<T>(results: &mut [T], ids: &[i64], id_of: impl Fn(&T) -> i64) {
    results.sort_by_key(|r| {
        let id = id_of(r);
        ids.iter().position(|&i| i == id).unwrap_or(usize::MAX)
    });
}
