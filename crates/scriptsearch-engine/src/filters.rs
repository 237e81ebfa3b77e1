//! Result filter chain
//!
//! Post-retrieval filters over any [`SearchHit`] list. A [`FilterChain`]
//! applies its filters in registration order, each consuming the previous
//! stage's output. Filters never touch the [`Query`]; a filter whose query
//! field is empty passes results through unchanged.

use std::collections::HashSet;

use crate::query::{Query, SceneType};
use crate::results::SearchHit;

/// One post-retrieval filter
pub trait ResultFilter<T: SearchHit>: Send + Sync {
    /// Short name for logging
    fn name(&self) -> &'static str;

    fn apply(&self, results: Vec<T>, query: &Query) -> Vec<T>;
}

fn contains_ignore_case(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(&needle.to_lowercase())
}

/// Keep results whose text mentions at least one requested character
#[derive(Debug, Clone, Copy, Default)]
pub struct CharacterFilter;

impl<T: SearchHit> ResultFilter<T> for CharacterFilter {
    fn name(&self) -> &'static str {
        "character"
    }

    fn apply(&self, results: Vec<T>, query: &Query) -> Vec<T> {
        if query.characters.is_empty() {
            return results;
        }
        let names: Vec<String> = query.characters.iter().map(|c| c.to_lowercase()).collect();
        results
            .into_iter()
            .filter(|r| {
                let text = r.text().to_lowercase();
                names.iter().any(|name| text.contains(name.as_str()))
            })
            .collect()
    }
}

/// Keep results whose location contains at least one requested location
#[derive(Debug, Clone, Copy, Default)]
pub struct LocationFilter;

impl<T: SearchHit> ResultFilter<T> for LocationFilter {
    fn name(&self) -> &'static str {
        "location"
    }

    fn apply(&self, results: Vec<T>, query: &Query) -> Vec<T> {
        if query.locations.is_empty() {
            return results;
        }
        results
            .into_iter()
            .filter(|r| {
                r.location().is_some_and(|location| {
                    query
                        .locations
                        .iter()
                        .any(|wanted| contains_ignore_case(location, wanted))
                })
            })
            .collect()
    }
}

/// Keep results whose time of day contains one of the configured tokens
///
/// Time of day is not part of [`Query`], so the tokens live on the filter.
#[derive(Debug, Clone, Default)]
pub struct TimeOfDayFilter {
    tokens: Vec<String>,
}

impl TimeOfDayFilter {
    pub fn new<I, S>(tokens: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            tokens: tokens
                .into_iter()
                .map(Into::into)
                .filter(|t: &String| !t.trim().is_empty())
                .collect(),
        }
    }
}

impl<T: SearchHit> ResultFilter<T> for TimeOfDayFilter {
    fn name(&self) -> &'static str {
        "time_of_day"
    }

    fn apply(&self, results: Vec<T>, _query: &Query) -> Vec<T> {
        if self.tokens.is_empty() {
            return results;
        }
        results
            .into_iter()
            .filter(|r| {
                r.time_of_day().is_some_and(|time| {
                    self.tokens.iter().any(|token| contains_ignore_case(time, token))
                })
            })
            .collect()
    }
}

/// Season/episode bounds with the same semantics as the store predicate
#[derive(Debug, Clone, Copy, Default)]
pub struct SeasonEpisodeFilter;

fn in_bounds(value: Option<i64>, start: Option<i64>, end: Option<i64>) -> bool {
    match (start, end) {
        (None, _) => true,
        (Some(start), None) => value == Some(start),
        (Some(start), Some(end)) => value.is_some_and(|v| (start..=end).contains(&v)),
    }
}

impl<T: SearchHit> ResultFilter<T> for SeasonEpisodeFilter {
    fn name(&self) -> &'static str {
        "season_episode"
    }

    fn apply(&self, results: Vec<T>, query: &Query) -> Vec<T> {
        if !query.has_episode_filter() {
            return results;
        }
        results
            .into_iter()
            .filter(|r| {
                let (episode_start, episode_end) = query.episode_bounds();
                in_bounds(r.season(), query.season_start, query.season_end)
                    && in_bounds(r.episode(), episode_start, episode_end)
            })
            .collect()
    }
}

/// Whether a scene heading carries the given interior/exterior marker
pub fn heading_matches(heading: &str, scene_type: SceneType) -> bool {
    let heading = heading.trim_start().to_uppercase();
    let is_int_ext = heading.starts_with("INT./EXT.")
        || heading.starts_with("INT/EXT")
        || heading.starts_with("I/E");
    match scene_type {
        SceneType::Int => heading.starts_with("INT.") && !is_int_ext,
        SceneType::Ext => heading.starts_with("EXT."),
        SceneType::IntExt => is_int_ext,
    }
}

/// Keep results whose heading matches the requested scene type
#[derive(Debug, Clone, Copy, Default)]
pub struct SceneTypeFilter;

impl<T: SearchHit> ResultFilter<T> for SceneTypeFilter {
    fn name(&self) -> &'static str {
        "scene_type"
    }

    fn apply(&self, results: Vec<T>, query: &Query) -> Vec<T> {
        let Some(scene_type) = query.scene_type else {
            return results;
        };
        results
            .into_iter()
            .filter(|r| r.heading().is_some_and(|h| heading_matches(h, scene_type)))
            .collect()
    }
}

/// Keep results whose script title contains the requested project
#[derive(Debug, Clone, Copy, Default)]
pub struct ProjectFilter;

impl<T: SearchHit> ResultFilter<T> for ProjectFilter {
    fn name(&self) -> &'static str {
        "project"
    }

    fn apply(&self, results: Vec<T>, query: &Query) -> Vec<T> {
        let Some(ref project) = query.project else {
            return results;
        };
        results
            .into_iter()
            .filter(|r| contains_ignore_case(r.script_title(), project))
            .collect()
    }
}

/// Stable de-duplication by entity id; the first occurrence wins
#[derive(Debug, Clone, Copy, Default)]
pub struct DuplicateFilter;

impl<T: SearchHit> ResultFilter<T> for DuplicateFilter {
    fn name(&self) -> &'static str {
        "duplicate"
    }

    fn apply(&self, results: Vec<T>, _query: &Query) -> Vec<T> {
        let mut seen = HashSet::with_capacity(results.len());
        results
            .into_iter()
            .filter(|r| seen.insert(r.entity_id()))
            .collect()
    }
}

/// Ordered sequence of filters
pub struct FilterChain<T: SearchHit> {
    filters: Vec<Box<dyn ResultFilter<T>>>,
}

impl<T: SearchHit> Default for FilterChain<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: SearchHit + 'static> FilterChain<T> {
    /// Filters that re-apply the query's structural constraints to scene
    /// results that bypassed the store predicates
    pub fn for_content(query: &Query) -> Self {
        let mut chain = Self::new();
        if !query.characters.is_empty() {
            chain.push(CharacterFilter);
        }
        if !query.locations.is_empty() {
            chain.push(LocationFilter);
        }
        if query.scene_type.is_some() {
            chain.push(SceneTypeFilter);
        }
        if query.has_episode_filter() {
            chain.push(SeasonEpisodeFilter);
        }
        if query.project.is_some() {
            chain.push(ProjectFilter);
        }
        chain.with(DuplicateFilter)
    }

    /// Same for reference chunks, which only carry a script title
    pub fn for_references(query: &Query) -> Self {
        let mut chain = Self::new();
        if query.project.is_some() {
            chain.push(ProjectFilter);
        }
        chain.with(DuplicateFilter)
    }
}

impl<T: SearchHit> FilterChain<T> {
    pub fn new() -> Self {
        Self {
            filters: Vec::new(),
        }
    }

    pub fn with(mut self, filter: impl ResultFilter<T> + 'static) -> Self {
        self.push(filter);
        self
    }

    pub fn push(&mut self, filter: impl ResultFilter<T> + 'static) {
        self.filters.push(Box::new(filter));
    }

    pub fn len(&self) -> usize {
        self.filters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }

    /// Names of the registered filters, in order
    pub fn names(&self) -> Vec<&'static str> {
        self.filters.iter().map(|f| f.name()).collect()
    }

    pub fn apply(&self, results: Vec<T>, query: &Query) -> Vec<T> {
        self.filters
            .iter()
            .fold(results, |acc, filter| filter.apply(acc, query))
    }
}
