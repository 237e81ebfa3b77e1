//! Predicate builder
//!
//! Translates a [`Query`] into parameterized SQL against the structured store.
//! Each filter is a pure function returning an optional [`Predicate`]; the
//! predicates are collected in a fixed order and joined once:
//!
//! ```text
//! text/dialogue/action -> character -> location -> scene type -> season/episode -> project
//! ```
//!
//! The fixed order only makes the generated SQL deterministic for tests and
//! logging; the store does not care.

use rusqlite::types::{ToSql, Value};

use crate::error::{Result, SearchError};
use crate::query::{Query, SceneType};
use crate::schema::{CONTENT_COLUMNS, REFERENCE_COLUMNS};

/// Named parameter (`":name"`) and its bound value
pub type NamedParam = (String, Value);

/// One condition of a WHERE clause with the parameters it binds
#[derive(Debug, Clone, PartialEq)]
pub struct Predicate {
    pub fragment: String,
    pub params: Vec<NamedParam>,
    /// Predicate reads from the `d` (dialogues) join
    pub needs_dialogue_join: bool,
}

impl Predicate {
    fn new(fragment: impl Into<String>) -> Self {
        Self {
            fragment: fragment.into(),
            params: Vec::new(),
            needs_dialogue_join: false,
        }
    }

    fn bind(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.params.push((format!(":{}", name), value.into()));
        self
    }

    fn on_dialogue(mut self) -> Self {
        self.needs_dialogue_join = true;
        self
    }
}

/// SQL text plus its named parameters, ready for execution
#[derive(Debug, Clone, PartialEq)]
pub struct BuiltQuery {
    pub sql: String,
    pub params: Vec<NamedParam>,
}

impl BuiltQuery {
    /// Parameters in the shape rusqlite accepts for named binding
    pub fn named_params(&self) -> Vec<(&str, &dyn ToSql)> {
        self.params
            .iter()
            .map(|(name, value)| (name.as_str(), value as &dyn ToSql))
            .collect()
    }
}

/// Wrap a user term for a `LIKE ... ESCAPE '\'` substring match
pub fn like_pattern(term: &str) -> String {
    let mut escaped = String::with_capacity(term.len() + 2);
    escaped.push('%');
    for c in term.chars() {
        if matches!(c, '\\' | '%' | '_') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped.push('%');
    escaped
}

// ============================================================================
// Content predicates
// ============================================================================

/// Dialogue, parenthetical, action and general text conditions
pub fn text_predicates(query: &Query) -> Vec<Predicate> {
    let mut predicates = Vec::new();

    if let Some(ref dialogue) = query.dialogue_text {
        predicates.push(
            Predicate::new(r"d.dialogue_text LIKE :dialogue ESCAPE '\'")
                .bind("dialogue", like_pattern(dialogue))
                .on_dialogue(),
        );
    }

    if let Some(ref parenthetical) = query.parenthetical {
        predicates.push(
            Predicate::new(
                "json_extract(CASE WHEN json_valid(d.metadata) THEN d.metadata END, \
                 '$.parenthetical') LIKE :parenthetical ESCAPE '\\'",
            )
            .bind("parenthetical", like_pattern(parenthetical))
            .on_dialogue(),
        );
    }

    if let Some(ref action) = query.action_text {
        predicates.push(
            Predicate::new(
                r"EXISTS (SELECT 1 FROM actions a WHERE a.scene_id = sc.id AND a.action_text LIKE :action ESCAPE '\')",
            )
            .bind("action", like_pattern(action)),
        );
    }

    if let Some(ref text) = query.free_text {
        predicates.push(
            Predicate::new(r"(sc.content LIKE :text ESCAPE '\' OR sc.heading LIKE :text ESCAPE '\')")
                .bind("text", like_pattern(text)),
        );
    }

    predicates
}

/// Scene has at least one line spoken by any requested character
pub fn character_predicate(query: &Query) -> Option<Predicate> {
    if query.characters.is_empty() {
        return None;
    }

    let names: Vec<String> = (0..query.characters.len())
        .map(|i| format!("UPPER(c2.name) = UPPER(:character_{})", i))
        .collect();
    let fragment = format!(
        "EXISTS (SELECT 1 FROM dialogues d2 INNER JOIN characters c2 ON d2.character_id = c2.id \
         WHERE d2.scene_id = sc.id AND ({}))",
        names.join(" OR ")
    );

    let predicate = query
        .characters
        .iter()
        .enumerate()
        .fold(Predicate::new(fragment), |p, (i, name)| {
            p.bind(&format!("character_{}", i), name.clone())
        });
    Some(predicate)
}

/// Scene location contains any requested location
pub fn location_predicate(query: &Query) -> Option<Predicate> {
    if query.locations.is_empty() {
        return None;
    }

    let clauses: Vec<String> = (0..query.locations.len())
        .map(|i| format!(r"sc.location LIKE :location_{} ESCAPE '\'", i))
        .collect();
    let fragment = format!("({})", clauses.join(" OR "));

    let predicate = query
        .locations
        .iter()
        .enumerate()
        .fold(Predicate::new(fragment), |p, (i, location)| {
            p.bind(&format!("location_{}", i), like_pattern(location))
        });
    Some(predicate)
}

/// Heading prefix for the requested interior/exterior marker
pub fn scene_type_predicate(query: &Query) -> Option<Predicate> {
    let predicate = match query.scene_type? {
        SceneType::Int => Predicate::new(
            "(sc.heading LIKE 'INT.%' AND sc.heading NOT LIKE 'INT./EXT.%' \
             AND sc.heading NOT LIKE 'INT/EXT%')",
        ),
        SceneType::Ext => Predicate::new("sc.heading LIKE 'EXT.%'"),
        SceneType::IntExt => Predicate::new(
            "(sc.heading LIKE 'INT./EXT.%' OR sc.heading LIKE 'INT/EXT%' \
             OR sc.heading LIKE 'I/E%')",
        ),
    };
    Some(predicate)
}

/// Season/episode bounds against script metadata.
///
/// Each dimension is a closed range when both bounds are present, else an
/// exact match on its start bound. Under a season range the episode is only
/// constrained when both episode bounds are given.
pub fn episode_predicate(query: &Query) -> Result<Option<Predicate>> {
    let Some(season_start) = query.season_start else {
        if query.episode_start.is_some() || query.season_end.is_some() || query.episode_end.is_some() {
            return Err(SearchError::query_build(
                "season/episode bounds without a season start",
            ));
        }
        return Ok(None);
    };

    // Malformed metadata reads as NULL instead of failing the statement
    let metadata = "CASE WHEN json_valid(s.metadata) THEN s.metadata END";
    let season = format!("CAST(json_extract({}, '$.season') AS INTEGER)", metadata);
    let episode = format!("CAST(json_extract({}, '$.episode') AS INTEGER)", metadata);

    let mut clauses = Vec::new();
    let mut predicate = Predicate::new(String::new());

    match query.season_end {
        Some(season_end) => {
            clauses.push(format!("{} BETWEEN :season_start AND :season_end", season));
            predicate = predicate
                .bind("season_start", season_start)
                .bind("season_end", season_end);
        }
        None => {
            clauses.push(format!("{} = :season_start", season));
            predicate = predicate.bind("season_start", season_start);
        }
    }

    match query.episode_bounds() {
        (Some(episode_start), Some(episode_end)) => {
            clauses.push(format!("{} BETWEEN :episode_start AND :episode_end", episode));
            predicate = predicate
                .bind("episode_start", episode_start)
                .bind("episode_end", episode_end);
        }
        (Some(episode_start), None) => {
            clauses.push(format!("{} = :episode_start", episode));
            predicate = predicate.bind("episode_start", episode_start);
        }
        (None, Some(_)) => {
            return Err(SearchError::query_build("episode_end without episode_start"));
        }
        (None, None) => {}
    }

    predicate.fragment = clauses.join(" AND ");
    Ok(Some(predicate))
}

/// Script title contains the requested project name
pub fn project_predicate(query: &Query) -> Option<Predicate> {
    let project = query.project.as_ref()?;
    Some(Predicate::new(r"s.title LIKE :project ESCAPE '\'").bind("project", like_pattern(project)))
}

/// All content predicates in their stable order
pub fn content_predicates(query: &Query) -> Result<Vec<Predicate>> {
    let mut predicates = text_predicates(query);
    predicates.extend(character_predicate(query));
    predicates.extend(location_predicate(query));
    predicates.extend(scene_type_predicate(query));
    predicates.extend(episode_predicate(query)?);
    predicates.extend(project_predicate(query));
    Ok(predicates)
}

fn content_from(predicates: &[Predicate]) -> String {
    let mut from = String::from("FROM scenes sc\nINNER JOIN scripts s ON sc.script_id = s.id");
    if predicates.iter().any(|p| p.needs_dialogue_join) {
        from.push_str("\nINNER JOIN dialogues d ON d.scene_id = sc.id");
    }
    from
}

/// Join predicates into a WHERE clause, collecting their params in order
fn where_clause(predicates: Vec<Predicate>) -> (String, Vec<NamedParam>) {
    let mut sql = String::from("WHERE 1=1");
    let mut params = Vec::new();
    for predicate in predicates {
        sql.push_str("\n  AND ");
        sql.push_str(&predicate.fragment);
        params.extend(predicate.params);
    }
    (sql, params)
}

fn page(params: &mut Vec<NamedParam>, query: &Query) -> Result<&'static str> {
    let bound = |name: &str, value: usize| {
        i64::try_from(value).map_err(|_| {
            SearchError::query_build(format!("{} {} does not fit the store's integer range", name, value))
        })
    };
    params.push((":limit".to_string(), Value::Integer(bound("limit", query.limit)?)));
    params.push((":offset".to_string(), Value::Integer(bound("offset", query.offset)?)));
    Ok("LIMIT :limit OFFSET :offset")
}

/// Paged scene search
pub fn build_content_query(query: &Query) -> Result<BuiltQuery> {
    let predicates = content_predicates(query)?;
    let from = content_from(&predicates);
    let (where_sql, mut params) = where_clause(predicates);
    let page_sql = page(&mut params, query)?;

    let sql = format!(
        "SELECT DISTINCT {}\n{}\n{}\nORDER BY s.title, sc.scene_number, sc.id\n{}",
        CONTENT_COLUMNS, from, where_sql, page_sql
    );
    Ok(BuiltQuery { sql, params })
}

/// Total scene matches for the same predicates, without paging
pub fn build_content_count_query(query: &Query) -> Result<BuiltQuery> {
    let predicates = content_predicates(query)?;
    let from = content_from(&predicates);
    let (where_sql, params) = where_clause(predicates);

    let sql = format!("SELECT COUNT(DISTINCT sc.id)\n{}\n{}", from, where_sql);
    Ok(BuiltQuery { sql, params })
}

// ============================================================================
// Reference-document predicates
// ============================================================================

/// Chunk content or heading contains the free-text term
pub fn reference_text_predicate(query: &Query) -> Option<Predicate> {
    let text = query.free_text.as_ref()?;
    Some(
        Predicate::new(r"(bc.content LIKE :text ESCAPE '\' OR bc.heading LIKE :text ESCAPE '\')")
            .bind("text", like_pattern(text)),
    )
}

/// All reference predicates in their stable order
pub fn reference_predicates(query: &Query) -> Vec<Predicate> {
    let mut predicates = Vec::new();
    predicates.extend(reference_text_predicate(query));
    predicates.extend(project_predicate(query));
    predicates
}

const REFERENCE_FROM: &str = "FROM bible_chunks bc\n\
     INNER JOIN script_bibles b ON bc.bible_id = b.id\n\
     INNER JOIN scripts s ON b.script_id = s.id";

/// Paged reference-chunk search
pub fn build_reference_query(query: &Query) -> Result<BuiltQuery> {
    let (where_sql, mut params) = where_clause(reference_predicates(query));
    let page_sql = page(&mut params, query)?;

    let sql = format!(
        "SELECT DISTINCT {}\n{}\n{}\nORDER BY s.title, b.title, bc.chunk_number, bc.id\n{}",
        REFERENCE_COLUMNS, REFERENCE_FROM, where_sql, page_sql
    );
    Ok(BuiltQuery { sql, params })
}

/// Total reference-chunk matches, without paging
pub fn build_reference_count_query(query: &Query) -> Result<BuiltQuery> {
    let (where_sql, params) = where_clause(reference_predicates(query));
    let sql = format!("SELECT COUNT(DISTINCT bc.id)\n{}\n{}", REFERENCE_FROM, where_sql);
    Ok(BuiltQuery { sql, params })
}

// ============================================================================
// Lookups by id (hydrating similarity hits)
// ============================================================================

fn id_list(prefix: &str, ids: &[i64]) -> (String, Vec<NamedParam>) {
    let names: Vec<String> = (0..ids.len()).map(|i| format!(":{}_{}", prefix, i)).collect();
    let params = names
        .iter()
        .zip(ids)
        .map(|(name, id)| (name.clone(), Value::Integer(*id)))
        .collect();
    (names.join(", "), params)
}

/// Scenes with the given ids
pub fn build_scene_lookup_query(ids: &[i64]) -> BuiltQuery {
    let (list, params) = id_list("scene_id", ids);
    let sql = format!(
        "SELECT {}\nFROM scenes sc\nINNER JOIN scripts s ON sc.script_id = s.id\nWHERE sc.id IN ({})",
        CONTENT_COLUMNS, list
    );
    BuiltQuery { sql, params }
}

/// Reference chunks with the given ids
pub fn build_chunk_lookup_query(ids: &[i64]) -> BuiltQuery {
    let (list, params) = id_list("chunk_id", ids);
    let sql = format!(
        "SELECT {}\n{}\nWHERE bc.id IN ({})",
        REFERENCE_COLUMNS, REFERENCE_FROM, list
    );
    BuiltQuery { sql, params }
}
