//! Structured store schema
//!
//! The engine only reads these relations. Creation and backfill are owned by
//! the indexing pipeline; the DDL lives here so both sides (and test fixtures)
//! agree on names and columns.

/// SQL to create the scripts table
///
/// `metadata` is a JSON object; `season` and `episode` keys are read by the
/// season/episode predicate.
pub const SCHEMA_CREATE_SCRIPTS: &str = r#"
CREATE TABLE IF NOT EXISTS scripts (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    title TEXT NOT NULL,
    author TEXT,
    file_path TEXT UNIQUE,
    metadata TEXT
)
"#;

/// SQL to create the scenes table
pub const SCHEMA_CREATE_SCENES: &str = r#"
CREATE TABLE IF NOT EXISTS scenes (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    script_id INTEGER NOT NULL REFERENCES scripts(id) ON DELETE CASCADE,
    scene_number INTEGER NOT NULL,
    heading TEXT NOT NULL,
    location TEXT,
    time_of_day TEXT,
    content TEXT,
    metadata TEXT
)
"#;

/// SQL to create the characters (speakers) table
pub const SCHEMA_CREATE_CHARACTERS: &str = r#"
CREATE TABLE IF NOT EXISTS characters (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    script_id INTEGER NOT NULL REFERENCES scripts(id) ON DELETE CASCADE,
    name TEXT NOT NULL,
    UNIQUE(script_id, name)
)
"#;

/// SQL to create the dialogues (utterances) table
///
/// `metadata` is a JSON object; `parenthetical` is read by the dialogue predicate.
pub const SCHEMA_CREATE_DIALOGUES: &str = r#"
CREATE TABLE IF NOT EXISTS dialogues (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    scene_id INTEGER NOT NULL REFERENCES scenes(id) ON DELETE CASCADE,
    character_id INTEGER NOT NULL REFERENCES characters(id) ON DELETE CASCADE,
    dialogue_text TEXT NOT NULL,
    order_in_scene INTEGER NOT NULL,
    metadata TEXT
)
"#;

/// SQL to create the actions (narration) table
pub const SCHEMA_CREATE_ACTIONS: &str = r#"
CREATE TABLE IF NOT EXISTS actions (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    scene_id INTEGER NOT NULL REFERENCES scenes(id) ON DELETE CASCADE,
    action_text TEXT NOT NULL,
    order_in_scene INTEGER NOT NULL
)
"#;

/// SQL to create the reference documents ("bibles") table
pub const SCHEMA_CREATE_BIBLES: &str = r#"
CREATE TABLE IF NOT EXISTS script_bibles (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    script_id INTEGER NOT NULL REFERENCES scripts(id) ON DELETE CASCADE,
    title TEXT NOT NULL,
    file_path TEXT,
    metadata TEXT
)
"#;

/// SQL to create the reference document chunks table
pub const SCHEMA_CREATE_BIBLE_CHUNKS: &str = r#"
CREATE TABLE IF NOT EXISTS bible_chunks (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    bible_id INTEGER NOT NULL REFERENCES script_bibles(id) ON DELETE CASCADE,
    chunk_number INTEGER NOT NULL,
    heading TEXT,
    level INTEGER,
    content TEXT NOT NULL
)
"#;

/// SQL to create the embeddings table
///
/// `embedding` is a blob of little-endian `f32` values; see
/// [`crate::vector::encode_embedding`].
pub const SCHEMA_CREATE_EMBEDDINGS: &str = r#"
CREATE TABLE IF NOT EXISTS embeddings (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    entity_type TEXT NOT NULL,
    entity_id INTEGER NOT NULL,
    embedding_model TEXT NOT NULL,
    embedding BLOB NOT NULL,
    UNIQUE(entity_type, entity_id, embedding_model)
)
"#;

/// SQL to create indexes used by the read paths
pub const SCHEMA_CREATE_INDEXES: &str = r#"
CREATE INDEX IF NOT EXISTS idx_scenes_script ON scenes(script_id);
CREATE INDEX IF NOT EXISTS idx_dialogues_scene ON dialogues(scene_id);
CREATE INDEX IF NOT EXISTS idx_dialogues_character ON dialogues(character_id);
CREATE INDEX IF NOT EXISTS idx_actions_scene ON actions(scene_id);
CREATE INDEX IF NOT EXISTS idx_bible_chunks_bible ON bible_chunks(bible_id);
CREATE INDEX IF NOT EXISTS idx_embeddings_lookup ON embeddings(entity_type, embedding_model);
"#;

/// Every create statement, in dependency order
pub const SCHEMA_ALL: [&str; 9] = [
    SCHEMA_CREATE_SCRIPTS,
    SCHEMA_CREATE_SCENES,
    SCHEMA_CREATE_CHARACTERS,
    SCHEMA_CREATE_DIALOGUES,
    SCHEMA_CREATE_ACTIONS,
    SCHEMA_CREATE_BIBLES,
    SCHEMA_CREATE_BIBLE_CHUNKS,
    SCHEMA_CREATE_EMBEDDINGS,
    SCHEMA_CREATE_INDEXES,
];

/// Entity kinds stored in `embeddings.entity_type`
pub mod entity_kinds {
    pub const SCENE: &str = "scene";
    pub const BIBLE_CHUNK: &str = "bible_chunk";
}

/// Column list for content queries (in order for row mapping)
pub const CONTENT_COLUMNS: &str = "s.id AS script_id, s.title AS script_title, \
     s.author AS script_author, s.metadata AS script_metadata, sc.id AS scene_id, \
     sc.scene_number, sc.heading AS scene_heading, sc.location AS scene_location, \
     sc.time_of_day AS scene_time, sc.content AS scene_content";

/// Column list for reference-document queries (in order for row mapping)
pub const REFERENCE_COLUMNS: &str = "s.id AS script_id, s.title AS script_title, \
     b.id AS bible_id, b.title AS bible_title, bc.id AS chunk_id, \
     bc.heading AS chunk_heading, bc.level AS chunk_level, bc.content AS chunk_content";

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::Connection;

    #[test]
    fn test_schema_creates_tables() {
        let conn = Connection::open_in_memory().unwrap();
        for statement in SCHEMA_ALL {
            conn.execute_batch(statement).unwrap();
        }

        let tables: Vec<String> = conn
            .prepare("SELECT name FROM sqlite_master WHERE type='table' ORDER BY name")
            .unwrap()
            .query_map([], |row| row.get(0))
            .unwrap()
            .collect::<Result<_, _>>()
            .unwrap();

        for expected in [
            "actions",
            "bible_chunks",
            "characters",
            "dialogues",
            "embeddings",
            "scenes",
            "script_bibles",
            "scripts",
        ] {
            assert!(tables.contains(&expected.to_string()), "missing {}", expected);
        }
    }

    #[test]
    fn test_content_columns_select() {
        let conn = Connection::open_in_memory().unwrap();
        for statement in SCHEMA_ALL {
            conn.execute_batch(statement).unwrap();
        }
        let sql = format!(
            "SELECT {} FROM scenes sc INNER JOIN scripts s ON sc.script_id = s.id",
            CONTENT_COLUMNS
        );
        assert!(conn.prepare(&sql).is_ok());

        let sql = format!(
            "SELECT {} FROM bible_chunks bc \
             INNER JOIN script_bibles b ON bc.bible_id = b.id \
             INNER JOIN scripts s ON b.script_id = s.id",
            REFERENCE_COLUMNS
        );
        assert!(conn.prepare(&sql).is_ok());
    }
}
