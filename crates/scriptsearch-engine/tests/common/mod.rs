//! Common test utilities for scriptsearch-engine integration tests.
//!
//! Builds a throwaway SQLite store from the engine's own schema, plus stub
//! embedding providers so the similarity stage runs without a network.

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use rusqlite::{params, Connection};
use tempfile::TempDir;

use scriptsearch_engine::schema::{entity_kinds, SCHEMA_ALL};
use scriptsearch_engine::vector::encode_embedding;
use scriptsearch_engine::{
    EmbeddingProvider, EmbeddingProviderType, EngineConfig, ProviderStatus, Result, SearchEngine,
    SearchError,
};

/// Embedding model id used by every fixture
pub const TEST_MODEL: &str = "test-model";

/// A store on disk; the directory lives as long as the fixture
pub struct Fixture {
    _dir: TempDir,
    path: PathBuf,
}

impl Fixture {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn config(&self) -> EngineConfig {
        EngineConfig::new(&self.path).with_model_id(TEST_MODEL)
    }

    pub fn lexical_engine(&self) -> SearchEngine {
        SearchEngine::lexical_only(self.config())
    }

    pub fn hybrid_engine(&self, provider: Arc<dyn EmbeddingProvider>) -> SearchEngine {
        SearchEngine::new(self.config(), Some(provider), None)
    }
}

/// Writes rows through a plain read-write connection
pub struct FixtureBuilder {
    dir: TempDir,
    path: PathBuf,
    conn: Connection,
    order: i64,
}

impl FixtureBuilder {
    pub fn new() -> Self {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let path = dir.path().join("scripts.db");
        let conn = Connection::open(&path).expect("Failed to create store");
        for statement in SCHEMA_ALL {
            conn.execute_batch(statement).expect("Failed to apply schema");
        }
        Self {
            dir,
            path,
            conn,
            order: 0,
        }
    }

    /// Store with only the given DDL applied
    pub fn with_schema(statements: &[&str]) -> Fixture {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let path = dir.path().join("scripts.db");
        let conn = Connection::open(&path).expect("Failed to create store");
        for statement in statements {
            conn.execute_batch(statement).expect("Failed to apply schema");
        }
        drop(conn);
        Fixture { _dir: dir, path }
    }

    fn next_order(&mut self) -> i64 {
        self.order += 1;
        self.order
    }

    pub fn script(&mut self, title: &str, metadata: Option<&str>) -> i64 {
        self.conn
            .execute(
                "INSERT INTO scripts (title, author, metadata) VALUES (?1, ?2, ?3)",
                params![title, "Test Writer", metadata],
            )
            .expect("Failed to insert script");
        self.conn.last_insert_rowid()
    }

    pub fn scene(
        &mut self,
        script_id: i64,
        number: i64,
        heading: &str,
        location: &str,
        time_of_day: &str,
        content: &str,
    ) -> i64 {
        self.conn
            .execute(
                "INSERT INTO scenes (script_id, scene_number, heading, location, time_of_day, content) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![script_id, number, heading, location, time_of_day, content],
            )
            .expect("Failed to insert scene");
        self.conn.last_insert_rowid()
    }

    pub fn character(&mut self, script_id: i64, name: &str) -> i64 {
        self.conn
            .execute(
                "INSERT INTO characters (script_id, name) VALUES (?1, ?2)",
                params![script_id, name],
            )
            .expect("Failed to insert character");
        self.conn.last_insert_rowid()
    }

    pub fn dialogue(
        &mut self,
        scene_id: i64,
        character_id: i64,
        text: &str,
        parenthetical: Option<&str>,
    ) -> i64 {
        let metadata =
            parenthetical.map(|p| serde_json::json!({ "parenthetical": p }).to_string());
        let order = self.next_order();
        self.conn
            .execute(
                "INSERT INTO dialogues (scene_id, character_id, dialogue_text, order_in_scene, metadata) \
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![scene_id, character_id, text, order, metadata],
            )
            .expect("Failed to insert dialogue");
        self.conn.last_insert_rowid()
    }

    pub fn action(&mut self, scene_id: i64, text: &str) -> i64 {
        let order = self.next_order();
        self.conn
            .execute(
                "INSERT INTO actions (scene_id, action_text, order_in_scene) VALUES (?1, ?2, ?3)",
                params![scene_id, text, order],
            )
            .expect("Failed to insert action");
        self.conn.last_insert_rowid()
    }

    pub fn bible(&mut self, script_id: i64, title: &str) -> i64 {
        self.conn
            .execute(
                "INSERT INTO script_bibles (script_id, title) VALUES (?1, ?2)",
                params![script_id, title],
            )
            .expect("Failed to insert bible");
        self.conn.last_insert_rowid()
    }

    pub fn chunk(&mut self, bible_id: i64, number: i64, heading: &str, content: &str) -> i64 {
        self.conn
            .execute(
                "INSERT INTO bible_chunks (bible_id, chunk_number, heading, level, content) \
                 VALUES (?1, ?2, ?3, 2, ?4)",
                params![bible_id, number, heading, content],
            )
            .expect("Failed to insert chunk");
        self.conn.last_insert_rowid()
    }

    pub fn embedding(&mut self, entity_type: &str, entity_id: i64, vector: &[f32]) {
        self.conn
            .execute(
                "INSERT INTO embeddings (entity_type, entity_id, embedding_model, embedding) \
                 VALUES (?1, ?2, ?3, ?4)",
                params![entity_type, entity_id, TEST_MODEL, encode_embedding(vector)],
            )
            .expect("Failed to insert embedding");
    }

    pub fn finish(self) -> Fixture {
        drop(self.conn);
        Fixture {
            _dir: self.dir,
            path: self.path,
        }
    }
}

/// Row ids of the standard corpus
#[derive(Debug, Clone, Copy)]
pub struct Corpus {
    /// S1E1, SARAH asks for coffee (groggy)
    pub coffee_shop: i64,
    /// S1E1, MIKE complains (annoyed)
    pub parking_lot: i64,
    /// S1E2, SARAH and the espresso machine
    pub office: i64,
    /// S2E1, another show entirely
    pub hospital: i64,
    /// Script with unparseable metadata
    pub basement: i64,
    /// Bible chunk about Sarah (mentions coffee)
    pub sarah_chunk: i64,
    /// Bible chunk about Mike
    pub mike_chunk: i64,
}

/// Standard corpus used across the integration tests.
///
/// Scene embeddings against the query vector `[1, 0, 0]`:
/// coffee_shop 1.0, parking_lot ~0.99, office 0.6, hospital 0.0, basement 0.0.
pub fn screenplay_corpus() -> (Fixture, Corpus) {
    let mut b = FixtureBuilder::new();

    let pilot = b.script("The Grind", Some(r#"{"season": 1, "episode": 1}"#));
    let sarah = b.character(pilot, "SARAH");
    let mike = b.character(pilot, "MIKE");

    let coffee_shop = b.scene(
        pilot,
        1,
        "INT. COFFEE SHOP - DAY",
        "COFFEE SHOP",
        "DAY",
        "Sarah slumps against the counter.\nSARAH\n(groggy)\nI need coffee before I face anyone.",
    );
    b.action(coffee_shop, "Sarah slumps against the counter.");
    b.dialogue(
        coffee_shop,
        sarah,
        "I need coffee before I face anyone.",
        Some("(groggy)"),
    );

    let parking_lot = b.scene(
        pilot,
        2,
        "EXT. PARKING LOT - NIGHT",
        "PARKING LOT",
        "NIGHT",
        "Rain hammers the windshield.\nMIKE\n(annoyed)\nYou're late again.",
    );
    b.action(parking_lot, "Rain hammers the windshield.");
    b.dialogue(parking_lot, mike, "You're late again.", Some("(annoyed)"));

    let second = b.script("The Grind", Some(r#"{"season": "1", "episode": "2"}"#));
    let sarah_again = b.character(second, "SARAH");
    let office = b.scene(
        second,
        1,
        "INT. OFFICE - DAY",
        "OFFICE",
        "DAY",
        "SARAH\nThe espresso machine is broken.",
    );
    b.dialogue(office, sarah_again, "The espresso machine is broken.", None);

    let other = b.script("Night Shift", Some(r#"{"season": 2, "episode": 1}"#));
    let kim = b.character(other, "NURSE KIM");
    let hospital = b.scene(
        other,
        1,
        "INT./EXT. HOSPITAL - NIGHT",
        "HOSPITAL",
        "NIGHT",
        "NURSE KIM\nAnother double shift.",
    );
    b.dialogue(hospital, kim, "Another double shift.", None);

    let broken = b.script("Lost Pages", Some("{not json"));
    let basement = b.scene(
        broken,
        1,
        "INT. BASEMENT - NIGHT",
        "BASEMENT",
        "NIGHT",
        "Dust everywhere.",
    );
    b.action(basement, "Dust everywhere.");

    let bible = b.bible(pilot, "Series Bible");
    let sarah_chunk = b.chunk(
        bible,
        1,
        "Sarah",
        "Sarah is a barista who runs on coffee and sarcasm.",
    );
    let mike_chunk = b.chunk(bible, 2, "Mike", "Mike is a mechanic with a short fuse.");

    b.embedding(entity_kinds::SCENE, coffee_shop, &[1.0, 0.0, 0.0]);
    b.embedding(entity_kinds::SCENE, parking_lot, &[0.9, 0.1, 0.0]);
    b.embedding(entity_kinds::SCENE, office, &[0.6, 0.8, 0.0]);
    b.embedding(entity_kinds::SCENE, hospital, &[0.0, 1.0, 0.0]);
    b.embedding(entity_kinds::SCENE, basement, &[0.0, 0.0, 1.0]);
    b.embedding(entity_kinds::BIBLE_CHUNK, sarah_chunk, &[1.0, 0.0, 0.0]);
    b.embedding(entity_kinds::BIBLE_CHUNK, mike_chunk, &[0.0, 1.0, 0.0]);

    let corpus = Corpus {
        coffee_shop,
        parking_lot,
        office,
        hospital,
        basement,
        sarah_chunk,
        mike_chunk,
    };
    (b.finish(), corpus)
}

/// Provider returning the same vector for every text
pub struct FixedProvider {
    vector: Vec<f32>,
    calls: AtomicUsize,
}

impl FixedProvider {
    pub fn new(vector: Vec<f32>) -> Arc<Self> {
        Arc::new(Self {
            vector,
            calls: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EmbeddingProvider for FixedProvider {
    async fn embed(&self, _text: &str, _model_id: &str) -> Result<Vec<f32>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.vector.clone())
    }

    async fn check_status(&self) -> Result<ProviderStatus> {
        Ok(ProviderStatus::healthy(EmbeddingProviderType::Custom, "fixed"))
    }

    fn provider_type(&self) -> EmbeddingProviderType {
        EmbeddingProviderType::Custom
    }
}

/// Provider that is always down
pub struct FailingProvider;

#[async_trait]
impl EmbeddingProvider for FailingProvider {
    async fn embed(&self, _text: &str, _model_id: &str) -> Result<Vec<f32>> {
        Err(SearchError::ProviderUnavailable(
            "connection refused".to_string(),
        ))
    }

    async fn check_status(&self) -> Result<ProviderStatus> {
        Ok(ProviderStatus::unavailable(
            EmbeddingProviderType::Custom,
            "connection refused",
        ))
    }

    fn provider_type(&self) -> EmbeddingProviderType {
        EmbeddingProviderType::Custom
    }
}
