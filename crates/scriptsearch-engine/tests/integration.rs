//! Integration tests for scriptsearch-engine.
//!
//! Every test builds its own SQLite store in a temp directory; the similarity
//! stage uses stub providers, so nothing here needs a network.
//!
//! ## Running Tests
//!
//! ```bash
//! cargo test --package scriptsearch-engine --test integration
//! ```

mod common;

use std::collections::HashSet;

use common::{screenplay_corpus, FailingProvider, FixedProvider, FixtureBuilder};
use scriptsearch_engine::schema::SCHEMA_CREATE_SCRIPTS;
use scriptsearch_engine::store::StoreConnection;
use scriptsearch_engine::{
    cosine_similarity, EngineConfig, MatchType, Query, SearchEngine, SearchError, SearchMethod,
    SearchMode, StoreFault,
};

fn scene_ids(response: &scriptsearch_engine::SearchResponse) -> Vec<i64> {
    response.content_results.iter().map(|r| r.scene_id).collect()
}

// ============================================================================
// Lexical Search
// ============================================================================

#[tokio::test]
async fn test_dialogue_and_character() {
    let (fixture, corpus) = screenplay_corpus();
    let engine = fixture.lexical_engine();

    let query = Query::builder()
        .dialogue("coffee")
        .character("SARAH")
        .limit(10)
        .offset(0)
        .build()
        .unwrap();
    let response = engine.search(&query).await.unwrap();

    assert_eq!(scene_ids(&response), vec![corpus.coffee_shop]);
    assert_eq!(response.content_results[0].match_type, MatchType::Dialogue);
    assert_eq!(response.content_total, 1);
    assert!(!response.has_more);
}

#[tokio::test]
async fn test_exact_season_and_episode() {
    let (fixture, corpus) = screenplay_corpus();
    let engine = fixture.lexical_engine();

    let query = Query::builder().season(1).episode(2).build().unwrap();
    let response = engine.search(&query).await.unwrap();

    assert_eq!(scene_ids(&response), vec![corpus.office]);
    assert_eq!(response.content_results[0].season, Some(1));
    assert_eq!(response.content_results[0].episode, Some(2));
}

#[tokio::test]
async fn test_season_range() {
    let (fixture, corpus) = screenplay_corpus();
    let engine = fixture.lexical_engine();

    let query = Query::builder().season_range(1, 2).build().unwrap();
    let response = engine.search(&query).await.unwrap();

    let ids: HashSet<i64> = scene_ids(&response).into_iter().collect();
    let expected: HashSet<i64> = [
        corpus.coffee_shop,
        corpus.parking_lot,
        corpus.office,
        corpus.hospital,
    ]
    .into_iter()
    .collect();
    assert_eq!(ids, expected, "malformed metadata must not match a season");
}

#[tokio::test]
async fn test_season_range_with_lone_episode_constrains_seasons_only() {
    let (fixture, corpus) = screenplay_corpus();
    let engine = fixture.lexical_engine();

    let query = Query::builder().season_range(1, 2).episode(2).build().unwrap();
    let response = engine.search(&query).await.unwrap();

    let ids: HashSet<i64> = scene_ids(&response).into_iter().collect();
    let expected: HashSet<i64> = [
        corpus.coffee_shop,
        corpus.parking_lot,
        corpus.office,
        corpus.hospital,
    ]
    .into_iter()
    .collect();
    assert_eq!(ids, expected);
}

#[tokio::test]
async fn test_character_names_are_case_insensitive() {
    let (fixture, corpus) = screenplay_corpus();
    let engine = fixture.lexical_engine();

    let query = Query::builder().character("sarah").build().unwrap();
    let response = engine.search(&query).await.unwrap();

    let ids: HashSet<i64> = scene_ids(&response).into_iter().collect();
    assert_eq!(ids, HashSet::from([corpus.coffee_shop, corpus.office]));
    assert!(response
        .content_results
        .iter()
        .all(|r| r.match_type == MatchType::Character));
}

#[tokio::test]
async fn test_parenthetical_is_a_dialogue_match() {
    let (fixture, corpus) = screenplay_corpus();
    let engine = fixture.lexical_engine();

    let query = Query::builder().parenthetical("annoyed").build().unwrap();
    let response = engine.search(&query).await.unwrap();

    assert_eq!(scene_ids(&response), vec![corpus.parking_lot]);
    assert_eq!(response.content_results[0].match_type, MatchType::Dialogue);
}

#[tokio::test]
async fn test_action_text() {
    let (fixture, corpus) = screenplay_corpus();
    let engine = fixture.lexical_engine();

    let query = Query::builder().action("windshield").build().unwrap();
    let response = engine.search(&query).await.unwrap();

    assert_eq!(scene_ids(&response), vec![corpus.parking_lot]);
    assert_eq!(response.content_results[0].match_type, MatchType::Action);
}

#[tokio::test]
async fn test_location_scene_type_and_project() {
    let (fixture, corpus) = screenplay_corpus();
    let engine = fixture.lexical_engine();

    let query = Query::builder().location("parking").build().unwrap();
    let response = engine.search(&query).await.unwrap();
    assert_eq!(scene_ids(&response), vec![corpus.parking_lot]);

    let query = Query::builder().scene_type("INT/EXT").build().unwrap();
    let response = engine.search(&query).await.unwrap();
    assert_eq!(scene_ids(&response), vec![corpus.hospital]);

    let query = Query::builder().scene_type("EXT").build().unwrap();
    let response = engine.search(&query).await.unwrap();
    assert_eq!(scene_ids(&response), vec![corpus.parking_lot]);

    let query = Query::builder().project("night shift").build().unwrap();
    let response = engine.search(&query).await.unwrap();
    assert_eq!(scene_ids(&response), vec![corpus.hospital]);
}

#[tokio::test]
async fn test_like_wildcards_are_literal() {
    let (fixture, _) = screenplay_corpus();
    let engine = fixture.lexical_engine();

    let query = Query::builder().free_text("%").build().unwrap();
    let response = engine.search(&query).await.unwrap();
    assert!(response.is_empty());
}

#[tokio::test]
async fn test_highlights_point_at_the_term() {
    let (fixture, _) = screenplay_corpus();
    let engine = fixture.lexical_engine();

    let query = Query::builder().free_text("COFFEE").build().unwrap();
    let response = engine.search(&query).await.unwrap();
    let scene = &response.content_results[0];

    assert!(!scene.highlights.is_empty());
    for span in &scene.highlights {
        assert_eq!(
            scene.scene_content[span.start..span.end].to_lowercase(),
            "coffee"
        );
    }
}

#[tokio::test]
async fn test_malformed_metadata_still_returns_the_scene() {
    let (fixture, corpus) = screenplay_corpus();
    let engine = fixture.lexical_engine();

    let query = Query::builder().free_text("dust").build().unwrap();
    let response = engine.search(&query).await.unwrap();

    assert_eq!(scene_ids(&response), vec![corpus.basement]);
    assert_eq!(response.content_results[0].season, None);
    assert_eq!(response.content_results[0].episode, None);
}

#[tokio::test]
async fn test_pagination_is_consistent() {
    let (fixture, _) = screenplay_corpus();
    let engine = fixture.lexical_engine();

    let mut seen = Vec::new();
    let mut offset = 0;
    loop {
        let query = Query::builder().limit(2).offset(offset).build().unwrap();
        let response = engine.search(&query).await.unwrap();
        assert_eq!(response.content_total, 5);
        assert_eq!(
            response.has_more,
            response.content_total + response.reference_total > offset + 2
        );
        seen.extend(scene_ids(&response));
        if !response.has_more {
            break;
        }
        offset += 2;
    }

    let unique: HashSet<i64> = seen.iter().copied().collect();
    assert_eq!(seen.len(), 5);
    assert_eq!(unique.len(), 5);
}

#[tokio::test]
async fn test_overflowing_offset_is_rejected() {
    let (fixture, _) = screenplay_corpus();
    let engine = fixture.lexical_engine();

    for offset in [usize::MAX, (i64::MAX as usize) + 1, i64::MAX as usize] {
        let query = Query {
            limit: 2,
            offset,
            ..Query::default()
        };
        let err = engine.search(&query).await.unwrap_err();
        assert!(
            matches!(err, SearchError::Validation(_)),
            "offset {} gave {:?}",
            offset,
            err
        );
    }
}

#[tokio::test]
async fn test_offset_past_the_end_is_an_empty_page() {
    let (fixture, _) = screenplay_corpus();
    let engine = fixture.lexical_engine();

    let query = Query::builder().limit(2).offset(1_000_000).build().unwrap();
    let response = engine.search(&query).await.unwrap();
    assert!(response.content_results.is_empty());
    assert_eq!(response.content_total, 5);
    assert!(!response.has_more);
}

#[tokio::test]
async fn test_configured_max_limit_governs_page_size() {
    let (fixture, _) = screenplay_corpus();
    let engine = SearchEngine::lexical_only(fixture.config().with_max_limit(200));

    let query = Query::builder().limit(150).build().unwrap();
    let response = engine.search(&query).await.unwrap();
    assert_eq!(response.content_results.len(), 5);

    let query = Query::builder().limit(201).build().unwrap();
    let err = engine.search(&query).await.unwrap_err();
    assert!(matches!(err, SearchError::Validation(_)));
}

// ============================================================================
// Reference Documents
// ============================================================================

#[tokio::test]
async fn test_reference_documents_alongside_scenes() {
    let (fixture, corpus) = screenplay_corpus();
    let engine = fixture.lexical_engine();

    let query = Query::builder()
        .free_text("coffee")
        .include_reference_docs(true)
        .build()
        .unwrap();
    let response = engine.search(&query).await.unwrap();

    assert_eq!(scene_ids(&response), vec![corpus.coffee_shop]);
    assert_eq!(response.reference_results.len(), 1);
    assert_eq!(response.reference_results[0].chunk_id, corpus.sarah_chunk);
    assert_eq!(response.reference_results[0].document_title, "Series Bible");
    assert_eq!(response.total(), 2);
}

#[tokio::test]
async fn test_only_reference_documents() {
    let (fixture, corpus) = screenplay_corpus();
    let engine = fixture.lexical_engine();

    let query = Query::builder()
        .free_text("mechanic")
        .only_reference_docs()
        .build()
        .unwrap();
    let response = engine.search(&query).await.unwrap();

    assert!(response.content_results.is_empty());
    assert_eq!(response.content_total, 0);
    let ids: Vec<i64> = response.reference_results.iter().map(|r| r.chunk_id).collect();
    assert_eq!(ids, vec![corpus.mike_chunk]);
}

// ============================================================================
// Similarity Augmentation
// ============================================================================

#[tokio::test]
async fn test_strict_mode_never_embeds() {
    let (fixture, _) = screenplay_corpus();
    let provider = FixedProvider::new(vec![1.0, 0.0, 0.0]);
    let engine = fixture.hybrid_engine(provider.clone());

    let query = Query::builder()
        .free_text("nonexistent phrase")
        .mode(SearchMode::Strict)
        .build()
        .unwrap();
    let response = engine.search(&query).await.unwrap();

    assert!(response.is_empty());
    assert!(!response.has_more);
    assert_eq!(response.methods_used.len(), 1);
    assert!(response.used(SearchMethod::Lexical));
    assert_eq!(provider.calls(), 0);
}

#[tokio::test]
async fn test_lexical_hit_is_never_repeated_by_similarity() {
    let (fixture, corpus) = screenplay_corpus();
    let provider = FixedProvider::new(vec![1.0, 0.0, 0.0]);
    let engine = fixture.hybrid_engine(provider.clone());

    let query = Query::builder().dialogue("coffee").build().unwrap();
    let response = engine.search(&query).await.unwrap();

    // coffee_shop is the best vector match but was already found lexically
    assert_eq!(
        scene_ids(&response),
        vec![corpus.coffee_shop, corpus.parking_lot, corpus.office]
    );
    assert_eq!(response.content_results[0].match_type, MatchType::Dialogue);
    assert_eq!(response.content_results[0].relevance_score, None);
    for scene in &response.content_results[1..] {
        assert_eq!(scene.match_type, MatchType::Semantic);
        assert!(scene.relevance_score.unwrap() >= 0.5);
    }
    assert_eq!(response.content_total, 3);
    assert!(response.used(SearchMethod::Semantic));
    assert_eq!(provider.calls(), 1);
}

#[tokio::test]
async fn test_similarity_respects_threshold_and_filters() {
    let (fixture, corpus) = screenplay_corpus();
    let provider = FixedProvider::new(vec![1.0, 0.0, 0.0]);
    let engine = SearchEngine::new(
        fixture.config().with_similarity_threshold(0.9),
        Some(provider),
        None,
    );

    // coffee_shop and parking_lot clear 0.9; only parking_lot is EXT
    let query = Query::builder()
        .free_text("latte")
        .scene_type("EXT")
        .build()
        .unwrap();
    let response = engine.search(&query).await.unwrap();
    assert_eq!(scene_ids(&response), vec![corpus.parking_lot]);

    let query = Query::builder()
        .free_text("latte")
        .project("Night Shift")
        .build()
        .unwrap();
    let response = engine.search(&query).await.unwrap();
    assert!(response.content_results.is_empty());

    let query = Query::builder().free_text("latte").build().unwrap();
    let response = engine.search(&query).await.unwrap();
    assert_eq!(
        scene_ids(&response),
        vec![corpus.coffee_shop, corpus.parking_lot]
    );
}

#[tokio::test]
async fn test_similarity_reference_matches() {
    let (fixture, corpus) = screenplay_corpus();
    let engine = fixture.hybrid_engine(FixedProvider::new(vec![1.0, 0.0, 0.0]));

    let query = Query::builder()
        .free_text("caffeine")
        .only_reference_docs()
        .build()
        .unwrap();
    let response = engine.search(&query).await.unwrap();

    assert!(response.content_results.is_empty());
    assert_eq!(response.reference_results.len(), 1);
    let chunk = &response.reference_results[0];
    assert_eq!(chunk.chunk_id, corpus.sarah_chunk);
    assert_eq!(chunk.match_type, MatchType::Semantic);
    assert_eq!(response.reference_total, 1);
}

#[tokio::test]
async fn test_provider_failure_degrades_to_lexical() {
    let (fixture, _) = screenplay_corpus();
    let lexical = fixture.lexical_engine();
    let degraded = fixture.hybrid_engine(std::sync::Arc::new(FailingProvider));
    assert!(degraded.semantic_available());

    let query = Query::builder()
        .dialogue("coffee")
        .mode(SearchMode::Fuzzy)
        .build()
        .unwrap();
    let expected = lexical.search(&query).await.unwrap();
    let response = degraded.search(&query).await.unwrap();

    assert_eq!(response.content_results, expected.content_results);
    assert_eq!(response.content_total, expected.content_total);
    assert_eq!(response.methods_used.len(), 1);
    assert!(response.used(SearchMethod::Lexical));
}

#[tokio::test]
async fn test_semantic_disabled_by_config() {
    let (fixture, _) = screenplay_corpus();
    let provider = FixedProvider::new(vec![1.0, 0.0, 0.0]);
    let engine = SearchEngine::new(
        fixture.config().with_semantic_enabled(false),
        Some(provider.clone()),
        None,
    );
    assert!(!engine.semantic_available());

    let query = Query::builder().dialogue("coffee").build().unwrap();
    let response = engine.search(&query).await.unwrap();
    assert!(!response.used(SearchMethod::Semantic));
    assert_eq!(provider.calls(), 0);
}

#[tokio::test]
async fn test_no_duplicate_ids() {
    let (fixture, _) = screenplay_corpus();
    let engine = fixture.hybrid_engine(FixedProvider::new(vec![0.7, 0.7, 0.1]));

    for text in ["coffee", "again", "shift", "SARAH"] {
        let query = Query::builder()
            .free_text(text)
            .include_reference_docs(true)
            .mode(SearchMode::Fuzzy)
            .build()
            .unwrap();
        let response = engine.search(&query).await.unwrap();

        let scenes = scene_ids(&response);
        let unique: HashSet<i64> = scenes.iter().copied().collect();
        assert_eq!(scenes.len(), unique.len(), "duplicate scene for {:?}", text);

        let chunks: Vec<i64> = response.reference_results.iter().map(|r| r.chunk_id).collect();
        let unique: HashSet<i64> = chunks.iter().copied().collect();
        assert_eq!(chunks.len(), unique.len(), "duplicate chunk for {:?}", text);
    }
}

// ============================================================================
// Store Errors
// ============================================================================

#[tokio::test]
async fn test_missing_store_is_unavailable() {
    let engine = SearchEngine::lexical_only(EngineConfig::new("/nonexistent/dir/scripts.db"));
    let query = Query::builder().free_text("coffee").build().unwrap();

    let err = engine.search(&query).await.unwrap_err();
    assert!(matches!(err, SearchError::StoreUnavailable { .. }));
}

#[tokio::test]
async fn test_missing_relation_is_classified() {
    let fixture = FixtureBuilder::with_schema(&[SCHEMA_CREATE_SCRIPTS]);
    let engine = fixture.lexical_engine();
    let query = Query::builder().free_text("coffee").build().unwrap();

    let err = engine.search(&query).await.unwrap_err();
    match err {
        SearchError::StoreExecution { fault, .. } => {
            assert!(matches!(fault, StoreFault::MissingRelation(_)), "{:?}", fault);
        }
        other => panic!("expected a store execution error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_store_is_never_mutated() {
    let (fixture, _) = screenplay_corpus();
    let before = std::fs::read(fixture.path()).unwrap();

    let engine = fixture.hybrid_engine(FixedProvider::new(vec![1.0, 0.0, 0.0]));
    let query = Query::builder()
        .dialogue("coffee")
        .include_reference_docs(true)
        .build()
        .unwrap();
    engine.search(&query).await.unwrap();

    let store = StoreConnection::open(fixture.path()).unwrap();
    assert!(store
        .connection()
        .execute("DELETE FROM scenes", [])
        .is_err());
    drop(store);

    assert_eq!(std::fs::read(fixture.path()).unwrap(), before);
}

#[tokio::test]
async fn test_validation_rejects_oversized_limit() {
    let (fixture, _) = screenplay_corpus();
    let engine = fixture.lexical_engine();

    let query = Query {
        limit: 101,
        ..Query::default()
    };
    let err = engine.search(&query).await.unwrap_err();
    assert!(matches!(err, SearchError::Validation(_)));
}

// ============================================================================
// Similarity Math
// ============================================================================

#[test]
fn test_cosine_similarity_bounds() {
    let vectors: [&[f32]; 5] = [
        &[1.0, 0.0, 0.0],
        &[-1.0, 0.0, 0.0],
        &[0.3, -0.7, 2.5],
        &[1e-20, 1e-20, 1e-20],
        &[1e20, -1e20, 1e20],
    ];
    for a in vectors {
        for b in vectors {
            let score = cosine_similarity(a, b);
            assert!((-1.0..=1.0).contains(&score), "{} out of range", score);
        }
    }

    assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 1.0]), 0.0);
    assert_eq!(cosine_similarity(&[1.0], &[1.0, 0.0]), 0.0);
    assert!((cosine_similarity(&[1.0, 0.0], &[-1.0, 0.0]) + 1.0).abs() < 1e-6);
}
