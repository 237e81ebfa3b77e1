//! Stored embeddings and nearest-neighbour lookup
//!
//! Embeddings are opaque blobs of little-endian `f32` values keyed by entity
//! kind, entity id and model id. [`SqliteVectorStore`] scans the candidates of
//! one kind and model and ranks them by cosine similarity.

use std::cmp::Ordering;
use std::path::PathBuf;

use async_trait::async_trait;
use rusqlite::types::Value;
use tracing::debug;

use crate::error::{Result, SearchError};
use crate::predicate::BuiltQuery;
use crate::store::StoreConnection;

/// Encode a vector as a little-endian `f32` blob
pub fn encode_embedding(vector: &[f32]) -> Vec<u8> {
    vector.iter().flat_map(|f| f.to_le_bytes()).collect()
}

/// Decode a little-endian `f32` blob
pub fn decode_embedding(blob: &[u8]) -> Result<Vec<f32>> {
    if blob.len() % 4 != 0 {
        return Err(SearchError::VectorStore(format!(
            "embedding blob length {} is not a multiple of 4",
            blob.len()
        )));
    }
    Ok(blob
        .chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect())
}

/// Cosine similarity in `[-1, 1]`.
///
/// Zero-norm vectors, mismatched lengths and non-finite inputs all yield `0.0`.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot: f64 = a
        .iter()
        .zip(b.iter())
        .map(|(x, y)| (*x as f64) * (*y as f64))
        .sum();
    let norm_a: f64 = a.iter().map(|x| (*x as f64) * (*x as f64)).sum::<f64>().sqrt();
    let norm_b: f64 = b.iter().map(|x| (*x as f64) * (*x as f64)).sum::<f64>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    let similarity = dot / (norm_a * norm_b);
    if !similarity.is_finite() {
        return 0.0;
    }
    similarity.clamp(-1.0, 1.0) as f32
}

/// One nearest-neighbour candidate
#[derive(Debug, Clone, PartialEq)]
pub struct VectorHit {
    pub entity_id: i64,
    pub similarity: f32,
    pub raw_blob: Vec<u8>,
}

/// Nearest-neighbour lookup over stored embeddings
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Top `top_k` entities of `entity_kind`, most similar first
    async fn nearest(
        &self,
        query_vector: &[f32],
        entity_kind: &str,
        top_k: usize,
    ) -> Result<Vec<VectorHit>>;

    /// Decode a stored blob into a vector
    fn decode(&self, raw_blob: &[u8]) -> Result<Vec<f32>> {
        decode_embedding(raw_blob)
    }
}

/// Order hits by similarity descending, entity id ascending
pub fn rank_hits(hits: &mut [VectorHit]) {
    hits.sort_by(|a, b| {
        b.similarity
            .partial_cmp(&a.similarity)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.entity_id.cmp(&b.entity_id))
    });
}

/// Vector store backed by the `embeddings` relation of the structured store
#[derive(Debug, Clone)]
pub struct SqliteVectorStore {
    database_path: PathBuf,
    model_id: String,
}

impl SqliteVectorStore {
    /// Create a store reading embeddings produced by `model_id`
    pub fn new(database_path: impl Into<PathBuf>, model_id: impl Into<String>) -> Self {
        Self {
            database_path: database_path.into(),
            model_id: model_id.into(),
        }
    }

    pub fn model_id(&self) -> &str {
        &self.model_id
    }

    fn scan(&self, query_vector: &[f32], entity_kind: &str, top_k: usize) -> Result<Vec<VectorHit>> {
        let store = StoreConnection::open(&self.database_path)?;
        let built = BuiltQuery {
            sql: "SELECT entity_id, embedding FROM embeddings \
                  WHERE entity_type = :entity_type AND embedding_model = :model"
                .to_string(),
            params: vec![
                (":entity_type".to_string(), Value::Text(entity_kind.to_string())),
                (":model".to_string(), Value::Text(self.model_id.clone())),
            ],
        };
        let rows: Vec<(i64, Vec<u8>)> = store.query_rows("embedding scan", &built, |row| {
            Ok((row.get(0)?, row.get(1)?))
        })?;

        let candidates = rows.len();
        let mut hits: Vec<VectorHit> = rows
            .into_iter()
            .filter_map(|(entity_id, raw_blob)| {
                let vector = self.decode(&raw_blob).ok()?;
                if vector.len() != query_vector.len() {
                    debug!(
                        entity_id,
                        expected = query_vector.len(),
                        actual = vector.len(),
                        "Skipping embedding with mismatched dimension"
                    );
                    return None;
                }
                Some(VectorHit {
                    entity_id,
                    similarity: cosine_similarity(query_vector, &vector),
                    raw_blob,
                })
            })
            .collect();

        rank_hits(&mut hits);
        hits.truncate(top_k);

        debug!(
            entity_kind,
            candidates,
            returned = hits.len(),
            "Embedding scan complete"
        );
        Ok(hits)
    }
}

#[async_trait]
impl VectorStore for SqliteVectorStore {
    async fn nearest(
        &self,
        query_vector: &[f32],
        entity_kind: &str,
        top_k: usize,
    ) -> Result<Vec<VectorHit>> {
        if top_k == 0 {
            return Ok(Vec::new());
        }
        let this = self.clone();
        let query_vector = query_vector.to_vec();
        let entity_kind = entity_kind.to_string();

        tokio::task::spawn_blocking(move || this.scan(&query_vector, &entity_kind, top_k))
            .await
            .map_err(|e| SearchError::VectorStore(format!("embedding scan task failed: {}", e)))?
    }
}
