use std::cmp::Ordering;
use std::collections::BTreeMap;

use rusqlite::params_from_iter;
use rusqlite::types::Value as SqlValue;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, warn};
use twiga_common::{ContentType, Error, Result};

use crate::models::{Chunk, NewChunk};
use crate::store::{TwigaStore, decode_column, format_timestamp};

/// Chunk columns that may appear in a search filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChunkField {
    ResourceId,
    ContentType,
    TopLevelSectionIndex,
    TopLevelSectionTitle,
}

impl ChunkField {
    fn column(&self) -> &'static str {
        match self {
            Self::ResourceId => "resource_id",
            Self::ContentType => "content_type",
            Self::TopLevelSectionIndex => "top_level_section_index",
            Self::TopLevelSectionTitle => "top_level_section_title",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FilterValue {
    Int(i64),
    Text(String),
}

impl From<i64> for FilterValue {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<&str> for FilterValue {
    fn from(v: &str) -> Self {
        Self::Text(v.to_string())
    }
}

impl From<String> for FilterValue {
    fn from(v: String) -> Self {
        Self::Text(v)
    }
}

impl From<ContentType> for FilterValue {
    fn from(v: ContentType) -> Self {
        Self::Text(v.as_str().to_string())
    }
}

impl FilterValue {
    fn to_sql(&self) -> SqlValue {
        match self {
            Self::Int(v) => SqlValue::Integer(*v),
            Self::Text(v) => SqlValue::Text(v.clone()),
        }
    }
}

/// Field to accepted values. One value filters by equality, several by
/// membership; an empty list matches nothing.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChunkFilter {
    clauses: BTreeMap<ChunkField, Vec<FilterValue>>,
}

impl ChunkFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with<V: Into<FilterValue>>(
        mut self,
        field: ChunkField,
        values: impl IntoIterator<Item = V>,
    ) -> Self {
        self.clauses
            .insert(field, values.into_iter().map(Into::into).collect());
        self
    }

    fn where_clause(&self) -> (String, Vec<SqlValue>) {
        if self.clauses.is_empty() {
            return (String::new(), Vec::new());
        }

        let mut parts = Vec::with_capacity(self.clauses.len());
        let mut params = Vec::new();
        for (field, values) in &self.clauses {
            match values.as_slice() {
                [] => parts.push("0".to_string()),
                [single] => {
                    parts.push(format!("{} = ?", field.column()));
                    params.push(single.to_sql());
                }
                many => {
                    let placeholders = vec!["?"; many.len()].join(", ");
                    parts.push(format!("{} IN ({placeholders})", field.column()));
                    params.extend(many.iter().map(FilterValue::to_sql));
                }
            }
        }

        (format!(" WHERE {}", parts.join(" AND ")), params)
    }
}

/// A search hit with its cosine distance to the query (0 = identical).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredChunk {
    pub chunk: Chunk,
    pub distance: f32,
}

impl TwigaStore {
    /// Store a batch of chunks in one transaction. Returns the number inserted.
    pub async fn insert_chunks(&self, chunks: Vec<NewChunk>) -> Result<usize> {
        if chunks.is_empty() {
            return Ok(0);
        }

        self.insert_chunks_sync(&chunks).inspect_err(|e| {
            error!("failed to insert {} chunks: {e}", chunks.len());
        })
    }

    /// Nearest-neighbour search by ascending cosine distance over chunks that
    /// pass `filter`. Chunks whose embedding dimension differs from the query
    /// are skipped.
    pub async fn search_chunks(
        &self,
        query_embedding: &[f32],
        n_results: usize,
        filter: &ChunkFilter,
    ) -> Result<Vec<ScoredChunk>> {
        if n_results == 0 || query_embedding.is_empty() {
            return Ok(Vec::new());
        }

        let candidates = self.load_candidates_sync(filter).inspect_err(|e| {
            error!("failed to search for knowledge: {e}");
        })?;

        let total = candidates.len();
        let mut scored: Vec<ScoredChunk> = candidates
            .into_iter()
            .filter_map(|(chunk, embedding)| {
                if embedding.len() != query_embedding.len() {
                    return None;
                }
                Some(ScoredChunk {
                    distance: cosine_distance(query_embedding, &embedding),
                    chunk,
                })
            })
            .collect();

        if scored.len() < total {
            warn!(
                "skipped {} chunks with mismatched embedding dimensions",
                total - scored.len()
            );
        }

        scored.sort_by(|a, b| {
            a.distance
                .partial_cmp(&b.distance)
                .unwrap_or(Ordering::Equal)
                .then(a.chunk.id.cmp(&b.chunk.id))
        });
        scored.truncate(n_results);
        debug!("vector search returned {} of {total} candidates", scored.len());

        Ok(scored)
    }

    fn insert_chunks_sync(&self, chunks: &[NewChunk]) -> Result<usize> {
        let mut conn = self.connection()?;
        let tx = conn
            .transaction()
            .map_err(|e| Error::Database(format!("failed to begin transaction: {e}")))?;
        let created_at = format_timestamp(chrono::Utc::now());

        {
            let mut stmt = tx
                .prepare(
                    "INSERT INTO chunks (
                        resource_id, content, content_type, top_level_section_index,
                        top_level_section_title, embedding, created_at
                    ) VALUES (?, ?, ?, ?, ?, ?, ?)",
                )
                .map_err(|e| Error::Database(format!("failed to prepare chunk insert: {e}")))?;

            for chunk in chunks {
                if chunk.embedding.is_empty() {
                    return Err(Error::Database("chunk embedding cannot be empty".into()));
                }
                stmt.execute(rusqlite::params![
                    chunk.resource_id,
                    chunk.content,
                    chunk.content_type.as_str(),
                    chunk.top_level_section_index,
                    chunk.top_level_section_title,
                    embedding_to_blob(&chunk.embedding),
                    created_at,
                ])
                .map_err(|e| Error::Database(format!("failed to insert chunk: {e}")))?;
            }
        }

        tx.commit()
            .map_err(|e| Error::Database(format!("failed to commit chunks: {e}")))?;
        Ok(chunks.len())
    }

    fn load_candidates_sync(&self, filter: &ChunkFilter) -> Result<Vec<(Chunk, Vec<f32>)>> {
        let (where_sql, params) = filter.where_clause();
        let sql = format!(
            "SELECT id, resource_id, content, content_type, top_level_section_index,
                    top_level_section_title, embedding
             FROM chunks{where_sql}"
        );

        let conn = self.connection()?;
        let mut stmt = conn
            .prepare(&sql)
            .map_err(|e| Error::Database(format!("failed to prepare chunk query: {e}")))?;

        let rows = stmt
            .query_map(params_from_iter(params), |row| {
                let blob: Vec<u8> = row.get(6)?;
                let embedding = blob_to_embedding(&blob).map_err(|e| {
                    rusqlite::Error::FromSqlConversionFailure(
                        6,
                        rusqlite::types::Type::Blob,
                        Box::new(std::io::Error::other(e.to_string())),
                    )
                })?;
                let chunk = Chunk {
                    id: row.get(0)?,
                    resource_id: row.get(1)?,
                    content: row.get(2)?,
                    content_type: decode_column(row, 3)?,
                    top_level_section_index: row.get(4)?,
                    top_level_section_title: row.get(5)?,
                };
                Ok((chunk, embedding))
            })
            .map_err(|e| Error::Database(format!("failed to execute chunk query: {e}")))?;

        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| Error::Database(format!("failed to collect chunk rows: {e}")))
    }
}

pub(crate) fn embedding_to_blob(embedding: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(embedding.len() * 4);
    for v in embedding {
        bytes.extend(v.to_le_bytes());
    }
    bytes
}

pub(crate) fn blob_to_embedding(blob: &[u8]) -> Result<Vec<f32>> {
    if !blob.len().is_multiple_of(4) {
        return Err(Error::Database("invalid embedding blob length".into()));
    }

    let mut out = Vec::with_capacity(blob.len() / 4);
    for chunk in blob.chunks_exact(4) {
        out.push(f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]));
    }
    Ok(out)
}

/// `1 - cosine_similarity`, in `[0, 2]`. A zero vector counts as orthogonal
/// to everything (distance 1).
pub(crate) fn cosine_distance(a: &[f32], b: &[f32]) -> f32 {
    let mut dot = 0.0;
    let mut norm_a = 0.0;
    let mut norm_b = 0.0;

    for (x, y) in a.iter().zip(b) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    if norm_a == 0.0 || norm_b == 0.0 {
        return 1.0;
    }

    1.0 - dot / (norm_a.sqrt() * norm_b.sqrt())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::NewResource;

    async fn seeded_store() -> (TwigaStore, i64, i64) {
        let store = TwigaStore::in_memory().expect("failed to create in-memory store");
        let geo = store
            .create_resource(NewResource {
                name: "Geography Form 2".to_string(),
                resource_type: "textbook".to_string(),
                authors: vec![],
                grade_levels: vec![],
                subjects: vec![],
                file_location: None,
            })
            .await
            .expect("resource should insert");
        let bio = store
            .create_resource(NewResource {
                name: "Biology Form 2".to_string(),
                resource_type: "textbook".to_string(),
                authors: vec![],
                grade_levels: vec![],
                subjects: vec![],
                file_location: None,
            })
            .await
            .expect("resource should insert");

        let chunk = |resource_id: i64, content: &str, kind: ContentType, embedding: Vec<f32>| {
            NewChunk {
                resource_id,
                content: content.to_string(),
                content_type: kind,
                top_level_section_index: None,
                top_level_section_title: None,
                embedding,
            }
        };

        store
            .insert_chunks(vec![
                chunk(geo.id, "rivers", ContentType::Text, vec![1.0, 0.0, 0.0]),
                chunk(geo.id, "mountains", ContentType::Text, vec![0.7, 0.7, 0.0]),
                chunk(geo.id, "river exercise", ContentType::Exercise, vec![0.9, 0.1, 0.0]),
                chunk(bio.id, "cells", ContentType::Text, vec![1.0, 0.05, 0.0]),
            ])
            .await
            .expect("chunks should insert");

        (store, geo.id, bio.id)
    }

    #[tokio::test]
    async fn search_orders_by_ascending_distance() {
        let (store, _, _) = seeded_store().await;
        let hits = store
            .search_chunks(&[1.0, 0.0, 0.0], 3, &ChunkFilter::new())
            .await
            .expect("search should succeed");

        let contents: Vec<&str> = hits.iter().map(|h| h.chunk.content.as_str()).collect();
        assert_eq!(contents, vec!["rivers", "cells", "river exercise"]);
        assert!(hits.windows(2).all(|w| w[0].distance <= w[1].distance));
    }

    #[tokio::test]
    async fn search_applies_equality_and_membership_filters() {
        let (store, geo, bio) = seeded_store().await;

        let text_in_geo = ChunkFilter::new()
            .with(ChunkField::ResourceId, [geo])
            .with(ChunkField::ContentType, [ContentType::Text]);
        let hits = store
            .search_chunks(&[1.0, 0.0, 0.0], 10, &text_in_geo)
            .await
            .expect("search should succeed");
        assert_eq!(hits.len(), 2);
        assert!(hits.iter().all(|h| h.chunk.resource_id == geo));
        assert!(hits.iter().all(|h| h.chunk.content_type == ContentType::Text));

        let both = ChunkFilter::new().with(ChunkField::ResourceId, [geo, bio]);
        let hits = store
            .search_chunks(&[1.0, 0.0, 0.0], 10, &both)
            .await
            .expect("search should succeed");
        assert_eq!(hits.len(), 4);
    }

    #[tokio::test]
    async fn empty_value_list_matches_nothing() {
        let (store, _, _) = seeded_store().await;
        let filter = ChunkFilter::new().with(ChunkField::ResourceId, Vec::<i64>::new());
        let hits = store
            .search_chunks(&[1.0, 0.0, 0.0], 10, &filter)
            .await
            .expect("search should succeed");
        assert!(hits.is_empty());
    }

    #[tokio::test]
    async fn mismatched_dimensions_are_skipped() {
        let (store, _, _) = seeded_store().await;
        let hits = store
            .search_chunks(&[1.0, 0.0], 10, &ChunkFilter::new())
            .await
            .expect("search should succeed");
        assert!(hits.is_empty());
    }

    #[test]
    fn where_clause_uses_in_for_multiple_values() {
        let filter = ChunkFilter::new()
            .with(ChunkField::ResourceId, [1_i64, 2, 3])
            .with(ChunkField::ContentType, ["text"]);
        let (sql, params) = filter.where_clause();
        assert_eq!(sql, " WHERE resource_id IN (?, ?, ?) AND content_type = ?");
        assert_eq!(params.len(), 4);
    }

    #[test]
    fn blob_round_trip_rejects_truncated_input() {
        let blob = embedding_to_blob(&[0.25, -1.5]);
        assert_eq!(blob_to_embedding(&blob).expect("valid blob"), vec![0.25, -1.5]);
        assert!(blob_to_embedding(&blob[..5]).is_err());
    }

    #[test]
    fn cosine_distance_spans_zero_to_two() {
        assert!((cosine_distance(&[1.0, 0.0], &[0.0, 1.0]) - 1.0).abs() < f32::EPSILON);
        assert!((cosine_distance(&[1.0, 0.0], &[-3.0, 0.0]) - 2.0).abs() < 1e-6);
        assert!(cosine_distance(&[2.0, 0.0], &[1.0, 0.0]).abs() < 1e-6);
        assert_eq!(cosine_distance(&[0.0, 0.0], &[1.0, 0.0]), 1.0);
    }
}
