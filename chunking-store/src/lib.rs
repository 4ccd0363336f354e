//! Dual-store persistence: a SQLite-backed primary/lexical store plus
//! pluggable full-text (FTS5 or Tantivy) and vector (HNSW) indexes, wired
//! together by [`orchestrator`].

pub mod fts5_index;
pub mod hnsw_index;
pub mod orchestrator;
pub mod sqlite_repo;
pub mod tantivy_index;

use std::any::Any;

use chrono::{DateTime, Utc};
use chunk_model::{ChunkId, ChunkRecord, DocumentId, FileRecord, MediaType};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serde error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("index error: {0}")]
    Index(String),
    #[error("not found")]
    NotFound,
}

/// How a [`FilterClause`] participates in query planning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterKind {
    /// Must be satisfied; safe to push down as a hard constraint.
    Must,
    /// Prefer to push down as a pre-filter if the index supports it;
    /// otherwise apply as a post-filter.
    PreferPre,
}

#[derive(Debug, Clone)]
pub enum FilterOp {
    DocIdEq(String),
    DocIdIn(Vec<String>),
    SourceUriPrefix(String),
    MediaTypeEq(String),
    RangeIsoDate {
        key: String,
        start: Option<String>,
        end: Option<String>,
        start_incl: bool,
        end_incl: bool,
    },
}

#[derive(Debug, Clone)]
pub struct FilterClause {
    pub kind: FilterKind,
    pub op: FilterOp,
}

impl FilterClause {
    pub fn doc_id_eq(id: impl Into<String>) -> Self {
        Self { kind: FilterKind::Must, op: FilterOp::DocIdEq(id.into()) }
    }

    pub fn source_uri_prefix(prefix: impl Into<String>) -> Self {
        Self { kind: FilterKind::PreferPre, op: FilterOp::SourceUriPrefix(prefix.into()) }
    }

    pub fn media_type_eq(media_type: MediaType) -> Self {
        Self {
            kind: FilterKind::PreferPre,
            op: FilterOp::MediaTypeEq(media_type.as_str().to_string()),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct SearchOptions {
    pub top_k: usize,
    /// Over-fetch multiplier applied before post-filtering / fusion.
    pub fetch_factor: usize,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self { top_k: 10, fetch_factor: 10 }
    }
}

#[derive(Debug, Clone)]
pub struct SearchHit {
    pub chunk: ChunkRecord,
    pub score: f32,
}

#[derive(Debug, Clone)]
pub struct TextMatch {
    pub chunk_id: ChunkId,
    /// Score already normalized into a comparable "higher is better" scale.
    pub score: f32,
    /// The engine's native score (e.g. tantivy's raw BM25-ish score) before
    /// normalization, kept for debugging.
    pub raw_score: f32,
}

#[derive(Debug, Clone)]
pub struct VectorMatch {
    pub chunk_id: ChunkId,
    /// `1 - cosine_distance`, i.e. higher is better.
    pub score: f32,
    pub distance: f32,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct IndexCaps {
    pub can_prefilter_doc_id_eq: bool,
    pub can_prefilter_doc_id_in: bool,
    pub can_prefilter_source_prefix: bool,
    pub can_prefilter_meta: bool,
    pub can_prefilter_range_numeric: bool,
    pub can_prefilter_range_date: bool,
}

/// Read-only accessor every text/vector index needs to materialize full
/// records from the ids it finds.
pub trait ChunkStoreRead {
    fn get_chunks_by_ids(&self, ids: &[ChunkId]) -> Result<Vec<ChunkRecord>, StoreError>;
    fn as_any(&self) -> &dyn Any;
}

/// Primary store contract the orchestrator drives; implemented by
/// [`sqlite_repo::SqliteRepo`].
pub trait ChunkPrimaryStore {
    fn upsert_chunks(&mut self, records: Vec<ChunkRecord>) -> Result<(), StoreError>;
    fn delete_by_ids(&mut self, ids: &[ChunkId]) -> Result<usize, StoreError>;
    fn list_chunk_ids_by_filter(
        &self,
        filters: &[FilterClause],
        limit: usize,
        offset: usize,
    ) -> Result<Vec<ChunkId>, StoreError>;
}

pub trait TextSearcher {
    fn name(&self) -> &'static str;
    fn caps(&self) -> IndexCaps;
    fn search_ids(
        &self,
        store: &dyn ChunkStoreRead,
        query: &str,
        filters: &[FilterClause],
        opts: &SearchOptions,
    ) -> Vec<TextMatch>;
}

pub trait VectorSearcher {
    fn name(&self) -> &'static str;
    fn caps(&self) -> IndexCaps;
    fn knn_ids(
        &self,
        store: &dyn ChunkStoreRead,
        query_vector: &[f32],
        filters: &[FilterClause],
        opts: &SearchOptions,
    ) -> Vec<VectorMatch>;
}

/// Kept-current-side-effect interface an index exposes to the orchestrator:
/// it never searches for the orchestrator, only mirrors writes.
pub trait TextIndexMaintainer {
    fn upsert(&self, records: &[ChunkRecord]) -> Result<(), StoreError>;
    fn delete_by_ids(&self, ids: &[ChunkId]) -> Result<(), StoreError>;
}

pub trait VectorIndexMaintainer {
    fn upsert_vectors(&mut self, vectors: &[(ChunkId, Vec<f32>)]) -> Result<(), StoreError>;
    fn delete_by_ids(&mut self, ids: &[ChunkId]) -> Result<(), StoreError>;
}

/// Aggregate counters for `/api/documents/stats` (spec §6), restored from
/// `storage/sqlite_client.py`'s stats aggregate.
#[derive(Debug, Clone, Default)]
pub struct DocumentStats {
    pub total_documents: i64,
    pub by_media_type: Vec<(String, i64)>,
    pub total_chunks: i64,
    pub last_indexed_at: Option<DateTime<Utc>>,
}

/// One row of the transcript table (spec §3 `Transcript`).
#[derive(Debug, Clone)]
pub struct TranscriptRecord {
    pub id: String,
    pub document_id: DocumentId,
    pub full_text: String,
    pub language: String,
    pub duration_seconds: f64,
    pub word_count: i64,
}
