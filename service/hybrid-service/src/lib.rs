pub mod actions;
pub mod api;
pub mod auto_indexer;
pub mod config;
pub mod context;
pub mod ingest;
pub mod search;
pub mod task_queue;
pub mod vlm;
pub mod watcher;

use std::path::PathBuf;
use std::sync::Arc;

use chrono::Utc;
use chunk_model::{ChunkId, ChunkRecord, DocumentId};
use chunking_store::{FilterClause, SearchHit};
use embedding_provider::config::default_stdio_config;
use embedding_provider::embedder::{Embedder, OnnxStdIoConfig, OnnxStdIoEmbedder};

use context::Context;
use vlm::VlmClient;

/// Error taxonomy per spec §7. Each variant names one failure class a
/// caller (HTTP layer, CLI, auto-indexer) needs to branch on; `to_status_code`
/// maps them onto the HTTP status the `/api/*` routes should report.
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("file not found: {0}")]
    FileNotFound(String),
    #[error("unsupported file type: {0}")]
    UnsupportedFileType(String),
    #[error("repo error: {0}")]
    Repo(String),
    #[error("indexing error: {0}")]
    Index(String),
    #[error("search error: {0}")]
    Search(String),
    #[error("upstream unavailable: {0}")]
    UpstreamUnavailable(String),
    #[error("embedding error: {0}")]
    Embed(String),
    #[error("transcription error: {0}")]
    Transcription(String),
    #[error("VLM call timed out")]
    VlmTimeout,
    #[error("io error: {0}")]
    Io(String),
}

impl ServiceError {
    pub fn to_status_code(&self) -> u16 {
        match self {
            ServiceError::FileNotFound(_) => 404,
            ServiceError::UnsupportedFileType(_) => 400,
            ServiceError::UpstreamUnavailable(_) => 503,
            ServiceError::VlmTimeout => 504,
            ServiceError::Repo(_) | ServiceError::Index(_) | ServiceError::Search(_) | ServiceError::Embed(_) | ServiceError::Transcription(_) | ServiceError::Io(_) => 500,
        }
    }
}

impl From<vlm::VlmError> for ServiceError {
    fn from(e: vlm::VlmError) -> Self {
        match e {
            vlm::VlmError::Timeout => ServiceError::VlmTimeout,
            vlm::VlmError::NoVlmAvailable => ServiceError::UpstreamUnavailable("no VLM model available".into()),
            vlm::VlmError::Failed(msg) => ServiceError::Transcription(msg),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub db_path: PathBuf,
    pub hnsw_dir: Option<PathBuf>,
    pub embedder: OnnxStdIoConfig,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from("target/demo/chunks.db"),
            hnsw_dir: None,
            embedder: default_stdio_config(),
        }
    }
}

/// A [`VlmClient`] that always reports unavailable; used where the caller
/// has not configured a real VLM endpoint (e.g. `ingest_text`/`ingest_chunks`
/// paths, which never touch the VLM).
struct NoVlmClient;

impl VlmClient for NoVlmClient {
    fn describe(&self, _image: &std::path::Path, _prompt: Option<&str>) -> Result<String, vlm::VlmError> {
        Err(vlm::VlmError::NoVlmAvailable)
    }
    fn extract_text(&self, _image: &std::path::Path) -> Result<String, vlm::VlmError> {
        Err(vlm::VlmError::NoVlmAvailable)
    }
}

/// Thin facade kept for backward-compatible direct use (the CLI demo in
/// `examples/ingest_and_search.rs`); `Context` plus `search`/`ingest` is the
/// API the HTTP layer and the auto-indexer build on.
pub struct HybridService {
    ctx: Context,
}

impl HybridService {
    pub fn new(cfg: ServiceConfig) -> Result<Self, ServiceError> {
        let mut settings = config::Settings::default();
        settings.data_dir = cfg.db_path.parent().map(|p| p.to_path_buf()).unwrap_or_else(|| PathBuf::from("."));
        let embedder: Arc<dyn Embedder> = Arc::new(
            OnnxStdIoEmbedder::new(cfg.embedder.clone()).map_err(|e| ServiceError::Embed(e.to_string()))?,
        );
        let ctx = Context::build(settings, embedder, Arc::new(NoVlmClient))?;
        if let Some(dir) = cfg.hnsw_dir {
            return Ok(Self { ctx: Context { hnsw_dir: dir, ..ctx } });
        }
        Ok(Self { ctx })
    }

    /// Ingest pre-built chunks with optional precomputed vectors.
    pub fn ingest_chunks(&self, records: &[ChunkRecord], vectors: Option<&[(ChunkId, Vec<f32>)]>) -> Result<(), ServiceError> {
        if records.is_empty() {
            return Ok(());
        }
        let mut repo = self.ctx.open_repo()?;
        let fts = chunking_store::fts5_index::Fts5Index::new();
        let text_m: [&dyn chunking_store::TextIndexMaintainer; 1] = [&fts];
        let mut hnsw = self.ctx.load_hnsw()?;
        let mut vec_m: [&mut dyn chunking_store::VectorIndexMaintainer; 1] = [&mut hnsw];

        chunking_store::orchestrator::ingest_chunks_orchestrated(&mut repo, records, &text_m, &mut vec_m, vectors)
            .map_err(|e| ServiceError::Index(e.to_string()))?;
        if vectors.is_some() {
            self.ctx.save_hnsw(&hnsw)?;
        }
        Ok(())
    }

    /// Ingest a file by path: chunk -> embed -> upsert -> index. With no
    /// `doc_id_hint`, this delegates to [`ingest::ingest_path`] so the
    /// content-hash dedup short-circuit applies (spec Testable Property 1,
    /// Scenario S1). A hint forces Document identity explicitly, which
    /// bypasses that reuse-by-hash lookup.
    pub fn ingest_file(&self, path: &str, doc_id_hint: Option<&str>) -> Result<(), ServiceError> {
        let Some(hint) = doc_id_hint else {
            return ingest::ingest_path(&self.ctx, path);
        };
        let mut out = file_chunker::chunk_file_with_file_record(path);
        let now = Utc::now().to_rfc3339();
        out.file.doc_id = DocumentId(hint.to_string());
        for rec in &mut out.chunks {
            rec.doc_id = DocumentId(hint.to_string());
            rec.extracted_at = now.clone();
        }
        ingest::ingest_chunk_output(&self.ctx, out)
    }

    /// Ingest a single text snippet as one chunk.
    pub fn ingest_text(&self, text: &str, doc_id_hint: Option<&str>) -> Result<(DocumentId, ChunkId), ServiceError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(ServiceError::Embed("text is empty".into()));
        }
        let (doc_id, chunk_id) = make_ids_from_text(doc_id_hint, text);
        let rec = ChunkRecord {
            schema_version: chunk_model::SCHEMA_MAJOR,
            doc_id: doc_id.clone(),
            chunk_id: chunk_id.clone(),
            chunk_index: 0,
            source_uri: "user://input".into(),
            source_mime: "text/plain".into(),
            extracted_at: Utc::now().to_rfc3339(),
            page_start: None,
            page_end: None,
            start_time: None,
            end_time: None,
            text: text.to_string(),
            section_path: None,
            meta: std::collections::BTreeMap::new(),
            extra: std::collections::BTreeMap::new(),
        };
        let vec = self.ctx.embedder.embed(text).map_err(|e| ServiceError::Embed(e.to_string()))?;
        let vectors = vec![(rec.chunk_id.clone(), vec)];
        self.ingest_chunks(&[rec], Some(&vectors))?;
        Ok((doc_id, chunk_id))
    }

    /// Text-only search via the lexical index, with filters.
    pub fn search_text(&self, query: &str, top_k: usize, filters: &[FilterClause]) -> Result<Vec<SearchHit>, ServiceError> {
        search::search_text(&self.ctx, query, top_k, filters)
    }

    /// Hybrid search: fuse lexical and vector ranked lists with RRF.
    pub fn search_hybrid(&self, query: &str, top_k: usize, filters: &[FilterClause]) -> Result<Vec<SearchHit>, ServiceError> {
        search::search_hybrid(&self.ctx, query, top_k, filters)
    }

    /// Delete by filters across DB and both indexes.
    pub fn delete_by_filter(&self, filters: &[FilterClause], batch_size: usize) -> Result<chunking_store::orchestrator::DeleteReport, ServiceError> {
        let mut repo = self.ctx.open_repo()?;
        let fts = chunking_store::fts5_index::Fts5Index::new();
        let text_m: [&dyn chunking_store::TextIndexMaintainer; 1] = [&fts];
        let mut hnsw = self.ctx.load_hnsw()?;
        let mut vec_m: [&mut dyn chunking_store::VectorIndexMaintainer; 1] = [&mut hnsw];

        let rep = chunking_store::orchestrator::delete_by_filter_orchestrated(&mut repo, filters, batch_size, &text_m, &mut vec_m)
            .map_err(|e| ServiceError::Index(e.to_string()))?;
        self.ctx.save_hnsw(&hnsw)?;
        Ok(rep)
    }

    /// Quick sanity/check API: counts for chunks and FTS mirror.
    pub fn repo_counts(&self) -> Result<(i64, i64), ServiceError> {
        let repo = self.ctx.open_repo()?;
        repo.counts().map_err(|e| ServiceError::Repo(e.to_string()))
    }

    pub fn context(&self) -> &Context {
        &self.ctx
    }
}

fn make_ids_from_text(doc_hint: Option<&str>, text: &str) -> (DocumentId, ChunkId) {
    if let Some(h) = doc_hint {
        if !h.trim().is_empty() {
            return (DocumentId(h.to_string()), ChunkId(format!("{}#0", h)));
        }
    }
    use std::hash::{Hash, Hasher};
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    text.hash(&mut hasher);
    let h = hasher.finish();
    let ts = Utc::now().timestamp_millis();
    let doc_id = format!("doc-{ts:x}-{h:08x}");
    let chunk_id = format!("{}#0", doc_id);
    (DocumentId(doc_id), ChunkId(chunk_id))
}
