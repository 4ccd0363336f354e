//! Shared ingest/delete plumbing used by both `HybridService`'s direct API
//! and the auto-indexer's task handler, so the two don't drift.

use std::path::Path;

use chunk_model::{ChunkId, DocumentId};
use chunking_store::fts5_index::Fts5Index;
use chunking_store::orchestrator::{delete_by_filter_orchestrated, ingest_chunks_orchestrated};
use chunking_store::FilterClause;
use file_chunker::ChunkOutput;

use crate::context::Context;
use crate::ServiceError;

/// Embeds and upserts every chunk in `out`, updating both the lexical and
/// vector indexes, and records/refreshes the owning Document row so
/// `upsert_chunks` can resolve a real `media_type` instead of falling back
/// to the `"document"` default.
pub fn ingest_chunk_output(ctx: &Context, out: ChunkOutput) -> Result<(), ServiceError> {
    if out.chunks.is_empty() {
        return Ok(());
    }
    let texts: Vec<&str> = out.chunks.iter().map(|c| c.text.as_str()).collect();
    let vecs = ctx.embedder.embed_batch(&texts).map_err(|e| ServiceError::Embed(e.to_string()))?;
    if vecs.iter().any(|v| v.len() != ctx.embedding_dimension()) {
        return Err(ServiceError::Embed("embedding dimension mismatch".into()));
    }
    let pairs: Vec<(ChunkId, Vec<f32>)> = out.chunks.iter().zip(vecs).map(|(r, v)| (r.chunk_id.clone(), v)).collect();

    let mut repo = ctx.open_repo()?;
    repo.add_document(&out.file).map_err(|e| ServiceError::Repo(e.to_string()))?;

    let fts = Fts5Index::new();
    let text_m: [&dyn chunking_store::TextIndexMaintainer; 1] = [&fts];
    let mut hnsw = ctx.load_hnsw()?;
    let mut vec_m: [&mut dyn chunking_store::VectorIndexMaintainer; 1] = [&mut hnsw];

    ingest_chunks_orchestrated(&mut repo, &out.chunks, &text_m, &mut vec_m, Some(&pairs))
        .map_err(|e| ServiceError::Index(e.to_string()))?;
    ctx.save_hnsw(&hnsw)
}

/// Removes every chunk/vector belonging to one Document, without touching
/// its row in `documents` — the caller is about to re-upsert that row.
fn delete_chunks_by_doc_id(ctx: &Context, doc_id: &DocumentId) -> Result<(), ServiceError> {
    let filters = [FilterClause::doc_id_eq(doc_id.0.clone())];
    let mut repo = ctx.open_repo()?;
    let fts = Fts5Index::new();
    let text_m: [&dyn chunking_store::TextIndexMaintainer; 1] = [&fts];
    let mut hnsw = ctx.load_hnsw()?;
    let mut vec_m: [&mut dyn chunking_store::VectorIndexMaintainer; 1] = [&mut hnsw];
    delete_by_filter_orchestrated(&mut repo, &filters, 500, &text_m, &mut vec_m)
        .map_err(|e| ServiceError::Index(e.to_string()))?;
    ctx.save_hnsw(&hnsw)
}

/// Re-ingests one file path end to end, short-circuiting on the cheap cases
/// first (spec §4.1/Testable Property 1: re-indexing unmodified content is
/// a no-op; Scenario S1: identical content resurfacing at a new path reuses
/// the existing Document instead of duplicating it).
pub fn ingest_path(ctx: &Context, path: &str) -> Result<(), ServiceError> {
    let hash = file_chunker::compute_content_hash(path);
    let repo = ctx.open_repo()?;
    let by_path = repo.get_document_by_path(path).map_err(|e| ServiceError::Repo(e.to_string()))?;

    if let (Some(h), Some(existing)) = (&hash, &by_path) {
        if existing.content_sha256.as_deref() == Some(h.as_str()) {
            return Ok(());
        }
    }

    if by_path.is_none() {
        if let Some(h) = &hash {
            if let Some(existing) = repo.get_document_by_hash(h).map_err(|e| ServiceError::Repo(e.to_string()))? {
                let mut doc = existing;
                doc.source_uri = path.to_string();
                return repo.add_document(&doc).map_err(|e| ServiceError::Repo(e.to_string()));
            }
        }
    }
    drop(repo);

    let params = file_chunker::text_segmenter::TextChunkParams {
        window_size: ctx.settings.chunk_size,
        overlap: ctx.settings.chunk_overlap,
    };
    let mut out = file_chunker::chunk_file_with_file_record_with_params(path, None, &params);

    if let Some(existing) = &by_path {
        // Same path, changed content: keep the Document identity stable and
        // bump its revision instead of minting a new doc_id, then drop the
        // stale chunk rows it used to own.
        let id = existing.doc_id.clone();
        for c in &mut out.chunks {
            c.chunk_id = ChunkId(format!("{}#{}", id.0, c.chunk_index));
            c.doc_id = id.clone();
        }
        out.file.doc_id = id.clone();
        out.file.doc_revision = Some(existing.doc_revision.unwrap_or(1) + 1);
        delete_chunks_by_doc_id(ctx, &id)?;
    }

    ingest_chunk_output(ctx, out)
}

/// Deletes every chunk/document whose `source_uri` starts with `path`,
/// across the DB and both indexes, then hard-deletes the Document row if it
/// ends up orphaned (spec §9: zero chunks and zero transcript rows).
pub fn delete_path(ctx: &Context, path: &Path) -> Result<(), ServiceError> {
    let path_str = path.to_string_lossy().to_string();
    let filters = [FilterClause::source_uri_prefix(path_str.clone())];
    let mut repo = ctx.open_repo()?;
    let fts = Fts5Index::new();
    let text_m: [&dyn chunking_store::TextIndexMaintainer; 1] = [&fts];
    let mut hnsw = ctx.load_hnsw()?;
    let mut vec_m: [&mut dyn chunking_store::VectorIndexMaintainer; 1] = [&mut hnsw];

    delete_by_filter_orchestrated(&mut repo, &filters, 500, &text_m, &mut vec_m)
        .map_err(|e| ServiceError::Index(e.to_string()))?;
    ctx.save_hnsw(&hnsw)?;

    if let Some(doc) = repo.get_document_by_path(&path_str).map_err(|e| ServiceError::Repo(e.to_string()))? {
        if repo.is_orphan_document(&doc.doc_id).map_err(|e| ServiceError::Repo(e.to_string()))? {
            repo.hard_delete_document(&doc.doc_id).map_err(|e| ServiceError::Repo(e.to_string()))?;
        }
    }
    Ok(())
}
