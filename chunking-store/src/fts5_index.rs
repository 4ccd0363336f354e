//! FTS5 text search, delegating to the BM25 virtual table SQLite already
//! maintains alongside `chunks` ([`sqlite_repo::SqliteRepo`]). This index has
//! no state of its own: [`TextIndexMaintainer::upsert`]/`delete_by_ids` are
//! no-ops because `SqliteRepo::upsert_chunks`/`delete_by_ids` already mirror
//! into `chunks_fts` in the same transaction-less call.

use chunk_model::{ChunkId, ChunkRecord};

use crate::sqlite_repo::SqliteRepo;
use crate::{ChunkStoreRead, FilterClause, IndexCaps, SearchOptions, StoreError, TextIndexMaintainer, TextMatch, TextSearcher};

#[derive(Default)]
pub struct Fts5Index;

impl Fts5Index {
    pub fn new() -> Self {
        Self
    }
}

impl TextSearcher for Fts5Index {
    fn name(&self) -> &'static str {
        "fts5"
    }

    fn caps(&self) -> IndexCaps {
        IndexCaps {
            can_prefilter_doc_id_eq: false,
            can_prefilter_doc_id_in: false,
            can_prefilter_source_prefix: false,
            can_prefilter_meta: false,
            can_prefilter_range_numeric: false,
            can_prefilter_range_date: false,
        }
    }

    fn search_ids(
        &self,
        store: &dyn ChunkStoreRead,
        query: &str,
        _filters: &[FilterClause],
        opts: &SearchOptions,
    ) -> Vec<TextMatch> {
        if query.trim().is_empty() || opts.top_k == 0 {
            return Vec::new();
        }
        let Some(repo) = store.as_any().downcast_ref::<SqliteRepo>() else {
            return Vec::new();
        };
        let fetch_n = opts.top_k.saturating_mul(opts.fetch_factor).max(opts.top_k);
        let hits = match repo.fts_search(query, fetch_n) {
            Ok(hits) => hits,
            Err(_) => return Vec::new(),
        };
        // bm25() is a cost (lower is better); normalize into a 0..1
        // "higher is better" scale so RRF input shapes are consistent across
        // fts5 and tantivy backends.
        hits.into_iter()
            .map(|hit| TextMatch {
                chunk_id: hit.chunk.chunk_id,
                score: 1.0 / (1.0 + hit.score),
                raw_score: hit.score,
            })
            .collect()
    }
}

impl TextIndexMaintainer for Fts5Index {
    fn upsert(&self, _records: &[ChunkRecord]) -> Result<(), StoreError> {
        Ok(())
    }

    fn delete_by_ids(&self, _ids: &[ChunkId]) -> Result<(), StoreError> {
        Ok(())
    }
}
