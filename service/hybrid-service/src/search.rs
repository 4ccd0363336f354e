//! C13: fuses the lexical (FTS5/Tantivy) and vector (HNSW) result lists with
//! Reciprocal Rank Fusion rather than a hand-tuned weighted sum (spec §9
//! REDESIGN FLAG — weighted-sum fusion needs per-corpus score calibration
//! that RRF, being rank-based, does not).

use std::collections::HashMap;

use chunk_model::ChunkId;
use chunking_store::fts5_index::Fts5Index;
use chunking_store::{ChunkStoreRead, FilterClause, SearchHit, SearchOptions, TextSearcher, VectorSearcher};

use crate::context::Context;
use crate::ServiceError;

/// Reciprocal Rank Fusion default constant (spec §4.13): large enough that a
/// single list's #1 rank doesn't dominate a chunk merely absent from other
/// lists, small enough that rank position still matters.
pub const RRF_K: f32 = 60.0;

/// `rrf(chunk) = sum over lists containing chunk of 1 / (k + rank)`, ranks
/// 1-based. A chunk absent from a list contributes nothing for that list.
pub fn rrf_fuse(ranked_lists: &[Vec<ChunkId>], k: f32) -> Vec<(ChunkId, f32)> {
    let mut scores: HashMap<String, f32> = HashMap::new();
    let mut order: Vec<String> = Vec::new();
    for list in ranked_lists {
        for (i, id) in list.iter().enumerate() {
            let rank = (i + 1) as f32;
            let contribution = 1.0 / (k + rank);
            match scores.get_mut(&id.0) {
                Some(s) => *s += contribution,
                None => {
                    scores.insert(id.0.clone(), contribution);
                    order.push(id.0.clone());
                }
            }
        }
    }
    let mut out: Vec<(ChunkId, f32)> = order.into_iter().map(|id| {
        let score = scores[&id];
        (ChunkId(id), score)
    }).collect();
    out.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
    out
}

/// Runs the lexical search, the vector search, fuses both with
/// [`rrf_fuse`], and materializes the top `top_k` chunks from the repo.
pub fn search_hybrid(ctx: &Context, query: &str, top_k: usize, filters: &[FilterClause]) -> Result<Vec<SearchHit>, ServiceError> {
    let repo = ctx.open_repo()?;
    let fts = Fts5Index::new();
    let opts = SearchOptions { top_k, fetch_factor: 10 };

    let text_matches = TextSearcher::search_ids(&fts, &repo, query, filters, &opts);
    let text_ranked: Vec<ChunkId> = text_matches.into_iter().map(|m| m.chunk_id).collect();

    let qvec = ctx.embedder.embed(query).map_err(|e| ServiceError::Embed(e.to_string()))?;
    let vector_ranked: Vec<ChunkId> = match ctx.load_hnsw() {
        Ok(hnsw) => VectorSearcher::knn_ids(&hnsw, &repo, &qvec, filters, &opts)
            .into_iter()
            .map(|m| m.chunk_id)
            .collect(),
        Err(_) => Vec::new(),
    };

    // Dense list goes first: rrf_fuse's stable sort breaks score ties in
    // favor of whichever list is passed first, and spec §4.13 requires ties
    // to resolve by first-appearance in the dense/vector list.
    let mut fused = rrf_fuse(&[vector_ranked, text_ranked], RRF_K);
    fused.truncate(top_k);

    let ids: Vec<ChunkId> = fused.iter().map(|(id, _)| id.clone()).collect();
    let recs = repo.get_chunks_by_ids(&ids).map_err(|e| ServiceError::Repo(e.to_string()))?;
    let score_by_id: HashMap<String, f32> = fused.into_iter().map(|(id, s)| (id.0, s)).collect();

    let mut hits: Vec<SearchHit> = recs
        .into_iter()
        .filter_map(|chunk| score_by_id.get(&chunk.chunk_id.0).map(|score| SearchHit { chunk, score: *score }))
        .collect();
    hits.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
    Ok(hits)
}

/// Text-only search, bypassing fusion entirely.
pub fn search_text(ctx: &Context, query: &str, top_k: usize, filters: &[FilterClause]) -> Result<Vec<SearchHit>, ServiceError> {
    let repo = ctx.open_repo()?;
    let fts = Fts5Index::new();
    let opts = SearchOptions { top_k, fetch_factor: 10 };
    let matches = TextSearcher::search_ids(&fts, &repo, query, filters, &opts);
    let ids: Vec<ChunkId> = matches.iter().map(|m| m.chunk_id.clone()).collect();
    let recs = repo.get_chunks_by_ids(&ids).map_err(|e| ServiceError::Repo(e.to_string()))?;
    let score_by_id: HashMap<String, f32> = matches.into_iter().map(|m| (m.chunk_id.0, m.score)).collect();
    let mut hits: Vec<SearchHit> = recs
        .into_iter()
        .filter_map(|chunk| score_by_id.get(&chunk.chunk_id.0).map(|score| SearchHit { chunk, score: *score }))
        .collect();
    hits.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
    Ok(hits)
}

/// Nearest-neighbor search against one chunk's own vector, for "more like
/// this" (spec §4.13 `search_similar`).
pub fn search_similar(ctx: &Context, chunk_id: &ChunkId, top_k: usize, filters: &[FilterClause]) -> Result<Vec<SearchHit>, ServiceError> {
    let repo = ctx.open_repo()?;
    let recs = repo.get_chunks_by_ids(std::slice::from_ref(chunk_id)).map_err(|e| ServiceError::Repo(e.to_string()))?;
    let seed = recs.into_iter().next().ok_or_else(|| ServiceError::Repo("chunk not found".into()))?;
    search_hybrid(ctx, &seed.text, top_k + 1, filters)
        .map(|mut hits| {
            hits.retain(|h| h.chunk.chunk_id.0 != chunk_id.0);
            hits.truncate(top_k);
            hits
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cid(s: &str) -> ChunkId { ChunkId(s.to_string()) }

    #[test]
    fn rrf_favors_a_chunk_ranked_high_in_both_lists() {
        let text = vec![cid("a"), cid("b"), cid("c")];
        let vector = vec![cid("b"), cid("a"), cid("d")];
        let fused = rrf_fuse(&[text, vector], RRF_K);
        assert_eq!(fused[0].0 .0, "a");
        assert_eq!(fused[1].0 .0, "b");
    }

    #[test]
    fn rrf_scores_single_list_membership_lower_than_dual_membership() {
        let text = vec![cid("a"), cid("only-text")];
        let vector = vec![cid("a"), cid("only-vector")];
        let fused = rrf_fuse(&[text, vector], RRF_K);
        let score = |id: &str| fused.iter().find(|(c, _)| c.0 == id).unwrap().1;
        assert!(score("a") > score("only-text"));
        assert!(score("a") > score("only-vector"));
    }

    #[test]
    fn rrf_is_empty_for_empty_lists() {
        let fused = rrf_fuse(&[Vec::new(), Vec::new()], RRF_K);
        assert!(fused.is_empty());
    }

    /// Spec Scenario S4: Dense=[A,B,C,D], Lex=[C,E,A], k=60. `A` and `C` tie
    /// exactly on score, as do `B` and `E` — the dense list's first-appearance
    /// order must win both ties, giving A before C and B before E.
    #[test]
    fn rrf_breaks_ties_by_first_appearance_in_the_dense_list() {
        let dense = vec![cid("a"), cid("b"), cid("c"), cid("d")];
        let lex = vec![cid("c"), cid("e"), cid("a")];
        let fused = rrf_fuse(&[dense, lex], RRF_K);
        let pos = |id: &str| fused.iter().position(|(c, _)| c.0 == id).unwrap();
        assert!(pos("a") < pos("c"), "expected a before c, got order {:?}", fused);
        assert!(pos("b") < pos("e"), "expected b before e, got order {:?}", fused);
    }
}
