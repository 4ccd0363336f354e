//! Request/response shapes for the HTTP route table in spec §6. No listener
//! is wired up here — these are plain, `serde`-serializable DTOs that a
//! framework of the caller's choosing (axum, actix, ...) can hang handlers on.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
}

impl Default for HealthResponse {
    fn default() -> Self {
        Self { status: "healthy" }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SearchQuery {
    pub q: String,
    #[serde(default = "default_search_limit")]
    pub limit: usize,
    pub media_type: Option<String>,
}

fn default_search_limit() -> usize {
    20
}

#[derive(Debug, Clone, Serialize)]
pub struct SearchResultItem {
    pub chunk_id: String,
    pub document_id: String,
    pub text: String,
    pub path: String,
    pub filename: String,
    pub media_type: String,
    pub score: f32,
    pub start_time: Option<f64>,
    pub end_time: Option<f64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SearchResponse {
    pub query: String,
    pub total: usize,
    pub results: Vec<SearchResultItem>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SuggestQuery {
    pub q: String,
    #[serde(default = "default_suggest_limit")]
    pub limit: usize,
}

fn default_suggest_limit() -> usize {
    10
}

#[derive(Debug, Clone, Serialize)]
pub struct SuggestResponse {
    pub query: String,
    pub suggestions: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ListDocumentsQuery {
    #[serde(default = "default_documents_limit")]
    pub limit: usize,
    #[serde(default)]
    pub offset: usize,
    pub media_type: Option<String>,
}

fn default_documents_limit() -> usize {
    100
}

#[derive(Debug, Clone, Serialize)]
pub struct DocumentStatsResponse {
    pub total_documents: i64,
    pub by_media_type: std::collections::BTreeMap<String, i64>,
    pub total_chunks: i64,
    pub last_indexed_at: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct IndexRequest {
    pub path: String,
    #[serde(default = "default_recursive")]
    pub recursive: bool,
}

fn default_recursive() -> bool {
    true
}

#[derive(Debug, Clone, Serialize)]
pub struct IndexResponse {
    pub indexed_count: usize,
    pub paths: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DeleteResponse {
    pub status: &'static str,
    pub document_id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OpenActionRequest {
    pub path: String,
    pub start_time: Option<f64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct OpenActionResponse {
    pub success: bool,
    pub path: String,
    pub start_time: Option<f64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RevealActionRequest {
    pub path: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct RevealActionResponse {
    pub success: bool,
    pub path: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub details: Option<String>,
}
