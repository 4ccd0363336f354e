//! Environment-derived settings (spec §6 "Environment"), with a `.env` overlay
//! loaded via `dotenvy` before any variable is read.

use std::path::PathBuf;

fn env_string(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_usize(key: &str, default: usize) -> usize {
    std::env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn env_u64(key: &str, default: u64) -> u64 {
    std::env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn env_bool(key: &str, default: bool) -> bool {
    std::env::var(key)
        .ok()
        .map(|v| matches!(v.to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on"))
        .unwrap_or(default)
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub ollama_host: String,
    pub api_host: String,
    pub api_port: u16,
    pub data_dir: PathBuf,
    pub log_level: String,
    pub embedding_model: String,
    pub vlm_model: String,
    pub reranker_model: Option<String>,
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub pdf_use_markdown: bool,
    pub pdf_min_chars_per_page: usize,
    pub pdf_vlm_fallback: bool,
    pub pdf_vlm_dpi: u32,
    pub pdf_vlm_model: String,
    pub pdf_vlm_timeout_secs: u64,
    pub pdf_vlm_max_pages: usize,
    pub pdf_vlm_workers: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            ollama_host: "http://localhost:11434".into(),
            api_host: "127.0.0.1".into(),
            api_port: 8008,
            data_dir: PathBuf::from("./data"),
            log_level: "info".into(),
            embedding_model: "nomic-embed-text".into(),
            vlm_model: "llama3.2-vision".into(),
            reranker_model: None,
            chunk_size: 800,
            chunk_overlap: 200,
            pdf_use_markdown: true,
            pdf_min_chars_per_page: 100,
            pdf_vlm_fallback: true,
            pdf_vlm_dpi: 150,
            pdf_vlm_model: "llama3.2-vision".into(),
            pdf_vlm_timeout_secs: 60,
            pdf_vlm_max_pages: 20,
            pdf_vlm_workers: 2,
        }
    }
}

impl Settings {
    /// Loads a `.env` file if present (missing file is not an error), then
    /// resolves every recognized key against the process environment,
    /// falling back to [`Settings::default`] per-field.
    pub fn from_env() -> Self {
        let _ = dotenvy::dotenv();
        let defaults = Settings::default();
        Self {
            ollama_host: env_string("OLLAMA_HOST", &defaults.ollama_host),
            api_host: env_string("API_HOST", &defaults.api_host),
            api_port: std::env::var("API_PORT").ok().and_then(|v| v.parse().ok()).unwrap_or(defaults.api_port),
            data_dir: PathBuf::from(env_string("DATA_DIR", &defaults.data_dir.display().to_string())),
            log_level: env_string("LOG_LEVEL", &defaults.log_level),
            embedding_model: env_string("EMBEDDING_MODEL", &defaults.embedding_model),
            vlm_model: env_string("VLM_MODEL", &defaults.vlm_model),
            reranker_model: std::env::var("RERANKER_MODEL").ok().filter(|s| !s.trim().is_empty()),
            chunk_size: env_usize("CHUNK_SIZE", defaults.chunk_size),
            chunk_overlap: env_usize("CHUNK_OVERLAP", defaults.chunk_overlap),
            pdf_use_markdown: env_bool("PDF_USE_MARKDOWN", defaults.pdf_use_markdown),
            pdf_min_chars_per_page: env_usize("PDF_MIN_CHARS_PER_PAGE", defaults.pdf_min_chars_per_page),
            pdf_vlm_fallback: env_bool("PDF_VLM_FALLBACK", defaults.pdf_vlm_fallback),
            pdf_vlm_dpi: env_usize("PDF_VLM_DPI", defaults.pdf_vlm_dpi as usize) as u32,
            pdf_vlm_model: env_string("PDF_VLM_MODEL", &defaults.pdf_vlm_model),
            pdf_vlm_timeout_secs: env_u64("PDF_VLM_TIMEOUT", defaults.pdf_vlm_timeout_secs),
            pdf_vlm_max_pages: env_usize("PDF_VLM_MAX_PAGES", defaults.pdf_vlm_max_pages),
            pdf_vlm_workers: env_usize("PDF_VLM_WORKERS", defaults.pdf_vlm_workers),
        }
    }

    /// Initializes the global `tracing` subscriber from `self.log_level`.
    /// Safe to call more than once; later calls are no-ops.
    pub fn init_tracing(&self) {
        use tracing_subscriber::EnvFilter;
        let filter = EnvFilter::try_new(&self.log_level).unwrap_or_else(|_| EnvFilter::new("info"));
        let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec_constants() {
        let s = Settings::default();
        assert_eq!(s.chunk_size, 800);
        assert_eq!(s.chunk_overlap, 200);
        assert_eq!(s.pdf_vlm_timeout_secs, 60);
    }
}
