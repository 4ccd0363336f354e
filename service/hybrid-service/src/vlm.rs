//! VLM client contract (C5) and the VLM Fallback Engine (C9) that drives it
//! for image-heavy PDF pages.

use std::path::{Path, PathBuf};
use std::sync::{mpsc, Arc};
use std::time::{Duration, Instant};

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum VlmError {
    #[error("no VLM available: neither primary nor fallback model is present")]
    NoVlmAvailable,
    #[error("VLM call timed out")]
    Timeout,
    #[error("VLM call failed: {0}")]
    Failed(String),
}

/// `NO TEXT FOUND` is the model's sentinel for "nothing to transcribe";
/// callers collapse it to an empty string rather than surfacing it as text.
pub const NO_TEXT_FOUND_SENTINEL: &str = "NO TEXT FOUND";

pub fn collapse_no_text_sentinel(text: String) -> String {
    if text.trim() == NO_TEXT_FOUND_SENTINEL {
        String::new()
    } else {
        text
    }
}

#[derive(Debug, Clone)]
pub struct ImageDescription {
    pub description: String,
    pub ocr_text: String,
}

/// Describes/OCRs an image. Implementations probe the remote model catalog
/// at construction time and fail fast with [`VlmError::NoVlmAvailable`] if
/// neither the configured primary nor its declared fallback exists.
pub trait VlmClient: Send + Sync {
    fn describe(&self, image: &Path, prompt: Option<&str>) -> Result<String, VlmError>;
    fn extract_text(&self, image: &Path) -> Result<String, VlmError>;
    fn analyze_document_image(&self, image: &Path) -> Result<ImageDescription, VlmError> {
        let description = self.describe(image, None)?;
        let ocr_text = collapse_no_text_sentinel(self.extract_text(image)?);
        Ok(ImageDescription { description, ocr_text })
    }
}

/// Runs `client.extract_text(image_path)` on a worker thread and races it
/// against `timeout`. On timeout the call returns [`VlmError::Timeout`] and
/// the worker is abandoned rather than killed — its eventual result, if any,
/// is dropped when the channel's other end goes away. Never relies on
/// `SIGALRM`/signal-based interruption (spec §9 REDESIGN FLAG: signal-based
/// timeouts are unsound once a process has more than one thread).
pub fn extract_text_with_deadline(
    client: Arc<dyn VlmClient>,
    image_path: PathBuf,
    timeout: Duration,
) -> Result<String, VlmError> {
    let (tx, rx) = mpsc::channel();
    let deadline = Instant::now() + timeout;
    let _ = std::thread::Builder::new().spawn(move || {
        let result = client.extract_text(&image_path);
        let _ = tx.send(result);
    });
    match rx.recv_timeout(deadline.saturating_duration_since(Instant::now())) {
        Ok(result) => result,
        Err(_) => Err(VlmError::Timeout),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageOutcome {
    Success,
    Timeout,
    Failed,
}

#[derive(Debug, Clone)]
pub struct PageResult {
    pub page_index: usize,
    pub outcome: PageOutcome,
    pub text: Option<String>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct FallbackSummary {
    pub successful: usize,
    pub failed: usize,
    pub timed_out: usize,
}

/// Renders one zero-based PDF page to a temp PNG file. Implementations own
/// cleanup of any intermediate files they allocate beyond the returned path;
/// the fallback engine removes the returned path itself.
pub trait PdfPageRenderer: Send + Sync {
    fn render_page_png(&self, pdf_path: &Path, page_index: usize, dpi: u32) -> std::io::Result<PathBuf>;
}

#[derive(Debug, Clone)]
pub struct FallbackPolicy {
    pub max_pages: usize,
    pub dpi: u32,
    pub timeout: Duration,
    pub workers: usize,
}

impl Default for FallbackPolicy {
    fn default() -> Self {
        Self { max_pages: 20, dpi: 150, timeout: Duration::from_secs(60), workers: 2 }
    }
}

/// C9: decides and drives per-page image extraction for PDFs whose native
/// extractor reported pages with too little text.
pub struct FallbackEngine<'a> {
    pub vlm: Arc<dyn VlmClient>,
    pub renderer: &'a (dyn PdfPageRenderer),
    pub policy: FallbackPolicy,
}

impl<'a> FallbackEngine<'a> {
    /// Renders and OCRs each page in `pages_needing_vlm` (already capped to
    /// `max_pages`, with the tail silently dropped), sequentially if
    /// `policy.workers <= 1`. Parallel execution with a real thread pool is
    /// left to callers that can supply one `VlmClient` per worker (this
    /// engine's contract only requires soundness for the sequential path,
    /// which `HybridService` uses by default per the pdfium/pure-pdf
    /// feature combination it builds with).
    pub fn process_pages(&self, pdf_path: &Path, pages_needing_vlm: &[usize]) -> (Vec<PageResult>, FallbackSummary) {
        let capped: Vec<usize> = if self.policy.max_pages == 0 {
            pages_needing_vlm.to_vec()
        } else {
            pages_needing_vlm.iter().take(self.policy.max_pages).copied().collect()
        };
        if capped.len() < pages_needing_vlm.len() {
            tracing::warn!(
                dropped = pages_needing_vlm.len() - capped.len(),
                "VLM fallback: page cap reached, dropping tail pages"
            );
        }

        let mut results = Vec::with_capacity(capped.len());
        let mut summary = FallbackSummary::default();
        let total = capped.len();
        for (i, &page_index) in capped.iter().enumerate() {
            tracing::info!(i = i + 1, total, page_index, "VLM fallback processing page");
            let rendered = self.renderer.render_page_png(pdf_path, page_index, self.policy.dpi);
            let result = match rendered {
                Ok(image_path) => {
                    let outcome = extract_text_with_deadline(self.vlm.clone(), image_path.clone(), self.policy.timeout);
                    let _ = std::fs::remove_file(&image_path);
                    match outcome {
                        Ok(text) => {
                            summary.successful += 1;
                            PageResult { page_index, outcome: PageOutcome::Success, text: Some(collapse_no_text_sentinel(text)), error: None }
                        }
                        Err(VlmError::Timeout) => {
                            summary.timed_out += 1;
                            PageResult { page_index, outcome: PageOutcome::Timeout, text: None, error: Some("timeout".into()) }
                        }
                        Err(e) => {
                            summary.failed += 1;
                            PageResult { page_index, outcome: PageOutcome::Failed, text: None, error: Some(e.to_string()) }
                        }
                    }
                }
                Err(e) => {
                    summary.failed += 1;
                    PageResult { page_index, outcome: PageOutcome::Failed, text: None, error: Some(e.to_string()) }
                }
            };
            results.push(result);
        }
        tracing::info!(successful = summary.successful, failed = summary.failed, timed_out = summary.timed_out, "VLM fallback summary");
        (results, summary)
    }

    /// Merges successful page texts, in ascending page order, onto the end
    /// of `original_text`. Returns `original_text` unchanged if no page
    /// succeeded.
    pub fn merge(original_text: &str, results: &[PageResult]) -> String {
        let mut successes: Vec<(usize, &str)> = results
            .iter()
            .filter(|r| r.outcome == PageOutcome::Success)
            .filter_map(|r| r.text.as_deref().map(|t| (r.page_index, t)))
            .collect();
        if successes.is_empty() {
            return original_text.to_string();
        }
        successes.sort_by_key(|(idx, _)| *idx);
        let mut out = String::from(original_text);
        out.push_str("\n\n--- VLM Extracted Text ---\n");
        for (idx, text) in successes {
            out.push_str(&format!("\n[Page {}]\n{}\n", idx + 1, text));
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collapses_no_text_found_sentinel() {
        assert_eq!(collapse_no_text_sentinel("NO TEXT FOUND".into()), "");
        assert_eq!(collapse_no_text_sentinel("  NO TEXT FOUND  ".into()), "");
        assert_eq!(collapse_no_text_sentinel("hello".into()), "hello");
    }

    #[test]
    fn merge_returns_original_when_nothing_succeeded() {
        let results = vec![PageResult { page_index: 2, outcome: PageOutcome::Failed, text: None, error: Some("x".into()) }];
        assert_eq!(FallbackEngine::merge("orig", &results), "orig");
    }

    #[test]
    fn merge_orders_pages_ascending_regardless_of_completion_order() {
        let results = vec![
            PageResult { page_index: 6, outcome: PageOutcome::Success, text: Some("T7".into()), error: None },
            PageResult { page_index: 2, outcome: PageOutcome::Success, text: Some("T3".into()), error: None },
            PageResult { page_index: 4, outcome: PageOutcome::Success, text: Some("T5".into()), error: None },
        ];
        let merged = FallbackEngine::merge("base", &results);
        assert_eq!(merged, "base\n\n--- VLM Extracted Text ---\n\n[Page 3]\nT3\n\n[Page 5]\nT5\n\n[Page 7]\nT7\n");
    }
}
