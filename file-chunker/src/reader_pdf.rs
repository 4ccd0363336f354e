//! Dispatches PDF reading to whichever backend was compiled in, preferring
//! `pdfium` (feature `pdfium`) over the pure-Rust `lopdf` reader (feature
//! `pure-pdf`), falling back to a one-block stub when neither is enabled.

use crate::unified_blocks::{BlockKind, UnifiedBlock};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PdfBackend {
    Pdfium,
    PureRust,
    Stub,
}

pub fn default_backend() -> PdfBackend {
    if cfg!(feature = "pdfium") {
        PdfBackend::Pdfium
    } else if cfg!(feature = "pure-pdf") {
        PdfBackend::PureRust
    } else {
        PdfBackend::Stub
    }
}

pub fn read_pdf_to_blocks(path: &str) -> Vec<UnifiedBlock> {
    match default_backend() {
        #[cfg(feature = "pdfium")]
        PdfBackend::Pdfium => crate::reader_pdf_pdfium::read_pdf_to_blocks_pdfium(path),
        #[cfg(feature = "pure-pdf")]
        PdfBackend::PureRust => crate::reader_pdf_pure::read_pdf_to_blocks_pure(path),
        _ => vec![UnifiedBlock::new(BlockKind::Paragraph, "(stub) no PDF backend compiled in", 0, path, "stub.pdf")],
    }
}
