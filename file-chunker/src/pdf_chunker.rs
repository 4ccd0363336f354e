use crate::reader_pdf::{read_pdf_to_blocks, default_backend, PdfBackend};
use crate::text_segmenter::TextChunkParams;
use crate::unified_blocks::UnifiedBlock;
use chunk_model::{ChunkRecord, ChunkId, FileRecord, SCHEMA_MAJOR};
use std::collections::BTreeMap;

/// Page-aware wrapper around [`crate::text_segmenter::chunk_blocks_to_segments`]:
/// PDFs need nothing extra beyond the blocks' own page numbers, which the
/// segmenter already threads through `BlockSpan`.
pub fn chunk_pdf_blocks_to_segments(blocks: &[UnifiedBlock], params: &TextChunkParams) -> Vec<(String, Option<u32>, Option<u32>)> {
    crate::text_segmenter::chunk_blocks_to_segments(blocks, params)
}

pub fn chunk_pdf_blocks_to_text(blocks: &[UnifiedBlock], params: &TextChunkParams) -> Vec<String> {
    chunk_pdf_blocks_to_segments(blocks, params).into_iter().map(|(t, _, _)| t).collect()
}

/// High-level: read PDF -> chunk -> return FileRecord and ChunkRecords.
pub fn chunk_pdf_file_with_file_record(path: &str, params: &TextChunkParams) -> (FileRecord, Vec<ChunkRecord>) {
    let blocks = read_pdf_to_blocks(path);
    let segs = chunk_pdf_blocks_to_segments(&blocks, params);
    let backend = match default_backend() { PdfBackend::Pdfium => "pdfium", PdfBackend::PureRust => "pure-pdf", PdfBackend::Stub => "stub.pdf" };

    let doc_id = crate::new_doc_id();
    let page_count = segs.iter().filter_map(|(_, _ps, pe)| *pe).max();

    let chunks: Vec<ChunkRecord> = segs
        .into_iter()
        .enumerate()
        .map(|(i, (text, pstart, pend))| ChunkRecord {
            schema_version: SCHEMA_MAJOR,
            doc_id: doc_id.clone(),
            chunk_id: ChunkId(format!("{}#{}", doc_id.0, i)),
            chunk_index: i as u32,
            start_time: None,
            end_time: None,
            source_uri: path.to_string(),
            source_mime: "application/pdf".into(),
            extracted_at: String::new(),
            page_start: pstart,
            page_end: pend,
            text,
            section_path: None,
            meta: BTreeMap::new(),
            extra: BTreeMap::new(),
        })
        .collect();

    let mut file = FileRecord {
        schema_version: SCHEMA_MAJOR,
        doc_id,
        doc_revision: Some(1),
        source_uri: path.to_string(),
        source_mime: "application/pdf".into(),
        file_size_bytes: None,
        content_sha256: None,
        media_type: crate::media_type_for_path(path),
        page_count,
        extracted_at: String::new(),
        created_at_meta: None,
        updated_at_meta: None,
        title_guess: None,
        author_guess: None,
        dominant_lang: None,
        tags: Vec::new(),
        ingest_tool: Some("pdf-chunker".into()),
        ingest_tool_version: Some(env!("CARGO_PKG_VERSION").into()),
        reader_backend: Some(backend.into()),
        ocr_used: None,
        ocr_langs: Vec::new(),
        chunk_count: Some(chunks.len() as u32),
        total_tokens: None,
        meta: BTreeMap::new(),
        extra: BTreeMap::new(),
        ..Default::default()
    };
    crate::enrich_file_record_basic(&mut file, path);

    (file, chunks)
}
