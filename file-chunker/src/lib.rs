pub mod reader_pdf;
pub mod reader_docx;
pub mod reader_pptx;
pub mod reader_txt;
pub mod reader_excel;
pub mod unified_blocks;
pub mod chunker_rules_jp;
pub mod text_segmenter;
#[cfg(feature = "pdfium")] pub mod reader_pdf_pdfium;
#[cfg(feature = "pure-pdf")] pub mod reader_pdf_pure;
pub mod pdf_chunker;

use chunk_model::{ChunkId, ChunkRecord, DocumentId, FileRecord, MediaType};
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use chrono::{DateTime, Utc};
use sha2::Digest;
use std::collections::BTreeMap;
use unified_blocks::{UnifiedBlock, BlockKind};
use std::path::Path;

/// Result bundle including file-level metadata and chunk list.
#[derive(Debug, Clone)]
pub struct ChunkOutput {
    pub file: FileRecord,
    pub chunks: Vec<ChunkRecord>,
}

/// Mints a fresh Document identity. Document identity must never be derived
/// from the file path (spec Scenario S1): a path is where content happens
/// to live right now, not what it is, so callers resolve re-use via
/// `compute_content_hash` + a repository lookup, not via this value alone.
pub(crate) fn new_doc_id() -> DocumentId {
    DocumentId(uuid::Uuid::new_v4().to_string())
}

/// Classifies `path`'s extension per spec §4.8 step 3.
pub(crate) fn media_type_for_path(path: &str) -> MediaType {
    let ext = Path::new(path)
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_lowercase();
    MediaType::from_extension(&ext)
}

/// Builds the `(FileRecord, Vec<ChunkRecord>)` pair shared by every format
/// branch below, so `doc_id`/`media_type`/hash stamping happens in exactly
/// one place.
fn build_chunk_output(
    path: &str,
    doc_id: DocumentId,
    segs: Vec<(String, Option<u32>, Option<u32>)>,
    source_mime: &str,
    reader_backend: &str,
    force_page_1: bool,
) -> ChunkOutput {
    let page_count = if force_page_1 {
        Some(1)
    } else {
        segs.iter().filter_map(|(_, _ps, pe)| *pe).max()
    };

    let chunks: Vec<ChunkRecord> = segs
        .into_iter()
        .enumerate()
        .map(|(i, (text, ps, pe))| ChunkRecord {
            schema_version: chunk_model::SCHEMA_MAJOR,
            doc_id: doc_id.clone(),
            chunk_id: ChunkId(format!("{}#{}", doc_id.0, i)),
            chunk_index: i as u32,
            start_time: None,
            end_time: None,
            source_uri: path.to_string(),
            source_mime: source_mime.to_string(),
            extracted_at: String::new(),
            page_start: if force_page_1 { Some(1) } else { ps },
            page_end: if force_page_1 { Some(1) } else { pe },
            text,
            section_path: None,
            meta: BTreeMap::new(),
            extra: BTreeMap::new(),
        })
        .collect();

    let mut file = FileRecord {
        schema_version: chunk_model::SCHEMA_MAJOR,
        doc_id,
        doc_revision: Some(1),
        source_uri: path.to_string(),
        source_mime: source_mime.to_string(),
        file_size_bytes: None,
        content_sha256: None,
        media_type: media_type_for_path(path),
        page_count,
        extracted_at: String::new(),
        created_at_meta: None,
        updated_at_meta: None,
        title_guess: None,
        author_guess: None,
        dominant_lang: None,
        tags: Vec::new(),
        ingest_tool: Some("file-chunker".into()),
        ingest_tool_version: Some(env!("CARGO_PKG_VERSION").into()),
        reader_backend: Some(reader_backend.into()),
        ocr_used: None,
        ocr_langs: Vec::new(),
        chunk_count: Some(chunks.len() as u32),
        total_tokens: None,
        meta: BTreeMap::new(),
        extra: BTreeMap::new(),
        ..Default::default()
    };
    enrich_file_record_basic(&mut file, path);
    ChunkOutput { file, chunks }
}

fn excel_mime(lower: &str) -> &'static str {
    if lower.ends_with(".xlsx") {
        "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet"
    } else if lower.ends_with(".xls") {
        "application/vnd.ms-excel"
    } else {
        "application/vnd.oasis.opendocument.spreadsheet"
    }
}

/// High-level entry to chunk a file by path and return file/chunks.
pub fn chunk_file_with_file_record(path: &str) -> ChunkOutput {
    chunk_file_with_file_record_with_params(path, None, &text_segmenter::TextChunkParams::default())
}

/// Variant with an explicit encoding hint for text-like files.
/// For non-text formats (PDF/DOCX), the behavior is identical to `chunk_file_with_file_record`.
pub fn chunk_file_with_file_record_with_encoding(path: &str, encoding: Option<&str>) -> ChunkOutput {
    chunk_file_with_file_record_with_params(path, encoding, &text_segmenter::TextChunkParams::default())
}

/// Unified entry with explicit TextChunkParams and optional encoding for text-like files.
pub fn chunk_file_with_file_record_with_params(
    path: &str,
    encoding: Option<&str>,
    params: &text_segmenter::TextChunkParams,
) -> ChunkOutput {
    let lower = path.to_lowercase();

    // PDF: dedicated chunker, already page-aware.
    if lower.ends_with(".pdf") {
        let (file, chunks) = pdf_chunker::chunk_pdf_file_with_file_record(path, params);
        return ChunkOutput { file, chunks };
    }

    // DOCX: hard-cut at top-level headings, sliding-window within each group.
    if lower.ends_with(".docx") {
        let blocks: Vec<UnifiedBlock> = reader_docx::read_docx_to_blocks(path);
        let segs = chunk_blocks_grouped_by_h1(&blocks, params);
        return build_chunk_output(
            path,
            new_doc_id(),
            segs,
            "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
            "docx",
            false,
        );
    }

    // PPTX: one heading per slide, hard-cut at slide boundaries.
    if lower.ends_with(".pptx") {
        let blocks: Vec<UnifiedBlock> = reader_pptx::read_pptx_to_blocks(path);
        let segs = chunk_blocks_grouped_by_h1(&blocks, params);
        return build_chunk_output(
            path,
            new_doc_id(),
            segs,
            "application/vnd.openxmlformats-officedocument.presentationml.presentation",
            "pptx",
            false,
        );
    }

    // Excel (.xlsx/.xls/.ods): hard-cut at sheet boundaries.
    if lower.ends_with(".xlsx") || lower.ends_with(".xls") || lower.ends_with(".ods") {
        let blocks: Vec<UnifiedBlock> = reader_excel::read_excel_to_blocks(path);
        let segs = chunk_blocks_grouped_by_h1(&blocks, params);
        return build_chunk_output(path, new_doc_id(), segs, excel_mime(&lower), "excel", false);
    }

    // Text-like files: sliding window, page fixed at 1.
    if is_text_like(path) {
        let blocks: Vec<UnifiedBlock> = reader_txt::read_txt_to_blocks_with_encoding(path, encoding);
        let segs = text_segmenter::chunk_blocks_to_segments(&blocks, params);
        return build_chunk_output(path, new_doc_id(), segs, "text/plain", "txt", true);
    }

    // Fallback stub: unknown/binary format we have no reader for.
    let blocks: Vec<UnifiedBlock> = vec![UnifiedBlock::new(BlockKind::Paragraph, "(stub) read file content here", 0, path, "stub.plain")];
    let texts = chunker_rules_jp::chunk_blocks_jp(&blocks);
    let segs: Vec<(String, Option<u32>, Option<u32>)> = texts.into_iter().map(|t| (t, None, None)).collect();
    build_chunk_output(path, new_doc_id(), segs, "text/plain", "stub", false)
}

/// Legacy helper returning only chunks for backward compatibility.
pub fn chunk_file(path: &str) -> Vec<ChunkRecord> {
    chunk_file_with_file_record(path).chunks
}

pub(crate) fn is_text_like(path: &str) -> bool {
    let lower = path.to_lowercase();
    // Common text-ish extensions
    let exts = [
        ".txt", ".md", ".markdown", ".csv", ".tsv", ".log", ".json", ".yaml", ".yml",
        ".ini", ".toml", ".cfg", ".conf", ".rst", ".tex", ".srt", ".properties",
    ];
    if exts.iter().any(|e| lower.ends_with(e)) {
        return true;
    }
    // As a fallback, if no extension or unknown, try a lightweight probe: small read and check for NUL bytes
    if Path::new(path).extension().is_none() {
        if let Ok(mut f) = std::fs::File::open(path) {
            let mut buf = [0u8; 2048];
            if let Ok(n) = f.read(&mut buf) {
                let slice = &buf[..n];
                return !slice.iter().any(|&b| b == 0);
            }
        }
    }
    false
}

/// Split blocks on top-level heading (Heading with level==1) and apply the generic text segmenter per group.
/// This enforces that no chunk crosses a top-level heading boundary. If no such headings exist, the
/// entire block list is treated as a single group.
fn chunk_blocks_grouped_by_h1(
    blocks: &[UnifiedBlock],
    params: &text_segmenter::TextChunkParams,
) -> Vec<(String, Option<u32>, Option<u32>)> {
    let mut out: Vec<(String, Option<u32>, Option<u32>)> = Vec::new();
    let mut cur: Vec<UnifiedBlock> = Vec::new();
    for b in blocks.iter() {
        let is_h1 = matches!(b.kind, BlockKind::Heading) && matches!(b.heading_level, Some(1));
        if is_h1 && !cur.is_empty() {
            let mut segs = text_segmenter::chunk_blocks_to_segments(&cur, params);
            out.append(&mut segs);
            cur.clear();
        }
        cur.push(b.clone());
    }
    if !cur.is_empty() {
        let mut segs = text_segmenter::chunk_blocks_to_segments(&cur, params);
        out.append(&mut segs);
    }
    out
}

// --- Metadata enrichment helpers --------------------------------------------------------------

pub(crate) fn enrich_file_record_basic(file: &mut FileRecord, path: &str) {
    // File size and timestamps
    if let Ok(md) = std::fs::metadata(path) {
        file.file_size_bytes = Some(md.len());
        if let Ok(ct) = md.created() {
            file.created_at_meta = Some(system_time_to_rfc3339(ct));
        }
        if let Ok(mt) = md.modified() {
            file.updated_at_meta = Some(system_time_to_rfc3339(mt));
        }
    }
    if let Some(hex) = compute_content_hash(path) {
        file.content_sha256 = Some(hex);
    }
    // Windows: fallback author from file owner when not present
    #[cfg(target_os = "windows")]
    {
        if file.author_guess.is_none() {
            if let Some(owner) = windows_file_owner(path) { file.author_guess = Some(owner); }
        }
    }
}

/// Spec §4.1 content hash: SHA-256 over `(first 64 KiB) ++ (last 64 KiB, only
/// if the file is larger than 128 KiB) ++ decimal file size`. O(1) in file
/// size — this never reads the whole file, only its two ends, so dedup
/// lookups stay cheap even for multi-gigabyte files.
pub fn compute_content_hash(path: &str) -> Option<String> {
    const CHUNK: u64 = 64 * 1024;

    let mut f = File::open(path).ok()?;
    let size = f.metadata().ok()?.len();
    let mut hasher = sha2::Sha256::new();

    let head_len = size.min(CHUNK) as usize;
    let mut head = vec![0u8; head_len];
    f.read_exact(&mut head).ok()?;
    hasher.update(&head);

    if size > 2 * CHUNK {
        f.seek(SeekFrom::End(-(CHUNK as i64))).ok()?;
        let mut tail = vec![0u8; CHUNK as usize];
        f.read_exact(&mut tail).ok()?;
        hasher.update(&tail);
    }

    hasher.update(size.to_string().as_bytes());
    Some(hex::encode(hasher.finalize()))
}

fn system_time_to_rfc3339(t: std::time::SystemTime) -> String {
    let dt: DateTime<Utc> = t.into();
    dt.to_rfc3339()
}

#[cfg(target_os = "windows")]
fn windows_file_owner(path: &str) -> Option<String> {
    use std::iter;
    use std::os::windows::ffi::OsStrExt;
    use std::ptr::{null, null_mut};
    use windows::core::{PCWSTR, PWSTR};
    use windows::Win32::Foundation::{BOOL, PSID};
    use windows::Win32::Security::{GetFileSecurityW, GetSecurityDescriptorOwner, LookupAccountSidW, OWNER_SECURITY_INFORMATION, SID_NAME_USE, PSECURITY_DESCRIPTOR};

    let wide: Vec<u16> = std::ffi::OsStr::new(path).encode_wide().chain(iter::once(0)).collect();
    unsafe {
        let mut needed: u32 = 0;
        // First call to get needed buffer length
        let _ = GetFileSecurityW(PCWSTR(wide.as_ptr()), OWNER_SECURITY_INFORMATION.0, PSECURITY_DESCRIPTOR(null_mut()), 0, &mut needed);
        if needed == 0 { return None; }
        let mut buf: Vec<u8> = vec![0; needed as usize];
        let ok = GetFileSecurityW(PCWSTR(wide.as_ptr()), OWNER_SECURITY_INFORMATION.0, PSECURITY_DESCRIPTOR(buf.as_mut_ptr() as *mut _), needed, &mut needed);
        if ok.0 == 0 { return None; }
        let mut owner_sid: PSID = PSID(null_mut());
        let mut defaulted = BOOL(0);
        let sd = PSECURITY_DESCRIPTOR(buf.as_mut_ptr() as *mut _);
        if GetSecurityDescriptorOwner(sd, &mut owner_sid, &mut defaulted).is_err() || owner_sid.0.is_null() { return None; }

        // Query sizes
        let mut name_len: u32 = 0;
        let mut domain_len: u32 = 0;
        let mut use_: SID_NAME_USE = SID_NAME_USE(0);
        let _ = LookupAccountSidW(PCWSTR(null()), owner_sid, PWSTR(null_mut()), &mut name_len, PWSTR(null_mut()), &mut domain_len, &mut use_);
        if name_len == 0 { name_len = 256; }
        if domain_len == 0 { domain_len = 256; }
        let mut name_buf: Vec<u16> = vec![0u16; name_len as usize];
        let mut domain_buf: Vec<u16> = vec![0u16; domain_len as usize];
        let mut use2: SID_NAME_USE = SID_NAME_USE(0);
        let ok3 = LookupAccountSidW(
            PCWSTR(null()),
            owner_sid,
            PWSTR(name_buf.as_mut_ptr()),
            &mut name_len,
            PWSTR(domain_buf.as_mut_ptr()),
            &mut domain_len,
            &mut use2,
        );
        if ok3.is_err() { return None; }
        let name = String::from_utf16_lossy(&name_buf[..name_len as usize]);
        let domain = String::from_utf16_lossy(&domain_buf[..domain_len as usize]);
        if domain.is_empty() { Some(name) } else { Some(format!("{}\\{}", domain, name)) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn content_hash_is_stable_for_small_files() {
        let mut f = tempfile_with(b"hello world");
        let p = f.path_str();
        let h1 = compute_content_hash(&p).unwrap();
        let h2 = compute_content_hash(&p).unwrap();
        assert_eq!(h1, h2);
        assert_eq!(h1.len(), 64);
        drop(f);
    }

    #[test]
    fn content_hash_changes_with_size_even_if_head_and_tail_match() {
        // Two files sharing identical first/last bytes but different overall
        // size must not collide, since size is folded into the hash.
        let small = tempfile_with(&vec![b'a'; 10]);
        let big = tempfile_with(&vec![b'a'; 300_000]);
        let h_small = compute_content_hash(&small.path_str()).unwrap();
        let h_big = compute_content_hash(&big.path_str()).unwrap();
        assert_ne!(h_small, h_big);
    }

    #[test]
    fn media_type_classifies_known_extensions() {
        assert_eq!(media_type_for_path("photo.PNG"), MediaType::Image);
        assert_eq!(media_type_for_path("clip.mp4"), MediaType::Video);
        assert_eq!(media_type_for_path("notes.pdf"), MediaType::Document);
    }

    struct TempFile {
        path: std::path::PathBuf,
    }
    impl TempFile {
        fn path_str(&self) -> String {
            self.path.to_string_lossy().to_string()
        }
    }
    impl Drop for TempFile {
        fn drop(&mut self) {
            let _ = std::fs::remove_file(&self.path);
        }
    }
    fn tempfile_with(bytes: &[u8]) -> TempFile {
        let path = std::env::temp_dir().join(format!("file-chunker-test-{}", uuid::Uuid::new_v4()));
        let mut f = File::create(&path).unwrap();
        f.write_all(bytes).unwrap();
        TempFile { path }
    }
}
