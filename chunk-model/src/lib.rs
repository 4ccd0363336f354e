//! Shared data model used across the indexing and search crates.
//!
//! A `Document` (on-disk: [`FileRecord`]) is split into one or more
//! [`ChunkRecord`]s, each of which is the unit of retrieval in both the
//! vector store and the lexical store.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Schema major version stamped onto every persisted record. Bump this when a
/// change to the shapes below would not be readable by an older index.
pub const SCHEMA_MAJOR: u32 = 1;

macro_rules! string_newtype {
    ($name:ident) => {
        #[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub struct $name(pub String);

        impl $name {
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }
    };
}

string_newtype!(DocumentId);
string_newtype!(ChunkId);

/// Media family a Document belongs to, per spec's fixed extension-set
/// classification (images/video/audio/otherwise-document).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaType {
    #[default]
    Document,
    Image,
    Video,
    Audio,
}

impl MediaType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaType::Document => "document",
            MediaType::Image => "image",
            MediaType::Video => "video",
            MediaType::Audio => "audio",
        }
    }

    /// Classify a lowercased file extension (without the leading dot) per the
    /// fixed sets in spec §4.8 step 3.
    pub fn from_extension(ext: &str) -> Self {
        const IMAGE: &[&str] = &["jpg", "jpeg", "png", "gif", "bmp", "webp", "tiff", "svg"];
        const VIDEO: &[&str] = &["mp4", "mov", "avi", "mkv", "wmv", "flv", "webm"];
        const AUDIO: &[&str] = &["mp3", "wav", "m4a", "flac", "aac", "ogg", "wma"];

        if IMAGE.contains(&ext) {
            MediaType::Image
        } else if VIDEO.contains(&ext) {
            MediaType::Video
        } else if AUDIO.contains(&ext) {
            MediaType::Audio
        } else {
            MediaType::Document
        }
    }
}

impl std::str::FromStr for MediaType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "document" => Ok(MediaType::Document),
            "image" => Ok(MediaType::Image),
            "video" => Ok(MediaType::Video),
            "audio" => Ok(MediaType::Audio),
            other => Err(format!("unknown media type: {other}")),
        }
    }
}

/// One row per ingested file (spec §3 `Document`).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FileRecord {
    pub schema_version: u32,
    pub doc_id: DocumentId,
    /// Bumped on re-index of an already-deduped but edited document; `None`
    /// until a repository assigns one.
    pub doc_revision: Option<u32>,
    pub source_uri: String,
    pub source_mime: String,
    pub file_size_bytes: Option<u64>,
    pub content_sha256: Option<String>,
    pub media_type: MediaType,
    pub page_count: Option<u32>,
    pub extracted_at: String,
    pub created_at_meta: Option<String>,
    pub updated_at_meta: Option<String>,
    pub title_guess: Option<String>,
    pub author_guess: Option<String>,
    pub dominant_lang: Option<String>,
    pub tags: Vec<String>,
    pub ingest_tool: Option<String>,
    pub ingest_tool_version: Option<String>,
    pub reader_backend: Option<String>,
    pub ocr_used: Option<bool>,
    pub ocr_langs: Vec<String>,
    pub chunk_count: Option<u32>,
    pub total_tokens: Option<u32>,
    pub duration_seconds: Option<f64>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub is_deleted: bool,
    pub deleted_at: Option<String>,
    pub meta: BTreeMap<String, String>,
    pub extra: BTreeMap<String, String>,
}

/// A single chunk of text derived from source content (spec §3 `Chunk`).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChunkRecord {
    pub schema_version: u32,
    pub doc_id: DocumentId,
    pub chunk_id: ChunkId,
    /// Contiguous, 0-based index within the document (spec invariant: no gaps).
    pub chunk_index: u32,
    pub source_uri: String,
    pub source_mime: String,
    pub extracted_at: String,
    pub page_start: Option<u32>,
    pub page_end: Option<u32>,
    pub start_time: Option<f64>,
    pub end_time: Option<f64>,
    pub text: String,
    pub section_path: Option<Vec<String>>,
    pub meta: BTreeMap<String, String>,
    pub extra: BTreeMap<String, String>,
}

impl ChunkRecord {
    /// Cheap structural sanity check; does not touch any store. Mirrors the
    /// teacher's `validate_soft` — warnings, not hard failures, since a
    /// malformed-but-non-empty chunk should still be indexable.
    pub fn validate_soft(&self) -> Vec<String> {
        let mut problems = Vec::new();
        if self.doc_id.0.trim().is_empty() {
            problems.push("doc_id is empty".to_string());
        }
        if self.chunk_id.0.trim().is_empty() {
            problems.push("chunk_id is empty".to_string());
        }
        if self.text.trim().is_empty() {
            problems.push("text is empty".to_string());
        }
        if let (Some(s), Some(e)) = (self.start_time, self.end_time) {
            if s > e {
                problems.push("start_time after end_time".to_string());
            }
        }
        if let (Some(s), Some(e)) = (self.page_start, self.page_end) {
            if s > e {
                problems.push("page_start after page_end".to_string());
            }
        }
        problems
    }
}

/// A chunk produced from a timed segment stream (audio/video transcripts),
/// before it is stamped into a [`ChunkRecord`]. See spec §4.3
/// `chunk_with_timestamps`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimedChunk {
    pub text: String,
    pub chunk_index: u32,
    pub start_time: Option<f64>,
    pub end_time: Option<f64>,
}

/// A plain character-offset chunk, before it is stamped into a
/// [`ChunkRecord`]. See spec §4.3 `chunk_text`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextChunk {
    pub text: String,
    pub chunk_index: u32,
    pub start_char: usize,
    pub end_char: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn media_type_from_extension_matches_fixed_sets() {
        assert_eq!(MediaType::from_extension("png"), MediaType::Image);
        assert_eq!(MediaType::from_extension("mp4"), MediaType::Video);
        assert_eq!(MediaType::from_extension("mp3"), MediaType::Audio);
        assert_eq!(MediaType::from_extension("pdf"), MediaType::Document);
        assert_eq!(MediaType::from_extension(""), MediaType::Document);
    }

    #[test]
    fn validate_soft_flags_empty_fields_without_erroring() {
        let rec = ChunkRecord {
            schema_version: SCHEMA_MAJOR,
            doc_id: DocumentId("".into()),
            chunk_id: ChunkId("c1".into()),
            chunk_index: 0,
            source_uri: "file:///x".into(),
            source_mime: "text/plain".into(),
            extracted_at: "2024-01-01T00:00:00Z".into(),
            page_start: None,
            page_end: None,
            start_time: None,
            end_time: None,
            text: "".into(),
            section_path: None,
            meta: BTreeMap::new(),
            extra: BTreeMap::new(),
        };
        let problems = rec.validate_soft();
        assert!(problems.iter().any(|p| p.contains("doc_id")));
        assert!(problems.iter().any(|p| p.contains("text")));
    }
}
