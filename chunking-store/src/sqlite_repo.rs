//! SQLite-backed primary store: `documents`, `chunks` (+ `chunks_fts5`), and
//! `transcripts`. One repository instance owns one on-disk database file,
//! mirroring `storage/sqlite_client.py` / `storage/repositories/*.py`.

use std::collections::BTreeMap;
use std::path::Path;

use chrono::{DateTime, Utc};
use chunk_model::{ChunkId, ChunkRecord, DocumentId, FileRecord, MediaType};
use rusqlite::{params, Connection, OptionalExtension};

use crate::{
    ChunkPrimaryStore, ChunkStoreRead, DocumentStats, FilterClause, FilterOp, SearchHit,
    StoreError, TranscriptRecord,
};

pub struct SqliteRepo {
    conn: Connection,
}

impl SqliteRepo {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        let repo = Self { conn };
        repo.init_schema()?;
        Ok(repo)
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        let repo = Self { conn };
        repo.init_schema()?;
        Ok(repo)
    }

    fn init_schema(&self) -> Result<(), StoreError> {
        self.conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS documents (
                id TEXT PRIMARY KEY,
                content_hash TEXT NOT NULL,
                path TEXT NOT NULL,
                filename TEXT NOT NULL,
                extension TEXT NOT NULL,
                media_type TEXT NOT NULL,
                size_bytes INTEGER,
                created_at TEXT,
                modified_at TEXT,
                indexed_at TEXT NOT NULL,
                is_deleted INTEGER NOT NULL DEFAULT 0,
                deleted_at TEXT,
                duration_seconds REAL,
                width INTEGER,
                height INTEGER,
                doc_revision INTEGER,
                source_uri TEXT NOT NULL,
                source_mime TEXT NOT NULL,
                extracted_at TEXT,
                page_count INTEGER,
                title_guess TEXT,
                author_guess TEXT,
                dominant_lang TEXT,
                tags TEXT,
                ingest_tool TEXT,
                ingest_tool_version TEXT,
                reader_backend TEXT,
                ocr_used INTEGER NOT NULL DEFAULT 0,
                ocr_langs TEXT,
                chunk_count INTEGER,
                total_tokens INTEGER,
                meta TEXT,
                extra TEXT
            );
            CREATE UNIQUE INDEX IF NOT EXISTS idx_documents_hash_live
                ON documents(content_hash) WHERE is_deleted = 0;
            CREATE INDEX IF NOT EXISTS idx_documents_path ON documents(path);

            CREATE TABLE IF NOT EXISTS chunks (
                chunk_id TEXT PRIMARY KEY,
                doc_id TEXT NOT NULL,
                chunk_index INTEGER NOT NULL,
                source_uri TEXT NOT NULL,
                source_mime TEXT NOT NULL,
                extracted_at TEXT,
                page_start INTEGER,
                page_end INTEGER,
                start_time REAL,
                end_time REAL,
                text TEXT NOT NULL,
                section_path TEXT,
                meta TEXT,
                extra TEXT,
                path TEXT,
                filename TEXT,
                media_type TEXT
            );
            CREATE INDEX IF NOT EXISTS idx_chunks_doc_id ON chunks(doc_id);

            CREATE VIRTUAL TABLE IF NOT EXISTS chunks_fts USING fts5(
                chunk_id UNINDEXED,
                doc_id UNINDEXED,
                text,
                path UNINDEXED,
                filename UNINDEXED,
                tokenize = 'unicode61'
            );

            CREATE TABLE IF NOT EXISTS transcripts (
                id TEXT PRIMARY KEY,
                document_id TEXT NOT NULL,
                full_text TEXT NOT NULL,
                language TEXT,
                duration_seconds REAL,
                word_count INTEGER
            );
            CREATE INDEX IF NOT EXISTS idx_transcripts_doc ON transcripts(document_id);
            "#,
        )?;
        Ok(())
    }

    /// Re-populate `chunks_fts` from `chunks` if the two have drifted (e.g.
    /// after a bulk import that bypassed `upsert_chunks`). Cheap no-op when
    /// counts already match.
    pub fn maybe_rebuild_fts(&self) -> Result<(), StoreError> {
        let chunk_count: i64 =
            self.conn.query_row("SELECT COUNT(*) FROM chunks", [], |r| r.get(0))?;
        let fts_count: i64 =
            self.conn.query_row("SELECT COUNT(*) FROM chunks_fts", [], |r| r.get(0))?;
        if chunk_count == fts_count {
            return Ok(());
        }
        self.conn.execute("DELETE FROM chunks_fts", [])?;
        self.conn.execute(
            "INSERT INTO chunks_fts (chunk_id, doc_id, text, path, filename)
             SELECT chunk_id, doc_id, text, path, filename FROM chunks",
            [],
        )?;
        Ok(())
    }

    pub fn fts_match_count(&self, query: &str) -> Result<i64, StoreError> {
        if query.trim().is_empty() {
            return Ok(0);
        }
        let n: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM chunks_fts WHERE chunks_fts MATCH ?1",
            params![disjunctive_fts_query(query)],
            |r| r.get(0),
        )?;
        Ok(n)
    }

    /// Counts `(chunks, chunks_fts)` rows, for quick consistency checks (I2).
    pub fn counts(&self) -> Result<(i64, i64), StoreError> {
        let chunks: i64 = self.conn.query_row("SELECT COUNT(*) FROM chunks", [], |r| r.get(0))?;
        let fts: i64 =
            self.conn.query_row("SELECT COUNT(*) FROM chunks_fts", [], |r| r.get(0))?;
        Ok((chunks, fts))
    }

    // ---- Documents -----------------------------------------------------

    pub fn add_document(&self, doc: &FileRecord) -> Result<(), StoreError> {
        self.conn.execute(
            r#"INSERT INTO documents (
                id, content_hash, path, filename, extension, media_type, size_bytes,
                created_at, modified_at, indexed_at, is_deleted, deleted_at,
                duration_seconds, width, height, doc_revision, source_uri, source_mime,
                extracted_at, page_count, title_guess, author_guess, dominant_lang,
                tags, ingest_tool, ingest_tool_version, reader_backend, ocr_used,
                ocr_langs, chunk_count, total_tokens, meta, extra
            ) VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12,?13,?14,?15,?16,?17,?18,
                      ?19,?20,?21,?22,?23,?24,?25,?26,?27,?28,?29,?30,?31,?32,?33)
            ON CONFLICT(id) DO UPDATE SET
                content_hash=excluded.content_hash, path=excluded.path,
                filename=excluded.filename, extension=excluded.extension,
                media_type=excluded.media_type, size_bytes=excluded.size_bytes,
                created_at=excluded.created_at, modified_at=excluded.modified_at,
                indexed_at=excluded.indexed_at, is_deleted=excluded.is_deleted,
                deleted_at=excluded.deleted_at, duration_seconds=excluded.duration_seconds,
                width=excluded.width, height=excluded.height,
                doc_revision=excluded.doc_revision, chunk_count=excluded.chunk_count,
                total_tokens=excluded.total_tokens, meta=excluded.meta, extra=excluded.extra
            "#,
            params![
                doc.doc_id.0,
                doc.content_sha256,
                doc.source_uri,
                file_name_of(&doc.source_uri),
                extension_of(&doc.source_uri),
                doc.media_type.as_str(),
                doc.file_size_bytes.map(|v| v as i64),
                doc.created_at_meta,
                doc.updated_at_meta,
                doc.extracted_at,
                0i64,
                None::<String>,
                doc.duration_seconds,
                doc.width,
                doc.height,
                doc.doc_revision,
                doc.source_uri,
                doc.source_mime,
                doc.extracted_at,
                doc.page_count,
                doc.title_guess,
                doc.author_guess,
                doc.dominant_lang,
                serde_json::to_string(&doc.tags)?,
                doc.ingest_tool,
                doc.ingest_tool_version,
                doc.reader_backend,
                doc.ocr_used.unwrap_or(false) as i64,
                serde_json::to_string(&doc.ocr_langs)?,
                doc.chunk_count.map(|v| v as i64),
                doc.total_tokens.map(|v| v as i64),
                serde_json::to_string(&doc.meta)?,
                serde_json::to_string(&doc.extra)?,
            ],
        )?;
        Ok(())
    }

    pub fn get_document_by_id(&self, id: &DocumentId) -> Result<Option<FileRecord>, StoreError> {
        self.conn
            .query_row("SELECT * FROM documents WHERE id = ?1", params![id.0], row_to_file_record)
            .optional()
            .map_err(StoreError::from)
    }

    pub fn get_document_by_hash(&self, hash: &str) -> Result<Option<FileRecord>, StoreError> {
        self.conn
            .query_row(
                "SELECT * FROM documents WHERE content_hash = ?1 AND is_deleted = 0",
                params![hash],
                row_to_file_record,
            )
            .optional()
            .map_err(StoreError::from)
    }

    pub fn get_document_by_path(&self, path: &str) -> Result<Option<FileRecord>, StoreError> {
        self.conn
            .query_row(
                "SELECT * FROM documents WHERE path = ?1 AND is_deleted = 0",
                params![path],
                row_to_file_record,
            )
            .optional()
            .map_err(StoreError::from)
    }

    /// `(exists Document with hash H) AND zero chunks AND zero transcript`:
    /// the orphan state from spec §9's first Open Question.
    pub fn is_orphan_document(&self, id: &DocumentId) -> Result<bool, StoreError> {
        let chunk_count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM chunks WHERE doc_id = ?1",
            params![id.0],
            |r| r.get(0),
        )?;
        if chunk_count > 0 {
            return Ok(false);
        }
        let transcript_count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM transcripts WHERE document_id = ?1",
            params![id.0],
            |r| r.get(0),
        )?;
        Ok(transcript_count == 0)
    }

    pub fn soft_delete_document(&self, id: &DocumentId) -> Result<(), StoreError> {
        let n = self.conn.execute(
            "UPDATE documents SET is_deleted = 1, deleted_at = ?2 WHERE id = ?1",
            params![id.0, Utc::now().to_rfc3339()],
        )?;
        if n == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    /// Cascades to chunks, chunks_fts, and transcripts. Idempotent.
    pub fn hard_delete_document(&self, id: &DocumentId) -> Result<(), StoreError> {
        let ids: Vec<String> = {
            let mut stmt = self.conn.prepare("SELECT chunk_id FROM chunks WHERE doc_id = ?1")?;
            let rows = stmt.query_map(params![id.0], |r| r.get::<_, String>(0))?;
            rows.collect::<Result<_, _>>()?
        };
        for cid in &ids {
            self.conn.execute("DELETE FROM chunks_fts WHERE chunk_id = ?1", params![cid])?;
        }
        self.conn.execute("DELETE FROM chunks WHERE doc_id = ?1", params![id.0])?;
        self.conn.execute("DELETE FROM transcripts WHERE document_id = ?1", params![id.0])?;
        self.conn.execute("DELETE FROM documents WHERE id = ?1", params![id.0])?;
        Ok(())
    }

    pub fn list_recent_documents(
        &self,
        limit: usize,
        media_type: Option<MediaType>,
    ) -> Result<Vec<FileRecord>, StoreError> {
        let mut stmt = if media_type.is_some() {
            self.conn.prepare(
                "SELECT * FROM documents WHERE is_deleted = 0 AND media_type = ?1
                 ORDER BY indexed_at DESC LIMIT ?2",
            )?
        } else {
            self.conn.prepare(
                "SELECT * FROM documents WHERE is_deleted = 0 ORDER BY indexed_at DESC LIMIT ?1",
            )?
        };
        let rows = if let Some(mt) = media_type {
            stmt.query_map(params![mt.as_str(), limit as i64], row_to_file_record)?
        } else {
            stmt.query_map(params![limit as i64], row_to_file_record)?
        };
        rows.collect::<Result<Vec<_>, _>>().map_err(StoreError::from)
    }

    pub fn document_stats(&self) -> Result<DocumentStats, StoreError> {
        let total_documents: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM documents WHERE is_deleted = 0",
            [],
            |r| r.get(0),
        )?;
        let total_chunks: i64 = self.conn.query_row("SELECT COUNT(*) FROM chunks", [], |r| r.get(0))?;
        let last_indexed_at: Option<String> = self
            .conn
            .query_row(
                "SELECT MAX(indexed_at) FROM documents WHERE is_deleted = 0",
                [],
                |r| r.get(0),
            )
            .optional()?
            .flatten();
        let mut stmt = self.conn.prepare(
            "SELECT media_type, COUNT(*) FROM documents WHERE is_deleted = 0 GROUP BY media_type",
        )?;
        let by_media_type = stmt
            .query_map([], |r| Ok((r.get::<_, String>(0)?, r.get::<_, i64>(1)?)))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(DocumentStats {
            total_documents,
            by_media_type,
            total_chunks,
            last_indexed_at: last_indexed_at
                .and_then(|s| DateTime::parse_from_rfc3339(&s).ok())
                .map(|dt| dt.with_timezone(&Utc)),
        })
    }

    /// Group live document paths by their 4-path-segment prefix, returning
    /// the 20 most populous prefixes. Restored from `sqlite_client.py`'s
    /// indexed-directory summary (spec §4.7), undescribed concretely by the
    /// distilled spec.
    pub fn indexed_directory_summary(&self) -> Result<Vec<(String, i64)>, StoreError> {
        let mut stmt =
            self.conn.prepare("SELECT path FROM documents WHERE is_deleted = 0")?;
        let paths = stmt
            .query_map([], |r| r.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        let mut counts: BTreeMap<String, i64> = BTreeMap::new();
        for path in paths {
            let prefix: String = path
                .split('/')
                .filter(|s| !s.is_empty())
                .take(4)
                .collect::<Vec<_>>()
                .join("/");
            if prefix.is_empty() {
                continue;
            }
            *counts.entry(format!("/{prefix}")).or_insert(0) += 1;
        }
        let mut v: Vec<(String, i64)> = counts.into_iter().collect();
        v.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        v.truncate(20);
        Ok(v)
    }

    // ---- Chunks ----------------------------------------------------------

    pub fn upsert_chunks(&self, records: Vec<ChunkRecord>) -> Result<(), StoreError> {
        for rec in &records {
            let (path, filename, media_type) = self
                .get_document_by_id(&rec.doc_id)?
                .map(|d| {
                    (
                        d.source_uri.clone(),
                        file_name_of(&d.source_uri),
                        d.media_type.as_str().to_string(),
                    )
                })
                .unwrap_or_else(|| {
                    (rec.source_uri.clone(), file_name_of(&rec.source_uri), "document".to_string())
                });

            self.conn.execute(
                r#"INSERT INTO chunks (
                    chunk_id, doc_id, chunk_index, source_uri, source_mime, extracted_at,
                    page_start, page_end, start_time, end_time, text, section_path,
                    meta, extra, path, filename, media_type
                ) VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12,?13,?14,?15,?16,?17)
                ON CONFLICT(chunk_id) DO UPDATE SET
                    chunk_index=excluded.chunk_index, text=excluded.text,
                    extracted_at=excluded.extracted_at, page_start=excluded.page_start,
                    page_end=excluded.page_end, start_time=excluded.start_time,
                    end_time=excluded.end_time, section_path=excluded.section_path,
                    meta=excluded.meta, extra=excluded.extra
                "#,
                params![
                    rec.chunk_id.0,
                    rec.doc_id.0,
                    rec.chunk_index,
                    rec.source_uri,
                    rec.source_mime,
                    rec.extracted_at,
                    rec.page_start,
                    rec.page_end,
                    rec.start_time,
                    rec.end_time,
                    rec.text,
                    serde_json::to_string(&rec.section_path)?,
                    serde_json::to_string(&rec.meta)?,
                    serde_json::to_string(&rec.extra)?,
                    path,
                    filename,
                    media_type,
                ],
            )?;

            self.conn.execute(
                "INSERT OR REPLACE INTO chunks_fts (chunk_id, doc_id, text, path, filename)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![rec.chunk_id.0, rec.doc_id.0, rec.text, path, filename],
            )?;
        }
        Ok(())
    }

    pub fn get_chunks_by_ids(&self, ids: &[ChunkId]) -> Result<Vec<ChunkRecord>, StoreError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let placeholders = ids.iter().map(|_| "?").collect::<Vec<_>>().join(",");
        let sql = format!(
            "SELECT chunk_id, doc_id, chunk_index, source_uri, source_mime, extracted_at,
                    page_start, page_end, start_time, end_time, text, section_path, meta, extra
             FROM chunks WHERE chunk_id IN ({placeholders})"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let params_vec: Vec<&dyn rusqlite::ToSql> =
            ids.iter().map(|id| &id.0 as &dyn rusqlite::ToSql).collect();
        let rows = stmt.query_map(params_vec.as_slice(), row_to_chunk_record)?;
        let mut found = rows.collect::<Result<Vec<_>, _>>()?;
        // Preserve caller's requested order (matches ranked-search usage).
        let order: std::collections::HashMap<&str, usize> =
            ids.iter().enumerate().map(|(i, id)| (id.0.as_str(), i)).collect();
        found.sort_by_key(|c| order.get(c.chunk_id.0.as_str()).copied().unwrap_or(usize::MAX));
        Ok(found)
    }

    pub fn list_chunk_ids_by_filter(
        &self,
        filters: &[FilterClause],
        limit: usize,
        offset: usize,
    ) -> Result<Vec<ChunkId>, StoreError> {
        let (where_sql, params_dyn) = build_where(filters);
        let sql = format!(
            "SELECT chunk_id FROM chunks {where_sql} ORDER BY chunk_id LIMIT ?{} OFFSET ?{}",
            params_dyn.len() + 1,
            params_dyn.len() + 2
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let mut all_params: Vec<&dyn rusqlite::ToSql> =
            params_dyn.iter().map(|p| p.as_ref()).collect();
        let limit_i = limit as i64;
        let offset_i = offset as i64;
        all_params.push(&limit_i);
        all_params.push(&offset_i);
        let rows = stmt.query_map(all_params.as_slice(), |r| r.get::<_, String>(0))?;
        rows.map(|r| r.map(ChunkId).map_err(StoreError::from)).collect()
    }

    pub fn delete_by_ids(&self, ids: &[ChunkId]) -> Result<usize, StoreError> {
        if ids.is_empty() {
            return Ok(0);
        }
        let mut n = 0usize;
        for id in ids {
            n += self.conn.execute("DELETE FROM chunks WHERE chunk_id = ?1", params![id.0])?;
            self.conn.execute("DELETE FROM chunks_fts WHERE chunk_id = ?1", params![id.0])?;
        }
        Ok(n)
    }

    /// BM25 full-text search. Lower raw `rank` is better; returns hits with a
    /// positive displayed score (`abs(rank)`), per spec §4.7.
    pub fn fts_search(&self, query: &str, limit: usize) -> Result<Vec<SearchHit>, StoreError> {
        let q = disjunctive_fts_query(query);
        if q.is_empty() {
            return Ok(Vec::new());
        }
        let mut stmt = self.conn.prepare(
            "SELECT c.chunk_id, c.doc_id, c.chunk_index, c.source_uri, c.source_mime,
                    c.extracted_at, c.page_start, c.page_end, c.start_time, c.end_time,
                    c.text, c.section_path, c.meta, c.extra, bm25(chunks_fts) as rank
             FROM chunks_fts
             JOIN chunks c ON c.chunk_id = chunks_fts.chunk_id
             WHERE chunks_fts MATCH ?1
             ORDER BY rank LIMIT ?2",
        )?;
        let rows = stmt.query_map(params![q, limit as i64], |row| {
            let chunk = row_to_chunk_record(row)?;
            let rank: f64 = row.get(14)?;
            Ok(SearchHit { chunk, score: rank.abs() as f32 })
        })?;
        rows.collect::<Result<Vec<_>, _>>().map_err(StoreError::from)
    }

    // ---- Transcripts -------------------------------------------------------

    pub fn upsert_transcript(&self, t: &TranscriptRecord) -> Result<(), StoreError> {
        self.conn.execute(
            "INSERT INTO transcripts (id, document_id, full_text, language, duration_seconds, word_count)
             VALUES (?1,?2,?3,?4,?5,?6)
             ON CONFLICT(id) DO UPDATE SET full_text=excluded.full_text, language=excluded.language,
                duration_seconds=excluded.duration_seconds, word_count=excluded.word_count",
            params![t.id, t.document_id.0, t.full_text, t.language, t.duration_seconds, t.word_count],
        )?;
        Ok(())
    }

    pub fn get_transcript_by_document(
        &self,
        doc_id: &DocumentId,
    ) -> Result<Option<TranscriptRecord>, StoreError> {
        self.conn
            .query_row(
                "SELECT id, document_id, full_text, language, duration_seconds, word_count
                 FROM transcripts WHERE document_id = ?1",
                params![doc_id.0],
                |row| {
                    Ok(TranscriptRecord {
                        id: row.get(0)?,
                        document_id: DocumentId(row.get(1)?),
                        full_text: row.get(2)?,
                        language: row.get(3)?,
                        duration_seconds: row.get(4)?,
                        word_count: row.get(5)?,
                    })
                },
            )
            .optional()
            .map_err(StoreError::from)
    }

    pub fn delete_transcript_by_document(&self, doc_id: &DocumentId) -> Result<(), StoreError> {
        self.conn.execute("DELETE FROM transcripts WHERE document_id = ?1", params![doc_id.0])?;
        Ok(())
    }
}

impl ChunkPrimaryStore for SqliteRepo {
    fn upsert_chunks(&mut self, records: Vec<ChunkRecord>) -> Result<(), StoreError> {
        SqliteRepo::upsert_chunks(self, records)
    }

    fn delete_by_ids(&mut self, ids: &[ChunkId]) -> Result<usize, StoreError> {
        SqliteRepo::delete_by_ids(self, ids)
    }

    fn list_chunk_ids_by_filter(
        &self,
        filters: &[FilterClause],
        limit: usize,
        offset: usize,
    ) -> Result<Vec<ChunkId>, StoreError> {
        SqliteRepo::list_chunk_ids_by_filter(self, filters, limit, offset)
    }
}

impl ChunkStoreRead for SqliteRepo {
    fn get_chunks_by_ids(&self, ids: &[ChunkId]) -> Result<Vec<ChunkRecord>, StoreError> {
        SqliteRepo::get_chunks_by_ids(self, ids)
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }
}

fn build_where(filters: &[FilterClause]) -> (String, Vec<Box<dyn rusqlite::ToSql>>) {
    if filters.is_empty() {
        return (String::new(), Vec::new());
    }
    let mut clauses = Vec::new();
    let mut params_dyn: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();
    for f in filters {
        match &f.op {
            FilterOp::DocIdEq(v) => {
                clauses.push("doc_id = ?".to_string());
                params_dyn.push(Box::new(v.clone()));
            }
            FilterOp::DocIdIn(vs) => {
                if vs.is_empty() {
                    clauses.push("0".to_string());
                    continue;
                }
                let ph = vs.iter().map(|_| "?").collect::<Vec<_>>().join(",");
                clauses.push(format!("doc_id IN ({ph})"));
                for v in vs {
                    params_dyn.push(Box::new(v.clone()));
                }
            }
            FilterOp::SourceUriPrefix(p) => {
                clauses.push("path LIKE ?".to_string());
                params_dyn.push(Box::new(format!("{p}%")));
            }
            FilterOp::MediaTypeEq(mt) => {
                clauses.push("media_type = ?".to_string());
                params_dyn.push(Box::new(mt.clone()));
            }
            FilterOp::RangeIsoDate { key, start, end, .. } => {
                if key == "extracted_at" {
                    if let Some(s) = start {
                        clauses.push("extracted_at >= ?".to_string());
                        params_dyn.push(Box::new(s.clone()));
                    }
                    if let Some(e) = end {
                        clauses.push("extracted_at <= ?".to_string());
                        params_dyn.push(Box::new(e.clone()));
                    }
                }
            }
        }
    }
    (format!("WHERE {}", clauses.join(" AND ")), params_dyn)
}

fn disjunctive_fts_query(query: &str) -> String {
    query
        .split_whitespace()
        .map(|term| term.replace('"', ""))
        .filter(|t| !t.is_empty())
        .map(|t| format!("\"{t}\""))
        .collect::<Vec<_>>()
        .join(" OR ")
}

fn file_name_of(uri: &str) -> String {
    uri.rsplit('/').next().unwrap_or(uri).to_string()
}

fn extension_of(uri: &str) -> String {
    file_name_of(uri)
        .rsplit('.')
        .next()
        .map(|e| e.to_lowercase())
        .unwrap_or_default()
}

fn row_to_chunk_record(row: &rusqlite::Row) -> rusqlite::Result<ChunkRecord> {
    let section_path_json: Option<String> = row.get(11)?;
    let meta_json: String = row.get(12)?;
    let extra_json: String = row.get(13)?;
    Ok(ChunkRecord {
        schema_version: chunk_model::SCHEMA_MAJOR,
        chunk_id: ChunkId(row.get(0)?),
        doc_id: DocumentId(row.get(1)?),
        chunk_index: row.get(2)?,
        source_uri: row.get(3)?,
        source_mime: row.get(4)?,
        extracted_at: row.get(5)?,
        page_start: row.get(6)?,
        page_end: row.get(7)?,
        start_time: row.get(8)?,
        end_time: row.get(9)?,
        text: row.get(10)?,
        section_path: section_path_json.and_then(|s| serde_json::from_str(&s).ok()),
        meta: serde_json::from_str(&meta_json).unwrap_or_default(),
        extra: serde_json::from_str(&extra_json).unwrap_or_default(),
    })
}

fn row_to_file_record(row: &rusqlite::Row) -> rusqlite::Result<FileRecord> {
    let media_type_str: String = row.get("media_type")?;
    let tags_json: Option<String> = row.get("tags")?;
    let ocr_langs_json: Option<String> = row.get("ocr_langs")?;
    let meta_json: Option<String> = row.get("meta")?;
    let extra_json: Option<String> = row.get("extra")?;
    let is_deleted: i64 = row.get("is_deleted")?;
    let ocr_used: i64 = row.get("ocr_used")?;
    Ok(FileRecord {
        schema_version: chunk_model::SCHEMA_MAJOR,
        doc_id: DocumentId(row.get("id")?),
        doc_revision: row.get("doc_revision")?,
        source_uri: row.get("source_uri")?,
        source_mime: row.get("source_mime")?,
        file_size_bytes: row.get::<_, Option<i64>>("size_bytes")?.map(|v| v as u64),
        content_sha256: row.get("content_hash")?,
        media_type: media_type_str.parse().unwrap_or(MediaType::Document),
        page_count: row.get("page_count")?,
        extracted_at: row.get::<_, Option<String>>("extracted_at")?.unwrap_or_default(),
        created_at_meta: row.get("created_at")?,
        updated_at_meta: row.get("modified_at")?,
        title_guess: row.get("title_guess")?,
        author_guess: row.get("author_guess")?,
        dominant_lang: row.get("dominant_lang")?,
        tags: tags_json.and_then(|s| serde_json::from_str(&s).ok()).unwrap_or_default(),
        ingest_tool: row.get("ingest_tool")?,
        ingest_tool_version: row.get("ingest_tool_version")?,
        reader_backend: row.get("reader_backend")?,
        ocr_used: Some(ocr_used != 0),
        ocr_langs: ocr_langs_json.and_then(|s| serde_json::from_str(&s).ok()).unwrap_or_default(),
        chunk_count: row.get::<_, Option<i64>>("chunk_count")?.map(|v| v as u32),
        total_tokens: row.get::<_, Option<i64>>("total_tokens")?.map(|v| v as u32),
        duration_seconds: row.get("duration_seconds")?,
        width: row.get("width")?,
        height: row.get("height")?,
        is_deleted: is_deleted != 0,
        deleted_at: row.get("deleted_at")?,
        meta: meta_json.and_then(|s| serde_json::from_str(&s).ok()).unwrap_or_default(),
        extra: extra_json.and_then(|s| serde_json::from_str(&s).ok()).unwrap_or_default(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn sample_file_record(doc_id: &str, hash: &str) -> FileRecord {
        FileRecord {
            schema_version: chunk_model::SCHEMA_MAJOR,
            doc_id: DocumentId(doc_id.into()),
            doc_revision: Some(1),
            source_uri: format!("/corpus/{doc_id}.txt"),
            source_mime: "text/plain".into(),
            file_size_bytes: Some(42),
            content_sha256: Some(hash.into()),
            media_type: MediaType::Document,
            page_count: None,
            extracted_at: "2024-01-01T00:00:00Z".into(),
            created_at_meta: None,
            updated_at_meta: None,
            title_guess: None,
            author_guess: None,
            dominant_lang: None,
            tags: vec![],
            ingest_tool: Some("file-chunker".into()),
            ingest_tool_version: Some("0.1.0".into()),
            reader_backend: Some("txt".into()),
            ocr_used: Some(false),
            ocr_langs: vec![],
            chunk_count: Some(1),
            total_tokens: None,
            duration_seconds: None,
            width: None,
            height: None,
            is_deleted: false,
            deleted_at: None,
            meta: BTreeMap::new(),
            extra: BTreeMap::new(),
        }
    }

    fn sample_chunk(doc_id: &str, chunk_id: &str, idx: u32) -> ChunkRecord {
        ChunkRecord {
            schema_version: chunk_model::SCHEMA_MAJOR,
            doc_id: DocumentId(doc_id.into()),
            chunk_id: ChunkId(chunk_id.into()),
            chunk_index: idx,
            source_uri: format!("/corpus/{doc_id}.txt"),
            source_mime: "text/plain".into(),
            extracted_at: "2024-01-01T00:00:00Z".into(),
            page_start: None,
            page_end: None,
            start_time: None,
            end_time: None,
            text: "the quick brown fox".into(),
            section_path: None,
            meta: BTreeMap::new(),
            extra: BTreeMap::new(),
        }
    }

    #[test]
    fn dedup_by_hash_is_unique_among_live_rows() {
        let repo = SqliteRepo::open_in_memory().unwrap();
        repo.add_document(&sample_file_record("d1", "H")).unwrap();
        assert!(repo.get_document_by_hash("H").unwrap().is_some());

        // A second insert with the same hash but a different id must violate
        // the partial unique index (I1).
        let err = repo.add_document(&sample_file_record("d2", "H"));
        assert!(err.is_err());
    }

    #[test]
    fn hard_delete_cascades_chunks_and_fts() {
        let repo = SqliteRepo::open_in_memory().unwrap();
        repo.add_document(&sample_file_record("d1", "H1")).unwrap();
        repo.upsert_chunks(vec![sample_chunk("d1", "d1#0", 0)]).unwrap();
        assert_eq!(repo.counts().unwrap(), (1, 1));

        repo.hard_delete_document(&DocumentId("d1".into())).unwrap();
        assert_eq!(repo.counts().unwrap(), (0, 0));
        assert!(repo.get_document_by_id(&DocumentId("d1".into())).unwrap().is_none());
    }

    #[test]
    fn fts_search_finds_inserted_chunk() {
        let repo = SqliteRepo::open_in_memory().unwrap();
        repo.add_document(&sample_file_record("d1", "H1")).unwrap();
        repo.upsert_chunks(vec![sample_chunk("d1", "d1#0", 0)]).unwrap();

        let hits = repo.fts_search("fox", 10).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].chunk.chunk_id.0, "d1#0");
    }

    #[test]
    fn orphan_detection_true_before_chunks_written() {
        let repo = SqliteRepo::open_in_memory().unwrap();
        repo.add_document(&sample_file_record("d1", "H1")).unwrap();
        assert!(repo.is_orphan_document(&DocumentId("d1".into())).unwrap());
        repo.upsert_chunks(vec![sample_chunk("d1", "d1#0", 0)]).unwrap();
        assert!(!repo.is_orphan_document(&DocumentId("d1".into())).unwrap());
    }
}
