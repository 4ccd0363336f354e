//! Owns every long-lived handle the service needs, constructed once at
//! process start and threaded through by reference. Replaces the
//! lazy-static/global-singleton pattern the distilled spec described:
//! nothing here is reachable except through a `Context` value, so tests can
//! build as many independent instances as they like.
//!
//! `SqliteRepo` and `HnswIndex` are opened fresh per operation rather than
//! held as shared mutable fields — sqlite connections are cheap to open and
//! this sidesteps needing a mutex around either index when `Context` is
//! shared across worker threads behind an `Arc`.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chunking_store::hnsw_index::HnswIndex;
use chunking_store::sqlite_repo::SqliteRepo;
use embedding_provider::embedder::Embedder;

use crate::config::Settings;
use crate::vlm::VlmClient;
use crate::ServiceError;

pub struct Context {
    pub settings: Settings,
    pub db_path: PathBuf,
    pub hnsw_dir: PathBuf,
    pub embedder: Arc<dyn Embedder>,
    pub vlm: Arc<dyn VlmClient>,
}

impl Context {
    pub fn build(settings: Settings, embedder: Arc<dyn Embedder>, vlm: Arc<dyn VlmClient>) -> Result<Self, ServiceError> {
        std::fs::create_dir_all(&settings.data_dir).map_err(|e| ServiceError::Io(e.to_string()))?;
        let db_path = settings.data_dir.join("chunks.db");
        let hnsw_dir = settings.data_dir.join("hnsw");
        Ok(Self { settings, db_path, hnsw_dir, embedder, vlm })
    }

    pub fn embedding_dimension(&self) -> usize {
        self.embedder.info().dimension
    }

    /// Opens a fresh repo handle and makes sure its FTS mirror is current.
    pub fn open_repo(&self) -> Result<SqliteRepo, ServiceError> {
        let repo = SqliteRepo::open(&self.db_path).map_err(|e| ServiceError::Repo(e.to_string()))?;
        let _ = repo.maybe_rebuild_fts();
        Ok(repo)
    }

    /// Loads the persisted HNSW snapshot if present, otherwise returns a
    /// fresh empty index sized for the embedder's dimension.
    pub fn load_hnsw(&self) -> Result<HnswIndex, ServiceError> {
        if Path::new(&self.hnsw_dir).join("map.tsv").exists() {
            HnswIndex::load(&self.hnsw_dir, self.embedding_dimension(), 10_000)
                .map_err(|e| ServiceError::Io(e.to_string()))
        } else {
            Ok(HnswIndex::new(self.embedding_dimension(), 10_000))
        }
    }

    pub fn save_hnsw(&self, index: &HnswIndex) -> Result<(), ServiceError> {
        index.save(&self.hnsw_dir).map_err(|e| ServiceError::Io(e.to_string()))
    }
}
