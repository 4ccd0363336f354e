//! Dense vector search backed by `hnsw_rs`. Deletions are tombstoned rather
//! than physically removed, since HNSW graphs do not support cheap node
//! removal; a tombstoned id is filtered out of `knn_ids` results and skipped
//! on the next `save`/reload.

use std::collections::{HashMap, HashSet};
use std::fs;
use std::io::{BufRead, BufReader, Write};
use std::path::Path;
use std::sync::RwLock;

use chunk_model::ChunkId;
use hnsw_rs::dist::DistCosine;
use hnsw_rs::hnsw::Hnsw;

use crate::{ChunkStoreRead, FilterClause, IndexCaps, SearchOptions, StoreError, VectorIndexMaintainer, VectorMatch, VectorSearcher};

const MAX_NB_CONNECTION: usize = 16;
const MAX_LAYER: usize = 16;
const EF_CONSTRUCTION: usize = 200;
/// File listing `internal_id<TAB>chunk_id` pairs; its presence signals an
/// existing on-disk index to [`HnswIndex::load`].
const MAP_FILE_NAME: &str = "map.tsv";

pub struct HnswIndex {
    dimension: usize,
    hnsw: Hnsw<'static, f32, DistCosine>,
    id_to_chunk: RwLock<HashMap<usize, ChunkId>>,
    chunk_to_id: RwLock<HashMap<ChunkId, usize>>,
    tombstoned: RwLock<HashSet<usize>>,
    next_id: std::sync::atomic::AtomicUsize,
}

impl HnswIndex {
    pub fn new(dimension: usize, capacity: usize) -> Self {
        let hnsw = Hnsw::new(MAX_NB_CONNECTION, capacity.max(16), MAX_LAYER, EF_CONSTRUCTION, DistCosine {});
        Self {
            dimension,
            hnsw,
            id_to_chunk: RwLock::new(HashMap::new()),
            chunk_to_id: RwLock::new(HashMap::new()),
            tombstoned: RwLock::new(HashSet::new()),
            next_id: std::sync::atomic::AtomicUsize::new(0),
        }
    }

    /// Loads a previously [`save`]d index if `dir/map.tsv` exists, otherwise
    /// constructs a fresh empty one with the given capacity hint.
    pub fn load(dir: impl AsRef<Path>, dimension: usize, capacity: usize) -> Result<Self, StoreError> {
        let dir = dir.as_ref();
        let map_path = dir.join(MAP_FILE_NAME);
        if !map_path.exists() {
            return Ok(Self::new(dimension, capacity));
        }
        let index = Self::new(dimension, capacity);
        let file = fs::File::open(&map_path)?;
        let mut vectors_path = dir.join("vectors.bin");
        if !vectors_path.exists() {
            vectors_path = dir.join("vectors.f32");
        }
        let raw = fs::read(&vectors_path).unwrap_or_default();
        let floats: Vec<f32> = raw
            .chunks_exact(4)
            .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
            .collect();

        for (line_no, line) in BufReader::new(file).lines().enumerate() {
            let line = line?;
            let mut parts = line.splitn(2, '\t');
            let (Some(id_str), Some(chunk_id_str)) = (parts.next(), parts.next()) else {
                continue;
            };
            let internal_id: usize = id_str
                .parse()
                .map_err(|_| StoreError::Index(format!("bad id at map.tsv:{line_no}")))?;
            let start = internal_id * dimension;
            let end = start + dimension;
            if end > floats.len() {
                continue;
            }
            let vector = &floats[start..end];
            index.hnsw.insert((vector, internal_id));
            index.id_to_chunk.write().unwrap().insert(internal_id, ChunkId(chunk_id_str.to_string()));
            index.chunk_to_id.write().unwrap().insert(ChunkId(chunk_id_str.to_string()), internal_id);
            index.next_id.fetch_max(internal_id + 1, std::sync::atomic::Ordering::SeqCst);
        }
        Ok(index)
    }

    /// Writes `map.tsv` (surviving ids only) and a flat `vectors.bin` of
    /// contiguous `f32` vectors indexed by internal id, sufficient for
    /// [`load`] to reconstruct the graph from scratch (hnsw_rs graphs are
    /// cheap to rebuild; we do not persist graph edges).
    pub fn save(&self, dir: impl AsRef<Path>) -> Result<(), StoreError> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir)?;
        let tombstoned = self.tombstoned.read().unwrap();
        let id_to_chunk = self.id_to_chunk.read().unwrap();

        let mut map_file = fs::File::create(dir.join(MAP_FILE_NAME))?;
        let mut max_id = 0usize;
        for (&id, chunk_id) in id_to_chunk.iter() {
            if tombstoned.contains(&id) {
                continue;
            }
            writeln!(map_file, "{id}\t{}", chunk_id.0)?;
            max_id = max_id.max(id + 1);
        }

        let mut vectors = vec![0f32; max_id * self.dimension];
        for &id in id_to_chunk.keys() {
            if tombstoned.contains(&id) {
                continue;
            }
            if let Some(v) = self.hnsw.get_point(id) {
                let start = id * self.dimension;
                vectors[start..start + self.dimension].copy_from_slice(v.get_v());
            }
        }
        let bytes: Vec<u8> = vectors.iter().flat_map(|f| f.to_le_bytes()).collect();
        fs::write(dir.join("vectors.bin"), bytes)?;
        Ok(())
    }

    fn next_internal_id(&self) -> usize {
        self.next_id.fetch_add(1, std::sync::atomic::Ordering::SeqCst)
    }
}

impl VectorSearcher for HnswIndex {
    fn name(&self) -> &'static str {
        "hnsw"
    }

    fn caps(&self) -> IndexCaps {
        IndexCaps { can_prefilter_meta: false, ..IndexCaps::default() }
    }

    fn knn_ids(
        &self,
        _store: &dyn ChunkStoreRead,
        query_vector: &[f32],
        _filters: &[FilterClause],
        opts: &SearchOptions,
    ) -> Vec<VectorMatch> {
        if query_vector.len() != self.dimension || opts.top_k == 0 {
            return Vec::new();
        }
        let tombstoned = self.tombstoned.read().unwrap();
        let id_to_chunk = self.id_to_chunk.read().unwrap();
        let fetch_n = opts.top_k.saturating_mul(opts.fetch_factor).max(opts.top_k);
        let neighbors = self.hnsw.search(query_vector, fetch_n, EF_CONSTRUCTION);

        let mut out = Vec::with_capacity(neighbors.len());
        for n in neighbors {
            if tombstoned.contains(&n.d_id) {
                continue;
            }
            let Some(chunk_id) = id_to_chunk.get(&n.d_id) else {
                continue;
            };
            // DistCosine yields a distance in [0, 2]; fold to a "higher is
            // better" score in [0, 1].
            let distance = n.distance;
            let score = 1.0 - (distance / 2.0).clamp(0.0, 1.0);
            out.push(VectorMatch { chunk_id: chunk_id.clone(), score, distance });
            if out.len() >= opts.top_k.saturating_mul(opts.fetch_factor).max(opts.top_k) {
                break;
            }
        }
        out
    }
}

impl VectorIndexMaintainer for HnswIndex {
    fn upsert_vectors(&mut self, vectors: &[(ChunkId, Vec<f32>)]) -> Result<(), StoreError> {
        for (chunk_id, vector) in vectors {
            if vector.len() != self.dimension {
                return Err(StoreError::Index(format!(
                    "vector dimension mismatch: expected {}, got {}",
                    self.dimension,
                    vector.len()
                )));
            }
            let existing_id = self.chunk_to_id.read().unwrap().get(chunk_id).copied();
            let internal_id = existing_id.unwrap_or_else(|| self.next_internal_id());
            if let Some(old) = existing_id {
                // hnsw_rs has no in-place update; tombstone the stale point
                // and insert a fresh one under a new internal id.
                self.tombstoned.write().unwrap().insert(old);
            }
            let assigned = if existing_id.is_some() { self.next_internal_id() } else { internal_id };
            self.hnsw.insert((vector.as_slice(), assigned));
            self.id_to_chunk.write().unwrap().insert(assigned, chunk_id.clone());
            self.chunk_to_id.write().unwrap().insert(chunk_id.clone(), assigned);
        }
        Ok(())
    }

    fn delete_by_ids(&mut self, ids: &[ChunkId]) -> Result<(), StoreError> {
        let mut chunk_to_id = self.chunk_to_id.write().unwrap();
        let mut tombstoned = self.tombstoned.write().unwrap();
        for id in ids {
            if let Some(internal_id) = chunk_to_id.remove(id) {
                tombstoned.insert(internal_id);
            }
        }
        Ok(())
    }
}
