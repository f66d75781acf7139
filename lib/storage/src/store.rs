use kpiscope_core::{Error, FlatIndex, Metadata, Result, SearchResult, Vector, VectorIndex};
use parking_lot::RwLock;
use std::ops::Range;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::persistence::{self, INDEX_FILE};

/// Where the index lives and how wide its vectors are
#[derive(Debug, Clone)]
pub struct StoreConfig {
    pub index_dir: PathBuf,
    pub dimension: usize,
}

impl StoreConfig {
    pub fn new<P: AsRef<Path>>(index_dir: P, dimension: usize) -> Self {
        Self {
            index_dir: index_dir.as_ref().to_path_buf(),
            dimension,
        }
    }

    pub fn index_path(&self) -> PathBuf {
        self.index_dir.join(INDEX_FILE)
    }
}

/// Summary of a store for logs and the CLI
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreStats {
    pub count: usize,
    pub dimension: usize,
    pub path: PathBuf,
    pub bytes_on_disk: u64,
}

struct StoreState {
    index: FlatIndex,
    metadata: Vec<Metadata>,
}

impl StoreState {
    fn persist(&self, path: &Path) -> Result<()> {
        persistence::write_index(path, self.index.dim(), self.index.as_slice(), &self.metadata)
    }
}

/// Durable archive of report embeddings and their metadata.
///
/// Vector `i` and metadata record `i` always describe the same report; the
/// pair is appended together and never moves. Writers hold the lock across
/// the append and the flush to disk, so readers only ever see persisted state.
pub struct VectorStore {
    path: PathBuf,
    state: RwLock<StoreState>,
}

impl VectorStore {
    /// Open the index under `config.index_dir`, or start an empty one.
    pub fn open(config: &StoreConfig) -> Result<Self> {
        if config.dimension == 0 {
            return Err(Error::InvalidConfig("dimension must be positive".to_string()));
        }

        let path = config.index_path();
        if path.exists() {
            let store = Self::load(&path)?;
            if store.dimension() != config.dimension {
                return Err(Error::DimensionMismatch {
                    expected: config.dimension,
                    actual: store.dimension(),
                });
            }
            Ok(store)
        } else {
            std::fs::create_dir_all(&config.index_dir)?;
            info!("Creating new report index at {:?} (dim {})", path, config.dimension);
            Ok(Self::empty(path, config.dimension))
        }
    }

    /// Load a store from an index file. Later writes go back to the same file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let snapshot = persistence::read_index(&path)?;
        let index = FlatIndex::from_raw(snapshot.dim, snapshot.vectors)?;
        info!("Loaded report index from {:?}: {} documents", path, index.len());

        Ok(Self {
            path,
            state: RwLock::new(StoreState {
                index,
                metadata: snapshot.metadata,
            }),
        })
    }

    fn empty(path: PathBuf, dimension: usize) -> Self {
        Self {
            path,
            state: RwLock::new(StoreState {
                index: FlatIndex::new(dimension),
                metadata: Vec::new(),
            }),
        }
    }

    /// Write the current contents to `path`, leaving the store's own file alone.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        self.state.read().persist(path.as_ref())
    }

    /// Append a batch and flush it to disk.
    ///
    /// Either the whole batch is stored and persisted, or the store is left
    /// exactly as it was.
    pub fn add(&self, vectors: Vec<Vector>, metadata: Vec<Metadata>) -> Result<Range<usize>> {
        if vectors.len() != metadata.len() {
            return Err(Error::LengthMismatch {
                vectors: vectors.len(),
                metadata: metadata.len(),
            });
        }

        let mut state = self.state.write();
        let before = state.index.len();
        if vectors.is_empty() {
            return Ok(before..before);
        }

        let ordinals = state.index.append(&vectors)?;
        state.metadata.extend(metadata);

        if let Err(e) = state.persist(&self.path) {
            state.index.truncate(before);
            state.metadata.truncate(before);
            return Err(e);
        }

        info!(
            "Indexed {} documents (ordinals {}..{})",
            ordinals.len(),
            ordinals.start,
            ordinals.end
        );
        Ok(ordinals)
    }

    /// Exact nearest neighbours of `query` by inner product.
    pub fn search(&self, query: &Vector, top_k: usize, min_similarity: f32) -> Result<Vec<SearchResult>> {
        let state = self.state.read();
        let hits = state.index.search(query.as_slice(), top_k, min_similarity)?;
        debug!(
            "Search over {} documents returned {} hits (top_k {}, min_similarity {})",
            state.index.len(),
            hits.len(),
            top_k,
            min_similarity
        );

        Ok(hits
            .into_iter()
            .map(|hit| SearchResult {
                score: hit.score,
                metadata: state.metadata[hit.ordinal].clone(),
                ordinal: hit.ordinal,
            })
            .collect())
    }

    /// Remove every document and persist the empty index. Irreversible.
    pub fn reset(&self) -> Result<()> {
        let mut state = self.state.write();
        let previous = state.index.len();
        state.index.clear();
        state.metadata.clear();
        state.persist(&self.path)?;
        info!("Report index cleared ({} documents removed)", previous);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.state.read().index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn dimension(&self) -> usize {
        self.state.read().index.dim()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn metadata(&self, ordinal: usize) -> Option<Metadata> {
        self.state.read().metadata.get(ordinal).cloned()
    }

    /// Stored vector at `ordinal`, as written.
    pub fn vector(&self, ordinal: usize) -> Option<Vector> {
        self.state.read().index.vector(ordinal).map(Vector::from_slice)
    }

    pub fn stats(&self) -> StoreStats {
        let state = self.state.read();
        StoreStats {
            count: state.index.len(),
            dimension: state.index.dim(),
            path: self.path.clone(),
            bytes_on_disk: std::fs::metadata(&self.path).map(|m| m.len()).unwrap_or(0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit(values: &[f32]) -> Vector {
        Vector::from_slice(values).normalized()
    }

    fn meta(company: &str) -> Metadata {
        Metadata::new().with("company", company)
    }

    #[test]
    fn test_open_creates_empty_store() {
        let dir = tempfile::tempdir().unwrap();
        let store = VectorStore::open(&StoreConfig::new(dir.path().join("idx"), 3)).unwrap();

        assert!(store.is_empty());
        assert_eq!(store.dimension(), 3);
        assert!(dir.path().join("idx").is_dir());
        assert!(store.search(&unit(&[1.0, 0.0, 0.0]), 5, 0.0).unwrap().is_empty());
    }

    #[test]
    fn test_add_keeps_metadata_in_lockstep() {
        let dir = tempfile::tempdir().unwrap();
        let store = VectorStore::open(&StoreConfig::new(dir.path(), 2)).unwrap();

        store.add(vec![unit(&[1.0, 0.0])], vec![meta("Acme")]).unwrap();
        let range = store
            .add(vec![unit(&[0.0, 1.0]), unit(&[1.0, 1.0])], vec![meta("Globex"), meta("Initech")])
            .unwrap();

        assert_eq!(range, 1..3);
        assert_eq!(store.len(), 3);
        assert_eq!(store.metadata(1).unwrap().company(), Some("Globex"));
        assert_eq!(store.metadata(2).unwrap().company(), Some("Initech"));
    }

    #[test]
    fn test_add_rejects_length_mismatch() {
        let dir = tempfile::tempdir().unwrap();
        let store = VectorStore::open(&StoreConfig::new(dir.path(), 2)).unwrap();

        let err = store.add(vec![unit(&[1.0, 0.0])], vec![]).unwrap_err();
        assert!(matches!(err, Error::LengthMismatch { vectors: 1, metadata: 0 }));
        assert!(store.is_empty());
    }

    #[test]
    fn test_add_rejects_dimension_mismatch_atomically() {
        let dir = tempfile::tempdir().unwrap();
        let store = VectorStore::open(&StoreConfig::new(dir.path(), 2)).unwrap();
        store.add(vec![unit(&[1.0, 0.0])], vec![meta("Acme")]).unwrap();

        let err = store
            .add(
                vec![unit(&[0.0, 1.0]), Vector::new(vec![1.0, 0.0, 0.0])],
                vec![meta("Globex"), meta("Initech")],
            )
            .unwrap_err();

        assert!(matches!(err, Error::DimensionMismatch { expected: 2, actual: 3 }));
        assert_eq!(store.len(), 1);
        assert_eq!(VectorStore::load(store.path()).unwrap().len(), 1);
    }

    #[test]
    fn test_failed_persist_rolls_back() {
        let dir = tempfile::tempdir().unwrap();
        // a directory sitting where the index file should be makes every write fail
        let blocked = dir.path().join("blocked");
        std::fs::create_dir_all(&blocked).unwrap();
        let store = VectorStore::empty(blocked.clone(), 2);

        assert!(store.add(vec![unit(&[1.0, 0.0])], vec![meta("Acme")]).is_err());
        assert!(store.is_empty());
        assert!(store.metadata(0).is_none());
    }

    #[test]
    fn test_empty_batch_does_not_touch_disk() {
        let dir = tempfile::tempdir().unwrap();
        let store = VectorStore::open(&StoreConfig::new(dir.path(), 2)).unwrap();

        assert_eq!(store.add(Vec::new(), Vec::new()).unwrap(), 0..0);
        assert!(!store.path().exists());
    }

    #[test]
    fn test_reopen_restores_contents() {
        let dir = tempfile::tempdir().unwrap();
        let config = StoreConfig::new(dir.path(), 2);
        let query = unit(&[1.0, 0.2]);
        let before = {
            let store = VectorStore::open(&config).unwrap();
            store
                .add(
                    vec![unit(&[1.0, 0.0]), unit(&[0.0, 1.0]), unit(&[1.0, 1.0])],
                    vec![meta("Acme"), meta("Globex"), meta("Initech")],
                )
                .unwrap();
            store.search(&query, 3, -1.0).unwrap()
        };

        let reopened = VectorStore::open(&config).unwrap();
        assert_eq!(reopened.len(), 3);
        assert_eq!(reopened.search(&query, 3, -1.0).unwrap(), before);
    }

    #[test]
    fn test_search_clamps_top_k_to_stored_rows() {
        let dir = tempfile::tempdir().unwrap();
        let store = VectorStore::open(&StoreConfig::new(dir.path(), 2)).unwrap();
        store.add(vec![unit(&[1.0, 0.0])], vec![meta("Acme")]).unwrap();

        let hits = store.search(&unit(&[1.0, 0.0]), usize::MAX, 0.0).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].metadata.company(), Some("Acme"));
    }

    #[test]
    fn test_open_rejects_dimension_change() {
        let dir = tempfile::tempdir().unwrap();
        let store = VectorStore::open(&StoreConfig::new(dir.path(), 2)).unwrap();
        store.add(vec![unit(&[1.0, 0.0])], vec![meta("Acme")]).unwrap();

        let err = VectorStore::open(&StoreConfig::new(dir.path(), 4)).err().unwrap();
        assert!(matches!(err, Error::DimensionMismatch { expected: 4, actual: 2 }));
    }

    #[test]
    fn test_reset_persists_empty_state() {
        let dir = tempfile::tempdir().unwrap();
        let config = StoreConfig::new(dir.path(), 2);
        let store = VectorStore::open(&config).unwrap();
        store.add(vec![unit(&[1.0, 0.0])], vec![meta("Acme")]).unwrap();

        store.reset().unwrap();

        assert!(store.is_empty());
        assert!(VectorStore::open(&config).unwrap().is_empty());
    }

    #[test]
    fn test_save_to_other_path() {
        let dir = tempfile::tempdir().unwrap();
        let store = VectorStore::open(&StoreConfig::new(dir.path().join("live"), 2)).unwrap();
        store.add(vec![unit(&[0.6, 0.8])], vec![meta("Acme")]).unwrap();

        let backup = dir.path().join("backup").join(INDEX_FILE);
        store.save(&backup).unwrap();
        let copy = VectorStore::load(&backup).unwrap();

        assert_eq!(copy.vector(0), store.vector(0));
        assert_eq!(copy.metadata(0), store.metadata(0));
        assert_eq!(copy.path(), backup.as_path());
    }

    #[test]
    fn test_stats() {
        let dir = tempfile::tempdir().unwrap();
        let store = VectorStore::open(&StoreConfig::new(dir.path(), 2)).unwrap();
        store.add(vec![unit(&[1.0, 0.0])], vec![meta("Acme")]).unwrap();

        let stats = store.stats();
        assert_eq!(stats.count, 1);
        assert_eq!(stats.dimension, 2);
        assert!(stats.bytes_on_disk > 0);
    }
}
