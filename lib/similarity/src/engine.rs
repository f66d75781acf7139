use kpiscope_core::{Metadata, SearchResult, Vector};
use kpiscope_storage::VectorStore;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::embedder::{EmbeddingError, EmbeddingProvider};
use crate::retry::RetryPolicy;

pub const DEFAULT_TOP_K: usize = 5;
pub const DEFAULT_MIN_SIMILARITY: f32 = 0.5;
pub const DEFAULT_BATCH_SIZE: usize = 32;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error(transparent)]
    Embedding(#[from] EmbeddingError),

    #[error(transparent)]
    Store(#[from] kpiscope_core::Error),
}

/// Engine tuning
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub top_k: usize,
    pub min_similarity: f32,
    /// Texts per embedding call when indexing.
    pub batch_size: usize,
    /// Deadline handed to the provider for each call.
    pub embed_timeout: Duration,
    /// Applied to query embedding only.
    pub retry: RetryPolicy,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            top_k: DEFAULT_TOP_K,
            min_similarity: DEFAULT_MIN_SIMILARITY,
            batch_size: DEFAULT_BATCH_SIZE,
            embed_timeout: Duration::from_secs(30),
            retry: RetryPolicy::default(),
        }
    }
}

/// A report to archive: the text to embed and what to return on a hit
#[derive(Debug, Clone)]
pub struct Document {
    pub text: String,
    pub metadata: Metadata,
}

impl Document {
    pub fn new(text: impl Into<String>, metadata: Metadata) -> Self {
        Self {
            text: text.into(),
            metadata,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SearchOptions {
    pub top_k: usize,
    pub min_similarity: f32,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            top_k: DEFAULT_TOP_K,
            min_similarity: DEFAULT_MIN_SIMILARITY,
        }
    }
}

/// Typed capability for the orchestration layer: "find archived reports
/// similar to this text". Always answers; an empty list means nothing useful
/// was found or the lookup was unavailable.
pub trait SearchPort: Send + Sync {
    fn similar_reports(&self, query: &str, top_k: usize, min_similarity: f32) -> Vec<SearchResult>;
}

/// Text in, ranked archived reports out.
pub struct SimilaritySearchEngine {
    store: Arc<VectorStore>,
    embedder: Arc<dyn EmbeddingProvider>,
    config: EngineConfig,
}

impl SimilaritySearchEngine {
    pub fn new(
        store: Arc<VectorStore>,
        embedder: Arc<dyn EmbeddingProvider>,
        config: EngineConfig,
    ) -> Result<Self, EngineError> {
        if embedder.dimension() != store.dimension() {
            return Err(kpiscope_core::Error::DimensionMismatch {
                expected: store.dimension(),
                actual: embedder.dimension(),
            }
            .into());
        }
        if config.batch_size == 0 {
            return Err(kpiscope_core::Error::InvalidConfig("batch_size must be positive".to_string()).into());
        }

        info!(
            "Similarity engine ready: model {}, {} documents indexed",
            embedder.model_id(),
            store.len()
        );
        Ok(Self {
            store,
            embedder,
            config,
        })
    }

    pub fn store(&self) -> &Arc<VectorStore> {
        &self.store
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn len(&self) -> usize {
        self.store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }

    /// Embed and archive `documents`, in the order given.
    ///
    /// Nothing is stored unless every document embeds successfully. Not
    /// retried: re-running a partially observed call could insert duplicates.
    pub fn add_documents(&self, documents: &[Document]) -> Result<usize, EngineError> {
        if documents.is_empty() {
            return Ok(0);
        }
        info!("Indexing {} documents with {}", documents.len(), self.embedder.model_id());

        let mut vectors = Vec::with_capacity(documents.len());
        for batch in documents.chunks(self.config.batch_size) {
            let texts: Vec<&str> = batch.iter().map(|d| d.text.as_str()).collect();
            vectors.extend(self.embed_batch(&texts)?);
        }

        let metadata = documents.iter().map(|d| d.metadata.clone()).collect();
        let ordinals = self.store.add(vectors, metadata)?;
        Ok(ordinals.len())
    }

    /// Search with the configured `top_k` and `min_similarity`.
    pub fn search(&self, query: &str) -> Vec<SearchResult> {
        self.search_with(
            query,
            SearchOptions {
                top_k: self.config.top_k,
                min_similarity: self.config.min_similarity,
            },
        )
    }

    /// Reports similar to `query`, best first.
    ///
    /// Advisory: failures are logged and yield an empty list.
    pub fn search_with(&self, query: &str, options: SearchOptions) -> Vec<SearchResult> {
        if self.store.is_empty() {
            warn!("Report index is empty");
            return Vec::new();
        }

        match self.try_search(query, options) {
            Ok(results) => {
                info!(
                    "Found {} results for query: '{}'",
                    results.len(),
                    preview(query)
                );
                results
            }
            Err(e) => {
                warn!("Similarity search degraded to no results: {}", e);
                Vec::new()
            }
        }
    }

    fn try_search(&self, query: &str, options: SearchOptions) -> Result<Vec<SearchResult>, EngineError> {
        let embedding = self.config.retry.run(
            "query embedding",
            |_| self.embed_batch(&[query]),
            EmbeddingError::is_transient,
        )?;
        let query_vector = embedding
            .into_iter()
            .next()
            .ok_or(EmbeddingError::CountMismatch { expected: 1, actual: 0 })?;

        Ok(self
            .store
            .search(&query_vector, options.top_k, options.min_similarity)?)
    }

    /// Remove every archived document.
    pub fn clear(&self) -> Result<(), EngineError> {
        Ok(self.store.reset()?)
    }

    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vector>, EmbeddingError> {
        let limit = self.config.embed_timeout;
        let started = Instant::now();
        let vectors = self.embedder.embed(texts, limit)?;
        let elapsed = started.elapsed();

        if elapsed > limit {
            return Err(EmbeddingError::Timeout { elapsed, limit });
        }
        if vectors.len() != texts.len() {
            return Err(EmbeddingError::CountMismatch {
                expected: texts.len(),
                actual: vectors.len(),
            });
        }
        debug!("Embedded {} texts in {:?}", texts.len(), elapsed);
        Ok(vectors)
    }
}

impl SearchPort for SimilaritySearchEngine {
    fn similar_reports(&self, query: &str, top_k: usize, min_similarity: f32) -> Vec<SearchResult> {
        self.search_with(query, SearchOptions { top_k, min_similarity })
    }
}

fn preview(text: &str) -> String {
    const LIMIT: usize = 50;
    match text.char_indices().nth(LIMIT) {
        Some((cut, _)) => format!("{}...", &text[..cut]),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedder::HashingEmbedder;
    use kpiscope_storage::StoreConfig;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const DIM: usize = 128;

    /// Wraps the hashing embedder with injectable failures and latency.
    struct ScriptedEmbedder {
        inner: HashingEmbedder,
        failures_left: AtomicUsize,
        fail_on_call: AtomicUsize,
        calls: AtomicUsize,
        delay: Duration,
        drop_last: bool,
    }

    impl ScriptedEmbedder {
        fn new() -> Self {
            Self {
                inner: HashingEmbedder::new(DIM),
                failures_left: AtomicUsize::new(0),
                fail_on_call: AtomicUsize::new(usize::MAX),
                calls: AtomicUsize::new(0),
                delay: Duration::ZERO,
                drop_last: false,
            }
        }
    }

    impl EmbeddingProvider for ScriptedEmbedder {
        fn model_id(&self) -> &str {
            "scripted"
        }

        fn dimension(&self) -> usize {
            DIM
        }

        fn embed(&self, texts: &[&str], timeout: Duration) -> Result<Vec<Vector>, EmbeddingError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call == self.fail_on_call.load(Ordering::SeqCst) {
                return Err(EmbeddingError::Provider("connection reset".to_string()));
            }
            if self
                .failures_left
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
            {
                return Err(EmbeddingError::Provider("service unavailable".to_string()));
            }
            std::thread::sleep(self.delay);
            let mut out = self.inner.embed(texts, timeout)?;
            if self.drop_last {
                out.pop();
            }
            Ok(out)
        }
    }

    fn no_wait_config() -> EngineConfig {
        EngineConfig {
            retry: RetryPolicy {
                max_attempts: 3,
                base_delay: Duration::ZERO,
                max_delay: Duration::ZERO,
                multiplier: 2.0,
                jitter: false,
            },
            ..EngineConfig::default()
        }
    }

    fn engine_with(dir: &std::path::Path, embedder: Arc<dyn EmbeddingProvider>, config: EngineConfig) -> SimilaritySearchEngine {
        let store = Arc::new(VectorStore::open(&StoreConfig::new(dir, DIM)).unwrap());
        SimilaritySearchEngine::new(store, embedder, config).unwrap()
    }

    fn reports() -> Vec<Document> {
        vec![
            Document::new(
                "Acme Holdings balance sheet 2023 total assets current liabilities",
                Metadata::new().with("company", "Acme Holdings").with("report_type", "balance_sheet"),
            ),
            Document::new(
                "Globex income statement 2023 revenue gross profit net income",
                Metadata::new().with("company", "Globex").with("report_type", "income_statement"),
            ),
            Document::new(
                "Initech cash flow statement operating activities",
                Metadata::new().with("company", "Initech").with("report_type", "cash_flow"),
            ),
        ]
    }

    #[test]
    fn test_add_documents_appends_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let config = EngineConfig {
            batch_size: 2,
            ..no_wait_config()
        };
        let engine = engine_with(dir.path(), Arc::new(HashingEmbedder::new(DIM)), config);

        assert_eq!(engine.add_documents(&reports()).unwrap(), 3);
        assert_eq!(engine.add_documents(&reports()[..1]).unwrap(), 1);

        let companies: Vec<String> = (0..engine.len())
            .map(|i| engine.store().metadata(i).unwrap().company().unwrap().to_string())
            .collect();
        assert_eq!(companies, vec!["Acme Holdings", "Globex", "Initech", "Acme Holdings"]);
    }

    #[test]
    fn test_add_documents_empty_is_noop() {
        let dir = tempfile::tempdir().unwrap();
        let embedder = Arc::new(ScriptedEmbedder::new());
        let engine = engine_with(dir.path(), embedder.clone(), no_wait_config());

        assert_eq!(engine.add_documents(&[]).unwrap(), 0);
        assert_eq!(embedder.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_add_documents_failure_stores_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let config = EngineConfig {
            batch_size: 1,
            ..no_wait_config()
        };
        let embedder = Arc::new(ScriptedEmbedder::new());
        let engine = engine_with(dir.path(), embedder.clone(), config);
        engine.add_documents(&reports()[..1]).unwrap();
        // call 0 was the first add; the second batch of the next add fails
        embedder.fail_on_call.store(2, Ordering::SeqCst);

        let err = engine.add_documents(&reports()).unwrap_err();

        assert!(matches!(err, EngineError::Embedding(EmbeddingError::Provider(_))));
        assert_eq!(engine.len(), 1);
        assert_eq!(VectorStore::load(engine.store().path()).unwrap().len(), 1);
        // the write path is never retried
        assert_eq!(embedder.calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_add_documents_rejects_short_provider_output() {
        let dir = tempfile::tempdir().unwrap();
        let mut scripted = ScriptedEmbedder::new();
        scripted.drop_last = true;
        let engine = engine_with(dir.path(), Arc::new(scripted), no_wait_config());

        let err = engine.add_documents(&reports()).unwrap_err();
        assert!(matches!(
            err,
            EngineError::Embedding(EmbeddingError::CountMismatch { expected: 3, actual: 2 })
        ));
        assert!(engine.is_empty());
    }

    #[test]
    fn test_add_documents_times_out() {
        let dir = tempfile::tempdir().unwrap();
        let mut scripted = ScriptedEmbedder::new();
        scripted.delay = Duration::from_millis(30);
        let config = EngineConfig {
            embed_timeout: Duration::from_millis(5),
            ..no_wait_config()
        };
        let engine = engine_with(dir.path(), Arc::new(scripted), config);

        let err = engine.add_documents(&reports()).unwrap_err();
        assert!(matches!(err, EngineError::Embedding(EmbeddingError::Timeout { .. })));
        assert!(engine.is_empty());
    }

    #[test]
    fn test_search_finds_matching_report() {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine_with(dir.path(), Arc::new(HashingEmbedder::new(DIM)), no_wait_config());
        engine.add_documents(&reports()).unwrap();

        let results = engine.search_with(
            "Globex income statement revenue net income",
            SearchOptions {
                top_k: 2,
                min_similarity: 0.0,
            },
        );

        assert!(!results.is_empty());
        assert!(results.len() <= 2);
        assert_eq!(results[0].metadata.company(), Some("Globex"));
        assert_eq!(results[0].ordinal, 1);
        assert!(results.windows(2).all(|w| w[0].score >= w[1].score));
    }

    #[test]
    fn test_search_threshold_filters_everything() {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine_with(dir.path(), Arc::new(HashingEmbedder::new(DIM)), no_wait_config());
        engine.add_documents(&reports()).unwrap();

        let results = engine.search_with(
            "completely unrelated words",
            SearchOptions {
                top_k: 5,
                min_similarity: 1.01,
            },
        );
        assert!(results.is_empty());
    }

    #[test]
    fn test_search_on_empty_store_skips_provider() {
        let dir = tempfile::tempdir().unwrap();
        let embedder = Arc::new(ScriptedEmbedder::new());
        let engine = engine_with(dir.path(), embedder.clone(), no_wait_config());

        assert!(engine.search("anything").is_empty());
        assert_eq!(embedder.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_search_retries_transient_failures() {
        let dir = tempfile::tempdir().unwrap();
        let embedder = Arc::new(ScriptedEmbedder::new());
        let engine = engine_with(dir.path(), embedder.clone(), no_wait_config());
        engine.add_documents(&reports()).unwrap();
        embedder.failures_left.store(2, Ordering::SeqCst);

        let results = engine.similar_reports("Acme Holdings balance sheet", 1, 0.0);

        assert_eq!(results.len(), 1);
        assert_eq!(results[0].metadata.company(), Some("Acme Holdings"));
    }

    #[test]
    fn test_search_degrades_when_provider_is_down() {
        let dir = tempfile::tempdir().unwrap();
        let embedder = Arc::new(ScriptedEmbedder::new());
        let engine = engine_with(dir.path(), embedder.clone(), no_wait_config());
        engine.add_documents(&reports()).unwrap();
        embedder.failures_left.store(usize::MAX, Ordering::SeqCst);
        let before = embedder.calls.load(Ordering::SeqCst);

        assert!(engine.search("Acme Holdings balance sheet").is_empty());
        assert_eq!(embedder.calls.load(Ordering::SeqCst) - before, 3);
    }

    #[test]
    fn test_new_rejects_dimension_mismatch() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(VectorStore::open(&StoreConfig::new(dir.path(), DIM)).unwrap());
        let result = SimilaritySearchEngine::new(store, Arc::new(HashingEmbedder::new(DIM / 2)), EngineConfig::default());

        assert!(matches!(
            result,
            Err(EngineError::Store(kpiscope_core::Error::DimensionMismatch { .. }))
        ));
    }

    #[test]
    fn test_clear() {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine_with(dir.path(), Arc::new(HashingEmbedder::new(DIM)), no_wait_config());
        engine.add_documents(&reports()).unwrap();

        engine.clear().unwrap();
        assert!(engine.is_empty());
    }

    #[test]
    fn test_preview_truncates_on_char_boundary() {
        let long = "отчет ".repeat(20);
        let p = preview(&long);
        assert!(p.ends_with("..."));
        assert_eq!(p.chars().count(), 53);
        assert_eq!(preview("short"), "short");
    }
}
