//! # kpiscope
//!
//! Retrieval and ratio core of a financial-report KPI extraction pipeline.
//!
//! Upstream collaborators (document parsing, OCR, LLM orchestration) hand
//! plain text and numbers to two engines:
//!
//! - a **similarity engine** that embeds report text and finds the most
//!   similar archived reports by exact inner-product search over a durable,
//!   append-only index;
//! - a **ratio calculator** that turns named inputs into financial ratios or
//!   a typed error naming what is missing.
//!
//! ## As a Library
//!
//! ```rust,no_run
//! use kpiscope::prelude::*;
//! use std::collections::HashMap;
//!
//! let config = Config::default();
//! let engine = config.open_engine().unwrap();
//!
//! engine
//!     .add_documents(&[Document::new(
//!         "Balance sheet of Acme Holdings as of 31 December 2023",
//!         Metadata::new().with("company", "Acme Holdings"),
//!     )])
//!     .unwrap();
//! let similar = engine.search("Acme balance sheet");
//!
//! let values = HashMap::from([
//!     ("current_assets".to_string(), 300.0),
//!     ("current_liabilities".to_string(), 150.0),
//! ]);
//! let ratio = RatioCalculator::new().calculate("current_ratio", &values).unwrap();
//! assert_eq!(ratio, 2.0);
//! # let _ = similar;
//! ```
//!
//! ## Crate Structure
//!
//! - [`kpiscope-core`](https://docs.rs/kpiscope-core) - Vector, Metadata, FlatIndex
//! - [`kpiscope-storage`](https://docs.rs/kpiscope-storage) - VectorStore and the index file format
//! - [`kpiscope-similarity`](https://docs.rs/kpiscope-similarity) - embedding boundary and search engine
//! - [`kpiscope-ratios`](https://docs.rs/kpiscope-ratios) - ratio calculator and KPI models

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

// Re-export core types
pub use kpiscope_core::{
    Error, FlatIndex, Metadata, MetadataValue, Result, ScoredOrdinal, SearchResult, Vector,
    VectorIndex,
};

// Re-export storage
pub use kpiscope_storage::{StoreConfig, StoreStats, VectorStore, INDEX_FILE};

// Re-export similarity
pub use kpiscope_similarity::{
    Document, EmbeddingError, EmbeddingProvider, EngineConfig, EngineError, HashingEmbedder,
    RetryPolicy, SearchOptions, SearchPort, SimilaritySearchEngine,
};

// Re-export ratios
pub use kpiscope_ratios::{
    AnalysisResult, BalanceSheetKpi, CalculatorPort, ChartAnalysis, FinancialMetric,
    IncomeStatementKpi, KpiError, RatioCalculator, RatioError, RatioInputs, RatioMetric, RatioUnit,
    ReportType,
};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::{
        CalculatorPort, Config, Document, EmbeddingProvider, Error, Metadata, RatioCalculator,
        RatioError, RatioMetric, Result, SearchPort, SearchResult, SimilaritySearchEngine, Vector,
        VectorStore,
    };
}

/// SIMD-optimized vector operations
pub mod simd {
    pub use kpiscope_core::simd::{dot_product_simd, norm_simd};
}

/// Default location of the persisted index.
pub const DEFAULT_INDEX_DIR: &str = "data/embeddings";

/// Embedding width used when nothing else is configured.
pub const DEFAULT_DIMENSION: usize = 384;

/// Model id of the built-in embedder.
pub const DEFAULT_MODEL: &str = "hashing-trigram";

/// Everything needed to assemble the similarity engine.
///
/// Passed explicitly at construction; nothing is read from globals.
#[derive(Debug, Clone)]
pub struct Config {
    pub index_dir: PathBuf,
    pub dimension: usize,
    pub model_id: String,
    pub min_similarity: f32,
    pub top_k: usize,
    pub batch_size: usize,
    pub embed_timeout: Duration,
    pub retry: RetryPolicy,
}

impl Default for Config {
    fn default() -> Self {
        let engine = EngineConfig::default();
        Self {
            index_dir: PathBuf::from(DEFAULT_INDEX_DIR),
            dimension: DEFAULT_DIMENSION,
            model_id: DEFAULT_MODEL.to_string(),
            min_similarity: engine.min_similarity,
            top_k: engine.top_k,
            batch_size: engine.batch_size,
            embed_timeout: engine.embed_timeout,
            retry: engine.retry,
        }
    }
}

impl Config {
    pub fn store_config(&self) -> StoreConfig {
        StoreConfig::new(&self.index_dir, self.dimension)
    }

    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            top_k: self.top_k,
            min_similarity: self.min_similarity,
            batch_size: self.batch_size,
            embed_timeout: self.embed_timeout,
            retry: self.retry.clone(),
        }
    }

    /// The built-in provider named by `model_id`: either `hashing-trigram` or
    /// the dimension-qualified id it reports, e.g. `hashing-trigram-384`.
    ///
    /// Only the hashing embedder ships with the crate; other models are
    /// plugged in by constructing [`SimilaritySearchEngine`] directly.
    pub fn embedder(&self) -> Result<Arc<dyn EmbeddingProvider>> {
        let embedder = HashingEmbedder::new(self.dimension);
        if self.model_id == DEFAULT_MODEL || self.model_id == embedder.model_id() {
            Ok(Arc::new(embedder))
        } else {
            Err(Error::InvalidConfig(format!(
                "no built-in embedding provider for model '{}'",
                self.model_id
            )))
        }
    }

    /// Open (or create) the index and wrap it in a search engine.
    pub fn open_engine(&self) -> std::result::Result<SimilaritySearchEngine, EngineError> {
        let store = Arc::new(VectorStore::open(&self.store_config())?);
        SimilaritySearchEngine::new(store, self.embedder()?, self.engine_config())
    }
}
