//! # kpiscope Similarity
//!
//! Text-level search over the archive of past financial reports.
//!
//! The [`SimilaritySearchEngine`] embeds report text through an
//! [`EmbeddingProvider`], appends it to the durable
//! [`VectorStore`](kpiscope_storage::VectorStore), and answers "which archived
//! reports look like this one?" queries.
//!
//! ## Example
//!
//! ```rust,no_run
//! use kpiscope_core::Metadata;
//! use kpiscope_similarity::{Document, EngineConfig, HashingEmbedder, SimilaritySearchEngine};
//! use kpiscope_storage::{StoreConfig, VectorStore};
//! use std::sync::Arc;
//!
//! let store = Arc::new(VectorStore::open(&StoreConfig::new("data/embeddings", 256)).unwrap());
//! let engine = SimilaritySearchEngine::new(
//!     store,
//!     Arc::new(HashingEmbedder::new(256)),
//!     EngineConfig::default(),
//! )
//! .unwrap();
//!
//! engine
//!     .add_documents(&[Document::new(
//!         "Acme Holdings balance sheet, FY2023",
//!         Metadata::new().with("company", "Acme Holdings"),
//!     )])
//!     .unwrap();
//!
//! for hit in engine.search("Acme balance sheet") {
//!     println!("{:.3} {:?}", hit.score, hit.metadata.company());
//! }
//! ```
//!
//! ## Failure policy
//!
//! ```text
//! add_documents ── embed all batches ──> VectorStore::add ──> flush
//!        │ any failure: nothing stored, error returned, never retried
//!
//! search ── embed query (RetryPolicy) ──> VectorStore::search
//!        │ any failure: logged, empty result
//! ```

pub mod embedder;
pub mod engine;
pub mod retry;

pub use embedder::{EmbeddingError, EmbeddingProvider, HashingEmbedder};
pub use engine::{
    Document, EngineConfig, EngineError, SearchOptions, SearchPort, SimilaritySearchEngine,
    DEFAULT_BATCH_SIZE, DEFAULT_MIN_SIMILARITY, DEFAULT_TOP_K,
};
pub use retry::RetryPolicy;
