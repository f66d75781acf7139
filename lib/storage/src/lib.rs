pub mod persistence;
pub mod store;

pub use persistence::{IndexHeader, IndexMetric, IndexSnapshot, INDEX_FILE};
pub use store::{StoreConfig, StoreStats, VectorStore};
