//! # kpiscope Core
//!
//! Core data structures for the kpiscope report archive:
//!
//! - [`Vector`] - dense embedding with SIMD dot product
//! - [`Metadata`] - per-report key/value record (company, period, type, source)
//! - [`FlatIndex`] - exact inner-product index behind the [`VectorIndex`] contract
//!
//! ## Example
//!
//! ```rust
//! use kpiscope_core::{FlatIndex, Vector, VectorIndex};
//!
//! let mut index = FlatIndex::new(3);
//! index.append(&[Vector::new(vec![1.0, 0.0, 0.0])]).unwrap();
//!
//! let hits = index.search(&[1.0, 0.0, 0.0], 5, 0.5).unwrap();
//! assert_eq!(hits[0].ordinal, 0);
//! ```

pub mod error;
pub mod index;
pub mod metadata;
pub mod vector;

/// Dot product kernels (AVX2/FMA on x86_64, NEON on aarch64, scalar otherwise)
pub mod simd;

pub use error::{Error, Result};
pub use index::{FlatIndex, ScoredOrdinal, SearchResult, VectorIndex};
pub use metadata::{Metadata, MetadataValue};
pub use vector::Vector;
