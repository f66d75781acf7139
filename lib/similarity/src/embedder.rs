//! Embedding provider boundary
//!
//! Turning report text into vectors is delegated to an external model. The
//! engine only relies on the [`EmbeddingProvider`] contract: one unit-length
//! vector of the provider's dimension per input text, in input order.

use ahash::RandomState;
use kpiscope_core::Vector;
use std::collections::HashSet;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum EmbeddingError {
    #[error("Embedding provider failed: {0}")]
    Provider(String),

    #[error("Embedding call took {elapsed:?}, limit was {limit:?}")]
    Timeout { elapsed: Duration, limit: Duration },

    #[error("Embedding provider returned {actual} vectors for {expected} texts")]
    CountMismatch { expected: usize, actual: usize },
}

impl EmbeddingError {
    /// Whether the same request might succeed when repeated.
    pub fn is_transient(&self) -> bool {
        matches!(self, EmbeddingError::Provider(_) | EmbeddingError::Timeout { .. })
    }
}

/// Maps text to fixed-length dense vectors.
pub trait EmbeddingProvider: Send + Sync {
    /// Identifier of the underlying model, recorded in logs.
    fn model_id(&self) -> &str;

    fn dimension(&self) -> usize;

    /// Embed a batch. Implementations should give up once `timeout` has passed.
    fn embed(&self, texts: &[&str], timeout: Duration) -> Result<Vec<Vector>, EmbeddingError>;
}

/// Fixed seeds keep the hashing embedder reproducible between runs of the
/// same build.
const SEEDS: [u64; 4] = [
    0x6b70_6973_636f_7065,
    0x9e37_79b9_7f4a_7c15,
    0xc2b2_ae3d_27d4_eb4f,
    0x1656_67b1_9e37_79f9,
];

/// Deterministic feature-hashing embedder.
///
/// Character trigrams and whole words are hashed into `dim` buckets with a
/// hash-derived sign, then the vector is normalized. No model download, so it
/// serves offline use and tests; lexical overlap stands in for meaning.
#[derive(Debug, Clone)]
pub struct HashingEmbedder {
    dim: usize,
    model_id: String,
    hasher: RandomState,
}

impl HashingEmbedder {
    pub fn new(dim: usize) -> Self {
        Self {
            dim,
            model_id: format!("hashing-trigram-{}", dim),
            hasher: RandomState::with_seeds(SEEDS[0], SEEDS[1], SEEDS[2], SEEDS[3]),
        }
    }

    pub fn embed_one(&self, text: &str) -> Vector {
        let mut values = vec![0.0f32; self.dim];
        if self.dim == 0 {
            return Vector::new(values);
        }
        let normalized = text.to_lowercase();

        for trigram in trigrams(&normalized) {
            self.bump(&mut values, &trigram, 1.0);
        }
        // whole words weigh more than their fragments
        for word in normalized.split_whitespace() {
            self.bump(&mut values, word, 2.0);
        }

        let mut vector = Vector::new(values);
        vector.normalize();
        vector
    }

    #[inline]
    fn bump(&self, values: &mut [f32], feature: &str, weight: f32) {
        let hash = self.hasher.hash_one(feature);
        let bucket = (hash % self.dim as u64) as usize;
        let sign = if hash >> 63 == 0 { 1.0 } else { -1.0 };
        values[bucket] += sign * weight;
    }
}

impl EmbeddingProvider for HashingEmbedder {
    fn model_id(&self) -> &str {
        &self.model_id
    }

    fn dimension(&self) -> usize {
        self.dim
    }

    fn embed(&self, texts: &[&str], _timeout: Duration) -> Result<Vec<Vector>, EmbeddingError> {
        Ok(texts.iter().map(|t| self.embed_one(t)).collect())
    }
}

fn trigrams(s: &str) -> HashSet<String> {
    let padded: Vec<char> = format!("  {}  ", s).chars().collect();
    padded.windows(3).map(|w| w.iter().collect()).collect()
}
