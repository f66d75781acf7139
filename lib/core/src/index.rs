use ordered_float::OrderedFloat;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;
use std::ops::Range;

use crate::{Error, Metadata, Result, Vector};

/// Below this many stored vectors the scan stays on the calling thread.
const PARALLEL_SCAN_THRESHOLD: usize = 8_192;

/// Vectors scored per rayon task.
const SCAN_CHUNK: usize = 1_024;

/// A scored neighbour as seen by the index (no metadata attached)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoredOrdinal {
    pub ordinal: usize,
    pub score: f32,
}

/// A search hit returned to callers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    pub score: f32,
    pub metadata: Metadata,
    pub ordinal: usize,
}

/// Search contract shared by every index implementation.
///
/// Results hold at most `top_k` entries with `score >= min_similarity`,
/// sorted by descending score; equal scores are ordered by ascending ordinal.
pub trait VectorIndex: Send + Sync {
    fn dim(&self) -> usize;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn search(&self, query: &[f32], top_k: usize, min_similarity: f32) -> Result<Vec<ScoredOrdinal>>;
}

/// Heap entry. "Greater" means a better hit: higher score, then earlier ordinal.
#[derive(Clone, Copy, PartialEq, Eq)]
struct Candidate {
    score: OrderedFloat<f32>,
    ordinal: usize,
}

impl Ord for Candidate {
    fn cmp(&self, other: &Self) -> Ordering {
        self.score
            .cmp(&other.score)
            .then_with(|| other.ordinal.cmp(&self.ordinal))
    }
}

impl PartialOrd for Candidate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Bounded selection of the best `k` candidates. The heap root is the worst
/// kept candidate so it can be evicted in O(log k).
struct TopK {
    k: usize,
    heap: BinaryHeap<Reverse<Candidate>>,
}

impl TopK {
    /// `rows` bounds the allocation; `k` itself may be arbitrarily large.
    fn new(k: usize, rows: usize) -> Self {
        Self {
            k,
            heap: BinaryHeap::with_capacity(k.min(rows).saturating_add(1)),
        }
    }

    #[inline]
    fn offer(&mut self, candidate: Candidate) {
        if self.heap.len() < self.k {
            self.heap.push(Reverse(candidate));
        } else if let Some(Reverse(worst)) = self.heap.peek() {
            if candidate > *worst {
                self.heap.pop();
                self.heap.push(Reverse(candidate));
            }
        }
    }

    fn merge(mut self, other: TopK) -> TopK {
        for Reverse(candidate) in other.heap {
            self.offer(candidate);
        }
        self
    }

    fn into_sorted(self) -> Vec<ScoredOrdinal> {
        let mut best: Vec<Candidate> = self.heap.into_iter().map(|Reverse(c)| c).collect();
        best.sort_unstable_by(|a, b| b.cmp(a));
        best.into_iter()
            .map(|c| ScoredOrdinal {
                ordinal: c.ordinal,
                score: c.score.into_inner(),
            })
            .collect()
    }
}

/// Exact inner-product index over a contiguous row-major buffer.
#[derive(Debug, Clone, PartialEq)]
pub struct FlatIndex {
    dim: usize,
    data: Vec<f32>,
}

impl FlatIndex {
    pub fn new(dim: usize) -> Self {
        Self {
            dim,
            data: Vec::new(),
        }
    }

    /// Rebuild from a flat buffer of `len * dim` floats.
    pub fn from_raw(dim: usize, data: Vec<f32>) -> Result<Self> {
        if dim == 0 {
            return Err(Error::InvalidConfig("dimension must be positive".to_string()));
        }
        if data.len() % dim != 0 {
            return Err(Error::Corrupted(format!(
                "{} floats is not a multiple of dimension {}",
                data.len(),
                dim
            )));
        }
        Ok(Self { dim, data })
    }

    #[inline]
    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }

    /// The vector stored at `ordinal`.
    pub fn vector(&self, ordinal: usize) -> Option<&[f32]> {
        let start = ordinal.checked_mul(self.dim)?;
        self.data.get(start..start + self.dim)
    }

    /// Append a batch, returning the ordinals assigned to it. Every vector is
    /// checked before anything is written.
    pub fn append(&mut self, vectors: &[Vector]) -> Result<Range<usize>> {
        if let Some(bad) = vectors.iter().find(|v| v.dim() != self.dim) {
            return Err(Error::DimensionMismatch {
                expected: self.dim,
                actual: bad.dim(),
            });
        }

        let start = self.len();
        self.data.reserve(vectors.len() * self.dim);
        for v in vectors {
            self.data.extend_from_slice(v.as_slice());
        }
        Ok(start..self.len())
    }

    /// Drop every vector from `len` onwards.
    pub fn truncate(&mut self, len: usize) {
        self.data.truncate(len * self.dim);
    }

    pub fn clear(&mut self) {
        self.data.clear();
    }

    fn scan(&self, rows: &[f32], first_ordinal: usize, query: &[f32], top_k: usize, min_similarity: f32) -> TopK {
        let mut top = TopK::new(top_k, rows.len() / self.dim);
        for (offset, row) in rows.chunks_exact(self.dim).enumerate() {
            let score = crate::simd::dot_product_simd(row, query);
            // NaN fails this comparison as well
            if score >= min_similarity {
                top.offer(Candidate {
                    score: OrderedFloat(score),
                    ordinal: first_ordinal + offset,
                });
            }
        }
        top
    }
}

impl VectorIndex for FlatIndex {
    #[inline]
    fn dim(&self) -> usize {
        self.dim
    }

    #[inline]
    fn len(&self) -> usize {
        if self.dim == 0 {
            0
        } else {
            self.data.len() / self.dim
        }
    }

    fn search(&self, query: &[f32], top_k: usize, min_similarity: f32) -> Result<Vec<ScoredOrdinal>> {
        if query.len() != self.dim {
            return Err(Error::DimensionMismatch {
                expected: self.dim,
                actual: query.len(),
            });
        }
        if top_k == 0 || self.is_empty() {
            return Ok(Vec::new());
        }

        let top_k = top_k.min(self.len());
        let top = if self.len() < PARALLEL_SCAN_THRESHOLD {
            self.scan(&self.data, 0, query, top_k, min_similarity)
        } else {
            let rows_per_chunk = SCAN_CHUNK * self.dim;
            self.data
                .par_chunks(rows_per_chunk)
                .enumerate()
                .map(|(i, rows)| self.scan(rows, i * SCAN_CHUNK, query, top_k, min_similarity))
                .reduce(|| TopK::new(top_k, 0), TopK::merge)
        };

        Ok(top.into_sorted())
    }
}
