// Dot product kernels used by the flat index.
// AVX2/FMA on x86_64 and NEON on aarch64, with an unrolled scalar fallback.
// The same kernel is chosen for every vector of a given length, so scores are
// reproducible across calls on one machine.

#[cfg(target_arch = "x86_64")]
use std::arch::x86_64::*;

#[cfg(target_arch = "aarch64")]
use std::arch::aarch64::*;

// Below this length the dispatch overhead outweighs the wide registers.
#[cfg(any(target_arch = "x86_64", target_arch = "aarch64"))]
const MIN_DIM_SIMD: usize = 16;

/// Inner product of two equal-length slices.
///
/// Returns 0.0 when the lengths differ; callers validate dimensions first.
#[inline]
pub fn dot_product_simd(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }

    #[cfg(target_arch = "x86_64")]
    {
        if a.len() >= MIN_DIM_SIMD
            && is_x86_feature_detected!("avx2")
            && is_x86_feature_detected!("fma")
        {
            // SAFETY: the required CPU features were detected just above.
            return unsafe { dot_product_avx2(a, b) };
        }
    }

    #[cfg(target_arch = "aarch64")]
    {
        if a.len() >= MIN_DIM_SIMD && std::arch::is_aarch64_feature_detected!("neon") {
            // SAFETY: NEON availability was detected just above.
            return unsafe { dot_product_neon(a, b) };
        }
    }

    dot_product_scalar(a, b)
}

#[cfg(target_arch = "x86_64")]
#[target_feature(enable = "avx2", enable = "fma")]
unsafe fn dot_product_avx2(a: &[f32], b: &[f32]) -> f32 {
    let lanes = a.len() / 8 * 8;
    let mut acc = _mm256_setzero_ps();

    let mut i = 0;
    while i < lanes {
        let va = _mm256_loadu_ps(a.as_ptr().add(i));
        let vb = _mm256_loadu_ps(b.as_ptr().add(i));
        acc = _mm256_fmadd_ps(va, vb, acc);
        i += 8;
    }

    let high = _mm256_extractf128_ps(acc, 1);
    let low = _mm256_castps256_ps128(acc);
    let mut quad = _mm_add_ps(high, low);
    quad = _mm_hadd_ps(quad, quad);
    quad = _mm_hadd_ps(quad, quad);

    let tail: f32 = a[lanes..].iter().zip(&b[lanes..]).map(|(x, y)| x * y).sum();
    _mm_cvtss_f32(quad) + tail
}

#[cfg(target_arch = "aarch64")]
#[target_feature(enable = "neon")]
unsafe fn dot_product_neon(a: &[f32], b: &[f32]) -> f32 {
    let lanes = a.len() / 4 * 4;
    let mut acc = vdupq_n_f32(0.0);

    let mut i = 0;
    while i < lanes {
        let va = vld1q_f32(a.as_ptr().add(i));
        let vb = vld1q_f32(b.as_ptr().add(i));
        acc = vfmaq_f32(acc, va, vb);
        i += 4;
    }

    let tail: f32 = a[lanes..].iter().zip(&b[lanes..]).map(|(x, y)| x * y).sum();
    vaddvq_f32(acc) + tail
}

/// Four independent accumulators keep the FP pipeline busy.
#[inline]
fn dot_product_scalar(a: &[f32], b: &[f32]) -> f32 {
    let mut acc = [0.0f32; 4];
    let a_chunks = a.chunks_exact(4);
    let b_chunks = b.chunks_exact(4);
    let a_rest = a_chunks.remainder();
    let b_rest = b_chunks.remainder();

    for (x, y) in a_chunks.zip(b_chunks) {
        acc[0] += x[0] * y[0];
        acc[1] += x[1] * y[1];
        acc[2] += x[2] * y[2];
        acc[3] += x[3] * y[3];
    }

    let tail: f32 = a_rest.iter().zip(b_rest).map(|(x, y)| x * y).sum();
    (acc[0] + acc[1]) + (acc[2] + acc[3]) + tail
}

/// Euclidean length of `v`.
#[inline]
pub fn norm_simd(v: &[f32]) -> f32 {
    dot_product_simd(v, v).sqrt()
}
