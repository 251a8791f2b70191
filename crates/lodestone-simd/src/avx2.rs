//! AVX2+FMA kernel variants.
//!
//! Each `try_*` wrapper has the same mathematical effect as its scalar
//! counterpart in [`crate::scalar`]. `None` always means "did not run, use
//! the scalar fallback" — capability absent — never "ran but produced wrong
//! data". Elementwise kernels are bit-identical to the scalar path; the
//! horizontal reductions (`rdotv`, `rdotv2`, `rmaxv`, `rmaxabsv`) reduce
//! pairwise within a register, so they agree with the left-to-right scalar
//! order only up to floating-point reassociation.
//!
//! Vectors are processed in 4-f64 chunks with a scalar tail; all loads and
//! stores are unaligned, so callers owe no alignment guarantees.

use crate::capability::SimdCapability;

#[cfg(target_arch = "x86")]
use std::arch::x86::*;
#[cfg(target_arch = "x86_64")]
use std::arch::x86_64::*;

/// Horizontal sum of the 4 lanes of `acc`.
#[inline]
unsafe fn hsum_pd(acc: __m256d) -> f64 {
    let high = _mm256_extractf128_pd(acc, 1);
    let low = _mm256_castpd256_pd128(acc);
    let sum_128 = _mm_add_pd(low, high);
    let high_64 = _mm_unpackhi_pd(sum_128, sum_128);
    let sum_64 = _mm_add_sd(sum_128, high_64);
    let mut result = 0.0f64;
    _mm_store_sd(&mut result, sum_64);
    result
}

/// Horizontal max of the 4 lanes of `acc`.
#[inline]
unsafe fn hmax_pd(acc: __m256d) -> f64 {
    let high = _mm256_extractf128_pd(acc, 1);
    let low = _mm256_castpd256_pd128(acc);
    let max_128 = _mm_max_pd(low, high);
    let high_64 = _mm_unpackhi_pd(max_128, max_128);
    let max_64 = _mm_max_sd(high_64, max_128);
    let mut result = 0.0f64;
    _mm_store_sd(&mut result, max_64);
    result
}

#[target_feature(enable = "avx2", enable = "fma")]
unsafe fn rdotv_fma(x: &[f64], y: &[f64]) -> f64 {
    let n = x.len();
    let simd_len = n / 4 * 4;
    let mut acc = _mm256_setzero_pd();
    let xp = x.as_ptr();
    let yp = y.as_ptr();
    let mut i = 0;
    while i < simd_len {
        let xv = _mm256_loadu_pd(xp.add(i));
        let yv = _mm256_loadu_pd(yp.add(i));
        acc = _mm256_fmadd_pd(xv, yv, acc);
        i += 4;
    }
    let mut result = hsum_pd(acc);
    for j in simd_len..n {
        result += x[j] * y[j];
    }
    result
}

#[target_feature(enable = "avx2", enable = "fma")]
unsafe fn rdotv2_fma(x: &[f64]) -> f64 {
    let n = x.len();
    let simd_len = n / 4 * 4;
    let mut acc = _mm256_setzero_pd();
    let xp = x.as_ptr();
    let mut i = 0;
    while i < simd_len {
        let xv = _mm256_loadu_pd(xp.add(i));
        acc = _mm256_fmadd_pd(xv, xv, acc);
        i += 4;
    }
    let mut result = hsum_pd(acc);
    for j in simd_len..n {
        result += x[j] * x[j];
    }
    result
}

#[target_feature(enable = "avx2", enable = "fma")]
unsafe fn raddv_fma(alpha: f64, y: &[f64], x: &mut [f64]) {
    let n = x.len();
    let simd_len = n / 4 * 4;
    let av = _mm256_set1_pd(alpha);
    let yp = y.as_ptr();
    let xp = x.as_mut_ptr();
    let mut i = 0;
    while i < simd_len {
        let yv = _mm256_loadu_pd(yp.add(i));
        let xv = _mm256_loadu_pd(xp.add(i));
        // mul then add, not fused: keeps the result bit-identical to the
        // scalar path's two-rounding arithmetic.
        _mm256_storeu_pd(xp.add(i), _mm256_add_pd(xv, _mm256_mul_pd(av, yv)));
        i += 4;
    }
    for j in simd_len..n {
        x[j] += alpha * y[j];
    }
}

#[target_feature(enable = "avx2", enable = "fma")]
unsafe fn rmulv_fma(v: f64, x: &mut [f64]) {
    let n = x.len();
    let simd_len = n / 4 * 4;
    let vv = _mm256_set1_pd(v);
    let xp = x.as_mut_ptr();
    let mut i = 0;
    while i < simd_len {
        let xv = _mm256_loadu_pd(xp.add(i));
        _mm256_storeu_pd(xp.add(i), _mm256_mul_pd(xv, vv));
        i += 4;
    }
    for j in simd_len..n {
        x[j] *= v;
    }
}

#[target_feature(enable = "avx2", enable = "fma")]
unsafe fn rcopymulv_fma(v: f64, x: &[f64], r: &mut [f64]) {
    let n = r.len();
    let simd_len = n / 4 * 4;
    let vv = _mm256_set1_pd(v);
    let xp = x.as_ptr();
    let rp = r.as_mut_ptr();
    let mut i = 0;
    while i < simd_len {
        let xv = _mm256_loadu_pd(xp.add(i));
        _mm256_storeu_pd(rp.add(i), _mm256_mul_pd(xv, vv));
        i += 4;
    }
    for j in simd_len..n {
        r[j] = v * x[j];
    }
}

#[target_feature(enable = "avx2", enable = "fma")]
unsafe fn rsetv_fma(v: f64, x: &mut [f64]) {
    let n = x.len();
    let simd_len = n / 4 * 4;
    let vv = _mm256_set1_pd(v);
    let xp = x.as_mut_ptr();
    let mut i = 0;
    while i < simd_len {
        _mm256_storeu_pd(xp.add(i), vv);
        i += 4;
    }
    for j in simd_len..n {
        x[j] = v;
    }
}

#[target_feature(enable = "avx2", enable = "fma")]
unsafe fn rcopyv_fma(x: &[f64], r: &mut [f64]) {
    let n = r.len();
    let simd_len = n / 4 * 4;
    let xp = x.as_ptr();
    let rp = r.as_mut_ptr();
    let mut i = 0;
    while i < simd_len {
        _mm256_storeu_pd(rp.add(i), _mm256_loadu_pd(xp.add(i)));
        i += 4;
    }
    for j in simd_len..n {
        r[j] = x[j];
    }
}

#[target_feature(enable = "avx2", enable = "fma")]
unsafe fn rmuladdv_fma(y: &[f64], z: &[f64], x: &mut [f64]) {
    let n = x.len();
    let simd_len = n / 4 * 4;
    let yp = y.as_ptr();
    let zp = z.as_ptr();
    let xp = x.as_mut_ptr();
    let mut i = 0;
    while i < simd_len {
        let yv = _mm256_loadu_pd(yp.add(i));
        let zv = _mm256_loadu_pd(zp.add(i));
        let xv = _mm256_loadu_pd(xp.add(i));
        _mm256_storeu_pd(xp.add(i), _mm256_add_pd(xv, _mm256_mul_pd(yv, zv)));
        i += 4;
    }
    for j in simd_len..n {
        x[j] += y[j] * z[j];
    }
}

#[target_feature(enable = "avx2", enable = "fma")]
unsafe fn rnegmuladdv_fma(y: &[f64], z: &[f64], x: &mut [f64]) {
    let n = x.len();
    let simd_len = n / 4 * 4;
    let yp = y.as_ptr();
    let zp = z.as_ptr();
    let xp = x.as_mut_ptr();
    let mut i = 0;
    while i < simd_len {
        let yv = _mm256_loadu_pd(yp.add(i));
        let zv = _mm256_loadu_pd(zp.add(i));
        let xv = _mm256_loadu_pd(xp.add(i));
        _mm256_storeu_pd(xp.add(i), _mm256_sub_pd(xv, _mm256_mul_pd(yv, zv)));
        i += 4;
    }
    for j in simd_len..n {
        x[j] -= y[j] * z[j];
    }
}

#[target_feature(enable = "avx2", enable = "fma")]
unsafe fn rcopymuladdv_fma(x: &[f64], y: &[f64], z: &[f64], r: &mut [f64]) {
    let n = r.len();
    let simd_len = n / 4 * 4;
    let mut i = 0;
    while i < simd_len {
        let xv = _mm256_loadu_pd(x.as_ptr().add(i));
        let yv = _mm256_loadu_pd(y.as_ptr().add(i));
        let zv = _mm256_loadu_pd(z.as_ptr().add(i));
        _mm256_storeu_pd(r.as_mut_ptr().add(i), _mm256_add_pd(xv, _mm256_mul_pd(yv, zv)));
        i += 4;
    }
    for j in simd_len..n {
        r[j] = x[j] + y[j] * z[j];
    }
}

#[target_feature(enable = "avx2", enable = "fma")]
unsafe fn rcopynegmuladdv_fma(x: &[f64], y: &[f64], z: &[f64], r: &mut [f64]) {
    let n = r.len();
    let simd_len = n / 4 * 4;
    let mut i = 0;
    while i < simd_len {
        let xv = _mm256_loadu_pd(x.as_ptr().add(i));
        let yv = _mm256_loadu_pd(y.as_ptr().add(i));
        let zv = _mm256_loadu_pd(z.as_ptr().add(i));
        _mm256_storeu_pd(r.as_mut_ptr().add(i), _mm256_sub_pd(xv, _mm256_mul_pd(yv, zv)));
        i += 4;
    }
    for j in simd_len..n {
        r[j] = x[j] - y[j] * z[j];
    }
}

#[target_feature(enable = "avx2", enable = "fma")]
unsafe fn rmergemulv_fma(y: &[f64], x: &mut [f64]) {
    let n = x.len();
    let simd_len = n / 4 * 4;
    let mut i = 0;
    while i < simd_len {
        let yv = _mm256_loadu_pd(y.as_ptr().add(i));
        let xv = _mm256_loadu_pd(x.as_ptr().add(i));
        _mm256_storeu_pd(x.as_mut_ptr().add(i), _mm256_mul_pd(xv, yv));
        i += 4;
    }
    for j in simd_len..n {
        x[j] *= y[j];
    }
}

#[target_feature(enable = "avx2", enable = "fma")]
unsafe fn rmergedivv_fma(y: &[f64], x: &mut [f64]) {
    let n = x.len();
    let simd_len = n / 4 * 4;
    let mut i = 0;
    while i < simd_len {
        let yv = _mm256_loadu_pd(y.as_ptr().add(i));
        let xv = _mm256_loadu_pd(x.as_ptr().add(i));
        _mm256_storeu_pd(x.as_mut_ptr().add(i), _mm256_div_pd(xv, yv));
        i += 4;
    }
    for j in simd_len..n {
        x[j] /= y[j];
    }
}

// max/min operand order matches the scalar `if y > x { x = y }` comparison,
// including NaN behavior: _mm256_max_pd(y, x) keeps x when the compare is
// false or unordered.
#[target_feature(enable = "avx2", enable = "fma")]
unsafe fn rmergemaxv_fma(y: &[f64], x: &mut [f64]) {
    let n = x.len();
    let simd_len = n / 4 * 4;
    let mut i = 0;
    while i < simd_len {
        let yv = _mm256_loadu_pd(y.as_ptr().add(i));
        let xv = _mm256_loadu_pd(x.as_ptr().add(i));
        _mm256_storeu_pd(x.as_mut_ptr().add(i), _mm256_max_pd(yv, xv));
        i += 4;
    }
    for j in simd_len..n {
        if y[j] > x[j] {
            x[j] = y[j];
        }
    }
}

#[target_feature(enable = "avx2", enable = "fma")]
unsafe fn rmergeminv_fma(y: &[f64], x: &mut [f64]) {
    let n = x.len();
    let simd_len = n / 4 * 4;
    let mut i = 0;
    while i < simd_len {
        let yv = _mm256_loadu_pd(y.as_ptr().add(i));
        let xv = _mm256_loadu_pd(x.as_ptr().add(i));
        _mm256_storeu_pd(x.as_mut_ptr().add(i), _mm256_min_pd(yv, xv));
        i += 4;
    }
    for j in simd_len..n {
        if y[j] < x[j] {
            x[j] = y[j];
        }
    }
}

#[target_feature(enable = "avx2", enable = "fma")]
unsafe fn rmaxv_fma(x: &[f64]) -> f64 {
    let n = x.len();
    debug_assert!(n >= 4, "caller guarantees at least one full chunk");
    let simd_len = n / 4 * 4;
    // Seed with x[0] and keep acc as the second maxpd operand: maxpd
    // returns the second operand on an unordered compare, so NaN elements
    // are skipped exactly like the scalar `if xi > m` walk.
    let mut acc = _mm256_set1_pd(x[0]);
    let mut i = 0;
    while i < simd_len {
        acc = _mm256_max_pd(_mm256_loadu_pd(x.as_ptr().add(i)), acc);
        i += 4;
    }
    let mut result = hmax_pd(acc);
    for j in simd_len..n {
        if x[j] > result {
            result = x[j];
        }
    }
    result
}

#[target_feature(enable = "avx2", enable = "fma")]
unsafe fn rmaxabsv_fma(x: &[f64]) -> f64 {
    let n = x.len();
    let simd_len = n / 4 * 4;
    // Clear the sign bit to take |x| lane-wise.
    let absmask = _mm256_castsi256_pd(_mm256_set1_epi64x(0x7fff_ffff_ffff_ffff));
    let mut acc = _mm256_setzero_pd();
    let mut i = 0;
    while i < simd_len {
        let xv = _mm256_and_pd(_mm256_loadu_pd(x.as_ptr().add(i)), absmask);
        // acc second: maxpd keeps it on unordered, skipping NaN like the
        // scalar comparison does.
        acc = _mm256_max_pd(xv, acc);
        i += 4;
    }
    let mut result = hmax_pd(acc);
    for j in simd_len..n {
        let a = x[j].abs();
        if a > result {
            result = a;
        }
    }
    result
}

// ---------------------------------------------------------------------------
// Safe decline-or-run wrappers
// ---------------------------------------------------------------------------

macro_rules! try_kernel {
    ($cap:expr, $call:expr) => {
        match $cap {
            SimdCapability::Avx512 | SimdCapability::Avx2 => Some(unsafe { $call }),
            SimdCapability::Scalar => None,
        }
    };
}

#[inline]
pub fn try_rdotv(x: &[f64], y: &[f64], cap: SimdCapability) -> Option<f64> {
    try_kernel!(cap, rdotv_fma(x, y))
}

#[inline]
pub fn try_rdotv2(x: &[f64], cap: SimdCapability) -> Option<f64> {
    try_kernel!(cap, rdotv2_fma(x))
}

#[inline]
pub fn try_raddv(alpha: f64, y: &[f64], x: &mut [f64], cap: SimdCapability) -> Option<()> {
    try_kernel!(cap, raddv_fma(alpha, y, x))
}

#[inline]
pub fn try_rmulv(v: f64, x: &mut [f64], cap: SimdCapability) -> Option<()> {
    try_kernel!(cap, rmulv_fma(v, x))
}

#[inline]
pub fn try_rcopymulv(v: f64, x: &[f64], r: &mut [f64], cap: SimdCapability) -> Option<()> {
    try_kernel!(cap, rcopymulv_fma(v, x, r))
}

#[inline]
pub fn try_rsetv(v: f64, x: &mut [f64], cap: SimdCapability) -> Option<()> {
    try_kernel!(cap, rsetv_fma(v, x))
}

#[inline]
pub fn try_rcopyv(x: &[f64], r: &mut [f64], cap: SimdCapability) -> Option<()> {
    try_kernel!(cap, rcopyv_fma(x, r))
}

#[inline]
pub fn try_rmuladdv(y: &[f64], z: &[f64], x: &mut [f64], cap: SimdCapability) -> Option<()> {
    try_kernel!(cap, rmuladdv_fma(y, z, x))
}

#[inline]
pub fn try_rnegmuladdv(y: &[f64], z: &[f64], x: &mut [f64], cap: SimdCapability) -> Option<()> {
    try_kernel!(cap, rnegmuladdv_fma(y, z, x))
}

#[inline]
pub fn try_rcopymuladdv(
    x: &[f64],
    y: &[f64],
    z: &[f64],
    r: &mut [f64],
    cap: SimdCapability,
) -> Option<()> {
    try_kernel!(cap, rcopymuladdv_fma(x, y, z, r))
}

#[inline]
pub fn try_rcopynegmuladdv(
    x: &[f64],
    y: &[f64],
    z: &[f64],
    r: &mut [f64],
    cap: SimdCapability,
) -> Option<()> {
    try_kernel!(cap, rcopynegmuladdv_fma(x, y, z, r))
}

#[inline]
pub fn try_rmergemulv(y: &[f64], x: &mut [f64], cap: SimdCapability) -> Option<()> {
    try_kernel!(cap, rmergemulv_fma(y, x))
}

#[inline]
pub fn try_rmergedivv(y: &[f64], x: &mut [f64], cap: SimdCapability) -> Option<()> {
    try_kernel!(cap, rmergedivv_fma(y, x))
}

#[inline]
pub fn try_rmergemaxv(y: &[f64], x: &mut [f64], cap: SimdCapability) -> Option<()> {
    try_kernel!(cap, rmergemaxv_fma(y, x))
}

#[inline]
pub fn try_rmergeminv(y: &[f64], x: &mut [f64], cap: SimdCapability) -> Option<()> {
    try_kernel!(cap, rmergeminv_fma(y, x))
}

#[inline]
pub fn try_rmaxv(x: &[f64], cap: SimdCapability) -> Option<f64> {
    if x.len() < 4 {
        return None;
    }
    try_kernel!(cap, rmaxv_fma(x))
}

#[inline]
pub fn try_rmaxabsv(x: &[f64], cap: SimdCapability) -> Option<f64> {
    try_kernel!(cap, rmaxabsv_fma(x))
}
