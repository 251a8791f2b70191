//! Blocked general matrix multiply.
//!
//! `rgemm` computes `C := alpha * op(A) * op(B) + beta * C`. Blocks where
//! every dimension fits the fixed block size run a packed fast path: `op(B)`
//! and `op(A)` are repacked into 2-wide micro-panels (zero-padded to the
//! next 4-multiple of the inner dimension) so the inner kernel accumulates
//! 2x2 dot blocks in four vector registers with a single horizontal
//! reduction each, and never branches on operand orientation again. The
//! fast path declines — never silently mis-computes — on oversize or
//! unsupported shapes, and the driver falls back to a triple-loop GEMM
//! composed from the dispatched primitives.
//!
//! `rgemm_parallel` runs independent row blocks of `C` on rayon; block
//! order is unordered by design, block interiors keep the fixed summation
//! order of the serial kernel.

use lodestone_core::pool::VecPool;
use lodestone_core::view::{row, row_mut};
use lodestone_core::{Error, Op, Result};
use lodestone_simd::{dispatch, SimdCapability};

/// Fixed block size of the packed fast path.
pub const BLOCK: usize = 32;
/// Micro-panel width.
const MICRO: usize = 2;
/// Below this largest-dimension size the packed path declines; packing
/// overhead dominates for tiny products.
const GEMM_FAST_MIN: usize = 4;

/// Scratch for column gathers in the naive fallback.
static SCRATCH: VecPool = VecPool::new();

/// Element `(i, t)` of `op(a)` for a stored view at `(ia, ja)`.
#[inline]
fn op_elem(a: &[f64], stride: usize, ia: usize, ja: usize, opa: Op, i: usize, t: usize) -> f64 {
    match opa {
        Op::None => a[(ia + i) * stride + ja + t],
        Op::Trans => a[(ia + t) * stride + ja + i],
    }
}

/// `dst := alpha * src + beta * dst` with the three beta specializations:
/// beta == 1 skips the redundant multiply, beta == 0 never reads `dst`.
#[inline]
fn store_row(alpha: f64, src: &[f64], beta: f64, dst: &mut [f64]) {
    if beta == 1.0 {
        dispatch::raddv(alpha, src, dst);
    } else if beta != 0.0 {
        for (d, s) in dst.iter_mut().zip(src.iter()) {
            *d = alpha * s + beta * *d;
        }
    } else {
        dispatch::rcopymulv(alpha, src, dst);
    }
}

/// `c[i, j] := alpha * v + beta * c[i, j]`, beta == 0 without reading.
#[inline]
fn store_elem(alpha: f64, v: f64, beta: f64, c: &mut f64) {
    if beta == 1.0 {
        *c += alpha * v;
    } else if beta != 0.0 {
        *c = alpha * v + beta * *c;
    } else {
        *c = alpha * v;
    }
}

/// Rescale (or clear, when beta == 0) an `m x n` block of `c`.
fn scale_block(beta: f64, c: &mut [f64], stride: usize, ic: usize, jc: usize, m: usize, n: usize) {
    for i in 0..m {
        if beta != 0.0 {
            dispatch::rmulr(beta, c, stride, ic + i, jc, n);
        } else {
            dispatch::rsetr(0.0, c, stride, ic + i, jc, n);
        }
    }
}

/// General matrix multiply `C := alpha * op(A) * op(B) + beta * C`.
///
/// `op(A)` is `m x k`, `op(B)` is `k x n`, `C` is `m x n`; each operand is a
/// flat buffer with its own row stride and `(i, j)` base offsets.
/// Degenerate cases follow the GEMV contract: `alpha == 0` or `k == 0` only
/// rescales `C` by beta (clearing it without a read when beta == 0).
#[allow(clippy::too_many_arguments)]
pub fn rgemm(
    m: usize,
    n: usize,
    k: usize,
    alpha: f64,
    a: &[f64],
    astride: usize,
    ia: usize,
    ja: usize,
    opa: Op,
    b: &[f64],
    bstride: usize,
    ib: usize,
    jb: usize,
    opb: Op,
    beta: f64,
    c: &mut [f64],
    cstride: usize,
    ic: usize,
    jc: usize,
) {
    if m == 0 || n == 0 {
        return;
    }
    if alpha == 0.0 || k == 0 {
        scale_block(beta, c, cstride, ic, jc, m, n);
        return;
    }

    #[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
    if try_gemm_block(
        m, n, k, alpha, a, astride, ia, ja, opa, b, bstride, ib, jb, opb, beta, c, cstride, ic, jc,
    )
    .is_some()
    {
        return;
    }

    gemm_naive(
        m, n, k, alpha, a, astride, ia, ja, opa, b, bstride, ib, jb, opb, beta, c, cstride, ic, jc,
    );
}

/// Shape-checked wrapper around [`rgemm`] for composing callers.
#[allow(clippy::too_many_arguments)]
pub fn rgemm_checked(
    m: usize,
    n: usize,
    k: usize,
    alpha: f64,
    a: &[f64],
    astride: usize,
    ia: usize,
    ja: usize,
    opa: Op,
    b: &[f64],
    bstride: usize,
    ib: usize,
    jb: usize,
    opb: Op,
    beta: f64,
    c: &mut [f64],
    cstride: usize,
    ic: usize,
    jc: usize,
) -> Result<()> {
    fn check_view(
        buf_len: usize,
        stride: usize,
        i0: usize,
        j0: usize,
        rows: usize,
        cols: usize,
    ) -> Result<()> {
        if rows == 0 || cols == 0 {
            return Ok(());
        }
        if stride < cols {
            return Err(Error::InvalidStride { stride, cols });
        }
        let needed = (i0 + rows - 1) * stride + j0 + cols;
        if buf_len < needed {
            return Err(Error::BufferTooSmall {
                needed,
                len: buf_len,
            });
        }
        Ok(())
    }

    if alpha != 0.0 && k != 0 {
        let (ra, ca) = opa.dims(m, k);
        let (rb, cb) = opb.dims(k, n);
        check_view(a.len(), astride, ia, ja, ra, ca)?;
        check_view(b.len(), bstride, ib, jb, rb, cb)?;
    }
    check_view(c.len(), cstride, ic, jc, m, n)?;

    rgemm(
        m, n, k, alpha, a, astride, ia, ja, opa, b, bstride, ib, jb, opb, beta, c, cstride, ic, jc,
    );
    Ok(())
}

/// Parallel driver: splits `C` into independent row blocks and multiplies
/// each on the rayon pool. Inter-block order is unspecified; each block
/// reproduces the serial kernel exactly.
#[allow(clippy::too_many_arguments)]
pub fn rgemm_parallel(
    m: usize,
    n: usize,
    k: usize,
    alpha: f64,
    a: &[f64],
    astride: usize,
    ia: usize,
    ja: usize,
    opa: Op,
    b: &[f64],
    bstride: usize,
    ib: usize,
    jb: usize,
    opb: Op,
    beta: f64,
    c: &mut [f64],
    cstride: usize,
    ic: usize,
    jc: usize,
) {
    use rayon::prelude::*;

    if m == 0 || n == 0 {
        return;
    }
    if m <= BLOCK {
        rgemm(
            m, n, k, alpha, a, astride, ia, ja, opa, b, bstride, ib, jb, opb, beta, c, cstride,
            ic, jc,
        );
        return;
    }

    let base = ic * cstride;
    c[base..]
        .par_chunks_mut(BLOCK * cstride)
        .enumerate()
        .for_each(|(bi, cblock)| {
            let r0 = bi * BLOCK;
            if r0 >= m {
                return;
            }
            let rows = BLOCK.min(m - r0);
            // Row block r0 of op(A): a row offset when A is stored as-is,
            // a column offset when transposed.
            let (ia2, ja2) = match opa {
                Op::None => (ia + r0, ja),
                Op::Trans => (ia, ja + r0),
            };
            rgemm(
                rows, n, k, alpha, a, astride, ia2, ja2, opa, b, bstride, ib, jb, opb, beta,
                cblock, cstride, 0, jc,
            );
        });
}

// ---------------------------------------------------------------------------
// Packed fast path
// ---------------------------------------------------------------------------

/// Pack columns of `op(x)` (a `k x w` operand) into 2-wide micro-panels.
///
/// Panel `p` holds columns `2p` and `2p + 1` as two contiguous runs of
/// `kq` values (`kq` = `k` rounded up to a 4-multiple); the padding tail
/// and a missing odd column stay zero so reduction arithmetic never sees
/// them.
#[allow(clippy::too_many_arguments)]
fn pack_panels(
    dst: &mut [f64; BLOCK * BLOCK],
    kq: usize,
    src: &[f64],
    stride: usize,
    i0: usize,
    j0: usize,
    k: usize,
    w: usize,
    op: Op,
) {
    dst[..w.div_ceil(MICRO) * MICRO * kq].fill(0.0);
    for c in 0..w {
        let panel = c / MICRO;
        let lane = c % MICRO;
        let out = panel * MICRO * kq + lane * kq;
        match op {
            Op::None => {
                for t in 0..k {
                    dst[out + t] = src[(i0 + t) * stride + j0 + c];
                }
            }
            Op::Trans => {
                // Column c of op(x) is stored row c: contiguous copy.
                let r = row(src, stride, i0 + c, j0, k);
                dst[out..out + k].copy_from_slice(r);
            }
        }
    }
}

#[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
#[allow(clippy::too_many_arguments)]
fn try_gemm_block(
    m: usize,
    n: usize,
    k: usize,
    alpha: f64,
    a: &[f64],
    astride: usize,
    ia: usize,
    ja: usize,
    opa: Op,
    b: &[f64],
    bstride: usize,
    ib: usize,
    jb: usize,
    opb: Op,
    beta: f64,
    c: &mut [f64],
    cstride: usize,
    ic: usize,
    jc: usize,
) -> Option<()> {
    if !SimdCapability::cached().is_simd() {
        return None;
    }
    if m > BLOCK || n > BLOCK || k > BLOCK {
        return None;
    }
    if m.max(n).max(k) < GEMM_FAST_MIN {
        return None;
    }
    unsafe {
        gemm_block_fma(
            m, n, k, alpha, a, astride, ia, ja, opa, b, bstride, ib, jb, opb, beta, c, cstride,
            ic, jc,
        );
    }
    Some(())
}

#[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
#[target_feature(enable = "avx2", enable = "fma")]
#[allow(clippy::too_many_arguments)]
unsafe fn gemm_block_fma(
    m: usize,
    n: usize,
    k: usize,
    alpha: f64,
    a: &[f64],
    astride: usize,
    ia: usize,
    ja: usize,
    opa: Op,
    b: &[f64],
    bstride: usize,
    ib: usize,
    jb: usize,
    opb: Op,
    beta: f64,
    c: &mut [f64],
    cstride: usize,
    ic: usize,
    jc: usize,
) {
    #[cfg(target_arch = "x86")]
    use std::arch::x86::*;
    #[cfg(target_arch = "x86_64")]
    use std::arch::x86_64::*;

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

    let kq = k.div_ceil(4) * 4;

    // Both operands repacked up front; the inner loops below are branch-free
    // on orientation. Rows of op(A) are columns of op(A)ᵀ, hence the flip.
    let mut bpack = [0.0f64; BLOCK * BLOCK];
    let mut apack = [0.0f64; BLOCK * BLOCK];
    pack_panels(&mut bpack, kq, b, bstride, ib, jb, k, n, opb);
    pack_panels(&mut apack, kq, a, astride, ia, ja, k, m, opa.flipped());

    let apanels = m.div_ceil(MICRO);
    let bpanels = n.div_ceil(MICRO);

    for ip in 0..apanels {
        let abase = ip * MICRO * kq;
        let a0 = apack.as_ptr().add(abase);
        let a1 = apack.as_ptr().add(abase + kq);

        let mut row0 = [0.0f64; BLOCK];
        let mut row1 = [0.0f64; BLOCK];

        for jp in 0..bpanels {
            let bbase = jp * MICRO * kq;
            let b0 = bpack.as_ptr().add(bbase);
            let b1 = bpack.as_ptr().add(bbase + kq);

            let mut acc00 = _mm256_setzero_pd();
            let mut acc01 = _mm256_setzero_pd();
            let mut acc10 = _mm256_setzero_pd();
            let mut acc11 = _mm256_setzero_pd();

            let mut t = 0;
            while t < kq {
                let va0 = _mm256_loadu_pd(a0.add(t));
                let va1 = _mm256_loadu_pd(a1.add(t));
                let vb0 = _mm256_loadu_pd(b0.add(t));
                let vb1 = _mm256_loadu_pd(b1.add(t));
                acc00 = _mm256_fmadd_pd(va0, vb0, acc00);
                acc01 = _mm256_fmadd_pd(va0, vb1, acc01);
                acc10 = _mm256_fmadd_pd(va1, vb0, acc10);
                acc11 = _mm256_fmadd_pd(va1, vb1, acc11);
                t += 4;
            }

            let j0 = jp * MICRO;
            row0[j0] = hsum_pd(acc00);
            row1[j0] = hsum_pd(acc10);
            if j0 + 1 < BLOCK {
                row0[j0 + 1] = hsum_pd(acc01);
                row1[j0 + 1] = hsum_pd(acc11);
            }
        }

        let i0 = ip * MICRO;
        store_row(alpha, &row0[..n], beta, row_mut(c, cstride, ic + i0, jc, n));
        if i0 + 1 < m {
            store_row(alpha, &row1[..n], beta, row_mut(c, cstride, ic + i0 + 1, jc, n));
        }
    }
}

// ---------------------------------------------------------------------------
// Naive fallback
// ---------------------------------------------------------------------------

/// Triple-loop GEMM composed from the dispatched primitives, row by row.
/// Handles every size and orientation the fast path declines.
#[allow(clippy::too_many_arguments)]
fn gemm_naive(
    m: usize,
    n: usize,
    k: usize,
    alpha: f64,
    a: &[f64],
    astride: usize,
    ia: usize,
    ja: usize,
    opa: Op,
    b: &[f64],
    bstride: usize,
    ib: usize,
    jb: usize,
    opb: Op,
    beta: f64,
    c: &mut [f64],
    cstride: usize,
    ic: usize,
    jc: usize,
) {
    match (opa, opb) {
        (_, Op::None) => {
            // Accumulate rows of op(B) scaled by op(A) elements; unit-stride
            // access on both B and C.
            for i in 0..m {
                if beta != 0.0 {
                    dispatch::rmulr(beta, c, cstride, ic + i, jc, n);
                } else {
                    dispatch::rsetr(0.0, c, cstride, ic + i, jc, n);
                }
                for t in 0..k {
                    let v = alpha * op_elem(a, astride, ia, ja, opa, i, t);
                    dispatch::raddvr(v, row(b, bstride, ib + t, jb, n), c, cstride, ic + i, jc);
                }
            }
        }
        (Op::None, Op::Trans) => {
            // Rows of both operands are contiguous: plain dot products.
            for i in 0..m {
                let arow = row(a, astride, ia + i, ja, k);
                for j in 0..n {
                    let v = dispatch::rdotv(arow, row(b, bstride, ib + j, jb, k));
                    store_elem(alpha, v, beta, &mut c[(ic + i) * cstride + jc + j]);
                }
            }
        }
        (Op::Trans, Op::Trans) => {
            // Rows of op(A) are stored columns; gather each once through the
            // pooled scratch, then dot against the contiguous rows of B.
            let mut acol = SCRATCH.take(k);
            for i in 0..m {
                dispatch::rcopycv(a, astride, ia, ja + i, &mut acol);
                for j in 0..n {
                    let v = dispatch::rdotv(&acol, row(b, bstride, ib + j, jb, k));
                    store_elem(alpha, v, beta, &mut c[(ic + i) * cstride + jc + j]);
                }
            }
            SCRATCH.give(acol);
        }
    }
}
