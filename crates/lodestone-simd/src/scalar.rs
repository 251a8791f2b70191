//! Scalar reference kernels.
//!
//! Portable, always-correct implementations of the vector/matrix primitive
//! set. These are the semantics of record: every vectorized variant in
//! [`crate::avx2`] and every dispatch wrapper in [`crate::dispatch`] must
//! reproduce what these functions compute, up to floating-point
//! reassociation for horizontal reductions.
//!
//! These are unchecked leaf primitives: vector lengths are taken from the
//! slices themselves, matrix addressing is `(buf, stride, ia, ja)` with
//! `debug_assert!`-only validation, and aliasing safety beyond what the
//! borrow checker enforces is a caller contract. Out-of-range offsets
//! panic on the slice bound in debug and release alike, but are still a
//! caller bug, not a reported error.

use lodestone_core::view::{row, row_mut};
use lodestone_core::Op;

// ---------------------------------------------------------------------------
// Reductions
// ---------------------------------------------------------------------------

/// Dot product `sum(x[i] * y[i])`.
#[inline]
pub fn rdotv(x: &[f64], y: &[f64]) -> f64 {
    debug_assert_eq!(x.len(), y.len());
    let mut s = 0.0;
    for (xi, yi) in x.iter().zip(y.iter()) {
        s += xi * yi;
    }
    s
}

/// Sum of squares `sum(x[i]^2)`.
#[inline]
pub fn rdotv2(x: &[f64]) -> f64 {
    let mut s = 0.0;
    for xi in x {
        s += xi * xi;
    }
    s
}

/// Maximum element; 0 for an empty vector.
#[inline]
pub fn rmaxv(x: &[f64]) -> f64 {
    let Some(&first) = x.first() else {
        return 0.0;
    };
    let mut m = first;
    for &xi in &x[1..] {
        if xi > m {
            m = xi;
        }
    }
    m
}

/// Maximum absolute value; 0 for an empty vector.
#[inline]
pub fn rmaxabsv(x: &[f64]) -> f64 {
    let mut m = 0.0;
    for &xi in x {
        let a = xi.abs();
        if a > m {
            m = a;
        }
    }
    m
}

/// Dot product of `x` against row `i` of a matrix view.
#[inline]
pub fn rdotr(x: &[f64], a: &[f64], stride: usize, i: usize, j: usize) -> f64 {
    rdotv(x, row(a, stride, i, j, x.len()))
}

/// Maximum element of row `i`, columns `j..j + n`; 0 for `n == 0`.
#[inline]
pub fn rmaxr(a: &[f64], stride: usize, i: usize, j: usize, n: usize) -> f64 {
    rmaxv(row(a, stride, i, j, n))
}

/// Maximum absolute value of row `i`, columns `j..j + n`; 0 for `n == 0`.
#[inline]
pub fn rmaxabsr(a: &[f64], stride: usize, i: usize, j: usize, n: usize) -> f64 {
    rmaxabsv(row(a, stride, i, j, n))
}

// ---------------------------------------------------------------------------
// AXPY family
// ---------------------------------------------------------------------------

/// `x := x + alpha * y`.
#[inline]
pub fn raddv(alpha: f64, y: &[f64], x: &mut [f64]) {
    debug_assert_eq!(x.len(), y.len());
    for (xi, yi) in x.iter_mut().zip(y.iter()) {
        *xi += alpha * yi;
    }
}

/// Matrix-row variant: `a[i, j..] := a[i, j..] + alpha * y`.
#[inline]
pub fn raddvr(alpha: f64, y: &[f64], a: &mut [f64], stride: usize, i: usize, j: usize) {
    raddv(alpha, y, row_mut(a, stride, i, j, y.len()));
}

/// `x := x + alpha * a[i, j..]`.
#[inline]
pub fn raddrv(alpha: f64, a: &[f64], stride: usize, i: usize, j: usize, x: &mut [f64]) {
    let n = x.len();
    raddv(alpha, row(a, stride, i, j, n), x);
}

/// Row-to-row variant within one buffer: `a[idst] := a[idst] + alpha * a[isrc]`.
#[inline]
pub fn raddrr(
    alpha: f64,
    a: &mut [f64],
    stride: usize,
    isrc: usize,
    jsrc: usize,
    idst: usize,
    jdst: usize,
    n: usize,
) {
    let src = isrc * stride + jsrc;
    let dst = idst * stride + jdst;
    debug_assert!(src + n <= dst || dst + n <= src, "rows must be disjoint");
    for t in 0..n {
        a[dst + t] += alpha * a[src + t];
    }
}

// ---------------------------------------------------------------------------
// Fused multiply-add (elementwise)
// ---------------------------------------------------------------------------

/// `x := x + y ∘ z` (elementwise product).
#[inline]
pub fn rmuladdv(y: &[f64], z: &[f64], x: &mut [f64]) {
    debug_assert_eq!(x.len(), y.len());
    debug_assert_eq!(x.len(), z.len());
    for ((xi, yi), zi) in x.iter_mut().zip(y.iter()).zip(z.iter()) {
        *xi += yi * zi;
    }
}

/// `x := x - y ∘ z`.
#[inline]
pub fn rnegmuladdv(y: &[f64], z: &[f64], x: &mut [f64]) {
    debug_assert_eq!(x.len(), y.len());
    debug_assert_eq!(x.len(), z.len());
    for ((xi, yi), zi) in x.iter_mut().zip(y.iter()).zip(z.iter()) {
        *xi -= yi * zi;
    }
}

/// Out-of-place `r := x + y ∘ z`.
#[inline]
pub fn rcopymuladdv(x: &[f64], y: &[f64], z: &[f64], r: &mut [f64]) {
    debug_assert_eq!(r.len(), x.len());
    for t in 0..r.len() {
        r[t] = x[t] + y[t] * z[t];
    }
}

/// Out-of-place `r := x - y ∘ z`.
#[inline]
pub fn rcopynegmuladdv(x: &[f64], y: &[f64], z: &[f64], r: &mut [f64]) {
    debug_assert_eq!(r.len(), x.len());
    for t in 0..r.len() {
        r[t] = x[t] - y[t] * z[t];
    }
}

// ---------------------------------------------------------------------------
// Scale / set / copy
// ---------------------------------------------------------------------------

/// `x := v * x`.
#[inline]
pub fn rmulv(v: f64, x: &mut [f64]) {
    for xi in x {
        *xi *= v;
    }
}

/// Row variant of [`rmulv`].
#[inline]
pub fn rmulr(v: f64, a: &mut [f64], stride: usize, i: usize, j: usize, n: usize) {
    rmulv(v, row_mut(a, stride, i, j, n));
}

/// Out-of-place scale `r := v * x`.
#[inline]
pub fn rcopymulv(v: f64, x: &[f64], r: &mut [f64]) {
    debug_assert_eq!(r.len(), x.len());
    for (ri, xi) in r.iter_mut().zip(x.iter()) {
        *ri = v * xi;
    }
}

/// `x := v`.
#[inline]
pub fn rsetv(v: f64, x: &mut [f64]) {
    for xi in x {
        *xi = v;
    }
}

/// Row variant of [`rsetv`].
#[inline]
pub fn rsetr(v: f64, a: &mut [f64], stride: usize, i: usize, j: usize, n: usize) {
    rsetv(v, row_mut(a, stride, i, j, n));
}

/// Fill an `m x n` sub-matrix with `v`.
#[inline]
pub fn rsetm(v: f64, a: &mut [f64], stride: usize, ia: usize, ja: usize, m: usize, n: usize) {
    for i in 0..m {
        rsetv(v, row_mut(a, stride, ia + i, ja, n));
    }
}

/// Integer fill.
#[inline]
pub fn isetv(v: i32, x: &mut [i32]) {
    for xi in x {
        *xi = v;
    }
}

/// Boolean fill.
#[inline]
pub fn bsetv(v: bool, x: &mut [bool]) {
    for xi in x {
        *xi = v;
    }
}

/// `r := x` for disjoint slices.
#[inline]
pub fn rcopyv(x: &[f64], r: &mut [f64]) {
    r.copy_from_slice(x);
}

/// Integer copy.
#[inline]
pub fn icopyv(x: &[i32], r: &mut [i32]) {
    r.copy_from_slice(x);
}

/// Boolean copy.
#[inline]
pub fn bcopyv(x: &[bool], r: &mut [bool]) {
    r.copy_from_slice(x);
}

/// Vector into matrix row: `a[i, j..] := x`.
#[inline]
pub fn rcopyvr(x: &[f64], a: &mut [f64], stride: usize, i: usize, j: usize) {
    row_mut(a, stride, i, j, x.len()).copy_from_slice(x);
}

/// Matrix row into vector: `x := a[i, j..]`.
#[inline]
pub fn rcopyrv(a: &[f64], stride: usize, i: usize, j: usize, x: &mut [f64]) {
    let n = x.len();
    x.copy_from_slice(row(a, stride, i, j, n));
}

/// Row-to-row copy within one buffer. Overlapping source and destination
/// ranges are handled (this is the documented same-array-safe copy).
#[inline]
pub fn rcopyrr(
    a: &mut [f64],
    stride: usize,
    isrc: usize,
    jsrc: usize,
    idst: usize,
    jdst: usize,
    n: usize,
) {
    let src = isrc * stride + jsrc;
    let dst = idst * stride + jdst;
    a.copy_within(src..src + n, dst);
}

/// Gather a matrix column into a vector: `x[t] := a[ia + t, ja]`.
#[inline]
pub fn rcopycv(a: &[f64], stride: usize, ia: usize, ja: usize, x: &mut [f64]) {
    for (t, xt) in x.iter_mut().enumerate() {
        *xt = a[(ia + t) * stride + ja];
    }
}

// ---------------------------------------------------------------------------
// Elementwise merges
// ---------------------------------------------------------------------------

/// `x := x ∘ y`.
#[inline]
pub fn rmergemulv(y: &[f64], x: &mut [f64]) {
    debug_assert_eq!(x.len(), y.len());
    for (xi, yi) in x.iter_mut().zip(y.iter()) {
        *xi *= yi;
    }
}

/// `x := x / y` elementwise.
#[inline]
pub fn rmergedivv(y: &[f64], x: &mut [f64]) {
    debug_assert_eq!(x.len(), y.len());
    for (xi, yi) in x.iter_mut().zip(y.iter()) {
        *xi /= yi;
    }
}

/// `x := max(x, y)` elementwise.
#[inline]
pub fn rmergemaxv(y: &[f64], x: &mut [f64]) {
    debug_assert_eq!(x.len(), y.len());
    for (xi, yi) in x.iter_mut().zip(y.iter()) {
        if *yi > *xi {
            *xi = *yi;
        }
    }
}

/// `x := min(x, y)` elementwise.
#[inline]
pub fn rmergeminv(y: &[f64], x: &mut [f64]) {
    debug_assert_eq!(x.len(), y.len());
    for (xi, yi) in x.iter_mut().zip(y.iter()) {
        if *yi < *xi {
            *xi = *yi;
        }
    }
}

/// Row-destination variant of [`rmergemulv`]: `a[i, j..] := a[i, j..] ∘ y`.
#[inline]
pub fn rmergemulvr(y: &[f64], a: &mut [f64], stride: usize, i: usize, j: usize) {
    rmergemulv(y, row_mut(a, stride, i, j, y.len()));
}

/// Row-destination variant of [`rmergedivv`].
#[inline]
pub fn rmergedivvr(y: &[f64], a: &mut [f64], stride: usize, i: usize, j: usize) {
    rmergedivv(y, row_mut(a, stride, i, j, y.len()));
}

/// Row-destination variant of [`rmergemaxv`].
#[inline]
pub fn rmergemaxvr(y: &[f64], a: &mut [f64], stride: usize, i: usize, j: usize) {
    rmergemaxv(y, row_mut(a, stride, i, j, y.len()));
}

/// Row-destination variant of [`rmergeminv`].
#[inline]
pub fn rmergeminvr(y: &[f64], a: &mut [f64], stride: usize, i: usize, j: usize) {
    rmergeminv(y, row_mut(a, stride, i, j, y.len()));
}

// ---------------------------------------------------------------------------
// GEMV / rank-1 / triangular solve
// ---------------------------------------------------------------------------

/// General matrix-vector product `y := alpha * op(a) * x + beta * y`.
///
/// `op(a)` is `m x n`. Degenerate-case contract:
/// - `m == 0`: nothing is touched, not even `y`.
/// - `beta == 0`: `y` is overwritten without being read, so stale NaN or
///   garbage never propagates.
/// - `n == 0` or `alpha == 0`: `y` is only rescaled (or zeroed) by `beta`.
#[allow(clippy::too_many_arguments)]
pub fn rgemv(
    m: usize,
    n: usize,
    alpha: f64,
    a: &[f64],
    stride: usize,
    ia: usize,
    ja: usize,
    opa: Op,
    x: &[f64],
    beta: f64,
    y: &mut [f64],
) {
    if m == 0 {
        return;
    }
    if beta != 0.0 {
        rmulv(beta, &mut y[..m]);
    } else {
        rsetv(0.0, &mut y[..m]);
    }
    if n == 0 || alpha == 0.0 {
        return;
    }
    match opa {
        Op::None => {
            for i in 0..m {
                y[i] += alpha * rdotv(&x[..n], row(a, stride, ia + i, ja, n));
            }
        }
        Op::Trans => {
            // op(a) row i is column i of the stored n x m block; walk the
            // stored rows instead so memory access stays unit-stride.
            for t in 0..n {
                let v = alpha * x[t];
                raddv(v, row(a, stride, ia + t, ja, m), &mut y[..m]);
            }
        }
    }
}

/// Rank-1 update `a := a + alpha * u * vᵀ` on an `m x n` view.
///
/// No-op when `m == 0`, `n == 0` or `alpha == 0`.
#[allow(clippy::too_many_arguments)]
pub fn rger(
    m: usize,
    n: usize,
    alpha: f64,
    u: &[f64],
    v: &[f64],
    a: &mut [f64],
    stride: usize,
    ia: usize,
    ja: usize,
) {
    if m == 0 || n == 0 || alpha == 0.0 {
        return;
    }
    for i in 0..m {
        raddv(alpha * u[i], &v[..n], row_mut(a, stride, ia + i, ja, n));
    }
}

/// In-place triangular solve `op(a) * x = b` where `b` arrives in `x`.
///
/// `a` is an `n x n` triangular view; the four `(is_upper, op)` cases are
/// plain forward/back substitution. Unit-diagonal solves never read the
/// stored diagonal. No pivoting, no singularity detection — a zero diagonal
/// produces infinities per IEEE semantics and is the caller's bug.
#[allow(clippy::too_many_arguments)]
pub fn rtrsv(
    n: usize,
    a: &[f64],
    stride: usize,
    ia: usize,
    ja: usize,
    is_upper: bool,
    is_unit: bool,
    opa: Op,
    x: &mut [f64],
) {
    if n == 0 {
        return;
    }
    match (is_upper, opa) {
        (true, Op::None) => {
            // Back substitution.
            for i in (0..n).rev() {
                let tail = n - i - 1;
                let mut v = x[i];
                if tail > 0 {
                    v -= rdotv(&x[i + 1..n], row(a, stride, ia + i, ja + i + 1, tail));
                }
                if !is_unit {
                    v /= a[(ia + i) * stride + ja + i];
                }
                x[i] = v;
            }
        }
        (false, Op::None) => {
            // Forward substitution.
            for i in 0..n {
                let mut v = x[i];
                if i > 0 {
                    v -= rdotv(&x[..i], row(a, stride, ia + i, ja, i));
                }
                if !is_unit {
                    v /= a[(ia + i) * stride + ja + i];
                }
                x[i] = v;
            }
        }
        (true, Op::Trans) => {
            // aᵀ is lower triangular; column-oriented forward substitution.
            for i in 0..n {
                if !is_unit {
                    x[i] /= a[(ia + i) * stride + ja + i];
                }
                let v = x[i];
                let tail = n - i - 1;
                if tail > 0 && v != 0.0 {
                    raddv(
                        -v,
                        row(a, stride, ia + i, ja + i + 1, tail),
                        &mut x[i + 1..n],
                    );
                }
            }
        }
        (false, Op::Trans) => {
            // aᵀ is upper triangular; column-oriented back substitution.
            for i in (0..n).rev() {
                if !is_unit {
                    x[i] /= a[(ia + i) * stride + ja + i];
                }
                let v = x[i];
                if i > 0 && v != 0.0 {
                    raddv(-v, row(a, stride, ia + i, ja, i), &mut x[..i]);
                }
            }
        }
    }
}
