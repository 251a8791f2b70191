//! Dispatch wrappers: the public primitive entry points.
//!
//! Every function here has the same signature and output as its scalar
//! reference in [`crate::scalar`], regardless of which path executed. The
//! policy is uniform: inputs at or above [`SIMD_THRESHOLD_V`] attempt the
//! vectorized variant under the cached CPU capability; a decline (capability
//! absent, size below threshold, or no vector support compiled in) falls
//! through to the scalar implementation. The threshold is a tuning knob,
//! not a correctness concern.

use lodestone_core::view::{row, row_mut};
use lodestone_core::Op;

#[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
use crate::avx2;
use crate::capability::SimdCapability;
use crate::scalar;

/// Minimum vector length for which the SIMD variants are attempted.
pub const SIMD_THRESHOLD_V: usize = 8;

macro_rules! dispatch {
    ($n:expr, $try_call:expr, $scalar_call:expr) => {{
        #[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
        if $n >= SIMD_THRESHOLD_V {
            if let Some(r) = $try_call {
                return r;
            }
        }
        $scalar_call
    }};
}

/// Dot product `sum(x[i] * y[i])`.
#[inline]
pub fn rdotv(x: &[f64], y: &[f64]) -> f64 {
    dispatch!(
        x.len(),
        avx2::try_rdotv(x, y, SimdCapability::cached()),
        scalar::rdotv(x, y)
    )
}

/// Sum of squares `sum(x[i]^2)`.
#[inline]
pub fn rdotv2(x: &[f64]) -> f64 {
    dispatch!(
        x.len(),
        avx2::try_rdotv2(x, SimdCapability::cached()),
        scalar::rdotv2(x)
    )
}

/// `x := x + alpha * y`.
#[inline]
pub fn raddv(alpha: f64, y: &[f64], x: &mut [f64]) {
    dispatch!(
        x.len(),
        avx2::try_raddv(alpha, y, x, SimdCapability::cached()),
        scalar::raddv(alpha, y, x)
    )
}

/// `x := v * x`.
#[inline]
pub fn rmulv(v: f64, x: &mut [f64]) {
    dispatch!(
        x.len(),
        avx2::try_rmulv(v, x, SimdCapability::cached()),
        scalar::rmulv(v, x)
    )
}

/// Out-of-place scale `r := v * x`.
#[inline]
pub fn rcopymulv(v: f64, x: &[f64], r: &mut [f64]) {
    dispatch!(
        r.len(),
        avx2::try_rcopymulv(v, x, r, SimdCapability::cached()),
        scalar::rcopymulv(v, x, r)
    )
}

/// `x := v`.
#[inline]
pub fn rsetv(v: f64, x: &mut [f64]) {
    dispatch!(
        x.len(),
        avx2::try_rsetv(v, x, SimdCapability::cached()),
        scalar::rsetv(v, x)
    )
}

/// `r := x`.
#[inline]
pub fn rcopyv(x: &[f64], r: &mut [f64]) {
    dispatch!(
        r.len(),
        avx2::try_rcopyv(x, r, SimdCapability::cached()),
        scalar::rcopyv(x, r)
    )
}

/// `x := x + y ∘ z`.
#[inline]
pub fn rmuladdv(y: &[f64], z: &[f64], x: &mut [f64]) {
    dispatch!(
        x.len(),
        avx2::try_rmuladdv(y, z, x, SimdCapability::cached()),
        scalar::rmuladdv(y, z, x)
    )
}

/// `x := x - y ∘ z`.
#[inline]
pub fn rnegmuladdv(y: &[f64], z: &[f64], x: &mut [f64]) {
    dispatch!(
        x.len(),
        avx2::try_rnegmuladdv(y, z, x, SimdCapability::cached()),
        scalar::rnegmuladdv(y, z, x)
    )
}

/// `r := x + y ∘ z`.
#[inline]
pub fn rcopymuladdv(x: &[f64], y: &[f64], z: &[f64], r: &mut [f64]) {
    dispatch!(
        r.len(),
        avx2::try_rcopymuladdv(x, y, z, r, SimdCapability::cached()),
        scalar::rcopymuladdv(x, y, z, r)
    )
}

/// `r := x - y ∘ z`.
#[inline]
pub fn rcopynegmuladdv(x: &[f64], y: &[f64], z: &[f64], r: &mut [f64]) {
    dispatch!(
        r.len(),
        avx2::try_rcopynegmuladdv(x, y, z, r, SimdCapability::cached()),
        scalar::rcopynegmuladdv(x, y, z, r)
    )
}

/// `x := x ∘ y`.
#[inline]
pub fn rmergemulv(y: &[f64], x: &mut [f64]) {
    dispatch!(
        x.len(),
        avx2::try_rmergemulv(y, x, SimdCapability::cached()),
        scalar::rmergemulv(y, x)
    )
}

/// `x := x / y` elementwise.
#[inline]
pub fn rmergedivv(y: &[f64], x: &mut [f64]) {
    dispatch!(
        x.len(),
        avx2::try_rmergedivv(y, x, SimdCapability::cached()),
        scalar::rmergedivv(y, x)
    )
}

/// `x := max(x, y)` elementwise.
#[inline]
pub fn rmergemaxv(y: &[f64], x: &mut [f64]) {
    dispatch!(
        x.len(),
        avx2::try_rmergemaxv(y, x, SimdCapability::cached()),
        scalar::rmergemaxv(y, x)
    )
}

/// `x := min(x, y)` elementwise.
#[inline]
pub fn rmergeminv(y: &[f64], x: &mut [f64]) {
    dispatch!(
        x.len(),
        avx2::try_rmergeminv(y, x, SimdCapability::cached()),
        scalar::rmergeminv(y, x)
    )
}

/// Maximum element; 0 for an empty vector.
#[inline]
pub fn rmaxv(x: &[f64]) -> f64 {
    dispatch!(
        x.len(),
        avx2::try_rmaxv(x, SimdCapability::cached()),
        scalar::rmaxv(x)
    )
}

/// Maximum absolute value; 0 for an empty vector.
#[inline]
pub fn rmaxabsv(x: &[f64]) -> f64 {
    dispatch!(
        x.len(),
        avx2::try_rmaxabsv(x, SimdCapability::cached()),
        scalar::rmaxabsv(x)
    )
}

// ---------------------------------------------------------------------------
// Row-addressed variants: slice the row, then dispatch the vector kernel.
// ---------------------------------------------------------------------------

/// Dot product of `x` against row `i` of a matrix view.
#[inline]
pub fn rdotr(x: &[f64], a: &[f64], stride: usize, i: usize, j: usize) -> f64 {
    rdotv(x, row(a, stride, i, j, x.len()))
}

/// `a[i, j..] := a[i, j..] + alpha * y`.
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

/// `a[i, j..j+n] := v * a[i, j..j+n]`.
#[inline]
pub fn rmulr(v: f64, a: &mut [f64], stride: usize, i: usize, j: usize, n: usize) {
    rmulv(v, row_mut(a, stride, i, j, n));
}

/// `a[i, j..j+n] := v`.
#[inline]
pub fn rsetr(v: f64, a: &mut [f64], stride: usize, i: usize, j: usize, n: usize) {
    rsetv(v, row_mut(a, stride, i, j, n));
}

/// Maximum element of row `i`, columns `j..j+n`.
#[inline]
pub fn rmaxr(a: &[f64], stride: usize, i: usize, j: usize, n: usize) -> f64 {
    rmaxv(row(a, stride, i, j, n))
}

/// Maximum absolute value of row `i`, columns `j..j+n`.
#[inline]
pub fn rmaxabsr(a: &[f64], stride: usize, i: usize, j: usize, n: usize) -> f64 {
    rmaxabsv(row(a, stride, i, j, n))
}

/// `a[i, j..] := x`.
#[inline]
pub fn rcopyvr(x: &[f64], a: &mut [f64], stride: usize, i: usize, j: usize) {
    rcopyv(x, row_mut(a, stride, i, j, x.len()));
}

/// `x := a[i, j..]`.
#[inline]
pub fn rcopyrv(a: &[f64], stride: usize, i: usize, j: usize, x: &mut [f64]) {
    let n = x.len();
    rcopyv(row(a, stride, i, j, n), x);
}

/// `a[i, j..j+n] := a[i, j..j+n] ∘ y`.
#[inline]
pub fn rmergemulvr(y: &[f64], a: &mut [f64], stride: usize, i: usize, j: usize) {
    rmergemulv(y, row_mut(a, stride, i, j, y.len()));
}

/// `a[i, j..j+n] := a[i, j..j+n] / y` elementwise.
#[inline]
pub fn rmergedivvr(y: &[f64], a: &mut [f64], stride: usize, i: usize, j: usize) {
    rmergedivv(y, row_mut(a, stride, i, j, y.len()));
}

/// `a[i, j..j+n] := max(a[i, j..j+n], y)` elementwise.
#[inline]
pub fn rmergemaxvr(y: &[f64], a: &mut [f64], stride: usize, i: usize, j: usize) {
    rmergemaxv(y, row_mut(a, stride, i, j, y.len()));
}

/// `a[i, j..j+n] := min(a[i, j..j+n], y)` elementwise.
#[inline]
pub fn rmergeminvr(y: &[f64], a: &mut [f64], stride: usize, i: usize, j: usize) {
    rmergeminv(y, row_mut(a, stride, i, j, y.len()));
}

/// Fill an `m x n` sub-matrix with `v`, row by row.
pub fn rsetm(v: f64, a: &mut [f64], stride: usize, ia: usize, ja: usize, m: usize, n: usize) {
    for i in 0..m {
        rsetr(v, a, stride, ia + i, ja, n);
    }
}

// ---------------------------------------------------------------------------
// Forwards with no vector variant: strided gathers, overlapping row copies
// and the integer/boolean fills stay scalar, but call sites keep a single
// entry surface.
// ---------------------------------------------------------------------------

/// Row-to-row copy within one buffer; overlapping ranges are handled.
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
    scalar::rcopyrr(a, stride, isrc, jsrc, idst, jdst, n);
}

/// Gather a matrix column into a vector: `x[t] := a[ia + t, ja]`.
#[inline]
pub fn rcopycv(a: &[f64], stride: usize, ia: usize, ja: usize, x: &mut [f64]) {
    scalar::rcopycv(a, stride, ia, ja, x);
}

/// Integer fill.
#[inline]
pub fn isetv(v: i32, x: &mut [i32]) {
    scalar::isetv(v, x);
}

/// Boolean fill.
#[inline]
pub fn bsetv(v: bool, x: &mut [bool]) {
    scalar::bsetv(v, x);
}

/// Integer copy.
#[inline]
pub fn icopyv(x: &[i32], r: &mut [i32]) {
    scalar::icopyv(x, r);
}

/// Boolean copy.
#[inline]
pub fn bcopyv(x: &[bool], r: &mut [bool]) {
    scalar::bcopyv(x, r);
}

// ---------------------------------------------------------------------------
// Composite primitives: built from dispatched kernels, so they pick up the
// vector paths row by row while keeping the scalar reference semantics.
// ---------------------------------------------------------------------------

/// General matrix-vector product `y := alpha * op(a) * x + beta * y`.
///
/// Same degenerate-case contract as [`scalar::rgemv`].
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
            for t in 0..n {
                let v = alpha * x[t];
                raddv(v, row(a, stride, ia + t, ja, m), &mut y[..m]);
            }
        }
    }
}

/// Rank-1 update `a := a + alpha * u * vᵀ`.
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

/// In-place triangular solve `op(a) * x = b`.
///
/// Substitution is inherently sequential, so this forwards to the scalar
/// implementation; it exists so call sites uniformly target this module.
#[allow(clippy::too_many_arguments)]
#[inline]
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
    scalar::rtrsv(n, a, stride, ia, ja, is_upper, is_unit, opa, x);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn data(n: usize, seed: f64) -> Vec<f64> {
        (0..n)
            .map(|i| ((i as f64 + seed) * 0.43).sin() * 2.0)
            .collect()
    }

    /// Dispatch transparency: from empty input through several multiples of
    /// the threshold, every wrapper agrees with the scalar reference.
    #[test]
    fn transparency_all_sizes() {
        for n in 0..=4 * SIMD_THRESHOLD_V {
            let x0 = data(n, 3.0);
            let y = data(n, 11.0);
            let z = data(n, 7.0);

            // Reductions: tolerance, the chunked order may differ.
            let d = rdotv(&x0, &y);
            let ds = scalar::rdotv(&x0, &y);
            assert!((d - ds).abs() <= ds.abs().max(1.0) * 1e-13, "rdotv n={n}");

            let q = rdotv2(&x0);
            let qs = scalar::rdotv2(&x0);
            assert!((q - qs).abs() <= qs.max(1.0) * 1e-13, "rdotv2 n={n}");

            assert_eq!(rmaxv(&x0), scalar::rmaxv(&x0), "rmaxv n={n}");
            assert_eq!(rmaxabsv(&x0), scalar::rmaxabsv(&x0), "rmaxabsv n={n}");

            // Elementwise ops: exact equality required.
            let mut a = x0.clone();
            let mut b = x0.clone();
            raddv(1.5, &y, &mut a);
            scalar::raddv(1.5, &y, &mut b);
            assert_eq!(a, b, "raddv n={n}");

            let mut a = x0.clone();
            let mut b = x0.clone();
            rmuladdv(&y, &z, &mut a);
            scalar::rmuladdv(&y, &z, &mut b);
            assert_eq!(a, b, "rmuladdv n={n}");

            let mut a = x0.clone();
            let mut b = x0.clone();
            rnegmuladdv(&y, &z, &mut a);
            scalar::rnegmuladdv(&y, &z, &mut b);
            assert_eq!(a, b, "rnegmuladdv n={n}");

            let mut a = x0.clone();
            let mut b = x0.clone();
            rmulv(0.625, &mut a);
            scalar::rmulv(0.625, &mut b);
            assert_eq!(a, b, "rmulv n={n}");

            let mut a = x0.clone();
            let mut b = x0.clone();
            rmergemulv(&y, &mut a);
            scalar::rmergemulv(&y, &mut b);
            assert_eq!(a, b, "rmergemulv n={n}");

            let mut a = x0.clone();
            let mut b = x0.clone();
            rmergedivv(&y, &mut a);
            scalar::rmergedivv(&y, &mut b);
            assert_eq!(a, b, "rmergedivv n={n}");

            let mut a = x0.clone();
            let mut b = x0.clone();
            rmergemaxv(&y, &mut a);
            scalar::rmergemaxv(&y, &mut b);
            assert_eq!(a, b, "rmergemaxv n={n}");

            let mut a = x0.clone();
            let mut b = x0.clone();
            rmergeminv(&y, &mut a);
            scalar::rmergeminv(&y, &mut b);
            assert_eq!(a, b, "rmergeminv n={n}");

            let mut a = vec![0.0; n];
            let mut b = vec![0.0; n];
            rcopymuladdv(&x0, &y, &z, &mut a);
            scalar::rcopymuladdv(&x0, &y, &z, &mut b);
            assert_eq!(a, b, "rcopymuladdv n={n}");

            let mut a = vec![0.0; n];
            let mut b = vec![0.0; n];
            rcopynegmuladdv(&x0, &y, &z, &mut a);
            scalar::rcopynegmuladdv(&x0, &y, &z, &mut b);
            assert_eq!(a, b, "rcopynegmuladdv n={n}");

            let mut a = vec![0.0; n];
            let mut b = vec![0.0; n];
            rcopymulv(0.3, &x0, &mut a);
            scalar::rcopymulv(0.3, &x0, &mut b);
            assert_eq!(a, b, "rcopymulv n={n}");

            let mut a = vec![0.0; n];
            rsetv(2.5, &mut a);
            assert!(a.iter().all(|&v| v == 2.5), "rsetv n={n}");

            let mut a = vec![0.0; n];
            rcopyv(&x0, &mut a);
            assert_eq!(a, x0, "rcopyv n={n}");
        }
    }

    /// The copy/set/merge row forwards write the same cells as their scalar
    /// counterparts and leave the padding alone.
    #[test]
    fn copy_set_forwards_match_scalar() {
        let n = 11;
        let stride = n + 3;
        let rows = 4;
        let base: Vec<f64> = data(rows * stride, 6.0);
        let x = data(n, 9.0);

        let mut a = base.clone();
        let mut aref = base.clone();
        rcopyvr(&x, &mut a, stride, 2, 1);
        scalar::rcopyvr(&x, &mut aref, stride, 2, 1);
        assert_eq!(a, aref, "rcopyvr");

        let mut v = vec![0.0; n];
        let mut vref = vec![0.0; n];
        rcopyrv(&base, stride, 1, 2, &mut v);
        scalar::rcopyrv(&base, stride, 1, 2, &mut vref);
        assert_eq!(v, vref, "rcopyrv");

        // Overlapping shift within one row.
        let mut a = base.clone();
        let mut aref = base.clone();
        rcopyrr(&mut a, stride, 0, 0, 0, 2, n);
        scalar::rcopyrr(&mut aref, stride, 0, 0, 0, 2, n);
        assert_eq!(a, aref, "rcopyrr");

        let mut v = vec![0.0; rows];
        rcopycv(&base, stride, 0, 3, &mut v);
        for t in 0..rows {
            assert_eq!(v[t], base[t * stride + 3], "rcopycv row {t}");
        }

        let mut a = base.clone();
        rsetm(7.5, &mut a, stride, 1, 2, 2, n);
        for i in 0..rows {
            for j in 0..stride {
                let inside = (1..3).contains(&i) && (2..2 + n).contains(&j);
                let want = if inside { 7.5 } else { base[i * stride + j] };
                assert_eq!(a[i * stride + j], want, "rsetm ({i},{j})");
            }
        }

        let mut a = base.clone();
        let mut aref = base.clone();
        rmergemulvr(&x, &mut a, stride, 3, 0);
        scalar::rmergemulvr(&x, &mut aref, stride, 3, 0);
        assert_eq!(a, aref, "rmergemulvr");

        let mut a = base.clone();
        let mut aref = base.clone();
        rmergedivvr(&x, &mut a, stride, 3, 0);
        scalar::rmergedivvr(&x, &mut aref, stride, 3, 0);
        assert_eq!(a, aref, "rmergedivvr");

        let mut a = base.clone();
        let mut aref = base.clone();
        rmergemaxvr(&x, &mut a, stride, 3, 0);
        scalar::rmergemaxvr(&x, &mut aref, stride, 3, 0);
        assert_eq!(a, aref, "rmergemaxvr");

        let mut a = base.clone();
        let mut aref = base.clone();
        rmergeminvr(&x, &mut a, stride, 3, 0);
        scalar::rmergeminvr(&x, &mut aref, stride, 3, 0);
        assert_eq!(a, aref, "rmergeminvr");

        let mut iv = vec![0i32; 5];
        isetv(-3, &mut iv);
        assert_eq!(iv, vec![-3; 5]);
        let mut ic = vec![0i32; 5];
        icopyv(&iv, &mut ic);
        assert_eq!(ic, iv);

        let mut bv = vec![false; 5];
        bsetv(true, &mut bv);
        assert!(bv.iter().all(|&b| b));
        let mut bc = vec![false; 5];
        bcopyv(&bv, &mut bc);
        assert_eq!(bc, bv);
    }

    #[test]
    fn gemv_matches_scalar_reference() {
        for (m, n) in [(1, 1), (3, 5), (8, 8), (13, 29), (32, 17)] {
            let stride = m.max(n) + 2;
            let a: Vec<f64> = (0..(m.max(n)) * stride)
                .map(|i| (i as f64 * 0.17).sin())
                .collect();
            for &opa in &[Op::None, Op::Trans] {
                let (rows, cols) = (m, n);
                let x = data(cols, 1.0);
                let y0 = data(rows, 2.0);

                let mut y = y0.clone();
                let mut yref = y0.clone();
                rgemv(rows, cols, 1.25, &a, stride, 0, 0, opa, &x, -0.5, &mut y);
                scalar::rgemv(rows, cols, 1.25, &a, stride, 0, 0, opa, &x, -0.5, &mut yref);
                for i in 0..rows {
                    assert!(
                        (y[i] - yref[i]).abs() <= yref[i].abs().max(1.0) * 1e-13,
                        "m={m} n={n} op={opa:?} row {i}"
                    );
                }
            }
        }
    }

    #[test]
    fn ger_matches_scalar_reference() {
        let (m, n) = (7, 13);
        let stride = n + 1;
        let u = data(m, 0.5);
        let v = data(n, 4.5);
        let mut a = vec![0.0; m * stride];
        let mut aref = a.clone();
        rger(m, n, 0.75, &u, &v, &mut a, stride, 0, 0);
        scalar::rger(m, n, 0.75, &u, &v, &mut aref, stride, 0, 0);
        assert_eq!(a, aref);
    }
}
