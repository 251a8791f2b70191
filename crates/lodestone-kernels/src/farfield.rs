//! Biharmonic far-field expansion evaluation.
//!
//! A far-field expansion is a truncated spherical-harmonic series of degree
//! [`MAXP`] with per-channel complex moments. Evaluation at an offset
//! `(dx, dy, dz)` from the expansion center runs the associated-Legendre
//! recurrence in `cos θ`, accumulates `r^{15-n}`-weighted moment products,
//! and returns the radial factor `1/(r²)⁸` separately so callers can batch
//! the final scaling.
//!
//! The recurrence coefficients do not depend on the moments, so they are
//! precomputed once into [`FarFieldTables`] and shared across every
//! evaluation against that expansion.

use lodestone_core::{Error, Result};
use num_complex::Complex64;

/// Expansion degree bound. Series terms run `n in 0..MAXP`, `m in 0..=n`.
pub const MAXP: usize = 16;

/// Keeps `r` finite at the expansion center and `φ` defined on the z-axis.
const FF_EPS2: f64 = 1.0e-100;

/// Precomputed recurrence coefficients and moments for one expansion.
///
/// All square tables are `MAXP * MAXP` and indexed `[n * MAXP + m]`, rows
/// contiguous in `m`. Entries with `m > n` are zero, which lets the vector
/// path run whole 4-lane order quads without masking. `tblrmodmn` holds the
/// moments as two planes (real, then imaginary), each `ny` channel tables
/// of `MAXP * MAXP`.
#[derive(Debug, Clone)]
pub struct FarFieldTables {
    /// Number of moment channels, at most `MAXP`.
    pub ny: usize,
    /// `P_{n,m}` recurrence: coefficient of `cosθ · P_{n-1,m}`.
    pub pnma: Vec<f64>,
    /// `P_{n,m}` recurrence: coefficient of `P_{n-2,m}`.
    pub pnmb: Vec<f64>,
    /// Diagonal seed recurrence: `P_{m,m} = pmmcdiag[m] · sinθ · P_{m-1,m-1}`.
    pub pmmcdiag: Vec<f64>,
    /// Spherical-harmonic normalization `√((2n+1)/(4π) · (n-m)!/(n+m)!)`.
    pub ynma: Vec<f64>,
    /// Moments, `[plane(re=0, im=1)][channel][n][m]` flattened.
    pub tblrmodmn: Vec<f64>,
}

/// Standard recurrence constants for degree bound `maxp`.
///
/// Returns `(pnma, pnmb, pmmcdiag, ynma)`, each laid out `[n * maxp + m]`
/// with zeros wherever `m > n` (and wherever the recurrence never reads).
pub fn standard_coefficients(maxp: usize) -> (Vec<f64>, Vec<f64>, Vec<f64>, Vec<f64>) {
    let mut pnma = vec![0.0; maxp * maxp];
    let mut pnmb = vec![0.0; maxp * maxp];
    let mut pmmcdiag = vec![0.0; maxp];
    let mut ynma = vec![0.0; maxp * maxp];

    for m in 1..maxp {
        pmmcdiag[m] = -((2 * m - 1) as f64);
    }
    for n in 1..maxp {
        for m in 0..n {
            let d = (n - m) as f64;
            pnma[n * maxp + m] = (2 * n - 1) as f64 / d;
            pnmb[n * maxp + m] = -((n + m - 1) as f64) / d;
        }
    }
    // (n-m)!/(n+m)! built by stepping m upward so no factorial overflows.
    for n in 0..maxp {
        let mut y = ((2 * n + 1) as f64 / (4.0 * std::f64::consts::PI)).sqrt();
        ynma[n * maxp] = y;
        for m in 0..n {
            y /= (((n - m) * (n + m + 1)) as f64).sqrt();
            ynma[n * maxp + m + 1] = y;
        }
    }
    (pnma, pnmb, pmmcdiag, ynma)
}

impl FarFieldTables {
    /// Build tables for `ny` channels with the standard coefficients and
    /// the given moment planes.
    pub fn new(ny: usize, tblrmodmn: Vec<f64>) -> Result<Self> {
        if ny == 0 || ny > MAXP {
            return Err(Error::DimensionMismatch {
                expected: MAXP,
                actual: ny,
            });
        }
        let needed = 2 * ny * MAXP * MAXP;
        if tblrmodmn.len() < needed {
            return Err(Error::BufferTooSmall {
                needed,
                len: tblrmodmn.len(),
            });
        }
        let (pnma, pnmb, pmmcdiag, ynma) = standard_coefficients(MAXP);
        Ok(Self {
            ny,
            pnma,
            pnmb,
            pmmcdiag,
            ynma,
            tblrmodmn,
        })
    }

    #[inline]
    fn moment_base(&self, plane: usize, c: usize, n: usize) -> usize {
        ((plane * self.ny + c) * MAXP + n) * MAXP
    }
}

/// Geometry shared by both evaluation paths.
struct Geometry {
    costheta: f64,
    sintheta: f64,
    /// `cos mφ` for `m in 0..MAXP`.
    cmphi: [f64; MAXP],
    /// `sin mφ` for `m in 0..MAXP`.
    smphi: [f64; MAXP],
    /// `r^{15-n}` for `n in 0..MAXP`.
    rpow: [f64; MAXP],
    /// `1/(r²)⁸`.
    factor: f64,
}

fn geometry(dx: f64, dy: f64, dz: f64) -> Geometry {
    let rxy2 = dx * dx + dy * dy;
    let r2 = rxy2 + dz * dz + FF_EPS2;
    let r = r2.sqrt();
    let costheta = dz / r;
    let sintheta = rxy2.sqrt() / r;

    let rphi = (rxy2 + FF_EPS2).sqrt();
    let ephi = Complex64::new(dx / rphi, dy / rphi);
    let mut e = Complex64::new(1.0, 0.0);
    let mut cmphi = [0.0; MAXP];
    let mut smphi = [0.0; MAXP];
    for m in 0..MAXP {
        cmphi[m] = e.re;
        smphi[m] = e.im;
        e *= ephi;
    }

    let mut rpow = [0.0; MAXP];
    rpow[MAXP - 1] = 1.0;
    for n in (0..MAXP - 1).rev() {
        rpow[n] = rpow[n + 1] * r;
    }

    let r4 = r2 * r2;
    let r8 = r4 * r4;
    let factor = 1.0 / (r8 * r8);

    Geometry {
        costheta,
        sintheta,
        cmphi,
        smphi,
        rpow,
        factor,
    }
}

/// Portable reference evaluation. Accumulates all `ny` channel values into
/// `out` and returns the radial factor.
pub fn eval_channels_scalar(t: &FarFieldTables, dx: f64, dy: f64, dz: f64, out: &mut [f64]) -> f64 {
    debug_assert!(out.len() >= t.ny);
    let g = geometry(dx, dy, dz);
    out[..t.ny].fill(0.0);

    let mut pmm = 1.0;
    for m in 0..MAXP {
        if m > 0 {
            pmm = t.pmmcdiag[m] * g.sintheta * pmm;
        }
        let mut p0 = 0.0;
        let mut p1 = pmm;
        accumulate_term(t, &g, m, m, pmm, out);
        for n in m + 1..MAXP {
            let p = t.pnma[n * MAXP + m] * g.costheta * p1 + t.pnmb[n * MAXP + m] * p0;
            accumulate_term(t, &g, n, m, p, out);
            p0 = p1;
            p1 = p;
        }
    }
    g.factor
}

#[inline]
fn accumulate_term(t: &FarFieldTables, g: &Geometry, n: usize, m: usize, pnm: f64, out: &mut [f64]) {
    let s = t.ynma[n * MAXP + m] * pnm * g.rpow[n];
    for c in 0..t.ny {
        let re = t.tblrmodmn[t.moment_base(0, c, n) + m];
        let im = t.tblrmodmn[t.moment_base(1, c, n) + m];
        out[c] += s * (re * g.cmphi[m] + im * g.smphi[m]);
    }
}

/// Order recurrence four orders per register: lanes hold `m0..m0+4`, the
/// degree loop steps `n` with the diagonal seed blended into lane `n - m0`
/// as each order comes live. Coefficient and moment tables are zero for
/// `m > n`, so not-yet-live lanes accumulate exact zeros.
#[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
#[target_feature(enable = "avx2", enable = "fma")]
unsafe fn eval_channels_fma(
    t: &FarFieldTables,
    g: &Geometry,
    pmmseed: &[f64; MAXP],
    out: &mut [f64],
) {
    #[cfg(target_arch = "x86")]
    use std::arch::x86::*;
    #[cfg(target_arch = "x86_64")]
    use std::arch::x86_64::*;

    let cos_v = _mm256_set1_pd(g.costheta);
    let mut acc = [_mm256_setzero_pd(); MAXP];

    for m0 in (0..MAXP).step_by(4) {
        let cmphi_v = _mm256_loadu_pd(g.cmphi.as_ptr().add(m0));
        let smphi_v = _mm256_loadu_pd(g.smphi.as_ptr().add(m0));
        let mut p0 = _mm256_setzero_pd();
        let mut p1 = _mm256_setzero_pd();

        for n in m0..MAXP {
            let row = n * MAXP + m0;
            let a = _mm256_loadu_pd(t.pnma.as_ptr().add(row));
            let b = _mm256_loadu_pd(t.pnmb.as_ptr().add(row));
            let mut p = _mm256_fmadd_pd(_mm256_mul_pd(a, cos_v), p1, _mm256_mul_pd(b, p0));
            if n - m0 < 4 {
                let seed = _mm256_set1_pd(pmmseed[n]);
                p = match n - m0 {
                    0 => _mm256_blend_pd(p, seed, 0b0001),
                    1 => _mm256_blend_pd(p, seed, 0b0010),
                    2 => _mm256_blend_pd(p, seed, 0b0100),
                    _ => _mm256_blend_pd(p, seed, 0b1000),
                };
            }

            let y = _mm256_loadu_pd(t.ynma.as_ptr().add(row));
            let s = _mm256_mul_pd(_mm256_mul_pd(y, p), _mm256_set1_pd(g.rpow[n]));
            for (c, accv) in acc.iter_mut().enumerate().take(t.ny) {
                let re = _mm256_loadu_pd(t.tblrmodmn.as_ptr().add(t.moment_base(0, c, n) + m0));
                let im = _mm256_loadu_pd(t.tblrmodmn.as_ptr().add(t.moment_base(1, c, n) + m0));
                let ang = _mm256_fmadd_pd(im, smphi_v, _mm256_mul_pd(re, cmphi_v));
                *accv = _mm256_fmadd_pd(s, ang, *accv);
            }

            p0 = p1;
            p1 = p;
        }
    }

    for (c, a) in acc.iter().enumerate().take(t.ny) {
        let hi = _mm256_extractf128_pd(*a, 1);
        let lo = _mm256_castpd256_pd128(*a);
        let s2 = _mm_add_pd(lo, hi);
        let s1 = _mm_add_sd(s2, _mm_unpackhi_pd(s2, s2));
        out[c] = _mm_cvtsd_f64(s1);
    }
}

/// Evaluate all channels at `(dx, dy, dz)` into `out`, returning the radial
/// factor. Picks the vector path when the CPU supports it.
pub fn ffeval_vec(t: &FarFieldTables, dx: f64, dy: f64, dz: f64, out: &mut [f64]) -> f64 {
    debug_assert!(out.len() >= t.ny);

    #[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
    if lodestone_simd::SimdCapability::cached().is_simd() {
        let g = geometry(dx, dy, dz);
        let mut pmmseed = [0.0; MAXP];
        pmmseed[0] = 1.0;
        for m in 1..MAXP {
            pmmseed[m] = t.pmmcdiag[m] * g.sintheta * pmmseed[m - 1];
        }
        unsafe { eval_channels_fma(t, &g, &pmmseed, out) };
        return g.factor;
    }

    eval_channels_scalar(t, dx, dy, dz, out)
}

/// Single-channel evaluation: `(value, factor)` for channel 0.
pub fn ffeval(t: &FarFieldTables, dx: f64, dy: f64, dz: f64) -> (f64, f64) {
    let mut out = [0.0; MAXP];
    let factor = ffeval_vec(t, dx, dy, dz, &mut out);
    (out[0], factor)
}
