//! Supernodal sparse Cholesky update kernels.
//!
//! Rank-k symmetric downdates `S := S - U · diag(D) · Uᵀ` scattered from a
//! dense update block into the sparse-structured target supernode. Both
//! blocks live in one flat row-storage buffer: `U` at element offset
//! `offsu` with row stride `urowstride`, the target `S` at `offss` with row
//! stride `twidth`. Addressing is indirect: `superrowidx[urbase + k]` is
//! the global row of update row `k`, and `raw2smap` maps a global row to
//! its compact local index inside the target supernode — the leading
//! `uwidth` update rows land on target *columns*, every update row lands on
//! a target *row*, through the same map.
//!
//! The specialized kernels return `false` for shapes they do not support;
//! the caller falls back to [`update_supernode_generic`], which handles any
//! width and rank. `false` never means "ran and produced wrong data".

use lodestone_simd::dispatch;

/// Resolve which update row feeds each target column slot.
///
/// `srccol[t]` is the index (within the leading `uwidth` update rows) whose
/// global row maps to target column `t`, or -1 when column `t` receives no
/// update.
#[inline]
fn resolve_source_columns(
    srccol: &mut [i32],
    uwidth: usize,
    raw2smap: &[i32],
    superrowidx: &[usize],
    urbase: usize,
) {
    srccol.fill(-1);
    for k in 0..uwidth {
        let t = raw2smap[superrowidx[urbase + k]];
        debug_assert!(t >= 0 && (t as usize) < srccol.len());
        srccol[t as usize] = k as i32;
    }
}

/// Rank-1..4 update of a target block up to 4 columns wide.
///
/// Returns `false` (leaving the buffer untouched) unless
/// `1 <= twidth <= 4`, `1 <= uwidth <= 4` and `1 <= urank <= 4`.
#[allow(clippy::too_many_arguments)]
pub fn update_kernel_abc4(
    rowstorage: &mut [f64],
    offss: usize,
    twidth: usize,
    offsu: usize,
    uheight: usize,
    urank: usize,
    urowstride: usize,
    uwidth: usize,
    diagd: &[f64],
    offsd: usize,
    raw2smap: &[i32],
    superrowidx: &[usize],
    urbase: usize,
) -> bool {
    if !(1..=4).contains(&twidth) || !(1..=4).contains(&uwidth) || !(1..=4).contains(&urank) {
        return false;
    }

    let mut srccol = [-1i32; 4];
    resolve_source_columns(&mut srccol[..twidth], uwidth, raw2smap, superrowidx, urbase);

    // W[t][r] = d[r] * U[src(t)][r], premultiplied once; unused target
    // columns keep an all-zero row so the inner loop needs no branch.
    let mut w = [[0.0f64; 4]; 4];
    for t in 0..twidth {
        if srccol[t] >= 0 {
            let s = srccol[t] as usize;
            for r in 0..urank {
                w[t][r] = diagd[offsd + r] * rowstorage[offsu + s * urowstride + r];
            }
        }
    }

    #[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
    if twidth == 4 && lodestone_simd::SimdCapability::cached().is_simd() {
        unsafe {
            abc4_rows_fma(
                rowstorage,
                offss,
                offsu,
                uheight,
                urank,
                urowstride,
                &w,
                raw2smap,
                superrowidx,
                urbase,
            );
        }
        return true;
    }

    // Scalar path, unrolled per rank so low-rank updates do no dead work.
    match urank {
        1 => {
            for k in 0..uheight {
                let i = raw2smap[superrowidx[urbase + k]] as usize;
                let trow = offss + i * twidth;
                let u0 = rowstorage[offsu + k * urowstride];
                for t in 0..twidth {
                    rowstorage[trow + t] -= u0 * w[t][0];
                }
            }
        }
        2 => {
            for k in 0..uheight {
                let i = raw2smap[superrowidx[urbase + k]] as usize;
                let trow = offss + i * twidth;
                let urow = offsu + k * urowstride;
                let u0 = rowstorage[urow];
                let u1 = rowstorage[urow + 1];
                for t in 0..twidth {
                    rowstorage[trow + t] -= u0 * w[t][0] + u1 * w[t][1];
                }
            }
        }
        3 => {
            for k in 0..uheight {
                let i = raw2smap[superrowidx[urbase + k]] as usize;
                let trow = offss + i * twidth;
                let urow = offsu + k * urowstride;
                let u0 = rowstorage[urow];
                let u1 = rowstorage[urow + 1];
                let u2 = rowstorage[urow + 2];
                for t in 0..twidth {
                    rowstorage[trow + t] -= u0 * w[t][0] + u1 * w[t][1] + u2 * w[t][2];
                }
            }
        }
        _ => {
            for k in 0..uheight {
                let i = raw2smap[superrowidx[urbase + k]] as usize;
                let trow = offss + i * twidth;
                let urow = offsu + k * urowstride;
                let u0 = rowstorage[urow];
                let u1 = rowstorage[urow + 1];
                let u2 = rowstorage[urow + 2];
                let u3 = rowstorage[urow + 3];
                for t in 0..twidth {
                    rowstorage[trow + t] -=
                        u0 * w[t][0] + u1 * w[t][1] + u2 * w[t][2] + u3 * w[t][3];
                }
            }
        }
    }
    true
}

/// Vector inner loop for the 4-wide target case: the four target columns of
/// one row fit one register, so each rank contributes one FMA per row.
/// Unused target columns were masked to zero when `W` was built.
#[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
#[target_feature(enable = "avx2", enable = "fma")]
#[allow(clippy::too_many_arguments)]
unsafe fn abc4_rows_fma(
    rowstorage: &mut [f64],
    offss: usize,
    offsu: usize,
    uheight: usize,
    urank: usize,
    urowstride: usize,
    w: &[[f64; 4]; 4],
    raw2smap: &[i32],
    superrowidx: &[usize],
    urbase: usize,
) {
    #[cfg(target_arch = "x86")]
    use std::arch::x86::*;
    #[cfg(target_arch = "x86_64")]
    use std::arch::x86_64::*;

    // Transpose W into rank-major lane vectors: wv[r] lane t = W[t][r].
    let mut wv = [_mm256_setzero_pd(); 4];
    for (r, wr) in wv.iter_mut().enumerate().take(urank) {
        *wr = _mm256_set_pd(w[3][r], w[2][r], w[1][r], w[0][r]);
    }

    let p = rowstorage.as_mut_ptr();
    for k in 0..uheight {
        let i = raw2smap[superrowidx[urbase + k]] as usize;
        let trow = offss + i * 4;
        let urow = offsu + k * urowstride;
        let mut s = _mm256_loadu_pd(p.add(trow));
        for r in 0..urank {
            let u = _mm256_set1_pd(*p.add(urow + r));
            s = _mm256_fnmadd_pd(u, wv[r], s);
        }
        _mm256_storeu_pd(p.add(trow), s);
    }
}

/// Fully dense 4x4x4x4 specialization: target and update both exactly four
/// columns wide, rank 4, update row stride 4, and no column remapping (the
/// leading four update rows are target columns 0..3 in order). Row
/// addressing is the identity when `sheight == uheight`, otherwise the
/// usual scatter through `raw2smap`.
#[allow(clippy::too_many_arguments)]
pub fn update_kernel_4444(
    rowstorage: &mut [f64],
    offss: usize,
    sheight: usize,
    offsu: usize,
    uheight: usize,
    diagd: &[f64],
    offsd: usize,
    raw2smap: &[i32],
    superrowidx: &[usize],
    urbase: usize,
) -> bool {
    // W = -D * U_headᵀ, computed once.
    let mut w = [[0.0f64; 4]; 4];
    for t in 0..4 {
        for r in 0..4 {
            w[t][r] = -diagd[offsd + r] * rowstorage[offsu + t * 4 + r];
        }
    }

    #[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
    if lodestone_simd::SimdCapability::cached().is_simd() {
        unsafe {
            rows4444_fma(
                rowstorage,
                offss,
                sheight,
                offsu,
                uheight,
                &w,
                raw2smap,
                superrowidx,
                urbase,
            );
        }
        return true;
    }

    if sheight == uheight {
        for k in 0..uheight {
            let trow = offss + k * 4;
            let urow = offsu + k * 4;
            let u0 = rowstorage[urow];
            let u1 = rowstorage[urow + 1];
            let u2 = rowstorage[urow + 2];
            let u3 = rowstorage[urow + 3];
            for t in 0..4 {
                rowstorage[trow + t] += u0 * w[t][0] + u1 * w[t][1] + u2 * w[t][2] + u3 * w[t][3];
            }
        }
    } else {
        for k in 0..uheight {
            let i = raw2smap[superrowidx[urbase + k]] as usize;
            let trow = offss + i * 4;
            let urow = offsu + k * 4;
            let u0 = rowstorage[urow];
            let u1 = rowstorage[urow + 1];
            let u2 = rowstorage[urow + 2];
            let u3 = rowstorage[urow + 3];
            for t in 0..4 {
                rowstorage[trow + t] += u0 * w[t][0] + u1 * w[t][1] + u2 * w[t][2] + u3 * w[t][3];
            }
        }
    }
    true
}

#[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
#[target_feature(enable = "avx2", enable = "fma")]
#[allow(clippy::too_many_arguments)]
unsafe fn rows4444_fma(
    rowstorage: &mut [f64],
    offss: usize,
    sheight: usize,
    offsu: usize,
    uheight: usize,
    w: &[[f64; 4]; 4],
    raw2smap: &[i32],
    superrowidx: &[usize],
    urbase: usize,
) {
    #[cfg(target_arch = "x86")]
    use std::arch::x86::*;
    #[cfg(target_arch = "x86_64")]
    use std::arch::x86_64::*;

    let mut wv = [_mm256_setzero_pd(); 4];
    for (r, wr) in wv.iter_mut().enumerate() {
        *wr = _mm256_set_pd(w[3][r], w[2][r], w[1][r], w[0][r]);
    }

    let p = rowstorage.as_mut_ptr();
    let identity = sheight == uheight;
    for k in 0..uheight {
        let i = if identity {
            k
        } else {
            raw2smap[superrowidx[urbase + k]] as usize
        };
        let trow = offss + i * 4;
        let urow = offsu + k * 4;
        let mut s = _mm256_loadu_pd(p.add(trow));
        let u0 = _mm256_set1_pd(*p.add(urow));
        let u1 = _mm256_set1_pd(*p.add(urow + 1));
        let u2 = _mm256_set1_pd(*p.add(urow + 2));
        let u3 = _mm256_set1_pd(*p.add(urow + 3));
        s = _mm256_fmadd_pd(u0, wv[0], s);
        s = _mm256_fmadd_pd(u1, wv[1], s);
        s = _mm256_fmadd_pd(u2, wv[2], s);
        s = _mm256_fmadd_pd(u3, wv[3], s);
        _mm256_storeu_pd(p.add(trow), s);
    }
}

/// Reference update for any target width, update width and rank. Slower
/// than the specialized kernels but never declines.
#[allow(clippy::too_many_arguments)]
pub fn update_supernode_generic(
    rowstorage: &mut [f64],
    offss: usize,
    twidth: usize,
    offsu: usize,
    uheight: usize,
    urank: usize,
    urowstride: usize,
    uwidth: usize,
    diagd: &[f64],
    offsd: usize,
    raw2smap: &[i32],
    superrowidx: &[usize],
    urbase: usize,
) {
    let mut srccol = vec![-1i32; twidth];
    resolve_source_columns(&mut srccol, uwidth, raw2smap, superrowidx, urbase);

    for k in 0..uheight {
        let i = raw2smap[superrowidx[urbase + k]] as usize;
        let trow = offss + i * twidth;
        let urow = offsu + k * urowstride;
        for (t, &s) in srccol.iter().enumerate() {
            if s < 0 {
                continue;
            }
            let srow = offsu + s as usize * urowstride;
            let mut v = 0.0;
            for r in 0..urank {
                v += rowstorage[urow + r] * diagd[offsd + r] * rowstorage[srow + r];
            }
            rowstorage[trow + t] -= v;
        }
    }
}

/// Apply one supernodal downdate, picking the best supported kernel.
///
/// Tries the dense 4444 specialization, then the abc4 kernel, then the
/// generic reference; every path computes the same update, so the choice is
/// transparent to the caller.
#[allow(clippy::too_many_arguments)]
pub fn update_supernode(
    rowstorage: &mut [f64],
    offss: usize,
    twidth: usize,
    sheight: usize,
    offsu: usize,
    uheight: usize,
    urank: usize,
    urowstride: usize,
    uwidth: usize,
    diagd: &[f64],
    offsd: usize,
    raw2smap: &[i32],
    superrowidx: &[usize],
    urbase: usize,
) {
    if twidth == 4 && uwidth == 4 && urank == 4 && urowstride == 4 {
        // The 4444 kernel assumes the leading update rows hit target
        // columns 0..3 in order; verify before committing to it.
        let ordered = (0..4).all(|t| raw2smap[superrowidx[urbase + t]] == t as i32);
        if ordered
            && update_kernel_4444(
                rowstorage,
                offss,
                sheight,
                offsu,
                uheight,
                diagd,
                offsd,
                raw2smap,
                superrowidx,
                urbase,
            )
        {
            return;
        }
    }
    if update_kernel_abc4(
        rowstorage,
        offss,
        twidth,
        offsu,
        uheight,
        urank,
        urowstride,
        uwidth,
        diagd,
        offsd,
        raw2smap,
        superrowidx,
        urbase,
    ) {
        return;
    }
    update_supernode_generic(
        rowstorage,
        offss,
        twidth,
        offsu,
        uheight,
        urank,
        urowstride,
        uwidth,
        diagd,
        offsd,
        raw2smap,
        superrowidx,
        urbase,
    );
}

/// Forward-substitution propagation for one supernode.
///
/// For each off-diagonal row of the supernode, subtracts the dot product of
/// that row's factor coefficients against the partial solution `x` from the
/// corresponding entry of the interleaved right-hand-side buffer. `simdbuf`
/// holds `simdwidth` right-hand sides interleaved per row, so solving
/// several systems touches each cache line once.
#[allow(clippy::too_many_arguments)]
pub fn propagate_fwd(
    x: &[f64],
    cols0: usize,
    blocksize: usize,
    superrowidx: &[usize],
    rbase: usize,
    offdiagsize: usize,
    rowstorage: &[f64],
    offss: usize,
    sstride: usize,
    simdbuf: &mut [f64],
    simdwidth: usize,
) {
    for k in 0..offdiagsize {
        let i = superrowidx[rbase + k];
        let baseoffs = offss + (k + blocksize) * sstride;
        let dot = dispatch::rdotv(
            &rowstorage[baseoffs..baseoffs + blocksize],
            &x[cols0..cols0 + blocksize],
        );
        simdbuf[i * simdwidth] -= dot;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pseudo(i: usize, seed: f64) -> f64 {
        ((i as f64 + seed) * 0.61).sin() * 1.5
    }

    /// Build a shared row-storage buffer holding U (stride `urowstride`,
    /// offset `offsu`) and S (stride `twidth`, offset `offss`), plus the
    /// index arrays, then return everything a kernel call needs.
    struct Fixture {
        rowstorage: Vec<f64>,
        offss: usize,
        offsu: usize,
        diagd: Vec<f64>,
        raw2smap: Vec<i32>,
        superrowidx: Vec<usize>,
    }

    fn fixture(
        twidth: usize,
        sheight: usize,
        uheight: usize,
        uwidth: usize,
        urank: usize,
        urowstride: usize,
        seed: f64,
    ) -> Fixture {
        assert!(uwidth <= twidth && uheight <= sheight);
        // Global rows 10..10+sheight map to local rows 0..sheight; the
        // update block touches a scattered subset of them.
        let nglobal = 10 + sheight;
        let mut raw2smap = vec![-1i32; nglobal];
        for i in 0..sheight {
            raw2smap[10 + i] = i as i32;
        }
        // The leading uwidth rows land on target columns (local index below
        // twidth, reversed so the map is not the identity); the rest fall
        // on rows past the column range, all distinct.
        let superrowidx: Vec<usize> = (0..uheight)
            .map(|k| {
                if k < uwidth {
                    10 + (uwidth - 1 - k)
                } else {
                    10 + k
                }
            })
            .collect();

        let offsu = 3;
        let offss = offsu + uheight * urowstride + 2;
        let mut rowstorage = vec![0.0; offss + sheight * twidth];
        for k in 0..uheight {
            for r in 0..urank {
                rowstorage[offsu + k * urowstride + r] = pseudo(k * 7 + r, seed);
            }
        }
        for i in 0..sheight * twidth {
            rowstorage[offss + i] = pseudo(i, seed + 5.0);
        }
        let diagd: Vec<f64> = (0..urank).map(|r| pseudo(r, seed + 9.0) + 2.0).collect();

        Fixture {
            rowstorage,
            offss,
            offsu,
            diagd,
            raw2smap,
            superrowidx,
        }
    }

    /// Manually scattered dense reference: S := S - U * diag(D) * U_headᵀ
    /// with rows and columns remapped through the index arrays.
    #[allow(clippy::too_many_arguments)]
    fn reference_update(
        f: &Fixture,
        twidth: usize,
        uheight: usize,
        urank: usize,
        urowstride: usize,
        uwidth: usize,
    ) -> Vec<f64> {
        let mut s = f.rowstorage.clone();
        for k in 0..uheight {
            let i = f.raw2smap[f.superrowidx[k]] as usize;
            for src in 0..uwidth {
                let t = f.raw2smap[f.superrowidx[src]];
                if t < 0 || t as usize >= twidth {
                    continue;
                }
                let mut v = 0.0;
                for r in 0..urank {
                    v += s[f.offsu + k * urowstride + r]
                        * f.diagd[r]
                        * f.rowstorage[f.offsu + src * urowstride + r];
                }
                s[f.offss + i * twidth + t as usize] -= v;
            }
        }
        s
    }

    fn assert_close(got: &[f64], want: &[f64], ctx: &str) {
        assert_eq!(got.len(), want.len());
        for (i, (g, w)) in got.iter().zip(want.iter()).enumerate() {
            assert!(
                (g - w).abs() <= w.abs().max(1.0) * 1e-13,
                "{ctx}: element {i}: {g} vs {w}"
            );
        }
    }

    #[test]
    fn abc4_matches_reference_all_ranks() {
        for urank in 1..=4 {
            for twidth in 1..=4usize {
                let uwidth = twidth; // every target column receives an update
                let uheight = 7.min(twidth * 2 + 1);
                let sheight = twidth * 2 + 1;
                let urowstride = 4;
                let f0 = fixture(twidth, sheight, uheight, uwidth, urank, urowstride, 1.0);

                let mut f = f0.rowstorage.clone();
                let handled = update_kernel_abc4(
                    &mut f,
                    f0.offss,
                    twidth,
                    f0.offsu,
                    uheight,
                    urank,
                    urowstride,
                    uwidth,
                    &f0.diagd,
                    0,
                    &f0.raw2smap,
                    &f0.superrowidx,
                    0,
                );
                assert!(handled, "urank={urank} twidth={twidth}");

                let want = reference_update(&f0, twidth, uheight, urank, urowstride, uwidth);
                assert_close(&f, &want, &format!("abc4 urank={urank} twidth={twidth}"));
            }
        }
    }

    #[test]
    fn abc4_declines_unsupported_shapes() {
        let f0 = fixture(4, 9, 5, 4, 4, 8, 2.0);
        let mut f = f0.rowstorage.clone();
        // Rank 5 is out of range.
        let handled = update_kernel_abc4(
            &mut f, f0.offss, 4, f0.offsu, 5, 5, 8, 4, &[1.0; 5], 0, &f0.raw2smap,
            &f0.superrowidx, 0,
        );
        assert!(!handled);
        assert_eq!(f, f0.rowstorage, "declined call must not write");

        let handled = update_kernel_abc4(
            &mut f, f0.offss, 5, f0.offsu, 5, 4, 8, 4, &f0.diagd, 0, &f0.raw2smap,
            &f0.superrowidx, 0,
        );
        assert!(!handled, "twidth 5 unsupported");
    }

    #[test]
    fn kernel_4444_identity_rows() {
        // Identity row map: sheight == uheight, leading rows ordered.
        let twidth = 4;
        let sheight = 6;
        let uheight = 6;
        let nglobal = 10 + sheight;
        let mut raw2smap = vec![-1i32; nglobal];
        for i in 0..sheight {
            raw2smap[10 + i] = i as i32;
        }
        let superrowidx: Vec<usize> = (0..uheight).map(|k| 10 + k).collect();

        let offsu = 0;
        let offss = uheight * 4;
        let mut rowstorage = vec![0.0; offss + sheight * twidth];
        for i in 0..offss {
            rowstorage[i] = pseudo(i, 3.0);
        }
        for i in 0..sheight * twidth {
            rowstorage[offss + i] = pseudo(i, 8.0);
        }
        let diagd: Vec<f64> = (0..4).map(|r| pseudo(r, 11.0) + 2.0).collect();

        let f0 = Fixture {
            rowstorage: rowstorage.clone(),
            offss,
            offsu,
            diagd: diagd.clone(),
            raw2smap: raw2smap.clone(),
            superrowidx: superrowidx.clone(),
        };

        let handled = update_kernel_4444(
            &mut rowstorage,
            offss,
            sheight,
            offsu,
            uheight,
            &diagd,
            0,
            &raw2smap,
            &superrowidx,
            0,
        );
        assert!(handled);
        let want = reference_update(&f0, twidth, uheight, 4, 4, 4);
        assert_close(&rowstorage, &want, "4444 identity");
    }

    /// sheight > uheight forces the scatter arm: every row goes through
    /// `raw2smap ∘ superrowidx`, and the gaps in the row set (locals 4 and
    /// 6 receive no update) must come out untouched.
    #[test]
    fn kernel_4444_scattered_rows() {
        let twidth = 4;
        let sheight = 8;
        let uheight = 6;
        let nglobal = 10 + sheight;
        let mut raw2smap = vec![-1i32; nglobal];
        for i in 0..sheight {
            raw2smap[10 + i] = i as i32;
        }
        // Head rows ordered onto columns 0..4, tail rows gapped.
        let superrowidx = vec![10, 11, 12, 13, 15, 17];

        let offsu = 2;
        let offss = offsu + uheight * 4 + 3;
        let mut rowstorage = vec![0.0; offss + sheight * twidth];
        for i in 0..uheight * 4 {
            rowstorage[offsu + i] = pseudo(i, 14.0);
        }
        for i in 0..sheight * twidth {
            rowstorage[offss + i] = pseudo(i, 15.0);
        }
        let diagd: Vec<f64> = (0..4).map(|r| pseudo(r, 16.0) + 2.0).collect();

        let f0 = Fixture {
            rowstorage: rowstorage.clone(),
            offss,
            offsu,
            diagd: diagd.clone(),
            raw2smap: raw2smap.clone(),
            superrowidx: superrowidx.clone(),
        };

        let handled = update_kernel_4444(
            &mut rowstorage,
            offss,
            sheight,
            offsu,
            uheight,
            &diagd,
            0,
            &raw2smap,
            &superrowidx,
            0,
        );
        assert!(handled);
        let want = reference_update(&f0, twidth, uheight, 4, 4, 4);
        assert_close(&rowstorage, &want, "4444 scatter");
        for skipped in [4usize, 6] {
            for t in 0..twidth {
                assert_eq!(
                    rowstorage[offss + skipped * twidth + t],
                    f0.rowstorage[offss + skipped * twidth + t],
                    "row {skipped} received no update"
                );
            }
        }
    }

    /// A dense 4x4x4x4 shape with an ordered head row map routes the driver
    /// through the specialized kernel; the result agrees with the generic
    /// path within rounding.
    #[test]
    fn driver_selects_dense_kernel() {
        let sheight = 7;
        let uheight = 5;
        let nglobal = 10 + sheight;
        let mut raw2smap = vec![-1i32; nglobal];
        for i in 0..sheight {
            raw2smap[10 + i] = i as i32;
        }
        let superrowidx = vec![10, 11, 12, 13, 16];

        let offsu = 1;
        let offss = offsu + uheight * 4 + 2;
        let mut base = vec![0.0; offss + sheight * 4];
        for i in 0..uheight * 4 {
            base[offsu + i] = pseudo(i, 24.0);
        }
        for i in 0..sheight * 4 {
            base[offss + i] = pseudo(i, 25.0);
        }
        let diagd: Vec<f64> = (0..4).map(|r| pseudo(r, 26.0) + 2.0).collect();

        let mut via_driver = base.clone();
        update_supernode(
            &mut via_driver,
            offss,
            4,
            sheight,
            offsu,
            uheight,
            4,
            4,
            4,
            &diagd,
            0,
            &raw2smap,
            &superrowidx,
            0,
        );

        let mut via_generic = base.clone();
        update_supernode_generic(
            &mut via_generic,
            offss,
            4,
            offsu,
            uheight,
            4,
            4,
            4,
            &diagd,
            0,
            &raw2smap,
            &superrowidx,
            0,
        );
        assert_close(&via_driver, &via_generic, "driver 4444 vs generic");
    }

    /// uwidth < twidth leaves a target column with no source row; the
    /// update must leave that column bit-for-bit unchanged.
    #[test]
    fn abc4_skips_unmapped_target_column() {
        let twidth = 4;
        let uwidth = 3;
        let f0 = fixture(twidth, 9, 5, uwidth, 2, 4, 18.0);

        let mut f = f0.rowstorage.clone();
        assert!(update_kernel_abc4(
            &mut f,
            f0.offss,
            twidth,
            f0.offsu,
            5,
            2,
            4,
            uwidth,
            &f0.diagd,
            0,
            &f0.raw2smap,
            &f0.superrowidx,
            0,
        ));

        let want = reference_update(&f0, twidth, 5, 2, 4, uwidth);
        assert_close(&f, &want, "abc4 partial columns");
        // Column 3 has no source row (head rows land on columns 2, 1, 0).
        for i in 0..9 {
            assert_eq!(
                f[f0.offss + i * twidth + 3],
                f0.rowstorage[f0.offss + i * twidth + 3],
                "unmapped column, row {i}"
            );
        }
    }

    #[test]
    fn generic_matches_specialized() {
        // A shape abc4 supports, computed by both paths.
        let twidth = 3;
        let f0 = fixture(twidth, 7, 5, 3, 2, 4, 6.0);

        let mut via_abc4 = f0.rowstorage.clone();
        assert!(update_kernel_abc4(
            &mut via_abc4,
            f0.offss,
            twidth,
            f0.offsu,
            5,
            2,
            4,
            3,
            &f0.diagd,
            0,
            &f0.raw2smap,
            &f0.superrowidx,
            0,
        ));

        let mut via_generic = f0.rowstorage.clone();
        update_supernode_generic(
            &mut via_generic,
            f0.offss,
            twidth,
            f0.offsu,
            5,
            2,
            4,
            3,
            &f0.diagd,
            0,
            &f0.raw2smap,
            &f0.superrowidx,
            0,
        );
        assert_close(&via_abc4, &via_generic, "abc4 vs generic");
    }

    #[test]
    fn driver_handles_wide_supernodes() {
        // twidth 6 exceeds every specialization; driver must still apply
        // the update through the generic path.
        let twidth = 6;
        let f0 = fixture(twidth, 9, 6, 6, 3, 8, 12.0);
        let mut f = f0.rowstorage.clone();
        update_supernode(
            &mut f,
            f0.offss,
            twidth,
            9,
            f0.offsu,
            6,
            3,
            8,
            6,
            &f0.diagd,
            0,
            &f0.raw2smap,
            &f0.superrowidx,
            0,
        );
        let want = reference_update(&f0, twidth, 6, 3, 8, 6);
        assert_close(&f, &want, "driver generic");
    }

    #[test]
    fn propagate_fwd_matches_direct_loop() {
        let blocksize = 3;
        let offdiagsize = 4;
        let sstride = 3;
        let offss = 2;
        let rowstorage: Vec<f64> = (0..offss + (blocksize + offdiagsize) * sstride)
            .map(|i| pseudo(i, 20.0))
            .collect();
        let x: Vec<f64> = (0..8).map(|i| pseudo(i, 21.0)).collect();
        let superrowidx = vec![0, 2, 3, 5];
        let simdwidth = 4;
        let mut simdbuf: Vec<f64> = (0..6 * simdwidth).map(|i| pseudo(i, 22.0)).collect();
        let expected = {
            let mut b = simdbuf.clone();
            for k in 0..offdiagsize {
                let i = superrowidx[k];
                let base = offss + (k + blocksize) * sstride;
                let mut v = b[i * simdwidth];
                for j in 0..blocksize {
                    v -= rowstorage[base + j] * x[2 + j];
                }
                b[i * simdwidth] = v;
            }
            b
        };

        propagate_fwd(
            &x,
            2,
            blocksize,
            &superrowidx,
            0,
            offdiagsize,
            &rowstorage,
            offss,
            sstride,
            &mut simdbuf,
            simdwidth,
        );
        assert_close(&simdbuf, &expected, "propagate_fwd");
    }
}
