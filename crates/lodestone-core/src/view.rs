//! Flat-buffer matrix view helpers.
//!
//! A matrix is a flat `[f64]` plus an explicit row stride; a sub-matrix view
//! is described by base offsets `(ia, ja)`. Element `(i, j)` of the view
//! lives at `buf[(ia + i) * stride + ja + j]`. Logical bounds are checked
//! with `debug_assert!` only, so release builds pay a single slice-range
//! check per row and nothing per element.

/// Borrow row `i` of a view, columns `j..j + n`.
#[inline]
pub fn row(buf: &[f64], stride: usize, i: usize, j: usize, n: usize) -> &[f64] {
    let start = i * stride + j;
    debug_assert!(n == 0 || j + n <= stride, "row slice crosses a row boundary");
    &buf[start..start + n]
}

/// Mutably borrow row `i` of a view, columns `j..j + n`.
#[inline]
pub fn row_mut(buf: &mut [f64], stride: usize, i: usize, j: usize, n: usize) -> &mut [f64] {
    let start = i * stride + j;
    debug_assert!(n == 0 || j + n <= stride, "row slice crosses a row boundary");
    &mut buf[start..start + n]
}

/// Read element `(i, j)` of a view.
#[inline]
pub fn at(buf: &[f64], stride: usize, i: usize, j: usize) -> f64 {
    debug_assert!(j < stride || stride == 0);
    buf[i * stride + j]
}

/// Mutably borrow element `(i, j)` of a view.
#[inline]
pub fn at_mut(buf: &mut [f64], stride: usize, i: usize, j: usize) -> &mut f64 {
    debug_assert!(j < stride || stride == 0);
    &mut buf[i * stride + j]
}
