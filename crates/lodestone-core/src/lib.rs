//! Shared support types for the Lodestone kernel layer.
//!
//! This crate provides the small pieces every kernel crate leans on:
//! - error types for the checked (dimension-validating) entry points
//! - `(base, stride, offset)` row/sub-matrix view helpers
//! - a spin lock and a reusable scratch-vector pool for block drivers

pub mod error;
pub mod pool;
pub mod view;

pub use error::{Error, Result};
pub use pool::{SpinLock, SpinLockGuard, VecPool};
pub use view::{at, at_mut, row, row_mut};

/// Transposition selector for matrix operands.
///
/// `op(A)` is `A` itself for [`Op::None`] and `Aᵀ` for [`Op::Trans`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    /// Use the operand as stored.
    None,
    /// Use the transpose of the operand.
    Trans,
}

impl Op {
    /// The opposite orientation.
    ///
    /// Useful when rows of `op(A)` are addressed as columns of `op(A)ᵀ`.
    #[inline]
    pub fn flipped(self) -> Self {
        match self {
            Op::None => Op::Trans,
            Op::Trans => Op::None,
        }
    }

    /// Dimensions `(rows, cols)` of `op(A)` given the stored `(rows, cols)`.
    #[inline]
    pub fn dims(self, rows: usize, cols: usize) -> (usize, usize) {
        match self {
            Op::None => (rows, cols),
            Op::Trans => (cols, rows),
        }
    }
}
