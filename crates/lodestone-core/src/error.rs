//! Error types for checked kernel entry points.
//!
//! The kernel layer itself never reports errors; bounds and aliasing are
//! caller contracts. These types back the checked wrappers that composing
//! algorithms use to validate shapes before entering the unchecked layer.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("row stride {stride} is smaller than logical column count {cols}")]
    InvalidStride { stride: usize, cols: usize },

    #[error("buffer too small: need {needed} elements, have {len}")]
    BufferTooSmall { needed: usize, len: usize },
}

pub type Result<T> = std::result::Result<T, Error>;
