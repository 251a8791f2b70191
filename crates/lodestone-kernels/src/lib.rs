//! Higher-order numerical kernels built on the dispatched primitives.
//!
//! - [`gemm`] — blocked general matrix multiply with packed micro-panels,
//!   serial and rayon-parallel drivers
//! - [`supernodal`] — sparse Cholesky rank-k supernode updates and forward
//!   substitution propagation
//! - [`farfield`] — biharmonic far-field expansion evaluation
//!
//! Everything takes flat `f64` slices with explicit offsets and strides;
//! shape validation lives in the `*_checked` wrappers, the raw entry points
//! only debug-assert.

pub mod farfield;
pub mod gemm;
pub mod supernodal;

pub use farfield::{ffeval, ffeval_vec, standard_coefficients, FarFieldTables, MAXP};
pub use gemm::{rgemm, rgemm_checked, rgemm_parallel, BLOCK};
pub use lodestone_core::Op;
pub use supernodal::{
    propagate_fwd, update_kernel_4444, update_kernel_abc4, update_supernode,
    update_supernode_generic,
};
