//! Scalar and SIMD vector/matrix primitives with runtime dispatch.
//!
//! Three layers:
//! - [`scalar`] — portable reference implementations, the semantics of record
//! - [`avx2`] — AVX2+FMA variants with an explicit decline-or-run contract
//!   (`Option`), available on x86/x86_64 only
//! - [`dispatch`] — the public entry points: size threshold plus cached CPU
//!   capability select the vector path, declines fall back to scalar
//!
//! Call sites should use [`dispatch`]; the other layers stay public so tests,
//! benches and composing algorithms can pin a specific path.

#[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
pub mod avx2;
pub mod capability;
pub mod dispatch;
pub mod scalar;

pub use capability::SimdCapability;
pub use dispatch::{
    bcopyv, bsetv, icopyv, isetv, raddrv, raddv, raddvr, rcopycv, rcopymuladdv, rcopymulv,
    rcopynegmuladdv, rcopyrr, rcopyrv, rcopyv, rcopyvr, rdotr, rdotv, rdotv2, rgemv, rger,
    rmaxabsr, rmaxabsv, rmaxr, rmaxv, rmergedivv, rmergedivvr, rmergemaxv, rmergemaxvr,
    rmergeminv, rmergeminvr, rmergemulv, rmergemulvr, rmuladdv, rmulr, rmulv, rnegmuladdv,
    rsetm, rsetr, rsetv, rtrsv, SIMD_THRESHOLD_V,
};
pub use lodestone_core::Op;
