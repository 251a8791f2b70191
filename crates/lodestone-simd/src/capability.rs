//! SIMD capability detection.
//!
//! Runtime detection of the best available SIMD instruction set, detected
//! once and cached so dispatch wrappers never repeat the CPUID query.

use std::sync::OnceLock;

/// Detected SIMD capability level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SimdCapability {
    /// AVX-512 with 512-bit vectors. Kernels currently run the 256-bit
    /// paths at this level; the variant exists so the dispatch contract
    /// does not change when 512-bit kernels land.
    #[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
    Avx512,
    /// AVX2 with FMA, 256-bit vectors (4 f64 per register).
    #[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
    Avx2,
    /// Scalar fallback (no SIMD).
    Scalar,
}

static CACHED: OnceLock<SimdCapability> = OnceLock::new();

impl SimdCapability {
    /// Detect the best available SIMD capability at runtime.
    #[inline]
    pub fn detect() -> Self {
        #[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
        {
            if is_x86_feature_detected!("avx512f")
                && is_x86_feature_detected!("avx2")
                && is_x86_feature_detected!("fma")
            {
                return SimdCapability::Avx512;
            }
            if is_x86_feature_detected!("avx2") && is_x86_feature_detected!("fma") {
                return SimdCapability::Avx2;
            }
        }
        SimdCapability::Scalar
    }

    /// Process-wide cached capability, detected on first use.
    #[inline]
    pub fn cached() -> Self {
        *CACHED.get_or_init(Self::detect)
    }

    /// Check if this capability uses SIMD acceleration.
    #[inline]
    pub fn is_simd(&self) -> bool {
        !matches!(self, SimdCapability::Scalar)
    }

    /// Get a human-readable description of the capability.
    pub fn description(&self) -> &'static str {
        match self {
            #[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
            SimdCapability::Avx512 => "AVX-512 (running 256-bit kernels)",
            #[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
            SimdCapability::Avx2 => "AVX2+FMA (4 f64/register)",
            SimdCapability::Scalar => "Scalar (no SIMD)",
        }
    }
}

impl Default for SimdCapability {
    fn default() -> Self {
        Self::detect()
    }
}

impl std::fmt::Display for SimdCapability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.description())
    }
}
