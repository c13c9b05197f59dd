//! CPU feature interface (spec §6). Out-of-scope by contract: the real
//! detection logic for a platform is an external collaborator. What lives
//! here is the boolean surface the dispatcher reads plus the
//! `HWY_NO_SIMD` override, cached once via [`once_cell::sync::OnceCell`].

use once_cell::sync::OnceCell;

/// Ordinal used for "is at least this good" dispatch gating (spec §6,
/// `CurrentLevel()`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum IsaLevel {
    Scalar = 0,
    Sse = 1,
    Avx = 2,
    AvxFma = 3,
    Avx512 = 4,
    Neon = 5,
    Sme = 6,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Features {
    pub has_avx2: bool,
    pub has_avx512: bool,
    pub has_avx512_fp16: bool,
    pub has_avx512_bf16: bool,
    pub has_f16c: bool,
    pub has_neon: bool,
    pub has_arm_fp16: bool,
    pub has_arm_bf16: bool,
    pub has_sme: bool,
    /// Set when `HWY_NO_SIMD` is a non-empty environment variable: every
    /// dispatch pointer is forced to its portable fallback.
    pub no_simd: bool,
}

impl Features {
    fn detect() -> Features {
        let no_simd = std::env::var_os("HWY_NO_SIMD")
            .map(|v| !v.is_empty())
            .unwrap_or(false);

        if no_simd {
            return Features {
                no_simd: true,
                ..Features::default()
            };
        }

        #[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
        {
            Features {
                has_avx2: is_x86_feature_detected("avx2"),
                has_avx512: is_x86_feature_detected("avx512f"),
                has_avx512_fp16: is_x86_feature_detected("avx512fp16"),
                has_avx512_bf16: is_x86_feature_detected("avx512bf16"),
                has_f16c: is_x86_feature_detected("f16c"),
                has_neon: false,
                has_arm_fp16: false,
                has_arm_bf16: false,
                has_sme: false,
                no_simd: false,
            }
        }

        #[cfg(target_arch = "aarch64")]
        {
            Features {
                has_avx2: false,
                has_avx512: false,
                has_avx512_fp16: false,
                has_avx512_bf16: false,
                has_f16c: false,
                has_neon: std::arch::is_aarch64_feature_detected!("neon"),
                has_arm_fp16: std::arch::is_aarch64_feature_detected!("fp16"),
                has_arm_bf16: std::arch::is_aarch64_feature_detected!("bf16"),
                // SME detection requires OS cooperation (sysctl / HWCAP2)
                // beyond what `std` exposes; the portable fallback always
                // stands in until a platform crate fills this pointer in.
                has_sme: false,
                no_simd: false,
            }
        }

        #[cfg(not(any(
            target_arch = "x86",
            target_arch = "x86_64",
            target_arch = "aarch64"
        )))]
        {
            Features {
                no_simd: false,
                ..Features::default()
            }
        }
    }

    pub fn current_level(&self) -> IsaLevel {
        if self.no_simd {
            return IsaLevel::Scalar;
        }
        if self.has_sme {
            IsaLevel::Sme
        } else if self.has_neon {
            IsaLevel::Neon
        } else if self.has_avx512 {
            IsaLevel::Avx512
        } else if self.has_avx2 {
            IsaLevel::AvxFma
        } else {
            IsaLevel::Scalar
        }
    }

    /// Whether this host exposes a hardware outer-product (matrix-engine
    /// FMOPA) instruction, per spec §4.1 rule 4.
    pub fn has_outer_product_engine(&self) -> bool {
        self.has_sme
    }
}

#[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
fn is_x86_feature_detected(name: &str) -> bool {
    match name {
        "avx2" => std::is_x86_feature_detected!("avx2"),
        "avx512f" => std::is_x86_feature_detected!("avx512f"),
        "avx512fp16" => cfg!(feature = "nightly") && std::is_x86_feature_detected!("avx512f"),
        "avx512bf16" => cfg!(feature = "nightly") && std::is_x86_feature_detected!("avx512f"),
        "f16c" => std::is_x86_feature_detected!("f16c"),
        _ => false,
    }
}

static FEATURES: OnceCell<Features> = OnceCell::new();

/// Cached, process-wide CPU feature probe. Safe to call from any thread;
/// detection runs at most once.
pub fn features() -> &'static Features {
    FEATURES.get_or_init(Features::detect)
}
