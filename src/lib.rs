//! A portable, multi-ISA dense matrix-multiplication engine: streaming,
//! cache-tiled blocked, GotoBLAS-style packed five-loop, and hardware
//! outer-product tiers, standard (`C = A·B`) and K-last (`C = A·Bᵀ`)
//! layouts, dispatched by shape and parallelized over a persistent
//! worker pool.
//!
//! The dispatcher (`matmul_auto`/`matmul_klast_auto`) is the entry point
//! most callers want; the individual tier functions
//! (`streaming`/`blocked`/`gebp`/`outer_product`) are exposed for callers
//! who want to pin a specific algorithm instead of letting shape
//! thresholds choose one.
//!
//! Every element type implements [`types::Element`]; `f16`/`bf16`
//! accumulate in `f32`. ISA-specific kernels (SIMD primitives, the
//! matrix-engine outer-product instruction, CPU feature probing) are
//! out of scope by contract — every extension point here has a portable
//! scalar fallback, and `HWY_NO_SIMD` forces it even where a platform
//! collaborator has filled one in.

pub mod blocked;
pub mod buffer_pool;
pub mod cache;
pub mod cpu_features;
pub mod dispatch;
pub mod error;
pub mod gebp;
pub mod klast;
pub mod microkernel;
pub mod outer_product;
pub mod pack;
pub mod parallel;
pub mod pool;
pub mod ptr;
pub mod scoped_guard;
pub mod simd;
pub mod streaming;
pub mod transpose;
pub mod types;
pub mod workitem;

pub use buffer_pool::{BufferPools, GlobalPools};
pub use cache::{kernel_params, CacheParams};
pub use cpu_features::{features, Features, IsaLevel};
pub use dispatch::{
    blocked_matmul_entry as blocked_matmul, matmul, matmul_auto, matmul_klast_auto, matmul_klast_blocked,
    packed_matmul_entry as packed_matmul, prefers_blocking_over_packing,
};
pub use error::{GemmError, Result};
pub use klast::matmul_klast_fmopa;
pub use outer_product::{matmul_fmopa, OuterProductEngine, ReferenceEngine};
pub use parallel::{
    batch_parallel_packed_matmul_v2, parallel_matmul, parallel_matmul_fine_grained, parallel_matmul_klast,
    parallel_packed_matmul, parallel_packed_matmul_v2,
};
pub use pool::WorkerPool;
pub use scoped_guard::StreamingModeGuard;
pub use streaming::{streaming_matmul, streaming_matmul_klast};
pub use types::{Element, Layout, Parallelism};

pub use outer_product::SME_WORTHWHILE_THRESHOLD;
pub use workitem::{generate_work_items, WorkItem};
