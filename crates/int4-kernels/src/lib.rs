//! Tiled int4 dequant-GEMM kernels and their scheduler.

pub mod dispatch;
pub mod kernels;
pub mod pack;
pub mod parallel;
pub mod scheduler;
pub mod tile;

pub use pack::{
    weight_to_int4pack, weight_to_int4pack_config, weight_to_int4pack_into, weight_to_int4pack_with,
};
pub use parallel::{ParallelExecutor, RayonExecutor, SerialExecutor};
pub use scheduler::{
    int4pack_mm, int4pack_mm_config, int4pack_mm_into, int4pack_mm_tiles, int4pack_mm_with,
    num_tiles, MatmulArgs,
};
