//! CubeCL substrate.
//!
//! The same reduction and scan kernels as the host engine, compiled for CUDA or
//! WGPU. This substrate never launches cooperatively.

pub mod kernels;
pub mod ops;
pub mod runtime;

pub use ops::*;
pub use runtime::*;
