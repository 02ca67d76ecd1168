//! Data-parallel reduction and prefix-sum engine for kornia.
//!
//! Sums and inclusive/exclusive prefix sums over large arrays are split into
//! tiles of lanes, tiles into a grid. Each device advertises its
//! [`Capabilities`] (lane-group width and shuffle, cooperative launch, 64-bit
//! atomics, scratch memory) and the [`Dispatcher`] picks a tile size and kernel
//! variant that fits them.
//!
//! # Features
//!
//! - **Host engine**: always available, tiles run on a rayon pool
//! - **Adaptive kernels**: lane-group shuffles when available, scratch-memory trees otherwise
//! - **Cooperative reduction**: a single grid-synchronized launch where supported
//!
//! # Feature Flags
//!
//! - `gpu`: CubeCL kernels for the same operations
//! - `cuda`: Enable CUDA backend (NVIDIA GPUs)
//! - `wgpu`: Enable WGPU backend (Vulkan/Metal/DirectX12)
//!
//! # Examples
//!
//! ```rust
//! use kornia_scan::{exclusive_scan, inclusive_scan, sum, Device, HostRuntime, RuntimeContext};
//!
//! let device = Device::new::<HostRuntime>(0)?;
//! let ctx = RuntimeContext::new(&device)?;
//!
//! let data = [4u32, 1, 5, 3, 4, 2, 7, 9, 1, 2, 3, 4];
//! assert_eq!(sum(&ctx, &data)?, 45);
//! assert_eq!(inclusive_scan(&ctx, &data)?[11], 45);
//! assert_eq!(exclusive_scan(&ctx, &data)?[11], 41);
//! # Ok::<(), kornia_scan::ScanError>(())
//! ```

#![deny(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod device;
pub mod dispatch;
pub mod element;
pub mod error;
pub mod kernels;
pub mod memory;
pub mod ops;
pub mod reference;
pub mod runtime;

#[cfg(feature = "gpu")]
pub mod gpu;


// Re-exports
pub use config::{EngineConfig, ExecutionStrategy};
pub use device::{Capabilities, Device, HostRuntime, Runtime, StridePolicy};
pub use dispatch::{Dispatcher, KernelSelection, KernelVariant, Operation, OperationKind};
pub use element::{ElemType, Element, FloatElement};
pub use error::{Result, ScanError};
pub use kernels::{CombineStrategy, Reducer, ScanMode};
pub use memory::*;
pub use ops::*;
pub use runtime::{LaunchGrid, RuntimeContext, Tile, TileShape};
