//! Tile kernels of the host substrate.
//!
//! Kernels are plain functions of one [`Tile`](crate::runtime::Tile); the
//! runtime launches them once per tile of a grid.

pub mod plane;
pub mod reduction;
pub mod scan;
pub mod shared;
pub mod strategy;

pub use reduction::Reducer;
pub use scan::ScanMode;
pub use strategy::{CombineStrategy, LaneGroupReduce, TileCombine, TileScratchReduce};
