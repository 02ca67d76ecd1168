//! Sum reduction kernels.
//!
//! Each tile accumulates one partial per lane over its share of the input,
//! combines the partials with the device's [`CombineStrategy`], and lane 0 adds
//! the tile's sum into the caller's [`Accumulator`] with a single atomic add.

use serde::{Deserialize, Serialize};

use crate::device::StridePolicy;
use crate::element::Element;
use crate::kernels::strategy::{CombineStrategy, TileCombine};
use crate::memory::Accumulator;
use crate::runtime::Tile;

/// Grid shape of a reduction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Reducer {
    /// One launch of independent tiles; each tile owns a contiguous block of
    /// `tile_size * per_lane` items walked with `stride`.
    PerTile {
        /// How lanes walk the tile's block.
        stride: StridePolicy,
    },
    /// One cooperative launch; every lane strides over the whole input by the
    /// number of live lanes in the grid.
    Cooperative,
}

/// Reduce one tile of `input` into `acc`.
pub fn reduce_add_tile<T: Element>(
    tile: &Tile<'_>,
    reducer: Reducer,
    combine: CombineStrategy,
    input: &[T],
    acc: &Accumulator<T>,
) {
    let count = input.len();
    let lanes = tile.size();
    let grid_lanes = tile.grid().total_lanes();
    let mut partials = vec![T::zero(); lanes];

    match reducer {
        Reducer::PerTile { stride } => {
            let per_lane = count.div_ceil(grid_lanes);
            let base = tile.index() * lanes * per_lane;
            for (lane, partial) in partials.iter_mut().enumerate() {
                for k in 0..per_lane {
                    let index = match stride {
                        StridePolicy::Throughput => base + k * lanes + lane,
                        StridePolicy::Latency => base + lane * per_lane + k,
                    };
                    if index < count {
                        *partial = partial.accumulate(input[index]);
                    }
                }
            }
        }
        Reducer::Cooperative => {
            let blocks = count.div_ceil(grid_lanes);
            for (lane, partial) in partials.iter_mut().enumerate() {
                let global_lane = tile.global_lane(lane);
                for block in 0..blocks {
                    let index = block * grid_lanes + global_lane;
                    if index < count {
                        *partial = partial.accumulate(input[index]);
                    }
                }
            }
        }
    }

    let tile_sum = combine.reduce(tile.shape(), &mut partials);
    acc.fetch_add(tile_sum);
}
