//! Tile combine strategies.
//!
//! A tile reduces or scans its per-lane values either with lane-group shuffles
//! ([`LaneGroupReduce`]) or purely through scratch memory ([`TileScratchReduce`]).
//! The choice is made once per device, from its capabilities.

use serde::{Deserialize, Serialize};

use crate::device::Capabilities;
use crate::dispatch::OperationKind;
use crate::element::Element;
use crate::kernels::shared;
use crate::runtime::TileShape;

/// How a tile combines the values held by its lanes.
pub trait TileCombine {
    /// Scratch slots a tile of `shape` needs for `op`.
    fn scratch_slots(&self, op: OperationKind, shape: TileShape) -> usize;

    /// Sum of all lane values.
    fn reduce<T: Element>(&self, shape: TileShape, values: &mut [T]) -> T;

    /// Replace every lane value with the inclusive prefix sum up to that lane.
    fn inclusive_scan<T: Element>(&self, shape: TileShape, values: &mut [T]);
}

/// Combine with lane-group shuffles, using scratch only between lane-groups.
#[derive(Debug, Clone, Copy, Default)]
pub struct LaneGroupReduce;

/// Combine through a binary tree in scratch memory, no shuffles.
#[derive(Debug, Clone, Copy, Default)]
pub struct TileScratchReduce;

impl TileCombine for LaneGroupReduce {
    fn scratch_slots(&self, op: OperationKind, shape: TileShape) -> usize {
        match op {
            OperationKind::Reduce => shape.lane_group_count(),
            // one more slot broadcasts the carry of the global pass
            OperationKind::Scan => shape.lane_group_count() + 1,
        }
    }

    fn reduce<T: Element>(&self, shape: TileShape, values: &mut [T]) -> T {
        let mut scratch = vec![T::zero(); self.scratch_slots(OperationKind::Reduce, shape)];
        shared::lane_group_sum(values, shape.lane_group_width(), &mut scratch)
    }

    fn inclusive_scan<T: Element>(&self, shape: TileShape, values: &mut [T]) {
        let mut scratch = vec![T::zero(); self.scratch_slots(OperationKind::Scan, shape)];
        shared::lane_group_inclusive_scan(values, shape.lane_group_width(), &mut scratch);
    }
}

impl TileCombine for TileScratchReduce {
    fn scratch_slots(&self, _op: OperationKind, shape: TileShape) -> usize {
        // the tree leaves the tile total in slot 0, which also carries the offset
        shape.tile_size()
    }

    fn reduce<T: Element>(&self, shape: TileShape, values: &mut [T]) -> T {
        let mut scratch = vec![T::zero(); self.scratch_slots(OperationKind::Reduce, shape)];
        shared::tree_sum(values, &mut scratch)
    }

    fn inclusive_scan<T: Element>(&self, shape: TileShape, values: &mut [T]) {
        let mut scratch = vec![T::zero(); self.scratch_slots(OperationKind::Scan, shape)];
        shared::tree_inclusive_scan(values, &mut scratch);
    }
}

/// Combine strategy chosen for a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CombineStrategy {
    /// Lane-group shuffles, see [`LaneGroupReduce`].
    LaneGroup,
    /// Scratch-memory tree, see [`TileScratchReduce`].
    Scratch,
}

impl CombineStrategy {
    /// Pick the strategy a device supports.
    pub fn for_capabilities(caps: &Capabilities) -> Self {
        if caps.lane_shuffle {
            CombineStrategy::LaneGroup
        } else {
            CombineStrategy::Scratch
        }
    }

    /// Scratch bytes a tile of `shape` needs for `op` on elements of `elem_size` bytes.
    pub fn scratch_bytes(&self, op: OperationKind, shape: TileShape, elem_size: usize) -> usize {
        self.scratch_slots(op, shape) * elem_size
    }
}

impl TileCombine for CombineStrategy {
    fn scratch_slots(&self, op: OperationKind, shape: TileShape) -> usize {
        match self {
            CombineStrategy::LaneGroup => LaneGroupReduce.scratch_slots(op, shape),
            CombineStrategy::Scratch => TileScratchReduce.scratch_slots(op, shape),
        }
    }

    fn reduce<T: Element>(&self, shape: TileShape, values: &mut [T]) -> T {
        match self {
            CombineStrategy::LaneGroup => LaneGroupReduce.reduce(shape, values),
            CombineStrategy::Scratch => TileScratchReduce.reduce(shape, values),
        }
    }

    fn inclusive_scan<T: Element>(&self, shape: TileShape, values: &mut [T]) {
        match self {
            CombineStrategy::LaneGroup => LaneGroupReduce.inclusive_scan(shape, values),
            CombineStrategy::Scratch => TileScratchReduce.inclusive_scan(shape, values),
        }
    }
}
