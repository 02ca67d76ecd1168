//! Two-pass prefix sum kernels.
//!
//! The local pass scans every tile on its own. The global pass then adds to each
//! tile the carry of all earlier tiles, which every tile recomputes from the
//! boundary values the local pass left behind. The global pass must only start
//! once the local pass has completed and its writes are visible
//! ([`RuntimeContext::sync`](crate::RuntimeContext::sync)).

use serde::{Deserialize, Serialize};

use crate::element::Element;
use crate::kernels::strategy::{CombineStrategy, TileCombine};
use crate::memory::DeviceBuffer;
use crate::runtime::Tile;

/// Kind of prefix sum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ScanMode {
    /// `output[i] = input[0] + .. + input[i]`
    Inclusive,
    /// `output[i] = input[0] + .. + input[i - 1]`, `output[0] = 0`
    Exclusive,
}

/// Local pass over one tile: one item per lane.
///
/// In exclusive mode a tile after the first leaves its slot 0 alone; the last
/// lane of every tile writes the tile total into slot 0 of the next tile
/// instead. That write crosses tiles, so nothing may read `output` before the
/// launch completes.
pub fn scan_local_tile<T: Element>(
    tile: &Tile<'_>,
    combine: CombineStrategy,
    mode: ScanMode,
    input: &[T],
    output: &DeviceBuffer<T>,
) {
    let count = input.len();
    let lanes = tile.size();
    let base = tile.global_lane(0);

    let mut values: Vec<T> = (0..lanes)
        .map(|lane| input.get(base + lane).copied().unwrap_or_else(T::zero))
        .collect();
    let last_input = values[lanes - 1];
    combine.inclusive_scan(tile.shape(), &mut values);

    match mode {
        ScanMode::Inclusive => {
            for (lane, &value) in values.iter().enumerate() {
                if base + lane < count {
                    output.store(base + lane, value);
                }
            }
        }
        ScanMode::Exclusive => {
            let exclusive = |lane: usize| {
                if lane == 0 {
                    T::zero()
                } else {
                    values[lane - 1]
                }
            };

            let first = if tile.index() == 0 { 0 } else { 1 };
            for lane in first..lanes {
                if base + lane < count {
                    output.store(base + lane, exclusive(lane));
                }
            }

            let next = base + lanes;
            if next < count {
                output.store(next, exclusive(lanes - 1).accumulate(last_input));
            }
        }
    }
}

/// Global pass over one tile of the local pass result.
pub fn scan_global_tile<T: Element>(
    tile: &Tile<'_>,
    combine: CombineStrategy,
    mode: ScanMode,
    local: &DeviceBuffer<T>,
    output: &DeviceBuffer<T>,
) {
    let count = local.len();
    let lanes = tile.size();
    let base = tile.global_lane(0);
    let index = tile.index();

    // Slots holding the carries of earlier tiles: the last slot of every earlier
    // tile, or (exclusive) the seeded first slot of every tile after tile 0.
    let boundary = |k: usize| match mode {
        ScanMode::Inclusive => k * lanes + lanes - 1,
        ScanMode::Exclusive => (k + 1) * lanes,
    };

    let offset = if index == 0 {
        None
    } else {
        let mut partials = vec![T::zero(); lanes];
        for (lane, partial) in partials.iter_mut().enumerate() {
            let mut k = lane;
            while k < index {
                *partial = partial.accumulate(local.load(boundary(k)));
                k += lanes;
            }
        }
        Some(combine.reduce(tile.shape(), &mut partials))
    };

    let finish = |position: usize| {
        let value = local.load(position);
        output.store(
            position,
            match offset {
                Some(offset) => value.accumulate(offset),
                None => value,
            },
        );
    };

    match mode {
        ScanMode::Inclusive => (base..(base + lanes).min(count)).for_each(finish),
        ScanMode::Exclusive => {
            if index == 0 && count > 0 {
                output.store(0, local.load(0));
            }
            ((base + 1)..(base + lanes + 1).min(count)).for_each(finish);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::{Capabilities, Device};
    use crate::runtime::{LaunchGrid, RuntimeContext};

    const INPUT: [u32; 12] = [4, 1, 5, 3, 4, 2, 7, 9, 1, 2, 3, 4];

    fn local_pass(mode: ScanMode, combine: CombineStrategy) -> (RuntimeContext, DeviceBuffer<u32>) {
        let device = Device::with_capabilities("host", Capabilities::host()).unwrap();
        let ctx = RuntimeContext::new(&device).unwrap();
        let local = DeviceBuffer::zeros(INPUT.len());
        ctx.launch(LaunchGrid::new(3, 4), |tile| {
            scan_local_tile(tile, combine, mode, &INPUT, &local)
        })
        .unwrap();
        (ctx, local)
    }

    #[test]
    fn test_local_pass_inclusive() {
        let (_, local) = local_pass(ScanMode::Inclusive, CombineStrategy::LaneGroup);
        assert_eq!(local.to_vec(), vec![4, 5, 10, 13, 4, 6, 13, 22, 1, 3, 6, 10]);
    }

    #[test]
    fn test_local_pass_exclusive_seeds_next_tile() {
        let (_, local) = local_pass(ScanMode::Exclusive, CombineStrategy::Scratch);
        assert_eq!(local.to_vec(), vec![0, 4, 5, 10, 13, 4, 6, 13, 22, 1, 3, 6]);
    }

    #[test]
    fn test_global_pass() {
        for (mode, expected) in [
            (
                ScanMode::Inclusive,
                vec![4, 5, 10, 13, 17, 19, 26, 35, 36, 38, 41, 45],
            ),
            (
                ScanMode::Exclusive,
                vec![0, 4, 5, 10, 13, 17, 19, 26, 35, 36, 38, 41],
            ),
        ] {
            for combine in [CombineStrategy::LaneGroup, CombineStrategy::Scratch] {
                let (ctx, local) = local_pass(mode, combine);
                ctx.sync();
                let output = DeviceBuffer::zeros(INPUT.len());
                ctx.launch(LaunchGrid::new(3, 4), |tile| {
                    scan_global_tile(tile, combine, mode, &local, &output)
                })
                .unwrap();
                assert_eq!(output.to_vec(), expected, "{mode:?} {combine:?}");
            }
        }
    }
}
