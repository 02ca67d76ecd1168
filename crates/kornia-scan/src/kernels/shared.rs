//! Tile-level combines through scratch memory.
//!
//! Every function takes the tile's register file (`values`, one entry per lane)
//! and the tile's scratch buffer. A loop iteration over lanes is one phase; the
//! end of a phase is the tile barrier.

use crate::element::Element;
use crate::kernels::plane::{plane_inclusive_sum, plane_sum};

/// Sum a tile whose lane-groups can shuffle.
///
/// Lane-group leaders write their group sums to `scratch`, which needs one slot
/// per lane-group. The entries are then finished by a single lane-group, by one
/// lane-group summing pairs, or by another leaders-write round.
pub fn lane_group_sum<T: Element>(values: &mut [T], width: usize, scratch: &mut [T]) -> T {
    plane_sum(values, width);
    let mut entries = values.len() / width;
    for (group, slot) in scratch.iter_mut().take(entries).enumerate() {
        *slot = values[group * width];
    }

    loop {
        if entries == 1 {
            return scratch[0];
        }

        if entries <= 2 * width {
            let mut group: Vec<T> = (0..width)
                .map(|lane| {
                    if entries <= width {
                        load_or_zero(scratch, lane, entries)
                    } else {
                        load_or_zero(scratch, 2 * lane, entries)
                            .accumulate(load_or_zero(scratch, 2 * lane + 1, entries))
                    }
                })
                .collect();
            plane_sum(&mut group, width);
            return group[0];
        }

        let mut round = scratch[..entries].to_vec();
        plane_sum(&mut round, width);
        entries /= width;
        for (group, slot) in scratch.iter_mut().take(entries).enumerate() {
            *slot = round[group * width];
        }
    }
}

/// Inclusive scan of a tile whose lane-groups can shuffle.
///
/// Each lane-group scans itself, the group totals are scanned through
/// `scratch` (one slot per lane-group), and every lane adds the total of the
/// groups before its own.
pub fn lane_group_inclusive_scan<T: Element>(values: &mut [T], width: usize, scratch: &mut [T]) {
    plane_inclusive_sum(values, width);
    let groups = values.len() / width;
    if groups == 1 {
        return;
    }

    for (group, slot) in scratch.iter_mut().take(groups).enumerate() {
        *slot = values[group * width + width - 1];
    }

    let mut totals = vec![T::zero(); groups.max(width)];
    totals[..groups].copy_from_slice(&scratch[..groups]);
    lane_group_inclusive_scan(&mut totals, width, scratch);
    scratch[..groups].copy_from_slice(&totals[..groups]);

    for (lane, value) in values.iter_mut().enumerate().skip(width) {
        *value = scratch[lane / width - 1].accumulate(*value);
    }
}

/// Binary-tree sum over one scratch slot per lane, `log2(tile_size)` steps.
pub fn tree_sum<T: Element>(values: &[T], scratch: &mut [T]) -> T {
    let lanes = values.len();
    scratch[..lanes].copy_from_slice(values);

    let mut stride = lanes / 2;
    while stride > 0 {
        for lane in 0..stride {
            scratch[lane] = scratch[lane].accumulate(scratch[lane + stride]);
        }
        stride /= 2;
    }
    scratch[0]
}

/// Hillis–Steele inclusive scan in place over one scratch slot per lane.
///
/// Each step is a read phase into the lane registers and a write phase back to
/// scratch, with a barrier between them.
pub fn tree_inclusive_scan<T: Element>(values: &mut [T], scratch: &mut [T]) {
    let lanes = values.len();
    scratch[..lanes].copy_from_slice(values);

    let mut offset = 1;
    while offset < lanes {
        for (lane, value) in values.iter_mut().enumerate() {
            *value = if lane >= offset {
                scratch[lane - offset].accumulate(scratch[lane])
            } else {
                scratch[lane]
            };
        }
        scratch[..lanes].copy_from_slice(values);
        offset *= 2;
    }
}

#[inline]
fn load_or_zero<T: Element>(scratch: &[T], index: usize, entries: usize) -> T {
    if index < entries {
        scratch[index]
    } else {
        T::zero()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn iota(n: u32) -> Vec<u32> {
        (1..=n).collect()
    }

    fn prefix(values: &[u32]) -> Vec<u32> {
        values
            .iter()
            .scan(0u32, |acc, &v| {
                *acc += v;
                Some(*acc)
            })
            .collect()
    }

    #[test]
    fn test_lane_group_sum_all_paths() {
        // (tile, width): one group, single group of entries, pairs, extra round
        for (tile, width) in [(32, 32), (256, 32), (1024, 16), (1024, 4), (512, 2)] {
            let mut values = iota(tile);
            let mut scratch = vec![0u32; tile as usize / width];
            let total = lane_group_sum(&mut values, width, &mut scratch);
            assert_eq!(total, tile * (tile + 1) / 2, "tile {tile} width {width}");
        }
    }

    #[test]
    fn test_tree_sum() {
        let values = iota(64);
        let mut scratch = vec![0u32; 64];
        assert_eq!(tree_sum(&values, &mut scratch), 64 * 65 / 2);
    }

    #[test]
    fn test_lane_group_inclusive_scan() {
        for (tile, width) in [(32, 32), (128, 32), (1024, 8), (64, 2)] {
            let input = iota(tile);
            let mut values = input.clone();
            let mut scratch = vec![0u32; tile as usize / width + 1];
            lane_group_inclusive_scan(&mut values, width, &mut scratch);
            assert_eq!(values, prefix(&input), "tile {tile} width {width}");
        }
    }

    #[test]
    fn test_tree_inclusive_scan() {
        let input = vec![4u32, 1, 5, 3, 4, 2, 7, 9];
        let mut values = input.clone();
        let mut scratch = vec![0u32; input.len()];
        tree_inclusive_scan(&mut values, &mut scratch);
        assert_eq!(values, prefix(&input));
        assert_eq!(scratch, prefix(&input));
    }
}
