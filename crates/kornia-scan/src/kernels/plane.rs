//! Lane-group ("plane") exchange primitives.
//!
//! `values` is the register file of a tile, one entry per lane, split into
//! lane-groups of `width` consecutive lanes. Each step reads a snapshot of the
//! registers, which is what a shuffle sees: every lane exchanges the value its
//! partner held before the step.

use crate::element::Element;

/// Butterfly sum: afterwards every lane holds the sum of its lane-group.
///
/// Takes `log2(width)` exchange steps. `values.len()` must be a multiple of `width`.
pub fn plane_sum<T: Element>(values: &mut [T], width: usize) {
    debug_assert!(width.is_power_of_two() && values.len() % width == 0);
    let mut snapshot = values.to_vec();
    let mut offset = width / 2;
    while offset > 0 {
        snapshot.copy_from_slice(values);
        for (lane, value) in values.iter_mut().enumerate() {
            *value = snapshot[lane].accumulate(snapshot[lane ^ offset]);
        }
        offset /= 2;
    }
}

/// Shuffle-up inclusive scan inside each lane-group.
pub fn plane_inclusive_sum<T: Element>(values: &mut [T], width: usize) {
    debug_assert!(width.is_power_of_two() && values.len() % width == 0);
    let mut snapshot = values.to_vec();
    let mut offset = 1;
    while offset < width {
        snapshot.copy_from_slice(values);
        for (lane, value) in values.iter_mut().enumerate() {
            if lane % width >= offset {
                *value = snapshot[lane - offset].accumulate(snapshot[lane]);
            }
        }
        offset *= 2;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plane_sum_broadcasts_group_total() {
        let mut values: Vec<u32> = (1..=8).collect();
        plane_sum(&mut values, 4);
        assert_eq!(values, vec![10, 10, 10, 10, 26, 26, 26, 26]);
    }

    #[test]
    fn test_plane_sum_width_one_group() {
        let mut values = vec![0.5f32, 0.25, 0.125, 0.125];
        plane_sum(&mut values, 4);
        assert!(values.iter().all(|&v| v == 1.0));
    }

    #[test]
    fn test_plane_inclusive_sum() {
        let mut values = vec![4u32, 1, 5, 3, 4, 2, 7, 9];
        plane_inclusive_sum(&mut values, 4);
        assert_eq!(values, vec![4, 5, 10, 13, 4, 6, 13, 22]);

        let mut values = vec![1u64; 16];
        plane_inclusive_sum(&mut values, 16);
        assert_eq!(values, (1..=16).collect::<Vec<u64>>());
    }
}
