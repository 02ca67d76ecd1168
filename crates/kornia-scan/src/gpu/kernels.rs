//! Reduction and scan kernels written with CubeCL.
//!
//! A cube is a tile, a plane is a lane-group. Tile combines use plane
//! operations when the device has precise planes, and a shared-memory tree
//! otherwise. Every kernel allocates exactly `scratch_slots` shared elements,
//! plus one carry slot in the planes path of the global scan pass.
//!
//! Grids wider than one dimension allows are folded into y, so a cube may lie
//! past the last tile and every global access is bounds checked.

// CubeCL's #[cube] macro generates code without docs
#![allow(missing_docs)]

use cubecl::prelude::*;

/// Sum of one value per unit of the cube.
///
/// With planes only unit 0 is guaranteed to hold the result; the tree leaves it
/// in `scratch[0]` for every unit.
#[cube]
fn tile_sum<N: Numeric>(
    partial: N,
    #[comptime] scratch_slots: u32,
    #[comptime] use_planes: bool,
) -> N {
    let mut scratch = SharedMemory::<N>::new(scratch_slots);
    let mut result = N::from_int(0);

    if use_planes {
        let group_sum = plane_sum(partial);
        if UNIT_POS_PLANE == 0 {
            scratch[UNIT_POS / PLANE_DIM] = group_sum;
        }
        sync_units();

        let groups = (CUBE_DIM + PLANE_DIM - 1) / PLANE_DIM;
        if UNIT_POS < PLANE_DIM {
            let mut acc = N::from_int(0);
            let mut group = UNIT_POS_PLANE;
            while group < groups {
                acc += scratch[group];
                group += PLANE_DIM;
            }
            result = plane_sum(acc);
        }
    } else {
        scratch[UNIT_POS] = partial;
        sync_units();

        let mut stride = CUBE_DIM / 2;
        while stride > 0 {
            if UNIT_POS < stride {
                let other = scratch[UNIT_POS + stride];
                scratch[UNIT_POS] += other;
            }
            sync_units();
            stride /= 2;
        }
        result = scratch[0];
    }

    result
}

/// Per-tile sum reduction into `output[0]`.
///
/// Tile `t` owns items `[t * tile_size * per_lane, (t + 1) * tile_size * per_lane)`.
/// Consecutive units read consecutive items, or with `latency` each unit reads
/// a contiguous run of `per_lane` items.
#[cube(launch_unchecked)]
pub fn reduce_add_kernel<N: Numeric>(
    input: &Array<N>,
    output: &mut Array<Atomic<N>>,
    per_lane: u32,
    #[comptime] scratch_slots: u32,
    #[comptime] use_planes: bool,
    #[comptime] latency: bool,
) {
    let base = CUBE_POS * CUBE_DIM * per_lane;
    let mut partial = N::from_int(0);

    for k in 0..per_lane {
        let mut index = base + k * CUBE_DIM + UNIT_POS;
        if latency {
            index = base + UNIT_POS * per_lane + k;
        }
        if index < input.len() {
            partial += input[index];
        }
    }

    let total = tile_sum::<N>(partial, scratch_slots, use_planes);
    if UNIT_POS == 0 {
        Atomic::add(&output[0], total);
    }
}

/// Local scan pass.
///
/// Each unit computes both its inclusive and its exclusive prefix within the
/// tile, so the exclusive value is a sum of earlier items and never
/// `inclusive - own`.
#[cube(launch_unchecked)]
pub fn scan_local_kernel<N: Numeric>(
    input: &Array<N>,
    output: &mut Array<N>,
    #[comptime] scratch_slots: u32,
    #[comptime] inclusive: bool,
    #[comptime] use_planes: bool,
) {
    let count = input.len();
    let index = ABSOLUTE_POS;

    let mut own = N::from_int(0);
    if index < count {
        own = input[index];
    }

    let mut scratch = SharedMemory::<N>::new(scratch_slots);
    let mut scanned = own;
    let mut before = N::from_int(0);

    if use_planes {
        let plane = UNIT_POS / PLANE_DIM;
        let in_plane = plane_inclusive_sum(own);
        let before_in_plane = plane_exclusive_sum(own);
        if UNIT_POS_PLANE == PLANE_DIM - 1 || UNIT_POS == CUBE_DIM - 1 {
            scratch[plane] = in_plane;
        }
        sync_units();

        let mut carry = N::from_int(0);
        for group in 0..plane {
            carry += scratch[group];
        }
        scanned = carry + in_plane;
        before = carry + before_in_plane;
    } else {
        // in-place Hillis–Steele, one slot per unit
        scratch[UNIT_POS] = own;
        sync_units();

        let mut offset = 1;
        while offset < CUBE_DIM {
            let mut value = scratch[UNIT_POS];
            if UNIT_POS >= offset {
                value += scratch[UNIT_POS - offset];
            }
            sync_units();
            scratch[UNIT_POS] = value;
            sync_units();
            offset *= 2;
        }
        scanned = scratch[UNIT_POS];
        if UNIT_POS > 0 {
            before = scratch[UNIT_POS - 1];
        }
    }

    if inclusive {
        if index < count {
            output[index] = scanned;
        }
    } else {
        // slot 0 of every tile but the first is seeded by the previous tile
        if index < count && (CUBE_POS == 0 || UNIT_POS != 0) {
            output[index] = before;
        }
        if UNIT_POS == CUBE_DIM - 1 && index + 1 < count {
            output[index + 1] = scanned;
        }
    }
}

/// Global scan pass: adds the carries of all earlier tiles.
#[cube(launch_unchecked)]
pub fn scan_global_kernel<N: Numeric>(
    local: &Array<N>,
    output: &mut Array<N>,
    #[comptime] scratch_slots: u32,
    #[comptime] inclusive: bool,
    #[comptime] use_planes: bool,
) {
    let count = local.len();

    let mut partial = N::from_int(0);
    let mut k = UNIT_POS;
    while k < CUBE_POS {
        let mut boundary = (k + 1) * CUBE_DIM;
        if inclusive {
            boundary -= 1;
        }
        if boundary < count {
            partial += local[boundary];
        }
        k += CUBE_DIM;
    }

    let mut offset = tile_sum::<N>(partial, scratch_slots, use_planes);
    if use_planes {
        let mut carry = SharedMemory::<N>::new(1);
        if UNIT_POS == 0 {
            carry[0] = offset;
        }
        sync_units();
        offset = carry[0];
    }

    if inclusive {
        let index = ABSOLUTE_POS;
        if index < count {
            output[index] = local[index] + offset;
        }
    } else {
        if ABSOLUTE_POS == 0 {
            output[0] = local[0];
        }
        let index = ABSOLUTE_POS + 1;
        if index < count {
            output[index] = local[index] + offset;
        }
    }
}
