//! Executable reduction and scan operations on a CubeCL device.

use cubecl::prelude::*;

use crate::device::StridePolicy;
use crate::dispatch::{KernelVariant, Operation, OperationKind};
use crate::element::Element;
use crate::error::{Result, ScanError};
use crate::gpu::kernels::{reduce_add_kernel, scan_global_kernel, scan_local_kernel};
use crate::gpu::runtime::{missing_atomic, GpuBuffer, GpuContext};
use crate::kernels::reduction::Reducer;
use crate::kernels::scan::ScanMode;
use crate::kernels::strategy::{CombineStrategy, TileCombine};
use crate::runtime::{LaunchGrid, TileShape};

/// Largest cube count every backend accepts along one grid dimension.
pub const MAX_CUBES_PER_DIM: u32 = 65_535;

/// Grid extent `(x, y)` covering `tile_count` cubes, folding x into y past
/// [`MAX_CUBES_PER_DIM`]. Cubes past `tile_count` are idle.
pub fn cube_grid(tile_count: u32) -> (u32, u32) {
    if tile_count <= MAX_CUBES_PER_DIM {
        (tile_count.max(1), 1)
    } else {
        (MAX_CUBES_PER_DIM, tile_count.div_ceil(MAX_CUBES_PER_DIM))
    }
}

fn cube_count(grid: &LaunchGrid) -> CubeCount {
    let (x, y) = cube_grid(grid.tile_count);
    CubeCount::Static(x, y, 1)
}

/// Shared slots the kernels allocate for one tile combine.
fn combine_slots<R: Runtime>(ctx: &GpuContext<R>, combine: CombineStrategy, tile_size: u32) -> u32 {
    let shape = TileShape::new(tile_size, ctx.capabilities().lane_group_width);
    combine.scratch_slots(OperationKind::Reduce, shape) as u32
}

/// Add the sum of `input` into `output[0]`, which must be zeroed by the caller.
///
/// # Example
///
/// ```ignore
/// let input = ctx.create(&[1.0f32, 2.0, 3.0]);
/// let output = ctx.create(&[0.0f32]);
/// reduce_add_execute::<_, f32>(&ctx, &input, &output)?;
/// ```
pub fn reduce_add_execute<R: Runtime, N: Element + Numeric + CubeElement>(
    ctx: &GpuContext<R>,
    input: &GpuBuffer<R>,
    output: &GpuBuffer<R>,
) -> Result<()> {
    let selection = ctx
        .dispatcher()
        .select(Operation::Reduce, N::ELEM_TYPE, input.len())?;
    let KernelVariant::Reduce { reducer, combine } = selection.variant else {
        return Err(ScanError::UnsupportedOperation(format!(
            "reduce_add selected {:?}",
            selection.variant
        )));
    };
    let stride = match reducer {
        Reducer::PerTile { stride } => stride,
        Reducer::Cooperative => {
            return Err(ScanError::UnsupportedOperation(format!(
                "{} has no cooperative launch",
                ctx.backend_name()
            )))
        }
    };
    if !ctx.supports_atomic_add::<N>() {
        return Err(missing_atomic::<N>(ctx.backend_name()));
    }
    if output.is_empty() {
        return Err(ScanError::InvalidBufferSize {
            expected: 1,
            actual: 0,
        });
    }
    if input.is_empty() {
        return Ok(());
    }

    let grid = LaunchGrid::covering(input.len(), selection.tile_size, ctx.config().max_tiles);
    let per_lane = input.len().div_ceil(grid.total_lanes()) as u32;
    let slots = combine_slots(ctx, combine, grid.tile_size);
    log::trace!("reduce_add: {grid:?}, {per_lane} items per lane, {slots} scratch slots");

    unsafe {
        reduce_add_kernel::launch_unchecked::<N, R>(
            ctx.client(),
            cube_count(&grid),
            CubeDim::new(grid.tile_size, 1, 1),
            ArrayArg::from_raw_parts::<N>(input.handle(), input.len(), 1),
            ArrayArg::from_raw_parts::<N>(output.handle(), 1, 1),
            ScalarArg::new(per_lane),
            slots,
            combine == CombineStrategy::LaneGroup,
            stride == StridePolicy::Latency,
        );
    }

    Ok(())
}

/// Sum of `data`, uploaded to and reduced on the device.
pub fn sum_execute<R: Runtime, N: Element + Numeric + CubeElement>(
    ctx: &GpuContext<R>,
    data: &[N],
) -> Result<N> {
    let input = ctx.create(data);
    let output = ctx.create(&[<N as num_traits::Zero>::zero()]);
    reduce_add_execute::<R, N>(ctx, &input, &output)?;
    ctx.read::<N>(&output)
        .first()
        .copied()
        .ok_or_else(|| ScanError::KernelLaunchFailed("empty reduction output".to_string()))
}

/// Two-pass prefix sum of `input` into `output`.
///
/// Exact for integer elements. Floating-point results carry the rounding of a
/// parallel association order; exclusive values are never formed by
/// subtracting an item from its inclusive prefix.
pub fn scan_execute<R: Runtime, N: Element + Numeric + CubeElement>(
    ctx: &GpuContext<R>,
    input: &GpuBuffer<R>,
    output: &GpuBuffer<R>,
    mode: ScanMode,
) -> Result<()> {
    if input.len() != output.len() {
        return Err(ScanError::InvalidBufferSize {
            expected: input.len(),
            actual: output.len(),
        });
    }
    let selection = ctx
        .dispatcher()
        .select(Operation::Scan(mode), N::ELEM_TYPE, input.len())?;
    let combine = selection.variant.combine();
    let use_planes = combine == CombineStrategy::LaneGroup;
    if input.is_empty() {
        return Ok(());
    }

    let count = input.len();
    // one lane per item, so the tile count is never capped
    let grid = LaunchGrid::covering(count, selection.tile_size, u32::MAX);
    let slots = combine_slots(ctx, combine, grid.tile_size);
    let inclusive = mode == ScanMode::Inclusive;
    let local = ctx.empty::<N>(count);
    log::trace!("scan {mode:?}: {grid:?}, {slots} scratch slots");

    unsafe {
        scan_local_kernel::launch_unchecked::<N, R>(
            ctx.client(),
            cube_count(&grid),
            CubeDim::new(grid.tile_size, 1, 1),
            ArrayArg::from_raw_parts::<N>(input.handle(), count, 1),
            ArrayArg::from_raw_parts::<N>(local.handle(), count, 1),
            slots,
            inclusive,
            use_planes,
        );
    }

    // the global pass reads slots written by other tiles of the local pass
    ctx.sync();

    unsafe {
        scan_global_kernel::launch_unchecked::<N, R>(
            ctx.client(),
            cube_count(&grid),
            CubeDim::new(grid.tile_size, 1, 1),
            ArrayArg::from_raw_parts::<N>(local.handle(), count, 1),
            ArrayArg::from_raw_parts::<N>(output.handle(), count, 1),
            slots,
            inclusive,
            use_planes,
        );
    }

    Ok(())
}

/// Inclusive or exclusive prefix sum of `data` computed on the device.
pub fn scan_to_vec<R: Runtime, N: Element + Numeric + CubeElement>(
    ctx: &GpuContext<R>,
    data: &[N],
    mode: ScanMode,
) -> Result<Vec<N>> {
    if data.is_empty() {
        return Ok(Vec::new());
    }
    let input = ctx.create(data);
    let output = ctx.empty::<N>(data.len());
    scan_execute::<R, N>(ctx, &input, &output, mode)?;
    Ok(ctx.read::<N>(&output))
}
