//! Executable reduction and scan operations.
//!
//! The `launch_*` functions are the kernel-level entries: they run exactly the
//! selection they are handed. The other functions let the context's
//! dispatcher pick the kernel first.

use num_traits::NumCast;

use crate::dispatch::{KernelSelection, KernelVariant, Operation};
use crate::element::{Element, FloatElement};
use crate::error::{Result, ScanError};
use crate::kernels::reduction::{reduce_add_tile, Reducer};
use crate::kernels::scan::{scan_global_tile, scan_local_tile, ScanMode};
use crate::kernels::strategy::CombineStrategy;
use crate::memory::{allocate, check_len, to_cpu, Accumulator, DeviceBuffer};
use crate::runtime::{LaunchGrid, RuntimeContext};

/// Add the sum of `input` into `acc`.
///
/// The accumulator must hold zero beforehand; the engine never clears it.
///
/// # Errors
///
/// Fails before launching anything if no kernel variant suits the device.
pub fn reduce_add<T: Element>(
    ctx: &RuntimeContext,
    input: &[T],
    acc: &Accumulator<T>,
) -> Result<()> {
    let selection = ctx
        .dispatcher()
        .select(Operation::Reduce, T::ELEM_TYPE, input.len())?;
    launch_reduce_add(ctx, &selection, input, acc)
}

/// Run a reduction with an explicit kernel selection.
///
/// Any power-of-two tile size of at least 2 lanes is accepted.
pub fn launch_reduce_add<T: Element>(
    ctx: &RuntimeContext,
    selection: &KernelSelection,
    input: &[T],
    acc: &Accumulator<T>,
) -> Result<()> {
    let KernelVariant::Reduce { reducer, combine } = selection.variant else {
        return Err(ScanError::UnsupportedOperation(format!(
            "reduce_add launched with {:?}",
            selection.variant
        )));
    };
    check_tile_size(selection.tile_size)?;
    if T::ELEM_TYPE.is_64bit() && !ctx.capabilities().atomic_add_64 {
        return Err(ScanError::UnsupportedOperation(format!(
            "{} reduction needs 64-bit atomic add",
            T::ELEM_TYPE
        )));
    }

    let count = input.len();
    if count == 0 {
        return Ok(());
    }

    match reducer {
        Reducer::PerTile { .. } => {
            let grid = LaunchGrid::covering(count, selection.tile_size, ctx.config().max_tiles);
            ctx.launch(grid, |tile| {
                reduce_add_tile(tile, reducer, combine, input, acc)
            })
        }
        Reducer::Cooperative => {
            let grid = LaunchGrid::covering(
                count,
                selection.tile_size,
                ctx.capabilities().max_concurrent_tiles,
            );
            ctx.launch_cooperative(grid, |tile| {
                reduce_add_tile(tile, reducer, combine, input, acc)
            })
        }
    }
}

/// Sum of all elements of `input`.
///
/// Floating point results depend on the tile layout up to reassociation error.
///
/// # Example
///
/// ```rust
/// use kornia_scan::{sum, Device, HostRuntime, RuntimeContext};
///
/// let ctx = RuntimeContext::new(&Device::new::<HostRuntime>(0)?)?;
/// assert_eq!(sum(&ctx, &[4u32, 1, 5, 3])?, 13);
/// # Ok::<(), kornia_scan::ScanError>(())
/// ```
pub fn sum<T: Element>(ctx: &RuntimeContext, input: &[T]) -> Result<T> {
    let acc = Accumulator::zeroed();
    reduce_add(ctx, input, &acc)?;
    Ok(acc.load())
}

/// Arithmetic mean of `input`; zero when `input` is empty.
pub fn mean<T: FloatElement>(ctx: &RuntimeContext, input: &[T]) -> Result<T> {
    if input.is_empty() {
        return Ok(T::zero());
    }
    let total = sum(ctx, input)?;
    let count = <T as NumCast>::from(input.len())
        .ok_or_else(|| ScanError::Other(format!("{} is not representable", input.len())))?;
    Ok(total / count)
}

/// Local scan pass: scans every tile of `input` into `output`.
///
/// `output` must not be read, nor handed to [`launch_scan_global`], before a
/// [`RuntimeContext::sync`].
pub fn launch_scan_local<T: Element>(
    ctx: &RuntimeContext,
    selection: &KernelSelection,
    mode: ScanMode,
    input: &[T],
    output: &DeviceBuffer<T>,
) -> Result<()> {
    let combine = scan_combine(selection)?;
    check_len(input.len(), output.len())?;
    let grid = scan_grid(selection, input.len())?;
    ctx.launch(grid, |tile| {
        scan_local_tile(tile, combine, mode, input, output)
    })
}

/// Global scan pass: adds the carries of earlier tiles to the result of
/// [`launch_scan_local`].
///
/// `selection` and `mode` must match the local pass.
pub fn launch_scan_global<T: Element>(
    ctx: &RuntimeContext,
    selection: &KernelSelection,
    mode: ScanMode,
    local: &DeviceBuffer<T>,
    output: &DeviceBuffer<T>,
) -> Result<()> {
    let combine = scan_combine(selection)?;
    check_len(local.len(), output.len())?;
    let grid = scan_grid(selection, local.len())?;
    ctx.launch(grid, |tile| {
        scan_global_tile(tile, combine, mode, local, output)
    })
}

/// Prefix sum of `input` into `output`, both passes with the sync in between.
pub fn scan<T: Element>(
    ctx: &RuntimeContext,
    input: &[T],
    output: &DeviceBuffer<T>,
    mode: ScanMode,
) -> Result<()> {
    let selection = ctx
        .dispatcher()
        .select(Operation::Scan(mode), T::ELEM_TYPE, input.len())?;
    check_len(input.len(), output.len())?;
    if input.is_empty() {
        return Ok(());
    }

    let local = allocate::<T>(input.len(), ctx)?;
    launch_scan_local(ctx, &selection, mode, input, &local)?;
    ctx.sync();
    launch_scan_global(ctx, &selection, mode, &local, output)?;
    ctx.sync();
    Ok(())
}

/// `output[i] = input[0] + .. + input[i]`
///
/// # Example
///
/// ```rust
/// use kornia_scan::{inclusive_scan, Device, HostRuntime, RuntimeContext};
///
/// let ctx = RuntimeContext::new(&Device::new::<HostRuntime>(0)?)?;
/// assert_eq!(inclusive_scan(&ctx, &[4u32, 1, 5, 3])?, vec![4, 5, 10, 13]);
/// # Ok::<(), kornia_scan::ScanError>(())
/// ```
pub fn inclusive_scan<T: Element>(ctx: &RuntimeContext, input: &[T]) -> Result<Vec<T>> {
    scan_to_vec(ctx, input, ScanMode::Inclusive)
}

/// `output[i] = input[0] + .. + input[i - 1]`, with `output[0] = 0`.
pub fn exclusive_scan<T: Element>(ctx: &RuntimeContext, input: &[T]) -> Result<Vec<T>> {
    scan_to_vec(ctx, input, ScanMode::Exclusive)
}

fn scan_to_vec<T: Element>(ctx: &RuntimeContext, input: &[T], mode: ScanMode) -> Result<Vec<T>> {
    let output = allocate::<T>(input.len(), ctx)?;
    scan(ctx, input, &output, mode)?;
    to_cpu(&output, ctx)
}

fn scan_combine(selection: &KernelSelection) -> Result<CombineStrategy> {
    let KernelVariant::Scan { combine } = selection.variant else {
        return Err(ScanError::UnsupportedOperation(format!(
            "scan launched with {:?}",
            selection.variant
        )));
    };
    check_tile_size(selection.tile_size)?;
    Ok(combine)
}

fn scan_grid(selection: &KernelSelection, count: usize) -> Result<LaunchGrid> {
    let grid = LaunchGrid::covering(count, selection.tile_size, u32::MAX);
    if grid.total_lanes() < count {
        return Err(ScanError::Other(format!(
            "{count} items exceed the largest scan grid"
        )));
    }
    Ok(grid)
}

fn check_tile_size(tile_size: u32) -> Result<()> {
    if tile_size < 2 || !tile_size.is_power_of_two() {
        return Err(ScanError::InvalidTileSize(tile_size));
    }
    Ok(())
}
