//! Buffers shared between the tiles of a launch.
//!
//! Tiles of one launch run concurrently and in any order, so every buffer they
//! write is made of atomic cells. Element ordering between two launches comes
//! from the launch boundary (see [`RuntimeContext::sync`]).

use std::fmt;

use crate::element::{AtomicElement, Element};
use crate::error::{Result, ScanError};
use crate::runtime::RuntimeContext;

/// A fixed-length buffer living on the host substrate.
pub struct DeviceBuffer<T: Element> {
    cells: Vec<T::Atomic>,
}

impl<T: Element> DeviceBuffer<T> {
    /// Allocate `len` zeroed elements.
    pub fn zeros(len: usize) -> Self {
        Self {
            cells: (0..len).map(|_| AtomicElement::<T>::new(T::zero())).collect(),
        }
    }

    /// Copy a host slice into a new buffer.
    pub fn from_slice(data: &[T]) -> Self {
        Self {
            cells: data.iter().map(|&v| AtomicElement::<T>::new(v)).collect(),
        }
    }

    /// Get the total number of elements.
    pub fn len(&self) -> usize {
        self.cells.len()
    }

    /// Check if the buffer is empty.
    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Read element `index`.
    ///
    /// # Panics
    ///
    /// Panics if `index` is out of bounds.
    #[inline]
    pub fn load(&self, index: usize) -> T {
        AtomicElement::<T>::load(&self.cells[index])
    }

    /// Write element `index`.
    ///
    /// # Panics
    ///
    /// Panics if `index` is out of bounds.
    #[inline]
    pub fn store(&self, index: usize, value: T) {
        AtomicElement::<T>::store(&self.cells[index], value)
    }

    /// Copy the buffer back into a host vector.
    pub fn to_vec(&self) -> Vec<T> {
        self.cells.iter().map(|cell| AtomicElement::<T>::load(cell)).collect()
    }
}

impl<T: Element> fmt::Debug for DeviceBuffer<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceBuffer")
            .field("elem", &T::ELEM_TYPE)
            .field("len", &self.len())
            .finish()
    }
}

/// Cross-tile accumulator of a reduction.
///
/// Owned by the caller, who must zero it before each reduction. Kernels only
/// ever add into it, once per tile.
pub struct Accumulator<T: Element> {
    cell: T::Atomic,
}

impl<T: Element> Accumulator<T> {
    /// A new accumulator holding the additive identity.
    pub fn zeroed() -> Self {
        Self {
            cell: AtomicElement::<T>::new(T::zero()),
        }
    }

    /// Set the accumulator back to the additive identity.
    pub fn reset(&self) {
        AtomicElement::<T>::store(&self.cell, T::zero())
    }

    /// Read the accumulated value.
    pub fn load(&self) -> T {
        AtomicElement::<T>::load(&self.cell)
    }

    /// Atomically add `value`, returning the previous value.
    pub fn fetch_add(&self, value: T) -> T {
        AtomicElement::<T>::fetch_add(&self.cell, value)
    }
}

impl<T: Element> Default for Accumulator<T> {
    fn default() -> Self {
        Self::zeroed()
    }
}

impl<T: Element> fmt::Debug for Accumulator<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Accumulator").field(&self.load()).finish()
    }
}

/// Transfer data from the caller into a buffer of the context's substrate.
///
/// # Example
///
/// ```rust
/// use kornia_scan::{to_cpu, to_device, Device, HostRuntime, RuntimeContext};
///
/// let ctx = RuntimeContext::new(&Device::new::<HostRuntime>(0)?)?;
/// let buffer = to_device(&[1u32, 2, 3], &ctx)?;
/// assert_eq!(to_cpu(&buffer, &ctx)?, vec![1, 2, 3]);
/// # Ok::<(), kornia_scan::ScanError>(())
/// ```
pub fn to_device<T: Element>(data: &[T], ctx: &RuntimeContext) -> Result<DeviceBuffer<T>> {
    log::trace!("to_device: {} x {} on {}", data.len(), T::ELEM_TYPE, ctx.device_name());
    Ok(DeviceBuffer::from_slice(data))
}

/// Transfer a buffer back to the caller.
pub fn to_cpu<T: Element>(buffer: &DeviceBuffer<T>, ctx: &RuntimeContext) -> Result<Vec<T>> {
    log::trace!("to_cpu: {} x {} on {}", buffer.len(), T::ELEM_TYPE, ctx.device_name());
    Ok(buffer.to_vec())
}

/// Allocate a zeroed buffer of `len` elements.
pub fn allocate<T: Element>(len: usize, ctx: &RuntimeContext) -> Result<DeviceBuffer<T>> {
    let bytes = len
        .checked_mul(T::ELEM_TYPE.size())
        .ok_or_else(|| ScanError::Other(format!("allocation of {len} elements overflows")))?;
    log::trace!("allocate: {} bytes on {}", bytes, ctx.device_name());
    Ok(DeviceBuffer::zeros(len))
}

/// Check a buffer holds exactly `expected` elements.
pub(crate) fn check_len(expected: usize, actual: usize) -> Result<()> {
    if expected != actual {
        return Err(ScanError::InvalidBufferSize { expected, actual });
    }
    Ok(())
}
