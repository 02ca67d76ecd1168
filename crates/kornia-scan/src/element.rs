//! Numeric element types handled by the engine.
//!
//! The engine works on four element types: 32/64-bit floats and 32/64-bit
//! unsigned integers. Each type knows its additive identity, how the substrate
//! adds two values, and which atomic cell backs it in shared buffers.

use std::fmt::{Debug, Display};
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

use num_traits::{Float, Zero};
use serde::{Deserialize, Serialize};

/// Runtime tag of an element type, used as a strategy-table key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ElemType {
    /// 32-bit IEEE float
    F32,
    /// 32-bit unsigned integer
    U32,
    /// 64-bit IEEE float
    F64,
    /// 64-bit unsigned integer
    U64,
}

impl ElemType {
    /// Every element type the engine supports.
    pub const ALL: [ElemType; 4] = [ElemType::F32, ElemType::U32, ElemType::F64, ElemType::U64];

    /// Size of one element in bytes.
    pub fn size(&self) -> usize {
        match self {
            ElemType::F32 | ElemType::U32 => 4,
            ElemType::F64 | ElemType::U64 => 8,
        }
    }

    /// Whether the element is a floating point type.
    pub fn is_float(&self) -> bool {
        matches!(self, ElemType::F32 | ElemType::F64)
    }

    /// Whether atomically adding this element needs 64-bit atomic support.
    pub fn is_64bit(&self) -> bool {
        self.size() == 8
    }
}

impl Display for ElemType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ElemType::F32 => "f32",
            ElemType::U32 => "u32",
            ElemType::F64 => "f64",
            ElemType::U64 => "u64",
        };
        f.write_str(name)
    }
}

/// An atomic cell holding one element.
///
/// Loads and stores are relaxed: ordering between kernel passes comes from the
/// launch boundary, never from the cells themselves.
pub trait AtomicElement<T>: Send + Sync {
    /// Create a cell holding `value`.
    fn new(value: T) -> Self;
    /// Read the current value.
    fn load(&self) -> T;
    /// Overwrite the current value.
    fn store(&self, value: T);
    /// Add `value` and return the previous value.
    fn fetch_add(&self, value: T) -> T;
}

/// A numeric element the engine can reduce and scan.
pub trait Element:
    bytemuck::Pod + Zero + PartialEq + PartialOrd + Debug + Display + Send + Sync + 'static
{
    /// Runtime tag of this type.
    const ELEM_TYPE: ElemType;

    /// Atomic cell type backing shared buffers of this element.
    type Atomic: AtomicElement<Self>;

    /// Addition as the substrate performs it: wrapping for integers, IEEE for floats.
    fn accumulate(self, rhs: Self) -> Self;
}

/// Floating point elements.
pub trait FloatElement: Element + Float {}

impl FloatElement for f32 {}
impl FloatElement for f64 {}

macro_rules! impl_int_element {
    ($ty:ty, $atomic:ty, $tag:expr) => {
        impl AtomicElement<$ty> for $atomic {
            fn new(value: $ty) -> Self {
                <$atomic>::new(value)
            }

            fn load(&self) -> $ty {
                <$atomic>::load(self, Ordering::Relaxed)
            }

            fn store(&self, value: $ty) {
                <$atomic>::store(self, value, Ordering::Relaxed)
            }

            fn fetch_add(&self, value: $ty) -> $ty {
                <$atomic>::fetch_add(self, value, Ordering::AcqRel)
            }
        }

        impl Element for $ty {
            const ELEM_TYPE: ElemType = $tag;
            type Atomic = $atomic;

            #[inline]
            fn accumulate(self, rhs: Self) -> Self {
                self.wrapping_add(rhs)
            }
        }
    };
}

// The host has no native float atomic add, so the float cells retry a
// compare-exchange on the bit pattern.
macro_rules! impl_float_element {
    ($ty:ty, $atomic:ty, $tag:expr) => {
        impl AtomicElement<$ty> for $atomic {
            fn new(value: $ty) -> Self {
                <$atomic>::new(value.to_bits())
            }

            fn load(&self) -> $ty {
                <$ty>::from_bits(<$atomic>::load(self, Ordering::Relaxed))
            }

            fn store(&self, value: $ty) {
                <$atomic>::store(self, value.to_bits(), Ordering::Relaxed)
            }

            fn fetch_add(&self, value: $ty) -> $ty {
                let mut current = <$atomic>::load(self, Ordering::Relaxed);
                loop {
                    let next = (<$ty>::from_bits(current) + value).to_bits();
                    match self.compare_exchange_weak(
                        current,
                        next,
                        Ordering::AcqRel,
                        Ordering::Relaxed,
                    ) {
                        Ok(previous) => return <$ty>::from_bits(previous),
                        Err(actual) => current = actual,
                    }
                }
            }
        }

        impl Element for $ty {
            const ELEM_TYPE: ElemType = $tag;
            type Atomic = $atomic;

            #[inline]
            fn accumulate(self, rhs: Self) -> Self {
                self + rhs
            }
        }
    };
}

impl_int_element!(u32, AtomicU32, ElemType::U32);
impl_int_element!(u64, AtomicU64, ElemType::U64);
impl_float_element!(f32, AtomicU32, ElemType::F32);
impl_float_element!(f64, AtomicU64, ElemType::F64);
