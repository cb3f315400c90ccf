//! # **Type Unions** - *Native element types for columnar buffers*
//!
//! Trait bounds over the fixed-width element types that may back a values
//! buffer, and over the two offset widths used by variable-length layouts.

use std::fmt::Debug;

use num_traits::{NumCast, ToPrimitive};

use crate::ffi::arrow_dtype::DataType;

/// Trait for fixed-width types valid as elements of a values buffer.
///
/// Useful when specifying `my_fn::<T: NativeType>() {}`.
///
/// Extends and constrains the *num-traits* casting traits to fit the crate's type universe.
/// Every implementor has an alignment of at most 8, which all buffers guarantee.
pub trait NativeType:
    NumCast + ToPrimitive + Copy + Default + PartialEq + PartialOrd + Debug + Send + Sync + 'static
{
    /// Natural logical type for this element.
    fn data_type() -> DataType;

    /// Little-endian byte encoding.
    fn write_le(self, out: &mut Vec<u8>);
}

macro_rules! impl_native {
    ($t:ty, $dt:expr) => {
        impl NativeType for $t {
            #[inline]
            fn data_type() -> DataType {
                $dt
            }

            #[inline]
            fn write_le(self, out: &mut Vec<u8>) {
                out.extend_from_slice(&self.to_le_bytes());
            }
        }
    };
}

impl_native!(i8, DataType::Int8);
impl_native!(i16, DataType::Int16);
impl_native!(i32, DataType::Int32);
impl_native!(i64, DataType::Int64);
impl_native!(u8, DataType::UInt8);
impl_native!(u16, DataType::UInt16);
impl_native!(u32, DataType::UInt32);
impl_native!(u64, DataType::UInt64);
impl_native!(f32, DataType::Float32);
impl_native!(f64, DataType::Float64);

/// Offset width for variable-length layouts: `i32` (small) or `i64` (large).
pub trait OffsetType: NativeType + Ord {
    const IS_LARGE: bool;

    /// Widening conversion to `usize`.
    fn as_usize(self) -> usize;

    /// Narrowing conversion from `usize`; `None` when the value does not fit.
    fn from_usize(v: usize) -> Option<Self>;
}

impl OffsetType for i32 {
    const IS_LARGE: bool = false;

    #[inline]
    fn as_usize(self) -> usize {
        self as usize
    }

    #[inline]
    fn from_usize(v: usize) -> Option<Self> {
        i32::try_from(v).ok()
    }
}

impl OffsetType for i64 {
    const IS_LARGE: bool = true;

    #[inline]
    fn as_usize(self) -> usize {
        self as usize
    }

    #[inline]
    fn from_usize(v: usize) -> Option<Self> {
        i64::try_from(v).ok()
    }
}
