use std::fmt::{self, Debug};
use std::ops::{Add, AddAssign, Div, Mul, Neg, Sub};

use crate::storage::CpuStorage;

/// Floating point element types an operand can hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DType {
    /// 32-bit floating point.
    F32,
    /// 64-bit floating point.
    F64,
}

impl fmt::Display for DType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DType::F32 => write!(f, "f32"),
            DType::F64 => write!(f, "f64"),
        }
    }
}

/// Rust scalar types that can back an operand.
///
/// Connects `f32`/`f64` to their runtime [`DType`] and to the matching
/// [`CpuStorage`] variant, and carries the handful of float functions the
/// CPU kernels need.
pub trait Element:
    Copy
    + Send
    + Sync
    + Debug
    + PartialOrd
    + 'static
    + Add<Output = Self>
    + Sub<Output = Self>
    + Mul<Output = Self>
    + Div<Output = Self>
    + Neg<Output = Self>
    + AddAssign
{
    const DTYPE: DType;

    fn zero() -> Self;
    fn from_f64(v: f64) -> Self;
    fn exp(self) -> Self;
    fn powf(self, e: Self) -> Self;
    fn max(self, other: Self) -> Self;

    /// Borrows the storage as a slice of `Self`, if the variant matches.
    fn slice(storage: &CpuStorage) -> Option<&[Self]>;
    fn slice_mut(storage: &mut CpuStorage) -> Option<&mut [Self]>;
    fn into_storage(data: Vec<Self>) -> CpuStorage;
}

macro_rules! impl_element {
    ($t:ty, $dtype:ident) => {
        impl Element for $t {
            const DTYPE: DType = DType::$dtype;

            #[inline]
            fn zero() -> Self {
                0.0
            }

            #[inline]
            fn from_f64(v: f64) -> Self {
                v as $t
            }

            #[inline]
            fn exp(self) -> Self {
                <$t>::exp(self)
            }

            #[inline]
            fn powf(self, e: Self) -> Self {
                <$t>::powf(self, e)
            }

            #[inline]
            fn max(self, other: Self) -> Self {
                <$t>::max(self, other)
            }

            fn slice(storage: &CpuStorage) -> Option<&[Self]> {
                match storage {
                    CpuStorage::$dtype(v) => Some(v.as_slice()),
                    _ => None,
                }
            }

            fn slice_mut(storage: &mut CpuStorage) -> Option<&mut [Self]> {
                match storage {
                    CpuStorage::$dtype(v) => Some(v.as_mut_slice()),
                    _ => None,
                }
            }

            fn into_storage(data: Vec<Self>) -> CpuStorage {
                CpuStorage::$dtype(data)
            }
        }
    };
}

impl_element!(f32, F32);
impl_element!(f64, F64);

/// Runs `$body` with `$T` bound to the Rust type behind a runtime [`DType`].
///
/// ```ignore
/// with_element!(tensor.dtype(), T => {
///     let data: &[T] = tensor.as_slice::<T>()?;
///     ...
/// })
/// ```
#[macro_export]
macro_rules! with_element {
    ($dtype:expr, $T:ident => $body:block) => {
        match $dtype {
            $crate::dtype::DType::F32 => {
                type $T = f32;
                $body
            }
            $crate::dtype::DType::F64 => {
                type $T = f64;
                $body
            }
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        assert_eq!(DType::F32.to_string(), "f32");
        assert_eq!(DType::F64.to_string(), "f64");
    }

    #[test]
    fn test_element_storage_variant() {
        let s = f64::into_storage(vec![1.0, 2.0]);
        assert_eq!(s.dtype(), DType::F64);
        assert!(f64::slice(&s).is_some());
        assert!(f32::slice(&s).is_none());
    }

    #[test]
    fn test_with_element_binds_type() {
        fn width(dtype: DType) -> usize {
            with_element!(dtype, T => { std::mem::size_of::<T>() })
        }
        assert_eq!(width(DType::F32), 4);
        assert_eq!(width(DType::F64), 8);
    }
}
