use crate::dtype::{DType, Element};
use crate::error::{Result, TensorError};

/// Host-side element storage for dense and sparse operands.
#[derive(Debug, Clone, PartialEq)]
pub enum CpuStorage {
    /// 32-bit floating point storage.
    F32(Vec<f32>),
    /// 64-bit floating point storage.
    F64(Vec<f64>),
}

impl CpuStorage {
    /// Number of elements in this storage.
    pub fn len(&self) -> usize {
        match self {
            CpuStorage::F32(v) => v.len(),
            CpuStorage::F64(v) => v.len(),
        }
    }

    /// Returns true if the storage contains no elements.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the data as a slice of `T`.
    ///
    /// # Errors
    /// Returns `DTypeMismatch` if the storage does not hold `T`.
    pub fn as_slice<T: Element>(&self) -> Result<&[T]> {
        let got = self.dtype();
        T::slice(self).ok_or(TensorError::DTypeMismatch {
            expected: T::DTYPE,
            got,
        })
    }

    /// Returns the data as a mutable slice of `T`.
    ///
    /// # Errors
    /// Returns `DTypeMismatch` if the storage does not hold `T`.
    pub fn as_mut_slice<T: Element>(&mut self) -> Result<&mut [T]> {
        let got = self.dtype();
        T::slice_mut(self).ok_or(TensorError::DTypeMismatch {
            expected: T::DTYPE,
            got,
        })
    }

    /// Create zero-filled storage for the given dtype and element count.
    pub fn zeros(dtype: DType, n: usize) -> Self {
        match dtype {
            DType::F32 => CpuStorage::F32(vec![0.0; n]),
            DType::F64 => CpuStorage::F64(vec![0.0; n]),
        }
    }

    /// Create storage from a typed vector.
    pub fn from_vec<T: Element>(data: Vec<T>) -> Self {
        T::into_storage(data)
    }

    /// Returns the dtype of this storage.
    pub fn dtype(&self) -> DType {
        match self {
            CpuStorage::F32(_) => DType::F32,
            CpuStorage::F64(_) => DType::F64,
        }
    }

    /// Address of the first element, used to check buffer identity.
    pub fn data_ptr(&self) -> *const u8 {
        match self {
            CpuStorage::F32(v) => v.as_ptr().cast(),
            CpuStorage::F64(v) => v.as_ptr().cast(),
        }
    }
}
