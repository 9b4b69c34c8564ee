use crate::device::Device;
use crate::dtype::{DType, Element};
use crate::error::{Result, TensorError};
use crate::shape::Shape;
use crate::storage::CpuStorage;

/// A dense, row-major tensor with a device tag.
///
/// The data always lives in host storage; the [`Device`] records where the
/// operand is logically placed so that dispatch can pick a matching backend.
#[derive(Debug, Clone, PartialEq)]
pub struct Tensor {
    storage: CpuStorage,
    shape: Shape,
    device: Device,
}

impl Tensor {
    /// Create a new CPU tensor from typed data and a shape.
    ///
    /// # Panics
    /// Panics if `data.len() != shape.numel()`. Use [`Tensor::from_vec`] for
    /// a fallible constructor.
    pub fn new<T: Element>(data: Vec<T>, shape: impl Into<Shape>) -> Self {
        let shape = shape.into();
        assert_eq!(
            data.len(),
            shape.numel(),
            "data length {} does not match shape {} (numel={})",
            data.len(),
            shape,
            shape.numel()
        );
        Tensor {
            storage: CpuStorage::from_vec(data),
            shape,
            device: Device::Cpu,
        }
    }

    /// Create a CPU tensor from typed data, checking the element count.
    pub fn from_vec<T: Element>(data: Vec<T>, shape: impl Into<Shape>) -> Result<Self> {
        let shape = shape.into();
        if data.len() != shape.numel() {
            return Err(TensorError::ShapeMismatch {
                expected: shape.dims().to_vec(),
                got: vec![data.len()],
            });
        }
        Ok(Tensor {
            storage: CpuStorage::from_vec(data),
            shape,
            device: Device::Cpu,
        })
    }

    /// Create a zero-filled tensor.
    pub fn zeros(dtype: DType, shape: impl Into<Shape>, device: Device) -> Self {
        let shape = shape.into();
        Tensor {
            storage: CpuStorage::zeros(dtype, shape.numel()),
            shape,
            device,
        }
    }

    /// Returns a reference to the tensor's shape.
    pub fn shape(&self) -> &Shape {
        &self.shape
    }

    pub fn ndim(&self) -> usize {
        self.shape.ndim()
    }

    /// Returns the tensor's data type.
    pub fn dtype(&self) -> DType {
        self.storage.dtype()
    }

    pub fn device(&self) -> Device {
        self.device
    }

    /// Returns `(rows, cols)`, failing for tensors that are not 2D.
    pub fn matrix_dims(&self) -> Result<(usize, usize)> {
        self.shape.matrix_dims()
    }

    /// Returns the underlying data as a slice of `T`.
    pub fn as_slice<T: Element>(&self) -> Result<&[T]> {
        self.storage.as_slice()
    }

    /// Returns the underlying data as a mutable slice of `T`.
    pub fn as_mut_slice<T: Element>(&mut self) -> Result<&mut [T]> {
        self.storage.as_mut_slice()
    }

    /// Reshape the tensor, returning a new tensor with the same data but
    /// a different shape.
    ///
    /// The total number of elements must remain the same.
    pub fn reshape(&self, new_shape: impl Into<Shape>) -> Result<Tensor> {
        let new_shape = new_shape.into();
        if self.shape.numel() != new_shape.numel() {
            return Err(TensorError::ShapeMismatch {
                expected: self.shape.dims().to_vec(),
                got: new_shape.dims().to_vec(),
            });
        }
        Ok(Tensor {
            storage: self.storage.clone(),
            shape: new_shape,
            device: self.device,
        })
    }

    /// Retag the tensor with a different device. No data is moved.
    pub fn to_device(mut self, device: Device) -> Tensor {
        self.device = device;
        self
    }

    /// Copy rows `start..end` of a 2D tensor into a new tensor.
    pub fn rows(&self, start: usize, end: usize) -> Result<Tensor> {
        let (rows, cols) = self.matrix_dims()?;
        if start > end || end > rows {
            return Err(TensorError::RowRange { start, end, rows });
        }
        let storage = crate::with_element!(self.dtype(), T => {
            let data = self.as_slice::<T>()?;
            CpuStorage::from_vec(data[start * cols..end * cols].to_vec())
        });
        Ok(Tensor {
            storage,
            shape: Shape::matrix(end - start, cols),
            device: self.device,
        })
    }

    /// Element-wise `self += other`, in place.
    pub fn add_assign(&mut self, other: &Tensor) -> Result<()> {
        if self.shape != other.shape {
            return Err(TensorError::ShapeMismatch {
                expected: self.shape.dims().to_vec(),
                got: other.shape.dims().to_vec(),
            });
        }
        if self.dtype() != other.dtype() {
            return Err(TensorError::DTypeMismatch {
                expected: self.dtype(),
                got: other.dtype(),
            });
        }
        crate::with_element!(self.dtype(), T => {
            let rhs = other.as_slice::<T>()?;
            for (a, b) in self.as_mut_slice::<T>()?.iter_mut().zip(rhs) {
                *a += *b;
            }
        });
        Ok(())
    }

    /// Address of the first element, used to check buffer identity.
    pub fn data_ptr(&self) -> *const u8 {
        self.storage.data_ptr()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_tensor() {
        let t = Tensor::new(vec![1.0f32, 2.0, 3.0, 4.0, 5.0, 6.0], [2, 3]);
        assert_eq!(t.ndim(), 2);
        assert_eq!(t.matrix_dims().unwrap(), (2, 3));
        assert_eq!(t.dtype(), DType::F32);
        assert_eq!(t.device(), Device::Cpu);
        assert_eq!(t.as_slice::<f32>().unwrap(), &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
    }

    #[test]
    #[should_panic]
    fn test_new_shape_mismatch_panics() {
        let _t = Tensor::new(vec![1.0f32, 2.0], [3]);
    }

    #[test]
    fn test_from_vec_mismatch() {
        assert!(Tensor::from_vec(vec![1.0f64, 2.0], [3]).is_err());
    }

    #[test]
    fn test_zeros() {
        let z = Tensor::zeros(DType::F64, [2, 3], Device::Gpu(0));
        assert_eq!(z.as_slice::<f64>().unwrap(), &[0.0; 6]);
        assert!(z.device().is_gpu());
    }

    #[test]
    fn test_reshape() {
        let t = Tensor::new(vec![1.0f32, 2.0, 3.0], [3]);
        let r = t.reshape([3, 1]).unwrap();
        assert_eq!(r.shape().dims(), &[3, 1]);
        assert_eq!(r.as_slice::<f32>().unwrap(), t.as_slice::<f32>().unwrap());
        assert!(t.reshape([2, 2]).is_err());
    }

    #[test]
    fn test_rows() {
        let t = Tensor::new(vec![1.0f64, 2.0, 3.0, 4.0, 5.0, 6.0], [3, 2]);
        let r = t.rows(1, 3).unwrap();
        assert_eq!(r.shape().dims(), &[2, 2]);
        assert_eq!(r.as_slice::<f64>().unwrap(), &[3.0, 4.0, 5.0, 6.0]);
        assert!(t.rows(2, 4).is_err());
    }

    #[test]
    fn test_add_assign() {
        let mut a = Tensor::new(vec![1.0f32, 2.0], [2, 1]);
        let b = Tensor::new(vec![10.0f32, 20.0], [2, 1]);
        let ptr = a.data_ptr();
        a.add_assign(&b).unwrap();
        assert_eq!(a.as_slice::<f32>().unwrap(), &[11.0, 22.0]);
        assert_eq!(a.data_ptr(), ptr);
    }

    #[test]
    fn test_add_assign_mismatch() {
        let mut a = Tensor::new(vec![1.0f32, 2.0], [2, 1]);
        assert!(a.add_assign(&Tensor::new(vec![1.0f32], [1, 1])).is_err());
        assert!(a.add_assign(&Tensor::new(vec![1.0f64, 2.0], [2, 1])).is_err());
    }

    #[test]
    fn test_to_device_keeps_data() {
        let t = Tensor::new(vec![1.0f32], [1, 1]);
        let ptr = t.data_ptr();
        let g = t.to_device(Device::Gpu(0));
        assert_eq!(g.device(), Device::Gpu(0));
        assert_eq!(g.data_ptr(), ptr);
    }
}
