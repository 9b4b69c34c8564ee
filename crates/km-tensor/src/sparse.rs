use crate::device::Device;
use crate::dtype::{DType, Element};
use crate::error::{Result, TensorError};
use crate::storage::CpuStorage;
use crate::tensor::Tensor;

/// A 2D sparse matrix in compressed sparse row (CSR) form.
///
/// Row `i` owns the entries `row_ptrs[i]..row_ptrs[i + 1]` of `col_indices`
/// and `values`. Column indices are strictly increasing within a row.
#[derive(Debug, Clone, PartialEq)]
pub struct SparseMatrix {
    row_ptrs: Vec<usize>,
    col_indices: Vec<usize>,
    values: CpuStorage,
    shape: [usize; 2],
    device: Device,
}

impl SparseMatrix {
    /// Build a CSR matrix from its raw parts.
    ///
    /// # Errors
    /// Returns `InvalidSparse` if the pointers are not monotone, lengths
    /// disagree, or column indices are out of range or unsorted.
    pub fn from_parts<T: Element>(
        row_ptrs: Vec<usize>,
        col_indices: Vec<usize>,
        values: Vec<T>,
        shape: [usize; 2],
    ) -> Result<Self> {
        let [rows, cols] = shape;
        if row_ptrs.len() != rows + 1 {
            return Err(TensorError::InvalidSparse(format!(
                "row_ptrs has length {} but the matrix has {} rows",
                row_ptrs.len(),
                rows
            )));
        }
        if col_indices.len() != values.len() {
            return Err(TensorError::InvalidSparse(format!(
                "{} column indices for {} values",
                col_indices.len(),
                values.len()
            )));
        }
        if row_ptrs[0] != 0 || row_ptrs[rows] != values.len() {
            return Err(TensorError::InvalidSparse(format!(
                "row_ptrs must span 0..{}",
                values.len()
            )));
        }
        for (row, w) in row_ptrs.windows(2).enumerate() {
            if w[0] > w[1] || w[1] > values.len() {
                return Err(TensorError::InvalidSparse(format!(
                    "row_ptrs is not monotone at row {}",
                    row
                )));
            }
            let row_cols = &col_indices[w[0]..w[1]];
            if row_cols.iter().any(|&c| c >= cols) {
                return Err(TensorError::InvalidSparse(format!(
                    "column index out of range in row {} (cols={})",
                    row, cols
                )));
            }
            if row_cols.windows(2).any(|p| p[0] >= p[1]) {
                return Err(TensorError::InvalidSparse(format!(
                    "column indices of row {} are not strictly increasing",
                    row
                )));
            }
        }
        Ok(SparseMatrix {
            row_ptrs,
            col_indices,
            values: CpuStorage::from_vec(values),
            shape,
            device: Device::Cpu,
        })
    }

    /// Compress a dense 2D tensor, dropping exact zeros.
    pub fn from_dense(dense: &Tensor) -> Result<Self> {
        let (rows, cols) = dense.matrix_dims()?;
        let mut row_ptrs = Vec::with_capacity(rows + 1);
        let mut col_indices = Vec::new();
        row_ptrs.push(0);
        let values = crate::with_element!(dense.dtype(), T => {
            let data = dense.as_slice::<T>()?;
            let mut values: Vec<T> = Vec::new();
            for row in data.chunks(cols.max(1)).take(rows) {
                for (j, &x) in row.iter().enumerate() {
                    if x != T::zero() {
                        col_indices.push(j);
                        values.push(x);
                    }
                }
                row_ptrs.push(values.len());
            }
            CpuStorage::from_vec(values)
        });
        // A 0-column matrix yields no chunks; pad the pointers.
        row_ptrs.resize(rows + 1, col_indices.len());
        Ok(SparseMatrix {
            row_ptrs,
            col_indices,
            values,
            shape: [rows, cols],
            device: dense.device(),
        })
    }

    pub fn shape(&self) -> [usize; 2] {
        self.shape
    }

    pub fn nrows(&self) -> usize {
        self.shape[0]
    }

    pub fn ncols(&self) -> usize {
        self.shape[1]
    }

    /// Number of stored entries.
    pub fn nnz(&self) -> usize {
        self.col_indices.len()
    }

    pub fn dtype(&self) -> DType {
        self.values.dtype()
    }

    pub fn device(&self) -> Device {
        self.device
    }

    /// Retag the matrix with a different device. No data is moved.
    pub fn to_device(mut self, device: Device) -> SparseMatrix {
        self.device = device;
        self
    }

    pub fn row_ptrs(&self) -> &[usize] {
        &self.row_ptrs
    }

    pub fn col_indices(&self) -> &[usize] {
        &self.col_indices
    }

    pub fn values<T: Element>(&self) -> Result<&[T]> {
        self.values.as_slice()
    }

    /// Column indices and values of row `i`.
    pub fn row<T: Element>(&self, i: usize) -> Result<(&[usize], &[T])> {
        let (start, end) = (self.row_ptrs[i], self.row_ptrs[i + 1]);
        Ok((&self.col_indices[start..end], &self.values::<T>()?[start..end]))
    }

    /// Copy rows `start..end` into a new CSR matrix.
    pub fn rows(&self, start: usize, end: usize) -> Result<SparseMatrix> {
        let rows = self.nrows();
        if start > end || end > rows {
            return Err(TensorError::RowRange { start, end, rows });
        }
        let (lo, hi) = (self.row_ptrs[start], self.row_ptrs[end]);
        let row_ptrs = self.row_ptrs[start..=end].iter().map(|p| p - lo).collect();
        let values = crate::with_element!(self.dtype(), T => {
            CpuStorage::from_vec(self.values::<T>()?[lo..hi].to_vec())
        });
        Ok(SparseMatrix {
            row_ptrs,
            col_indices: self.col_indices[lo..hi].to_vec(),
            values,
            shape: [end - start, self.ncols()],
            device: self.device,
        })
    }

    /// Dot product of row `i` of `self` with row `j` of `other`.
    pub fn row_dot<T: Element>(&self, i: usize, other: &SparseMatrix, j: usize) -> Result<T> {
        let (ca, va) = self.row::<T>(i)?;
        let (cb, vb) = other.row::<T>(j)?;
        let (mut p, mut q) = (0, 0);
        let mut acc = T::zero();
        while p < ca.len() && q < cb.len() {
            match ca[p].cmp(&cb[q]) {
                std::cmp::Ordering::Less => p += 1,
                std::cmp::Ordering::Greater => q += 1,
                std::cmp::Ordering::Equal => {
                    acc += va[p] * vb[q];
                    p += 1;
                    q += 1;
                }
            }
        }
        Ok(acc)
    }

    /// Squared Euclidean norm of every row, as a typed vector.
    pub fn sq_row_norms<T: Element>(&self) -> Result<Vec<T>> {
        let values = self.values::<T>()?;
        Ok(self
            .row_ptrs
            .windows(2)
            .map(|w| {
                values[w[0]..w[1]]
                    .iter()
                    .fold(T::zero(), |acc, &x| acc + x * x)
            })
            .collect())
    }

    /// Expand into a dense tensor on the same device.
    pub fn to_dense(&self) -> Result<Tensor> {
        let [rows, cols] = self.shape;
        let mut out = Tensor::zeros(self.dtype(), [rows, cols], self.device);
        crate::with_element!(self.dtype(), T => {
            let values = self.values::<T>()?;
            let dst = out.as_mut_slice::<T>()?;
            for i in 0..rows {
                for k in self.row_ptrs[i]..self.row_ptrs[i + 1] {
                    dst[i * cols + self.col_indices[k]] = values[k];
                }
            }
        });
        Ok(out)
    }
}
