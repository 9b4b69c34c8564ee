use crate::device::Device;
use crate::dtype::DType;
use crate::shape::Shape;
use crate::sparse::SparseMatrix;
use crate::tensor::Tensor;

/// A primary operand of a kernel computation: a point set stored densely or
/// in CSR form.
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    Dense(Tensor),
    Sparse(SparseMatrix),
}

impl Operand {
    pub fn is_sparse(&self) -> bool {
        matches!(self, Operand::Sparse(_))
    }

    pub fn dtype(&self) -> DType {
        match self {
            Operand::Dense(t) => t.dtype(),
            Operand::Sparse(s) => s.dtype(),
        }
    }

    pub fn device(&self) -> Device {
        match self {
            Operand::Dense(t) => t.device(),
            Operand::Sparse(s) => s.device(),
        }
    }

    pub fn shape(&self) -> Shape {
        match self {
            Operand::Dense(t) => t.shape().clone(),
            Operand::Sparse(s) => Shape::from(s.shape()),
        }
    }

    /// Rank of the operand. Sparse operands are always 2D.
    pub fn ndim(&self) -> usize {
        match self {
            Operand::Dense(t) => t.ndim(),
            Operand::Sparse(_) => 2,
        }
    }

    pub fn as_dense(&self) -> Option<&Tensor> {
        match self {
            Operand::Dense(t) => Some(t),
            Operand::Sparse(_) => None,
        }
    }

    pub fn as_sparse(&self) -> Option<&SparseMatrix> {
        match self {
            Operand::Dense(_) => None,
            Operand::Sparse(s) => Some(s),
        }
    }
}

impl From<Tensor> for Operand {
    fn from(t: Tensor) -> Self {
        Operand::Dense(t)
    }
}

impl From<SparseMatrix> for Operand {
    fn from(s: SparseMatrix) -> Self {
        Operand::Sparse(s)
    }
}
