use crate::dtype::DType;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TensorError {
    #[error("shape mismatch: expected {expected:?}, got {got:?}")]
    ShapeMismatch { expected: Vec<usize>, got: Vec<usize> },
    #[error("dtype mismatch: expected {expected}, got {got}")]
    DTypeMismatch { expected: DType, got: DType },
    #[error("expected a 2D matrix, found {ndim}D")]
    NotAMatrix { ndim: usize },
    #[error("row range {start}..{end} out of bounds for {rows} rows")]
    RowRange { start: usize, end: usize, rows: usize },
    #[error("invalid sparse structure: {0}")]
    InvalidSparse(String),
    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, TensorError>;
