use km_tensor::{DType, Device};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum KernelError {
    #[error("{0}")]
    Shape(String),
    #[error("data types of input matrices must be equal: found {expected} and {got}")]
    DTypeMismatch { expected: DType, got: DType },
    #[error("all input arguments to {op} must be on the same device")]
    DeviceMismatch { op: String },
    #[error("either all or none of 'X1', 'X2' must be sparse")]
    SparsityMismatch,
    #[error("one of v and w must be specified")]
    MissingOperand,
    #[error("backend '{backend}' is not available")]
    BackendUnavailable { backend: String },
    #[error("backend '{backend}' cannot evaluate operands placed on {device}")]
    UnsupportedDevice { backend: String, device: Device },
    #[error("the lazy-reduction engine is not installed; register one before running reduction_mmv")]
    ReductionEngineNotInstalled,
    #[error("{op} not implemented for kernel {kernel}")]
    NotImplemented { op: String, kernel: String },
    #[error("invalid kernel parameter: {0}")]
    InvalidParameter(String),
    #[error("tensor error: {0}")]
    Tensor(#[from] km_tensor::TensorError),
}

pub type Result<T> = std::result::Result<T, KernelError>;
