//! `km-tensor` - Operands for kernel-matrix-runtime.
//!
//! This crate provides:
//! - A dense `Tensor` type backed by host storage, tagged with a `Device`
//! - A CSR `SparseMatrix` and the `Operand` enum over both layouts
//! - Shape utilities and the `DType`/`Element` mapping for f32 and f64
//! - Row-major matmul helpers used by the CPU kernel backend

pub mod cpu;
pub mod device;
pub mod dtype;
pub mod error;
pub mod operand;
pub mod shape;
pub mod sparse;
pub mod storage;
pub mod tensor;

// Re-export primary types at the crate root for convenience.
pub use device::Device;
pub use dtype::{DType, Element};
pub use error::{Result, TensorError};
pub use operand::Operand;
pub use shape::Shape;
pub use sparse::SparseMatrix;
pub use storage::CpuStorage;
pub use tensor::Tensor;
