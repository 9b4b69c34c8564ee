//! `km-kernels` - Kernel functions and the CPU evaluation backend.
//!
//! This crate provides:
//! - The `Kernel` trait and its prepare / apply / finalize protocol
//! - Reference kernels: Gaussian, linear and polynomial
//! - `KernelOptions`, the backend-selection policy carried by a kernel
//! - The `KernelBackend` trait and the rayon-parallel `CpuBackend`
//! - `KernelError`, shared by every layer above the tensors

pub mod backend;
pub mod cpu;
pub mod error;
pub mod gaussian;
pub mod kernel;
pub mod linear;
pub mod options;
pub mod polynomial;

pub use backend::KernelBackend;
pub use cpu::CpuBackend;
pub use error::{KernelError, Result};
pub use gaussian::GaussianKernel;
pub use kernel::{Kernel, KernelContext, KernelKind, ReductionFormula};
pub use linear::LinearKernel;
pub use options::{KernelOptions, OptionsOverride, ReductionMode};
pub use polynomial::PolynomialKernel;
