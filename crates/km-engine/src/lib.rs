//! `km-engine` - Dispatch for kernel-matrix operations.
//!
//! This crate provides:
//! - Argument validation shared by `mm`, `mmv` and `dmmv`
//! - Backend selection from placement, sparsity and `KernelOptions`
//! - Eligibility rules and the call interface of the lazy-reduction engine
//! - `dmmv` composed from two `mmv` calls for engines without a fused version
//! - `Runtime`, the registry of backends, and the `KernelOps` entry points

pub mod decompose;
pub mod eligibility;
pub mod ops;
pub mod policy;
pub mod reduction;
pub mod runtime;
pub mod validate;

pub use eligibility::REDUCTION_DIM_THRESHOLD;
pub use km_kernels::{KernelError, Result};
pub use ops::{KernelOps, Plan, Selection};
pub use policy::{Advisory, BackendKind, OpFamily, Resolution};
pub use reduction::{Reduction, ReductionCall, ReductionEngine};
pub use runtime::{Capabilities, Runtime, RuntimeBuilder};
