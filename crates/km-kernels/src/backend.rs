use std::fmt::Debug;

use km_tensor::{SparseMatrix, Tensor};

use crate::error::Result;
use crate::kernel::Kernel;
use crate::options::KernelOptions;

/// A device-specific implementation of the three kernel operations, in dense
/// and CSR flavours.
///
/// Arguments reach a backend already validated: shapes agree, all operands
/// share one dtype and device, and `out` (when given) has the result shape.
/// A backend writes into `out` if provided and returns it, otherwise it
/// allocates the result.
pub trait KernelBackend: Send + Sync + Debug {
    /// Returns the name of this backend (e.g., "cpu").
    fn name(&self) -> &str;

    /// `K(X1, X2)`, shape `[N, M]`.
    fn fmm(
        &self,
        x1: &Tensor,
        x2: &Tensor,
        kernel: &dyn Kernel,
        out: Option<Tensor>,
        options: &KernelOptions,
    ) -> Result<Tensor>;

    fn fmm_sparse(
        &self,
        x1: &SparseMatrix,
        x2: &SparseMatrix,
        kernel: &dyn Kernel,
        out: Option<Tensor>,
        options: &KernelOptions,
    ) -> Result<Tensor>;

    /// `K(X1, X2) @ v`, shape `[N, T]`.
    fn fmmv(
        &self,
        x1: &Tensor,
        x2: &Tensor,
        v: &Tensor,
        kernel: &dyn Kernel,
        out: Option<Tensor>,
        options: &KernelOptions,
    ) -> Result<Tensor>;

    fn fmmv_sparse(
        &self,
        x1: &SparseMatrix,
        x2: &SparseMatrix,
        v: &Tensor,
        kernel: &dyn Kernel,
        out: Option<Tensor>,
        options: &KernelOptions,
    ) -> Result<Tensor>;

    /// `K(X1, X2)' @ (K(X1, X2) @ v + w)`, shape `[M, T]`. At least one of
    /// `v` and `w` is present; a missing term is treated as zero.
    #[allow(clippy::too_many_arguments)]
    fn fdmmv(
        &self,
        x1: &Tensor,
        x2: &Tensor,
        v: Option<&Tensor>,
        w: Option<&Tensor>,
        kernel: &dyn Kernel,
        out: Option<Tensor>,
        options: &KernelOptions,
    ) -> Result<Tensor>;

    #[allow(clippy::too_many_arguments)]
    fn fdmmv_sparse(
        &self,
        x1: &SparseMatrix,
        x2: &SparseMatrix,
        v: Option<&Tensor>,
        w: Option<&Tensor>,
        kernel: &dyn Kernel,
        out: Option<Tensor>,
        options: &KernelOptions,
    ) -> Result<Tensor>;
}
