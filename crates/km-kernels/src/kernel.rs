use std::fmt::{self, Debug};

use km_tensor::{cpu, with_element, DType, Element, SparseMatrix, Tensor};

use crate::error::{KernelError, Result};
use crate::options::KernelOptions;

/// Broad family of a kernel, used in diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KernelKind {
    /// A function of `||x - y||`.
    Distance,
    /// A function of `<x, y>`.
    DotProduct,
}

impl fmt::Display for KernelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KernelKind::Distance => write!(f, "distance"),
            KernelKind::DotProduct => write!(f, "dot-product"),
        }
    }
}

/// Intermediate state computed by [`Kernel::prepare`] and consumed by
/// [`Kernel::finalize`].
///
/// `lhs` is indexed by rows of `X1`, `rhs` by rows of `X2`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct KernelContext {
    pub lhs: Option<Tensor>,
    pub rhs: Option<Tensor>,
}

/// A symbolic description of `K(X1, X2) @ v` for the lazy-reduction engine.
#[derive(Debug, Clone, PartialEq)]
pub struct ReductionFormula {
    /// Reduction body, e.g. `Exp(g * SqDist(x1, x2)) * v`.
    pub formula: String,
    /// Variable declarations, e.g. `x1 = Vi(10)`.
    pub aliases: Vec<String>,
    /// Values for the parameters declared after `x1`, `x2` and `v`.
    pub other_vars: Vec<Tensor>,
}

/// A positive-definite kernel evaluated through a three-stage protocol.
///
/// Backends evaluate a block of the kernel matrix as
///
/// ```text
/// ctx = prepare(X1, X2)
/// out = 0
/// apply(X1, X2, &mut out)      // partial values, e.g. X1 @ X2'
/// K   = finalize(out, &ctx)    // kernel nonlinearity
/// ```
///
/// and are free to split `X1`/`X2` into row blocks between calls. Kernels
/// that cannot handle CSR operands keep the default `prepare_sparse` and
/// `apply_sparse`, which fail with [`KernelError::NotImplemented`].
pub trait Kernel: Send + Sync + Debug {
    /// Short lowercase name, e.g. `"gaussian"`.
    fn name(&self) -> &str;

    fn kind(&self) -> KernelKind;

    /// Default policy used when a call does not override it.
    fn options(&self) -> &KernelOptions;

    fn prepare(&self, x1: &Tensor, x2: &Tensor) -> Result<KernelContext>;

    /// Accumulate the unfinalized values into `out` (`[rows(X1), rows(X2)]`).
    fn apply(&self, x1: &Tensor, x2: &Tensor, out: &mut Tensor) -> Result<()>;

    fn finalize(&self, partial: Tensor, ctx: &KernelContext) -> Result<Tensor>;

    fn prepare_sparse(&self, _x1: &SparseMatrix, _x2: &SparseMatrix) -> Result<KernelContext> {
        Err(not_implemented(self, "prepare_sparse"))
    }

    fn apply_sparse(&self, _x1: &SparseMatrix, _x2: &SparseMatrix, _out: &mut Tensor) -> Result<()> {
        Err(not_implemented(self, "apply_sparse"))
    }

    /// Reduction formula for `features`-dimensional points and `outputs`
    /// right-hand sides, if this kernel can run on the lazy-reduction engine.
    fn reduction_formula(
        &self,
        _features: usize,
        _outputs: usize,
        _dtype: DType,
    ) -> Option<ReductionFormula> {
        None
    }
}

impl fmt::Display for dyn Kernel + '_ {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<{} kernel>", self.name())
    }
}

/// The error a kernel returns for an unsupported stage.
pub fn not_implemented<K: Kernel + ?Sized>(kernel: &K, op: &str) -> KernelError {
    KernelError::NotImplemented {
        op: op.to_string(),
        kernel: format!("{} ({})", kernel.name(), kernel.kind()),
    }
}

fn check_partial(out: &Tensor, n: usize, m: usize, dtype: DType) -> Result<()> {
    if out.shape().dims() != [n, m] {
        return Err(KernelError::Shape(format!(
            "partial kernel buffer has shape {}, expected [{}, {}]",
            out.shape(),
            n,
            m
        )));
    }
    if out.dtype() != dtype {
        return Err(KernelError::DTypeMismatch {
            expected: dtype,
            got: out.dtype(),
        });
    }
    Ok(())
}

fn check_features(a: usize, b: usize) -> Result<()> {
    if a != b {
        return Err(KernelError::Shape(format!(
            "X1 has {} features but X2 has {}",
            a, b
        )));
    }
    Ok(())
}

/// `out += X1 @ X2'` for dense operands.
pub(crate) fn accumulate_inner_products(x1: &Tensor, x2: &Tensor, out: &mut Tensor) -> Result<()> {
    let (n, d) = x1.matrix_dims()?;
    let (m, d2) = x2.matrix_dims()?;
    check_features(d, d2)?;
    check_partial(out, n, m, x1.dtype())?;
    with_element!(x1.dtype(), T => {
        cpu::matmul_nt_acc(
            x1.as_slice::<T>()?,
            x2.as_slice::<T>()?,
            out.as_mut_slice::<T>()?,
            n,
            d,
            m,
        )?;
    });
    Ok(())
}

/// `out += X1 @ X2'` for CSR operands.
pub(crate) fn accumulate_sparse_inner_products(
    x1: &SparseMatrix,
    x2: &SparseMatrix,
    out: &mut Tensor,
) -> Result<()> {
    let [n, d] = x1.shape();
    let [m, d2] = x2.shape();
    check_features(d, d2)?;
    check_partial(out, n, m, x1.dtype())?;
    with_element!(x1.dtype(), T => {
        let dst = out.as_mut_slice::<T>()?;
        for i in 0..n {
            for j in 0..m {
                dst[i * m + j] += x1.row_dot::<T>(i, x2, j)?;
            }
        }
    });
    Ok(())
}

/// Squared row norms of a dense matrix as a `[rows, 1]` tensor.
pub(crate) fn sq_norms(x: &Tensor) -> Result<Tensor> {
    let (n, d) = x.matrix_dims()?;
    let norms = with_element!(x.dtype(), T => {
        let data = x.as_slice::<T>()?;
        let v: Vec<T> = (0..n)
            .map(|i| data[i * d..(i + 1) * d].iter().fold(T::zero(), |acc, &a| acc + a * a))
            .collect();
        Tensor::from_vec(v, [n, 1])?
    });
    Ok(norms.to_device(x.device()))
}

/// Squared row norms of a CSR matrix as a `[rows, 1]` tensor.
pub(crate) fn sparse_sq_norms(x: &SparseMatrix) -> Result<Tensor> {
    let n = x.nrows();
    let norms = with_element!(x.dtype(), T => {
        Tensor::from_vec(x.sq_row_norms::<T>()?, [n, 1])?
    });
    Ok(norms.to_device(x.device()))
}

/// A one-element parameter tensor of the given dtype.
pub(crate) fn scalar(value: f64, dtype: DType) -> Tensor {
    with_element!(dtype, T => { Tensor::new(vec![T::from_f64(value)], [1]) })
}

/// Reject parameters that are NaN or infinite.
pub(crate) fn check_finite(name: &str, value: f64) -> Result<()> {
    if !value.is_finite() {
        return Err(KernelError::InvalidParameter(format!(
            "{} must be finite, got {}",
            name, value
        )));
    }
    Ok(())
}
