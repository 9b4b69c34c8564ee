// Row-block drivers shared by the dense and sparse CPU paths.
//
// Each driver walks X1 in blocks of `cpu_block_rows` rows, evaluates the
// kernel block `K(X1[s..e], X2)` through the three-stage protocol and folds
// it into the result. Only one block of the kernel matrix per worker is
// alive at a time for `fmmv` and `fdmmv`.

use std::borrow::Cow;

use km_tensor::{cpu, with_element, DType, Device, Element, SparseMatrix, Tensor};
use rayon::prelude::*;

use crate::error::{KernelError, Result};
use crate::kernel::Kernel;
use crate::options::KernelOptions;

/// A pair of operands that can produce kernel blocks along the rows of X1.
pub(crate) trait BlockSource: Sync {
    /// Rows of X1.
    fn rows(&self) -> usize;
    /// Rows of X2.
    fn cols(&self) -> usize;
    fn dtype(&self) -> DType;
    fn device(&self) -> Device;
    /// `K(X1[start..end], X2)` as a `[end - start, cols()]` tensor.
    fn block(&self, kernel: &dyn Kernel, start: usize, end: usize) -> Result<Tensor>;
}

pub(crate) struct DensePair<'a> {
    pub x1: &'a Tensor,
    pub x2: &'a Tensor,
}

pub(crate) struct SparsePair<'a> {
    pub x1: &'a SparseMatrix,
    pub x2: &'a SparseMatrix,
}

impl BlockSource for DensePair<'_> {
    fn rows(&self) -> usize {
        self.x1.shape().dim(0)
    }

    fn cols(&self) -> usize {
        self.x2.shape().dim(0)
    }

    fn dtype(&self) -> DType {
        self.x1.dtype()
    }

    fn device(&self) -> Device {
        self.x1.device()
    }

    fn block(&self, kernel: &dyn Kernel, start: usize, end: usize) -> Result<Tensor> {
        let x1 = if start == 0 && end == self.rows() {
            Cow::Borrowed(self.x1)
        } else {
            Cow::Owned(self.x1.rows(start, end)?)
        };
        let ctx = kernel.prepare(&x1, self.x2)?;
        let mut partial = Tensor::zeros(self.dtype(), [end - start, self.cols()], self.device());
        kernel.apply(&x1, self.x2, &mut partial)?;
        kernel.finalize(partial, &ctx)
    }
}

impl BlockSource for SparsePair<'_> {
    fn rows(&self) -> usize {
        self.x1.nrows()
    }

    fn cols(&self) -> usize {
        self.x2.nrows()
    }

    fn dtype(&self) -> DType {
        self.x1.dtype()
    }

    fn device(&self) -> Device {
        self.x1.device()
    }

    fn block(&self, kernel: &dyn Kernel, start: usize, end: usize) -> Result<Tensor> {
        let x1 = if start == 0 && end == self.rows() {
            Cow::Borrowed(self.x1)
        } else {
            Cow::Owned(self.x1.rows(start, end)?)
        };
        let ctx = kernel.prepare_sparse(&x1, self.x2)?;
        let mut partial = Tensor::zeros(self.dtype(), [end - start, self.cols()], self.device());
        kernel.apply_sparse(&x1, self.x2, &mut partial)?;
        kernel.finalize(partial, &ctx)
    }
}

/// Use the caller's buffer if given, after checking it, else allocate.
fn output_buffer(
    out: Option<Tensor>,
    dtype: DType,
    dims: [usize; 2],
    device: Device,
) -> Result<Tensor> {
    match out {
        Some(out) => {
            if out.shape().dims() != dims {
                return Err(KernelError::Shape(format!(
                    "output dimension is incorrect: expected {:?}, found {}",
                    dims,
                    out.shape()
                )));
            }
            if out.dtype() != dtype {
                return Err(KernelError::DTypeMismatch {
                    expected: dtype,
                    got: out.dtype(),
                });
            }
            Ok(out)
        }
        None => Ok(Tensor::zeros(dtype, dims, device)),
    }
}

/// Rows per block, clamped to `1..=max(rows, 1)`.
fn block_rows(options: &KernelOptions, rows: usize) -> usize {
    options.block_rows().min(rows.max(1))
}

fn block_range(bi: usize, block: usize, rows: usize) -> (usize, usize) {
    let start = bi.saturating_mul(block).min(rows);
    (start, start.saturating_add(block).min(rows))
}

/// Trailing dimension of a `[rows, t]` right-hand side.
fn outputs(t: &Tensor) -> Result<usize> {
    Ok(t.matrix_dims()?.1)
}

pub(crate) fn run_fmm<S: BlockSource>(
    src: &S,
    kernel: &dyn Kernel,
    out: Option<Tensor>,
    options: &KernelOptions,
) -> Result<Tensor> {
    let (n, m) = (src.rows(), src.cols());
    let block = block_rows(options, n);
    let mut out = output_buffer(out, src.dtype(), [n, m], src.device())?;
    tracing::debug!(kernel = kernel.name(), n, m, block, "cpu fmm");

    with_element!(src.dtype(), T => {
        out.as_mut_slice::<T>()?
            .par_chunks_mut(block.saturating_mul(m).max(1))
            .enumerate()
            .try_for_each(|(bi, chunk)| -> Result<()> {
                let (start, end) = block_range(bi, block, n);
                let k = src.block(kernel, start, end)?;
                chunk.copy_from_slice(k.as_slice::<T>()?);
                Ok(())
            })?;
    });
    Ok(out)
}

pub(crate) fn run_fmmv<S: BlockSource>(
    src: &S,
    v: &Tensor,
    kernel: &dyn Kernel,
    out: Option<Tensor>,
    options: &KernelOptions,
) -> Result<Tensor> {
    let (n, m) = (src.rows(), src.cols());
    let t = outputs(v)?;
    let block = block_rows(options, n);
    let mut out = output_buffer(out, src.dtype(), [n, t], src.device())?;
    tracing::debug!(kernel = kernel.name(), n, m, t, block, "cpu fmmv");

    with_element!(src.dtype(), T => {
        let v = v.as_slice::<T>()?;
        out.as_mut_slice::<T>()?
            .par_chunks_mut(block.saturating_mul(t).max(1))
            .enumerate()
            .try_for_each(|(bi, chunk)| -> Result<()> {
                let (start, end) = block_range(bi, block, n);
                let k = src.block(kernel, start, end)?;
                let kv = cpu::matmul(k.as_slice::<T>()?, v, end - start, m, t)?;
                chunk.copy_from_slice(&kv);
                Ok(())
            })?;
    });
    Ok(out)
}

pub(crate) fn run_fdmmv<S: BlockSource>(
    src: &S,
    v: Option<&Tensor>,
    w: Option<&Tensor>,
    kernel: &dyn Kernel,
    out: Option<Tensor>,
    options: &KernelOptions,
) -> Result<Tensor> {
    let (n, m) = (src.rows(), src.cols());
    let t = match (v, w) {
        (Some(v), _) => outputs(v)?,
        (None, Some(w)) => outputs(w)?,
        (None, None) => return Err(KernelError::MissingOperand),
    };
    let block = block_rows(options, n);
    let n_blocks = n.div_ceil(block);
    let mut out = output_buffer(out, src.dtype(), [m, t], src.device())?;
    tracing::debug!(kernel = kernel.name(), n, m, t, block, n_blocks, "cpu fdmmv");

    with_element!(src.dtype(), T => {
        let v = v.map(|v| v.as_slice::<T>()).transpose()?;
        let w = w.map(|w| w.as_slice::<T>()).transpose()?;
        let total = (0..n_blocks)
            .into_par_iter()
            .map(|bi| -> Result<Vec<T>> {
                let (start, end) = block_range(bi, block, n);
                let rows = end - start;
                let k = src.block(kernel, start, end)?;
                let k = k.as_slice::<T>()?;
                // inner = K_b @ v + w_b
                let mut inner = match v {
                    Some(v) => cpu::matmul(k, v, rows, m, t)?,
                    None => vec![T::zero(); rows * t],
                };
                if let Some(w) = w {
                    for (a, &b) in inner.iter_mut().zip(&w[start * t..end * t]) {
                        *a += b;
                    }
                }
                let mut partial = vec![T::zero(); m * t];
                cpu::matmul_tn_acc(k, &inner, &mut partial, rows, m, t)?;
                Ok(partial)
            })
            .try_reduce(
                || vec![T::zero(); m * t],
                |mut acc, part| {
                    for (a, b) in acc.iter_mut().zip(part) {
                        *a += b;
                    }
                    Ok(acc)
                },
            )?;
        out.as_mut_slice::<T>()?.copy_from_slice(&total);
    });
    Ok(out)
}
