//! Argument checks run before any backend is selected.
//!
//! Every public operation checks, in order: sparsity consistency of the
//! primary operands, presence of the vector operands (`dmmv`), ranks and
//! shapes, numeric type, and device placement. Nothing is written to the
//! output buffer unless all checks pass.

use std::borrow::Cow;

use km_kernels::{KernelError, Result};
use km_tensor::{DType, Device, Operand, Shape, Tensor};

/// Fails unless `X1` and `X2` are both dense or both sparse. Returns whether
/// they are sparse.
pub fn check_sparsity(x1: &Operand, x2: &Operand) -> Result<bool> {
    match (x1.is_sparse(), x2.is_sparse()) {
        (true, true) => Ok(true),
        (false, false) => Ok(false),
        _ => Err(KernelError::SparsityMismatch),
    }
}

fn matrix_dims(name: &str, x: &Operand) -> Result<(usize, usize)> {
    x.shape()
        .matrix_dims()
        .map_err(|_| KernelError::Shape(format!("matrix {} must be 2D, found {}D", name, x.ndim())))
}

fn primary_dims(x1: &Operand, x2: &Operand) -> Result<((usize, usize), (usize, usize))> {
    let a = matrix_dims("X1", x1)?;
    let b = matrix_dims("X2", x2)?;
    if a.1 != b.1 {
        return Err(KernelError::Shape(format!(
            "X1 and X2 must have the same number of features: found {} and {}",
            a.1, b.1
        )));
    }
    Ok((a, b))
}

/// Accept a vector as a single-column matrix; pass matrices through.
pub fn as_column_matrix<'a>(name: &str, t: &'a Tensor) -> Result<Cow<'a, Tensor>> {
    match t.ndim() {
        1 => {
            let n = t.shape().dim(0);
            Ok(Cow::Owned(t.reshape([n, 1])?))
        }
        2 => Ok(Cow::Borrowed(t)),
        d => Err(KernelError::Shape(format!(
            "{} must be a vector or a 2D matrix, found {}D",
            name, d
        ))),
    }
}

fn check_shape(what: &str, t: &Tensor, rows: usize, cols: usize) -> Result<()> {
    if t.shape().dims() != [rows, cols] {
        return Err(KernelError::Shape(format!(
            "{} is incorrect: expected {}, found {}",
            what,
            Shape::matrix(rows, cols),
            t.shape()
        )));
    }
    Ok(())
}

/// Fails unless every dtype equals the first one.
pub fn check_same_dtype(dtypes: impl IntoIterator<Item = DType>) -> Result<()> {
    let mut it = dtypes.into_iter();
    if let Some(first) = it.next() {
        if let Some(other) = it.find(|d| *d != first) {
            return Err(KernelError::DTypeMismatch {
                expected: first,
                got: other,
            });
        }
    }
    Ok(())
}

/// Fails unless every device equals the first one.
pub fn check_same_device(op: &str, devices: impl IntoIterator<Item = Device>) -> Result<()> {
    let mut it = devices.into_iter();
    if let Some(first) = it.next() {
        if it.any(|d| d != first) {
            return Err(KernelError::DeviceMismatch { op: op.to_string() });
        }
    }
    Ok(())
}

/// Checks for `K(X1, X2)`; `out` must be `[rows(X1), rows(X2)]`.
pub fn check_mm(x1: &Operand, x2: &Operand, out: Option<&Tensor>) -> Result<()> {
    check_sparsity(x1, x2)?;
    let ((n, _), (m, _)) = primary_dims(x1, x2)?;
    if let Some(out) = out {
        check_shape("output dimension", out, n, m)?;
    }
    let outs = out.into_iter();
    check_same_dtype([x1.dtype(), x2.dtype()].into_iter().chain(outs.clone().map(Tensor::dtype)))?;
    check_same_device("kernel", [x1.device(), x2.device()].into_iter().chain(outs.map(Tensor::device)))
}

/// Checks for `K(X1, X2) @ v`. Returns `v` as a 2D matrix.
pub fn check_mmv<'a>(
    x1: &Operand,
    x2: &Operand,
    v: &'a Tensor,
    out: Option<&Tensor>,
) -> Result<Cow<'a, Tensor>> {
    check_sparsity(x1, x2)?;
    let ((n, _), (m, _)) = primary_dims(x1, x2)?;
    let v = as_column_matrix("v", v)?;
    let t = v.shape().dim(1);
    if let Some(out) = out {
        check_shape("output dimension", out, n, t)?;
    }
    check_shape("dimension of matrix v", &v, m, t)?;

    let outs = out.into_iter();
    check_same_dtype(
        [x1.dtype(), x2.dtype(), v.dtype()]
            .into_iter()
            .chain(outs.clone().map(Tensor::dtype)),
    )?;
    check_same_device(
        "mmv",
        [x1.device(), x2.device(), v.device()]
            .into_iter()
            .chain(outs.map(Tensor::device)),
    )?;
    Ok(v)
}

/// Checks for `K(X1, X2)' @ (K(X1, X2) @ v + w)`. Returns `v` and `w` as 2D
/// matrices.
#[allow(clippy::type_complexity)]
pub fn check_dmmv<'a>(
    x1: &Operand,
    x2: &Operand,
    v: Option<&'a Tensor>,
    w: Option<&'a Tensor>,
    out: Option<&Tensor>,
) -> Result<(Option<Cow<'a, Tensor>>, Option<Cow<'a, Tensor>>)> {
    check_sparsity(x1, x2)?;
    if v.is_none() && w.is_none() {
        return Err(KernelError::MissingOperand);
    }
    let ((n, _), (m, _)) = primary_dims(x1, x2)?;
    let v = v.map(|v| as_column_matrix("v", v)).transpose()?;
    let w = w.map(|w| as_column_matrix("w", w)).transpose()?;

    let t = match (&v, &w) {
        (Some(v), _) => v.shape().dim(1),
        (None, Some(w)) => w.shape().dim(1),
        (None, None) => return Err(KernelError::MissingOperand),
    };
    if let Some(out) = out {
        check_shape("output dimension", out, m, t)?;
    }
    if let Some(v) = &v {
        check_shape("dimension of matrix v", v, m, t)?;
    }
    if let Some(w) = &w {
        check_shape("dimension of matrix w", w, n, t)?;
    }

    let vw = v.iter().chain(w.iter());
    let outs = out.into_iter();
    check_same_dtype(
        [x1.dtype(), x2.dtype()]
            .into_iter()
            .chain(vw.clone().map(|t| t.dtype()))
            .chain(outs.clone().map(Tensor::dtype)),
    )?;
    check_same_device(
        "dmmv",
        [x1.device(), x2.device()]
            .into_iter()
            .chain(vw.map(|t| t.device()))
            .chain(outs.map(Tensor::device)),
    )?;
    Ok((v, w))
}
