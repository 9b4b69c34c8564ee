//! Call interface of the lazy-reduction engine.

use std::fmt::Debug;

use km_kernels::{KernelOptions, Result};
use km_tensor::Tensor;

/// How the formula is folded along the reduction axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reduction {
    Sum,
}

/// One symbolic `K(X1, X2) @ v` request.
///
/// The formula is evaluated for every `(i, j)` pair of rows of `x1` and `x2`
/// and reduced over `j` (`axis == 1`), so no `[N, M]` matrix is ever built.
#[derive(Debug, Clone, Copy)]
pub struct ReductionCall<'a> {
    pub x1: &'a Tensor,
    pub x2: &'a Tensor,
    pub v: &'a Tensor,
    /// Extra parameters bound to the aliases after `x1`, `x2`, `v`.
    pub other_vars: &'a [Tensor],
    pub formula: &'a str,
    pub aliases: &'a [String],
    pub axis: usize,
    pub reduction: Reduction,
}

/// An external engine that evaluates kernel-vector products from a formula.
pub trait ReductionEngine: Send + Sync + Debug {
    fn name(&self) -> &str;

    /// Evaluate `call` into `out` (shape `[rows(x1), cols(v)]`) if given,
    /// otherwise into a fresh tensor.
    fn run_mmv(
        &self,
        call: ReductionCall<'_>,
        out: Option<Tensor>,
        options: &KernelOptions,
    ) -> Result<Tensor>;
}
