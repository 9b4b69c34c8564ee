use km_tensor::{with_element, DType, Element, SparseMatrix, Tensor};

use crate::error::Result;
use crate::kernel::{
    accumulate_inner_products, accumulate_sparse_inner_products, check_finite, scalar, Kernel,
    KernelContext, KernelKind, ReductionFormula,
};
use crate::options::KernelOptions;

/// Linear kernel: `k(x, y) = beta + gamma * <x, y>`.
#[derive(Debug, Clone)]
pub struct LinearKernel {
    beta: f64,
    gamma: f64,
    options: KernelOptions,
}

impl LinearKernel {
    pub fn new(beta: f64, gamma: f64) -> Result<Self> {
        check_finite("beta", beta)?;
        check_finite("gamma", gamma)?;
        Ok(Self {
            beta,
            gamma,
            options: KernelOptions::default(),
        })
    }

    /// Returns this kernel with a different default policy.
    pub fn with_options(self, options: KernelOptions) -> Self {
        Self { options, ..self }
    }
}

impl Kernel for LinearKernel {
    fn name(&self) -> &str {
        "linear"
    }

    fn kind(&self) -> KernelKind {
        KernelKind::DotProduct
    }

    fn options(&self) -> &KernelOptions {
        &self.options
    }

    fn prepare(&self, _x1: &Tensor, _x2: &Tensor) -> Result<KernelContext> {
        Ok(KernelContext::default())
    }

    fn apply(&self, x1: &Tensor, x2: &Tensor, out: &mut Tensor) -> Result<()> {
        accumulate_inner_products(x1, x2, out)
    }

    fn finalize(&self, mut partial: Tensor, _ctx: &KernelContext) -> Result<Tensor> {
        with_element!(partial.dtype(), T => {
            let (beta, gamma) = (T::from_f64(self.beta), T::from_f64(self.gamma));
            for x in partial.as_mut_slice::<T>()? {
                *x = beta + gamma * *x;
            }
        });
        Ok(partial)
    }

    fn prepare_sparse(&self, _x1: &SparseMatrix, _x2: &SparseMatrix) -> Result<KernelContext> {
        Ok(KernelContext::default())
    }

    fn apply_sparse(&self, x1: &SparseMatrix, x2: &SparseMatrix, out: &mut Tensor) -> Result<()> {
        accumulate_sparse_inner_products(x1, x2, out)
    }

    fn reduction_formula(
        &self,
        features: usize,
        outputs: usize,
        dtype: DType,
    ) -> Option<ReductionFormula> {
        Some(ReductionFormula {
            formula: "(b + g * (x1 | x2)) * v".to_string(),
            aliases: vec![
                format!("x1 = Vi({})", features),
                format!("x2 = Vj({})", features),
                format!("v = Vj({})", outputs),
                "b = Pm(1)".to_string(),
                "g = Pm(1)".to_string(),
            ],
            other_vars: vec![scalar(self.beta, dtype), scalar(self.gamma, dtype)],
        })
    }
}
