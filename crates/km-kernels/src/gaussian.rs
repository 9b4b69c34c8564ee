use km_tensor::{with_element, DType, Element, SparseMatrix, Tensor};

use crate::error::{KernelError, Result};
use crate::kernel::{
    accumulate_inner_products, accumulate_sparse_inner_products, check_finite, scalar,
    sparse_sq_norms, sq_norms, Kernel, KernelContext, KernelKind, ReductionFormula,
};
use crate::options::KernelOptions;

/// Gaussian (RBF) kernel: `k(x, y) = exp(-||x - y||^2 / (2 sigma^2))`.
#[derive(Debug, Clone)]
pub struct GaussianKernel {
    sigma: f64,
    options: KernelOptions,
}

impl GaussianKernel {
    /// Create a Gaussian kernel with length scale `sigma`.
    ///
    /// # Errors
    /// Returns `InvalidParameter` unless `sigma` is finite and positive.
    pub fn new(sigma: f64) -> Result<Self> {
        check_finite("sigma", sigma)?;
        if sigma <= 0.0 {
            return Err(KernelError::InvalidParameter(format!(
                "sigma must be positive, got {}",
                sigma
            )));
        }
        Ok(Self {
            sigma,
            options: KernelOptions::default(),
        })
    }

    /// Returns this kernel with a different default policy.
    pub fn with_options(self, options: KernelOptions) -> Self {
        Self { options, ..self }
    }

    pub fn sigma(&self) -> f64 {
        self.sigma
    }

    fn gamma(&self) -> f64 {
        1.0 / (2.0 * self.sigma * self.sigma)
    }
}

/// `a[i, j] <- exp(-gamma * max(n1[i] + n2[j] - 2 a[i, j], 0))`
fn rbf_finalize<T: Element>(a: &mut [T], n1: &[T], n2: &[T], gamma: f64) {
    let m = n2.len();
    let two = T::from_f64(2.0);
    let neg_gamma = T::from_f64(-gamma);
    for (i, row) in a.chunks_mut(m.max(1)).enumerate().take(n1.len()) {
        for (j, x) in row.iter_mut().enumerate() {
            let d = (n1[i] + n2[j] - two * *x).max(T::zero());
            *x = (neg_gamma * d).exp();
        }
    }
}

impl Kernel for GaussianKernel {
    fn name(&self) -> &str {
        "gaussian"
    }

    fn kind(&self) -> KernelKind {
        KernelKind::Distance
    }

    fn options(&self) -> &KernelOptions {
        &self.options
    }

    fn prepare(&self, x1: &Tensor, x2: &Tensor) -> Result<KernelContext> {
        Ok(KernelContext {
            lhs: Some(sq_norms(x1)?),
            rhs: Some(sq_norms(x2)?),
        })
    }

    fn apply(&self, x1: &Tensor, x2: &Tensor, out: &mut Tensor) -> Result<()> {
        accumulate_inner_products(x1, x2, out)
    }

    fn finalize(&self, mut partial: Tensor, ctx: &KernelContext) -> Result<Tensor> {
        let (n1, n2) = match (&ctx.lhs, &ctx.rhs) {
            (Some(l), Some(r)) => (l, r),
            _ => {
                return Err(KernelError::InvalidParameter(
                    "gaussian finalize requires squared norms from prepare".to_string(),
                ))
            }
        };
        let (n, m) = partial.matrix_dims()?;
        if n1.shape().numel() != n || n2.shape().numel() != m {
            return Err(KernelError::Shape(format!(
                "norms of length {} and {} do not match partial result {}",
                n1.shape().numel(),
                n2.shape().numel(),
                partial.shape()
            )));
        }
        let gamma = self.gamma();
        with_element!(partial.dtype(), T => {
            let (l, r) = (n1.as_slice::<T>()?, n2.as_slice::<T>()?);
            rbf_finalize(partial.as_mut_slice::<T>()?, l, r, gamma);
        });
        Ok(partial)
    }

    fn prepare_sparse(&self, x1: &SparseMatrix, x2: &SparseMatrix) -> Result<KernelContext> {
        Ok(KernelContext {
            lhs: Some(sparse_sq_norms(x1)?),
            rhs: Some(sparse_sq_norms(x2)?),
        })
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
            formula: "Exp(g * SqDist(x1, x2)) * v".to_string(),
            aliases: vec![
                format!("x1 = Vi({})", features),
                format!("x2 = Vj({})", features),
                format!("v = Vj({})", outputs),
                "g = Pm(1)".to_string(),
            ],
            other_vars: vec![scalar(-self.gamma(), dtype)],
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn eval(k: &GaussianKernel, x1: &Tensor, x2: &Tensor) -> Tensor {
        let ctx = k.prepare(x1, x2).unwrap();
        let n = x1.matrix_dims().unwrap().0;
        let m = x2.matrix_dims().unwrap().0;
        let mut out = Tensor::zeros(x1.dtype(), [n, m], x1.device());
        k.apply(x1, x2, &mut out).unwrap();
        k.finalize(out, &ctx).unwrap()
    }

    #[test]
    fn test_invalid_sigma() {
        assert!(GaussianKernel::new(0.0).is_err());
        assert!(GaussianKernel::new(-1.0).is_err());
        assert!(GaussianKernel::new(f64::NAN).is_err());
    }

    #[test]
    fn test_values() {
        let k = GaussianKernel::new(1.0).unwrap();
        let x1 = Tensor::new(vec![0.0f64, 0.0, 1.0, 1.0], [2, 2]);
        let x2 = Tensor::new(vec![0.0f64, 1.0], [1, 2]);
        let kx = eval(&k, &x1, &x2);
        let v = kx.as_slice::<f64>().unwrap();
        // ||(0,0)-(0,1)||^2 = 1, ||(1,1)-(0,1)||^2 = 1
        assert_relative_eq!(v[0], (-0.5f64).exp(), epsilon = 1e-12);
        assert_relative_eq!(v[1], (-0.5f64).exp(), epsilon = 1e-12);
    }

    #[test]
    fn test_diagonal_is_one() {
        let k = GaussianKernel::new(0.7).unwrap();
        let x = Tensor::new(vec![0.3f32, -1.2, 2.0, 0.5, 4.0, -3.0], [3, 2]);
        let kx = eval(&k, &x, &x);
        let v = kx.as_slice::<f32>().unwrap();
        for i in 0..3 {
            assert_relative_eq!(v[i * 3 + i], 1.0, epsilon = 1e-5);
        }
    }

    #[test]
    fn test_sparse_matches_dense() {
        let k = GaussianKernel::new(2.0).unwrap();
        let x1 = Tensor::new(vec![1.0f64, 0.0, 2.0, 0.0, 0.0, 3.0], [2, 3]);
        let x2 = Tensor::new(vec![0.0f64, 4.0, 0.0, 1.0, 1.0, 0.0, 0.0, 0.0, 5.0], [3, 3]);
        let dense = eval(&k, &x1, &x2);

        let s1 = SparseMatrix::from_dense(&x1).unwrap();
        let s2 = SparseMatrix::from_dense(&x2).unwrap();
        let ctx = k.prepare_sparse(&s1, &s2).unwrap();
        let mut out = Tensor::zeros(DType::F64, [2, 3], Default::default());
        k.apply_sparse(&s1, &s2, &mut out).unwrap();
        let sparse = k.finalize(out, &ctx).unwrap();

        for (a, b) in dense
            .as_slice::<f64>()
            .unwrap()
            .iter()
            .zip(sparse.as_slice::<f64>().unwrap())
        {
            assert_relative_eq!(a, b, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_finalize_without_context_fails() {
        let k = GaussianKernel::new(1.0).unwrap();
        let out = Tensor::zeros(DType::F32, [1, 1], Default::default());
        assert!(k.finalize(out, &KernelContext::default()).is_err());
    }

    #[test]
    fn test_reduction_formula() {
        let k = GaussianKernel::new(1.0).unwrap();
        let f = k.reduction_formula(10, 3, DType::F32).unwrap();
        assert_eq!(f.aliases[0], "x1 = Vi(10)");
        assert_eq!(f.aliases[2], "v = Vj(3)");
        assert_eq!(f.other_vars[0].as_slice::<f32>().unwrap(), &[-0.5]);
    }

    #[test]
    fn test_with_options() {
        let opts = KernelOptions {
            use_cpu: true,
            ..KernelOptions::default()
        };
        let k = GaussianKernel::new(1.0).unwrap().with_options(opts.clone());
        assert_eq!(k.options(), &opts);
        assert_eq!(k.sigma(), 1.0);
    }
}
