use km_tensor::{with_element, Element, Tensor};

use crate::error::{KernelError, Result};
use crate::kernel::{accumulate_inner_products, check_finite, Kernel, KernelContext, KernelKind};
use crate::options::KernelOptions;

/// Polynomial kernel: `k(x, y) = (alpha * <x, y> + beta)^degree`.
///
/// Dense operands only.
#[derive(Debug, Clone)]
pub struct PolynomialKernel {
    alpha: f64,
    beta: f64,
    degree: f64,
    options: KernelOptions,
}

impl PolynomialKernel {
    pub fn new(alpha: f64, beta: f64, degree: f64) -> Result<Self> {
        check_finite("alpha", alpha)?;
        check_finite("beta", beta)?;
        check_finite("degree", degree)?;
        if degree <= 0.0 {
            return Err(KernelError::InvalidParameter(format!(
                "degree must be positive, got {}",
                degree
            )));
        }
        Ok(Self {
            alpha,
            beta,
            degree,
            options: KernelOptions::default(),
        })
    }

    /// Returns this kernel with a different default policy.
    pub fn with_options(self, options: KernelOptions) -> Self {
        Self { options, ..self }
    }
}

impl Kernel for PolynomialKernel {
    fn name(&self) -> &str {
        "polynomial"
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
            let alpha = T::from_f64(self.alpha);
            let beta = T::from_f64(self.beta);
            let degree = T::from_f64(self.degree);
            for x in partial.as_mut_slice::<T>()? {
                *x = (alpha * *x + beta).powf(degree);
            }
        });
        Ok(partial)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use km_tensor::{DType, SparseMatrix};

    #[test]
    fn test_values() {
        let k = PolynomialKernel::new(1.0, 1.0, 2.0).unwrap();
        let x = Tensor::new(vec![1.0f64, 2.0], [1, 2]);
        let ctx = k.prepare(&x, &x).unwrap();
        let mut out = Tensor::zeros(DType::F64, [1, 1], Default::default());
        k.apply(&x, &x, &mut out).unwrap();
        // (5 + 1)^2
        assert_eq!(k.finalize(out, &ctx).unwrap().as_slice::<f64>().unwrap(), &[36.0]);
    }

    #[test]
    fn test_sparse_not_supported() {
        let k = PolynomialKernel::new(1.0, 0.0, 3.0).unwrap();
        let x = SparseMatrix::from_dense(&Tensor::new(vec![1.0f32], [1, 1])).unwrap();
        let err = k.prepare_sparse(&x, &x).unwrap_err();
        assert!(err.to_string().contains("polynomial"));
        assert!(err.to_string().contains("prepare_sparse"));
    }

    #[test]
    fn test_rejects_bad_degree() {
        assert!(PolynomialKernel::new(1.0, 0.0, 0.0).is_err());
        assert!(PolynomialKernel::new(1.0, 0.0, -2.0).is_err());
    }
}
