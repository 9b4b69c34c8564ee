mod blocks;

use km_tensor::{Device, SparseMatrix, Tensor};

use crate::backend::KernelBackend;
use crate::error::{KernelError, Result};
use crate::kernel::Kernel;
use crate::options::KernelOptions;
use blocks::{run_fdmmv, run_fmm, run_fmmv, DensePair, SparsePair};

/// Host backend evaluating kernels in row blocks with rayon.
///
/// Operands must be tagged [`Device::Cpu`].
#[derive(Debug, Clone)]
pub struct CpuBackend;

impl CpuBackend {
    pub fn new() -> Self {
        CpuBackend
    }

    fn ensure_host(&self, devices: impl IntoIterator<Item = Device>) -> Result<()> {
        for device in devices {
            if device != Device::Cpu {
                return Err(KernelError::UnsupportedDevice {
                    backend: self.name().to_string(),
                    device,
                });
            }
        }
        Ok(())
    }
}

impl Default for CpuBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl KernelBackend for CpuBackend {
    fn name(&self) -> &str {
        "cpu"
    }

    fn fmm(
        &self,
        x1: &Tensor,
        x2: &Tensor,
        kernel: &dyn Kernel,
        out: Option<Tensor>,
        options: &KernelOptions,
    ) -> Result<Tensor> {
        self.ensure_host([x1.device(), x2.device()])?;
        run_fmm(&DensePair { x1, x2 }, kernel, out, options)
    }

    fn fmm_sparse(
        &self,
        x1: &SparseMatrix,
        x2: &SparseMatrix,
        kernel: &dyn Kernel,
        out: Option<Tensor>,
        options: &KernelOptions,
    ) -> Result<Tensor> {
        self.ensure_host([x1.device(), x2.device()])?;
        run_fmm(&SparsePair { x1, x2 }, kernel, out, options)
    }

    fn fmmv(
        &self,
        x1: &Tensor,
        x2: &Tensor,
        v: &Tensor,
        kernel: &dyn Kernel,
        out: Option<Tensor>,
        options: &KernelOptions,
    ) -> Result<Tensor> {
        self.ensure_host([x1.device(), x2.device(), v.device()])?;
        run_fmmv(&DensePair { x1, x2 }, v, kernel, out, options)
    }

    fn fmmv_sparse(
        &self,
        x1: &SparseMatrix,
        x2: &SparseMatrix,
        v: &Tensor,
        kernel: &dyn Kernel,
        out: Option<Tensor>,
        options: &KernelOptions,
    ) -> Result<Tensor> {
        self.ensure_host([x1.device(), x2.device(), v.device()])?;
        run_fmmv(&SparsePair { x1, x2 }, v, kernel, out, options)
    }

    fn fdmmv(
        &self,
        x1: &Tensor,
        x2: &Tensor,
        v: Option<&Tensor>,
        w: Option<&Tensor>,
        kernel: &dyn Kernel,
        out: Option<Tensor>,
        options: &KernelOptions,
    ) -> Result<Tensor> {
        let vw = v.iter().chain(w.iter()).map(|t| t.device());
        self.ensure_host([x1.device(), x2.device()].into_iter().chain(vw))?;
        run_fdmmv(&DensePair { x1, x2 }, v, w, kernel, out, options)
    }

    fn fdmmv_sparse(
        &self,
        x1: &SparseMatrix,
        x2: &SparseMatrix,
        v: Option<&Tensor>,
        w: Option<&Tensor>,
        kernel: &dyn Kernel,
        out: Option<Tensor>,
        options: &KernelOptions,
    ) -> Result<Tensor> {
        let vw = v.iter().chain(w.iter()).map(|t| t.device());
        self.ensure_host([x1.device(), x2.device()].into_iter().chain(vw))?;
        run_fdmmv(&SparsePair { x1, x2 }, v, w, kernel, out, options)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gaussian::GaussianKernel;
    use crate::linear::LinearKernel;
    use crate::polynomial::PolynomialKernel;
    use approx::assert_relative_eq;
    use km_tensor::DType;

    fn backend() -> CpuBackend {
        CpuBackend::new()
    }

    fn opts(block: usize) -> KernelOptions {
        KernelOptions {
            cpu_block_rows: block,
            ..KernelOptions::default()
        }
    }

    /// Deterministic pseudo-random matrix with entries in [-1, 1).
    fn matrix(rows: usize, cols: usize, seed: u64) -> Tensor {
        let mut state = seed.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
        let data: Vec<f64> = (0..rows * cols)
            .map(|_| {
                state = state
                    .wrapping_mul(6364136223846793005)
                    .wrapping_add(1442695040888963407);
                ((state >> 11) as f64 / (1u64 << 53) as f64) * 2.0 - 1.0
            })
            .collect();
        Tensor::new(data, [rows, cols])
    }

    fn assert_close(a: &Tensor, b: &Tensor) {
        assert_eq!(a.shape(), b.shape());
        for (x, y) in a
            .as_slice::<f64>()
            .unwrap()
            .iter()
            .zip(b.as_slice::<f64>().unwrap())
        {
            assert_relative_eq!(x, y, epsilon = 1e-10, max_relative = 1e-10);
        }
    }

    fn transpose(t: &Tensor) -> Tensor {
        let (r, c) = t.matrix_dims().unwrap();
        let d = t.as_slice::<f64>().unwrap();
        let mut out = vec![0.0; r * c];
        for i in 0..r {
            for j in 0..c {
                out[j * r + i] = d[i * c + j];
            }
        }
        Tensor::new(out, [c, r])
    }

    fn dense_product(a: &Tensor, b: &Tensor) -> Tensor {
        let (m, k) = a.matrix_dims().unwrap();
        let (_, n) = b.matrix_dims().unwrap();
        let c = km_tensor::cpu::matmul(
            a.as_slice::<f64>().unwrap(),
            b.as_slice::<f64>().unwrap(),
            m,
            k,
            n,
        )
        .unwrap();
        Tensor::new(c, [m, n])
    }

    #[test]
    fn test_fmm_block_size_does_not_matter() {
        let k = GaussianKernel::new(1.5).unwrap();
        let x1 = matrix(37, 4, 1);
        let x2 = matrix(11, 4, 2);
        let whole = backend().fmm(&x1, &x2, &k, None, &opts(1000)).unwrap();
        let blocked = backend().fmm(&x1, &x2, &k, None, &opts(5)).unwrap();
        assert_eq!(whole.shape().dims(), &[37, 11]);
        assert_close(&whole, &blocked);
    }

    #[test]
    fn test_huge_block_size_is_clamped() {
        let k = GaussianKernel::new(1.5).unwrap();
        let x1 = matrix(5, 3, 1);
        let x2 = matrix(2, 3, 2);
        let v = matrix(2, 2, 3);
        let w = matrix(5, 2, 4);
        let huge = opts(usize::MAX);

        assert_close(
            &backend().fmm(&x1, &x2, &k, None, &huge).unwrap(),
            &backend().fmm(&x1, &x2, &k, None, &opts(2)).unwrap(),
        );
        assert_close(
            &backend().fmmv(&x1, &x2, &v, &k, None, &huge).unwrap(),
            &backend().fmmv(&x1, &x2, &v, &k, None, &opts(2)).unwrap(),
        );
        assert_close(
            &backend().fdmmv(&x1, &x2, Some(&v), Some(&w), &k, None, &huge).unwrap(),
            &backend().fdmmv(&x1, &x2, Some(&v), Some(&w), &k, None, &opts(2)).unwrap(),
        );

        let ov: crate::options::OptionsOverride =
            serde_json::from_str(r#"{"cpu_block_rows": 9223372036854775808}"#).unwrap();
        let parsed = KernelOptions::default().with_overrides(&ov);
        assert_eq!(backend().fmm(&x1, &x2, &k, None, &parsed).unwrap().shape().dims(), &[5, 2]);
    }

    #[test]
    fn test_fmmv_matches_fmm_times_v() {
        let k = GaussianKernel::new(0.8).unwrap();
        let x1 = matrix(23, 3, 3);
        let x2 = matrix(17, 3, 4);
        let v = matrix(17, 2, 5);
        let kmat = backend().fmm(&x1, &x2, &k, None, &opts(7)).unwrap();
        let kv = backend().fmmv(&x1, &x2, &v, &k, None, &opts(7)).unwrap();
        assert_close(&kv, &dense_product(&kmat, &v));
    }

    #[test]
    fn test_fdmmv_matches_explicit_formula() {
        let k = LinearKernel::new(0.5, 0.25).unwrap();
        let x1 = matrix(19, 5, 6);
        let x2 = matrix(13, 5, 7);
        let v = matrix(13, 3, 8);
        let w = matrix(19, 3, 9);
        let kmat = backend().fmm(&x1, &x2, &k, None, &opts(4)).unwrap();
        let mut inner = dense_product(&kmat, &v);
        inner.add_assign(&w).unwrap();
        let expected = dense_product(&transpose(&kmat), &inner);

        let got = backend()
            .fdmmv(&x1, &x2, Some(&v), Some(&w), &k, None, &opts(4))
            .unwrap();
        assert_eq!(got.shape().dims(), &[13, 3]);
        assert_close(&got, &expected);
    }

    #[test]
    fn test_fdmmv_single_terms() {
        let k = GaussianKernel::new(1.0).unwrap();
        let x1 = matrix(9, 2, 10);
        let x2 = matrix(6, 2, 11);
        let v = matrix(6, 1, 12);
        let w = matrix(9, 1, 13);
        let kmat = backend().fmm(&x1, &x2, &k, None, &opts(4)).unwrap();
        let kt = transpose(&kmat);

        let only_w = backend().fdmmv(&x1, &x2, None, Some(&w), &k, None, &opts(4)).unwrap();
        assert_close(&only_w, &dense_product(&kt, &w));

        let only_v = backend().fdmmv(&x1, &x2, Some(&v), None, &k, None, &opts(4)).unwrap();
        assert_close(&only_v, &dense_product(&kt, &dense_product(&kmat, &v)));

        assert!(matches!(
            backend().fdmmv(&x1, &x2, None, None, &k, None, &opts(4)),
            Err(KernelError::MissingOperand)
        ));
    }

    #[test]
    fn test_sparse_paths_match_dense() {
        let k = GaussianKernel::new(1.2).unwrap();
        let x1 = Tensor::new(
            vec![1.0f64, 0.0, 0.0, 2.0, 0.0, 3.0, 0.0, 0.0, 0.5, 0.0, 1.0, 0.0],
            [4, 3],
        );
        let x2 = Tensor::new(vec![0.0f64, 1.0, 1.0, 2.0, 0.0, 0.0], [2, 3]);
        let v = Tensor::new(vec![1.0f64, -1.0], [2, 1]);
        let w = Tensor::new(vec![0.5f64, 0.0, 1.0, 2.0], [4, 1]);
        let s1 = SparseMatrix::from_dense(&x1).unwrap();
        let s2 = SparseMatrix::from_dense(&x2).unwrap();
        let o = opts(3);

        assert_close(
            &backend().fmm_sparse(&s1, &s2, &k, None, &o).unwrap(),
            &backend().fmm(&x1, &x2, &k, None, &o).unwrap(),
        );
        assert_close(
            &backend().fmmv_sparse(&s1, &s2, &v, &k, None, &o).unwrap(),
            &backend().fmmv(&x1, &x2, &v, &k, None, &o).unwrap(),
        );
        assert_close(
            &backend()
                .fdmmv_sparse(&s1, &s2, Some(&v), Some(&w), &k, None, &o)
                .unwrap(),
            &backend().fdmmv(&x1, &x2, Some(&v), Some(&w), &k, None, &o).unwrap(),
        );
    }

    #[test]
    fn test_sparse_unsupported_kernel() {
        let k = PolynomialKernel::new(1.0, 1.0, 2.0).unwrap();
        let s = SparseMatrix::from_dense(&Tensor::new(vec![1.0f64, 0.0], [1, 2])).unwrap();
        let err = backend()
            .fmm_sparse(&s, &s, &k, None, &KernelOptions::default())
            .unwrap_err();
        assert!(matches!(err, KernelError::NotImplemented { .. }));
    }

    #[test]
    fn test_writes_into_given_buffer() {
        let k = GaussianKernel::new(1.0).unwrap();
        let x1 = matrix(5, 2, 14);
        let x2 = matrix(4, 2, 15);
        let v = matrix(4, 2, 16);
        let out = Tensor::zeros(DType::F64, [5, 2], Device::Cpu);
        let ptr = out.data_ptr();
        let res = backend()
            .fmmv(&x1, &x2, &v, &k, Some(out), &KernelOptions::default())
            .unwrap();
        assert_eq!(res.data_ptr(), ptr);
    }

    #[test]
    fn test_rejects_wrong_buffer() {
        let k = GaussianKernel::new(1.0).unwrap();
        let x1 = matrix(5, 2, 17);
        let out = Tensor::zeros(DType::F64, [4, 5], Device::Cpu);
        assert!(matches!(
            backend().fmm(&x1, &x1, &k, Some(out), &KernelOptions::default()),
            Err(KernelError::Shape(_))
        ));
    }

    #[test]
    fn test_rejects_gpu_operands() {
        let k = GaussianKernel::new(1.0).unwrap();
        let x1 = matrix(2, 2, 18).to_device(Device::Gpu(0));
        let err = backend()
            .fmm(&x1, &x1, &k, None, &KernelOptions::default())
            .unwrap_err();
        assert!(matches!(
            err,
            KernelError::UnsupportedDevice {
                device: Device::Gpu(0),
                ..
            }
        ));
    }

    #[test]
    fn test_f32_path() {
        let k = LinearKernel::new(0.0, 1.0).unwrap();
        let x1 = Tensor::new(vec![1.0f32, 2.0, 3.0, 4.0], [2, 2]);
        let v = Tensor::new(vec![1.0f32, 1.0], [2]).reshape([2, 1]).unwrap();
        let kv = backend()
            .fmmv(&x1, &x1, &v, &k, None, &KernelOptions::default())
            .unwrap();
        assert_eq!(kv.dtype(), DType::F32);
        // K = [[5, 11], [11, 25]]
        assert_eq!(kv.as_slice::<f32>().unwrap(), &[16.0, 36.0]);
    }
}
