//! Backend selection from operand placement, sparsity and kernel options.

use std::fmt;

use km_kernels::{KernelOptions, Result};
use km_tensor::Operand;

use crate::runtime::Capabilities;
use crate::validate;

/// The three public operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OpFamily {
    Mm,
    Mmv,
    Dmmv,
}

impl OpFamily {
    /// Name used in error and advisory messages.
    pub fn label(&self) -> &'static str {
        match self {
            OpFamily::Mm => "kernel",
            OpFamily::Mmv => "mmv",
            OpFamily::Dmmv => "dmmv",
        }
    }
}

impl fmt::Display for OpFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackendKind {
    CpuDense,
    CpuSparse,
    GpuDense,
    GpuSparse,
}

impl BackendKind {
    pub fn new(gpu: bool, sparse: bool) -> Self {
        match (gpu, sparse) {
            (false, false) => BackendKind::CpuDense,
            (false, true) => BackendKind::CpuSparse,
            (true, false) => BackendKind::GpuDense,
            (true, true) => BackendKind::GpuSparse,
        }
    }

    pub fn is_gpu(&self) -> bool {
        matches!(self, BackendKind::GpuDense | BackendKind::GpuSparse)
    }

    pub fn is_sparse(&self) -> bool {
        matches!(self, BackendKind::CpuSparse | BackendKind::GpuSparse)
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            BackendKind::CpuDense => "cpu-dense",
            BackendKind::CpuSparse => "cpu-sparse",
            BackendKind::GpuDense => "gpu-dense",
            BackendKind::GpuSparse => "gpu-sparse",
        };
        f.write_str(s)
    }
}

/// Non-fatal notice that a requested option was not honoured.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Advisory {
    pub op: OpFamily,
    pub message: String,
}

impl fmt::Display for Advisory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.op, self.message)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub backend: BackendKind,
    pub advisory: Option<Advisory>,
}

/// Whether the options and capabilities allow a GPU backend.
pub fn decide_gpu(options: &KernelOptions, caps: Capabilities) -> bool {
    !options.use_cpu && caps.gpu
}

/// Pick the backend for `op`.
///
/// Operands already placed on a GPU always get a GPU backend; if the options
/// asked for the CPU, the request is overridden and an [`Advisory`] explains
/// why. This never fails for lack of a GPU backend: that surfaces when the
/// backend is looked up.
pub fn resolve(
    op: OpFamily,
    x1: &Operand,
    x2: &Operand,
    options: &KernelOptions,
    caps: Capabilities,
) -> Result<Resolution> {
    let sparse = validate::check_sparsity(x1, x2)?;
    let mut gpu = decide_gpu(options, caps);
    let mut advisory = None;

    let resident = [x1.device(), x2.device()].into_iter().find(|d| d.is_gpu());
    if let (Some(device), false) = (resident, gpu) {
        if options.use_cpu {
            advisory = Some(Advisory {
                op,
                message: format!(
                    "operands are on {}, but the CPU implementation was requested; using the GPU implementation instead",
                    device
                ),
            });
        }
        gpu = true;
    }

    Ok(Resolution {
        backend: BackendKind::new(gpu, sparse),
        advisory,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use km_kernels::KernelError;
    use km_tensor::{DType, Device, SparseMatrix, Tensor};

    fn dense(device: Device) -> Operand {
        Operand::Dense(Tensor::zeros(DType::F64, [3, 2], device))
    }

    fn sparse(device: Device) -> Operand {
        let t = Tensor::zeros(DType::F64, [3, 2], device);
        Operand::Sparse(SparseMatrix::from_dense(&t).unwrap())
    }

    fn opts(use_cpu: bool) -> KernelOptions {
        KernelOptions {
            use_cpu,
            ..Default::default()
        }
    }

    const CPU_ONLY: Capabilities = Capabilities {
        gpu: false,
        reduction_engine: false,
    };
    const WITH_GPU: Capabilities = Capabilities {
        gpu: true,
        reduction_engine: false,
    };

    #[test]
    fn test_decide_gpu() {
        assert!(!decide_gpu(&opts(false), CPU_ONLY));
        assert!(decide_gpu(&opts(false), WITH_GPU));
        assert!(!decide_gpu(&opts(true), WITH_GPU));
    }

    #[test]
    fn test_host_operands() {
        let x = dense(Device::Cpu);
        let r = resolve(OpFamily::Mm, &x, &x, &opts(false), CPU_ONLY).unwrap();
        assert_eq!(r.backend, BackendKind::CpuDense);
        assert!(r.advisory.is_none());

        let r = resolve(OpFamily::Mm, &x, &x, &opts(false), WITH_GPU).unwrap();
        assert_eq!(r.backend, BackendKind::GpuDense);

        let s = sparse(Device::Cpu);
        let r = resolve(OpFamily::Mmv, &s, &s, &opts(true), WITH_GPU).unwrap();
        assert_eq!(r.backend, BackendKind::CpuSparse);
    }

    #[test]
    fn test_gpu_operands_override_use_cpu() {
        let x = dense(Device::Gpu(0));
        let r = resolve(OpFamily::Mmv, &x, &x, &opts(true), CPU_ONLY).unwrap();
        assert_eq!(r.backend, BackendKind::GpuDense);
        let advisory = r.advisory.unwrap();
        assert_eq!(advisory.op, OpFamily::Mmv);
        assert!(advisory.message.contains("gpu:0"));
        assert!(advisory.to_string().starts_with("mmv: "));
    }

    #[test]
    fn test_advisory_names_the_resident_device() {
        let r = resolve(
            OpFamily::Mm,
            &dense(Device::Cpu),
            &dense(Device::Gpu(1)),
            &opts(true),
            CPU_ONLY,
        )
        .unwrap();
        let message = r.advisory.unwrap().message;
        assert!(message.starts_with("operands are on gpu:1"));
    }

    #[test]
    fn test_gpu_operands_without_use_cpu_have_no_advisory() {
        let s = sparse(Device::Gpu(1));
        let r = resolve(OpFamily::Dmmv, &s, &s, &opts(false), CPU_ONLY).unwrap();
        assert_eq!(r.backend, BackendKind::GpuSparse);
        assert!(r.advisory.is_none());
    }

    #[test]
    fn test_mixed_sparsity() {
        let err = resolve(
            OpFamily::Mm,
            &dense(Device::Cpu),
            &sparse(Device::Cpu),
            &opts(false),
            CPU_ONLY,
        )
        .unwrap_err();
        assert!(matches!(err, KernelError::SparsityMismatch));
    }

    #[test]
    fn test_backend_kind() {
        assert_eq!(BackendKind::new(true, true), BackendKind::GpuSparse);
        assert!(BackendKind::GpuDense.is_gpu());
        assert!(!BackendKind::CpuSparse.is_gpu());
        assert!(BackendKind::CpuSparse.is_sparse());
        assert_eq!(BackendKind::CpuDense.to_string(), "cpu-dense");
    }
}
