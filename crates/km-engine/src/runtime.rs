//! The backend registry and the process-wide runtime.

use std::sync::{Arc, OnceLock};

use km_kernels::{CpuBackend, KernelBackend, KernelError, Result};

use crate::policy::BackendKind;
use crate::reduction::ReductionEngine;

/// What the running process can do beyond the always-present CPU backend.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Capabilities {
    /// A GPU backend is registered.
    pub gpu: bool,
    /// A lazy-reduction engine is registered.
    pub reduction_engine: bool,
}

/// The set of backends kernel operations are dispatched to.
///
/// A runtime always carries a CPU backend. GPU backends and the lazy-reduction
/// engine are optional; the capabilities the policy consults are derived from
/// what was registered, so they never change after `build`.
#[derive(Debug, Clone)]
pub struct Runtime {
    cpu: Arc<dyn KernelBackend>,
    gpu: Option<Arc<dyn KernelBackend>>,
    reduction: Option<Arc<dyn ReductionEngine>>,
}

impl Runtime {
    pub fn builder() -> RuntimeBuilder {
        RuntimeBuilder::default()
    }

    /// The runtime used when nothing was installed: CPU only.
    pub fn detect() -> Runtime {
        let runtime = Runtime::builder().build();
        let caps = runtime.capabilities();
        tracing::info!(
            cpu = runtime.cpu.name(),
            gpu = caps.gpu,
            reduction_engine = caps.reduction_engine,
            "kernel runtime ready"
        );
        runtime
    }

    pub fn capabilities(&self) -> Capabilities {
        Capabilities {
            gpu: self.gpu.is_some(),
            reduction_engine: self.reduction.is_some(),
        }
    }

    pub fn cpu_backend(&self) -> &dyn KernelBackend {
        self.cpu.as_ref()
    }

    pub fn gpu_backend(&self) -> Option<&dyn KernelBackend> {
        self.gpu.as_deref()
    }

    pub fn reduction_engine(&self) -> Option<&dyn ReductionEngine> {
        self.reduction.as_deref()
    }

    /// The backend serving `kind`. Dense and sparse variants share one
    /// backend per device.
    pub fn backend_for(&self, kind: BackendKind) -> Result<&dyn KernelBackend> {
        if kind.is_gpu() {
            self.gpu_backend().ok_or_else(|| KernelError::BackendUnavailable {
                backend: "gpu".to_string(),
            })
        } else {
            Ok(self.cpu_backend())
        }
    }
}

impl Default for Runtime {
    fn default() -> Self {
        Runtime::builder().build()
    }
}

#[derive(Debug, Default)]
pub struct RuntimeBuilder {
    cpu: Option<Arc<dyn KernelBackend>>,
    gpu: Option<Arc<dyn KernelBackend>>,
    reduction: Option<Arc<dyn ReductionEngine>>,
}

impl RuntimeBuilder {
    /// Replace the built-in [`CpuBackend`].
    pub fn cpu_backend(mut self, backend: Arc<dyn KernelBackend>) -> Self {
        self.cpu = Some(backend);
        self
    }

    pub fn gpu_backend(mut self, backend: Arc<dyn KernelBackend>) -> Self {
        self.gpu = Some(backend);
        self
    }

    pub fn reduction_engine(mut self, engine: Arc<dyn ReductionEngine>) -> Self {
        self.reduction = Some(engine);
        self
    }

    pub fn build(self) -> Runtime {
        Runtime {
            cpu: self.cpu.unwrap_or_else(|| Arc::new(CpuBackend::new())),
            gpu: self.gpu,
            reduction: self.reduction,
        }
    }
}

static GLOBAL: OnceLock<Runtime> = OnceLock::new();

/// Install the process-wide runtime. Fails, handing the runtime back, if one
/// is already in place (including the detected default).
pub fn install(runtime: Runtime) -> std::result::Result<(), Runtime> {
    GLOBAL.set(runtime)
}

/// The process-wide runtime, detected on first use if none was installed.
pub fn global() -> &'static Runtime {
    GLOBAL.get_or_init(Runtime::detect)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_runtime_is_cpu_only() {
        let rt = Runtime::detect();
        assert_eq!(rt.capabilities(), Capabilities::default());
        assert_eq!(rt.cpu_backend().name(), "cpu");
        assert!(rt.gpu_backend().is_none());
        assert!(rt.reduction_engine().is_none());
    }

    #[test]
    fn test_backend_for() {
        let rt = Runtime::default();
        assert_eq!(rt.backend_for(BackendKind::CpuDense).unwrap().name(), "cpu");
        assert_eq!(rt.backend_for(BackendKind::CpuSparse).unwrap().name(), "cpu");
        let err = rt.backend_for(BackendKind::GpuSparse).unwrap_err();
        assert_eq!(err.to_string(), "backend 'gpu' is not available");
    }

    #[test]
    fn test_gpu_registration_sets_capability() {
        let rt = Runtime::builder()
            .gpu_backend(Arc::new(CpuBackend::new()))
            .build();
        assert!(rt.capabilities().gpu);
        assert!(!rt.capabilities().reduction_engine);
        assert!(rt.backend_for(BackendKind::GpuDense).is_ok());
    }

    #[test]
    fn test_install_after_global_is_rejected() {
        let current = global().capabilities();
        assert!(install(Runtime::default()).is_err());
        assert_eq!(global().capabilities(), current);
    }
}
