//! The public kernel operations: `mm`, `mmv` and `dmmv`.
//!
//! Each call validates its arguments, merges the per-call overrides into a
//! copy of the kernel's options, picks a plan and runs it. Advisories are
//! logged at `warn` and are also visible through the `plan_*` methods.

use km_kernels::kernel::not_implemented;
use km_kernels::{Kernel, KernelError, KernelOptions, OptionsOverride, Result};
use km_tensor::{Operand, Tensor};

use crate::decompose::fused_dmmv;
use crate::eligibility;
use crate::policy::{self, Advisory, BackendKind, OpFamily};
use crate::reduction::{Reduction, ReductionCall};
use crate::runtime::{self, Runtime};
use crate::validate;

/// Where a call will run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Plan {
    Backend(BackendKind),
    /// The lazy-reduction engine, through its `mmv` entry point.
    Reduction,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selection {
    pub plan: Plan,
    pub advisory: Option<Advisory>,
}

fn merged_options(kernel: &dyn Kernel, overrides: Option<&OptionsOverride>) -> KernelOptions {
    match overrides {
        Some(overrides) => kernel.options().with_overrides(overrides),
        None => kernel.options().clone(),
    }
}

fn feature_dim(x: &Operand) -> usize {
    x.shape().dims().get(1).copied().unwrap_or(0)
}

fn output_dim(t: &Tensor) -> usize {
    t.shape().dims().get(1).copied().unwrap_or(1)
}

impl Runtime {
    fn select(
        &self,
        op: OpFamily,
        kernel: &dyn Kernel,
        x1: &Operand,
        x2: &Operand,
        outputs: usize,
        options: &KernelOptions,
    ) -> Result<Selection> {
        let caps = self.capabilities();
        let eligible = match op {
            OpFamily::Mm => false,
            OpFamily::Mmv => eligibility::can_handle_mmv(x1, x2, options, caps),
            OpFamily::Dmmv => eligibility::can_handle_dmmv(x1, x2, options, caps),
        };
        if eligible {
            if kernel
                .reduction_formula(feature_dim(x1), outputs, x1.dtype())
                .is_some()
            {
                return Ok(Selection {
                    plan: Plan::Reduction,
                    advisory: None,
                });
            }
            tracing::debug!(
                kernel = kernel.name(),
                "kernel has no reduction formula, using a backend"
            );
        }
        let resolution = policy::resolve(op, x1, x2, options, caps)?;
        Ok(Selection {
            plan: Plan::Backend(resolution.backend),
            advisory: resolution.advisory,
        })
    }

    fn report(&self, op: OpFamily, kernel: &dyn Kernel, selection: &Selection) {
        if let Some(advisory) = &selection.advisory {
            tracing::warn!(op = %op, kernel = kernel.name(), "{}", advisory.message);
        }
        tracing::debug!(op = %op, kernel = kernel.name(), plan = ?selection.plan, "dispatch");
    }

    /// The plan `mm` would follow for these operands.
    pub fn plan_mm(
        &self,
        kernel: &dyn Kernel,
        x1: &Operand,
        x2: &Operand,
        overrides: Option<&OptionsOverride>,
    ) -> Result<Selection> {
        validate::check_mm(x1, x2, None)?;
        let options = merged_options(kernel, overrides);
        self.select(OpFamily::Mm, kernel, x1, x2, 0, &options)
    }

    pub fn plan_mmv(
        &self,
        kernel: &dyn Kernel,
        x1: &Operand,
        x2: &Operand,
        v: &Tensor,
        overrides: Option<&OptionsOverride>,
    ) -> Result<Selection> {
        let v = validate::check_mmv(x1, x2, v, None)?;
        let options = merged_options(kernel, overrides);
        self.select(OpFamily::Mmv, kernel, x1, x2, output_dim(&v), &options)
    }

    pub fn plan_dmmv(
        &self,
        kernel: &dyn Kernel,
        x1: &Operand,
        x2: &Operand,
        v: Option<&Tensor>,
        w: Option<&Tensor>,
        overrides: Option<&OptionsOverride>,
    ) -> Result<Selection> {
        let (v, w) = validate::check_dmmv(x1, x2, v, w, None)?;
        let outputs = v.as_deref().or(w.as_deref()).map_or(1, output_dim);
        let options = merged_options(kernel, overrides);
        self.select(OpFamily::Dmmv, kernel, x1, x2, outputs, &options)
    }

    /// The full kernel matrix `K(X1, X2)`, shape `[N, M]`.
    ///
    /// `out`, when given, must be `[N, M]` and is returned filled. It is
    /// consumed by the call: if validation passes but the backend fails, the
    /// buffer is dropped along with the error.
    pub fn mm(
        &self,
        kernel: &dyn Kernel,
        x1: &Operand,
        x2: &Operand,
        out: Option<Tensor>,
        overrides: Option<&OptionsOverride>,
    ) -> Result<Tensor> {
        validate::check_mm(x1, x2, out.as_ref())?;
        let options = merged_options(kernel, overrides);
        let selection = self.select(OpFamily::Mm, kernel, x1, x2, 0, &options)?;
        self.report(OpFamily::Mm, kernel, &selection);

        let kind = match selection.plan {
            Plan::Backend(kind) => kind,
            Plan::Reduction => return Err(not_implemented(kernel, "reduction mm")),
        };
        let backend = self.backend_for(kind)?;
        match (x1, x2) {
            (Operand::Dense(a), Operand::Dense(b)) => backend.fmm(a, b, kernel, out, &options),
            (Operand::Sparse(a), Operand::Sparse(b)) => {
                backend.fmm_sparse(a, b, kernel, out, &options)
            }
            _ => Err(KernelError::SparsityMismatch),
        }
    }

    /// `K(X1, X2) @ v`, shape `[N, T]`. A vector `v` is treated as `[M, 1]`.
    ///
    /// As with [`Runtime::mm`], `out` is dropped if the backend or the
    /// reduction engine fails.
    pub fn mmv(
        &self,
        kernel: &dyn Kernel,
        x1: &Operand,
        x2: &Operand,
        v: &Tensor,
        out: Option<Tensor>,
        overrides: Option<&OptionsOverride>,
    ) -> Result<Tensor> {
        let v = validate::check_mmv(x1, x2, v, out.as_ref())?;
        let options = merged_options(kernel, overrides);
        let selection = self.select(OpFamily::Mmv, kernel, x1, x2, output_dim(&v), &options)?;
        self.report(OpFamily::Mmv, kernel, &selection);

        match selection.plan {
            Plan::Backend(kind) => self.backend_mmv(kind, kernel, x1, x2, &v, out, &options),
            Plan::Reduction => self.run_reduction_mmv(kernel, x1, x2, &v, out, &options),
        }
    }

    /// `K(X1, X2)' @ (K(X1, X2) @ v + w)`, shape `[M, T]`.
    ///
    /// At least one of `v` (`[M, T]`) and `w` (`[N, T]`) must be given; the
    /// missing one is treated as zero. A failing backend or engine drops
    /// `out`, as with [`Runtime::mm`].
    #[allow(clippy::too_many_arguments)]
    pub fn dmmv(
        &self,
        kernel: &dyn Kernel,
        x1: &Operand,
        x2: &Operand,
        v: Option<&Tensor>,
        w: Option<&Tensor>,
        out: Option<Tensor>,
        overrides: Option<&OptionsOverride>,
    ) -> Result<Tensor> {
        let (v, w) = validate::check_dmmv(x1, x2, v, w, out.as_ref())?;
        let (v, w) = (v.as_deref(), w.as_deref());
        let outputs = v.or(w).map_or(1, output_dim);
        let options = merged_options(kernel, overrides);
        let selection = self.select(OpFamily::Dmmv, kernel, x1, x2, outputs, &options)?;
        self.report(OpFamily::Dmmv, kernel, &selection);

        match selection.plan {
            Plan::Backend(kind) => {
                let backend = self.backend_for(kind)?;
                match (x1, x2) {
                    (Operand::Dense(a), Operand::Dense(b)) => {
                        backend.fdmmv(a, b, v, w, kernel, out, &options)
                    }
                    (Operand::Sparse(a), Operand::Sparse(b)) => {
                        backend.fdmmv_sparse(a, b, v, w, kernel, out, &options)
                    }
                    _ => Err(KernelError::SparsityMismatch),
                }
            }
            Plan::Reduction => fused_dmmv(x1, x2, v, w, out, |a, b, t, o| {
                self.run_reduction_mmv(kernel, a, b, t, o, &options)
            }),
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn backend_mmv(
        &self,
        kind: BackendKind,
        kernel: &dyn Kernel,
        x1: &Operand,
        x2: &Operand,
        v: &Tensor,
        out: Option<Tensor>,
        options: &KernelOptions,
    ) -> Result<Tensor> {
        let backend = self.backend_for(kind)?;
        match (x1, x2) {
            (Operand::Dense(a), Operand::Dense(b)) => backend.fmmv(a, b, v, kernel, out, options),
            (Operand::Sparse(a), Operand::Sparse(b)) => {
                backend.fmmv_sparse(a, b, v, kernel, out, options)
            }
            _ => Err(KernelError::SparsityMismatch),
        }
    }

    /// `K(X1, X2) @ v` on the lazy-reduction engine. Arguments must already
    /// be validated, with `v` as a 2D matrix.
    pub fn run_reduction_mmv(
        &self,
        kernel: &dyn Kernel,
        x1: &Operand,
        x2: &Operand,
        v: &Tensor,
        out: Option<Tensor>,
        options: &KernelOptions,
    ) -> Result<Tensor> {
        let engine = self
            .reduction_engine()
            .ok_or(KernelError::ReductionEngineNotInstalled)?;
        let (Some(a), Some(b)) = (x1.as_dense(), x2.as_dense()) else {
            return Err(not_implemented(kernel, "reduction mmv on sparse operands"));
        };
        let (_, features) = a.matrix_dims()?;
        let (_, outputs) = v.matrix_dims()?;
        let formula = kernel
            .reduction_formula(features, outputs, a.dtype())
            .ok_or_else(|| not_implemented(kernel, "reduction_formula"))?;
        tracing::debug!(
            engine = engine.name(),
            kernel = kernel.name(),
            formula = %formula.formula,
            "lazy-reduction mmv"
        );

        let call = ReductionCall {
            x1: a,
            x2: b,
            v,
            other_vars: &formula.other_vars,
            formula: &formula.formula,
            aliases: &formula.aliases,
            axis: 1,
            reduction: Reduction::Sum,
        };
        engine.run_mmv(call, out, options)
    }
}

/// The kernel operations as methods, dispatched through [`runtime::global`].
pub trait KernelOps: Kernel + Sized {
    fn mm(
        &self,
        x1: &Operand,
        x2: &Operand,
        out: Option<Tensor>,
        overrides: Option<&OptionsOverride>,
    ) -> Result<Tensor> {
        runtime::global().mm(self, x1, x2, out, overrides)
    }

    fn mmv(
        &self,
        x1: &Operand,
        x2: &Operand,
        v: &Tensor,
        out: Option<Tensor>,
        overrides: Option<&OptionsOverride>,
    ) -> Result<Tensor> {
        runtime::global().mmv(self, x1, x2, v, out, overrides)
    }

    fn dmmv(
        &self,
        x1: &Operand,
        x2: &Operand,
        v: Option<&Tensor>,
        w: Option<&Tensor>,
        out: Option<Tensor>,
        overrides: Option<&OptionsOverride>,
    ) -> Result<Tensor> {
        runtime::global().dmmv(self, x1, x2, v, w, out, overrides)
    }
}

impl<K: Kernel> KernelOps for K {}
