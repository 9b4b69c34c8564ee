use serde::{Deserialize, Serialize};
use std::fmt;

/// When the lazy-reduction engine may replace the dense backend for
/// kernel-vector products.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReductionMode {
    /// Never use the reduction engine.
    Off,
    /// Use it when installed and the data is low dimensional.
    #[default]
    Auto,
    /// Use it regardless of dimensionality, failing if it is not installed.
    Force,
}

impl fmt::Display for ReductionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReductionMode::Off => write!(f, "off"),
            ReductionMode::Auto => write!(f, "auto"),
            ReductionMode::Force => write!(f, "force"),
        }
    }
}

/// Backend-selection policy attached to a kernel.
///
/// Values are immutable once built; per-call changes go through
/// [`KernelOptions::with_overrides`], which returns a new record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KernelOptions {
    /// Restrict computation to the CPU backend.
    pub use_cpu: bool,
    /// Lazy-reduction engine activation.
    pub reduction_mode: ReductionMode,
    /// Rows of `X1` evaluated per block by the CPU backend.
    pub cpu_block_rows: usize,
}

impl Default for KernelOptions {
    fn default() -> Self {
        Self {
            use_cpu: false,
            reduction_mode: ReductionMode::Auto,
            cpu_block_rows: 256,
        }
    }
}

impl KernelOptions {
    /// Returns a copy of these options with every field set in `overrides`
    /// replaced.
    pub fn with_overrides(&self, overrides: &OptionsOverride) -> KernelOptions {
        KernelOptions {
            use_cpu: overrides.use_cpu.unwrap_or(self.use_cpu),
            reduction_mode: overrides.reduction_mode.unwrap_or(self.reduction_mode),
            cpu_block_rows: overrides.cpu_block_rows.unwrap_or(self.cpu_block_rows),
        }
    }

    /// Block size used by the CPU backend, never zero.
    pub fn block_rows(&self) -> usize {
        self.cpu_block_rows.max(1)
    }
}

/// Per-call policy changes. Absent fields keep the kernel's value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OptionsOverride {
    pub use_cpu: Option<bool>,
    pub reduction_mode: Option<ReductionMode>,
    pub cpu_block_rows: Option<usize>,
}

impl OptionsOverride {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn use_cpu(mut self, use_cpu: bool) -> Self {
        self.use_cpu = Some(use_cpu);
        self
    }

    pub fn reduction_mode(mut self, mode: ReductionMode) -> Self {
        self.reduction_mode = Some(mode);
        self
    }

    pub fn cpu_block_rows(mut self, rows: usize) -> Self {
        self.cpu_block_rows = Some(rows);
        self
    }
}
