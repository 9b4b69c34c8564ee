//! When the lazy-reduction engine may take over a vector product.

use km_kernels::{KernelOptions, ReductionMode};
use km_tensor::Operand;

use crate::runtime::Capabilities;

/// Feature dimension above which the engine is only used when forced.
pub const REDUCTION_DIM_THRESHOLD: usize = 50;

/// `Off` never, `Force` always, `Auto` when an engine is registered.
pub fn decide_reduction(options: &KernelOptions, caps: Capabilities) -> bool {
    match options.reduction_mode {
        ReductionMode::Off => false,
        ReductionMode::Force => true,
        ReductionMode::Auto => caps.reduction_engine,
    }
}

/// Whether `K(x1, x2) @ v` should go to the lazy-reduction engine.
///
/// Sparse operands never qualify. A forced mode qualifies even with no engine
/// registered, so the call fails loudly instead of silently running on the
/// CPU.
pub fn should_use_reduction(
    x1: &Operand,
    x2: &Operand,
    options: &KernelOptions,
    caps: Capabilities,
) -> bool {
    if x1.is_sparse() || x2.is_sparse() {
        return false;
    }
    if !decide_reduction(options, caps) {
        return false;
    }
    let features = x1.shape().dims().get(1).copied().unwrap_or(0);
    features <= REDUCTION_DIM_THRESHOLD || options.reduction_mode == ReductionMode::Force
}

pub fn can_handle_mmv(
    x1: &Operand,
    x2: &Operand,
    options: &KernelOptions,
    caps: Capabilities,
) -> bool {
    should_use_reduction(x1, x2, options, caps)
}

/// `dmmv` is two vector products with the operands swapped; both must qualify.
pub fn can_handle_dmmv(
    x1: &Operand,
    x2: &Operand,
    options: &KernelOptions,
    caps: Capabilities,
) -> bool {
    should_use_reduction(x1, x2, options, caps) && should_use_reduction(x2, x1, options, caps)
}
