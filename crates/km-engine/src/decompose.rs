//! `dmmv` rebuilt from two vector products.
//!
//! ```text
//! dmmv(X1, X2, v, w) = mmv(X2, X1, mmv(X1, X2, v) + w)
//!                    = mmv(X2, X1, mmv(X1, X2, v))   when w is absent
//!                    = mmv(X2, X1, w)                when v is absent
//! ```
//!
//! Used for engines that only provide `mmv`.

use km_kernels::{KernelError, Result};
use km_tensor::{Operand, Tensor};

/// Compose `dmmv` from `mmv_fn(a, b, v, out) = K(a, b) @ v`.
///
/// The outer product writes into `out`; the inner one uses a temporary.
pub fn fused_dmmv<F>(
    x1: &Operand,
    x2: &Operand,
    v: Option<&Tensor>,
    w: Option<&Tensor>,
    out: Option<Tensor>,
    mut mmv_fn: F,
) -> Result<Tensor>
where
    F: FnMut(&Operand, &Operand, &Tensor, Option<Tensor>) -> Result<Tensor>,
{
    match (v, w) {
        (Some(v), w) => {
            let mut inner = mmv_fn(x1, x2, v, None)?;
            if let Some(w) = w {
                inner.add_assign(w)?;
            }
            mmv_fn(x2, x1, &inner, out)
        }
        (None, Some(w)) => mmv_fn(x2, x1, w, out),
        (None, None) => Err(KernelError::MissingOperand),
    }
}
