//! Host-side dense linear algebra used by the CPU kernel backend.

pub mod matmul;

pub use matmul::{matmul, matmul_nt_acc, matmul_tn_acc};
