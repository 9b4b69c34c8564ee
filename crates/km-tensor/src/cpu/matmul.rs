use crate::dtype::Element;
use crate::error::{Result, TensorError};

fn check_len(name: &str, len: usize, expected: usize) -> Result<()> {
    if len != expected {
        return Err(TensorError::Other(format!(
            "matmul: {}.len()={} but expected {}",
            name, len, expected
        )));
    }
    Ok(())
}

/// `C = A @ B` for row-major `a: [m, k]` and `b: [k, n]`.
pub fn matmul<T: Element>(a: &[T], b: &[T], m: usize, k: usize, n: usize) -> Result<Vec<T>> {
    check_len("a", a.len(), m * k)?;
    check_len("b", b.len(), k * n)?;

    let mut c = vec![T::zero(); m * n];
    for i in 0..m {
        let a_row = &a[i * k..(i + 1) * k];
        let c_row = &mut c[i * n..(i + 1) * n];
        for (p, &a_ip) in a_row.iter().enumerate() {
            let b_row = &b[p * n..(p + 1) * n];
            for (c_ij, &b_pj) in c_row.iter_mut().zip(b_row) {
                *c_ij += a_ip * b_pj;
            }
        }
    }
    Ok(c)
}

/// `C += A @ B'` for row-major `a: [m, k]`, `b: [n, k]` and `c: [m, n]`.
///
/// Both operands are walked along contiguous rows, which is the access
/// pattern of a pairwise inner-product kernel.
pub fn matmul_nt_acc<T: Element>(
    a: &[T],
    b: &[T],
    c: &mut [T],
    m: usize,
    k: usize,
    n: usize,
) -> Result<()> {
    check_len("a", a.len(), m * k)?;
    check_len("b", b.len(), n * k)?;
    check_len("c", c.len(), m * n)?;

    for i in 0..m {
        let a_row = &a[i * k..(i + 1) * k];
        for j in 0..n {
            let b_row = &b[j * k..(j + 1) * k];
            let mut sum = T::zero();
            for (&x, &y) in a_row.iter().zip(b_row) {
                sum += x * y;
            }
            c[i * n + j] += sum;
        }
    }
    Ok(())
}

/// `C += A' @ B` for row-major `a: [k, m]`, `b: [k, n]` and `c: [m, n]`.
pub fn matmul_tn_acc<T: Element>(
    a: &[T],
    b: &[T],
    c: &mut [T],
    k: usize,
    m: usize,
    n: usize,
) -> Result<()> {
    check_len("a", a.len(), k * m)?;
    check_len("b", b.len(), k * n)?;
    check_len("c", c.len(), m * n)?;

    for p in 0..k {
        let a_row = &a[p * m..(p + 1) * m];
        let b_row = &b[p * n..(p + 1) * n];
        for (i, &a_pi) in a_row.iter().enumerate() {
            let c_row = &mut c[i * n..(i + 1) * n];
            for (c_ij, &b_pj) in c_row.iter_mut().zip(b_row) {
                *c_ij += a_pi * b_pj;
            }
        }
    }
    Ok(())
}
