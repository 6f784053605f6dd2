//! Serial cyclic Jacobi eigensolver
//!
//! Row-by-row classical Jacobi with the LAPACK-style tangent formula. Slow,
//! but independent of the scheduler and kernels, so it serves as the oracle
//! the harness compares the parallel engine against.

use crate::error::{JacobiError, Result};
use crate::matrix::Matrix;

/// Eigenvalues of a symmetric matrix, sorted descending
pub fn serial_jacobi_eigenvalues(a: &Matrix<f64>, max_sweeps: usize) -> Result<Vec<f64>> {
    let (n, cols) = a.dims();
    if n != cols {
        return Err(JacobiError::InvalidInput(format!(
            "reference eigensolver needs a square matrix, got {}x{}",
            n, cols
        )));
    }

    let mut w = a.as_slice().to_vec();
    let tol = n as f64 * f64::EPSILON;

    for _ in 0..max_sweeps {
        let off = crate::matrix::off_diagonal_norm(&w, n);
        let scale = a.frobenius_norm().max(1.0);
        if off <= tol * scale {
            break;
        }

        for p in 0..n {
            for q in (p + 1)..n {
                let a_pq = w[p * n + q];
                if a_pq.abs() < f64::MIN_POSITIVE {
                    continue;
                }
                let tau = (w[q * n + q] - w[p * n + p]) / (2.0 * a_pq);
                let t = if tau >= 0.0 {
                    1.0 / (tau + (1.0 + tau * tau).sqrt())
                } else {
                    -1.0 / (-tau + (1.0 + tau * tau).sqrt())
                };
                let c = 1.0 / (1.0 + t * t).sqrt();
                let s = t * c;

                // A <- JᵀAJ: columns then rows
                for k in 0..n {
                    let akp = w[k * n + p];
                    let akq = w[k * n + q];
                    w[k * n + p] = c * akp - s * akq;
                    w[k * n + q] = s * akp + c * akq;
                }
                for k in 0..n {
                    let apk = w[p * n + k];
                    let aqk = w[q * n + k];
                    w[p * n + k] = c * apk - s * aqk;
                    w[q * n + k] = s * apk + c * aqk;
                }
            }
        }
    }

    let mut eigenvalues: Vec<f64> = (0..n).map(|i| w[i * n + i]).collect();
    eigenvalues.sort_by(|x, y| y.total_cmp(x));
    Ok(eigenvalues)
}
