//! SVD assembly
//!
//! Builds `A = DᵀD` on the backend, runs the sweep engine, then turns the
//! converged diagonal and eigenvector accumulator into singular values, `U`
//! and `Vᵀ`:
//!
//! 1. eigenvalues = diag(A), sorted descending (the argsort permutation is kept)
//! 2. σᵢ = sqrt(λᵢ)
//! 3. U = E with its columns permuted by the same argsort
//! 4. Vᵀ = Σ⁻¹ · Uᵀ · Dᵀ
//!
//! The factors satisfy `Dᵀ = U · diag(σ) · Vᵀ`, so `U` spans the column space
//! of `Dᵀ` (the right singular vectors of `D`).

use crate::backend::Backend;
use crate::error::{JacobiError, Result};
use crate::matrix::Matrix;
use crate::sweep::{SweepConfig, SweepController, SweepState, SweepStats};
use crate::Timings;
use log::{debug, info, warn};
use std::time::Instant;

/// Result triple of a decomposition
#[derive(Debug, Clone)]
pub struct SvdResult {
    /// Length P, non-negative, descending
    pub sigma: Vec<f64>,
    /// P×P, orthogonal, columns are eigenvectors of DᵀD
    pub u: Matrix<f64>,
    /// P×N
    pub vt: Matrix<f64>,
    pub stats: SweepStats,
    pub timings: Timings,
}

impl SvdResult {
    /// `U · diag(σ) · Vᵀ`, a P×N matrix equal to `Dᵀ` up to rounding
    pub fn reconstruct(&self) -> Result<Matrix<f64>> {
        self.u
            .matmul(&Matrix::from_diagonal(&self.sigma))?
            .matmul(&self.vt)
    }

    /// Eigenvalues of DᵀD, i.e. σ²
    pub fn eigenvalues(&self) -> Vec<f64> {
        self.sigma.iter().map(|s| s * s).collect()
    }
}

/// Indices that sort `values` descending. Ties keep their original order.
pub fn argsort_desc(values: &[f64]) -> Vec<usize> {
    let mut indices: Vec<usize> = (0..values.len()).collect();
    indices.sort_by(|&i, &j| values[j].total_cmp(&values[i]));
    indices
}

/// Turns the sweep engine's final buffers into (σ, U, Vᵀ)
pub struct SvdAssembler<'b, B: Backend> {
    backend: &'b B,
    rank_tolerance: f64,
}

impl<'b, B: Backend> SvdAssembler<'b, B> {
    pub fn new(backend: &'b B, rank_tolerance: f64) -> Self {
        Self {
            backend,
            rank_tolerance,
        }
    }

    /// `d_t` is the resident P×N transpose of the input.
    pub fn assemble(
        &self,
        state: &SweepState<B>,
        d_t: &B::Buffer,
        n: usize,
    ) -> Result<(Vec<f64>, Matrix<f64>, Matrix<f64>)> {
        let p = state.size;
        let a = self.backend.download(&state.a)?;
        let e = self.backend.download(&state.e)?;

        let eigenvalues: Vec<f64> = (0..p).map(|i| a[i * p + i]).collect();
        let order = argsort_desc(&eigenvalues);

        let sigma: Vec<f64> = order
            .iter()
            .map(|&i| {
                let lambda = eigenvalues[i];
                if lambda < 0.0 {
                    // DᵀD is PSD; a negative diagonal is rounding noise
                    warn!("clamping eigenvalue {:.3e} at index {} to zero", lambda, i);
                }
                lambda.max(0.0).sqrt()
            })
            .collect();

        // e is column-major: row `order[j]` of the buffer is column `order[j]` of E
        let mut u = Matrix::zeros(p, p);
        for (j, &src) in order.iter().enumerate() {
            for i in 0..p {
                *u.get_mut(i, j) = e[src * p + i];
            }
        }

        let vt = self.right_factor(&u, &sigma, d_t, n)?;
        Ok((sigma, u, vt))
    }

    /// Vᵀ = Σ⁻¹ · Uᵀ · Dᵀ on the backend
    fn right_factor(
        &self,
        u: &Matrix<f64>,
        sigma: &[f64],
        d_t: &B::Buffer,
        n: usize,
    ) -> Result<Matrix<f64>> {
        let p = sigma.len();
        let backend = self.backend;

        let inv_sigma: Vec<f64> = sigma
            .iter()
            .map(|&s| {
                if s > self.rank_tolerance {
                    1.0 / s
                } else {
                    0.0
                }
            })
            .collect();
        let rank = inv_sigma.iter().filter(|&&v| v != 0.0).count();
        if rank < p {
            warn!("rank deficient input: {} of {} singular values are zero", p - rank, p);
        }

        let d_u = backend.upload(u.as_slice())?;
        let mut d_ut = backend.alloc_zeros(p * p)?;
        backend.transpose(&d_u, p, p, &mut d_ut)?;

        let d_inv_sigma = backend.upload(Matrix::from_diagonal(&inv_sigma).as_slice())?;
        let mut d_prod = backend.alloc_zeros(p * p)?;
        backend.matmul(&d_inv_sigma, &d_ut, &mut d_prod, p, p, p)?;

        let mut d_vt = backend.alloc_zeros(p * n)?;
        backend.matmul(&d_prod, d_t, &mut d_vt, p, p, n)?;

        Matrix::from_flat(backend.download(&d_vt)?, p, n)
    }
}

/// Jacobi SVD solver bound to a backend
pub struct JacobiSvd<B: Backend> {
    backend: B,
    config: SweepConfig,
}

impl<B: Backend> JacobiSvd<B> {
    pub fn new(backend: B) -> Self {
        Self::with_config(backend, SweepConfig::default())
    }

    pub fn with_config(backend: B, config: SweepConfig) -> Self {
        Self { backend, config }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn config(&self) -> &SweepConfig {
        &self.config
    }

    /// Decompose an N×P matrix
    pub fn decompose(&self, d: &Matrix<f64>) -> Result<SvdResult> {
        decompose_with_config(&self.backend, d, &self.config)
    }
}

/// Decompose `d` (N×P) with the default fixed-sweep configuration
pub fn decompose<B: Backend>(backend: &B, d: &Matrix<f64>) -> Result<SvdResult> {
    decompose_with_config(backend, d, &SweepConfig::default())
}

/// Decompose `d` (N×P)
///
/// Buffers are uploaded once here and downloaded once during assembly. On any
/// backend failure the whole decomposition is abandoned.
pub fn decompose_with_config<B: Backend>(
    backend: &B,
    d: &Matrix<f64>,
    config: &SweepConfig,
) -> Result<SvdResult> {
    let (n, p) = d.dims();
    if n == 0 || p == 0 {
        return Err(JacobiError::InvalidInput(format!(
            "input must be at least 1x1, got {}x{}",
            n, p
        )));
    }

    let mut timings = Timings::default();
    let start = Instant::now();

    // 1. A = DᵀD on the backend
    let setup_start = Instant::now();
    let d_d = backend.upload(d.as_slice())?;
    let mut d_t = backend.alloc_zeros(p * n)?;
    backend.transpose(&d_d, n, p, &mut d_t)?;
    let mut d_a = backend.alloc_zeros(p * p)?;
    backend.matmul(&d_t, &d_d, &mut d_a, p, n, p)?;
    timings.setup_time = setup_start.elapsed().as_secs_f64();

    if p == 1 {
        return decompose_single_column(backend, &d_a, &d_t, n, config, timings, start);
    }

    // 2. Sweeps
    let sweep_start = Instant::now();
    let mut controller = SweepController::new(backend, d_a, p, config.clone())?;
    controller.run()?;
    let (state, stats) = controller.into_state();
    timings.sweep_time = sweep_start.elapsed().as_secs_f64();

    // 3. Assembly
    let assemble_start = Instant::now();
    let (sigma, u, vt) = SvdAssembler::new(backend, config.rank_tolerance).assemble(&state, &d_t, n)?;
    timings.assemble_time = assemble_start.elapsed().as_secs_f64();
    timings.total_time = start.elapsed().as_secs_f64();

    info!(
        "{} SVD of {}x{}: {} sweeps, {} rotations in {:.3} ms",
        backend.name(),
        n,
        p,
        stats.sweeps,
        stats.rotations,
        timings.total_time * 1e3
    );

    Ok(SvdResult {
        sigma,
        u,
        vt,
        stats,
        timings,
    })
}

/// P = 1: A is 1×1, already diagonal
fn decompose_single_column<B: Backend>(
    backend: &B,
    d_a: &B::Buffer,
    d_t: &B::Buffer,
    n: usize,
    config: &SweepConfig,
    mut timings: Timings,
    start: Instant,
) -> Result<SvdResult> {
    debug!("single column input, skipping sweeps");
    let a00 = backend.download(d_a)?[0];
    let sigma = a00.max(0.0).sqrt();
    let row = backend.download(d_t)?;
    let vt_data = if sigma > config.rank_tolerance {
        row.iter().map(|v| v / sigma).collect()
    } else {
        vec![0.0; n]
    };
    timings.total_time = start.elapsed().as_secs_f64();

    Ok(SvdResult {
        sigma: vec![sigma],
        u: Matrix::identity(1),
        vt: Matrix::from_flat(vt_data, 1, n)?,
        stats: SweepStats::default(),
        timings,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::CpuBackend;
    use crate::matrix::random_matrix;
    use approx::assert_abs_diff_eq;

    /// Rows of a fixed 3×3 rotation
    fn known_q() -> Matrix<f64> {
        let (c1, s1) = (0.6f64, 0.8f64);
        let (c2, s2) = ((0.3f64).cos(), (0.3f64).sin());
        let r1 = Matrix::from_rows(&[
            vec![c1, -s1, 0.0],
            vec![s1, c1, 0.0],
            vec![0.0, 0.0, 1.0],
        ])
        .unwrap();
        let r2 = Matrix::from_rows(&[
            vec![1.0, 0.0, 0.0],
            vec![0.0, c2, -s2],
            vec![0.0, s2, c2],
        ])
        .unwrap();
        r1.matmul(&r2).unwrap()
    }

    #[test]
    fn test_known_spectrum_recovery() {
        let q = known_q();
        // D = diag(3,2,1)·Q  =>  DᵀD = Qᵀ·diag(9,4,1)·Q
        let d = Matrix::from_diagonal(&[3.0, 2.0, 1.0]).matmul(&q).unwrap();
        let result = decompose(&CpuBackend::new(), &d).unwrap();

        assert_eq!(result.sigma.len(), 3);
        for (s, expected) in result.sigma.iter().zip([3.0, 2.0, 1.0]) {
            assert_abs_diff_eq!(*s, expected, epsilon = 1e-3);
        }
        // column j of U is row j of Q up to sign
        for j in 0..3 {
            let dot: f64 = (0..3).map(|i| result.u.get(i, j) * q.get(j, i)).sum();
            let sign = dot.signum();
            for i in 0..3 {
                assert_abs_diff_eq!(sign * *result.u.get(i, j), *q.get(j, i), epsilon = 1e-3);
            }
        }
        assert_eq!(result.stats.sweeps, 30);
    }

    #[test]
    fn test_reconstruction_identity() {
        let d = random_matrix(4, 3, 42);
        let result = decompose(&CpuBackend::new(), &d).unwrap();

        assert_eq!(result.u.dims(), (3, 3));
        assert_eq!(result.vt.dims(), (3, 4));
        let rebuilt = result.reconstruct().unwrap();
        assert!(rebuilt.max_abs_diff(&d.transpose()) < 1e-2);
        assert!(result.u.orthogonality_error() < 1e-4);
        assert!(result.sigma.windows(2).all(|w| w[0] >= w[1]));
    }

    #[test]
    fn test_reconstruction_larger_odd_and_even() {
        for &(n, p) in &[(10, 10), (20, 7), (33, 18), (9, 17)] {
            let d = random_matrix(n, p, (n * p) as u64);
            let result = decompose(&CpuBackend::new(), &d).unwrap();
            let rebuilt = result.reconstruct().unwrap();
            assert!(
                rebuilt.max_abs_diff(&d.transpose()) < 1e-2,
                "{}x{} reconstruction failed",
                n,
                p
            );
        }
    }

    #[test]
    fn test_singular_values_match_reference() {
        let d = random_matrix(12, 6, 5);
        let result = decompose(&CpuBackend::new(), &d).unwrap();
        let ata = d.transpose().matmul(&d).unwrap();
        let reference = crate::reference::serial_jacobi_eigenvalues(&ata, 50).unwrap();
        for (lambda, expected) in result.eigenvalues().iter().zip(&reference) {
            assert_abs_diff_eq!(*lambda, *expected, epsilon = 1e-6 * expected.abs().max(1.0));
        }
    }

    #[test]
    fn test_degenerate_single_column() {
        let d = Matrix::from_rows(&[vec![3.0], vec![4.0]]).unwrap();
        let result = decompose(&CpuBackend::new(), &d).unwrap();
        assert_eq!(result.sigma, vec![5.0]);
        assert_eq!(result.u, Matrix::identity(1));
        assert_abs_diff_eq!(*result.vt.get(0, 0), 0.6, epsilon = 1e-12);
        assert_abs_diff_eq!(*result.vt.get(0, 1), 0.8, epsilon = 1e-12);
    }

    #[test]
    fn test_rank_deficient_input() {
        // second column is twice the first
        let d = Matrix::from_rows(&[
            vec![1.0, 2.0, 0.0],
            vec![2.0, 4.0, 1.0],
            vec![3.0, 6.0, 0.0],
        ])
        .unwrap();
        let result = decompose(&CpuBackend::new(), &d).unwrap();
        assert!(result.sigma[2] < 1e-6);
        assert!(result.vt.row(2).iter().all(|v| v.is_finite()));
        let rebuilt = result.reconstruct().unwrap();
        assert!(rebuilt.max_abs_diff(&d.transpose()) < 1e-2);
    }

    #[test]
    fn test_empty_input_rejected() {
        let d = Matrix::zeros(0, 3);
        assert!(matches!(
            decompose(&CpuBackend::new(), &d),
            Err(JacobiError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_argsort_desc() {
        assert_eq!(argsort_desc(&[1.0, 9.0, 4.0]), vec![1, 2, 0]);
        assert_eq!(argsort_desc(&[2.0, 2.0, 3.0]), vec![2, 0, 1]);
    }

    #[test]
    fn test_solver_with_config() {
        let solver = JacobiSvd::with_config(
            CpuBackend::new(),
            SweepConfig::default().with_tolerance(1e-9),
        );
        let d = random_matrix(8, 5, 3);
        let result = solver.decompose(&d).unwrap();
        assert!(result.stats.converged);
        assert!(result.stats.sweeps < 30);
        assert!(result.reconstruct().unwrap().max_abs_diff(&d.transpose()) < 1e-6);
    }
}
