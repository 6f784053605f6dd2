//! Sweep controller
//!
//! Drives the round-robin Jacobi iteration: for every sweep, every round of the
//! pair schedule runs the parameter, row and column kernels in that order.
//! Rounds are strictly sequential because round r+1 reads the matrix round r
//! wrote.
//!
//! ```text
//! Sweep(s = 0..max_sweeps) -> Round(r = 0..R) -> { params, row, col }
//! ```

use crate::backend::{Backend, DeviceSchedule};
use crate::error::{JacobiError, Result};
use crate::matrix::Matrix;
use crate::schedule::PairSchedule;
use log::{debug, info, trace};

/// Fixed sweep count used unless configured otherwise
pub const MAX_SWEEPS: usize = 30;

/// Configuration for the sweep engine and SVD assembly
#[derive(Debug, Clone, PartialEq)]
pub struct SweepConfig {
    /// Number of full sweeps to run
    pub max_sweeps: usize,
    /// Stop early once the off-diagonal Frobenius norm is at or below this.
    /// `None` keeps the fixed-sweep behaviour.
    pub tolerance: Option<f64>,
    /// Singular values at or below this get a zero pseudo-inverse
    pub rank_tolerance: f64,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            max_sweeps: MAX_SWEEPS,
            tolerance: None,
            rank_tolerance: 1e-10,
        }
    }
}

impl SweepConfig {
    pub fn with_max_sweeps(mut self, max_sweeps: usize) -> Self {
        self.max_sweeps = max_sweeps;
        self
    }

    pub fn with_tolerance(mut self, tolerance: f64) -> Self {
        self.tolerance = Some(tolerance);
        self
    }

    pub fn with_rank_tolerance(mut self, rank_tolerance: f64) -> Self {
        self.rank_tolerance = rank_tolerance;
        self
    }
}

/// Statistics from a sweep run
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SweepStats {
    pub sweeps: usize,
    pub rounds: usize,
    pub rotations: usize,
    /// Off-diagonal norm after the last sweep, when it was measured
    pub off_diagonal_norm: Option<f64>,
    /// True when a tolerance was configured and reached
    pub converged: bool,
}

/// Backend buffers owned by one decomposition
pub struct SweepState<B: Backend> {
    /// Working matrix A, row-major P×P
    pub a: B::Buffer,
    /// Row-phase scratch X
    pub x: B::Buffer,
    /// Eigenvector accumulator E, column-major (row k = eigenvector k)
    pub e: B::Buffer,
    pub sine: B::Buffer,
    pub cosine: B::Buffer,
    pub size: usize,
}

impl<B: Backend> SweepState<B> {
    /// Wrap an already-resident working matrix and allocate the rest
    pub fn new(backend: &B, a: B::Buffer, size: usize, pairs_per_round: usize) -> Result<Self> {
        let len = backend.buffer_len(&a);
        if len != size * size {
            return Err(JacobiError::DimensionMismatch {
                expected: size * size,
                actual: len,
            });
        }
        Ok(Self {
            a,
            x: backend.alloc_zeros(size * size)?,
            e: backend.identity(size)?,
            sine: backend.alloc_zeros(pairs_per_round)?,
            cosine: backend.alloc_zeros(pairs_per_round)?,
            size,
        })
    }
}

/// Orchestrates rounds and sweeps over one backend
pub struct SweepController<'b, B: Backend> {
    backend: &'b B,
    schedule: PairSchedule,
    device_schedule: DeviceSchedule<B>,
    config: SweepConfig,
    state: SweepState<B>,
    stats: SweepStats,
}

impl<'b, B: Backend> SweepController<'b, B> {
    /// Take ownership of a resident P×P working matrix
    pub fn new(backend: &'b B, a: B::Buffer, size: usize, config: SweepConfig) -> Result<Self> {
        let schedule = PairSchedule::new(size)?;
        let device_schedule = DeviceSchedule::upload(backend, &schedule)?;
        let state = SweepState::new(backend, a, size, schedule.pairs_per_round())?;

        debug!(
            "{} sweep engine: P={}, {} rounds x {} pairs",
            backend.name(),
            size,
            schedule.num_rounds(),
            schedule.pairs_per_round()
        );

        Ok(Self {
            backend,
            schedule,
            device_schedule,
            config,
            state,
            stats: SweepStats::default(),
        })
    }

    /// Upload a host symmetric matrix and take it as the working matrix
    pub fn from_matrix(backend: &'b B, a: &Matrix<f64>, config: SweepConfig) -> Result<Self> {
        let (rows, cols) = a.dims();
        if rows != cols {
            return Err(JacobiError::InvalidInput(format!(
                "working matrix must be square, got {}x{}",
                rows, cols
            )));
        }
        let buffer = backend.upload(a.as_slice())?;
        Self::new(backend, buffer, rows, config)
    }

    pub fn schedule(&self) -> &PairSchedule {
        &self.schedule
    }

    pub fn stats(&self) -> &SweepStats {
        &self.stats
    }

    /// Apply one round: parameters, then row phase, then column phase
    pub fn run_round(&mut self, round: usize) -> Result<()> {
        if round >= self.device_schedule.num_rounds {
            return Err(JacobiError::InvalidInput(format!(
                "round {} out of range (schedule has {})",
                round, self.device_schedule.num_rounds
            )));
        }

        let dims = self.device_schedule.round_dims(round);
        let state = &mut self.state;

        self.backend.compute_params(
            &state.a,
            &self.device_schedule,
            dims,
            &mut state.sine,
            &mut state.cosine,
        )?;
        self.backend.row_update(
            &state.a,
            &mut state.x,
            &self.device_schedule,
            dims,
            &state.sine,
            &state.cosine,
        )?;
        self.backend.col_update(
            &mut state.a,
            &state.x,
            &mut state.e,
            &self.device_schedule,
            dims,
            &state.sine,
            &state.cosine,
        )?;

        self.stats.rounds += 1;
        self.stats.rotations += dims.pairs_per_round;
        trace!("round {} applied {} rotations", round, dims.pairs_per_round);
        Ok(())
    }

    /// Apply every round of the schedule once
    pub fn run_sweep(&mut self) -> Result<()> {
        for round in 0..self.device_schedule.num_rounds {
            self.run_round(round)?;
        }
        self.stats.sweeps += 1;
        Ok(())
    }

    /// Run the configured number of sweeps, stopping early only when a
    /// tolerance is set and reached
    pub fn run(&mut self) -> Result<SweepStats> {
        for sweep in 0..self.config.max_sweeps {
            self.run_sweep()?;

            if let Some(tolerance) = self.config.tolerance {
                let off = self.off_diagonal_norm()?;
                self.stats.off_diagonal_norm = Some(off);
                debug!("sweep {}: off-diagonal norm {:.3e}", sweep, off);
                if off <= tolerance {
                    self.stats.converged = true;
                    info!("converged after {} sweeps (off-diagonal {:.3e})", sweep + 1, off);
                    break;
                }
            } else {
                debug!("sweep {} complete", sweep);
            }
        }
        Ok(self.stats.clone())
    }

    pub fn off_diagonal_norm(&self) -> Result<f64> {
        self.backend.off_diagonal_norm(&self.state.a, self.state.size)
    }

    /// Download the current working matrix
    pub fn working_matrix(&self) -> Result<Matrix<f64>> {
        let data = self.backend.download(&self.state.a)?;
        Matrix::from_flat(data, self.state.size, self.state.size)
    }

    /// Download the eigenvector accumulator with eigenvectors as columns
    pub fn eigenvectors(&self) -> Result<Matrix<f64>> {
        let data = self.backend.download(&self.state.e)?;
        Ok(Matrix::from_flat(data, self.state.size, self.state.size)?.transpose())
    }

    /// Hand the buffers to the next stage
    pub fn into_state(self) -> (SweepState<B>, SweepStats) {
        (self.state, self.stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::CpuBackend;
    use crate::matrix::random_matrix;

    /// Symmetric, well-conditioned test matrix: DᵀD / N plus a diagonal shift
    fn spd_matrix(p: usize, seed: u64) -> Matrix<f64> {
        let d = random_matrix(p + 3, p, seed);
        let mut a = d.transpose().matmul(&d).unwrap();
        let scale = (p + 3) as f64 * 10.0;
        for i in 0..p {
            for j in 0..p {
                *a.get_mut(i, j) /= scale;
            }
            *a.get_mut(i, i) += 0.1 * (i + 1) as f64;
        }
        a
    }

    #[test]
    fn test_symmetry_and_orthogonality_after_every_round() {
        let backend = CpuBackend::new();
        for &p in &[2usize, 3, 5, 6, 9] {
            let a = spd_matrix(p, 11 + p as u64);
            let mut controller =
                SweepController::from_matrix(&backend, &a, SweepConfig::default()).unwrap();
            let rounds = controller.schedule().num_rounds();
            for _ in 0..3 {
                for r in 0..rounds {
                    controller.run_round(r).unwrap();
                    let work = controller.working_matrix().unwrap();
                    let e = controller.eigenvectors().unwrap();
                    assert!(work.symmetry_error() < 1e-4, "p={} round {}", p, r);
                    assert!(e.orthogonality_error() < 1e-4, "p={} round {}", p, r);
                }
            }
        }
    }

    #[test]
    fn test_off_diagonal_norm_non_increasing_across_sweeps() {
        let backend = CpuBackend::new();
        for &p in &[4usize, 7, 8] {
            let a = spd_matrix(p, 3 * p as u64);
            let mut controller =
                SweepController::from_matrix(&backend, &a, SweepConfig::default()).unwrap();
            let mut previous = controller.off_diagonal_norm().unwrap();
            for _ in 0..6 {
                controller.run_sweep().unwrap();
                let current = controller.off_diagonal_norm().unwrap();
                assert!(current <= previous + 1e-12, "p={}: {} > {}", p, current, previous);
                previous = current;
            }
            assert!(previous < 1e-3);
        }
    }

    #[test]
    fn test_fixed_sweep_count_is_default() {
        let backend = CpuBackend::new();
        let a = spd_matrix(6, 1);
        let mut controller =
            SweepController::from_matrix(&backend, &a, SweepConfig::default()).unwrap();
        let stats = controller.run().unwrap();
        assert_eq!(stats.sweeps, MAX_SWEEPS);
        assert_eq!(stats.rounds, MAX_SWEEPS * 5);
        assert_eq!(stats.rotations, MAX_SWEEPS * 5 * 3);
        assert!(!stats.converged);
    }

    #[test]
    fn test_tolerance_stops_early() {
        let backend = CpuBackend::new();
        let a = spd_matrix(6, 2);
        let config = SweepConfig::default().with_tolerance(1e-6);
        let mut controller = SweepController::from_matrix(&backend, &a, config).unwrap();
        let stats = controller.run().unwrap();
        assert!(stats.converged);
        assert!(stats.sweeps < MAX_SWEEPS);
        assert!(stats.off_diagonal_norm.unwrap() <= 1e-6);
    }

    #[test]
    fn test_eigen_identity_after_sweeps() {
        // E · diag(A_final) · Eᵀ reproduces the input
        let backend = CpuBackend::new();
        let a = spd_matrix(5, 9);
        let mut controller =
            SweepController::from_matrix(&backend, &a, SweepConfig::default()).unwrap();
        controller.run().unwrap();
        let e = controller.eigenvectors().unwrap();
        let lambda = Matrix::from_diagonal(&controller.working_matrix().unwrap().diagonal());
        let rebuilt = e.matmul(&lambda).unwrap().matmul(&e.transpose()).unwrap();
        assert!(rebuilt.max_abs_diff(&a) < 1e-3);
    }

    #[test]
    fn test_rejects_bad_input() {
        let backend = CpuBackend::new();
        let rect = Matrix::zeros(2, 3);
        assert!(matches!(
            SweepController::from_matrix(&backend, &rect, SweepConfig::default()),
            Err(JacobiError::InvalidInput(_))
        ));
        let tiny = Matrix::identity(1);
        assert!(matches!(
            SweepController::from_matrix(&backend, &tiny, SweepConfig::default()),
            Err(JacobiError::InvalidInput(_))
        ));
        let mut controller =
            SweepController::from_matrix(&backend, &Matrix::identity(4), SweepConfig::default())
                .unwrap();
        assert!(controller.run_round(3).is_err());
    }
}
