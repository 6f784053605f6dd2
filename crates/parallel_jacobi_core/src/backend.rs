//! Backend trait for CPU/GPU dispatch
//!
//! A backend owns no decomposition state. It hands out buffer handles and runs
//! stateless kernels over them; the sweep controller and SVD assembler decide
//! which buffers flow into which stage. Buffers stay resident on the backend
//! for the whole decomposition and only cross the host boundary at entry and
//! exit.

use crate::cpu;
use crate::error::{JacobiError, Result};
use crate::schedule::PairSchedule;

/// Edge of the square tiles used by [`Backend::matmul`]
pub const MULTIPLY_TILE: usize = 16;
/// Edge of the square tiles used by [`Backend::transpose`]
pub const TRANSPOSE_TILE: usize = 32;
/// Upper bound on lanes per work group
pub const MAX_BLOCK_SIZE: usize = 1024;

/// Launch geometry of one Jacobi round
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoundDims {
    /// Matrix dimension P
    pub size: usize,
    pub round: usize,
    pub pairs_per_round: usize,
}

/// Pair table uploaded to a backend, shared read-only by every round
pub struct DeviceSchedule<B: Backend> {
    pub pairs: B::IndexBuffer,
    pub byes: B::IndexBuffer,
    pub size: usize,
    pub num_rounds: usize,
    pub pairs_per_round: usize,
}

impl<B: Backend> DeviceSchedule<B> {
    pub fn upload(backend: &B, schedule: &PairSchedule) -> Result<Self> {
        Ok(Self {
            pairs: backend.upload_indices(&schedule.flat_pairs())?,
            byes: backend.upload_indices(&schedule.flat_byes())?,
            size: schedule.size(),
            num_rounds: schedule.num_rounds(),
            pairs_per_round: schedule.pairs_per_round(),
        })
    }

    pub fn round_dims(&self, round: usize) -> RoundDims {
        RoundDims {
            size: self.size,
            round,
            pairs_per_round: self.pairs_per_round,
        }
    }
}

/// Data-parallel kernels for the Jacobi SVD
///
/// Implementations can target the CPU (rayon lanes) or a CUDA device.
/// All matrices are row-major `f64`.
pub trait Backend: Send + Sync + Sized {
    /// Dense `f64` storage living on the backend
    type Buffer: Send + Sync;
    /// `u32` storage for schedule tables
    type IndexBuffer: Send + Sync;

    /// Name of this backend (for logging)
    fn name(&self) -> &'static str;

    fn upload(&self, data: &[f64]) -> Result<Self::Buffer>;

    fn upload_indices(&self, data: &[u32]) -> Result<Self::IndexBuffer>;

    fn alloc_zeros(&self, len: usize) -> Result<Self::Buffer>;

    fn download(&self, buffer: &Self::Buffer) -> Result<Vec<f64>>;

    /// Number of elements held by `buffer`
    fn buffer_len(&self, buffer: &Self::Buffer) -> usize;

    /// `output[j, i] = input[i, j]` for a `rows`×`cols` input, tiled
    fn transpose(
        &self,
        input: &Self::Buffer,
        rows: usize,
        cols: usize,
        output: &mut Self::Buffer,
    ) -> Result<()>;

    /// `c = a · b` with `a` of shape `m`×`k` and `b` of shape `k`×`n`, tiled
    fn matmul(
        &self,
        a: &Self::Buffer,
        b: &Self::Buffer,
        c: &mut Self::Buffer,
        m: usize,
        k: usize,
        n: usize,
    ) -> Result<()>;

    /// One (sin, cos) per pair slot of `dims.round`; `a` is only read
    fn compute_params(
        &self,
        a: &Self::Buffer,
        schedule: &DeviceSchedule<Self>,
        dims: RoundDims,
        sine: &mut Self::Buffer,
        cosine: &mut Self::Buffer,
    ) -> Result<()>;

    /// Row phase: rotate rows k, l of `a` into the transposed scratch `x`.
    /// The bye row, if any, is carried over unrotated.
    fn row_update(
        &self,
        a: &Self::Buffer,
        x: &mut Self::Buffer,
        schedule: &DeviceSchedule<Self>,
        dims: RoundDims,
        sine: &Self::Buffer,
        cosine: &Self::Buffer,
    ) -> Result<()>;

    /// Column phase: finish `JᵀAJ` into `a` from `x`, and rotate the
    /// eigenvector accumulator `e` (stored column-major, so its rows rotate).
    #[allow(clippy::too_many_arguments)]
    fn col_update(
        &self,
        a: &mut Self::Buffer,
        x: &Self::Buffer,
        e: &mut Self::Buffer,
        schedule: &DeviceSchedule<Self>,
        dims: RoundDims,
        sine: &Self::Buffer,
        cosine: &Self::Buffer,
    ) -> Result<()>;

    /// Frobenius norm of the off-diagonal part of the `n`×`n` matrix in `a`
    ///
    /// Default implementation downloads the matrix. Only used when a
    /// convergence tolerance is configured.
    fn off_diagonal_norm(&self, a: &Self::Buffer, n: usize) -> Result<f64> {
        let host = self.download(a)?;
        Ok(crate::matrix::off_diagonal_norm(&host, n))
    }

    /// Identity matrix of size `n` on the backend
    fn identity(&self, n: usize) -> Result<Self::Buffer> {
        let mut host = vec![0.0; n * n];
        for i in 0..n {
            host[i * n + i] = 1.0;
        }
        self.upload(&host)
    }
}

/// Fail fast when a buffer handed to a kernel has the wrong size
pub(crate) fn check_len(actual: usize, expected: usize) -> Result<()> {
    if actual < expected {
        return Err(JacobiError::DimensionMismatch { expected, actual });
    }
    Ok(())
}

/// CPU backend: every kernel is a rayon parallel loop over disjoint lanes
pub struct CpuBackend;

impl CpuBackend {
    pub fn new() -> Self {
        Self
    }
}

impl Default for CpuBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl Backend for CpuBackend {
    type Buffer = Vec<f64>;
    type IndexBuffer = Vec<u32>;

    fn name(&self) -> &'static str {
        "CPU"
    }

    fn upload(&self, data: &[f64]) -> Result<Vec<f64>> {
        Ok(data.to_vec())
    }

    fn upload_indices(&self, data: &[u32]) -> Result<Vec<u32>> {
        Ok(data.to_vec())
    }

    fn alloc_zeros(&self, len: usize) -> Result<Vec<f64>> {
        Ok(vec![0.0; len])
    }

    fn download(&self, buffer: &Vec<f64>) -> Result<Vec<f64>> {
        Ok(buffer.clone())
    }

    fn buffer_len(&self, buffer: &Vec<f64>) -> usize {
        buffer.len()
    }

    fn transpose(
        &self,
        input: &Vec<f64>,
        rows: usize,
        cols: usize,
        output: &mut Vec<f64>,
    ) -> Result<()> {
        check_len(input.len(), rows * cols)?;
        check_len(output.len(), rows * cols)?;
        cpu::transpose_tiled(input, rows, cols, &mut output[..rows * cols]);
        Ok(())
    }

    fn matmul(
        &self,
        a: &Vec<f64>,
        b: &Vec<f64>,
        c: &mut Vec<f64>,
        m: usize,
        k: usize,
        n: usize,
    ) -> Result<()> {
        check_len(a.len(), m * k)?;
        check_len(b.len(), k * n)?;
        check_len(c.len(), m * n)?;
        cpu::matmul_tiled(a, b, &mut c[..m * n], m, k, n);
        Ok(())
    }

    fn compute_params(
        &self,
        a: &Vec<f64>,
        schedule: &DeviceSchedule<Self>,
        dims: RoundDims,
        sine: &mut Vec<f64>,
        cosine: &mut Vec<f64>,
    ) -> Result<()> {
        check_len(a.len(), dims.size * dims.size)?;
        check_len(sine.len(), dims.pairs_per_round)?;
        check_len(cosine.len(), dims.pairs_per_round)?;
        let pairs = cpu::round_pairs(&schedule.pairs, dims)?;
        cpu::compute_params(a, dims.size, &pairs, sine, cosine);
        Ok(())
    }

    fn row_update(
        &self,
        a: &Vec<f64>,
        x: &mut Vec<f64>,
        schedule: &DeviceSchedule<Self>,
        dims: RoundDims,
        sine: &Vec<f64>,
        cosine: &Vec<f64>,
    ) -> Result<()> {
        let p = dims.size;
        check_len(a.len(), p * p)?;
        check_len(x.len(), p * p)?;
        check_len(sine.len(), dims.pairs_per_round)?;
        check_len(cosine.len(), dims.pairs_per_round)?;
        let pairs = cpu::round_pairs(&schedule.pairs, dims)?;
        let bye = cpu::round_bye(&schedule.byes, dims)?;
        cpu::row_update(a, &mut x[..p * p], p, &pairs, bye, sine, cosine);
        Ok(())
    }

    fn col_update(
        &self,
        a: &mut Vec<f64>,
        x: &Vec<f64>,
        e: &mut Vec<f64>,
        schedule: &DeviceSchedule<Self>,
        dims: RoundDims,
        sine: &Vec<f64>,
        cosine: &Vec<f64>,
    ) -> Result<()> {
        let p = dims.size;
        check_len(a.len(), p * p)?;
        check_len(x.len(), p * p)?;
        check_len(e.len(), p * p)?;
        check_len(sine.len(), dims.pairs_per_round)?;
        check_len(cosine.len(), dims.pairs_per_round)?;
        let pairs = cpu::round_pairs(&schedule.pairs, dims)?;
        let bye = cpu::round_bye(&schedule.byes, dims)?;
        cpu::col_update(
            &mut a[..p * p],
            x,
            &mut e[..p * p],
            p,
            &pairs,
            bye,
            sine,
            cosine,
        )
    }

    fn off_diagonal_norm(&self, a: &Vec<f64>, n: usize) -> Result<f64> {
        check_len(a.len(), n * n)?;
        Ok(crate::matrix::off_diagonal_norm(a, n))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_cpu_transpose() {
        let backend = CpuBackend::new();
        let input: Vec<f64> = (0..6).map(f64::from).collect();
        let mut out = backend.alloc_zeros(6).unwrap();
        backend.transpose(&input, 2, 3, &mut out).unwrap();
        assert_eq!(out, vec![0.0, 3.0, 1.0, 4.0, 2.0, 5.0]);
    }

    #[test]
    fn test_cpu_matmul() {
        let backend = CpuBackend::new();
        // [[1, 2], [3, 4]] · [[5, 6], [7, 8]] = [[19, 22], [43, 50]]
        let a = vec![1.0, 2.0, 3.0, 4.0];
        let b = vec![5.0, 6.0, 7.0, 8.0];
        let mut c = backend.alloc_zeros(4).unwrap();
        backend.matmul(&a, &b, &mut c, 2, 2, 2).unwrap();
        assert_eq!(c, vec![19.0, 22.0, 43.0, 50.0]);
    }

    #[test]
    fn test_short_buffer_is_rejected() {
        let backend = CpuBackend::new();
        let a = vec![1.0; 3];
        let b = vec![1.0; 4];
        let mut c = backend.alloc_zeros(4).unwrap();
        assert!(matches!(
            backend.matmul(&a, &b, &mut c, 2, 2, 2),
            Err(JacobiError::DimensionMismatch { expected: 4, actual: 3 })
        ));
    }

    #[test]
    fn test_short_rotation_buffers_are_rejected() {
        let backend = CpuBackend::new();
        let p = 4;
        let schedule = PairSchedule::new(p).unwrap();
        let device_schedule = DeviceSchedule::upload(&backend, &schedule).unwrap();
        let dims = device_schedule.round_dims(0);

        let mut a = backend.identity(p).unwrap();
        let mut x = backend.alloc_zeros(p * p).unwrap();
        let mut e = backend.identity(p).unwrap();
        let short = vec![0.0; 1];
        let full = vec![1.0; dims.pairs_per_round];

        assert!(matches!(
            backend.row_update(&a, &mut x, &device_schedule, dims, &short, &full),
            Err(JacobiError::DimensionMismatch { expected: 2, actual: 1 })
        ));
        assert!(matches!(
            backend.row_update(&a, &mut x, &device_schedule, dims, &full, &short),
            Err(JacobiError::DimensionMismatch { expected: 2, actual: 1 })
        ));
        assert!(matches!(
            backend.col_update(&mut a, &x, &mut e, &device_schedule, dims, &short, &full),
            Err(JacobiError::DimensionMismatch { expected: 2, actual: 1 })
        ));
        assert!(matches!(
            backend.col_update(&mut a, &x, &mut e, &device_schedule, dims, &full, &short),
            Err(JacobiError::DimensionMismatch { expected: 2, actual: 1 })
        ));
    }

    #[test]
    fn test_single_round_zeroes_its_pairs() {
        let backend = CpuBackend::new();
        let p = 4;
        #[rustfmt::skip]
        let host = vec![
            4.0, 1.0, 0.5, 0.2,
            1.0, 3.0, 0.3, 0.7,
            0.5, 0.3, 2.0, 0.1,
            0.2, 0.7, 0.1, 1.0,
        ];
        let schedule = PairSchedule::new(p).unwrap();
        let device_schedule = DeviceSchedule::upload(&backend, &schedule).unwrap();
        let dims = device_schedule.round_dims(0);

        let mut a = backend.upload(&host).unwrap();
        let mut x = backend.alloc_zeros(p * p).unwrap();
        let mut e = backend.identity(p).unwrap();
        let mut sine = backend.alloc_zeros(dims.pairs_per_round).unwrap();
        let mut cosine = backend.alloc_zeros(dims.pairs_per_round).unwrap();

        backend
            .compute_params(&a, &device_schedule, dims, &mut sine, &mut cosine)
            .unwrap();
        backend
            .row_update(&a, &mut x, &device_schedule, dims, &sine, &cosine)
            .unwrap();
        backend
            .col_update(&mut a, &x, &mut e, &device_schedule, dims, &sine, &cosine)
            .unwrap();

        for &(k, l) in schedule.round(0) {
            assert_abs_diff_eq!(a[k * p + l], 0.0, epsilon = 1e-12);
            assert_abs_diff_eq!(a[l * p + k], 0.0, epsilon = 1e-12);
        }
        // trace is invariant under similarity
        let trace: f64 = (0..p).map(|i| a[i * p + i]).sum();
        assert_abs_diff_eq!(trace, 10.0, epsilon = 1e-12);
    }
}
