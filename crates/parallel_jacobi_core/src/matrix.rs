//! Dense matrix operations
//!
//! Row-major dense matrix representation used on the host side of the
//! pipeline (inputs, downloaded results, validation).

use crate::error::{JacobiError, Result};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Dense matrix in row-major order
#[derive(Debug, Clone, PartialEq)]
pub struct Matrix<T> {
    data: Vec<T>,
    rows: usize,
    cols: usize,
}

impl<T: Clone> Matrix<T> {
    /// Create a matrix from a flat vector (row-major order)
    pub fn from_flat(data: Vec<T>, rows: usize, cols: usize) -> Result<Self> {
        if data.len() != rows * cols {
            return Err(JacobiError::DimensionMismatch {
                expected: rows * cols,
                actual: data.len(),
            });
        }
        Ok(Self { data, rows, cols })
    }

    /// Create a matrix from row vectors, rejecting ragged input
    pub fn from_rows(rows: &[Vec<T>]) -> Result<Self> {
        let cols = rows.first().map_or(0, Vec::len);
        let mut data = Vec::with_capacity(rows.len() * cols);
        for (i, row) in rows.iter().enumerate() {
            if row.len() != cols {
                return Err(JacobiError::InvalidInput(format!(
                    "row {} has {} columns, expected {}",
                    i,
                    row.len(),
                    cols
                )));
            }
            data.extend_from_slice(row);
        }
        Ok(Self {
            data,
            rows: rows.len(),
            cols,
        })
    }

    /// Get matrix dimensions
    pub fn dims(&self) -> (usize, usize) {
        (self.rows, self.cols)
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    /// Access element at (i, j)
    pub fn get(&self, i: usize, j: usize) -> &T {
        &self.data[i * self.cols + j]
    }

    /// Mutable access to element at (i, j)
    pub fn get_mut(&mut self, i: usize, j: usize) -> &mut T {
        &mut self.data[i * self.cols + j]
    }

    pub fn as_slice(&self) -> &[T] {
        &self.data
    }

    pub fn into_data(self) -> Vec<T> {
        self.data
    }

    /// Get a row as a slice
    pub fn row(&self, i: usize) -> &[T] {
        let start = i * self.cols;
        &self.data[start..start + self.cols]
    }

    /// Host-side transpose
    pub fn transpose(&self) -> Self {
        let mut data = Vec::with_capacity(self.data.len());
        for j in 0..self.cols {
            for i in 0..self.rows {
                data.push(self.get(i, j).clone());
            }
        }
        Self {
            data,
            rows: self.cols,
            cols: self.rows,
        }
    }
}

impl Matrix<f64> {
    /// Create a zero matrix
    pub fn zeros(rows: usize, cols: usize) -> Self {
        Self {
            data: vec![0.0; rows * cols],
            rows,
            cols,
        }
    }

    /// Create an identity matrix
    pub fn identity(n: usize) -> Self {
        let mut m = Self::zeros(n, n);
        for i in 0..n {
            *m.get_mut(i, i) = 1.0;
        }
        m
    }

    /// Square diagonal matrix from a vector
    pub fn from_diagonal(diag: &[f64]) -> Self {
        let mut m = Self::zeros(diag.len(), diag.len());
        for (i, &v) in diag.iter().enumerate() {
            *m.get_mut(i, i) = v;
        }
        m
    }

    pub fn diagonal(&self) -> Vec<f64> {
        (0..self.rows.min(self.cols)).map(|i| *self.get(i, i)).collect()
    }

    /// Naive host-side product, used for validation rather than in the sweep path
    pub fn matmul(&self, other: &Self) -> Result<Self> {
        if self.cols != other.rows {
            return Err(JacobiError::InvalidInput(format!(
                "cannot multiply {}x{} by {}x{}",
                self.rows, self.cols, other.rows, other.cols
            )));
        }
        let mut out = Self::zeros(self.rows, other.cols);
        for i in 0..self.rows {
            for k in 0..self.cols {
                let aik = *self.get(i, k);
                for j in 0..other.cols {
                    *out.get_mut(i, j) += aik * other.get(k, j);
                }
            }
        }
        Ok(out)
    }

    pub fn frobenius_norm(&self) -> f64 {
        self.data.iter().map(|v| v * v).sum::<f64>().sqrt()
    }

    /// Frobenius norm of the strictly off-diagonal part
    pub fn off_diagonal_norm(&self) -> f64 {
        off_diagonal_norm(&self.data, self.rows)
    }

    /// ‖A − Aᵀ‖_F
    pub fn symmetry_error(&self) -> f64 {
        let n = self.rows.min(self.cols);
        let mut sum = 0.0;
        for i in 0..n {
            for j in 0..n {
                let d = self.get(i, j) - self.get(j, i);
                sum += d * d;
            }
        }
        sum.sqrt()
    }

    /// ‖MᵀM − I‖_F
    pub fn orthogonality_error(&self) -> f64 {
        let mut sum = 0.0;
        for i in 0..self.cols {
            for j in 0..self.cols {
                let mut dot = 0.0;
                for r in 0..self.rows {
                    dot += self.get(r, i) * self.get(r, j);
                }
                let target = if i == j { 1.0 } else { 0.0 };
                sum += (dot - target) * (dot - target);
            }
        }
        sum.sqrt()
    }

    /// Largest absolute elementwise difference
    pub fn max_abs_diff(&self, other: &Self) -> f64 {
        self.data
            .iter()
            .zip(&other.data)
            .map(|(a, b)| (a - b).abs())
            .fold(0.0, f64::max)
    }
}

/// Frobenius norm of the off-diagonal part of a row-major n×n matrix
pub fn off_diagonal_norm(data: &[f64], n: usize) -> f64 {
    let mut sum = 0.0;
    for i in 0..n {
        for j in 0..n {
            if i != j {
                let v = data[i * n + j];
                sum += v * v;
            }
        }
    }
    sum.sqrt()
}

/// Random integer-valued matrix with entries in [0, 9), the harness input
pub fn random_matrix(rows: usize, cols: usize, seed: u64) -> Matrix<f64> {
    let mut rng = StdRng::seed_from_u64(seed);
    let data = (0..rows * cols)
        .map(|_| rng.gen_range(0..9) as f64)
        .collect();
    Matrix {
        data,
        rows,
        cols,
    }
}
