//! Closed-form Givens rotation for one Jacobi pair

/// Below this radius the pair is treated as already eliminated
pub const EPSILON: f64 = 1e-4;

/// Sine/cosine of the rotation that annihilates `A[k,l]`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RotationParams {
    pub sine: f64,
    pub cosine: f64,
}

impl RotationParams {
    pub const IDENTITY: Self = Self {
        sine: 0.0,
        cosine: 1.0,
    };

    /// Rotation for the 2×2 block `[[a_kk, a_kl], [a_kl, a_ll]]`.
    ///
    /// Works without an arctangent: with `y = (a_ll - a_kk) / 2`,
    /// `d = |y| + sqrt(a_kl² + y²)` and `rad = sqrt(a_kl² + d²)`,
    /// `cos = d / rad` and `sin = sign(y) · a_kl / rad`. A pair whose `rad`
    /// falls under [`EPSILON`] gets the identity rotation.
    #[inline]
    pub fn compute(a_kk: f64, a_ll: f64, a_kl: f64) -> Self {
        let y = (a_ll - a_kk) * 0.5;
        let d = y.abs() + (a_kl * a_kl + y * y).sqrt();
        let rad = (a_kl * a_kl + d * d).sqrt();

        if rad < EPSILON {
            return Self::IDENTITY;
        }

        // sign(0) = +1: equal diagonals take the 45° rotation
        let sign = if y < 0.0 { -1.0 } else { 1.0 };
        Self {
            sine: sign * a_kl / rad,
            cosine: d / rad,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    /// Apply JᵀAJ to a 2×2 symmetric block and return the new off-diagonal
    fn rotated_off_diagonal(a_kk: f64, a_ll: f64, a_kl: f64) -> f64 {
        let r = RotationParams::compute(a_kk, a_ll, a_kl);
        let (s, c) = (r.sine, r.cosine);
        // row phase then column phase, matching the sweep kernels
        let row_k = (c * a_kk - s * a_kl, c * a_kl - s * a_ll);
        c * row_k.1 + s * row_k.0
    }

    #[test]
    fn test_annihilates_off_diagonal() {
        for &(a_kk, a_ll, a_kl) in &[
            (4.0, 1.0, 2.0),
            (1.0, 4.0, 2.0),
            (3.0, 3.0, 1.5),
            (-2.0, 5.0, -0.7),
            (100.0, 0.5, 1e-3),
        ] {
            assert_abs_diff_eq!(rotated_off_diagonal(a_kk, a_ll, a_kl), 0.0, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_unit_norm() {
        let r = RotationParams::compute(2.0, -1.0, 0.25);
        assert_abs_diff_eq!(r.sine * r.sine + r.cosine * r.cosine, 1.0, epsilon = 1e-14);
    }

    #[test]
    fn test_near_zero_pair_is_identity() {
        assert_eq!(RotationParams::compute(1e-6, 2e-6, 1e-6), RotationParams::IDENTITY);
        assert_eq!(RotationParams::compute(0.0, 0.0, 0.0), RotationParams::IDENTITY);
    }

    #[test]
    fn test_zero_off_diagonal_is_identity_rotation() {
        let r = RotationParams::compute(5.0, 2.0, 0.0);
        assert_abs_diff_eq!(r.sine, 0.0);
        assert_abs_diff_eq!(r.cosine, 1.0);
    }
}
