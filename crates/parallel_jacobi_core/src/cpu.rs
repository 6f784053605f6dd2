//! CPU kernels
//!
//! Each function mirrors one device kernel. A rayon task plays the part of a
//! thread block; tile-local arrays play the part of shared memory. Mutable
//! outputs are split into disjoint slices before the parallel section, so one
//! lane never observes another lane's writes.

use crate::backend::{RoundDims, MULTIPLY_TILE, TRANSPOSE_TILE};
use crate::error::{JacobiError, Result};
use crate::rotation::RotationParams;
use crate::schedule::NO_BYE;
use rayon::prelude::*;

/// Decode the pairs of one round from the flattened schedule table
pub(crate) fn round_pairs(flat: &[u32], dims: RoundDims) -> Result<Vec<(usize, usize)>> {
    let start = dims.round * dims.pairs_per_round * 2;
    let end = start + dims.pairs_per_round * 2;
    if end > flat.len() {
        return Err(JacobiError::InvalidInput(format!(
            "round {} is outside the pair schedule",
            dims.round
        )));
    }

    flat[start..end]
        .chunks_exact(2)
        .map(|pair| {
            let (k, l) = (pair[0] as usize, pair[1] as usize);
            if k >= dims.size || l >= dims.size || k == l {
                return Err(JacobiError::InvalidInput(format!(
                    "bad pair ({}, {}) for size {}",
                    k, l, dims.size
                )));
            }
            Ok((k, l))
        })
        .collect()
}

pub(crate) fn round_bye(flat: &[u32], dims: RoundDims) -> Result<Option<usize>> {
    match flat.get(dims.round) {
        Some(&NO_BYE) => Ok(None),
        Some(&b) if (b as usize) < dims.size => Ok(Some(b as usize)),
        Some(&b) => Err(JacobiError::InvalidInput(format!(
            "bye index {} out of range for size {}",
            b, dims.size
        ))),
        None => Err(JacobiError::InvalidInput(format!(
            "round {} has no bye entry",
            dims.round
        ))),
    }
}

/// Tiled transpose; one task per band of `TRANSPOSE_TILE` output rows
pub(crate) fn transpose_tiled(input: &[f64], rows: usize, cols: usize, output: &mut [f64]) {
    if rows == 0 || cols == 0 {
        return;
    }

    output
        .par_chunks_mut(TRANSPOSE_TILE * rows)
        .enumerate()
        .for_each(|(band, out_band)| {
            let j0 = band * TRANSPOSE_TILE;
            let width = TRANSPOSE_TILE.min(cols - j0);
            let mut tile = [[0.0f64; TRANSPOSE_TILE]; TRANSPOSE_TILE];

            for i0 in (0..rows).step_by(TRANSPOSE_TILE) {
                let height = TRANSPOSE_TILE.min(rows - i0);

                for (ii, tile_row) in tile.iter_mut().enumerate().take(height) {
                    let src = &input[(i0 + ii) * cols + j0..(i0 + ii) * cols + j0 + width];
                    tile_row[..width].copy_from_slice(src);
                }

                for jj in 0..width {
                    for ii in 0..height {
                        out_band[jj * rows + i0 + ii] = tile[ii][jj];
                    }
                }
            }
        });
}

/// Blocked `c = a · b`; one task per band of `MULTIPLY_TILE` output rows.
///
/// Every K step loads an A tile and a B tile (zero padded at the edges), then
/// accumulates their product into the output tile.
pub(crate) fn matmul_tiled(a: &[f64], b: &[f64], c: &mut [f64], m: usize, k: usize, n: usize) {
    if m == 0 || n == 0 {
        return;
    }

    c.par_chunks_mut(MULTIPLY_TILE * n)
        .enumerate()
        .for_each(|(band, c_band)| {
            let i0 = band * MULTIPLY_TILE;
            let height = MULTIPLY_TILE.min(m - i0);

            for j0 in (0..n).step_by(MULTIPLY_TILE) {
                let width = MULTIPLY_TILE.min(n - j0);
                let mut acc = [[0.0f64; MULTIPLY_TILE]; MULTIPLY_TILE];

                for k0 in (0..k).step_by(MULTIPLY_TILE) {
                    let depth = MULTIPLY_TILE.min(k - k0);
                    let mut a_tile = [[0.0f64; MULTIPLY_TILE]; MULTIPLY_TILE];
                    let mut b_tile = [[0.0f64; MULTIPLY_TILE]; MULTIPLY_TILE];

                    // load phase
                    for ii in 0..height {
                        let row = (i0 + ii) * k + k0;
                        a_tile[ii][..depth].copy_from_slice(&a[row..row + depth]);
                    }
                    for t in 0..depth {
                        let row = (k0 + t) * n + j0;
                        b_tile[t][..width].copy_from_slice(&b[row..row + width]);
                    }

                    // consume phase
                    for ii in 0..height {
                        for t in 0..depth {
                            let av = a_tile[ii][t];
                            for jj in 0..width {
                                acc[ii][jj] += av * b_tile[t][jj];
                            }
                        }
                    }
                }

                for ii in 0..height {
                    c_band[ii * n + j0..ii * n + j0 + width].copy_from_slice(&acc[ii][..width]);
                }
            }
        });
}

/// One lane per pair slot
pub(crate) fn compute_params(
    a: &[f64],
    p: usize,
    pairs: &[(usize, usize)],
    sine: &mut [f64],
    cosine: &mut [f64],
) {
    let slots = pairs.len();
    sine[..slots]
        .par_iter_mut()
        .zip(cosine[..slots].par_iter_mut())
        .zip(pairs.par_iter())
        .for_each(|((s, c), &(k, l))| {
            let rot = RotationParams::compute(a[k * p + k], a[l * p + l], a[k * p + l]);
            *s = rot.sine;
            *c = rot.cosine;
        });
}

/// Row phase. Lane `c` owns row `c` of the scratch, which holds column `c` of
/// the row-rotated matrix; `a` is read-only for the whole phase.
pub(crate) fn row_update(
    a: &[f64],
    x: &mut [f64],
    p: usize,
    pairs: &[(usize, usize)],
    bye: Option<usize>,
    sine: &[f64],
    cosine: &[f64],
) {
    x.par_chunks_mut(p).enumerate().for_each(|(c, x_row)| {
        for (slot, &(k, l)) in pairs.iter().enumerate() {
            let (s, cs) = (sine[slot], cosine[slot]);
            let elem_k = a[k * p + c];
            let elem_l = a[l * p + c];
            x_row[k] = elem_k * cs - elem_l * s;
            x_row[l] = elem_k * s + elem_l * cs;
        }
        if let Some(b) = bye {
            x_row[b] = a[b * p + c];
        }
    });
}

/// Exclusive handles on the rows one pair rewrites
struct PairLane<'a> {
    k: usize,
    l: usize,
    a_k: &'a mut [f64],
    a_l: &'a mut [f64],
    e_k: &'a mut [f64],
    e_l: &'a mut [f64],
    rot: RotationParams,
}

impl PairLane<'_> {
    fn apply(self, x: &[f64], p: usize) {
        let (s, cs) = (self.rot.sine, self.rot.cosine);
        let x_k = &x[self.k * p..(self.k + 1) * p];
        let x_l = &x[self.l * p..(self.l + 1) * p];

        for c in 0..p {
            // compute both, then commit both
            let new_a_k = x_k[c] * cs - x_l[c] * s;
            let new_a_l = x_k[c] * s + x_l[c] * cs;
            let new_e_k = self.e_k[c] * cs - self.e_l[c] * s;
            let new_e_l = self.e_k[c] * s + self.e_l[c] * cs;

            self.a_k[c] = new_a_k;
            self.a_l[c] = new_a_l;
            self.e_k[c] = new_e_k;
            self.e_l[c] = new_e_l;
        }
    }
}

fn take_row<'a>(rows: &mut [Option<&'a mut [f64]>], index: usize) -> Result<&'a mut [f64]> {
    rows[index].take().ok_or_else(|| {
        JacobiError::InvalidInput(format!("index {} appears twice in one round", index))
    })
}

/// Column phase. One lane per pair; each lane exclusively owns rows k and l of
/// both `a` and `e`. The bye row of `a` is refreshed from the scratch.
#[allow(clippy::too_many_arguments)]
pub(crate) fn col_update(
    a: &mut [f64],
    x: &[f64],
    e: &mut [f64],
    p: usize,
    pairs: &[(usize, usize)],
    bye: Option<usize>,
    sine: &[f64],
    cosine: &[f64],
) -> Result<()> {
    let mut a_rows: Vec<Option<&mut [f64]>> = a.chunks_mut(p).map(Some).collect();
    let mut e_rows: Vec<Option<&mut [f64]>> = e.chunks_mut(p).map(Some).collect();

    let mut lanes = Vec::with_capacity(pairs.len());
    for (slot, &(k, l)) in pairs.iter().enumerate() {
        lanes.push(PairLane {
            k,
            l,
            a_k: take_row(&mut a_rows, k)?,
            a_l: take_row(&mut a_rows, l)?,
            e_k: take_row(&mut e_rows, k)?,
            e_l: take_row(&mut e_rows, l)?,
            rot: RotationParams {
                sine: sine[slot],
                cosine: cosine[slot],
            },
        });
    }
    let bye_row = match bye {
        Some(b) => Some((b, take_row(&mut a_rows, b)?)),
        None => None,
    };

    lanes.into_par_iter().for_each(|lane| lane.apply(x, p));

    if let Some((b, row)) = bye_row {
        row.copy_from_slice(&x[b * p..(b + 1) * p]);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn naive_matmul(a: &[f64], b: &[f64], m: usize, k: usize, n: usize) -> Vec<f64> {
        let mut c = vec![0.0; m * n];
        for i in 0..m {
            for t in 0..k {
                for j in 0..n {
                    c[i * n + j] += a[i * k + t] * b[t * n + j];
                }
            }
        }
        c
    }

    #[test]
    fn test_matmul_non_multiple_dims() {
        let (m, k, n) = (37, 19, 23);
        let a: Vec<f64> = (0..m * k).map(|i| ((i * 7) % 11) as f64 - 5.0).collect();
        let b: Vec<f64> = (0..k * n).map(|i| ((i * 3) % 13) as f64 * 0.5).collect();
        let mut c = vec![0.0; m * n];
        matmul_tiled(&a, &b, &mut c, m, k, n);
        assert_eq!(c, naive_matmul(&a, &b, m, k, n));
    }

    #[test]
    fn test_transpose_non_multiple_dims() {
        let (rows, cols) = (45, 33);
        let input: Vec<f64> = (0..rows * cols).map(|i| i as f64).collect();
        let mut output = vec![0.0; rows * cols];
        transpose_tiled(&input, rows, cols, &mut output);
        for i in 0..rows {
            for j in 0..cols {
                assert_eq!(output[j * rows + i], input[i * cols + j]);
            }
        }
    }

    #[test]
    fn test_repeated_index_is_rejected() {
        let p = 4;
        let mut a = vec![0.0; p * p];
        let x = vec![0.0; p * p];
        let mut e = vec![0.0; p * p];
        let pairs = [(0, 1), (1, 2)];
        let result = col_update(&mut a, &x, &mut e, p, &pairs, None, &[0.0; 2], &[1.0; 2]);
        assert!(matches!(result, Err(JacobiError::InvalidInput(_))));
    }

    #[test]
    fn test_round_decoding_validates_indices() {
        let dims = RoundDims {
            size: 3,
            round: 0,
            pairs_per_round: 1,
        };
        assert_eq!(round_pairs(&[0, 2], dims).unwrap(), vec![(0, 2)]);
        assert!(round_pairs(&[0, 3], dims).is_err());
        assert!(round_pairs(&[], dims).is_err());
        assert_eq!(round_bye(&[1], dims).unwrap(), Some(1));
        assert_eq!(round_bye(&[NO_BYE], dims).unwrap(), None);
        assert!(round_bye(&[7], dims).is_err());
    }
}
