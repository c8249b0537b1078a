//! Dense solver for the small normal-equation systems of the baseline fit

use ndarray::{Array1, Array2, ArrayView1, ArrayView2};
use thiserror::Error;

/// Errors from [`solve`]
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinalgError {
    /// Matrix is not square or does not match the right-hand side
    #[error("matrix dimensions incompatible")]
    DimensionMismatch,

    /// A pivot collapsed, or the matrix is zero or non-finite
    #[error("matrix is singular")]
    Singular,
}

/// Relative pivot size below which the system is treated as singular
const PIVOT_EPSILON: f64 = 1e-12;

/// Solves `a · x = b` by Gaussian elimination with partial pivoting.
///
/// A pivot counts as collapsed when it is at most `PIVOT_EPSILON` times the
/// largest entry of `a`.
pub fn solve(a: ArrayView2<f64>, b: ArrayView1<f64>) -> Result<Array1<f64>, LinalgError> {
    let n = b.len();
    if a.dim() != (n, n) {
        return Err(LinalgError::DimensionMismatch);
    }
    let scale = a.iter().fold(0.0f64, |m, v| m.max(v.abs()));
    if scale == 0.0 || !scale.is_finite() {
        return Err(LinalgError::Singular);
    }

    let mut m: Array2<f64> = a.to_owned();
    let mut rhs: Array1<f64> = b.to_owned();

    for col in 0..n {
        let pivot_row = (col..n)
            .max_by(|&i, &j| m[[i, col]].abs().total_cmp(&m[[j, col]].abs()))
            .ok_or(LinalgError::DimensionMismatch)?;
        if m[[pivot_row, col]].abs() <= PIVOT_EPSILON * scale {
            return Err(LinalgError::Singular);
        }
        if pivot_row != col {
            for k in 0..n {
                m.swap([pivot_row, k], [col, k]);
            }
            rhs.swap(pivot_row, col);
        }

        for row in col + 1..n {
            let factor = m[[row, col]] / m[[col, col]];
            if factor == 0.0 {
                continue;
            }
            for k in col..n {
                m[[row, k]] -= factor * m[[col, k]];
            }
            rhs[row] -= factor * rhs[col];
        }
    }

    let mut x = Array1::zeros(n);
    for row in (0..n).rev() {
        let tail: f64 = (row + 1..n).map(|k| m[[row, k]] * x[k]).sum();
        x[row] = (rhs[row] - tail) / m[[row, row]];
    }
    Ok(x)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_solve_requires_pivoting() -> std::result::Result<(), Box<dyn std::error::Error>> {
        // Zero in the first pivot position
        let a = array![[0.0, 2.0, 1.0], [1.0, 1.0, 0.0], [2.0, 0.0, 3.0]];
        let expected = array![1.0, -1.0, 2.0];
        let b = a.dot(&expected);
        let x = solve(a.view(), b.view())?;
        for (got, want) in x.iter().zip(expected.iter()) {
            assert!((got - want).abs() < 1e-12);
        }
        Ok(())
    }

    #[test]
    fn test_singular_system() {
        let a = array![[1.0, 2.0], [2.0, 4.0]];
        let b = array![1.0, 2.0];
        assert_eq!(solve(a.view(), b.view()), Err(LinalgError::Singular));
    }

    #[test]
    fn test_dimension_mismatch() {
        let a = array![[1.0, 0.0], [0.0, 1.0]];
        let b = array![1.0, 2.0, 3.0];
        assert_eq!(solve(a.view(), b.view()), Err(LinalgError::DimensionMismatch));
    }
}
