//! Dense linear solve for the Newton step.

use crate::errors::{CoreError, Result};

const PIVOT_EPSILON: f64 = 1e-12;

/// Solve `a * x = b` by Gaussian elimination with partial pivoting.
///
/// `a` is row-major `n x n`; both inputs are consumed as scratch space.
pub fn solve(mut a: Vec<Vec<f64>>, mut b: Vec<f64>) -> Result<Vec<f64>> {
    let n = b.len();
    if a.len() != n || a.iter().any(|row| row.len() != n) {
        return Err(CoreError::InvalidInput(format!(
            "linear system shape mismatch: {} rows for {} unknowns",
            a.len(),
            n
        )));
    }

    for col in 0..n {
        let mut pivot = col;
        for row in (col + 1)..n {
            if a[row][col].abs() > a[pivot][col].abs() {
                pivot = row;
            }
        }
        if a[pivot][col].abs() < PIVOT_EPSILON {
            return Err(CoreError::SingularSystem(col));
        }
        a.swap(col, pivot);
        b.swap(col, pivot);

        for row in (col + 1)..n {
            let factor = a[row][col] / a[col][col];
            if factor == 0.0 {
                continue;
            }
            for k in col..n {
                a[row][k] -= factor * a[col][k];
            }
            b[row] -= factor * b[col];
        }
    }

    let mut x = vec![0.0; n];
    for row in (0..n).rev() {
        let tail: f64 = ((row + 1)..n).map(|k| a[row][k] * x[k]).sum();
        x[row] = (b[row] - tail) / a[row][row];
    }
    Ok(x)
}
