//! Weighted least squares solver.
//!
//! Every fit in this project is a linear regression of the form:
//!
//! ```text
//! minimize Σ ((y_i - x_i^T β) / σ_i)^2
//! ```
//!
//! Implementation choices:
//! - Callers scale rows by `1 / σ_i` and we solve an ordinary least squares problem.
//! - We use SVD so tall design matrices (many more rows than columns) are handled
//!   robustly. (Nalgebra's `QR::solve` is intended for square systems.)
//! - Parameter covariance comes from `(X^T X)^{-1}` on the same scaled matrix.

use nalgebra::{DMatrix, DVector};

/// Solve a least squares problem using SVD.
///
/// Returns `None` if the system is too ill-conditioned to solve robustly.
pub fn solve_least_squares(x: &DMatrix<f64>, y: &DVector<f64>) -> Option<DVector<f64>> {
    let svd = x.clone().svd(true, true);

    // Try progressively looser tolerances if strict solve fails.
    for &tol in &[1e-10, 1e-8, 1e-6] {
        if let Ok(beta) = svd.solve(y, tol) {
            if beta.iter().all(|v| v.is_finite()) {
                return Some(beta);
            }
        }
    }

    None
}

/// Covariance `(X^T X)^{-1}` of a row-scaled design matrix.
///
/// Returns `None` when the normal matrix is singular.
pub fn covariance(x: &DMatrix<f64>) -> Option<DMatrix<f64>> {
    let normal = x.transpose() * x;
    let cov = normal.try_inverse()?;
    if cov.iter().all(|v| v.is_finite()) {
        Some(cov)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn least_squares_solves_simple_system() {
        // Fit y = 2 + 3x on x = [0,1,2]
        let x = DMatrix::from_row_slice(3, 2, &[1.0, 0.0, 1.0, 1.0, 1.0, 2.0]);
        let y = DVector::from_row_slice(&[2.0, 5.0, 8.0]);

        let beta = solve_least_squares(&x, &y).unwrap();
        assert!((beta[0] - 2.0).abs() < 1e-10);
        assert!((beta[1] - 3.0).abs() < 1e-10);
    }

    #[test]
    fn covariance_of_mean_is_sigma_squared_over_n() {
        // Four unit-variance rows estimating a constant.
        let x = DMatrix::from_element(4, 1, 1.0);
        let cov = covariance(&x).unwrap();
        assert!((cov[(0, 0)] - 0.25).abs() < 1e-12);
    }

    #[test]
    fn covariance_rejects_collinear_columns() {
        let x = DMatrix::from_row_slice(3, 2, &[1.0, 2.0, 1.0, 2.0, 1.0, 2.0]);
        assert!(covariance(&x).is_none());
    }
}
