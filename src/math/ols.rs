//! Ordinary least squares solver.
//!
//! Calibration curves are small linear regression problems of the form:
//!
//! ```text
//! minimize Σ (y_i - x_i^T β)^2
//! ```
//!
//! with a design row `x_i = [1, log10(conc_i)]`.
//!
//! Implementation choices:
//! - We solve with SVD so tall design matrices (more rows than columns) are
//!   handled without forming the normal equations.
//!   (Nalgebra's `QR::solve` is intended for square systems and will panic for
//!   non-square matrices.)
//! - A rank check rejects designs where every observation sits at the same
//!   concentration; SVD would otherwise return a minimum-norm solution that
//!   looks like a valid fit.

use nalgebra::{DMatrix, DVector};

/// Singular values below `RANK_TOL * max_singular_value` count as zero.
const RANK_TOL: f64 = 1e-10;

/// Solve a least squares problem using SVD.
///
/// Returns `None` if the design matrix is rank deficient or the solution is
/// not finite.
pub fn solve_least_squares(x: &DMatrix<f64>, y: &DVector<f64>) -> Option<DVector<f64>> {
    if x.nrows() < x.ncols() || x.nrows() != y.len() {
        return None;
    }

    let svd = x.clone().svd(true, true);
    let max_sv = svd.singular_values.max();
    if !(max_sv.is_finite() && max_sv > 0.0) {
        return None;
    }
    let eps = RANK_TOL * max_sv;
    if svd.rank(eps) < x.ncols() {
        return None;
    }

    let beta = svd.solve(y, eps).ok()?;
    beta.iter().all(|v| v.is_finite()).then_some(beta)
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
    fn least_squares_rejects_constant_regressor() {
        let x = DMatrix::from_row_slice(3, 2, &[1.0, 2.0, 1.0, 2.0, 1.0, 2.0]);
        let y = DVector::from_row_slice(&[1.0, 1.5, 2.0]);
        assert!(solve_least_squares(&x, &y).is_none());
    }
}
