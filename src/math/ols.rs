//! Ridge-regularised least squares with many right-hand sides.
//!
//! The linear block model repeatedly solves problems of the form:
//!
//! ```text
//! minimize ||Y - X B||² + λ ||B||²
//! ```
//!
//! where every column of `Y` is one forecast step. The normal-equation
//! matrices `XᵀX` and `XᵀY` are built once per training set and reused for
//! every penalty on the grid, so a candidate costs one Cholesky factorisation.
//! When the penalised Gram matrix is not positive definite (λ = 0 on collinear
//! inputs) we fall back to an SVD solve with progressively looser tolerances.

use nalgebra::DMatrix;

/// Normal-equation statistics for one training set.
#[derive(Debug, Clone)]
pub struct NormalEquations {
    pub xtx: DMatrix<f64>,
    pub xty: DMatrix<f64>,
}

impl NormalEquations {
    pub fn from_design(x: &DMatrix<f64>, y: &DMatrix<f64>) -> Self {
        let xt = x.transpose();
        Self {
            xtx: &xt * x,
            xty: &xt * y,
        }
    }

    /// Solve for the coefficient matrix at penalty `lambda`.
    pub fn solve_ridge(&self, lambda: f64) -> Option<DMatrix<f64>> {
        let p = self.xtx.nrows();
        let penalised = &self.xtx + DMatrix::<f64>::identity(p, p) * lambda.max(0.0);

        if let Some(chol) = penalised.clone().cholesky() {
            let b = chol.solve(&self.xty);
            if b.iter().all(|v| v.is_finite()) {
                return Some(b);
            }
        }

        let svd = penalised.svd(true, true);
        for &tol in &[1e-10, 1e-8, 1e-6] {
            if let Ok(b) = svd.solve(&self.xty, tol) {
                if b.iter().all(|v| v.is_finite()) {
                    return Some(b);
                }
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_penalty_matches_ols_for_each_target() {
        // Two targets: y1 = 2 + 3x, y2 = -1 + x
        let x = DMatrix::from_row_slice(4, 2, &[1.0, 0.0, 1.0, 1.0, 1.0, 2.0, 1.0, 3.0]);
        let y = DMatrix::from_row_slice(4, 2, &[2.0, -1.0, 5.0, 0.0, 8.0, 1.0, 11.0, 2.0]);

        let b = NormalEquations::from_design(&x, &y).solve_ridge(0.0).unwrap();
        assert!((b[(0, 0)] - 2.0).abs() < 1e-9);
        assert!((b[(1, 0)] - 3.0).abs() < 1e-9);
        assert!((b[(0, 1)] + 1.0).abs() < 1e-9);
        assert!((b[(1, 1)] - 1.0).abs() < 1e-9);
    }

    #[test]
    fn penalty_shrinks_coefficients() {
        let x = DMatrix::from_row_slice(3, 1, &[1.0, 2.0, 3.0]);
        let y = DMatrix::from_row_slice(3, 1, &[2.0, 4.0, 6.0]);
        let ne = NormalEquations::from_design(&x, &y);
        let free = ne.solve_ridge(0.0).unwrap()[(0, 0)];
        let shrunk = ne.solve_ridge(10.0).unwrap()[(0, 0)];
        assert!((free - 2.0).abs() < 1e-9);
        assert!(shrunk < free && shrunk > 0.0);
    }

    #[test]
    fn small_penalty_handles_collinear_design() {
        let x = DMatrix::from_row_slice(3, 2, &[1.0, 1.0, 2.0, 2.0, 3.0, 3.0]);
        let y = DMatrix::from_row_slice(3, 1, &[2.0, 4.0, 6.0]);
        let b = NormalEquations::from_design(&x, &y).solve_ridge(1e-6).unwrap();
        let fitted = &x * &b;
        for i in 0..3 {
            assert!((fitted[(i, 0)] - y[(i, 0)]).abs() < 1e-6);
        }
    }
}
