//! Forward-difference derivatives of arbitrary functions of a parameter vector.
//!
//! `J[i] = (f(p0 + ε·e_i) − f(p0)) / ε`
//!
//! Used by the least-squares solver (vector-valued residuals) and for
//! propagating a fit covariance to derived scalars via `Var(g) = Jᵀ·Σ·J`.

use nalgebra::{DMatrix, DVector};

use crate::error::PspError;

/// Default forward-difference step.
pub const DEFAULT_EPSILON: f64 = 1e-8;

/// Gradient of a scalar function at `p0`.
pub fn gradient<F>(f: F, p0: &[f64], epsilon: f64) -> DVector<f64>
where
    F: Fn(&[f64]) -> f64,
{
    let f0 = f(p0);
    let mut shifted = p0.to_vec();
    DVector::from_iterator(
        p0.len(),
        (0..p0.len()).map(|i| {
            shifted[i] = p0[i] + epsilon;
            let fi = f(&shifted);
            shifted[i] = p0[i];
            (fi - f0) / epsilon
        }),
    )
}

/// Jacobian of a vector function at `p0`: one row per output, one column per parameter.
pub fn jacobian<F>(mut f: F, p0: &[f64], epsilon: f64) -> DMatrix<f64>
where
    F: FnMut(&[f64]) -> Vec<f64>,
{
    let f0 = f(p0);
    jacobian_at(&mut f, p0, &f0, epsilon)
}

/// Like [`jacobian`], reusing an already known `f0 = f(p0)`.
///
/// Costs exactly `p0.len()` evaluations of `f`.
pub fn jacobian_at<F>(f: &mut F, p0: &[f64], f0: &[f64], epsilon: f64) -> DMatrix<f64>
where
    F: FnMut(&[f64]) -> Vec<f64>,
{
    let mut out = DMatrix::<f64>::zeros(f0.len(), p0.len());
    let mut shifted = p0.to_vec();
    for j in 0..p0.len() {
        shifted[j] = p0[j] + epsilon;
        let fj = f(&shifted);
        shifted[j] = p0[j];
        for (i, (a, b)) in fj.iter().zip(f0.iter()).enumerate() {
            out[(i, j)] = (a - b) / epsilon;
        }
    }
    out
}

/// Propagate a parameter covariance to a scalar with gradient `grad`: `gradᵀ·Σ·grad`.
pub fn propagate_variance(grad: &DVector<f64>, covariance: &DMatrix<f64>) -> Result<f64, PspError> {
    if covariance.nrows() != grad.len() || covariance.ncols() != grad.len() {
        return Err(PspError::LengthMismatch {
            what: "gradient vs covariance",
            left: grad.len(),
            right: covariance.nrows().max(covariance.ncols()),
        });
    }
    Ok(grad.dot(&(covariance * grad)))
}
