//! Levenberg–Marquardt nonlinear least squares.
//!
//! Minimizes `Σ r_i(p)²` for a residual function `r` with a forward-difference
//! Jacobian. Each iteration solves the damped normal equations
//!
//! ```text
//! (JᵀJ + λ·diag(JᵀJ)) δ = −Jᵀr
//! ```
//!
//! by Cholesky decomposition. Trial points are projected onto the parameter
//! box, so limits hold for every evaluated point.
//!
//! The returned Jacobian is evaluated at the solution; `(JᵀJ)⁻¹` is the
//! unscaled parameter covariance.

use nalgebra::{DMatrix, DVector};
use tracing::debug;

use crate::domain::{FitConfig, ParameterBounds};
use crate::error::PspError;
use crate::math::jacobian::jacobian_at;

const INITIAL_LAMBDA: f64 = 1e-3;
const MIN_LAMBDA: f64 = 1e-15;
const MAX_LAMBDA: f64 = 1e16;
/// Floor for diagonal entries used to scale the damping term.
const MIN_DIAGONAL: f64 = 1e-12;

/// Stopping rules for [`levenberg_marquardt`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LeastSquaresOptions {
    pub max_calls: usize,
    pub diff_step: f64,
    pub ftol: f64,
    pub xtol: f64,
    pub gtol: f64,
}

impl From<&FitConfig> for LeastSquaresOptions {
    fn from(config: &FitConfig) -> Self {
        Self {
            max_calls: config.max_calls,
            diff_step: config.diff_step,
            ftol: config.ftol,
            xtol: config.xtol,
            gtol: config.gtol,
        }
    }
}

/// Why the solver stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    /// Relative reduction of the residual sum fell below `ftol`.
    CostTolerance,
    /// Relative parameter step fell below `xtol`.
    StepTolerance,
    /// Largest gradient component fell below `gtol`.
    GradientTolerance,
    /// The evaluation budget ran out.
    MaxCalls,
    /// The residuals at the starting point, or their Jacobian, are not finite.
    NonFinite,
    /// The damping grew past its limit without finding a better point.
    NoProgress,
}

impl Termination {
    pub fn converged(self) -> bool {
        matches!(
            self,
            Termination::CostTolerance
                | Termination::StepTolerance
                | Termination::GradientTolerance
        )
    }
}

#[derive(Debug, Clone)]
pub struct LeastSquaresSolution {
    pub params: Vec<f64>,
    pub residuals: Vec<f64>,
    /// Residual Jacobian at `params`.
    pub jacobian: DMatrix<f64>,
    /// Sum of squared residuals.
    pub cost: f64,
    /// Residual evaluations, including the final Jacobian.
    pub n_calls: usize,
    pub termination: Termination,
}

impl LeastSquaresSolution {
    /// `(JᵀJ)⁻¹`, or `None` when the normal matrix is singular or not finite.
    pub fn unscaled_covariance(&self) -> Option<DMatrix<f64>> {
        let jtj = self.jacobian.transpose() * &self.jacobian;
        if !all_finite(&jtj) {
            return None;
        }
        let inverse = jtj.try_inverse()?;
        if !all_finite(&inverse) {
            return None;
        }
        Some((&inverse + inverse.transpose()) * 0.5)
    }
}

/// Minimize the sum of squared residuals starting from `x0`.
pub fn levenberg_marquardt<F>(
    mut residuals: F,
    x0: &[f64],
    bounds: &[ParameterBounds],
    opts: &LeastSquaresOptions,
) -> Result<LeastSquaresSolution, PspError>
where
    F: FnMut(&[f64]) -> Vec<f64>,
{
    if x0.len() != bounds.len() {
        return Err(PspError::LengthMismatch {
            what: "start point vs bounds",
            left: x0.len(),
            right: bounds.len(),
        });
    }
    let n = x0.len();

    let mut x = x0.to_vec();
    project(&mut x, bounds);
    let mut r = residuals(&x);
    let mut calls = 1usize;
    let mut cost = sum_of_squares(&r);
    let mut lambda = INITIAL_LAMBDA;

    let termination = if !cost.is_finite() {
        Termination::NonFinite
    } else {
        'outer: loop {
            if calls + n > opts.max_calls {
                break Termination::MaxCalls;
            }
            let j = jacobian_at(&mut residuals, &x, &r, opts.diff_step);
            calls += n;

            let jt = j.transpose();
            let jtj = &jt * &j;
            let grad = &jt * DVector::from_column_slice(&r);
            if !all_finite(&jtj) || !all_finite(&grad) {
                break Termination::NonFinite;
            }
            if grad.amax() <= opts.gtol {
                break Termination::GradientTolerance;
            }
            let rhs = -grad;

            loop {
                if calls >= opts.max_calls {
                    break 'outer Termination::MaxCalls;
                }

                let mut damped = jtj.clone();
                for i in 0..n {
                    damped[(i, i)] += lambda * jtj[(i, i)].max(MIN_DIAGONAL);
                }
                let Some(chol) = damped.cholesky() else {
                    lambda *= 10.0;
                    if lambda > MAX_LAMBDA {
                        break 'outer Termination::NoProgress;
                    }
                    continue;
                };
                let step = chol.solve(&rhs);

                let mut trial: Vec<f64> = x.iter().zip(step.iter()).map(|(a, b)| a + b).collect();
                project(&mut trial, bounds);
                let small_step = norm_diff(&trial, &x) <= opts.xtol * (norm(&x) + opts.xtol);

                let r_trial = residuals(&trial);
                calls += 1;
                let cost_trial = sum_of_squares(&r_trial);

                if cost_trial < cost {
                    let reduction = (cost - cost_trial) / cost;
                    x = trial;
                    r = r_trial;
                    cost = cost_trial;
                    lambda = (lambda / 10.0).max(MIN_LAMBDA);
                    if reduction <= opts.ftol {
                        break 'outer Termination::CostTolerance;
                    }
                    if small_step {
                        break 'outer Termination::StepTolerance;
                    }
                    break;
                }

                if small_step {
                    break 'outer Termination::StepTolerance;
                }
                lambda *= 10.0;
                if lambda > MAX_LAMBDA {
                    break 'outer Termination::NoProgress;
                }
            }
        }
    };

    let jacobian = jacobian_at(&mut residuals, &x, &r, opts.diff_step);
    calls += n;

    debug!(?termination, calls, cost, "levenberg-marquardt finished");

    Ok(LeastSquaresSolution {
        params: x,
        residuals: r,
        jacobian,
        cost,
        n_calls: calls,
        termination,
    })
}

fn project(x: &mut [f64], bounds: &[ParameterBounds]) {
    for (v, b) in x.iter_mut().zip(bounds.iter()) {
        *v = b.clamp(*v);
    }
}

fn all_finite<R, C, S>(m: &nalgebra::Matrix<f64, R, C, S>) -> bool
where
    R: nalgebra::Dim,
    C: nalgebra::Dim,
    S: nalgebra::RawStorage<f64, R, C>,
{
    m.iter().all(|v| v.is_finite())
}

fn sum_of_squares(r: &[f64]) -> f64 {
    r.iter().map(|v| v * v).sum()
}

fn norm(x: &[f64]) -> f64 {
    sum_of_squares(x).sqrt()
}

fn norm_diff(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b.iter()).map(|(x, y)| (x - y) * (x - y)).sum::<f64>().sqrt()
}
