//! The capability set every fittable waveform family provides.
//!
//! The fitter and the derived-quantity code only talk to this trait, so new
//! shapes are added by implementing it.

use nalgebra::DMatrix;

use crate::domain::{ParameterBounds, Parameters};
use crate::error::PspError;

pub trait ShapeModel: Send + Sync {
    /// Human-readable name of the shape family.
    fn name(&self) -> &'static str;

    /// Declared parameter names, in the positional order used everywhere else.
    fn parameter_names(&self) -> &'static [&'static str];

    /// Evaluate the waveform at every time point.
    ///
    /// # Panics
    /// Implementations may panic if `params.len()` differs from
    /// `parameter_names().len()`.
    fn evaluate(&self, time: &[f64], params: &[f64]) -> Vec<f64>;

    /// Heuristic starting point for a fit of `(time, value)`.
    fn initial_fit_values(&self, time: &[f64], value: &[f64]) -> Result<Parameters, PspError>;

    /// Limits for every parameter, in parameter order.
    fn parameter_limits(&self) -> Vec<ParameterBounds>;

    /// Map optimizer output onto the shape's canonical parameterization.
    ///
    /// Must be idempotent. The default keeps the results unchanged.
    fn process_fit_results(
        &self,
        params: Vec<f64>,
        covariance: DMatrix<f64>,
    ) -> (Vec<f64>, DMatrix<f64>) {
        (params, covariance)
    }

    fn parameter_count(&self) -> usize {
        self.parameter_names().len()
    }

    fn parameter_index(&self, name: &str) -> Option<usize> {
        self.parameter_names().iter().position(|n| *n == name)
    }
}

/// Swap parameters `i` and `j` together with their covariance rows and columns.
pub fn swap_parameters(params: &mut [f64], covariance: &mut DMatrix<f64>, i: usize, j: usize) {
    params.swap(i, j);
    covariance.swap_rows(i, j);
    covariance.swap_columns(i, j);
}

/// Validate a raw `(time, value)` trace before estimating parameters from it.
pub(crate) fn check_trace(time: &[f64], value: &[f64]) -> Result<f64, PspError> {
    if time.len() != value.len() {
        return Err(PspError::LengthMismatch {
            what: "time vs value",
            left: time.len(),
            right: value.len(),
        });
    }
    if time.len() < 2 {
        return Err(PspError::invalid_input(
            "At least two samples are needed to estimate parameters.",
        ));
    }
    if time.iter().chain(value.iter()).any(|v| !v.is_finite()) {
        return Err(PspError::invalid_input("Trace contains non-finite samples."));
    }
    let dt = time[1] - time[0];
    if dt <= 0.0 {
        return Err(PspError::invalid_input("Time axis must be increasing."));
    }
    Ok(dt)
}
