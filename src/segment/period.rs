//! Recover the repetition period of a trace by minimizing cross-segment variance.
//!
//! The objective for a candidate interval `T` is the sum over in-segment
//! positions of the variance across segments (see
//! [`SegmentMatrix::cross_variance_sum`]). It is minimized with a
//! one-dimensional Nelder–Mead simplex from `argmin`.
//!
//! The objective is `+∞` when:
//! - fewer than two segments fit in the trace (a single segment has zero
//!   variance for any `T`)
//! - `T` leaves the admissible window around the starting guess

use argmin::core::{CostFunction, Executor, State, TerminationReason, TerminationStatus};
use argmin::solver::neldermead::NelderMead;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::PspError;
use crate::segment::segmenter::segment;

/// Nelder–Mead settings for the period search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeriodSearch {
    /// Stop when the standard deviation of the simplex costs falls below this.
    pub tolerance: f64,
    pub max_iters: u64,
    /// Second simplex vertex at `start · (1 + initial_step)`.
    pub initial_step: f64,
    /// Admissible intervals are `start · (1 ± window)`.
    pub window: f64,
}

impl Default for PeriodSearch {
    fn default() -> Self {
        Self {
            tolerance: 1e-3,
            max_iters: 500,
            initial_step: 0.01,
            window: 0.5,
        }
    }
}

impl PeriodSearch {
    pub fn validate(&self) -> Result<(), PspError> {
        if !(self.tolerance.is_finite() && self.tolerance >= 0.0) {
            return Err(PspError::invalid_config(
                "Period search tolerance must be finite and >= 0.",
            ));
        }
        if self.max_iters == 0 {
            return Err(PspError::invalid_config("Period search needs at least one iteration."));
        }
        if !(self.initial_step.is_finite() && self.initial_step > 0.0) {
            return Err(PspError::invalid_config(
                "Period search initial_step must be finite and > 0.",
            ));
        }
        if !(self.window.is_finite() && self.window > 0.0) {
            return Err(PspError::invalid_config("Period search window must be finite and > 0."));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PeriodEstimate {
    pub interval: f64,
    /// Cross-segment variance at `interval`.
    pub objective: f64,
    pub iterations: u64,
    pub converged: bool,
}

/// Cross-segment variance of `data` cut at `interval`, or `+∞` if fewer than
/// two segments fit or the interval is not a usable step.
pub fn segment_objective(data: &[f64], dt: f64, interval: f64) -> f64 {
    match segment(data, dt, interval) {
        Ok(m) if m.n_segments() >= 2 => m.cross_variance_sum(),
        _ => f64::INFINITY,
    }
}

struct CrossVariance<'a> {
    data: &'a [f64],
    dt: f64,
    lo: f64,
    hi: f64,
}

impl CostFunction for CrossVariance<'_> {
    type Param = Vec<f64>;
    type Output = f64;

    fn cost(&self, param: &Self::Param) -> Result<Self::Output, argmin::core::Error> {
        let interval = param[0];
        if !(self.lo..=self.hi).contains(&interval) {
            return Ok(f64::INFINITY);
        }
        Ok(segment_objective(self.data, self.dt, interval))
    }
}

/// Find the segment interval near `interval_start` that best aligns the
/// repetitions in `data`.
///
/// Not converging within `max_iters` is reported through
/// [`PeriodEstimate::converged`], not as an error.
pub fn optimize_segment(
    data: &[f64],
    dt: f64,
    interval_start: f64,
    search: &PeriodSearch,
) -> Result<PeriodEstimate, PspError> {
    search.validate()?;
    if !(dt.is_finite() && dt > 0.0) {
        return Err(PspError::invalid_input(format!("dt must be finite and > 0 (got {dt}).")));
    }
    if !(interval_start.is_finite() && interval_start > 0.0) {
        return Err(PspError::invalid_input(format!(
            "Starting interval must be finite and > 0 (got {interval_start})."
        )));
    }

    let problem = CrossVariance {
        data,
        dt,
        lo: interval_start * (1.0 - search.window),
        hi: interval_start * (1.0 + search.window),
    };
    let simplex = vec![vec![interval_start], vec![interval_start * (1.0 + search.initial_step)]];
    let solver = NelderMead::new(simplex)
        .with_sd_tolerance(search.tolerance)
        .map_err(|e| PspError::invalid_config(format!("Invalid period search tolerance: {e}")))?;

    let res = Executor::new(problem, solver)
        .configure(|state| state.max_iters(search.max_iters))
        .run()
        .map_err(|e| PspError::Optimizer(format!("Period search failed: {e}")))?;

    let state = res.state();
    let interval = state
        .get_best_param()
        .and_then(|p| p.first().copied())
        .ok_or_else(|| PspError::Optimizer("Period search produced no parameters.".to_string()))?;
    let objective = state.get_best_cost();
    let iterations = state.get_iter();
    let converged = matches!(
        state.get_termination_status(),
        TerminationStatus::Terminated(TerminationReason::SolverConverged)
    );

    debug!(interval, objective, iterations, converged, "period search finished");

    Ok(PeriodEstimate {
        interval,
        objective,
        iterations,
        converged,
    })
}
