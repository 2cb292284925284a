//! Alpha-shaped postsynaptic potential.
//!
//! With `r = τ2/τ1` and the dimensionless time `t = max((time − start)/τ1, 0)`:
//!
//! ```text
//! v(t) = height · (e^{−t/r} − e^{−t}) / (r^{−1/(r−1)} − r^{−r/(r−1)}) + offset
//! ```
//!
//! The normalization makes `height` the peak amplitude above `offset`. The
//! expression is symmetric in `τ1 ↔ τ2` and has a removable singularity at
//! `r = 1`, where it becomes `height · e · t · e^{−t} + offset`.

use std::f64::consts::E;

use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};

use crate::domain::{ParameterBounds, Parameters};
use crate::error::PspError;
use crate::math::{argmax, box_smooth, tail_mean_std};
use crate::models::shape::{check_trace, swap_parameters, ShapeModel};

pub const ALPHA_PSP_PARAMETERS: &[&str] = &["height", "tau_1", "tau_2", "start", "offset"];

const HEIGHT: usize = 0;
const TAU_1: usize = 1;
const TAU_2: usize = 2;
const START: usize = 3;
const OFFSET: usize = 4;

/// `|r − 1|` below which the singular (equal time constants) form is used.
const SHAPE_SWITCH_LIMIT: f64 = 1e-8;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlphaPsp {
    /// Lower limit of `tau_1`.
    pub min_tau: f64,
    /// Upper limit of both time constants.
    pub max_tau: f64,
    /// Width of the box filter applied before estimating the peak.
    pub smoothing_samples: usize,
    /// Peak-to-integral ratio assumed when estimating `tau_1`.
    ///
    /// `0.25` is exact for an ideal alpha PSP with `tau_2 / tau_1 = 2`.
    pub integral_factor: f64,
    /// Ratio `tau_2 / tau_1` of the initial estimate.
    pub tau_fraction: f64,
}

impl Default for AlphaPsp {
    fn default() -> Self {
        Self {
            min_tau: 1e-6,
            max_tau: 1e6,
            smoothing_samples: 10,
            integral_factor: 0.25,
            tau_fraction: 2.0,
        }
    }
}

impl AlphaPsp {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tau_limits(min_tau: f64, max_tau: f64) -> Self {
        Self {
            min_tau,
            max_tau,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<(), PspError> {
        if !(self.min_tau.is_finite()
            && self.max_tau.is_finite()
            && 0.0 < self.min_tau
            && self.min_tau < self.max_tau)
        {
            return Err(PspError::invalid_config(format!(
                "Invalid tau limits: min_tau={}, max_tau={} (must be finite, > 0, min < max).",
                self.min_tau, self.max_tau
            )));
        }
        if self.smoothing_samples == 0 {
            return Err(PspError::invalid_config("smoothing_samples must be >= 1."));
        }
        if !(self.integral_factor.is_finite() && self.integral_factor > 0.0) {
            return Err(PspError::invalid_config("integral_factor must be finite and > 0."));
        }
        if !(self.tau_fraction.is_finite() && self.tau_fraction > 0.0 && self.tau_fraction != 1.0) {
            return Err(PspError::invalid_config(
                "tau_fraction must be finite, > 0 and != 1 (the onset estimate is singular at 1).",
            ));
        }
        Ok(())
    }
}

/// Peak value of `e^{−t/r} − e^{−t}` over `t ≥ 0`, for `r ≠ 1`.
///
/// Negative for `r < 1`.
pub(crate) fn alpha_normalization(ratio: f64) -> f64 {
    ratio.powf(-1.0 / (ratio - 1.0)) - ratio.powf(-ratio / (ratio - 1.0))
}

impl ShapeModel for AlphaPsp {
    fn name(&self) -> &'static str {
        "alpha PSP"
    }

    fn parameter_names(&self) -> &'static [&'static str] {
        ALPHA_PSP_PARAMETERS
    }

    fn evaluate(&self, time: &[f64], params: &[f64]) -> Vec<f64> {
        let height = params[HEIGHT];
        let tau_1 = params[TAU_1].max(0.0);
        let tau_2 = params[TAU_2].max(0.0);
        let start = params[START];
        let offset = params[OFFSET];

        let ratio = tau_2 / tau_1;
        let scaled = |t: f64| ((t - start) / tau_1).max(0.0);

        if (ratio - 1.0).abs() < SHAPE_SWITCH_LIMIT {
            let a = height * E;
            time.iter()
                .map(|&t| {
                    let x = scaled(t);
                    a * x * (-x).exp() + offset
                })
                .collect()
        } else {
            let a = height / alpha_normalization(ratio);
            time.iter()
                .map(|&t| {
                    let x = scaled(t);
                    a * ((-x / ratio).exp() - (-x).exp()) + offset
                })
                .collect()
        }
    }

    /// Estimate starting values from the trace alone.
    ///
    /// - baseline and noise from the last tenth of the trace
    /// - box-smoothed peak for `height` (floored at the noise level)
    /// - `tau_1` from the area-to-height ratio (floored at one sample)
    /// - `start` placing the ideal peak at the smoothed maximum
    fn initial_fit_values(&self, time: &[f64], value: &[f64]) -> Result<Parameters, PspError> {
        self.validate()?;
        let dt = check_trace(time, value)?;

        let (offset, noise) = tail_mean_std(value);

        // Smoothing the baseline-free signal keeps the zero padding from
        // pulling the edges toward zero volts.
        let centered: Vec<f64> = value.iter().map(|v| v - offset).collect();
        let smoothed = box_smooth(&centered, self.smoothing_samples);

        let integral = smoothed.iter().sum::<f64>() * dt;
        let peak = argmax(&smoothed)
            .ok_or_else(|| PspError::invalid_input("Trace has no finite maximum."))?;
        let height = smoothed[peak].max(noise);

        let tau_1 = (integral / height * self.integral_factor).max(dt);
        let tau_2 = self.tau_fraction * tau_1;
        let start = time[peak] + (tau_2 / tau_1).ln() * (tau_1 * tau_2) / (tau_1 - tau_2);

        Parameters::new(ALPHA_PSP_PARAMETERS, vec![height, tau_1, tau_2, start, offset])
    }

    fn parameter_limits(&self) -> Vec<ParameterBounds> {
        vec![
            ParameterBounds::unbounded("height"),
            ParameterBounds::new("tau_1", self.min_tau, self.max_tau),
            ParameterBounds::new("tau_2", 0.0, self.max_tau),
            ParameterBounds::unbounded("start"),
            ParameterBounds::unbounded("offset"),
        ]
    }

    /// Order the time constants so that `tau_1 >= tau_2`.
    fn process_fit_results(
        &self,
        mut params: Vec<f64>,
        mut covariance: DMatrix<f64>,
    ) -> (Vec<f64>, DMatrix<f64>) {
        if params[TAU_2] > params[TAU_1] {
            swap_parameters(&mut params, &mut covariance, TAU_1, TAU_2);
        }
        (params, covariance)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::noisy_psp;
    use crate::domain::time_axis;
    use approx::assert_abs_diff_eq;

    fn max_abs_diff(a: &[f64], b: &[f64]) -> f64 {
        a.iter().zip(b.iter()).map(|(x, y)| (x - y).abs()).fold(0.0, f64::max)
    }

    #[test]
    fn evaluation_is_symmetric_in_time_constants() {
        let psp = AlphaPsp::default();
        let time: Vec<f64> = (0..10_000).map(|i| i as f64 * 0.01).collect();
        let taus = [0.1, 1.0, 10.0, 23.0, 100.0];
        for height in [1.0, 10.0, 100.0] {
            for &t1 in &taus {
                for &t2 in &taus {
                    let v1 = psp.evaluate(&time, &[height, t1, t2, 50.0, 5.0]);
                    let v2 = psp.evaluate(&time, &[height, t2, t1, 50.0, 5.0]);
                    let d = max_abs_diff(&v1, &v2);
                    assert!(d < 1e-10, "height={height} t1={t1} t2={t2}: {d}");
                }
            }
        }
    }

    #[test]
    fn peak_equals_height_above_offset() {
        let psp = AlphaPsp::default();
        let time: Vec<f64> = (0..20_000).map(|i| i as f64 * 0.005).collect();
        let v = psp.evaluate(&time, &[2.5, 10.0, 5.0, 10.0, -1.0]);
        let peak = v.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        assert_abs_diff_eq!(peak, 1.5, epsilon = 1e-6);
        // Before the onset only the offset remains.
        assert_eq!(v[0], -1.0);
    }

    #[test]
    fn singular_branch_is_the_limit_of_the_general_branch() {
        let psp = AlphaPsp::default();
        let time: Vec<f64> = (0..1000).map(|i| i as f64 * 0.1).collect();
        let tau = 7.0;
        let singular = psp.evaluate(&time, &[1.5, tau, tau, 20.0, 3.0]);

        let mut previous = f64::INFINITY;
        for delta in [1e-1, 1e-2, 1e-3, 1e-4, 1e-5] {
            let general = psp.evaluate(&time, &[1.5, tau, tau * (1.0 + delta), 20.0, 3.0]);
            let d = max_abs_diff(&general, &singular);
            assert!(d < previous, "delta={delta}: {d} !< {previous}");
            previous = d;
        }
        assert!(previous < 1e-4, "{previous}");
    }

    #[test]
    fn process_fit_results_orders_taus() {
        let psp = AlphaPsp::default();
        let r: Vec<f64> = (0..5).map(|i| i as f64).collect();
        let e = DMatrix::from_fn(5, 5, |i, j| (i * j) as f64);

        let (pr, pe) = psp.process_fit_results(r, e);
        assert_eq!(pr, vec![0.0, 2.0, 1.0, 3.0, 4.0]);
        assert_eq!(pe[(1, 1)], 4.0);
        assert_eq!(pe[(2, 2)], 1.0);

        // A second pass is a no-op.
        let (pr2, pe2) = psp.process_fit_results(pr.clone(), pe.clone());
        assert_eq!(pr2, pr);
        assert_eq!(pe2, pe);
    }

    #[test]
    fn initial_estimate_matches_reference_values() {
        let psp = AlphaPsp::default();
        let time = time_axis(1000, 0.1);
        for seed in [1, 2, 3] {
            let value = noisy_psp(&psp, &time, &[4.0, 20.0, 1.0, 30.0, 50.0], 1e-4, seed).unwrap();
            let p = psp.initial_fit_values(&time, &value).unwrap();

            assert_abs_diff_eq!(p.get("start").unwrap(), 26.69, epsilon = 0.01);
            assert_abs_diff_eq!(p.get("tau_1").unwrap(), 4.6956, epsilon = 0.01);
            assert_abs_diff_eq!(p.get("tau_2").unwrap(), 9.39, epsilon = 0.01);
            assert_abs_diff_eq!(p.get("offset").unwrap(), 50.19, epsilon = 0.01);
            assert_abs_diff_eq!(p.get("height").unwrap(), 3.798, epsilon = 0.01);
        }
    }

    #[test]
    fn initial_estimate_floors_tau_at_one_sample() {
        let psp = AlphaPsp::default();
        let time = time_axis(200, 0.5);
        let value = vec![1.0; 200];
        let p = psp.initial_fit_values(&time, &value).unwrap();
        assert!(p.get("tau_1").unwrap() >= 0.5);
        assert!(p.values().iter().all(|v| v.is_finite()));
    }

    #[test]
    fn invalid_configuration_is_rejected() {
        let psp = AlphaPsp {
            tau_fraction: 1.0,
            ..AlphaPsp::default()
        };
        let time = time_axis(20, 1.0);
        assert!(matches!(
            psp.initial_fit_values(&time, &vec![0.0; 20]),
            Err(PspError::InvalidConfig(_))
        ));
    }

    #[test]
    fn limits_follow_configuration() {
        let limits = AlphaPsp::with_tau_limits(1e-3, 1e3).parameter_limits();
        let names: Vec<&str> = limits.iter().map(|b| b.name).collect();
        assert_eq!(names, ALPHA_PSP_PARAMETERS);
        assert_eq!(limits[1].min, 1e-3);
        assert_eq!(limits[2].min, 0.0);
        assert_eq!(limits[2].max, 1e3);
    }
}
