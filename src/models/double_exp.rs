//! Difference of two exponentials without the alpha normalization.
//!
//! ```text
//! v(time) = amplitude · (e^{−t/τ1} − e^{−t/τ2}) + offset,   t = max(time − start, 0)
//! ```
//!
//! Exchanging `τ1` and `τ2` negates the waveform, so the canonical form keeps
//! `τ1 ≥ τ2` and moves the sign into `amplitude`.

use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};

use crate::domain::{ParameterBounds, Parameters};
use crate::error::PspError;
use crate::models::alpha::{alpha_normalization, AlphaPsp};
use crate::models::shape::{swap_parameters, ShapeModel};

pub const DOUBLE_EXPONENTIAL_PARAMETERS: &[&str] =
    &["amplitude", "tau_1", "tau_2", "start", "offset"];

const AMPLITUDE: usize = 0;
const TAU_1: usize = 1;
const TAU_2: usize = 2;
const START: usize = 3;
const OFFSET: usize = 4;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DoubleExponentialPsp {
    /// Tau limits and the settings of the initial estimate.
    pub alpha: AlphaPsp,
}

impl DoubleExponentialPsp {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ShapeModel for DoubleExponentialPsp {
    fn name(&self) -> &'static str {
        "double-exponential PSP"
    }

    fn parameter_names(&self) -> &'static [&'static str] {
        DOUBLE_EXPONENTIAL_PARAMETERS
    }

    fn evaluate(&self, time: &[f64], params: &[f64]) -> Vec<f64> {
        let amplitude = params[AMPLITUDE];
        let tau_1 = params[TAU_1].max(f64::MIN_POSITIVE);
        let tau_2 = params[TAU_2].max(f64::MIN_POSITIVE);
        let start = params[START];
        let offset = params[OFFSET];

        time.iter()
            .map(|&t| {
                let x = (t - start).max(0.0);
                amplitude * ((-x / tau_1).exp() - (-x / tau_2).exp()) + offset
            })
            .collect()
    }

    /// Reuse the alpha estimate and convert its peak height into an amplitude.
    fn initial_fit_values(&self, time: &[f64], value: &[f64]) -> Result<Parameters, PspError> {
        let seed = self.alpha.initial_fit_values(time, value)?;
        let v = seed.values();
        let (height, t1, t2) = (v[0], v[1], v[2]);

        let amplitude = height / alpha_normalization(t2 / t1).abs();
        Parameters::new(
            DOUBLE_EXPONENTIAL_PARAMETERS,
            vec![amplitude, t1.max(t2), t1.min(t2), v[3], v[4]],
        )
    }

    fn parameter_limits(&self) -> Vec<ParameterBounds> {
        vec![
            ParameterBounds::unbounded("amplitude"),
            ParameterBounds::new("tau_1", self.alpha.min_tau, self.alpha.max_tau),
            ParameterBounds::new("tau_2", 0.0, self.alpha.max_tau),
            ParameterBounds::unbounded("start"),
            ParameterBounds::unbounded("offset"),
        ]
    }

    fn process_fit_results(
        &self,
        mut params: Vec<f64>,
        mut covariance: DMatrix<f64>,
    ) -> (Vec<f64>, DMatrix<f64>) {
        if params[TAU_2] > params[TAU_1] {
            swap_parameters(&mut params, &mut covariance, TAU_1, TAU_2);
            params[AMPLITUDE] = -params[AMPLITUDE];
            // Negating one coordinate flips the sign of its cross terms only.
            for k in 0..covariance.ncols() {
                if k != AMPLITUDE {
                    covariance[(AMPLITUDE, k)] = -covariance[(AMPLITUDE, k)];
                    covariance[(k, AMPLITUDE)] = -covariance[(k, AMPLITUDE)];
                }
            }
        }
        (params, covariance)
    }
}
