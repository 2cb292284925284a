//! Shared domain types.
//!
//! Results are plain in-memory values. Nothing here is persisted; callers that
//! want files build them from these structs.

use std::fmt;

use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};

use crate::error::PspError;

/// A uniformly sampled `(time, value)` trace.
#[derive(Debug, Clone, PartialEq)]
pub struct Waveform {
    time: Vec<f64>,
    value: Vec<f64>,
}

impl Waveform {
    /// Build a waveform from equally long time and value vectors.
    ///
    /// At least two samples are required so the sampling interval is defined.
    pub fn new(time: Vec<f64>, value: Vec<f64>) -> Result<Self, PspError> {
        if time.len() != value.len() {
            return Err(PspError::LengthMismatch {
                what: "time vs value",
                left: time.len(),
                right: value.len(),
            });
        }
        if time.len() < 2 {
            return Err(PspError::invalid_input("A waveform needs at least two samples."));
        }
        if time.iter().chain(value.iter()).any(|v| !v.is_finite()) {
            return Err(PspError::invalid_input("Waveform contains non-finite samples."));
        }
        if !(time[1] > time[0]) {
            return Err(PspError::invalid_input("Waveform time axis must be increasing."));
        }
        Ok(Self { time, value })
    }

    /// Build a waveform on the axis `0, dt, 2·dt, ...`.
    pub fn from_samples(dt: f64, value: Vec<f64>) -> Result<Self, PspError> {
        let time = time_axis(value.len(), dt);
        Self::new(time, value)
    }

    pub fn time(&self) -> &[f64] {
        &self.time
    }

    pub fn value(&self) -> &[f64] {
        &self.value
    }

    pub fn len(&self) -> usize {
        self.time.len()
    }

    pub fn is_empty(&self) -> bool {
        self.time.is_empty()
    }

    /// Sampling interval, inferred from the first two samples.
    pub fn dt(&self) -> f64 {
        self.time[1] - self.time[0]
    }
}

/// `n` time points `0, dt, 2·dt, ...`.
pub fn time_axis(n: usize, dt: f64) -> Vec<f64> {
    (0..n).map(|i| i as f64 * dt).collect()
}

/// A parameter vector paired with the shape's declared parameter names.
///
/// The position of each value always matches the position of its name.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Parameters {
    names: &'static [&'static str],
    values: Vec<f64>,
}

impl Parameters {
    pub fn new(names: &'static [&'static str], values: Vec<f64>) -> Result<Self, PspError> {
        if names.len() != values.len() {
            return Err(PspError::LengthMismatch {
                what: "parameter names vs values",
                left: names.len(),
                right: values.len(),
            });
        }
        Ok(Self { names, values })
    }

    /// All parameters set to NaN (used for fits that were never attempted).
    pub fn nan(names: &'static [&'static str]) -> Self {
        Self {
            names,
            values: vec![f64::NAN; names.len()],
        }
    }

    pub fn names(&self) -> &'static [&'static str] {
        self.names
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn into_values(self) -> Vec<f64> {
        self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.names.iter().position(|n| *n == name)
    }

    pub fn get(&self, name: &str) -> Option<f64> {
        self.index_of(name).map(|i| self.values[i])
    }

    pub fn iter(&self) -> impl Iterator<Item = (&'static str, f64)> + '_ {
        self.names.iter().copied().zip(self.values.iter().copied())
    }
}

/// Inclusive `[min, max]` limits of one named parameter.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ParameterBounds {
    pub name: &'static str,
    pub min: f64,
    pub max: f64,
}

impl ParameterBounds {
    pub fn new(name: &'static str, min: f64, max: f64) -> Self {
        Self { name, min, max }
    }

    pub fn unbounded(name: &'static str) -> Self {
        Self::new(name, f64::NEG_INFINITY, f64::INFINITY)
    }

    pub fn clamp(&self, value: f64) -> f64 {
        value.max(self.min).min(self.max)
    }

    pub fn contains(&self, value: f64) -> bool {
        value >= self.min && value <= self.max
    }
}

/// Settings for a single least-squares fit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FitConfig {
    /// Maximum number of model evaluations (Jacobian columns included).
    pub max_calls: usize,
    /// Fits with a larger reduced chi-square are flagged as poor.
    pub max_reduced_chi2: f64,
    /// Parameters whose estimated variance must not be negative.
    ///
    /// `None` checks every parameter.
    pub fail_on_negative_covariance: Option<Vec<bool>>,
    /// Forward-difference step for the optimizer's Jacobian.
    pub diff_step: f64,
    /// Relative reduction of the residual sum below which the fit has converged.
    pub ftol: f64,
    /// Relative parameter step below which the fit has converged.
    pub xtol: f64,
    /// Largest gradient component at which the fit has converged.
    pub gtol: f64,
}

impl Default for FitConfig {
    fn default() -> Self {
        Self {
            max_calls: 1000,
            max_reduced_chi2: 2.0,
            fail_on_negative_covariance: None,
            diff_step: 1e-8,
            ftol: 1.49012e-8,
            xtol: 1.49012e-8,
            gtol: 0.0,
        }
    }
}

impl FitConfig {
    pub fn with_negative_covariance_mask(mut self, mask: Vec<bool>) -> Self {
        self.fail_on_negative_covariance = Some(mask);
        self
    }

    pub fn validate(&self, n_params: usize) -> Result<(), PspError> {
        if self.max_calls == 0 {
            return Err(PspError::invalid_config("max_calls must be > 0."));
        }
        if !(self.max_reduced_chi2.is_finite() && self.max_reduced_chi2 > 0.0) {
            return Err(PspError::invalid_config("max_reduced_chi2 must be finite and > 0."));
        }
        if !(self.diff_step.is_finite() && self.diff_step > 0.0) {
            return Err(PspError::invalid_config("diff_step must be finite and > 0."));
        }
        for (name, tol) in [("ftol", self.ftol), ("xtol", self.xtol), ("gtol", self.gtol)] {
            if !(tol.is_finite() && tol >= 0.0) {
                return Err(PspError::invalid_config(format!("{name} must be finite and >= 0.")));
            }
        }
        if let Some(mask) = &self.fail_on_negative_covariance {
            if mask.len() != n_params {
                return Err(PspError::LengthMismatch {
                    what: "negative-covariance mask vs parameters",
                    left: mask.len(),
                    right: n_params,
                });
            }
        }
        Ok(())
    }
}

/// Why a fit was not accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FitFailure {
    /// The optimizer hit `max_calls` or stopped without converging.
    NonConvergence,
    /// A checked parameter has a negative (or undefined) variance.
    DivergentCovariance,
    /// The reduced chi-square exceeds the configured threshold.
    PoorFit,
    /// Not more samples than parameters; the fit was not attempted.
    DegenerateInput,
}

impl FitFailure {
    pub const ALL: [FitFailure; 4] = [
        FitFailure::NonConvergence,
        FitFailure::DivergentCovariance,
        FitFailure::PoorFit,
        FitFailure::DegenerateInput,
    ];

    pub fn label(self) -> &'static str {
        match self {
            FitFailure::NonConvergence => "non-convergence",
            FitFailure::DivergentCovariance => "divergent covariance",
            FitFailure::PoorFit => "poor fit",
            FitFailure::DegenerateInput => "degenerate input",
        }
    }
}

impl fmt::Display for FitFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Outcome of one fit, in canonical parameter order.
#[derive(Debug, Clone)]
pub struct FitResult {
    pub parameters: Parameters,
    /// Parameter covariance (already scaled by the noise variance).
    pub covariance: DMatrix<f64>,
    pub reduced_chi2: f64,
    pub failure: Option<FitFailure>,
    /// Model evaluations spent by the optimizer.
    pub n_calls: usize,
}

impl FitResult {
    pub fn success(&self) -> bool {
        self.failure.is_none()
    }

    /// Square roots of the covariance diagonal (NaN for negative variances).
    pub fn standard_errors(&self) -> Vec<f64> {
        self.covariance
            .diagonal()
            .iter()
            .map(|&v| if v >= 0.0 { v.sqrt() } else { f64::NAN })
            .collect()
    }

    pub fn value(&self, name: &str) -> Option<f64> {
        self.parameters.get(name)
    }

    pub fn error(&self, name: &str) -> Option<f64> {
        let i = self.parameters.index_of(name)?;
        let v = self.covariance[(i, i)];
        Some(if v >= 0.0 { v.sqrt() } else { f64::NAN })
    }
}

/// A scalar derived from fitted parameters plus its propagated standard error.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct DerivedQuantity {
    pub value: f64,
    pub error: f64,
}
