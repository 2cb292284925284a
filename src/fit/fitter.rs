//! Least-squares fit of a single trace against a [`ShapeModel`].
//!
//! Given:
//! - time points `t_i` and measured values `v_i`
//! - a per-sample noise estimate `σ`
//!
//! we
//! - seed the parameters with the shape's own heuristic
//! - minimize `Σ (shape(t_i; p) − v_i)²` with Levenberg–Marquardt
//! - scale `(JᵀJ)⁻¹` by `σ²` to get the parameter covariance
//! - compute `χ²_red = Σ r_i² / (σ² · (n − k))`
//! - classify the outcome and canonicalize the parameters
//!
//! An unsuccessful fit is still returned; only caller bugs are errors.

use nalgebra::DMatrix;
use tracing::debug;

use crate::domain::{FitConfig, FitFailure, FitResult, Parameters, Waveform};
use crate::error::PspError;
use crate::math::{levenberg_marquardt, LeastSquaresOptions, Termination};
use crate::models::ShapeModel;

/// Fit `shape` to `(time, value)`.
///
/// # Errors
/// - `time` and `value` differ in length
/// - `noise_estimate` is not finite and positive
/// - `config` is invalid for this shape (e.g. a mask of the wrong length)
/// - the shape cannot estimate starting values (non-finite samples)
pub fn fit<S>(
    shape: &S,
    time: &[f64],
    value: &[f64],
    noise_estimate: f64,
    config: &FitConfig,
) -> Result<FitResult, PspError>
where
    S: ShapeModel + ?Sized,
{
    if time.len() != value.len() {
        return Err(PspError::LengthMismatch {
            what: "time vs value",
            left: time.len(),
            right: value.len(),
        });
    }
    if !(noise_estimate.is_finite() && noise_estimate > 0.0) {
        return Err(PspError::InvalidNoise(noise_estimate));
    }

    let names = shape.parameter_names();
    let k = names.len();
    config.validate(k)?;

    if time.len() <= k {
        debug!(samples = time.len(), parameters = k, "degenerate input, fit not attempted");
        return Ok(FitResult {
            parameters: Parameters::nan(names),
            covariance: DMatrix::from_element(k, k, f64::NAN),
            reduced_chi2: f64::NAN,
            failure: Some(FitFailure::DegenerateInput),
            n_calls: 0,
        });
    }

    let limits = shape.parameter_limits();
    if limits.len() != k {
        return Err(PspError::LengthMismatch {
            what: "parameter limits vs parameter names",
            left: limits.len(),
            right: k,
        });
    }

    let seed = shape.initial_fit_values(time, value)?;
    let solution = levenberg_marquardt(
        |p| {
            shape
                .evaluate(time, p)
                .iter()
                .zip(value.iter())
                .map(|(model, measured)| model - measured)
                .collect()
        },
        seed.values(),
        &limits,
        &LeastSquaresOptions::from(config),
    )?;

    let noise_var = noise_estimate * noise_estimate;
    let dof = (time.len() - k) as f64;
    let reduced_chi2 = solution.cost / (noise_var * dof);

    let covariance = match solution.unscaled_covariance() {
        Some(raw) => raw * noise_var,
        None => DMatrix::from_element(k, k, f64::NAN),
    };

    let failure = classify(
        solution.termination,
        &covariance,
        config.fail_on_negative_covariance.as_deref(),
        reduced_chi2,
        config.max_reduced_chi2,
    );

    let (params, covariance) = shape.process_fit_results(solution.params, covariance);

    debug!(
        shape = shape.name(),
        ?failure,
        reduced_chi2,
        calls = solution.n_calls,
        "fit finished"
    );

    Ok(FitResult {
        parameters: Parameters::new(names, params)?,
        covariance,
        reduced_chi2,
        failure,
        n_calls: solution.n_calls,
    })
}

/// Convenience wrapper around [`fit`] for a [`Waveform`].
pub fn fit_waveform<S>(
    shape: &S,
    waveform: &Waveform,
    noise_estimate: f64,
    config: &FitConfig,
) -> Result<FitResult, PspError>
where
    S: ShapeModel + ?Sized,
{
    fit(shape, waveform.time(), waveform.value(), noise_estimate, config)
}

/// First failing acceptance criterion, in the order
/// convergence, covariance, chi-square.
fn classify(
    termination: Termination,
    covariance: &DMatrix<f64>,
    mask: Option<&[bool]>,
    reduced_chi2: f64,
    max_reduced_chi2: f64,
) -> Option<FitFailure> {
    if !termination.converged() {
        return Some(FitFailure::NonConvergence);
    }

    // An undefined (NaN) variance counts as negative.
    let divergent = covariance
        .diagonal()
        .iter()
        .enumerate()
        .any(|(i, &v)| mask.is_none_or(|m| m[i]) && !(v >= 0.0));
    if divergent {
        return Some(FitFailure::DivergentCovariance);
    }

    if !(reduced_chi2 <= max_reduced_chi2) {
        return Some(FitFailure::PoorFit);
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::noisy_psp;
    use crate::domain::{time_axis, ParameterBounds};
    use crate::models::{AlphaPsp, DoubleExponentialPsp};

    const TRUE_PARAMS: [f64; 5] = [1.0, 10.0, 5.0, 30.0, 50.0];

    /// `slope · t`; the second parameter has no effect on the model.
    struct IgnoredParameter;

    impl ShapeModel for IgnoredParameter {
        fn name(&self) -> &'static str {
            "line with unused parameter"
        }
        fn parameter_names(&self) -> &'static [&'static str] {
            &["slope", "unused"]
        }
        fn evaluate(&self, time: &[f64], params: &[f64]) -> Vec<f64> {
            time.iter().map(|t| params[0] * t).collect()
        }
        fn initial_fit_values(&self, _: &[f64], _: &[f64]) -> Result<Parameters, PspError> {
            Parameters::new(self.parameter_names(), vec![1.0, 0.0])
        }
        fn parameter_limits(&self) -> Vec<ParameterBounds> {
            vec![ParameterBounds::unbounded("slope"), ParameterBounds::unbounded("unused")]
        }
    }

    /// A constant that is only finite at its starting value.
    struct FiniteAtSeedOnly;

    impl ShapeModel for FiniteAtSeedOnly {
        fn name(&self) -> &'static str {
            "finite at seed only"
        }
        fn parameter_names(&self) -> &'static [&'static str] {
            &["height"]
        }
        fn evaluate(&self, time: &[f64], params: &[f64]) -> Vec<f64> {
            let v = if params[0] == 1.0 { 1.0 } else { f64::INFINITY };
            vec![v; time.len()]
        }
        fn initial_fit_values(&self, _: &[f64], _: &[f64]) -> Result<Parameters, PspError> {
            Parameters::new(self.parameter_names(), vec![1.0])
        }
        fn parameter_limits(&self) -> Vec<ParameterBounds> {
            vec![ParameterBounds::unbounded("height")]
        }
    }

    fn mask() -> FitConfig {
        FitConfig::default().with_negative_covariance_mask(vec![true, true, true, false, false])
    }

    #[test]
    fn recovers_alpha_psp_within_reported_errors() {
        let psp = AlphaPsp::default();
        let time = time_axis(1000, 0.1);
        let noise = 0.1;

        for seed in [31205, 3120945, 3901225, 3901226, 3901227] {
            let value = noisy_psp(&psp, &time, &TRUE_PARAMS, noise, seed).unwrap();
            let result = fit(&psp, &time, &value, noise, &mask()).unwrap();

            assert!(result.success(), "seed {seed}: {:?}", result.failure);
            assert!(result.reduced_chi2 < 1.5, "seed {seed}: chi2 {}", result.reduced_chi2);

            let err = result.standard_errors();
            let p = result.parameters.values();
            assert!((p[0] - 1.0).abs() < 4.0 * err[0], "seed {seed}: height {} ± {}", p[0], err[0]);
            assert!((p[1] - 10.0).abs() < 4.0 * err[1], "seed {seed}: tau_1 {} ± {}", p[1], err[1]);
            assert!((p[2] - 5.0).abs() < 4.0 * err[2], "seed {seed}: tau_2 {} ± {}", p[2], err[2]);
            assert!(p[1] >= p[2]);
        }
    }

    #[test]
    fn covariance_is_symmetric_and_scaled() {
        let psp = AlphaPsp::default();
        let time = time_axis(1000, 0.1);
        let value = noisy_psp(&psp, &time, &TRUE_PARAMS, 0.1, 11).unwrap();

        let a = fit(&psp, &time, &value, 0.1, &mask()).unwrap();
        let b = fit(&psp, &time, &value, 0.2, &mask()).unwrap();

        assert_eq!(a.parameters, b.parameters);
        let scale = a.covariance.amax();
        for i in 0..5 {
            for j in 0..5 {
                let c = a.covariance[(i, j)];
                assert_eq!(c, a.covariance[(j, i)]);
                assert!((4.0 * c - b.covariance[(i, j)]).abs() <= 1e-9 * scale);
            }
        }
        assert!((a.reduced_chi2 - 4.0 * b.reduced_chi2).abs() < 1e-9);
    }

    #[test]
    fn underestimated_noise_is_a_poor_fit() {
        let psp = AlphaPsp::default();
        let time = time_axis(1000, 0.1);
        let value = noisy_psp(&psp, &time, &TRUE_PARAMS, 0.1, 5).unwrap();

        let result = fit(&psp, &time, &value, 0.05, &mask()).unwrap();
        assert_eq!(result.failure, Some(FitFailure::PoorFit));
        assert!(!result.success());
        assert!(result.reduced_chi2 > 2.0);
    }

    #[test]
    fn tiny_call_budget_is_non_convergence() {
        let psp = AlphaPsp::default();
        let time = time_axis(1000, 0.1);
        let value = noisy_psp(&psp, &time, &TRUE_PARAMS, 0.1, 5).unwrap();

        let config = FitConfig { max_calls: 8, ..mask() };
        let result = fit(&psp, &time, &value, 0.1, &config).unwrap();
        assert_eq!(result.failure, Some(FitFailure::NonConvergence));
        assert!(result.parameters.values().iter().all(|v| v.is_finite()));
    }

    #[test]
    fn waveform_fit_matches_slice_fit() {
        let psp = AlphaPsp::default();
        let time = time_axis(1000, 0.1);
        let value = noisy_psp(&psp, &time, &TRUE_PARAMS, 0.1, 21).unwrap();
        let waveform = Waveform::from_samples(0.1, value.clone()).unwrap();

        let a = fit_waveform(&psp, &waveform, 0.1, &mask()).unwrap();
        let b = fit(&psp, &time, &value, 0.1, &mask()).unwrap();
        assert_eq!(a.parameters, b.parameters);
        assert_eq!(a.failure, b.failure);
    }

    #[test]
    fn too_few_samples_is_degenerate() {
        let psp = AlphaPsp::default();
        let time = time_axis(5, 1.0);
        let result = fit(&psp, &time, &[0.0; 5], 0.1, &FitConfig::default()).unwrap();
        assert_eq!(result.failure, Some(FitFailure::DegenerateInput));
        assert_eq!(result.n_calls, 0);
        assert!(result.reduced_chi2.is_nan());
    }

    #[test]
    fn precondition_violations_are_errors() {
        let psp = AlphaPsp::default();
        let time = time_axis(50, 1.0);
        let value = vec![0.0; 50];
        let config = FitConfig::default();

        assert!(matches!(
            fit(&psp, &time, &value[..49], 0.1, &config),
            Err(PspError::LengthMismatch { .. })
        ));
        assert!(matches!(fit(&psp, &time, &value, 0.0, &config), Err(PspError::InvalidNoise(_))));
        assert!(matches!(
            fit(&psp, &time, &value, f64::NAN, &config),
            Err(PspError::InvalidNoise(_))
        ));
        let bad_mask = FitConfig::default().with_negative_covariance_mask(vec![true]);
        assert!(fit(&psp, &time, &value, 0.1, &bad_mask).is_err());
    }

    #[test]
    fn classification_order() {
        let ok = DMatrix::from_diagonal_element(2, 2, 1.0);
        let mut negative = ok.clone();
        negative[(1, 1)] = -1.0;

        assert_eq!(
            classify(Termination::MaxCalls, &negative, None, 9.0, 2.0),
            Some(FitFailure::NonConvergence)
        );
        assert_eq!(
            classify(Termination::NoProgress, &negative, None, 1.0, 2.0),
            Some(FitFailure::NonConvergence)
        );
        assert_eq!(
            classify(Termination::CostTolerance, &negative, None, 9.0, 2.0),
            Some(FitFailure::DivergentCovariance)
        );
        // A masked-out negative variance is tolerated.
        assert_eq!(
            classify(Termination::CostTolerance, &negative, Some(&[true, false][..]), 1.0, 2.0),
            None
        );
        assert_eq!(
            classify(Termination::StepTolerance, &ok, None, 9.0, 2.0),
            Some(FitFailure::PoorFit)
        );
        assert_eq!(
            classify(Termination::GradientTolerance, &ok, None, f64::NAN, 2.0),
            Some(FitFailure::PoorFit)
        );
    }

    #[test]
    fn unidentifiable_parameter_is_divergent_covariance() {
        let time = time_axis(50, 0.1);
        let value: Vec<f64> = time.iter().map(|t| 2.0 * t + 0.1 * (7.0 * t).sin()).collect();

        let result = fit(&IgnoredParameter, &time, &value, 0.1, &FitConfig::default()).unwrap();
        assert_eq!(result.failure, Some(FitFailure::DivergentCovariance));
        assert!(result.covariance.iter().all(|v| v.is_nan()));
        assert!(result.standard_errors().iter().all(|e| e.is_nan()));
        // The identifiable parameter is still fitted.
        assert!((result.parameters.values()[0] - 2.0).abs() < 0.05);
    }

    #[test]
    fn non_finite_model_is_non_convergence() {
        let time = time_axis(10, 1.0);
        let value = vec![2.0; 10];

        let result = fit(&FiniteAtSeedOnly, &time, &value, 0.1, &FitConfig::default()).unwrap();
        assert_eq!(result.failure, Some(FitFailure::NonConvergence));
        assert!(!result.success());
        assert_eq!(result.parameters.values(), &[1.0]);
        assert!(result.covariance[(0, 0)].is_nan());
    }

    #[test]
    fn double_exponential_shape_fits_without_fitter_changes() {
        let shape = DoubleExponentialPsp::new();
        let time = time_axis(1000, 0.1);
        let truth = [4.0, 10.0, 5.0, 30.0, 50.0];
        let value = noisy_psp(&shape, &time, &truth, 0.05, 8).unwrap();

        let result = fit(&shape, &time, &value, 0.05, &FitConfig::default()).unwrap();
        assert!(result.success(), "{:?}", result.failure);
        let p = result.parameters.values();
        assert!(p[1] >= p[2]);
        assert!((p[0] - 4.0).abs() < 5.0 * result.standard_errors()[0]);
    }
}
