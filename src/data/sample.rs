//! Seeded synthetic PSP traces.
//!
//! All generators take an explicit seed so tests and demo runs are
//! reproducible. Noise is additive, independent and Gaussian.

use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, Normal};
use tracing::debug;

use crate::error::PspError;
use crate::models::ShapeModel;

/// One PSP on `time` plus Gaussian noise with standard deviation `noise`.
pub fn noisy_psp<S>(
    shape: &S,
    time: &[f64],
    params: &[f64],
    noise: f64,
    seed: u64,
) -> Result<Vec<f64>, PspError>
where
    S: ShapeModel + ?Sized,
{
    check_params(shape, params)?;
    let normal = noise_distribution(noise)?;
    let mut rng = StdRng::seed_from_u64(seed);

    let mut value = shape.evaluate(time, params);
    for v in value.iter_mut() {
        *v += normal.sample(&mut rng);
    }
    Ok(value)
}

/// `repetitions` independent noisy copies of the same PSP, back to back.
///
/// The result has `repetitions · time.len()` samples; repetition `i` starts at
/// sample `i · time.len()`.
pub fn repeated_psp_trace<S>(
    shape: &S,
    time: &[f64],
    params: &[f64],
    noise: f64,
    repetitions: usize,
    seed: u64,
) -> Result<Vec<f64>, PspError>
where
    S: ShapeModel + ?Sized,
{
    check_params(shape, params)?;
    let normal = noise_distribution(noise)?;
    let mut rng = StdRng::seed_from_u64(seed);
    debug!(seed, repetitions, samples = time.len(), "generating repeated trace");

    let clean = shape.evaluate(time, params);
    let mut out = Vec::with_capacity(repetitions * clean.len());
    for _ in 0..repetitions {
        out.extend(clean.iter().map(|v| v + normal.sample(&mut rng)));
    }
    Ok(out)
}

/// A PSP repeating every `period` time units, sampled every `dt`.
///
/// `period` need not be a multiple of `dt`: sample `k` takes the waveform at
/// phase `(k · dt) mod period`, so repetitions drift against the sample grid.
pub fn periodic_trace<S>(
    shape: &S,
    params: &[f64],
    n_samples: usize,
    dt: f64,
    period: f64,
    noise: f64,
    seed: u64,
) -> Result<Vec<f64>, PspError>
where
    S: ShapeModel + ?Sized,
{
    check_params(shape, params)?;
    if !(dt.is_finite() && dt > 0.0 && period.is_finite() && period > 0.0) {
        return Err(PspError::invalid_input(format!(
            "dt and period must be finite and > 0 (dt={dt}, period={period})."
        )));
    }
    let normal = noise_distribution(noise)?;
    let mut rng = StdRng::seed_from_u64(seed);

    let phases: Vec<f64> = (0..n_samples).map(|k| (k as f64 * dt).rem_euclid(period)).collect();
    let mut value = shape.evaluate(&phases, params);
    for v in value.iter_mut() {
        *v += normal.sample(&mut rng);
    }
    Ok(value)
}

fn check_params<S>(shape: &S, params: &[f64]) -> Result<(), PspError>
where
    S: ShapeModel + ?Sized,
{
    if params.len() != shape.parameter_count() {
        return Err(PspError::LengthMismatch {
            what: "parameters vs shape parameter names",
            left: params.len(),
            right: shape.parameter_count(),
        });
    }
    Ok(())
}

/// Zero-mean Gaussian with standard deviation `noise`.
///
/// `rand_distr` accepts a negative standard deviation (it mirrors the samples),
/// so the sign is checked here.
fn noise_distribution(noise: f64) -> Result<Normal<f64>, PspError> {
    if !(noise.is_finite() && noise >= 0.0) {
        return Err(PspError::invalid_input(format!(
            "Noise level must be finite and >= 0 (got {noise})."
        )));
    }
    Normal::new(0.0, noise)
        .map_err(|e| PspError::invalid_input(format!("Invalid noise level {noise}: {e}")))
}
