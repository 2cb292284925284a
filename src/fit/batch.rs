//! Parallel fitting of many traces that share a time axis.

use rayon::prelude::*;
use serde::Serialize;
use tracing::warn;

use crate::domain::{DerivedQuantity, FitConfig, FitFailure, FitResult};
use crate::error::PspError;
use crate::fit::fitter::fit;
use crate::fit::integral::psp_integral;
use crate::models::ShapeModel;
use crate::segment::SegmentMatrix;

/// Fit every trace in `traces` against the same `time` axis.
///
/// Results keep the input order. The first precondition error aborts the
/// batch; unsuccessful fits do not.
pub fn fit_batch<S, T>(
    shape: &S,
    time: &[f64],
    traces: &[T],
    noise_estimate: f64,
    config: &FitConfig,
) -> Result<Vec<FitResult>, PspError>
where
    S: ShapeModel + ?Sized,
    T: AsRef<[f64]> + Sync,
{
    traces
        .par_iter()
        .map(|trace| fit(shape, time, trace.as_ref(), noise_estimate, config))
        .collect()
}

/// One fitted segment of a series.
#[derive(Debug, Clone)]
pub struct SegmentFit {
    pub index: usize,
    pub fit: FitResult,
    /// Integral excluding the baseline, for successful fits only.
    pub integral: Option<DerivedQuantity>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SeriesSummary {
    pub n_fits: usize,
    pub n_success: usize,
    /// Count per failure kind, in [`FitFailure::ALL`] order.
    pub failures: Vec<(FitFailure, usize)>,
    /// Mean integral over the successful fits.
    pub mean_integral: Option<f64>,
}

/// Fit every segment of `segments` and attach the integral to successful fits.
pub fn fit_segments<S>(
    shape: &S,
    segments: &SegmentMatrix,
    noise_estimate: f64,
    config: &FitConfig,
) -> Result<Vec<SegmentFit>, PspError>
where
    S: ShapeModel + ?Sized,
{
    let time = segments.time_axis();
    let rows = segments.rows();
    let fits = fit_batch(shape, &time, &rows, noise_estimate, config)?;

    fits.into_iter()
        .enumerate()
        .map(|(index, fit)| {
            let integral = match fit.failure {
                None => Some(psp_integral(shape, &time, &fit)?),
                Some(failure) => {
                    warn!(index, %failure, reduced_chi2 = fit.reduced_chi2, "segment fit failed");
                    None
                }
            };
            Ok(SegmentFit { index, fit, integral })
        })
        .collect()
}

pub fn summarize(fits: &[SegmentFit]) -> SeriesSummary {
    let n_success = fits.iter().filter(|f| f.fit.success()).count();
    let failures = FitFailure::ALL
        .iter()
        .map(|&kind| (kind, fits.iter().filter(|f| f.fit.failure == Some(kind)).count()))
        .collect();

    let integrals: Vec<f64> = fits.iter().filter_map(|f| f.integral.map(|q| q.value)).collect();
    let mean_integral = (!integrals.is_empty())
        .then(|| integrals.iter().sum::<f64>() / integrals.len() as f64);

    SeriesSummary {
        n_fits: fits.len(),
        n_success,
        failures,
        mean_integral,
    }
}
