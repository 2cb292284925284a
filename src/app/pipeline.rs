//! The demo workflow behind the `psp` binary.
//!
//! synthetic periodic trace -> period search -> segmentation -> per-segment fits -> summary
//!
//! Kept separate from printing so the whole chain is testable in-process.

use tracing::info;

use crate::app::RunConfig;
use crate::data::periodic_trace;
use crate::error::PspError;
use crate::fit::{fit_segments, summarize, SegmentFit, SeriesSummary};
use crate::models::AlphaPsp;
use crate::segment::{optimize_segment, segment, PeriodEstimate};

/// All computed outputs of a single `psp` run.
#[derive(Debug, Clone)]
pub struct SeriesRun {
    pub trace: Vec<f64>,
    pub period: PeriodEstimate,
    pub fits: Vec<SegmentFit>,
    pub summary: SeriesSummary,
}

/// Execute the full pipeline for `config`.
pub fn run_series(config: &RunConfig) -> Result<SeriesRun, PspError> {
    config.validate()?;
    let psp = AlphaPsp::default();

    // Half a period of slack so a slightly long interval estimate still
    // yields every repetition.
    let n_samples = ((config.repetitions as f64 + 0.5) * config.period / config.dt).ceil() as usize;
    let trace = periodic_trace(
        &psp,
        &config.psp,
        n_samples,
        config.dt,
        config.period,
        config.noise,
        config.seed,
    )?;
    info!(samples = trace.len(), period = config.period, "generated synthetic trace");

    let period = optimize_segment(&trace, config.dt, config.period_guess, &config.period_search)?;
    info!(interval = period.interval, converged = period.converged, "recovered period");

    let segments = segment(&trace, config.dt, period.interval)?;
    let fits = fit_segments(&psp, &segments, config.noise, &config.fit)?;
    let summary = summarize(&fits);
    info!(fits = summary.n_fits, successful = summary.n_success, "fitted segments");

    Ok(SeriesRun {
        trace,
        period,
        fits,
        summary,
    })
}
