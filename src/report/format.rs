//! Formatted terminal output for fits, period searches and fitted series.
//!
//! We keep formatting code in one place so:
//! - the math/fitting code stays clean and testable
//! - output changes are localized

use crate::domain::{DerivedQuantity, FitResult};
use crate::fit::{SegmentFit, SeriesSummary};
use crate::segment::PeriodEstimate;

/// Parameter table, chi-square and status of a single fit.
pub fn format_fit(shape_name: &str, fit: &FitResult, integral: Option<&DerivedQuantity>) -> String {
    let mut out = String::new();

    out.push_str(&format!("=== {shape_name} fit ===\n"));
    out.push_str(&format!("Status: {}\n", status(fit)));
    out.push_str(&format!(
        "Reduced chi2: {:.4} | calls={}\n",
        fit.reduced_chi2, fit.n_calls
    ));

    out.push_str(&format!("{:<10} {:>14} {:>14}\n", "parameter", "value", "error"));
    out.push_str(&format!("{:-<10} {:-<14} {:-<14}\n", "", "", ""));
    let errors = fit.standard_errors();
    for ((name, value), error) in fit.parameters.iter().zip(errors) {
        out.push_str(&format!("{name:<10} {value:>14.6} {error:>14.6}\n"));
    }

    if let Some(q) = integral {
        out.push_str(&format!("Integral: {:.6} ± {:.6}\n", q.value, q.error));
    }

    out
}

pub fn format_period(estimate: &PeriodEstimate) -> String {
    format!(
        "Period: {:.4} (objective={:.6}, iterations={}, {})\n",
        estimate.interval,
        estimate.objective,
        estimate.iterations,
        if estimate.converged { "converged" } else { "not converged" }
    )
}

/// One line per segment followed by the series totals.
pub fn format_series(fits: &[SegmentFit], summary: &SeriesSummary) -> String {
    let mut out = String::new();

    out.push_str(&format!(
        "{:>5} {:>10} {:>10} {:>10} {:>12} {:>12} {:<20}\n",
        "seg", "height", "tau_1", "tau_2", "integral", "error", "status"
    ));
    out.push_str(&format!(
        "{:->5} {:->10} {:->10} {:->10} {:->12} {:->12} {:-<20}\n",
        "", "", "", "", "", "", ""
    ));

    for f in fits {
        let p = f.fit.parameters.values();
        let (integral, error) = f.integral.map_or((f64::NAN, f64::NAN), |q| (q.value, q.error));
        out.push_str(
            format!(
                "{:>5} {:>10.4} {:>10.4} {:>10.4} {:>12.4} {:>12.4} {:<20}\n",
                f.index,
                p.first().copied().unwrap_or(f64::NAN),
                p.get(1).copied().unwrap_or(f64::NAN),
                p.get(2).copied().unwrap_or(f64::NAN),
                integral,
                error,
                status(&f.fit),
            )
            .trim_end(),
        );
        out.push('\n');
    }

    out.push_str(&format!("\nFits: {} | successful: {}\n", summary.n_fits, summary.n_success));
    for (kind, count) in summary.failures.iter().filter(|(_, n)| *n > 0) {
        out.push_str(&format!("  {kind}: {count}\n"));
    }
    if let Some(mean) = summary.mean_integral {
        out.push_str(&format!("Mean integral: {mean:.6}\n"));
    }

    out
}

fn status(fit: &FitResult) -> String {
    match fit.failure {
        None => "ok".to_string(),
        Some(failure) => failure.to_string(),
    }
}
