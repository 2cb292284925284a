//! Cut a long periodic trace into aligned, equal-length segments.
//!
//! For an interval `T` and sampling step `dt`:
//! - segment length `L = ceil(T / dt)` samples
//! - segment count `n = floor(len / L)`
//! - segment `i` starts at sample `round(i · T / dt)` (ties to even)
//!
//! Fractional intervals therefore drift against the sample grid by at most
//! half a sample per segment instead of accumulating.

use nalgebra::DMatrix;

use crate::domain::time_axis;
use crate::error::PspError;
use crate::math::{mean, variance};

/// Segments stacked as rows: `n_segments × segment_length`.
#[derive(Debug, Clone, PartialEq)]
pub struct SegmentMatrix {
    data: DMatrix<f64>,
    dt: f64,
}

impl SegmentMatrix {
    pub fn n_segments(&self) -> usize {
        self.data.nrows()
    }

    pub fn segment_length(&self) -> usize {
        self.data.ncols()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn dt(&self) -> f64 {
        self.dt
    }

    pub fn as_matrix(&self) -> &DMatrix<f64> {
        &self.data
    }

    /// Segment `i` as an owned trace.
    pub fn row(&self, i: usize) -> Option<Vec<f64>> {
        (i < self.n_segments()).then(|| self.data.row(i).iter().copied().collect())
    }

    pub fn rows(&self) -> Vec<Vec<f64>> {
        self.data
            .row_iter()
            .map(|r| r.iter().copied().collect())
            .collect()
    }

    /// Time axis shared by every segment, starting at zero.
    pub fn time_axis(&self) -> Vec<f64> {
        time_axis(self.segment_length(), self.dt)
    }

    /// Mean across segments at every in-segment position.
    pub fn mean(&self) -> Vec<f64> {
        self.column_stat(mean)
    }

    /// Population variance across segments at every in-segment position.
    pub fn variance(&self) -> Vec<f64> {
        self.column_stat(variance)
    }

    pub fn std(&self) -> Vec<f64> {
        self.variance().into_iter().map(f64::sqrt).collect()
    }

    /// Sum of the per-position variances.
    ///
    /// Small when the segments line up with the true repetition period.
    pub fn cross_variance_sum(&self) -> f64 {
        self.variance().iter().sum()
    }

    fn column_stat(&self, stat: fn(&[f64]) -> f64) -> Vec<f64> {
        self.data
            .column_iter()
            .map(|c| stat(&c.iter().copied().collect::<Vec<_>>()))
            .collect()
    }
}

/// Split `data` into segments of `interval` time units.
///
/// Trailing samples that do not fill a whole segment are dropped. A trace
/// shorter than one segment yields an empty matrix.
pub fn segment(data: &[f64], dt: f64, interval: f64) -> Result<SegmentMatrix, PspError> {
    if !(dt.is_finite() && dt > 0.0) {
        return Err(PspError::invalid_input(format!("dt must be finite and > 0 (got {dt}).")));
    }
    if !(interval.is_finite() && interval > 0.0) {
        return Err(PspError::invalid_input(format!(
            "Segment interval must be finite and > 0 (got {interval})."
        )));
    }

    let segment_length = (interval / dt).ceil() as usize;
    let n_segments = data.len() / segment_length;
    let last_start = data.len().saturating_sub(segment_length);

    let offsets: Vec<usize> = (0..n_segments)
        .map(|i| ((i as f64 * interval / dt).round_ties_even() as usize).min(last_start))
        .collect();

    let matrix = DMatrix::from_fn(n_segments, segment_length, |i, j| data[offsets[i] + j]);
    Ok(SegmentMatrix { data: matrix, dt })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn integer_interval_matches_plain_slicing() {
        let data: Vec<f64> = (0..103).map(|i| (i as f64 * 0.37).sin()).collect();
        let m = segment(&data, 0.25, 1.25).unwrap();

        assert_eq!(m.segment_length(), 5);
        assert_eq!(m.n_segments(), 20);
        for i in 0..20 {
            assert_eq!(m.row(i).unwrap(), data[5 * i..5 * i + 5].to_vec());
        }
        assert!(m.row(20).is_none());
    }

    #[test]
    fn fractional_interval_rounds_offsets_half_to_even() {
        let data: Vec<f64> = (0..20).map(f64::from).collect();
        // interval / dt = 2.5: length 3, offsets 0, 2 (2.5 → 2), 5, 8 (7.5 → 8), 10, 12 (12.5 → 12)
        let m = segment(&data, 1.0, 2.5).unwrap();
        assert_eq!(m.segment_length(), 3);
        assert_eq!(m.n_segments(), 6);
        let starts: Vec<f64> = m.rows().iter().map(|r| r[0]).collect();
        assert_eq!(starts, vec![0.0, 2.0, 5.0, 8.0, 10.0, 12.0]);
    }

    #[test]
    fn short_trace_yields_no_segments() {
        let m = segment(&[1.0, 2.0, 3.0], 1.0, 10.0).unwrap();
        assert_eq!(m.n_segments(), 0);
        assert_eq!(m.segment_length(), 10);
        assert!(m.is_empty());
        assert!(m.rows().is_empty());
    }

    #[test]
    fn rejects_invalid_steps() {
        assert!(segment(&[1.0; 10], 0.0, 1.0).is_err());
        assert!(segment(&[1.0; 10], 1.0, -2.0).is_err());
        assert!(segment(&[1.0; 10], 1.0, f64::NAN).is_err());
    }

    #[test]
    fn column_statistics_use_population_variance() {
        let data = [1.0, 10.0, 3.0, 10.0, 5.0, 16.0];
        let m = segment(&data, 1.0, 2.0).unwrap();
        assert_eq!(m.mean(), vec![3.0, 12.0]);
        let var = m.variance();
        assert_abs_diff_eq!(var[0], 8.0 / 3.0, epsilon = 1e-12);
        assert_abs_diff_eq!(var[1], 8.0, epsilon = 1e-12);
        assert_abs_diff_eq!(m.std()[1], 8.0_f64.sqrt(), epsilon = 1e-12);
        assert_abs_diff_eq!(m.cross_variance_sum(), 8.0 / 3.0 + 8.0, epsilon = 1e-12);
        assert_eq!(m.time_axis(), vec![0.0, 1.0]);
    }

    #[test]
    fn identical_repetitions_have_zero_variance() {
        let one: Vec<f64> = (0..40).map(|i| ((i as f64) * 0.3).cos()).collect();
        let data: Vec<f64> = one.iter().cycle().take(400).copied().collect();
        let m = segment(&data, 0.5, 20.0).unwrap();
        assert_eq!(m.n_segments(), 10);
        assert_abs_diff_eq!(m.cross_variance_sum(), 0.0, epsilon = 1e-24);
    }
}
