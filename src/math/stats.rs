//! Small descriptive-statistics helpers on `f64` slices.

/// Fraction of a trace (taken from its end) that is assumed to be flat baseline.
pub const BASELINE_TAIL_FRACTION: f64 = 0.1;

pub fn mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}

/// Population variance (divisor `n`).
pub fn variance(values: &[f64]) -> f64 {
    let m = mean(values);
    values.iter().map(|v| (v - m) * (v - m)).sum::<f64>() / values.len() as f64
}

/// Mean and population standard deviation of the trailing baseline segment.
///
/// The segment is the last `floor(n · BASELINE_TAIL_FRACTION)` samples. Traces
/// shorter than ten samples use the whole trace.
pub fn tail_mean_std(values: &[f64]) -> (f64, f64) {
    let count = (values.len() as f64 * BASELINE_TAIL_FRACTION) as usize;
    let tail = if count == 0 {
        values
    } else {
        &values[values.len() - count..]
    };
    (mean(tail), variance(tail).sqrt())
}

/// Moving average with a box of `width` samples, zero-padded at the edges.
///
/// Output sample `k` averages inputs `k − width/2 ..= k + (width − 1)/2`
/// (the centered "same"-length convolution). `width` is clamped to `1..=len`.
pub fn box_smooth(values: &[f64], width: usize) -> Vec<f64> {
    let n = values.len();
    let width = width.clamp(1, n.max(1));
    let shift = (width - 1) / 2;
    (0..n)
        .map(|k| {
            let hi = (k + shift).min(n - 1);
            let lo = (k + shift + 1).saturating_sub(width);
            values[lo..=hi].iter().sum::<f64>() / width as f64
        })
        .collect()
}

/// Index of the first maximum (NaN samples are skipped).
pub fn argmax(values: &[f64]) -> Option<usize> {
    let mut best: Option<usize> = None;
    for (i, &v) in values.iter().enumerate() {
        if v.is_nan() {
            continue;
        }
        match best {
            Some(b) if values[b] >= v => {}
            _ => best = Some(i),
        }
    }
    best
}

/// Trapezoidal integral of `y` over the (possibly non-uniform) axis `x`.
pub fn trapezoid(y: &[f64], x: &[f64]) -> f64 {
    y.windows(2)
        .zip(x.windows(2))
        .map(|(yy, xx)| 0.5 * (yy[0] + yy[1]) * (xx[1] - xx[0]))
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn tail_statistics_use_last_tenth() {
        let mut v = vec![100.0; 90];
        v.extend([1.0, 3.0].iter().cycle().take(10));
        let (m, s) = tail_mean_std(&v);
        assert_abs_diff_eq!(m, 2.0, epsilon = 1e-12);
        assert_abs_diff_eq!(s, 1.0, epsilon = 1e-12);
    }

    #[test]
    fn tail_statistics_fall_back_to_whole_trace() {
        let (m, _) = tail_mean_std(&[1.0, 2.0, 3.0]);
        assert_abs_diff_eq!(m, 2.0, epsilon = 1e-12);
    }

    #[test]
    fn box_smooth_is_centered_and_zero_padded() {
        // Width 4: output k averages k-2..=k+1.
        let out = box_smooth(&[4.0, 8.0, 0.0, 0.0, 0.0], 4);
        assert_abs_diff_eq!(out[0], 3.0, epsilon = 1e-12); // (4 + 8) / 4
        assert_abs_diff_eq!(out[1], 3.0, epsilon = 1e-12); // (4 + 8 + 0) / 4
        assert_abs_diff_eq!(out[2], 3.0, epsilon = 1e-12); // (4 + 8 + 0 + 0) / 4
        assert_abs_diff_eq!(out[3], 2.0, epsilon = 1e-12); // (8 + 0 + 0 + 0) / 4
        assert_abs_diff_eq!(out[4], 0.0, epsilon = 1e-12);
    }

    #[test]
    fn box_smooth_preserves_constant_interior() {
        let out = box_smooth(&[2.0; 30], 10);
        for v in &out[5..25] {
            assert_abs_diff_eq!(*v, 2.0, epsilon = 1e-12);
        }
    }

    #[test]
    fn argmax_returns_first_maximum() {
        assert_eq!(argmax(&[1.0, 3.0, f64::NAN, 3.0]), Some(1));
        assert_eq!(argmax(&[]), None);
    }

    #[test]
    fn trapezoid_of_line() {
        let x: Vec<f64> = (0..11).map(|i| i as f64 * 0.1).collect();
        let y: Vec<f64> = x.iter().map(|v| 2.0 * v).collect();
        assert_abs_diff_eq!(trapezoid(&y, &x), 1.0, epsilon = 1e-12);
    }
}
