//! Area under a fitted PSP, excluding the onset and baseline contribution.
//!
//! The integral is taken with `start` and `offset` set to zero, so it depends
//! only on the shape parameters. Its error comes from first-order propagation
//! of the fit covariance through a forward-difference gradient.

use nalgebra::{DMatrix, DVector};

use crate::domain::{DerivedQuantity, FitResult};
use crate::error::PspError;
use crate::math::{gradient, propagate_variance, trapezoid, DEFAULT_EPSILON};
use crate::models::ShapeModel;

const START: &str = "start";
const OFFSET: &str = "offset";

/// Integral of the fitted shape over `time` and its propagated standard error.
pub fn psp_integral<S>(
    shape: &S,
    time: &[f64],
    fit: &FitResult,
) -> Result<DerivedQuantity, PspError>
where
    S: ShapeModel + ?Sized,
{
    integral_with_error(shape, time, fit.parameters.values(), &fit.covariance)
}

pub fn integral_with_error<S>(
    shape: &S,
    time: &[f64],
    params: &[f64],
    covariance: &DMatrix<f64>,
) -> Result<DerivedQuantity, PspError>
where
    S: ShapeModel + ?Sized,
{
    let grad = integral_gradient(shape, time, params)?;
    let value = integral_excluding_baseline(shape, time, params)?;
    let error = propagate_variance(&grad, covariance)?.sqrt();
    Ok(DerivedQuantity { value, error })
}

/// Trapezoidal area of the shape with `start` and `offset` zeroed.
pub fn integral_excluding_baseline<S>(
    shape: &S,
    time: &[f64],
    params: &[f64],
) -> Result<f64, PspError>
where
    S: ShapeModel + ?Sized,
{
    let (start, offset) = baseline_indices(shape, params)?;
    Ok(zeroed_area(shape, time, params, start, offset))
}

/// Gradient of [`integral_excluding_baseline`] with respect to every parameter.
///
/// The `start` and `offset` components are exactly zero.
pub fn integral_gradient<S>(
    shape: &S,
    time: &[f64],
    params: &[f64],
) -> Result<DVector<f64>, PspError>
where
    S: ShapeModel + ?Sized,
{
    if time.len() < 2 {
        return Err(PspError::invalid_input("Integration needs at least two time points."));
    }
    let (start, offset) = baseline_indices(shape, params)?;
    let grad = gradient(
        |p| zeroed_area(shape, time, p, start, offset),
        params,
        DEFAULT_EPSILON,
    );
    debug_assert!(grad[start] == 0.0 && grad[offset] == 0.0);
    Ok(grad)
}

fn baseline_indices<S>(shape: &S, params: &[f64]) -> Result<(usize, usize), PspError>
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
    let start = shape.parameter_index(START).ok_or(PspError::MissingParameter(START))?;
    let offset = shape.parameter_index(OFFSET).ok_or(PspError::MissingParameter(OFFSET))?;
    Ok((start, offset))
}

fn zeroed_area<S>(shape: &S, time: &[f64], params: &[f64], start: usize, offset: usize) -> f64
where
    S: ShapeModel + ?Sized,
{
    let mut p = params.to_vec();
    p[start] = 0.0;
    p[offset] = 0.0;
    trapezoid(&shape.evaluate(time, &p), time)
}
