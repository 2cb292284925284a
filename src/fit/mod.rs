//! Curve fitting orchestration.
//!
//! Responsibilities:
//!
//! - fit one trace against a shape and classify the outcome
//! - fit many traces or the segments of a series in parallel
//! - derive the baseline-free integral of a fit with its error

pub mod batch;
pub mod fitter;
pub mod integral;

pub use batch::*;
pub use fitter::*;
pub use integral::*;
