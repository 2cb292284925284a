//! Numerical building blocks: finite-difference derivatives, descriptive
//! statistics and Levenberg–Marquardt least squares.

pub mod jacobian;
pub mod lm;
pub mod stats;

pub use jacobian::*;
pub use lm::*;
pub use stats::*;
