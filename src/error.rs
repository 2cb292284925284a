//! Crate-wide error type.
//!
//! Only caller bugs and internal failures are errors. Statistical outcomes of a
//! fit (no convergence, poor chi-square, ...) are reported through
//! [`crate::domain::FitFailure`] instead.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum PspError {
    #[error("Length mismatch: {what} ({left} != {right}).")]
    LengthMismatch {
        what: &'static str,
        left: usize,
        right: usize,
    },

    #[error("Noise estimate must be finite and > 0, got {0}.")]
    InvalidNoise(f64),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Shape has no parameter named `{0}`.")]
    MissingParameter(&'static str),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Optimizer failed: {0}")]
    Optimizer(String),
}

impl PspError {
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput(message.into())
    }

    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig(message.into())
    }

    /// Process exit code used by the `psp` binary.
    pub fn exit_code(&self) -> u8 {
        match self {
            PspError::InvalidConfig(_) => 2,
            PspError::LengthMismatch { .. }
            | PspError::InvalidNoise(_)
            | PspError::InvalidInput(_)
            | PspError::MissingParameter(_) => 3,
            PspError::Optimizer(_) => 4,
        }
    }
}
