//! Domain types shared by the shapes, the fitter and the segmenter.
//!
//! This module defines:
//!
//! - sampled data (`Waveform`)
//! - named parameter vectors and their limits (`Parameters`, `ParameterBounds`)
//! - fit configuration and outputs (`FitConfig`, `FitResult`, `FitFailure`)
//! - quantities derived from a fit (`DerivedQuantity`)

pub mod types;

pub use types::*;
