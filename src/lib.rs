//! `psp-fit` library crate.
//!
//! Fits post-synaptic potential shapes to noisy traces, propagates the fit
//! covariance to derived quantities, and recovers the repetition period of
//! long recordings so each repetition can be fitted on its own.
//!
//! The binary (`psp`) is a thin wrapper around this library so that:
//!
//! - core logic is testable without spawning processes
//! - modules are reusable from other analysis code

pub mod app;
pub mod data;
pub mod domain;
pub mod error;
pub mod fit;
pub mod math;
pub mod models;
pub mod report;
pub mod segment;
