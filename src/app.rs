//! Top-level application orchestration.
//!
//! `src/main.rs` is intentionally tiny; this module is the "real main" that:
//! - reads run parameters from the environment (and `.env`)
//! - installs the log subscriber
//! - runs the synthetic series pipeline
//! - prints the reports

use std::env::VarError;
use std::fmt::Display;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing_subscriber::EnvFilter;

use crate::domain::FitConfig;
use crate::error::PspError;
use crate::segment::PeriodSearch;

pub mod pipeline;

/// Run parameters of the `psp` binary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunConfig {
    pub seed: u64,
    /// Standard deviation of the added noise, also used as the fit noise estimate.
    pub noise: f64,
    pub repetitions: usize,
    pub dt: f64,
    /// True repetition period of the synthetic trace.
    pub period: f64,
    /// Starting point of the period search.
    pub period_guess: f64,
    /// Alpha-PSP parameters of every repetition.
    pub psp: [f64; 5],
    pub fit: FitConfig,
    pub period_search: PeriodSearch,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            seed: 7,
            noise: 0.1,
            repetitions: 20,
            dt: 0.1,
            period: 100.37,
            period_guess: 101.0,
            psp: [1.0, 10.0, 5.0, 30.0, 50.0],
            fit: FitConfig::default()
                .with_negative_covariance_mask(vec![true, true, true, false, false]),
            period_search: PeriodSearch::default(),
        }
    }
}

impl RunConfig {
    /// Defaults overridden by `PSP_*` environment variables.
    pub fn from_env() -> Result<Self, PspError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| match std::env::var(key) {
            Ok(v) => Ok(Some(v)),
            Err(VarError::NotPresent) => Ok(None),
            Err(e) => Err(PspError::invalid_config(format!("{key}: {e}"))),
        })
    }

    /// Build from an arbitrary key lookup (used by tests).
    pub fn from_lookup<F>(lookup: F) -> Result<Self, PspError>
    where
        F: Fn(&str) -> Result<Option<String>, PspError>,
    {
        let d = Self::default();
        let config = Self {
            seed: parse_or(&lookup, "PSP_SEED", d.seed)?,
            noise: parse_or(&lookup, "PSP_NOISE", d.noise)?,
            repetitions: parse_or(&lookup, "PSP_REPETITIONS", d.repetitions)?,
            dt: parse_or(&lookup, "PSP_DT", d.dt)?,
            period: parse_or(&lookup, "PSP_PERIOD", d.period)?,
            period_guess: parse_or(&lookup, "PSP_PERIOD_GUESS", d.period_guess)?,
            ..d
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), PspError> {
        if !(self.noise.is_finite() && self.noise > 0.0) {
            return Err(PspError::invalid_config("PSP_NOISE must be finite and > 0."));
        }
        if self.repetitions < 2 {
            return Err(PspError::invalid_config("PSP_REPETITIONS must be at least 2."));
        }
        if !(self.dt.is_finite() && self.dt > 0.0) {
            return Err(PspError::invalid_config("PSP_DT must be finite and > 0."));
        }
        if !(self.period.is_finite() && self.period > self.dt) {
            return Err(PspError::invalid_config(
                "PSP_PERIOD must be finite and larger than PSP_DT.",
            ));
        }
        if !(self.period_guess.is_finite() && self.period_guess > self.dt) {
            return Err(PspError::invalid_config(
                "PSP_PERIOD_GUESS must be finite and larger than PSP_DT.",
            ));
        }
        self.fit.validate(self.psp.len())?;
        self.period_search.validate()
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> Result<T, PspError>
where
    F: Fn(&str) -> Result<Option<String>, PspError>,
    T: FromStr,
    T::Err: Display,
{
    match lookup(key)? {
        None => Ok(default),
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e| PspError::invalid_config(format!("{key}={raw:?}: {e}"))),
    }
}

/// Entry point for the `psp` binary.
pub fn run() -> Result<(), PspError> {
    init_logging();
    let config = RunConfig::from_env()?;
    let run = pipeline::run_series(&config)?;

    println!("{}", crate::report::format_period(&run.period));
    println!("{}", crate::report::format_series(&run.fits, &run.summary));
    Ok(())
}

/// Log to stderr, filtered by `RUST_LOG` (default `info`).
fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    // Keep whichever subscriber is already installed (a host binary or a test).
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}
