//! Plain-text reports for fits and fitted series.

pub mod format;

pub use format::*;
