//! Segmentation of long periodic traces and recovery of their period.

pub mod period;
pub mod segmenter;

pub use period::*;
pub use segmenter::*;
