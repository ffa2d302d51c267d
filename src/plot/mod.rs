//! Calibration curve plots (PNG).

pub mod figure;

pub use figure::*;
