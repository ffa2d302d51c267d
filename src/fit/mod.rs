//! Curve fitting.
//!
//! Responsibilities:
//!
//! - fit the log-log calibration line for one chemical
//! - compute per-observation prediction intervals

pub mod fitter;
pub mod intervals;

pub use fitter::*;
pub use intervals::*;
