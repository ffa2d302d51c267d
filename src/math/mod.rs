//! Mathematical utilities: least squares and t-distribution quantiles.

pub mod ols;
pub mod stats;

pub use ols::*;
pub use stats::*;
