//! Reporting utilities: formatted terminal output for runs and file listings.

pub mod format;

pub use format::*;
