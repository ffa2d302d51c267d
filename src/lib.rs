//! `qnta-calcurves` library crate.
//!
//! The binary (`qcal`) is a thin wrapper around this library so that:
//!
//! - core logic is testable without spawning processes
//! - ingest, fitting, and plotting can be reused from other tools
//! - code stays easy to navigate as the project grows

pub mod app;
pub mod cli;
pub mod domain;
pub mod error;
pub mod fit;
pub mod io;
pub mod math;
pub mod models;
pub mod plot;
pub mod report;
