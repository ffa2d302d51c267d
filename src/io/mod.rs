//! Input/output helpers.
//!
//! - calibration sheet ingest + reshaping (`ingest`)
//! - coefficient / long-table CSV exports (`export`)
//! - run summary JSON read/write (`summary`)

pub mod export;
pub mod ingest;
pub mod summary;

pub use export::*;
pub use ingest::*;
pub use summary::*;
