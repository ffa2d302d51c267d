//! Domain types used throughout the pipeline.
//!
//! This module defines:
//!
//! - the measurement-family schema of a calibration sheet (`MeasureFamily`)
//! - long-table rows and positive-response points (`CalibrationRecord`, `CalibrationPoint`)
//! - fit outputs (`CalibrationModel`, `CalFitOutcome`, `ChemicalOutcome`, etc.)

pub mod types;

pub use types::*;
