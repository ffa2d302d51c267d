//! CSV exports: per-chemical coefficients and the positive-response long table.
//!
//! Both files are meant to be easy to consume in spreadsheets or downstream
//! scripts.

use std::path::Path;

use serde::Serialize;

use crate::domain::{CalibrationPoint, ChemicalOutcome, ChemicalStatus, MeasureFamily};
use crate::error::AppError;

/// One row of the coefficient table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CoefficientRow {
    pub chemical: String,
    pub status: &'static str,
    pub n_points: usize,
    pub intercept: Option<f64>,
    pub slope: Option<f64>,
    pub r_squared: Option<f64>,
    pub rmse: Option<f64>,
    pub plot_file: Option<String>,
}

impl From<&ChemicalOutcome> for CoefficientRow {
    fn from(outcome: &ChemicalOutcome) -> Self {
        let mut row = CoefficientRow {
            chemical: outcome.chemical.clone(),
            status: outcome.status.label(),
            n_points: outcome.status.n_points(),
            intercept: None,
            slope: None,
            r_squared: None,
            rmse: None,
            plot_file: None,
        };
        if let ChemicalStatus::Fitted { model, plot_file, .. } = &outcome.status {
            row.intercept = Some(model.intercept);
            row.slope = Some(model.slope);
            row.r_squared = Some(model.quality.r_squared).filter(|v| v.is_finite());
            row.rmse = Some(model.quality.rmse);
            row.plot_file = plot_file.as_ref().map(|p| p.display().to_string());
        }
        row
    }
}

/// Write one row per chemical (fitted or not).
pub fn write_coefficients_csv(path: &Path, outcomes: &[ChemicalOutcome]) -> Result<(), AppError> {
    let mut writer = csv::Writer::from_path(path).map_err(|e| csv_err(path, e))?;
    for outcome in outcomes {
        writer
            .serialize(CoefficientRow::from(outcome))
            .map_err(|e| csv_err(path, e))?;
    }
    writer.flush().map_err(|e| AppError::io(path, e))?;
    log::info!("Wrote coefficient table '{}'", path.display());
    Ok(())
}

/// Write the positive-response long table, including log columns.
pub fn write_long_csv(path: &Path, points: &[CalibrationPoint]) -> Result<(), AppError> {
    let mut writer = csv::Writer::from_path(path).map_err(|e| csv_err(path, e))?;

    let mut header = vec!["Feature ID", "Chemical Name", "Cal Level"];
    header.extend(MeasureFamily::ALL.into_iter().map(MeasureFamily::header_prefix));
    header.extend(["LogAbun", "LogConc"]);
    writer.write_record(&header).map_err(|e| csv_err(path, e))?;

    for p in points {
        let r = &p.record;
        let mut row = vec![r.feature_id.clone(), r.chemical_name.clone(), r.level.clone()];
        row.extend(MeasureFamily::ALL.into_iter().map(|f| r.value(f).to_string()));
        row.push(p.log_abun.to_string());
        row.push(p.log_conc.to_string());
        writer.write_record(&row).map_err(|e| csv_err(path, e))?;
    }

    writer.flush().map_err(|e| AppError::io(path, e))?;
    log::info!("Wrote {} long-table rows to '{}'", points.len(), path.display());
    Ok(())
}

fn csv_err(path: &Path, e: csv::Error) -> AppError {
    match e.into_kind() {
        csv::ErrorKind::Io(io) => AppError::io(path, io),
        other => AppError::io(
            path,
            std::io::Error::new(std::io::ErrorKind::InvalidData, format!("{other:?}")),
        ),
    }
}
