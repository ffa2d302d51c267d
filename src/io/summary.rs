//! Read/write run summary JSON files.
//!
//! The summary is the portable record of a run:
//! - input file, sheet, and confidence level
//! - dataset stats (features, levels, positive points)
//! - per-chemical outcome, coefficients, and prediction bands

use std::fs::File;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{ChemicalOutcome, ChemicalStatus, DatasetStats, PredictionBand};
use crate::error::AppError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryFile {
    pub tool: String,
    pub generated_at: DateTime<Utc>,
    pub input: String,
    pub sheet: Option<String>,
    pub confidence: f64,
    pub stats: DatasetStats,
    pub chemicals: Vec<ChemicalSummary>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChemicalSummary {
    pub chemical: String,
    pub status: String,
    pub n_points: usize,
    pub intercept: Option<f64>,
    pub slope: Option<f64>,
    pub r_squared: Option<f64>,
    pub rmse: Option<f64>,
    pub plot_file: Option<String>,
    pub reason: Option<String>,
    #[serde(default)]
    pub bands: Vec<PredictionBand>,
}

impl From<&ChemicalOutcome> for ChemicalSummary {
    fn from(outcome: &ChemicalOutcome) -> Self {
        let mut summary = ChemicalSummary {
            chemical: outcome.chemical.clone(),
            status: outcome.status.label().to_string(),
            n_points: outcome.status.n_points(),
            intercept: None,
            slope: None,
            r_squared: None,
            rmse: None,
            plot_file: None,
            reason: None,
            bands: Vec::new(),
        };
        match &outcome.status {
            ChemicalStatus::Fitted {
                model,
                bands,
                plot_file,
            } => {
                summary.intercept = Some(model.intercept);
                summary.slope = Some(model.slope);
                summary.r_squared = Some(model.quality.r_squared).filter(|v| v.is_finite());
                summary.rmse = Some(model.quality.rmse);
                summary.plot_file = plot_file.as_ref().map(|p| p.display().to_string());
                summary.bands = bands.clone();
            }
            ChemicalStatus::InsufficientData { .. } => {}
            ChemicalStatus::Failed { reason, .. } => summary.reason = Some(reason.clone()),
        }
        summary
    }
}

/// Write a summary JSON file.
pub fn write_summary_json(path: &Path, summary: &SummaryFile) -> Result<(), AppError> {
    let file = File::create(path).map_err(|e| AppError::io(path, e))?;
    serde_json::to_writer_pretty(file, summary)
        .map_err(|e| AppError::io(path, std::io::Error::other(e)))?;
    log::info!("Wrote run summary '{}'", path.display());
    Ok(())
}

/// Read a summary JSON file.
pub fn read_summary_json(path: &Path) -> Result<SummaryFile, AppError> {
    let file = File::open(path).map_err(|e| AppError::io(path, e))?;
    serde_json::from_reader(file).map_err(|e| {
        AppError::io(
            path,
            std::io::Error::new(std::io::ErrorKind::InvalidData, format!("Invalid summary JSON: {e}")),
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn summary_survives_a_write_and_read() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("summary.json");
        let summary = SummaryFile {
            tool: "qcal".into(),
            generated_at: Utc::now(),
            input: "cal.xlsx".into(),
            sheet: None,
            confidence: 0.95,
            stats: DatasetStats {
                n_features: 1,
                levels: vec!["10ng_".into()],
                n_long_rows: 1,
                n_positive_rows: 1,
                n_chemicals: 1,
            },
            chemicals: vec![ChemicalSummary::from(&ChemicalOutcome {
                chemical: "caffeine".into(),
                status: ChemicalStatus::Failed {
                    count: 3,
                    reason: "rank deficient".into(),
                },
            })],
        };

        write_summary_json(&path, &summary).unwrap();
        let back = read_summary_json(&path).unwrap();
        assert_eq!(back, summary);
        assert_eq!(back.chemicals[0].status, "failed");
        assert_eq!(back.chemicals[0].reason.as_deref(), Some("rank deficient"));
    }
}
