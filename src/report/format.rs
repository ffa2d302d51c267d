//! Formatted terminal output.
//!
//! We keep formatting code in one place so:
//! - the fitting/plotting code stays clean and testable
//! - output changes are localized

use crate::app::pipeline::RunOutput;
use crate::domain::{CalConfig, ChemicalStatus, DatasetStats, MIN_CAL_POINTS};
use crate::io::ingest::CalibrationData;
use crate::io::summary::SummaryFile;
use crate::models::estimate_concentration;
use crate::plot::{format_coefficient, format_equation};

/// Format the full run summary (dataset stats + per-chemical table).
pub fn format_run_summary(run: &RunOutput, config: &CalConfig) -> String {
    let mut out = String::new();

    out.push_str("=== qcal - qNTA Calibration Curves ===\n");
    out.push_str(&format_stats(&run.data.source.display().to_string(), &run.data.stats));
    out.push_str(&format!(
        "Prediction interval: {}%\n",
        format_coefficient(config.confidence * 100.0)
    ));
    out.push_str(&format!(
        "Chemicals: {} selected | {} fitted\n",
        run.outcomes.len(),
        run.n_fitted()
    ));
    out.push('\n');

    out.push_str(
        format!(
            "{:<28} {:<18} {:>3} {:<36} {:>9} {}\n",
            "chemical", "status", "n", "equation", "R-squared", "plot"
        )
        .trim_end(),
    );
    out.push('\n');
    out.push_str(
        format!(
            "{:-<28} {:-<18} {:-<3} {:-<36} {:-<9} {:-<4}\n",
            "", "", "", "", "", ""
        )
        .trim_end(),
    );
    out.push('\n');

    for outcome in &run.outcomes {
        let (equation, r_squared, plot) = match &outcome.status {
            ChemicalStatus::Fitted {
                model, plot_file, ..
            } => (
                format_equation(model.intercept, model.slope),
                format_coefficient(model.quality.r_squared),
                plot_file
                    .as_ref()
                    .map(|p| p.display().to_string())
                    .unwrap_or_else(|| "-".to_string()),
            ),
            ChemicalStatus::InsufficientData { .. } => {
                (String::from("-"), String::from("-"), String::from("-"))
            }
            ChemicalStatus::Failed { reason, .. } => {
                (truncate(reason, 36), String::from("-"), String::from("-"))
            }
        };
        out.push_str(
            format!(
                "{:<28} {:<18} {:>3} {:<36} {:>9} {}\n",
                truncate(&outcome.chemical, 28),
                outcome.status.label(),
                outcome.status.n_points(),
                equation,
                r_squared,
                plot
            )
            .trim_end(),
        );
        out.push('\n');
    }

    out
}

/// Format the chemicals of a loaded file with their positive point counts.
pub fn format_chemical_list(data: &CalibrationData) -> String {
    let mut out = String::new();
    out.push_str(&format_stats(&data.source.display().to_string(), &data.stats));
    out.push('\n');

    out.push_str(&format!("{:<40} {:>6} {}\n", "chemical", "points", "fittable"));
    out.push_str(&format!("{:-<40} {:-<6} {:-<8}\n", "", "", ""));
    for chemical in &data.chemicals {
        let n = data.points_for(chemical).count();
        let fittable = if n >= MIN_CAL_POINTS { "yes" } else { "no" };
        out.push_str(&format!("{:<40} {:>6} {}\n", truncate(chemical, 40), n, fittable));
    }
    out
}

/// Format a saved run summary, optionally back-calculating concentrations
/// for the given blank-subtracted responses.
pub fn format_summary_file(summary: &SummaryFile, responses: &[f64]) -> String {
    let mut out = String::new();

    out.push_str(&format!("=== {} run of {} ===\n", summary.tool, summary.generated_at.to_rfc3339()));
    out.push_str(&format_stats(&summary.input, &summary.stats));
    out.push_str(&format!(
        "Prediction interval: {}%\n\n",
        format_coefficient(summary.confidence * 100.0)
    ));

    let mut header = format!(
        "{:<28} {:<18} {:>3} {:<36} {:>9}",
        "chemical", "status", "n", "equation", "R-squared"
    );
    for r in responses {
        header.push_str(&format!(" {:>14}", format!("conc@{r}")));
    }
    out.push_str(header.trim_end());
    out.push('\n');

    for chem in &summary.chemicals {
        let coefficients = chem.intercept.zip(chem.slope);
        let equation = coefficients
            .map(|(a, b)| format_equation(a, b))
            .unwrap_or_else(|| "-".to_string());
        let r_squared = chem
            .r_squared
            .map(format_coefficient)
            .unwrap_or_else(|| "-".to_string());

        let mut line = format!(
            "{:<28} {:<18} {:>3} {:<36} {:>9}",
            truncate(&chem.chemical, 28),
            chem.status,
            chem.n_points,
            equation,
            r_squared
        );
        for &r in responses {
            let conc = coefficients
                .and_then(|(a, b)| estimate_concentration(a, b, r))
                .map(|c| format!("{c:.3}"))
                .unwrap_or_else(|| "-".to_string());
            line.push_str(&format!(" {conc:>14}"));
        }
        out.push_str(line.trim_end());
        out.push('\n');
    }

    out
}

fn format_stats(source: &str, stats: &DatasetStats) -> String {
    format!(
        "Input: {source}\nLevels: {}\nRows: {} features x {} levels = {} | {} with BlankSub Mean > 0 | {} chemicals\n",
        stats.levels.join(", "),
        stats.n_features,
        stats.levels.len(),
        stats.n_long_rows,
        stats.n_positive_rows,
        stats.n_chemicals,
    )
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    let mut out: String = s.chars().take(max.saturating_sub(1)).collect();
    out.push('.');
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{
        CalibrationModel, CalibrationPoint, CalibrationRecord, ChemicalOutcome, FitQuality,
    };
    use std::path::PathBuf;

    fn point(chemical: &str, level: &str) -> CalibrationPoint {
        CalibrationPoint {
            record: CalibrationRecord::empty("F", chemical, level),
            log_abun: 3.0,
            log_conc: 1.0,
        }
    }

    fn data() -> CalibrationData {
        let points = vec![
            point("atrazine", "10ng_"),
            point("atrazine", "50ng_"),
            point("hydrocortisone", "10ng_"),
            point("hydrocortisone", "50ng_"),
            point("hydrocortisone", "100ng_"),
        ];
        CalibrationData {
            source: PathBuf::from("cal.xlsx"),
            records: points.iter().map(|p| p.record.clone()).collect(),
            points,
            chemicals: vec!["atrazine".into(), "hydrocortisone".into()],
            stats: DatasetStats {
                n_features: 2,
                levels: vec!["10ng_".into(), "50ng_".into(), "100ng_".into()],
                n_long_rows: 6,
                n_positive_rows: 5,
                n_chemicals: 2,
            },
        }
    }

    #[test]
    fn chemical_list_marks_fittable_chemicals() {
        let text = format_chemical_list(&data());
        assert!(text.contains("Levels: 10ng_, 50ng_, 100ng_"));
        let atrazine = text.lines().find(|l| l.starts_with("atrazine")).unwrap();
        assert!(atrazine.ends_with("2 no"));
        let hydro = text.lines().find(|l| l.starts_with("hydrocortisone")).unwrap();
        assert!(hydro.ends_with("3 yes"));
    }

    #[test]
    fn run_summary_lists_every_outcome() {
        let model = CalibrationModel {
            chemical: "hydrocortisone".into(),
            log_conc: vec![1.0, 1.7, 2.0],
            log_abun: vec![3.0, 3.7, 4.0],
            intercept: 2.0,
            slope: 1.0,
            fitted: vec![3.0, 3.7, 4.0],
            quality: FitQuality {
                sse: 0.0,
                rmse: 0.0,
                mse: 0.0,
                r_squared: 1.0,
                n: 3,
                df_resid: 1,
            },
        };
        let run = RunOutput {
            data: data(),
            outcomes: vec![
                ChemicalOutcome {
                    chemical: "atrazine".into(),
                    status: ChemicalStatus::InsufficientData { count: 2 },
                },
                ChemicalOutcome {
                    chemical: "hydrocortisone".into(),
                    status: ChemicalStatus::Fitted {
                        model,
                        bands: vec![],
                        plot_file: Some(PathBuf::from("hydrocortisone_Cal_Curve.png")),
                    },
                },
            ],
        };

        let text = format_run_summary(&run, &CalConfig::default());
        assert!(text.contains("Prediction interval: 95.0%"));
        assert!(text.contains("Chemicals: 2 selected | 1 fitted"));
        let atrazine = text.lines().find(|l| l.starts_with("atrazine")).unwrap();
        assert!(atrazine.contains("insufficient_data"));
        let hydro = text.lines().find(|l| l.starts_with("hydrocortisone")).unwrap();
        assert!(hydro.contains("LogAbun = 2.0 + 1.0LogConc"));
        assert!(hydro.ends_with("hydrocortisone_Cal_Curve.png"));
    }

    #[test]
    fn summary_file_back_calculates_concentrations() {
        use crate::io::summary::ChemicalSummary;

        let fitted = ChemicalSummary {
            chemical: "hydrocortisone".into(),
            status: "fitted".into(),
            n_points: 4,
            intercept: Some(1.0),
            slope: Some(1.0),
            r_squared: Some(0.99),
            rmse: Some(0.01),
            plot_file: None,
            reason: None,
            bands: vec![],
        };
        let skipped = ChemicalSummary {
            chemical: "atrazine".into(),
            status: "insufficient_data".into(),
            n_points: 2,
            intercept: None,
            slope: None,
            r_squared: None,
            rmse: None,
            ..fitted.clone()
        };
        let summary = SummaryFile {
            tool: "qcal 0.1.0".into(),
            generated_at: chrono::Utc::now(),
            input: "cal.xlsx".into(),
            sheet: None,
            confidence: 0.95,
            stats: data().stats,
            chemicals: vec![skipped, fitted],
        };

        let text = format_summary_file(&summary, &[1000.0]);
        assert!(text.contains("conc@1000"));
        let hydro = text.lines().find(|l| l.starts_with("hydrocortisone")).unwrap();
        assert!(hydro.contains("LogAbun = 1.0 + 1.0LogConc"));
        assert!(hydro.ends_with("100.000"));
        let atrazine = text.lines().find(|l| l.starts_with("atrazine")).unwrap();
        assert!(atrazine.ends_with('-'));
    }

    #[test]
    fn truncate_marks_cut_names() {
        assert_eq!(truncate("abc", 5), "abc");
        assert_eq!(truncate("abcdefgh", 5), "abcd.");
    }
}
