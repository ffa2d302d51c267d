//! Shared "calibration run" logic used by the `fit` command.
//!
//! load -> positive subset -> per-chemical fit -> prediction bands -> PNG
//!
//! The CLI layer only deals with presentation (report text, exports).

use rayon::prelude::*;

use crate::domain::{
    CalConfig, CalFitOutcome, CalibrationPoint, ChemicalFilter, ChemicalOutcome, ChemicalStatus,
};
use crate::error::AppError;
use crate::fit::{fit_cal_curve, prediction_bands, validate_confidence};
use crate::io::ingest::{CalibrationData, load_calibration};
use crate::plot::{PlotOptions, cal_curve_file_names, save_cal_curve};

/// All computed outputs of a single `qcal fit` run.
#[derive(Debug, Clone)]
pub struct RunOutput {
    pub data: CalibrationData,
    /// One entry per selected chemical, in sorted chemical-name order.
    pub outcomes: Vec<ChemicalOutcome>,
}

impl RunOutput {
    pub fn n_fitted(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| matches!(o.status, ChemicalStatus::Fitted { .. }))
            .count()
    }
}

/// Execute the full calibration pipeline and return the computed outputs.
pub fn run_fit(config: &CalConfig) -> Result<RunOutput, AppError> {
    validate_confidence(config.confidence)?;

    let data = load_calibration(&config.input_path, config.sheet.as_deref())?;
    run_fit_with_data(config, data)
}

/// Execute the per-chemical loop on an already loaded dataset.
pub fn run_fit_with_data(config: &CalConfig, data: CalibrationData) -> Result<RunOutput, AppError> {
    validate_confidence(config.confidence)?;

    if config.plot {
        std::fs::create_dir_all(&config.out_dir).map_err(|e| AppError::io(&config.out_dir, e))?;
    }

    let selected = select_chemicals(&data.chemicals, &config.chemicals);
    let options = PlotOptions {
        confidence: config.confidence,
        save: config.plot,
        out_dir: config.out_dir.clone(),
        width: config.plot_width,
        height: config.plot_height,
    };

    // Distinct names keep every parallel PNG write on its own file.
    let file_names = cal_curve_file_names(&selected);

    // Chemicals are independent; `collect` keeps the input order.
    let outcomes = selected
        .par_iter()
        .zip(file_names.par_iter())
        .map(|(chemical, file_name)| {
            let points: Vec<CalibrationPoint> = data.points_for(chemical).cloned().collect();
            process_chemical(chemical, &points, file_name, &options)
        })
        .collect::<Result<Vec<_>, AppError>>()?;

    Ok(RunOutput { data, outcomes })
}

fn process_chemical(
    chemical: &str,
    points: &[CalibrationPoint],
    file_name: &str,
    options: &PlotOptions,
) -> Result<ChemicalOutcome, AppError> {
    let status = match fit_cal_curve(points, chemical) {
        Ok(CalFitOutcome::Fitted(model)) => {
            log::info!(
                "{chemical}: LogAbun = {:.3} + {:.3}LogConc (R-squared {:.3}, n={})",
                model.intercept,
                model.slope,
                model.quality.r_squared,
                model.n_obs()
            );
            let bands = prediction_bands(&model, options.confidence)?;
            let plot_file = save_cal_curve(&model, &bands, chemical, file_name, options)?;
            ChemicalStatus::Fitted {
                model,
                bands,
                plot_file,
            }
        }
        Ok(CalFitOutcome::InsufficientData { count }) => {
            log::info!("{chemical}: has fewer than 3 calibration points ({count}); skipped");
            ChemicalStatus::InsufficientData { count }
        }
        Err(AppError::Fit { reason, .. }) => {
            log::warn!("{chemical}: fit failed: {reason}");
            ChemicalStatus::Failed {
                count: points.len(),
                reason,
            }
        }
        Err(other) => return Err(other),
    };

    Ok(ChemicalOutcome {
        chemical: chemical.to_string(),
        status,
    })
}

/// Apply the allow-list, warning about names that match nothing.
fn select_chemicals(chemicals: &[String], filter: &ChemicalFilter) -> Vec<String> {
    if let ChemicalFilter::Only(names) = filter {
        for name in names.iter().filter(|n| !chemicals.contains(n)) {
            log::warn!("Requested chemical '{name}' has no positive calibration points");
        }
    }
    chemicals
        .iter()
        .filter(|c| filter.allows(c))
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use std::io::Write;
    use std::path::Path;

    /// hydrocortisone: four positive levels; caffeine: two; atrazine: one level
    /// repeated across features so its design is degenerate.
    fn write_sheet(dir: &Path) -> std::path::PathBuf {
        let path = dir.join("cal.csv");
        let mut f = std::fs::File::create(&path).unwrap();
        writeln!(
            f,
            "Feature ID,Chemical Name,Mean 10ng_,BlankSub Mean 10ng_,BlankSub Mean 50ng_,BlankSub Mean 100ng_,BlankSub Mean 500ng_"
        )
        .unwrap();
        writeln!(f, "1,hydrocortisone,1300,1200,5100,11000,47000").unwrap();
        writeln!(f, "2,caffeine,0,0,-5,300,1500").unwrap();
        writeln!(f, "3,atrazine,10,0,0,0,900").unwrap();
        writeln!(f, "4,atrazine,10,0,0,0,950").unwrap();
        writeln!(f, "5,atrazine,10,0,0,0,1010").unwrap();
        path
    }

    fn config(dir: &Path) -> CalConfig {
        CalConfig {
            input_path: write_sheet(dir),
            out_dir: dir.join("plots"),
            plot_width: 320,
            plot_height: 320,
            ..CalConfig::default()
        }
    }

    #[test]
    fn run_fits_plots_and_keeps_order() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(dir.path());
        let run = run_fit(&config).unwrap();

        let names: Vec<&str> = run.outcomes.iter().map(|o| o.chemical.as_str()).collect();
        assert_eq!(names, ["atrazine", "caffeine", "hydrocortisone"]);
        assert_eq!(run.n_fitted(), 1);

        let ChemicalStatus::Fitted { model, bands, plot_file } = &run.outcomes[2].status else {
            panic!("hydrocortisone should be fitted");
        };
        assert_eq!(model.param_count(), 2);
        assert_eq!(model.n_obs(), 4);
        assert!((0.0..=1.0).contains(&model.quality.r_squared));
        assert_eq!(bands.len(), 4);
        let plot_file = plot_file.as_ref().unwrap();
        assert_eq!(plot_file, &config.out_dir.join("hydrocortisone_Cal_Curve.png"));
        assert!(plot_file.exists());

        assert_eq!(
            run.outcomes[1].status,
            ChemicalStatus::InsufficientData { count: 2 }
        );
        assert!(!config.out_dir.join("caffeine_Cal_Curve.png").exists());

        assert!(matches!(
            run.outcomes[0].status,
            ChemicalStatus::Failed { count: 3, .. }
        ));
        assert!(!config.out_dir.join("atrazine_Cal_Curve.png").exists());
    }

    #[test]
    fn allow_list_limits_the_run() {
        let dir = tempfile::tempdir().unwrap();
        let config = CalConfig {
            chemicals: ChemicalFilter::from_names(vec!["hydrocortisone".into(), "diuron".into()]),
            plot: false,
            ..config(dir.path())
        };
        let run = run_fit(&config).unwrap();

        assert_eq!(run.outcomes.len(), 1);
        let model = match &run.outcomes[0].status {
            ChemicalStatus::Fitted { model, plot_file, .. } => {
                assert_eq!(plot_file, &None);
                model
            }
            other => panic!("unexpected status {other:?}"),
        };
        assert_abs_diff_eq!(model.slope, 0.9428, epsilon = 1e-3);
        assert!(!config.out_dir.exists());
    }

    #[test]
    fn chemicals_sharing_a_file_name_get_separate_plots() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("pfas.csv");
        std::fs::write(
            &input,
            "Feature ID,Chemical Name,BlankSub Mean 10ng_,BlankSub Mean 50ng_,BlankSub Mean 100ng_\n\
             1,PFOS/PFOA,1000,4800,9900\n\
             2,PFOS_PFOA,2000,9500,21000\n",
        )
        .unwrap();
        let config = CalConfig {
            input_path: input,
            out_dir: dir.path().join("p"),
            plot_width: 240,
            plot_height: 240,
            ..CalConfig::default()
        };
        let run = run_fit(&config).unwrap();

        let files: Vec<std::path::PathBuf> = run
            .outcomes
            .iter()
            .map(|o| match &o.status {
                ChemicalStatus::Fitted { plot_file, .. } => plot_file.clone().unwrap(),
                other => panic!("unexpected status {other:?}"),
            })
            .collect();
        assert_eq!(
            files,
            [
                config.out_dir.join("PFOS_PFOA_Cal_Curve.png"),
                config.out_dir.join("PFOS_PFOA_Cal_Curve_2.png"),
            ]
        );
        assert_eq!(std::fs::read_dir(&config.out_dir).unwrap().count(), 2);
    }

    #[test]
    fn bad_confidence_fails_before_loading() {
        let config = CalConfig {
            input_path: "does-not-exist.xlsx".into(),
            confidence: 1.0,
            ..CalConfig::default()
        };
        assert!(matches!(run_fit(&config), Err(AppError::Usage(_))));
    }
}
