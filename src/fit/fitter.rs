//! Calibration curve fitting for a single chemical.
//!
//! Given the positive-response points of a calibration table and a chemical
//! name, we:
//! - select that chemical's rows
//! - refuse to fit when fewer than `MIN_CAL_POINTS` rows exist
//! - otherwise solve OLS of `log10(response)` on `[1, log10(conc)]`
//!
//! No outlier rejection and no weighting: every selected row counts equally.

use nalgebra::{DMatrix, DVector};

use crate::domain::{CalFitOutcome, CalibrationModel, CalibrationPoint, FitQuality, MIN_CAL_POINTS};
use crate::error::AppError;
use crate::math::solve_least_squares;
use crate::models::{fill_design_row, predict};

/// Fit the log-log calibration curve for `chemical`.
///
/// Too few points is a normal outcome (`InsufficientData`), not an error.
/// A design with a single distinct concentration is an `AppError::Fit`.
pub fn fit_cal_curve(points: &[CalibrationPoint], chemical: &str) -> Result<CalFitOutcome, AppError> {
    let selected: Vec<&CalibrationPoint> = points
        .iter()
        .filter(|p| p.chemical_name() == chemical)
        .collect();

    let n = selected.len();
    if n < MIN_CAL_POINTS {
        return Ok(CalFitOutcome::InsufficientData { count: n });
    }

    let log_conc: Vec<f64> = selected.iter().map(|p| p.log_conc).collect();
    let log_abun: Vec<f64> = selected.iter().map(|p| p.log_abun).collect();

    let p = CalibrationModel::PARAM_COUNT;
    let mut x = DMatrix::<f64>::zeros(n, p);
    let mut row = vec![0.0; p];
    for (i, &lc) in log_conc.iter().enumerate() {
        fill_design_row(lc, &mut row);
        for (j, v) in row.iter().enumerate() {
            x[(i, j)] = *v;
        }
    }
    let y = DVector::from_column_slice(&log_abun);

    log::debug!("{chemical}: regressors (const, LogConc) = {x}");

    let beta = solve_least_squares(&x, &y).ok_or_else(|| AppError::Fit {
        chemical: chemical.to_string(),
        reason: format!("design matrix is rank deficient ({n} points, need at least 2 distinct concentrations)"),
    })?;
    let (intercept, slope) = (beta[0], beta[1]);

    let fitted: Vec<f64> = log_conc.iter().map(|&lc| predict(intercept, slope, lc)).collect();
    let quality = fit_quality(&log_abun, &fitted, p);

    Ok(CalFitOutcome::Fitted(CalibrationModel {
        chemical: chemical.to_string(),
        log_conc,
        log_abun,
        intercept,
        slope,
        fitted,
        quality,
    }))
}

fn fit_quality(y: &[f64], fitted: &[f64], p: usize) -> FitQuality {
    let n = y.len();
    let y_bar = y.iter().sum::<f64>() / n as f64;

    let sse: f64 = y.iter().zip(fitted).map(|(yi, fi)| (yi - fi).powi(2)).sum();
    let sst: f64 = y.iter().map(|yi| (yi - y_bar).powi(2)).sum();

    let df_resid = n.saturating_sub(p);
    let mse = if df_resid > 0 { sse / df_resid as f64 } else { f64::NAN };
    // A flat response has no variance to explain.
    let r_squared = if sst > 0.0 { 1.0 - sse / sst } else { f64::NAN };

    FitQuality {
        sse,
        rmse: (sse / n as f64).sqrt(),
        mse,
        r_squared,
        n,
        df_resid,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::CalibrationRecord;
    use approx::assert_abs_diff_eq;

    fn point(chemical: &str, conc: f64, response: f64) -> CalibrationPoint {
        let mut record = CalibrationRecord::empty("F", chemical, &format!("{conc}ng_"));
        record.conc = conc;
        record.blanksub_mean = response;
        CalibrationPoint {
            record,
            log_abun: response.log10(),
            log_conc: conc.log10(),
        }
    }

    fn hydrocortisone() -> Vec<CalibrationPoint> {
        vec![
            point("hydrocortisone", 10.0, 1.2e3),
            point("hydrocortisone", 50.0, 5.1e3),
            point("hydrocortisone", 100.0, 1.1e4),
            point("hydrocortisone", 500.0, 4.7e4),
            point("atrazine", 10.0, 3.0e2),
            point("atrazine", 100.0, 2.9e3),
        ]
    }

    #[test]
    fn fewer_than_three_points_is_insufficient() {
        let points = hydrocortisone();
        assert_eq!(
            fit_cal_curve(&points, "atrazine").unwrap(),
            CalFitOutcome::InsufficientData { count: 2 }
        );
        assert_eq!(
            fit_cal_curve(&points, "caffeine").unwrap(),
            CalFitOutcome::InsufficientData { count: 0 }
        );
        assert_eq!(
            fit_cal_curve(&points[..1], "hydrocortisone").unwrap(),
            CalFitOutcome::InsufficientData { count: 1 }
        );
    }

    #[test]
    fn fits_two_parameter_line_over_selected_rows() {
        let points = hydrocortisone();
        let outcome = fit_cal_curve(&points, "hydrocortisone").unwrap();
        let model = outcome.model().expect("model");

        assert_eq!(model.param_count(), 2);
        assert_eq!(model.n_obs(), 4);
        assert_eq!(model.quality.df_resid, 2);
        assert!(model.quality.r_squared >= 0.0 && model.quality.r_squared <= 1.0);
        assert!(model.slope > 0.9 && model.slope < 1.1);
    }

    #[test]
    fn rmse_is_in_sample_and_mse_uses_residual_df() {
        let points = hydrocortisone();
        let outcome = fit_cal_curve(&points, "hydrocortisone").unwrap();
        let q = &outcome.model().unwrap().quality;

        assert!(q.sse > 0.0);
        assert_abs_diff_eq!(q.rmse, (q.sse / 4.0).sqrt(), epsilon = 1e-12);
        assert_abs_diff_eq!(q.mse, q.sse / 2.0, epsilon = 1e-12);
        assert!(q.rmse < q.mse.sqrt());
    }

    #[test]
    fn exact_power_law_is_recovered() {
        // response = 20 * conc^0.8  =>  log10 = log10(20) + 0.8 log10(conc)
        let points: Vec<_> = [5.0, 25.0, 125.0]
            .into_iter()
            .map(|c| point("caffeine", c, 20.0 * f64::powf(c, 0.8)))
            .collect();
        let outcome = fit_cal_curve(&points, "caffeine").unwrap();
        let model = outcome.model().unwrap();

        assert_abs_diff_eq!(model.intercept, 20f64.log10(), epsilon = 1e-10);
        assert_abs_diff_eq!(model.slope, 0.8, epsilon = 1e-10);
        assert_abs_diff_eq!(model.quality.r_squared, 1.0, epsilon = 1e-10);
        assert!(model.residuals().iter().all(|r| r.abs() < 1e-10));
    }

    #[test]
    fn single_concentration_is_a_fit_error() {
        let points = vec![
            point("caffeine", 10.0, 100.0),
            point("caffeine", 10.0, 120.0),
            point("caffeine", 10.0, 90.0),
        ];
        let err = fit_cal_curve(&points, "caffeine").unwrap_err();
        assert!(matches!(err, AppError::Fit { .. }));
    }
}
