//! Prediction intervals for fitted calibration curves.
//!
//! For each observed `x = log10(conc)` the interval for a *new observation* is
//!
//! ```text
//! ŷ ± t_{(1+c)/2, n-2} · sqrt(MSE · (1 + 1/n + (x - x̄)² / Sxx))
//! ```
//!
//! which is wider than the confidence interval of the mean response (that one
//! drops the leading `1`).

use crate::domain::{CalibrationModel, PredictionBand};
use crate::error::AppError;
use crate::math::t_critical;

/// Check a confidence level before any work is done.
pub fn validate_confidence(confidence: f64) -> Result<(), AppError> {
    if confidence > 0.0 && confidence < 1.0 {
        Ok(())
    } else {
        Err(AppError::Usage(format!(
            "Confidence must be strictly between 0 and 1 (got {confidence})."
        )))
    }
}

/// Per-observation prediction bands, in observation order.
pub fn prediction_bands(model: &CalibrationModel, confidence: f64) -> Result<Vec<PredictionBand>, AppError> {
    validate_confidence(confidence)?;

    let n = model.n_obs();
    let t = t_critical(confidence, model.quality.df_resid).ok_or_else(|| AppError::Fit {
        chemical: model.chemical.clone(),
        reason: format!("no residual degrees of freedom for a {:.0}% interval", confidence * 100.0),
    })?;

    let x_bar = model.log_conc.iter().sum::<f64>() / n as f64;
    let sxx: f64 = model.log_conc.iter().map(|x| (x - x_bar).powi(2)).sum();

    let bands = model
        .log_conc
        .iter()
        .zip(&model.fitted)
        .map(|(&x, &fitted)| {
            let se_obs = (model.quality.mse * (1.0 + 1.0 / n as f64 + (x - x_bar).powi(2) / sxx)).sqrt();
            let margin = t * se_obs;
            PredictionBand {
                log_conc: x,
                fitted,
                lower: fitted - margin,
                upper: fitted + margin,
            }
        })
        .collect();

    Ok(bands)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{CalFitOutcome, CalibrationPoint, CalibrationRecord};
    use crate::fit::fit_cal_curve;
    use approx::assert_abs_diff_eq;

    fn model() -> CalibrationModel {
        let data = [(1.0, 3.1), (2.0, 3.9), (3.0, 5.2), (4.0, 5.8), (5.0, 7.1)];
        let points: Vec<CalibrationPoint> = data
            .iter()
            .map(|&(x, y)| CalibrationPoint {
                record: CalibrationRecord::empty("F", "caffeine", "1ng_"),
                log_abun: y,
                log_conc: x,
            })
            .collect();
        match fit_cal_curve(&points, "caffeine").unwrap() {
            CalFitOutcome::Fitted(m) => m,
            other => panic!("expected fit, got {other:?}"),
        }
    }

    #[test]
    fn bands_bracket_the_fit_and_widen_away_from_center() {
        let model = model();
        let bands = prediction_bands(&model, 0.95).unwrap();
        assert_eq!(bands.len(), 5);

        for b in &bands {
            assert!(b.lower < b.fitted && b.fitted < b.upper);
        }
        let width = |b: &PredictionBand| b.upper - b.lower;
        assert!(width(&bands[0]) > width(&bands[2]));
        assert!(width(&bands[4]) > width(&bands[2]));
        assert_abs_diff_eq!(width(&bands[0]), width(&bands[4]), epsilon = 1e-12);
    }

    #[test]
    fn center_band_matches_hand_computation() {
        let model = model();
        let bands = prediction_bands(&model, 0.95).unwrap();

        // x̄ = 3, Sxx = 10, df = 3, t = 3.182446
        let t = t_critical(0.95, 3).unwrap();
        let expected = t * (model.quality.mse * (1.0 + 1.0 / 5.0)).sqrt();
        assert_abs_diff_eq!(bands[2].upper - bands[2].fitted, expected, epsilon = 1e-12);
    }

    #[test]
    fn higher_confidence_gives_wider_bands() {
        let model = model();
        let b90 = prediction_bands(&model, 0.90).unwrap();
        let b99 = prediction_bands(&model, 0.99).unwrap();
        assert!(b99[0].upper - b99[0].lower > b90[0].upper - b90[0].lower);
    }

    #[test]
    fn invalid_confidence_is_usage_error() {
        let err = prediction_bands(&model(), 1.5).unwrap_err();
        assert!(matches!(err, AppError::Usage(_)));
    }
}
