//! Log-log calibration line evaluation.
//!
//! The fitter and plotter rely on two primitive operations:
//! - build a design row for a given log-concentration (for OLS)
//! - predict log-abundance given the coefficients (for fitted values/plots)

use crate::domain::CalibrationModel;

/// Fill a design row `[1, log_conc]`.
///
/// The row includes the constant term first (intercept).
///
/// # Panics
/// Panics if `out` is shorter than `CalibrationModel::PARAM_COUNT`.
pub fn fill_design_row(log_conc: f64, out: &mut [f64]) {
    out[0] = 1.0;
    out[1] = log_conc;
}

/// Predict `log10(response)` at `log10(conc)`.
pub fn predict(intercept: f64, slope: f64, log_conc: f64) -> f64 {
    intercept + slope * log_conc
}

impl CalibrationModel {
    pub fn predict(&self, log_conc: f64) -> f64 {
        predict(self.intercept, self.slope, log_conc)
    }

    /// Invert the curve: estimated concentration (linear units) for a
    /// blank-subtracted response.
    ///
    /// Returns `None` for a non-positive response or a flat curve.
    pub fn estimate_concentration(&self, response: f64) -> Option<f64> {
        estimate_concentration(self.intercept, self.slope, response)
    }
}

/// Concentration whose predicted response is `response`:
/// `10^((log10(response) - intercept) / slope)`.
pub fn estimate_concentration(intercept: f64, slope: f64, response: f64) -> Option<f64> {
    if !(response > 0.0) || slope == 0.0 {
        return None;
    }
    let log_conc = (response.log10() - intercept) / slope;
    let conc = 10f64.powf(log_conc);
    conc.is_finite().then_some(conc)
}
