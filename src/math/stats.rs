//! Distribution helpers for interval estimates.

use statrs::distribution::{ContinuousCDF, StudentsT};

/// Two-sided Student-t critical value: the `(1 + confidence) / 2` quantile
/// with `df` degrees of freedom.
///
/// Returns `None` for `df == 0` or a confidence outside `(0, 1)`.
pub fn t_critical(confidence: f64, df: usize) -> Option<f64> {
    if df == 0 || !(confidence > 0.0 && confidence < 1.0) {
        return None;
    }
    let dist = StudentsT::new(0.0, 1.0, df as f64).ok()?;
    let t = dist.inverse_cdf(0.5 * (1.0 + confidence));
    t.is_finite().then_some(t)
}
