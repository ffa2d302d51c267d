//! Shared domain types.
//!
//! These types are intentionally kept lightweight so they can be:
//!
//! - used in-memory during reshaping and fitting
//! - exported to CSV/JSON
//! - reloaded later from a summary file

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Minimum number of positive-response points needed to fit a curve.
pub const MIN_CAL_POINTS: usize = 3;

/// Per-level measurement families present in a calibration sheet.
///
/// Each family appears once per calibration level as a column named
/// `"<prefix> <level tag>"`, e.g. `"BlankSub Mean 100ng_"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum MeasureFamily {
    Mean,
    Std,
    Cv,
    DetectionCount,
    DetectionPercentage,
    BlankSubMean,
    Conc,
    Rf,
}

impl MeasureFamily {
    pub const ALL: [MeasureFamily; 8] = [
        MeasureFamily::Mean,
        MeasureFamily::Std,
        MeasureFamily::Cv,
        MeasureFamily::DetectionCount,
        MeasureFamily::DetectionPercentage,
        MeasureFamily::BlankSubMean,
        MeasureFamily::Conc,
        MeasureFamily::Rf,
    ];

    /// Column-name prefix used in the spreadsheet.
    pub fn header_prefix(self) -> &'static str {
        match self {
            MeasureFamily::Mean => "Mean",
            MeasureFamily::Std => "STD",
            MeasureFamily::Cv => "CV",
            MeasureFamily::DetectionCount => "Detection Count",
            MeasureFamily::DetectionPercentage => "Detection Percentage",
            MeasureFamily::BlankSubMean => "BlankSub Mean",
            MeasureFamily::Conc => "Conc",
            MeasureFamily::Rf => "RF",
        }
    }

    /// Split a level-tagged header into its family and level tag.
    ///
    /// The longest matching prefix wins. The tag must be a non-empty word
    /// (`[A-Za-z0-9_]+`) ending in `_`; anything else returns `None`.
    pub fn split_header(header: &str) -> Option<(MeasureFamily, &str)> {
        let mut families = Self::ALL;
        families.sort_by_key(|f| std::cmp::Reverse(f.header_prefix().len()));

        families.into_iter().find_map(|family| {
            let tag = header
                .strip_prefix(family.header_prefix())?
                .strip_prefix(' ')?;
            is_level_tag(tag).then_some((family, tag))
        })
    }
}

fn is_level_tag(tag: &str) -> bool {
    !tag.is_empty()
        && tag.ends_with('_')
        && tag.chars().all(|c| c.is_alphanumeric() || c == '_')
}

/// One row of the long calibration table: a single (feature, level) pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibrationRecord {
    #[serde(rename = "Feature ID")]
    pub feature_id: String,
    #[serde(rename = "Chemical Name")]
    pub chemical_name: String,
    #[serde(rename = "Cal Level")]
    pub level: String,
    #[serde(rename = "Mean")]
    pub mean: f64,
    #[serde(rename = "STD")]
    pub std: f64,
    #[serde(rename = "CV")]
    pub cv: f64,
    #[serde(rename = "Detection Count")]
    pub detection_count: f64,
    #[serde(rename = "Detection Percentage")]
    pub detection_percentage: f64,
    #[serde(rename = "BlankSub Mean")]
    pub blanksub_mean: f64,
    /// Concentration parsed from the level tag (overrides any `Conc` column).
    #[serde(rename = "Conc")]
    pub conc: f64,
    #[serde(rename = "RF")]
    pub rf: f64,
}

impl CalibrationRecord {
    /// A zero-filled record for the given feature and level.
    pub fn empty(feature_id: &str, chemical_name: &str, level: &str) -> Self {
        Self {
            feature_id: feature_id.to_string(),
            chemical_name: chemical_name.to_string(),
            level: level.to_string(),
            mean: 0.0,
            std: 0.0,
            cv: 0.0,
            detection_count: 0.0,
            detection_percentage: 0.0,
            blanksub_mean: 0.0,
            conc: 0.0,
            rf: 0.0,
        }
    }

    pub fn value(&self, family: MeasureFamily) -> f64 {
        match family {
            MeasureFamily::Mean => self.mean,
            MeasureFamily::Std => self.std,
            MeasureFamily::Cv => self.cv,
            MeasureFamily::DetectionCount => self.detection_count,
            MeasureFamily::DetectionPercentage => self.detection_percentage,
            MeasureFamily::BlankSubMean => self.blanksub_mean,
            MeasureFamily::Conc => self.conc,
            MeasureFamily::Rf => self.rf,
        }
    }

    pub fn set_value(&mut self, family: MeasureFamily, value: f64) {
        let slot = match family {
            MeasureFamily::Mean => &mut self.mean,
            MeasureFamily::Std => &mut self.std,
            MeasureFamily::Cv => &mut self.cv,
            MeasureFamily::DetectionCount => &mut self.detection_count,
            MeasureFamily::DetectionPercentage => &mut self.detection_percentage,
            MeasureFamily::BlankSubMean => &mut self.blanksub_mean,
            MeasureFamily::Conc => &mut self.conc,
            MeasureFamily::Rf => &mut self.rf,
        };
        *slot = value;
    }
}

/// A long-table row with a strictly positive blank-subtracted response,
/// plus its log10 transforms.
#[derive(Debug, Clone, PartialEq)]
pub struct CalibrationPoint {
    pub record: CalibrationRecord,
    /// `log10(BlankSub Mean)`.
    pub log_abun: f64,
    /// `log10(Conc)`.
    pub log_conc: f64,
}

impl CalibrationPoint {
    pub fn chemical_name(&self) -> &str {
        &self.record.chemical_name
    }
}

/// Summary stats about the loaded calibration table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetStats {
    pub n_features: usize,
    /// Calibration level tags in sheet order.
    pub levels: Vec<String>,
    pub n_long_rows: usize,
    pub n_positive_rows: usize,
    pub n_chemicals: usize,
}

/// Fit quality diagnostics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FitQuality {
    pub sse: f64,
    /// In-sample root mean squared residual `sqrt(SSE / n)`. This is not
    /// `sqrt(mse)`: `mse` divides by the residual degrees of freedom.
    pub rmse: f64,
    /// Residual variance `SSE / (n - 2)`, used for prediction intervals.
    pub mse: f64,
    pub r_squared: f64,
    pub n: usize,
    pub df_resid: usize,
}

/// A fitted log-log calibration line for one chemical.
///
/// `log_abun = intercept + slope * log_conc`
#[derive(Debug, Clone, PartialEq)]
pub struct CalibrationModel {
    pub chemical: String,
    pub log_conc: Vec<f64>,
    pub log_abun: Vec<f64>,
    pub intercept: f64,
    pub slope: f64,
    pub fitted: Vec<f64>,
    pub quality: FitQuality,
}

impl CalibrationModel {
    /// Intercept + slope.
    pub const PARAM_COUNT: usize = 2;

    pub fn param_count(&self) -> usize {
        Self::PARAM_COUNT
    }

    pub fn n_obs(&self) -> usize {
        self.log_conc.len()
    }

    pub fn residuals(&self) -> Vec<f64> {
        self.log_abun
            .iter()
            .zip(&self.fitted)
            .map(|(y, f)| y - f)
            .collect()
    }
}

/// Result of attempting a calibration fit for one chemical.
#[derive(Debug, Clone, PartialEq)]
pub enum CalFitOutcome {
    Fitted(CalibrationModel),
    /// Fewer than `MIN_CAL_POINTS` usable points.
    InsufficientData { count: usize },
}

impl CalFitOutcome {
    pub fn model(&self) -> Option<&CalibrationModel> {
        match self {
            CalFitOutcome::Fitted(model) => Some(model),
            CalFitOutcome::InsufficientData { .. } => None,
        }
    }
}

/// Prediction interval for a new observation at one log-concentration.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PredictionBand {
    pub log_conc: f64,
    pub fitted: f64,
    pub lower: f64,
    pub upper: f64,
}

/// What happened to one chemical during a run.
#[derive(Debug, Clone, PartialEq)]
pub enum ChemicalStatus {
    Fitted {
        model: CalibrationModel,
        bands: Vec<PredictionBand>,
        plot_file: Option<PathBuf>,
    },
    InsufficientData {
        count: usize,
    },
    /// The fit could not be solved (e.g. a single distinct concentration).
    Failed {
        count: usize,
        reason: String,
    },
}

impl ChemicalStatus {
    pub fn label(&self) -> &'static str {
        match self {
            ChemicalStatus::Fitted { .. } => "fitted",
            ChemicalStatus::InsufficientData { .. } => "insufficient_data",
            ChemicalStatus::Failed { .. } => "failed",
        }
    }

    pub fn n_points(&self) -> usize {
        match self {
            ChemicalStatus::Fitted { model, .. } => model.n_obs(),
            ChemicalStatus::InsufficientData { count } | ChemicalStatus::Failed { count, .. } => *count,
        }
    }
}

/// Per-chemical entry of a run, in chemical-name order.
#[derive(Debug, Clone, PartialEq)]
pub struct ChemicalOutcome {
    pub chemical: String,
    pub status: ChemicalStatus,
}

/// Which chemicals a run should process.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ChemicalFilter {
    #[default]
    All,
    Only(Vec<String>),
}

impl ChemicalFilter {
    /// An empty allow-list means "all chemicals".
    pub fn from_names(names: Vec<String>) -> Self {
        if names.is_empty() {
            ChemicalFilter::All
        } else {
            ChemicalFilter::Only(names)
        }
    }

    pub fn allows(&self, chemical: &str) -> bool {
        match self {
            ChemicalFilter::All => true,
            ChemicalFilter::Only(names) => names.iter().any(|n| n == chemical),
        }
    }
}

/// A full run's configuration as understood by the pipeline.
///
/// This is derived from CLI flags / env vars (plus defaults).
#[derive(Debug, Clone)]
pub struct CalConfig {
    pub input_path: PathBuf,
    /// Worksheet to read; `None` reads the first sheet.
    pub sheet: Option<String>,
    pub chemicals: ChemicalFilter,
    /// Two-sided prediction-interval confidence, in `(0, 1)`.
    pub confidence: f64,
    pub out_dir: PathBuf,
    pub plot: bool,
    pub plot_width: u32,
    pub plot_height: u32,
    pub export_coefficients: Option<PathBuf>,
    pub export_summary: Option<PathBuf>,
}

impl Default for CalConfig {
    fn default() -> Self {
        Self {
            input_path: PathBuf::new(),
            sheet: None,
            chemicals: ChemicalFilter::All,
            confidence: 0.95,
            out_dir: PathBuf::from("."),
            plot: true,
            plot_width: 800,
            plot_height: 800,
            export_coefficients: None,
            export_summary: None,
        }
    }
}
