//! Calibration-curve figure rendered to PNG with Plotters.
//!
//! A `CalCurveFigure` is a render-only description: all series, bounds and
//! title text are computed up front from the fitted model. `save` opens a
//! bitmap drawing area, draws, presents, and drops it before returning, so a
//! loop over many chemicals never holds more than one open image.

use std::collections::HashSet;
use std::ops::Range;
use std::path::{Path, PathBuf};

use plotters::coord::Shift;
use plotters::prelude::*;
use plotters::series::DashedLineSeries;

use crate::domain::{CalibrationModel, PredictionBand};
use crate::error::AppError;
use crate::fit::prediction_bands;

/// How (and whether) a calibration curve is written to disk.
#[derive(Debug, Clone)]
pub struct PlotOptions {
    pub confidence: f64,
    pub save: bool,
    pub out_dir: PathBuf,
    pub width: u32,
    pub height: u32,
}

impl Default for PlotOptions {
    fn default() -> Self {
        Self {
            confidence: 0.95,
            save: true,
            out_dir: PathBuf::from("."),
            width: 800,
            height: 800,
        }
    }
}

/// Fit-line, data, and prediction-band series for one chemical.
#[derive(Debug, Clone)]
pub struct CalCurveFigure {
    pub title: String,
    pub subtitle: String,
    /// Observed `(log_conc, log_abun)`.
    pub points: Vec<(f64, f64)>,
    /// Series below are sorted by `log_conc`.
    pub fit: Vec<(f64, f64)>,
    pub lower: Vec<(f64, f64)>,
    pub upper: Vec<(f64, f64)>,
    pub band_label: String,
    pub x_range: Range<f64>,
    pub y_range: Range<f64>,
    pub size: (u32, u32),
}

impl CalCurveFigure {
    pub fn new(
        model: &CalibrationModel,
        bands: &[PredictionBand],
        chemical: &str,
        confidence: f64,
        size: (u32, u32),
    ) -> Self {
        let points: Vec<(f64, f64)> = model
            .log_conc
            .iter()
            .copied()
            .zip(model.log_abun.iter().copied())
            .collect();

        let mut sorted = bands.to_vec();
        sorted.sort_by(|a, b| a.log_conc.total_cmp(&b.log_conc));
        let fit = sorted.iter().map(|b| (b.log_conc, b.fitted)).collect();
        let lower: Vec<(f64, f64)> = sorted.iter().map(|b| (b.log_conc, b.lower)).collect();
        let upper: Vec<(f64, f64)> = sorted.iter().map(|b| (b.log_conc, b.upper)).collect();

        let x_range = padded_range(points.iter().map(|p| p.0));
        let y_range = padded_range(
            points
                .iter()
                .map(|p| p.1)
                .chain(lower.iter().map(|p| p.1))
                .chain(upper.iter().map(|p| p.1)),
        );

        Self {
            title: chemical.to_string(),
            subtitle: format!(
                "{}, R-squared: {}",
                format_equation(model.intercept, model.slope),
                format_coefficient(model.quality.r_squared)
            ),
            points,
            fit,
            lower,
            upper,
            band_label: format!("{}% prediction interval", format_percent(confidence)),
            x_range,
            y_range,
            size,
        }
    }

    /// Render to `path` as PNG, overwriting any existing file.
    ///
    /// If text cannot be drawn (no usable font on the host), the figure is
    /// drawn again without title, axes labels, and legend.
    pub fn save(&self, path: &Path) -> Result<(), AppError> {
        let plot_err = |reason: String| AppError::Plot {
            path: path.to_path_buf(),
            reason,
        };

        let first = {
            let root = BitMapBackend::new(path, self.size).into_drawing_area();
            self.draw(&root, true).and_then(|_| root.present())
        };

        match first {
            Ok(()) => Ok(()),
            Err(e) => {
                log::warn!(
                    "Drawing '{}' with labels failed ({e}); retrying without text",
                    path.display()
                );
                let root = BitMapBackend::new(path, self.size).into_drawing_area();
                self.draw(&root, false)
                    .and_then(|_| root.present())
                    .map_err(|e| plot_err(e.to_string()))
            }
        }
    }

    fn draw<DB: DrawingBackend>(
        &self,
        root: &DrawingArea<DB, Shift>,
        with_text: bool,
    ) -> Result<(), DrawingAreaErrorKind<DB::ErrorType>> {
        root.fill(&WHITE)?;

        let area = if with_text {
            root.titled(&self.title, ("sans-serif", 26))?
                .titled(&self.subtitle, ("sans-serif", 18))?
        } else {
            root.clone()
        };

        let mut builder = ChartBuilder::on(&area);
        builder.margin(15);
        if with_text {
            builder.x_label_area_size(45).y_label_area_size(60);
        }
        let mut chart = builder.build_cartesian_2d(self.x_range.clone(), self.y_range.clone())?;

        if with_text {
            chart
                .configure_mesh()
                .x_desc("LogConc")
                .y_desc("LogAbun")
                .x_label_formatter(&|v| format!("{v:.2}"))
                .y_label_formatter(&|v| format!("{v:.2}"))
                .draw()?;
        }

        let data_color = RGBColor(1, 150, 200);
        let band_color = RED;

        chart
            .draw_series(
                self.points
                    .iter()
                    .map(|&(x, y)| Circle::new((x, y), 5, data_color.filled())),
            )?
            .label("Data")
            .legend(move |(x, y)| Circle::new((x + 10, y), 4, data_color.filled()));

        chart
            .draw_series(LineSeries::new(self.fit.iter().copied(), BLUE.stroke_width(2)))?
            .label("Fit")
            .legend(|(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], BLUE.stroke_width(2)));

        chart.draw_series(DashedLineSeries::new(
            self.lower.iter().copied(),
            8,
            5,
            band_color.stroke_width(1),
        ))?;
        chart
            .draw_series(DashedLineSeries::new(
                self.upper.iter().copied(),
                8,
                5,
                band_color.stroke_width(1),
            ))?
            .label(self.band_label.as_str())
            .legend(move |(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], band_color.stroke_width(1)));

        if with_text {
            chart
                .configure_series_labels()
                .position(SeriesLabelPosition::UpperLeft)
                .background_style(WHITE.mix(0.8))
                .border_style(BLACK)
                .draw()?;
        }

        Ok(())
    }
}

/// Fit bands and (optionally) write `<chemical>_Cal_Curve.png`.
///
/// Returns the written path, or `None` when `options.save` is false.
pub fn plot_cal_curve(
    model: &CalibrationModel,
    chemical: &str,
    options: &PlotOptions,
) -> Result<Option<PathBuf>, AppError> {
    let bands = prediction_bands(model, options.confidence)?;
    save_cal_curve(model, &bands, chemical, &cal_curve_file_name(chemical), options)
}

/// Like [`plot_cal_curve`], for callers that already hold the bands and a
/// file name (see [`cal_curve_file_names`]).
pub fn save_cal_curve(
    model: &CalibrationModel,
    bands: &[PredictionBand],
    chemical: &str,
    file_name: &str,
    options: &PlotOptions,
) -> Result<Option<PathBuf>, AppError> {
    if !options.save {
        return Ok(None);
    }

    let figure = CalCurveFigure::new(
        model,
        bands,
        chemical,
        options.confidence,
        (options.width, options.height),
    );
    let path = options.out_dir.join(file_name);
    figure.save(&path)?;
    log::info!("{chemical}: wrote {}", path.display());
    Ok(Some(path))
}

/// `<chemical>_Cal_Curve.png`, with path separators replaced by `_`.
pub fn cal_curve_file_name(chemical: &str) -> String {
    let safe: String = chemical
        .chars()
        .map(|c| if matches!(c, '/' | '\\') { '_' } else { c })
        .collect();
    format!("{safe}_Cal_Curve.png")
}

/// One distinct file name per chemical, in input order.
///
/// Names that collide after separator replacement (compared
/// case-insensitively) get a `_2`, `_3`, ... suffix before the extension,
/// so no two chemicals write the same PNG.
pub fn cal_curve_file_names(chemicals: &[String]) -> Vec<String> {
    let mut taken = HashSet::new();
    chemicals
        .iter()
        .map(|chemical| {
            let base = cal_curve_file_name(chemical);
            if taken.insert(base.to_lowercase()) {
                return base;
            }
            let stem = base.trim_end_matches(".png");
            let name = (2..)
                .map(|k| format!("{stem}_{k}.png"))
                .find(|candidate| !taken.contains(&candidate.to_lowercase()))
                .unwrap_or(base.clone());
            taken.insert(name.to_lowercase());
            log::warn!("{chemical}: plot file name clashes with another chemical; using {name}");
            name
        })
        .collect()
}

/// `LogAbun = <intercept> + <slope>LogConc`, coefficients rounded to 3 dp.
pub fn format_equation(intercept: f64, slope: f64) -> String {
    format!(
        "LogAbun = {} + {}LogConc",
        format_coefficient(intercept),
        format_coefficient(slope)
    )
}

/// Round to 3 decimals and print in shortest form, keeping one decimal for
/// whole numbers (`2.0`, `1.5`, `-0.125`).
pub fn format_coefficient(v: f64) -> String {
    if !v.is_finite() {
        return "nan".to_string();
    }
    let mut r = (v * 1000.0).round() / 1000.0;
    if r == 0.0 {
        // Avoid printing "-0.0".
        r = 0.0;
    }
    let s = format!("{r}");
    if s.contains('.') { s } else { format!("{s}.0") }
}

fn format_percent(fraction: f64) -> String {
    let pct = (fraction * 100_000.0).round() / 1000.0;
    if pct.fract() == 0.0 {
        format!("{pct:.0}")
    } else {
        format!("{pct}")
    }
}

fn padded_range(values: impl Iterator<Item = f64>) -> Range<f64> {
    let (lo, hi) = values
        .filter(|v| v.is_finite())
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| (lo.min(v), hi.max(v)));

    if !(lo.is_finite() && hi.is_finite()) {
        return 0.0..1.0;
    }
    let span = hi - lo;
    if span < 1e-9 {
        return (lo - 0.5)..(hi + 0.5);
    }
    let pad = 0.05 * span;
    (lo - pad)..(hi + pad)
}
