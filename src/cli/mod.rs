//! Command-line parsing for the qNTA calibration-curve tool.
//!
//! The goal of this module is to keep **argument parsing** and **command dispatch**
//! separate from the fitting/plotting code.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

/// Top-level CLI.
#[derive(Debug, Parser)]
#[command(name = "qcal", version, about = "qNTA calibration curve fitter")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

/// CLI subcommands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Fit a log-log calibration curve per chemical and write one PNG each.
    Fit(FitArgs),
    /// List chemicals with their positive calibration point counts.
    List(InputArgs),
    /// Write the positive-response long table to CSV.
    Reshape(ReshapeArgs),
    /// Print a saved run summary and back-calculate concentrations.
    Show(ShowArgs),
}

/// Where the calibration table comes from.
#[derive(Debug, Args, Clone)]
pub struct InputArgs {
    /// Calibration workbook (xlsx, xlsm, xlsb, xls, ods) or CSV.
    #[arg(short = 'i', long, env = "QNTA_INPUT", value_name = "PATH")]
    pub input: PathBuf,

    /// Worksheet name (defaults to the first sheet).
    #[arg(long, env = "QNTA_SHEET")]
    pub sheet: Option<String>,
}

/// Options for `qcal fit`.
#[derive(Debug, Args, Clone)]
pub struct FitArgs {
    #[command(flatten)]
    pub input: InputArgs,

    /// Only fit these chemicals (repeatable). Defaults to every chemical.
    #[arg(long = "chemical", value_name = "NAME")]
    pub chemicals: Vec<String>,

    /// Two-sided prediction interval confidence, in (0, 1).
    #[arg(long, default_value_t = 0.95)]
    pub confidence: f64,

    /// Directory for `<chemical>_Cal_Curve.png` files.
    #[arg(long, env = "QNTA_OUT_DIR", default_value = ".")]
    pub out_dir: PathBuf,

    /// Fit and report only; write no PNG files.
    #[arg(long)]
    pub no_plot: bool,

    /// Figure width (pixels).
    #[arg(long, default_value_t = 800, value_parser = clap::value_parser!(u32).range(1..))]
    pub width: u32,

    /// Figure height (pixels).
    #[arg(long, default_value_t = 800, value_parser = clap::value_parser!(u32).range(1..))]
    pub height: u32,

    /// Export per-chemical coefficients to CSV.
    #[arg(long = "export-coefficients", value_name = "CSV")]
    pub export_coefficients: Option<PathBuf>,

    /// Export the run summary (outcomes + prediction bands) to JSON.
    #[arg(long = "export-summary", value_name = "JSON")]
    pub export_summary: Option<PathBuf>,
}

/// Options for `qcal reshape`.
#[derive(Debug, Args, Clone)]
pub struct ReshapeArgs {
    #[command(flatten)]
    pub input: InputArgs,

    /// Output CSV path.
    #[arg(short = 'o', long, value_name = "CSV")]
    pub output: PathBuf,
}

/// Options for `qcal show`.
#[derive(Debug, Args, Clone)]
pub struct ShowArgs {
    /// Summary JSON produced by `qcal fit --export-summary`.
    #[arg(long, value_name = "JSON")]
    pub summary: PathBuf,

    /// Blank-subtracted response to convert to a concentration (repeatable).
    #[arg(long = "response", value_name = "ABUNDANCE")]
    pub responses: Vec<f64>,
}
