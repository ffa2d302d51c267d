//! Top-level application orchestration.
//!
//! `src/main.rs` is intentionally tiny; this module is the "real main" that:
//! - parses CLI arguments (plus `.env`)
//! - loads the calibration table
//! - fits and plots each chemical
//! - prints reports and writes optional exports
//! - re-reads a saved summary for `qcal show`

use chrono::Utc;
use clap::Parser;

use crate::cli::{Command, FitArgs, InputArgs, ReshapeArgs, ShowArgs};
use crate::domain::{CalConfig, ChemicalFilter};
use crate::error::AppError;
use crate::io::summary::{ChemicalSummary, SummaryFile};

pub mod pipeline;

/// Entry point for the `qcal` binary.
pub fn run() -> Result<(), AppError> {
    // A missing `.env` is fine; flags and the environment still apply.
    if let Ok(path) = dotenvy::dotenv() {
        log::debug!("Loaded environment from '{}'", path.display());
    }
    let cli = crate::cli::Cli::parse();

    match cli.command {
        Command::Fit(args) => handle_fit(args),
        Command::List(args) => handle_list(args),
        Command::Reshape(args) => handle_reshape(args),
        Command::Show(args) => handle_show(args),
    }
}

fn handle_fit(args: FitArgs) -> Result<(), AppError> {
    let config = cal_config_from_args(&args);
    let run = pipeline::run_fit(&config)?;

    println!("{}", crate::report::format_run_summary(&run, &config));

    if let Some(path) = &config.export_coefficients {
        crate::io::export::write_coefficients_csv(path, &run.outcomes)?;
    }
    if let Some(path) = &config.export_summary {
        crate::io::summary::write_summary_json(path, &summary_from_run(&run, &config))?;
    }

    Ok(())
}

fn handle_list(args: InputArgs) -> Result<(), AppError> {
    let data = crate::io::ingest::load_calibration(&args.input, args.sheet.as_deref())?;
    println!("{}", crate::report::format_chemical_list(&data));
    Ok(())
}

fn handle_reshape(args: ReshapeArgs) -> Result<(), AppError> {
    let data = crate::io::ingest::load_calibration(&args.input.input, args.input.sheet.as_deref())?;
    crate::io::export::write_long_csv(&args.output, &data.points)?;
    println!(
        "Wrote {} rows ({} chemicals) to {}",
        data.points.len(),
        data.chemicals.len(),
        args.output.display()
    );
    Ok(())
}

fn handle_show(args: ShowArgs) -> Result<(), AppError> {
    let summary = crate::io::summary::read_summary_json(&args.summary)?;
    println!("{}", crate::report::format_summary_file(&summary, &args.responses));
    Ok(())
}

pub fn cal_config_from_args(args: &FitArgs) -> CalConfig {
    CalConfig {
        input_path: args.input.input.clone(),
        sheet: args.input.sheet.clone(),
        chemicals: ChemicalFilter::from_names(args.chemicals.clone()),
        confidence: args.confidence,
        out_dir: args.out_dir.clone(),
        plot: !args.no_plot,
        plot_width: args.width,
        plot_height: args.height,
        export_coefficients: args.export_coefficients.clone(),
        export_summary: args.export_summary.clone(),
    }
}

pub fn summary_from_run(run: &pipeline::RunOutput, config: &CalConfig) -> SummaryFile {
    SummaryFile {
        tool: format!("qcal {}", env!("CARGO_PKG_VERSION")),
        generated_at: Utc::now(),
        input: run.data.source.display().to_string(),
        sheet: config.sheet.clone(),
        confidence: config.confidence,
        stats: run.data.stats.clone(),
        chemicals: run.outcomes.iter().map(ChemicalSummary::from).collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::Cli;
    use std::path::PathBuf;

    #[test]
    fn config_from_args_maps_flags() {
        let cli = Cli::try_parse_from([
            "qcal",
            "fit",
            "-i",
            "cal.xlsx",
            "--sheet",
            "Cal",
            "--chemical",
            "hydrocortisone",
            "--confidence",
            "0.9",
            "--out-dir",
            "plots",
            "--no-plot",
            "--export-summary",
            "run.json",
        ])
        .unwrap();
        let Command::Fit(args) = cli.command else {
            panic!("expected fit");
        };

        let config = cal_config_from_args(&args);
        assert_eq!(config.input_path, PathBuf::from("cal.xlsx"));
        assert_eq!(config.sheet.as_deref(), Some("Cal"));
        assert_eq!(
            config.chemicals,
            ChemicalFilter::Only(vec!["hydrocortisone".to_string()])
        );
        assert_eq!(config.confidence, 0.9);
        assert_eq!(config.out_dir, PathBuf::from("plots"));
        assert!(!config.plot);
        assert_eq!(config.export_summary, Some(PathBuf::from("run.json")));
        assert_eq!(config.export_coefficients, None);
    }
}
