//! Calibration sheet ingest and reshaping.
//!
//! This module turns a wide calibration spreadsheet (one row per feature, one
//! column per `(measurement family, calibration level)`) into:
//!
//! - a long table with one row per `(feature, level)` (`CalibrationRecord`)
//! - the positive-response subset with log10 columns (`CalibrationPoint`)
//! - the sorted set of chemical names that drives fitting
//!
//! Design goals:
//! - **Explicit schema**: columns are matched against `MeasureFamily`, not guessed
//! - **Fail early**: malformed files are rejected before any fitting starts
//! - **Separation of concerns**: no fitting logic here

use std::collections::{BTreeSet, HashMap, HashSet};
use std::fs::File;
use std::path::{Path, PathBuf};

use calamine::{Data, Reader, open_workbook_auto};

use crate::domain::{CalibrationPoint, CalibrationRecord, DatasetStats, MeasureFamily};
use crate::error::AppError;

pub const FEATURE_ID_COLUMN: &str = "Feature ID";
pub const CHEMICAL_NAME_COLUMN: &str = "Chemical Name";

/// Longest digit run accepted as a level concentration.
const MAX_CONC_DIGITS: usize = 9;

/// Text cells that spreadsheet exports use for "no value".
const NA_TOKENS: [&str; 7] = ["NA", "N/A", "NaN", "nan", "#N/A", "null", "NULL"];

/// A single spreadsheet cell, before any schema is applied.
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Empty,
    Number(f64),
    Text(String),
}

static EMPTY_CELL: Cell = Cell::Empty;

impl Cell {
    /// Build a cell from raw text (CSV fields, string cells).
    pub fn from_text(s: &str) -> Self {
        let s = s.trim();
        if s.is_empty() || NA_TOKENS.contains(&s) {
            Cell::Empty
        } else {
            Cell::Text(s.to_string())
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Cell::Empty)
    }

    /// Numeric value of a measurement cell; empty cells read as zero.
    pub fn as_number(&self) -> Result<f64, String> {
        let v = match self {
            Cell::Empty => return Ok(0.0),
            Cell::Number(v) => *v,
            Cell::Text(s) => s
                .parse::<f64>()
                .map_err(|_| format!("non-numeric value '{s}'"))?,
        };
        if v.is_finite() {
            Ok(v)
        } else {
            Err(format!("non-finite value '{v}'"))
        }
    }

    /// Identifier text (feature ids may be stored as numbers).
    pub fn as_label(&self) -> String {
        match self {
            Cell::Empty => String::new(),
            Cell::Number(v) if v.fract() == 0.0 && v.abs() < 1e15 => format!("{}", *v as i64),
            Cell::Number(v) => v.to_string(),
            Cell::Text(s) => s.clone(),
        }
    }
}

/// A header row plus data rows, as read from the input file.
#[derive(Debug, Clone)]
pub struct RawTable {
    pub source: PathBuf,
    pub headers: Vec<String>,
    pub rows: Vec<Vec<Cell>>,
}

impl RawTable {
    fn column(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|h| h == name)
    }
}

/// Ingest output: long table + positive subset + chemical names + stats.
#[derive(Debug, Clone)]
pub struct CalibrationData {
    pub source: PathBuf,
    pub records: Vec<CalibrationRecord>,
    pub points: Vec<CalibrationPoint>,
    /// Sorted, de-duplicated chemical names of `points`.
    pub chemicals: Vec<String>,
    pub stats: DatasetStats,
}

impl CalibrationData {
    /// Positive-response points for one chemical.
    pub fn points_for<'a>(&'a self, chemical: &'a str) -> impl Iterator<Item = &'a CalibrationPoint> + 'a {
        self.points.iter().filter(move |p| p.chemical_name() == chemical)
    }
}

/// Load, reshape, and filter a calibration file.
pub fn load_calibration(path: &Path, sheet: Option<&str>) -> Result<CalibrationData, AppError> {
    let table = read_table(path, sheet)?;
    let records = reshape_long(&table)?;
    let points = positive_subset(&records);

    if points.is_empty() {
        return Err(AppError::invalid_file(
            path,
            "No rows with `BlankSub Mean` > 0 remain after reshaping.",
        ));
    }

    let chemicals = chemical_names(&points);
    let levels: Vec<String> = {
        let mut seen = HashSet::new();
        records
            .iter()
            .filter(|r| seen.insert(r.level.as_str()))
            .map(|r| r.level.clone())
            .collect()
    };
    let n_features = records.len().checked_div(levels.len()).unwrap_or(0);

    let stats = DatasetStats {
        n_features,
        levels,
        n_long_rows: records.len(),
        n_positive_rows: points.len(),
        n_chemicals: chemicals.len(),
    };

    log::info!(
        "Loaded '{}': {} features x {} levels, {} positive points across {} chemicals",
        path.display(),
        stats.n_features,
        stats.levels.len(),
        stats.n_positive_rows,
        stats.n_chemicals,
    );

    Ok(CalibrationData {
        source: path.to_path_buf(),
        records,
        points,
        chemicals,
        stats,
    })
}

/// Read the first (or named) sheet of a workbook, or a CSV file.
///
/// Dispatch is by file extension.
pub fn read_table(path: &Path, sheet: Option<&str>) -> Result<RawTable, AppError> {
    std::fs::metadata(path).map_err(|e| AppError::io(path, e))?;

    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_ascii_lowercase();

    match ext.as_str() {
        "xlsx" | "xlsm" | "xlsb" | "xls" | "ods" => read_workbook(path, sheet),
        "csv" => {
            if let Some(sheet) = sheet {
                log::warn!("Ignoring sheet '{sheet}' for CSV input '{}'", path.display());
            }
            read_csv(path)
        }
        other => Err(AppError::invalid_file(
            path,
            format!("Unsupported file extension: .{other}"),
        )),
    }
}

fn read_workbook(path: &Path, sheet: Option<&str>) -> Result<RawTable, AppError> {
    let mut workbook = open_workbook_auto(path)
        .map_err(|e| AppError::invalid_file(path, format!("Failed to open workbook: {e}")))?;

    let sheet_name = match sheet {
        Some(name) => name.to_string(),
        None => workbook
            .sheet_names()
            .first()
            .cloned()
            .ok_or_else(|| AppError::invalid_file(path, "Workbook contains no sheets."))?,
    };

    let range = workbook
        .worksheet_range(&sheet_name)
        .map_err(|e| AppError::invalid_file(path, format!("Failed to read sheet '{sheet_name}': {e}")))?;

    let mut rows = range.rows();
    let headers = rows
        .next()
        .ok_or_else(|| AppError::invalid_file(path, format!("Sheet '{sheet_name}' is empty.")))?
        .iter()
        .map(|c| normalize_header_name(&c.to_string()))
        .collect();

    let rows = rows
        .map(|row| row.iter().map(cell_from_data).collect())
        .collect();

    Ok(RawTable {
        source: path.to_path_buf(),
        headers,
        rows,
    })
}

fn cell_from_data(data: &Data) -> Cell {
    match data {
        Data::Empty | Data::Error(_) => Cell::Empty,
        Data::Int(v) => Cell::Number(*v as f64),
        Data::Float(v) => Cell::Number(*v),
        Data::String(s) => Cell::from_text(s),
        other => Cell::from_text(&other.to_string()),
    }
}

fn read_csv(path: &Path) -> Result<RawTable, AppError> {
    let file = File::open(path).map_err(|e| AppError::io(path, e))?;

    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(file);

    let headers = reader
        .headers()
        .map_err(|e| AppError::invalid_file(path, format!("Failed to read CSV headers: {e}")))?
        .iter()
        .map(normalize_header_name)
        .collect();

    let mut rows = Vec::new();
    for (idx, result) in reader.records().enumerate() {
        let record = result.map_err(|e| {
            AppError::invalid_file(path, format!("CSV parse error on line {}: {e}", idx + 2))
        })?;
        rows.push(record.iter().map(Cell::from_text).collect());
    }

    Ok(RawTable {
        source: path.to_path_buf(),
        headers,
        rows,
    })
}

fn normalize_header_name(name: &str) -> String {
    // Excel-exported CSVs can carry a BOM on the first header.
    name.trim().trim_start_matches('\u{feff}').trim().to_string()
}

/// Reshape the wide table into one record per `(feature, level)`.
pub fn reshape_long(table: &RawTable) -> Result<Vec<CalibrationRecord>, AppError> {
    let path = &table.source;

    let feature_col = table.column(FEATURE_ID_COLUMN).ok_or_else(|| {
        AppError::invalid_file(path, format!("Missing required column: `{FEATURE_ID_COLUMN}`"))
    })?;
    let chemical_col = table.column(CHEMICAL_NAME_COLUMN).ok_or_else(|| {
        AppError::invalid_file(path, format!("Missing required column: `{CHEMICAL_NAME_COLUMN}`"))
    })?;

    let (levels, layout) = build_level_layout(table)?;

    let level_conc = levels
        .iter()
        .map(|tag| {
            parse_level_concentration(tag).map_err(|e| AppError::invalid_file(path, e))
        })
        .collect::<Result<Vec<f64>, AppError>>()?;

    let mut seen_features = HashSet::new();
    let mut records = Vec::with_capacity(table.rows.len() * levels.len());

    for (idx, row) in table.rows.iter().enumerate() {
        // +2: 1-based lines, plus the header row.
        let line = idx + 2;
        if row.iter().all(Cell::is_empty) {
            continue;
        }

        let feature_id = cell(row, feature_col).as_label();
        if feature_id.is_empty() {
            return Err(AppError::invalid_file(
                path,
                format!("Row {line}: missing `{FEATURE_ID_COLUMN}`"),
            ));
        }
        if !seen_features.insert(feature_id.clone()) {
            return Err(AppError::invalid_file(
                path,
                format!("Row {line}: duplicate `{FEATURE_ID_COLUMN}` '{feature_id}'"),
            ));
        }
        let chemical_name = cell(row, chemical_col).as_label();

        for (level_idx, level) in levels.iter().enumerate() {
            let mut record = CalibrationRecord::empty(&feature_id, &chemical_name, level);
            for family in MeasureFamily::ALL {
                let Some(&col) = layout.get(&(level_idx, family)) else {
                    continue;
                };
                let value = cell(row, col).as_number().map_err(|e| {
                    AppError::invalid_file(
                        path,
                        format!("Row {line}, column `{}`: {e}", table.headers[col]),
                    )
                })?;
                record.set_value(family, value);
            }
            record.conc = level_conc[level_idx];
            records.push(record);
        }
    }

    Ok(records)
}

type LevelLayout = HashMap<(usize, MeasureFamily), usize>;

/// Resolve level tags (in first-appearance order) and the column of each
/// `(level, family)` pair.
fn build_level_layout(table: &RawTable) -> Result<(Vec<String>, LevelLayout), AppError> {
    let path = &table.source;
    let mut levels: Vec<String> = Vec::new();
    let mut layout = LevelLayout::new();

    for (col, name) in table.headers.iter().enumerate() {
        if !name.ends_with('_') {
            continue;
        }
        let Some((family, tag)) = MeasureFamily::split_header(name) else {
            log::debug!("Ignoring column `{name}` (no measurement family)");
            continue;
        };

        let level_idx = match levels.iter().position(|l| l == tag) {
            Some(i) => i,
            None => {
                levels.push(tag.to_string());
                levels.len() - 1
            }
        };

        if layout.insert((level_idx, family), col).is_some() {
            return Err(AppError::invalid_file(path, format!("Duplicate column `{name}`")));
        }
    }

    if levels.is_empty() {
        return Err(AppError::invalid_file(
            path,
            "No level-tagged measurement columns found (expected e.g. `BlankSub Mean 100ng_`).",
        ));
    }
    if !layout.keys().any(|(_, f)| *f == MeasureFamily::BlankSubMean) {
        return Err(AppError::invalid_file(
            path,
            "Missing measurement family `BlankSub Mean`.",
        ));
    }

    for (level_idx, tag) in levels.iter().enumerate() {
        let missing: Vec<&str> = MeasureFamily::ALL
            .into_iter()
            .filter(|f| !layout.contains_key(&(level_idx, *f)))
            .map(MeasureFamily::header_prefix)
            .collect();
        if !missing.is_empty() {
            log::warn!(
                "Level `{tag}` has no column for: {}; treating as zero",
                missing.join(", ")
            );
        }
    }

    Ok((levels, layout))
}

fn cell(row: &[Cell], col: usize) -> &Cell {
    row.get(col).unwrap_or(&EMPTY_CELL)
}

/// Parse the concentration encoded in a level tag's leading digit run.
///
/// `"100ng_"` -> `100.0`.
pub fn parse_level_concentration(tag: &str) -> Result<f64, String> {
    let digits: String = tag.chars().take_while(|c| c.is_ascii_digit()).collect();
    if digits.is_empty() {
        return Err(format!("Level tag `{tag}` has no leading concentration number"));
    }
    if digits.len() > MAX_CONC_DIGITS {
        return Err(format!(
            "Level tag `{tag}` concentration has more than {MAX_CONC_DIGITS} digits"
        ));
    }
    let value: f64 = digits
        .parse::<u64>()
        .map_err(|e| format!("Level tag `{tag}`: {e}"))? as f64;
    if value <= 0.0 {
        return Err(format!("Level tag `{tag}` has a zero concentration"));
    }
    Ok(value)
}

/// Keep rows with a strictly positive blank-subtracted mean and add logs.
pub fn positive_subset(records: &[CalibrationRecord]) -> Vec<CalibrationPoint> {
    records
        .iter()
        .filter(|r| r.blanksub_mean > 0.0)
        .filter_map(|r| {
            let log_abun = r.blanksub_mean.log10();
            let log_conc = r.conc.log10();
            (log_abun.is_finite() && log_conc.is_finite()).then(|| CalibrationPoint {
                record: r.clone(),
                log_abun,
                log_conc,
            })
        })
        .collect()
}

/// Sorted, unique chemical names.
pub fn chemical_names(points: &[CalibrationPoint]) -> Vec<String> {
    points
        .iter()
        .map(|p| p.chemical_name().to_string())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}
