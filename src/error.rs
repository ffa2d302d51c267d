//! Application error type.
//!
//! Every stage returns `AppError`; `main` prints it and exits with
//! `AppError::exit_code()`.
//!
//! Exit codes:
//! - `2`: usage or file-system problems
//! - `3`: the calibration file is unusable
//! - `4`: fitting or plotting failed

use std::path::{Path, PathBuf};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    /// Invalid command-line / configuration values.
    #[error("{0}")]
    Usage(String),

    /// A file could not be read or written.
    #[error("I/O error on '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The input spreadsheet does not match the calibration schema.
    #[error("Invalid calibration file '{}': {reason}", path.display())]
    InvalidCalibrationFile { path: PathBuf, reason: String },

    /// The regression for a single chemical could not be solved.
    #[error("Fit failed for '{chemical}': {reason}")]
    Fit { chemical: String, reason: String },

    /// Rendering or encoding a figure failed.
    #[error("Failed to render plot '{}': {reason}", path.display())]
    Plot { path: PathBuf, reason: String },
}

impl AppError {
    pub fn io(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    pub fn invalid_file(path: impl AsRef<Path>, reason: impl Into<String>) -> Self {
        Self::InvalidCalibrationFile {
            path: path.as_ref().to_path_buf(),
            reason: reason.into(),
        }
    }

    pub fn exit_code(&self) -> u8 {
        match self {
            AppError::Usage(_) | AppError::Io { .. } => 2,
            AppError::InvalidCalibrationFile { .. } => 3,
            AppError::Fit { .. } | AppError::Plot { .. } => 4,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_codes_follow_error_kind() {
        assert_eq!(AppError::Usage("x".into()).exit_code(), 2);
        assert_eq!(
            AppError::io("a.xlsx", std::io::Error::from(std::io::ErrorKind::NotFound)).exit_code(),
            2
        );
        assert_eq!(AppError::invalid_file("a.xlsx", "bad").exit_code(), 3);
        let fit = AppError::Fit {
            chemical: "atrazine".into(),
            reason: "rank deficient".into(),
        };
        assert_eq!(fit.exit_code(), 4);
    }

    #[test]
    fn invalid_file_message_names_path() {
        let err = AppError::invalid_file("cal.xlsx", "Missing required column: `Feature ID`");
        let msg = err.to_string();
        assert!(msg.contains("cal.xlsx"));
        assert!(msg.contains("Feature ID"));
    }
}
