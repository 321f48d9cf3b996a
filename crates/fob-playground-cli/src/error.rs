//! Error handling for the CLI.
//!
//! Commands return [`CliError`]; `main` turns it into a miette report with
//! [`cli_error_to_miette`].

use std::path::PathBuf;

use thiserror::Error;

/// Top-level CLI error type.
#[derive(Debug, Error)]
pub enum CliError {
    /// Configuration could not be loaded
    #[error("Configuration error: {0}")]
    Config(#[from] Box<figment::Error>),

    /// File or directory not found
    #[error("File not found: {}", .0.display())]
    FileNotFound(PathBuf),

    /// Reading or writing a file failed
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A state or cache file is not valid JSON
    #[error("Invalid JSON in {}: {source}", path.display())]
    InvalidJson {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// The project state describes an impossible tree
    #[error("Invalid project: {0}")]
    Project(#[from] fob_playground::Error),

    /// `--strict` build with files that did not link
    #[error("{count} file(s) failed to link")]
    LinkFailed { count: usize, first: String },
}

impl From<figment::Error> for CliError {
    fn from(err: figment::Error) -> Self {
        CliError::Config(Box::new(err))
    }
}

impl From<fob_playground::PathError> for CliError {
    fn from(err: fob_playground::PathError) -> Self {
        CliError::Project(err.into())
    }
}

/// Result type alias for CLI operations.
pub type Result<T> = std::result::Result<T, CliError>;

/// Attach a path to I/O and JSON failures.
pub trait ResultExt<T> {
    fn with_path(self, path: impl Into<PathBuf>) -> Result<T>;
}

impl<T> ResultExt<T> for std::result::Result<T, std::io::Error> {
    fn with_path(self, path: impl Into<PathBuf>) -> Result<T> {
        self.map_err(|source| {
            let path = path.into();
            if source.kind() == std::io::ErrorKind::NotFound {
                CliError::FileNotFound(path)
            } else {
                CliError::Io { path, source }
            }
        })
    }
}

impl<T> ResultExt<T> for std::result::Result<T, serde_json::Error> {
    fn with_path(self, path: impl Into<PathBuf>) -> Result<T> {
        self.map_err(|source| CliError::InvalidJson {
            path: path.into(),
            source,
        })
    }
}

/// Convert a [`CliError`] into a miette report with a hint where one helps.
pub fn cli_error_to_miette(err: CliError) -> miette::Report {
    match err {
        CliError::FileNotFound(path) => miette::miette!(
            help = "Pass the path of a project state exported from the playground",
            "File not found: {}",
            path.display()
        ),
        CliError::InvalidJson { path, source } => miette::miette!(
            help = "Project states look like {\"files\": {\"src/main.ts\": \"...\"}}",
            "Invalid JSON in {}: {}",
            path.display(),
            source
        ),
        CliError::Config(err) => miette::miette!(
            help = "Check fob-playground.json and FOB_PLAYGROUND_* variables",
            "Configuration error: {}",
            err
        ),
        CliError::LinkFailed { count, first } => miette::miette!(
            help = "See manifest.json for every failure, or drop --strict to keep partial output",
            "{} file(s) failed to link\n\n{}",
            count,
            first
        ),
        other => miette::miette!("{}", other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_maps_to_not_found() {
        let err = std::fs::read_to_string("/definitely/not/here.json")
            .with_path("/definitely/not/here.json")
            .unwrap_err();
        assert!(matches!(err, CliError::FileNotFound(_)));
    }

    #[test]
    fn test_report_keeps_message() {
        let err = CliError::LinkFailed {
            count: 2,
            first: "src/main.ts: cannot resolve './missing'".into(),
        };
        let report = cli_error_to_miette(err);
        assert!(report.to_string().contains("2 file(s) failed to link"));
    }
}
