//! Error types for the soiling analyzer
//!
//! Input-stage failures are typed so the analysis boundary can turn them into a
//! structured failure response instead of an opaque message.

use serde::Serialize;
use snafu::Snafu;

use crate::models::{InputDiagnostics, MergeDiagnostics};

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum Error {
    /// A required column could not be identified from the headers
    #[snafu(display("{table} table has no {role} column (headers: {headers:?})"))]
    MissingColumn {
        table: &'static str,
        role: &'static str,
        headers: Vec<String>,
    },

    /// No value in a timestamp column could be parsed by any strategy
    #[snafu(display(
        "no parseable timestamp in column '{column}' ({rows} rows, first value {sample:?})"
    ))]
    MalformedTimestamp {
        column: String,
        rows: usize,
        sample: Option<String>,
    },

    /// Input rows exist but none of them is usable
    #[snafu(display("Malformed input: {message}"))]
    MalformedInput { message: String },

    /// Merging produced zero joined intervals
    #[snafu(display("no joined intervals: {}", diagnostics.cause_label()))]
    NoOverlap { diagnostics: Box<MergeDiagnostics> },

    /// Configuration rejected before computation
    #[snafu(display("Invalid configuration: {message}"))]
    Configuration { message: String },

    #[snafu(display("CSV error: {source}"))]
    Csv { source: csv::Error },

    #[snafu(display("IO error on {}: {source}", path.display()))]
    Io {
        path: std::path::PathBuf,
        source: std::io::Error,
    },

    #[snafu(display("TOML parse error: {source}"))]
    TomlDe { source: toml::de::Error },

    #[snafu(display("TOML serialize error: {source}"))]
    TomlSe { source: toml::ser::Error },
}

/// Coarse failure category carried in the structured response
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    MalformedInput,
    NoOverlap,
    Configuration,
    Io,
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::MissingColumn { .. }
            | Error::MalformedTimestamp { .. }
            | Error::MalformedInput { .. }
            | Error::Csv { .. } => ErrorKind::MalformedInput,
            Error::NoOverlap { .. } => ErrorKind::NoOverlap,
            Error::Configuration { .. } | Error::TomlDe { .. } | Error::TomlSe { .. } => {
                ErrorKind::Configuration
            }
            Error::Io { .. } => ErrorKind::Io,
        }
    }

    /// Merge diagnostics attached to the failure, if any
    pub fn diagnostics(&self) -> Option<&MergeDiagnostics> {
        match self {
            Error::NoOverlap { diagnostics } => Some(diagnostics),
            _ => None,
        }
    }
}

impl Error {
    /// Structured view of a column or timestamp problem, if that is the failure
    pub fn input_diagnostics(&self) -> Option<InputDiagnostics> {
        match self {
            Error::MissingColumn {
                table,
                role,
                headers,
            } => Some(InputDiagnostics::MissingColumn {
                table: table.to_string(),
                role: role.to_string(),
                headers: headers.clone(),
            }),
            Error::MalformedTimestamp {
                column,
                rows,
                sample,
            } => Some(InputDiagnostics::MalformedTimestamp {
                column: column.clone(),
                rows: *rows,
                sample: sample.clone(),
            }),
            _ => None,
        }
    }
}

impl From<csv::Error> for Error {
    fn from(source: csv::Error) -> Self {
        Error::Csv { source }
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
