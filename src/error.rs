//! Typed errors raised by the import pipeline.
//!
//! [`ParseError`] is structural and fatal for a whole import. [`MappingError`]
//! is scoped to one row and only recorded. [`PresetError`] surfaces while a
//! preset is validated, before any row is touched.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("Malformed CSV: {0}")]
    Csv(String),
    #[error("Unreadable Excel workbook: {0}")]
    Excel(String),
    #[error("Sheet '{0}' not found in workbook")]
    SheetNotFound(String),
    #[error("Workbook does not contain any sheets")]
    EmptyWorkbook,
    #[error("Invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Unsupported JSON shape: {0}")]
    JsonShape(String),
    #[error("Failed to decode input as {0}")]
    Decode(&'static str),
}

impl From<csv::Error> for ParseError {
    fn from(err: csv::Error) -> Self {
        ParseError::Csv(err.to_string())
    }
}

impl From<calamine::Error> for ParseError {
    fn from(err: calamine::Error) -> Self {
        ParseError::Excel(err.to_string())
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum MappingError {
    #[error("missing required field '{0}'")]
    MissingRequired(&'static str),
}

#[derive(Debug, Error)]
pub enum PresetError {
    #[error("Invalid {name} pattern: {source}")]
    Pattern {
        name: &'static str,
        #[source]
        source: regex::Error,
    },
    #[error("Preset '{preset}' defines no aliases for required field '{field}'")]
    MissingAliases { preset: String, field: &'static str },
    #[error("Preset step parsing requires max_steps > 0")]
    ZeroMaxSteps,
    #[error("Preset default step text cannot be empty")]
    EmptyDefaultStep,
}
