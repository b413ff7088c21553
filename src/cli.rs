use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::{
    dedup::{DEFAULT_SIMILARITY_THRESHOLD, DeduplicationMode},
    tabular::SourceFormat,
};

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "Import test cases from CSV, Excel and JSON sources",
    long_about = None
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Convert a tabular source into test cases, with deduplication and an audit report
    Import(ImportArgs),
    /// List the sheets of an Excel workbook
    Sheets(SheetsArgs),
    /// Write the built-in field preset as YAML, or validate a preset file
    Preset(PresetArgs),
}

#[derive(Debug, Args)]
pub struct ImportArgs {
    /// Source file to import (`-` reads stdin)
    #[arg(short = 'i', long = "input")]
    pub input: PathBuf,
    /// Destination JSON file for the import result (stdout if omitted)
    #[arg(short = 'o', long = "output")]
    pub output: Option<PathBuf>,
    /// Source format; inferred from the input extension when omitted
    #[arg(long, value_enum)]
    pub format: Option<SourceFormat>,
    /// Worksheet to read from an Excel workbook (defaults to the first sheet)
    #[arg(long)]
    pub sheet: Option<String>,
    /// YAML field preset overriding the built-in aliases and step rules
    #[arg(long)]
    pub preset: Option<PathBuf>,
    /// JSON file of test cases already in the target collection
    #[arg(long)]
    pub existing: Option<PathBuf>,
    /// Project assigned to rows that do not name one
    #[arg(long)]
    pub project: Option<String>,
    /// Duplicate detection mode
    #[arg(long = "dedup", value_enum, default_value_t = DeduplicationMode::Strict)]
    pub dedup: DeduplicationMode,
    /// Similarity above which smart mode groups two cases (0.0 - 1.0)
    #[arg(long = "similarity-threshold", value_parser = parse_threshold, default_value_t = DEFAULT_SIMILARITY_THRESHOLD)]
    pub similarity_threshold: f64,
    /// Keep every member of exact duplicate groups in the output
    #[arg(long = "keep-duplicates")]
    pub keep_duplicates: bool,
    /// Treat rows without a title as errors instead of using their ID
    #[arg(long = "validate-required")]
    pub validate_required: bool,
    /// Skip the audit report
    #[arg(long = "no-audit")]
    pub no_audit: bool,
    /// Write the audit report as CSV to this path
    #[arg(long = "audit-csv", conflicts_with = "no_audit")]
    pub audit_csv: Option<PathBuf>,
    /// Print field coverage and data-quality tables to stderr
    #[arg(long)]
    pub summary: bool,
    /// Explicit CSV column names; the first row is then treated as data
    #[arg(short = 'C', long = "columns", value_delimiter = ',')]
    pub columns: Vec<String>,
    /// CSV delimiter character (supports ',', 'tab', ';', '|')
    #[arg(long, value_parser = parse_delimiter)]
    pub delimiter: Option<u8>,
    /// Character encoding of the input file (defaults to utf-8)
    #[arg(long = "input-encoding")]
    pub input_encoding: Option<String>,
}

#[derive(Debug, Args)]
pub struct SheetsArgs {
    /// Excel workbook to inspect (`-` reads stdin)
    #[arg(short = 'i', long = "input")]
    pub input: PathBuf,
}

#[derive(Debug, Args)]
pub struct PresetArgs {
    /// Destination YAML file (stdout if omitted)
    #[arg(short = 'o', long = "output", conflicts_with = "validate")]
    pub output: Option<PathBuf>,
    /// Load and validate an existing preset file instead
    #[arg(long)]
    pub validate: Option<PathBuf>,
}

pub fn parse_delimiter(value: &str) -> Result<u8, String> {
    match value {
        "tab" | "\t" => Ok(b'\t'),
        "comma" | "," => Ok(b','),
        "|" | "pipe" => Ok(b'|'),
        ";" | "semicolon" => Ok(b';'),
        other => {
            let mut chars = other.chars();
            let first = chars
                .next()
                .ok_or_else(|| "Delimiter cannot be empty".to_string())?;
            if chars.next().is_some() {
                return Err("Delimiter must be a single character".to_string());
            }
            if !first.is_ascii() {
                return Err("Delimiter must be ASCII".to_string());
            }
            Ok(first as u8)
        }
    }
}

pub fn parse_threshold(value: &str) -> Result<f64, String> {
    let threshold = value
        .trim()
        .parse::<f64>()
        .map_err(|err| format!("Invalid threshold '{value}': {err}"))?;
    if (0.0..=1.0).contains(&threshold) {
        Ok(threshold)
    } else {
        Err(format!("Threshold must be between 0 and 1, got {threshold}"))
    }
}
