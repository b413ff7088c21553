pub mod audit;
pub mod builder;
pub mod cli;
pub mod dedup;
pub mod error;
pub mod import;
pub mod io_utils;
pub mod layout;
pub mod mapping;
pub mod model;
pub mod preset;
pub mod steps;
pub mod table;
pub mod tabular;

use std::{env, path::Path, sync::OnceLock};

use anyhow::{Context, Result, anyhow, bail};
use clap::Parser;
use log::{LevelFilter, debug, info};
use serde::Deserialize;

use crate::{
    audit::AuditReport,
    cli::{Cli, Commands},
    dedup::DedupConfig,
    import::{ImportOptions, import_bytes},
    model::TestCase,
    preset::FieldPreset,
    tabular::SourceFormat,
};

static LOGGER: OnceLock<()> = OnceLock::new();

fn init_logging() {
    LOGGER.get_or_init(|| {
        let mut builder = env_logger::Builder::from_env(env_logger::Env::default());
        if env::var("RUST_LOG").is_err() {
            builder.filter_module("testcase_import", LevelFilter::Info);
        }
        let _ = builder.format_timestamp_millis().try_init();
    });
}

pub fn run() -> Result<()> {
    init_logging();
    let cli = Cli::parse();
    match cli.command {
        Commands::Import(args) => handle_import(&args),
        Commands::Sheets(args) => handle_sheets(&args),
        Commands::Preset(args) => handle_preset(&args),
    }
}

fn handle_import(args: &cli::ImportArgs) -> Result<()> {
    let format = match args.format {
        Some(format) => format,
        None => SourceFormat::from_path(&args.input).ok_or_else(|| {
            anyhow!(
                "Cannot infer the format of {:?}; pass --format csv|excel|json",
                args.input
            )
        })?,
    };
    let preset = match &args.preset {
        Some(path) => {
            FieldPreset::load(path).with_context(|| format!("Loading preset from {path:?}"))?
        }
        None => FieldPreset::default(),
    };
    let existing = match &args.existing {
        Some(path) => load_existing_cases(path)?,
        None => Vec::new(),
    };
    let encoding = io_utils::resolve_encoding(args.input_encoding.as_deref())?;
    let delimiter = io_utils::resolve_input_delimiter(&args.input, args.delimiter);
    info!(
        "Importing '{}' as {format:?} with preset '{}' ({} existing case(s))",
        args.input.display(),
        preset.name,
        existing.len()
    );

    let bytes = io_utils::read_input(&args.input)?;
    let options = ImportOptions {
        skip_duplicates: !args.keep_duplicates,
        validate_required: args.validate_required,
        default_project: args.project.clone(),
        selected_sheet: args.sheet.clone(),
        existing_test_cases: &existing,
        enable_audit: !args.no_audit,
        deduplication_mode: args.dedup,
        dedup_config: DedupConfig {
            similarity_threshold: args.similarity_threshold,
            ..DedupConfig::default()
        },
        generate_audit_csv: args.audit_csv.is_some(),
        delimiter,
        column_names: (!args.columns.is_empty()).then(|| args.columns.clone()),
        encoding,
    };
    debug!(
        "Deduplication {:?} at threshold {}, skip duplicates: {}",
        options.deduplication_mode,
        options.dedup_config.similarity_threshold,
        options.skip_duplicates
    );
    let outcome = import_bytes(&bytes, format, &options, &preset);

    if let (Some(path), Some(csv)) = (&args.audit_csv, &outcome.audit_csv) {
        io_utils::write_output(Some(path), csv)
            .with_context(|| format!("Writing audit report to {path:?}"))?;
        info!("Audit report written to {path:?}");
    }
    if args.summary
        && let Some(report) = &outcome.result.audit_report
    {
        print_audit_summary(report);
    }

    let json = serde_json::to_string_pretty(&outcome.result)
        .context("Serializing import result")?;
    io_utils::write_output(args.output.as_deref(), &json)?;

    if !outcome.result.success {
        match outcome.result.errors.first() {
            Some(first) => bail!("Import produced no test cases: {first}"),
            None => bail!("Import produced no test cases"),
        }
    }
    Ok(())
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ExistingCases {
    List(Vec<TestCase>),
    #[serde(rename_all = "camelCase")]
    Wrapped {
        test_cases: Vec<TestCase>,
    },
}

/// Accepts a bare array of test cases or a previous import result.
fn load_existing_cases(path: &Path) -> Result<Vec<TestCase>> {
    let bytes = io_utils::read_input(path)?;
    let parsed: ExistingCases = serde_json::from_slice(&bytes)
        .with_context(|| format!("Parsing existing test cases from {path:?}"))?;
    Ok(match parsed {
        ExistingCases::List(cases) => cases,
        ExistingCases::Wrapped { test_cases } => test_cases,
    })
}

fn print_audit_summary(report: &AuditReport) {
    let fields = report
        .field_analysis
        .iter()
        .map(|field| {
            vec![
                field.field.clone(),
                format!("{:.1}%", field.coverage),
                field.unique_values.to_string(),
                field.samples.join(", "),
            ]
        })
        .collect::<Vec<_>>();
    table::eprint_table(&["field", "coverage", "unique", "samples"], &fields);

    if !report.data_quality_issues.is_empty() {
        eprintln!();
        let issues = report
            .data_quality_issues
            .iter()
            .map(|issue| {
                vec![
                    issue.row_index.to_string(),
                    issue.issue_type.as_str().to_string(),
                    format!("{:?}", issue.severity).to_lowercase(),
                    issue.value.clone(),
                ]
            })
            .collect::<Vec<_>>();
        table::eprint_table(&["row", "issue", "severity", "value"], &issues);
    }
    for recommendation in &report.recommendations {
        eprintln!("- {recommendation}");
    }
}

fn handle_sheets(args: &cli::SheetsArgs) -> Result<()> {
    let bytes = io_utils::read_input(&args.input)?;
    let sheets = tabular::list_sheets(&bytes)
        .with_context(|| format!("Reading workbook {:?}", args.input))?;
    let rows = sheets
        .iter()
        .map(|sheet| {
            vec![
                sheet.name.clone(),
                sheet.row_count.to_string(),
                yes_no(sheet.has_headers),
                yes_no(sheet.is_test_case_sheet),
                sheet
                    .preview
                    .first()
                    .map(|row| row.join(" | "))
                    .unwrap_or_default(),
            ]
        })
        .collect::<Vec<_>>();
    table::print_table(&["sheet", "rows", "headers", "test cases", "first row"], &rows);
    info!("Listed {} sheet(s) from {:?}", sheets.len(), args.input);
    Ok(())
}

fn handle_preset(args: &cli::PresetArgs) -> Result<()> {
    if let Some(path) = &args.validate {
        let preset = FieldPreset::load(path)?;
        info!("Preset '{}' in {path:?} is valid", preset.name);
        return Ok(());
    }
    let preset = FieldPreset::default();
    match &args.output {
        Some(path) if !io_utils::is_dash(path) => {
            preset.save(path)?;
            info!("Built-in preset written to {path:?}");
        }
        _ => io_utils::write_output(None, &preset.to_yaml()?)?,
    }
    Ok(())
}

fn yes_no(value: bool) -> String {
    let text = if value { "yes" } else { "no" };
    text.to_string()
}
