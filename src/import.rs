//! The import pipeline: source bytes in, test cases and an audit out.
//!
//! Structural failures (unreadable CSV, missing sheet, malformed JSON) abort
//! the whole import with `success = false` and a single error. Row-level
//! mapping failures are recorded as `Row {n}: ...` and the run continues.

use encoding_rs::{Encoding, UTF_8};
use log::{debug, info, warn};
use serde::Serialize;

use crate::{
    audit::{self, AuditInput, AuditReport},
    builder::{BuildContext, IdAllocator, build_test_case},
    dedup::{DedupConfig, DeduplicationMode, DuplicateDetectionResult, detect_duplicates},
    error::ParseError,
    io_utils::{DEFAULT_CSV_DELIMITER, decode_text},
    layout::{self, Layout},
    mapping::{ColumnResolution, FieldMapper},
    model::TestCase,
    preset::FieldPreset,
    steps,
    tabular::{self, Grid, RawRow, SourceFormat},
};

#[derive(Debug, Clone)]
pub struct ImportOptions<'a> {
    /// Drop non-kept members of exact duplicate groups from the output.
    pub skip_duplicates: bool,
    /// Treat a row without a title as an error instead of falling back to its ID.
    pub validate_required: bool,
    pub default_project: Option<String>,
    pub selected_sheet: Option<String>,
    /// Records already in the target collection; only used to scope new IDs.
    pub existing_test_cases: &'a [TestCase],
    pub enable_audit: bool,
    pub deduplication_mode: DeduplicationMode,
    pub dedup_config: DedupConfig,
    pub generate_audit_csv: bool,
    pub delimiter: u8,
    /// Explicit CSV column names; the first row is then data.
    pub column_names: Option<Vec<String>>,
    pub encoding: &'static Encoding,
}

impl Default for ImportOptions<'_> {
    fn default() -> Self {
        Self {
            skip_duplicates: true,
            validate_required: false,
            default_project: None,
            selected_sheet: None,
            existing_test_cases: &[],
            enable_audit: true,
            deduplication_mode: DeduplicationMode::default(),
            dedup_config: DedupConfig::default(),
            generate_audit_csv: false,
            delimiter: DEFAULT_CSV_DELIMITER,
            column_names: None,
            encoding: UTF_8,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportResult {
    pub success: bool,
    pub test_cases: Vec<TestCase>,
    pub errors: Vec<String>,
    pub skipped: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audit_report: Option<AuditReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duplicate_detection: Option<DuplicateDetectionResult>,
}

impl ImportResult {
    fn failed(error: String) -> Self {
        Self {
            success: false,
            test_cases: Vec::new(),
            errors: vec![error],
            skipped: 0,
            audit_report: None,
            duplicate_detection: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ImportOutcome {
    pub result: ImportResult,
    /// Rendered audit report when CSV export was requested.
    pub audit_csv: Option<String>,
}

pub fn import_bytes(
    bytes: &[u8],
    format: SourceFormat,
    options: &ImportOptions<'_>,
    preset: &FieldPreset,
) -> ImportOutcome {
    let mapper = match FieldMapper::new(preset) {
        Ok(mapper) => mapper,
        Err(err) => return failed_outcome(err.to_string()),
    };
    let rows = match read_records(bytes, format, options, preset) {
        Ok(rows) => rows,
        Err(err) => {
            warn!("Import aborted: {err}");
            return failed_outcome(err.to_string());
        }
    };
    run_pipeline(&rows, options, &mapper)
}

fn failed_outcome(error: String) -> ImportOutcome {
    ImportOutcome {
        result: ImportResult::failed(error),
        audit_csv: None,
    }
}

/// Parses the source into raw records, detecting the layout for grid sources.
pub fn read_records(
    bytes: &[u8],
    format: SourceFormat,
    options: &ImportOptions<'_>,
    preset: &FieldPreset,
) -> Result<Vec<RawRow>, ParseError> {
    match format {
        SourceFormat::Csv => {
            let text = decode_text(bytes, options.encoding)?;
            let grid = tabular::read_csv_grid(&text, options.delimiter)?;
            Ok(records_from_grid(grid, options.column_names.as_deref(), preset))
        }
        SourceFormat::Excel => {
            let grid = tabular::read_excel_grid(bytes, options.selected_sheet.as_deref())?;
            Ok(records_from_grid(grid, None, preset))
        }
        SourceFormat::Json => {
            let text = decode_text(bytes, options.encoding)?;
            tabular::parse_json(&text)
        }
    }
}

fn records_from_grid(
    grid: Grid,
    column_names: Option<&[String]>,
    preset: &FieldPreset,
) -> Vec<RawRow> {
    if column_names.is_some() {
        return layout::horizontal_records(grid, column_names);
    }
    match layout::detect_layout(&grid) {
        Layout::Vertical => layout::vertical_records(&grid, preset),
        Layout::Horizontal => layout::horizontal_records(grid, None),
    }
}

fn run_pipeline(
    rows: &[RawRow],
    options: &ImportOptions<'_>,
    mapper: &FieldMapper<'_>,
) -> ImportOutcome {
    let context = BuildContext::new(options.default_project.clone());
    let mut ids = IdAllocator::from_existing(options.existing_test_cases);
    let mut built = Vec::with_capacity(rows.len());
    let mut errors = Vec::new();
    let mut skipped = 0usize;
    let mut cached: Option<(Vec<&str>, ColumnResolution)> = None;

    for (idx, row) in rows.iter().enumerate() {
        let keys = row.keys().collect::<Vec<_>>();
        let resolution = match cached.take() {
            Some((cached_keys, resolution)) if cached_keys == keys => (cached_keys, resolution),
            _ => {
                let resolution = mapper.resolve_columns(keys.iter().copied());
                (keys, resolution)
            }
        };
        match mapper.map_row_with(row, &resolution.1, options.validate_required) {
            Ok(Some(record)) => {
                let case = build_test_case(record, &context, &mut ids);
                if steps::is_placeholder(&case.test_steps, mapper.rules()) {
                    debug!("Row {} has no usable steps; placeholder step added", idx + 1);
                }
                built.push(case);
            }
            Ok(None) => {
                debug!("Row {} has no title or ID; skipped", idx + 1);
                skipped += 1;
            }
            Err(err) => errors.push(format!("Row {}: {err}", idx + 1)),
        }
        cached = Some(resolution);
    }

    let detection = detect_duplicates(
        &built,
        options.deduplication_mode,
        &options.dedup_config,
    );
    let test_cases = if options.skip_duplicates {
        detection.unique_cases.clone()
    } else {
        built.clone()
    };

    let audit_report = options.enable_audit.then(|| {
        audit::build_audit_report(&AuditInput {
            raw_rows: rows,
            test_cases: &built,
            errors: &errors,
            skipped,
            detection: Some(&detection),
            mapper,
            timestamp: context.now,
        })
    });
    let audit_csv = match (&audit_report, options.generate_audit_csv) {
        (Some(report), true) => match audit::render_audit_csv(report) {
            Ok(csv) => Some(csv),
            Err(err) => {
                warn!("Audit CSV could not be rendered: {err:#}");
                None
            }
        },
        _ => None,
    };

    info!(
        "Imported {} test case(s) from {} row(s): {} error(s), {} skipped, {} duplicate(s) removed",
        test_cases.len(),
        rows.len(),
        errors.len(),
        skipped,
        built.len() - test_cases.len()
    );

    ImportOutcome {
        result: ImportResult {
            success: !test_cases.is_empty(),
            test_cases,
            errors,
            skipped,
            audit_report,
            duplicate_detection: Some(detection),
        },
        audit_csv,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn import_csv(text: &str, options: &ImportOptions<'_>) -> ImportOutcome {
        import_bytes(text.as_bytes(), SourceFormat::Csv, options, &FieldPreset::default())
    }

    #[test]
    fn csv_rows_become_test_cases() {
        let outcome = import_csv(
            "Test Case ID,Module,Title,Steps,Expected Result,Priority\n\
             TC-1,Auth,Login works,\"1. Open app\n2. Tap login\",Dashboard shown,P0\n",
            &ImportOptions::default(),
        );
        let result = outcome.result;
        assert!(result.success);
        assert!(result.errors.is_empty());
        let case = &result.test_cases[0];
        assert_eq!(case.id, "TC_IMPORT_AUTH_001");
        assert_eq!(case.source_id.as_deref(), Some("TC-1"));
        assert_eq!(case.test_steps.len(), 2);
        assert_eq!(case.test_steps[1].description, "Tap login");
        assert!(result.audit_report.is_some());
        assert!(outcome.audit_csv.is_none());
    }

    #[test]
    fn structural_errors_fail_the_whole_import() {
        let outcome = import_csv("Title\n\"Login\nStill open", &ImportOptions::default());
        assert!(!outcome.result.success);
        assert!(outcome.result.test_cases.is_empty());
        assert_eq!(outcome.result.errors.len(), 1);
        assert!(outcome.result.errors[0].contains("unterminated"));
        assert!(outcome.result.audit_report.is_none());
    }

    #[test]
    fn row_errors_are_numbered_from_one() {
        let options = ImportOptions {
            validate_required: true,
            ..ImportOptions::default()
        };
        let outcome = import_csv("ID,Title\nTC-1,Login\nTC-2,\n,\n", &options);
        assert!(outcome.result.success);
        assert_eq!(
            outcome.result.errors,
            vec!["Row 2: missing required field 'title'".to_string()]
        );
        assert_eq!(outcome.result.test_cases.len(), 1);
    }

    #[test]
    fn title_falls_back_to_id_unless_required() {
        let outcome = import_csv("ID,Title\nTC-2,\n", &ImportOptions::default());
        assert_eq!(outcome.result.test_cases[0].title, "TC-2");
    }

    #[test]
    fn keep_duplicates_preserves_every_built_case() {
        let text = "Title,Module,Steps\nLogin,Auth,Open\nLogin,Auth,Open\n";
        let skipping = import_csv(text, &ImportOptions::default());
        assert_eq!(skipping.result.test_cases.len(), 1);
        let keeping = import_csv(
            text,
            &ImportOptions {
                skip_duplicates: false,
                ..ImportOptions::default()
            },
        );
        assert_eq!(keeping.result.test_cases.len(), 2);
        let detection = keeping.result.duplicate_detection.expect("detection");
        assert_eq!(detection.exact_duplicates.len(), 1);
    }

    #[test]
    fn audit_csv_is_rendered_on_request() {
        let outcome = import_csv(
            "Title\nLogin\n",
            &ImportOptions {
                generate_audit_csv: true,
                ..ImportOptions::default()
            },
        );
        let csv = outcome.audit_csv.expect("audit csv");
        assert!(csv.starts_with("\"Summary\""));
    }

    #[test]
    fn disabled_audit_skips_report_and_csv() {
        let outcome = import_csv(
            "Title\nLogin\n",
            &ImportOptions {
                enable_audit: false,
                generate_audit_csv: true,
                ..ImportOptions::default()
            },
        );
        assert!(outcome.result.audit_report.is_none());
        assert!(outcome.audit_csv.is_none());
    }

    #[test]
    fn empty_source_is_not_a_success() {
        let outcome = import_csv("Title,Steps\n", &ImportOptions::default());
        assert!(!outcome.result.success);
        assert!(outcome.result.errors.is_empty());
    }

    #[test]
    fn explicit_column_names_bypass_layout_detection() {
        let options = ImportOptions {
            column_names: Some(vec!["Title".to_string(), "Module".to_string()]),
            ..ImportOptions::default()
        };
        let outcome = import_csv("Login,Auth\nLogout,Auth\n", &options);
        assert_eq!(outcome.result.test_cases.len(), 2);
        assert_eq!(outcome.result.test_cases[0].title, "Login");
    }

    #[test]
    fn json_sources_skip_layout_detection() {
        let outcome = import_bytes(
            br#"{"testCases":[{"title":"Login","module":"Auth","steps":["Open app","Tap login"]}]}"#,
            SourceFormat::Json,
            &ImportOptions::default(),
            &FieldPreset::default(),
        );
        assert!(outcome.result.success);
        assert_eq!(outcome.result.test_cases[0].test_steps.len(), 2);
    }
}
