//! Import audit reports.
//!
//! The report is a pure aggregation over the raw rows, the built test cases,
//! recorded row errors and the duplicate detection result. It can be
//! rendered as a multi-section CSV document for archival.

use std::collections::HashSet;

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use csv::QuoteStyle;
use itertools::Itertools;
use serde::Serialize;

use crate::{
    dedup::DuplicateDetectionResult,
    mapping::FieldMapper,
    model::TestCase,
    preset::CanonicalField,
    tabular::RawRow,
};

const MAX_SAMPLES: usize = 3;
const LOW_COVERAGE_PERCENT: f64 = 50.0;
const HIGH_DUPLICATE_RATE: f64 = 0.30;
const WIDE_SOURCE_FIELDS: usize = 20;
const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%d/%m/%Y", "%m/%d/%Y", "%Y/%m/%d", "%d-%m-%Y"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueType {
    MissingTitle,
    MissingDescription,
    MissingSteps,
    MissingExpectedResult,
    NonStandardPriority,
}

impl IssueType {
    pub fn as_str(&self) -> &'static str {
        match self {
            IssueType::MissingTitle => "missing_title",
            IssueType::MissingDescription => "missing_description",
            IssueType::MissingSteps => "missing_steps",
            IssueType::MissingExpectedResult => "missing_expected_result",
            IssueType::NonStandardPriority => "non_standard_priority",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueKind {
    String,
    Number,
    Boolean,
    Date,
}

impl ValueKind {
    pub fn classify(value: &str) -> Self {
        let trimmed = value.trim();
        if matches!(
            trimmed.to_ascii_lowercase().as_str(),
            "true" | "false" | "yes" | "no"
        ) {
            ValueKind::Boolean
        } else if trimmed.parse::<f64>().is_ok() {
            ValueKind::Number
        } else if DATE_FORMATS
            .iter()
            .any(|fmt| NaiveDate::parse_from_str(trimmed, fmt).is_ok())
        {
            ValueKind::Date
        } else {
            ValueKind::String
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ValueKind::String => "string",
            ValueKind::Number => "number",
            ValueKind::Boolean => "boolean",
            ValueKind::Date => "date",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldAnalysis {
    pub field: String,
    pub coverage: f64,
    pub unique_values: usize,
    pub average_length: f64,
    pub types: Vec<ValueKind>,
    pub samples: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DataQualityIssue {
    #[serde(rename = "type")]
    pub issue_type: IssueType,
    pub field: String,
    pub row_index: usize,
    pub value: String,
    pub severity: Severity,
    pub suggestion: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DuplicateSummary {
    pub signature: String,
    pub size: usize,
    pub kept_id: String,
    pub dropped_ids: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SimilarSummary {
    pub case_ids: Vec<String>,
    pub similarity_score: f64,
    pub differences: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditReport {
    pub total_rows: usize,
    pub valid_rows: usize,
    pub invalid_rows: usize,
    pub skipped_rows: usize,
    pub duplicates_found: usize,
    pub field_analysis: Vec<FieldAnalysis>,
    pub data_quality_issues: Vec<DataQualityIssue>,
    pub duplicate_groups: Vec<DuplicateSummary>,
    pub similar_groups: Vec<SimilarSummary>,
    pub recommendations: Vec<String>,
    pub timestamp: DateTime<Utc>,
}

impl AuditReport {
    pub fn has_high_severity_issues(&self) -> bool {
        self.data_quality_issues
            .iter()
            .any(|issue| issue.severity == Severity::High)
    }
}

pub struct AuditInput<'a> {
    pub raw_rows: &'a [RawRow],
    /// Every case built from the rows, before duplicate removal.
    pub test_cases: &'a [TestCase],
    pub errors: &'a [String],
    pub skipped: usize,
    pub detection: Option<&'a DuplicateDetectionResult>,
    pub mapper: &'a FieldMapper<'a>,
    pub timestamp: DateTime<Utc>,
}

pub fn build_audit_report(input: &AuditInput<'_>) -> AuditReport {
    let field_analysis = analyze_fields(input.raw_rows);
    let data_quality_issues = find_quality_issues(input.raw_rows, input.mapper);

    let duplicate_groups = input
        .detection
        .map(|detection| {
            detection
                .exact_duplicates
                .iter()
                .map(|group| DuplicateSummary {
                    signature: group.signature.clone(),
                    size: group.cases.len(),
                    kept_id: group.keep_case.id.clone(),
                    dropped_ids: group
                        .cases
                        .iter()
                        .filter(|case| case.id != group.keep_case.id)
                        .map(|case| case.id.clone())
                        .collect(),
                })
                .collect::<Vec<_>>()
        })
        .unwrap_or_default();
    let similar_groups = input
        .detection
        .map(|detection| {
            detection
                .similar_cases
                .iter()
                .map(|group| SimilarSummary {
                    case_ids: group.cases.iter().map(|case| case.id.clone()).collect(),
                    similarity_score: group.similarity_score,
                    differences: group.differences.clone(),
                })
                .collect::<Vec<_>>()
        })
        .unwrap_or_default();
    let duplicates_found = duplicate_groups
        .iter()
        .map(|group| group.size.saturating_sub(1))
        .sum::<usize>();

    let mut report = AuditReport {
        total_rows: input.raw_rows.len(),
        valid_rows: input.test_cases.len(),
        invalid_rows: input.errors.len(),
        skipped_rows: input.skipped,
        duplicates_found,
        field_analysis,
        data_quality_issues,
        duplicate_groups,
        similar_groups,
        recommendations: Vec::new(),
        timestamp: input.timestamp,
    };
    report.recommendations = recommend(&report, input.test_cases.len());
    report
}

fn analyze_fields(rows: &[RawRow]) -> Vec<FieldAnalysis> {
    let fields = rows
        .iter()
        .flat_map(|row| row.keys())
        .unique()
        .collect::<Vec<_>>();
    let total = rows.len();

    fields
        .into_iter()
        .map(|field| {
            let values = rows
                .iter()
                .filter_map(|row| row.get(field))
                .map(str::trim)
                .filter(|value| !value.is_empty())
                .collect::<Vec<_>>();
            let coverage = if total == 0 {
                0.0
            } else {
                values.len() as f64 / total as f64 * 100.0
            };
            let average_length = if values.is_empty() {
                0.0
            } else {
                values.iter().map(|v| v.chars().count()).sum::<usize>() as f64
                    / values.len() as f64
            };
            FieldAnalysis {
                field: field.to_string(),
                coverage,
                unique_values: values.iter().collect::<HashSet<_>>().len(),
                average_length,
                types: values.iter().map(|v| ValueKind::classify(v)).unique().collect(),
                samples: values
                    .iter()
                    .unique()
                    .take(MAX_SAMPLES)
                    .map(|v| v.to_string())
                    .collect(),
            }
        })
        .collect()
}

fn find_quality_issues(rows: &[RawRow], mapper: &FieldMapper<'_>) -> Vec<DataQualityIssue> {
    let preset = mapper.preset();
    let mut issues = Vec::new();
    for (idx, row) in rows.iter().enumerate() {
        let row_index = idx + 1;
        let resolution = mapper.resolve_columns(row.keys());
        let value = |field| resolution.value(row, field);

        if value(CanonicalField::Title).is_empty() {
            issues.push(DataQualityIssue {
                issue_type: IssueType::MissingTitle,
                field: CanonicalField::Title.to_string(),
                row_index,
                value: String::new(),
                severity: Severity::High,
                suggestion: "Add a title or name column such as 'Title' or 'Test Case'".to_string(),
            });
        }
        for (field, issue_type, suggestion) in [
            (
                CanonicalField::Description,
                IssueType::MissingDescription,
                "Describe what the test case verifies",
            ),
            (
                CanonicalField::Steps,
                IssueType::MissingSteps,
                "Provide numbered steps; a placeholder step will be used",
            ),
            (
                CanonicalField::ExpectedResult,
                IssueType::MissingExpectedResult,
                "State the expected outcome so results can be judged",
            ),
        ] {
            if value(field).is_empty() {
                issues.push(DataQualityIssue {
                    issue_type,
                    field: field.to_string(),
                    row_index,
                    value: String::new(),
                    severity: Severity::Medium,
                    suggestion: suggestion.to_string(),
                });
            }
        }

        let priority = value(CanonicalField::Priority);
        if !priority.is_empty() && !preset.is_known_value(CanonicalField::Priority, priority) {
            issues.push(DataQualityIssue {
                issue_type: IssueType::NonStandardPriority,
                field: CanonicalField::Priority.to_string(),
                row_index,
                value: priority.to_string(),
                severity: Severity::Low,
                suggestion: "Use one of low, medium, high or critical".to_string(),
            });
        }
    }
    issues
}

fn recommend(report: &AuditReport, built_cases: usize) -> Vec<String> {
    let mut recommendations = report
        .field_analysis
        .iter()
        .filter(|field| field.coverage < LOW_COVERAGE_PERCENT)
        .map(|field| {
            format!(
                "Field '{}' is only {:.0}% populated; fill it in the source or drop the column",
                field.field, field.coverage
            )
        })
        .collect::<Vec<_>>();

    if built_cases > 0 {
        let rate = report.duplicates_found as f64 / built_cases as f64;
        if rate > HIGH_DUPLICATE_RATE {
            recommendations.push(format!(
                "{:.0}% of imported cases are duplicates; review the source for repeated entries",
                rate * 100.0
            ));
        }
    }
    if report.field_analysis.len() > WIDE_SOURCE_FIELDS {
        recommendations.push(format!(
            "Source has {} columns; focus the field mapping on the columns that feed test cases",
            report.field_analysis.len()
        ));
    }
    if report.has_high_severity_issues() {
        recommendations.push(
            "Review rows flagged with high-severity issues before importing".to_string(),
        );
    }
    recommendations
}

/// Renders the report as CSV sections separated by blank lines.
pub fn render_audit_csv(report: &AuditReport) -> Result<String> {
    let mut sections = Vec::new();

    sections.push(render_section(
        "Summary",
        &["metric", "value"],
        vec![
            vec!["generated".to_string(), report.timestamp.to_rfc3339()],
            vec!["total_rows".to_string(), report.total_rows.to_string()],
            vec!["valid_rows".to_string(), report.valid_rows.to_string()],
            vec!["invalid_rows".to_string(), report.invalid_rows.to_string()],
            vec!["skipped_rows".to_string(), report.skipped_rows.to_string()],
            vec![
                "duplicates_found".to_string(),
                report.duplicates_found.to_string(),
            ],
            vec![
                "data_quality_issues".to_string(),
                report.data_quality_issues.len().to_string(),
            ],
        ],
    )?);

    sections.push(render_section(
        "Field Analysis",
        &[
            "field",
            "coverage_percent",
            "unique_values",
            "average_length",
            "types",
            "samples",
        ],
        report
            .field_analysis
            .iter()
            .map(|field| {
                vec![
                    field.field.clone(),
                    format!("{:.1}", field.coverage),
                    field.unique_values.to_string(),
                    format!("{:.1}", field.average_length),
                    field.types.iter().map(ValueKind::as_str).join("|"),
                    field.samples.join(" | "),
                ]
            })
            .collect(),
    )?);

    sections.push(render_section(
        "Data Quality Issues",
        &["type", "field", "row", "value", "severity", "suggestion"],
        report
            .data_quality_issues
            .iter()
            .map(|issue| {
                vec![
                    issue.issue_type.as_str().to_string(),
                    issue.field.clone(),
                    issue.row_index.to_string(),
                    issue.value.clone(),
                    format!("{:?}", issue.severity).to_lowercase(),
                    issue.suggestion.clone(),
                ]
            })
            .collect(),
    )?);

    sections.push(render_section(
        "Duplicate Groups",
        &["signature", "size", "kept_id", "dropped_ids"],
        report
            .duplicate_groups
            .iter()
            .map(|group| {
                vec![
                    group.signature.clone(),
                    group.size.to_string(),
                    group.kept_id.clone(),
                    group.dropped_ids.join(" "),
                ]
            })
            .collect(),
    )?);

    sections.push(render_section(
        "Similar Groups",
        &["case_ids", "similarity", "differences"],
        report
            .similar_groups
            .iter()
            .map(|group| {
                vec![
                    group.case_ids.join(" "),
                    format!("{:.3}", group.similarity_score),
                    group.differences.join("; "),
                ]
            })
            .collect(),
    )?);

    sections.push(render_section(
        "Recommendations",
        &["#", "recommendation"],
        report
            .recommendations
            .iter()
            .enumerate()
            .map(|(idx, text)| vec![(idx + 1).to_string(), text.clone()])
            .collect(),
    )?);

    Ok(sections.join("\n"))
}

fn render_section(title: &str, headers: &[&str], rows: Vec<Vec<String>>) -> Result<String> {
    let mut writer = csv::WriterBuilder::new()
        .flexible(true)
        .quote_style(QuoteStyle::Always)
        .double_quote(true)
        .from_writer(Vec::new());
    writer
        .write_record([title])
        .with_context(|| format!("Writing '{title}' section title"))?;
    writer
        .write_record(headers)
        .with_context(|| format!("Writing '{title}' headers"))?;
    for row in &rows {
        writer
            .write_record(row)
            .with_context(|| format!("Writing '{title}' row"))?;
    }
    let bytes = writer
        .into_inner()
        .map_err(|err| anyhow::anyhow!("Flushing '{title}' section: {}", err.error()))?;
    String::from_utf8(bytes).with_context(|| format!("Encoding '{title}' section"))
}
