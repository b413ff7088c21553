//! Column resolution and value normalization.
//!
//! [`FieldMapper`] resolves source column names against the preset's alias
//! lists, pulls each canonical field out of a [`RawRow`], applies value
//! normalizers, and hands the steps text to the step parser. The result is a
//! [`MappedRecord`], the builder's input.

use std::collections::{BTreeMap, HashSet};

use itertools::Itertools;
use log::trace;

use crate::{
    error::{MappingError, PresetError},
    model::TestStep,
    preset::{CanonicalField, FieldPreset, StepRules},
    steps,
    tabular::RawRow,
};

/// Aliases and headers shorter than this never take part in substring matching.
const MIN_SUBSTRING_MATCH_LEN: usize = 3;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ColumnResolution {
    columns: BTreeMap<CanonicalField, String>,
}

impl ColumnResolution {
    /// Source column name resolved for `field`, if any.
    pub fn column(&self, field: CanonicalField) -> Option<&str> {
        self.columns.get(&field).map(String::as_str)
    }

    pub fn is_resolved(&self, field: CanonicalField) -> bool {
        self.columns.contains_key(&field)
    }

    pub fn value<'r>(&self, row: &'r RawRow, field: CanonicalField) -> &'r str {
        self.column(field)
            .and_then(|column| row.get(column))
            .map(str::trim)
            .unwrap_or("")
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MappedRecord {
    pub source_id: String,
    pub title: String,
    pub module: String,
    pub category: String,
    pub description: String,
    pub preconditions: String,
    pub expected_result: String,
    pub test_data: String,
    pub priority: String,
    pub status: String,
    pub tags: Vec<String>,
    pub qa: String,
    pub remarks: String,
    pub test_result: String,
    pub automated: String,
    pub project: String,
    pub steps: Vec<TestStep>,
}

#[derive(Debug, Clone)]
pub struct FieldMapper<'p> {
    preset: &'p FieldPreset,
    rules: StepRules,
}

impl<'p> FieldMapper<'p> {
    pub fn new(preset: &'p FieldPreset) -> Result<Self, PresetError> {
        preset.validate()?;
        let rules = preset.step_parsing.compile()?;
        Ok(Self { preset, rules })
    }

    pub fn preset(&self) -> &FieldPreset {
        self.preset
    }

    pub fn rules(&self) -> &StepRules {
        &self.rules
    }

    /// Resolves every canonical field against `keys`.
    ///
    /// An exact (case-insensitive) pass runs for all fields before the
    /// substring pass, and each source column is claimed by at most one
    /// field. Within a field the alias order decides.
    pub fn resolve_columns<'k, I>(&self, keys: I) -> ColumnResolution
    where
        I: IntoIterator<Item = &'k str>,
    {
        let candidates = keys
            .into_iter()
            .map(|key| (key.to_string(), normalize_key(key)))
            .filter(|(_, normalized)| !normalized.is_empty())
            .collect::<Vec<_>>();
        let mut claimed: HashSet<usize> = HashSet::new();
        let mut columns = BTreeMap::new();

        for field in CanonicalField::ALL {
            let hit = self.preset.aliases(field).iter().find_map(|alias| {
                let alias = normalize_key(alias);
                candidates
                    .iter()
                    .enumerate()
                    .find(|(idx, (_, key))| !claimed.contains(idx) && *key == alias)
                    .map(|(idx, _)| idx)
            });
            if let Some(idx) = hit {
                claimed.insert(idx);
                columns.insert(field, candidates[idx].0.clone());
            }
        }

        for field in CanonicalField::ALL {
            if columns.contains_key(&field) {
                continue;
            }
            let hit = self.preset.aliases(field).iter().find_map(|alias| {
                let alias = normalize_key(alias);
                if alias.chars().count() < MIN_SUBSTRING_MATCH_LEN {
                    return None;
                }
                candidates
                    .iter()
                    .enumerate()
                    .find(|(idx, (_, key))| {
                        !claimed.contains(idx)
                            && key.chars().count() >= MIN_SUBSTRING_MATCH_LEN
                            && (key.contains(alias.as_str()) || alias.contains(key.as_str()))
                    })
                    .map(|(idx, _)| idx)
            });
            if let Some(idx) = hit {
                trace!(
                    "Column '{}' resolved to '{}' by substring match",
                    candidates[idx].0, field
                );
                claimed.insert(idx);
                columns.insert(field, candidates[idx].0.clone());
            }
        }

        ColumnResolution { columns }
    }

    pub fn map_row(
        &self,
        row: &RawRow,
        validate_required: bool,
    ) -> Result<Option<MappedRecord>, MappingError> {
        let resolution = self.resolve_columns(row.keys());
        self.map_row_with(row, &resolution, validate_required)
    }

    /// Maps `row` using a resolution computed once for a shared header set.
    ///
    /// Returns `Ok(None)` for rows without a usable title and ID.
    pub fn map_row_with(
        &self,
        row: &RawRow,
        resolution: &ColumnResolution,
        validate_required: bool,
    ) -> Result<Option<MappedRecord>, MappingError> {
        let value = |field| resolution.value(row, field).to_string();
        let source_id = value(CanonicalField::Id);
        let mut title = value(CanonicalField::Title);

        if title.is_empty() {
            if source_id.is_empty() {
                return Ok(None);
            }
            if validate_required {
                return Err(MappingError::MissingRequired("title"));
            }
            title = source_id.clone();
        }

        let expected_result = value(CanonicalField::ExpectedResult);
        let steps = steps::parse_steps(
            resolution.value(row, CanonicalField::Steps),
            &expected_result,
            &self.rules,
        );
        let normalized = |field| {
            self.preset
                .normalize_value(field, resolution.value(row, field))
        };

        Ok(Some(MappedRecord {
            source_id,
            title,
            module: value(CanonicalField::Module),
            category: value(CanonicalField::Category),
            description: value(CanonicalField::Description),
            preconditions: value(CanonicalField::Preconditions),
            expected_result,
            test_data: value(CanonicalField::TestData),
            priority: normalized(CanonicalField::Priority),
            status: normalized(CanonicalField::Status),
            tags: split_tags(
                resolution.value(row, CanonicalField::Tags),
                &self.preset.tag_separators,
            ),
            qa: value(CanonicalField::Qa),
            remarks: value(CanonicalField::Remarks),
            test_result: normalized(CanonicalField::TestResult),
            automated: normalized(CanonicalField::Automated),
            project: value(CanonicalField::Project),
            steps,
        }))
    }
}

/// Lower-cases a column name and folds `_ - . / :` and runs of whitespace
/// into single spaces.
pub fn normalize_key(name: &str) -> String {
    name.to_lowercase()
        .chars()
        .map(|c| match c {
            '_' | '-' | '.' | '/' | ':' => ' ',
            other => other,
        })
        .collect::<String>()
        .split_whitespace()
        .join(" ")
}

pub fn split_tags(raw: &str, separators: &[String]) -> Vec<String> {
    let mut normalized = raw.to_string();
    for separator in separators.iter().filter(|s| !s.is_empty()) {
        normalized = normalized.replace(separator.as_str(), "\n");
    }
    normalized
        .split('\n')
        .map(|tag| tag.trim().trim_start_matches('#').trim())
        .filter(|tag| !tag.is_empty())
        .map(str::to_string)
        .unique()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(cells: &[(&str, &str)]) -> RawRow {
        let mut row = RawRow::default();
        for (key, value) in cells {
            row.push(*key, *value);
        }
        row
    }

    #[test]
    fn normalize_key_folds_separators() {
        assert_eq!(normalize_key("  Test_Case-ID: "), "test case id");
        assert_eq!(normalize_key("Expected   Result"), "expected result");
    }

    #[test]
    fn exact_match_beats_substring_claims() {
        let preset = FieldPreset::default();
        let mapper = FieldMapper::new(&preset).expect("mapper");
        let resolution = mapper.resolve_columns(["Test Case", "Module", "Test Steps"]);
        assert_eq!(resolution.column(CanonicalField::Title), Some("Test Case"));
        assert_eq!(resolution.column(CanonicalField::Module), Some("Module"));
        assert_eq!(resolution.column(CanonicalField::Steps), Some("Test Steps"));
        assert!(!resolution.is_resolved(CanonicalField::Id));
    }

    #[test]
    fn substring_fallback_resolves_decorated_headers() {
        let preset = FieldPreset::default();
        let mapper = FieldMapper::new(&preset).expect("mapper");
        let resolution =
            mapper.resolve_columns(["TC ID", "Scenario Title", "Detailed Steps", "Priority Level"]);
        assert_eq!(resolution.column(CanonicalField::Id), Some("TC ID"));
        assert_eq!(resolution.column(CanonicalField::Title), Some("Scenario Title"));
        assert_eq!(resolution.column(CanonicalField::Steps), Some("Detailed Steps"));
        assert_eq!(resolution.column(CanonicalField::Priority), Some("Priority Level"));
    }

    #[test]
    fn camel_case_json_keys_resolve() {
        let preset = FieldPreset::default();
        let mapper = FieldMapper::new(&preset).expect("mapper");
        let resolution = mapper.resolve_columns(["title", "testSteps", "expectedResult", "projectId"]);
        assert_eq!(resolution.column(CanonicalField::Steps), Some("testSteps"));
        assert_eq!(
            resolution.column(CanonicalField::ExpectedResult),
            Some("expectedResult")
        );
        assert_eq!(resolution.column(CanonicalField::Project), Some("projectId"));
    }

    #[test]
    fn map_row_normalizes_enumerations_and_tags() {
        let preset = FieldPreset::default();
        let mapper = FieldMapper::new(&preset).expect("mapper");
        let record = mapper
            .map_row(
                &row(&[
                    ("Title", "Login works"),
                    ("Priority", "p0"),
                    ("Status", "Ready"),
                    ("Tags", "smoke, #auth; smoke"),
                    ("Automated", "yes"),
                    ("Steps", "1. Open app\n2. Tap login"),
                ]),
                false,
            )
            .expect("map")
            .expect("record");
        assert_eq!(record.priority, "high");
        assert_eq!(record.status, "active");
        assert_eq!(record.automated, "true");
        assert_eq!(record.tags, vec!["smoke", "auth"]);
        assert_eq!(record.steps.len(), 2);
    }

    #[test]
    fn unknown_enumeration_values_pass_through() {
        let preset = FieldPreset::default();
        let mapper = FieldMapper::new(&preset).expect("mapper");
        let record = mapper
            .map_row(&row(&[("Title", "A"), ("Priority", " Sev-9 ")]), false)
            .expect("map")
            .expect("record");
        assert_eq!(record.priority, "Sev-9");
    }

    #[test]
    fn rows_without_title_or_id_are_skipped() {
        let preset = FieldPreset::default();
        let mapper = FieldMapper::new(&preset).expect("mapper");
        let outcome = mapper
            .map_row(&row(&[("Module", "Auth"), ("Steps", "Open app")]), true)
            .expect("map");
        assert!(outcome.is_none());
    }

    #[test]
    fn id_only_rows_fall_back_or_fail_validation() {
        let preset = FieldPreset::default();
        let mapper = FieldMapper::new(&preset).expect("mapper");
        let input = row(&[("Test Case ID", "TC-7"), ("Module", "Auth")]);
        let record = mapper.map_row(&input, false).expect("map").expect("record");
        assert_eq!(record.title, "TC-7");
        assert_eq!(record.source_id, "TC-7");
        let err = mapper.map_row(&input, true).unwrap_err();
        assert_eq!(err, MappingError::MissingRequired("title"));
    }

    #[test]
    fn long_titles_are_kept_whole() {
        let preset = FieldPreset::default();
        let mapper = FieldMapper::new(&preset).expect("mapper");
        let title = "x".repeat(501);
        let record = mapper
            .map_row(&row(&[("Title", title.as_str()), ("Steps", "Open app")]), true)
            .expect("map")
            .expect("record");
        assert_eq!(record.title.len(), 501);
        assert_eq!(record.steps.len(), 1);
    }
}
