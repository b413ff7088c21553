//! Declarative field presets.
//!
//! A [`FieldPreset`] describes one source convention: which column names map
//! onto which canonical field, which raw tokens normalize to which canonical
//! value, and how free-text steps are split. Presets are plain data. They are
//! serialized as YAML, validated once, and then shared read-only by every row
//! of an import.

use std::{collections::BTreeMap, fmt, fs::File, io::BufReader, path::Path};

use anyhow::{Context, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::PresetError;

pub const DEFAULT_MAX_STEPS: usize = 50;
pub const DEFAULT_MIN_STEP_LENGTH: usize = 2;
pub const DEFAULT_STEP_TEXT: &str = "Execute the test case as described";
pub const DEFAULT_STEP_PREFIX_PATTERN: &str =
    r"^(?:(?i:step)\s*\d+\s*[.):\-]?|\d+\s*[.)]|\d+\s|[-•*])\s*";
pub const DEFAULT_EXPECTED_MARKER_PATTERN: &str =
    r"(?i)\s*(?:[|;,\-]\s*)?\bexpected(?:\s+results?)?\s*[:=]\s*";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CanonicalField {
    Id,
    Title,
    Module,
    Category,
    Description,
    Preconditions,
    Steps,
    ExpectedResult,
    TestData,
    Priority,
    Status,
    Tags,
    Qa,
    Remarks,
    TestResult,
    Automated,
    Project,
}

impl CanonicalField {
    pub const ALL: [CanonicalField; 17] = [
        CanonicalField::Id,
        CanonicalField::Title,
        CanonicalField::Module,
        CanonicalField::Category,
        CanonicalField::Description,
        CanonicalField::Preconditions,
        CanonicalField::Steps,
        CanonicalField::ExpectedResult,
        CanonicalField::TestData,
        CanonicalField::Priority,
        CanonicalField::Status,
        CanonicalField::Tags,
        CanonicalField::Qa,
        CanonicalField::Remarks,
        CanonicalField::TestResult,
        CanonicalField::Automated,
        CanonicalField::Project,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            CanonicalField::Id => "id",
            CanonicalField::Title => "title",
            CanonicalField::Module => "module",
            CanonicalField::Category => "category",
            CanonicalField::Description => "description",
            CanonicalField::Preconditions => "preconditions",
            CanonicalField::Steps => "steps",
            CanonicalField::ExpectedResult => "expected_result",
            CanonicalField::TestData => "test_data",
            CanonicalField::Priority => "priority",
            CanonicalField::Status => "status",
            CanonicalField::Tags => "tags",
            CanonicalField::Qa => "qa",
            CanonicalField::Remarks => "remarks",
            CanonicalField::TestResult => "test_result",
            CanonicalField::Automated => "automated",
            CanonicalField::Project => "project",
        }
    }
}

impl fmt::Display for CanonicalField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StepParsingConfig {
    /// Strings treated as step boundaries in addition to line breaks.
    pub separators: Vec<String>,
    pub step_prefix_pattern: String,
    pub expected_marker_pattern: String,
    pub max_steps: usize,
    pub min_step_length: usize,
    pub default_step: String,
}

impl Default for StepParsingConfig {
    fn default() -> Self {
        Self {
            separators: ["\r\n", "\r", "\n", ";", "|"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            step_prefix_pattern: DEFAULT_STEP_PREFIX_PATTERN.to_string(),
            expected_marker_pattern: DEFAULT_EXPECTED_MARKER_PATTERN.to_string(),
            max_steps: DEFAULT_MAX_STEPS,
            min_step_length: DEFAULT_MIN_STEP_LENGTH,
            default_step: DEFAULT_STEP_TEXT.to_string(),
        }
    }
}

/// Compiled form of [`StepParsingConfig`].
#[derive(Debug, Clone)]
pub struct StepRules {
    pub separators: Vec<String>,
    pub step_prefix: Regex,
    pub expected_marker: Regex,
    pub max_steps: usize,
    pub min_step_length: usize,
    pub default_step: String,
}

impl StepParsingConfig {
    pub fn compile(&self) -> Result<StepRules, PresetError> {
        if self.max_steps == 0 {
            return Err(PresetError::ZeroMaxSteps);
        }
        if self.default_step.trim().is_empty() {
            return Err(PresetError::EmptyDefaultStep);
        }
        let step_prefix =
            Regex::new(&self.step_prefix_pattern).map_err(|source| PresetError::Pattern {
                name: "step prefix",
                source,
            })?;
        let expected_marker =
            Regex::new(&self.expected_marker_pattern).map_err(|source| PresetError::Pattern {
                name: "expected marker",
                source,
            })?;
        let mut separators = self
            .separators
            .iter()
            .filter(|s| !s.is_empty())
            .cloned()
            .collect::<Vec<_>>();
        // Longest first so "\r\n" wins over "\r".
        separators.sort_by_key(|s| std::cmp::Reverse(s.len()));
        Ok(StepRules {
            separators,
            step_prefix,
            expected_marker,
            max_steps: self.max_steps,
            min_step_length: self.min_step_length,
            default_step: self.default_step.trim().to_string(),
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FieldPreset {
    pub name: String,
    #[serde(default)]
    pub column_mappings: BTreeMap<CanonicalField, Vec<String>>,
    #[serde(default)]
    pub normalizers: BTreeMap<CanonicalField, BTreeMap<String, Vec<String>>>,
    #[serde(default)]
    pub step_parsing: StepParsingConfig,
    #[serde(default = "FieldPreset::default_tag_separators")]
    pub tag_separators: Vec<String>,
}

impl FieldPreset {
    fn default_tag_separators() -> Vec<String> {
        [",", ";", "|"].iter().map(|s| s.to_string()).collect()
    }

    pub fn aliases(&self, field: CanonicalField) -> &[String] {
        self.column_mappings
            .get(&field)
            .map(|aliases| aliases.as_slice())
            .unwrap_or(&[])
    }

    pub fn validate(&self) -> Result<(), PresetError> {
        for field in [CanonicalField::Title, CanonicalField::Steps] {
            if self.aliases(field).is_empty() {
                return Err(PresetError::MissingAliases {
                    preset: self.name.clone(),
                    field: field.as_str(),
                });
            }
        }
        self.step_parsing.compile().map(|_| ())
    }

    /// Looks `raw` up in the normalizer table for `field`.
    ///
    /// The token is trimmed and upper-cased before matching against both the
    /// canonical value and its synonyms. Unknown tokens are returned trimmed
    /// but otherwise untouched.
    pub fn normalize_value(&self, field: CanonicalField, raw: &str) -> String {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return String::new();
        }
        self.lookup_normalized(field, trimmed)
            .map(str::to_string)
            .unwrap_or_else(|| trimmed.to_string())
    }

    pub fn is_known_value(&self, field: CanonicalField, raw: &str) -> bool {
        self.lookup_normalized(field, raw.trim()).is_some()
    }

    fn lookup_normalized(&self, field: CanonicalField, trimmed: &str) -> Option<&str> {
        let table = self.normalizers.get(&field)?;
        let token = trimmed.to_uppercase();
        table
            .iter()
            .find(|(canonical, synonyms)| {
                canonical.to_uppercase() == token
                    || synonyms.iter().any(|s| s.trim().to_uppercase() == token)
            })
            .map(|(canonical, _)| canonical.as_str())
    }

    pub fn load(path: &Path) -> Result<Self> {
        let file = File::open(path).with_context(|| format!("Opening preset file {path:?}"))?;
        let preset: FieldPreset = serde_yaml::from_reader(BufReader::new(file))
            .with_context(|| format!("Parsing preset YAML {path:?}"))?;
        preset
            .validate()
            .with_context(|| format!("Validating preset '{}'", preset.name))?;
        Ok(preset)
    }

    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml::to_string(self).context("Serializing preset to YAML")
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let yaml = self.to_yaml()?;
        std::fs::write(path, yaml).with_context(|| format!("Writing preset file {path:?}"))
    }
}

const COLUMN_ALIASES: &[(CanonicalField, &[&str])] = &[
    (
        CanonicalField::Id,
        &["test case id", "testcaseid", "tc id", "tc no", "case id", "test id", "id"],
    ),
    (
        CanonicalField::Title,
        &[
            "title",
            "test case title",
            "test case name",
            "test title",
            "test case",
            "testcase",
            "test name",
            "name",
            "test scenario",
            "scenario",
            "summary",
        ],
    ),
    (
        CanonicalField::Module,
        &["module", "feature", "component", "functional area", "area", "section"],
    ),
    (
        CanonicalField::Category,
        &["category", "test type", "type", "test suite", "suite"],
    ),
    (
        CanonicalField::Description,
        &["description", "test description", "desc", "objective", "details"],
    ),
    (
        CanonicalField::Preconditions,
        &["preconditions", "pre conditions", "precondition", "prerequisites", "pre requisite"],
    ),
    (
        CanonicalField::Steps,
        &["test steps", "teststeps", "steps", "step", "test procedure", "procedure", "actions"],
    ),
    (
        CanonicalField::ExpectedResult,
        &[
            "expected result",
            "expected results",
            "expectedresult",
            "expected outcome",
            "expected",
        ],
    ),
    (
        CanonicalField::TestData,
        &["test data", "testdata", "input data", "data", "inputs"],
    ),
    (
        CanonicalField::Priority,
        &["priority", "prio", "severity", "importance"],
    ),
    (CanonicalField::Status, &["status", "state"]),
    (CanonicalField::Tags, &["tags", "labels", "keywords"]),
    (
        CanonicalField::Qa,
        &["qa", "tester", "owner", "assigned to", "assignee", "author"],
    ),
    (
        CanonicalField::Remarks,
        &["remarks", "comments", "comment", "notes"],
    ),
    (
        CanonicalField::TestResult,
        &["test result", "testresult", "actual result", "execution status", "result", "outcome"],
    ),
    (
        CanonicalField::Automated,
        &["automated", "is automated", "automation"],
    ),
    (
        CanonicalField::Project,
        &["project id", "projectid", "project"],
    ),
];

const VALUE_NORMALIZERS: &[(CanonicalField, &[(&str, &[&str])])] = &[
    (
        CanonicalField::Priority,
        &[
            ("critical", &["CRITICAL", "CRIT", "BLOCKER", "URGENT", "HIGHEST"]),
            ("high", &["HIGH", "H", "P0", "P1", "MAJOR"]),
            ("medium", &["MEDIUM", "MED", "M", "P2", "NORMAL", "MODERATE"]),
            ("low", &["LOW", "L", "P3", "P4", "MINOR", "TRIVIAL", "LOWEST"]),
        ],
    ),
    (
        CanonicalField::Status,
        &[
            ("active", &["ACTIVE", "READY", "APPROVED", "IN USE"]),
            ("draft", &["DRAFT", "NEW", "TODO", "NOT STARTED"]),
            ("review", &["REVIEW", "IN REVIEW", "UNDER REVIEW", "PENDING"]),
            ("deprecated", &["DEPRECATED", "OBSOLETE", "RETIRED", "INACTIVE"]),
        ],
    ),
    (
        CanonicalField::TestResult,
        &[
            ("Pass", &["PASS", "PASSED", "OK", "P", "SUCCESS"]),
            ("Fail", &["FAIL", "FAILED", "F", "KO", "FAILURE"]),
            ("Blocked", &["BLOCKED", "B"]),
            ("Not Run", &["NOT RUN", "NOT EXECUTED", "NA", "N/A", "SKIPPED"]),
        ],
    ),
    (
        CanonicalField::Automated,
        &[
            ("true", &["TRUE", "YES", "Y", "1", "AUTOMATED", "X"]),
            ("false", &["FALSE", "NO", "N", "0", "MANUAL"]),
        ],
    ),
];

impl Default for FieldPreset {
    fn default() -> Self {
        let column_mappings = COLUMN_ALIASES
            .iter()
            .map(|(field, aliases)| (*field, aliases.iter().map(|a| a.to_string()).collect()))
            .collect();
        let normalizers = VALUE_NORMALIZERS
            .iter()
            .map(|(field, table)| {
                let values = table
                    .iter()
                    .map(|(canonical, synonyms)| {
                        (
                            canonical.to_string(),
                            synonyms.iter().map(|s| s.to_string()).collect(),
                        )
                    })
                    .collect();
                (*field, values)
            })
            .collect();
        Self {
            name: "default".to_string(),
            column_mappings,
            normalizers,
            step_parsing: StepParsingConfig::default(),
            tag_separators: Self::default_tag_separators(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_preset_is_valid() {
        let preset = FieldPreset::default();
        preset.validate().expect("default preset validates");
        assert_eq!(preset.aliases(CanonicalField::Id)[0], "test case id");
    }

    #[test]
    fn normalize_value_maps_synonyms_and_passes_unknowns_through() {
        let preset = FieldPreset::default();
        assert_eq!(preset.normalize_value(CanonicalField::Priority, " p0 "), "high");
        assert_eq!(preset.normalize_value(CanonicalField::Priority, "H"), "high");
        assert_eq!(preset.normalize_value(CanonicalField::Priority, "Urgent"), "critical");
        assert_eq!(preset.normalize_value(CanonicalField::Priority, " Sev-9 "), "Sev-9");
        assert_eq!(preset.normalize_value(CanonicalField::Status, "in review"), "review");
        assert_eq!(preset.normalize_value(CanonicalField::Automated, "y"), "true");
        assert!(!preset.is_known_value(CanonicalField::Priority, "Sev-9"));
    }

    #[test]
    fn step_config_rejects_bad_pattern() {
        let config = StepParsingConfig {
            step_prefix_pattern: "(".to_string(),
            ..StepParsingConfig::default()
        };
        let err = config.compile().unwrap_err();
        assert!(matches!(err, PresetError::Pattern { name: "step prefix", .. }));
    }

    #[test]
    fn compile_orders_separators_longest_first() {
        let rules = StepParsingConfig::default().compile().expect("compile");
        assert_eq!(rules.separators[0], "\r\n");
    }

    #[test]
    fn preset_yaml_round_trips() {
        let preset = FieldPreset::default();
        let yaml = preset.to_yaml().expect("yaml");
        assert!(yaml.contains("expected_result"));
        let parsed: FieldPreset = serde_yaml::from_str(&yaml).expect("parse yaml");
        assert_eq!(parsed, preset);
    }

    #[test]
    fn preset_without_title_aliases_is_rejected() {
        let mut preset = FieldPreset::default();
        preset.column_mappings.remove(&CanonicalField::Title);
        let err = preset.validate().unwrap_err();
        assert!(matches!(err, PresetError::MissingAliases { field: "title", .. }));
    }
}
