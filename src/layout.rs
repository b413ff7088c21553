//! Sheet layout detection and record assembly.
//!
//! A grid is either horizontal (header row, one test case per row) or
//! vertical key-value (one field per row, records separated by an ID key).
//! Both layouts end up as [`RawRow`] records so the field mapper only sees
//! one shape.

use log::debug;
use serde::Serialize;

use crate::{
    mapping::normalize_key,
    preset::{CanonicalField, FieldPreset},
    tabular::{Grid, RawRow},
};

pub const LAYOUT_SAMPLE_ROWS: usize = 15;
pub const VERTICAL_MATCH_THRESHOLD: usize = 4;

const VERTICAL_KEY_FRAGMENTS: &[&str] = &[
    "test case id",
    "tc id",
    "module",
    "title",
    "test case",
    "scenario",
    "description",
    "precondition",
    "test steps",
    "steps",
    "expected result",
    "test data",
    "priority",
    "status",
    "qa",
    "tester",
    "remarks",
    "tags",
    "category",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Layout {
    Horizontal,
    Vertical,
}

pub fn detect_layout(grid: &[Vec<String>]) -> Layout {
    let matches = grid
        .iter()
        .take(LAYOUT_SAMPLE_ROWS)
        .filter(|row| row.first().is_some_and(|cell| is_field_key(cell)))
        .count();
    let layout = if matches >= VERTICAL_MATCH_THRESHOLD {
        Layout::Vertical
    } else {
        Layout::Horizontal
    };
    debug!("Detected {layout:?} layout ({matches} key-like first cell(s) in sample)");
    layout
}

/// True when `cell` is a canonical field label, e.g. `Module:` or `Expected Result (UI)`.
pub fn is_field_key(cell: &str) -> bool {
    let lowered = cell.trim().to_lowercase();
    let mut label = lowered.trim_end_matches(':').trim();
    if label.ends_with(')')
        && let Some(open) = label.rfind('(')
    {
        label = label[..open].trim_end();
    }
    !label.is_empty() && VERTICAL_KEY_FRAGMENTS.iter().any(|fragment| *fragment == label)
}

/// First row (or `column_names`) supplies the headers for every other row.
pub fn horizontal_records(grid: Grid, column_names: Option<&[String]>) -> Vec<RawRow> {
    let mut rows = grid.into_iter();
    let mut headers = match column_names {
        Some(names) => names.to_vec(),
        None => rows.next().unwrap_or_default(),
    };
    for (idx, header) in headers.iter_mut().enumerate() {
        if header.trim().is_empty() {
            *header = format!("Column{}", idx + 1);
        } else {
            *header = header.trim().to_string();
        }
    }

    rows.map(|cells| {
        let width = headers.len().max(cells.len());
        (0..width)
            .map(|idx| {
                let key = headers
                    .get(idx)
                    .cloned()
                    .unwrap_or_else(|| format!("Column{}", idx + 1));
                let value = cells.get(idx).cloned().unwrap_or_default();
                (key, value)
            })
            .collect::<RawRow>()
    })
    .filter(|row| !row.is_blank())
    .collect()
}

/// Folds key/value rows into one record per test case.
///
/// The first cell is the key and the remaining non-empty cells the value. A
/// row with an empty key, or a key already present in the current record,
/// appends to that key's value. Only an ID key starts a new record.
pub fn vertical_records(grid: &[Vec<String>], preset: &FieldPreset) -> Vec<RawRow> {
    let id_keys = preset
        .aliases(CanonicalField::Id)
        .iter()
        .map(|alias| normalize_key(alias))
        .collect::<Vec<_>>();

    let mut records = Vec::new();
    let mut current = RawRow::default();
    let mut last_key: Option<String> = None;

    for row in grid {
        let key = row.first().map(|cell| cell.trim()).unwrap_or("");
        let value = row
            .iter()
            .skip(1)
            .map(|cell| cell.trim())
            .filter(|cell| !cell.is_empty())
            .collect::<Vec<_>>()
            .join("\n");

        if key.is_empty() {
            if let Some(previous) = &last_key {
                append_value(&mut current, previous, &value);
            }
            continue;
        }

        let key = key.trim_end_matches(':').trim().to_string();
        if id_keys.contains(&normalize_key(&key)) {
            if !current.is_blank() {
                records.push(std::mem::take(&mut current));
            } else {
                current = RawRow::default();
            }
        } else if current.contains_key(&key) {
            append_value(&mut current, &key, &value);
            last_key = Some(key);
            continue;
        }
        current.push(key.clone(), value);
        last_key = Some(key);
    }
    if !current.is_blank() {
        records.push(current);
    }
    debug!("Assembled {} vertical record(s)", records.len());
    records
}

fn append_value(record: &mut RawRow, key: &str, value: &str) {
    if value.is_empty() {
        return;
    }
    if let Some(existing) = record.get_mut(key) {
        if !existing.is_empty() {
            existing.push('\n');
        }
        existing.push_str(value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grid(rows: &[&[&str]]) -> Grid {
        rows.iter()
            .map(|row| row.iter().map(|cell| cell.to_string()).collect())
            .collect()
    }

    #[test]
    fn four_key_rows_classify_as_vertical() {
        let sheet = grid(&[
            &["Test Case ID", "TC-1"],
            &["Module", "Auth"],
            &["Title", "Login"],
            &["QA", "dana"],
            &["Test Steps", "Open app"],
        ]);
        assert_eq!(detect_layout(&sheet), Layout::Vertical);
    }

    #[test]
    fn header_table_classifies_as_horizontal() {
        let sheet = grid(&[
            &["Test Case ID", "Module", "Title"],
            &["TC-1", "Auth", "Login"],
            &["Module", "Auth", "Logout"],
            &["TC-3", "Cart", "Add item"],
        ]);
        assert_eq!(detect_layout(&sheet), Layout::Horizontal);
    }

    #[test]
    fn field_key_matches_whole_label() {
        assert!(is_field_key("Module:"));
        assert!(is_field_key("  QA "));
        assert!(is_field_key("Expected Result (UI)"));
        assert!(!is_field_key("Qatar office"));
        assert!(!is_field_key("TC-001"));
        assert!(!is_field_key("Status badge updates"));
        assert!(!is_field_key("Priority sort works"));
        assert!(!is_field_key("(draft)"));
    }

    #[test]
    fn titles_starting_with_field_words_stay_horizontal() {
        let sheet = grid(&[
            &["Title", "Steps"],
            &["Status badge updates", "Open dashboard"],
            &["Priority sort works", "Sort by priority"],
            &["Module list loads", "Open modules"],
            &["Tags filter results", "Pick a tag"],
            &["Description renders markdown", "Open case"],
        ]);
        assert_eq!(detect_layout(&sheet), Layout::Horizontal);
        let records = horizontal_records(sheet, None);
        assert_eq!(records.len(), 5);
        assert_eq!(records[1].get("Title"), Some("Priority sort works"));
    }

    #[test]
    fn horizontal_records_pad_and_name_columns() {
        let rows = horizontal_records(
            grid(&[&["Title", ""], &["Login", "x", "extra"], &["", "", ""]]),
            None,
        );
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].get("Title"), Some("Login"));
        assert_eq!(rows[0].get("Column2"), Some("x"));
        assert_eq!(rows[0].get("Column3"), Some("extra"));
    }

    #[test]
    fn vertical_records_split_on_id_keys_and_continue_values() {
        let preset = FieldPreset::default();
        let sheet = grid(&[
            &["Test Case ID", "TC-1"],
            &["Title", "Login"],
            &["Test Steps", "1. Open app"],
            &["", "2. Tap login"],
            &["Test Case ID", "TC-2"],
            &["Title:", "Logout"],
        ]);
        let records = vertical_records(&sheet, &preset);
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].get("Test Steps"), Some("1. Open app\n2. Tap login"));
        assert_eq!(records[1].get("Title"), Some("Logout"));
    }

    #[test]
    fn repeated_keys_append_within_id_delimited_records() {
        let preset = FieldPreset::default();
        let sheet = grid(&[
            &["Test Case ID", "TC-1"],
            &["Title", "Login"],
            &["Module", "Auth"],
            &["Step", "Open app"],
            &["Step", "Tap login"],
            &["QA", "dana"],
            &["Test Case ID", "TC-2"],
            &["Title", "Logout"],
            &["Step", "Open menu"],
        ]);
        let records = vertical_records(&sheet, &preset);
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].get("Step"), Some("Open app\nTap login"));
        assert_eq!(records[0].get("QA"), Some("dana"));
        assert_eq!(records[1].get("Title"), Some("Logout"));
        assert_eq!(records[1].get("Step"), Some("Open menu"));
    }
}
