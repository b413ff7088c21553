//! Tabular source parsing.
//!
//! CSV, Excel and JSON inputs are turned into either a raw cell [`Grid`] (CSV
//! and Excel, so the layout can be detected first) or straight into
//! [`RawRow`] records (JSON). Structural problems surface as [`ParseError`].

use std::{io::Cursor, path::Path};

use calamine::{Data, Reader, Sheets, open_workbook_auto_from_rs};
use clap::ValueEnum;
use log::debug;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};

use crate::{error::ParseError, layout};

pub type Grid = Vec<Vec<String>>;

const SHEET_PREVIEW_ROWS: usize = 3;
const TEST_CASE_SHEET_KEYWORDS: &[&str] =
    &["test", "case", "tc", "scenario", "spec", "requirement"];
const JSON_COLLECTION_KEYS: &[&str] = &["testCases", "tests"];
const JSON_TAG_KEYS: &[&str] = &["tags", "tag", "labels", "keywords"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
#[value(rename_all = "lowercase")]
pub enum SourceFormat {
    Csv,
    Excel,
    Json,
}

impl SourceFormat {
    pub fn from_extension(extension: &str) -> Option<Self> {
        match extension.to_ascii_lowercase().as_str() {
            "csv" | "tsv" | "txt" => Some(SourceFormat::Csv),
            "xlsx" | "xls" | "xlsm" | "xlsb" | "ods" => Some(SourceFormat::Excel),
            "json" => Some(SourceFormat::Json),
            _ => None,
        }
    }

    pub fn from_path(path: &Path) -> Option<Self> {
        path.extension()
            .and_then(|ext| ext.to_str())
            .and_then(Self::from_extension)
    }
}

/// One source record: column name → raw cell text, in source order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RawRow {
    cells: Vec<(String, String)>,
}

impl RawRow {
    pub fn push(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.cells.push((key.into(), value.into()));
    }

    /// First cell stored under `key`.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.cells
            .iter()
            .find(|(name, _)| name == key)
            .map(|(_, value)| value.as_str())
    }

    pub fn get_mut(&mut self, key: &str) -> Option<&mut String> {
        self.cells
            .iter_mut()
            .find(|(name, _)| name == key)
            .map(|(_, value)| value)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.cells.iter().any(|(name, _)| name == key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.cells.iter().map(|(name, _)| name.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.cells
            .iter()
            .map(|(name, value)| (name.as_str(), value.as_str()))
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    pub fn is_blank(&self) -> bool {
        self.cells.iter().all(|(_, value)| value.trim().is_empty())
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for RawRow {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        let mut row = RawRow::default();
        for (key, value) in iter {
            row.push(key, value);
        }
        row
    }
}

pub fn is_blank_row(cells: &[String]) -> bool {
    cells.iter().all(|cell| cell.trim().is_empty())
}

#[derive(Debug, Clone)]
pub struct CsvOptions {
    pub delimiter: u8,
    /// Explicit column names; when set, the first row is data.
    pub column_names: Option<Vec<String>>,
}

impl Default for CsvOptions {
    fn default() -> Self {
        Self {
            delimiter: b',',
            column_names: None,
        }
    }
}

pub fn parse_csv(text: &str, options: &CsvOptions) -> Result<Vec<RawRow>, ParseError> {
    let grid = read_csv_grid(text, options.delimiter)?;
    Ok(layout::horizontal_records(
        grid,
        options.column_names.as_deref(),
    ))
}

/// Reads every CSV record into a grid, dropping whitespace-only rows.
pub fn read_csv_grid(text: &str, delimiter: u8) -> Result<Grid, ParseError> {
    ensure_quotes_terminated(text, delimiter)?;
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .delimiter(delimiter)
        .double_quote(true)
        .flexible(true)
        .from_reader(text.as_bytes());
    let mut grid = Vec::new();
    for (idx, record) in reader.records().enumerate() {
        let record =
            record.map_err(|err| ParseError::Csv(format!("record {}: {err}", idx + 1)))?;
        let cells = record.iter().map(str::to_string).collect::<Vec<_>>();
        if is_blank_row(&cells) {
            continue;
        }
        grid.push(cells);
    }
    debug!("Read {} non-blank CSV record(s)", grid.len());
    Ok(grid)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum QuoteState {
    FieldStart,
    Unquoted,
    Quoted,
    QuoteInQuoted,
}

/// Walks the RFC-4180 quoting states and rejects a quoted field left open
/// at end of input.
fn ensure_quotes_terminated(text: &str, delimiter: u8) -> Result<(), ParseError> {
    use QuoteState::*;

    let mut state = FieldStart;
    let mut line = 1usize;
    let mut opened_on = 1usize;
    for byte in text.bytes() {
        state = match (state, byte) {
            (FieldStart, b'"') => {
                opened_on = line;
                Quoted
            }
            (FieldStart | Unquoted | QuoteInQuoted, b) if b == delimiter || b == b'\n' => {
                FieldStart
            }
            (FieldStart | Unquoted, _) => Unquoted,
            (Quoted, b'"') => QuoteInQuoted,
            (Quoted, _) => Quoted,
            (QuoteInQuoted, b'"') => Quoted,
            (QuoteInQuoted, _) => Unquoted,
        };
        if byte == b'\n' {
            line += 1;
        }
    }
    if state == Quoted {
        return Err(ParseError::Csv(format!(
            "unterminated quoted field starting on line {opened_on}"
        )));
    }
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SheetInfo {
    pub name: String,
    pub row_count: usize,
    pub has_headers: bool,
    pub preview: Vec<Vec<String>>,
    pub is_test_case_sheet: bool,
}

fn open_workbook(bytes: &[u8]) -> Result<Sheets<Cursor<Vec<u8>>>, ParseError> {
    Ok(open_workbook_auto_from_rs(Cursor::new(bytes.to_vec()))?)
}

/// Describes every sheet so a caller can pick one.
pub fn list_sheets(bytes: &[u8]) -> Result<Vec<SheetInfo>, ParseError> {
    let mut workbook = open_workbook(bytes)?;
    let names = workbook.sheet_names().to_vec();
    let mut sheets = Vec::with_capacity(names.len());
    for name in names {
        let grid = sheet_grid(&mut workbook, &name)?;
        sheets.push(SheetInfo {
            has_headers: grid.first().is_some_and(|row| looks_like_header(row)),
            row_count: grid.len(),
            preview: grid.iter().take(SHEET_PREVIEW_ROWS).cloned().collect(),
            is_test_case_sheet: is_test_case_sheet_name(&name),
            name,
        });
    }
    Ok(sheets)
}

/// Reads `sheet` (or the first sheet) with blank rows removed.
pub fn read_excel_grid(bytes: &[u8], sheet: Option<&str>) -> Result<Grid, ParseError> {
    let mut workbook = open_workbook(bytes)?;
    let names = workbook.sheet_names().to_vec();
    let name = match sheet {
        Some(requested) => names
            .iter()
            .find(|name| name.as_str() == requested)
            .or_else(|| {
                names
                    .iter()
                    .find(|name| name.trim().eq_ignore_ascii_case(requested.trim()))
            })
            .cloned()
            .ok_or_else(|| ParseError::SheetNotFound(requested.to_string()))?,
        None => names.first().cloned().ok_or(ParseError::EmptyWorkbook)?,
    };
    let grid = sheet_grid(&mut workbook, &name)?;
    debug!("Read {} non-blank row(s) from sheet '{name}'", grid.len());
    Ok(grid)
}

fn sheet_grid(workbook: &mut Sheets<Cursor<Vec<u8>>>, name: &str) -> Result<Grid, ParseError> {
    let range = workbook.worksheet_range(name)?;
    Ok(range
        .rows()
        .map(|row| row.iter().map(cell_text).collect::<Vec<_>>())
        .filter(|cells| !is_blank_row(cells))
        .collect())
}

fn cell_text(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        Data::String(s) => s.clone(),
        Data::Int(i) => i.to_string(),
        Data::Float(f) if f.fract() == 0.0 && f.abs() < 1e15 => format!("{}", *f as i64),
        Data::Float(f) => f.to_string(),
        Data::Bool(b) => b.to_string(),
        Data::Error(e) => format!("#ERR:{e:?}"),
        other => other.to_string(),
    }
}

pub fn is_test_case_sheet_name(name: &str) -> bool {
    let lowered = name.to_lowercase();
    TEST_CASE_SHEET_KEYWORDS
        .iter()
        .any(|keyword| lowered.contains(keyword))
}

fn looks_like_header(row: &[String]) -> bool {
    let filled = row
        .iter()
        .map(|cell| cell.trim())
        .filter(|cell| !cell.is_empty())
        .collect::<Vec<_>>();
    !filled.is_empty()
        && filled.len() * 2 >= row.len()
        && filled.iter().all(|cell| cell.parse::<f64>().is_err())
}

pub fn parse_json(text: &str) -> Result<Vec<RawRow>, ParseError> {
    let value: JsonValue = serde_json::from_str(text)?;
    let items = match value {
        JsonValue::Array(items) => items,
        JsonValue::Object(mut map) => {
            let collection = JSON_COLLECTION_KEYS
                .iter()
                .find_map(|key| map.remove(*key));
            match collection {
                Some(JsonValue::Array(items)) => items,
                Some(other) => {
                    return Err(ParseError::JsonShape(format!(
                        "'testCases'/'tests' must be an array, found {}",
                        json_kind(&other)
                    )));
                }
                None => {
                    return Err(ParseError::JsonShape(
                        "expected an array or an object with a 'testCases' or 'tests' array"
                            .to_string(),
                    ));
                }
            }
        }
        other => {
            return Err(ParseError::JsonShape(format!(
                "expected an array or an object, found {}",
                json_kind(&other)
            )));
        }
    };

    items
        .into_iter()
        .enumerate()
        .map(|(idx, item)| match item {
            JsonValue::Object(map) => Ok(row_from_object(map)),
            other => Err(ParseError::JsonShape(format!(
                "element {} is {}, expected an object",
                idx + 1,
                json_kind(&other)
            ))),
        })
        .collect()
}

fn row_from_object(map: Map<String, JsonValue>) -> RawRow {
    map.into_iter()
        .map(|(key, value)| {
            let text = match &value {
                JsonValue::Array(items) if is_tag_list_key(&key) => items
                    .iter()
                    .map(json_cell_text)
                    .map(|tag| tag.trim().to_string())
                    .filter(|tag| !tag.is_empty())
                    .collect::<Vec<_>>()
                    .join(", "),
                _ => json_cell_text(&value),
            };
            (key, text)
        })
        .collect()
}

fn is_tag_list_key(key: &str) -> bool {
    let key = key.trim().to_lowercase();
    JSON_TAG_KEYS.iter().any(|candidate| *candidate == key)
}

fn json_cell_text(value: &JsonValue) -> String {
    match value {
        JsonValue::Null => String::new(),
        JsonValue::String(s) => s.clone(),
        JsonValue::Bool(b) => b.to_string(),
        JsonValue::Number(n) => n.to_string(),
        JsonValue::Array(items) => items
            .iter()
            .map(|item| match item {
                JsonValue::Object(step) => json_step_line(step),
                other => json_cell_text(other),
            })
            .filter(|line| !line.trim().is_empty())
            .collect::<Vec<_>>()
            .join("\n"),
        JsonValue::Object(_) => value.to_string(),
    }
}

/// Renders a structured step object as `description | Expected: result`.
fn json_step_line(step: &Map<String, JsonValue>) -> String {
    let text_of = |keys: &[&str]| {
        keys.iter()
            .filter_map(|key| step.get(*key))
            .filter_map(|value| value.as_str())
            .map(str::trim)
            .find(|text| !text.is_empty())
            .unwrap_or("")
            .to_string()
    };
    let description = text_of(&["description", "action", "step", "name"]);
    let expected = text_of(&["expectedResult", "expected_result", "expected"]);
    if expected.is_empty() {
        description
    } else {
        format!("{description} | Expected: {expected}")
    }
}

fn json_kind(value: &JsonValue) -> &'static str {
    match value {
        JsonValue::Null => "null",
        JsonValue::Bool(_) => "a boolean",
        JsonValue::Number(_) => "a number",
        JsonValue::String(_) => "a string",
        JsonValue::Array(_) => "an array",
        JsonValue::Object(_) => "an object",
    }
}
