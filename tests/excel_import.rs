use rust_xlsxwriter::Workbook;
use testcase_import::{
    error::ParseError,
    import::{ImportOptions, import_bytes},
    model::Priority,
    preset::FieldPreset,
    tabular::{SourceFormat, list_sheets, read_excel_grid},
};

fn regression_workbook() -> Vec<u8> {
    let mut workbook = Workbook::new();

    let notes = workbook.add_worksheet();
    notes.set_name("Notes").expect("name notes");
    notes
        .write_string(0, 0, "Exported from the QA tracker")
        .expect("write note");

    let cases = workbook.add_worksheet();
    cases.set_name("Test Cases").expect("name cases");
    let header = ["Test Case ID", "Module", "Title", "Steps", "Priority", "Test Data"];
    for (col, value) in header.iter().enumerate() {
        cases
            .write_string(0, col as u16, *value)
            .expect("write header");
    }
    let rows = [
        ["TC-1", "Auth", "Login", "1. Open app\n2. Tap login", "P1"],
        ["TC-2", "Auth", "Logout", "1. Open menu\n2. Tap logout", "Low"],
    ];
    // Row 2 is left blank on purpose.
    for (offset, row) in rows.iter().enumerate() {
        let excel_row = if offset == 0 { 1 } else { 3 };
        for (col, value) in row.iter().enumerate() {
            cases
                .write_string(excel_row, col as u16, *value)
                .expect("write cell");
        }
    }
    cases.write_number(1, 5, 42.0).expect("write number");

    let vertical = workbook.add_worksheet();
    vertical.set_name("Scenarios").expect("name scenarios");
    let pairs = [
        ("Test Case ID", "TC-9"),
        ("Module", "Billing"),
        ("Title", "Pay invoice"),
        ("Test Steps", "1. Open invoice; 2. Pay"),
        ("QA", "sam"),
    ];
    for (row, (key, value)) in pairs.iter().enumerate() {
        vertical
            .write_string(row as u32, 0, *key)
            .expect("write key");
        vertical
            .write_string(row as u32, 1, *value)
            .expect("write value");
    }

    workbook.save_to_buffer().expect("save workbook")
}

fn import_sheet(bytes: &[u8], sheet: Option<&str>) -> testcase_import::import::ImportResult {
    let options = ImportOptions {
        selected_sheet: sheet.map(str::to_string),
        ..ImportOptions::default()
    };
    import_bytes(bytes, SourceFormat::Excel, &options, &FieldPreset::default()).result
}

#[test]
fn sheet_listing_describes_every_sheet() {
    let sheets = list_sheets(&regression_workbook()).expect("list sheets");
    let names = sheets.iter().map(|s| s.name.as_str()).collect::<Vec<_>>();
    assert_eq!(names, vec!["Notes", "Test Cases", "Scenarios"]);

    let cases = &sheets[1];
    assert!(cases.is_test_case_sheet);
    assert!(cases.has_headers);
    assert_eq!(cases.row_count, 3);
    assert_eq!(cases.preview.len(), 3);
    assert!(!sheets[0].is_test_case_sheet);
    assert!(sheets[2].is_test_case_sheet);
}

#[test]
fn blank_rows_are_dropped_and_numbers_render_plainly() {
    let grid = read_excel_grid(&regression_workbook(), Some("Test Cases")).expect("grid");
    assert_eq!(grid.len(), 3);
    assert_eq!(grid[1][5], "42");
}

#[test]
fn selected_sheet_matches_case_insensitively() {
    let result = import_sheet(&regression_workbook(), Some("test cases"));
    assert!(result.success);
    assert_eq!(result.test_cases.len(), 2);
    let login = &result.test_cases[0];
    assert_eq!(login.id, "TC_IMPORT_AUTH_001");
    assert_eq!(login.priority, Priority::High);
    assert_eq!(login.test_data, "42");
    assert_eq!(login.test_steps.len(), 2);
}

#[test]
fn vertical_sheets_are_detected_inside_workbooks() {
    let result = import_sheet(&regression_workbook(), Some("Scenarios"));
    assert!(result.success);
    assert_eq!(result.test_cases.len(), 1);
    let case = &result.test_cases[0];
    assert_eq!(case.title, "Pay invoice");
    assert_eq!(case.qa, "sam");
    assert_eq!(case.test_steps.len(), 2);
}

#[test]
fn missing_sheet_fails_the_import() {
    let result = import_sheet(&regression_workbook(), Some("Archive"));
    assert!(!result.success);
    assert_eq!(result.errors, vec!["Sheet 'Archive' not found in workbook"]);

    let err = read_excel_grid(&regression_workbook(), Some("Archive")).unwrap_err();
    assert!(matches!(err, ParseError::SheetNotFound(name) if name == "Archive"));
}

#[test]
fn first_sheet_is_used_by_default() {
    let result = import_sheet(&regression_workbook(), None);
    assert!(!result.success);
    assert!(result.test_cases.is_empty());
}

#[test]
fn garbage_bytes_are_a_structural_error() {
    let result = import_sheet(b"definitely not a workbook", None);
    assert!(!result.success);
    assert_eq!(result.errors.len(), 1);
}
