//! Plain-text tables for terminal listings.

use std::borrow::Cow;
use std::fmt::Write as _;

/// Cells longer than this are cut with an ellipsis.
pub const MAX_CELL_WIDTH: usize = 40;
const ELLIPSIS: char = '…';

pub fn render_table(headers: &[&str], rows: &[Vec<String>]) -> String {
    let headers = headers.iter().map(|h| h.to_string()).collect::<Vec<_>>();
    let rows = rows
        .iter()
        .map(|row| row.iter().map(|cell| fit_cell(cell).into_owned()).collect())
        .collect::<Vec<Vec<String>>>();

    let mut widths = headers.iter().map(|h| display_width(h)).collect::<Vec<_>>();
    for row in &rows {
        for (idx, cell) in row.iter().enumerate().take(widths.len()) {
            widths[idx] = widths[idx].max(display_width(cell));
        }
    }

    let mut output = String::new();
    let _ = writeln!(output, "{}", format_row(&headers, &widths));
    let separator = widths
        .iter()
        .map(|w| "-".repeat((*w).max(3)))
        .collect::<Vec<_>>();
    let _ = writeln!(output, "{}", format_row(&separator, &widths));
    for row in &rows {
        let _ = writeln!(output, "{}", format_row(row, &widths));
    }
    output
}

pub fn eprint_table(headers: &[&str], rows: &[Vec<String>]) {
    eprint!("{}", render_table(headers, rows));
}

pub fn print_table(headers: &[&str], rows: &[Vec<String>]) {
    print!("{}", render_table(headers, rows));
}

fn format_row(values: &[String], widths: &[usize]) -> String {
    let line = values
        .iter()
        .zip(widths)
        .map(|(value, width)| {
            let padding = width.saturating_sub(display_width(value));
            format!("{value}{}", " ".repeat(padding))
        })
        .collect::<Vec<_>>()
        .join("  ");
    line.trim_end().to_string()
}

fn display_width(value: &str) -> usize {
    value.chars().count()
}

/// Flattens control whitespace and truncates long cells.
fn fit_cell(value: &str) -> Cow<'_, str> {
    let flattened = if value.contains(['\n', '\r', '\t']) {
        Cow::Owned(
            value
                .chars()
                .map(|ch| if matches!(ch, '\n' | '\r' | '\t') { ' ' } else { ch })
                .collect(),
        )
    } else {
        Cow::Borrowed(value)
    };
    if display_width(&flattened) <= MAX_CELL_WIDTH {
        return flattened;
    }
    let mut cut = flattened
        .chars()
        .take(MAX_CELL_WIDTH - 1)
        .collect::<String>();
    cut.push(ELLIPSIS);
    Cow::Owned(cut)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn columns_align_to_widest_cell() {
        let rendered = render_table(
            &["name", "rows"],
            &[
                vec!["Regression".to_string(), "12".to_string()],
                vec!["UI".to_string(), "3".to_string()],
            ],
        );
        let lines = rendered.lines().collect::<Vec<_>>();
        assert_eq!(lines[0], "name        rows");
        assert_eq!(lines[1], "----------  ----");
        assert_eq!(lines[3], "UI          3");
    }

    #[test]
    fn long_and_multiline_cells_are_flattened_and_cut() {
        let long = "x".repeat(60);
        let rendered = render_table(&["value"], &[vec!["a\nb".to_string()], vec![long]]);
        assert!(rendered.contains("a b"));
        let last = rendered.lines().last().unwrap();
        assert_eq!(last.chars().count(), MAX_CELL_WIDTH);
        assert!(last.ends_with(ELLIPSIS));
    }
}
